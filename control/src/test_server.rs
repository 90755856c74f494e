// Copyright 2025, The Embedtor Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! A scriptable stand-in for tor's control port, used by tests. Every request
//! line is recorded for later inspection and answered with whatever reply
//! lines are currently configured.

use std::sync::Arc;

use futures::{stream, SinkExt, StreamExt};
use tokio::{
    io::{duplex, DuplexStream},
    sync::Mutex,
};
use tokio_util::codec::{Framed, LinesCodec};

/// Serve canned responses over an in-memory duplex pipe. Returns the shared
/// state and the client end of the pipe.
pub async fn spawn() -> (State, DuplexStream) {
    let (server_side, client_side) = duplex(64 * 1024);
    let state = State::new();
    tokio::spawn(serve(server_side, state.clone()));
    (state, client_side)
}

/// Serve canned responses on a real TCP listener, accepting any number of
/// connections. Used by tests that drive a whole runtime against a fake tor.
pub async fn spawn_tcp() -> (State, std::net::SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = State::new();
    let accept_state = state.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve(socket, accept_state.clone()));
        }
    });
    (state, addr)
}

/// Shared view of a running canned server: the requests it has received so
/// far, and the reply lines it will answer the next requests with.
#[derive(Clone)]
pub struct State {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    requests: Vec<String>,
    reply_lines: Vec<String>,
}

impl State {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                requests: Vec::new(),
                reply_lines: to_owned_lines(canned_responses::OK),
            })),
        }
    }

    /// Replace the reply sent for every subsequent request.
    pub async fn set_canned_response(&self, lines: &[&str]) {
        self.inner.lock().await.reply_lines = to_owned_lines(lines);
    }

    /// Drain and return the request lines received so far.
    pub async fn take_requests(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().await.requests)
    }

    async fn record_request(&self, line: String) {
        self.inner.lock().await.requests.push(line);
    }

    async fn current_reply(&self) -> Vec<String> {
        self.inner.lock().await.reply_lines.clone()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

fn to_owned_lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

/// One canned-response connection: every request is recorded and answered with
/// the current reply lines. `+`-prefixed requests consume their data block
/// before being answered; QUIT is acknowledged and closes the connection, as
/// tor does.
async fn serve<S>(socket: S, state: State)
where S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin {
    let mut framed = Framed::new(socket, LinesCodec::new());
    let mut in_data_block = false;
    while let Some(msg) = framed.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let is_quit = msg == "QUIT";
        if in_data_block {
            if msg == "." {
                in_data_block = false;
            } else {
                continue;
            }
        } else {
            state.record_request(msg.clone()).await;
            if msg.starts_with('+') {
                in_data_block = true;
                continue;
            }
        }
        let mut reply = stream::iter(state.current_reply().await).map(Ok);
        if framed.send_all(&mut reply).await.is_err() {
            break;
        }
        if is_quit {
            break;
        }
    }
}

pub mod canned_responses {
    /// A v3 address whose raw form carries a genuine checksum and version byte.
    pub const SERVICE_ID: &str = "hnpsuboubaf2k3p7ioio2gfj22j2xhqdzjbseboaodsw4ujgwgydxyad";

    /// An opaque stand-in for the key blob ADD_ONION hands back.
    pub const KEY_BLOB: &str = "H5eXizS97RduOZ3g4v7KMCY1hg9eiHeTVqVnD680qblZpXWIOTPN9O5RtN7PzzG3zEu/o7WtKXAcFmIxA6VzaQ";

    pub const OK: &[&str] = &["250 OK"];

    pub const GET_CONF_OK: &[&str] = &[
        "250-SocksPort=9050",
        "250-SocksPort=9150 IPv6Traffic",
        "250 DNSPort=5353",
    ];

    pub const GET_INFO_OK: &[&str] = &["250-version=0.4.8.9", "250-uptime=120", "250 OK"];

    pub const ADD_ONION_OK: &[&str] = &[
        "250-ServiceID=hnpsuboubaf2k3p7ioio2gfj22j2xhqdzjbseboaodsw4ujgwgydxyad",
        "250-PrivateKey=ED25519-V3:H5eXizS97RduOZ3g4v7KMCY1hg9eiHeTVqVnD680qblZpXWIOTPN9O5RtN7PzzG3zEu/o7WtKXAcFmIxA6VzaQ",
        "250 OK",
    ];

    pub const ADD_ONION_DISCARDPK_OK: &[&str] = &[
        "250-ServiceID=hnpsuboubaf2k3p7ioio2gfj22j2xhqdzjbseboaodsw4ujgwgydxyad",
        "250 OK",
    ];

    pub const ERR_552: &[&str] = &["552 Unrecognized configuration key \"NoSuchOption\""];
}
