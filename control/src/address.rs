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

use std::{
    borrow::Cow,
    fmt,
    net::SocketAddr,
    path::PathBuf,
};

use multiaddr::{Multiaddr, Protocol};

use crate::error::ControlError;

/// The endpoint of a tor control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl ControlAddress {
    /// Strictly parse one line of a `ControlPortWriteToFile` file:
    /// `PORT=<host>:<port>` or `PORT=unix:<path>`. Anything else is an error.
    pub fn from_port_line(line: &str) -> Result<Self, ControlError> {
        let malformed = || ControlError::MalformedControlPortLine(line.to_string());
        let value = line.trim().strip_prefix("PORT=").ok_or_else(malformed)?;
        if let Some(path) = value.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(malformed());
            }
            return Ok(ControlAddress::Unix(PathBuf::from(path)));
        }
        value
            .parse::<SocketAddr>()
            .map(ControlAddress::Tcp)
            .map_err(|_| malformed())
    }

    pub fn to_multiaddr(&self) -> Multiaddr {
        match self {
            ControlAddress::Tcp(addr) => {
                let mut ma = Multiaddr::empty();
                match addr {
                    SocketAddr::V4(v4) => ma.push(Protocol::Ip4(*v4.ip())),
                    SocketAddr::V6(v6) => ma.push(Protocol::Ip6(*v6.ip())),
                }
                ma.push(Protocol::Tcp(addr.port()));
                ma
            },
            ControlAddress::Unix(path) => {
                let mut ma = Multiaddr::empty();
                ma.push(Protocol::Unix(Cow::Owned(path.display().to_string())));
                ma
            },
        }
    }

    pub fn from_multiaddr(addr: &Multiaddr) -> Option<Self> {
        let mut iter = addr.iter();
        match (iter.next()?, iter.next()) {
            (Protocol::Ip4(ip), Some(Protocol::Tcp(port))) => Some(ControlAddress::Tcp((ip, port).into())),
            (Protocol::Ip6(ip), Some(Protocol::Tcp(port))) => Some(ControlAddress::Tcp((ip, port).into())),
            (Protocol::Unix(path), None) => Some(ControlAddress::Unix(PathBuf::from(path.into_owned()))),
            _ => None,
        }
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAddress::Tcp(addr) => write!(f, "{}", addr),
            ControlAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    #[test]
    fn parses_tcp_port_lines() {
        let addr = ControlAddress::from_port_line("PORT=127.0.0.1:9051").unwrap();
        unpack_enum!(ControlAddress::Tcp(sock) = addr);
        assert_eq!(sock, "127.0.0.1:9051".parse().unwrap());
    }

    #[test]
    fn parses_unix_port_lines() {
        let addr = ControlAddress::from_port_line("PORT=unix:/run/tor/control.sock\n").unwrap();
        unpack_enum!(ControlAddress::Unix(path) = addr);
        assert_eq!(path, PathBuf::from("/run/tor/control.sock"));
    }

    #[test]
    fn rejects_anything_else() {
        for line in ["", "9051", "PORT=", "PORT=unix:", "PORT=localhost:abc", "SOCKS=1"] {
            let err = ControlAddress::from_port_line(line).unwrap_err();
            unpack_enum!(ControlError::MalformedControlPortLine(_l) = err);
        }
    }

    #[test]
    fn multiaddr_round_trip() {
        let tcp = ControlAddress::Tcp("127.0.0.1:9051".parse().unwrap());
        assert_eq!(ControlAddress::from_multiaddr(&tcp.to_multiaddr()), Some(tcp));

        let unix = ControlAddress::Unix("/run/tor/control.sock".into());
        assert_eq!(ControlAddress::from_multiaddr(&unix.to_multiaddr()), Some(unix));
    }
}
