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

use std::{io, path::PathBuf};

use embedtor_config::KeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("The control channel disconnected before the command completed")]
    Disconnected,
    #[error("The command was cancelled")]
    Cancelled,
    #[error("tor rejected authentication: {0}")]
    AuthFailed(String),
    #[error("tor returned transient error {code}: {text}")]
    Tor4xx { code: u16, text: String },
    #[error("tor returned permanent error {code}: {text}")]
    Tor5xx { code: u16, text: String },
    #[error("The server sent no response lines")]
    ServerNoResponse,
    #[error("Failed to parse reply: {0}")]
    ParseReply(String),
    #[error("Could not read the auth cookie at {path}: {source}")]
    CookieRead { path: PathBuf, source: io::Error },
    #[error("The auth cookie at {path} was {len} bytes; expected exactly 32")]
    CookieMalformed { path: PathBuf, len: usize },
    #[error("No authentication material is configured")]
    NoAuthConfigured,
    #[error("Malformed control port line '{0}'")]
    MalformedControlPortLine(String),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Connection error: {0}")]
    Io(#[from] io::Error),
}

impl ControlError {
    /// Map a non-2xx reply code to the matching error kind.
    pub(crate) fn from_reply(code: u16, text: String) -> Self {
        match code {
            400..=499 => ControlError::Tor4xx { code, text },
            500..=599 => ControlError::Tor5xx { code, text },
            _ => ControlError::ParseReply(format!("unexpected reply code {}: {}", code, text)),
        }
    }

    /// Whether this error means the channel is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControlError::Disconnected | ControlError::ProtocolViolation(_) | ControlError::Io(_)
        )
    }
}
