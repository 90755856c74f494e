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

use std::{fmt, path::PathBuf};

use data_encoding::HEXLOWER;

use super::{quote_string, TorCommand};
use crate::{codec::WireCommand, error::ControlError, response::ResponseLine};

/// Control port authentication mechanisms. When both a readable cookie file and
/// a password are available, cookie auth is preferred.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Authentication {
    /// No authentication required.
    #[default]
    None,
    /// The 32 bytes read from tor's cookie file.
    Cookie(Vec<u8>),
    /// A cookie file to be read at connect time.
    CookieFile(PathBuf),
    /// A clear-text password matching tor's HashedControlPassword.
    Password(String),
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authentication::None => f.write_str("Authentication::None"),
            Authentication::Cookie(_) => f.write_str("Authentication::Cookie(<redacted>)"),
            Authentication::CookieFile(path) => write!(f, "Authentication::CookieFile({})", path.display()),
            Authentication::Password(_) => f.write_str("Authentication::Password(<redacted>)"),
        }
    }
}

/// The AUTHENTICATE command.
pub struct Authenticate {
    auth: Authentication,
}

impl Authenticate {
    pub fn new(auth: Authentication) -> Self {
        Self { auth }
    }
}

impl TorCommand for Authenticate {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let line = match &self.auth {
            Authentication::None => "AUTHENTICATE".to_string(),
            Authentication::Cookie(cookie) => format!("AUTHENTICATE {}", HEXLOWER.encode(cookie)),
            Authentication::CookieFile(_) => return Err(ControlError::NoAuthConfigured),
            Authentication::Password(password) => format!("AUTHENTICATE {}", quote_string(password)),
        };
        Ok(WireCommand::new(line).sensitive())
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        let last = responses.last().ok_or(ControlError::ServerNoResponse)?;
        if last.is_ok() {
            Ok(())
        } else {
            Err(ControlError::AuthFailed(last.value.clone()))
        }
    }
}
