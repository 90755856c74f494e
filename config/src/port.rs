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
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, keyword::TorKeyword};

/// Maximum length of a unix socket path. This is the portable `sun_path` limit
/// (104 bytes on the BSDs and macOS, 108 on Linux).
pub const MAX_UNIX_SOCKET_PATH_LEN: usize = 104;

/// The value of a `*Port` torrc option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorPortValue {
    /// Let tor pick an unused TCP port.
    Auto,
    /// A fixed TCP port on localhost.
    Port(u16),
    /// A unix domain socket listener.
    Unix(PathBuf),
}

impl TorPortValue {
    /// Validate this value against the keyword that will carry it.
    pub fn validate_for(&self, keyword: TorKeyword) -> Result<(), ConfigError> {
        match self {
            TorPortValue::Unix(path) => {
                if !keyword.supports_unix_socket() {
                    return Err(ConfigError::UnixSocketUnsupported(keyword));
                }
                if !cfg!(unix) {
                    return Err(ConfigError::UnixSocketUnsupportedPlatform);
                }
                validate_unix_socket_path(path)
            },
            _ => Ok(()),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, TorPortValue::Auto)
    }
}

impl fmt::Display for TorPortValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorPortValue::Auto => f.write_str("auto"),
            TorPortValue::Port(port) => write!(f, "{}", port),
            TorPortValue::Unix(path) => write!(f, "unix:\"{}\"", path.display()),
        }
    }
}

impl FromStr for TorPortValue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(TorPortValue::Auto);
        }
        if let Some(rest) = s.strip_prefix("unix:") {
            let path = rest.trim_matches('"');
            if path.is_empty() {
                return Err(ConfigError::InvalidPortValue(s.to_string()));
            }
            return Ok(TorPortValue::Unix(PathBuf::from(path)));
        }
        s.parse::<u16>()
            .map(TorPortValue::Port)
            .map_err(|_| ConfigError::InvalidPortValue(s.to_string()))
    }
}

impl From<u16> for TorPortValue {
    fn from(port: u16) -> Self {
        TorPortValue::Port(port)
    }
}

pub fn validate_unix_socket_path(path: &Path) -> Result<(), ConfigError> {
    let s = path.to_string_lossy();
    if !path.is_absolute() {
        return Err(ConfigError::UnixSocketPathNotAbsolute(s.into_owned()));
    }
    if s.len() > MAX_UNIX_SOCKET_PATH_LEN {
        return Err(ConfigError::UnixSocketPathTooLong {
            path: s.into_owned(),
            max: MAX_UNIX_SOCKET_PATH_LEN,
        });
    }
    if s.contains('\n') || s.contains('"') {
        return Err(ConfigError::UnixSocketPathIllegalChar(s.into_owned()));
    }
    Ok(())
}

/// Capability used by the config builder to check whether a requested TCP port is
/// already taken before it is emitted. This is advisory only; tor authoritatively
/// binds its listeners and reports them via GETINFO and its log lines.
pub trait PortProber: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    #[test]
    fn renders_and_parses() {
        assert_eq!(TorPortValue::Auto.to_string(), "auto");
        assert_eq!(TorPortValue::Port(9051).to_string(), "9051");
        assert_eq!(
            TorPortValue::Unix("/var/run/tor/control.sock".into()).to_string(),
            "unix:\"/var/run/tor/control.sock\""
        );

        assert_eq!("auto".parse::<TorPortValue>().unwrap(), TorPortValue::Auto);
        assert_eq!("9051".parse::<TorPortValue>().unwrap(), TorPortValue::Port(9051));
        assert_eq!(
            "unix:\"/var/run/tor/control.sock\"".parse::<TorPortValue>().unwrap(),
            TorPortValue::Unix("/var/run/tor/control.sock".into())
        );
        "70000".parse::<TorPortValue>().unwrap_err();
    }

    #[test]
    fn rejects_unix_socket_on_dns_port() {
        let value = TorPortValue::Unix("/tmp/sock".into());
        let err = value.validate_for(TorKeyword::DnsPort).unwrap_err();
        unpack_enum!(ConfigError::UnixSocketUnsupported(_kw) = err);
    }

    #[cfg(unix)]
    #[test]
    fn rejects_bad_unix_socket_paths() {
        let err = TorPortValue::Unix("relative/sock".into())
            .validate_for(TorKeyword::SocksPort)
            .unwrap_err();
        unpack_enum!(ConfigError::UnixSocketPathNotAbsolute(_p) = err);

        let long = format!("/{}", "a".repeat(MAX_UNIX_SOCKET_PATH_LEN + 1));
        let err = TorPortValue::Unix(long.into())
            .validate_for(TorKeyword::SocksPort)
            .unwrap_err();
        unpack_enum!(ConfigError::UnixSocketPathTooLong { path, max } = err);
        drop(path);
        assert_eq!(max, MAX_UNIX_SOCKET_PATH_LEN);

        let err = TorPortValue::Unix("/tmp/with\nnewline".into())
            .validate_for(TorKeyword::ControlPort)
            .unwrap_err();
        unpack_enum!(ConfigError::UnixSocketPathIllegalChar(_p) = err);
    }

    #[cfg(unix)]
    #[test]
    fn accepts_valid_unix_socket_for_control() {
        TorPortValue::Unix("/var/run/tor/control.sock".into())
            .validate_for(TorKeyword::ControlPortEphemeral)
            .unwrap();
    }
}
