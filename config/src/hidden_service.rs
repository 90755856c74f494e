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
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    keyword::TorKeyword,
    port::validate_unix_socket_path,
    settings::{LineItem, TorSetting},
};

/// Mapping from a virtual (onion-side) port to the local target that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsPort {
    pub virtual_port: u16,
    pub target: HsTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HsTarget {
    Socket(SocketAddr),
    Unix(PathBuf),
}

impl HsPort {
    pub fn new(virtual_port: u16, target: SocketAddr) -> Self {
        Self {
            virtual_port,
            target: HsTarget::Socket(target),
        }
    }

    pub fn unix(virtual_port: u16, path: PathBuf) -> Self {
        Self {
            virtual_port,
            target: HsTarget::Unix(path),
        }
    }
}

impl From<u16> for HsPort {
    /// Maps the virtual port onto the same port on localhost.
    fn from(port: u16) -> Self {
        HsPort::new(port, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }
}

impl fmt::Display for HsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HsTarget::Socket(addr) => write!(f, "{}", addr),
            HsTarget::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// A v3 hidden service block for the torrc. Blocks serialize contiguously:
/// the `HiddenServiceDir` line followed by every `HiddenService*` line that
/// belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenServiceConfig {
    dir: PathBuf,
    version: u8,
    ports: Vec<HsPort>,
    max_streams: Option<u16>,
    max_streams_close_circuit: bool,
    allow_unknown_ports: bool,
    dir_group_readable: bool,
}

impl HiddenServiceConfig {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            version: 3,
            ports: Vec::new(),
            max_streams: None,
            max_streams_close_circuit: false,
            allow_unknown_ports: false,
            dir_group_readable: false,
        }
    }

    pub fn with_port<P: Into<HsPort>>(mut self, port: P) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_max_streams(mut self, max_streams: u16) -> Self {
        self.max_streams = Some(max_streams);
        self
    }

    pub fn with_max_streams_close_circuit(mut self) -> Self {
        self.max_streams_close_circuit = true;
        self
    }

    pub fn with_allow_unknown_ports(mut self) -> Self {
        self.allow_unknown_ports = true;
        self
    }

    pub fn with_dir_group_readable(mut self) -> Self {
        self.dir_group_readable = true;
        self
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn ports(&self) -> &[HsPort] {
        &self.ports
    }

    /// Serialize this block into contiguous settings, validating its invariants.
    pub(crate) fn to_settings(&self) -> Result<Vec<TorSetting>, ConfigError> {
        if self.version != 3 {
            return Err(ConfigError::HiddenServiceMissingVersion);
        }
        if self.ports.is_empty() {
            return Err(ConfigError::HiddenServiceNoPorts);
        }
        let mut settings = vec![
            TorSetting::new(TorKeyword::HiddenServiceDir, self.dir.display().to_string()),
            TorSetting::new(TorKeyword::HiddenServiceVersion, self.version.to_string()),
        ];
        let mut port_items = Vec::with_capacity(self.ports.len());
        for port in &self.ports {
            if let HsTarget::Unix(path) = &port.target {
                if !cfg!(unix) {
                    return Err(ConfigError::UnixSocketUnsupportedPlatform);
                }
                validate_unix_socket_path(path)?;
            }
            port_items.push(LineItem::with_optionals(
                port.virtual_port.to_string(),
                [port.target.to_string()],
            ));
        }
        settings.push(TorSetting::with_items(TorKeyword::HiddenServicePort, port_items));
        if let Some(max) = self.max_streams {
            settings.push(TorSetting::new(TorKeyword::HiddenServiceMaxStreams, max.to_string()));
        }
        if self.max_streams_close_circuit {
            settings.push(TorSetting::new(TorKeyword::HiddenServiceMaxStreamsCloseCircuit, "1"));
        }
        if self.allow_unknown_ports {
            settings.push(TorSetting::new(TorKeyword::HiddenServiceAllowUnknownPorts, "1"));
        }
        if self.dir_group_readable {
            settings.push(TorSetting::new(TorKeyword::HiddenServiceDirGroupReadable, "1"));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    #[test]
    fn block_requires_a_port() {
        let err = HiddenServiceConfig::new("/var/lib/tor/hs").to_settings().unwrap_err();
        unpack_enum!(ConfigError::HiddenServiceNoPorts = err);
    }

    #[test]
    fn block_serializes_contiguously() {
        let settings = HiddenServiceConfig::new("/var/lib/tor/hs")
            .with_port(HsPort::new(443, "127.0.0.1:8443".parse().unwrap()))
            .with_port(80)
            .with_max_streams(32)
            .to_settings()
            .unwrap();
        let keywords: Vec<_> = settings.iter().map(|s| s.keyword).collect();
        assert_eq!(keywords, vec![
            TorKeyword::HiddenServiceDir,
            TorKeyword::HiddenServiceVersion,
            TorKeyword::HiddenServicePort,
            TorKeyword::HiddenServiceMaxStreams,
        ]);
        let ports = &settings[2].items;
        assert_eq!(ports[0].argument, "443");
        assert_eq!(ports[0].optionals, vec!["127.0.0.1:8443"]);
        assert_eq!(ports[1].argument, "80");
        assert_eq!(ports[1].optionals, vec!["127.0.0.1:80"]);
    }
}
