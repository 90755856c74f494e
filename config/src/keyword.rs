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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The closed catalogue of torrc keywords this crate knows how to emit and parse.
///
/// Variants whose tor spelling begins with a double underscore are the non-persisted
/// options tor accepts only from the command line or an owning controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TorKeyword {
    CacheDirectory,
    ClientOnionAuthDir,
    ControlPort,
    ControlPortEphemeral,
    ControlPortWriteToFile,
    CookieAuthFile,
    CookieAuthentication,
    DataDirectory,
    DisableNetwork,
    DnsPort,
    DnsPortEphemeral,
    DormantCanceledByStartup,
    DormantOnFirstStartup,
    GeoIpFile,
    GeoIpv6File,
    HiddenServiceAllowUnknownPorts,
    HiddenServiceDir,
    HiddenServiceDirGroupReadable,
    HiddenServiceMaxStreams,
    HiddenServiceMaxStreamsCloseCircuit,
    HiddenServicePort,
    HiddenServiceVersion,
    HttpTunnelPort,
    Log,
    OwningControllerProcess,
    ReloadTorrcOnSighup,
    RunAsDaemon,
    SocksPort,
    SocksPortEphemeral,
    SyslogIdentityTag,
    TransPort,
    TransPortEphemeral,
}

impl TorKeyword {
    pub fn as_str(&self) -> &'static str {
        use TorKeyword::*;
        match self {
            CacheDirectory => "CacheDirectory",
            ClientOnionAuthDir => "ClientOnionAuthDir",
            ControlPort => "ControlPort",
            ControlPortEphemeral => "__ControlPort",
            ControlPortWriteToFile => "ControlPortWriteToFile",
            CookieAuthFile => "CookieAuthFile",
            CookieAuthentication => "CookieAuthentication",
            DataDirectory => "DataDirectory",
            DisableNetwork => "DisableNetwork",
            DnsPort => "DNSPort",
            DnsPortEphemeral => "__DNSPort",
            DormantCanceledByStartup => "DormantCanceledByStartup",
            DormantOnFirstStartup => "DormantOnFirstStartup",
            GeoIpFile => "GeoIPFile",
            GeoIpv6File => "GeoIPv6File",
            HiddenServiceAllowUnknownPorts => "HiddenServiceAllowUnknownPorts",
            HiddenServiceDir => "HiddenServiceDir",
            HiddenServiceDirGroupReadable => "HiddenServiceDirGroupReadable",
            HiddenServiceMaxStreams => "HiddenServiceMaxStreams",
            HiddenServiceMaxStreamsCloseCircuit => "HiddenServiceMaxStreamsCloseCircuit",
            HiddenServicePort => "HiddenServicePort",
            HiddenServiceVersion => "HiddenServiceVersion",
            HttpTunnelPort => "HTTPTunnelPort",
            Log => "Log",
            OwningControllerProcess => "__OwningControllerProcess",
            ReloadTorrcOnSighup => "__ReloadTorrcOnSIGHUP",
            RunAsDaemon => "RunAsDaemon",
            SocksPort => "SocksPort",
            SocksPortEphemeral => "__SocksPort",
            SyslogIdentityTag => "SyslogIdentityTag",
            TransPort => "TransPort",
            TransPortEphemeral => "__TransPort",
        }
    }

    /// All keyword variants, in catalogue order. Used by the torrc parser.
    pub fn all() -> &'static [TorKeyword] {
        use TorKeyword::*;
        &[
            CacheDirectory,
            ClientOnionAuthDir,
            ControlPort,
            ControlPortEphemeral,
            ControlPortWriteToFile,
            CookieAuthFile,
            CookieAuthentication,
            DataDirectory,
            DisableNetwork,
            DnsPort,
            DnsPortEphemeral,
            DormantCanceledByStartup,
            DormantOnFirstStartup,
            GeoIpFile,
            GeoIpv6File,
            HiddenServiceAllowUnknownPorts,
            HiddenServiceDir,
            HiddenServiceDirGroupReadable,
            HiddenServiceMaxStreams,
            HiddenServiceMaxStreamsCloseCircuit,
            HiddenServicePort,
            HiddenServiceVersion,
            HttpTunnelPort,
            Log,
            OwningControllerProcess,
            ReloadTorrcOnSighup,
            RunAsDaemon,
            SocksPort,
            SocksPortEphemeral,
            SyslogIdentityTag,
            TransPort,
            TransPortEphemeral,
        ]
    }

    /// Whether tor accepts multiple lines for this keyword. A later single-valued
    /// setting replaces an earlier one; multi-valued settings accumulate.
    pub fn is_multi_valued(&self) -> bool {
        use TorKeyword::*;
        matches!(
            self,
            ControlPort |
                ControlPortEphemeral |
                DnsPort |
                DnsPortEphemeral |
                HiddenServiceDir |
                HiddenServicePort |
                HttpTunnelPort |
                Log |
                SocksPort |
                SocksPortEphemeral |
                TransPort |
                TransPortEphemeral
        )
    }

    /// Whether this keyword opens a listener and takes a port value.
    pub fn is_listener_port(&self) -> bool {
        use TorKeyword::*;
        matches!(
            self,
            ControlPort |
                ControlPortEphemeral |
                DnsPort |
                DnsPortEphemeral |
                HttpTunnelPort |
                SocksPort |
                SocksPortEphemeral |
                TransPort |
                TransPortEphemeral
        )
    }

    /// Whether a `unix:"/path"` listener is accepted for this keyword. Only the
    /// control and socks listeners (and hidden service targets) speak unix sockets.
    pub fn supports_unix_socket(&self) -> bool {
        use TorKeyword::*;
        matches!(
            self,
            ControlPort | ControlPortEphemeral | SocksPort | SocksPortEphemeral | HiddenServicePort
        )
    }

    /// Keywords belonging to a hidden service block. These must stay contiguous
    /// under their `HiddenServiceDir`.
    pub fn is_hidden_service(&self) -> bool {
        self.as_str().starts_with("HiddenService")
    }
}

impl fmt::Display for TorKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TorKeyword {
    type Err = ConfigError;

    /// Keyword lookup is case-insensitive, as tor's own torrc parsing is.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|kw| kw.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ConfigError::UnknownKeyword(s.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for kw in TorKeyword::all() {
            assert_eq!(kw.as_str().parse::<TorKeyword>().unwrap(), *kw);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!("socksport".parse::<TorKeyword>().unwrap(), TorKeyword::SocksPort);
        assert_eq!("__controlport".parse::<TorKeyword>().unwrap(), TorKeyword::ControlPortEphemeral);
        "NotAKeyword".parse::<TorKeyword>().unwrap_err();
    }

    #[test]
    fn unix_socket_support_excludes_dns_and_trans() {
        assert!(TorKeyword::SocksPort.supports_unix_socket());
        assert!(TorKeyword::ControlPortEphemeral.supports_unix_socket());
        assert!(!TorKeyword::DnsPort.supports_unix_socket());
        assert!(!TorKeyword::TransPort.supports_unix_socket());
        assert!(!TorKeyword::HttpTunnelPort.supports_unix_socket());
    }
}
