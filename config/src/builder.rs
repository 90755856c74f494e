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

use std::path::PathBuf;

use log::warn;

use crate::{
    error::ConfigError,
    hidden_service::HiddenServiceConfig,
    keyword::TorKeyword,
    port::{PortProber, TorPortValue},
    settings::{TorConfig, TorSetting},
};

const LOG_TARGET: &str = "config::builder";

/// Builds a validated [TorConfig].
///
/// The builder is seeded from a working directory and always produces the
/// minimum startup subset (data/cache directories, cookie auth, control-port
/// file, ephemeral control and socks listeners, networking disabled, owning
/// controller process). Everything else layers on top.
pub struct TorConfigBuilder {
    data_dir: PathBuf,
    cache_dir: PathBuf,
    cookie_auth_file: PathBuf,
    control_port_file: PathBuf,
    control_port: TorPortValue,
    socks_port: TorPortValue,
    socks_flags: Vec<String>,
    extra_listeners: Vec<(TorKeyword, TorPortValue)>,
    disable_network: bool,
    owning_pid: u32,
    geoip_file: Option<PathBuf>,
    geoip6_file: Option<PathBuf>,
    client_onion_auth_dir: Option<PathBuf>,
    log_lines: Vec<String>,
    hidden_services: Vec<HiddenServiceConfig>,
    overrides: Vec<TorSetting>,
    prober: Option<Box<dyn PortProber>>,
}

impl TorConfigBuilder {
    /// Seed a builder from the runtime's working directory.
    pub fn for_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        let base_dir = base_dir.into();
        let data_dir = base_dir.join("data");
        Self {
            cache_dir: base_dir.join("cache"),
            cookie_auth_file: data_dir.join("control_auth_cookie"),
            control_port_file: base_dir.join("control.txt"),
            data_dir,
            control_port: TorPortValue::Auto,
            socks_port: TorPortValue::Auto,
            socks_flags: Vec::new(),
            extra_listeners: Vec::new(),
            disable_network: true,
            owning_pid: std::process::id(),
            geoip_file: None,
            geoip6_file: None,
            client_onion_auth_dir: None,
            log_lines: Vec::new(),
            hidden_services: Vec::new(),
            overrides: Vec::new(),
            prober: None,
        }
    }

    pub fn data_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn cache_directory<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn cookie_auth_file<P: Into<PathBuf>>(mut self, file: P) -> Self {
        self.cookie_auth_file = file.into();
        self
    }

    pub fn control_port_write_to_file<P: Into<PathBuf>>(mut self, file: P) -> Self {
        self.control_port_file = file.into();
        self
    }

    pub fn control_port<V: Into<TorPortValue>>(mut self, value: V) -> Self {
        self.control_port = value.into();
        self
    }

    pub fn socks_port<V: Into<TorPortValue>>(mut self, value: V) -> Self {
        self.socks_port = value.into();
        self
    }

    /// Trailing socks listener flags, e.g. `OnionTrafficOnly`.
    pub fn socks_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.socks_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn dns_port<V: Into<TorPortValue>>(mut self, value: V) -> Self {
        self.extra_listeners.push((TorKeyword::DnsPort, value.into()));
        self
    }

    pub fn trans_port<V: Into<TorPortValue>>(mut self, value: V) -> Self {
        self.extra_listeners.push((TorKeyword::TransPort, value.into()));
        self
    }

    pub fn http_tunnel_port<V: Into<TorPortValue>>(mut self, value: V) -> Self {
        self.extra_listeners.push((TorKeyword::HttpTunnelPort, value.into()));
        self
    }

    pub fn disable_network(mut self, disable: bool) -> Self {
        self.disable_network = disable;
        self
    }

    pub fn owning_controller_pid(mut self, pid: u32) -> Self {
        self.owning_pid = pid;
        self
    }

    pub fn geoip_files<P: Into<PathBuf>>(mut self, geoip: P, geoip6: P) -> Self {
        self.geoip_file = Some(geoip.into());
        self.geoip6_file = Some(geoip6.into());
        self
    }

    pub fn client_onion_auth_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.client_onion_auth_dir = Some(dir.into());
        self
    }

    /// Append a raw `Log` line, e.g. `notice file /var/log/tor.log`.
    pub fn log<S: Into<String>>(mut self, value: S) -> Self {
        self.log_lines.push(value.into());
        self
    }

    pub fn hidden_service(mut self, hs: HiddenServiceConfig) -> Self {
        self.hidden_services.push(hs);
        self
    }

    /// Apply an arbitrary catalogued setting. Single-valued keywords replace an
    /// earlier application; multi-valued keywords accumulate line items.
    pub fn put(mut self, setting: TorSetting) -> Self {
        match self.overrides.iter().position(|s| s.keyword == setting.keyword) {
            Some(idx) if !setting.keyword.is_multi_valued() => self.overrides[idx] = setting,
            Some(idx) => self.overrides[idx].items.extend(setting.items),
            None => self.overrides.push(setting),
        }
        self
    }

    /// Install the advisory port prober consulted before numeric ports are emitted.
    pub fn with_port_prober(mut self, prober: Box<dyn PortProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn build(self) -> Result<TorConfig, ConfigError> {
        let mut settings = Vec::new();

        settings.push(TorSetting::new(
            TorKeyword::DataDirectory,
            self.data_dir.display().to_string(),
        ));
        settings.push(TorSetting::new(
            TorKeyword::CacheDirectory,
            self.cache_dir.display().to_string(),
        ));
        settings.push(TorSetting::new(TorKeyword::CookieAuthentication, "1"));
        settings.push(TorSetting::new(
            TorKeyword::CookieAuthFile,
            self.cookie_auth_file.display().to_string(),
        ));
        settings.push(TorSetting::new(
            TorKeyword::ControlPortWriteToFile,
            self.control_port_file.display().to_string(),
        ));
        settings.push(TorSetting::new(
            TorKeyword::OwningControllerProcess,
            self.owning_pid.to_string(),
        ));
        settings.push(TorSetting::new(TorKeyword::ReloadTorrcOnSighup, "0"));
        settings.push(TorSetting::new(TorKeyword::RunAsDaemon, "0"));
        settings.push(TorSetting::new(
            TorKeyword::DisableNetwork,
            if self.disable_network { "1" } else { "0" },
        ));
        // A dormant tor never opens its listeners; cancel dormancy on startup.
        settings.push(TorSetting::new(TorKeyword::DormantCanceledByStartup, "1"));

        let control_port = resolve_port(TorKeyword::ControlPortEphemeral, self.control_port, self.prober.as_deref())?;
        settings.push(TorSetting::new(TorKeyword::ControlPortEphemeral, control_port.to_string()));

        let socks_port = resolve_port(TorKeyword::SocksPortEphemeral, self.socks_port, self.prober.as_deref())?;
        let mut socks = TorSetting::new(TorKeyword::SocksPortEphemeral, socks_port.to_string());
        socks.items[0].optionals = self.socks_flags;
        settings.push(socks);

        for (keyword, value) in self.extra_listeners {
            let value = resolve_port(keyword, value, self.prober.as_deref())?;
            match settings.iter().position(|s| s.keyword == keyword) {
                Some(idx) => settings[idx]
                    .items
                    .push(crate::settings::LineItem::new(value.to_string())),
                None => settings.push(TorSetting::new(keyword, value.to_string())),
            }
        }

        if let Some(geoip) = self.geoip_file {
            settings.push(TorSetting::new(TorKeyword::GeoIpFile, geoip.display().to_string()));
        }
        if let Some(geoip6) = self.geoip6_file {
            settings.push(TorSetting::new(TorKeyword::GeoIpv6File, geoip6.display().to_string()));
        }
        if let Some(dir) = self.client_onion_auth_dir {
            settings.push(TorSetting::new(
                TorKeyword::ClientOnionAuthDir,
                dir.display().to_string(),
            ));
        }
        for line in self.log_lines {
            match settings.iter().position(|s| s.keyword == TorKeyword::Log) {
                Some(idx) => settings[idx].items.push(crate::settings::LineItem::new(line)),
                None => settings.push(TorSetting::new(TorKeyword::Log, line)),
            }
        }

        for setting in self.overrides {
            for item in &setting.items {
                if setting.keyword.is_listener_port() {
                    let value: TorPortValue = item.argument.parse()?;
                    value.validate_for(setting.keyword)?;
                }
            }
            match settings.iter().position(|s| s.keyword == setting.keyword) {
                Some(idx) if !setting.keyword.is_multi_valued() => settings[idx] = setting,
                Some(idx) => settings[idx].items.extend(setting.items),
                None => settings.push(setting),
            }
        }

        // Hidden service blocks last, each one contiguous.
        for hs in self.hidden_services {
            settings.extend(hs.to_settings()?);
        }

        Ok(TorConfig::from_settings(settings))
    }
}

fn resolve_port(
    keyword: TorKeyword,
    value: TorPortValue,
    prober: Option<&dyn PortProber>,
) -> Result<TorPortValue, ConfigError> {
    value.validate_for(keyword)?;
    match (&value, prober) {
        (TorPortValue::Port(port), Some(prober)) if !prober.is_free(*port) => {
            warn!(
                target: LOG_TARGET,
                "Requested {} {} is in use. Falling back to automatic port selection", keyword, port
            );
            Ok(TorPortValue::Auto)
        },
        _ => Ok(value),
    }
}

impl TorConfig {
    /// Typed accessors used by the runtime to locate its scoped files.
    pub fn data_directory(&self) -> Option<PathBuf> {
        self.first_value(TorKeyword::DataDirectory).map(PathBuf::from)
    }

    pub fn cookie_auth_file(&self) -> Option<PathBuf> {
        self.first_value(TorKeyword::CookieAuthFile).map(PathBuf::from)
    }

    pub fn control_port_file(&self) -> Option<PathBuf> {
        self.first_value(TorKeyword::ControlPortWriteToFile).map(PathBuf::from)
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;
    use crate::hidden_service::HsPort;

    struct EverythingTaken;
    impl PortProber for EverythingTaken {
        fn is_free(&self, _port: u16) -> bool {
            false
        }
    }

    struct EverythingFree;
    impl PortProber for EverythingFree {
        fn is_free(&self, _port: u16) -> bool {
            true
        }
    }

    #[test]
    fn seeds_the_minimum_startup_subset() {
        let config = TorConfigBuilder::for_base_dir("/work/tor").build().unwrap();
        assert_eq!(config.first_value(TorKeyword::DataDirectory), Some("/work/tor/data"));
        assert_eq!(config.first_value(TorKeyword::CacheDirectory), Some("/work/tor/cache"));
        assert_eq!(
            config.first_value(TorKeyword::CookieAuthFile),
            Some("/work/tor/data/control_auth_cookie")
        );
        assert_eq!(
            config.first_value(TorKeyword::ControlPortWriteToFile),
            Some("/work/tor/control.txt")
        );
        assert_eq!(config.first_value(TorKeyword::ControlPortEphemeral), Some("auto"));
        assert_eq!(config.first_value(TorKeyword::SocksPortEphemeral), Some("auto"));
        assert_eq!(config.first_value(TorKeyword::DisableNetwork), Some("1"));
        assert_eq!(config.first_value(TorKeyword::RunAsDaemon), Some("0"));
        assert_eq!(
            config.first_value(TorKeyword::OwningControllerProcess),
            Some(std::process::id().to_string().as_str())
        );
    }

    #[test]
    fn occupied_ports_fall_back_to_auto() {
        let config = TorConfigBuilder::for_base_dir("/work/tor")
            .socks_port(9050)
            .control_port(9051)
            .with_port_prober(Box::new(EverythingTaken))
            .build()
            .unwrap();
        assert_eq!(config.first_value(TorKeyword::SocksPortEphemeral), Some("auto"));
        assert_eq!(config.first_value(TorKeyword::ControlPortEphemeral), Some("auto"));
    }

    #[test]
    fn free_ports_are_kept() {
        let config = TorConfigBuilder::for_base_dir("/work/tor")
            .socks_port(9050)
            .with_port_prober(Box::new(EverythingFree))
            .build()
            .unwrap();
        assert_eq!(config.first_value(TorKeyword::SocksPortEphemeral), Some("9050"));
    }

    #[test]
    fn hidden_services_accumulate_and_stay_contiguous() {
        let config = TorConfigBuilder::for_base_dir("/work/tor")
            .hidden_service(HiddenServiceConfig::new("/work/tor/hs1").with_port(80))
            .hidden_service(
                HiddenServiceConfig::new("/work/tor/hs2")
                    .with_port(HsPort::new(443, "127.0.0.1:8443".parse().unwrap())),
            )
            .build()
            .unwrap();

        let hs_keywords: Vec<_> = config
            .settings()
            .iter()
            .filter(|s| s.keyword.is_hidden_service())
            .map(|s| (s.keyword, s.value().to_string()))
            .collect();
        assert_eq!(hs_keywords, vec![
            (TorKeyword::HiddenServiceDir, "/work/tor/hs1".to_string()),
            (TorKeyword::HiddenServiceVersion, "3".to_string()),
            (TorKeyword::HiddenServicePort, "80".to_string()),
            (TorKeyword::HiddenServiceDir, "/work/tor/hs2".to_string()),
            (TorKeyword::HiddenServiceVersion, "3".to_string()),
            (TorKeyword::HiddenServicePort, "443".to_string()),
        ]);
    }

    #[test]
    fn invalid_hidden_service_fails_build() {
        let err = TorConfigBuilder::for_base_dir("/work/tor")
            .hidden_service(HiddenServiceConfig::new("/work/tor/hs1"))
            .build()
            .unwrap_err();
        unpack_enum!(ConfigError::HiddenServiceNoPorts = err);
    }

    #[test]
    fn put_replaces_single_valued_and_accumulates_multi_valued() {
        let config = TorConfigBuilder::for_base_dir("/work/tor")
            .put(TorSetting::new(TorKeyword::DormantOnFirstStartup, "1"))
            .put(TorSetting::new(TorKeyword::DormantOnFirstStartup, "0"))
            .put(TorSetting::new(TorKeyword::DnsPort, "5353"))
            .put(TorSetting::new(TorKeyword::DnsPort, "5354"))
            .build()
            .unwrap();
        assert_eq!(config.first_value(TorKeyword::DormantOnFirstStartup), Some("0"));
        let dns = config.get(TorKeyword::DnsPort).unwrap();
        assert_eq!(dns.items.len(), 2);
    }

    #[test]
    fn unix_socket_listener_rejected_for_dns_override() {
        let err = TorConfigBuilder::for_base_dir("/work/tor")
            .put(TorSetting::new(TorKeyword::DnsPort, "unix:/run/dns.sock"))
            .build()
            .unwrap_err();
        unpack_enum!(ConfigError::UnixSocketUnsupported(_kw) = err);
    }

    #[test]
    fn full_config_round_trips_through_torrc() {
        let config = TorConfigBuilder::for_base_dir("/work/tor")
            .socks_port(9050)
            .socks_flags(["OnionTrafficOnly"])
            .dns_port(TorPortValue::Auto)
            .log("notice stdout")
            .hidden_service(HiddenServiceConfig::new("/work/tor/hs1").with_port(80))
            .build()
            .unwrap();
        let parsed = TorConfig::parse(&config.to_torrc()).unwrap();
        assert_eq!(parsed, config);
    }
}
