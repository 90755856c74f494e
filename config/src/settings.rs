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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, keyword::TorKeyword};

/// One emitted torrc line belonging to a setting: a primary argument plus any
/// trailing arguments ("flags" such as `OnionTrafficOnly`, or the target of a
/// `HiddenServicePort`).
///
/// Arguments are stored raw (unescaped). Rendering applies quoting where the
/// torrc grammar requires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub argument: String,
    pub optionals: Vec<String>,
}

impl LineItem {
    pub fn new<T: Into<String>>(argument: T) -> Self {
        Self {
            argument: argument.into(),
            optionals: Vec::new(),
        }
    }

    pub fn with_optionals<T, I, S>(argument: T, optionals: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argument: argument.into(),
            optionals: optionals.into_iter().map(Into::into).collect(),
        }
    }

    fn fmt_line(&self, keyword: TorKeyword, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", keyword, render_arg(&self.argument))?;
        for opt in &self.optionals {
            write!(f, " {}", render_arg(opt))?;
        }
        writeln!(f)
    }
}

/// A keyword together with its line items. Multi-valued keywords carry one item
/// per emitted line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorSetting {
    pub keyword: TorKeyword,
    pub items: Vec<LineItem>,
}

impl TorSetting {
    pub fn new<T: Into<String>>(keyword: TorKeyword, argument: T) -> Self {
        Self {
            keyword,
            items: vec![LineItem::new(argument)],
        }
    }

    pub fn with_items(keyword: TorKeyword, items: Vec<LineItem>) -> Self {
        Self { keyword, items }
    }

    /// The first item's primary argument.
    pub fn value(&self) -> &str {
        self.items
            .first()
            .map(|item| item.argument.as_str())
            .unwrap_or_default()
    }
}

/// An ordered, validated set of tor settings, serializable to torrc text.
///
/// Construction goes through [TorConfigBuilder](crate::builder::TorConfigBuilder)
/// or [TorConfig::parse]; both enforce the hidden-service block contiguity and
/// listener value invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorConfig {
    settings: Vec<TorSetting>,
}

impl TorConfig {
    pub(crate) fn from_settings(settings: Vec<TorSetting>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &[TorSetting] {
        &self.settings
    }

    /// The first setting with the given keyword, if any.
    pub fn get(&self, keyword: TorKeyword) -> Option<&TorSetting> {
        self.settings.iter().find(|s| s.keyword == keyword)
    }

    /// The primary argument of the first setting with the given keyword.
    pub fn first_value(&self, keyword: TorKeyword) -> Option<&str> {
        self.get(keyword).map(|s| s.value())
    }

    pub fn to_torrc(&self) -> String {
        self.to_string()
    }

    /// The reduced configuration sufficient to launch the process with
    /// networking disabled. The full configuration is applied afterwards over
    /// the control channel with LOADCONF.
    pub fn minimum_startup_subset(&self) -> TorConfig {
        use TorKeyword::*;
        let keep = [
            DataDirectory,
            CacheDirectory,
            ControlPortWriteToFile,
            CookieAuthFile,
            CookieAuthentication,
            SocksPortEphemeral,
            ControlPortEphemeral,
            OwningControllerProcess,
        ];
        let mut settings: Vec<TorSetting> = self
            .settings
            .iter()
            .filter(|s| keep.contains(&s.keyword))
            .cloned()
            .collect();
        // Networking stays off and the torrc must never be reloaded behind the
        // controller's back during startup.
        settings.push(TorSetting::new(DisableNetwork, "1"));
        settings.push(TorSetting::new(RunAsDaemon, "0"));
        settings.push(TorSetting::new(ReloadTorrcOnSighup, "0"));
        TorConfig { settings }
    }

    /// Strict parse of torrc text produced by [TorConfig::to_torrc]. Unknown
    /// keywords, malformed quoting and orphaned hidden-service lines are errors.
    pub fn parse(text: &str) -> Result<TorConfig, ConfigError> {
        let mut settings: Vec<TorSetting> = Vec::new();
        let mut pending = String::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            // Trailing-backslash continuation joins onto the next line.
            if let Some(stripped) = raw_line.strip_suffix('\\') {
                pending.push_str(stripped);
                continue;
            }
            let joined = if pending.is_empty() {
                raw_line.to_string()
            } else {
                let mut s = std::mem::take(&mut pending);
                s.push_str(raw_line);
                s
            };
            let line = joined.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (kw_str, rest) = match line.split_once(char::is_whitespace) {
                Some((kw, rest)) => (kw, rest.trim()),
                None => (line, ""),
            };
            let keyword = kw_str.parse::<TorKeyword>()?;
            let args = tokenize_args(rest).map_err(|reason| ConfigError::TorrcParse { line: line_no, reason })?;
            if args.is_empty() {
                return Err(ConfigError::TorrcParse {
                    line: line_no,
                    reason: format!("'{}' has no value", keyword),
                });
            }
            let item = LineItem::with_optionals(args[0].clone(), args[1..].to_vec());

            if keyword.is_hidden_service() && keyword != TorKeyword::HiddenServiceDir {
                // Hidden service lines attach to the block opened by the most
                // recent setting, which must be part of one.
                match settings.last() {
                    Some(prev) if prev.keyword.is_hidden_service() => {},
                    _ => {
                        return Err(ConfigError::TorrcParse {
                            line: line_no,
                            reason: format!("'{}' outside a HiddenServiceDir block", keyword),
                        })
                    },
                }
            }

            let extends_previous =
                matches!(settings.last(), Some(last) if last.keyword == keyword && keyword.is_multi_valued());
            if extends_previous {
                settings.last_mut().expect("checked above").items.push(item);
            } else {
                settings.push(TorSetting::with_items(keyword, vec![item]));
            }
        }
        if !pending.is_empty() {
            return Err(ConfigError::TorrcParse {
                line: text.lines().count(),
                reason: "dangling line continuation".to_string(),
            });
        }
        Ok(TorConfig { settings })
    }
}

impl fmt::Display for TorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for setting in &self.settings {
            for item in &setting.items {
                item.fmt_line(setting.keyword, f)?;
            }
        }
        Ok(())
    }
}

/// Render one argument for a torrc line. `unix:` listener values carry their own
/// quoting; anything containing whitespace, quotes or backslashes is wrapped in
/// C-escaped double quotes.
fn render_arg(raw: &str) -> String {
    if let Some(path) = raw.strip_prefix("unix:") {
        return format!("unix:\"{}\"", path);
    }
    let needs_quoting =
        raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '#');
    if !needs_quoting {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Split a torrc value into raw arguments, undoing [render_arg]'s quoting. A
/// double quote opens an escaped span anywhere within a token, which is how
/// `unix:"/path with spaces"` stays a single argument.
fn tokenize_args(rest: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = rest.chars();
    loop {
        let c = match chars.next() {
            Some(c) => c,
            None => break,
        };
        if c.is_whitespace() && in_token {
            args.push(std::mem::take(&mut current));
            in_token = false;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        in_token = true;
        if c != '"' {
            current.push(c);
            continue;
        }
        // Quoted span with C-style escapes
        loop {
            match chars.next() {
                Some('"') => break,
                Some('\\') => match chars.next() {
                    Some('\\') => current.push('\\'),
                    Some('"') => current.push('"'),
                    Some('n') => current.push('\n'),
                    Some('r') => current.push('\r'),
                    Some('t') => current.push('\t'),
                    Some(other) => return Err(format!("unknown escape '\\{}'", other)),
                    None => return Err("unterminated escape".to_string()),
                },
                Some(other) => current.push(other),
                None => return Err("unterminated quoted value".to_string()),
            }
        }
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_plain_and_quoted_args() {
        assert_eq!(render_arg("9050"), "9050");
        assert_eq!(render_arg("/var/lib/tor"), "/var/lib/tor");
        assert_eq!(render_arg("/Application Support/tor"), "\"/Application Support/tor\"");
        assert_eq!(render_arg("a\"b"), "\"a\\\"b\"");
        assert_eq!(render_arg("unix:/run/tor control.sock"), "unix:\"/run/tor control.sock\"");
    }

    #[test]
    fn tokenizes_quoted_spans() {
        let args = tokenize_args("9050 \"/a b/c\" unix:\"/x y\" Flag").unwrap();
        assert_eq!(args, vec!["9050", "/a b/c", "unix:/x y", "Flag"]);
        tokenize_args("\"unterminated").unwrap_err();
    }

    #[test]
    fn serializes_in_insertion_order() {
        let config = TorConfig::from_settings(vec![
            TorSetting::new(TorKeyword::DataDirectory, "/var/lib/tor/data"),
            TorSetting::with_items(
                TorKeyword::SocksPort,
                vec![LineItem::new("9050"), LineItem::with_optionals("9150", ["OnionTrafficOnly"])],
            ),
        ]);
        assert_eq!(
            config.to_torrc(),
            "DataDirectory /var/lib/tor/data\nSocksPort 9050\nSocksPort 9150 OnionTrafficOnly\n"
        );
    }

    #[test]
    fn parse_round_trips() {
        let config = TorConfig::from_settings(vec![
            TorSetting::new(TorKeyword::DataDirectory, "/var/lib/my tor/data"),
            TorSetting::new(TorKeyword::ControlPortEphemeral, "unix:/run/tor/ctl.sock"),
            TorSetting::new(TorKeyword::DisableNetwork, "1"),
            TorSetting::with_items(
                TorKeyword::HiddenServiceDir,
                vec![LineItem::new("/var/lib/tor/hs1")],
            ),
            TorSetting::new(TorKeyword::HiddenServiceVersion, "3"),
            TorSetting::with_items(
                TorKeyword::HiddenServicePort,
                vec![LineItem::with_optionals("443", ["127.0.0.1:8443"])],
            ),
        ]);
        let parsed = TorConfig::parse(&config.to_torrc()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn parse_rejects_unknown_keyword_and_orphan_hs_lines() {
        TorConfig::parse("NotAThing 1\n").unwrap_err();
        let err = TorConfig::parse("HiddenServicePort 443 127.0.0.1:8443\n").unwrap_err();
        match err {
            ConfigError::TorrcParse { .. } => {},
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn parse_skips_comments_and_joins_continuations() {
        let parsed = TorConfig::parse("# a comment\n\nSocksPort \\\n9050\n").unwrap();
        assert_eq!(parsed.first_value(TorKeyword::SocksPort), Some("9050"));
    }

    #[test]
    fn minimum_subset_keeps_only_startup_keys_and_forces_network_off() {
        let config = TorConfig::from_settings(vec![
            TorSetting::new(TorKeyword::DataDirectory, "/d"),
            TorSetting::new(TorKeyword::CacheDirectory, "/c"),
            TorSetting::new(TorKeyword::ControlPortWriteToFile, "/d/control.txt"),
            TorSetting::new(TorKeyword::CookieAuthFile, "/d/cookie"),
            TorSetting::new(TorKeyword::CookieAuthentication, "1"),
            TorSetting::new(TorKeyword::SocksPortEphemeral, "auto"),
            TorSetting::new(TorKeyword::ControlPortEphemeral, "auto"),
            TorSetting::new(TorKeyword::OwningControllerProcess, "1234"),
            TorSetting::new(TorKeyword::DisableNetwork, "0"),
            TorSetting::with_items(TorKeyword::HiddenServiceDir, vec![LineItem::new("/hs")]),
            TorSetting::new(TorKeyword::HiddenServiceVersion, "3"),
            TorSetting::with_items(
                TorKeyword::HiddenServicePort,
                vec![LineItem::with_optionals("80", ["127.0.0.1:8080"])],
            ),
        ]);
        let subset = config.minimum_startup_subset();
        assert!(subset.get(TorKeyword::HiddenServiceDir).is_none());
        assert_eq!(subset.first_value(TorKeyword::DisableNetwork), Some("1"));
        assert_eq!(subset.first_value(TorKeyword::RunAsDaemon), Some("0"));
        assert_eq!(subset.first_value(TorKeyword::ReloadTorrcOnSighup), Some("0"));
        assert_eq!(subset.first_value(TorKeyword::OwningControllerProcess), Some("1234"));
    }
}
