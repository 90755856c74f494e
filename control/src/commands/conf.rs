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

//! GETCONF / SETCONF / RESETCONF / LOADCONF / SAVECONF.

use super::{quote_string, TorCommand};
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, ResponseLine},
};

/// tor's reply to `GETCONF keyword`: the keyword, its argument string, and
/// whether the value is the keyword's default (signalled by a bare keyword or
/// an empty argument).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub keyword: String,
    pub value: String,
    pub is_default: bool,
}

/// The GETCONF command.
pub struct GetConf {
    keys: Vec<String>,
}

impl GetConf {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl TorCommand for GetConf {
    type Output = Vec<ConfigEntry>;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("GETCONF {}", self.keys.join(" "))))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)?;
        let mut entries = Vec::with_capacity(responses.len());
        for line in &responses {
            // Every line of a successful GETCONF reply carries a value
            let entry = match line.value.split_once('=') {
                Some((keyword, value)) => ConfigEntry {
                    keyword: keyword.to_string(),
                    value: value.to_string(),
                    is_default: value.is_empty(),
                },
                None => ConfigEntry {
                    keyword: line.value.clone(),
                    value: String::new(),
                    is_default: true,
                },
            };
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// The SETCONF command. An entry with no value resets that keyword.
pub struct SetConf {
    entries: Vec<(String, Option<String>)>,
}

impl SetConf {
    pub fn new<K: Into<String>, V: Into<String>>(keyword: K, value: V) -> Self {
        Self {
            entries: vec![(keyword.into(), Some(value.into()))],
        }
    }

    pub fn with_entries(entries: Vec<(String, Option<String>)>) -> Self {
        Self { entries }
    }
}

impl TorCommand for SetConf {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format_conf_line("SETCONF", &self.entries)))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The RESETCONF command.
pub struct ResetConf {
    keys: Vec<String>,
}

impl ResetConf {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl TorCommand for ResetConf {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("RESETCONF {}", self.keys.join(" "))))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The LOADCONF command: replaces the running configuration with the given
/// torrc text, sent as a data block.
pub struct LoadConf {
    text: String,
}

impl LoadConf {
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self { text: text.into() }
    }
}

impl TorCommand for LoadConf {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::with_data("+LOADCONF", self.text.clone()))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The SAVECONF command.
pub struct SaveConf {
    force: bool,
}

impl SaveConf {
    pub fn new(force: bool) -> Self {
        Self { force }
    }
}

impl TorCommand for SaveConf {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let line = if self.force { "SAVECONF FORCE" } else { "SAVECONF" };
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

fn format_conf_line(verb: &str, entries: &[(String, Option<String>)]) -> String {
    let mut line = verb.to_string();
    for (keyword, value) in entries {
        line.push(' ');
        line.push_str(keyword);
        if let Some(value) = value {
            line.push('=');
            if value.chars().any(|c| c.is_whitespace() || c == '"') || value.is_empty() {
                line.push_str(&quote_string(value));
            } else {
                line.push_str(value);
            }
        }
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;

    fn lines(lines: &[(u16, bool, &str)]) -> Vec<ResponseLine> {
        lines
            .iter()
            .map(|(code, is_end, value)| ResponseLine::new(*code, *is_end, value.to_string()))
            .collect()
    }

    #[test]
    fn getconf_groups_entries_and_flags_defaults() {
        let cmd = GetConf::new(["SocksPort", "DNSPort", "ORPort"]);
        assert_eq!(cmd.to_wire_command().unwrap().line, "GETCONF SocksPort DNSPort ORPort");

        let entries = cmd
            .parse_responses(lines(&[
                (250, false, "SocksPort=9050"),
                (250, false, "DNSPort"),
                (250, true, "ORPort="),
            ]))
            .unwrap();
        assert_eq!(entries, vec![
            ConfigEntry {
                keyword: "SocksPort".to_string(),
                value: "9050".to_string(),
                is_default: false,
            },
            ConfigEntry {
                keyword: "DNSPort".to_string(),
                value: String::new(),
                is_default: true,
            },
            ConfigEntry {
                keyword: "ORPort".to_string(),
                value: String::new(),
                is_default: true,
            },
        ]);
    }

    #[test]
    fn getconf_propagates_errors() {
        let cmd = GetConf::new(["dummy"]);
        let err = cmd
            .parse_responses(lines(&[(552, true, "Unrecognized configuration key \"dummy\"")]))
            .unwrap_err();
        match err {
            ControlError::Tor5xx { code, .. } => assert_eq!(code, 552),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn setconf_quotes_values_with_whitespace() {
        let cmd = SetConf::with_entries(vec![
            ("DisableNetwork".to_string(), Some("0".to_string())),
            ("Log".to_string(), Some("notice file /tmp/a b.log".to_string())),
            ("DNSPort".to_string(), None),
        ]);
        assert_eq!(
            cmd.to_wire_command().unwrap().line,
            "SETCONF DisableNetwork=0 Log=\"notice file /tmp/a b.log\" DNSPort"
        );
    }

    #[test]
    fn loadconf_sends_a_data_block() {
        let cmd = LoadConf::new("SocksPort 9050\nDisableNetwork 0\n");
        let wire = cmd.to_wire_command().unwrap();
        assert_eq!(wire.line, "+LOADCONF");
        assert_eq!(wire.data.as_deref(), Some("SocksPort 9050\nDisableNetwork 0\n"));
    }

    #[test]
    fn saveconf_force() {
        assert_eq!(SaveConf::new(false).to_wire_command().unwrap().line, "SAVECONF");
        assert_eq!(SaveConf::new(true).to_wire_command().unwrap().line, "SAVECONF FORCE");
    }
}
