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

use std::collections::HashMap;

use super::TorCommand;
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, ResponseLine},
};

/// The GETINFO command. Inline replies accumulate as `key=value`; a `+` data
/// block becomes the value of the key introduced on its line.
pub struct GetInfo {
    keys: Vec<String>,
}

impl GetInfo {
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

impl TorCommand for GetInfo {
    type Output = HashMap<String, String>;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("GETINFO {}", self.keys.join(" "))))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)?;
        let mut values = HashMap::new();
        for line in responses {
            // The final "250 OK" closes the reply and carries no value
            if line.is_end && line.value == "OK" {
                continue;
            }
            let (key, inline) = line
                .value
                .split_once('=')
                .ok_or_else(|| ControlError::ParseReply(format!("GETINFO reply line '{}'", line.value)))?;
            let value = match line.data {
                Some(data) => data.join("\n"),
                None => inline.to_string(),
            };
            values.insert(key.to_string(), value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_form_joins_keys() {
        let cmd = GetInfo::new(["version", "uptime"]);
        assert_eq!(cmd.to_wire_command().unwrap().line, "GETINFO version uptime");
    }

    #[test]
    fn accumulates_inline_values() {
        let cmd = GetInfo::new(["version", "uptime"]);
        let values = cmd
            .parse_responses(vec![
                ResponseLine::new(250, false, "version=0.4.8.9".to_string()),
                ResponseLine::new(250, false, "uptime=120".to_string()),
                ResponseLine::new(250, true, "OK".to_string()),
            ])
            .unwrap();
        assert_eq!(values.get("version").map(String::as_str), Some("0.4.8.9"));
        assert_eq!(values.get("uptime").map(String::as_str), Some("120"));
    }

    #[test]
    fn data_block_becomes_the_value_of_its_key() {
        let cmd = GetInfo::new(["onions/detached"]);
        let mut line = ResponseLine::new(250, false, "onions/detached=".to_string());
        line.data = Some(vec!["addr-one".to_string(), "addr-two".to_string()]);
        let values = cmd
            .parse_responses(vec![line, ResponseLine::new(250, true, "OK".to_string())])
            .unwrap();
        assert_eq!(
            values.get("onions/detached").map(String::as_str),
            Some("addr-one\naddr-two")
        );
    }

    #[test]
    fn unknown_key_error_propagates() {
        let cmd = GetInfo::new(["bogus"]);
        let err = cmd
            .parse_responses(vec![ResponseLine::new(
                552,
                true,
                "Unrecognized key \"bogus\"".to_string(),
            )])
            .unwrap_err();
        match err {
            ControlError::Tor5xx { code, .. } => assert_eq!(code, 552),
            other => panic!("unexpected {:?}", other),
        }
    }
}
