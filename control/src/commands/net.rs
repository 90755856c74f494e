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

//! MAPADDRESS / RESOLVE / HSFETCH / DROPGUARDS.

use embedtor_config::OnionAddressV3;

use super::TorCommand;
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, key_value, ResponseLine},
};

/// The MAPADDRESS command. Replies echo one `old=new` mapping per line.
pub struct MapAddress {
    mappings: Vec<(String, String)>,
}

impl MapAddress {
    pub fn new(mappings: Vec<(String, String)>) -> Self {
        Self { mappings }
    }
}

impl TorCommand for MapAddress {
    type Output = Vec<(String, String)>;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let mut line = "MAPADDRESS".to_string();
        for (old, new) in &self.mappings {
            line.push_str(&format!(" {}={}", old, new));
        }
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)?;
        responses
            .iter()
            .map(|line| {
                let (old, new) = key_value(&line.value)?;
                Ok((old.to_string(), new.to_string()))
            })
            .collect()
    }
}

/// The RESOLVE command. Answers arrive asynchronously as ADDRMAP events.
pub struct Resolve {
    address: String,
    reverse: bool,
}

impl Resolve {
    pub fn new<S: Into<String>>(address: S, reverse: bool) -> Self {
        Self {
            address: address.into(),
            reverse,
        }
    }
}

impl TorCommand for Resolve {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let line = if self.reverse {
            format!("RESOLVE mode=reverse {}", self.address)
        } else {
            format!("RESOLVE {}", self.address)
        };
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The HSFETCH command: fetch a hidden service descriptor, optionally from
/// specific directory servers. Results arrive as HS_DESC events.
pub struct HsFetch {
    address: OnionAddressV3,
    servers: Vec<String>,
}

impl HsFetch {
    pub fn new(address: OnionAddressV3, servers: Vec<String>) -> Self {
        Self { address, servers }
    }
}

impl TorCommand for HsFetch {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let mut line = format!("HSFETCH {}", self.address);
        for server in &self.servers {
            line.push_str(&format!(" SERVER={}", server));
        }
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The DROPGUARDS command: discard the current entry guards.
pub struct DropGuards;

impl TorCommand for DropGuards {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new("DROPGUARDS"))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn map_address_round_trips() {
        let cmd = MapAddress::new(vec![
            ("1.2.3.4".to_string(), "torproject.org".to_string()),
            ("0.0.0.0".to_string(), "example.com".to_string()),
        ]);
        assert_eq!(
            cmd.to_wire_command().unwrap().line,
            "MAPADDRESS 1.2.3.4=torproject.org 0.0.0.0=example.com"
        );

        let mappings = cmd
            .parse_responses(vec![
                ResponseLine::new(250, false, "1.2.3.4=torproject.org".to_string()),
                ResponseLine::new(250, true, "127.192.10.10=example.com".to_string()),
            ])
            .unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[1], ("127.192.10.10".to_string(), "example.com".to_string()));
    }

    #[test]
    fn resolve_modes() {
        assert_eq!(
            Resolve::new("torproject.org", false).to_wire_command().unwrap().line,
            "RESOLVE torproject.org"
        );
        assert_eq!(
            Resolve::new("1.2.3.4", true).to_wire_command().unwrap().line,
            "RESOLVE mode=reverse 1.2.3.4"
        );
    }

    #[test]
    fn hs_fetch_with_servers() {
        let addr: OnionAddressV3 = crate::test_server::canned_responses::SERVICE_ID.parse().unwrap();
        let cmd = HsFetch::new(addr.clone(), vec!["longclaw".to_string()]);
        assert_eq!(
            cmd.to_wire_command().unwrap().line,
            format!("HSFETCH {} SERVER=longclaw", addr)
        );
    }
}
