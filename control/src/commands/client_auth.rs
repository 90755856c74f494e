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

//! ONION_CLIENT_AUTH_ADD / REMOVE / VIEW.

use embedtor_config::{OnionAddressV3, X25519PrivateKey};

use super::{quote_string, TorCommand};
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, ResponseLine},
};

/// A client authorization credential as listed by ONION_CLIENT_AUTH_VIEW.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAuthEntry {
    pub address: OnionAddressV3,
    pub key: X25519PrivateKey,
    pub client_name: Option<String>,
    pub permanent: bool,
}

/// The ONION_CLIENT_AUTH_ADD command.
#[derive(Debug, Clone)]
pub struct OnionClientAuthAdd {
    address: OnionAddressV3,
    key: X25519PrivateKey,
    client_name: Option<String>,
    permanent: bool,
}

impl OnionClientAuthAdd {
    pub fn new(address: OnionAddressV3, key: X25519PrivateKey) -> Self {
        Self {
            address,
            key,
            client_name: None,
            permanent: false,
        }
    }

    pub fn with_client_name<S: Into<String>>(mut self, name: S) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }
}

impl TorCommand for OnionClientAuthAdd {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let mut s = format!("ONION_CLIENT_AUTH_ADD {} x25519:{}", self.address, self.key.to_base64());
        if let Some(name) = &self.client_name {
            s.push_str(&format!(" ClientName={}", quote_string(name)));
        }
        if self.permanent {
            s.push_str(" Flags=Permanent");
        }
        Ok(WireCommand::new(s).sensitive())
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The ONION_CLIENT_AUTH_REMOVE command.
pub struct OnionClientAuthRemove {
    address: OnionAddressV3,
}

impl OnionClientAuthRemove {
    pub fn new(address: OnionAddressV3) -> Self {
        Self { address }
    }
}

impl TorCommand for OnionClientAuthRemove {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("ONION_CLIENT_AUTH_REMOVE {}", self.address)))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// The ONION_CLIENT_AUTH_VIEW command. Without an address, lists every
/// credential tor has loaded.
pub struct OnionClientAuthView {
    address: Option<OnionAddressV3>,
}

impl OnionClientAuthView {
    pub fn new(address: Option<OnionAddressV3>) -> Self {
        Self { address }
    }
}

impl TorCommand for OnionClientAuthView {
    type Output = Vec<ClientAuthEntry>;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let line = match &self.address {
            Some(address) => format!("ONION_CLIENT_AUTH_VIEW {}", address),
            None => "ONION_CLIENT_AUTH_VIEW".to_string(),
        };
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)?;
        let mut entries = Vec::new();
        for line in responses.iter().filter(|l| !l.is_end) {
            let rest = match line.value.strip_prefix("CLIENT ") {
                Some(rest) => rest,
                // The first line echoes the queried address
                None => continue,
            };
            let mut words = rest.split_whitespace();
            let address = words
                .next()
                .ok_or_else(|| ControlError::ParseReply("CLIENT line missing address".to_string()))?
                .parse::<OnionAddressV3>()?;
            let key_spec = words
                .next()
                .ok_or_else(|| ControlError::ParseReply("CLIENT line missing key".to_string()))?;
            let key = key_spec
                .strip_prefix("x25519:")
                .ok_or_else(|| ControlError::ParseReply(format!("unexpected key type '{}'", key_spec)))?
                .parse::<X25519PrivateKey>()?;

            let mut client_name = None;
            let mut permanent = false;
            for word in words {
                if let Some(name) = word.strip_prefix("ClientName=") {
                    client_name = Some(name.to_string());
                } else if let Some(flags) = word.strip_prefix("Flags=") {
                    permanent = flags.split(',').any(|f| f == "Permanent");
                }
            }
            entries.push(ClientAuthEntry {
                address,
                key,
                client_name,
                permanent,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_server::canned_responses::SERVICE_ID;

    fn key() -> X25519PrivateKey {
        X25519PrivateKey::from_bytes(&[5u8; 32]).unwrap()
    }

    #[test]
    fn add_wire_form_is_sensitive() {
        let cmd = OnionClientAuthAdd::new(SERVICE_ID.parse().unwrap(), key())
            .with_client_name("alice")
            .permanent();
        let wire = cmd.to_wire_command().unwrap();
        assert_eq!(
            wire.line,
            format!(
                "ONION_CLIENT_AUTH_ADD {} x25519:{} ClientName=\"alice\" Flags=Permanent",
                SERVICE_ID,
                key().to_base64()
            )
        );
        assert_eq!(wire.to_string(), "ONION_CLIENT_AUTH_ADD <redacted>");
    }

    #[test]
    fn remove_wire_form() {
        let cmd = OnionClientAuthRemove::new(SERVICE_ID.parse().unwrap());
        assert_eq!(
            cmd.to_wire_command().unwrap().line,
            format!("ONION_CLIENT_AUTH_REMOVE {}", SERVICE_ID)
        );
    }

    #[test]
    fn view_parses_client_lines() {
        let cmd = OnionClientAuthView::new(None);
        assert_eq!(cmd.to_wire_command().unwrap().line, "ONION_CLIENT_AUTH_VIEW");

        let entries = cmd
            .parse_responses(vec![
                ResponseLine::new(250, false, "ONION_CLIENT_AUTH_VIEW".to_string()),
                ResponseLine::new(
                    250,
                    false,
                    format!(
                        "CLIENT {} x25519:{} ClientName=alice Flags=Permanent",
                        SERVICE_ID,
                        key().to_base64()
                    ),
                ),
                ResponseLine::new(250, true, "OK".to_string()),
            ])
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address.as_str(), SERVICE_ID);
        assert_eq!(entries[0].key, key());
        assert_eq!(entries[0].client_name.as_deref(), Some("alice"));
        assert!(entries[0].permanent);
    }
}
