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

//! ADD_ONION / DEL_ONION.

use std::num::NonZeroU16;

use bitflags::bitflags;
use embedtor_config::{HsPort, HsPrivateKey, OnionAddressV3, X25519PublicKey};

use super::TorCommand;
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, key_value, ResponseLine},
};

bitflags! {
    /// Flags accepted by ADD_ONION.
    pub struct AddOnionFlags: u32 {
        /// Omit the private key from the reply.
        const DISCARD_PK = 0b0000_0001;
        /// Keep the service alive after this control connection closes.
        const DETACH = 0b0000_0010;
        /// Require v3 client authorization.
        const V3AUTH = 0b0000_0100;
        /// Non-anonymous single onion service mode.
        const NON_ANONYMOUS = 0b0000_1000;
        /// Close the circuit when the stream limit is reached.
        const MAX_STREAMS_CLOSE_CIRCUIT = 0b0001_0000;
    }
}

impl AddOnionFlags {
    fn to_wire(self) -> String {
        let mut names = Vec::new();
        if self.contains(AddOnionFlags::DISCARD_PK) {
            names.push("DiscardPK");
        }
        if self.contains(AddOnionFlags::DETACH) {
            names.push("Detach");
        }
        if self.contains(AddOnionFlags::V3AUTH) {
            names.push("V3Auth");
        }
        if self.contains(AddOnionFlags::NON_ANONYMOUS) {
            names.push("NonAnonymous");
        }
        if self.contains(AddOnionFlags::MAX_STREAMS_CLOSE_CIRCUIT) {
            names.push("MaxStreamsCloseCircuit");
        }
        names.join(",")
    }
}

/// The key argument of ADD_ONION: have tor generate a fresh v3 identity, or
/// re-create a service from a previously returned key blob.
#[derive(Debug, Clone)]
pub enum AddOnionKey {
    New,
    FromKey(HsPrivateKey),
}

/// The ADD_ONION command: create an ephemeral onion service.
#[derive(Debug, Clone)]
pub struct AddOnion {
    key: AddOnionKey,
    flags: AddOnionFlags,
    num_streams: Option<NonZeroU16>,
    ports: Vec<HsPort>,
    client_auth_v3: Vec<X25519PublicKey>,
}

impl AddOnion {
    pub fn new<P: Into<HsPort>>(key: AddOnionKey, port: P) -> Self {
        Self {
            key,
            flags: AddOnionFlags::empty(),
            num_streams: None,
            ports: vec![port.into()],
            client_auth_v3: Vec::new(),
        }
    }

    pub fn with_port<P: Into<HsPort>>(mut self, port: P) -> Self {
        self.ports.push(port.into());
        self
    }

    pub fn with_flags(mut self, flags: AddOnionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_num_streams(mut self, num_streams: NonZeroU16) -> Self {
        self.num_streams = Some(num_streams);
        self
    }

    pub fn with_client_auth(mut self, key: X25519PublicKey) -> Self {
        self.client_auth_v3.push(key);
        self
    }

    pub fn discards_private_key(&self) -> bool {
        self.flags.contains(AddOnionFlags::DISCARD_PK)
    }
}

impl TorCommand for AddOnion {
    type Output = HiddenServiceEntry;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let mut s = String::from("ADD_ONION ");
        match &self.key {
            AddOnionKey::New => s.push_str("NEW:ED25519-V3"),
            AddOnionKey::FromKey(key) => s.push_str(&key.to_key_blob()),
        }
        if !self.flags.is_empty() {
            s.push_str(&format!(" Flags={}", self.flags.to_wire()));
        }
        if let Some(num_streams) = self.num_streams {
            s.push_str(&format!(" NumStreams={}", num_streams));
        }
        for port in &self.ports {
            s.push_str(&format!(" Port={},{}", port.virtual_port, port.target));
        }
        for key in &self.client_auth_v3 {
            s.push_str(&format!(" ClientAuthV3={}", key.to_base32()));
        }
        Ok(WireCommand::new(s).sensitive())
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)?;

        let mut service_id = None;
        let mut private_key = None;
        let mut client_auth = Vec::new();
        for line in responses.iter().filter(|l| !l.is_end) {
            let (key, value) = key_value(&line.value)?;
            match key {
                "ServiceID" => {
                    service_id = Some(value.parse::<OnionAddressV3>()?);
                },
                "PrivateKey" => {
                    private_key = Some(HsPrivateKey::from_key_blob(value)?);
                },
                "ClientAuthV3" => {
                    client_auth.push(value.parse::<X25519PublicKey>()?);
                },
                _ => {
                    // Ignore keys we don't understand
                },
            }
        }

        let service_id = service_id
            .ok_or_else(|| ControlError::ParseReply("ADD_ONION reply had no ServiceID".to_string()))?;
        HiddenServiceEntry::new(service_id, private_key, client_auth)
    }
}

/// The DEL_ONION command.
pub struct DelOnion {
    service_id: OnionAddressV3,
}

impl DelOnion {
    pub fn new(service_id: OnionAddressV3) -> Self {
        Self { service_id }
    }
}

impl TorCommand for DelOnion {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("DEL_ONION {}", self.service_id)))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

/// An onion service as returned by ADD_ONION. The private key is absent when
/// the `DiscardPK` flag was set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenServiceEntry {
    pub service_id: OnionAddressV3,
    pub private_key: Option<HsPrivateKey>,
    pub client_auth: Vec<X25519PublicKey>,
}

impl HiddenServiceEntry {
    pub fn new(
        service_id: OnionAddressV3,
        private_key: Option<HsPrivateKey>,
        client_auth: Vec<X25519PublicKey>,
    ) -> Result<Self, ControlError> {
        if let Some(key) = &private_key {
            key.matches_address(&service_id)?;
        }
        Ok(Self {
            service_id,
            private_key,
            client_auth,
        })
    }
}
