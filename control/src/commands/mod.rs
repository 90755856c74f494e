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

//! The tor control command catalogue. Each command knows its wire form and how
//! to parse its reply lines into a typed output.

mod authenticate;
mod client_auth;
mod conf;
mod info;
mod net;
mod onion;
mod ownership;
mod set_events;
mod signal;

use std::collections::HashMap;

pub use authenticate::{Authenticate, Authentication};
pub use client_auth::{ClientAuthEntry, OnionClientAuthAdd, OnionClientAuthRemove, OnionClientAuthView};
pub use conf::{ConfigEntry, GetConf, LoadConf, ResetConf, SaveConf, SetConf};
use embedtor_config::OnionAddressV3;
pub use info::GetInfo;
pub use net::{DropGuards, HsFetch, MapAddress, Resolve};
pub use onion::{AddOnion, AddOnionFlags, AddOnionKey, DelOnion, HiddenServiceEntry};
pub use ownership::{DropOwnership, TakeOwnership};
pub use set_events::SetEvents;
pub use signal::{Signal, TorSignal};

use crate::{codec::WireCommand, error::ControlError, event::EventKind, response::ResponseLine};

/// A tor control command: its wire form plus a parser for its reply.
pub trait TorCommand {
    type Output;

    fn to_wire_command(&self) -> Result<WireCommand, ControlError>;

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError>;
}

/// Double-quote an argument with C-style escapes.
pub(crate) fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
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

/// A value-form descriptor for every command in the catalogue, used by callers
/// that enqueue commands generically rather than through the typed client
/// methods. Privileged variants are only ever submitted by the runtime itself.
#[derive(Debug, Clone)]
pub enum Command {
    Authenticate(Authentication),
    ConfigGet { keys: Vec<String> },
    ConfigLoad { text: String },
    ConfigReset { keys: Vec<String> },
    ConfigSave { force: bool },
    ConfigSet { entries: Vec<(String, Option<String>)> },
    DropGuards,
    HsFetch { address: OnionAddressV3, servers: Vec<String> },
    InfoGet { keys: Vec<String> },
    MapAddress { mappings: Vec<(String, String)> },
    OnionAdd(AddOnion),
    OnionDelete { service_id: OnionAddressV3 },
    OnionClientAuthAdd(OnionClientAuthAdd),
    OnionClientAuthRemove { address: OnionAddressV3 },
    OnionClientAuthView { address: Option<OnionAddressV3> },
    OwnershipDrop,
    OwnershipTake,
    Resolve { address: String, reverse: bool },
    SetEvents { kinds: Vec<EventKind> },
    Signal(TorSignal),
}

impl Command {
    /// Privileged commands are accepted only from the runtime, never from
    /// external callers.
    pub fn is_privileged(&self) -> bool {
        match self {
            Command::Authenticate(_) |
            Command::ConfigLoad { .. } |
            Command::OwnershipDrop |
            Command::OwnershipTake => true,
            Command::Signal(signal) => signal.is_privileged(),
            _ => false,
        }
    }

    /// The command's wire verb, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Authenticate(_) => "AUTHENTICATE",
            Command::ConfigGet { .. } => "GETCONF",
            Command::ConfigLoad { .. } => "LOADCONF",
            Command::ConfigReset { .. } => "RESETCONF",
            Command::ConfigSave { .. } => "SAVECONF",
            Command::ConfigSet { .. } => "SETCONF",
            Command::DropGuards => "DROPGUARDS",
            Command::HsFetch { .. } => "HSFETCH",
            Command::InfoGet { .. } => "GETINFO",
            Command::MapAddress { .. } => "MAPADDRESS",
            Command::OnionAdd(_) => "ADD_ONION",
            Command::OnionDelete { .. } => "DEL_ONION",
            Command::OnionClientAuthAdd(_) => "ONION_CLIENT_AUTH_ADD",
            Command::OnionClientAuthRemove { .. } => "ONION_CLIENT_AUTH_REMOVE",
            Command::OnionClientAuthView { .. } => "ONION_CLIENT_AUTH_VIEW",
            Command::OwnershipDrop => "DROPOWNERSHIP",
            Command::OwnershipTake => "TAKEOWNERSHIP",
            Command::Resolve { .. } => "RESOLVE",
            Command::SetEvents { .. } => "SETEVENTS",
            Command::Signal(_) => "SIGNAL",
        }
    }
}

/// The typed result of a generically-enqueued [Command].
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Unit,
    KeyValues(HashMap<String, String>),
    ConfigEntries(Vec<ConfigEntry>),
    HiddenService(HiddenServiceEntry),
    Mappings(Vec<(String, String)>),
    ClientAuthEntries(Vec<ClientAuthEntry>),
    /// SIGNAL NEWNYM success, with the rate-limit indication folded in when
    /// tor announced one.
    NewNym(NewNymStatus),
}

/// Outcome of a NEWNYM request. The signal itself succeeded; `rate_limited`
/// carries the delay tor announced when it deferred the circuit rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNymStatus {
    pub rate_limited: Option<std::time::Duration>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quotes_and_escapes() {
        assert_eq!(quote_string("plain"), "\"plain\"");
        assert_eq!(quote_string("pa ss"), "\"pa ss\"");
        assert_eq!(quote_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(quote_string("nl\nend"), "\"nl\\nend\"");
    }

    #[test]
    fn privileged_split() {
        assert!(Command::Authenticate(Authentication::None).is_privileged());
        assert!(Command::ConfigLoad { text: String::new() }.is_privileged());
        assert!(Command::OwnershipTake.is_privileged());
        assert!(Command::Signal(TorSignal::Shutdown).is_privileged());
        assert!(Command::Signal(TorSignal::Halt).is_privileged());

        assert!(!Command::Signal(TorSignal::NewNym).is_privileged());
        assert!(!Command::ConfigGet { keys: vec![] }.is_privileged());
        assert!(!Command::DropGuards.is_privileged());
    }
}
