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

use super::TorCommand;
use crate::{
    codec::WireCommand,
    error::ControlError,
    response::{ensure_ok, ResponseLine},
};

/// Signals deliverable with the SIGNAL command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorSignal {
    Active,
    ClearDnsCache,
    Debug,
    Dormant,
    Dump,
    Halt,
    Heartbeat,
    NewNym,
    Reload,
    Shutdown,
}

impl TorSignal {
    pub fn as_tor_repr(&self) -> &'static str {
        use TorSignal::*;
        match self {
            Active => "ACTIVE",
            ClearDnsCache => "CLEARDNSCACHE",
            Debug => "DEBUG",
            Dormant => "DORMANT",
            Dump => "DUMP",
            Halt => "HALT",
            Heartbeat => "HEARTBEAT",
            NewNym => "NEWNYM",
            Reload => "RELOAD",
            Shutdown => "SHUTDOWN",
        }
    }

    /// SHUTDOWN and HALT end the daemon; only the runtime may send them.
    pub fn is_privileged(&self) -> bool {
        matches!(self, TorSignal::Shutdown | TorSignal::Halt)
    }
}

impl fmt::Display for TorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tor_repr())
    }
}

/// The SIGNAL command.
pub struct Signal {
    signal: TorSignal,
}

impl Signal {
    pub fn new(signal: TorSignal) -> Self {
        Self { signal }
    }
}

impl TorCommand for Signal {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        Ok(WireCommand::new(format!("SIGNAL {}", self.signal)))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_form() {
        assert_eq!(
            Signal::new(TorSignal::NewNym).to_wire_command().unwrap().line,
            "SIGNAL NEWNYM"
        );
        assert_eq!(
            Signal::new(TorSignal::ClearDnsCache).to_wire_command().unwrap().line,
            "SIGNAL CLEARDNSCACHE"
        );
    }

    #[test]
    fn only_shutdown_and_halt_are_privileged() {
        for signal in [TorSignal::Shutdown, TorSignal::Halt] {
            assert!(signal.is_privileged());
        }
        for signal in [
            TorSignal::Active,
            TorSignal::ClearDnsCache,
            TorSignal::Debug,
            TorSignal::Dormant,
            TorSignal::Dump,
            TorSignal::Heartbeat,
            TorSignal::NewNym,
            TorSignal::Reload,
        ] {
            assert!(!signal.is_privileged());
        }
    }
}
