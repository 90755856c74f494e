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

//! The runtime's projection of daemon state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the supervised daemon is in its lifecycle. Bootstrap progress is
/// monotonically non-decreasing while the daemon stays up; it resets to zero on
/// every transition into `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonState {
    Off,
    Starting,
    On { bootstrap: u8 },
    Stopping,
}

impl DaemonState {
    pub fn is_on(&self) -> bool {
        matches!(self, DaemonState::On { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkState {
    Disabled,
    Enabled,
}

/// The (daemon, network) tuple observable through the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorState {
    pub daemon: DaemonState,
    pub network: NetworkState,
}

impl TorState {
    pub fn new() -> Self {
        Self {
            daemon: DaemonState::Off,
            network: NetworkState::Disabled,
        }
    }

    /// Apply an observed bootstrap progress value. The first observation while
    /// `Starting` moves the daemon to `On`; regressions are ignored so progress
    /// never decreases within one Off-to-Off cycle. Returns whether the state
    /// changed.
    pub fn observe_bootstrap(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        match self.daemon {
            DaemonState::Starting => {
                self.daemon = DaemonState::On { bootstrap: progress };
                true
            },
            DaemonState::On { bootstrap } if progress > bootstrap => {
                self.daemon = DaemonState::On { bootstrap: progress };
                true
            },
            _ => false,
        }
    }

    pub fn set_starting(&mut self) {
        self.daemon = DaemonState::Starting;
        self.network = NetworkState::Disabled;
    }

    pub fn set_stopping(&mut self) {
        self.daemon = DaemonState::Stopping;
    }

    pub fn set_off(&mut self) {
        self.daemon = DaemonState::Off;
        self.network = NetworkState::Disabled;
    }

    pub fn set_network(&mut self, enabled: bool) {
        self.network = if enabled { NetworkState::Enabled } else { NetworkState::Disabled };
    }
}

impl Default for TorState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.daemon {
            DaemonState::Off => write!(f, "Off")?,
            DaemonState::Starting => write!(f, "Starting")?,
            DaemonState::On { bootstrap } => write!(f, "On({}%)", bootstrap)?,
            DaemonState::Stopping => write!(f, "Stopping")?,
        }
        match self.network {
            NetworkState::Disabled => write!(f, ", network disabled"),
            NetworkState::Enabled => write!(f, ", network enabled"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bootstrap_is_monotone_within_a_cycle() {
        let mut state = TorState::new();
        state.set_starting();

        assert!(state.observe_bootstrap(5));
        assert_eq!(state.daemon, DaemonState::On { bootstrap: 5 });

        assert!(state.observe_bootstrap(80));
        // A regression must not move the value backwards
        assert!(!state.observe_bootstrap(10));
        assert_eq!(state.daemon, DaemonState::On { bootstrap: 80 });

        assert!(state.observe_bootstrap(100));
        assert!(!state.observe_bootstrap(100));
        assert_eq!(state.daemon, DaemonState::On { bootstrap: 100 });
    }

    #[test]
    fn restart_resets_bootstrap() {
        let mut state = TorState::new();
        state.set_starting();
        state.observe_bootstrap(100);
        state.set_network(true);

        state.set_stopping();
        state.set_off();
        assert_eq!(state.network, NetworkState::Disabled);

        state.set_starting();
        assert!(state.observe_bootstrap(0));
        assert_eq!(state.daemon, DaemonState::On { bootstrap: 0 });
    }

    #[test]
    fn bootstrap_ignored_while_off() {
        let mut state = TorState::new();
        assert!(!state.observe_bootstrap(50));
        assert_eq!(state.daemon, DaemonState::Off);
    }

    #[test]
    fn values_above_100_are_clamped() {
        let mut state = TorState::new();
        state.set_starting();
        state.observe_bootstrap(250);
        assert_eq!(state.daemon, DaemonState::On { bootstrap: 100 });
    }
}
