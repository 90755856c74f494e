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

//! Events published by the runtime to its listeners.

use std::sync::Arc;

use embedtor_control::ControlEvent;

use crate::state::TorState;

/// Something the runtime observed: a state change, a listener opening or
/// closing, a process log line, a raw control event, a crash, or an error
/// captured from a listener.
#[derive(Debug, Clone)]
pub enum TorEvent {
    /// The (daemon, network) state changed.
    State(TorState),
    /// tor opened a listener, e.g. `("Socks", "127.0.0.1:9050")`.
    ListenerOpened { kind: String, address: String },
    ListenerClosed { kind: String, address: String },
    /// One line of the tor process's stdout/stderr.
    ProcessLog { line: String },
    /// An asynchronous event from the control channel.
    Control(Arc<ControlEvent>),
    /// The process exited without being asked to.
    Crashed { exit_code: Option<i32> },
    /// An error captured from a listener or reported by a background task.
    Error { message: String },
}

/// The registration key for listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorEventKind {
    State,
    ListenerOpened,
    ListenerClosed,
    ProcessLog,
    Control,
    Crashed,
    Error,
}

impl TorEvent {
    pub fn kind(&self) -> TorEventKind {
        match self {
            TorEvent::State(_) => TorEventKind::State,
            TorEvent::ListenerOpened { .. } => TorEventKind::ListenerOpened,
            TorEvent::ListenerClosed { .. } => TorEventKind::ListenerClosed,
            TorEvent::ProcessLog { .. } => TorEventKind::ProcessLog,
            TorEvent::Control(_) => TorEventKind::Control,
            TorEvent::Crashed { .. } => TorEventKind::Crashed,
            TorEvent::Error { .. } => TorEventKind::Error,
        }
    }
}
