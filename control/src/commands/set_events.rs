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

use super::TorCommand;
use crate::{
    codec::WireCommand,
    error::ControlError,
    event::EventKind,
    response::{ensure_ok, ResponseLine},
};

/// The SETEVENTS command: atomically replaces the active event subscription.
/// An empty set unsubscribes from everything.
pub struct SetEvents {
    kinds: Vec<EventKind>,
}

impl SetEvents {
    pub fn new<I: IntoIterator<Item = EventKind>>(kinds: I) -> Self {
        let mut kinds: Vec<EventKind> = kinds.into_iter().collect();
        kinds.sort_unstable();
        kinds.dedup();
        Self { kinds }
    }
}

impl TorCommand for SetEvents {
    type Output = ();

    fn to_wire_command(&self) -> Result<WireCommand, ControlError> {
        let mut line = "SETEVENTS".to_string();
        for kind in &self.kinds {
            line.push(' ');
            line.push_str(kind.as_str());
        }
        Ok(WireCommand::new(line))
    }

    fn parse_responses(&self, responses: Vec<ResponseLine>) -> Result<Self::Output, ControlError> {
        ensure_ok(&responses)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_form_is_sorted_and_deduped() {
        let cmd = SetEvents::new([EventKind::Notice, EventKind::Circ, EventKind::Notice]);
        assert_eq!(cmd.to_wire_command().unwrap().line, "SETEVENTS CIRC NOTICE");

        let cmd = SetEvents::new([]);
        assert_eq!(cmd.to_wire_command().unwrap().line, "SETEVENTS");
    }
}
