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

//! Asynchronous (`650`) control events and their payload views.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use crate::error::ControlError;

/// The asynchronous event kinds this client can subscribe to with SETEVENTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    AddrMap,
    Bw,
    Circ,
    ConfChanged,
    Err,
    HsDesc,
    NetworkLiveness,
    Notice,
    OrConn,
    StatusClient,
    StatusGeneral,
    StatusServer,
    Stream,
    Warn,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        use EventKind::*;
        match self {
            AddrMap => "ADDRMAP",
            Bw => "BW",
            Circ => "CIRC",
            ConfChanged => "CONF_CHANGED",
            Err => "ERR",
            HsDesc => "HS_DESC",
            NetworkLiveness => "NETWORK_LIVENESS",
            Notice => "NOTICE",
            OrConn => "ORCONN",
            StatusClient => "STATUS_CLIENT",
            StatusGeneral => "STATUS_GENERAL",
            StatusServer => "STATUS_SERVER",
            Stream => "STREAM",
            Warn => "WARN",
        }
    }

    pub fn all() -> &'static [EventKind] {
        use EventKind::*;
        &[
            AddrMap,
            Bw,
            Circ,
            ConfChanged,
            Err,
            HsDesc,
            NetworkLiveness,
            Notice,
            OrConn,
            StatusClient,
            StatusGeneral,
            StatusServer,
            Stream,
            Warn,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, ControlError> {
        Self::all()
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ControlError::ParseReply(format!("unknown event kind '{}'", s)))
    }
}

/// One line of a (possibly multi-line) asynchronous event, with any data block
/// that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLine {
    pub payload: String,
    pub data: Vec<String>,
}

/// A complete asynchronous event as received from tor.
///
/// The first word of the first line names the event kind; kinds outside the
/// subscription catalogue are preserved raw so nothing is silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEvent {
    pub kind: Option<EventKind>,
    pub raw_kind: String,
    /// First-line payload with the kind stripped.
    pub payload: String,
    /// Data block attached to the first line, if any.
    pub data: Vec<String>,
    /// Continuation lines (multi-line events such as CONF_CHANGED).
    pub lines: Vec<EventLine>,
}

impl ControlEvent {
    /// Assemble an event from its accumulated lines.
    pub fn from_lines(mut lines: Vec<EventLine>) -> Result<Self, ControlError> {
        if lines.is_empty() {
            return Err(ControlError::ParseReply("empty event".to_string()));
        }
        let first = lines.remove(0);
        let (raw_kind, payload) = match first.payload.split_once(' ') {
            Some((kind, rest)) => (kind.to_string(), rest.to_string()),
            None => (first.payload.clone(), String::new()),
        };
        Ok(Self {
            kind: raw_kind.parse().ok(),
            raw_kind,
            payload,
            data: first.data,
            lines,
        })
    }

    /// Bootstrap progress carried by a `STATUS_CLIENT ... BOOTSTRAP` event.
    pub fn bootstrap_status(&self) -> Option<BootstrapStatus> {
        if self.kind != Some(EventKind::StatusClient) {
            return None;
        }
        let mut words = self.payload.split_whitespace();
        let severity = words.next()?;
        if words.next()? != "BOOTSTRAP" {
            return None;
        }
        let args = parse_keyword_arguments(&self.payload);
        Some(BootstrapStatus {
            severity: severity.to_string(),
            progress: args.get("PROGRESS").and_then(|v| v.parse().ok())?,
            tag: args.get("TAG").cloned().unwrap_or_default(),
            summary: args.get("SUMMARY").cloned().unwrap_or_default(),
        })
    }

    /// `NETWORK_LIVENESS UP` / `DOWN`.
    pub fn network_liveness(&self) -> Option<bool> {
        if self.kind != Some(EventKind::NetworkLiveness) {
            return None;
        }
        match self.payload.trim() {
            "UP" => Some(true),
            "DOWN" => Some(false),
            _ => None,
        }
    }

    /// The settings announced by a CONF_CHANGED event. Within a single event
    /// the last value per keyword is authoritative.
    pub fn conf_changed(&self) -> Option<HashMap<String, Option<String>>> {
        if self.kind != Some(EventKind::ConfChanged) {
            return None;
        }
        let mut changed = HashMap::new();
        let entries = std::iter::once(self.payload.as_str())
            .chain(self.lines.iter().map(|l| l.payload.as_str()))
            .filter(|l| !l.is_empty());
        for entry in entries {
            match entry.split_once('=') {
                Some((key, value)) => changed.insert(key.to_string(), Some(value.to_string())),
                None => changed.insert(entry.to_string(), None),
            };
        }
        Some(changed)
    }

    /// `HS_DESC <action> <address> ...`.
    pub fn hs_desc(&self) -> Option<HsDescStatus> {
        if self.kind != Some(EventKind::HsDesc) {
            return None;
        }
        let mut words = self.payload.split_whitespace();
        Some(HsDescStatus {
            action: words.next()?.to_string(),
            address: words.next()?.to_string(),
        })
    }

    /// The delay announced by a "Rate limiting NEWNYM request" NOTICE.
    pub fn newnym_rate_limit(&self) -> Option<Duration> {
        if self.kind != Some(EventKind::Notice) {
            return None;
        }
        let rest = self.payload.strip_prefix("Rate limiting NEWNYM request: delaying by ")?;
        let seconds: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(Duration::from_secs(seconds))
    }
}

/// `PROGRESS=80 TAG=conn SUMMARY="Connecting to a relay"` style arguments.
fn parse_keyword_arguments(payload: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();
    let mut rest = payload;
    while let Some(eq) = rest.find('=') {
        let key_start = rest[..eq].rfind(' ').map(|i| i + 1).unwrap_or(0);
        let key = &rest[key_start..eq];
        let after = &rest[eq + 1..];
        let (value, remainder) = if let Some(stripped) = after.strip_prefix('"') {
            match stripped.find('"') {
                Some(end) => (&stripped[..end], &stripped[end + 1..]),
                None => (stripped, ""),
            }
        } else {
            match after.find(' ') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };
        args.insert(key.to_string(), value.to_string());
        rest = remainder;
    }
    args
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStatus {
    pub severity: String,
    pub progress: u8,
    pub tag: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsDescStatus {
    pub action: String,
    pub address: String,
}

#[cfg(test)]
mod test {
    use super::*;

    fn event(payload: &str) -> ControlEvent {
        ControlEvent::from_lines(vec![EventLine {
            payload: payload.to_string(),
            data: Vec::new(),
        }])
        .unwrap()
    }

    #[test]
    fn splits_kind_from_payload() {
        let ev = event("NOTICE Bootstrapped 10% (conn_done): Connected to a relay");
        assert_eq!(ev.kind, Some(EventKind::Notice));
        assert_eq!(ev.payload, "Bootstrapped 10% (conn_done): Connected to a relay");

        let ev = event("SOMETHING_NEW with args");
        assert_eq!(ev.kind, None);
        assert_eq!(ev.raw_kind, "SOMETHING_NEW");
    }

    #[test]
    fn parses_bootstrap_status() {
        let ev = event(
            "STATUS_CLIENT NOTICE BOOTSTRAP PROGRESS=80 TAG=conn SUMMARY=\"Connecting to a relay\"",
        );
        let status = ev.bootstrap_status().unwrap();
        assert_eq!(status.severity, "NOTICE");
        assert_eq!(status.progress, 80);
        assert_eq!(status.tag, "conn");
        assert_eq!(status.summary, "Connecting to a relay");
    }

    #[test]
    fn ignores_non_bootstrap_status_client() {
        let ev = event("STATUS_CLIENT NOTICE CIRCUIT_ESTABLISHED");
        assert!(ev.bootstrap_status().is_none());
    }

    #[test]
    fn parses_network_liveness() {
        assert_eq!(event("NETWORK_LIVENESS UP").network_liveness(), Some(true));
        assert_eq!(event("NETWORK_LIVENESS DOWN").network_liveness(), Some(false));
        assert_eq!(event("NOTICE UP").network_liveness(), None);
    }

    #[test]
    fn conf_changed_last_value_wins() {
        let ev = ControlEvent::from_lines(vec![
            EventLine {
                payload: "CONF_CHANGED".to_string(),
                data: Vec::new(),
            },
            EventLine {
                payload: "SocksPort=9050".to_string(),
                data: Vec::new(),
            },
            EventLine {
                payload: "SocksPort=9150".to_string(),
                data: Vec::new(),
            },
            EventLine {
                payload: "DNSPort".to_string(),
                data: Vec::new(),
            },
        ])
        .unwrap();
        let changed = ev.conf_changed().unwrap();
        assert_eq!(changed.get("SocksPort"), Some(&Some("9150".to_string())));
        assert_eq!(changed.get("DNSPort"), Some(&None));
    }

    #[test]
    fn parses_newnym_rate_limit() {
        let ev = event("NOTICE Rate limiting NEWNYM request: delaying by 10 second(s)");
        assert_eq!(ev.newnym_rate_limit(), Some(Duration::from_secs(10)));
        assert_eq!(event("NOTICE something else").newnym_rate_limit(), None);
    }

    #[test]
    fn parses_hs_desc() {
        let address = crate::test_server::canned_responses::SERVICE_ID;
        let ev = event(&format!("HS_DESC UPLOADED {} UNKNOWN", address));
        let status = ev.hs_desc().unwrap();
        assert_eq!(status.action, "UPLOADED");
        assert_eq!(status.address, address);
    }
}
