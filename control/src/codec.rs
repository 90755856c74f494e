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

//! Incremental framing of the tor control protocol (control-spec §2.3).
//!
//! Replies are sequences of `<3-digit code><sep><payload>` lines where the
//! separator is `-` (more lines follow), `+` (a literal data block follows,
//! terminated by a lone `.`) or a space (end of reply). Codes `6xx` are
//! asynchronous events and may arrive at any point, including between the
//! lines of a command reply.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ControlError;

/// Separator following the 3-digit status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySep {
    /// `-`: mid-reply, more lines follow
    More,
    /// `+`: a data block follows this line
    Data,
    /// ` `: final line of the reply
    End,
}

/// One decoded frame of the control stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    ReplyLine { code: u16, sep: ReplySep, payload: String },
    ReplyData { lines: Vec<String> },
    EventLine { code: u16, sep: ReplySep, payload: String },
    EventData { lines: Vec<String> },
}

/// A request destined for the wire: a command line plus an optional data block
/// (`+LOADCONF`-style). Sensitive commands display only their verb.
#[derive(Clone)]
pub struct WireCommand {
    pub(crate) line: String,
    pub(crate) data: Option<String>,
    sensitive: bool,
}

impl WireCommand {
    pub fn new<T: Into<String>>(line: T) -> Self {
        Self {
            line: line.into(),
            data: None,
            sensitive: false,
        }
    }

    pub fn with_data<T: Into<String>, D: Into<String>>(line: T, data: D) -> Self {
        Self {
            line: line.into(),
            data: Some(data.into()),
            sensitive: false,
        }
    }

    /// Mark this command as carrying key material. Its arguments never reach
    /// the logs.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// The command verb (first word of the line).
    pub fn verb(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or_default()
    }
}

impl fmt::Display for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sensitive {
            write!(f, "{} <redacted>", self.verb())
        } else {
            f.write_str(&self.line)
        }
    }
}

impl fmt::Debug for WireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireCommand({})", self)
    }
}

#[derive(Debug)]
struct DataBlock {
    is_event: bool,
    lines: Vec<String>,
}

/// Restartable decoder/encoder for the control channel. Data-block state is
/// carried across `decode` calls, so the stream may be fed in arbitrary chunks.
#[derive(Debug, Default)]
pub struct ControlCodec {
    data: Option<DataBlock>,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self { data: None }
    }

    fn decode_status_line(&mut self, line: String) -> Result<ControlFrame, ControlError> {
        if line.len() < 4 {
            return Err(ControlError::ProtocolViolation(format!(
                "reply line too short: '{}'",
                line
            )));
        }
        let code: u16 = line
            .get(..3)
            .and_then(|prefix| prefix.parse().ok())
            .ok_or_else(|| ControlError::ProtocolViolation(format!("reply line lacks a status code: '{}'", line)))?;
        let sep = match line.as_bytes()[3] {
            b'-' => ReplySep::More,
            b'+' => ReplySep::Data,
            b' ' => ReplySep::End,
            other => {
                return Err(ControlError::ProtocolViolation(format!(
                    "unknown reply separator '{}'",
                    other as char
                )))
            },
        };
        let payload = line[4..].to_string();
        let is_event = code >= 600;
        if sep == ReplySep::Data {
            self.data = Some(DataBlock {
                is_event,
                lines: Vec::new(),
            });
        }
        if is_event {
            Ok(ControlFrame::EventLine { code, sep, payload })
        } else {
            Ok(ControlFrame::ReplyLine { code, sep, payload })
        }
    }
}

fn take_line(src: &mut BytesMut) -> Result<Option<String>, ControlError> {
    let pos = match src.iter().position(|b| *b == b'\n') {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let mut line = src.split_to(pos + 1);
    line.truncate(pos);
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
    String::from_utf8(line.to_vec())
        .map(Some)
        .map_err(|_| ControlError::ProtocolViolation("reply line is not valid UTF-8".to_string()))
}

impl Decoder for ControlCodec {
    type Error = ControlError;
    type Item = ControlFrame;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let line = match take_line(src)? {
                Some(line) => line,
                None => return Ok(None),
            };
            if self.data.is_none() {
                return self.decode_status_line(line).map(Some);
            }
            if line == "." {
                let block = self.data.take().expect("checked above");
                let frame = if block.is_event {
                    ControlFrame::EventData { lines: block.lines }
                } else {
                    ControlFrame::ReplyData { lines: block.lines }
                };
                return Ok(Some(frame));
            }
            let block = self.data.as_mut().expect("checked above");
            // Undo dot-stuffing
            if let Some(stripped) = line.strip_prefix("..") {
                block.lines.push(format!(".{}", stripped));
            } else {
                block.lines.push(line);
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if self.data.is_some() {
            return Err(ControlError::ProtocolViolation(
                "stream closed inside a data block".to_string(),
            ));
        }
        if !src.is_empty() {
            return Err(ControlError::ProtocolViolation(
                "stream closed mid reply line".to_string(),
            ));
        }
        Ok(None)
    }
}

impl Encoder<WireCommand> for ControlCodec {
    type Error = ControlError;

    fn encode(&mut self, item: WireCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(item.line.as_bytes());
        dst.put_slice(b"\r\n");
        if let Some(data) = item.data {
            for line in data.lines() {
                // Dot-stuff the body
                if line.starts_with('.') {
                    dst.put_u8(b'.');
                }
                dst.put_slice(line.as_bytes());
                dst.put_slice(b"\r\n");
            }
            dst.put_slice(b".\r\n");
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    fn feed(codec: &mut ControlCodec, buf: &mut BytesMut, bytes: &str) -> Vec<ControlFrame> {
        buf.extend_from_slice(bytes.as_bytes());
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn decodes_single_and_multi_line_replies() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();

        let frames = feed(&mut codec, &mut buf, "250 OK\r\n");
        assert_eq!(frames, vec![ControlFrame::ReplyLine {
            code: 250,
            sep: ReplySep::End,
            payload: "OK".to_string(),
        }]);

        let frames = feed(&mut codec, &mut buf, "250-SocksPort=9050\r\n250 DNSPort=0\r\n");
        assert_eq!(frames.len(), 2);
        unpack_enum!(ControlFrame::ReplyLine { code, sep, payload } = frames[0].clone());
        assert_eq!((code, sep, payload.as_str()), (250, ReplySep::More, "SocksPort=9050"));
    }

    #[test]
    fn is_restartable_across_partial_feeds() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();

        assert!(feed(&mut codec, &mut buf, "25").is_empty());
        assert!(feed(&mut codec, &mut buf, "0 O").is_empty());
        let frames = feed(&mut codec, &mut buf, "K\r\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn decodes_data_blocks_and_undoes_dot_stuffing() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();

        let frames = feed(
            &mut codec,
            &mut buf,
            "250+version=\r\nfirst\r\n..dotted\r\n.\r\n250 OK\r\n",
        );
        assert_eq!(frames, vec![
            ControlFrame::ReplyLine {
                code: 250,
                sep: ReplySep::Data,
                payload: "version=".to_string(),
            },
            ControlFrame::ReplyData {
                lines: vec!["first".to_string(), ".dotted".to_string()],
            },
            ControlFrame::ReplyLine {
                code: 250,
                sep: ReplySep::End,
                payload: "OK".to_string(),
            },
        ]);
    }

    #[test]
    fn routes_6xx_to_event_frames_even_inside_replies() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();

        let frames = feed(
            &mut codec,
            &mut buf,
            "250-one=1\r\n650 NOTICE something happened\r\n250 OK\r\n",
        );
        assert_eq!(frames.len(), 3);
        unpack_enum!(ControlFrame::EventLine { code, sep, payload } = frames[1].clone());
        assert_eq!(code, 650);
        assert_eq!(sep, ReplySep::End);
        assert_eq!(payload, "NOTICE something happened");
    }

    #[test]
    fn decodes_multi_line_events_with_data() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();

        let frames = feed(
            &mut codec,
            &mut buf,
            "650+HS_DESC_CONTENT foo\r\ndescriptor body\r\n.\r\n650 OK\r\n",
        );
        assert_eq!(frames, vec![
            ControlFrame::EventLine {
                code: 650,
                sep: ReplySep::Data,
                payload: "HS_DESC_CONTENT foo".to_string(),
            },
            ControlFrame::EventData {
                lines: vec!["descriptor body".to_string()],
            },
            ControlFrame::EventLine {
                code: 650,
                sep: ReplySep::End,
                payload: "OK".to_string(),
            },
        ]);
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"nope\r\n");
        let err = codec.decode(&mut buf).unwrap_err();
        unpack_enum!(ControlError::ProtocolViolation(_s) = err);

        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"250*weird\r\n");
        let err = codec.decode(&mut buf).unwrap_err();
        unpack_enum!(ControlError::ProtocolViolation(_s) = err);
    }

    #[test]
    fn eof_inside_data_block_is_a_violation() {
        let mut codec = ControlCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"250+stuff\r\npartial\r\n");
        while codec.decode(&mut buf).unwrap().is_some() {}
        let err = codec.decode_eof(&mut buf).unwrap_err();
        unpack_enum!(ControlError::ProtocolViolation(_s) = err);
    }

    #[test]
    fn encodes_plain_and_data_commands() {
        let mut codec = ControlCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(WireCommand::new("GETINFO version"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"GETINFO version\r\n");

        let mut dst = BytesMut::new();
        codec
            .encode(WireCommand::with_data("+LOADCONF", "SocksPort 9050\n.leading-dot"), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"+LOADCONF\r\nSocksPort 9050\r\n..leading-dot\r\n.\r\n");
    }

    #[test]
    fn sensitive_commands_display_only_their_verb() {
        let cmd = WireCommand::new("ADD_ONION NEW:ED25519-V3 Port=443").sensitive();
        assert_eq!(cmd.to_string(), "ADD_ONION <redacted>");
        assert!(!format!("{:?}", cmd).contains("ED25519"));
    }
}
