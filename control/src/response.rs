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

use crate::error::ControlError;

/// One line of a command reply, with the data block that followed it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// True for the ` `-separated final line of the reply.
    pub is_end: bool,
    pub value: String,
    pub data: Option<Vec<String>>,
}

impl ResponseLine {
    pub fn new(code: u16, is_end: bool, value: String) -> Self {
        Self {
            code,
            is_end,
            value,
            data: None,
        }
    }

    /// Every 2xx code is success.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn err(&self) -> Option<ControlError> {
        if self.is_ok() {
            None
        } else {
            Some(ControlError::from_reply(self.code, self.value.clone()))
        }
    }
}

/// Fail with the final line's error if the reply was not successful.
pub fn ensure_ok(responses: &[ResponseLine]) -> Result<(), ControlError> {
    let last = responses.last().ok_or(ControlError::ServerNoResponse)?;
    match last.err() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Split a `key=value` reply payload.
pub fn key_value(s: &str) -> Result<(&str, &str), ControlError> {
    s.split_once('=')
        .ok_or_else(|| ControlError::ParseReply(format!("expected key=value, got '{}'", s)))
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;

    use super::*;

    #[test]
    fn all_2xx_codes_are_success() {
        for code in [250, 251, 252, 299] {
            assert!(ResponseLine::new(code, true, "OK".to_string()).is_ok());
        }
        assert!(!ResponseLine::new(450, true, "busy".to_string()).is_ok());
        assert!(!ResponseLine::new(552, true, "nope".to_string()).is_ok());
    }

    #[test]
    fn errors_map_to_transient_and_permanent() {
        let err = ResponseLine::new(451, true, "resource exhausted".to_string())
            .err()
            .unwrap();
        unpack_enum!(ControlError::Tor4xx { code, text } = err);
        assert_eq!(code, 451);
        assert_eq!(text, "resource exhausted");

        let err = ResponseLine::new(510, true, "unrecognized".to_string()).err().unwrap();
        unpack_enum!(ControlError::Tor5xx { code, text } = err);
        assert_eq!(code, 510);
        drop(text);
    }

    #[test]
    fn key_value_splits_on_first_equals() {
        assert_eq!(key_value("a=b=c").unwrap(), ("a", "b=c"));
        key_value("no-equals").unwrap_err();
    }
}
