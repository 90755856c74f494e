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

use thiserror::Error;

use crate::keyword::TorKeyword;

/// Errors raised while building, serializing or parsing a tor configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("A hidden service block must declare HiddenServiceVersion 3")]
    HiddenServiceMissingVersion,
    #[error("A hidden service block must declare at least one HiddenServicePort")]
    HiddenServiceNoPorts,
    #[error("Unix socket path '{path}' exceeds the maximum length of {max} bytes")]
    UnixSocketPathTooLong { path: String, max: usize },
    #[error("Unix socket path contains an illegal character: {0}")]
    UnixSocketPathIllegalChar(String),
    #[error("Unix socket path must be absolute: {0}")]
    UnixSocketPathNotAbsolute(String),
    #[error("{0} does not accept a unix socket listener")]
    UnixSocketUnsupported(TorKeyword),
    #[error("Unix socket listeners are not supported on this platform")]
    UnixSocketUnsupportedPlatform,
    #[error("'{keyword}' may only be set once")]
    DuplicateSetting { keyword: TorKeyword },
    #[error("Missing required setting '{keyword}'")]
    MissingRequiredSetting { keyword: TorKeyword },
    #[error("Unknown torrc keyword '{0}'")]
    UnknownKeyword(String),
    #[error("Failed to parse torrc line {line}: {reason}")]
    TorrcParse { line: usize, reason: String },
    #[error("Invalid port value '{0}'")]
    InvalidPortValue(String),
}

/// Errors raised when constructing onion addresses and key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Key material is not valid {0} text")]
    InvalidEncoding(&'static str),
    #[error("Onion address version byte was {0}, expected 3")]
    UnsupportedOnionVersion(u8),
    #[error("Key algorithm {private} cannot be paired with a {public} address")]
    AlgorithmMismatch {
        public: &'static str,
        private: &'static str,
    },
}
