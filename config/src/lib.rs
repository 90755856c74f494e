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

//! # Embedtor Config
//!
//! The typed model of a tor daemon configuration: a closed keyword catalogue,
//! an ordered set of settings serializable to torrc text, hidden-service
//! blocks, listener port values, and the onion address / key value types.
//!
//! The [TorConfigBuilder] always emits the subset of options the runtime needs
//! to launch and own a tor process with networking disabled; the full
//! configuration is applied over the control channel once the process is up.

mod builder;
mod error;
mod hidden_service;
mod keys;
mod keyword;
mod port;
mod settings;

pub use builder::TorConfigBuilder;
pub use error::{ConfigError, KeyError};
pub use hidden_service::{HiddenServiceConfig, HsPort, HsTarget};
pub use keys::{Ed25519Seed, HsPrivateKey, KeyAlgorithm, OnionAddressV3, X25519PrivateKey, X25519PublicKey};
pub use keyword::TorKeyword;
pub use port::{validate_unix_socket_path, PortProber, TorPortValue, MAX_UNIX_SOCKET_PATH_LEN};
pub use settings::{LineItem, TorConfig, TorSetting};
