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

use std::io;

use embedtor_config::ConfigError;
use embedtor_control::ControlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("The tor daemon is not running")]
    NotReady,
    #[error("The job was interrupted by a higher-priority action")]
    Interrupted,
    #[error("The job was cancelled")]
    Cancelled,
    #[error("'{0}' is a privileged command and cannot be enqueued externally")]
    NotPermitted(&'static str),
    #[error("Failed to launch the tor process: {0}")]
    LaunchFailed(#[source] io::Error),
    #[error("The control port file did not become available in time")]
    ReadinessTimeout,
    #[error("The tor process exited before it became ready (exit code {exit_code:?})")]
    EarlyExit { exit_code: Option<i32> },
    #[error("The runtime has been destroyed")]
    Destroyed,
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Control channel error: {0}")]
    Control(#[from] ControlError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RuntimeError {
    /// Whether the underlying control channel was lost.
    pub fn is_disconnection(&self) -> bool {
        matches!(self, RuntimeError::Control(err) if err.is_fatal())
    }
}
