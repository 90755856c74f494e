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

//! # Embedtor Runtime
//!
//! Embeds a tor daemon as a supervised child process and exposes a structured
//! asynchronous API over it: lifecycle actions (start / stop / restart) and
//! control commands serialized through one action queue, with process,
//! network and bootstrap state changes fanned out to typed event listeners.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use embedtor_runtime::{StaticResourceProvider, TorResources, TorRuntime};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let provider = StaticResourceProvider::new(TorResources::new("/usr/bin/tor"));
//! let runtime = TorRuntime::builder("/var/lib/my-app/tor")
//!     .with_resource_provider(Arc::new(provider))
//!     .build()?;
//! runtime.start().wait().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod event;
mod job;
mod ports;
mod registry;
mod resources;
mod runtime;
mod state;
mod supervisor;

pub use error::RuntimeError;
pub use event::{TorEvent, TorEventKind};
pub use job::RuntimeJob;
pub use ports::OsPortProber;
pub use registry::{SubscribeOptions, Subscription};
pub use resources::{ResourceProvider, StaticResourceProvider, TorResources};
pub use runtime::{TorRuntime, TorRuntimeBuilder};
pub use state::{DaemonState, NetworkState, TorState};
