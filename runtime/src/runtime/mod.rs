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

//! The public runtime: spawn and supervise a tor daemon, speak its control
//! protocol, and observe it through typed events.

pub(crate) mod actor;

use std::{path::PathBuf, sync::Arc, time::Duration};

use embedtor_config::{TorConfig, TorConfigBuilder};
use embedtor_control::{Command, CommandOutput, EventKind};
use embedtor_shutdown::ShutdownSignal;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tokio::sync::{mpsc, oneshot, watch};

use self::actor::{Action, RuntimeActor, RuntimeOptions, RuntimeRequest};
use crate::{
    error::RuntimeError,
    event::{TorEvent, TorEventKind},
    job::{job_pair, RuntimeJob},
    ports::OsPortProber,
    registry::{ListenerRegistry, SubscribeOptions, Subscription},
    resources::ResourceProvider,
    state::TorState,
};

const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const DEFAULT_NEWNYM_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(250);

/// Builder for a [TorRuntime].
pub struct TorRuntimeBuilder {
    base_dir: PathBuf,
    config_builder: Option<TorConfigBuilder>,
    resource_provider: Option<Arc<dyn ResourceProvider>>,
    events: Vec<EventKind>,
    control_password: Option<String>,
    take_ownership: bool,
    enable_network_on_start: bool,
    readiness_timeout: Duration,
    shutdown_grace: Duration,
    shutdown_signal: Option<ShutdownSignal>,
}

impl TorRuntimeBuilder {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
            config_builder: None,
            resource_provider: None,
            events: EventKind::all().to_vec(),
            control_password: None,
            take_ownership: true,
            enable_network_on_start: true,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            shutdown_signal: None,
        }
    }

    /// Use a prepared config builder instead of the defaults seeded from the
    /// base directory.
    pub fn with_config(mut self, builder: TorConfigBuilder) -> Self {
        self.config_builder = Some(builder);
        self
    }

    pub fn with_resource_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resource_provider = Some(provider);
        self
    }

    /// Replace the default control event subscription.
    pub fn with_events(mut self, events: Vec<EventKind>) -> Self {
        self.events = events;
        self
    }

    /// Authenticate with a password when no readable cookie file is available.
    pub fn with_control_password<S: Into<String>>(mut self, password: S) -> Self {
        self.control_password = Some(password.into());
        self
    }

    /// Generate a random alphanumeric control passphrase.
    pub fn with_generated_control_password(mut self) -> Self {
        let passphrase: String = OsRng.sample_iter(&Alphanumeric).take(30).map(char::from).collect();
        self.control_password = Some(passphrase);
        self
    }

    /// Destroy the runtime when the given signal triggers, tying its lifetime
    /// to the host application's.
    pub fn with_shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    /// Do not TAKEOWNERSHIP of the tor process.
    pub fn non_owning(mut self) -> Self {
        self.take_ownership = false;
        self
    }

    /// Leave `DisableNetwork 1` in place after start; the caller flips it
    /// through SETCONF when ready.
    pub fn keep_network_disabled(mut self) -> Self {
        self.enable_network_on_start = false;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> Result<TorRuntime, RuntimeError> {
        let resource_provider = self
            .resource_provider
            .ok_or_else(|| RuntimeError::LaunchFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no resource provider configured",
            )))?;
        let config = self
            .config_builder
            .unwrap_or_else(|| TorConfigBuilder::for_base_dir(&self.base_dir))
            .with_port_prober(Box::new(OsPortProber))
            .build()?;

        let registry = ListenerRegistry::new();
        let (state_tx, state_rx) = watch::channel(TorState::new());
        let (req_tx, req_rx) = mpsc::unbounded_channel();

        let options = RuntimeOptions {
            events: self.events,
            control_password: self.control_password,
            take_ownership: self.take_ownership,
            enable_network_on_start: self.enable_network_on_start,
            readiness_timeout: self.readiness_timeout,
            shutdown_grace: self.shutdown_grace,
            newnym_rate_limit_window: DEFAULT_NEWNYM_RATE_LIMIT_WINDOW,
            shutdown_signal: self.shutdown_signal,
        };
        let actor = RuntimeActor::new(
            self.base_dir,
            config.clone(),
            options,
            resource_provider,
            registry.clone(),
            state_tx,
            req_rx,
        );
        tokio::spawn(actor.run());

        Ok(TorRuntime {
            req_tx,
            registry,
            state_rx,
            config,
        })
    }
}

/// A supervised tor daemon with an asynchronous control API.
///
/// Lifecycle actions and commands share one totally ordered queue; every
/// submission returns a [RuntimeJob] that completes exactly once. Events fan
/// out to listeners registered by kind.
#[derive(Clone)]
pub struct TorRuntime {
    req_tx: mpsc::UnboundedSender<RuntimeRequest>,
    registry: Arc<ListenerRegistry>,
    state_rx: watch::Receiver<TorState>,
    config: TorConfig,
}

impl TorRuntime {
    pub fn builder<P: Into<PathBuf>>(base_dir: P) -> TorRuntimeBuilder {
        TorRuntimeBuilder::new(base_dir)
    }

    /// Launch the daemon. A no-op success when it is already starting or on.
    pub fn start(&self) -> RuntimeJob<()> {
        self.submit_action(Action::Start)
    }

    /// Stop the daemon. Cancels all pending non-stop jobs with `Interrupted`.
    /// A no-op success when it is already off.
    pub fn stop(&self, graceful: bool) -> RuntimeJob<()> {
        self.submit_action(Action::Stop { graceful })
    }

    /// Stop and start again, re-applying the full configuration. Equivalent to
    /// start when the daemon is off.
    pub fn restart(&self) -> RuntimeJob<()> {
        self.submit_action(Action::Restart)
    }

    fn submit_action(&self, action: Action) -> RuntimeJob<()> {
        let (job, completer) = job_pair();
        // If the actor is gone the dropped completer fails the job
        let _ = self.req_tx.send(RuntimeRequest::Action { action, completer });
        job
    }

    /// Enqueue a control command. Privileged commands are rejected; commands
    /// submitted while the daemon is not on fail with `NotReady`.
    pub fn enqueue(&self, command: Command) -> RuntimeJob<CommandOutput> {
        let (job, completer) = job_pair();
        if command.is_privileged() {
            completer.complete(Err(RuntimeError::NotPermitted(command.name())));
            return job;
        }
        let _ = self.req_tx.send(RuntimeRequest::Command { command, completer });
        job
    }

    /// Register a listener for one event kind. The returned subscription
    /// cancels the registration; dropping it does not.
    pub fn subscribe<F>(&self, kind: TorEventKind, handler: F) -> Subscription
    where F: Fn(&TorEvent) + Send + Sync + 'static {
        self.registry.subscribe(kind, handler, SubscribeOptions::default())
    }

    /// Register a listener with explicit options (tag, static lifetime,
    /// executor handle).
    pub fn subscribe_with<F>(&self, kind: TorEventKind, handler: F, options: SubscribeOptions) -> Subscription
    where F: Fn(&TorEvent) + Send + Sync + 'static {
        self.registry.subscribe(kind, handler, options)
    }

    pub fn state(&self) -> TorState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TorState> {
        self.state_rx.clone()
    }

    pub fn config(&self) -> &TorConfig {
        &self.config
    }

    /// Tear the runtime down: pending jobs are cancelled, the session is
    /// closed, the process is killed, scoped files are deleted, and non-static
    /// listeners are cleared after being notified of the terminal state.
    pub async fn destroy(&self) {
        let (done, rx) = oneshot::channel();
        if self.req_tx.send(RuntimeRequest::Destroy { done }).is_ok() {
            let _ = rx.await;
        }
    }
}
