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

//! The runtime's action scheduler: a single totally-ordered queue of lifecycle
//! actions and commands, executed one at a time with the preemption rules
//! applied at submission, fused with the supervisor's and the session's event
//! streams.

use std::{collections::VecDeque, path::PathBuf, sync::Arc, time::Duration};

use embedtor_config::TorConfig;
use embedtor_shutdown::ShutdownSignal;
use embedtor_control::{
    Authentication,
    Command,
    CommandOutput,
    ConnectOptions,
    ControlClient,
    ControlEvent,
    EventKind,
    NewNymStatus,
    TorSignal,
};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{
    error::RuntimeError,
    event::TorEvent,
    job::JobCompleter,
    registry::ListenerRegistry,
    resources::ResourceProvider,
    state::{DaemonState, NetworkState, TorState},
    supervisor,
    supervisor::{ProcessEvent, TorProcess},
};

const LOG_TARGET: &str = "runtime::actor";

/// Lifecycle actions sharing the action queue with commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Start,
    Stop { graceful: bool },
    Restart,
}

pub(crate) enum RuntimeRequest {
    Action {
        action: Action,
        completer: JobCompleter<()>,
    },
    Command {
        command: Command,
        completer: JobCompleter<CommandOutput>,
    },
    Destroy {
        done: oneshot::Sender<()>,
    },
}

pub(crate) enum QueuedJob {
    Action {
        action: Action,
        completer: JobCompleter<()>,
    },
    Command {
        command: Command,
        completer: JobCompleter<CommandOutput>,
    },
}

impl QueuedJob {
    fn fail(self, err: RuntimeError) {
        match self {
            QueuedJob::Action { completer, .. } => completer.complete(Err(err)),
            QueuedJob::Command { completer, .. } => completer.complete(Err(err)),
        }
    }

    fn survives_stop(&self) -> bool {
        matches!(self, QueuedJob::Action {
            action: Action::Stop { .. },
            ..
        })
    }

    fn survives_restart(&self) -> bool {
        matches!(self, QueuedJob::Action {
            action: Action::Stop { .. } | Action::Restart,
            ..
        })
    }
}

/// Cancel queued jobs that do not survive the incoming action, completing them
/// with `Interrupted`.
pub(crate) fn apply_preemption(queue: &mut VecDeque<QueuedJob>, keep: impl Fn(&QueuedJob) -> bool) {
    let mut kept = VecDeque::with_capacity(queue.len());
    for job in queue.drain(..) {
        if keep(&job) {
            kept.push_back(job);
        } else {
            job.fail(RuntimeError::Interrupted);
        }
    }
    *queue = kept;
}

pub(crate) struct RuntimeOptions {
    pub events: Vec<EventKind>,
    pub control_password: Option<String>,
    pub take_ownership: bool,
    pub enable_network_on_start: bool,
    pub readiness_timeout: Duration,
    pub shutdown_grace: Duration,
    pub newnym_rate_limit_window: Duration,
    /// Destroy the runtime when the host application shuts down.
    pub shutdown_signal: Option<ShutdownSignal>,
}

struct RunningTor {
    client: ControlClient,
    process: TorProcess,
    process_events: mpsc::Receiver<ProcessEvent>,
    process_closed: bool,
    control_events: broadcast::Receiver<Arc<ControlEvent>>,
    control_closed: bool,
    torrc_path: PathBuf,
    defaults_path: PathBuf,
    control_port_file: PathBuf,
}

enum Wake {
    Request(Option<RuntimeRequest>),
    Process(Option<ProcessEvent>),
    Control(Result<Arc<ControlEvent>, broadcast::error::RecvError>),
    Shutdown,
}

/// Pending forever when no signal was configured.
async fn wait_or_never(signal: Option<&mut ShutdownSignal>) {
    match signal {
        Some(signal) => signal.wait().await,
        None => std::future::pending().await,
    }
}

pub(crate) struct RuntimeActor {
    base_dir: PathBuf,
    config: TorConfig,
    options: RuntimeOptions,
    resource_provider: Arc<dyn ResourceProvider>,
    registry: Arc<ListenerRegistry>,
    state: TorState,
    state_tx: watch::Sender<TorState>,
    req_rx: mpsc::UnboundedReceiver<RuntimeRequest>,
    queue: VecDeque<QueuedJob>,
    running: Option<RunningTor>,
    shutdown_signal: Option<ShutdownSignal>,
}

impl RuntimeActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_dir: PathBuf,
        config: TorConfig,
        options: RuntimeOptions,
        resource_provider: Arc<dyn ResourceProvider>,
        registry: Arc<ListenerRegistry>,
        state_tx: watch::Sender<TorState>,
        req_rx: mpsc::UnboundedReceiver<RuntimeRequest>,
    ) -> Self {
        let shutdown_signal = options.shutdown_signal.clone();
        Self {
            base_dir,
            config,
            options,
            resource_provider,
            registry,
            state: TorState::new(),
            state_tx,
            req_rx,
            queue: VecDeque::new(),
            running: None,
            shutdown_signal,
        }
    }

    pub async fn run(mut self) {
        loop {
            // Apply submissions (and their preemption effects) before picking
            // the next job, so a Stop raced against queued work wins.
            loop {
                match self.req_rx.try_recv() {
                    Ok(RuntimeRequest::Destroy { done }) => {
                        self.destroy().await;
                        let _ = done.send(());
                        return;
                    },
                    Ok(req) => self.enqueue(req),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        self.destroy().await;
                        return;
                    },
                }
            }

            if let Some(job) = self.queue.pop_front() {
                self.execute(job).await;
                continue;
            }

            let wake = match self.running.as_mut() {
                Some(running) => {
                    tokio::select! {
                        req = self.req_rx.recv() => Wake::Request(req),
                        ev = running.process_events.recv(), if !running.process_closed => Wake::Process(ev),
                        ev = running.control_events.recv(), if !running.control_closed => Wake::Control(ev),
                        _ = wait_or_never(self.shutdown_signal.as_mut()) => Wake::Shutdown,
                    }
                },
                None => {
                    tokio::select! {
                        req = self.req_rx.recv() => Wake::Request(req),
                        _ = wait_or_never(self.shutdown_signal.as_mut()) => Wake::Shutdown,
                    }
                },
            };

            match wake {
                Wake::Request(Some(RuntimeRequest::Destroy { done })) => {
                    self.destroy().await;
                    let _ = done.send(());
                    return;
                },
                Wake::Request(Some(req)) => self.enqueue(req),
                Wake::Request(None) => {
                    self.destroy().await;
                    return;
                },
                Wake::Process(Some(ProcessEvent::Exited { exit_code })) => {
                    self.on_unexpected_exit(exit_code).await;
                },
                Wake::Process(Some(event)) => self.observe_process_event(event),
                Wake::Process(None) => {
                    // Line pumps drained after exit; nothing further to observe
                    if let Some(running) = self.running.as_mut() {
                        running.process_closed = true;
                    }
                },
                Wake::Control(Ok(event)) => self.observe_control_event(event),
                Wake::Control(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!(target: LOG_TARGET, "Event bus lagged; {} control events dropped", missed);
                },
                Wake::Control(Err(broadcast::error::RecvError::Closed)) => {
                    if let Some(running) = self.running.as_mut() {
                        running.control_closed = true;
                    }
                },
                Wake::Shutdown => {
                    info!(target: LOG_TARGET, "Shutdown signal received");
                    self.destroy().await;
                    return;
                },
            }
        }
    }

    fn enqueue(&mut self, req: RuntimeRequest) {
        match req {
            RuntimeRequest::Action { action, completer } => {
                match action {
                    Action::Stop { .. } => {
                        apply_preemption(&mut self.queue, QueuedJob::survives_stop);
                    },
                    Action::Restart if self.state.daemon.is_on() => {
                        apply_preemption(&mut self.queue, QueuedJob::survives_restart);
                    },
                    _ => {},
                }
                self.queue.push_back(QueuedJob::Action { action, completer });
            },
            RuntimeRequest::Command { command, completer } => {
                // Commands are accepted only while the daemon is on
                if !self.state.daemon.is_on() {
                    completer.complete(Err(RuntimeError::NotReady));
                    return;
                }
                self.queue.push_back(QueuedJob::Command { command, completer });
            },
            RuntimeRequest::Destroy { .. } => unreachable!("destroy is handled by the caller"),
        }
    }

    async fn execute(&mut self, job: QueuedJob) {
        match job {
            QueuedJob::Action { action, completer } => {
                if completer.is_cancelled() {
                    completer.complete(Err(RuntimeError::Cancelled));
                    return;
                }
                debug!(target: LOG_TARGET, "Executing {:?}", action);
                let result = match action {
                    Action::Start => self.do_start().await,
                    Action::Stop { graceful } => self.do_stop(graceful).await,
                    Action::Restart => self.do_restart().await,
                };
                if let Err(err) = &result {
                    error!(target: LOG_TARGET, "{:?} failed: {}", action, err);
                }
                completer.complete(result);
            },
            QueuedJob::Command { command, completer } => {
                if completer.is_cancelled() {
                    completer.complete(Err(RuntimeError::Cancelled));
                    return;
                }
                // Accepted while the daemon was on; losing it since then is a
                // disconnection, not a submission error
                if !self.state.daemon.is_on() {
                    completer.complete(Err(embedtor_control::ControlError::Disconnected.into()));
                    return;
                }
                let result = self.do_command(command).await;
                completer.complete(result);
            },
        }
    }

    // --- lifecycle -------------------------------------------------------

    async fn do_start(&mut self) -> Result<(), RuntimeError> {
        if self.state.daemon.is_on() || self.state.daemon == DaemonState::Starting {
            // Idempotent
            return Ok(());
        }
        self.state.set_starting();
        self.publish_state();

        match self.launch().await {
            Ok(running) => {
                self.running = Some(running);
                Ok(())
            },
            Err(err) => {
                self.state.set_off();
                self.publish_state();
                Err(err)
            },
        }
    }

    async fn launch(&mut self) -> Result<RunningTor, RuntimeError> {
        let resources = self.resource_provider.resources().await?;

        tokio::fs::create_dir_all(&self.base_dir).await?;
        if let Some(data_dir) = self.config.data_directory() {
            tokio::fs::create_dir_all(&data_dir).await?;
        }

        let torrc_path = self.base_dir.join("torrc");
        let defaults_path = self.base_dir.join("torrc-defaults");
        let subset = self.config.minimum_startup_subset();
        tokio::fs::write(&torrc_path, subset.to_torrc()).await?;

        let control_port_file = self
            .config
            .control_port_file()
            .ok_or(RuntimeError::ReadinessTimeout)?;
        // A stale file from a previous run must not satisfy readiness
        let _ = tokio::fs::remove_file(&control_port_file).await;

        let (process, mut process_events) = TorProcess::spawn(&resources, &torrc_path, &defaults_path).await?;

        // Wait for the control endpoint while fanning out process output
        let endpoint = {
            let readiness = supervisor::await_control_endpoint(&control_port_file, self.options.readiness_timeout);
            tokio::pin!(readiness);
            loop {
                tokio::select! {
                    result = &mut readiness => break result,
                    ev = process_events.recv() => match ev {
                        Some(ProcessEvent::Exited { exit_code }) => {
                            self.cleanup_files(&torrc_path, &defaults_path, &control_port_file).await;
                            return Err(RuntimeError::EarlyExit { exit_code });
                        },
                        Some(event) => self.observe_process_event(event),
                        None => {
                            self.cleanup_files(&torrc_path, &defaults_path, &control_port_file).await;
                            return Err(RuntimeError::EarlyExit { exit_code: None });
                        },
                    },
                }
            }
        };
        let endpoint = match endpoint {
            Ok(endpoint) => endpoint,
            Err(err) => {
                process.kill().await;
                self.cleanup_files(&torrc_path, &defaults_path, &control_port_file).await;
                return Err(err);
            },
        };

        let connected = async {
            let auth = self.select_authentication().await;
            let client = ControlClient::connect(&endpoint, auth, ConnectOptions {
                take_ownership: self.options.take_ownership,
                events: self.options.events.clone(),
            })
            .await?;

            // Re-apply the full configuration over the preserved startup
            // subset, then bring the network up
            client.load_conf(self.config.to_torrc()).await?;
            if self.options.enable_network_on_start {
                client
                    .set_conf(vec![("DisableNetwork".to_string(), Some("0".to_string()))])
                    .await?;
            }
            Ok::<_, RuntimeError>(client)
        }
        .await;

        let client = match connected {
            Ok(client) => client,
            Err(err) => {
                process.kill().await;
                self.cleanup_files(&torrc_path, &defaults_path, &control_port_file).await;
                return Err(err);
            },
        };

        if self.options.enable_network_on_start {
            self.state.set_network(true);
            self.publish_state();
        }

        let control_events = client.subscribe_events();
        info!(target: LOG_TARGET, "tor is up; control session ready");
        Ok(RunningTor {
            client,
            process,
            process_events,
            process_closed: false,
            control_events,
            control_closed: false,
            torrc_path,
            defaults_path,
            control_port_file,
        })
    }

    async fn do_stop(&mut self, graceful: bool) -> Result<(), RuntimeError> {
        if self.state.daemon == DaemonState::Off {
            // Idempotent
            return Ok(());
        }
        self.state.set_stopping();
        self.publish_state();

        if let Some(mut running) = self.running.take() {
            if graceful && running.client.is_connected() {
                if let Err(err) = running.client.signal(TorSignal::Shutdown).await {
                    warn!(target: LOG_TARGET, "SIGNAL SHUTDOWN failed ({}); escalating to kill", err);
                }
                running.client.disconnect(true).await;

                let grace = tokio::time::sleep(self.options.shutdown_grace);
                tokio::pin!(grace);
                let mut exited = false;
                while !exited {
                    tokio::select! {
                        _ = &mut grace => break,
                        ev = running.process_events.recv() => match ev {
                            Some(ProcessEvent::Exited { .. }) | None => exited = true,
                            Some(event) => self.observe_process_event(event),
                        },
                    }
                }
                if !exited {
                    warn!(target: LOG_TARGET, "tor did not exit within the grace period; killing");
                    running.process.kill().await;
                }
            } else {
                running.client.disconnect(false).await;
                running.process.kill().await;
            }
            self.cleanup_files(&running.torrc_path, &running.defaults_path, &running.control_port_file)
                .await;
        }

        self.state.set_off();
        self.publish_state();
        Ok(())
    }

    async fn do_restart(&mut self) -> Result<(), RuntimeError> {
        if self.state.daemon == DaemonState::Off {
            // Equivalent to Start
            return self.do_start().await;
        }
        self.do_stop(true).await?;
        self.do_start().await
    }

    async fn on_unexpected_exit(&mut self, exit_code: Option<i32>) {
        warn!(target: LOG_TARGET, "tor exited unexpectedly (code {:?})", exit_code);
        if let Some(running) = self.running.take() {
            running.client.disconnect(false).await;
            self.cleanup_files(&running.torrc_path, &running.defaults_path, &running.control_port_file)
                .await;
        }
        self.state.set_off();
        self.publish_state();
        self.registry.dispatch(&TorEvent::Crashed { exit_code });
    }

    async fn destroy(&mut self) {
        debug!(target: LOG_TARGET, "Destroying runtime");
        while let Some(job) = self.queue.pop_front() {
            job.fail(RuntimeError::Interrupted);
        }
        if let Some(running) = self.running.take() {
            running.client.disconnect(false).await;
            running.process.kill().await;
            self.cleanup_files(&running.torrc_path, &running.defaults_path, &running.control_port_file)
                .await;
        }
        self.state.set_off();
        self.publish_state();
        self.registry.clear_non_static();
    }

    // --- commands --------------------------------------------------------

    async fn do_command(&mut self, command: Command) -> Result<CommandOutput, RuntimeError> {
        let client = match &self.running {
            Some(running) => running.client.clone(),
            None => return Err(RuntimeError::NotReady),
        };

        // SETCONF DisableNetwork is mirrored into the network state
        let network_change = match &command {
            Command::ConfigSet { entries } => entries
                .iter()
                .rev()
                .find(|(keyword, _)| keyword.eq_ignore_ascii_case("DisableNetwork"))
                .and_then(|(_, value)| value.as_deref())
                .map(|value| value == "0"),
            _ => None,
        };

        let output = if let Command::Signal(TorSignal::NewNym) = &command {
            self.newnym(&client).await?
        } else {
            client.execute(command)?.wait().await?
        };

        if let Some(enabled) = network_change {
            self.state.set_network(enabled);
            self.publish_state();
        }
        Ok(output)
    }

    /// SIGNAL NEWNYM, folding a trailing "Rate limiting NEWNYM request"
    /// NOTICE into the success result.
    async fn newnym(&self, client: &ControlClient) -> Result<CommandOutput, RuntimeError> {
        let mut events = client.subscribe_events();
        client.signal(TorSignal::NewNym).await?;

        let mut status = NewNymStatus::default();
        let window = tokio::time::sleep(self.options.newnym_rate_limit_window);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                ev = events.recv() => match ev {
                    Ok(event) => {
                        if let Some(delay) = event.newnym_rate_limit() {
                            status.rate_limited = Some(delay);
                            break;
                        }
                    },
                    Err(_) => break,
                },
            }
        }
        Ok(CommandOutput::NewNym(status))
    }

    // --- observations ----------------------------------------------------

    fn observe_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Log(line) => {
                self.registry.dispatch(&TorEvent::ProcessLog { line });
            },
            ProcessEvent::Bootstrap(progress) => {
                if self.state.observe_bootstrap(progress) {
                    self.publish_state();
                }
            },
            ProcessEvent::ListenerOpened { kind, address } => {
                self.registry.dispatch(&TorEvent::ListenerOpened { kind, address });
            },
            ProcessEvent::ListenerClosed { kind, address } => {
                self.registry.dispatch(&TorEvent::ListenerClosed { kind, address });
            },
            ProcessEvent::Exited { .. } => {
                // Handled by the caller
            },
        }
    }

    fn observe_control_event(&mut self, event: Arc<ControlEvent>) {
        if let Some(status) = event.bootstrap_status() {
            if self.state.observe_bootstrap(status.progress) {
                self.publish_state();
            }
        }
        if let Some(changed) = event.conf_changed() {
            if let Some(value) = changed.get("DisableNetwork") {
                let enabled = value.as_deref() == Some("0");
                if (self.state.network == NetworkState::Enabled) != enabled {
                    self.state.set_network(enabled);
                    self.publish_state();
                }
            }
        }
        self.registry.dispatch(&TorEvent::Control(event));
    }

    fn publish_state(&self) {
        let _ = self.state_tx.send(self.state);
        self.registry.dispatch(&TorEvent::State(self.state));
    }

    async fn select_authentication(&self) -> Authentication {
        if let Some(path) = self.config.cookie_auth_file() {
            if tokio::fs::metadata(&path).await.is_ok() {
                return Authentication::CookieFile(path);
            }
            if self.options.control_password.is_none() {
                // Let the connect attempt surface a meaningful error
                return Authentication::CookieFile(path);
            }
        }
        match &self.options.control_password {
            Some(password) => Authentication::Password(password.clone()),
            None => Authentication::None,
        }
    }

    async fn cleanup_files(&self, torrc: &std::path::Path, defaults: &std::path::Path, control_port_file: &std::path::Path) {
        for path in [torrc, defaults, control_port_file] {
            if let Err(err) = tokio::fs::remove_file(path).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: LOG_TARGET, "Could not remove {}: {}", path.display(), err);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::job::job_pair;

    fn action_job(action: Action) -> (QueuedJob, crate::job::RuntimeJob<()>) {
        let (job, completer) = job_pair();
        (QueuedJob::Action { action, completer }, job)
    }

    fn command_job() -> (QueuedJob, crate::job::RuntimeJob<CommandOutput>) {
        let (job, completer) = job_pair();
        (
            QueuedJob::Command {
                command: Command::DropGuards,
                completer,
            },
            job,
        )
    }

    #[tokio::test]
    async fn stop_preempts_everything_but_stop() {
        let mut queue = VecDeque::new();
        let (start, start_handle) = action_job(Action::Start);
        let (stop, stop_handle) = action_job(Action::Stop { graceful: true });
        let (restart, restart_handle) = action_job(Action::Restart);
        let (command, command_handle) = command_job();
        queue.extend([start, stop, restart, command]);

        apply_preemption(&mut queue, QueuedJob::survives_stop);
        assert_eq!(queue.len(), 1);

        assert!(matches!(
            start_handle.wait().await.unwrap_err(),
            RuntimeError::Interrupted
        ));
        assert!(matches!(
            restart_handle.wait().await.unwrap_err(),
            RuntimeError::Interrupted
        ));
        assert!(matches!(
            command_handle.wait().await.unwrap_err(),
            RuntimeError::Interrupted
        ));
        drop(stop_handle);
    }

    #[tokio::test]
    async fn restart_preempts_commands_and_start_but_not_stop_or_restart() {
        let mut queue = VecDeque::new();
        let (start, start_handle) = action_job(Action::Start);
        let (stop, _stop_handle) = action_job(Action::Stop { graceful: false });
        let (restart, _restart_handle) = action_job(Action::Restart);
        let (command, command_handle) = command_job();
        queue.extend([start, stop, restart, command]);

        apply_preemption(&mut queue, QueuedJob::survives_restart);
        assert_eq!(queue.len(), 2);

        assert!(matches!(
            start_handle.wait().await.unwrap_err(),
            RuntimeError::Interrupted
        ));
        assert!(matches!(
            command_handle.wait().await.unwrap_err(),
            RuntimeError::Interrupted
        ));
    }
}
