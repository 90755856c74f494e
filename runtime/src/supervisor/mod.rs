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

//! Spawns and supervises the tor child process: piped stdout/stderr with line
//! inspection, readiness via the control-port file, and forced kill.

mod lines;

use std::{
    path::Path,
    process::Stdio,
    time::Duration,
};

use embedtor_control::ControlAddress;
use log::{debug, info, trace};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{mpsc, oneshot},
    time,
    time::Instant,
};

use crate::{error::RuntimeError, resources::TorResources};

const LOG_TARGET: &str = "runtime::supervisor";

/// Initial poll interval while waiting for the control-port file.
const READINESS_POLL_INITIAL: Duration = Duration::from_millis(50);
const READINESS_POLL_MAX: Duration = Duration::from_millis(500);

/// An observation from the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProcessEvent {
    /// One line of stdout or stderr.
    Log(String),
    /// A `Bootstrapped N%` line.
    Bootstrap(u8),
    ListenerOpened { kind: String, address: String },
    ListenerClosed { kind: String, address: String },
    /// The process exited; no further events follow.
    Exited { exit_code: Option<i32> },
}

/// Handle to a running tor child. Dropping it kills the process
/// (`kill_on_drop`), but the runtime prefers an explicit [TorProcess::kill].
#[derive(Debug)]
pub(crate) struct TorProcess {
    kill_tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl TorProcess {
    /// Spawn tor with the mandated command line. The caller receives the
    /// process event stream alongside the handle.
    pub async fn spawn(
        resources: &TorResources,
        torrc_path: &Path,
        defaults_path: &Path,
    ) -> Result<(TorProcess, mpsc::Receiver<ProcessEvent>), RuntimeError> {
        // tor refuses --defaults-torrc pointing nowhere; an empty file is fine
        if !defaults_path.exists() {
            tokio::fs::write(defaults_path, b"").await?;
        }

        let mut command = Command::new(&resources.tor_executable);
        command
            .arg("--defaults-torrc")
            .arg(defaults_path)
            .arg("-f")
            .arg(torrc_path)
            .arg("--ignore-missing-torrc")
            .arg("--RunAsDaemon")
            .arg("0")
            .arg("--__OwningControllerProcess")
            .arg(std::process::id().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            target: LOG_TARGET,
            "Launching tor: {} -f {}",
            resources.tor_executable.display(),
            torrc_path.display()
        );
        let mut child = command.spawn().map_err(RuntimeError::LaunchFailed)?;
        info!(target: LOG_TARGET, "tor process launched (pid {:?})", child.id());

        let (event_tx, event_rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, event_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, event_tx.clone()));
        }

        let (kill_tx, kill_rx) = mpsc::channel(1);
        tokio::spawn(monitor(child, kill_rx, event_tx));

        Ok((TorProcess { kill_tx }, event_rx))
    }

    /// Kill the process and wait for it to be reaped. Idempotent.
    pub async fn kill(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.kill_tx.send(done_tx).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn monitor(mut child: Child, mut kill_rx: mpsc::Receiver<oneshot::Sender<()>>, tx: mpsc::Sender<ProcessEvent>) {
    let exit_code = tokio::select! {
        status = child.wait() => {
            status.ok().and_then(|s| s.code())
        },
        done = kill_rx.recv() => {
            debug!(target: LOG_TARGET, "Killing tor process");
            let _ = child.start_kill();
            let status = child.wait().await;
            if let Some(done) = done {
                let _ = done.send(());
            }
            status.ok().and_then(|s| s.code())
        },
    };
    info!(target: LOG_TARGET, "tor process exited with code {:?}", exit_code);
    let _ = tx.send(ProcessEvent::Exited { exit_code }).await;
    // The event channel closes once the line pumps drain; only kill requests
    // still need acknowledging
    drop(tx);
    while let Some(done) = kill_rx.recv().await {
        let _ = done.send(());
    }
}

async fn pump_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<ProcessEvent>) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: LOG_TARGET, "tor: {}", line);
        for event in inspect_line(&line) {
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Every line is republished as a log event; bootstrap and listener lines
/// additionally produce their typed events.
fn inspect_line(line: &str) -> Vec<ProcessEvent> {
    let mut events = vec![ProcessEvent::Log(line.to_string())];
    if let Some(progress) = lines::parse_bootstrap(line) {
        events.push(ProcessEvent::Bootstrap(progress));
    }
    if let Some((kind, address)) = lines::parse_listener_opened(line) {
        events.push(ProcessEvent::ListenerOpened { kind, address });
    }
    if let Some((kind, address)) = lines::parse_listener_closed(line) {
        events.push(ProcessEvent::ListenerClosed { kind, address });
    }
    events
}

/// Poll for the `ControlPortWriteToFile` file with a bounded backoff, and
/// strictly parse its first line into the control endpoint.
pub(crate) async fn await_control_endpoint(path: &Path, timeout: Duration) -> Result<ControlAddress, RuntimeError> {
    let deadline = Instant::now() + timeout;
    let mut delay = READINESS_POLL_INITIAL;
    loop {
        if let Ok(contents) = tokio::fs::read_to_string(path).await {
            if let Some(line) = contents.lines().next() {
                if !line.trim().is_empty() {
                    if let Ok(address) = ControlAddress::from_port_line(line) {
                        debug!(target: LOG_TARGET, "Control endpoint is {}", address);
                        return Ok(address);
                    }
                }
            }
        }
        if Instant::now() >= deadline {
            return Err(RuntimeError::ReadinessTimeout);
        }
        time::sleep(delay).await;
        delay = (delay * 3 / 2).min(READINESS_POLL_MAX);
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::{paths::create_temporary_data_path, unpack_enum};

    use super::*;

    #[test]
    fn inspect_line_tags_everything() {
        let events = inspect_line("[notice] Bootstrapped 45% (requesting_descriptors): Asking for relay descriptors");
        assert_eq!(events.len(), 2);
        unpack_enum!(ProcessEvent::Log(_line) = events[0].clone());
        assert_eq!(events[1], ProcessEvent::Bootstrap(45));

        let events = inspect_line("[notice] Opened Socks listener connection (ready) on 127.0.0.1:9050");
        assert_eq!(events[1], ProcessEvent::ListenerOpened {
            kind: "Socks".to_string(),
            address: "127.0.0.1:9050".to_string(),
        });
    }

    #[tokio::test]
    async fn readiness_parses_the_port_file() {
        let dir = create_temporary_data_path();
        let path = dir.path().join("control.txt");
        tokio::fs::write(&path, "PORT=127.0.0.1:9151\n").await.unwrap();

        let address = await_control_endpoint(&path, Duration::from_secs(1)).await.unwrap();
        unpack_enum!(ControlAddress::Tcp(addr) = address);
        assert_eq!(addr, "127.0.0.1:9151".parse().unwrap());
    }

    #[tokio::test]
    async fn readiness_times_out_when_the_file_never_appears() {
        let dir = create_temporary_data_path();
        let path = dir.path().join("control.txt");
        let err = await_control_endpoint(&path, Duration::from_millis(120)).await.unwrap_err();
        unpack_enum!(RuntimeError::ReadinessTimeout = err);
    }

    #[tokio::test]
    async fn readiness_waits_for_the_file_to_fill() {
        let dir = create_temporary_data_path();
        let path = dir.path().join("control.txt");
        tokio::fs::write(&path, "").await.unwrap();

        let writer = {
            let path = path.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(80)).await;
                tokio::fs::write(&path, "PORT=unix:/run/tor/control.sock\n").await.unwrap();
            })
        };

        let address = await_control_endpoint(&path, Duration::from_secs(2)).await.unwrap();
        unpack_enum!(ControlAddress::Unix(_path) = address);
        writer.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawns_and_observes_a_fake_tor() {
        use std::os::unix::fs::PermissionsExt;

        let dir = create_temporary_data_path();
        let script = dir.path().join("fake-tor");
        tokio::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '[notice] Bootstrapped 0% (starting): Starting'\n\
             echo '[notice] Opened Socks listener connection (ready) on 127.0.0.1:9050'\n\
             echo '[notice] Bootstrapped 100% (done): Done'\n",
        )
        .await
        .unwrap();
        let mut perms = tokio::fs::metadata(&script).await.unwrap().permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&script, perms).await.unwrap();

        let resources = TorResources::new(&script);
        let torrc = dir.path().join("torrc");
        let defaults = dir.path().join("torrc-defaults");
        tokio::fs::write(&torrc, "").await.unwrap();

        let (_process, mut events) = TorProcess::spawn(&resources, &torrc, &defaults).await.unwrap();

        let mut bootstraps = Vec::new();
        let mut listener_opened = false;
        let mut exited = false;
        // The channel closes once the pumps drain and the process is reaped
        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Bootstrap(p) => bootstraps.push(p),
                ProcessEvent::ListenerOpened { kind, .. } => {
                    assert_eq!(kind, "Socks");
                    listener_opened = true;
                },
                ProcessEvent::Exited { exit_code } => {
                    assert_eq!(exit_code, Some(0));
                    exited = true;
                },
                _ => {},
            }
        }
        assert_eq!(bootstraps, vec![0, 100]);
        assert!(listener_opened);
        assert!(exited);
    }

    #[tokio::test]
    async fn missing_executable_is_launch_failed() {
        let dir = create_temporary_data_path();
        let resources = TorResources::new(dir.path().join("no-such-tor"));
        let torrc = dir.path().join("torrc");
        let defaults = dir.path().join("torrc-defaults");
        tokio::fs::write(&torrc, "").await.unwrap();

        let err = TorProcess::spawn(&resources, &torrc, &defaults).await.unwrap_err();
        unpack_enum!(RuntimeError::LaunchFailed(_e) = err);
    }
}
