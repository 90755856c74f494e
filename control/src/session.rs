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

//! The control session: one authenticated channel to the tor process.
//!
//! A session task owns the framed socket and serializes command submission with
//! at most one command in flight. Reply frames are routed to the submitter in
//! submission order; `650` event frames are routed to the event bus at any
//! point, including between the lines of a reply.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use log::{debug, error, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, mpsc, oneshot, watch},
    time,
};
use tokio_util::codec::Framed;

use crate::{
    codec::{ControlCodec, ControlFrame, ReplySep, WireCommand},
    error::ControlError,
    event::{ControlEvent, EventLine},
    response::ResponseLine,
};

const LOG_TARGET: &str = "control::session";

/// How long a graceful disconnect waits for tor to half-close after QUIT.
const QUIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of a control session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    AuthFailed,
    Ready,
    Closing,
    Closed,
}

/// Shared cancellation state between a [SessionJob] and its queue entry.
#[derive(Debug, Default)]
pub(crate) struct CancelHandle {
    flag: AtomicBool,
    notify: tokio::sync::Notify,
}

impl CancelHandle {
    pub(crate) fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A queued or in-flight command submission.
pub(crate) struct PendingCommand {
    pub command: WireCommand,
    pub reply_tx: oneshot::Sender<Result<Vec<ResponseLine>, ControlError>>,
    pub cancelled: Arc<CancelHandle>,
}

impl PendingCommand {
    fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    fn complete(self, result: Result<Vec<ResponseLine>, ControlError>) {
        let result = if self.is_cancelled() { Err(ControlError::Cancelled) } else { result };
        let _ = self.reply_tx.send(result);
    }
}

pub(crate) enum SessionMessage {
    Execute(PendingCommand),
    Disconnect { graceful: bool, done: oneshot::Sender<()> },
}

/// The waiter side of a submitted command.
#[derive(Debug)]
pub struct SessionJob {
    rx: oneshot::Receiver<Result<Vec<ResponseLine>, ControlError>>,
    cancelled: Arc<CancelHandle>,
}

impl SessionJob {
    /// Request cancellation. A command still in the queue completes with
    /// `Cancelled` without touching the wire; a command already written has its
    /// full reply consumed and then discarded. The waiter unblocks immediately
    /// either way.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    pub async fn wait(mut self) -> Result<Vec<ResponseLine>, ControlError> {
        tokio::select! {
            // A result that already arrived wins over a late cancel
            biased;
            result = &mut self.rx => match result {
                Ok(result) => result,
                Err(_) if self.cancelled.is_cancelled() => Err(ControlError::Cancelled),
                Err(_) => Err(ControlError::Disconnected),
            },
            _ = self.cancelled.notify.notified() => Err(ControlError::Cancelled),
        }
    }
}

/// Cloneable handle to a running session task.
#[derive(Clone, Debug)]
pub struct ControlSession {
    msg_tx: mpsc::UnboundedSender<SessionMessage>,
    event_tx: broadcast::Sender<Arc<ControlEvent>>,
    state_rx: watch::Receiver<SessionState>,
}

impl ControlSession {
    /// Spawn the session task over an authenticated framed socket.
    pub(crate) fn spawn<S>(
        framed: Framed<S, ControlCodec>,
        state_tx: watch::Sender<SessionState>,
        state_rx: watch::Receiver<SessionState>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let actor = SessionActor {
            framed,
            msg_rx,
            event_tx: event_tx.clone(),
            state_tx,
            queue: VecDeque::new(),
            in_flight: None,
            event_lines: Vec::new(),
        };
        tokio::spawn(actor.run());
        Self {
            msg_tx,
            event_tx,
            state_rx,
        }
    }

    /// Enqueue a raw command. Replies arrive in submission order.
    pub(crate) fn execute_wire(&self, command: WireCommand) -> SessionJob {
        let (reply_tx, rx) = oneshot::channel();
        let cancelled = Arc::new(CancelHandle::default());
        let pending = PendingCommand {
            command,
            reply_tx,
            cancelled: cancelled.clone(),
        };
        if let Err(mpsc::error::SendError(msg)) = self.msg_tx.send(SessionMessage::Execute(pending)) {
            if let SessionMessage::Execute(pending) = msg {
                let _ = pending.reply_tx.send(Err(ControlError::Disconnected));
            }
        }
        SessionJob { rx, cancelled }
    }

    /// Subscribe to the asynchronous events routed off this session.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<ControlEvent>> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Close the session. A graceful disconnect writes QUIT and waits for the
    /// channel's half-close; a forced one drops the transport immediately.
    /// Either way every waiting and pending command completes with
    /// `Disconnected`, in submission order.
    pub async fn disconnect(&self, graceful: bool) {
        let (done, rx) = oneshot::channel();
        if self
            .msg_tx
            .send(SessionMessage::Disconnect { graceful, done })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

struct InFlight {
    pending: PendingCommand,
    lines: Vec<ResponseLine>,
}

struct SessionActor<S> {
    framed: Framed<S, ControlCodec>,
    msg_rx: mpsc::UnboundedReceiver<SessionMessage>,
    event_tx: broadcast::Sender<Arc<ControlEvent>>,
    state_tx: watch::Sender<SessionState>,
    queue: VecDeque<PendingCommand>,
    in_flight: Option<InFlight>,
    event_lines: Vec<EventLine>,
}

impl<S> SessionActor<S>
where S: AsyncRead + AsyncWrite + Send + Unpin + 'static
{
    async fn run(mut self) {
        loop {
            if self.in_flight.is_none() {
                if let Err(err) = self.write_next().await {
                    error!(target: LOG_TARGET, "Failed to write command: {}", err);
                    self.close(Some(err)).await;
                    return;
                }
            }
            tokio::select! {
                msg = self.msg_rx.recv() => {
                    match msg {
                        Some(SessionMessage::Execute(pending)) => {
                            self.queue.push_back(pending);
                        },
                        Some(SessionMessage::Disconnect { graceful, done }) => {
                            self.disconnect(graceful).await;
                            let _ = done.send(());
                            return;
                        },
                        None => {
                            // All handles are gone; nobody can observe results
                            self.close(None).await;
                            return;
                        },
                    }
                },
                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(frame)) => {
                            if let Err(err) = self.handle_frame(frame) {
                                error!(target: LOG_TARGET, "Control stream error: {}", err);
                                self.close(Some(err)).await;
                                return;
                            }
                        },
                        Some(Err(err)) => {
                            error!(target: LOG_TARGET, "Control stream error: {}", err);
                            self.close(Some(err)).await;
                            return;
                        },
                        None => {
                            debug!(target: LOG_TARGET, "Control stream closed by peer");
                            self.close(None).await;
                            return;
                        },
                    }
                },
            }
        }
    }

    /// Dequeue until a live command is written or the queue is empty. Cancelled
    /// entries complete without touching the wire.
    async fn write_next(&mut self) -> Result<(), ControlError> {
        while let Some(next) = self.queue.pop_front() {
            if next.is_cancelled() {
                next.complete(Err(ControlError::Cancelled));
                continue;
            }
            trace!(target: LOG_TARGET, "-> {}", next.command);
            self.framed.send(next.command.clone()).await?;
            self.in_flight = Some(InFlight {
                pending: next,
                lines: Vec::new(),
            });
            break;
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: ControlFrame) -> Result<(), ControlError> {
        match frame {
            ControlFrame::EventLine { sep, payload, .. } => {
                self.event_lines.push(EventLine {
                    payload,
                    data: Vec::new(),
                });
                if sep == ReplySep::End {
                    self.publish_event();
                }
            },
            ControlFrame::EventData { lines } => {
                if let Some(last) = self.event_lines.last_mut() {
                    last.data = lines;
                }
            },
            ControlFrame::ReplyLine { code, sep, payload } => {
                let in_flight = self.in_flight.as_mut().ok_or_else(|| {
                    ControlError::ProtocolViolation(format!("unsolicited reply line '{}{:?}'", code, payload))
                })?;
                let is_end = sep == ReplySep::End;
                in_flight.lines.push(ResponseLine::new(code, is_end, payload));
                if is_end {
                    let done = self.in_flight.take().expect("checked above");
                    done.pending.complete(Ok(done.lines));
                }
            },
            ControlFrame::ReplyData { lines } => {
                let in_flight = self
                    .in_flight
                    .as_mut()
                    .ok_or_else(|| ControlError::ProtocolViolation("unsolicited data block".to_string()))?;
                if let Some(last) = in_flight.lines.last_mut() {
                    last.data = Some(lines);
                }
            },
        }
        Ok(())
    }

    fn publish_event(&mut self) {
        let lines = std::mem::take(&mut self.event_lines);
        match ControlEvent::from_lines(lines) {
            Ok(event) => {
                trace!(target: LOG_TARGET, "<- 650 {}", event.raw_kind);
                // No receivers is fine
                let _ = self.event_tx.send(Arc::new(event));
            },
            Err(err) => {
                warn!(target: LOG_TARGET, "Discarding malformed event: {}", err);
            },
        }
    }

    async fn disconnect(&mut self, graceful: bool) {
        let _ = self.state_tx.send(SessionState::Closing);
        if graceful {
            debug!(target: LOG_TARGET, "Sending QUIT");
            if self.framed.send(WireCommand::new("QUIT")).await.is_ok() {
                // Wait for the half-close; tor acks with 250 then closes
                let drain = async {
                    while let Some(frame) = self.framed.next().await {
                        if frame.is_err() {
                            break;
                        }
                    }
                };
                if time::timeout(QUIT_DRAIN_TIMEOUT, drain).await.is_err() {
                    warn!(target: LOG_TARGET, "Timed out waiting for tor to close after QUIT");
                }
            }
        }
        self.close(None).await;
    }

    /// Fail the in-flight command and then every queued command, in submission
    /// order. The in-flight waiter receives the underlying error; queued ones
    /// receive `Disconnected`.
    async fn close(&mut self, cause: Option<ControlError>) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.pending.complete(Err(cause.unwrap_or(ControlError::Disconnected)));
        }
        while let Some(pending) = self.queue.pop_front() {
            pending.complete(Err(ControlError::Disconnected));
        }
        // Drain submissions raced against the close
        while let Ok(msg) = self.msg_rx.try_recv() {
            match msg {
                SessionMessage::Execute(pending) => pending.complete(Err(ControlError::Disconnected)),
                SessionMessage::Disconnect { done, .. } => {
                    let _ = done.send(());
                },
            }
        }
        let _ = self.state_tx.send(SessionState::Closed);
    }
}

/// Sequential request/response over a framed control socket, used during the
/// connect/authenticate phase before the session task takes over. Event frames
/// are discarded.
pub(crate) async fn request_over<S>(
    framed: &mut Framed<S, ControlCodec>,
    command: WireCommand,
) -> Result<Vec<ResponseLine>, ControlError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    trace!(target: LOG_TARGET, "-> {}", command);
    framed.send(command).await?;
    let mut lines: Vec<ResponseLine> = Vec::new();
    loop {
        let frame = framed.next().await.ok_or(ControlError::Disconnected)??;
        match frame {
            ControlFrame::ReplyLine { code, sep, payload } => {
                let is_end = sep == ReplySep::End;
                lines.push(ResponseLine::new(code, is_end, payload));
                if is_end {
                    return Ok(lines);
                }
            },
            ControlFrame::ReplyData { lines: data } => {
                if let Some(last) = lines.last_mut() {
                    last.data = Some(data);
                }
            },
            ControlFrame::EventLine { .. } | ControlFrame::EventData { .. } => continue,
        }
    }
}

#[cfg(test)]
mod test {
    use embedtor_test_utils::unpack_enum;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use super::*;

    fn spawn_session(peer_buffer: usize) -> (ControlSession, DuplexStream) {
        let (ours, theirs) = duplex(peer_buffer);
        let framed = Framed::new(ours, ControlCodec::new());
        let (state_tx, state_rx) = watch::channel(SessionState::Ready);
        let session = ControlSession::spawn(framed, state_tx, state_rx);
        (session, theirs)
    }

    async fn read_available(peer: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 4096];
        let n = peer.read(&mut buf).await.unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn replies_arrive_in_submission_order() {
        let (session, mut peer) = spawn_session(4096);

        let job1 = session.execute_wire(WireCommand::new("GETINFO version"));
        let job2 = session.execute_wire(WireCommand::new("GETINFO uptime"));

        // Only the first command may be on the wire until its reply completes
        let written = read_available(&mut peer).await;
        assert_eq!(written, "GETINFO version\r\n");

        peer.write_all(b"250-version=0.4.8.9\r\n250 OK\r\n").await.unwrap();
        let lines = job1.wait().await.unwrap();
        assert_eq!(lines[0].value, "version=0.4.8.9");

        let written = read_available(&mut peer).await;
        assert_eq!(written, "GETINFO uptime\r\n");
        peer.write_all(b"250-uptime=5\r\n250 OK\r\n").await.unwrap();
        let lines = job2.wait().await.unwrap();
        assert_eq!(lines[0].value, "uptime=5");
    }

    #[tokio::test]
    async fn events_route_to_the_bus_even_mid_reply() {
        let (session, mut peer) = spawn_session(4096);
        let mut events = session.subscribe_events();

        let job = session.execute_wire(WireCommand::new("GETINFO version"));
        let _ = read_available(&mut peer).await;

        peer.write_all(b"250-version=1\r\n650 NOTICE interleaved\r\n250 OK\r\n")
            .await
            .unwrap();

        let lines = job.wait().await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].value, "version=1");

        let event = events.recv().await.unwrap();
        assert_eq!(event.raw_kind, "NOTICE");
        assert_eq!(event.payload, "interleaved");
    }

    #[tokio::test]
    async fn multi_line_events_are_assembled() {
        let (session, mut peer) = spawn_session(4096);
        let mut events = session.subscribe_events();

        peer.write_all(b"650-CONF_CHANGED\r\n650-SocksPort=9050\r\n650 OK\r\n")
            .await
            .unwrap();

        let received = embedtor_test_utils::collect_recv!(events, take = 1, timeout = Duration::from_secs(5));
        assert_eq!(received[0].raw_kind, "CONF_CHANGED");
        assert_eq!(received[0].lines.len(), 2);

        drop(session);
    }

    #[tokio::test]
    async fn queued_command_cancels_without_touching_the_wire() {
        let (session, mut peer) = spawn_session(4096);

        let job1 = session.execute_wire(WireCommand::new("GETINFO version"));
        let job2 = session.execute_wire(WireCommand::new("GETINFO uptime"));
        let _ = read_available(&mut peer).await;

        job2.cancel();
        let err = job2.wait().await.unwrap_err();
        unpack_enum!(ControlError::Cancelled = err);

        // The successor command is unaffected
        let job3 = session.execute_wire(WireCommand::new("GETINFO circuit-status"));
        peer.write_all(b"250 OK\r\n").await.unwrap();
        job1.wait().await.unwrap();

        let written = read_available(&mut peer).await;
        assert_eq!(written, "GETINFO circuit-status\r\n");
        peer.write_all(b"250 OK\r\n").await.unwrap();
        job3.wait().await.unwrap();
    }

    #[tokio::test]
    async fn in_flight_cancel_consumes_the_reply_and_reports_cancelled() {
        let (session, mut peer) = spawn_session(4096);

        let job1 = session.execute_wire(WireCommand::new("GETINFO version"));
        let job2 = session.execute_wire(WireCommand::new("GETINFO uptime"));
        let _ = read_available(&mut peer).await;

        // job1 is on the wire; cancel it mid-flight
        job1.cancel();
        peer.write_all(b"250-version=1\r\n250 OK\r\n").await.unwrap();
        let err = job1.wait().await.unwrap_err();
        unpack_enum!(ControlError::Cancelled = err);

        // job2's reply must not be corrupted by job1's lines
        let written = read_available(&mut peer).await;
        assert_eq!(written, "GETINFO uptime\r\n");
        peer.write_all(b"250-uptime=7\r\n250 OK\r\n").await.unwrap();
        let lines = job2.wait().await.unwrap();
        assert_eq!(lines[0].value, "uptime=7");
    }

    #[tokio::test]
    async fn peer_close_fails_pending_in_submission_order() {
        let (session, mut peer) = spawn_session(4096);

        let job1 = session.execute_wire(WireCommand::new("GETINFO version"));
        let job2 = session.execute_wire(WireCommand::new("GETINFO uptime"));
        let _ = read_available(&mut peer).await;

        drop(peer);

        let err = job1.wait().await.unwrap_err();
        unpack_enum!(ControlError::Disconnected = err);
        let err = job2.wait().await.unwrap_err();
        unpack_enum!(ControlError::Disconnected = err);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn protocol_violation_fails_the_in_flight_command() {
        let (session, mut peer) = spawn_session(4096);

        let job = session.execute_wire(WireCommand::new("GETINFO version"));
        let _ = read_available(&mut peer).await;

        peer.write_all(b"garbage without a code\r\n").await.unwrap();
        let err = job.wait().await.unwrap_err();
        unpack_enum!(ControlError::ProtocolViolation(_s) = err);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn graceful_disconnect_writes_quit() {
        let (session, mut peer) = spawn_session(4096);

        let disconnect = tokio::spawn({
            let session = session.clone();
            async move { session.disconnect(true).await }
        });

        let written = read_available(&mut peer).await;
        assert_eq!(written, "QUIT\r\n");
        peer.write_all(b"250 closing connection\r\n").await.unwrap();
        drop(peer);

        disconnect.await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        // Submissions after close complete with Disconnected
        let err = session
            .execute_wire(WireCommand::new("GETINFO version"))
            .wait()
            .await
            .unwrap_err();
        unpack_enum!(ControlError::Disconnected = err);
    }
}
