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

//! Typed client for the tor control port, layered over a [ControlSession].
//!
//! See the [Tor Control Port Spec](https://spec.torproject.org/control-spec/)
//! for the protocol details.

use std::sync::Arc;

use log::{debug, info};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{broadcast, watch},
};
use tokio_util::codec::Framed;

use crate::{
    address::ControlAddress,
    codec::ControlCodec,
    commands::{
        AddOnion,
        Authenticate,
        Authentication,
        ClientAuthEntry,
        Command,
        CommandOutput,
        ConfigEntry,
        DelOnion,
        DropGuards,
        DropOwnership,
        GetConf,
        GetInfo,
        HiddenServiceEntry,
        HsFetch,
        LoadConf,
        MapAddress,
        OnionClientAuthAdd,
        OnionClientAuthRemove,
        OnionClientAuthView,
        ResetConf,
        Resolve,
        SaveConf,
        SetConf,
        SetEvents,
        Signal,
        TakeOwnership,
        TorCommand,
        TorSignal,
    },
    error::ControlError,
    event::{ControlEvent, EventKind},
    response::ResponseLine,
    session::{request_over, ControlSession, SessionJob, SessionState},
    socket::ControlSocket,
};

const LOG_TARGET: &str = "control::client";

/// Options applied while establishing a session.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Send TAKEOWNERSHIP so tor exits when this control connection closes.
    pub take_ownership: bool,
    /// The initial SETEVENTS subscription.
    pub events: Vec<EventKind>,
}

/// A handle to an in-progress command: cancellable, and completing exactly once
/// with the command's typed output or an error.
pub struct CommandJob<T> {
    job: SessionJob,
    #[allow(clippy::type_complexity)]
    parse: Box<dyn FnOnce(Vec<ResponseLine>) -> Result<T, ControlError> + Send>,
}

impl<T: Send + 'static> CommandJob<T> {
    pub fn cancel(&self) {
        self.job.cancel();
    }

    pub async fn wait(self) -> Result<T, ControlError> {
        let lines = self.job.wait().await?;
        (self.parse)(lines)
    }

    fn map<U>(self, f: impl FnOnce(T) -> U + Send + 'static) -> CommandJob<U> {
        let parse = self.parse;
        CommandJob {
            job: self.job,
            parse: Box::new(move |lines| parse(lines).map(f)),
        }
    }
}

/// Client for the tor control port.
#[derive(Clone, Debug)]
pub struct ControlClient {
    session: ControlSession,
}

impl ControlClient {
    /// Connect to the control endpoint, authenticate, optionally take
    /// ownership, and install the initial event subscription.
    pub async fn connect(
        address: &ControlAddress,
        auth: Authentication,
        options: ConnectOptions,
    ) -> Result<Self, ControlError> {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        debug!(target: LOG_TARGET, "Connecting to tor control endpoint {}", address);
        let socket = match ControlSocket::connect(address).await {
            Ok(socket) => socket,
            Err(err) => {
                let _ = state_tx.send(SessionState::Closed);
                return Err(err.into());
            },
        };
        let framed = Framed::new(socket, ControlCodec::new());
        Self::establish(framed, auth, options, state_tx, state_rx).await
    }

    /// Establish a session over an already-connected socket. Used by tests and
    /// by callers with exotic transports.
    pub async fn connect_over<S>(
        socket: S,
        auth: Authentication,
        options: ConnectOptions,
    ) -> Result<Self, ControlError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let framed = Framed::new(socket, ControlCodec::new());
        Self::establish(framed, auth, options, state_tx, state_rx).await
    }

    async fn establish<S>(
        mut framed: Framed<S, ControlCodec>,
        auth: Authentication,
        options: ConnectOptions,
        state_tx: watch::Sender<SessionState>,
        state_rx: watch::Receiver<SessionState>,
    ) -> Result<Self, ControlError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let _ = state_tx.send(SessionState::Authenticating);
        let setup = async {
            let auth = resolve_authentication(auth).await?;
            let authenticate = Authenticate::new(auth);
            let responses = request_over(&mut framed, authenticate.to_wire_command()?).await?;
            authenticate.parse_responses(responses)?;

            if options.take_ownership {
                let cmd = TakeOwnership;
                let responses = request_over(&mut framed, cmd.to_wire_command()?).await?;
                cmd.parse_responses(responses)?;
            }

            let cmd = SetEvents::new(options.events.clone());
            let responses = request_over(&mut framed, cmd.to_wire_command()?).await?;
            cmd.parse_responses(responses)?;
            Ok::<_, ControlError>(())
        }
        .await;
        if let Err(err) = setup {
            if matches!(err, ControlError::AuthFailed(_)) {
                let _ = state_tx.send(SessionState::AuthFailed);
            }
            let _ = state_tx.send(SessionState::Closed);
            return Err(err);
        }

        info!(target: LOG_TARGET, "Control session established");
        let _ = state_tx.send(SessionState::Ready);
        let session = ControlSession::spawn(framed, state_tx, state_rx);
        Ok(Self { session })
    }

    /// Enqueue a typed command, returning its job handle.
    pub fn submit<C>(&self, command: C) -> Result<CommandJob<C::Output>, ControlError>
    where
        C: TorCommand + Send + 'static,
        C::Output: Send + 'static,
    {
        let wire = command.to_wire_command()?;
        let job = self.session.execute_wire(wire);
        Ok(CommandJob {
            job,
            parse: Box::new(move |lines| command.parse_responses(lines)),
        })
    }

    /// Enqueue a command descriptor, returning a job with the catalogue-level
    /// output type.
    pub fn execute(&self, command: Command) -> Result<CommandJob<CommandOutput>, ControlError> {
        let job = match command {
            Command::Authenticate(auth) => self.submit(Authenticate::new(auth))?.map(|_| CommandOutput::Unit),
            Command::ConfigGet { keys } => self.submit(GetConf::new(keys))?.map(CommandOutput::ConfigEntries),
            Command::ConfigLoad { text } => self.submit(LoadConf::new(text))?.map(|_| CommandOutput::Unit),
            Command::ConfigReset { keys } => self.submit(ResetConf::new(keys))?.map(|_| CommandOutput::Unit),
            Command::ConfigSave { force } => self.submit(SaveConf::new(force))?.map(|_| CommandOutput::Unit),
            Command::ConfigSet { entries } => self
                .submit(SetConf::with_entries(entries))?
                .map(|_| CommandOutput::Unit),
            Command::DropGuards => self.submit(DropGuards)?.map(|_| CommandOutput::Unit),
            Command::HsFetch { address, servers } => self
                .submit(HsFetch::new(address, servers))?
                .map(|_| CommandOutput::Unit),
            Command::InfoGet { keys } => self.submit(GetInfo::new(keys))?.map(CommandOutput::KeyValues),
            Command::MapAddress { mappings } => self
                .submit(MapAddress::new(mappings))?
                .map(CommandOutput::Mappings),
            Command::OnionAdd(add_onion) => self.submit(add_onion)?.map(CommandOutput::HiddenService),
            Command::OnionDelete { service_id } => {
                self.submit(DelOnion::new(service_id))?.map(|_| CommandOutput::Unit)
            },
            Command::OnionClientAuthAdd(add) => self.submit(add)?.map(|_| CommandOutput::Unit),
            Command::OnionClientAuthRemove { address } => self
                .submit(OnionClientAuthRemove::new(address))?
                .map(|_| CommandOutput::Unit),
            Command::OnionClientAuthView { address } => self
                .submit(OnionClientAuthView::new(address))?
                .map(CommandOutput::ClientAuthEntries),
            Command::OwnershipDrop => self.submit(DropOwnership)?.map(|_| CommandOutput::Unit),
            Command::OwnershipTake => self.submit(TakeOwnership)?.map(|_| CommandOutput::Unit),
            Command::Resolve { address, reverse } => self
                .submit(Resolve::new(address, reverse))?
                .map(|_| CommandOutput::Unit),
            Command::SetEvents { kinds } => self.submit(SetEvents::new(kinds))?.map(|_| CommandOutput::Unit),
            Command::Signal(signal) => self.submit(Signal::new(signal))?.map(|_| CommandOutput::Unit),
        };
        Ok(job)
    }

    pub async fn get_conf<I, S2>(&self, keys: I) -> Result<Vec<ConfigEntry>, ControlError>
    where
        I: IntoIterator<Item = S2>,
        S2: Into<String>,
    {
        self.submit(GetConf::new(keys))?.wait().await
    }

    pub async fn set_conf(&self, entries: Vec<(String, Option<String>)>) -> Result<(), ControlError> {
        self.submit(SetConf::with_entries(entries))?.wait().await
    }

    pub async fn reset_conf<I, S2>(&self, keys: I) -> Result<(), ControlError>
    where
        I: IntoIterator<Item = S2>,
        S2: Into<String>,
    {
        self.submit(ResetConf::new(keys))?.wait().await
    }

    pub async fn load_conf<T: Into<String>>(&self, text: T) -> Result<(), ControlError> {
        self.submit(LoadConf::new(text))?.wait().await
    }

    pub async fn save_conf(&self, force: bool) -> Result<(), ControlError> {
        self.submit(SaveConf::new(force))?.wait().await
    }

    pub async fn get_info<I, S2>(&self, keys: I) -> Result<std::collections::HashMap<String, String>, ControlError>
    where
        I: IntoIterator<Item = S2>,
        S2: Into<String>,
    {
        self.submit(GetInfo::new(keys))?.wait().await
    }

    pub async fn add_onion(&self, add_onion: AddOnion) -> Result<HiddenServiceEntry, ControlError> {
        self.submit(add_onion)?.wait().await
    }

    pub async fn del_onion(&self, service_id: embedtor_config::OnionAddressV3) -> Result<(), ControlError> {
        self.submit(DelOnion::new(service_id))?.wait().await
    }

    pub async fn onion_client_auth_add(&self, add: OnionClientAuthAdd) -> Result<(), ControlError> {
        self.submit(add)?.wait().await
    }

    pub async fn onion_client_auth_remove(
        &self,
        address: embedtor_config::OnionAddressV3,
    ) -> Result<(), ControlError> {
        self.submit(OnionClientAuthRemove::new(address))?.wait().await
    }

    pub async fn onion_client_auth_view(
        &self,
        address: Option<embedtor_config::OnionAddressV3>,
    ) -> Result<Vec<ClientAuthEntry>, ControlError> {
        self.submit(OnionClientAuthView::new(address))?.wait().await
    }

    pub async fn map_address(&self, mappings: Vec<(String, String)>) -> Result<Vec<(String, String)>, ControlError> {
        self.submit(MapAddress::new(mappings))?.wait().await
    }

    pub async fn resolve<S2: Into<String>>(&self, address: S2, reverse: bool) -> Result<(), ControlError> {
        self.submit(Resolve::new(address, reverse))?.wait().await
    }

    pub async fn hs_fetch(
        &self,
        address: embedtor_config::OnionAddressV3,
        servers: Vec<String>,
    ) -> Result<(), ControlError> {
        self.submit(HsFetch::new(address, servers))?.wait().await
    }

    pub async fn drop_guards(&self) -> Result<(), ControlError> {
        self.submit(DropGuards)?.wait().await
    }

    pub async fn signal(&self, signal: TorSignal) -> Result<(), ControlError> {
        self.submit(Signal::new(signal))?.wait().await
    }

    /// Atomically replace the active event subscription.
    pub async fn set_events(&self, kinds: Vec<EventKind>) -> Result<(), ControlError> {
        self.submit(SetEvents::new(kinds))?.wait().await
    }

    pub async fn take_ownership(&self) -> Result<(), ControlError> {
        self.submit(TakeOwnership)?.wait().await
    }

    pub async fn drop_ownership(&self) -> Result<(), ControlError> {
        self.submit(DropOwnership)?.wait().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<ControlEvent>> {
        self.session.subscribe_events()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.session.watch_state()
    }

    pub async fn disconnect(&self, graceful: bool) {
        self.session.disconnect(graceful).await;
    }
}

/// Turn a cookie-file reference into the cookie bytes. The file must hold
/// exactly 32 bytes.
pub async fn resolve_authentication(auth: Authentication) -> Result<Authentication, ControlError> {
    match auth {
        Authentication::CookieFile(path) => {
            let bytes = tokio::fs::read(&path).await.map_err(|source| ControlError::CookieRead {
                path: path.clone(),
                source,
            })?;
            if bytes.len() != 32 {
                return Err(ControlError::CookieMalformed {
                    path,
                    len: bytes.len(),
                });
            }
            Ok(Authentication::Cookie(bytes))
        },
        other => Ok(other),
    }
}
