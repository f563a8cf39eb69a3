//! Authenticated SSH session over an already-dialed stream

use std::sync::Arc;
use std::time::Instant;

use russh::client::KeyboardInteractiveAuthResponse;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh::{ChannelMsg, Disconnect, client};
use tracing::{debug, warn};

use crate::config::SshConnection;
use crate::error::ExecError;
use crate::keys;
use crate::output::CommandOutput;

/// SSH client handler for russh
#[derive(Debug)]
pub struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not pinned (StrictHostKeyChecking=no)
        Ok(true)
    }
}

/// Live channel to one node
///
/// Holds the bastion connection, if any, for as long as the tunnelled
/// session is in use. Dropping the session closes both.
pub struct Session {
    handle: client::Handle<ClientHandler>,
    via: Option<client::Handle<ClientHandler>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tunnelled", &self.via.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        handle: client::Handle<ClientHandler>,
        via: Option<client::Handle<ClientHandler>>,
    ) -> Self {
        Self { handle, via }
    }

    /// Underlying russh handle, for file transfer
    pub(crate) fn handle(&self) -> &client::Handle<ClientHandler> {
        &self.handle
    }

    /// Run a command and collect both streams and the exit status
    ///
    /// # Errors
    /// Returns `ExecError::Io` if the channel cannot be opened or breaks
    pub async fn exec(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        Self::exec_on(&self.handle, cmd).await
    }

    pub(crate) async fn exec_on(
        handle: &client::Handle<ClientHandler>,
        cmd: &str,
    ) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit-status may arrive after EOF, so drain until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    stderr.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    status = exit_status.cast_signed();
                }
                _ => {}
            }
        }

        Ok(CommandOutput::from_raw(
            &stdout,
            &stderr,
            status,
            start.elapsed(),
        ))
    }

    /// Close the session and the bastion hop behind it
    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(error = %e, "disconnect failed");
        }

        if let Some(via) = self.via
            && let Err(e) = via
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
        {
            debug!(error = %e, "bastion disconnect failed");
        }
    }
}

/// Authenticate `handle` with every method the connection settings allow
///
/// Methods are tried in order: password, keyboard-interactive with the same
/// password, private key, agent identities.
///
/// # Errors
/// Returns `ExecError::Authentication` when no method is accepted
pub async fn authenticate(
    handle: &mut client::Handle<ClientHandler>,
    conn: &SshConnection,
) -> Result<(), ExecError> {
    let user = conn.username.as_str();
    let mut attempted = Vec::new();

    if !conn.password.is_empty() {
        attempted.push("password");
        let res = handle
            .authenticate_password(user, conn.password.as_str())
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;
        if res.success() {
            return Ok(());
        }

        attempted.push("keyboard-interactive");
        if keyboard_interactive(handle, user, &conn.password).await? {
            return Ok(());
        }
    }

    if !conn.private_key.is_empty() {
        attempted.push("publickey");
        let key = keys::load_private_key(std::path::Path::new(&conn.private_key))
            .map_err(|e| ExecError::Config(e.to_string()))?;
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let res = handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;
        if res.success() {
            return Ok(());
        }
    }

    #[cfg(unix)]
    if conn.agent_auth {
        attempted.push("agent");
        if agent_auth(handle, user).await? {
            return Ok(());
        }
    }

    Err(ExecError::Authentication(format!(
        "unable to authenticate as {user}, attempted methods {attempted:?}"
    )))
}

async fn keyboard_interactive(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
    password: &str,
) -> Result<bool, ExecError> {
    let mut res = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await
        .map_err(|e| ExecError::Connection(e.to_string()))?;

    loop {
        let prompts = match res {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => prompts,
        };

        // every prompt is answered with the password
        let responses = prompts.iter().map(|_| password.to_string()).collect();
        res = handle
            .authenticate_keyboard_interactive_respond(responses)
            .await
            .map_err(|e| ExecError::Connection(e.to_string()))?;
    }
}

#[cfg(unix)]
async fn agent_auth(
    handle: &mut client::Handle<ClientHandler>,
    user: &str,
) -> Result<bool, ExecError> {
    let mut agent = keys::connect_agent()
        .await
        .map_err(|e| ExecError::Config(e.to_string()))?;

    let identities = agent
        .request_identities()
        .await
        .map_err(|e| ExecError::Authentication(format!("agent identities: {e}")))?;

    for identity in identities {
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        match handle
            .authenticate_publickey_with(user, identity, hash_alg, &mut agent)
            .await
        {
            Ok(res) if res.success() => return Ok(true),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "agent signing failed"),
        }
    }

    Ok(false)
}

pub(crate) fn client_config() -> Arc<client::Config> {
    Arc::new(client::Config::default())
}
