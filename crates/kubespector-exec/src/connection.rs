//! Connection establishment: dial strategy, reachability probe, handshake retry
//!
//! Every call negotiates its own session; nothing is pooled.

use std::future::Future;
use std::time::Duration;

use russh::client;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::config::{SshConfig, SshConnection};
use crate::error::ExecError;
use crate::session::{self, ClientHandler, Session};

/// Fixed pause between handshake attempts
pub const HANDSHAKE_BACKOFF: Duration = Duration::from_secs(2);

/// Byte stream a session can be negotiated over
pub trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RawStream for T {}

/// A dialed, not yet negotiated, connection to the target
pub struct RawConn {
    stream: Box<dyn RawStream>,
    via: Option<client::Handle<ClientHandler>>,
}

/// How to reach the target's SSH port
///
/// Built once per connection from the configuration; every dial (probe and
/// each handshake attempt) goes through it.
#[derive(Debug, Clone)]
pub enum Dialer {
    /// Plain TCP to `host:port`
    Direct { host: String, port: u16 },
    /// Authenticate to the bastion, then tunnel to `host:port` through it
    Bastion {
        bastion_host: String,
        bastion: SshConnection,
        host: String,
        port: u16,
    },
}

impl Dialer {
    /// Pick the strategy for `address` from the configuration
    #[must_use]
    pub fn for_target(config: &SshConfig, address: &str) -> Self {
        let port = config.connection.port;
        if config.bastion.is_enabled() {
            Dialer::Bastion {
                bastion_host: config.bastion.node.address().to_string(),
                bastion: config.bastion.connection.clone(),
                host: address.to_string(),
                port,
            }
        } else {
            Dialer::Direct {
                host: address.to_string(),
                port,
            }
        }
    }

    /// Open a raw connection to the target
    ///
    /// # Errors
    /// Returns `ExecError::Connection` if the target (or bastion) is unreachable
    pub async fn dial(&self, connect_timeout: Duration) -> Result<RawConn, ExecError> {
        match self {
            Dialer::Direct { host, port } => {
                let stream = tcp_connect(host, *port, connect_timeout).await?;
                Ok(RawConn {
                    stream: Box::new(stream),
                    via: None,
                })
            }
            Dialer::Bastion {
                bastion_host,
                bastion,
                host,
                port,
            } => {
                let stream = tcp_connect(bastion_host, bastion.port, connect_timeout).await?;
                let mut handle = timeout(
                    connect_timeout,
                    client::connect_stream(session::client_config(), stream, ClientHandler),
                )
                .await
                .map_err(|_| {
                    ExecError::Connection(format!("bastion {bastion_host} handshake timed out"))
                })?
                .map_err(|e| ExecError::Connection(format!("bastion {bastion_host}: {e}")))?;

                session::authenticate(&mut handle, bastion).await?;

                let channel = handle
                    .channel_open_direct_tcpip(host.clone(), u32::from(*port), "127.0.0.1", 0)
                    .await
                    .map_err(|e| {
                        ExecError::Connection(format!(
                            "tunnel through {bastion_host} to {host}:{port}: {e}"
                        ))
                    })?;

                debug!(bastion = %bastion_host, target = %host, port, "opened bastion tunnel");

                Ok(RawConn {
                    stream: Box::new(channel.into_stream()),
                    via: Some(handle),
                })
            }
        }
    }
}

async fn tcp_connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream, ExecError> {
    timeout(connect_timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ExecError::Connection(format!("TCP connection to {host}:{port} timed out")))?
        .map_err(|e| ExecError::Connection(format!("TCP connection to {host}:{port} failed: {e}")))
}

/// Retry `attempt` up to `attempts` times, pausing `backoff` in between
///
/// Returns the first success immediately, or the last error once every
/// attempt has failed. Authentication failures and transient failures both
/// use up an attempt.
///
/// # Errors
/// Returns the error of the final attempt
pub async fn retry_handshake<T, F, Fut>(
    attempts: u32,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, ExecError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExecError>>,
{
    let attempts = attempts.max(1);
    let mut tried = 0;

    loop {
        tried += 1;
        match attempt(tried).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if e.is_auth_failure() {
                    debug!(attempt = tried, error = %e, "authentication error during handshake");
                } else {
                    debug!(attempt = tried, error = %e, "SSH handshake error");
                }

                if tried >= attempts {
                    return Err(e);
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Establishes authenticated sessions to nodes
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    config: SshConfig,
    backoff: Duration,
}

impl ConnectionManager {
    /// Apply defaults and validate the configuration
    ///
    /// # Errors
    /// Returns `ExecError::Config` if the configuration is unusable
    pub fn new(config: &SshConfig) -> Result<Self, ExecError> {
        Ok(Self {
            config: config.prepare()?,
            backoff: HANDSHAKE_BACKOFF,
        })
    }

    /// Override the pause between handshake attempts
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The prepared configuration
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Open an authenticated session to `address`
    ///
    /// Probes reachability once before negotiating, then retries the
    /// handshake up to `handshake_attempts` times.
    ///
    /// # Errors
    /// Returns `ExecError::Connection` if unreachable, or the last handshake error
    #[instrument(skip(self))]
    pub async fn connect(&self, address: &str) -> Result<Session, ExecError> {
        let conn = &self.config.connection;
        let dialer = Dialer::for_target(&self.config, address);

        // fail fast on an unreachable host:port
        drop(dialer.dial(conn.timeout).await.inspect_err(|e| {
            warn!(address, error = %e, "TCP connection to SSH ip/port failed");
        })?);

        let session = retry_handshake(conn.handshake_attempts, self.backoff, |attempt| {
            let dialer = &dialer;
            async move {
                debug!(address, attempt, "SSH handshake");
                self.handshake(dialer).await
            }
        })
        .await?;

        info!(address, "SSH connected and authenticated");
        Ok(session)
    }

    async fn handshake(&self, dialer: &Dialer) -> Result<Session, ExecError> {
        let conn = &self.config.connection;
        let raw = dialer.dial(conn.timeout).await?;

        let mut handle = timeout(
            conn.timeout,
            client::connect_stream(session::client_config(), raw.stream, ClientHandler),
        )
        .await
        .map_err(|_| ExecError::Connection(format!("handshake timed out after {:?}", conn.timeout)))?
        .map_err(|e| ExecError::Connection(e.to_string()))?;

        session::authenticate(&mut handle, conn).await?;

        Ok(Session::new(handle, raw.via))
    }
}
