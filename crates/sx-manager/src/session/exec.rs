//! Single-command SSH sessions to trusted agents
//!
//! A session resolves its target through the inventory, authenticates with the
//! manager's private key, runs one command and streams its output as it
//! arrives. Local input is forwarded to the remote process until it reaches
//! EOF.

use std::sync::Arc;

use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use sx_core::error::ExecError;
use sx_core::wire::socket_addr;

use super::handler::SessionHandler;
use crate::state::ManagerState;

const STDIN_BUFFER_SIZE: usize = 8192;

/// Extended data stream id of stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Local ends of a remote command's standard streams
pub struct SessionIo<I, O, E> {
    /// Forwarded to the remote stdin; `None` sends EOF immediately
    pub stdin: Option<I>,
    pub stdout: O,
    pub stderr: E,
}

impl SessionIo<tokio::io::Stdin, tokio::io::Stdout, tokio::io::Stderr> {
    /// Bind to the invoking process's terminal
    pub fn terminal() -> Self {
        Self {
            stdin: Some(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
            stderr: tokio::io::stderr(),
        }
    }
}

/// How the remote command ended
#[derive(Debug, Default)]
struct ExitReport {
    status: Option<u32>,
    signal: Option<String>,
}

/// Runs commands on trusted agents
#[derive(Clone)]
pub struct ExecSession {
    state: Arc<ManagerState>,
}

impl ExecSession {
    pub fn new(state: Arc<ManagerState>) -> Self {
        Self { state }
    }

    /// Resolve an alias through the inventory; unknown targets are used as-is
    pub async fn resolve(&self, target: &str) -> Result<String, ExecError> {
        Ok(self.state.inventory.resolve_alias(target).await?)
    }

    /// Run `command` on `target` (an alias or an address).
    ///
    /// Returns once the remote command exits, the connection fails, the
    /// configured `exec_timeout` elapses, or `cancel` fires. A non-zero exit
    /// is reported as [`ExecError::RemoteExecution`] carrying the status.
    pub async fn run<I, O, E>(
        &self,
        target: &str,
        command: &str,
        io: SessionIo<I, O, E>,
        cancel: CancellationToken,
    ) -> Result<(), ExecError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let address = self.resolve(target).await?;
        if address != target {
            tracing::debug!("Resolved {} to {}", target, address);
        }

        let work = async {
            match self.state.config.exec_timeout {
                Some(limit) => tokio::time::timeout(limit, self.execute(&address, command, io))
                    .await
                    .map_err(|_| ExecError::TimedOut(limit))?,
                None => self.execute(&address, command, io).await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Session to {} cancelled", address);
                Err(ExecError::Cancelled)
            }
            result = work => result,
        }
    }

    async fn execute<I, O, E>(
        &self,
        address: &str,
        command: &str,
        io: SessionIo<I, O, E>,
    ) -> Result<(), ExecError>
    where
        I: AsyncRead + Unpin + Send,
        O: AsyncWrite + Unpin + Send,
        E: AsyncWrite + Unpin + Send,
    {
        let config = &self.state.config;
        let key = Arc::new(self.state.keys.load_private_key()?);
        let remote = socket_addr(address, config.ssh_port);

        let connection_error = |reason: String| ExecError::Connection {
            address: address.to_string(),
            reason,
        };
        let remote_error = |reason: String| ExecError::RemoteExecution {
            address: address.to_string(),
            reason,
            exit_status: None,
        };

        tracing::debug!("Connecting to {}", remote);
        let ssh_config = Arc::new(client::Config::default());
        let mut session = tokio::time::timeout(
            config.connect_timeout,
            client::connect(ssh_config, remote.as_str(), SessionHandler::new(address)),
        )
        .await
        .map_err(|_| connection_error(format!("timed out after {:?}", config.connect_timeout)))?
        .map_err(|e| connection_error(e.to_string()))?;

        tracing::debug!("Authenticating as user '{}'", config.remote_user);
        let authenticated = session
            .authenticate_publickey(&config.remote_user, key)
            .await
            .map_err(|e| connection_error(format!("authentication error: {}", e)))?;

        if !authenticated {
            return Err(ExecError::Authentication {
                address: address.to_string(),
                user: config.remote_user.clone(),
            });
        }

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| remote_error(format!("failed to open channel: {}", e)))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| remote_error(format!("failed to start command: {}", e)))?;

        let report = forward(&mut channel, io).await?;

        let _ = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        match report {
            ExitReport {
                status: Some(0), ..
            } => Ok(()),
            ExitReport {
                status: Some(code),
                ..
            } => Err(ExecError::RemoteExecution {
                address: address.to_string(),
                reason: format!("command exited with status {}", code),
                exit_status: Some(code),
            }),
            ExitReport {
                signal: Some(signal),
                ..
            } => Err(remote_error(format!("command killed by signal {}", signal))),
            ExitReport { .. } => Err(remote_error(
                "channel closed without an exit status".to_string(),
            )),
        }
    }
}

/// Pump bytes between the channel and the local streams until the channel closes
async fn forward<I, O, E>(
    channel: &mut Channel<Msg>,
    io: SessionIo<I, O, E>,
) -> Result<ExitReport, ExecError>
where
    I: AsyncRead + Unpin + Send,
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    let SessionIo {
        mut stdin,
        mut stdout,
        mut stderr,
    } = io;

    if stdin.is_none() {
        let _ = channel.eof().await;
    }

    let mut report = ExitReport::default();
    let mut buf = vec![0u8; STDIN_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = read_stdin(&mut stdin, &mut buf), if stdin.is_some() => {
                match read {
                    Ok(0) => {
                        stdin = None;
                        let _ = channel.eof().await;
                    }
                    Ok(n) => {
                        if channel.data(&buf[..n]).await.is_err() {
                            tracing::debug!("Remote side stopped accepting input");
                            stdin = None;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Local stdin closed: {}", e);
                        stdin = None;
                        let _ = channel.eof().await;
                    }
                }
            }

            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.write_all(&data).await?;
                        stdout.flush().await?;
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == SSH_EXTENDED_DATA_STDERR {
                            stderr.write_all(&data).await?;
                            stderr.flush().await?;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        tracing::debug!("Remote command exited with status {}", exit_status);
                        report.status = Some(exit_status);
                    }
                    Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                        report.signal = Some(format!("{:?}", signal_name));
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        }
    }

    Ok(report)
}

async fn read_stdin<I: AsyncRead + Unpin>(
    stdin: &mut Option<I>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match stdin.as_mut() {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}
