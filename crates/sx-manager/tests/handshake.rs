//! End-to-end trust handshake and remote execution
//!
//! Runs a manager (registration listener, registrar, exec sessions) against a
//! real agent enrolment and an in-process SSH server that trusts whatever is
//! in the agent's `authorized_keys`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::{KeyPair, PublicKey};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use sx_agent::account::{ensure_ssh_dir, write_authorized_keys};
use sx_agent::{enroll, EnrollOutcome};
use sx_core::config::{AgentConfig, ManagerConfig};
use sx_core::error::{ExecError, ProvisionError, RegistrationError};
use sx_core::traits::AccountProvisioner;
use sx_core::{HostEntry, PendingRequest};
use sx_manager::session::SessionIo;
use sx_manager::{ExecSession, ManagerState, Registrar, RegistrationServer};

/// Agent account whose home is a temporary directory
struct TempAccount {
    home: PathBuf,
}

#[async_trait]
impl AccountProvisioner for TempAccount {
    async fn provision(&self) -> Result<(), ProvisionError> {
        ensure_ssh_dir(&self.home).await.map(|_| ())
    }

    async fn install_trusted_key(&self, key: &[u8]) -> Result<(), ProvisionError> {
        write_authorized_keys(&self.home, key).await.map(|_| ())
    }
}

/// SSH side of the agent
struct AgentSshHandler {
    authorized_keys: PathBuf,
    /// Set once `cat` runs; channel data is echoed back until EOF
    echoing: bool,
}

impl AgentSshHandler {
    fn trusts(&self, offered: &PublicKey) -> bool {
        let trusted = std::fs::read_to_string(&self.authorized_keys).unwrap_or_default();
        let offered = offered.fingerprint();
        trusted
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .filter_map(|b64| russh_keys::parse_public_key_base64(b64).ok())
            .any(|key| key.fingerprint() == offered)
    }
}

#[async_trait]
impl russh::server::Handler for AgentSshHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if user == "sentinel" && self.trusts(public_key) {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).to_string();
        if command == "cat" {
            self.echoing = true;
            let _ = session.channel_success(channel);
            return Ok(());
        }

        let (stdout, stderr, status): (&str, &str, u32) = match command.as_str() {
            "echo ok" => ("ok\n", "", 0),
            "false" => ("", "", 1),
            _ => ("", "command not found\n", 127),
        };

        let _ = session.channel_success(channel);
        if !stdout.is_empty() {
            let _ = session.data(channel, CryptoVec::from_slice(stdout.as_bytes()));
        }
        if !stderr.is_empty() {
            let _ = session.extended_data(channel, 1, CryptoVec::from_slice(stderr.as_bytes()));
        }
        let _ = session.exit_status_request(channel, status);
        let _ = session.eof(channel);
        let _ = session.close(channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.echoing {
            let _ = session.data(channel, CryptoVec::from_slice(data));
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.echoing {
            self.echoing = false;
            let _ = session.exit_status_request(channel, 0);
            let _ = session.eof(channel);
            let _ = session.close(channel);
        }
        Ok(())
    }
}

async fn spawn_agent_ssh(authorized_keys: PathBuf) -> u16 {
    let host_key = KeyPair::generate_ed25519().unwrap();
    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.auth_rejection_time = Duration::from_millis(10);
    config.auth_rejection_time_initial = Some(Duration::from_secs(0));
    let config = Arc::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let config = Arc::clone(&config);
            let handler = AgentSshHandler {
                authorized_keys: authorized_keys.clone(),
                echoing: false,
            };
            tokio::spawn(async move {
                if let Ok(session) = russh::server::run_stream(config, socket, handler).await {
                    let _ = session.await;
                }
            });
        }
    });

    port
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_pending(registrar: &Registrar, address: &str) -> PendingRequest {
    for _ in 0..100 {
        if let Some(request) = registrar.pending_request(address).await.unwrap() {
            return request;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no registration from {} arrived", address);
}

struct Harness {
    _manager_dir: TempDir,
    agent_home: TempDir,
    state: Arc<ManagerState>,
    registrar: Registrar,
    manager_addr: SocketAddr,
    finalize_port: u16,
    shutdown: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        let manager_dir = TempDir::new().unwrap();
        let agent_home = TempDir::new().unwrap();

        let ssh_port = spawn_agent_ssh(agent_home.path().join(".ssh").join("authorized_keys")).await;
        let finalize_port = free_port();

        let mut config = ManagerConfig::rooted_at(manager_dir.path());
        config.finalize_port = finalize_port;
        config.ssh_port = ssh_port;
        config.connect_timeout = Duration::from_secs(5);

        let state = Arc::new(ManagerState::new(config));
        state.keys.generate().unwrap();

        let registrar = Registrar::new(Arc::clone(&state));
        let server = RegistrationServer::bind(registrar.clone(), "127.0.0.1:0")
            .await
            .unwrap();
        let manager_addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));

        Self {
            _manager_dir: manager_dir,
            agent_home,
            state,
            registrar,
            manager_addr,
            finalize_port,
            shutdown,
        }
    }

    fn agent_config(&self, hostname: &str) -> AgentConfig {
        AgentConfig {
            manager_port: self.manager_addr.port(),
            finalize_address: format!("127.0.0.1:{}", self.finalize_port),
            home_dir: self.agent_home.path().to_path_buf(),
            hostname: Some(hostname.to_string()),
            ..AgentConfig::default()
        }
    }

    fn spawn_enrolment(&self, hostname: &str) -> tokio::task::JoinHandle<anyhow::Result<EnrollOutcome>> {
        let config = self.agent_config(hostname);
        let provisioner: Arc<dyn AccountProvisioner> = Arc::new(TempAccount {
            home: self.agent_home.path().to_path_buf(),
        });
        tokio::spawn(async move {
            enroll("127.0.0.1", &config, provisioner, CancellationToken::new()).await
        })
    }

    async fn run(&self, target: &str, command: &str) -> (Result<(), ExecError>, Vec<u8>, Vec<u8>) {
        self.run_with_input(target, command, None).await
    }

    async fn run_with_input(
        &self,
        target: &str,
        command: &str,
        input: Option<&[u8]>,
    ) -> (Result<(), ExecError>, Vec<u8>, Vec<u8>) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let result = ExecSession::new(Arc::clone(&self.state))
            .run(
                target,
                command,
                SessionIo {
                    stdin: input,
                    stdout: &mut stdout,
                    stderr: &mut stderr,
                },
                CancellationToken::new(),
            )
            .await;
        (result, stdout, stderr)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn authorized_keys(home: &Path) -> String {
    std::fs::read_to_string(home.join(".ssh").join("authorized_keys")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_register_accept_list_run() {
    let harness = Harness::start().await;
    let enrolment = harness.spawn_enrolment("db-2");

    let request = wait_for_pending(&harness.registrar, "127.0.0.1").await;
    assert_eq!(request, PendingRequest::new("db-2", "127.0.0.1"));

    let entry = harness
        .registrar
        .accept("127.0.0.1", Some("db-primary"))
        .await
        .unwrap();
    assert_eq!(entry, HostEntry::new("db-primary", "127.0.0.1"));

    let outcome = enrolment.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        EnrollOutcome::Trusted {
            fingerprint: harness.state.keys.fingerprint().unwrap()
        }
    );
    let public_key = String::from_utf8(harness.state.keys.load_public_key().unwrap()).unwrap();
    assert_eq!(authorized_keys(harness.agent_home.path()).trim(), public_key.trim());

    assert!(harness.state.pending.list().await.unwrap().is_empty());
    assert_eq!(
        harness.state.inventory.list().await.unwrap(),
        vec![HostEntry::new("db-primary", "127.0.0.1")]
    );

    let (result, stdout, stderr) = harness.run("db-primary", "echo ok").await;
    result.unwrap();
    assert_eq!(stdout, b"ok\n");
    assert!(stderr.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_remote_failure_carries_exit_status() {
    let harness = Harness::start().await;
    let enrolment = harness.spawn_enrolment("db-2");
    wait_for_pending(&harness.registrar, "127.0.0.1").await;
    harness.registrar.accept("127.0.0.1", None).await.unwrap();
    enrolment.await.unwrap().unwrap();

    let (result, _, _) = harness.run("db-2", "false").await;
    let err = result.unwrap_err();
    assert!(matches!(err, ExecError::RemoteExecution { .. }));
    assert_eq!(err.exit_status(), Some(1));

    let (result, stdout, stderr) = harness.run("127.0.0.1", "frobnicate").await;
    assert_eq!(result.unwrap_err().exit_status(), Some(127));
    assert!(stdout.is_empty());
    assert_eq!(stderr, b"command not found\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_regenerated_key_is_rejected() {
    let harness = Harness::start().await;
    let enrolment = harness.spawn_enrolment("db-2");
    wait_for_pending(&harness.registrar, "127.0.0.1").await;
    harness
        .registrar
        .accept("127.0.0.1", Some("db-primary"))
        .await
        .unwrap();
    enrolment.await.unwrap().unwrap();

    harness.state.keys.generate().unwrap();

    let (result, stdout, _) = harness.run("db-primary", "echo ok").await;
    assert!(matches!(
        result,
        Err(ExecError::Authentication { ref user, .. }) if user == "sentinel"
    ));
    assert!(stdout.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registration_from_trusted_host_is_absorbed() {
    let harness = Harness::start().await;
    let enrolment = harness.spawn_enrolment("db-2");
    wait_for_pending(&harness.registrar, "127.0.0.1").await;
    harness.registrar.accept("127.0.0.1", None).await.unwrap();
    enrolment.await.unwrap().unwrap();

    let second = harness.spawn_enrolment("db-2").await.unwrap().unwrap();

    assert_eq!(second, EnrollOutcome::AlreadyTrusted);
    assert!(harness.state.pending.list().await.unwrap().is_empty());
    assert_eq!(harness.state.inventory.list().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accept_without_agent_listener_is_retryable() {
    let harness = Harness::start().await;
    // Register directly so no finalize listener exists
    harness.registrar.register("db-2", "127.0.0.1").await.unwrap();

    let err = harness.registrar.accept("127.0.0.1", None).await.unwrap_err();
    assert!(matches!(err, RegistrationError::HandshakeFailed { .. }));
    assert!(harness.registrar.pending_request("127.0.0.1").await.unwrap().is_some());
    assert!(harness.state.inventory.list().await.unwrap().is_empty());
}

async fn trusted_harness() -> Harness {
    let harness = Harness::start().await;
    let enrolment = harness.spawn_enrolment("db-2");
    wait_for_pending(&harness.registrar, "127.0.0.1").await;
    harness.registrar.accept("127.0.0.1", None).await.unwrap();
    enrolment.await.unwrap().unwrap();
    harness
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stdin_is_forwarded_to_remote_command() {
    let harness = trusted_harness().await;

    let (result, stdout, stderr) = harness
        .run_with_input("db-2", "cat", Some(&b"hello stdin\n"[..]))
        .await;

    result.unwrap();
    assert_eq!(stdout, b"hello stdin\n");
    assert!(stderr.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_output_streams_while_command_runs() {
    let harness = trusted_harness().await;
    let (mut input, remote_stdin) = tokio::io::duplex(64);
    let (remote_stdout, mut output) = tokio::io::duplex(64);

    let session = ExecSession::new(Arc::clone(&harness.state));
    let running = tokio::spawn(async move {
        session
            .run(
                "db-2",
                "cat",
                SessionIo {
                    stdin: Some(remote_stdin),
                    stdout: remote_stdout,
                    stderr: Vec::new(),
                },
                CancellationToken::new(),
            )
            .await
    });

    input.write_all(b"ping\n").await.unwrap();
    let mut echoed = [0u8; 5];
    tokio::time::timeout(Duration::from_secs(5), output.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"ping\n");
    assert!(!running.is_finished());

    drop(input);
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
