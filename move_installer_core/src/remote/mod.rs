//! Remote execution layer
//!
//! Runs commands and copies files onto the device over SSH. Two transports
//! implement [`RemoteTransport`]:
//!
//! - [`native::NativeSsh`] spawns the locally installed OpenSSH client
//! - [`embedded::EmbeddedSsh`] speaks SSH in-process through libssh2
//!
//! [`FallbackTransport`] prefers the native client when it is installed and
//! retries with the embedded one on any failure.

pub mod embedded;
pub mod native;

use crate::error::{InstallerError, Result};
use crate::keys::KeyManager;
use crate::session::DeviceSession;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use embedded::EmbeddedSsh;
pub use native::NativeSsh;

/// Unprivileged user owning the installation
pub const DEFAULT_USER: &str = "ableton";
pub const ROOT_USER: &str = "root";
pub const SSH_PORT: u16 = 22;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Longest a single remote command may run
pub const MAX_EXEC_TIMEOUT: Duration = Duration::from_secs(300);
/// File transfers, sized for a core release tarball
pub const UPLOAD_TIMEOUT: ExecTimeout = ExecTimeout::Extended(Duration::from_secs(120));

/// Repairs the permissions sshd insists on after the device installed a key
pub const AUTHORIZED_KEYS_FIX: &str = "chmod 600 ~/.ssh/authorized_keys && chmod 700 ~/.ssh";

/// How long a remote command may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecTimeout {
    /// Connectivity probes
    Quick,
    /// Ordinary commands
    Standard,
    /// Long running work such as install scripts, capped at five minutes
    Extended(Duration),
}

impl ExecTimeout {
    pub fn duration(&self) -> Duration {
        match self {
            ExecTimeout::Quick => Duration::from_secs(8),
            ExecTimeout::Standard => Duration::from_secs(30),
            ExecTimeout::Extended(d) => (*d).min(MAX_EXEC_TIMEOUT),
        }
    }
}

/// Where and as whom to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// IPv4, bracketed IPv6 or hostname
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity: PathBuf,
}

impl SshTarget {
    pub fn new(host: &str, user: &str, identity: &Path) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            port: SSH_PORT,
            identity: identity.to_path_buf(),
        }
    }

    /// Host without IPv6 brackets
    pub fn bare_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    pub fn is_ipv6_literal(&self) -> bool {
        self.bare_host().parse::<std::net::Ipv6Addr>().is_ok()
    }
}

/// Captured result of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// A way of reaching the device over SSH
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run `command` on the target. A non-zero exit is reported in the output, not as an error.
    async fn exec(
        &self,
        target: &SshTarget,
        command: &str,
        timeout: ExecTimeout,
    ) -> Result<ExecOutput>;

    /// Copy a local file to `remote` on the target
    async fn upload(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()>;
}

/// Native client first, embedded client when that fails
pub struct FallbackTransport {
    primary: Option<Box<dyn RemoteTransport>>,
    fallback: Box<dyn RemoteTransport>,
}

impl FallbackTransport {
    pub fn new(primary: Option<Box<dyn RemoteTransport>>, fallback: Box<dyn RemoteTransport>) -> Self {
        Self { primary, fallback }
    }

    /// Use the native client only if `ssh -V` runs on this machine
    pub fn detect() -> Self {
        let primary: Option<Box<dyn RemoteTransport>> = if NativeSsh::available() {
            debug!("Native ssh client available");
            Some(Box::new(NativeSsh::new()))
        } else {
            debug!("Native ssh client not available, using embedded SSH only");
            None
        };
        Self::new(primary, Box::new(EmbeddedSsh::new()))
    }
}

#[async_trait]
impl RemoteTransport for FallbackTransport {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn exec(
        &self,
        target: &SshTarget,
        command: &str,
        timeout: ExecTimeout,
    ) -> Result<ExecOutput> {
        if let Some(primary) = &self.primary {
            match primary.exec(target, command, timeout).await {
                Ok(output) if output.success() => return Ok(output),
                Ok(output) => debug!(
                    "{} exited with {} for {}@{}, retrying with {}",
                    primary.name(),
                    output.exit_status,
                    target.user,
                    target.host,
                    self.fallback.name()
                ),
                Err(e) => debug!(
                    "{} failed for {}@{}: {}, retrying with {}",
                    primary.name(),
                    target.user,
                    target.host,
                    e,
                    self.fallback.name()
                ),
            }
        }
        self.fallback.exec(target, command, timeout).await
    }

    async fn upload(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()> {
        if let Some(primary) = &self.primary {
            match primary.upload(target, local, remote).await {
                Ok(()) => return Ok(()),
                Err(e) => debug!(
                    "{} upload failed: {}, retrying with {}",
                    primary.name(),
                    e,
                    self.fallback.name()
                ),
            }
        }
        self.fallback.upload(target, local, remote).await
    }
}

/// Runs commands on the device described by a session snapshot
#[derive(Clone)]
pub struct RemoteExecutor {
    transport: Arc<dyn RemoteTransport>,
    host: String,
    identity: Option<PathBuf>,
}

impl RemoteExecutor {
    pub fn new(transport: Arc<dyn RemoteTransport>, host: &str, identity: Option<PathBuf>) -> Self {
        Self {
            transport,
            host: host.to_string(),
            identity,
        }
    }

    /// Snapshot the session's host and identity.
    ///
    /// The session's key wins, otherwise the key manager's preferred private key.
    pub fn for_session(
        transport: Arc<dyn RemoteTransport>,
        session: &DeviceSession,
        keys: &KeyManager,
    ) -> Self {
        let identity = session
            .ssh_key_path()
            .map(Path::to_path_buf)
            .or_else(|| keys.private_key_path());
        Self::new(transport, session.host(), identity)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn identity(&self) -> Option<&Path> {
        self.identity.as_deref()
    }

    fn target(&self, user: &str) -> Result<SshTarget> {
        let identity = self
            .identity
            .as_deref()
            .ok_or_else(|| InstallerError::Ssh("No SSH key found".to_string()))?;
        Ok(SshTarget::new(&self.host, user, identity))
    }

    /// Run a command and return its raw output, whatever the exit status
    pub async fn run(&self, command: &str, user: &str, timeout: ExecTimeout) -> Result<ExecOutput> {
        let target = self.target(user)?;
        debug!("[{}@{}] {}", user, self.host, command);
        self.transport.exec(&target, command, timeout).await
    }

    /// Run a command as `ableton` and return its stdout
    pub async fn execute(&self, command: &str) -> Result<String> {
        self.execute_as(command, DEFAULT_USER, ExecTimeout::Standard)
            .await
    }

    /// Run a command and return its stdout. A non-zero exit is an error.
    pub async fn execute_as(&self, command: &str, user: &str, timeout: ExecTimeout) -> Result<String> {
        let output = self.run(command, user, timeout).await?;
        if !output.success() {
            return Err(InstallerError::RemoteExecution {
                command: command.to_string(),
                exit_status: output.exit_status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Copy a local file onto the device
    pub async fn upload_file(&self, local: &Path, remote: &str, user: &str) -> Result<()> {
        let target = self.target(user)?;
        debug!("Uploading {} to {}@{}:{}", local.display(), user, self.host, remote);
        self.transport.upload(&target, local, remote).await
    }

    /// Whether key-based SSH works for `ableton` or `root`.
    ///
    /// On the first successful `ableton` login the authorized_keys permissions
    /// are repaired. Never fails; every problem reads as "not yet".
    pub async fn probe_connectivity(&self) -> bool {
        let Some(identity) = self.identity.as_deref() else {
            debug!("No SSH key found for testing");
            return false;
        };
        if !identity.exists() {
            debug!("SSH key {} does not exist", identity.display());
            return false;
        }

        for user in [DEFAULT_USER, ROOT_USER] {
            let target = SshTarget::new(&self.host, user, identity);
            match self.transport.exec(&target, "echo test", ExecTimeout::Quick).await {
                Ok(output) if output.success() && output.stdout.trim() == "test" => {
                    info!("SSH works as {}@{}", user, self.host);
                    if user == DEFAULT_USER {
                        self.repair_authorized_keys(&target).await;
                    }
                    return true;
                }
                Ok(output) => debug!(
                    "SSH probe as {} exited with {}: {}",
                    user,
                    output.exit_status,
                    output.stderr.trim()
                ),
                Err(e) => debug!("SSH probe as {} failed: {}", user, e),
            }
        }

        debug!("SSH failed for all users");
        false
    }

    async fn repair_authorized_keys(&self, target: &SshTarget) {
        match self
            .transport
            .exec(target, AUTHORIZED_KEYS_FIX, ExecTimeout::Quick)
            .await
        {
            Ok(output) if output.success() => debug!("Fixed authorized_keys permissions"),
            Ok(output) => warn!(
                "Fixing authorized_keys permissions exited with {}",
                output.exit_status
            ),
            Err(e) => warn!("Fixing authorized_keys permissions failed: {}", e),
        }
    }
}

/// Whether key-based SSH to the device works yet
pub async fn probe_connectivity(executor: &RemoteExecutor) -> bool {
    executor.probe_connectivity().await
}
