//! Embedded SSH transport built on libssh2
//!
//! Used when no OpenSSH client is installed or when it fails. All libssh2
//! calls block, so every operation runs on the blocking thread pool.

use super::{ExecOutput, ExecTimeout, RemoteTransport, SshTarget, CONNECT_TIMEOUT, UPLOAD_TIMEOUT};
use crate::error::{InstallerError, Result};
use async_trait::async_trait;
use ssh2::Session;
use std::fs::File;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// In-process SSH client
#[derive(Debug, Clone)]
pub struct EmbeddedSsh {
    connect_timeout: Duration,
}

impl Default for EmbeddedSsh {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedSsh {
    pub fn new() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Resolve the target, preferring IPv4 socket addresses
fn socket_addr(target: &SshTarget) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = (target.bare_host(), target.port)
        .to_socket_addrs()
        .map_err(|e| InstallerError::NotResolved(format!("{}: {}", target.host, e)))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or(addrs.first())
        .copied()
        .ok_or_else(|| InstallerError::NotResolved(target.host.clone()))
}

fn connect(target: &SshTarget, connect_timeout: Duration, io_timeout: Duration) -> Result<Session> {
    let addr = socket_addr(target)?;
    let tcp = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            InstallerError::Timeout(format!("SSH connect to {}", addr))
        } else {
            InstallerError::Network(format!("Failed to connect to {}: {}", addr, e))
        }
    })?;
    tcp.set_read_timeout(Some(io_timeout)).ok();
    tcp.set_write_timeout(Some(io_timeout)).ok();

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(io_timeout.as_millis() as u32);
    session.handshake()?;

    session.userauth_pubkey_file(&target.user, None, &target.identity, None)?;
    if !session.authenticated() {
        return Err(InstallerError::Authentication(format!(
            "SSH key not accepted for {}@{}",
            target.user, target.host
        )));
    }

    Ok(session)
}

fn exec_blocking(
    target: &SshTarget,
    command: &str,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<ExecOutput> {
    let session = connect(target, connect_timeout, io_timeout)?;
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout)?;
    let mut stderr = String::new();
    channel.stderr().read_to_string(&mut stderr)?;

    channel.wait_close()?;
    let exit_status = channel.exit_status()?;

    Ok(ExecOutput {
        stdout,
        stderr,
        exit_status,
    })
}

fn upload_blocking(
    target: &SshTarget,
    local: &Path,
    remote: &str,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<()> {
    let session = connect(target, connect_timeout, io_timeout)?;
    let sftp = session.sftp()?;

    let mut local_file = File::open(local)?;
    let mut remote_file = sftp.create(Path::new(remote))?;
    std::io::copy(&mut local_file, &mut remote_file)?;
    Ok(())
}

/// Map a blocking task failure, turning a lapsed deadline into a timeout
async fn run_blocking<T, F>(what: String, deadline: Duration, task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(InstallerError::Ssh(format!("{} task failed: {}", what, e))),
        Err(_) => Err(InstallerError::Timeout(format!(
            "{} did not finish within {}s",
            what,
            deadline.as_secs()
        ))),
    }
}

#[async_trait]
impl RemoteTransport for EmbeddedSsh {
    fn name(&self) -> &'static str {
        "embedded ssh"
    }

    async fn exec(
        &self,
        target: &SshTarget,
        command: &str,
        timeout: ExecTimeout,
    ) -> Result<ExecOutput> {
        let target = target.clone();
        let command = command.to_string();
        let connect_timeout = self.connect_timeout;
        let io_timeout = timeout.duration();
        let what = format!("ssh {}@{}", target.user, target.host);

        run_blocking(what, connect_timeout + io_timeout, move || {
            exec_blocking(&target, &command, connect_timeout, io_timeout)
        })
        .await
    }

    async fn upload(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()> {
        let target = target.clone();
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        let connect_timeout = self.connect_timeout;
        let io_timeout = UPLOAD_TIMEOUT.duration();
        let what = format!("sftp {}@{}", target.user, target.host);

        run_blocking(what, connect_timeout + io_timeout, move || {
            upload_blocking(&target, &local, &remote, connect_timeout, io_timeout)
        })
        .await?;
        debug!("Uploaded over SFTP");
        Ok(())
    }
}
