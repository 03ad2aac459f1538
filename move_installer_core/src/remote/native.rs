//! Native OpenSSH client transport

use super::{
    ExecOutput, ExecTimeout, RemoteTransport, SshTarget, CONNECT_TIMEOUT, SSH_PORT, UPLOAD_TIMEOUT,
};
use crate::error::{InstallerError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Spawns `ssh` and `scp` from the user's PATH
#[derive(Debug, Clone, Default)]
pub struct NativeSsh;

impl NativeSsh {
    pub fn new() -> Self {
        Self
    }

    /// Whether `ssh -V` can be run here
    pub fn available() -> bool {
        std::process::Command::new("ssh")
            .arg("-V")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn common_options(target: &SshTarget) -> Vec<String> {
        let family = if target.is_ipv6_literal() { "-6" } else { "-4" };
        vec![
            "-i".to_string(),
            target.identity.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", CONNECT_TIMEOUT.as_secs()),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            family.to_string(),
        ]
    }

    /// Arguments for `ssh` running `command` on the target
    pub fn ssh_args(target: &SshTarget, command: &str) -> Vec<String> {
        let mut args = Self::common_options(target);
        if target.port != SSH_PORT {
            args.push("-p".to_string());
            args.push(target.port.to_string());
        }
        args.push(format!("{}@{}", target.user, target.bare_host()));
        args.push(command.to_string());
        args
    }

    /// Arguments for `scp` copying `local` to `remote` on the target
    pub fn scp_args(target: &SshTarget, local: &Path, remote: &str) -> Vec<String> {
        let mut args = Self::common_options(target);
        if target.port != SSH_PORT {
            args.push("-P".to_string());
            args.push(target.port.to_string());
        }
        let host = if target.is_ipv6_literal() {
            format!("[{}]", target.bare_host())
        } else {
            target.host.clone()
        };
        args.push(local.display().to_string());
        args.push(format!("{}@{}:{}", target.user, host, remote));
        args
    }

    async fn run(program: &str, args: Vec<String>, timeout: ExecTimeout) -> Result<ExecOutput> {
        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout.duration(), command.output())
            .await
            .map_err(|_| {
                InstallerError::Timeout(format!(
                    "{} did not finish within {}s",
                    program,
                    timeout.duration().as_secs()
                ))
            })?
            .map_err(|e| InstallerError::Ssh(format!("Failed to run {}: {}", program, e)))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_status: output.status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl RemoteTransport for NativeSsh {
    fn name(&self) -> &'static str {
        "native ssh"
    }

    async fn exec(
        &self,
        target: &SshTarget,
        command: &str,
        timeout: ExecTimeout,
    ) -> Result<ExecOutput> {
        Self::run("ssh", Self::ssh_args(target, command), timeout).await
    }

    async fn upload(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()> {
        let output = Self::run("scp", Self::scp_args(target, local, remote), UPLOAD_TIMEOUT).await?;
        if !output.success() {
            return Err(InstallerError::RemoteExecution {
                command: format!("scp {} {}", local.display(), remote),
                exit_status: output.exit_status,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        debug!("Uploaded {} with scp", local.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::DEFAULT_USER;

    #[test]
    fn test_ssh_args_ipv4() {
        let target = SshTarget::new("192.168.1.5", DEFAULT_USER, Path::new("/home/u/.ssh/move_key"));
        let args = NativeSsh::ssh_args(&target, "echo test");

        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/home/u/.ssh/move_key");
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(args.contains(&"-4".to_string()));
        assert_eq!(args[args.len() - 2], "ableton@192.168.1.5");
        assert_eq!(args[args.len() - 1], "echo test");
    }

    #[test]
    fn test_ssh_args_ipv6() {
        let target = SshTarget::new("[fe80::1]", "root", Path::new("/k"));
        let args = NativeSsh::ssh_args(&target, "uptime");

        assert!(args.contains(&"-6".to_string()));
        assert!(!args.contains(&"-4".to_string()));
        assert_eq!(args[args.len() - 2], "root@fe80::1");
    }

    #[test]
    fn test_scp_args() {
        let target = SshTarget::new("[fe80::1]", DEFAULT_USER, Path::new("/k"));
        let args = NativeSsh::scp_args(
            &target,
            Path::new("/tmp/braids.tar.gz"),
            "/data/UserData/move-anything/braids.tar.gz",
        );

        assert_eq!(args[args.len() - 2], "/tmp/braids.tar.gz");
        assert_eq!(
            args[args.len() - 1],
            "ableton@[fe80::1]:/data/UserData/move-anything/braids.tar.gz"
        );
    }

    #[test]
    fn test_custom_port() {
        let mut target = SshTarget::new("10.0.0.2", DEFAULT_USER, Path::new("/k"));
        target.port = 2222;

        let ssh = NativeSsh::ssh_args(&target, "true");
        assert!(ssh.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));

        let scp = NativeSsh::scp_args(&target, Path::new("/a"), "/b");
        assert!(scp.windows(2).any(|w| w[0] == "-P" && w[1] == "2222"));
    }
}
