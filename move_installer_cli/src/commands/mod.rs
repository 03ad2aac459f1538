//! CLI command implementations

pub mod assets;
pub mod connect;
pub mod diagnostics;
pub mod install;
pub mod keygen;
pub mod maintenance;
pub mod modules;
pub mod status;

use anyhow::{bail, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use move_installer_core::{
    categorize, resolve::AddressResolver, Deployer, DeviceApi, DeviceSession, FallbackTransport,
    KeyManager, ReleaseChannel, RemoteExecutor, RemoteTransport,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "→".cyan().bold(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "!".yellow().bold(), msg);
}

/// Print a section banner
pub fn banner(title: &str) {
    println!();
    println!("{}", format!("  {}  ", title).on_bright_magenta().white().bold());
    println!();
}

/// Steadily ticking spinner with a message
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.magenta} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Explain a failed command the way a user needs to see it
pub fn report_error(err: &anyhow::Error) {
    let report = categorize(&format!("{:#}", err));

    println!();
    error(&report.title.bold().to_string());
    println!("  {}", report.message);
    println!();
    for suggestion in &report.suggestions {
        println!("  {} {}", "•".yellow(), suggestion);
    }
    if report.message != report.raw {
        println!();
        println!("{}", "Details:".dimmed());
        for line in report.raw.lines() {
            println!("  {}", line.dimmed());
        }
    }
    println!();
}

/// Everything a command needs to reach the device
pub struct DeviceContext {
    pub config: Config,
    pub session: DeviceSession,
    pub keys: KeyManager,
    pub transport: Arc<dyn RemoteTransport>,
    pub channel: ReleaseChannel,
    candidate: String,
    last_known: Option<String>,
}

impl DeviceContext {
    /// Build from the saved config. `host` overrides the configured hostname or address.
    pub fn load(host: Option<String>) -> Result<Self> {
        let config = Config::load().unwrap_or_default();
        let keys = KeyManager::new()?;
        let channel = ReleaseChannel::new(&config.repository)?;

        let mut session = DeviceSession::with_defaults()?;
        session.set_hostname(&config.hostname);
        // an explicit --host never falls back to the saved address
        let last_known = match host {
            Some(_) => None,
            None => config.last_address.clone(),
        };
        let candidate = host.unwrap_or_else(|| config.hostname.clone());

        Ok(Self {
            config,
            session,
            keys,
            transport: Arc::new(FallbackTransport::detect()),
            channel,
            candidate,
            last_known,
        })
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// Resolve the device address, remembering it for next time
    pub async fn resolve(&mut self) -> Result<Option<String>> {
        let resolver = AddressResolver::new(DeviceApi::new()?);
        let resolved = resolve_or_last_known(
            &resolver,
            &mut self.session,
            &self.candidate,
            self.last_known.as_deref(),
        )
        .await;

        if resolved != self.config.last_address {
            if let Some(address) = &resolved {
                self.config.last_address = Some(address.clone());
                if let Err(e) = self.config.save() {
                    tracing::debug!("Could not save last address: {}", e);
                }
            }
        }
        Ok(resolved)
    }

    pub fn executor(&self) -> RemoteExecutor {
        RemoteExecutor::for_session(Arc::clone(&self.transport), &self.session, &self.keys)
    }

    /// Resolve the device and make sure SSH works before returning a deployer
    pub async fn connected_deployer(&mut self) -> Result<Deployer> {
        let spinner = spinner(&format!("Connecting to {}...", self.candidate));
        self.resolve().await?;

        if self.keys.private_key_path().is_none() {
            spinner.finish_and_clear();
            bail!(
                "No SSH key found. Run {} first.",
                "move-installer connect".cyan()
            );
        }

        let executor = self.executor();
        let connected = executor.probe_connectivity().await;
        spinner.finish_and_clear();
        if !connected {
            bail!(
                "Could not connect to {} over SSH. Run {} to set up access.",
                self.session.host(),
                "move-installer connect".cyan()
            );
        }

        Ok(Deployer::new(
            executor,
            self.channel.clone(),
            self.keys.clone(),
            &self.session,
        ))
    }
}

/// Resolve `candidate` afresh, using the address saved by an earlier run
/// only when every lookup fails
async fn resolve_or_last_known(
    resolver: &AddressResolver,
    session: &mut DeviceSession,
    candidate: &str,
    last_known: Option<&str>,
) -> Option<String> {
    if let Some(address) = resolver.resolve(session, candidate).await {
        return Some(address);
    }

    let address = last_known?;
    tracing::debug!("Could not resolve {}, trying last known address {}", candidate, address);
    session.set_resolved_address(address);
    Some(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_installer_core::CookieStore;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn session(temp_dir: &TempDir) -> DeviceSession {
        DeviceSession::new("move.local", CookieStore::with_path(temp_dir.path().join("cookie")))
    }

    /// Resolver that only uses the HTTP socket fallback on `port`
    fn resolver(port: u16) -> AddressResolver {
        AddressResolver::new(DeviceApi::new().unwrap().with_port(port)).without_system_lookups()
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_fresh_lookup_wins_over_saved_address() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir);
        let resolved =
            resolve_or_last_known(&resolver(port), &mut session, "localhost", Some("192.168.1.20"))
                .await;

        assert_eq!(resolved.as_deref(), Some("127.0.0.1"));
        assert_eq!(session.resolved_address(), Some("127.0.0.1"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_saved_address_used_when_lookup_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir);
        let port = closed_port().await;

        let resolved =
            resolve_or_last_known(&resolver(port), &mut session, "move.invalid", Some("192.168.1.20"))
                .await;

        assert_eq!(resolved.as_deref(), Some("192.168.1.20"));
        assert_eq!(session.host(), "192.168.1.20");
    }

    #[tokio::test]
    async fn test_literal_address_ignores_saved_address() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir);

        let resolved =
            resolve_or_last_known(&resolver(9), &mut session, "192.168.1.77", Some("192.168.1.20"))
                .await;

        assert_eq!(resolved.as_deref(), Some("192.168.1.77"));
    }

    #[tokio::test]
    async fn test_nothing_known_stays_unresolved() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = session(&temp_dir);
        let port = closed_port().await;

        let resolved =
            resolve_or_last_known(&resolver(port), &mut session, "move.invalid", None).await;

        assert!(resolved.is_none());
        assert!(session.resolved_address().is_none());
    }

    #[test]
    fn test_spinner_has_message() {
        let bar = spinner("Working...");
        assert_eq!(bar.message(), "Working...");
        bar.finish_and_clear();
    }
}
