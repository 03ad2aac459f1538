//! Device session context
//!
//! Holds what has been learned about the targeted device for the lifetime of
//! the process: its resolved address, the auth cookie and the SSH identity.

use crate::error::{InstallerError, Result};
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hostname the device advertises by default
pub const DEFAULT_HOSTNAME: &str = "move.local";
/// Cookie file name in the user's home directory
pub const COOKIE_FILE_NAME: &str = ".move-everything-installer-cookie";

/// Persists the device auth cookie between runs
#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    /// Cookie store at `~/.move-everything-installer-cookie`
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(Self::default_path()?))
    }

    /// Cookie store at a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        UserDirs::new()
            .map(|dirs| dirs.home_dir().join(COOKIE_FILE_NAME))
            .ok_or_else(|| {
                InstallerError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine home directory",
                ))
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved cookie, if any. Read failures are logged and treated as absent.
    pub fn load(&self) -> Option<String> {
        if !self.path.exists() {
            return None;
        }
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let cookie = contents.trim().to_string();
                (!cookie.is_empty()).then_some(cookie)
            }
            Err(e) => {
                warn!("Failed to load saved cookie: {}", e);
                None
            }
        }
    }

    pub fn save(&self, cookie: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, cookie)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Everything known about the device for this process
#[derive(Debug, Clone)]
pub struct DeviceSession {
    hostname: String,
    resolved_address: Option<String>,
    auth_cookie: Option<String>,
    ssh_key_path: Option<PathBuf>,
    cookie_store: CookieStore,
}

impl DeviceSession {
    /// Create a session for `hostname`, loading any saved cookie
    pub fn new(hostname: &str, cookie_store: CookieStore) -> Self {
        let auth_cookie = cookie_store.load();
        if auth_cookie.is_some() {
            debug!("Loaded saved auth cookie from {}", cookie_store.path().display());
        }

        Self {
            hostname: hostname.to_string(),
            resolved_address: None,
            auth_cookie,
            ssh_key_path: None,
            cookie_store,
        }
    }

    /// Session for `move.local` with the default cookie file
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(DEFAULT_HOSTNAME, CookieStore::new()?))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    /// Resolved IPv4 address or bracketed IPv6 address
    pub fn resolved_address(&self) -> Option<&str> {
        self.resolved_address.as_deref()
    }

    pub fn set_resolved_address(&mut self, address: &str) {
        debug!("Caching device address {}", address);
        self.resolved_address = Some(address.to_string());
    }

    pub fn clear_resolved_address(&mut self) {
        self.resolved_address = None;
    }

    /// Address to connect to: the resolved address if known, else the hostname
    pub fn host(&self) -> &str {
        self.resolved_address.as_deref().unwrap_or(&self.hostname)
    }

    pub fn auth_cookie(&self) -> Option<&str> {
        self.auth_cookie.as_deref()
    }

    /// Remember a fresh cookie and persist it, overwriting the previous one
    pub fn store_cookie(&mut self, cookie: &str) -> Result<()> {
        self.cookie_store.save(cookie)?;
        self.auth_cookie = Some(cookie.to_string());
        Ok(())
    }

    pub fn forget_cookie(&mut self) -> Result<()> {
        self.auth_cookie = None;
        self.cookie_store.clear()
    }

    pub fn cookie_store(&self) -> &CookieStore {
        &self.cookie_store
    }

    pub fn ssh_key_path(&self) -> Option<&Path> {
        self.ssh_key_path.as_deref()
    }

    pub fn set_ssh_key_path(&mut self, path: PathBuf) {
        self.ssh_key_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> CookieStore {
        CookieStore::with_path(temp_dir.path().join("cookie"))
    }

    #[test]
    fn test_host_prefers_resolved_address() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = DeviceSession::new(DEFAULT_HOSTNAME, store(&temp_dir));

        assert_eq!(session.host(), "move.local");
        session.set_resolved_address("192.168.1.50");
        assert_eq!(session.host(), "192.168.1.50");
        session.clear_resolved_address();
        assert_eq!(session.host(), "move.local");
    }

    #[test]
    fn test_cookie_persisted_and_reloaded() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = DeviceSession::new(DEFAULT_HOSTNAME, store(&temp_dir));
        assert!(session.auth_cookie().is_none());

        session.store_cookie("Ableton-Challenge-Response-Token=abc").unwrap();
        assert_eq!(
            session.auth_cookie(),
            Some("Ableton-Challenge-Response-Token=abc")
        );

        let reloaded = DeviceSession::new(DEFAULT_HOSTNAME, store(&temp_dir));
        assert_eq!(
            reloaded.auth_cookie(),
            Some("Ableton-Challenge-Response-Token=abc")
        );
    }

    #[test]
    fn test_cookie_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = DeviceSession::new(DEFAULT_HOSTNAME, store(&temp_dir));
        session.store_cookie("token=old").unwrap();
        session.store_cookie("token=new").unwrap();

        assert_eq!(store(&temp_dir).load(), Some("token=new".to_string()));
    }

    #[test]
    fn test_forget_cookie() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = DeviceSession::new(DEFAULT_HOSTNAME, store(&temp_dir));
        session.store_cookie("token=x").unwrap();
        session.forget_cookie().unwrap();

        assert!(session.auth_cookie().is_none());
        assert!(!temp_dir.path().join("cookie").exists());
    }

    #[test]
    fn test_empty_cookie_file_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("cookie"), "  \n").unwrap();
        assert!(store(&temp_dir).load().is_none());
    }
}
