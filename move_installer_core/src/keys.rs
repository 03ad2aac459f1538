//! SSH key management module
//!
//! Finds, generates and reads the identity used to log into the device.
//! Generated keys are written in OpenSSH format so both the native `ssh`
//! client and the embedded SSH library can load them.

use crate::error::{InstallerError, Result};
use directories::UserDirs;
use ssh_key::{Algorithm, LineEnding, PrivateKey, PublicKey};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// File name of the installer's own key in `~/.ssh`
pub const INSTALLER_KEY_NAME: &str = "move_key";
/// General-purpose key reused when the installer has not generated one yet
pub const FALLBACK_KEY_NAME: &str = "id_rsa";
/// Comment written into generated public keys
pub const KEY_COMMENT: &str = "move-everything-installer";

/// Supported SSH key algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    #[default]
    Ed25519,
    Rsa4096,
}

/// Represents an SSH key pair
#[derive(Debug, Clone)]
pub struct SshKeyPair {
    pub private_key: String,
    pub public_key: String,
    pub algorithm: KeyAlgorithm,
    pub comment: String,
}

impl SshKeyPair {
    /// Generate a new SSH key pair in OpenSSH format
    pub fn generate(algorithm: KeyAlgorithm, comment: &str) -> Result<Self> {
        let mut rng = rand::thread_rng();

        let private_key = match algorithm {
            KeyAlgorithm::Ed25519 => PrivateKey::random(&mut rng, Algorithm::Ed25519),
            KeyAlgorithm::Rsa4096 => PrivateKey::random(&mut rng, Algorithm::Rsa { hash: None }),
        }
        .map_err(|e| InstallerError::KeyGeneration(e.to_string()))?;

        let private_key_str = private_key
            .to_openssh(LineEnding::LF)
            .map_err(|e| InstallerError::KeyGeneration(e.to_string()))?
            .to_string();

        let public_key = private_key.public_key();
        let public_key_str = format!(
            "{} {}\n",
            public_key
                .to_openssh()
                .map_err(|e| InstallerError::KeyGeneration(e.to_string()))?,
            comment
        );

        Ok(Self {
            private_key: private_key_str,
            public_key: public_key_str,
            algorithm,
            comment: comment.to_string(),
        })
    }

    /// Parse a public key from OpenSSH format
    pub fn parse_public_key(key_str: &str) -> Result<PublicKey> {
        let key_data = strip_key_comment(key_str)?;
        PublicKey::from_openssh(&key_data).map_err(|e| InstallerError::KeyParsing(e.to_string()))
    }
}

/// Reduce a public key line to `algorithm key-material`.
///
/// The device API rejects keys that carry a comment.
pub fn strip_key_comment(key_str: &str) -> Result<String> {
    let parts: Vec<&str> = key_str.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(InstallerError::KeyParsing(
            "Invalid public key format".to_string(),
        ));
    }
    Ok(format!("{} {}", parts[0], parts[1]))
}

/// Check whether a native tool can be spawned at all
fn tool_available(program: &str, probe_arg: &str) -> bool {
    Command::new(program)
        .arg(probe_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Manager for SSH key files on disk
#[derive(Debug, Clone)]
pub struct KeyManager {
    ssh_dir: PathBuf,
    use_native_keygen: bool,
}

impl KeyManager {
    /// Create a new KeyManager with the default SSH directory
    pub fn new() -> Result<Self> {
        let ssh_dir = Self::default_ssh_dir()?;
        Ok(Self::with_dir(ssh_dir))
    }

    /// Create a KeyManager with a custom SSH directory (useful for testing)
    pub fn with_dir(ssh_dir: PathBuf) -> Self {
        Self {
            ssh_dir,
            use_native_keygen: true,
        }
    }

    /// Never shell out to `ssh-keygen`, always generate in-process
    pub fn without_native_keygen(mut self) -> Self {
        self.use_native_keygen = false;
        self
    }

    /// Get the default SSH directory path
    pub fn default_ssh_dir() -> Result<PathBuf> {
        UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".ssh"))
            .ok_or_else(|| {
                InstallerError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine home directory",
                ))
            })
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    /// Ensure the SSH directory exists with proper permissions
    pub fn ensure_ssh_dir(&self) -> Result<()> {
        if !self.ssh_dir.exists() {
            fs::create_dir_all(&self.ssh_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&self.ssh_dir, fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(())
    }

    fn installer_key(&self) -> PathBuf {
        self.ssh_dir.join(INSTALLER_KEY_NAME)
    }

    /// Find a public key to submit to the device.
    ///
    /// The installer's own key always wins over the user's personal key.
    pub fn find_existing_key(&self) -> Option<PathBuf> {
        [INSTALLER_KEY_NAME, FALLBACK_KEY_NAME]
            .iter()
            .map(|name| self.ssh_dir.join(format!("{}.pub", name)))
            .find(|path| path.exists())
            .inspect(|path| debug!("Found existing key {}", path.display()))
    }

    /// Private key used for SSH logins, same priority as [`find_existing_key`](Self::find_existing_key)
    pub fn private_key_path(&self) -> Option<PathBuf> {
        [INSTALLER_KEY_NAME, FALLBACK_KEY_NAME]
            .iter()
            .map(|name| self.ssh_dir.join(name))
            .find(|path| path.exists())
    }

    /// Identity to reference from `~/.ssh/config` entries
    pub fn identity_file_for_config(&self) -> PathBuf {
        [INSTALLER_KEY_NAME, "id_ed25519", FALLBACK_KEY_NAME]
            .iter()
            .map(|name| self.ssh_dir.join(name))
            .find(|path| path.exists())
            .unwrap_or_else(|| self.ssh_dir.join("id_ed25519"))
    }

    /// Generate the installer's Ed25519 key, returning the public key path.
    ///
    /// Uses `ssh-keygen` when it is installed, otherwise generates the key
    /// in-process and writes it in OpenSSH format.
    pub fn generate_key(&self) -> Result<PathBuf> {
        self.ensure_ssh_dir()?;
        let private_path = self.installer_key();
        let public_path = self.ssh_dir.join(format!("{}.pub", INSTALLER_KEY_NAME));

        // ssh-keygen prompts before overwriting, and there is no one to answer
        for stale in [&private_path, &public_path] {
            if stale.exists() {
                debug!("Removing stale key file {}", stale.display());
                fs::remove_file(stale)?;
            }
        }

        if self.use_native_keygen && tool_available("ssh-keygen", "-V") {
            match self.generate_with_ssh_keygen(&private_path) {
                Ok(()) if public_path.exists() => {
                    info!("Key pair generated with ssh-keygen");
                    return Ok(public_path);
                }
                Ok(()) => warn!("ssh-keygen reported success but wrote no public key"),
                Err(e) => warn!("ssh-keygen failed, generating in-process: {}", e),
            }
        } else {
            debug!("ssh-keygen not available, generating in-process");
        }

        let key_pair = SshKeyPair::generate(KeyAlgorithm::Ed25519, KEY_COMMENT)?;
        let (_, public_path) = self.save_key_pair(&key_pair, INSTALLER_KEY_NAME)?;
        info!("Key pair generated in OpenSSH format");
        Ok(public_path)
    }

    fn generate_with_ssh_keygen(&self, private_path: &Path) -> Result<()> {
        let output = Command::new("ssh-keygen")
            .args(["-t", "ed25519", "-N", "", "-C", KEY_COMMENT, "-f"])
            .arg(private_path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InstallerError::KeyGeneration(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(InstallerError::KeyGeneration(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Save a key pair to disk
    pub fn save_key_pair(&self, key_pair: &SshKeyPair, name: &str) -> Result<(PathBuf, PathBuf)> {
        self.ensure_ssh_dir()?;

        let private_path = self.ssh_dir.join(name);
        let public_path = self.ssh_dir.join(format!("{}.pub", name));

        fs::write(&private_path, &key_pair.private_key)?;
        fs::write(&public_path, &key_pair.public_key)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&private_path, fs::Permissions::from_mode(0o600))?;
            fs::set_permissions(&public_path, fs::Permissions::from_mode(0o644))?;
        }

        Ok((private_path, public_path))
    }
}

/// Read a public key file
pub fn read_public_key(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        InstallerError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read public key {}: {}", path.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp_dir: &TempDir) -> KeyManager {
        KeyManager::with_dir(temp_dir.path().join(".ssh")).without_native_keygen()
    }

    #[test]
    fn test_key_algorithm_default() {
        assert_eq!(KeyAlgorithm::default(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn test_generate_ed25519_key() {
        let key_pair = SshKeyPair::generate(KeyAlgorithm::Ed25519, KEY_COMMENT).unwrap();

        assert!(key_pair.private_key.contains("OPENSSH PRIVATE KEY"));
        assert!(key_pair.public_key.starts_with("ssh-ed25519 "));
        assert!(key_pair.public_key.trim_end().ends_with(KEY_COMMENT));
    }

    #[test]
    fn test_strip_key_comment() {
        let stripped = strip_key_comment("ssh-ed25519 AAAAC3Nza move-everything-installer\n").unwrap();
        assert_eq!(stripped, "ssh-ed25519 AAAAC3Nza");

        let already = strip_key_comment("ssh-rsa AAAAB3").unwrap();
        assert_eq!(already, "ssh-rsa AAAAB3");

        let multi_word = strip_key_comment("ssh-rsa AAAAB3 user@host extra words").unwrap();
        assert_eq!(multi_word, "ssh-rsa AAAAB3");
    }

    #[test]
    fn test_strip_invalid_key() {
        assert!(strip_key_comment("invalid-key").is_err());
        assert!(SshKeyPair::parse_public_key("").is_err());
    }

    #[test]
    fn test_parse_generated_public_key() {
        let key_pair = SshKeyPair::generate(KeyAlgorithm::Ed25519, KEY_COMMENT).unwrap();
        let parsed = SshKeyPair::parse_public_key(&key_pair.public_key).unwrap();
        assert_eq!(parsed.algorithm().as_str(), "ssh-ed25519");
    }

    #[test]
    fn test_find_existing_key_prefers_installer_key() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        manager.ensure_ssh_dir().unwrap();

        assert!(manager.find_existing_key().is_none());

        fs::write(manager.ssh_dir().join("id_rsa.pub"), "ssh-rsa AAAA personal").unwrap();
        assert_eq!(
            manager.find_existing_key().unwrap(),
            manager.ssh_dir().join("id_rsa.pub")
        );

        fs::write(manager.ssh_dir().join("move_key.pub"), "ssh-ed25519 AAAA installer").unwrap();
        assert_eq!(
            manager.find_existing_key().unwrap(),
            manager.ssh_dir().join("move_key.pub")
        );
    }

    #[test]
    fn test_generate_key_in_process() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);

        let public_path = manager.generate_key().unwrap();
        assert_eq!(public_path, manager.ssh_dir().join("move_key.pub"));

        let private = fs::read_to_string(manager.ssh_dir().join("move_key")).unwrap();
        assert!(private.contains("OPENSSH PRIVATE KEY"));
        assert!(PrivateKey::from_openssh(&private).is_ok());

        let public = read_public_key(&public_path).unwrap();
        assert!(public.starts_with("ssh-ed25519 "));

        assert_eq!(manager.find_existing_key(), Some(public_path));
        assert_eq!(
            manager.private_key_path(),
            Some(manager.ssh_dir().join("move_key"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_generated_key_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        let public_path = manager.generate_key().unwrap();

        let private_mode = fs::metadata(manager.ssh_dir().join("move_key"))
            .unwrap()
            .permissions()
            .mode();
        let public_mode = fs::metadata(&public_path).unwrap().permissions().mode();
        assert_eq!(private_mode & 0o777, 0o600);
        assert_eq!(public_mode & 0o777, 0o644);
    }

    #[test]
    fn test_generate_key_replaces_stale_private_key() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        manager.ensure_ssh_dir().unwrap();
        fs::write(manager.ssh_dir().join("move_key"), "garbage").unwrap();

        manager.generate_key().unwrap();

        let private = fs::read_to_string(manager.ssh_dir().join("move_key")).unwrap();
        assert!(private.contains("OPENSSH PRIVATE KEY"));
    }

    #[test]
    fn test_identity_file_for_config_order() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager(&temp_dir);
        manager.ensure_ssh_dir().unwrap();

        assert_eq!(
            manager.identity_file_for_config(),
            manager.ssh_dir().join("id_ed25519")
        );

        fs::write(manager.ssh_dir().join("id_rsa"), "x").unwrap();
        assert_eq!(manager.identity_file_for_config(), manager.ssh_dir().join("id_rsa"));

        fs::write(manager.ssh_dir().join("move_key"), "x").unwrap();
        assert_eq!(manager.identity_file_for_config(), manager.ssh_dir().join("move_key"));
    }

    #[test]
    fn test_read_missing_public_key() {
        let err = read_public_key(Path::new("/nonexistent/move_key.pub")).unwrap_err();
        assert!(err.to_string().contains("Failed to read public key"));
    }
}
