//! `~/.ssh/config` augmentation
//!
//! The core install script addresses the device as `movedevice`, so an alias
//! pointing at the resolved address is written next to an entry for the
//! hostname itself.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Alias the install script connects to
pub const DEVICE_ALIAS: &str = "movedevice";

fn quote_path(path: &Path) -> String {
    let text = path.display().to_string();
    if text.contains(' ') {
        format!("\"{}\"", text)
    } else {
        text
    }
}

fn render_block(host: &str, host_name: &str, identity: &Path) -> String {
    format!(
        "Host {}\n    HostName {}\n    User ableton\n    IdentityFile {}\n    StrictHostKeyChecking no\n    UserKnownHostsFile /dev/null\n",
        host,
        host_name,
        quote_path(identity)
    )
}

/// Remove the `Host <name>` block, up to the next `Host`/`Match` line
pub fn remove_host_block(config: &str, name: &str) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;

    for line in config.lines() {
        let trimmed = line.trim_start();
        let is_header = trimmed.starts_with("Host ") || trimmed.starts_with("Match ");
        if is_header {
            skipping = trimmed
                .strip_prefix("Host ")
                .map(|rest| rest.trim() == name)
                .unwrap_or(false);
        }
        if !skipping {
            kept.push(line);
        }
    }

    let mut result = kept.join("\n");
    if config.ends_with('\n') && !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Entries for `hostname` and, when the address is known, the `movedevice` alias
pub fn render_entries(hostname: &str, resolved_address: Option<&str>, identity: &Path) -> String {
    let mut entries = render_block(hostname, hostname, identity);
    if let Some(address) = resolved_address {
        let bare = address.trim_start_matches('[').trim_end_matches(']');
        entries.push('\n');
        entries.push_str(&render_block(DEVICE_ALIAS, bare, identity));
    }
    entries
}

/// Write the device entries into `<ssh_dir>/config`, replacing older ones.
///
/// Returns the config path.
pub fn setup(
    ssh_dir: &Path,
    hostname: &str,
    resolved_address: Option<&str>,
    identity: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(ssh_dir)?;
    let config_path = ssh_dir.join("config");

    let existing = if config_path.exists() {
        fs::read_to_string(&config_path)?
    } else {
        String::new()
    };

    let mut config = remove_host_block(&existing, hostname);
    config = remove_host_block(&config, DEVICE_ALIAS);

    let mut updated = config.trim_end().to_string();
    if !updated.is_empty() {
        updated.push_str("\n\n");
    }
    updated.push_str(&render_entries(hostname, resolved_address, identity));

    fs::write(&config_path, updated)?;
    info!(
        "SSH config updated for {} and {} -> {}",
        hostname,
        DEVICE_ALIAS,
        resolved_address.unwrap_or("(unresolved)")
    );
    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_entries_with_ipv6() {
        let entries = render_entries("move.local", Some("[fe80::1]"), Path::new("/home/u/.ssh/move_key"));
        assert!(entries.contains("Host move.local\n    HostName move.local\n"));
        assert!(entries.contains("Host movedevice\n    HostName fe80::1\n"));
        assert!(entries.contains("IdentityFile /home/u/.ssh/move_key"));
        assert!(entries.contains("StrictHostKeyChecking no"));
        assert!(entries.contains("UserKnownHostsFile /dev/null"));
    }

    #[test]
    fn test_render_entries_without_address() {
        let entries = render_entries("move.local", None, Path::new("/k"));
        assert!(!entries.contains(DEVICE_ALIAS));
    }

    #[test]
    fn test_identity_with_spaces_quoted() {
        let entries = render_entries("move.local", None, Path::new("C:/Users/Jo Doe/.ssh/move_key"));
        assert!(entries.contains("IdentityFile \"C:/Users/Jo Doe/.ssh/move_key\""));
    }

    #[test]
    fn test_remove_host_block_keeps_others() {
        let config = "Host github.com\n    User git\n\nHost move.local\n    HostName move.local\n    User ableton\n\nHost work\n    User me\n";
        let result = remove_host_block(config, "move.local");
        assert!(result.contains("Host github.com\n    User git\n"));
        assert!(result.contains("Host work\n    User me\n"));
        assert!(!result.contains("move.local"));
    }

    #[test]
    fn test_setup_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let ssh_dir = temp_dir.path().join(".ssh");
        fs::create_dir_all(&ssh_dir).unwrap();
        fs::write(ssh_dir.join("config"), "Host github.com\n    User git\n").unwrap();

        let identity = ssh_dir.join("move_key");
        setup(&ssh_dir, "move.local", Some("192.168.1.5"), &identity).unwrap();
        let path = setup(&ssh_dir, "move.local", Some("192.168.1.6"), &identity).unwrap();

        let config = fs::read_to_string(path).unwrap();
        assert_eq!(config.matches("Host move.local").count(), 1);
        assert_eq!(config.matches("Host movedevice").count(), 1);
        assert!(config.contains("HostName 192.168.1.6"));
        assert!(!config.contains("192.168.1.5"));
        assert!(config.starts_with("Host github.com\n    User git\n"));
    }
}
