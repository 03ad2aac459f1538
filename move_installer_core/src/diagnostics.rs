//! Error categorisation and diagnostics reports

use crate::error::{InstallerError, Result};
use crate::keys::KeyManager;
use crate::resolve::{get_hostname, get_local_addresses};
use crate::session::DeviceSession;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of a failure, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ConnectionFailed,
    DeviceNotFound,
    DownloadFailed,
    AuthenticationFailed,
    ConnectionSetupFailed,
    DiskFull,
    Generic,
}

impl ErrorCategory {
    pub fn title(&self) -> &'static str {
        match self {
            ErrorCategory::ConnectionFailed => "Connection Failed",
            ErrorCategory::DeviceNotFound => "Device Not Found",
            ErrorCategory::DownloadFailed => "Download Failed",
            ErrorCategory::AuthenticationFailed => "Authentication Failed",
            ErrorCategory::ConnectionSetupFailed => "Connection Setup Failed",
            ErrorCategory::DiskFull => "Disk Full",
            ErrorCategory::Generic => "Installation Error",
        }
    }

    fn summary(&self) -> Option<&'static str> {
        match self {
            ErrorCategory::ConnectionFailed => Some("Could not connect to your Move device."),
            ErrorCategory::DeviceNotFound => Some("Could not find your Move on the network."),
            ErrorCategory::DownloadFailed => Some("Could not download required files."),
            ErrorCategory::AuthenticationFailed => Some("Could not authenticate with your Move."),
            ErrorCategory::ConnectionSetupFailed => {
                Some("Could not set up secure connection to your Move.")
            }
            ErrorCategory::DiskFull => Some("Not enough space on your Move device."),
            ErrorCategory::Generic => None,
        }
    }

    fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::ConnectionFailed => &[
                "Check that your Move is powered on",
                "Ensure your Move is connected to the same WiFi network",
                "Try restarting your Move",
                "Check your WiFi connection",
            ],
            ErrorCategory::DeviceNotFound => &[
                "Try entering your Move's IP address manually",
                "Check that your Move is connected to WiFi",
                "Make sure you're on the same WiFi network as your Move",
                "On Windows, install the Bonjour service (comes with iTunes/iCloud)",
            ],
            ErrorCategory::DownloadFailed => &[
                "Check your internet connection",
                "Try again in a few moments",
                "Verify GitHub is accessible from your network",
            ],
            ErrorCategory::AuthenticationFailed => &[
                "The authorization code may have expired",
                "Try restarting the installer",
                "Make sure you entered the correct code from your Move display",
            ],
            ErrorCategory::ConnectionSetupFailed => &[
                "Make sure you confirmed \"Yes\" on your Move device",
                "Try the setup process again",
                "Restart your Move and try again",
            ],
            ErrorCategory::DiskFull => &[
                "Run `move-installer clean-tmp` to remove temp files from your device and try again",
                "Free up space by deleting unused samples or sets",
                "Try installing fewer modules",
            ],
            ErrorCategory::Generic => &[
                "Try restarting the installer",
                "Check that your Move has the latest firmware",
                "Run `move-installer diagnostics` and report the issue on GitHub",
            ],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A failure explained for the user, keeping the raw message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    /// Whether cleaning the device's temp files may fix it
    pub can_clean_tmp: bool,
    pub raw: String,
}

fn classify(lower: &str) -> ErrorCategory {
    let any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    // disk exhaustion shows up inside install and download errors too
    if any(&["enospc", "no space"]) {
        ErrorCategory::DiskFull
    } else if any(&["timeout", "timed out", "econnrefused", "connection refused", "ehostunreach", "host unreachable"]) {
        ErrorCategory::ConnectionFailed
    } else if any(&["dns", "getaddrinfo", ".local", "not resolved"]) {
        ErrorCategory::DeviceNotFound
    } else if any(&["download", "404", "fetch failed"]) {
        ErrorCategory::DownloadFailed
    } else if any(&["auth", "unauthorized", "challenge"]) {
        ErrorCategory::AuthenticationFailed
    } else if any(&["key", "permission denied"]) {
        ErrorCategory::ConnectionSetupFailed
    } else {
        ErrorCategory::Generic
    }
}

/// Categorise an error message
pub fn categorize(message: &str) -> ErrorReport {
    let category = classify(&message.to_lowercase());
    ErrorReport {
        category,
        title: category.title().to_string(),
        message: category
            .summary()
            .map(String::from)
            .unwrap_or_else(|| message.to_string()),
        suggestions: category
            .suggestions()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        can_clean_tmp: category == ErrorCategory::DiskFull,
        raw: message.to_string(),
    }
}

/// Categorise an installer error
pub fn categorize_error(error: &InstallerError) -> ErrorReport {
    categorize(&error.to_string())
}

/// Snapshot of the local environment and device session for bug reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub timestamp: String,
    pub platform: String,
    pub arch: String,
    pub installer_version: String,
    pub local_hostname: String,
    pub local_addresses: Vec<String>,
    pub device_hostname: String,
    pub device_address: Option<String>,
    pub errors: Vec<String>,
    pub ssh_key_exists: bool,
    pub has_cookie: bool,
}

impl DiagnosticsReport {
    pub fn collect(session: &DeviceSession, keys: &KeyManager, errors: &[String]) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            installer_version: crate::version().to_string(),
            local_hostname: get_hostname(),
            local_addresses: get_local_addresses()
                .into_iter()
                .map(|ip| ip.to_string())
                .collect(),
            device_hostname: session.hostname().to_string(),
            device_address: session.resolved_address().map(String::from),
            errors: errors.to_vec(),
            ssh_key_exists: keys.find_existing_key().is_some(),
            has_cookie: session.auth_cookie().is_some(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
