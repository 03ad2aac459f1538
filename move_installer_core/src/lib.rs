//! Move Everything Installer Core Library
//!
//! Everything needed to get Move Everything onto an Ableton Move: getting an
//! SSH key trusted by the device, running commands on it, deploying the core
//! and modules, and working out what can be upgraded.
//!
//! # Architecture
//!
//! - [`trust`]: challenge/cookie authentication, key submission and trust polling,
//!   built on [`resolve`], [`device_api`] and [`keys`]
//! - [`remote`]: SSH command execution and uploads, native client first with an
//!   embedded fallback
//! - [`deploy`]: install, remove and maintenance operations on the device
//! - [`catalog`] and [`version`]: what is available and what is out of date
//! - [`queue`]: runs device-changing operations one at a time
//!
//! # Example
//!
//! ```no_run
//! use move_installer_core::{
//!     ConnectOutcome, DeviceApi, DeviceSession, FallbackTransport, KeyManager, TrustBootstrap,
//!     DEFAULT_POLL_INTERVAL,
//! };
//! use std::sync::Arc;
//!
//! async fn pair() -> move_installer_core::Result<()> {
//!     let session = DeviceSession::with_defaults()?;
//!     let mut bootstrap = TrustBootstrap::new(
//!         session,
//!         DeviceApi::new()?,
//!         KeyManager::new()?,
//!         Arc::new(FallbackTransport::detect()),
//!     );
//!
//!     match bootstrap.connect("move.local").await? {
//!         ConnectOutcome::AlreadyTrusted => return Ok(()),
//!         ConnectOutcome::NeedsChallenge => {
//!             bootstrap.submit_challenge_response("123456").await?;
//!         }
//!         ConnectOutcome::NeedsKeySubmission => {}
//!         ConnectOutcome::Invalid => return Ok(()),
//!     }
//!
//!     bootstrap.submit_public_key().await?;
//!     bootstrap.poll_for_trust(DEFAULT_POLL_INTERVAL).wait().await;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod deploy;
pub mod device_api;
pub mod diagnostics;
pub mod error;
pub mod keys;
pub mod queue;
pub mod remote;
pub mod resolve;
pub mod session;
pub mod ssh_config;
pub mod trust;
pub mod version;

// Re-export commonly used types
pub use catalog::{ComponentType, ModuleAssets, ModuleDescriptor, ReleaseArtifact, ReleaseChannel};
pub use deploy::{Deployer, RemoteEntry, MODULES_ROOT};
pub use device_api::DeviceApi;
pub use diagnostics::{categorize, DiagnosticsReport, ErrorReport};
pub use error::{InstallerError, Result};
pub use keys::{KeyAlgorithm, KeyManager, SshKeyPair};
pub use queue::{OperationQueue, QueuedOperation};
pub use remote::{ExecTimeout, FallbackTransport, RemoteExecutor, RemoteTransport};
pub use session::{CookieStore, DeviceSession, DEFAULT_HOSTNAME};
pub use trust::{ConnectOutcome, PollOutcome, TrustBootstrap, TrustPollHandle, DEFAULT_POLL_INTERVAL};
pub use version::{is_newer, reconcile, InstalledState, VersionComparison};

/// Get the version of the move_installer_core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Get the hostname of this machine
pub fn hostname() -> String {
    resolve::get_hostname()
}
