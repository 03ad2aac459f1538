//! Device trust bootstrap
//!
//! Getting a key trusted by the device takes several steps:
//! 1. resolve and validate the device address
//! 2. exchange an on-screen challenge code for a session cookie
//! 3. submit the public key with that cookie
//! 4. wait until the owner approves the key, which is only observable as
//!    key-based SSH starting to work

use crate::device_api::DeviceApi;
use crate::error::Result;
use crate::keys::{read_public_key, KeyManager};
use crate::remote::{RemoteExecutor, RemoteTransport};
use crate::resolve::AddressResolver;
use crate::session::DeviceSession;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Interval between SSH probes while waiting for approval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// How a trust poll ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Trusted,
    Cancelled,
}

/// Handle on a background trust poll. Dropping it cancels the poll.
pub struct TrustPollHandle {
    cancel: watch::Sender<bool>,
    attempts: Arc<AtomicU32>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl TrustPollHandle {
    /// Stop polling after the current attempt
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Number of probes made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait for the poll to end
    pub async fn wait(mut self) -> PollOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }
}

impl Drop for TrustPollHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Probe SSH every `interval` until it works or the handle is cancelled.
///
/// Each attempt is independent; failures are logged and retried.
pub fn poll_for_trust(executor: RemoteExecutor, interval: Duration) -> TrustPollHandle {
    let (cancel, mut cancelled) = watch::channel(false);
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let task = tokio::spawn(async move {
        loop {
            if *cancelled.borrow() {
                return PollOutcome::Cancelled;
            }

            let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if executor.probe_connectivity().await {
                info!("Device trusted the key after {} attempt(s)", attempt);
                return PollOutcome::Trusted;
            }
            debug!("Key not trusted yet (attempt {})", attempt);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = cancelled.changed() => {
                    if changed.is_err() || *cancelled.borrow() {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    });

    TrustPollHandle {
        cancel,
        attempts,
        task: Some(task),
    }
}

/// Where the device-selection flow ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Key-based SSH already works
    AlreadyTrusted,
    /// A saved cookie exists; the key can be submitted right away
    NeedsKeySubmission,
    /// A challenge code is now shown on the device
    NeedsChallenge,
    /// Nothing answers HTTP at the address
    Invalid,
}

/// The trust bootstrap flow over one device session
pub struct TrustBootstrap {
    session: DeviceSession,
    api: DeviceApi,
    keys: KeyManager,
    transport: Arc<dyn RemoteTransport>,
    resolver: AddressResolver,
}

impl TrustBootstrap {
    pub fn new(
        session: DeviceSession,
        api: DeviceApi,
        keys: KeyManager,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        let resolver = AddressResolver::new(api.clone());
        Self {
            session,
            api,
            keys,
            transport,
            resolver,
        }
    }

    /// Replace the address resolver (useful for testing)
    pub fn with_resolver(mut self, resolver: AddressResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DeviceSession {
        &mut self.session
    }

    pub fn into_session(self) -> DeviceSession {
        self.session
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn transport(&self) -> Arc<dyn RemoteTransport> {
        Arc::clone(&self.transport)
    }

    /// Executor for the device as currently known
    pub fn executor(&self) -> RemoteExecutor {
        RemoteExecutor::for_session(Arc::clone(&self.transport), &self.session, &self.keys)
    }

    /// Resolve `candidate`, caching the address on the session
    pub async fn resolve_address(&mut self, candidate: &str) -> Option<String> {
        self.resolver.resolve(&mut self.session, candidate).await
    }

    /// Whether the device answers HTTP
    pub async fn validate_device(&self) -> bool {
        self.api.validate(self.session.host()).await
    }

    /// Select the device: validate, check SSH, reuse a saved cookie or ask
    /// the device for a challenge code.
    pub async fn connect(&mut self, candidate: &str) -> Result<ConnectOutcome> {
        self.resolve_address(candidate).await;

        if !self.validate_device().await {
            info!("No device answered at {}", self.session.host());
            return Ok(ConnectOutcome::Invalid);
        }

        if self.executor().probe_connectivity().await {
            return Ok(ConnectOutcome::AlreadyTrusted);
        }

        if self.session.auth_cookie().is_some() {
            debug!("Using saved auth cookie");
            return Ok(ConnectOutcome::NeedsKeySubmission);
        }

        self.request_challenge().await?;
        Ok(ConnectOutcome::NeedsChallenge)
    }

    /// Ask the device to display a challenge code
    pub async fn request_challenge(&self) -> Result<()> {
        self.api.request_challenge(self.session.host()).await
    }

    /// Exchange the challenge code for a cookie and persist it
    pub async fn submit_challenge_response(&mut self, code: &str) -> Result<String> {
        let cookie = self
            .api
            .submit_challenge_response(self.session.host(), code.trim())
            .await?;
        self.session.store_cookie(&cookie)?;
        info!("Authenticated with the device");
        Ok(cookie)
    }

    /// Find or generate the SSH identity, returning the public key path
    pub fn ensure_key(&mut self) -> Result<PathBuf> {
        let public_key = match self.keys.find_existing_key() {
            Some(path) => path,
            None => {
                info!("No SSH key found, generating one");
                self.keys.generate_key()?
            }
        };
        self.session.set_ssh_key_path(public_key.with_extension(""));
        Ok(public_key)
    }

    /// Submit the public key with the saved cookie
    pub async fn submit_public_key(&mut self) -> Result<()> {
        let public_key_path = self.ensure_key()?;
        let public_key = read_public_key(&public_key_path)?;
        self.api
            .submit_public_key(self.session.host(), self.session.auth_cookie(), &public_key)
            .await
    }

    /// Start waiting for the owner to approve the key
    pub fn poll_for_trust(&self, interval: Duration) -> TrustPollHandle {
        poll_for_trust(self.executor(), interval)
    }
}
