//! Device HTTP API client
//!
//! The device exposes a small HTTP API used to pair a computer with it:
//! - `POST /api/v1/challenge` shows a one-time code on the device display
//! - `POST /api/v1/challenge-response` exchanges that code for a session cookie
//! - `POST /api/v1/ssh` registers a public key, pending approval on the device

use crate::error::{InstallerError, Result};
use crate::keys::strip_key_comment;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

pub const CHALLENGE_PATH: &str = "/api/v1/challenge";
pub const CHALLENGE_RESPONSE_PATH: &str = "/api/v1/challenge-response";
pub const SSH_KEY_PATH: &str = "/api/v1/ssh";

/// Timeout for requests that wait on the user at the device
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for reachability checks
pub const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChallengeResponse<'a> {
    secret: &'a str,
}

/// Cookie value of the first `Set-Cookie` header, without its attributes
fn extract_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .next()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|cookie| cookie.trim().to_string())
        .filter(|cookie| !cookie.is_empty())
}

async fn status_and_body(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    (status, body)
}

/// HTTP client for the device's pairing API
#[derive(Debug, Clone)]
pub struct DeviceApi {
    client: Client,
    port: Option<u16>,
}

impl DeviceApi {
    pub fn new() -> Result<Self> {
        // LAN only; a proxy would also hide the device's own address
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self { client, port: None })
    }

    /// Talk to the API on a non-default port (useful for testing)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Base URL for an address (IPv4, bracketed IPv6 or hostname)
    pub fn base_url(&self, address: &str) -> String {
        match self.port {
            Some(port) => format!("http://{}:{}", address, port),
            None => format!("http://{}", address),
        }
    }

    /// Whether anything answers HTTP at the address. Any status counts.
    pub async fn validate(&self, address: &str) -> bool {
        let url = format!("{}/", self.base_url(address));
        debug!("Validating via HTTP: {}", url);

        match self.client.get(&url).timeout(VALIDATE_TIMEOUT).send().await {
            Ok(response) => {
                debug!("HTTP validation answered {}", response.status());
                true
            }
            Err(e) => {
                debug!("HTTP validation failed: {}", e);
                false
            }
        }
    }

    /// Connect to `host` over HTTP and report the peer IP the socket reached.
    ///
    /// IPv4-mapped IPv6 addresses are reported as plain IPv4, IPv6 addresses
    /// are bracketed.
    pub async fn observe_remote_address(&self, host: &str) -> Result<Option<String>> {
        let url = format!("{}/", self.base_url(host));
        let response = self
            .client
            .get(&url)
            .timeout(VALIDATE_TIMEOUT)
            .send()
            .await?;

        Ok(response.remote_addr().map(|addr| {
            let ip = addr.ip().to_canonical();
            debug!("HTTP connected to IP: {}", ip);
            if ip.is_ipv6() {
                format!("[{}]", ip)
            } else {
                ip.to_string()
            }
        }))
    }

    /// Ask the device to display a challenge code
    pub async fn request_challenge(&self, address: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url(address), CHALLENGE_PATH);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(InstallerError::Authentication(format!(
                "Challenge request failed: {}",
                status.as_u16()
            )));
        }

        info!("Challenge code requested from {}", address);
        Ok(())
    }

    /// Exchange the code shown on the device for a session cookie
    pub async fn submit_challenge_response(&self, address: &str, code: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url(address), CHALLENGE_RESPONSE_PATH);
        debug!("Submitting challenge response to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&ChallengeResponse { secret: code })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let (status, body) = status_and_body(response).await;
            return Err(InstallerError::Authentication(format!(
                "Auth failed: {} - {}",
                status.as_u16(),
                body
            )));
        }

        extract_cookie(&response)
            .ok_or_else(|| InstallerError::Protocol("No cookie returned from auth".to_string()))
    }

    /// Register a public key with the device.
    ///
    /// The key comment is stripped and the key is sent as the raw body.
    pub async fn submit_public_key(
        &self,
        address: &str,
        cookie: Option<&str>,
        public_key: &str,
    ) -> Result<()> {
        let cookie = cookie.ok_or_else(|| {
            InstallerError::Authentication("No auth cookie available".to_string())
        })?;
        let key = strip_key_comment(public_key)?;

        let url = format!("{}{}", self.base_url(address), SSH_KEY_PATH);
        debug!("Submitting SSH key to {} ({} bytes)", url, key.len());

        let response = self
            .client
            .post(&url)
            .header(COOKIE, cookie)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(key)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let (status, body) = status_and_body(response).await;
            return Err(InstallerError::Authentication(format!(
                "SSH key submission failed: {} - {}",
                status.as_u16(),
                body
            )));
        }

        info!("Public key submitted, waiting for approval on the device");
        Ok(())
    }
}
