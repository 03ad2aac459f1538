//! Device address resolution
//!
//! The device is usually reached as `move.local`, which not every platform
//! resolves reliably. Resolution tries, in order: a literal address, the
//! session cache, the OS resolver, a multicast DNS query for `.local` names,
//! and finally the peer address of a plain HTTP connection to the hostname.

use crate::device_api::DeviceApi;
use crate::session::DeviceSession;
use mdns_sd::{HostnameResolutionEvent, ServiceDaemon};
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// Bound on each OS resolver invocation
pub const OS_RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on the multicast DNS hostname query
pub const MDNS_RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Format an IP for use in URLs and SSH targets (IPv6 is bracketed)
pub fn format_address(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    }
}

/// Pick the primary address (prefers IPv4)
pub fn preferred_address<I: IntoIterator<Item = IpAddr>>(addresses: I) -> Option<IpAddr> {
    let addresses: Vec<IpAddr> = addresses.into_iter().collect();
    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or(addresses.first())
        .copied()
}

/// Reduce user input like `http://move.local/` to the bare host
pub fn normalize_candidate(candidate: &str) -> String {
    let trimmed = candidate.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

/// A literal IPv4 address, or a bare/bracketed IPv6 address (returned bracketed)
pub fn parse_literal(candidate: &str) -> Option<String> {
    if let Ok(v4) = candidate.parse::<Ipv4Addr>() {
        return Some(v4.to_string());
    }
    let inner = candidate
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(candidate);
    inner
        .parse::<Ipv6Addr>()
        .ok()
        .map(|v6| format!("[{}]", v6))
}

/// Address from `ping -n 1 <host>` output (IPv4 first, then bracketed IPv6)
pub fn parse_ping_output(output: &str) -> Option<String> {
    let v4 = Regex::new(r"\[?(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\]?").ok()?;
    if let Some(found) = v4
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<Ipv4Addr>().ok())
    {
        return Some(found.to_string());
    }

    let v6 = Regex::new(r"(?i)\[([0-9a-f:]+)\]").ok()?;
    v6.captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<Ipv6Addr>().ok())
        .map(|ip| format!("[{}]", ip))
}

/// First `ip_address:` line of `dscacheutil -q host -a name <host>`
pub fn parse_dscacheutil_output(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("ip_address:"))
        .find_map(|value| value.trim().parse::<Ipv4Addr>().ok())
        .map(|ip| ip.to_string())
}

/// First address column of `getent ahostsv4 <host>`
pub fn parse_getent_output(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .and_then(|value| value.parse::<Ipv4Addr>().ok())
        .map(|ip| ip.to_string())
}

async fn run_resolver(program: &str, args: &[&str]) -> Option<String> {
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);

    match tokio::time::timeout(OS_RESOLVE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).to_string()),
        Ok(Err(e)) => {
            debug!("{} failed to start: {}", program, e);
            None
        }
        Err(_) => {
            debug!("{} timed out", program);
            None
        }
    }
}

/// Resolve `host` with the platform's own resolver
pub async fn resolve_with_os(host: &str) -> Option<String> {
    debug!("Resolving {} with the system resolver", host);

    #[cfg(target_os = "windows")]
    {
        let output = run_resolver("ping", &["-n", "1", host]).await?;
        parse_ping_output(&output)
    }

    #[cfg(target_os = "macos")]
    {
        let output = run_resolver("dscacheutil", &["-q", "host", "-a", "name", host]).await?;
        parse_dscacheutil_output(&output)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let output = run_resolver("getent", &["ahostsv4", host]).await?;
        parse_getent_output(&output)
    }
}

/// Resolve a `.local` name with a multicast DNS hostname query
pub async fn resolve_with_mdns(host: &str, timeout: Duration) -> Option<String> {
    let fqdn = format!("{}.", host.trim_end_matches('.'));

    let found = tokio::task::spawn_blocking(move || {
        let daemon = ServiceDaemon::new()
            .map_err(|e| debug!("Failed to create mDNS daemon: {}", e))
            .ok()?;
        let receiver = daemon
            .resolve_hostname(&fqdn, Some(timeout.as_millis() as u64))
            .map_err(|e| debug!("mDNS query for {} failed: {}", fqdn, e))
            .ok()?;

        let deadline = Instant::now() + timeout;
        let mut found = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match receiver.recv_timeout(remaining) {
                Ok(HostnameResolutionEvent::AddressesFound(_, addresses)) => {
                    found = preferred_address(addresses);
                    break;
                }
                Ok(HostnameResolutionEvent::SearchTimeout(_))
                | Ok(HostnameResolutionEvent::SearchStopped(_)) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }

        let _ = daemon.shutdown();
        found
    })
    .await
    .ok()??;

    Some(format_address(found))
}

/// Resolves the device address and caches it on the session
#[derive(Debug, Clone)]
pub struct AddressResolver {
    api: DeviceApi,
    system_lookups: bool,
    mdns_timeout: Duration,
}

impl AddressResolver {
    pub fn new(api: DeviceApi) -> Self {
        Self {
            api,
            system_lookups: true,
            mdns_timeout: MDNS_RESOLVE_TIMEOUT,
        }
    }

    /// Skip the OS resolver and mDNS, leaving only the HTTP socket fallback
    pub fn without_system_lookups(mut self) -> Self {
        self.system_lookups = false;
        self
    }

    /// Resolve `candidate` (hostname or literal IP) to an address.
    ///
    /// Returns `None` if nothing worked; callers continue with the hostname.
    pub async fn resolve(&self, session: &mut DeviceSession, candidate: &str) -> Option<String> {
        let host = normalize_candidate(candidate);

        if let Some(literal) = parse_literal(&host) {
            match session.resolved_address() {
                Some(cached) if cached == literal => {}
                Some(cached) => {
                    debug!(
                        "Different IP entered, resetting cache (was {}, now {})",
                        cached, literal
                    );
                    session.set_resolved_address(&literal);
                }
                None => session.set_resolved_address(&literal),
            }
            return Some(literal);
        }

        session.set_hostname(&host);
        if let Some(cached) = session.resolved_address() {
            debug!("Using cached IP: {}", cached);
            return Some(cached.to_string());
        }

        let resolved = self.lookup(&host).await;
        match &resolved {
            Some(address) => {
                info!("Resolved {} to {}", host, address);
                session.set_resolved_address(address);
            }
            None => debug!("Could not resolve {}, continuing with the hostname", host),
        }
        resolved
    }

    async fn lookup(&self, host: &str) -> Option<String> {
        if self.system_lookups {
            if let Some(address) = resolve_with_os(host).await {
                return Some(address);
            }
            if host.ends_with(".local") {
                if let Some(address) = resolve_with_mdns(host, self.mdns_timeout).await {
                    return Some(address);
                }
            }
        }

        match self.api.observe_remote_address(host).await {
            Ok(address) => address,
            Err(e) => {
                debug!("HTTP address discovery failed: {}", e);
                None
            }
        }
    }
}

/// Resolve with the default resolver chain
pub async fn resolve_address(
    session: &mut DeviceSession,
    candidate: &str,
    api: &DeviceApi,
) -> Option<String> {
    AddressResolver::new(api.clone())
        .resolve(session, candidate)
        .await
}

/// Get the current hostname
pub fn get_hostname() -> String {
    hostname::get()
        .map(|h: std::ffi::OsString| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Get local IP addresses
pub fn get_local_addresses() -> Vec<IpAddr> {
    local_ip_address::list_afinet_netifas()
        .map(|ifaces| {
            ifaces
                .into_iter()
                .map(|(_, ip)| ip)
                .filter(|ip| !ip.is_loopback())
                .collect()
        })
        .unwrap_or_default()
}
