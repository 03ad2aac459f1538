//! Integration tests for the Move Everything installer core
//!
//! These tests drive the public API against a stub HTTP device and a
//! recording SSH transport.

use async_trait::async_trait;
use move_installer_core::{
    deploy::Deployer,
    error::{InstallerError, Result},
    remote::{ExecOutput, ExecTimeout, RemoteExecutor, RemoteTransport, SshTarget},
    ComponentType, ConnectOutcome, DeviceApi, DeviceSession, CookieStore, KeyManager,
    OperationQueue, PollOutcome, ReleaseChannel, TrustBootstrap,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Responder = Box<dyn Fn(&str, &str) -> ExecOutput + Send + Sync>;

/// Transport that records every call and answers from a closure
struct RecordingTransport {
    commands: Mutex<Vec<(String, String)>>,
    uploads: Mutex<Vec<(String, String)>>,
    respond: Responder,
}

impl RecordingTransport {
    fn new(respond: impl Fn(&str, &str) -> ExecOutput + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn exec(&self, target: &SshTarget, command: &str, _timeout: ExecTimeout) -> Result<ExecOutput> {
        self.commands
            .lock()
            .unwrap()
            .push((target.user.clone(), command.to_string()));
        Ok((self.respond)(&target.user, command))
    }

    async fn upload(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((local.display().to_string(), format!("{}@{}", target.user, remote)));
        Ok(())
    }
}

fn stdout(text: &str) -> ExecOutput {
    ExecOutput {
        stdout: text.to_string(),
        ..Default::default()
    }
}

/// A request seen by the stub HTTP server
#[derive(Debug, Clone)]
struct SeenRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: String,
}

/// HTTP server answering from a route table; unknown paths get 404
async fn stub_http(
    routes: Vec<(&'static str, String)>,
) -> (u16, Arc<Mutex<Vec<SeenRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let routes: Arc<HashMap<&'static str, String>> = Arc::new(routes.into_iter().collect());

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                let (head, body) = loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    raw.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&raw).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let head = text[..end].to_string();
                        let length = head
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if raw.len() >= end + 4 + length {
                            break (head, text[end + 4..].to_string());
                        }
                    }
                };

                let mut lines = head.lines();
                let mut request_line = lines.next().unwrap_or("").split_whitespace();
                let method = request_line.next().unwrap_or("").to_string();
                let path = request_line.next().unwrap_or("").to_string();
                let headers = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                    .collect();
                log.lock().unwrap().push(SeenRequest {
                    method,
                    path: path.clone(),
                    headers,
                    body,
                });

                let response = match routes.get(path.as_str()) {
                    Some(response) => response.clone(),
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                };
                stream.write_all(response.as_bytes()).await.ok();
                stream.shutdown().await.ok();
            });
        }
    });

    (port, seen)
}

fn ok_json(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn session_in(temp_dir: &TempDir) -> DeviceSession {
    DeviceSession::new(
        "move.local",
        CookieStore::with_path(temp_dir.path().join(".move-everything-installer-cookie")),
    )
}

/// Full trust bootstrap: challenge, cookie, key submission, then approval
#[tokio::test]
async fn test_trust_bootstrap_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let (port, seen) = stub_http(vec![
        ("/", ok_json("{}")),
        ("/api/v1/challenge", ok_json("{}")),
        (
            "/api/v1/challenge-response",
            "HTTP/1.1 200 OK\r\nSet-Cookie: Ableton-Challenge-Response-Token=abc123; Path=/; HttpOnly\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        ),
        ("/api/v1/ssh", ok_json("")),
    ])
    .await;

    let transport = RecordingTransport::new(|user, command| {
        if command == "echo test" && user == "ableton" {
            stdout("test\n")
        } else {
            stdout("")
        }
    });

    let keys = KeyManager::with_dir(temp_dir.path().join(".ssh")).without_native_keygen();
    let mut bootstrap = TrustBootstrap::new(
        session_in(&temp_dir),
        DeviceApi::new().unwrap().with_port(port),
        keys,
        transport.clone(),
    );

    // no key yet, so SSH is not even attempted
    let outcome = bootstrap.connect("127.0.0.1").await.unwrap();
    assert_eq!(outcome, ConnectOutcome::NeedsChallenge);
    assert!(transport.commands().is_empty());

    let cookie = bootstrap.submit_challenge_response(" 123456 ").await.unwrap();
    assert_eq!(cookie, "Ableton-Challenge-Response-Token=abc123");
    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join(".move-everything-installer-cookie"))
            .unwrap()
            .trim(),
        cookie
    );

    bootstrap.submit_public_key().await.unwrap();

    let requests = seen.lock().unwrap().clone();
    let challenge = requests
        .iter()
        .find(|r| r.path == "/api/v1/challenge-response")
        .unwrap();
    assert_eq!(challenge.body, r#"{"secret":"123456"}"#);

    let key_request = requests.iter().find(|r| r.path == "/api/v1/ssh").unwrap();
    assert_eq!(key_request.method, "POST");
    assert_eq!(key_request.headers.get("cookie").map(String::as_str), Some(cookie.as_str()));
    let parts: Vec<&str> = key_request.body.trim().split_whitespace().collect();
    assert_eq!(parts.len(), 2, "key comment must be stripped");
    assert_eq!(parts[0], "ssh-ed25519");

    let handle = bootstrap.poll_for_trust(Duration::from_millis(10));
    assert_eq!(handle.wait().await, PollOutcome::Trusted);

    let commands = transport.commands();
    let repairs = commands
        .iter()
        .filter(|(user, cmd)| user == "ableton" && cmd.contains("chmod 600 ~/.ssh/authorized_keys"))
        .count();
    assert_eq!(repairs, 1);
    assert_eq!(commands[0], ("ableton".to_string(), "echo test".to_string()));
}

/// A saved cookie skips the challenge
#[tokio::test]
async fn test_connect_reuses_saved_cookie() {
    let temp_dir = TempDir::new().unwrap();
    let (port, seen) = stub_http(vec![("/", ok_json("{}"))]).await;

    let session = session_in(&temp_dir);
    session.cookie_store().save("token=saved").unwrap();
    let session = session_in(&temp_dir);
    assert_eq!(session.auth_cookie(), Some("token=saved"));

    let mut bootstrap = TrustBootstrap::new(
        session,
        DeviceApi::new().unwrap().with_port(port),
        KeyManager::with_dir(temp_dir.path().join(".ssh")),
        RecordingTransport::new(|_, _| stdout("")),
    );

    let outcome = bootstrap.connect("127.0.0.1").await.unwrap();
    assert_eq!(outcome, ConnectOutcome::NeedsKeySubmission);
    assert!(seen
        .lock()
        .unwrap()
        .iter()
        .all(|r| r.path != "/api/v1/challenge"));
}

fn deployer_for(transport: Arc<RecordingTransport>, temp_dir: &TempDir, channel: ReleaseChannel) -> Deployer {
    let mut session = session_in(temp_dir);
    session.set_resolved_address("192.168.1.5");
    let keys = KeyManager::with_dir(temp_dir.path().join(".ssh"));
    let executor = RemoteExecutor::new(
        transport,
        session.host(),
        Some(temp_dir.path().join(".ssh").join("move_key")),
    );
    Deployer::new(executor, channel, keys, &session)
}

/// Paths outside the modules tree never reach the device
#[tokio::test]
async fn test_path_guard_blocks_before_remote_commands() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_, _| stdout(""));
    let deployer = deployer_for(
        transport.clone(),
        &temp_dir,
        ReleaseChannel::new("charlesvestal/move-anything").unwrap(),
    );

    for path in [
        "/data/UserData/move-anything/modules/../../../../etc/shadow",
        "/data/UserData/move-anything/modules-backup",
        "/data/UserData/move-anything",
        "/",
    ] {
        let err = deployer.delete_remote_path(path).await.unwrap_err();
        assert!(matches!(err, InstallerError::PathOutsideModules { .. }));
    }
    assert!(transport.commands().is_empty());

    deployer
        .delete_remote_path("/data/UserData/move-anything/modules/sound_generators/sf2/soundfonts/old.sf2")
        .await
        .unwrap();
    assert_eq!(
        transport.commands(),
        vec![(
            "ableton".to_string(),
            "rm -rf '/data/UserData/move-anything/modules/sound_generators/sf2/soundfonts/old.sf2'"
                .to_string()
        )]
    );
}

/// Device-changing operations submitted together run in submission order
#[tokio::test]
async fn test_queue_serializes_deploy_operations() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_, _| stdout(""));
    let deployer = deployer_for(
        transport.clone(),
        &temp_dir,
        ReleaseChannel::new("charlesvestal/move-anything").unwrap(),
    );
    let queue = OperationQueue::new();

    let base = "/data/UserData/move-anything/modules/utilities";
    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let deployer = deployer.clone();
        let path = format!("{}/{}", base, name);
        handles.push(queue.submit(async move { deployer.create_remote_directory(&path).await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let created: Vec<String> = transport.commands().into_iter().map(|(_, c)| c).collect();
    assert_eq!(
        created,
        vec![
            format!("mkdir -p '{}/a'", base),
            format!("mkdir -p '{}/b'", base),
            format!("mkdir -p '{}/c'", base),
        ]
    );
}

/// A device without the sentinel directory reports nothing installed
#[tokio::test]
async fn test_fresh_device_status() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_, command| {
        if command.starts_with("test -d") {
            stdout("not_installed\n")
        } else {
            panic!("unexpected command: {}", command)
        }
    });
    let deployer = deployer_for(
        transport,
        &temp_dir,
        ReleaseChannel::new("charlesvestal/move-anything").unwrap(),
    );

    let status = deployer.check_core_installation().await.unwrap();
    assert!(!status.installed);
    assert_eq!(status.core, None);

    let state = deployer.check_installed_versions(None).await.unwrap();
    assert!(!state.installed);
    assert!(state.modules.is_empty());
}

/// Installed state from the device reconciled against a stub release channel
#[tokio::test]
async fn test_upgrade_check_against_release_channel() {
    let temp_dir = TempDir::new().unwrap();
    let (port, _seen) = stub_http(vec![
        (
            "/charlesvestal/move-anything/main/module-catalog.json",
            ok_json(
                r#"{"catalog_version": 2, "modules": [
                    {"id": "braids", "name": "Braids", "github_repo": "dev/braids", "asset_name": "braids.tar.gz", "component_type": "sound_generator"},
                    {"id": "chorus", "name": "Chorus", "github_repo": "dev/chorus", "asset_name": "chorus.tar.gz", "component_type": "audio_fx"}
                ]}"#,
            ),
        ),
        ("/dev/braids/main/src/module.json", ok_json(r#"{"version": "0.3.0"}"#)),
        ("/dev/chorus/main/src/module.json", ok_json(r#"{"version": "1.0.0"}"#)),
        (
            "/repos/charlesvestal/move-anything/releases",
            ok_json(r#"[{"tag_name": "installer-v2.0.0"}, {"tag_name": "v1.3.0"}, {"tag_name": "v1.2.0"}]"#),
        ),
    ])
    .await;
    let channel = ReleaseChannel::new("charlesvestal/move-anything")
        .unwrap()
        .with_base_url(&format!("http://127.0.0.1:{}", port));

    let transport = RecordingTransport::new(|_, command| {
        if command.starts_with("test -d") {
            stdout("installed\n")
        } else if command.contains("version.txt") {
            stdout("1.2.0\n")
        } else if command.starts_with("find ") {
            stdout("/data/UserData/move-anything/modules/sound_generators/braids/module.json\n\
                    /data/UserData/move-anything/modules/utilities/legacy/module.json\n")
        } else if command.contains("braids") {
            stdout(r#"{"id": "braids", "name": "Braids", "version": "0.2.0", "component_type": "sound_generator"}"#)
        } else {
            stdout(r#"{"id": "legacy", "version": "0.1.0"}"#)
        }
    });
    let deployer = deployer_for(transport, &temp_dir, channel.clone());

    let installed = deployer.check_installed_versions(None).await.unwrap();
    let latest = channel.fetch_latest_release().await;
    let catalog = channel.fetch_module_catalog().await.unwrap();
    let comparison = move_installer_core::reconcile(&installed, &latest, &catalog);

    let upgrade = comparison.core_upgrade.unwrap();
    assert_eq!(upgrade.current, "1.2.0");
    assert_eq!(upgrade.available, "1.3.0");

    assert_eq!(comparison.upgradable_modules.len(), 1);
    assert_eq!(comparison.upgradable_modules[0].module.id, "braids");
    assert_eq!(comparison.upgradable_modules[0].current_version, "0.2.0");
    assert_eq!(comparison.new_modules.len(), 1);
    assert_eq!(comparison.new_modules[0].id, "chorus");
    assert_eq!(comparison.new_modules[0].component_type, ComponentType::AudioFx);
    assert!(comparison.up_to_date_modules.is_empty());
    assert_eq!(comparison.orphaned_modules.len(), 1);
    assert_eq!(comparison.orphaned_modules[0].id, "legacy");
}

/// Module install uploads then unpacks into the category directory
#[tokio::test]
async fn test_install_module_sequence() {
    let temp_dir = TempDir::new().unwrap();
    let tarball = temp_dir.path().join("chorus.tar.gz");
    std::fs::write(&tarball, b"archive").unwrap();

    let transport = RecordingTransport::new(|_, _| stdout(""));
    let deployer = deployer_for(
        transport.clone(),
        &temp_dir,
        ReleaseChannel::new("charlesvestal/move-anything").unwrap(),
    );

    deployer
        .install_module("chorus", &tarball, &ComponentType::AudioFx)
        .await
        .unwrap();

    let uploads = transport.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, "ableton@/data/UserData/move-anything/chorus.tar.gz");

    let commands = transport.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0]
        .1
        .contains("tar -xzf 'chorus.tar.gz' -C modules/audio_fx/"));
}
