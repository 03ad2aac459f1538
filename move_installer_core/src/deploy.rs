//! Deployment operations
//!
//! Installs the core and modules, browses and edits module directories,
//! inspects what is installed and runs maintenance tasks on the device.
//! Every path-scoped operation is confined to the modules tree.

use crate::catalog::{ComponentType, ModuleAssets, ReleaseChannel};
use crate::error::{InstallerError, Result};
use crate::keys::KeyManager;
use crate::remote::{ExecTimeout, RemoteExecutor, DEFAULT_USER, ROOT_USER};
use crate::session::DeviceSession;
use crate::ssh_config;
use crate::version::{InstalledModule, InstalledState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Installation directory on the device
pub const INSTALL_ROOT: &str = "/data/UserData/move-anything";
/// Everything path-scoped must stay below this directory
pub const MODULES_ROOT: &str = "/data/UserData/move-anything/modules/";

/// Removes stale install leftovers and temp files filling the root partition.
/// Safe to run repeatedly.
pub const STALE_CLEANUP_COMMANDS: &[&str] = &[
    "rm -f /tmp/*.log /tmp/*.json /tmp/*.tar.gz",
    "rm -rf /tmp/move-install-* /tmp/move-uninstall-*",
    "rm -rf /var/volatile/tmp/move-install-* /var/volatile/tmp/move-uninstall-*",
    "rm -f ~/move-anything.tar.gz",
];

const FREE_SPACE_COMMAND: &str = "df / | tail -1 | awk '{print $4}'";
const SCREEN_READER_STATE: &str = "/data/UserData/move-anything/config/screen_reader_state.txt";

pub const INSTALL_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Callback receiving human readable progress messages
pub type Progress<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

/// Entry of a remote directory listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Whether the core is installed, and which version
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoreStatus {
    pub installed: bool,
    pub core: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanupReport {
    pub freed_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetUploadResult {
    pub file: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallReport {
    /// Output of the install script
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UninstallReport {
    /// Whether the stock firmware binary was restored from its backup
    pub restored_original: bool,
}

#[derive(Debug, Deserialize)]
struct ModuleManifest {
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    component_type: Option<ComponentType>,
    assets: Option<ModuleAssets>,
}

impl ModuleManifest {
    fn into_installed(self) -> Option<InstalledModule> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let version = self.version.filter(|v| !v.is_empty())?;
        Some(InstalledModule {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            version,
            component_type: self.component_type.unwrap_or_default(),
            assets: self.assets,
        })
    }
}

/// Quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Collapse `.`, `..` and repeated slashes without touching the filesystem.
///
/// Returns `None` for relative paths and paths escaping `/`.
pub fn normalize_remote_path(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(format!("/{}", parts.join("/")))
}

/// Normalise `path` and require it to be strictly below the modules directory
pub fn guard_module_path(path: &str) -> Result<String> {
    let outside = || InstallerError::PathOutsideModules {
        root: MODULES_ROOT.to_string(),
        path: path.to_string(),
    };
    let normalized = normalize_remote_path(path).ok_or_else(outside)?;
    let root = MODULES_ROOT.trim_end_matches('/');
    match normalized.strip_prefix(root) {
        Some(rest) if rest.starts_with('/') && rest.len() > 1 => Ok(normalized),
        _ => Err(outside()),
    }
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value.contains('/')
        || value.contains('\\')
        || value.contains("..");
    if bad {
        return Err(InstallerError::PathOutsideModules {
            root: MODULES_ROOT.to_string(),
            path: format!("{} '{}'", kind, value),
        });
    }
    Ok(())
}

/// Directory a module is installed in
pub fn module_dir(module_id: &str, component_type: &ComponentType) -> Result<String> {
    validate_segment("module id", module_id)?;
    let subdir = component_type.install_subdir();
    validate_segment("category", subdir)?;
    guard_module_path(&format!("{}{}/{}", MODULES_ROOT, subdir, module_id))
}

/// Directory holding a module's extra assets
pub fn asset_dir(module_id: &str, component_type: &ComponentType, assets: &ModuleAssets) -> Result<String> {
    let base = module_dir(module_id, component_type)?;
    guard_module_path(&format!("{}/{}", base, assets.path.trim_matches('/')))
}

/// Parse `ls -lA` output; directories first, then by name
pub fn parse_ls_output(output: &str) -> Vec<RemoteEntry> {
    let Ok(line_re) =
        Regex::new(r"^([d\-l])\S+\s+\d+\s+\S+\s+\S+\s+(\d+)\s+\w+\s+\d+\s+[\d:]+\s+(.+)$")
    else {
        return Vec::new();
    };

    let mut entries: Vec<RemoteEntry> = output
        .lines()
        .filter_map(|line| {
            let caps = line_re.captures(line.trim_end())?;
            Some(RemoteEntry {
                name: caps.get(3)?.as_str().to_string(),
                is_directory: caps.get(1)?.as_str() == "d",
                size: caps.get(2)?.as_str().parse().unwrap_or(0),
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
    entries
}

/// Free kilobytes reported by `df`, if parseable
fn parse_free_kb(output: &str) -> Option<i64> {
    output.trim().parse().ok()
}

fn bash_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from("bash")];
    if cfg!(windows) {
        candidates.push(PathBuf::from(r"C:\Program Files\Git\bin\bash.exe"));
        candidates.push(PathBuf::from(r"C:\Program Files (x86)\Git\bin\bash.exe"));
        for var in ["PROGRAMFILES", "PROGRAMFILES(X86)"] {
            if let Ok(dir) = std::env::var(var) {
                candidates.push(Path::new(&dir).join("Git").join("bin").join("bash.exe"));
            }
        }
    }
    candidates
}

/// Locate a usable `bash` (Git Bash on Windows)
pub fn find_bash() -> Option<PathBuf> {
    bash_candidates().into_iter().find(|candidate| {
        std::process::Command::new(candidate)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    })
}

fn missing_bash() -> InstallerError {
    let hint = if cfg!(windows) {
        "Please install Git for Windows from:\nhttps://git-scm.com/download/win\n\nThen restart the installer."
    } else {
        "Please install bash with your system package manager."
    };
    InstallerError::MissingTool {
        tool: "Git Bash".to_string(),
        hint: hint.to_string(),
    }
}

/// Runs deployment and maintenance operations against one device
#[derive(Clone)]
pub struct Deployer {
    executor: RemoteExecutor,
    channel: ReleaseChannel,
    keys: KeyManager,
    hostname: String,
    resolved_address: Option<String>,
}

impl Deployer {
    pub fn new(
        executor: RemoteExecutor,
        channel: ReleaseChannel,
        keys: KeyManager,
        session: &DeviceSession,
    ) -> Self {
        Self {
            executor,
            channel,
            keys,
            hostname: session.hostname().to_string(),
            resolved_address: session.resolved_address().map(String::from),
        }
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    async fn best_effort(&self, command: &str, user: &str) -> bool {
        match self
            .executor
            .execute_as(command, user, ExecTimeout::Standard)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("Best-effort command `{}` as {} failed: {}", command, user, e);
                false
            }
        }
    }

    /// Run the cleanup list, each command as `ableton` then `root`
    async fn pre_install_cleanup(&self) {
        for command in STALE_CLEANUP_COMMANDS {
            if !self.best_effort(command, DEFAULT_USER).await
                && !self.best_effort(command, ROOT_USER).await
            {
                warn!("Cleanup command failed (non-fatal): {}", command);
            }
        }
        debug!("Device cleanup complete");
    }

    /// Install the core tarball by running the release's install script locally.
    ///
    /// The script reaches the device through the `movedevice` SSH alias.
    pub async fn install_core(&self, tarball: &Path, flags: &[String]) -> Result<InstallReport> {
        let address = self.resolved_address.as_deref().ok_or_else(|| {
            InstallerError::NotResolved(
                "Cannot install: Device IP address not available.\nPlease enter the device IP address manually."
                    .to_string(),
            )
        })?;
        let bash = find_bash().ok_or_else(missing_bash)?;
        info!("Installing core to {}", address);

        ssh_config::setup(
            self.keys.ssh_dir(),
            &self.hostname,
            Some(address),
            &self.keys.identity_file_for_config(),
        )?;

        let script = self
            .channel
            .fetch_install_script()
            .await?
            .replace("move.local", ssh_config::DEVICE_ALIAS);

        let staging = tempfile::Builder::new()
            .prefix("move-installer-")
            .tempdir()?;
        let scripts_dir = staging.path().join("scripts");
        tokio::fs::create_dir_all(&scripts_dir).await?;

        let script_path = scripts_dir.join("install.sh");
        tokio::fs::write(&script_path, script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))?;
        }
        tokio::fs::copy(tarball, staging.path().join("move-anything.tar.gz")).await?;

        self.pre_install_cleanup().await;

        let mut args = vec![
            "local".to_string(),
            "--skip-confirmation".to_string(),
            "--skip-modules".to_string(),
        ];
        args.extend(flags.iter().cloned());
        debug!("Running install.sh {} in {}", args.join(" "), scripts_dir.display());

        let mut command = tokio::process::Command::new(&bash);
        command
            .arg("./install.sh")
            .args(&args)
            .current_dir(&scripts_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(INSTALL_SCRIPT_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                InstallerError::Timeout(format!(
                    "install.sh did not finish within {}s",
                    INSTALL_SCRIPT_TIMEOUT.as_secs()
                ))
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(InstallerError::RemoteExecution {
                command: "install.sh".to_string(),
                exit_status: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }
        if !stderr.trim().is_empty() {
            debug!("install.sh stderr: {}", stderr.trim());
        }

        info!("Installation complete");
        Ok(InstallReport { output: stdout })
    }

    /// Upload a module tarball and unpack it into its category directory
    pub async fn install_module(
        &self,
        module_id: &str,
        tarball: &Path,
        component_type: &ComponentType,
    ) -> Result<()> {
        module_dir(module_id, component_type)?;
        let filename = tarball
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| {
                InstallerError::Download(format!("Not a file: {}", tarball.display()))
            })?;
        let subdir = component_type.install_subdir();

        info!("Installing module {} ({})", module_id, component_type);
        self.executor
            .upload_file(tarball, &format!("{}/{}", INSTALL_ROOT, filename), DEFAULT_USER)
            .await?;

        let file = shell_quote(&filename);
        self.executor
            .execute(&format!(
                "cd {} && mkdir -p modules/{sub} && tar -xzf {file} -C modules/{sub}/ && rm {file}",
                INSTALL_ROOT,
                sub = subdir,
                file = file
            ))
            .await?;

        info!("Module {} installed", module_id);
        Ok(())
    }

    /// Delete an installed module's directory
    pub async fn remove_module(&self, module_id: &str, component_type: &ComponentType) -> Result<()> {
        let path = module_dir(module_id, component_type)?;
        let quoted = shell_quote(&path);

        let check = self
            .executor
            .execute(&format!("test -d {} && echo exists || echo not_found", quoted))
            .await?;
        if check.trim() != "exists" {
            return Err(InstallerError::NotFound(format!(
                "Module directory not found: {}",
                path
            )));
        }

        self.executor.execute(&format!("rm -rf {}", quoted)).await?;
        info!("Module {} removed", module_id);
        Ok(())
    }

    /// List a directory below the modules tree, creating it if missing
    pub async fn list_remote_directory(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = guard_module_path(path)?;
        let quoted = shell_quote(&path);
        self.executor.execute(&format!("mkdir -p {}", quoted)).await?;
        let output = self.executor.execute(&format!("ls -lA {}", quoted)).await?;
        Ok(parse_ls_output(&output))
    }

    pub async fn create_remote_directory(&self, path: &str) -> Result<()> {
        let path = guard_module_path(path)?;
        self.executor
            .execute(&format!("mkdir -p {}", shell_quote(&path)))
            .await?;
        Ok(())
    }

    pub async fn delete_remote_path(&self, path: &str) -> Result<()> {
        let path = guard_module_path(path)?;
        self.executor
            .execute(&format!("rm -rf {}", shell_quote(&path)))
            .await?;
        Ok(())
    }

    /// Upload files and folders into `remote_dir`.
    ///
    /// Folders are recreated recursively. A failed file is reported in the
    /// results and does not stop the others.
    pub async fn upload_assets(
        &self,
        local_paths: &[PathBuf],
        remote_dir: &str,
    ) -> Result<Vec<AssetUploadResult>> {
        let remote_dir = guard_module_path(remote_dir)?;
        self.executor
            .execute(&format!("mkdir -p {}", shell_quote(&remote_dir)))
            .await?;

        let mut results = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = local_paths
            .iter()
            .rev()
            .map(|path| (path.clone(), remote_dir.clone()))
            .collect();

        while let Some((local, target_dir)) = pending.pop() {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| local.display().to_string());

            if local.is_dir() {
                let remote_subdir = format!("{}/{}", target_dir, name);
                let outcome = match self
                    .executor
                    .execute(&format!("mkdir -p {}", shell_quote(&remote_subdir)))
                    .await
                {
                    Ok(_) => std::fs::read_dir(&local)
                        .map(|entries| {
                            let mut children: Vec<PathBuf> =
                                entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
                            children.sort();
                            for child in children.into_iter().rev() {
                                pending.push((child, remote_subdir.clone()));
                            }
                        })
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                results.push(AssetUploadResult {
                    file: format!("{}/", name),
                    success: outcome.is_ok(),
                    error: outcome.err(),
                });
            } else {
                let remote_path = format!("{}/{}", target_dir, name);
                match self
                    .executor
                    .upload_file(&local, &remote_path, DEFAULT_USER)
                    .await
                {
                    Ok(()) => {
                        debug!("Uploaded {}", name);
                        results.push(AssetUploadResult {
                            file: name,
                            success: true,
                            error: None,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to upload {}: {}", name, e);
                        results.push(AssetUploadResult {
                            file: name,
                            success: false,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        Ok(results)
    }

    async fn read_core_version(&self) -> Option<String> {
        match self
            .executor
            .execute(&format!("cat {}/version.txt 2>/dev/null || echo \"\"", INSTALL_ROOT))
            .await
        {
            Ok(output) => {
                let version = output.trim();
                (!version.is_empty()).then(|| version.to_string())
            }
            Err(e) => {
                debug!("Could not read core version: {}", e);
                None
            }
        }
    }

    async fn core_present(&self) -> Result<bool> {
        let check = self
            .executor
            .execute(&format!(
                "test -d {} && echo \"installed\" || echo \"not_installed\"",
                INSTALL_ROOT
            ))
            .await?;
        Ok(check.trim() == "installed")
    }

    /// Whether the core is installed and its version
    pub async fn check_core_installation(&self) -> Result<CoreStatus> {
        if !self.core_present().await? {
            debug!("Move Everything not installed");
            return Ok(CoreStatus::default());
        }
        Ok(CoreStatus {
            installed: true,
            core: self.read_core_version().await,
        })
    }

    /// Core version plus every module manifest found on the device
    pub async fn check_installed_versions(&self, progress: Progress<'_>) -> Result<InstalledState> {
        let report = |message: &str| {
            if let Some(callback) = progress {
                callback(message);
            }
        };

        if !self.core_present().await? {
            return Ok(InstalledState::default());
        }

        report("Checking core version...");
        let core = self.read_core_version().await;

        report("Finding installed modules...");
        let listing = match self
            .executor
            .execute(&format!(
                "find {}/modules -name module.json -type f 2>/dev/null || echo \"\"",
                INSTALL_ROOT
            ))
            .await
        {
            Ok(listing) => listing,
            Err(e) => {
                debug!("Error finding modules: {}", e);
                String::new()
            }
        };

        let manifests: Vec<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        debug!("Found {} module.json files", manifests.len());

        let mut modules = Vec::new();
        for (index, manifest) in manifests.iter().enumerate() {
            report(&format!(
                "Checking module {} of {}...",
                index + 1,
                manifests.len()
            ));

            let content = match self
                .executor
                .execute(&format!("cat {}", shell_quote(manifest)))
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    debug!("Error reading {}: {}", manifest, e);
                    continue;
                }
            };

            match serde_json::from_str::<ModuleManifest>(&content) {
                Ok(parsed) => match parsed.into_installed() {
                    Some(module) => {
                        debug!("Found module: {} v{}", module.id, module.version);
                        modules.push(module);
                    }
                    None => debug!("Skipping {}: missing id or version", manifest),
                },
                Err(e) => debug!("Skipping unparsable {}: {}", manifest, e),
            }
        }

        Ok(InstalledState {
            installed: true,
            core,
            modules,
        })
    }

    /// Remove the installation and reboot into stock firmware
    pub async fn uninstall(&self) -> Result<UninstallReport> {
        info!("Uninstalling Move Everything from {}", self.executor.host());

        self.best_effort(
            "systemctl stop move-anything 2>/dev/null || killall move-anything 2>/dev/null || true",
            ROOT_USER,
        )
        .await;
        self.best_effort("rm -f /usr/lib/move-anything-shim.so", ROOT_USER)
            .await;
        self.best_effort(&format!("rm -rf {}", INSTALL_ROOT), ROOT_USER)
            .await;

        let restore = "if [ -f /opt/move/MoveOriginal ]; then mv /opt/move/MoveOriginal /opt/move/Move && echo restored; else echo no_backup; fi";
        let restored_original = match self
            .executor
            .execute_as(restore, ROOT_USER, ExecTimeout::Standard)
            .await
        {
            Ok(output) => output.trim() == "restored",
            Err(e) => {
                warn!("Restoring the original Move binary failed: {}", e);
                false
            }
        };
        if !restored_original {
            debug!("No backup restored, original Move binary may already be in place");
        }

        let remaining = self
            .executor
            .execute_as(
                &format!("test -e {} && echo present || echo absent", INSTALL_ROOT),
                ROOT_USER,
                ExecTimeout::Standard,
            )
            .await?;
        if remaining.trim() != "absent" {
            return Err(InstallerError::Verification(format!(
                "{} is still present on the device",
                INSTALL_ROOT
            )));
        }

        // the connection drops while the device goes down
        self.best_effort("reboot", ROOT_USER).await;
        info!("Uninstall complete, device is restarting");
        Ok(UninstallReport { restored_original })
    }

    async fn free_kb(&self) -> Option<i64> {
        self.executor
            .execute_as(FREE_SPACE_COMMAND, ROOT_USER, ExecTimeout::Standard)
            .await
            .ok()
            .and_then(|output| parse_free_kb(&output))
    }

    /// Clear temp files on the root partition, reporting the space freed
    pub async fn clean_device_tmp(&self) -> Result<CleanupReport> {
        info!("Cleaning /tmp on device to free root partition space");
        let before = self.free_kb().await;

        for command in STALE_CLEANUP_COMMANDS {
            if !self.best_effort(command, ROOT_USER).await {
                warn!("Cleanup command failed (non-fatal): {}", command);
            }
        }

        let after = self.free_kb().await;
        let freed_kb = match (before, after) {
            (Some(before), Some(after)) => after - before,
            _ => 0,
        };
        let freed_mb = if freed_kb > 0 {
            (freed_kb as f64 / 1024.0 * 10.0).round() / 10.0
        } else {
            0.0
        };

        info!("Freed {:.1}MB on root partition", freed_mb);
        Ok(CleanupReport { freed_mb })
    }

    /// Restore ownership, the shim's setuid bit and executable bits
    pub async fn fix_permissions(&self) -> Result<()> {
        let commands = [
            format!("chown -R ableton:ableton {}/", INSTALL_ROOT),
            format!("chmod u+s {}/move-anything-shim.so", INSTALL_ROOT),
            format!(
                "chmod +x {root}/move-anything {root}/shim-entrypoint.sh {root}/start.sh {root}/stop.sh",
                root = INSTALL_ROOT
            ),
        ];
        for command in &commands {
            self.executor
                .execute_as(command, ROOT_USER, ExecTimeout::Standard)
                .await?;
        }
        info!("Permissions fixed");
        Ok(())
    }

    /// Whether the on-device screen reader is enabled. Unreadable state reads as off.
    pub async fn screen_reader_status(&self) -> bool {
        match self
            .executor
            .execute(&format!("cat {} 2>/dev/null || echo \"0\"", SCREEN_READER_STATE))
            .await
        {
            Ok(output) => output.trim() == "1",
            Err(e) => {
                debug!("Could not read screen reader status: {}", e);
                false
            }
        }
    }

    /// Write the screen reader state and restart the process to apply it
    pub async fn set_screen_reader(&self, enabled: bool) -> Result<()> {
        self.executor
            .execute(&format!("mkdir -p {}/config", INSTALL_ROOT))
            .await?;
        let value = if enabled { "1" } else { "0" };
        self.executor
            .execute(&format!("echo \"{}\" > {}", value, SCREEN_READER_STATE))
            .await?;
        self.executor
            .execute_as(
                "killall move-anything 2>/dev/null || true",
                ROOT_USER,
                ExecTimeout::Standard,
            )
            .await?;
        info!(
            "Screen reader {}, restarting",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}
