//! Release channel access
//!
//! Fetches the module catalog, per-module metadata, the core release list and
//! the install script, and downloads release tarballs to disk.

use crate::error::{InstallerError, Result};
use futures::future::join_all;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Default repository publishing the core releases and the module catalog
pub const DEFAULT_REPOSITORY: &str = "charlesvestal/move-anything";
/// Asset name of the core tarball
pub const CORE_ASSET_NAME: &str = "move-anything.tar.gz";
/// User agent sent to the releases API
pub const USER_AGENT: &str = "MoveEverything-Installer";

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Kind of module, which decides where it is installed on the device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ComponentType {
    SoundGenerator,
    AudioFx,
    MidiFx,
    #[default]
    Utility,
    Overtake,
    Other(String),
}

impl ComponentType {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentType::SoundGenerator => "sound_generator",
            ComponentType::AudioFx => "audio_fx",
            ComponentType::MidiFx => "midi_fx",
            ComponentType::Utility => "utility",
            ComponentType::Overtake => "overtake",
            ComponentType::Other(s) => s,
        }
    }

    /// Subdirectory of `modules/` this component type installs into
    pub fn install_subdir(&self) -> &'static str {
        match self {
            ComponentType::SoundGenerator => "sound_generators",
            ComponentType::AudioFx => "audio_fx",
            ComponentType::MidiFx => "midi_fx",
            ComponentType::Utility => "utilities",
            ComponentType::Overtake => "overtake",
            ComponentType::Other(_) => "other",
        }
    }
}

impl From<&str> for ComponentType {
    fn from(s: &str) -> Self {
        match s {
            "sound_generator" => ComponentType::SoundGenerator,
            "audio_fx" => ComponentType::AudioFx,
            "midi_fx" => ComponentType::MidiFx,
            "utility" => ComponentType::Utility,
            "overtake" => ComponentType::Overtake,
            other => ComponentType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ComponentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ComponentType::from(s.as_str()))
    }
}

/// Extra files a module can use (samples, soundfonts, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleAssets {
    /// Path relative to the module directory
    pub path: String,
    #[serde(default = "default_assets_label")]
    pub label: String,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, rename = "allowFolders", alias = "allow_folders")]
    pub allow_folders: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_assets_label() -> String {
    "Assets".to_string()
}

/// A downloadable release artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseArtifact {
    pub version: String,
    pub asset_name: String,
    pub download_url: String,
}

/// A module as listed by the catalog, enriched with its upstream metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    pub github_repo: String,
    pub asset_name: String,
    #[serde(default)]
    pub component_type: ComponentType,
    /// Absent when the upstream `module.json` could not be fetched
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub assets: Option<ModuleAssets>,
    #[serde(default)]
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    github_repo: String,
    asset_name: String,
    #[serde(default)]
    component_type: ComponentType,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Versioned { modules: Vec<CatalogEntry> },
    Plain(Vec<CatalogEntry>),
}

impl CatalogDocument {
    fn into_entries(self) -> Vec<CatalogEntry> {
        match self {
            CatalogDocument::Versioned { modules } => modules,
            CatalogDocument::Plain(modules) => modules,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModuleMetadata {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    assets: Option<ModuleAssets>,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
}

/// Parse a catalog document (either `{"modules": [...]}` or a bare array)
fn parse_catalog(body: &str) -> Result<Vec<CatalogEntry>> {
    let doc: CatalogDocument = serde_json::from_str(body)?;
    Ok(doc.into_entries())
}

/// First release tag that names a binary release (`v1.2.3`, not `installer-v1.0`)
fn select_binary_release(tags: &[String]) -> Option<&str> {
    tags.iter()
        .map(String::as_str)
        .find(|tag| {
            let mut chars = tag.chars();
            chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
        })
}

/// Endpoints of the release channel
#[derive(Debug, Clone)]
pub struct ReleaseChannel {
    client: Client,
    repository: String,
    raw_base: String,
    api_base: String,
    github_base: String,
}

impl ReleaseChannel {
    /// Create a release channel for the given `owner/repo`
    pub fn new(repository: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            repository: repository.to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            api_base: "https://api.github.com".to_string(),
            github_base: "https://github.com".to_string(),
        })
    }

    /// Point all endpoints at one base URL (useful for testing)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.raw_base = base.clone();
        self.api_base = base.clone();
        self.github_base = base;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn module_download_url(&self, github_repo: &str, asset_name: &str) -> String {
        format!(
            "{}/{}/releases/latest/download/{}",
            self.github_base, github_repo, asset_name
        )
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::Catalog(format!(
                "GET {} returned {}",
                url, status
            )));
        }
        Ok(response.text().await?)
    }

    async fn fetch_module_metadata(&self, github_repo: &str) -> Result<ModuleMetadata> {
        let url = format!("{}/{}/main/src/module.json", self.raw_base, github_repo);
        let body = self.get_text(&url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the module catalog, enriching every entry with its upstream version and assets
    pub async fn fetch_module_catalog(&self) -> Result<Vec<ModuleDescriptor>> {
        let url = format!(
            "{}/{}/main/module-catalog.json",
            self.raw_base, self.repository
        );
        let body = self
            .get_text(&url)
            .await
            .map_err(|e| InstallerError::Catalog(format!("Failed to fetch catalog: {}", e)))?;
        let entries = parse_catalog(&body)?;

        let modules = join_all(entries.into_iter().map(|entry| async move {
            let (version, assets) = match self.fetch_module_metadata(&entry.github_repo).await {
                Ok(meta) => {
                    debug!("Found version {:?} for {}", meta.version, entry.id);
                    (meta.version, meta.assets)
                }
                Err(e) => {
                    debug!("Could not fetch module.json for {}: {}", entry.id, e);
                    (None, None)
                }
            };

            ModuleDescriptor {
                download_url: self.module_download_url(&entry.github_repo, &entry.asset_name),
                name: entry.name.unwrap_or_else(|| entry.id.clone()),
                id: entry.id,
                github_repo: entry.github_repo,
                asset_name: entry.asset_name,
                component_type: entry.component_type,
                version,
                assets,
            }
        }))
        .await;

        info!("Loaded {} modules from catalog", modules.len());
        Ok(modules)
    }

    async fn fetch_binary_release(&self) -> Result<ReleaseArtifact> {
        let url = format!("{}/repos/{}/releases", self.api_base, self.repository);
        let body = self.get_text(&url).await?;
        let releases: Vec<GithubRelease> = serde_json::from_str(&body)?;
        let tags: Vec<String> = releases.into_iter().map(|r| r.tag_name).collect();

        let tag = select_binary_release(&tags)
            .ok_or_else(|| InstallerError::Catalog("No binary release found".to_string()))?;

        Ok(ReleaseArtifact {
            version: tag.trim_start_matches('v').to_string(),
            asset_name: CORE_ASSET_NAME.to_string(),
            download_url: format!(
                "{}/{}/releases/download/{}/{}",
                self.github_base, self.repository, tag, CORE_ASSET_NAME
            ),
        })
    }

    /// Latest core release. Falls back to the `latest` download link if the
    /// releases list cannot be read.
    pub async fn fetch_latest_release(&self) -> ReleaseArtifact {
        match self.fetch_binary_release().await {
            Ok(release) => {
                info!("Latest core release: {}", release.version);
                release
            }
            Err(e) => {
                warn!("Failed to get version from releases API: {}", e);
                ReleaseArtifact {
                    version: "latest".to_string(),
                    asset_name: CORE_ASSET_NAME.to_string(),
                    download_url: format!(
                        "{}/{}/releases/latest/download/{}",
                        self.github_base, self.repository, CORE_ASSET_NAME
                    ),
                }
            }
        }
    }

    /// Download the core install script
    pub async fn fetch_install_script(&self) -> Result<String> {
        let url = format!(
            "{}/{}/main/scripts/install.sh",
            self.raw_base, self.repository
        );
        self.get_text(&url)
            .await
            .map_err(|e| InstallerError::Download(format!("install.sh: {}", e)))
    }

    /// Stream a release to disk, returning the path written
    pub async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        let dest = download_destination(dest);
        debug!("Downloading {} to {}", url, dest.display());

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::Download(format!("{} returned {}", url, status)));
        }

        let mut file = tokio::fs::File::create(&dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InstallerError::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(dest)
    }
}

/// Relative destinations and `/tmp/...` paths land in the OS temp directory
pub fn download_destination(dest: &Path) -> PathBuf {
    if dest.is_relative() || dest.starts_with("/tmp") {
        let name = dest
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CORE_ASSET_NAME));
        std::env::temp_dir().join(name)
    } else {
        dest.to_path_buf()
    }
}
