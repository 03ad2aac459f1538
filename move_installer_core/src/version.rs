//! Version comparison and installed/catalog reconciliation

use crate::catalog::{ComponentType, ModuleAssets, ModuleDescriptor, ReleaseArtifact};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A module found installed on the device (from its `module.json`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstalledModule {
    pub id: String,
    pub name: String,
    pub version: String,
    pub component_type: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<ModuleAssets>,
}

/// What is installed on the device
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstalledState {
    pub installed: bool,
    pub core: Option<String>,
    #[serde(default)]
    pub modules: Vec<InstalledModule>,
}

/// Available core upgrade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoreUpgrade {
    pub current: String,
    pub available: String,
}

/// A catalog module together with the version found on the device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleStatus {
    #[serde(flatten)]
    pub module: ModuleDescriptor,
    pub current_version: String,
}

/// Result of comparing the device against the release channel
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionComparison {
    pub core_upgrade: Option<CoreUpgrade>,
    pub upgradable_modules: Vec<ModuleStatus>,
    pub up_to_date_modules: Vec<ModuleStatus>,
    pub new_modules: Vec<ModuleDescriptor>,
    /// Installed modules that the catalog no longer lists
    pub orphaned_modules: Vec<InstalledModule>,
}

fn parse_components(version: &str) -> Vec<u64> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    trimmed
        .split('.')
        .map(leading_number)
        .collect()
}

/// Numeric prefix of a component, so `3-beta` reads as 3
fn leading_number(part: &str) -> u64 {
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().unwrap_or(0)
}

/// Compare two version strings component-wise.
///
/// A leading `v` is ignored. Each component counts by its leading digits,
/// so missing or non-numeric components count as 0.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = parse_components(a);
    let b = parse_components(b);
    let len = a.len().max(b.len());

    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

/// True when `candidate` is strictly newer than `current`
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Diff what is installed against the latest core release and the module catalog
pub fn reconcile(
    installed: &InstalledState,
    latest_core: &ReleaseArtifact,
    catalog: &[ModuleDescriptor],
) -> VersionComparison {
    let mut result = VersionComparison::default();

    if let Some(current) = installed.core.as_deref() {
        if !latest_core.version.is_empty() && is_newer(&latest_core.version, current) {
            result.core_upgrade = Some(CoreUpgrade {
                current: current.to_string(),
                available: latest_core.version.clone(),
            });
        }
    }

    let by_id: HashMap<&str, &InstalledModule> = installed
        .modules
        .iter()
        .map(|m| (m.id.as_str(), m))
        .collect();

    for module in catalog {
        match by_id.get(module.id.as_str()) {
            Some(found) => {
                let status = ModuleStatus {
                    module: module.clone(),
                    current_version: found.version.clone(),
                };
                match module.version.as_deref() {
                    Some(available) if is_newer(available, &found.version) => {
                        result.upgradable_modules.push(status)
                    }
                    // No catalog version means no upgrade information
                    _ => result.up_to_date_modules.push(status),
                }
            }
            None => result.new_modules.push(module.clone()),
        }
    }

    let catalog_ids: HashSet<&str> = catalog.iter().map(|m| m.id.as_str()).collect();
    result.orphaned_modules = installed
        .modules
        .iter()
        .filter(|m| !catalog_ids.contains(m.id.as_str()))
        .cloned()
        .collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_module(id: &str, version: Option<&str>) -> ModuleDescriptor {
        ModuleDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            github_repo: format!("someone/{}", id),
            asset_name: format!("{}-module.tar.gz", id),
            component_type: ComponentType::SoundGenerator,
            version: version.map(String::from),
            assets: None,
            download_url: format!(
                "https://github.com/someone/{}/releases/latest/download/{}-module.tar.gz",
                id, id
            ),
        }
    }

    fn installed_module(id: &str, version: &str) -> InstalledModule {
        InstalledModule {
            id: id.to_string(),
            name: id.to_string(),
            version: version.to_string(),
            component_type: ComponentType::SoundGenerator,
            assets: None,
        }
    }

    fn release(version: &str) -> ReleaseArtifact {
        ReleaseArtifact {
            version: version.to_string(),
            asset_name: "move-anything.tar.gz".to_string(),
            download_url: String::new(),
        }
    }

    #[test]
    fn test_is_newer_basic() {
        assert!(is_newer("2.1.0", "2.0.9"));
        assert!(!is_newer("2.0.9", "2.1.0"));
    }

    #[test]
    fn test_is_newer_padding_and_prefix() {
        assert!(!is_newer("2.0", "2.0.0"));
        assert!(!is_newer("2.0.0", "2.0"));
        assert!(!is_newer("v1.2", "1.2.0"));
        assert!(is_newer("v1.2.1", "1.2"));
    }

    #[test]
    fn test_is_newer_numeric_not_lexicographic() {
        assert!(is_newer("1.10.0", "1.9.9"));
        assert!(!is_newer("1.9.9", "1.10.0"));
    }

    #[test]
    fn test_is_newer_non_numeric_segments() {
        assert!(!is_newer("1.2.beta", "1.2.0"));
        assert!(is_newer("1.2.1", "1.2.beta"));
        assert!(!is_newer("", ""));
    }

    #[test]
    fn test_is_newer_pre_release_suffix() {
        assert!(is_newer("1.2.3-beta", "1.2.2"));
        assert!(is_newer("v2.0.0-rc1", "1.9.9"));
        assert!(!is_newer("1.2.3-beta", "1.2.3"));
        assert!(!is_newer("1.2.3", "1.2.3-beta"));
    }

    #[test]
    fn test_reconcile_buckets() {
        let installed = InstalledState {
            installed: true,
            core: Some("1.2.0".to_string()),
            modules: vec![
                installed_module("braids", "0.1.0"),
                installed_module("dexed", "1.0.0"),
                installed_module("mystery", "0.0.1"),
            ],
        };
        let catalog = vec![
            catalog_module("braids", Some("0.2.0")),
            catalog_module("dexed", Some("1.0.0")),
            catalog_module("sf2", Some("0.3.0")),
            catalog_module("unknown-version", None),
        ];

        let result = reconcile(&installed, &release("1.3.0"), &catalog);

        assert_eq!(
            result.core_upgrade,
            Some(CoreUpgrade {
                current: "1.2.0".to_string(),
                available: "1.3.0".to_string()
            })
        );
        assert_eq!(result.upgradable_modules.len(), 1);
        assert_eq!(result.upgradable_modules[0].module.id, "braids");
        assert_eq!(result.upgradable_modules[0].current_version, "0.1.0");
        assert_eq!(result.up_to_date_modules.len(), 1);
        assert_eq!(result.up_to_date_modules[0].module.id, "dexed");
        let new_ids: Vec<_> = result.new_modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(new_ids, vec!["sf2", "unknown-version"]);
        assert_eq!(result.orphaned_modules.len(), 1);
        assert_eq!(result.orphaned_modules[0].id, "mystery");
    }

    #[test]
    fn test_reconcile_installed_without_catalog_version_is_up_to_date() {
        let installed = InstalledState {
            installed: true,
            core: None,
            modules: vec![installed_module("braids", "0.1.0")],
        };
        let catalog = vec![catalog_module("braids", None)];

        let result = reconcile(&installed, &release("1.0.0"), &catalog);

        assert!(result.core_upgrade.is_none());
        assert!(result.upgradable_modules.is_empty());
        assert_eq!(result.up_to_date_modules.len(), 1);
    }

    #[test]
    fn test_reconcile_every_catalog_entry_in_exactly_one_bucket() {
        let installed = InstalledState {
            installed: true,
            core: Some("0.9".to_string()),
            modules: vec![
                installed_module("a", "1.0"),
                installed_module("b", "2.0"),
                installed_module("c", "0.1"),
            ],
        };
        let catalog = vec![
            catalog_module("a", Some("1.1")),
            catalog_module("b", Some("2.0")),
            catalog_module("c", None),
            catalog_module("d", Some("1.0")),
        ];

        let result = reconcile(&installed, &release("0.9"), &catalog);

        for module in &catalog {
            let hits = result
                .upgradable_modules
                .iter()
                .filter(|m| m.module.id == module.id)
                .count()
                + result
                    .up_to_date_modules
                    .iter()
                    .filter(|m| m.module.id == module.id)
                    .count()
                + result.new_modules.iter().filter(|m| m.id == module.id).count();
            assert_eq!(hits, 1, "module {} should be in exactly one bucket", module.id);
        }
        assert!(result.core_upgrade.is_none());
    }

    #[test]
    fn test_reconcile_core_not_flagged_without_installed_version() {
        let installed = InstalledState::default();
        let result = reconcile(&installed, &release("9.9.9"), &[]);
        assert!(result.core_upgrade.is_none());
    }
}
