//! Assets command - Manage module files (samples, soundfonts, ...) on the device

use anyhow::{bail, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use move_installer_core::{deploy::asset_dir, OperationQueue, MODULES_ROOT};
use std::path::PathBuf;

use super::{banner, error, info, spinner, success, warn, DeviceContext};

/// Accept paths relative to the modules directory as well as absolute ones
pub fn remote_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}{}", MODULES_ROOT, path.trim_start_matches("./"))
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub async fn list(mut ctx: DeviceContext, path: String) -> Result<()> {
    let path = remote_path(&path);
    let deployer = ctx.connected_deployer().await?;
    let entries = deployer.list_remote_directory(&path).await?;

    println!("{}", path.bold());
    if entries.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    for entry in entries {
        if entry.is_directory {
            println!("  {} {}/", "▸".cyan(), entry.name.cyan().bold());
        } else {
            println!(
                "  {} {} {}",
                " ".normal(),
                entry.name,
                human_size(entry.size).dimmed()
            );
        }
    }
    Ok(())
}

pub async fn mkdir(mut ctx: DeviceContext, path: String) -> Result<()> {
    let path = remote_path(&path);
    let deployer = ctx.connected_deployer().await?;
    deployer.create_remote_directory(&path).await?;
    success(&format!("Created {}", path));
    Ok(())
}

pub async fn remove(mut ctx: DeviceContext, path: String, yes: bool) -> Result<()> {
    let path = remote_path(&path);
    let deployer = ctx.connected_deployer().await?;

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete {} from the device?", path))
            .default(false)
            .interact()?;
        if !confirmed {
            info("Operation cancelled.");
            return Ok(());
        }
    }

    let queue = OperationQueue::new();
    let deletion = {
        let deployer = deployer.clone();
        let path = path.clone();
        queue.submit(async move { deployer.delete_remote_path(&path).await })
    };
    deletion.await?;
    success(&format!("Deleted {}", path));
    Ok(())
}

/// Upload into `remote` or, with `module`, into that installed module's asset directory
pub async fn upload(
    mut ctx: DeviceContext,
    files: Vec<PathBuf>,
    remote: Option<String>,
    module: Option<String>,
) -> Result<()> {
    banner("UPLOAD ASSETS");

    for file in &files {
        if !file.exists() {
            bail!("No such file or directory: {}", file.display());
        }
    }

    let deployer = ctx.connected_deployer().await?;
    let target = match (remote, module) {
        (Some(remote), _) => remote_path(&remote),
        (None, Some(id)) => {
            let installed = deployer.check_installed_versions(None).await?;
            let module = installed
                .modules
                .iter()
                .find(|m| m.id == id)
                .ok_or_else(|| anyhow::anyhow!("Module '{}' is not installed", id))?;
            let assets = module
                .assets
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("{} does not take extra files", module.name))?;
            if !assets.extensions.is_empty() {
                info(&format!("{} accepts: {}", assets.label, assets.extensions.join(", ")));
            }
            asset_dir(&module.id, &module.component_type, assets)?
        }
        (None, None) => bail!("Give a remote directory or --module"),
    };

    info(&format!("Uploading to {}", target.cyan()));
    let bar = spinner(&format!("Uploading {} item(s)...", files.len()));
    let results = deployer.upload_assets(&files, &target).await;
    bar.finish_and_clear();

    let results = results?;
    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    for result in &results {
        if result.success {
            success(&result.file);
        } else {
            error(&format!(
                "{}: {}",
                result.file,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    println!();
    if failed.is_empty() {
        success(&format!("Uploaded {} item(s)", results.len()));
    } else {
        warn(&format!("{} of {} item(s) failed", failed.len(), results.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path() {
        assert_eq!(
            remote_path("sound_generators/sf2/soundfonts"),
            "/data/UserData/move-anything/modules/sound_generators/sf2/soundfonts"
        );
        assert_eq!(remote_path("/tmp/x"), "/tmp/x");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
