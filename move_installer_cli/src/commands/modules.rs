//! Modules command - Browse, install, upgrade and remove modules

use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use move_installer_core::{
    reconcile, ComponentType, Deployer, ModuleDescriptor, OperationQueue, ReleaseChannel,
};
use std::collections::BTreeMap;
use std::path::Path;

use super::{banner, error, info, spinner, success, warn, DeviceContext};

/// Heading for a category in listings
fn category_title(component_type: &ComponentType) -> &'static str {
    match component_type {
        ComponentType::SoundGenerator => "Sound Generators",
        ComponentType::AudioFx => "Audio Effects",
        ComponentType::MidiFx => "MIDI Effects",
        ComponentType::Utility => "Utilities",
        ComponentType::Overtake => "Overtake",
        ComponentType::Other(_) => "Other",
    }
}

/// Catalog modules matching `ids`, failing on the first unknown id
pub fn select_modules<'a>(
    catalog: &'a [ModuleDescriptor],
    ids: &[String],
) -> Result<Vec<&'a ModuleDescriptor>> {
    ids.iter()
        .map(|id| {
            catalog
                .iter()
                .find(|m| m.id == *id)
                .ok_or_else(|| anyhow!("Unknown module '{}'. See `move-installer modules list`.", id))
        })
        .collect()
}

async fn fetch_catalog(channel: &ReleaseChannel) -> Result<Vec<ModuleDescriptor>> {
    let bar = spinner("Fetching module catalog...");
    let catalog = channel.fetch_module_catalog().await;
    bar.finish_and_clear();
    Ok(catalog?)
}

pub async fn list(mut ctx: DeviceContext) -> Result<()> {
    banner("MOVE EVERYTHING MODULES");

    let catalog = fetch_catalog(&ctx.channel).await?;

    let installed = match ctx.connected_deployer().await {
        Ok(deployer) => Some(deployer.check_installed_versions(None).await?),
        Err(e) => {
            warn(&format!("Not showing installed versions: {}", e));
            None
        }
    };

    let installed_versions: BTreeMap<&str, &str> = installed
        .iter()
        .flat_map(|state| state.modules.iter())
        .map(|m| (m.id.as_str(), m.version.as_str()))
        .collect();

    let mut by_category: BTreeMap<&'static str, Vec<&ModuleDescriptor>> = BTreeMap::new();
    for module in &catalog {
        by_category
            .entry(category_title(&module.component_type))
            .or_default()
            .push(module);
    }

    for (title, mut modules) in by_category {
        modules.sort_by_key(|m| m.name.to_lowercase());
        println!("{}", title.bold());
        for module in modules {
            let available = module.version.as_deref().unwrap_or("?");
            let state = match installed_versions.get(module.id.as_str()) {
                Some(current) if move_installer_core::is_newer(available, current) => {
                    format!("v{} → v{}", current, available).yellow().to_string()
                }
                Some(current) => format!("v{} installed", current).green().to_string(),
                None => format!("v{}", available).dimmed().to_string(),
            };
            println!(
                "  {} {} {} {}",
                "•".cyan(),
                module.name.cyan(),
                format!("[{}]", module.id).dimmed(),
                state
            );
        }
        println!();
    }

    info(&format!(
        "Install with: {}",
        "move-installer modules install <id>...".cyan()
    ));
    println!();
    Ok(())
}

/// Download and install each module through one queue, reporting per module
async fn install_all(
    deployer: &Deployer,
    channel: &ReleaseChannel,
    modules: &[&ModuleDescriptor],
) -> Result<usize> {
    let queue = OperationQueue::new();
    let mut handles = Vec::new();

    for module in modules {
        let deployer = deployer.clone();
        let channel = channel.clone();
        let module = (*module).clone();
        let name = module.name.clone();
        let handle = queue.submit(async move {
            let tarball = channel
                .download(&module.download_url, Path::new(&module.asset_name))
                .await?;
            deployer
                .install_module(&module.id, &tarball, &module.component_type)
                .await?;
            if let Err(e) = tokio::fs::remove_file(&tarball).await {
                tracing::debug!("Could not remove {}: {}", tarball.display(), e);
            }
            Ok(module)
        });
        handles.push((name, handle));
    }

    let total = handles.len();
    let mut failed = 0;
    for (index, (name, handle)) in handles.into_iter().enumerate() {
        let bar = spinner(&format!("Installing {} ({} of {})...", name, index + 1, total));
        let result = handle.await;
        bar.finish_and_clear();
        match result {
            Ok(module) => success(&format!(
                "{} {}",
                module.name,
                module.version.as_deref().unwrap_or("").dimmed()
            )),
            Err(e) => {
                failed += 1;
                error(&format!("{}: {}", name, e));
            }
        }
    }
    Ok(failed)
}

pub async fn install(mut ctx: DeviceContext, ids: Vec<String>) -> Result<()> {
    banner("INSTALL MODULES");

    let catalog = fetch_catalog(&ctx.channel).await?;
    let selected = select_modules(&catalog, &ids)?;
    let deployer = ctx.connected_deployer().await?;

    let failed = install_all(&deployer, &ctx.channel, &selected).await?;
    println!();
    if failed > 0 {
        bail!("{} of {} module(s) failed to install", failed, selected.len());
    }
    Ok(())
}

pub async fn upgrade(mut ctx: DeviceContext, yes: bool) -> Result<()> {
    banner("UPGRADE MODULES");

    let catalog = fetch_catalog(&ctx.channel).await?;
    let deployer = ctx.connected_deployer().await?;

    let installed = deployer.check_installed_versions(None).await?;
    if !installed.installed {
        bail!("Move Everything is not installed. Run `move-installer install` first.");
    }
    let latest = ctx.channel.fetch_latest_release().await;
    let comparison = reconcile(&installed, &latest, &catalog);

    if let Some(core) = &comparison.core_upgrade {
        info(&format!(
            "Core {} → {} is available, run {}",
            core.current,
            core.available.green(),
            "move-installer install".cyan()
        ));
    }

    if comparison.upgradable_modules.is_empty() {
        success("All installed modules are up to date.");
        return Ok(());
    }

    for status in &comparison.upgradable_modules {
        println!(
            "  {} {} {} → {}",
            "↑".yellow(),
            status.module.name.cyan(),
            status.current_version.dimmed(),
            status.module.version.as_deref().unwrap_or("?").green()
        );
    }
    println!();

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Upgrade {} module(s)?",
                comparison.upgradable_modules.len()
            ))
            .default(true)
            .interact()?;
        if !confirmed {
            info("Operation cancelled.");
            return Ok(());
        }
    }

    let modules: Vec<&ModuleDescriptor> = comparison
        .upgradable_modules
        .iter()
        .map(|status| &status.module)
        .collect();
    let failed = install_all(&deployer, &ctx.channel, &modules).await?;
    println!();
    if failed > 0 {
        bail!("{} of {} upgrade(s) failed", failed, modules.len());
    }
    Ok(())
}

pub async fn remove(mut ctx: DeviceContext, id: String, yes: bool) -> Result<()> {
    banner("REMOVE MODULE");

    let deployer = ctx.connected_deployer().await?;
    let installed = deployer.check_installed_versions(None).await?;
    let module = installed
        .modules
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| anyhow!("Module '{}' is not installed", id))?;

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Remove {} v{}?", module.name, module.version))
            .default(false)
            .interact()?;
        if !confirmed {
            info("Operation cancelled.");
            return Ok(());
        }
    }

    let queue = OperationQueue::new();
    let removal = {
        let deployer = deployer.clone();
        let id = module.id.clone();
        let component_type = module.component_type.clone();
        queue.submit(async move { deployer.remove_module(&id, &component_type).await })
    };
    removal.await?;

    success(&format!("Removed {}", module.name));
    Ok(())
}
