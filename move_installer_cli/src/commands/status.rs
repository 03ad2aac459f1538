//! Status command - What is installed and what can be upgraded

use anyhow::Result;
use colored::Colorize;
use move_installer_core::{reconcile, InstalledState, VersionComparison};

use super::{banner, info, spinner, success, warn, DeviceContext};

pub async fn run(mut ctx: DeviceContext, offline: bool) -> Result<()> {
    banner("MOVE EVERYTHING STATUS");

    let deployer = ctx.connected_deployer().await?;
    info(&format!("Connected to {}", deployer.executor().host().cyan()));

    let bar = spinner("Checking installation...");
    let progress = |message: &str| bar.set_message(message.to_string());
    let installed = deployer.check_installed_versions(Some(&progress)).await;
    bar.finish_and_clear();
    let installed = installed?;

    if !installed.installed {
        warn("Move Everything is not installed on this device.");
        println!();
        println!("  {} Install it with: {}", "→".cyan(), "move-installer install".cyan());
        println!();
        return Ok(());
    }

    print_installed(&installed);

    if offline {
        return Ok(());
    }

    let bar = spinner("Checking for updates...");
    let latest = ctx.channel.fetch_latest_release().await;
    let catalog = ctx.channel.fetch_module_catalog().await;
    bar.finish_and_clear();

    let comparison = reconcile(&installed, &latest, &catalog?);
    print_comparison(&comparison);
    Ok(())
}

fn print_installed(installed: &InstalledState) {
    println!(
        "{} {}",
        "Core:".bold(),
        installed
            .core
            .as_deref()
            .map(|v| v.green().to_string())
            .unwrap_or_else(|| "unknown version".dimmed().to_string())
    );
    println!();

    if installed.modules.is_empty() {
        println!("{}", "No modules installed.".dimmed());
        println!();
        return;
    }

    println!("{}", "Installed modules:".bold());
    let mut modules: Vec<_> = installed.modules.iter().collect();
    modules.sort_by(|a, b| {
        a.component_type
            .as_str()
            .cmp(b.component_type.as_str())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    for module in modules {
        println!(
            "  {} {} {} {}",
            "•".green(),
            module.name.cyan(),
            format!("v{}", module.version).dimmed(),
            format!("({})", module.component_type).dimmed()
        );
    }
    println!();
}

fn print_comparison(comparison: &VersionComparison) {
    let mut anything = false;

    if let Some(upgrade) = &comparison.core_upgrade {
        anything = true;
        println!(
            "{} Core {} → {}",
            "↑".yellow().bold(),
            upgrade.current.dimmed(),
            upgrade.available.green()
        );
    }

    for status in &comparison.upgradable_modules {
        anything = true;
        println!(
            "{} {} {} → {}",
            "↑".yellow().bold(),
            status.module.name.cyan(),
            status.current_version.dimmed(),
            status
                .module
                .version
                .as_deref()
                .unwrap_or("?")
                .green()
        );
    }

    if !anything {
        success("Everything is up to date.");
    } else {
        println!();
        println!(
            "  {} Upgrade with: {}",
            "→".cyan(),
            "move-installer modules upgrade".cyan()
        );
    }

    if !comparison.new_modules.is_empty() {
        println!();
        info(&format!(
            "{} more module(s) available, see {}",
            comparison.new_modules.len(),
            "move-installer modules list".cyan()
        ));
    }

    if !comparison.orphaned_modules.is_empty() {
        println!();
        println!("{}", "Not in the catalog:".dimmed());
        for module in &comparison.orphaned_modules {
            println!("  {} {} v{}", "•".dimmed(), module.name, module.version);
        }
    }
    println!();
}
