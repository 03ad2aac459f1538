//! Install command - Download and install the Move Everything core

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use move_installer_core::{is_newer, OperationQueue};
use std::path::{Path, PathBuf};

use super::{banner, info, spinner, success, warn, DeviceContext};

pub async fn run(
    mut ctx: DeviceContext,
    tarball: Option<PathBuf>,
    force: bool,
    yes: bool,
    flags: Vec<String>,
) -> Result<()> {
    banner("MOVE EVERYTHING INSTALL");

    let deployer = ctx.connected_deployer().await?;
    info(&format!("Connected to {}", deployer.executor().host().cyan()));

    let status = deployer.check_core_installation().await?;
    let release = ctx.channel.fetch_latest_release().await;

    if let (Some(current), false) = (status.core.as_deref(), force) {
        if tarball.is_none() && release.version != "latest" && !is_newer(&release.version, current) {
            success(&format!("Core {} is already the latest version.", current.green()));
            info("Use --force to reinstall.");
            return Ok(());
        }
        info(&format!(
            "Installed: {}, available: {}",
            current.dimmed(),
            release.version.green()
        ));
    }

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Install Move Everything {} on {}?",
                release.version,
                deployer.executor().host()
            ))
            .default(true)
            .interact()?;
        if !confirmed {
            info("Operation cancelled.");
            return Ok(());
        }
    }

    let tarball = match tarball {
        Some(path) => {
            info(&format!("Using local tarball {}", path.display()));
            path
        }
        None => {
            let bar = spinner(&format!("Downloading {}...", release.asset_name));
            let downloaded = ctx
                .channel
                .download(&release.download_url, Path::new(&release.asset_name))
                .await;
            bar.finish_and_clear();
            let path = downloaded.context("Failed to download the core release")?;
            success(&format!("Downloaded {}", release.asset_name));
            path
        }
    };

    let queue = OperationQueue::new();
    let bar = spinner("Installing, this can take a few minutes...");
    let install = {
        let deployer = deployer.clone();
        let tarball = tarball.clone();
        queue.submit(async move { deployer.install_core(&tarball, &flags).await })
    };
    let result = install.await;
    bar.finish_and_clear();

    let report = result?;
    for line in report.output.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!("{}", line);
    }

    match deployer.check_core_installation().await {
        Ok(status) if status.installed => success(&format!(
            "Move Everything {} installed.",
            status.core.as_deref().unwrap_or(&release.version).green()
        )),
        Ok(_) => warn("Install finished but the install directory was not found."),
        Err(e) => warn(&format!("Installed, but could not verify: {}", e)),
    }

    println!();
    println!(
        "  {} Add modules with: {}",
        "→".cyan(),
        "move-installer modules list".cyan()
    );
    println!();
    Ok(())
}
