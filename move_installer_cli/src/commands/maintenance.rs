//! Maintenance commands - Cleanup, permission repair, screen reader, uninstall

use anyhow::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use move_installer_core::OperationQueue;

use super::{banner, info, spinner, success, warn, DeviceContext};

pub async fn clean_tmp(mut ctx: DeviceContext) -> Result<()> {
    let deployer = ctx.connected_deployer().await?;

    let bar = spinner("Removing temporary files from the device...");
    let report = deployer.clean_device_tmp().await;
    bar.finish_and_clear();

    let report = report?;
    if report.freed_mb > 0.0 {
        success(&format!("Freed {:.1} MB on the root partition", report.freed_mb));
    } else {
        success("Cleanup done, no space needed freeing");
    }
    Ok(())
}

pub async fn fix_permissions(mut ctx: DeviceContext) -> Result<()> {
    let deployer = ctx.connected_deployer().await?;

    let queue = OperationQueue::new();
    let fix = {
        let deployer = deployer.clone();
        queue.submit(async move { deployer.fix_permissions().await })
    };
    let bar = spinner("Fixing file permissions...");
    let result = fix.await;
    bar.finish_and_clear();

    result?;
    success("Permissions restored");
    Ok(())
}

pub async fn screen_reader(mut ctx: DeviceContext, enable: Option<bool>) -> Result<()> {
    let deployer = ctx.connected_deployer().await?;

    match enable {
        None => {
            let enabled = deployer.screen_reader_status().await;
            info(&format!(
                "Screen reader is {}",
                if enabled { "on".green() } else { "off".dimmed() }
            ));
        }
        Some(enabled) => {
            deployer.set_screen_reader(enabled).await?;
            success(&format!(
                "Screen reader turned {}, Move Everything is restarting",
                if enabled { "on" } else { "off" }
            ));
        }
    }
    Ok(())
}

pub async fn uninstall(mut ctx: DeviceContext, yes: bool) -> Result<()> {
    banner("UNINSTALL MOVE EVERYTHING");

    let deployer = ctx.connected_deployer().await?;

    println!("This will:");
    println!("  {} remove Move Everything and all installed modules", "•".red());
    println!("  {} restore the stock Move firmware", "•".red());
    println!("  {} reboot the device", "•".red());
    println!();

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Are you sure you want to uninstall?")
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
        queue.submit(async move { deployer.uninstall().await })
    };
    let bar = spinner("Uninstalling...");
    let result = removal.await;
    bar.finish_and_clear();

    let report = result?;
    if !report.restored_original {
        warn("No firmware backup was found to restore; the stock binary was left as is.");
    }
    success("Move Everything removed. The device is rebooting.");
    Ok(())
}
