//! Connect command - Get this computer's SSH key trusted by the device

use anyhow::{bail, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input};
use move_installer_core::{ConnectOutcome, DeviceApi, PollOutcome, TrustBootstrap};
use std::sync::Arc;

use super::{banner, info, spinner, success, warn, DeviceContext};

pub async fn run(mut ctx: DeviceContext, code: Option<String>) -> Result<()> {
    banner("MOVE EVERYTHING CONNECT");

    let resolved = {
        let spinner = spinner(&format!("Looking for {}...", ctx.candidate()));
        let resolved = ctx.resolve().await?;
        spinner.finish_and_clear();
        resolved
    };
    match &resolved {
        Some(address) => info(&format!("Device address: {}", address.cyan())),
        None => warn(&format!(
            "Could not resolve {}, trying the hostname directly",
            ctx.candidate()
        )),
    }

    let poll_interval = ctx.config.poll_interval();
    let candidate = ctx.session.host().to_string();
    let mut bootstrap = TrustBootstrap::new(
        ctx.session.clone(),
        DeviceApi::new()?,
        ctx.keys.clone(),
        Arc::clone(&ctx.transport),
    );

    let outcome = {
        let spinner = spinner("Checking device...");
        let outcome = bootstrap.connect(&candidate).await;
        spinner.finish_and_clear();
        outcome?
    };

    match outcome {
        ConnectOutcome::Invalid => {
            bail!(
                "No Move answered at {}. Check that it is powered on and on the same network.",
                candidate
            );
        }
        ConnectOutcome::AlreadyTrusted => {
            success("SSH access already works, nothing to do.");
            return Ok(());
        }
        ConnectOutcome::NeedsKeySubmission => {
            info("Using saved authorization");
        }
        ConnectOutcome::NeedsChallenge => {
            info("An authorization code is now shown on your Move's display.");
            let code = match code {
                Some(code) => code,
                None => Input::<String>::with_theme(&ColorfulTheme::default())
                    .with_prompt("Enter the code")
                    .interact_text()?,
            };
            bootstrap.submit_challenge_response(&code).await?;
            success("Authorized");
        }
    }

    let public_key = bootstrap.ensure_key()?;
    info(&format!("Using key {}", public_key.display().to_string().dimmed()));

    if let Err(e) = bootstrap.submit_public_key().await {
        // a stale saved cookie is the usual cause
        bootstrap.session_mut().forget_cookie()?;
        return Err(e.into());
    }

    println!();
    println!(
        "  {} Confirm the new key on your Move by selecting {}",
        "→".yellow().bold(),
        "Yes".green().bold()
    );
    println!();

    let handle = bootstrap.poll_for_trust(poll_interval);
    let spinner = spinner("Waiting for approval on the device (Ctrl+C to cancel)...");

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = tokio::signal::ctrl_c() => PollOutcome::Cancelled,
    };
    spinner.finish_and_clear();

    match outcome {
        PollOutcome::Trusted => {
            success("Device trusts this computer. SSH access is ready.");
            println!();
            println!(
                "  {} Next: {}",
                "→".cyan(),
                "move-installer install".cyan()
            );
            println!();
            Ok(())
        }
        PollOutcome::Cancelled => {
            warn("Stopped waiting for approval.");
            Ok(())
        }
    }
}
