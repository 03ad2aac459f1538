//! Keygen command - Create the installer's SSH key

use anyhow::Result;
use colored::Colorize;
use move_installer_core::keys::{read_public_key, KeyManager, INSTALLER_KEY_NAME};

use super::{banner, info, success, warn};

pub async fn run(force: bool) -> Result<()> {
    banner("SSH KEY GENERATOR");

    let key_manager = KeyManager::new()?;

    if let Some(existing) = key_manager.find_existing_key() {
        if !force {
            info(&format!(
                "Key already exists: {}",
                existing.display().to_string().cyan()
            ));
            println!("{}", read_public_key(&existing)?.trim().dimmed());
            println!();
            info("Use --force to replace it (the device will need to trust the new key).");
            return Ok(());
        }
        warn("Replacing the existing installer key");
    }

    info("Generating Ed25519 key pair...");
    let public_path = key_manager.generate_key()?;

    println!();
    success("Key pair generated successfully!");
    println!();

    println!("{}", "Files created:".bold());
    println!(
        "  {} Private key: {}",
        "•".green(),
        key_manager
            .ssh_dir()
            .join(INSTALLER_KEY_NAME)
            .display()
            .to_string()
            .cyan()
    );
    println!(
        "  {} Public key:  {}",
        "•".green(),
        public_path.display().to_string().cyan()
    );
    println!();

    println!("{}", "Public key:".bold());
    println!("{}", read_public_key(&public_path)?.trim().dimmed());
    println!();

    println!(
        "  {} Get it trusted by the device: {}",
        "→".cyan(),
        "move-installer connect".dimmed()
    );
    println!();

    Ok(())
}
