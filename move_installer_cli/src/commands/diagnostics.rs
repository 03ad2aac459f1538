//! Diagnostics command - Print a report to attach to bug reports

use anyhow::{Context, Result};
use move_installer_core::DiagnosticsReport;
use std::path::PathBuf;

use super::{info, success, DeviceContext};

pub async fn run(mut ctx: DeviceContext, errors: Vec<String>, output: Option<PathBuf>) -> Result<()> {
    // best effort, an unreachable device is exactly what a report is for
    if let Err(e) = ctx.resolve().await {
        tracing::debug!("Address resolution failed: {}", e);
    }

    let report = DiagnosticsReport::collect(&ctx.session, &ctx.keys, &errors);
    let json = report.to_json()?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            success(&format!("Diagnostics written to {}", path.display()));
            info("Attach this file when reporting an issue on GitHub.");
        }
        None => println!("{}", json),
    }
    Ok(())
}
