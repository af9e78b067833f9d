//! Interactive operator prompts. Input is read on a blocking thread so the
//! runtime is never stalled.

use crate::progress::TerminalReporter;
use anyhow::{Context, Result};
use stackbox_lib::stack::installer::core::manual::ManualAcquisition;
use stackbox_lib::stack::installer::{AcquireOutcome, StackInstaller};

async fn read_line(prompt: String) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        use std::io::Write;
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("failed to read from stdin")?;
        Ok(line.trim().to_lowercase())
    })
    .await?
}

pub async fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(format!("{question} [y/N] ")).await?;
    Ok(matches!(answer.as_str(), "y" | "yes"))
}

/// Walk the operator through a manual download. Returns `false` if they
/// abandon the component.
pub async fn manual_loop(
    installer: &mut StackInstaller,
    manual: &ManualAcquisition,
    reporter: &TerminalReporter,
) -> Result<bool> {
    reporter.suspend();
    println!("\n{}\n", manual.instructions());
    if let Err(e) = manual.open_download_page() {
        log::warn!("{:#}", e);
    }

    loop {
        let answer = read_line(
            "Press Enter once the file is downloaded, 'o' to reopen the page, 'a' to abandon: "
                .to_string(),
        )
        .await?;
        match answer.as_str() {
            "a" => return Ok(false),
            "o" => {
                if let Err(e) = manual.open_download_page() {
                    log::warn!("{:#}", e);
                }
            }
            _ => {
                let Some(file) = manual.find_download()? else {
                    println!("No matching file found yet.");
                    continue;
                };
                println!("Found {}", file.display());
                match installer.complete_manual(manual, &file, reporter).await {
                    Ok(AcquireOutcome::Installed { .. }) | Ok(AcquireOutcome::AlreadyInstalled) => {
                        return Ok(true)
                    }
                    Ok(AcquireOutcome::NeedsManualIntervention(_)) => {}
                    Err(e) => println!("That file could not be used: {e:#}"),
                }
            }
        }
    }
}
