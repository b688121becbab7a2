use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::{cli::SuspendOptions, config::SuspendConfig, suspend::SuspendOrchestrator};

pub struct SuspendCommand {
    pub suspend_options: SuspendOptions,
}

#[async_trait]
impl super::Command for SuspendCommand {
    async fn run(&self) -> Result<()> {
        // Nothing has been touched yet, so there is no reason to power off here.
        if !nix::unistd::geteuid().is_root() {
            bail!("Suspending requires root privileges")
        }

        let config = SuspendConfig {
            debug: self.suspend_options.debug,
            ..Default::default()
        };

        let report = SuspendOrchestrator::new(config).run_fail_closed().await?;

        let locked = report
            .resumed
            .iter()
            .filter(|(_, outcome)| *outcome != crate::suspend::resume::ResumeOutcome::Resumed)
            .map(|(name, outcome)| format!("{name} ({outcome})"))
            .collect::<Vec<_>>();
        if !locked.is_empty() {
            tracing::warn!("Devices still locked after resume: {}", locked.join(", "));
        }
        tracing::info!("Suspend cycle finished");

        Ok(())
    }
}
