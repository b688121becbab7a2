use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::fs::cmd::CheckCommandOutput as _;

/// Services stopped for the duration of the suspend. journald may attempt to
/// write to the suspended device.
pub const INTERFERING_SERVICES: [&str; 3] = [
    "systemd-journald-dev-log.socket",
    "systemd-journald.socket",
    "systemd-journald.service",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceVerb {
    Stop,
    Start,
}

#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn control(&self, verb: ServiceVerb, services: &[String]) -> Result<()>;
}

pub struct Systemctl {
    program: PathBuf,
}

impl Systemctl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ServiceController for Systemctl {
    async fn control(&self, verb: ServiceVerb, services: &[String]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }

        Command::new(&self.program)
            .arg(verb.to_string())
            .args(services)
            .run()
            .await
            .with_context(|| format!("Failed to {verb} services: {}", services.join(" ")))?;

        Ok(())
    }
}
