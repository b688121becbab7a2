use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use tokio::process::Command;

use crate::{fs::cmd::CheckCommandOutput as _, verify::ScriptVerifier};

/// Argument appended after the phase, as systemd does for its sleep hooks.
const SLEEP_ACTION: &str = "suspend";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HookPhase {
    Pre,
    Post,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HookReport {
    pub executed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Runs the system-sleep hooks of one directory, one at a time.
pub struct HookRunner {
    dir: PathBuf,
    verifier: ScriptVerifier,
}

impl HookRunner {
    pub fn new(dir: impl Into<PathBuf>, verifier: ScriptVerifier) -> Self {
        Self {
            dir: dir.into(),
            verifier,
        }
    }

    /// Entries of the hook directory in lexical order. A missing directory
    /// has no hooks.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Hook directory {:?} does not exist", self.dir);
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read hook directory {:?}", self.dir))
            }
        };

        let mut hooks = vec![];
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .with_context(|| format!("Failed to read hook directory {:?}", self.dir))?
        {
            hooks.push(entry.path());
        }
        hooks.sort();

        Ok(hooks)
    }

    /// Hooks that fail verification are skipped. A verified hook exiting
    /// non-zero stops the phase.
    pub async fn run_phase(&self, phase: HookPhase) -> Result<HookReport> {
        let mut report = HookReport::default();

        for hook in self.list().await? {
            // The file may still be replaced between this check and its execution.
            if let Err(e) = self.verifier.verify(&hook) {
                tracing::warn!("Skipping {phase} hook: {e}");
                report.skipped.push(hook);
                continue;
            }

            tracing::debug!("Running {phase} hook {hook:?}");
            Command::new(&hook)
                .arg(phase.to_string())
                .arg(SLEEP_ACTION)
                .run()
                .await
                .with_context(|| format!("The {phase} hook {hook:?} failed"))?;
            report.executed.push(hook);
        }

        Ok(report)
    }
}

#[cfg(test)]
pub mod tests {

    #[allow(unused_imports)]
    use super::*;
    use std::os::unix::fs::PermissionsExt as _;

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))?;
        Ok(path)
    }

    fn runner(dir: &Path) -> HookRunner {
        HookRunner::new(dir, ScriptVerifier::trusting(nix::unistd::getuid().as_raw()))
    }

    #[tokio::test]
    async fn test_missing_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let report = runner(&dir.path().join("system-sleep"))
            .run_phase(HookPhase::Pre)
            .await?;

        assert_eq!(report, HookReport::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_hook_arguments_and_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let log = out.path().join("log");

        write_script(dir.path(), "20-second", &format!("echo second $@ >> {}", log.display()), 0o755)?;
        write_script(dir.path(), "10-first", &format!("echo first $@ >> {}", log.display()), 0o700)?;

        let report = runner(dir.path()).run_phase(HookPhase::Post).await?;

        assert_eq!(
            report.executed,
            vec![dir.path().join("10-first"), dir.path().join("20-second")]
        );
        assert_eq!(
            std::fs::read_to_string(&log)?,
            "first post suspend\nsecond post suspend\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_untrusted_hook_is_not_executed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let marker = out.path().join("marker");

        let hook = write_script(dir.path(), "50-writable", &format!("touch {}", marker.display()), 0o777)?;
        std::fs::create_dir(dir.path().join("60-directory"))?;

        let report = runner(dir.path()).run_phase(HookPhase::Pre).await?;

        assert!(report.executed.is_empty());
        assert_eq!(
            report.skipped,
            vec![hook, dir.path().join("60-directory")]
        );
        assert!(!marker.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_hook_stops_phase() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = tempfile::tempdir()?;
        let ok = out.path().join("ok");
        let after = out.path().join("after");

        write_script(dir.path(), "10-ok", &format!("touch {}", ok.display()), 0o755)?;
        write_script(dir.path(), "20-fail", "exit 1", 0o755)?;
        write_script(dir.path(), "30-after", &format!("touch {}", after.display()), 0o755)?;

        let err = runner(dir.path())
            .run_phase(HookPhase::Pre)
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("20-fail"));
        assert!(ok.exists());
        assert!(!after.exists());
        Ok(())
    }
}
