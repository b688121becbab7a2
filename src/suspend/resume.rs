use serde::Serialize;

use crate::{discovery::SecondaryDevice, platform::Platform};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ResumeOutcome {
    Resumed,
    NoKey,
    KeyUnreadable,
    Failed,
}

/// Unlocks every secondary device whose key can be read. Nothing here is
/// fatal: a device that stays locked can still be unlocked by hand.
pub async fn resume_secondaries(
    platform: &dyn Platform,
    secondaries: &[SecondaryDevice],
) -> Vec<(String, ResumeOutcome)> {
    let mut report = Vec::with_capacity(secondaries.len());

    for secondary in secondaries {
        let name = &secondary.device.name;
        let outcome = match &secondary.key {
            None => {
                tracing::warn!("No key known for {name}, leaving it suspended");
                ResumeOutcome::NoKey
            }
            Some(key) => {
                if !key.is_readable().await {
                    tracing::warn!("Key {key} of {name} is not readable, leaving it suspended");
                    ResumeOutcome::KeyUnreadable
                } else {
                    match platform.resume_device(&secondary.device, key).await {
                        Ok(()) => {
                            tracing::info!("Resumed {name}");
                            ResumeOutcome::Resumed
                        }
                        Err(e) => {
                            tracing::error!("{e:#}");
                            ResumeOutcome::Failed
                        }
                    }
                }
            }
        };
        report.push((name.clone(), outcome));
    }

    let resumed = report
        .iter()
        .filter(|(_, outcome)| *outcome == ResumeOutcome::Resumed)
        .count();
    tracing::info!(
        resumed,
        total = report.len(),
        "Secondary devices resume finished"
    );

    report
}

#[cfg(test)]
pub mod tests {

    #[allow(unused_imports)]
    use super::*;
    use std::path::{Path, PathBuf};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use crate::types::{CryptDevice, Keyfile};

    /// Fails to resume any device named `broken`.
    struct PickyPlatform;

    #[async_trait]
    impl Platform for PickyPlatform {
        async fn sync(&self) -> Result<()> {
            Ok(())
        }

        async fn barrier_filesystems(&self) -> Result<Vec<PathBuf>> {
            Ok(vec![])
        }

        async fn remount(&self, _: &Path, _: &str) -> Result<()> {
            Ok(())
        }

        async fn hand_over(&self, _: &Path, _: &Path, _: &[String]) -> Result<()> {
            Ok(())
        }

        async fn resume_device(&self, device: &CryptDevice, _: &Keyfile) -> Result<()> {
            if device.name == "broken" {
                bail!("wrong key")
            }
            Ok(())
        }

        async fn power_off(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_resume_outcomes() -> Result<()> {
        let key = tempfile::NamedTempFile::new()?;
        let secondary = |name: &str, key: Option<Keyfile>| SecondaryDevice {
            device: CryptDevice::new(name, "8:1"),
            key,
        };

        let report = resume_secondaries(
            &PickyPlatform,
            &[
                secondary("home", Some(Keyfile::plain(key.path()))),
                secondary("broken", Some(Keyfile::plain(key.path()))),
                secondary("gone", Some(Keyfile::plain("/nonexistent/key"))),
                secondary("manual", None),
            ],
        )
        .await;

        assert_eq!(
            report,
            vec![
                ("home".to_owned(), ResumeOutcome::Resumed),
                ("broken".to_owned(), ResumeOutcome::Failed),
                ("gone".to_owned(), ResumeOutcome::KeyUnreadable),
                ("manual".to_owned(), ResumeOutcome::NoKey),
            ]
        );

        Ok(())
    }
}
