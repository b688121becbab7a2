pub mod cmdline;
pub mod crypttab;
pub mod mapper;

use std::path::Path;

use anyhow::{Context as _, Result};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::DiscoveryConfig,
    types::{CryptDevice, Keyfile},
};
use cmdline::parse_kernel_cmdline;
use crypttab::{parse_crypttab, CrypttabEntry};
use mapper::CryptTargetSource;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no root cryptdevice")]
    NoRootCryptDevice,

    #[error("malformed boot parameter `{token}`: {reason}")]
    MalformedParameter { token: String, reason: &'static str },
}

/// A non-root crypt mapping. `key` is `None` when no key location is known,
/// in which case the device is left for manual unlock after resume.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SecondaryDevice {
    pub device: CryptDevice,
    pub key: Option<Keyfile>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub root: CryptDevice,
    pub root_key: Keyfile,
    pub secondaries: Vec<SecondaryDevice>,
}

impl Discovery {
    /// Root first, then every secondary, as passed to the handover program.
    pub fn device_names(&self) -> Vec<String> {
        std::iter::once(&self.root)
            .chain(self.secondaries.iter().map(|s| &s.device))
            .map(|device| device.name.clone())
            .collect()
    }
}

/// A crypttab that cannot be read is reported and treated as empty.
async fn load_crypttab(path: &Path) -> Vec<CrypttabEntry> {
    match tokio::fs::read(path).await {
        Ok(contents) => parse_crypttab(&String::from_utf8_lossy(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No crypttab found at {path:?}, secondary devices have no known key");
            vec![]
        }
        Err(e) => {
            tracing::warn!("Failed to read crypttab {path:?}, secondary devices have no known key: {e}");
            vec![]
        }
    }
}

pub fn resolve_secondaries(
    root: &CryptDevice,
    active: Vec<CryptDevice>,
    crypttab: &[CrypttabEntry],
    default_keyfile: &Path,
) -> Vec<SecondaryDevice> {
    active
        .into_iter()
        .filter(|device| device.name != root.name)
        .map(|device| {
            let key = match crypttab.iter().find(|entry| entry.name == device.name) {
                Some(entry) => match entry.keyfile(default_keyfile) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        tracing::warn!("Cannot resolve key of {}: {e:#}", device.name);
                        None
                    }
                },
                None => {
                    tracing::warn!(
                        "Device {} has no crypttab entry, it will not be unlocked automatically",
                        device.name
                    );
                    None
                }
            };
            SecondaryDevice { device, key }
        })
        .collect()
}

/// Finds the root device from the kernel command line and every other active
/// crypt mapping with its key location.
pub async fn discover(
    config: &DiscoveryConfig,
    targets: &dyn CryptTargetSource,
) -> Result<Discovery> {
    let cmdline = tokio::fs::read_to_string(&config.cmdline_path)
        .await
        .with_context(|| format!("Failed to read kernel cmdline {:?}", config.cmdline_path))?;
    let root = parse_kernel_cmdline(&cmdline, &config.default_keyfile)
        .with_context(|| format!("Failed to parse kernel cmdline {:?}", config.cmdline_path))?;

    let active = targets
        .active_crypt_devices()
        .context("Failed to enumerate active crypt devices")?;
    let crypttab = load_crypttab(&config.crypttab_path).await;

    let secondaries = resolve_secondaries(&root.device, active, &crypttab, &config.default_keyfile);

    tracing::info!(
        root = %root.device.name,
        root_key = %root.key,
        secondaries = secondaries.len(),
        "Crypt devices discovered"
    );

    Ok(Discovery {
        root: root.device,
        root_key: root.key,
        secondaries,
    })
}
