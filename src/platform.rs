use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use nix::sys::reboot::RebootMode;
use tokio::process::Command;

use crate::{
    fs::{barrier, cmd::CheckCommandOutput as _},
    types::{CryptDevice, Keyfile},
};

const CRYPTSETUP_FALLBACK: &str = "/usr/sbin/cryptsetup";
const CHROOT_FALLBACK: &str = "/usr/sbin/chroot";
const MOUNT_FALLBACK: &str = "/usr/bin/mount";

/// Operations of a suspend cycle that act on the whole machine.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn sync(&self) -> Result<()>;

    async fn barrier_filesystems(&self) -> Result<Vec<PathBuf>>;

    async fn remount(&self, target: &Path, options: &str) -> Result<()>;

    /// Runs the handover program inside the initramfs root. Returns once the
    /// machine has resumed and the root device is unlocked again.
    async fn hand_over(&self, initramfs_root: &Path, program: &Path, devices: &[String]) -> Result<()>;

    async fn resume_device(&self, device: &CryptDevice, key: &Keyfile) -> Result<()>;

    async fn power_off(&self) -> Result<()>;
}

pub struct LinuxPlatform {
    cryptsetup: PathBuf,
    chroot: PathBuf,
    mount: PathBuf,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self {
            cryptsetup: which::which("cryptsetup").unwrap_or(CRYPTSETUP_FALLBACK.into()),
            chroot: which::which("chroot").unwrap_or(CHROOT_FALLBACK.into()),
            mount: which::which("mount").unwrap_or(MOUNT_FALLBACK.into()),
        }
    }
}

#[async_trait]
impl Platform for LinuxPlatform {
    async fn sync(&self) -> Result<()> {
        tokio::task::spawn_blocking(nix::unistd::sync)
            .await
            .context("Failed to sync filesystems")
    }

    async fn barrier_filesystems(&self) -> Result<Vec<PathBuf>> {
        barrier::filesystems_with_write_barriers()
    }

    async fn remount(&self, target: &Path, options: &str) -> Result<()> {
        Command::new(&self.mount)
            .arg("-o")
            .arg(options)
            .arg(target)
            .run()
            .await
            .with_context(|| format!("Failed to remount {target:?} with {options}"))?;
        Ok(())
    }

    async fn hand_over(&self, initramfs_root: &Path, program: &Path, devices: &[String]) -> Result<()> {
        Command::new(&self.chroot)
            .arg(initramfs_root)
            .arg(program)
            .args(devices)
            .run_attached()
            .await
            .with_context(|| format!("Handover to {program:?} in {initramfs_root:?} failed"))
    }

    async fn resume_device(&self, device: &CryptDevice, key: &Keyfile) -> Result<()> {
        let mut cmd = Command::new(&self.cryptsetup);
        cmd.arg("luksResume")
            .arg(&device.name)
            .arg("--key-file")
            .arg(&key.path);
        if key.is_embedded() {
            cmd.arg("--keyfile-offset")
                .arg(key.offset.to_string())
                .arg("--keyfile-size")
                .arg(key.size.to_string());
        }

        cmd.run()
            .await
            .with_context(|| format!("Failed to resume {}", device.name))?;
        Ok(())
    }

    async fn power_off(&self) -> Result<()> {
        nix::unistd::sync();
        nix::sys::reboot::reboot(RebootMode::RB_POWER_OFF)
            .map(|never| match never {})
            .context("Failed to power off")
    }
}
