use std::path::PathBuf;

use crate::{
    fs::mount::{target_under, INITRAMFS_BIND_PATHS},
    service::INTERFERING_SERVICES,
    types::DEFAULT_KEYFILE_PATH,
};

pub const INITRAMFS_ROOT_DEFAULT: &str = "/run/initramfs";
/// Handover program, relative to the initramfs root.
pub const HANDOVER_PROGRAM_DEFAULT: &str = "/suspend";
pub const SYSTEM_SLEEP_DIR_DEFAULT: &str = "/usr/lib/systemd/system-sleep";
pub const SYSTEMCTL_DEFAULT: &str = "/usr/bin/systemctl";
pub const KERNEL_CMDLINE_DEFAULT: &str = "/proc/cmdline";
pub const CRYPTTAB_DEFAULT: &str = "/etc/crypttab";

/// Where boot-time crypt configuration is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub cmdline_path: PathBuf,
    pub crypttab_path: PathBuf,
    pub default_keyfile: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cmdline_path: KERNEL_CMDLINE_DEFAULT.into(),
            crypttab_path: CRYPTTAB_DEFAULT.into(),
            default_keyfile: DEFAULT_KEYFILE_PATH.into(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_paths(cmdline_path: impl Into<PathBuf>, crypttab_path: impl Into<PathBuf>) -> Self {
        Self {
            cmdline_path: cmdline_path.into(),
            crypttab_path: crypttab_path.into(),
            ..Default::default()
        }
    }
}

/// Everything one suspend cycle needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendConfig {
    pub initramfs_root: PathBuf,
    pub handover_program: PathBuf,
    pub hook_dir: PathBuf,
    pub bind_paths: Vec<PathBuf>,
    pub services: Vec<String>,
    pub systemctl: PathBuf,
    pub discovery: DiscoveryConfig,

    /// Leave the machine running instead of powering it off when the cycle
    /// fails. Development only: it gives up the fail-closed guarantee.
    pub debug: bool,
}

impl Default for SuspendConfig {
    fn default() -> Self {
        Self {
            initramfs_root: INITRAMFS_ROOT_DEFAULT.into(),
            handover_program: HANDOVER_PROGRAM_DEFAULT.into(),
            hook_dir: SYSTEM_SLEEP_DIR_DEFAULT.into(),
            bind_paths: INITRAMFS_BIND_PATHS.iter().map(PathBuf::from).collect(),
            services: INTERFERING_SERVICES.iter().map(|s| s.to_string()).collect(),
            systemctl: SYSTEMCTL_DEFAULT.into(),
            discovery: DiscoveryConfig::default(),
            debug: false,
        }
    }
}

impl SuspendConfig {
    /// The handover program as seen from outside the initramfs root.
    pub fn handover_path(&self) -> PathBuf {
        target_under(&self.initramfs_root, &self.handover_program)
    }
}
