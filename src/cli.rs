use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::build::CLAP_LONG_VERSION;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(long_version = CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: GlobalSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum GlobalSubcommand {
    /// Suspend to RAM with the root device locked, and unlock it again on resume.
    #[command(name = "suspend")]
    Suspend(SuspendOptions),

    /// Show the crypt devices that would be suspended and their keys.
    #[command(name = "show")]
    Show(ShowOptions),

    /// Check the handover program and the system-sleep hooks without running them.
    #[command(name = "verify-hooks")]
    VerifyHooks(VerifyHooksOptions),
}

#[derive(Parser, Debug)]
pub struct SuspendOptions {
    /// Keep the machine running when something goes wrong instead of powering
    /// it off, and log at debug level. Do not use this on a machine that may
    /// be left unattended.
    #[clap(long, default_value = "false")]
    pub debug: bool,
}

#[derive(Parser, Debug)]
pub struct ShowOptions {
    /// Output as JSON format instead of table
    #[clap(long)]
    pub json: bool,

    /// Read the kernel command line from this file instead of /proc/cmdline.
    #[clap(long)]
    pub cmdline: Option<PathBuf>,

    /// Read crypttab from this file instead of /etc/crypttab.
    #[clap(long)]
    pub crypttab: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct VerifyHooksOptions {
    /// Directory of system-sleep hooks. Default value is /usr/lib/systemd/system-sleep.
    #[clap(long)]
    pub hook_dir: Option<PathBuf>,

    /// Root of the initramfs holding the handover program. Default value is /run/initramfs.
    #[clap(long)]
    pub initramfs_root: Option<PathBuf>,
}
