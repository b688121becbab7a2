use std::{io::BufRead, path::PathBuf};

use anyhow::{Context as _, Result};
use mnt::{MntOps, MountIter};

pub const DISABLE_BARRIER_OPTIONS: &str = "remount,nobarrier";
pub const RESTORE_BARRIER_OPTIONS: &str = "remount,barrier";

const BARRIER_FS_TYPE: &str = "ext4";

/// Mounted ext4 filesystems that still have write barriers enabled.
pub fn filesystems_with_write_barriers() -> Result<Vec<PathBuf>> {
    let mounts = MountIter::new_from_proc().context("Failed to read /proc/mounts")?;
    select_barrier_filesystems(mounts)
}

pub fn select_barrier_filesystems<R: BufRead>(mounts: MountIter<R>) -> Result<Vec<PathBuf>> {
    let mut filesystems = vec![];
    for entry in mounts {
        let entry = entry.context("Failed to parse mount entry")?;
        if entry.vfstype != BARRIER_FS_TYPE {
            continue;
        }

        let barrier_disabled = entry.mntops.iter().any(|op| {
            matches!(op, MntOps::Extra(extra) if extra == "nobarrier" || extra == "barrier=0")
        });
        if !barrier_disabled {
            filesystems.push(entry.file);
        }
    }

    Ok(filesystems)
}
