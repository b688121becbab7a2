use std::path::PathBuf;

use crate::fs::mount::BindMounts;

/// What one cycle changed on the machine so far, and therefore what an
/// abort has to put back.
#[derive(Debug, Default)]
pub struct SuspendSession {
    pub mounts: BindMounts,

    /// Recorded before the stop is attempted, since a failed stop may still
    /// have stopped some of them.
    pub stopped_services: Vec<String>,

    pub barriers_disabled: Vec<PathBuf>,
}

impl SuspendSession {
    pub fn is_clean(&self) -> bool {
        self.mounts.is_empty() && self.stopped_services.is_empty() && self.barriers_disabled.is_empty()
    }
}
