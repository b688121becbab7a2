use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use nix::mount::{MntFlags, MsFlags};

/// Pseudo-filesystems exposed to the initramfs, in binding order.
pub const INITRAMFS_BIND_PATHS: [&str; 4] = ["/sys", "/proc", "/dev", "/run"];

pub trait Mounter: Send + Sync {
    fn bind(&self, source: &Path, target: &Path) -> Result<()>;

    fn unmount(&self, target: &Path) -> Result<()>;
}

pub struct NixMounter;

impl Mounter for NixMounter {
    fn bind(&self, source: &Path, target: &Path) -> Result<()> {
        nix::mount::mount(
            Some(source),
            target,
            Option::<&str>::None,
            MsFlags::MS_BIND,
            Option::<&str>::None,
        )
        .with_context(|| format!("Failed to bind {source:?} on {target:?}"))
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        nix::mount::umount2(target, MntFlags::empty())
            .with_context(|| format!("Failed to unmount {target:?}"))
    }
}

/// Maps `source` to the same absolute path below `root`.
pub fn target_under(root: &Path, source: &Path) -> PathBuf {
    root.join(source.strip_prefix("/").unwrap_or(source))
}

/// Bind mounts created below the initramfs root during one suspend cycle.
///
/// Only successful binds are recorded, and a target leaves the record as soon
/// as it was unmounted, so each bound path is unmounted at most once.
#[derive(Debug, Default)]
pub struct BindMounts {
    bound: VecDeque<PathBuf>,
}

impl BindMounts {
    pub fn bound(&self) -> impl Iterator<Item = &Path> {
        self.bound.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Stops at the first failure. Whatever was bound before it stays
    /// recorded and must still be released with [`Self::unbind_all`] or
    /// [`Self::unbind_best_effort`].
    pub fn bind_all(
        &mut self,
        mounter: &dyn Mounter,
        root: &Path,
        sources: &[PathBuf],
    ) -> Result<()> {
        for source in sources {
            let target = target_under(root, source);
            tracing::debug!("Binding {source:?} on {target:?}");
            mounter.bind(source, &target)?;
            self.bound.push_back(target);
        }

        Ok(())
    }

    /// Unmounts in binding order and stops at the first failure, leaving the
    /// failed target and the ones after it recorded.
    pub fn unbind_all(&mut self, mounter: &dyn Mounter) -> Result<()> {
        while let Some(target) = self.bound.front() {
            tracing::debug!("Unbinding {target:?}");
            mounter.unmount(target)?;
            self.bound.pop_front();
        }

        Ok(())
    }

    /// Tries every recorded target once and forgets all of them. Returns the
    /// number of targets that failed to unmount.
    pub fn unbind_best_effort(&mut self, mounter: &dyn Mounter) -> usize {
        let mut failures = 0;
        for target in self.bound.drain(..) {
            if let Err(e) = mounter.unmount(&target) {
                tracing::error!("{e:#}");
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
pub mod tests {

    #[allow(unused_imports)]
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingMounter {
        pub fail_bind_on: Option<PathBuf>,
        pub fail_unmount_on: Mutex<Vec<PathBuf>>,
        pub log: Mutex<Vec<String>>,
    }

    impl Mounter for RecordingMounter {
        fn bind(&self, source: &Path, target: &Path) -> Result<()> {
            if self.fail_bind_on.as_deref() == Some(source) {
                bail!("bind of {source:?} refused");
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("bind {} {}", source.display(), target.display()));
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<()> {
            let mut failing = self.fail_unmount_on.lock().unwrap();
            if let Some(pos) = failing.iter().position(|p| p == target) {
                failing.remove(pos);
                bail!("{target:?} is busy");
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("umount {}", target.display()));
            Ok(())
        }
    }

    fn sources() -> Vec<PathBuf> {
        INITRAMFS_BIND_PATHS.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_target_under() {
        assert_eq!(
            target_under(Path::new("/run/initramfs"), Path::new("/sys")),
            PathBuf::from("/run/initramfs/sys")
        );
        assert_eq!(
            target_under(Path::new("/run/initramfs"), Path::new("dev")),
            PathBuf::from("/run/initramfs/dev")
        );
    }

    #[test]
    fn test_bind_then_unbind_in_same_order() -> Result<()> {
        let mounter = RecordingMounter::default();
        let mut mounts = BindMounts::default();

        mounts.bind_all(&mounter, Path::new("/run/initramfs"), &sources())?;
        assert_eq!(mounts.bound().count(), 4);
        mounts.unbind_all(&mounter)?;
        assert!(mounts.is_empty());

        assert_eq!(
            *mounter.log.lock().unwrap(),
            vec![
                "bind /sys /run/initramfs/sys",
                "bind /proc /run/initramfs/proc",
                "bind /dev /run/initramfs/dev",
                "bind /run /run/initramfs/run",
                "umount /run/initramfs/sys",
                "umount /run/initramfs/proc",
                "umount /run/initramfs/dev",
                "umount /run/initramfs/run",
            ]
        );

        Ok(())
    }

    #[test]
    fn test_partial_bind_only_records_successes() -> Result<()> {
        let mounter = RecordingMounter {
            fail_bind_on: Some("/dev".into()),
            ..Default::default()
        };
        let mut mounts = BindMounts::default();

        assert!(mounts
            .bind_all(&mounter, Path::new("/run/initramfs"), &sources())
            .is_err());
        assert_eq!(
            mounts.bound().collect::<Vec<_>>(),
            vec![
                Path::new("/run/initramfs/sys"),
                Path::new("/run/initramfs/proc")
            ]
        );

        assert_eq!(mounts.unbind_best_effort(&mounter), 0);
        assert!(mounts.is_empty());
        let log = mounter.log.lock().unwrap();
        assert_eq!(log.iter().filter(|l| l.starts_with("umount")).count(), 2);

        Ok(())
    }

    #[test]
    fn test_unbind_failure_is_surfaced_and_retried_once() -> Result<()> {
        let mounter = RecordingMounter {
            fail_unmount_on: Mutex::new(vec!["/run/initramfs/proc".into()]),
            ..Default::default()
        };
        let mut mounts = BindMounts::default();
        mounts.bind_all(&mounter, Path::new("/run/initramfs"), &sources())?;

        assert!(mounts.unbind_all(&mounter).is_err());
        assert_eq!(mounts.bound().count(), 3);

        mounts.unbind_all(&mounter)?;
        assert!(mounts.is_empty());

        let log = mounter.log.lock().unwrap();
        for target in ["sys", "proc", "dev", "run"] {
            let line = format!("umount /run/initramfs/{target}");
            assert_eq!(log.iter().filter(|l| **l == line).count(), 1, "{line}");
        }

        Ok(())
    }
}
