//! Trust checks for programs executed with root privilege while the machine
//! is being suspended.
//!
//! A script is trusted when it is a regular file owned by the trusted uid,
//! not writable by group or world and executable by someone. Only metadata is
//! read. Nothing here opens or runs the file, so a script can still be swapped
//! between [`ScriptVerifier::verify`] and its execution.

use std::{
    fs::Metadata,
    os::unix::fs::{MetadataExt as _, PermissionsExt as _},
    path::{Path, PathBuf},
};

use thiserror::Error;

const GROUP_OR_WORLD_WRITABLE: u32 = libc::S_IWGRP | libc::S_IWOTH;
const ANY_EXECUTABLE: u32 = libc::S_IXUSR | libc::S_IXGRP | libc::S_IXOTH;
const PERMISSION_MASK: u32 = 0o7777;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("failed to read metadata of {path:?}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is not a regular file")]
    NotRegularFile { path: PathBuf },

    #[error("{path:?} is not root owned (owner uid: {uid})")]
    NotRootOwned { path: PathBuf, uid: u32 },

    #[error("{path:?} is writable by group or world (mode: {mode:04o})")]
    WritableByOthers { path: PathBuf, mode: u32 },

    #[error("{path:?} is not executable (mode: {mode:04o})")]
    NotExecutable { path: PathBuf, mode: u32 },
}

/// Metadata snapshot of a candidate script, taken without following symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookScript {
    pub path: PathBuf,
    pub is_regular_file: bool,
    pub owner_uid: u32,
    pub permission_bits: u32,
}

impl HookScript {
    pub fn inspect(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let path = path.as_ref();
        let metadata = std::fs::symlink_metadata(path).map_err(|source| VerifyError::Inspect {
            path: path.to_owned(),
            source,
        })?;

        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Self {
            path: path.into(),
            is_regular_file: metadata.file_type().is_file(),
            owner_uid: metadata.uid(),
            permission_bits: metadata.permissions().mode() & PERMISSION_MASK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptVerifier {
    trusted_uid: u32,
}

impl Default for ScriptVerifier {
    fn default() -> Self {
        Self::root()
    }
}

impl ScriptVerifier {
    /// Only trust scripts owned by root.
    pub const fn root() -> Self {
        Self { trusted_uid: 0 }
    }

    /// Trust scripts owned by `uid` instead of root. Meant for running the
    /// suspend flow unprivileged in tests.
    pub const fn trusting(uid: u32) -> Self {
        Self { trusted_uid: uid }
    }

    pub fn verify(&self, path: impl AsRef<Path>) -> Result<HookScript, VerifyError> {
        let script = HookScript::inspect(path)?;
        self.check(&script)?;
        Ok(script)
    }

    pub fn check(&self, script: &HookScript) -> Result<(), VerifyError> {
        let path = || script.path.clone();
        let mode = script.permission_bits;

        if !script.is_regular_file {
            return Err(VerifyError::NotRegularFile { path: path() });
        }
        if script.owner_uid != self.trusted_uid {
            return Err(VerifyError::NotRootOwned {
                path: path(),
                uid: script.owner_uid,
            });
        }
        if mode & GROUP_OR_WORLD_WRITABLE != 0 {
            return Err(VerifyError::WritableByOthers { path: path(), mode });
        }
        if mode & ANY_EXECUTABLE == 0 {
            return Err(VerifyError::NotExecutable { path: path(), mode });
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod tests {

    #[allow(unused_imports)]
    use super::*;
    use anyhow::Result;
    use rstest::rstest;
    use std::fs::Permissions;

    fn current_uid() -> u32 {
        nix::unistd::getuid().as_raw()
    }

    fn script_with_mode(dir: &Path, name: &str, mode: u32) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n")?;
        std::fs::set_permissions(&path, Permissions::from_mode(mode))?;
        Ok(path)
    }

    #[rstest]
    #[case(0o755)]
    #[case(0o700)]
    #[case(0o744)]
    #[case(0o555)]
    fn test_accepts_owned_executable(#[case] mode: u32) -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = script_with_mode(dir.path(), "hook", mode)?;

        let script = ScriptVerifier::trusting(current_uid()).verify(&path)?;
        assert!(script.is_regular_file);
        assert_eq!(script.permission_bits, mode);

        Ok(())
    }

    #[test]
    fn test_rejects_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sub = dir.path().join("hook.d");
        std::fs::create_dir(&sub)?;
        std::fs::set_permissions(&sub, Permissions::from_mode(0o755))?;

        let err = ScriptVerifier::trusting(current_uid())
            .verify(&sub)
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotRegularFile { .. }), "{err}");

        Ok(())
    }

    #[test]
    fn test_rejects_symlink_to_valid_script() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let target = script_with_mode(dir.path(), "real", 0o755)?;
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link)?;

        let verifier = ScriptVerifier::trusting(current_uid());
        verifier.verify(&target)?;
        let err = verifier.verify(&link).unwrap_err();
        assert!(matches!(err, VerifyError::NotRegularFile { .. }), "{err}");

        Ok(())
    }

    #[test]
    fn test_rejects_foreign_owner() {
        let script = HookScript {
            path: "/usr/lib/systemd/system-sleep/hook".into(),
            is_regular_file: true,
            owner_uid: 1000,
            permission_bits: 0o755,
        };

        let err = ScriptVerifier::root().check(&script).unwrap_err();
        assert!(
            matches!(err, VerifyError::NotRootOwned { uid: 1000, .. }),
            "{err}"
        );
    }

    #[rstest]
    #[case(0o775)]
    #[case(0o757)]
    #[case(0o777)]
    fn test_rejects_writable_by_others(#[case] mode: u32) -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = script_with_mode(dir.path(), "hook", mode)?;

        let err = ScriptVerifier::trusting(current_uid())
            .verify(&path)
            .unwrap_err();
        assert!(matches!(err, VerifyError::WritableByOthers { .. }), "{err}");

        Ok(())
    }

    #[rstest]
    #[case(0o644)]
    #[case(0o600)]
    fn test_rejects_not_executable(#[case] mode: u32) -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = script_with_mode(dir.path(), "hook", mode)?;

        let err = ScriptVerifier::trusting(current_uid())
            .verify(&path)
            .unwrap_err();
        assert!(matches!(err, VerifyError::NotExecutable { .. }), "{err}");

        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = ScriptVerifier::root()
            .verify("/nonexistent/luks-suspend/hook")
            .unwrap_err();
        assert!(matches!(err, VerifyError::Inspect { .. }), "{err}");
    }

    #[test]
    fn test_checks_in_order() {
        // A directory owned by someone else is reported as not regular first.
        let script = HookScript {
            path: "/tmp/dir".into(),
            is_regular_file: false,
            owner_uid: 1000,
            permission_bits: 0o777,
        };
        assert!(matches!(
            ScriptVerifier::root().check(&script),
            Err(VerifyError::NotRegularFile { .. })
        ));

        let script = HookScript {
            is_regular_file: true,
            ..script
        };
        assert!(matches!(
            ScriptVerifier::root().check(&script),
            Err(VerifyError::NotRootOwned { .. })
        ));
    }
}
