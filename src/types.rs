use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use serde::Serialize;

/// Keyfile used for a device when the boot parameters or crypttab name none.
pub const DEFAULT_KEYFILE_PATH: &str = "/crypto_keyfile.bin";

/// A device-mapper backed encrypted volume.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CryptDevice {
    /// The mapper name, as found below `/dev/mapper/`.
    pub name: String,

    /// The underlying encrypted device. This is whatever the source reported:
    /// a `UUID=` descriptor, a device path or a `major:minor` pair.
    pub backing_device: String,
}

impl CryptDevice {
    pub fn new(name: impl Into<String>, backing_device: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backing_device: backing_device.into(),
        }
    }

    pub fn mapper_path(&self) -> PathBuf {
        Path::new("/dev/mapper").join(&self.name)
    }
}

/// Location of the secret used to unlock a device.
///
/// `offset` and `size` are only set when the key is embedded in a raw block
/// device, in which case they are handed to the unlock tool unchanged.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Keyfile {
    pub path: PathBuf,
    pub offset: u64,
    pub size: u64,
}

impl Keyfile {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            size: 0,
        }
    }

    pub fn embedded(path: impl Into<PathBuf>, offset: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            size,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.offset != 0 || self.size != 0
    }

    /// Whether the key source can be opened for reading right now.
    pub async fn is_readable(&self) -> bool {
        tokio::fs::File::open(&self.path).await.is_ok()
    }
}

impl Display for Keyfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_embedded() {
            write!(
                f,
                "{} (offset: {}, size: {})",
                self.path.display(),
                self.offset,
                self.size
            )
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}
