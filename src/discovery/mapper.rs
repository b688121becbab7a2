use anyhow::{Context as _, Result};
use devicemapper::{DevId, DmFlags, DmOptions, DM};

use crate::types::CryptDevice;

const CRYPT_TARGET_TYPE: &str = "crypt";

/// A `(start, length, target type, params)` line of a device-mapper table.
pub type TargetLine = (u64, u64, String, String);

/// Source of the crypt mappings that are currently active.
pub trait CryptTargetSource: Send + Sync {
    fn active_crypt_devices(&self) -> Result<Vec<CryptDevice>>;
}

/// Asks the kernel through the device-mapper ioctl interface.
pub struct DeviceMapperSource;

impl CryptTargetSource for DeviceMapperSource {
    fn active_crypt_devices(&self) -> Result<Vec<CryptDevice>> {
        let dm = DM::new().context("Failed to communicating with device-mapper driver")?;

        let tables = dm
            .list_devices()
            .context("Failed to list device-mapper devices")?
            .into_iter()
            .map(|(name, _, _)| {
                let table = dm
                    .table_status(
                        &DevId::Name(&name),
                        DmOptions::default().set_flags(DmFlags::DM_STATUS_TABLE),
                    )
                    .map(|(_, table)| table)
                    .with_context(|| format!("Failed to load device-mapper table of {name}"));
                (name.to_string(), table)
            });

        Ok(collect_crypt_devices(tables))
    }
}

/// Keeps the devices with a crypt target. A device whose table cannot be
/// read, e.g. because it was removed after listing, is reported and skipped.
pub fn collect_crypt_devices(
    tables: impl IntoIterator<Item = (String, Result<Vec<TargetLine>>)>,
) -> Vec<CryptDevice> {
    tables
        .into_iter()
        .filter_map(|(name, table)| match table {
            Ok(table) => {
                crypt_backing_device(&table).map(|backing| CryptDevice::new(name, backing))
            }
            Err(e) => {
                tracing::warn!("Skipping device-mapper device {name}: {e:#}");
                None
            }
        })
        .collect()
}

/// The underlying device of a crypt table, i.e. the fourth field of
/// `<cipher> <key> <iv_offset> <device> <offset> [<#opt_params> <opt_params>]`.
pub fn crypt_backing_device(table: &[TargetLine]) -> Option<String> {
    table
        .iter()
        .find(|(_, _, target_type, _)| target_type == CRYPT_TARGET_TYPE)
        .and_then(|(_, _, _, params)| params.split_whitespace().nth(3))
        .map(str::to_owned)
}
