//! Root device parameters from the kernel command line.
//!
//! Grammar, as understood by the `encrypt` initramfs hook:
//!
//! ```text
//! cryptdevice=<descriptor>:<name>[:<options>]
//! cryptkey=<device>:<offset>:<size>      embedded key on a raw device
//! cryptkey=<device>:<fstype>:<path>      key file on a filesystem
//! cryptkey=<label-or-uuid>:<path>        key file on a filesystem
//! ```
//!
//! Both parameters may repeat, the last occurrence wins.

use std::path::Path;

use crate::types::{CryptDevice, Keyfile};

use super::DiscoveryError;

pub const CRYPTDEVICE_PARAM: &str = "cryptdevice";
pub const CRYPTKEY_PARAM: &str = "cryptkey";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCryptParams {
    pub device: CryptDevice,
    pub key: Keyfile,
}

fn param_values<'a>(cmdline: &'a str, param: &'a str) -> impl Iterator<Item = &'a str> {
    cmdline.split_whitespace().filter_map(move |token| {
        token
            .split_once('=')
            .and_then(|(key, value)| (key == param).then_some(value))
    })
}

fn malformed(param: &str, value: &str, reason: &'static str) -> DiscoveryError {
    DiscoveryError::MalformedParameter {
        token: format!("{param}={value}"),
        reason,
    }
}

fn parse_cryptdevice(value: &str) -> Result<CryptDevice, DiscoveryError> {
    let mut fields = value.splitn(3, ':');
    let descriptor = fields.next().unwrap_or_default();
    let name = fields.next().unwrap_or_default();

    if descriptor.is_empty() {
        return Err(malformed(CRYPTDEVICE_PARAM, value, "empty device descriptor"));
    }
    if name.is_empty() {
        return Err(malformed(CRYPTDEVICE_PARAM, value, "missing mapper name"));
    }

    Ok(CryptDevice::new(name, descriptor))
}

fn parse_cryptkey(value: &str) -> Result<Keyfile, DiscoveryError> {
    let fields = value.split(':').collect::<Vec<_>>();

    let key = match fields.as_slice() {
        [device, second, third] => match (second.parse::<u64>(), third.parse::<u64>()) {
            (Ok(offset), Ok(size)) => Keyfile::embedded(*device, offset, size),
            // <device>:<fstype>:<path>
            _ => Keyfile::plain(*third),
        },
        [_, path] => Keyfile::plain(*path),
        _ => return Err(malformed(CRYPTKEY_PARAM, value, "unexpected number of fields")),
    };

    if key.path.as_os_str().is_empty() {
        return Err(malformed(CRYPTKEY_PARAM, value, "empty key path"));
    }

    Ok(key)
}

pub fn parse_kernel_cmdline(
    cmdline: &str,
    default_keyfile: &Path,
) -> Result<RootCryptParams, DiscoveryError> {
    let device = param_values(cmdline, CRYPTDEVICE_PARAM)
        .last()
        .ok_or(DiscoveryError::NoRootCryptDevice)
        .and_then(parse_cryptdevice)?;

    let key = match param_values(cmdline, CRYPTKEY_PARAM).last() {
        Some(value) => parse_cryptkey(value)?,
        None => Keyfile::plain(default_keyfile),
    };

    Ok(RootCryptParams { device, key })
}
