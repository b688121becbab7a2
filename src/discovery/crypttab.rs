//! Minimal `/etc/crypttab` reader, enough to find the key of a mapping.

use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::types::Keyfile;

/// One line of `/etc/crypttab`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrypttabEntry {
    pub name: String,
    pub device: String,
    pub key: Option<String>,
    pub options: Vec<String>,
}

impl CrypttabEntry {
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut fields = line.split_whitespace();
        let (Some(name), Some(device)) = (fields.next(), fields.next()) else {
            bail!("Expected at least a name and a device");
        };
        let key = fields
            .next()
            .filter(|key| !matches!(*key, "none" | "-"))
            .map(str::to_owned);
        let options = fields
            .next()
            .map(|options| options.split(',').map(str::to_owned).collect())
            .unwrap_or_default();

        Ok(Some(Self {
            name: name.to_owned(),
            device: device.to_owned(),
            key,
            options,
        }))
    }

    fn numeric_option(&self, option: &str) -> Result<u64> {
        for entry in &self.options {
            if let Some(value) = entry
                .strip_prefix(option)
                .and_then(|rest| rest.strip_prefix('='))
            {
                return value
                    .parse()
                    .with_context(|| format!("Invalid value for option {option}: {value:?}"));
            }
        }
        Ok(0)
    }

    /// Key location of this mapping, falling back to `default_keyfile` when
    /// the entry does not name one.
    pub fn keyfile(&self, default_keyfile: &Path) -> Result<Keyfile> {
        let path = match &self.key {
            Some(key) => Path::new(key),
            None => default_keyfile,
        };

        Ok(Keyfile::embedded(
            path,
            self.numeric_option("keyfile-offset")?,
            self.numeric_option("keyfile-size")?,
        ))
    }
}

/// Lines that cannot be parsed are reported and skipped, since they only
/// cost the automatic unlock of one device.
pub fn parse_crypttab(contents: &str) -> Vec<CrypttabEntry> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match CrypttabEntry::parse_line(line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Ignoring crypttab line {}: {e:#}", index + 1);
                None
            }
        })
        .collect()
}
