use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::*;
use serde::Serialize;

use crate::{
    cli::ShowOptions,
    config::DiscoveryConfig,
    discovery::{discover, mapper::DeviceMapperSource, Discovery},
};

pub struct ShowCommand {
    pub show_options: ShowOptions,
}

#[async_trait]
impl super::Command for ShowCommand {
    async fn run(&self) -> Result<()> {
        let mut config = DiscoveryConfig::default();
        if let Some(cmdline) = &self.show_options.cmdline {
            config.cmdline_path = cmdline.clone();
        }
        if let Some(crypttab) = &self.show_options.crypttab {
            config.crypttab_path = crypttab.clone();
        }

        let discovery = discover(&config, &DeviceMapperSource).await?;
        let statuses = DeviceStatus::from_discovery(&discovery).await;

        if self.show_options.json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        } else {
            println!("{}", statuses_as_table(&statuses));
        }

        Ok(())
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceRole {
    Root,
    Secondary,
}

/// JSON serializable structure for one device to be suspended
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub name: String,
    pub role: DeviceRole,
    pub mapper_path: PathBuf,
    pub backing_device: String,
    pub keyfile: Option<String>,
    pub key_readable: bool,
}

impl DeviceStatus {
    pub async fn from_discovery(discovery: &Discovery) -> Vec<Self> {
        let mut statuses = vec![Self {
            name: discovery.root.name.clone(),
            role: DeviceRole::Root,
            mapper_path: discovery.root.mapper_path(),
            backing_device: discovery.root.backing_device.clone(),
            keyfile: Some(discovery.root_key.to_string()),
            key_readable: discovery.root_key.is_readable().await,
        }];

        for secondary in &discovery.secondaries {
            let key_readable = match &secondary.key {
                Some(key) => key.is_readable().await,
                None => false,
            };
            statuses.push(Self {
                name: secondary.device.name.clone(),
                role: DeviceRole::Secondary,
                mapper_path: secondary.device.mapper_path(),
                backing_device: secondary.device.backing_device.clone(),
                keyfile: secondary.key.as_ref().map(ToString::to_string),
                key_readable,
            });
        }

        statuses
    }
}

fn statuses_as_table(statuses: &[DeviceStatus]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Device",
            "Role",
            "Mapper Path",
            "Backing Device",
            "Keyfile",
            "Key Readable",
        ]);

    for status in statuses {
        table.add_row(vec![
            Cell::new(&status.name),
            Cell::new(status.role),
            Cell::new(status.mapper_path.to_string_lossy()),
            Cell::new(&status.backing_device),
            match &status.keyfile {
                Some(keyfile) => Cell::new(keyfile),
                None => Cell::new("<none>").fg(Color::DarkGrey),
            },
            if status.key_readable {
                Cell::new("True").fg(Color::Green)
            } else {
                Cell::new("False").fg(Color::Yellow)
            },
        ]);
    }

    table
}
