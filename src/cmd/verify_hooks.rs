use std::path::PathBuf;

use anyhow::{bail, Result};
use async_trait::async_trait;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::*;

use crate::{
    cli::VerifyHooksOptions,
    config::SuspendConfig,
    hooks::HookRunner,
    verify::{ScriptVerifier, VerifyError},
};

pub struct VerifyHooksCommand {
    pub verify_hooks_options: VerifyHooksOptions,
}

/// Verdict on one script that would run during a suspend cycle.
pub struct Verdict {
    pub path: PathBuf,
    pub kind: &'static str,
    pub result: Result<(), VerifyError>,
}

/// Checks the handover program and every hook, running none of them.
pub async fn collect_verdicts(config: &SuspendConfig, verifier: ScriptVerifier) -> Result<Vec<Verdict>> {
    let handover = config.handover_path();
    let mut verdicts = vec![Verdict {
        result: verifier.verify(&handover).map(|_| ()),
        path: handover,
        kind: "handover",
    }];

    for hook in HookRunner::new(&config.hook_dir, verifier).list().await? {
        verdicts.push(Verdict {
            result: verifier.verify(&hook).map(|_| ()),
            path: hook,
            kind: "hook",
        });
    }

    Ok(verdicts)
}

#[async_trait]
impl super::Command for VerifyHooksCommand {
    async fn run(&self) -> Result<()> {
        let mut config = SuspendConfig::default();
        if let Some(hook_dir) = &self.verify_hooks_options.hook_dir {
            config.hook_dir = hook_dir.clone();
        }
        if let Some(initramfs_root) = &self.verify_hooks_options.initramfs_root {
            config.initramfs_root = initramfs_root.clone();
        }

        let verdicts = collect_verdicts(&config, ScriptVerifier::root()).await?;

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Path", "Kind", "Verdict"]);
        for verdict in &verdicts {
            table.add_row(vec![
                Cell::new(verdict.path.to_string_lossy()),
                Cell::new(verdict.kind),
                match &verdict.result {
                    Ok(()) => Cell::new("Trusted").fg(Color::Green),
                    Err(e) => Cell::new(format!("Rejected: {e}")).fg(Color::Red),
                },
            ]);
        }
        println!("{table}");

        // An untrusted hook is only skipped, while an untrusted handover
        // program makes every suspend attempt fail.
        if let Some(Verdict {
            result: Err(e), ..
        }) = verdicts.first()
        {
            bail!("The handover program cannot be trusted: {e}")
        }

        Ok(())
    }
}
