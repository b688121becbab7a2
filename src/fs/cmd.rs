use std::{
    marker::{Send, Sync},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait CheckCommandOutput {
    /// Run to completion with captured output, failing on a non-zero exit code.
    async fn run(&mut self) -> Result<Vec<u8>>;

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R>;

    /// Run with stdio inherited from this process, for programs that talk to
    /// the console directly.
    async fn run_attached(&mut self) -> Result<()>;
}

fn indent_multiline(output: &[u8]) -> String {
    let output = String::from_utf8_lossy(output);
    if output.contains('\n') {
        format!("(multi-line)\n\t{}", output.replace('\n', "\n\t"))
    } else {
        output.into()
    }
}

#[async_trait]
impl CheckCommandOutput for Command {
    async fn run(&mut self) -> Result<Vec<u8>> {
        self.run_with_status_checker(|code, stdout, _| {
            if code != 0 {
                bail!("Bad exit code")
            } else {
                Ok(stdout)
            }
        })
        .await
    }

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl Fn(i32, Vec<u8>, Vec<u8>) -> Result<R> + Send + Sync,
    ) -> Result<R> {
        self.env("LC_ALL", "C");

        tracing::trace!(cmd=?self.as_std(), "run external cmd");

        let output = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn cmd: {:?}", self.as_std()))?;

        let code = output.status.code();
        match code {
            Some(code) => f(code, output.stdout.clone(), output.stderr.clone()),
            None => Err(anyhow!("killed by signal")),
        }
        .with_context(|| {
            format!(
                "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
                self.as_std(),
                code.map(|code| code.to_string())
                    .unwrap_or("unknown".to_string()),
                indent_multiline(&output.stdout),
                indent_multiline(&output.stderr),
            )
        })
        .context("Failed to execute external command")
    }

    async fn run_attached(&mut self) -> Result<()> {
        tracing::trace!(cmd=?self.as_std(), "run attached external cmd");

        let status = self
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .with_context(|| format!("Failed to spawn cmd: {:?}", self.as_std()))?;

        if !status.success() {
            bail!("cmd: {:?} exited with {status}", self.as_std())
        }

        Ok(())
    }
}
