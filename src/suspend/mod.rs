//! One suspend-to-RAM cycle with the root device re-locked while the machine
//! sleeps.
//!
//! The orchestrator steps through [`SuspendState`] strictly in order. Every
//! change it makes to the machine is recorded in a [`SuspendSession`] first,
//! so that on any error the abort path knows exactly what to undo. Whether a
//! failed cycle ends with a poweroff is decided in one place only,
//! [`SuspendOrchestrator::run_fail_closed`].

pub mod resume;
pub mod session;
pub mod state;

use anyhow::{Context as _, Result};

use crate::{
    config::SuspendConfig,
    discovery::{discover, mapper::CryptTargetSource, mapper::DeviceMapperSource, Discovery},
    fs::{
        barrier::{DISABLE_BARRIER_OPTIONS, RESTORE_BARRIER_OPTIONS},
        mount::{Mounter, NixMounter},
    },
    hooks::{HookPhase, HookReport, HookRunner},
    platform::{LinuxPlatform, Platform},
    service::{ServiceController, ServiceVerb, Systemctl},
    verify::ScriptVerifier,
};
use resume::{resume_secondaries, ResumeOutcome};
use session::SuspendSession;
use state::SuspendState;

/// What a completed cycle did.
#[derive(Debug)]
pub struct CycleReport {
    pub discovery: Discovery,
    pub pre_hooks: HookReport,
    pub post_hooks: HookReport,
    pub resumed: Vec<(String, ResumeOutcome)>,
}

pub struct SuspendOrchestrator {
    config: SuspendConfig,
    verifier: ScriptVerifier,
    hooks: HookRunner,
    mounter: Box<dyn Mounter>,
    services: Box<dyn ServiceController>,
    platform: Box<dyn Platform>,
    targets: Box<dyn CryptTargetSource>,
    state: SuspendState,
    history: Vec<SuspendState>,
}

impl SuspendOrchestrator {
    pub fn new(config: SuspendConfig) -> Self {
        let verifier = ScriptVerifier::root();
        Self {
            hooks: HookRunner::new(&config.hook_dir, verifier),
            services: Box::new(Systemctl::new(&config.systemctl)),
            verifier,
            mounter: Box::new(NixMounter),
            platform: Box::new(LinuxPlatform::default()),
            targets: Box::new(DeviceMapperSource),
            state: SuspendState::Idle,
            history: vec![SuspendState::Idle],
            config,
        }
    }

    pub fn with_verifier(mut self, verifier: ScriptVerifier) -> Self {
        self.verifier = verifier;
        self.hooks = HookRunner::new(&self.config.hook_dir, verifier);
        self
    }

    pub fn with_mounter(mut self, mounter: impl Mounter + 'static) -> Self {
        self.mounter = Box::new(mounter);
        self
    }

    pub fn with_services(mut self, services: impl ServiceController + 'static) -> Self {
        self.services = Box::new(services);
        self
    }

    pub fn with_platform(mut self, platform: impl Platform + 'static) -> Self {
        self.platform = Box::new(platform);
        self
    }

    pub fn with_targets(mut self, targets: impl CryptTargetSource + 'static) -> Self {
        self.targets = Box::new(targets);
        self
    }

    pub fn state(&self) -> SuspendState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SuspendState] {
        &self.history
    }

    fn transition(&mut self, next: SuspendState) {
        tracing::debug!(from = %self.state, to = %next, "Suspend state changed");
        self.state = next;
        self.history.push(next);
    }

    /// Runs one cycle and powers the machine off if it fails, unless the
    /// debug override is set. The error is returned either way.
    pub async fn run_fail_closed(&mut self) -> Result<CycleReport> {
        let result = self.run().await;

        if let Err(e) = &result {
            tracing::error!("Suspend cycle failed: {e:?}");
            if self.config.debug {
                tracing::warn!("Debug mode is enabled, leaving the machine running");
            } else {
                tracing::error!("Powering off");
                if let Err(e) = self.platform.power_off().await {
                    tracing::error!("{e:#}");
                }
            }
        }

        result
    }

    /// Runs one cycle. On error everything changed so far is undone on a best
    /// effort basis and the orchestrator is left in `Aborting`.
    pub async fn run(&mut self) -> Result<CycleReport> {
        let mut session = SuspendSession::default();

        match self.cycle(&mut session).await {
            Ok(report) => Ok(report),
            Err(e) => {
                self.transition(SuspendState::Aborting);
                self.unwind(&mut session).await;
                Err(e)
            }
        }
    }

    async fn cycle(&mut self, session: &mut SuspendSession) -> Result<CycleReport> {
        self.transition(SuspendState::Verifying);
        let handover = self.config.handover_path();
        self.verifier
            .verify(&handover)
            .context("Refusing to hand over to the initramfs")?;
        let discovery = discover(&self.config.discovery, self.targets.as_ref()).await?;

        session
            .mounts
            .bind_all(
                self.mounter.as_ref(),
                &self.config.initramfs_root,
                &self.config.bind_paths,
            )
            .context("Failed to prepare the initramfs root")?;
        self.transition(SuspendState::Bound);

        let pre_hooks = self.hooks.run_phase(HookPhase::Pre).await?;
        self.transition(SuspendState::PreHooksRun);

        session.stopped_services = self.config.services.clone();
        self.services
            .control(ServiceVerb::Stop, &session.stopped_services)
            .await?;
        self.transition(SuspendState::ServicesStopped);

        self.platform.sync().await?;
        for target in self.platform.barrier_filesystems().await? {
            self.platform
                .remount(&target, DISABLE_BARRIER_OPTIONS)
                .await?;
            session.barriers_disabled.push(target);
        }
        self.transition(SuspendState::Suspended);

        tracing::info!("Handing over to {handover:?}");
        self.platform
            .hand_over(
                &self.config.initramfs_root,
                &self.config.handover_program,
                &discovery.device_names(),
            )
            .await?;
        tracing::info!("Resumed, {} is unlocked again", discovery.root.name);

        let resumed = resume_secondaries(self.platform.as_ref(), &discovery.secondaries).await;
        self.restore_barriers(session).await?;

        self.services
            .control(ServiceVerb::Start, &session.stopped_services)
            .await?;
        session.stopped_services.clear();
        self.transition(SuspendState::ServicesRestarted);

        let post_hooks = self.hooks.run_phase(HookPhase::Post).await?;
        self.transition(SuspendState::PostHooksRun);

        session
            .mounts
            .unbind_all(self.mounter.as_ref())
            .context("Failed to release the initramfs root")?;
        self.transition(SuspendState::Idle);

        Ok(CycleReport {
            discovery,
            pre_hooks,
            post_hooks,
            resumed,
        })
    }

    async fn restore_barriers(&self, session: &mut SuspendSession) -> Result<()> {
        while let Some(target) = session.barriers_disabled.last() {
            self.platform
                .remount(target, RESTORE_BARRIER_OPTIONS)
                .await?;
            session.barriers_disabled.pop();
        }
        Ok(())
    }

    async fn unwind(&self, session: &mut SuspendSession) {
        if session.is_clean() {
            return;
        }

        let barriers_disabled = std::mem::take(&mut session.barriers_disabled);
        for target in barriers_disabled.iter().rev() {
            if let Err(e) = self.platform.remount(target, RESTORE_BARRIER_OPTIONS).await {
                tracing::error!("{e:#}");
            }
        }

        let stopped_services = std::mem::take(&mut session.stopped_services);
        if let Err(e) = self
            .services
            .control(ServiceVerb::Start, &stopped_services)
            .await
        {
            tracing::error!("{e:#}");
        }

        let failures = session.mounts.unbind_best_effort(self.mounter.as_ref());
        if failures > 0 {
            tracing::error!("{failures} bind mounts below the initramfs root could not be released");
        }
    }
}
