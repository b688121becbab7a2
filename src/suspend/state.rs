use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SuspendState {
    Idle,
    Verifying,
    Bound,
    PreHooksRun,
    ServicesStopped,
    Suspended,
    ServicesRestarted,
    PostHooksRun,
    Aborting,
}

impl SuspendState {
    /// States a successful cycle passes through, in order.
    pub const CYCLE: [SuspendState; 9] = [
        SuspendState::Idle,
        SuspendState::Verifying,
        SuspendState::Bound,
        SuspendState::PreHooksRun,
        SuspendState::ServicesStopped,
        SuspendState::Suspended,
        SuspendState::ServicesRestarted,
        SuspendState::PostHooksRun,
        SuspendState::Idle,
    ];
}
