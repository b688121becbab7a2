use anyhow::Result;
use async_trait::async_trait;

pub mod show;
pub mod suspend;
pub mod verify_hooks;

#[async_trait]
pub trait Command {
    async fn run(&self) -> Result<()>;
}

pub trait IntoCommand {
    fn into_command(self) -> Box<dyn Command>;
}

impl IntoCommand for crate::cli::GlobalSubcommand {
    fn into_command(self) -> Box<dyn Command> {
        match self {
            crate::cli::GlobalSubcommand::Suspend(suspend_options) => {
                Box::new(suspend::SuspendCommand { suspend_options })
            }
            crate::cli::GlobalSubcommand::Show(show_options) => {
                Box::new(show::ShowCommand { show_options })
            }
            crate::cli::GlobalSubcommand::VerifyHooks(verify_hooks_options) => {
                Box::new(verify_hooks::VerifyHooksCommand {
                    verify_hooks_options,
                })
            }
        }
    }
}
