//! $0 check
use crate::config::UpdaterConfig;
use crate::core::{no_op_sink, OtaOutcome};

pub(crate) fn run(config: UpdaterConfig) -> Result<u8, anyhow::Error>
{
	let mut updater = crate::command::updater(config);
	let mut events = no_op_sink();

	match updater.check_and_perform_ota(&mut events) {
		Ok(OtaOutcome::NoChangesNeeded) => {
			println!("Already up to date.");
			Ok(0)
		}
		Ok(OtaOutcome::RecoveredFromInterruption) => {
			println!("Recovered from an interrupted update; rebooted to a known-good state.");
			Ok(0)
		}
		Ok(OtaOutcome::PendingConfirmation) => {
			println!("An update is already applied and awaiting confirmation; run `confirm` first.");
			Ok(1)
		}
		Ok(OtaOutcome::Applied { mode, files_changed }) => {
			println!("Applied update via {mode} ({files_changed} file(s) changed); rebooting.");
			Ok(0)
		}
		Err(e) => {
			tracing::error!(code = %e.code(), "update check failed: {e}");
			Err(e.into())
		}
	}
}
