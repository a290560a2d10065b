//! $0 revert
use crate::config::UpdaterConfig;

pub(crate) fn run(config: UpdaterConfig) -> Result<u8, anyhow::Error>
{
	let mut updater = crate::command::updater(config);

	updater.revert_update()?;
	println!("Reverted to last backed-up state; rebooting.");
	Ok(0)
}
