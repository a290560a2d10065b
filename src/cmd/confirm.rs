//! $0 confirm
use crate::config::UpdaterConfig;

pub(crate) fn run(config: UpdaterConfig, cleanup: bool) -> Result<u8, anyhow::Error>
{
	let mut updater = crate::command::updater(config);

	if updater.confirm_update(cleanup)
	{
		println!("Update confirmed.");
		Ok(0)
	}
	else
	{
		println!("No update is awaiting confirmation.");
		Ok(1)
	}
}
