//! $0 cleanup
use crate::config::UpdaterConfig;

pub(crate) fn run(config: UpdaterConfig) -> Result<u8, anyhow::Error>
{
	let mut updater = crate::command::updater(config);

	if updater.cleanup_files()
	{
		println!("Backup directory removed.");
		Ok(0)
	}
	else
	{
		println!("Refusing to clean up while an update awaits confirmation; run `confirm` first.");
		Ok(1)
	}
}
