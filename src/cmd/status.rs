//! $0 status
use crate::config::UpdaterConfig;

pub(crate) fn run(config: UpdaterConfig) -> Result<u8, anyhow::Error>
{
	let updater = crate::command::updater(config);

	println!("State: {}", updater.current_state());

	match (updater.last_error_code(), updater.last_error_message()) {
		(Some(code), Some(msg)) => println!("Last error: {code} ({msg})"),
		(Some(code), None) => println!("Last error: {code}"),
		_ => println!("Last error: none"),
	}

	Ok(0)
}
