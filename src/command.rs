//! General command handling -- the central dispatch for everything
//! that goes on.

/// Command-line parsing and handling
mod line;
pub(crate) use line::OtaCmds;
pub use line::{parse, OtaArgs};


use std::process::ExitCode;

use crate::config::UpdaterConfig;
use crate::core::Updater;

#[derive(Debug)]
enum MyExit
{
	Ok,
	Code(u8),
}

impl From<()> for MyExit { fn from(_x: ()) -> Self { Self::Ok } }
impl From<u8> for MyExit { fn from(c: u8) -> Self { Self::Code(c) } }

impl From<MyExit> for ExitCode
{
	fn from(my: MyExit) -> Self
	{
		use MyExit as M;
		match my {
			M::Ok => Self::SUCCESS,
			M::Code(c) => c.into(),
		}
	}
}


/// Dispatch a command
pub fn run(clargs: OtaArgs) -> Result<ExitCode, anyhow::Error>
{
	init(&clargs)?;

	let mut config = load_config(&clargs.config)?;
	if let Some(dest_dir) = &clargs.dest_dir
	{
		config.dest_dir = dest_dir.clone();
	}

	use OtaCmds as C;
	let myex: MyExit = match clargs.command {
		C::Check(..) => crate::cmd::check::run(config)?.into(),
		C::Confirm(ref a) => crate::cmd::confirm::run(config, !a.no_cleanup)?.into(),
		C::Revert(..) => crate::cmd::revert::run(config)?.into(),
		C::Cleanup(..) => crate::cmd::cleanup::run(config)?.into(),
		C::Status(..) => crate::cmd::status::run(config)?.into(),

		#[cfg(test)]
		C::Dummy => unreachable!("not a real command"),
	};
	Ok(myex.into())
}


fn load_config(path: &std::path::Path) -> Result<UpdaterConfig, anyhow::Error>
{
	match std::fs::read(path) {
		Ok(bytes) => Ok(UpdaterConfig::from_json(&bytes)?),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			tracing::warn!(path = %path.display(), "no config file found, using defaults");
			Ok(UpdaterConfig::default())
		}
		Err(e) => Err(e.into()),
	}
}


/// Process-global initialization: logging, mainly.
pub fn init(_clargs: &OtaArgs) -> Result<(), anyhow::Error>
{
	tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.try_init()
			.ok();

	Ok(())
}


/// Constructs an `Updater` from a loaded config, so every `cmd::*`
/// runner shares identical wiring.
pub(crate) fn updater(config: UpdaterConfig) -> Updater
{
	Updater::new(config)
}
