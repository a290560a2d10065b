//! Command line handling
//!
//! General invocation:
//! $0 [options] <command> [command-opts]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main arg entry point
#[cfg_attr(test, derive(Default))]
#[derive(Debug)]
#[derive(Parser)]
#[command(about = "Apply over-the-air updates to a device.")]
#[command(version)]
pub struct OtaArgs
{
	#[command(subcommand)]
	pub(crate) command: OtaCmds,

	/// Config file (JSON).
	#[arg(short, long, default_value = "/etc/ota-rustdate.json")]
	pub(crate) config: PathBuf,

	/// Override the config's `dest_dir`.
	#[arg(short, long)]
	pub(crate) dest_dir: Option<PathBuf>,
}


/// Individual subcommands and their args
#[cfg_attr(test, derive(Default))]
#[derive(Debug)]
#[derive(Subcommand)]
pub(crate) enum OtaCmds
{
	/// Dummy value (mostly to make derive(Default) happy...)
	#[cfg(test)]
	#[cfg_attr(test, default)]
	#[command(skip)]
	Dummy,

	/// Run one check-and-apply pass.
	///
	/// Recovers from any interrupted prior attempt first.  If an update
	/// is applied, the device is left in `confirm_pending` and rebooted;
	/// run `confirm` after boot to finalize.
	Check(OtaCmdCheck),

	/// Confirm a pending update, transitioning back to `idle`.
	///
	/// Refuses (no-op, non-zero exit) unless the state is currently
	/// `confirm_pending`.
	Confirm(OtaCmdConfirm),

	/// Roll back to the last backed-up state and reboot.
	Revert(OtaCmdRevert),

	/// Remove the backup directory.
	///
	/// Refuses while `confirm_pending` -- confirm first.
	Cleanup(OtaCmdCleanup),

	/// Print the current state and last error, if any.
	Status(OtaCmdStatus),
}


/// Check args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct OtaCmdCheck {}

/// Confirm args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct OtaCmdConfirm
{
	/// Leave the backup directory in place after confirming.
	#[arg(long)]
	pub(crate) no_cleanup: bool,
}

/// Revert args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct OtaCmdRevert {}

/// Cleanup args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct OtaCmdCleanup {}

/// Status args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct OtaCmdStatus {}


impl std::fmt::Display for OtaCmds
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error>
	{
		match self {
			Self::Check(..) => f.write_str("check"),
			Self::Confirm(..) => f.write_str("confirm"),
			Self::Revert(..) => f.write_str("revert"),
			Self::Cleanup(..) => f.write_str("cleanup"),
			Self::Status(..) => f.write_str("status"),

			#[cfg(test)]
			Self::Dummy => f.write_str("dummy"),
		}
	}
}


pub fn parse() -> OtaArgs
{
	OtaArgs::parse()
}
