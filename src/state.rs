//! The durable one-token state marker that makes the updater's lifecycle
//! crash-safe.  Everything else in this crate is rebuildable from
//! scratch; this file (plus the backup directory) is the one thing that
//! has to survive a power loss mid-apply.
use std::path::Path;

use thiserror::Error;


/// The lifecycle state of the updater, as recorded in the state marker
/// file.  `installing` observed on boot means a prior apply was
/// interrupted; `confirm_pending` means an apply finished and is waiting
/// on the application to call `confirm_update`/`revert_update`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum UpdaterState
{
	#[default]
	Idle,
	Installing,
	ConfirmPending,
}

impl UpdaterState
{
	fn as_token(&self) -> &'static str
	{
		match self {
			Self::Idle => "idle",
			Self::Installing => "installing",
			Self::ConfirmPending => "confirm_pending",
		}
	}

	fn from_token(s: &str) -> Option<Self>
	{
		match s.trim() {
			"idle" => Some(Self::Idle),
			"installing" => Some(Self::Installing),
			"confirm_pending" => Some(Self::ConfirmPending),
			_ => None,
		}
	}
}

impl std::fmt::Display for UpdaterState
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
	{ write!(f, "{}", self.as_token()) }
}


/// Problems reading or writing the state marker.
#[derive(Debug)]
#[derive(Error)]
pub enum StateErr
{
	/// Some IO error (open, read, write, rename, etc)
	#[error("State marker I/O error: {0}")]
	IO(#[from] std::io::Error),
}


/// Load the current state from `path`.  A missing file is `idle` (first
/// run, nothing to recover); unrecognized content is also `idle`, but
/// with a warning logged, since that's a sign of corruption rather than
/// a fresh install.
pub fn load(path: &Path) -> Result<UpdaterState, StateErr>
{
	if !path.is_file() { return Ok(UpdaterState::Idle); }

	let raw = std::fs::read_to_string(path)?;
	match UpdaterState::from_token(&raw) {
		Some(st) => Ok(st),
		None => {
			tracing::warn!(content = %raw.trim(), path = %path.display(),
					"unrecognized state marker content, treating as idle");
			Ok(UpdaterState::Idle)
		}
	}
}


/// Persist `state` to `path`.  Prefers write-to-temp-then-rename so a
/// crash mid-write can never leave a half-written token behind; falls
/// back to a direct write if the rename can't happen (e.g. `path`'s
/// directory is on a different filesystem than the temp dir), per the
/// recovery model's tolerance for a single-write fallback.
pub fn save(path: &Path, state: UpdaterState) -> Result<(), StateErr>
{
	let dir = path.parent().unwrap_or_else(|| Path::new("."));

	match tempfile::Builder::new().tempfile_in(dir) {
		Ok(mut tmp) => {
			use std::io::Write as _;
			tmp.write_all(state.as_token().as_bytes())?;
			tmp.as_file().sync_all()?;
			match tmp.persist(path) {
				Ok(_) => Ok(()),
				Err(e) => {
					tracing::warn!(error = %e, "state marker rename failed, falling back to direct write");
					std::fs::write(path, state.as_token())
				}
			}
		}
		Err(_) => std::fs::write(path, state.as_token()),
	}.map_err(StateErr::from)
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn missing_file_is_idle()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ota_state.txt");
		assert_eq!(load(&path).unwrap(), UpdaterState::Idle);
	}

	#[test]
	fn unrecognized_content_is_idle()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ota_state.txt");
		std::fs::write(&path, "garbage").unwrap();
		assert_eq!(load(&path).unwrap(), UpdaterState::Idle);
	}

	#[test]
	fn roundtrip_all_states()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("ota_state.txt");

		for st in [UpdaterState::Idle, UpdaterState::Installing, UpdaterState::ConfirmPending]
		{
			save(&path, st).unwrap();
			assert_eq!(load(&path).unwrap(), st);
		}
	}
}
