//! The updater: sequences preflight, backup-first apply, verification,
//! state transition, and reboot. This is where every other module in
//! `core` gets wired together.
use std::collections::HashSet;
use std::path::Path;

use crate::config::{DeletePolicy, UpdaterConfig};
use crate::core::backup::BackupManager;
use crate::core::delete_policy;
use crate::core::diff::{self, Action, Plan};
use crate::core::downloader::Downloader;
use crate::core::events::{Event, EventSink, ErrorCode, Mode, UpdaterError};
use crate::core::httpfs::HttpFsCrawler;
use crate::metadata::{self, Manifest};
use crate::state::{self, UpdaterState};
use crate::util::path_join;


/// What `check_and_perform_ota` actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaOutcome
{
	/// Remote and local versions already matched; nothing to do.
	NoChangesNeeded,
	/// A prior attempt was interrupted; we recovered to `idle` and did
	/// not attempt a new update this call.
	RecoveredFromInterruption,
	/// An update was already awaiting confirmation; we refused to start
	/// a new one.
	PendingConfirmation,
	/// An update was applied; the device is now `confirm_pending`.
	Applied { mode: Mode, files_changed: usize },
}


/// A free-space query, injected so the orchestrator is testable without
/// touching a real filesystem's statvfs. Returns `(free_bytes, total_bytes)`.
pub trait FreeSpace
{
	fn free_space(&self, path: &Path) -> std::io::Result<(u64, u64)>;
}

/// Production `FreeSpace` impl via `statvfs(2)` on unix; elsewhere
/// reports "plenty of space" rather than failing the check outright.
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace
{
	#[cfg(unix)]
	fn free_space(&self, path: &Path) -> std::io::Result<(u64, u64)>
	{
		use std::ffi::CString;
		use std::os::unix::ffi::OsStrExt;

		let c_path = CString::new(path.as_os_str().as_bytes())
				.map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

		let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
		let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
		if ret != 0 { return Err(std::io::Error::last_os_error()); }

		let free = stat.f_bavail as u64 * stat.f_frsize as u64;
		let total = stat.f_blocks as u64 * stat.f_frsize as u64;
		Ok((free, total))
	}

	#[cfg(not(unix))]
	fn free_space(&self, _path: &Path) -> std::io::Result<(u64, u64)>
	{
		Ok((u64::MAX, u64::MAX))
	}
}


/// The reboot primitive. Production code execs a real reboot; tests
/// inject a `RecordingRebootHook` that just counts calls.
pub trait RebootHook
{
	fn reboot(&self);
}

pub struct SystemReboot;

impl RebootHook for SystemReboot
{
	#[cfg(target_os = "linux")]
	fn reboot(&self)
	{
		tracing::info!("invoking system reboot");
		unsafe { libc::reboot(libc::LINUX_REBOOT_CMD_RESTART) };
	}

	#[cfg(not(target_os = "linux"))]
	fn reboot(&self)
	{
		tracing::info!("reboot requested (no-op on this target)");
	}
}

#[derive(Default)]
pub struct RecordingRebootHook
{
	pub calls: std::sync::atomic::AtomicUsize,
}

impl RebootHook for RecordingRebootHook
{
	fn reboot(&self)
	{
		self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
	}
}


/// The long-lived updater instance. Owns nothing durable itself -- all
/// state lives in filesystem artifacts (the state marker, the local
/// manifest, the backup dir); this struct just remembers configuration
/// and the last error for `status`-style callers.
pub struct Updater<F: FreeSpace = SystemFreeSpace, R: RebootHook = SystemReboot>
{
	config: UpdaterConfig,
	free_space: F,
	reboot_hook: R,
	last_error_code: Option<ErrorCode>,
	last_error_message: Option<String>,
}

impl Updater<SystemFreeSpace, SystemReboot>
{
	pub fn new(config: UpdaterConfig) -> Self
	{
		Self {
			config, free_space: SystemFreeSpace, reboot_hook: SystemReboot,
			last_error_code: None, last_error_message: None,
		}
	}
}

impl<F: FreeSpace, R: RebootHook> Updater<F, R>
{
	pub fn with_collaborators(config: UpdaterConfig, free_space: F, reboot_hook: R) -> Self
	{
		Self { config, free_space, reboot_hook, last_error_code: None, last_error_message: None }
	}

	pub fn last_error_code(&self) -> Option<ErrorCode> { self.last_error_code }
	pub fn last_error_message(&self) -> Option<&str> { self.last_error_message.as_deref() }

	/// Current durable state, read fresh from disk.
	pub fn current_state(&self) -> UpdaterState
	{
		state::load(&self.state_path()).unwrap_or_default()
	}

	fn state_path(&self) -> std::path::PathBuf
	{ path_join(&self.config.dest_dir, &self.config.ota_state_file) }

	fn local_manifest_path(&self) -> std::path::PathBuf
	{ path_join(&self.config.dest_dir, &self.config.local_manifest_file) }

	fn backup_manager(&self) -> BackupManager
	{
		BackupManager::new(&self.config.dest_dir, &self.config.application_name,
				self.config.backup_skip_extensions.clone(), self.config.backup_skip_prefixes.clone(),
				self.config.io_chunk_size)
	}

	fn skip_dir_names(&self) -> HashSet<String>
	{
		[format!("{}_backup", self.config.application_name)].into_iter().collect()
	}

	fn fail(&mut self, err: UpdaterError) -> UpdaterError
	{
		self.last_error_code = Some(err.code());
		self.last_error_message = Some(err.to_string());
		err
	}

	/// The single public entry point: recover from any interrupted
	/// prior attempt, then run (at most) one fresh update pass.
	pub fn check_and_perform_ota(&mut self, events: &mut EventSink) -> Result<OtaOutcome, UpdaterError>
	{
		match state::load(&self.state_path()).unwrap_or_default() {
			UpdaterState::Installing => {
				self.revert_update()?;
				return Ok(OtaOutcome::RecoveredFromInterruption);
			}
			UpdaterState::ConfirmPending => return Ok(OtaOutcome::PendingConfirmation),
			UpdaterState::Idle => {}
		}

		if self.config.recurse_http_fs
		{
			self.run_http_fs(events)
		}
		else
		{
			self.run_manifest_mode(events)
		}
	}

	fn run_manifest_mode(&mut self, events: &mut EventSink) -> Result<OtaOutcome, UpdaterError>
	{
		let mode = Mode::Manifest;

		let remote = match self.fetch_and_verify_manifest()
		{
			Ok(m) => m,
			Err(e) => return Err(self.fail(e)),
		};

		let local = metadata::load_local(&self.local_manifest_path());

		if !remote.is_newer_than(&local, self.config.force_update)
		{
			events(Event::UpdateStart { mode });
			return Ok(OtaOutcome::NoChangesNeeded);
		}
		events(Event::UpdateStart { mode });

		if let Ok((free, total)) = self.free_space.free_space(&self.config.dest_dir)
		{
			if total > 0 && (free as f64) < 0.40 * (total as f64)
			{
				events(Event::LowDiskSpace { free_pct: 100.0 * free as f64 / total as f64 });
			}
		}

		let raw_plan = match diff::plan(&remote, &local, &self.config.dest_dir, &self.skip_dir_names())
		{
			Ok(p) => p,
			Err(e) => return Err(self.fail(UpdaterError::Apply(e.into()))),
		};

		let remote_ext = delete_policy::remote_extensions(remote.files.keys());
		let plan = self.filter_plan_deletes(raw_plan, &remote_ext);

		if let Err(e) = state::save(&self.state_path(), UpdaterState::Installing)
		{
			return Err(self.fail(UpdaterError::Apply(e.into())));
		}

		match self.apply_plan(&plan, &remote, events)
		{
			Ok(files_changed) => {
				if let Err(e) = metadata::save_local(&self.local_manifest_path(), &remote)
				{
					let _ = self.revert_update();
					return Err(self.fail(UpdaterError::Apply(e.into())));
				}

				if let Err(e) = state::save(&self.state_path(), UpdaterState::ConfirmPending)
				{
					let _ = self.revert_update();
					return Err(self.fail(UpdaterError::Apply(e.into())));
				}

				events(Event::UpdateApplied { mode });
				if files_changed > 0 { self.reboot_hook.reboot(); }

				Ok(OtaOutcome::Applied { mode, files_changed })
			}
			Err(e) => {
				let _ = self.revert_update();
				Err(self.fail(e))
			}
		}
	}

	fn filter_plan_deletes(&self, raw: Plan, remote_ext: &HashSet<String>) -> Plan
	{
		let (deletes, mut rest): (Vec<_>, Vec<_>) = raw.actions.into_iter()
				.partition(|a| matches!(a, Action::DeleteExtra { .. }));

		let filtered = delete_policy::filter_candidates(deletes,
				self.config.delete_files_not_in_manifest_policy,
				&self.config.delete_files_not_in_manifest_extensions, remote_ext, &self.config.dest_dir);

		rest.extend(filtered);
		Plan { actions: rest }
	}

	fn fetch_and_verify_manifest(&self) -> Result<Manifest, UpdaterError>
	{
		let downloader_agent = ureq::AgentBuilder::new().build();
		let response = downloader_agent.get(&self.config.manifest_url).call()
				.map_err(|e| UpdaterError::ManifestFetch(e.into()))?;

		use std::io::Read as _;
		let mut bytes = Vec::new();
		response.into_reader().take(64 * 1024 * 1024).read_to_end(&mut bytes)
				.map_err(|e| UpdaterError::ManifestFetch(e.into()))?;

		if let Some(key) = &self.config.manifest_auth_key
		{
			let value: serde_json::Value = serde_json::from_slice(&bytes)
					.map_err(|e| UpdaterError::ManifestFetch(e.into()))?;

			let signature = value.get(&self.config.manifest_signature_field)
					.and_then(|v| v.as_str())
					.ok_or_else(|| UpdaterError::ManifestFetch(
							anyhow::anyhow!("manifest has no {} field", self.config.manifest_signature_field)))?;

			let canonical = metadata::canonical::canonical_bytes(&value, &self.config.manifest_signature_field)
					.ok_or_else(|| UpdaterError::ManifestFetch(anyhow::anyhow!("manifest is not a JSON object")))?;

			crate::util::signature::verify(&canonical, key.as_bytes(), signature)
					.map_err(UpdaterError::ManifestSignatureInvalid)?;
		}

		metadata::parse_remote(&bytes).map_err(|e| UpdaterError::ManifestFetch(e.into()))
	}

	fn apply_plan(&self, plan: &Plan, remote: &Manifest, events: &mut EventSink)
			-> Result<usize, UpdaterError>
	{
		let backup = self.backup_manager();
		let downloads: Vec<_> = plan.downloads().collect();
		let total = downloads.len();
		let mut changed = 0;

		let downloader = Downloader::new(self.config.download_retries, self.config.retry_base_delay_ms,
				self.config.io_chunk_size, self.config.resume_downloads, self.config.http_timeout_s);

		for (index, action) in plan.actions.iter().enumerate()
		{
			match action {
				Action::Skip { path } => {
					events(Event::FileUpdateSkip { path: path.clone(), index, total: plan.actions.len() });
				}
				Action::Download { path, from_version, to_version, md5 } => {
					events(Event::FileUpdateStart {
						path: path.clone(), index, total,
						from: from_version.clone(), to: to_version.clone(),
					});

					backup.backup_before_mutate(path, &self.config.dest_dir)
							.map_err(|e| UpdaterError::Apply(e.into()))?;

					let dest = path_join(&self.config.dest_dir, path);
					if let Some(parent) = dest.parent() { let _ = std::fs::create_dir_all(parent); }

					let url = join_url(&self.config.base_file_url, path);
					downloader.fetch_to_path(&url, &dest, *md5, events)
							.map_err(|e| UpdaterError::Download { path: path.clone(), source: e })?;

					events(Event::FileUpdateDone {
						path: path.clone(), index, total,
						from: from_version.clone(), to: to_version.clone(),
					});
					changed += 1;
				}
				Action::DeleteExtra { .. } => {}
			}
		}

		for action in plan.deletes()
		{
			let Action::DeleteExtra { path } = action else { continue; };

			if let Err(e) = self.delete_one(&backup, path)
			{
				tracing::warn!(error = %e, path, "delete-extraneous failed, continuing");
				continue;
			}

			let policy_name = match self.config.delete_files_not_in_manifest_policy {
				DeletePolicy::Never => "never",
				DeletePolicy::ManifestExtensions => "manifest_extensions",
				DeletePolicy::CustomExtensions => "custom_extensions",
				DeletePolicy::All => "all",
			};
			events(Event::FileDeleteExtra { path: path.clone(), policy: policy_name.to_string() });
			changed += 1;
		}

		let _ = remote;
		Ok(changed)
	}

	fn delete_one(&self, backup: &BackupManager, path: &str) -> std::io::Result<()>
	{
		backup.backup_before_mutate(path, &self.config.dest_dir)
				.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
		let full = path_join(&self.config.dest_dir, path);
		if full.is_file() { std::fs::remove_file(full)?; }
		Ok(())
	}

	fn run_http_fs(&mut self, events: &mut EventSink) -> Result<OtaOutcome, UpdaterError>
	{
		let mode = Mode::HttpFs;
		events(Event::UpdateStart { mode });

		let base_url = url::Url::parse(&self.config.manifest_url)
				.map_err(|e| self.fail(UpdaterError::HttpFs(e.into())))?;

		let downloader = Downloader::new(self.config.download_retries, self.config.retry_base_delay_ms,
				self.config.io_chunk_size, self.config.resume_downloads, self.config.http_timeout_s);
		let agent = ureq::AgentBuilder::new().build();
		let crawler = HttpFsCrawler::new(agent, &downloader, self.config.dest_dir.clone(), self.config.strict_http_fs);

		if let Err(e) = state::save(&self.state_path(), UpdaterState::Installing)
		{
			return Err(self.fail(UpdaterError::Apply(e.into())));
		}

		match crawler.run(&base_url, events)
		{
			Ok(()) => {
				if let Err(e) = state::save(&self.state_path(), UpdaterState::ConfirmPending)
				{
					let _ = self.revert_update();
					return Err(self.fail(UpdaterError::Apply(e.into())));
				}
				events(Event::UpdateApplied { mode });
				self.reboot_hook.reboot();
				Ok(OtaOutcome::Applied { mode, files_changed: 0 })
			}
			Err(e) => {
				let _ = self.revert_update();
				Err(self.fail(UpdaterError::HttpFs(e.into())))
			}
		}
	}

	/// Restore every backed-up file, leave newly-created files in place
	/// (the documented safe default), set state `idle`, and reboot.
	pub fn revert_update(&mut self) -> Result<(), UpdaterError>
	{
		let backup = self.backup_manager();
		backup.restore_all(&self.config.dest_dir).map_err(|e| UpdaterError::Apply(e.into()))?;

		state::save(&self.state_path(), UpdaterState::Idle).map_err(|e| UpdaterError::Apply(e.into()))?;
		let _ = self.backup_manager().teardown(true);
		self.reboot_hook.reboot();
		Ok(())
	}

	/// Valid only when `confirm_pending`. Transitions to `idle`; when
	/// `cleanup`, also removes the backup directory best-effort.
	pub fn confirm_update(&mut self, cleanup: bool) -> bool
	{
		match state::load(&self.state_path()).unwrap_or_default() {
			UpdaterState::ConfirmPending => {}
			_ => return false,
		}

		if state::save(&self.state_path(), UpdaterState::Idle).is_err() { return false; }

		if cleanup
		{
			let _ = self.backup_manager().teardown(true);
		}

		true
	}

	/// Removes the backup directory. Returns `false` without acting if
	/// the state is `confirm_pending` (the caller must confirm first).
	pub fn cleanup_files(&mut self) -> bool
	{
		if state::load(&self.state_path()).unwrap_or_default() == UpdaterState::ConfirmPending
		{
			return false;
		}

		self.backup_manager().teardown(true).is_ok()
	}

	/// Best-effort teardown of any retained buffers. No durable effect
	/// -- all real state lives in the filesystem already.
	pub fn release(&mut self) {}
}

fn join_url(base: &str, rel_path: &str) -> String
{
	if base.ends_with('/') { format!("{base}{rel_path}") } else { format!("{base}/{rel_path}") }
}


#[cfg(test)]
mod tests
{
	use super::*;
	use crate::config::UpdaterConfigBuilder;

	struct FakeFreeSpace(u64, u64);
	impl FreeSpace for FakeFreeSpace
	{
		fn free_space(&self, _path: &Path) -> std::io::Result<(u64, u64)> { Ok((self.0, self.1)) }
	}

	fn test_config(dest: &Path) -> UpdaterConfig
	{
		UpdaterConfigBuilder::new()
				.dest_dir(dest)
				.manifest_url("http://127.0.0.1:1/manifest.json")
				.base_file_url("http://127.0.0.1:1/files")
				.build()
	}

	#[test]
	fn fresh_idle_confirm_update_is_noop_false()
	{
		let dir = tempfile::tempdir().unwrap();
		let mut u = Updater::with_collaborators(test_config(dir.path()), FakeFreeSpace(100, 100),
				RecordingRebootHook::default());
		assert!(!u.confirm_update(true));
	}

	#[test]
	fn confirm_update_transitions_confirm_pending_to_idle()
	{
		let dir = tempfile::tempdir().unwrap();
		let cfg = test_config(dir.path());
		state::save(&path_join(&cfg.dest_dir, &cfg.ota_state_file), UpdaterState::ConfirmPending).unwrap();

		let mut u = Updater::with_collaborators(cfg, FakeFreeSpace(100, 100), RecordingRebootHook::default());
		assert!(u.confirm_update(false));
		assert_eq!(state::load(&u.state_path()).unwrap(), UpdaterState::Idle);
	}

	#[test]
	fn cleanup_files_blocked_during_confirm_pending()
	{
		let dir = tempfile::tempdir().unwrap();
		let cfg = test_config(dir.path());
		state::save(&path_join(&cfg.dest_dir, &cfg.ota_state_file), UpdaterState::ConfirmPending).unwrap();

		let mut u = Updater::with_collaborators(cfg, FakeFreeSpace(100, 100), RecordingRebootHook::default());
		assert!(!u.cleanup_files());
	}

	#[test]
	fn revert_restores_backed_up_file_and_reboots()
	{
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.py"), b"print(1)\n").unwrap();

		let cfg = test_config(dir.path());
		let mut u = Updater::with_collaborators(cfg, FakeFreeSpace(100, 100), RecordingRebootHook::default());

		let backup = u.backup_manager();
		backup.backup_before_mutate("a.py", dir.path()).unwrap();
		std::fs::write(dir.path().join("a.py"), b"CORRUPT").unwrap();

		u.revert_update().unwrap();
		assert_eq!(std::fs::read(dir.path().join("a.py")).unwrap(), b"print(1)\n");
		assert_eq!(u.reboot_hook.calls.load(std::sync::atomic::Ordering::Relaxed), 1);
	}
}
