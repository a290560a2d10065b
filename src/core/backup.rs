//! Backup-before-mutate: the piece that makes revert possible.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::util::path_join;


/// Problems backing up or restoring files.
#[derive(Debug)]
#[derive(Error)]
pub enum BackupErr
{
	#[error("Backup I/O error on {path}: {source}")]
	IO { path: PathBuf, #[source] source: std::io::Error },
}

impl BackupErr
{
	fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self
	{ Self::IO { path: path.into(), source } }
}


/// Mirrors the relative layout of `dest_dir` into a separate directory,
/// so an interrupted or rejected apply can be undone by copying
/// everything back.
pub struct BackupManager
{
	backup_root: PathBuf,
	skip_extensions: HashSet<String>,
	skip_prefixes: Vec<String>,
	io_chunk_size: usize,
}

impl BackupManager
{
	pub fn new(dest_dir: &Path, application_name: &str,
			skip_extensions: HashSet<String>, skip_prefixes: Vec<String>,
			io_chunk_size: usize) -> Self
	{
		let backup_root = dest_dir.join(format!("{application_name}_backup"));
		Self { backup_root, skip_extensions, skip_prefixes, io_chunk_size: io_chunk_size.max(1) }
	}

	pub fn backup_root(&self) -> &Path { &self.backup_root }

	/// Should a file at `rel_path` be skipped from backup?  Skipped
	/// files are still mutated/removed -- they're just not copied
	/// aside first (large binary assets the application ships
	/// read-only, typically).
	pub fn should_skip(&self, rel_path: &str) -> bool
	{
		let ext_match = Path::new(rel_path).extension()
				.map(|e| format!(".{}", e.to_string_lossy()))
				.map(|e| self.skip_extensions.contains(&e))
				.unwrap_or(false);

		let prefix_match = self.skip_prefixes.iter().any(|p| rel_path.starts_with(p.as_str()));

		ext_match || prefix_match
	}

	/// Back up the file currently at `dest_dir/rel_path`, if it exists
	/// and isn't skipped, before the caller mutates or removes it.
	/// Returns the backup path on success, or `None` if nothing needed
	/// backing up (skip-listed, or there was no existing file to back
	/// up -- a pure add).
	pub fn backup_before_mutate(&self, rel_path: &str, dest_dir: &Path)
			-> Result<Option<PathBuf>, BackupErr>
	{
		if self.should_skip(rel_path) { return Ok(None); }

		let src = path_join(dest_dir, rel_path);
		if !src.is_file() { return Ok(None); }

		let dst = path_join(&self.backup_root, rel_path);
		if let Some(parent) = dst.parent()
		{
			std::fs::create_dir_all(parent).map_err(|e| BackupErr::io(&dst, e))?;
		}

		stream_copy(&src, &dst, self.io_chunk_size).map_err(|e| BackupErr::io(&src, e))?;
		Ok(Some(dst))
	}

	/// Restore every file found under the backup tree back to its
	/// mirrored path under `dest_dir`, overwriting.  Returns the list of
	/// restored relative paths.
	pub fn restore_all(&self, dest_dir: &Path) -> Result<Vec<PathBuf>, BackupErr>
	{
		let mut restored = Vec::new();
		if !self.backup_root.is_dir() { return Ok(restored); }

		walk_files(&self.backup_root, &mut |abs_path| {
			let rel = abs_path.strip_prefix(&self.backup_root)
					.expect("walked path is always under backup_root");
			let dst = path_join(dest_dir, rel);
			if let Some(parent) = dst.parent()
			{
				std::fs::create_dir_all(parent).map_err(|e| BackupErr::io(&dst, e))?;
			}
			stream_copy(abs_path, &dst, self.io_chunk_size).map_err(|e| BackupErr::io(abs_path, e))?;
			restored.push(rel.to_path_buf());
			Ok(())
		})?;

		Ok(restored)
	}

	/// Remove the backup directory.  When `best_effort`, I/O failures
	/// are logged and swallowed rather than propagated -- teardown
	/// happens after the application has already confirmed the update
	/// is good, so there's nothing useful left to roll back to.
	pub fn teardown(&self, best_effort: bool) -> Result<(), BackupErr>
	{
		if !self.backup_root.exists() { return Ok(()); }

		match std::fs::remove_dir_all(&self.backup_root) {
			Ok(()) => Ok(()),
			Err(e) if best_effort => {
				tracing::warn!(error = %e, path = %self.backup_root.display(),
						"best-effort backup teardown failed");
				Ok(())
			}
			Err(e) => Err(BackupErr::io(&self.backup_root, e)),
		}
	}
}


/// Copy `src` to `dst` in `chunk_size` pieces rather than a single
/// `fs::copy` -- whole-file reads are off the table on this target.
fn stream_copy(src: &Path, dst: &Path, chunk_size: usize) -> std::io::Result<()>
{
	use std::io::{Read, Write};

	let mut reader = std::fs::File::open(src)?;
	let mut writer = std::fs::File::create(dst)?;
	let mut buf = vec![0u8; chunk_size];

	loop {
		let n = reader.read(&mut buf)?;
		if n == 0 { break; }
		writer.write_all(&buf[..n])?;
	}
	writer.sync_all()?;
	Ok(())
}


/// Recursively visit every regular file under `root`, calling `f` with
/// its absolute path.  No external walk-dir dependency -- the trees here
/// are shallow mirrors of `dest_dir`, so plain recursive `read_dir` is
/// plenty.
fn walk_files(root: &Path, f: &mut impl FnMut(&Path) -> Result<(), BackupErr>)
		-> Result<(), BackupErr>
{
	let entries = std::fs::read_dir(root).map_err(|e| BackupErr::io(root, e))?;
	for entry in entries
	{
		let entry = entry.map_err(|e| BackupErr::io(root, e))?;
		let path = entry.path();
		let file_type = entry.file_type().map_err(|e| BackupErr::io(&path, e))?;

		if file_type.is_dir() { walk_files(&path, f)?; }
		else if file_type.is_file() { f(&path)?; }
	}
	Ok(())
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn mgr(dest: &Path) -> BackupManager
	{
		BackupManager::new(dest, "app",
				[".png".to_string()].into_iter().collect(),
				vec!["assets/".to_string()],
				4096)
	}

	#[test]
	fn skip_by_extension()
	{
		let dir = tempfile::tempdir().unwrap();
		let m = mgr(dir.path());
		assert!(m.should_skip("icon.png"));
		assert!(!m.should_skip("icon.jpg"));
	}

	#[test]
	fn skip_by_prefix()
	{
		let dir = tempfile::tempdir().unwrap();
		let m = mgr(dir.path());
		assert!(m.should_skip("assets/logo.svg"));
		assert!(!m.should_skip("src/assets.rs"));
	}

	#[test]
	fn backup_then_restore_roundtrips()
	{
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path();
		std::fs::write(dest.join("a.py"), b"print(1)\n").unwrap();

		let m = mgr(dest);
		let backed = m.backup_before_mutate("a.py", dest).unwrap();
		assert!(backed.is_some());

		std::fs::write(dest.join("a.py"), b"CORRUPTED").unwrap();

		let restored = m.restore_all(dest).unwrap();
		assert_eq!(restored, vec![PathBuf::from("a.py")]);
		assert_eq!(std::fs::read(dest.join("a.py")).unwrap(), b"print(1)\n");
	}

	#[test]
	fn no_backup_for_new_file()
	{
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path();
		let m = mgr(dest);
		let backed = m.backup_before_mutate("new.py", dest).unwrap();
		assert!(backed.is_none());
	}

	#[test]
	fn teardown_removes_backup_dir()
	{
		let dir = tempfile::tempdir().unwrap();
		let dest = dir.path();
		std::fs::write(dest.join("a.py"), b"hi").unwrap();
		let m = mgr(dest);
		m.backup_before_mutate("a.py", dest).unwrap();
		assert!(m.backup_root().is_dir());
		m.teardown(false).unwrap();
		assert!(!m.backup_root().exists());
	}

	#[test]
	fn teardown_best_effort_on_missing_dir()
	{
		let dir = tempfile::tempdir().unwrap();
		let m = mgr(dir.path());
		m.teardown(true).unwrap();
	}
}
