//! Diffing a local manifest against a remote one into an ordered plan of
//! downloads, skips, and candidate deletions.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::metadata::Manifest;
use crate::util::hash::Md5Hash;
use crate::util::{is_contained_relative_path, path_join};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action
{
	Download { path: String, from_version: Option<String>, to_version: String, md5: Option<Md5Hash> },
	Skip { path: String },
	DeleteExtra { path: String },
}

#[derive(Debug, Clone, Default)]
pub struct Plan
{
	pub actions: Vec<Action>,
}

impl Plan
{
	pub fn downloads(&self) -> impl Iterator<Item = &Action>
	{ self.actions.iter().filter(|a| matches!(a, Action::Download { .. })) }

	pub fn deletes(&self) -> impl Iterator<Item = &Action>
	{ self.actions.iter().filter(|a| matches!(a, Action::DeleteExtra { .. })) }
}


#[derive(Debug)]
#[derive(Error)]
pub enum PlanErr
{
	#[error("Walking {path}: {source}")]
	Walk { path: PathBuf, #[source] source: std::io::Error },
}


/// Build a `Plan` from `remote` against `local`, scanning `dest_dir` for
/// files not named in `remote` to feed to the delete-extras policy
/// (applied by the caller via `crate::core::delete_policy`).
///
/// Candidate deletions are gathered but *not yet filtered* by policy --
/// that's a separate step so this function stays testable independent
/// of any particular policy.
pub fn plan(remote: &Manifest, local: &Manifest, dest_dir: &Path,
		skip_dir_names: &HashSet<String>) -> Result<Plan, PlanErr>
{
	let mut actions = Vec::with_capacity(remote.files.len());

	for (path, entry) in &remote.files
	{
		match local.files.get(path) {
			Some(local_entry) if local_entry.version == entry.version => {
				actions.push(Action::Skip { path: path.clone() });
			}
			Some(local_entry) => {
				if entry.md5.is_none()
				{
					tracing::warn!(path, "manifest entry has no md5, skipping hash validation for this file");
				}
				actions.push(Action::Download {
					path: path.clone(),
					from_version: Some(local_entry.version.clone()),
					to_version: entry.version.clone(),
					md5: entry.md5,
				});
			}
			None => {
				if entry.md5.is_none()
				{
					tracing::warn!(path, "manifest entry has no md5, skipping hash validation for this file");
				}
				actions.push(Action::Download {
					path: path.clone(),
					from_version: None,
					to_version: entry.version.clone(),
					md5: entry.md5,
				});
			}
		}
	}

	let candidates = candidate_deletions(remote, dest_dir, skip_dir_names)?;
	for path in candidates
	{
		actions.push(Action::DeleteExtra { path });
	}

	Ok(Plan { actions })
}


/// Every relative path under `dest_dir` that isn't a key of
/// `remote.files`, excluding directory names in `skip_dir_names` (the
/// backup directory, primarily).
fn candidate_deletions(remote: &Manifest, dest_dir: &Path, skip_dir_names: &HashSet<String>)
		-> Result<Vec<String>, PlanErr>
{
	let mut found = Vec::new();
	if dest_dir.is_dir()
	{
		walk_relative(dest_dir, dest_dir, skip_dir_names, &mut found)?;
	}

	let extras = found.into_iter()
			.filter(|rel| !remote.files.contains_key(rel))
			.filter(|rel| is_contained_relative_path(rel))
			.collect();

	Ok(extras)
}

fn walk_relative(root: &Path, dir: &Path, skip_dir_names: &HashSet<String>, out: &mut Vec<String>)
		-> Result<(), PlanErr>
{
	let entries = std::fs::read_dir(dir).map_err(|e| PlanErr::Walk { path: dir.to_path_buf(), source: e })?;

	for entry in entries
	{
		let entry = entry.map_err(|e| PlanErr::Walk { path: dir.to_path_buf(), source: e })?;
		let path = entry.path();
		let name = entry.file_name();
		let name = name.to_string_lossy();

		let file_type = entry.file_type().map_err(|e| PlanErr::Walk { path: path.clone(), source: e })?;

		if file_type.is_dir()
		{
			if skip_dir_names.contains(name.as_ref()) { continue; }
			walk_relative(root, &path, skip_dir_names, out)?;
		}
		else if file_type.is_file()
		{
			if let Ok(rel) = path.strip_prefix(root)
			{
				out.push(rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
			}
		}
	}

	Ok(())
}


/// Path-containment belt-and-suspenders: even though `candidate_deletions`
/// only ever walks inside `dest_dir`, defensively re-check before acting.
pub fn resolve_within(dest_dir: &Path, rel: &str) -> Option<PathBuf>
{
	if !is_contained_relative_path(rel) { return None; }
	Some(path_join(dest_dir, rel))
}


#[cfg(test)]
mod tests
{
	use super::*;
	use crate::metadata::ManifestEntry;

	fn entry(version: &str) -> ManifestEntry
	{ ManifestEntry { path: "x".to_string(), version: version.to_string(), md5: None } }

	fn manifest(pairs: &[(&str, &str)]) -> Manifest
	{
		let mut m = Manifest::empty();
		m.version = "1".to_string();
		for (p, v) in pairs { m.files.insert(p.to_string(), entry(v)); }
		m
	}

	#[test]
	fn new_file_is_download_with_no_from_version()
	{
		let dir = tempfile::tempdir().unwrap();
		let remote = manifest(&[("a.py", "v1")]);
		let local = Manifest::empty();
		let skip = HashSet::new();

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		assert_eq!(p.actions.len(), 1);
		match &p.actions[0] {
			Action::Download { path, from_version, to_version, .. } => {
				assert_eq!(path, "a.py");
				assert_eq!(*from_version, None);
				assert_eq!(to_version, "v1");
			}
			other => panic!("expected Download, got {other:?}"),
		}
	}

	#[test]
	fn same_version_is_skip()
	{
		let dir = tempfile::tempdir().unwrap();
		let remote = manifest(&[("a.py", "v1")]);
		let local = manifest(&[("a.py", "v1")]);
		let skip = HashSet::new();

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		assert_eq!(p.actions, vec![Action::Skip { path: "a.py".to_string() }]);
	}

	#[test]
	fn changed_version_is_download_with_from_version()
	{
		let dir = tempfile::tempdir().unwrap();
		let remote = manifest(&[("a.py", "v2")]);
		let local = manifest(&[("a.py", "v1")]);
		let skip = HashSet::new();

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		match &p.actions[0] {
			Action::Download { from_version, to_version, .. } => {
				assert_eq!(*from_version, Some("v1".to_string()));
				assert_eq!(to_version, "v2");
			}
			other => panic!("expected Download, got {other:?}"),
		}
	}

	#[test]
	fn extraneous_file_becomes_delete_candidate()
	{
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("old.py"), b"x").unwrap();

		let remote = manifest(&[("a.py", "v1")]);
		let local = Manifest::empty();
		let skip = HashSet::new();

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		let deletes: Vec<_> = p.deletes().collect();
		assert_eq!(deletes, vec![&Action::DeleteExtra { path: "old.py".to_string() }]);
	}

	#[test]
	fn downloads_and_skips_precede_deletes()
	{
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("old.py"), b"x").unwrap();

		let remote = manifest(&[("a.py", "v1")]);
		let local = Manifest::empty();
		let skip = HashSet::new();

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		let last_non_delete = p.actions.iter()
				.rposition(|a| !matches!(a, Action::DeleteExtra { .. }));
		let first_delete = p.actions.iter().position(|a| matches!(a, Action::DeleteExtra { .. }));
		if let (Some(last), Some(first)) = (last_non_delete, first_delete)
		{
			assert!(last < first, "all downloads/skips must precede deletes");
		}
	}

	#[test]
	fn backup_dir_excluded_from_candidates()
	{
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("app_backup")).unwrap();
		std::fs::write(dir.path().join("app_backup").join("old.py"), b"x").unwrap();

		let remote = Manifest::empty();
		let local = Manifest::empty();
		let mut skip = HashSet::new();
		skip.insert("app_backup".to_string());

		let p = plan(&remote, &local, dir.path(), &skip).unwrap();
		assert!(p.deletes().next().is_none());
	}
}
