//! Filters `DeleteExtra` candidates per the configured policy.
use std::collections::HashSet;
use std::path::Path;

use crate::config::DeletePolicy;
use crate::core::diff::Action;

/// Apply the configured policy to a set of candidate `DeleteExtra`
/// actions, dropping the ones the policy doesn't keep.  `remote_extensions`
/// is the set of extensions actually present in the remote manifest,
/// needed for the `manifest_extensions` policy.
pub fn filter_candidates(candidates: Vec<Action>, policy: DeletePolicy,
		allowlist: &HashSet<String>, remote_extensions: &HashSet<String>,
		dest_dir: &Path) -> Vec<Action>
{
	let effective_policy = match policy {
		DeletePolicy::CustomExtensions | DeletePolicy::ManifestExtensions if allowlist.is_empty() => {
			tracing::warn!(?policy, "delete policy selected with an empty allowlist, degrading to never");
			DeletePolicy::Never
		}
		other => other,
	};

	candidates.into_iter()
			.filter(|action| {
				let Action::DeleteExtra { path } = action else { return true; };
				crate::core::diff::resolve_within(dest_dir, path).is_some()
						&& keep(path, effective_policy, allowlist, remote_extensions)
			})
			.collect()
}

fn keep(path: &str, policy: DeletePolicy, allowlist: &HashSet<String>,
		remote_extensions: &HashSet<String>) -> bool
{
	let ext = extension_of(path);

	match policy {
		DeletePolicy::Never => false,
		DeletePolicy::All => true,
		DeletePolicy::CustomExtensions => ext.map(|e| allowlist.contains(&e)).unwrap_or(false),
		DeletePolicy::ManifestExtensions => {
			ext.map(|e| allowlist.contains(&e) && remote_extensions.contains(&e)).unwrap_or(false)
		}
	}
}

fn extension_of(path: &str) -> Option<String>
{
	Path::new(path).extension().map(|e| format!(".{}", e.to_string_lossy()))
}

/// Extensions of every path in a remote manifest, for the
/// `manifest_extensions` policy.
pub fn remote_extensions(files: impl Iterator<Item = impl AsRef<str>>) -> HashSet<String>
{
	files.filter_map(|p| extension_of(p.as_ref())).collect()
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn extra(path: &str) -> Action { Action::DeleteExtra { path: path.to_string() } }

	#[test]
	fn never_drops_everything()
	{
		let dir = tempfile::tempdir().unwrap();
		let out = filter_candidates(vec![extra("old.py")], DeletePolicy::Never,
				&HashSet::new(), &HashSet::new(), dir.path());
		assert!(out.is_empty());
	}

	#[test]
	fn all_keeps_everything()
	{
		let dir = tempfile::tempdir().unwrap();
		let out = filter_candidates(vec![extra("old.py"), extra("data.raw")], DeletePolicy::All,
				&HashSet::new(), &HashSet::new(), dir.path());
		assert_eq!(out.len(), 2);
	}

	#[test]
	fn custom_extensions_empty_allowlist_degrades_to_never()
	{
		let dir = tempfile::tempdir().unwrap();
		let out = filter_candidates(vec![extra("old.py")], DeletePolicy::CustomExtensions,
				&HashSet::new(), &HashSet::new(), dir.path());
		assert!(out.is_empty());
	}

	#[test]
	fn custom_extensions_keeps_allowlisted_only()
	{
		let dir = tempfile::tempdir().unwrap();
		let allow: HashSet<String> = [".py".to_string()].into_iter().collect();
		let out = filter_candidates(vec![extra("old.py"), extra("data.raw")],
				DeletePolicy::CustomExtensions, &allow, &HashSet::new(), dir.path());
		assert_eq!(out, vec![extra("old.py")]);
	}

	#[test]
	fn manifest_extensions_requires_both_sets()
	{
		let dir = tempfile::tempdir().unwrap();
		let allow: HashSet<String> = [".py".to_string(), ".raw".to_string()].into_iter().collect();
		let remote_ext: HashSet<String> = [".py".to_string()].into_iter().collect();
		let out = filter_candidates(vec![extra("old.py"), extra("data.raw")],
				DeletePolicy::ManifestExtensions, &allow, &remote_ext, dir.path());
		assert_eq!(out, vec![extra("old.py")]);
	}

	#[test]
	fn escaping_path_dropped_regardless_of_policy()
	{
		let dir = tempfile::tempdir().unwrap();
		let out = filter_candidates(vec![extra("../escape.py")], DeletePolicy::All,
				&HashSet::new(), &HashSet::new(), dir.path());
		assert!(out.is_empty());
	}
}
