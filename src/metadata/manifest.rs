//! The manifest: the remote (or local, last-applied) record of what
//! files should exist and what they should contain.
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

use crate::util::hash::Md5Hash;
use crate::util::is_contained_relative_path;


/// One file entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry
{
	pub path: String,
	pub version: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub md5: Option<Md5Hash>,
}


/// A manifest: a version tag plus the set of files it describes, in
/// wire order (order matters -- the diff planner iterates `files` in
/// manifest serialization order), plus an optional HMAC-SHA256
/// signature over the canonicalized document.
#[derive(Debug, Clone, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Manifest
{
	pub version: String,
	pub files: IndexMap<String, ManifestEntry>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
}

impl Manifest
{
	/// An empty manifest: version `""`, no files.  This is what a
	/// missing or corrupt local manifest parses as -- never an error,
	/// per the spec's "first run" / "tolerate a missing local manifest"
	/// behavior.
	pub fn empty() -> Self
	{
		Self { version: String::new(), files: IndexMap::new(), signature: None }
	}

	/// Is `self` "newer" than `other`?  Per the documented decision:
	/// any inequality of `version` counts as newer, `force` makes
	/// equal versions count as newer too.
	pub fn is_newer_than(&self, other: &Manifest, force: bool) -> bool
	{
		if self.version != other.version { return true; }
		force
	}

	/// Validate every entry's path is a contained relative path -- no
	/// absolute paths, no `..` escapes.  Called right after parse,
	/// before the manifest is trusted for diffing or application.
	pub fn validate_paths(&self) -> Result<(), ManifestErr>
	{
		for (key, entry) in &self.files
		{
			if !is_contained_relative_path(key) || !is_contained_relative_path(&entry.path)
			{
				return Err(ManifestErr::BadPath(key.clone()));
			}
		}
		Ok(())
	}
}


/// Problems loading, saving, or parsing a manifest.
#[derive(Debug)]
#[derive(Error)]
pub enum ManifestErr
{
	#[error("Manifest I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error("Manifest parse error: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Manifest entry path escapes destination root: {0}")]
	BadPath(String),
}


/// Load the local (last-applied) manifest from `path`.  A missing file
/// or a parse error both return an empty manifest -- this path is never
/// fatal, the orchestrator just treats it as "nothing installed yet".
pub fn load_local(path: &Path) -> Manifest
{
	let Ok(raw) = std::fs::read_to_string(path) else { return Manifest::empty(); };
	match serde_json::from_str(&raw) {
		Ok(m) => m,
		Err(e) => {
			tracing::warn!(error = %e, path = %path.display(),
					"local manifest failed to parse, treating as empty");
			Manifest::empty()
		}
	}
}


/// Persist `manifest` to `path` atomically (write-to-temp + rename).
pub fn save_local(path: &Path, manifest: &Manifest) -> Result<(), ManifestErr>
{
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	let body = serde_json::to_vec(manifest)?;

	let mut tmp = tempfile::Builder::new().tempfile_in(dir)?;
	{
		use std::io::Write as _;
		tmp.write_all(&body)?;
		tmp.as_file().sync_all()?;
	}
	tmp.persist(path).map_err(|e| e.error)?;
	Ok(())
}


/// Parse a remote manifest's raw bytes into a `Manifest`, validating
/// path containment.  Does not check the signature -- that's
/// `util::signature::verify` against `metadata::canonical`, done by the
/// caller before (or after, depending on policy) this parse.
pub fn parse_remote(bytes: &[u8]) -> Result<Manifest, ManifestErr>
{
	let m: Manifest = serde_json::from_slice(bytes)?;
	m.validate_paths()?;
	Ok(m)
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn sample_bytes() -> Vec<u8>
	{
		br#"{"version":"1","files":{"a.py":{"path":"a.py","version":"v1","md5":"6f7d6765a5cde81dd6a57bbbf8ef1f56"}}}"#.to_vec()
	}

	#[test]
	fn parses_wire_format()
	{
		let m = parse_remote(&sample_bytes()).unwrap();
		assert_eq!(m.version, "1");
		assert_eq!(m.files.len(), 1);
		assert_eq!(m.files["a.py"].version, "v1");
	}

	#[test]
	fn rejects_escaping_path()
	{
		let bad = br#"{"version":"1","files":{"../etc/passwd":{"path":"../etc/passwd","version":"v1"}}}"#;
		let err = parse_remote(bad).unwrap_err();
		assert!(matches!(err, ManifestErr::BadPath(_)));
	}

	#[test]
	fn unknown_fields_ignored()
	{
		let bytes = br#"{"version":"1","files":{},"wat":"???"}"#;
		let m = parse_remote(bytes).unwrap();
		assert_eq!(m.version, "1");
	}

	#[test]
	fn preserves_file_order()
	{
		let bytes = br#"{"version":"1","files":{"z.py":{"path":"z.py","version":"1"},"a.py":{"path":"a.py","version":"1"}}}"#;
		let m = parse_remote(bytes).unwrap();
		let keys: Vec<_> = m.files.keys().collect();
		assert_eq!(keys, vec!["z.py", "a.py"]);
	}

	#[test]
	fn missing_local_manifest_is_empty()
	{
		let dir = tempfile::tempdir().unwrap();
		let m = load_local(&dir.path().join("versions.json"));
		assert_eq!(m.version, "");
		assert!(m.files.is_empty());
	}

	#[test]
	fn save_then_load_roundtrips()
	{
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("versions.json");

		let mut m = Manifest::empty();
		m.version = "3".to_string();
		m.files.insert("a.py".to_string(), ManifestEntry {
			path: "a.py".to_string(), version: "v1".to_string(), md5: None,
		});

		save_local(&path, &m).unwrap();
		let got = load_local(&path);
		assert_eq!(got.version, "3");
		assert_eq!(got.files["a.py"].version, "v1");
	}

	#[test]
	fn is_newer_any_inequality()
	{
		let mut a = Manifest::empty();
		a.version = "2".to_string();
		let mut b = Manifest::empty();
		b.version = "1".to_string();
		assert!(a.is_newer_than(&b, false));
		assert!(b.is_newer_than(&a, false));
	}

	#[test]
	fn equal_versions_need_force()
	{
		let mut a = Manifest::empty();
		a.version = "1".to_string();
		let b = a.clone();
		assert!(!a.is_newer_than(&b, false));
		assert!(a.is_newer_than(&b, true));
	}
}
