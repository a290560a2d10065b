//! Updater configuration: the options recognized on updater construction
//! (spec calls these "construction-time options" rather than a config
//! file format, so unlike the teacher's line-oriented `.conf` parser,
//! this loads from a `serde_json::Value` -- or gets built up directly in
//! Rust code via `UpdaterConfigBuilder`).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use thiserror::Error;


/// How to handle local files that exist under `dest_dir` but aren't
/// named in the remote manifest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy
{
	#[default]
	Never,
	ManifestExtensions,
	CustomExtensions,
	All,
}


#[derive(Debug)]
#[derive(derivative::Derivative)]
#[derivative(Default)]
pub struct UpdaterConfig
{
	/// Remote manifest location.
	pub manifest_url: String,

	/// Prefix for per-file GETs.
	pub base_file_url: String,

	/// Root for applied files.
	pub dest_dir: PathBuf,

	/// Apply even when versions match.
	pub force_update: bool,

	/// Select HTTP-FS mode instead of manifest mode.
	pub recurse_http_fs: bool,

	/// State marker path.
	#[derivative(Default(value = "\"ota_state.txt\".into()"))]
	pub ota_state_file: PathBuf,

	/// Local manifest path (last successfully applied).
	#[derivative(Default(value = "\"versions.json\".into()"))]
	pub local_manifest_file: PathBuf,

	/// Derives the backup dir name (`<application_name>_backup/`).
	#[derivative(Default(value = "\"ota-rustdate\".into()"))]
	pub application_name: String,

	/// Per-request HTTP timeout; unset disables.
	pub http_timeout_s: Option<u64>,

	/// Extensions excluded from backup.
	#[derivative(Default(value = "default_backup_skip_extensions()"))]
	pub backup_skip_extensions: HashSet<String>,

	/// Path prefixes excluded from backup.
	#[derivative(Default(value = "default_backup_skip_prefixes()"))]
	pub backup_skip_prefixes: Vec<String>,

	/// HMAC shared secret.  `None` disables signature verification
	/// entirely (a manifest's `signature` field, if present, is then
	/// ignored rather than checked).
	pub manifest_auth_key: Option<String>,

	/// Signature field name within the manifest's top-level object.
	#[derivative(Default(value = "\"signature\".into()"))]
	pub manifest_signature_field: String,

	/// Retry count after first failure.
	#[derivative(Default(value = "3"))]
	pub download_retries: u32,

	/// Exponential backoff base, in milliseconds.
	#[derivative(Default(value = "500"))]
	pub retry_base_delay_ms: u64,

	/// Enable `.part` + Range resume.
	#[derivative(Default(value = "true"))]
	pub resume_downloads: bool,

	/// Copy/download chunk size, in bytes.
	#[derivative(Default(value = "crate::util::DEFAULT_IO_CHUNK_SIZE"))]
	pub io_chunk_size: usize,

	/// Hashing chunk size, in bytes.
	#[derivative(Default(value = "512"))]
	pub md5_chunk_size: usize,

	/// Abort on any HTTP-FS file failure.
	pub strict_http_fs: bool,

	/// Delete-extras policy.
	pub delete_files_not_in_manifest_policy: DeletePolicy,

	/// Allowlist for extension-scoped delete policies.
	pub delete_files_not_in_manifest_extensions: HashSet<String>,

	/// Unrecognized options, accepted and ignored for forward
	/// compatibility (spec: "Unknown options MUST be accepted and
	/// ignored").
	pub unknown: HashMap<String, serde_json::Value>,
}


fn default_backup_skip_extensions() -> HashSet<String>
{
	[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".rgb565", ".raw", ".bin", ".ttf", ".otf", ".woff"]
			.into_iter().map(String::from).collect()
}

fn default_backup_skip_prefixes() -> Vec<String>
{
	["assets/", "static/", "media/", "images/", "fonts/"].into_iter().map(String::from).collect()
}


/// Problems loading configuration.
#[derive(Debug)]
#[derive(Error)]
pub enum ConfigErr
{
	#[error("Config I/O error: {0}")]
	IO(#[from] std::io::Error),

	#[error("Config parse error: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Config field '{0}' has the wrong type")]
	BadField(String),
}


impl UpdaterConfig
{
	/// Load config from a JSON object's bytes.  Fields not in the
	/// schema above are stashed in `unknown` rather than rejected.
	pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigErr>
	{
		let value: serde_json::Value = serde_json::from_slice(bytes)?;
		Self::from_value(value)
	}

	fn from_value(value: serde_json::Value) -> Result<Self, ConfigErr>
	{
		let obj = value.as_object().ok_or_else(|| ConfigErr::BadField("<root>".to_string()))?;
		let mut cfg = UpdaterConfigBuilder::new();

		for (key, val) in obj
		{
			macro_rules! str_field {
				($setter:ident) => {{
					let s = val.as_str().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.$setter(s);
					continue;
				}};
			}
			macro_rules! bool_field {
				($setter:ident) => {{
					let b = val.as_bool().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.$setter(b);
					continue;
				}};
			}

			match key.as_str() {
				"manifest_url" => str_field!(manifest_url),
				"base_file_url" => str_field!(base_file_url),
				"dest_dir" => str_field!(dest_dir),
				"force_update" => bool_field!(force_update),
				"recurse_http_fs" => bool_field!(recurse_http_fs),
				"ota_state_file" => str_field!(ota_state_file),
				"local_manifest_file" => str_field!(local_manifest_file),
				"application_name" => str_field!(application_name),
				"http_timeout_s" => {
					cfg = cfg.http_timeout_s(val.as_u64());
				}
				"backup_skip_extensions" => {
					let items = val.as_array().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					let set = items.iter()
							.filter_map(|v| v.as_str().map(String::from))
							.collect();
					cfg = cfg.backup_skip_extensions(set);
				}
				"backup_skip_prefixes" => {
					let items = val.as_array().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					let list = items.iter()
							.filter_map(|v| v.as_str().map(String::from))
							.collect();
					cfg = cfg.backup_skip_prefixes(list);
				}
				"manifest_auth_key" => {
					cfg = cfg.manifest_auth_key(val.as_str().map(String::from));
				}
				"manifest_signature_field" => str_field!(manifest_signature_field),
				"download_retries" => {
					let n = val.as_u64().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.download_retries(n as u32);
				}
				"retry_base_delay_ms" => {
					let n = val.as_u64().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.retry_base_delay_ms(n);
				}
				"resume_downloads" => bool_field!(resume_downloads),
				"io_chunk_size" => {
					let n = val.as_u64().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.io_chunk_size(n as usize);
				}
				"md5_chunk_size" => {
					let n = val.as_u64().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					cfg = cfg.md5_chunk_size(n as usize);
				}
				"strict_http_fs" => bool_field!(strict_http_fs),
				"delete_files_not_in_manifest_policy" => {
					let s = val.as_str().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					let policy = match s {
						"never" => DeletePolicy::Never,
						"manifest_extensions" => DeletePolicy::ManifestExtensions,
						"custom_extensions" => DeletePolicy::CustomExtensions,
						"all" => DeletePolicy::All,
						_ => return Err(ConfigErr::BadField(key.clone())),
					};
					cfg = cfg.delete_files_not_in_manifest_policy(policy);
				}
				"delete_files_not_in_manifest_extensions" => {
					let items = val.as_array().ok_or_else(|| ConfigErr::BadField(key.clone()))?;
					let set = items.iter()
							.filter_map(|v| v.as_str().map(String::from))
							.collect();
					cfg = cfg.delete_files_not_in_manifest_extensions(set);
				}
				_ => {
					cfg.unknown.insert(key.clone(), val.clone());
				}
			}
		}

		Ok(cfg.build())
	}
}


/// Builder for constructing an `UpdaterConfig` directly from Rust code
/// (used by host-side tools and tests, where going through JSON would
/// just be extra ceremony).
#[derive(Debug, Default)]
pub struct UpdaterConfigBuilder
{
	inner: UpdaterConfig,
}

impl UpdaterConfigBuilder
{
	pub fn new() -> Self { Self { inner: UpdaterConfig::default() } }

	pub fn build(self) -> UpdaterConfig { self.inner }

	pub fn manifest_url(mut self, v: impl Into<String>) -> Self
	{ self.inner.manifest_url = v.into(); self }

	pub fn base_file_url(mut self, v: impl Into<String>) -> Self
	{ self.inner.base_file_url = v.into(); self }

	pub fn dest_dir(mut self, v: impl Into<PathBuf>) -> Self
	{ self.inner.dest_dir = v.into(); self }

	pub fn force_update(mut self, v: bool) -> Self
	{ self.inner.force_update = v; self }

	pub fn recurse_http_fs(mut self, v: bool) -> Self
	{ self.inner.recurse_http_fs = v; self }

	pub fn ota_state_file(mut self, v: impl Into<PathBuf>) -> Self
	{ self.inner.ota_state_file = v.into(); self }

	pub fn local_manifest_file(mut self, v: impl Into<PathBuf>) -> Self
	{ self.inner.local_manifest_file = v.into(); self }

	pub fn application_name(mut self, v: impl Into<String>) -> Self
	{ self.inner.application_name = v.into(); self }

	pub fn http_timeout_s(mut self, v: Option<u64>) -> Self
	{ self.inner.http_timeout_s = v; self }

	pub fn backup_skip_extensions(mut self, v: HashSet<String>) -> Self
	{ self.inner.backup_skip_extensions = v; self }

	pub fn backup_skip_prefixes(mut self, v: Vec<String>) -> Self
	{ self.inner.backup_skip_prefixes = v; self }

	pub fn manifest_auth_key(mut self, v: Option<String>) -> Self
	{ self.inner.manifest_auth_key = v; self }

	pub fn manifest_signature_field(mut self, v: impl Into<String>) -> Self
	{ self.inner.manifest_signature_field = v.into(); self }

	pub fn download_retries(mut self, v: u32) -> Self
	{ self.inner.download_retries = v; self }

	pub fn retry_base_delay_ms(mut self, v: u64) -> Self
	{ self.inner.retry_base_delay_ms = v; self }

	pub fn resume_downloads(mut self, v: bool) -> Self
	{ self.inner.resume_downloads = v; self }

	pub fn io_chunk_size(mut self, v: usize) -> Self
	{ self.inner.io_chunk_size = v; self }

	pub fn md5_chunk_size(mut self, v: usize) -> Self
	{ self.inner.md5_chunk_size = v; self }

	pub fn strict_http_fs(mut self, v: bool) -> Self
	{ self.inner.strict_http_fs = v; self }

	pub fn delete_files_not_in_manifest_policy(mut self, v: DeletePolicy) -> Self
	{ self.inner.delete_files_not_in_manifest_policy = v; self }

	pub fn delete_files_not_in_manifest_extensions(mut self, v: HashSet<String>) -> Self
	{ self.inner.delete_files_not_in_manifest_extensions = v; self }
}

impl std::ops::Deref for UpdaterConfigBuilder
{
	type Target = UpdaterConfig;
	fn deref(&self) -> &Self::Target { &self.inner }
}

impl std::ops::DerefMut for UpdaterConfigBuilder
{
	fn deref_mut(&mut self) -> &mut Self::Target { &mut self.inner }
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn defaults()
	{
		let c = UpdaterConfig::default();
		assert_eq!(c.ota_state_file, PathBuf::from("ota_state.txt"));
		assert_eq!(c.local_manifest_file, PathBuf::from("versions.json"));
		assert_eq!(c.manifest_signature_field, "signature");
		assert_eq!(c.download_retries, 3);
		assert_eq!(c.delete_files_not_in_manifest_policy, DeletePolicy::Never);
		assert!(c.backup_skip_extensions.contains(".png"));
		assert!(c.backup_skip_prefixes.contains(&"assets/".to_string()));
	}

	#[test]
	fn from_json_overrides_defaults()
	{
		let json = br#"{"manifest_url":"https://example.com/m.json","download_retries":7,
				"delete_files_not_in_manifest_policy":"all"}"#;
		let c = UpdaterConfig::from_json(json).unwrap();
		assert_eq!(c.manifest_url, "https://example.com/m.json");
		assert_eq!(c.download_retries, 7);
		assert_eq!(c.delete_files_not_in_manifest_policy, DeletePolicy::All);
	}

	#[test]
	fn from_json_stashes_unknown_fields()
	{
		let json = br#"{"totally_made_up_option": 42}"#;
		let c = UpdaterConfig::from_json(json).unwrap();
		assert_eq!(c.unknown.get("totally_made_up_option"), Some(&serde_json::json!(42)));
	}

	#[test]
	fn builder_roundtrip()
	{
		let c = UpdaterConfigBuilder::new()
				.dest_dir("/srv/app")
				.download_retries(5)
				.build();
		assert_eq!(c.dest_dir, PathBuf::from("/srv/app"));
		assert_eq!(c.download_retries, 5);
	}
}
