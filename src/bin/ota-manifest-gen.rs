//! Host-side tool: scan a source tree, hash every file, and emit the
//! wire-format manifest the device-side `ota-rustdate` binary consumes.
//! Optionally HMAC-SHA256 signs it with the same canonicalization the
//! device uses to verify, so host and device provably agree.
use std::path::{Path, PathBuf};

use clap::Parser;
use indexmap::IndexMap;

use ota_rustdate::metadata::canonical::canonical_bytes;
use ota_rustdate::metadata::{Manifest, ManifestEntry};
use ota_rustdate::util::hash::md5_file;
use ota_rustdate::util::signature;

/// Build an OTA manifest from a directory tree.
#[derive(Debug, Parser)]
#[command(version)]
struct Args
{
	/// Directory tree to scan.
	#[arg(short, long)]
	root: PathBuf,

	/// Version string to stamp on the manifest and every file entry.
	#[arg(short, long)]
	version: String,

	/// Where to write the manifest JSON.
	#[arg(short, long)]
	out: PathBuf,

	/// HMAC-SHA256 sign the manifest with this key.
	#[arg(long)]
	sign_key: Option<String>,

	/// Bytes per MD5 read, matching the device's `md5_chunk_size`.
	#[arg(long, default_value_t = 512)]
	md5_chunk_size: usize,
}

fn main() -> Result<(), anyhow::Error>
{
	tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.try_init()
			.ok();

	let args = Args::parse();

	let mut files = IndexMap::new();
	let mut rel_paths = Vec::new();
	walk(&args.root, &args.root, &mut rel_paths)?;
	rel_paths.sort();

	for rel in rel_paths
	{
		let full = args.root.join(&rel);
		let md5 = md5_file(&full, args.md5_chunk_size)?;

		tracing::info!(path = %rel, %md5, "hashed");
		files.insert(rel.clone(), ManifestEntry { path: rel, version: args.version.clone(), md5: Some(md5) });
	}

	let mut manifest = Manifest { version: args.version.clone(), files, signature: None };

	if let Some(key) = &args.sign_key
	{
		let value = serde_json::to_value(&manifest)?;
		let canonical = canonical_bytes(&value, "signature")
				.ok_or_else(|| anyhow::anyhow!("manifest serialized to a non-object"))?;
		manifest.signature = Some(signature::compute(&canonical, key.as_bytes())?);
	}

	ota_rustdate::metadata::save_local(&args.out, &manifest)?;
	println!("Wrote manifest with {} file(s) to {}", manifest.files.len(), args.out.display());

	Ok(())
}

/// Manual recursive walk, same rationale as the device side: these
/// trees aren't deep enough for `walkdir` to earn its keep.
fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), anyhow::Error>
{
	for entry in std::fs::read_dir(dir)?
	{
		let entry = entry?;
		let path = entry.path();
		let file_type = entry.file_type()?;

		if file_type.is_dir()
		{
			walk(root, &path, out)?;
		}
		else if file_type.is_file()
		{
			let rel = path.strip_prefix(root)?.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
			out.push(rel);
		}
	}

	Ok(())
}
