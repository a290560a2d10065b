//! The event/error vocabulary the orchestrator publishes, and the error
//! taxonomy callers are meant to branch on.
use std::fmt;

use thiserror::Error;

use crate::util::hash::Md5Hash;


/// Which pipeline produced an update: the manifest-driven diff/download
/// path, or the HTTP-FS recursive crawl.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode { Manifest, HttpFs }

impl fmt::Display for Mode
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match self {
			Self::Manifest => write!(f, "manifest"),
			Self::HttpFs => write!(f, "http_fs"),
		}
	}
}


/// One event published through the updater's event sink.  Every variant
/// here corresponds exactly to one event name from the wire vocabulary;
/// callers that want structured telemetry match on this instead of
/// scraping log lines.
#[derive(Debug, Clone)]
pub enum Event
{
	UpdateStart { mode: Mode },
	UpdateApplied { mode: Mode },

	FileUpdateStart { path: String, index: usize, total: usize, from: Option<String>, to: String },
	FileUpdateDone { path: String, index: usize, total: usize, from: Option<String>, to: String },
	FileUpdateSkip { path: String, index: usize, total: usize },
	FileUpdateFailed { path: String, mode: Mode, error: String },

	DownloadAttempt { url: String, path: String, attempt: u32, attempts: u32 },
	DownloadRetry { url: String, path: String, attempt: u32, wait_ms: u64 },

	FileDeleteExtra { path: String, policy: String },

	/// Non-fatal: free space below the configured threshold.
	LowDiskSpace { free_pct: f64 },
}


/// The seven terminal error codes a caller can branch on.  `Display`
/// gives the exact snake_case wire string -- tests assert against that,
/// not just the variant name, since callers are told to rely on the
/// code string rather than `Debug` formatting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode
{
	ManifestFetchFailed,
	ManifestSignatureInvalid,
	DownloadFailed,
	Md5Mismatch,
	ApplyFailed,
	HttpFsFailed,
	DeleteExtraneousFailed,
}

impl fmt::Display for ErrorCode
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		let s = match self {
			Self::ManifestFetchFailed => "manifest_fetch_failed",
			Self::ManifestSignatureInvalid => "manifest_signature_invalid",
			Self::DownloadFailed => "download_failed",
			Self::Md5Mismatch => "md5_mismatch",
			Self::ApplyFailed => "apply_failed",
			Self::HttpFsFailed => "http_fs_failed",
			Self::DeleteExtraneousFailed => "delete_extraneous_failed",
		};
		write!(f, "{s}")
	}
}


/// Top-level error threading through `check_and_perform_ota`.  Every
/// leaf error type in the crate maps into one of these, and each variant
/// knows its own `ErrorCode`.
#[derive(Debug)]
#[derive(Error)]
pub enum UpdaterError
{
	#[error("Fetching remote manifest: {0}")]
	ManifestFetch(#[source] anyhow::Error),

	#[error("Manifest signature invalid")]
	ManifestSignatureInvalid(#[source] crate::util::signature::SignatureErr),

	#[error("Downloading {path}: {source}")]
	Download { path: String, #[source] source: crate::core::downloader::DownloadErr },

	#[error("MD5 mismatch for {path}: expected {expected}, got {actual}")]
	Md5Mismatch { path: String, expected: Md5Hash, actual: Md5Hash },

	#[error("Applying update: {0}")]
	Apply(#[source] anyhow::Error),

	#[error("HTTP-FS crawl failed: {0}")]
	HttpFs(#[source] anyhow::Error),

	#[error("Deleting extraneous files: {0}")]
	DeleteExtraneous(#[source] anyhow::Error),
}

impl UpdaterError
{
	pub fn code(&self) -> ErrorCode
	{
		match self {
			Self::ManifestFetch(_) => ErrorCode::ManifestFetchFailed,
			Self::ManifestSignatureInvalid(_) => ErrorCode::ManifestSignatureInvalid,
			Self::Download { .. } => ErrorCode::DownloadFailed,
			Self::Md5Mismatch { .. } => ErrorCode::Md5Mismatch,
			Self::Apply(_) => ErrorCode::ApplyFailed,
			Self::HttpFs(_) => ErrorCode::HttpFsFailed,
			Self::DeleteExtraneous(_) => ErrorCode::DeleteExtraneousFailed,
		}
	}
}


/// An opaque sink for `Event`s.  A `Box<dyn FnMut(Event)>` rather than a
/// trait object over a named trait -- the spec's "opaque callback"
/// re-architects directly to a closure, and a no-op default is just an
/// empty closure.
pub type EventSink<'a> = Box<dyn FnMut(Event) + 'a>;

/// A sink that does nothing; the default when a caller doesn't care
/// about progress events.
pub fn no_op_sink<'a>() -> EventSink<'a> { Box::new(|_event| {}) }


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn error_code_wire_strings()
	{
		assert_eq!(ErrorCode::ManifestFetchFailed.to_string(), "manifest_fetch_failed");
		assert_eq!(ErrorCode::ManifestSignatureInvalid.to_string(), "manifest_signature_invalid");
		assert_eq!(ErrorCode::DownloadFailed.to_string(), "download_failed");
		assert_eq!(ErrorCode::Md5Mismatch.to_string(), "md5_mismatch");
		assert_eq!(ErrorCode::ApplyFailed.to_string(), "apply_failed");
		assert_eq!(ErrorCode::HttpFsFailed.to_string(), "http_fs_failed");
		assert_eq!(ErrorCode::DeleteExtraneousFailed.to_string(), "delete_extraneous_failed");
	}

	#[test]
	fn mode_display()
	{
		assert_eq!(Mode::Manifest.to_string(), "manifest");
		assert_eq!(Mode::HttpFs.to_string(), "http_fs");
	}

	#[test]
	fn no_op_sink_accepts_events()
	{
		let mut sink = no_op_sink();
		sink(Event::UpdateStart { mode: Mode::Manifest });
	}
}
