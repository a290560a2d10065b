//! Chunked HTTP GET with bounded retry/backoff and optional range-based
//! resume, modeled on the teacher's `server::http::mk_agent`/`get_bytes`
//! but made single-shot: there is no thread pool here, one fetch runs at
//! a time on the caller's stack.
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::events::{Event, EventSink};
use crate::util::hash::{Md5Hash, Md5Writer};


/// Problems fetching a single file.
#[derive(Debug)]
#[derive(Error)]
pub enum DownloadErr
{
	#[error("HTTP transport error fetching {url}: {source}")]
	Transport { url: String, #[source] source: Box<ureq::Error> },

	#[error("Unexpected HTTP status {status} fetching {url}")]
	BadStatus { url: String, status: u16 },

	#[error("I/O error writing {path}: {source}")]
	IO { path: PathBuf, #[source] source: std::io::Error },

	#[error("MD5 mismatch for {path}: expected {expected}, got {actual}")]
	Md5Mismatch { path: PathBuf, expected: Md5Hash, actual: Md5Hash },

	#[error("Exhausted all {attempts} attempt(s) fetching {url}")]
	Exhausted { url: String, attempts: u32 },
}


/// Single-shot chunked downloader with retry/backoff/resume.  No
/// internal threads -- `fetch_to_path` runs synchronously and returns
/// when the file is in place (or has permanently failed).
pub struct Downloader
{
	agent: ureq::Agent,
	retries: u32,
	retry_base_delay_ms: u64,
	io_chunk_size: usize,
	resume_downloads: bool,
}

impl Downloader
{
	pub fn new(retries: u32, retry_base_delay_ms: u64, io_chunk_size: usize,
			resume_downloads: bool, http_timeout_s: Option<u64>) -> Self
	{
		let mut builder = ureq::AgentBuilder::new();
		if let Some(secs) = http_timeout_s
		{
			builder = builder.timeout_connect(Duration::from_secs(secs))
					.timeout_read(Duration::from_secs(secs));
		}
		Self {
			agent: builder.build(),
			retries,
			retry_base_delay_ms,
			io_chunk_size: io_chunk_size.max(1),
			resume_downloads,
		}
	}

	/// Fetch `url` into `dest`, verifying `expected_md5` in-stream when
	/// given.  A hash mismatch with attempts remaining consumes one of
	/// those attempts (re-fetch from scratch) rather than giving up
	/// immediately.
	pub fn fetch_to_path(&self, url: &str, dest: &Path, expected_md5: Option<Md5Hash>,
			events: &mut EventSink) -> Result<(), DownloadErr>
	{
		let attempts_total = self.retries + 1;
		let part = part_path(dest);

		for attempt in 0..attempts_total
		{
			events(Event::DownloadAttempt {
				url: url.to_string(), path: dest.display().to_string(),
				attempt: attempt + 1, attempts: attempts_total,
			});

			match self.one_attempt(url, dest, &part, expected_md5)
			{
				Ok(()) => return Ok(()),
				Err(e) => {
					let is_last = attempt + 1 >= attempts_total;
					if is_last { return Err(e); }

					let wait_ms = self.retry_base_delay_ms.saturating_mul(1u64 << attempt);
					events(Event::DownloadRetry {
						url: url.to_string(), path: dest.display().to_string(),
						attempt: attempt + 1, wait_ms,
					});
					std::thread::sleep(Duration::from_millis(wait_ms));
				}
			}
		}

		Err(DownloadErr::Exhausted { url: url.to_string(), attempts: attempts_total })
	}

	fn one_attempt(&self, url: &str, dest: &Path, part: &Path, expected_md5: Option<Md5Hash>)
			-> Result<(), DownloadErr>
	{
		let existing_len = if self.resume_downloads { part_len(part) } else { 0 };
		let ranged = existing_len > 0;

		let mut request = self.agent.get(url);
		if ranged
		{
			request = request.set("Range", &format!("bytes={existing_len}-"));
		}

		let response = match request.call() {
			Ok(r) => r,
			// A ranged request can fail transport-level too (416 Range Not
			// Satisfiable, or any other 4xx the server hands back instead
			// of honoring Range): our `.part` file is stale or the server
			// doesn't support resume, either way, restart from scratch
			// rather than burning retries against the same bad Range.
			Err(ureq::Error::Status(status, _)) if ranged && (400..500).contains(&status) => {
				let _ = std::fs::remove_file(part);
				return self.one_attempt(url, dest, part, expected_md5);
			}
			Err(e) => return Err(classify_err(url, e)),
		};

		let (append, status) = (ranged, response.status());
		if append && status != 206
		{
			// Server ignored our Range request; restart from scratch.
			let _ = std::fs::remove_file(part);
			return self.one_attempt(url, dest, part, expected_md5);
		}
		if !append && status / 100 != 2
		{
			return Err(DownloadErr::BadStatus { url: url.to_string(), status });
		}

		let file = std::fs::OpenOptions::new()
				.create(true).write(true).append(append).truncate(!append)
				.open(part)
				.map_err(|e| DownloadErr::IO { path: part.to_path_buf(), source: e })?;

		let md5_chunk = self.io_chunk_size;
		let copy_result: Result<Option<Md5Hash>, std::io::Error> = if expected_md5.is_some()
		{
			let writer = Md5Writer::new(file, md5_chunk);
			let mut writer = writer;
			stream_body(response, &mut writer, self.io_chunk_size)?;
			let (_file, hash) = writer.finish()?;
			Ok(Some(hash))
		}
		else
		{
			let mut file = file;
			stream_body(response, &mut file, self.io_chunk_size)?;
			Ok(None)
		};
		let actual_hash = copy_result.map_err(|e| DownloadErr::IO { path: part.to_path_buf(), source: e })?;

		if let (Some(expected), Some(actual)) = (expected_md5, actual_hash)
		{
			if expected != actual
			{
				let _ = std::fs::remove_file(part);
				return Err(DownloadErr::Md5Mismatch {
					path: dest.to_path_buf(), expected, actual,
				});
			}
		}

		std::fs::rename(part, dest).map_err(|e| DownloadErr::IO { path: dest.to_path_buf(), source: e })?;
		Ok(())
	}
}


fn part_path(dest: &Path) -> PathBuf
{
	let mut os = dest.as_os_str().to_owned();
	os.push(".part");
	PathBuf::from(os)
}

fn part_len(part: &Path) -> u64
{
	std::fs::metadata(part).map(|m| m.len()).unwrap_or(0)
}

fn classify_err(url: &str, e: ureq::Error) -> DownloadErr
{
	match e {
		ureq::Error::Status(status, _) => DownloadErr::BadStatus { url: url.to_string(), status },
		other => DownloadErr::Transport { url: url.to_string(), source: Box::new(other) },
	}
}

fn stream_body(response: ureq::Response, writer: &mut impl std::io::Write, chunk_size: usize)
		-> std::io::Result<()>
{
	use std::io::Read;

	let mut reader = response.into_reader();
	let mut buf = vec![0u8; chunk_size];
	loop {
		let n = reader.read(&mut buf)?;
		if n == 0 { break; }
		writer.write_all(&buf[..n])?;
	}
	writer.flush()
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn part_path_appends_suffix()
	{
		assert_eq!(part_path(Path::new("/a/b.py")), PathBuf::from("/a/b.py.part"));
	}

	#[test]
	fn part_len_missing_file_is_zero()
	{
		assert_eq!(part_len(Path::new("/definitely/does/not/exist")), 0);
	}
}
