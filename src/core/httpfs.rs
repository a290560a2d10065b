//! HTTP-FS mode: a recursive directory-listing crawler used in place of
//! a manifest when one isn't wanted. No hashes, no signature -- just
//! "make the local tree look like the listing".
use std::collections::HashSet;
use std::path::PathBuf;

use regex_lite::Regex;
use thiserror::Error;
use url::Url;

use crate::core::downloader::Downloader;
use crate::core::events::{Event, EventSink, Mode};
use crate::util::path_join;


#[derive(Debug)]
#[derive(Error)]
pub enum HttpFsErr
{
	#[error("Fetching directory listing {url}: {source}")]
	Listing { url: String, #[source] source: Box<ureq::Error> },

	#[error("Bad URL: {0}")]
	Url(#[from] url::ParseError),

	#[error("Downloading {path}: {source}")]
	Download { path: String, #[source] source: crate::core::downloader::DownloadErr },

	#[error("Reading listing body: {0}")]
	IO(#[from] std::io::Error),
}


/// Maximum listing page size we'll read into memory -- these are
/// directory index pages, not file payloads, so a generous cap is fine.
const LISTING_LIMIT: u64 = 10 * 1024 * 1024;

pub struct HttpFsCrawler<'a>
{
	agent: ureq::Agent,
	downloader: &'a Downloader,
	dest_dir: PathBuf,
	strict: bool,
	href_re: Regex,
}

impl<'a> HttpFsCrawler<'a>
{
	pub fn new(agent: ureq::Agent, downloader: &'a Downloader, dest_dir: PathBuf, strict: bool) -> Self
	{
		// Directory listings are machine-generated; a trivial attribute
		// match is plenty (same call the teacher makes for IgnorePaths).
		let href_re = Regex::new(r#"href="([^"]+)""#).expect("static pattern is valid");
		Self { agent, downloader, dest_dir, strict, href_re }
	}

	/// Crawl starting at `base_url`, downloading every file found into
	/// the mirrored path under `dest_dir`.  Returns `Err` only when
	/// `strict` and a file permanently fails; otherwise per-file
	/// failures are reported through `events` and the crawl continues.
	pub fn run(&self, base_url: &Url, events: &mut EventSink) -> Result<(), HttpFsErr>
	{
		let mut visited = HashSet::new();
		self.crawl(base_url, base_url, events, &mut visited)
	}

	/// `base_url` never changes across recursive calls -- it anchors every
	/// `relative_path` computation so mirrored paths keep their full
	/// subdirectory structure. `url` is the listing currently being
	/// fetched, used only to resolve that listing's own relative hrefs.
	fn crawl(&self, base_url: &Url, url: &Url, events: &mut EventSink, visited: &mut HashSet<Url>)
			-> Result<(), HttpFsErr>
	{
		if !visited.insert(url.clone()) { return Ok(()); }

		let body = self.fetch_listing(url)?;
		for link in self.extract_links(&body)
		{
			let resolved = url.join(&link.href)?;

			if link.is_dir
			{
				self.crawl(base_url, &resolved, events, visited)?;
			}
			else
			{
				let rel = relative_path(base_url, &resolved);
				let dest = path_join(&self.dest_dir, &rel);
				if let Some(parent) = dest.parent() { let _ = std::fs::create_dir_all(parent); }

				events(Event::FileUpdateStart {
					path: rel.clone(), index: 0, total: 0, from: None, to: String::new(),
				});

				match self.downloader.fetch_to_path(resolved.as_str(), &dest, None, events)
				{
					Ok(()) => {
						events(Event::FileUpdateDone {
							path: rel, index: 0, total: 0, from: None, to: String::new(),
						});
					}
					Err(e) => {
						events(Event::FileUpdateFailed {
							path: rel.clone(), mode: Mode::HttpFs, error: e.to_string(),
						});
						if self.strict
						{
							return Err(HttpFsErr::Download { path: rel, source: e });
						}
					}
				}
			}
		}

		Ok(())
	}

	fn fetch_listing(&self, url: &Url) -> Result<String, HttpFsErr>
	{
		let response = self.agent.request_url("GET", url).call()
				.map_err(|e| HttpFsErr::Listing { url: url.to_string(), source: Box::new(e) })?;

		use std::io::Read as _;
		let mut body = String::new();
		response.into_reader().take(LISTING_LIMIT).read_to_string(&mut body)?;
		Ok(body)
	}

	fn extract_links(&self, html: &str) -> Vec<Link>
	{
		self.href_re.captures_iter(html)
				.filter_map(|c| c.get(1))
				.map(|m| m.as_str().to_string())
				.filter(|href| !href.starts_with('?') && !href.starts_with('#') && href != "../")
				.map(|href| {
					let is_dir = href.ends_with('/');
					Link { href, is_dir }
				})
				.collect()
	}
}

struct Link { href: String, is_dir: bool }


/// The file's path relative to the crawl's dest_dir, derived from the
/// absolute listing URL it was found under plus its own resolved URL.
fn relative_path(listing_url: &Url, file_url: &Url) -> String
{
	file_url.path().trim_start_matches(listing_url.path()).trim_start_matches('/').to_string()
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn crawler(dest: PathBuf) -> HttpFsCrawler<'static>
	{
		// Built purely to exercise extract_links / relative_path; no
		// network calls happen in these tests.
		let downloader = Box::leak(Box::new(Downloader::new(0, 1, 4096, false, None)));
		let agent = ureq::AgentBuilder::new().build();
		HttpFsCrawler::new(agent, downloader, dest, false)
	}

	#[test]
	fn extract_links_classifies_dirs_and_files()
	{
		let dir = tempfile::tempdir().unwrap();
		let c = crawler(dir.path().to_path_buf());
		let html = r#"<a href="sub/">sub</a><a href="a.py">a.py</a><a href="../">up</a>"#;
		let links = c.extract_links(html);
		assert_eq!(links.len(), 2);
		assert!(links[0].is_dir);
		assert!(!links[1].is_dir);
	}

	#[test]
	fn relative_path_strips_listing_prefix()
	{
		let base = Url::parse("http://dev/files/").unwrap();
		let file = Url::parse("http://dev/files/a.py").unwrap();
		assert_eq!(relative_path(&base, &file), "a.py");
	}
}
