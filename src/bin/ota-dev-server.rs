//! Dev-only static file server: single-threaded blocking HTTP/1.1,
//! nothing fancier, used purely to exercise the Downloader's resume
//! path and the HTTP-FS crawler during manual QA. Not production
//! surface, so this deliberately stays off `ureq`/async frameworks.
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::Parser;

/// Serve a directory over plain HTTP/1.1, with optional injected
/// failures for exercising retry/resume logic.
#[derive(Debug, Parser)]
#[command(version)]
struct Args
{
	/// Directory to serve.
	#[arg(short, long)]
	root: PathBuf,

	/// Address to bind, e.g. 127.0.0.1:8080.
	#[arg(short, long, default_value = "127.0.0.1:8080")]
	bind: String,

	/// Emit an `href`-style directory listing for GETs on a directory
	/// path, so the crawler in `recurse_http_fs` mode has something to
	/// walk.
	#[arg(long)]
	listings: bool,

	/// Relative path (repeatable) that should fail on its next request.
	#[arg(long = "fail-path")]
	fail_paths: Vec<String>,

	/// Only fail each `--fail-path` once, then serve normally.
	#[arg(long)]
	fail_once: bool,
}

fn main() -> Result<(), anyhow::Error>
{
	tracing_subscriber::fmt()
			.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
			.try_init()
			.ok();

	let args = Args::parse();
	let listener = TcpListener::bind(&args.bind)?;
	tracing::info!(addr = %args.bind, root = %args.root.display(), "serving");

	let already_failed: Mutex<HashSet<String>> = Mutex::new(HashSet::new());

	for stream in listener.incoming()
	{
		let stream = match stream {
			Ok(s) => s,
			Err(e) => { tracing::warn!(error = %e, "accept failed"); continue; }
		};

		if let Err(e) = handle(stream, &args, &already_failed)
		{
			tracing::warn!(error = %e, "request handling failed");
		}
	}

	Ok(())
}

fn handle(mut stream: TcpStream, args: &Args, already_failed: &Mutex<HashSet<String>>)
		-> Result<(), anyhow::Error>
{
	let mut reader = BufReader::new(stream.try_clone()?);
	let mut request_line = String::new();
	reader.read_line(&mut request_line)?;

	let mut parts = request_line.split_whitespace();
	let method = parts.next().unwrap_or("");
	let raw_path = parts.next().unwrap_or("/");

	let mut range: Option<(u64, Option<u64>)> = None;
	loop
	{
		let mut line = String::new();
		if reader.read_line(&mut line)? == 0 { break; }
		if line == "\r\n" || line.is_empty() { break; }

		if let Some(value) = line.strip_prefix("Range: ").or_else(|| line.strip_prefix("range: "))
		{
			range = parse_range(value.trim());
		}
	}

	if method != "GET"
	{
		write_status(&mut stream, 405, "Method Not Allowed")?;
		return Ok(());
	}

	let rel = raw_path.trim_start_matches('/');

	if args.fail_paths.iter().any(|p| p == rel)
	{
		let already = already_failed.lock().unwrap().contains(rel);
		if !(args.fail_once && already)
		{
			already_failed.lock().unwrap().insert(rel.to_string());
			tracing::info!(path = rel, "injecting failure");
			write_status(&mut stream, 500, "Injected Failure")?;
			return Ok(());
		}
	}

	let full = args.root.join(rel);

	if full.is_dir() && args.listings
	{
		return serve_listing(&mut stream, &full, raw_path);
	}

	if !full.is_file()
	{
		write_status(&mut stream, 404, "Not Found")?;
		return Ok(());
	}

	serve_file(&mut stream, &full, range)
}

fn serve_listing(stream: &mut TcpStream, dir: &Path, url_path: &str) -> Result<(), anyhow::Error>
{
	let mut body = String::from("<html><body>\n");
	for entry in std::fs::read_dir(dir)?
	{
		let entry = entry?;
		let name = entry.file_name().to_string_lossy().to_string();
		let is_dir = entry.file_type()?.is_dir();
		let href = if is_dir { format!("{name}/") } else { name.clone() };
		body.push_str(&format!("<a href=\"{href}\">{name}</a><br>\n"));
	}
	body.push_str("</body></html>\n");
	let _ = url_path;

	write_response(stream, 200, "OK", "text/html", body.as_bytes(), None)
}

fn serve_file(stream: &mut TcpStream, path: &Path, range: Option<(u64, Option<u64>)>)
		-> Result<(), anyhow::Error>
{
	let mut file = std::fs::File::open(path)?;
	let total_len = file.metadata()?.len();

	match range {
		Some((start, end)) => {
			use std::io::Seek;
			let end = end.unwrap_or(total_len.saturating_sub(1)).min(total_len.saturating_sub(1));
			if start >= total_len
			{
				write_status(stream, 416, "Range Not Satisfiable")?;
				return Ok(());
			}

			file.seek(std::io::SeekFrom::Start(start))?;
			let len = end - start + 1;
			let mut body = vec![0u8; len as usize];
			file.read_exact(&mut body)?;

			let content_range = format!("bytes {start}-{end}/{total_len}");
			write_response(stream, 206, "Partial Content", "application/octet-stream", &body, Some(&content_range))
		}
		None => {
			let mut body = Vec::with_capacity(total_len as usize);
			file.read_to_end(&mut body)?;
			write_response(stream, 200, "OK", "application/octet-stream", &body, None)
		}
	}
}

fn parse_range(header: &str) -> Option<(u64, Option<u64>)>
{
	let spec = header.strip_prefix("bytes=")?;
	let (start, end) = spec.split_once('-')?;
	let start: u64 = start.parse().ok()?;
	let end = if end.is_empty() { None } else { end.parse().ok() };
	Some((start, end))
}

fn write_status(stream: &mut TcpStream, code: u16, reason: &str) -> Result<(), anyhow::Error>
{
	write_response(stream, code, reason, "text/plain", reason.as_bytes(), None)
}

fn write_response(stream: &mut TcpStream, code: u16, reason: &str, content_type: &str,
		body: &[u8], content_range: Option<&str>) -> Result<(), anyhow::Error>
{
	let mut head = format!("HTTP/1.1 {code} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n",
			body.len());
	if let Some(cr) = content_range
	{
		head.push_str(&format!("Content-Range: {cr}\r\nAccept-Ranges: bytes\r\n"));
	}
	head.push_str("Connection: close\r\n\r\n");

	stream.write_all(head.as_bytes())?;
	stream.write_all(body)?;
	stream.flush()?;
	Ok(())
}
