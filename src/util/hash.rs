//! Misc (MD5) hashing utils
//!
//! The spec calls for MD5 on the per-file integrity path -- it's cheap
//! on constrained hardware, and nobody's asking it to resist a
//! determined attacker; that job belongs to the manifest-level HMAC
//! (see util::signature) instead.
use std::ops::Deref;
use std::fmt;
use std::io::{Read, Write};
use serde_with::{serde_as, hex::Hex};


/// A raw MD5 hash output: 128 bits, 16 octets.
#[derive(Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde_as]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Md5Hash(
	#[serde_as(as = "Hex")]
	[u8; 16]
);

impl Deref for Md5Hash
{
	type Target = [u8; 16];
	fn deref(&self) -> &Self::Target { &self.0 }
}

impl From<[u8; 16]> for Md5Hash
{
	fn from(buf: [u8; 16]) -> Self { Self(buf) }
}

impl fmt::Debug for Md5Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "Md5Hash({self})") }
}

impl fmt::Display for Md5Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		let mut buf = [0u8; 32];
		let hex = base16ct::lower::encode_str(&self.0, &mut buf)
				.expect("16-byte buffer always encodes into 32 hex chars");
		write!(f, "{hex}")
	}
}

impl std::str::FromStr for Md5Hash
{
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		use anyhow::anyhow;

		let xlen = 32;
		let slen = s.len();
		if slen != xlen
		{
			let estr = anyhow!("Invalid MD5 length: {slen} should be \
					{xlen} for '{s}'");
			Err(estr)?;
		}

		let mut hout = Md5Hash::default();
		let hret = base16ct::lower::decode(s, &mut hout.0)
				.map_err(|e| anyhow!("Invalid hex parsing: {e} trying '{s}'"))?;

		assert_eq!(hret.len(), hout.len(), "should have gotten the hex len right");

		Ok(hout)
	}
}


/// A `Write` wrapper that hashes bytes as they flow through, in
/// `chunk_size` pieces, while passing them on to the inner writer
/// unmodified.  This lets a download verify its own MD5 in the same
/// pass that writes it to disk, rather than needing a second read-back.
pub struct Md5Writer<W: Write>
{
	inner: W,
	ctx: md5::Context,
	chunk_size: usize,
	pending: Vec<u8>,
}

impl<W: Write> Md5Writer<W>
{
	pub fn new(inner: W, chunk_size: usize) -> Self
	{
		let chunk_size = chunk_size.max(1);
		Self { inner, ctx: md5::Context::new(), chunk_size, pending: Vec::new() }
	}

	/// Finish up: flush any still-pending unhashed bytes into the
	/// digest, and return the inner writer plus the final hash.
	pub fn finish(mut self) -> std::io::Result<(W, Md5Hash)>
	{
		if !self.pending.is_empty()
		{
			self.ctx.consume(&self.pending);
			self.pending.clear();
		}
		let digest = self.ctx.compute();
		Ok((self.inner, Md5Hash(digest.0)))
	}
}

impl<W: Write> Write for Md5Writer<W>
{
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>
	{
		let n = self.inner.write(buf)?;
		self.pending.extend_from_slice(&buf[..n]);
		while self.pending.len() >= self.chunk_size
		{
			let rest = self.pending.split_off(self.chunk_size);
			self.ctx.consume(&self.pending);
			self.pending = rest;
		}
		Ok(n)
	}

	fn flush(&mut self) -> std::io::Result<()> { self.inner.flush() }
}


/// Calculate the MD5 of something we can read from, streaming it in
/// `chunk_size` pieces rather than reading it all into memory at once.
pub fn md5_reader<T: Read>(rdr: &mut T, chunk_size: usize) -> std::io::Result<Md5Hash>
{
	let chunk_size = chunk_size.max(1);
	let mut ctx = md5::Context::new();
	let mut buf = vec![0u8; chunk_size];
	loop
	{
		let n = rdr.read(&mut buf)?;
		if n == 0 { break; }
		ctx.consume(&buf[..n]);
	}
	let digest = ctx.compute();
	Ok(Md5Hash(digest.0))
}

/// Calculate the MD5 of a file, chunked.
pub fn md5_file(file: &std::path::Path, chunk_size: usize) -> std::io::Result<Md5Hash>
{
	let mut fh = std::fs::File::open(file)?;
	md5_reader(&mut fh, chunk_size)
}


#[cfg(test)]
mod tests
{
	use super::*;

	fn start_at_the_beginning() -> &'static str
	{ "Do, a deer, a female deer" }
	fn expect_at_the_beginning() -> &'static str
	{ "6f7d6765a5cde81dd6a57bbbf8ef1f56" }

	#[test]
	fn md5_reader_matches_known_hash()
	{
		let mut buf = start_at_the_beginning().as_bytes();
		let got = md5_reader(&mut buf, 4).unwrap();
		assert_eq!(got.to_string(), expect_at_the_beginning());
	}

	#[test]
	fn md5_writer_streams_and_passes_through()
	{
		let data = start_at_the_beginning().as_bytes();
		let out = Vec::new();
		let mut w = Md5Writer::new(out, 7);
		w.write_all(data).unwrap();
		let (out, hash) = w.finish().unwrap();
		assert_eq!(out, data);
		assert_eq!(hash.to_string(), expect_at_the_beginning());
	}

	#[test]
	fn roundtrip_display_parse()
	{
		let h: Md5Hash = expect_at_the_beginning().parse().unwrap();
		assert_eq!(h.to_string(), expect_at_the_beginning());
	}

	#[test]
	fn rejects_bad_length()
	{
		let e = "abcd".parse::<Md5Hash>();
		assert!(e.is_err());
	}
}
