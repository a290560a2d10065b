//! Manifest-level HMAC-SHA256 signing/verification.
//!
//! Per-file integrity is MD5 (see util::hash); this is the one place
//! SHA256 still matters, over the canonicalized manifest bytes rather
//! than over file contents.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;


/// Problems computing or checking a manifest signature.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum SignatureErr
{
	/// The configured key is unusable (HMAC accepts any length key, so
	/// this should be unreachable in practice, but the API returns a
	/// Result, so we propagate it rather than unwrap).
	#[error("Bad HMAC key: {0}")]
	BadKey(String),

	/// The signature field wasn't valid hex, or wasn't 64 chars (32
	/// bytes of SHA256 output).
	#[error("Bad signature encoding: {0}")]
	BadEncoding(String),

	/// Computed HMAC didn't match the manifest's signature field.
	#[error("Manifest signature does not match")]
	Mismatch,
}


/// Compute the hex-encoded HMAC-SHA256 over `canonical` with `key`.
pub fn compute(canonical: &[u8], key: &[u8]) -> Result<String, SignatureErr>
{
	let mut mac = HmacSha256::new_from_slice(key)
			.map_err(|e| SignatureErr::BadKey(e.to_string()))?;
	mac.update(canonical);
	let tag = mac.finalize().into_bytes();

	let mut hexbuf = [0u8; 64];
	let hex = base16ct::lower::encode_str(&tag, &mut hexbuf)
			.expect("32-byte HMAC tag always encodes into 64 hex chars");
	Ok(hex.to_string())
}


/// Verify that `expect_hex` is the HMAC-SHA256 over `canonical` with
/// `key`.  Uses the `hmac` crate's constant-time comparison internally.
pub fn verify(canonical: &[u8], key: &[u8], expect_hex: &str) -> Result<(), SignatureErr>
{
	let mut mac = HmacSha256::new_from_slice(key)
			.map_err(|e| SignatureErr::BadKey(e.to_string()))?;
	mac.update(canonical);

	let mut tagbuf = [0u8; 32];
	base16ct::lower::decode(expect_hex, &mut tagbuf)
			.map_err(|e| SignatureErr::BadEncoding(e.to_string()))?;

	mac.verify_slice(&tagbuf).map_err(|_| SignatureErr::Mismatch)
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn roundtrip()
	{
		let key = b"sharedsecret";
		let data = b"some canonical manifest bytes";
		let sig = compute(data, key).unwrap();
		verify(data, key, &sig).expect("should verify with same key");
	}

	#[test]
	fn wrong_key_fails()
	{
		let data = b"some canonical manifest bytes";
		let sig = compute(data, b"keyA").unwrap();
		let err = verify(data, b"keyB", &sig).unwrap_err();
		assert!(matches!(err, SignatureErr::Mismatch));
	}

	#[test]
	fn tampered_data_fails()
	{
		let key = b"sharedsecret";
		let sig = compute(b"original", key).unwrap();
		let err = verify(b"tampered!", key, &sig).unwrap_err();
		assert!(matches!(err, SignatureErr::Mismatch));
	}
}
