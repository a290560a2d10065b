//! Misc util funcs

/// MD5 hashing utils
pub mod hash;

/// HMAC-SHA256 manifest signing/verification
pub mod signature;



/// For streaming file and network I/O, we want some buffering rather than
/// going syscall-by-syscall, but constrained devices don't have much RAM
/// to spare either.  64KiB is a reasonable middle ground and doubles as
/// the default `io_chunk_size`.
pub const DEFAULT_IO_CHUNK_SIZE: usize = 64 * 1024;



use std::path::{Path, PathBuf};

/// Append paths.
///
/// It's not trivial to just use Path::join() because it treats join'ing
/// an "absolute" path as _replacing_ the base, not appending to.
/// Presumable there are usecases where that's the sensible behavior.
/// For us, though, it pretty much never is; we're always treating the
/// base path as a sort of "chroot".  So to avoid repeating ourselves too
/// often, just make a util func for it.
pub fn path_join(base: impl AsRef<Path>, sub: impl AsRef<Path>) -> PathBuf
{
	let sub = match sub.as_ref().strip_prefix("/") {
		Ok(x) => x,
		Err(_) => sub.as_ref(),
	};
	base.as_ref().join(sub)
}


/// Is `rel` a relative, non-escaping POSIX path?  Rejects absolute paths
/// and any `..` component -- the one thing every filesystem-touching
/// module here needs to check before trusting a manifest-supplied path.
pub fn is_contained_relative_path(rel: &str) -> bool
{
	use std::path::Component;

	let p = Path::new(rel);
	if p.is_absolute() { return false; }

	for c in p.components()
	{
		match c
		{
			Component::ParentDir | Component::Prefix(_) | Component::RootDir => return false,
			_ => {}
		}
	}

	!rel.is_empty()
}


/// Pluralize for a number
pub fn plural(n: usize) -> &'static str
{
	if n == 1 { "" } else { "s" }
}


/// What's our command's name?  With fallback...  this is mostly intended
/// for cosmetic use, like telling the user to "run this command".
pub fn cmdname() -> String
{
	std::env::args_os().next()
		.and_then(|c| Some(c.to_string_lossy().into_owned()))
		.and_then(|s| Some(s.split('/').next_back()?.to_string()))
		.unwrap_or_else(|| "ota-rustdate".to_string())
}


#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn path_join_strips_leading_slash()
	{
		let got = path_join("/dest", "/etc/passwd");
		assert_eq!(got, Path::new("/dest/etc/passwd"));
	}

	#[test]
	fn path_join_plain_relative()
	{
		let got = path_join("/dest", "a/b.txt");
		assert_eq!(got, Path::new("/dest/a/b.txt"));
	}

	#[test]
	fn contained_rejects_absolute()
	{
		assert!(!is_contained_relative_path("/etc/passwd"));
	}

	#[test]
	fn contained_rejects_dotdot()
	{
		assert!(!is_contained_relative_path("../escape.txt"));
		assert!(!is_contained_relative_path("a/../../escape.txt"));
	}

	#[test]
	fn contained_accepts_plain_relative()
	{
		assert!(is_contained_relative_path("a/b/c.txt"));
		assert!(is_contained_relative_path("a.py"));
	}

	#[test]
	fn contained_rejects_empty()
	{
		assert!(!is_contained_relative_path(""));
	}

	#[test]
	fn plural_singular_vs_plural()
	{
		assert_eq!(plural(1), "");
		assert_eq!(plural(0), "s");
		assert_eq!(plural(2), "s");
	}
}
