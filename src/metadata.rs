//! Manifest types and wire format.
//!
//! The manifest is the one structure whose on-disk and over-the-wire
//! byte layout is a contract between two separately-built binaries (the
//! device updater and the host manifest builder), so its canonicalization
//! rules live in their own submodule rather than being folded into
//! `Manifest` itself.

/// `Manifest`/`ManifestEntry` types, parse/validate, local load/save.
mod manifest;
pub use manifest::{Manifest, ManifestEntry, ManifestErr, load_local, save_local, parse_remote};

/// HMAC canonicalization, shared between device verifier and host builder.
pub mod canonical;
