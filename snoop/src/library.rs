//! Location of the TLS library the probes attach to

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub const LIBSSL_X86_64: &str = "/lib/x86_64-linux-gnu/libssl.so.3";
pub const LIBSSL_AARCH64: &str = "/lib/aarch64-linux-gnu/libssl.so.3";

/// Default libssl path for a Debian-style multiarch layout
///
/// # Errors
/// Returns an error for architectures without a known default
pub fn default_library_path(arch: &str) -> Result<PathBuf> {
    match arch {
        "x86_64" => Ok(PathBuf::from(LIBSSL_X86_64)),
        "aarch64" => Ok(PathBuf::from(LIBSSL_AARCH64)),
        other => bail!(
            "unsupported architecture: {other}\n\n\
             Pass the TLS library explicitly with --library <PATH>"
        ),
    }
}

/// Explicit path if given, otherwise the default for this machine
///
/// # Errors
/// Returns an error if no path was given and the architecture has no default
pub fn resolve_library_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_library_path(std::env::consts::ARCH),
    }
}
