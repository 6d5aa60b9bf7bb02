//! Pre-flight checks for snoop
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSymbol};
use std::path::Path;

use crate::capture::TRACED_FUNCTIONS;

/// Minimum kernel version required for the BPF ring buffer
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first failed requirement
pub fn run_preflight_checks(library: &Path, program: &Path, quiet: bool) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_file_exists(library, "TLS library", "--library")?;
    check_file_exists(program, "eBPF object", "--program")?;
    check_exported_symbols(library, quiet)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: snoop requires root privileges to load eBPF programs.\n\n\
         Run with: sudo snoop ..."
    );
}

/// Check if the kernel version is sufficient for eBPF features
fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");
    let Some((major, minor)) = parse_kernel_release(release) else {
        // Can't parse, assume it's fine
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             snoop requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// `"5.15.0-generic"` → `(5, 15)`
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    Some((major, minor.parse().ok()?))
}

fn check_file_exists(path: &Path, what: &str, flag: &str) -> Result<()> {
    if !path.exists() {
        bail!(
            "{what} not found: {}\n\n\
             Make sure the path is correct, or pass a different one with {flag}.",
            path.display()
        );
    }
    if !path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             {flag} must point to a file, not a directory.",
            path.display()
        );
    }
    Ok(())
}

/// Warn if the library does not export the traced functions
///
/// Not fatal: attachment reports the precise failure later.
fn check_exported_symbols(library: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    let file_data = std::fs::read(library)
        .with_context(|| format!("Failed to read library: {}", library.display()))?;

    for function in missing_symbols(&file_data) {
        eprintln!("warning: {} does not export {function}", library.display());
    }
    Ok(())
}

/// Traced functions absent from both the dynamic and the static symbol table
///
/// Data that is not an object file reports nothing; later stages handle it.
fn missing_symbols(file_data: &[u8]) -> Vec<&'static str> {
    let Ok(obj) = object::File::parse(file_data) else {
        return Vec::new();
    };

    let exported = |function: &str| {
        obj.dynamic_symbols()
            .chain(obj.symbols())
            .any(|sym| sym.is_definition() && sym.name().is_ok_and(|name| name == function))
    };

    TRACED_FUNCTIONS.into_iter().filter(|function| !exported(function)).collect()
}
