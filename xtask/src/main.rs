use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

const EBPF_PACKAGE: &str = "snoop-ebpf";
const EBPF_TARGET: &str = "bpfel-unknown-none";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the kernel-side probe object
    BuildEbpf {
        #[arg(long, default_value = EBPF_TARGET)]
        target: String,
    },
    /// Build the probe object and the tracer, then run the tracer under sudo
    Run {
        #[arg(long, default_value = EBPF_TARGET)]
        target: String,
        /// Arguments forwarded to snoop
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => {
            build_ebpf(&target)?;
        }
        Cmd::Run { target, args } => {
            let object = build_ebpf(&target)?;
            run_tracer(&object, &args)?;
        }
    }

    Ok(())
}

/// Returns the path of the built object, relative to the workspace root.
fn build_ebpf(target: &str) -> Result<String> {
    // Debug builds pull in formatting code the BPF linker rejects; release
    // with LTO strips it.
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", EBPF_PACKAGE, "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to spawn cargo for the eBPF build")?;

    if !status.success() {
        bail!("Failed to build eBPF program");
    }

    let object = format!("target/{target}/release/snoop");
    println!("✓ eBPF program built: {object}");
    Ok(object)
}

fn run_tracer(object: &str, args: &[String]) -> Result<()> {
    let status = Command::new("cargo")
        .args(["build", "--package", "snoop"])
        .status()
        .context("Failed to spawn cargo for the tracer build")?;
    if !status.success() {
        bail!("Failed to build snoop");
    }

    let status = Command::new("sudo")
        .arg("-E")
        .arg("target/debug/snoop")
        .arg("--program")
        .arg(object)
        .args(args)
        .status()
        .context("Failed to run snoop")?;
    if !status.success() {
        bail!("snoop exited with {status}");
    }
    Ok(())
}
