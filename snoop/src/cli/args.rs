//! CLI argument definitions

use clap::builder::TypedValueParser as _;
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::capture::{TracerConfig, DEFAULT_CHANNEL_CAPACITY};
use crate::domain::PidFilter;
use crate::render::OutputFormat;

/// Where `cargo xtask build-ebpf` leaves the probe object
pub const DEFAULT_PROGRAM: &str = "target/bpfel-unknown-none/release/snoop";

#[derive(Parser, Debug)]
#[command(
    name = "snoop",
    about = "Trace TLS plaintext passing through SSL_read and SSL_write",
    after_help = "\
EXAMPLES:
    sudo snoop                                   Trace every process using libssl
    sudo snoop --pid 1234                        Only process 1234
    sudo snoop --json                            One JSON object per message
    sudo snoop --library /usr/lib/libssl.so.3    Non-default library location"
)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Process ID to trace (negative or omitted traces every process)
    #[arg(short, long, allow_negative_numbers = true)]
    pub pid: Option<i32>,

    /// TLS library to probe (defaults to the system libssl.so.3)
    #[arg(short, long, value_name = "PATH")]
    pub library: Option<PathBuf>,

    /// Compiled eBPF object
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PROGRAM)]
    pub program: PathBuf,

    /// Decoded messages buffered ahead of the output
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CHANNEL_CAPACITY,
          value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub buffer: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn pid_filter(&self) -> PidFilter {
        PidFilter::from(self.pid)
    }

    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        }
    }

    /// Tracer configuration for the resolved TLS `library`
    #[must_use]
    pub fn tracer_config(&self, library: &Path) -> TracerConfig {
        TracerConfig::new(&self.program, library)
            .with_pid_filter(self.pid_filter())
            .with_channel_capacity(self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pid;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["snoop"]).unwrap();
        assert!(!args.json);
        assert_eq!(args.pid_filter(), PidFilter::All);
        assert_eq!(args.program, Path::new(DEFAULT_PROGRAM));
        assert_eq!(args.buffer, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(args.output_format(), OutputFormat::Table);
    }

    #[test]
    fn test_negative_pid_traces_everything() {
        let args = Args::try_parse_from(["snoop", "--pid", "-1"]).unwrap();
        assert_eq!(args.pid, Some(-1));
        assert_eq!(args.pid_filter(), PidFilter::All);
    }

    #[test]
    fn test_tracer_config() {
        let args =
            Args::try_parse_from(["snoop", "--json", "--pid", "4242", "--buffer", "8"]).unwrap();
        let config = args.tracer_config(Path::new("/lib/libssl.so.3"));

        assert_eq!(args.output_format(), OutputFormat::Json);
        assert_eq!(config.pid_filter, PidFilter::Only(Pid(4242)));
        assert_eq!(config.binary, Path::new("/lib/libssl.so.3"));
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn test_zero_buffer_rejected() {
        assert!(Args::try_parse_from(["snoop", "--buffer", "0"]).is_err());
    }
}
