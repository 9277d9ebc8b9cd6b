//! Export subcommand.
//!
//! Writes a project snapshot as JSON, optionally gzip-compressed.

use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Project to export
    pub project: i64,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Force gzip compression (auto-detected from .gz extension otherwise)
    #[arg(long)]
    pub gzip: bool,

    /// Leave answers out of the snapshot
    #[arg(long)]
    pub no_task_runs: bool,

    /// Compress if the JSON exceeds this size (100KB, 1MB, ...)
    #[arg(long, value_name = "SIZE")]
    pub compress_threshold: Option<String>,
}

impl ExportArgs {
    pub fn compress_threshold_bytes(&self) -> Option<u64> {
        self.compress_threshold.as_deref().and_then(parse_size)
    }

    /// Whether to gzip, given the uncompressed size when known.
    pub fn should_compress(&self, output_size: Option<u64>) -> bool {
        if self.gzip {
            return true;
        }

        if let Some(ref path) = self.output
            && path.extension().is_some_and(|ext| ext == "gz")
        {
            return true;
        }

        match (self.compress_threshold_bytes(), output_size) {
            (Some(threshold), Some(size)) => size > threshold,
            _ => false,
        }
    }

    /// Output path, with `.gz` appended when compressing to a plain name.
    pub fn output_path(&self, compress: bool) -> Option<PathBuf> {
        let path = self.output.clone()?;
        if compress && path.extension().is_none_or(|ext| ext != "gz") {
            let mut name = path.into_os_string();
            name.push(".gz");
            Some(PathBuf::from(name))
        } else {
            Some(path)
        }
    }
}

/// Parse a size with an optional B/KB/MB/GB suffix (case-insensitive).
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_uppercase();
    let (num, factor) = if let Some(num) = s.strip_suffix("GB") {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix("MB") {
        (num, 1024 * 1024)
    } else if let Some(num) = s.strip_suffix("KB") {
        (num, 1024)
    } else if let Some(num) = s.strip_suffix('B') {
        (num, 1)
    } else {
        (s.as_str(), 1)
    };
    num.trim().parse::<u64>().ok().map(|n| n * factor)
}
