//! Configuration module.
//!
//! This module defines the command-line interface (CLI) for the metadata writer
//! using `clap`, and turns it into header options and heap sources.

use clap::Parser;
use std::path::PathBuf;

use crate::header::{MetadataHeaderOptions, StorageFlags};

/// Writes a metadata root followed by its heaps.
///
/// Each heap is read from a file and placed after the header in the order
/// given on the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Heaps as NAME=PATH, e.g. `#Strings=strings.bin`
    #[arg(long = "heap", value_name = "NAME=PATH", value_parser = parse_heap_arg)]
    pub heaps: Vec<(String, PathBuf)>,

    /// Output file
    #[arg(short, long, default_value = "metadata.bin", help = "Path to the output blob")]
    pub output: PathBuf,

    /// Runtime version string stored in the header
    #[arg(long)]
    pub version_string: Option<String>,

    /// Header major version
    #[arg(long)]
    pub major: Option<u16>,

    /// Header minor version
    #[arg(long)]
    pub minor: Option<u16>,

    /// Set the extra-data storage flag
    #[arg(long)]
    pub extra_data: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Config {
    pub fn header_options(&self) -> MetadataHeaderOptions {
        MetadataHeaderOptions {
            major_version: self.major,
            minor_version: self.minor,
            storage_flags: self.extra_data.then_some(StorageFlags::EXTRA_DATA),
            version_string: self.version_string.clone(),
            ..Default::default()
        }
    }
}

fn parse_heap_arg(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", arg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heaps_keep_command_line_order() {
        let config = Config::parse_from([
            "mdwriter",
            "--heap",
            "#~=tables.bin",
            "--heap",
            "#Strings=strings.bin",
            "-o",
            "out.bin",
        ]);
        assert_eq!(
            config.heaps,
            vec![
                ("#~".to_string(), PathBuf::from("tables.bin")),
                ("#Strings".to_string(), PathBuf::from("strings.bin")),
            ]
        );
        assert_eq!(config.output, PathBuf::from("out.bin"));
    }

    #[test]
    fn flags_map_to_header_options() {
        let config = Config::parse_from([
            "mdwriter",
            "--version-string",
            "v4.0.30319",
            "--minor",
            "0",
            "--extra-data",
        ]);
        let options = config.header_options();
        assert_eq!(options.version_string(), "v4.0.30319");
        assert_eq!(options.major_version(), 1);
        assert_eq!(options.minor_version(), 0);
        assert_eq!(options.storage_flags(), StorageFlags::EXTRA_DATA);
    }

    #[test]
    fn malformed_heap_is_rejected() {
        assert!(parse_heap_arg("#Blob").is_err());
        assert!(parse_heap_arg("=blob.bin").is_err());
        assert!(Config::try_parse_from(["mdwriter", "--heap", "#GUID="]).is_err());
    }
}
