#![forbid(unsafe_code)]

//! Command-line argument parsing.
//!
//! Parses args manually (no external dependencies) to keep the binary lean.

use std::env;
use std::process;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
boxen — terminal-rendered modular-computer emulator

USAGE:
    boxen [OPTIONS] <env-path>

ARGS:
    <env-path>      Environment directory holding client.cfg, the EEPROM
                    blobs, and per-volume storage. Created if missing.

OPTIONS:
    --headless      Run without taking over the terminal (no raw mode, no
                    key input); frames are still maintained and flushed to
                    a sink.
    --help, -h      Show this help message
    --version, -V   Show version

EXIT CODES:
    0   clean halt
    1   fatal initialization error
    2   guest crash";

/// Parsed options.
#[derive(Debug, Clone)]
pub struct Opts {
    pub env_path: String,
    pub headless: bool,
}

impl Opts {
    /// Parse from the process arguments; prints help/usage and exits on
    /// request or error.
    pub fn parse() -> Self {
        let mut env_path = None;
        let mut headless = false;

        for arg in env::args().skip(1) {
            match arg.as_str() {
                "--help" | "-h" => {
                    println!("{HELP_TEXT}");
                    process::exit(0);
                }
                "--version" | "-V" => {
                    println!("boxen {VERSION}");
                    process::exit(0);
                }
                "--headless" => headless = true,
                other if other.starts_with('-') => {
                    eprintln!("unknown option: {other}");
                    eprintln!("{HELP_TEXT}");
                    process::exit(1);
                }
                other => {
                    if env_path.replace(other.to_string()).is_some() {
                        eprintln!("expected exactly one environment path");
                        process::exit(1);
                    }
                }
            }
        }

        let Some(env_path) = env_path else {
            eprintln!("{HELP_TEXT}");
            process::exit(1);
        };
        Self { env_path, headless }
    }
}
