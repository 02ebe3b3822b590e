use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

pub const ARG_SESSION_DIR: &str = "session-dir";
pub const ARG_SESSION_LIFETIME_SECONDS: &str = "session-lifetime-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_PRINCIPALS_FILE: &str = "principals-file";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_DIR)
                .long(ARG_SESSION_DIR)
                .help("Directory holding session records and the per-subject index")
                .env("SESSIOND_SESSION_DIR")
                .default_value("tmp/sessions")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_SESSION_LIFETIME_SECONDS)
                .long(ARG_SESSION_LIFETIME_SECONDS)
                .help("Sliding session lifetime in seconds")
                .env("SESSIOND_SESSION_LIFETIME_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure (TLS terminated upstream)")
                .env("SESSIOND_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_PRINCIPALS_FILE)
                .long(ARG_PRINCIPALS_FILE)
                .help("JSON file with login principals; without it every login is rejected")
                .env("SESSIOND_PRINCIPALS_FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between background sweeps of expired sessions, 0 disables")
                .env("SESSIOND_SWEEP_INTERVAL_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub session_dir: PathBuf,
    pub lifetime_seconds: i64,
    pub cookie_secure: bool,
    pub principals_file: Option<PathBuf>,
    pub sweep_interval_seconds: u64,
}

impl Options {
    /// Parse session options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let session_dir = matches
            .get_one::<PathBuf>(ARG_SESSION_DIR)
            .cloned()
            .context("missing required argument: --session-dir")?;
        let lifetime_seconds = matches
            .get_one::<i64>(ARG_SESSION_LIFETIME_SECONDS)
            .copied()
            .context("missing required argument: --session-lifetime-seconds")?;
        let sweep_interval_seconds = matches
            .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
            .copied()
            .unwrap_or(0);

        Ok(Self {
            session_dir,
            lifetime_seconds,
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            principals_file: matches.get_one::<PathBuf>(ARG_PRINCIPALS_FILE).cloned(),
            sweep_interval_seconds,
        })
    }
}
