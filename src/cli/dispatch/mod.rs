//! Map validated CLI arguments to an action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::session;
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        session_dir: session_opts.session_dir,
        session_lifetime_seconds: session_opts.lifetime_seconds,
        cookie_secure: session_opts.cookie_secure,
        principals_file: session_opts.principals_file,
        sweep_interval_seconds: session_opts.sweep_interval_seconds,
    }))
}
