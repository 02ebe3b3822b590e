use crate::session::{SessionConfig, SessionManager};
use crate::sessiond::{
    self,
    auth::{Authenticator, NoopAuthenticator, PrincipalsFile},
    AppState,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub session_dir: PathBuf,
    pub session_lifetime_seconds: i64,
    pub cookie_secure: bool,
    pub principals_file: Option<PathBuf>,
    pub sweep_interval_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the session directory or principals file is unusable,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    tokio::fs::create_dir_all(&args.session_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create session directory: {}",
                args.session_dir.display()
            )
        })?;

    let authenticator: Arc<dyn Authenticator> = match &args.principals_file {
        Some(path) => {
            let principals = PrincipalsFile::load(path).await?;
            info!("Loaded {} principals from {}", principals.len(), path.display());
            Arc::new(principals)
        }
        None => {
            warn!("No principals file configured, every login will be rejected");
            Arc::new(NoopAuthenticator)
        }
    };

    let config = SessionConfig::new(&args.session_dir)
        .with_lifetime_seconds(args.session_lifetime_seconds);
    info!(
        "Sessions stored under {} (lifetime {}s)",
        config.base_dir().display(),
        config.lifetime_seconds()
    );

    let state = Arc::new(AppState::new(
        SessionManager::new(config),
        args.cookie_secure,
        authenticator,
    ));

    let sweep_interval =
        (args.sweep_interval_seconds > 0).then(|| Duration::from_secs(args.sweep_interval_seconds));

    sessiond::new(args.port, state, sweep_interval).await
}
