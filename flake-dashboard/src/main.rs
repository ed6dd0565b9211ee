//! Flake Music - Terminal Player Dashboard
//!
//! Follows one guild's player on the bot backend with a live terminal view.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --guild 1234 --no-dashboard   # Plain logging mode
//!   cargo run --release -- --import <url> --user <id>    # Import a playlist

mod activity;
mod dashboard;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flake_core::import::{import_playlist, ImportStatus};
use flake_core::{init_tracing, BotApiClient, ClientConfig, SyncConfig, SyncSession};
use parking_lot::RwLock;
use tracing::info;

use activity::{Activity, ActivityRecorder, LogLevel};

/// Terminal dashboard for a Flake Music guild player
#[derive(Debug, Parser)]
#[command(name = "flake-dashboard", version, about)]
struct Args {
    /// Guild to follow (defaults to the first active player)
    #[arg(long, value_name = "ID")]
    guild: Option<String>,

    /// Bot REST API base URL (env FLAKE_API_URL)
    #[arg(long = "api", value_name = "URL")]
    api_url: Option<String>,

    /// Bot WebSocket base URL (env FLAKE_WS_URL)
    #[arg(long = "ws", value_name = "URL")]
    ws_url: Option<String>,

    /// Bearer token (env FLAKE_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// JSON file with sync timing overrides
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Plain logging instead of the terminal UI
    #[arg(long)]
    no_dashboard: bool,

    /// Import a playlist and exit
    #[arg(long = "import", value_name = "URL", requires = "user_id")]
    import_url: Option<String>,

    /// Owner of the imported playlist
    #[arg(long = "user", value_name = "ID")]
    user_id: Option<String>,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        config
    }

    fn sync_config(&self) -> Result<SyncConfig, Box<dyn std::error::Error>> {
        match &self.config_path {
            Some(path) => {
                let json = std::fs::read_to_string(path)?;
                Ok(SyncConfig::from_json(&json)?)
            }
            None => Ok(SyncConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let client_config = args.client_config();

    if let (Some(url), Some(user)) = (&args.import_url, &args.user_id) {
        init_tracing();
        return run_import(&client_config, url, user).await;
    }

    if args.no_dashboard {
        init_tracing();
    }

    // Shared activity state
    let activity = Arc::new(RwLock::new(Activity::new()));
    report_bot_status(&client_config, &activity).await;

    let session = Arc::new(SyncSession::connect(client_config, args.sync_config()?)?);
    if let Some(guild) = &args.guild {
        session.select_guild(guild.clone());
    }

    session.set_callback(Arc::new(ActivityRecorder::new(Arc::clone(&activity))));
    session.start();

    let result = if args.no_dashboard {
        // Run with plain logging
        info!("Following player, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await.map_err(Into::into)
    } else {
        // Run with TUI dashboard
        dashboard::run(Arc::clone(&session), activity).await
    };

    session.shutdown();
    result
}

fn api_client(config: &ClientConfig) -> Result<BotApiClient, Box<dyn std::error::Error>> {
    config.validate()?;
    let mut client = BotApiClient::new(config)?;
    if let Some(token) = &config.token {
        client = client.with_token(token.clone());
    }
    Ok(client)
}

/// One status check before following the player
async fn report_bot_status(config: &ClientConfig, activity: &RwLock<Activity>) {
    let client = api_client(config).map_err(|e| e.to_string());
    let status = match client {
        Ok(client) => client.status().await.map_err(|e| e.to_string()),
        Err(e) => Err(e),
    };
    let mut activity = activity.write();
    match status {
        Ok(status) if status.bot_online => activity.log(LogLevel::Info, "Bot online"),
        Ok(status) => activity.log(
            LogLevel::Warning,
            format!("Bot offline: {}", status.error.unwrap_or_default()),
        ),
        Err(e) => activity.error(format!("Bot status unavailable: {}", e)),
    }
}

async fn run_import(config: &ClientConfig, url: &str, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let client = api_client(config)?;

    let progress = import_playlist(&client, url, user, |p| {
        if p.status == ImportStatus::Running {
            println!(
                "[{:>3}%] {}/{} {}",
                p.percent(),
                p.current,
                p.total,
                p.track_title.as_deref().unwrap_or("")
            );
        }
    })
    .await?;

    println!(
        "Imported {} tracks into {}",
        progress.total,
        progress.playlist_name.as_deref().unwrap_or("playlist")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("flake-dashboard").chain(args.iter().copied()))
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&[]).unwrap();
        assert!(args.guild.is_none());
        assert!(!args.no_dashboard);
        assert!(args.import_url.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let args = parse(&["--guild", "42", "--api", "http://bot:3001", "--no-dashboard"]).unwrap();
        assert_eq!(args.guild.as_deref(), Some("42"));
        assert_eq!(args.api_url.as_deref(), Some("http://bot:3001"));
        assert!(args.no_dashboard);
        assert_eq!(args.client_config().api_url, "http://bot:3001");
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&["--guild"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--import", "https://example.com/list"]).is_err());
        assert!(parse(&["--import", "https://example.com/list", "--user", "7"]).is_ok());
    }
}
