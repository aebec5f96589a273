use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use ytplaylist::youtube_api::ApiEndpoint;
use ytplaylist::{Config, ConsoleAdapter, Presenter, SessionManager};

/// Export a YouTube playlist to a PLS playlist file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// OAuth client registration from the Google API console.
    #[arg(long, env = "YTPLAYLIST_CLIENT_SECRETS", default_value = "client_secrets.json")]
    client_secrets: PathBuf,

    /// File holding the API key used when continuing as a guest.
    #[arg(long, env = "YTPLAYLIST_API_KEY_FILE", default_value = "api_key.txt")]
    api_key_file: PathBuf,

    /// Where the OAuth token is stored between runs.
    #[arg(long, env = "YTPLAYLIST_TOKEN_FILE", default_value = "oauth2.json")]
    token_file: PathBuf,

    /// Base URL of the YouTube Data API.
    #[arg(long, env = "YTPLAYLIST_API_BASE")]
    api_base: Option<String>,

    /// Print the authorization URL instead of opening a browser.
    #[arg(long)]
    no_browser: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            client_secrets: args.client_secrets,
            api_key_file: args.api_key_file,
            token_file: args.token_file,
            api_endpoint: args.api_base.map(ApiEndpoint::new).unwrap_or_default(),
            launch_browser: !args.no_browser,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // stdout belongs to the prompts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let manager = SessionManager::new(Config::from(args));
    let mut console = ConsoleAdapter::new(manager, std::io::stdin().lock(), std::io::stdout());
    if let Err(e) = console.start().await {
        tracing::debug!(error = ?e, "console session ended with an error");
        std::process::exit(1);
    }
}
