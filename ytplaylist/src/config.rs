use crate::youtube_api::ApiEndpoint;
use std::path::PathBuf;

/// Where the session manager finds its local files and the API.
///
/// The defaults are relative to the working directory, which is where the
/// credential files are expected to be dropped.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth client registration downloaded from the Google API console.
    pub client_secrets: PathBuf,
    /// Plain-text API key used for guest access.
    pub api_key_file: PathBuf,
    /// Where the authorized user's OAuth token is kept between runs.
    pub token_file: PathBuf,
    pub api_endpoint: ApiEndpoint,
    /// Open the authorization page in a browser, rather than printing its URL.
    pub launch_browser: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("client_secrets.json"),
            api_key_file: PathBuf::from("api_key.txt"),
            token_file: PathBuf::from("oauth2.json"),
            api_endpoint: ApiEndpoint::default(),
            launch_browser: true,
        }
    }
}

impl Config {
    /// Default file names, placed under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let defaults = Self::default();
        Self {
            client_secrets: dir.join(defaults.client_secrets),
            api_key_file: dir.join(defaults.api_key_file),
            token_file: dir.join(defaults.token_file),
            ..defaults
        }
    }
}
