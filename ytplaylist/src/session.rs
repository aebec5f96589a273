//! The session manager: login state plus the playlist operations built on it.

use crate::config::Config;
use crate::error::{MissingCredentialsFile, SessionError};
use crate::oauth::{ClientSecrets, OAuthManager, StoredToken, TimeBoundAccessToken};
use crate::pls::{self, PlaylistEntry};
use crate::youtube_api::client::MAX_PAGE_SIZE;
use crate::youtube_api::{Playlist, PlaylistOwner, YouTubeClient};
use eyre::Context;
use std::path::Path;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::instrument;

const OAUTH_DONE: &str = include_str!("../oauth_success.html");

/// A playlist as offered for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
}

impl From<Playlist> for PlaylistSummary {
    fn from(playlist: Playlist) -> Self {
        Self {
            id: playlist.id,
            title: playlist.snippet.title,
        }
    }
}

/// Who the manager is talking to YouTube as.
#[derive(Debug, Clone)]
pub enum Session {
    Unauthenticated,
    /// Logged in through OAuth; requests act on behalf of the user.
    Authenticated(YouTubeClient),
    /// Public data only, through an API key.
    Guest(YouTubeClient),
}

/// The shape of a [`Session`], without its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Guest,
}

/// Owns the login state and performs every playlist operation.
///
/// Operations take `&mut self` when they change the session, so a manager is only
/// ever driven by one caller at a time; see [`SessionWorker`](crate::SessionWorker)
/// for running it off the UI thread.
#[derive(Debug)]
pub struct SessionManager {
    config: Config,
    http: reqwest::Client,
    /// `None` leaves token exchanges to the OAuth manager's own client.
    oauth_http: Option<reqwest::Client>,
    session: Session,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            oauth_http: None,
            session: Session::Unauthenticated,
        }
    }

    /// Sends every request through `http`, OAuth token exchanges included.
    pub fn with_http_client(config: Config, http: reqwest::Client) -> Self {
        Self {
            config,
            oauth_http: Some(http.clone()),
            http,
            session: Session::Unauthenticated,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match self.session {
            Session::Unauthenticated => SessionState::Unauthenticated,
            Session::Authenticated(_) => SessionState::Authenticated,
            Session::Guest(_) => SessionState::Guest,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    fn client(&self) -> Result<&YouTubeClient, SessionError> {
        match &self.session {
            Session::Authenticated(client) | Session::Guest(client) => Ok(client),
            Session::Unauthenticated => Err(SessionError::NotAuthenticated),
        }
    }

    /// Reports the credential files that don't exist through `on_warning`.
    async fn check_files(&self, on_warning: &mut impl FnMut(MissingCredentialsFile)) {
        let mut missing = Vec::new();
        for path in [&self.config.client_secrets, &self.config.api_key_file] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                missing.push(path.clone());
            }
        }
        if !missing.is_empty() {
            tracing::warn!(?missing, "credential files are missing");
            on_warning(MissingCredentialsFile { missing });
        }
    }

    /// Logs in through OAuth.
    ///
    /// A stored token that hasn't expired is reused as-is; an expired one is
    /// refreshed. Otherwise (or if the refresh is refused) the user is sent through
    /// the browser-based consent flow. New and refreshed tokens are stored for the
    /// next run.
    ///
    /// Missing credential files are reported through `on_warning` before anything
    /// else happens. On failure the session is left as it was.
    #[instrument(skip_all)]
    pub async fn authenticate(
        &mut self,
        mut on_warning: impl FnMut(MissingCredentialsFile),
    ) -> Result<(), SessionError> {
        self.check_files(&mut on_warning).await;
        let client = self.authorize().await.map_err(SessionError::authentication)?;
        self.session = Session::Authenticated(client);
        tracing::info!("logged in to YouTube");
        Ok(())
    }

    async fn authorize(&self) -> eyre::Result<YouTubeClient> {
        let secrets = ClientSecrets::load(&self.config.client_secrets).await?;
        let mut oauth_manager = OAuthManager::new(secrets, OAUTH_DONE, self.config.launch_browser);
        if let Some(http) = &self.oauth_http {
            oauth_manager = oauth_manager.with_http_client(http.clone());
        }
        let oauth_manager = Arc::new(oauth_manager);

        let stored = StoredToken::load(&self.config.token_file).await?;
        let (token, changed) = match stored {
            Some(stored) => {
                let mut token = TimeBoundAccessToken::from(stored);
                if !token.is_expired() {
                    tracing::debug!("reusing stored token");
                    (token, false)
                } else if token
                    .refresh(&oauth_manager)
                    .await
                    .context("refresh stored token")?
                {
                    tracing::debug!("refreshed stored token");
                    (token, true)
                } else {
                    tracing::warn!("stored token could not be refreshed, getting new token via full OAuth");
                    let token = oauth_manager
                        .authenticate()
                        .await
                        .context("authorize user to YouTube")?;
                    (TimeBoundAccessToken::new(token), true)
                }
            }
            None => {
                let token = oauth_manager
                    .authenticate()
                    .await
                    .context("authorize user to YouTube")?;
                (TimeBoundAccessToken::new(token), true)
            }
        };

        if changed {
            token.to_stored()?.save(&self.config.token_file).await?;
        }

        Ok(YouTubeClient::authorized(
            token,
            oauth_manager,
            self.http.clone(),
            self.config.api_endpoint.clone(),
        ))
    }

    /// Switches to guest mode, which only sees public data.
    ///
    /// The API key is read from the configured key file. If that file doesn't exist
    /// the warning goes out through `on_warning` and the session still becomes a
    /// guest session, just one without a key; the API will refuse its requests.
    #[instrument(skip_all)]
    pub async fn continue_as_guest(
        &mut self,
        mut on_warning: impl FnMut(MissingCredentialsFile),
    ) -> Result<(), SessionError> {
        if let Session::Authenticated(_) = self.session {
            return Err(SessionError::AlreadyAuthenticated);
        }
        self.check_files(&mut on_warning).await;

        let path = &self.config.api_key_file;
        let api_key = match tokio::fs::read_to_string(path).await {
            Ok(key) => Some(key.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(SessionError::io(path, e)),
        };

        self.session = Session::Guest(YouTubeClient::with_api_key(
            api_key,
            self.http.clone(),
            self.config.api_endpoint.clone(),
        ));
        tracing::info!("continuing as guest");
        Ok(())
    }

    /// Deletes the stored OAuth token (a.k.a. "logout").
    ///
    /// The session itself stays logged in: the client keeps its token in memory, and
    /// it's up to the caller to end the session afterwards.
    pub async fn destroy_credentials(&self) -> Result<(), SessionError> {
        if !self.is_logged_in() {
            return Err(SessionError::NotAuthenticated);
        }
        let path = &self.config.token_file;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| SessionError::io(path, e))?;
        tracing::info!(path = %path.display(), "deleted stored credentials");
        Ok(())
    }

    /// Lists the playlists of `owner`, or of the logged-in user if there's no owner.
    ///
    /// `owner` is a legacy YouTube username. If it doesn't resolve to a channel the
    /// result is `Ok(None)`; a channel without playlists gives `Ok(Some(vec![]))`.
    ///
    /// Only the first page of up to 50 playlists is returned.
    #[instrument(skip(self))]
    pub async fn list_playlists(
        &self,
        owner: Option<&str>,
    ) -> Result<Option<Vec<PlaylistSummary>>, SessionError> {
        let client = self.client()?;
        let response = match owner.filter(|name| !name.is_empty()) {
            None => {
                client
                    .list_playlists_page(PlaylistOwner::Mine, MAX_PAGE_SIZE, None)
                    .await
            }
            Some(username) => {
                let channels = client
                    .list_channels_for_username(username)
                    .await
                    .map_err(SessionError::remote)?;
                let Some(channel) = channels.items.into_iter().next() else {
                    tracing::info!(username, "no channel found for username");
                    return Ok(None);
                };
                client
                    .list_playlists_page(PlaylistOwner::Channel(&channel.id), MAX_PAGE_SIZE, None)
                    .await
            }
        }
        .map_err(SessionError::remote)?;

        Ok(Some(
            response
                .items
                .into_iter()
                .map(PlaylistSummary::from)
                .collect(),
        ))
    }

    /// Writes every video of a playlist to `path` as a PLS playlist.
    ///
    /// All pages are fetched before anything is written, so a failed export leaves
    /// whatever was at `path` untouched. Returns the number of entries written.
    #[instrument(skip(self))]
    pub async fn export_playlist(
        &self,
        playlist_id: &str,
        path: &Path,
    ) -> Result<usize, SessionError> {
        let client = self.client()?;

        let items = client.list_playlist_items(playlist_id);
        let mut items = std::pin::pin!(items);
        let mut entries = Vec::new();
        while let Some(item) = items.next().await {
            let item = item.map_err(SessionError::remote)?;
            entries.push(PlaylistEntry {
                title: item.snippet.title,
                video_id: item.snippet.resource_id.video_id,
            });
        }

        pls::write(path, &entries)
            .await
            .map_err(|e| SessionError::io(path, e))?;

        tracing::info!(
            playlist_id,
            entries = entries.len(),
            path = %path.display(),
            "exported playlist"
        );
        Ok(entries.len())
    }
}
