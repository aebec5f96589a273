//! Core YouTube API client functionality and request authorization.

use crate::oauth::{OAuthManager, TimeBoundAccessToken};
use crate::youtube_api::{
    channels::ChannelListResponse,
    playlist_items::{PlaylistItem, PlaylistItemListResponse},
    playlists::PlaylistListResponse,
    types::PagedStream,
};
use eyre::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

/// Base URL of the hosted YouTube Data API v3.
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// The largest page size the list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Where the YouTube Data API lives.
///
/// Only ever differs from [`DEFAULT_API_BASE`] when pointing the client at a proxy or
/// a local stand-in for the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint(String);

impl ApiEndpoint {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self(base)
    }

    /// URL of a list endpoint, e.g. `resource("playlists")`.
    pub fn resource(&self, resource: &str) -> String {
        format!("{}/{resource}", self.0)
    }
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// A non-success response from the YouTube API.
#[derive(Debug, thiserror::Error)]
#[error("YouTube API request to {url} failed with status {status}: {message}")]
pub struct ApiStatusError {
    pub url: String,
    pub status: StatusCode,
    /// The `error.message` from the response body, or the raw body if it had none.
    pub message: String,
}

impl ApiStatusError {
    fn from_body(url: &str, status: StatusCode, body: String) -> Self {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: ErrorDetail,
        }
        #[derive(serde::Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error.message,
            Err(_) => body,
        };
        Self {
            url: url.to_string(),
            status,
            message,
        }
    }
}

/// Which playlists a `playlists.list` call should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistOwner<'a> {
    /// The playlists of the authorized user (`mine=true`).
    Mine,
    /// The public playlists of the given channel.
    Channel(&'a str),
}

/// How requests are authorized.
#[derive(Debug, Clone)]
enum Authorization {
    /// OAuth bearer token, refreshed automatically once expired.
    Bearer {
        token: Arc<Mutex<TimeBoundAccessToken>>,
        oauth_manager: Arc<OAuthManager>,
    },
    /// Public-data access through an API key sent as the `key` query parameter.
    ///
    /// `None` when no key was available; requests go out without one and the API
    /// decides what to do with them.
    ApiKey(Option<String>),
}

/// Client for the YouTube Data API v3.
///
/// Cloning is cheap and clones share the same token.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    authorization: Authorization,
    endpoint: ApiEndpoint,
    /// HTTP client for API requests
    client: reqwest::Client,
}

impl YouTubeClient {
    /// Creates a client acting on behalf of the user who authorized `token`.
    pub fn authorized(
        token: TimeBoundAccessToken,
        oauth_manager: Arc<OAuthManager>,
        client: reqwest::Client,
        endpoint: ApiEndpoint,
    ) -> Self {
        Self {
            authorization: Authorization::Bearer {
                token: Arc::new(Mutex::new(token)),
                oauth_manager,
            },
            endpoint,
            client,
        }
    }

    /// Creates a client that only has access to public data, identified by `api_key`.
    pub fn with_api_key(
        api_key: Option<String>,
        client: reqwest::Client,
        endpoint: ApiEndpoint,
    ) -> Self {
        Self {
            authorization: Authorization::ApiKey(api_key),
            endpoint,
            client,
        }
    }

    /// Gets a guaranteed-fresh access token, refreshing it first if it has expired.
    #[instrument(skip_all)]
    async fn fresh_access_token(
        token: &Mutex<TimeBoundAccessToken>,
        oauth_manager: &OAuthManager,
    ) -> eyre::Result<String> {
        let mut token = token.lock().await;
        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");
            if !token.refresh(oauth_manager).await? {
                tracing::error!("access token refresh failed, client is unusable");
                eyre::bail!("unable to refresh expired access token");
            }
            tracing::debug!("access token successfully refreshed");
        }
        Ok(token.access_token().to_string())
    }

    /// Makes an authorized GET request to a YouTube API list endpoint and parses the
    /// JSON response.
    ///
    /// Bearer-authorized clients send an `Authorization` header; API key clients add
    /// `key` to the query. Non-success statuses become an [`ApiStatusError`].
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn get_json<R: DeserializeOwned>(
        &self,
        resource: &str,
        query_params: &[(&str, &str)],
    ) -> eyre::Result<R> {
        let url = self.endpoint.resource(resource);
        let mut request = self.client.get(&url).query(query_params);

        match &self.authorization {
            Authorization::Bearer {
                token,
                oauth_manager,
            } => {
                let access_token = Self::fresh_access_token(token, oauth_manager).await?;
                request = request.bearer_auth(access_token);
            }
            Authorization::ApiKey(Some(key)) => {
                request = request.query(&[("key", key.as_str())]);
            }
            Authorization::ApiKey(None) => {}
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send request to YouTube API: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ApiStatusError::from_body(&url, status, body).into());
        }

        response
            .json()
            .await
            .with_context(|| format!("parse YouTube {resource} API response as JSON"))
    }

    /// Looks up the channel(s) registered under a legacy YouTube username.
    ///
    /// Uses `channels.list` with `forUsername`. An unknown username yields a response
    /// with no items rather than an error.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self))]
    pub async fn list_channels_for_username(
        &self,
        username: &str,
    ) -> eyre::Result<ChannelListResponse> {
        let channels: ChannelListResponse = self
            .get_json("channels", &[("part", "id"), ("forUsername", username)])
            .await?;

        tracing::debug!(
            username,
            returned_items = channels.items.len(),
            "resolved username to channels"
        );

        Ok(channels)
    }

    /// Fetches a single page of playlists.
    ///
    /// Uses `playlists.list` with either `mine=true` or `channelId`, depending on
    /// `owner`. Listing [`PlaylistOwner::Mine`] only works for authorized clients.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlists/list>
    #[instrument(skip(self))]
    pub async fn list_playlists_page(
        &self,
        owner: PlaylistOwner<'_>,
        max_results: u32,
        page_token: Option<&str>,
    ) -> eyre::Result<PlaylistListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet"),
            ("maxResults", max_results_string.as_str()),
        ];
        match owner {
            PlaylistOwner::Mine => query_params.push(("mine", "true")),
            PlaylistOwner::Channel(channel_id) => query_params.push(("channelId", channel_id)),
        }
        if let Some(token) = page_token {
            query_params.push(("pageToken", token));
        }

        let playlists: PlaylistListResponse = self.get_json("playlists", &query_params).await?;

        tracing::debug!(
            total_results = playlists.page_info.total_results,
            returned_items = playlists.items.len(),
            "fetched playlists"
        );

        Ok(playlists)
    }

    /// Returns a stream of every item in a playlist, in playlist order.
    ///
    /// Pages of [`MAX_PAGE_SIZE`] items are requested from `playlistItems.list` as the
    /// stream is consumed.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub fn list_playlist_items<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> impl Stream<Item = eyre::Result<PlaylistItem>> + use<'a> {
        PagedStream::new(move |page_token| async move {
            let response = self
                .playlist_items_page(playlist_id, MAX_PAGE_SIZE, page_token.as_deref())
                .await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Fetches a single page of `playlistItems.list`.
    pub async fn playlist_items_page(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<&str>,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results_string.as_str()),
        ];
        if let Some(token) = page_token {
            query_params.push(("pageToken", token));
        }

        let items: PlaylistItemListResponse = self
            .get_json("playlistItems", &query_params)
            .await
            .with_context(|| format!("fetch items of playlist {playlist_id}"))?;

        tracing::debug!(
            playlist_id,
            total_results = items.page_info.total_results,
            returned_items = items.items.len(),
            has_next_page = items.next_page_token.is_some(),
            "fetched playlist items"
        );

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubYouTube;
    use serde_json::json;
    use tokio_stream::StreamExt;

    #[test]
    fn endpoint_trims_trailing_slashes() {
        let endpoint = ApiEndpoint::new("http://localhost:1234/youtube/v3//");
        assert_eq!(
            endpoint.resource("playlists"),
            "http://localhost:1234/youtube/v3/playlists"
        );
    }

    #[tokio::test]
    async fn api_key_is_sent_as_query_parameter() {
        let stub = StubYouTube::serve(|_| {
            (
                StatusCode::OK,
                json!({"items": [{"id": "UC123"}], "pageInfo": {"totalResults": 1, "resultsPerPage": 5}}),
            )
        })
        .await;
        let client = YouTubeClient::with_api_key(
            Some("secret-key".to_string()),
            stub.http_client(),
            stub.endpoint(),
        );

        let channels = client.list_channels_for_username("someone").await.unwrap();
        assert_eq!(channels.items[0].id, "UC123");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/youtube/v3/channels");
        assert_eq!(requests[0].param("key"), Some("secret-key"));
        assert_eq!(requests[0].param("forUsername"), Some("someone"));
        assert_eq!(requests[0].authorization, None);
    }

    #[tokio::test]
    async fn error_status_carries_api_message() {
        let stub = StubYouTube::serve(|_| {
            (
                StatusCode::FORBIDDEN,
                json!({"error": {"code": 403, "message": "The request is missing a valid API key."}}),
            )
        })
        .await;
        let client = YouTubeClient::with_api_key(None, stub.http_client(), stub.endpoint());

        let err = client
            .list_playlists_page(PlaylistOwner::Mine, MAX_PAGE_SIZE, None)
            .await
            .unwrap_err();
        let status_error = err.downcast_ref::<ApiStatusError>().unwrap();
        assert_eq!(status_error.status, StatusCode::FORBIDDEN);
        assert_eq!(
            status_error.message,
            "The request is missing a valid API key."
        );
        assert_eq!(stub.requests()[0].param("key"), None);
    }

    #[tokio::test]
    async fn playlist_items_stream_walks_every_page() {
        let stub = StubYouTube::serve(|request| {
            let (items, next) = match request.param("pageToken") {
                None => (vec!["a", "b"], Some("p1")),
                Some("p1") => (vec!["c"], None),
                Some(other) => panic!("unexpected page token {other}"),
            };
            (StatusCode::OK, StubYouTube::playlist_items_page(&items, next))
        })
        .await;
        let client = YouTubeClient::with_api_key(
            Some("k".to_string()),
            stub.http_client(),
            stub.endpoint(),
        );

        let titles: Vec<String> = client
            .list_playlist_items("PL1")
            .map(|item| item.unwrap().snippet.title)
            .collect()
            .await;

        assert_eq!(titles, ["a", "b", "c"]);
        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        for request in &requests {
            assert_eq!(request.param("playlistId"), Some("PL1"));
            assert_eq!(request.param("maxResults"), Some("50"));
            assert_eq!(request.param("key"), Some("k"));
        }
    }
}
