//! OAuth 2.0 management for YouTube API authentication.
//!
//! This module covers everything needed to obtain and keep an authorized identity:
//! reading the client-secret descriptor issued by the Google API console, running
//! the authorization-code flow (with PKCE and a loopback redirect), refreshing
//! expired tokens, and persisting tokens between runs.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use jiff::Timestamp;
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl, reqwest,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Google OAuth2 authorization endpoint, used when the descriptor doesn't name one.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint, used when the descriptor doesn't name one.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to the user's YouTube account.
const YOUTUBE_SCOPE: &str = "https://www.googleapis.com/auth/youtube";

/// The OAuth client registration from a `client_secrets.json` file.
///
/// Google hands these out with the registration nested under either `installed`
/// (desktop applications) or `web`. Both are accepted.
///
/// See: <https://developers.google.com/api-client-library/dotnet/guide/aaa_client_secrets>
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
enum ClientSecretsFile {
    #[serde(rename = "installed")]
    Installed(ClientSecrets),
    #[serde(rename = "web")]
    Web(ClientSecrets),
}

impl ClientSecrets {
    /// Parses the JSON contents of a client-secret descriptor.
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("parse client secrets descriptor")?;
        Ok(match file {
            ClientSecretsFile::Installed(secrets) | ClientSecretsFile::Web(secrets) => secrets,
        })
    }

    pub async fn load(path: &Path) -> eyre::Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read client secrets from {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// An OAuth token as it is kept on disk between runs.
///
/// The token response itself only carries a relative `expires_in`, so the absolute
/// expiry is recorded alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: BasicTokenResponse,
    pub expires_at: Timestamp,
}

impl StoredToken {
    /// Loads a previously stored token.
    ///
    /// Returns `Ok(None)` when there is no token file, or when the file doesn't hold a
    /// token we can use, in which case the caller should run the full flow again.
    pub async fn load(path: &Path) -> eyre::Result<Option<Self>> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read stored token {}", path.display()));
            }
        };
        match serde_json::from_str(&json) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable stored token");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, path: &Path) -> eyre::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize OAuth token")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("write token to {}", path.display()))
    }
}

/// An OAuth token together with the point in time it stops being usable.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    /// When the access token expires (with safety buffer)
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a freshly issued token, computing its expiry from `expires_in`.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn to_stored(&self) -> eyre::Result<StoredToken> {
        Ok(StoredToken {
            token: self.token.clone(),
            expires_at: Timestamp::try_from(self.expires_at).context("convert token expiry")?,
        })
    }

    /// Refreshes this token in place, preserving the refresh token if the new
    /// response doesn't carry one.
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh was rejected (invalid grant, no refresh token)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        let Some(new_token) = oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        else {
            return Ok(false);
        };

        let old_token = std::mem::replace(&mut self.token, new_token);
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        self.expires_at = Self::calculate_token_expiry(&self.token);
        Ok(true)
    }

    /// Current time + `expires_in` - 5 minute safety buffer, or 55 minutes when the
    /// server didn't say.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        match token.expires_in() {
            Some(expires_in) => (now + expires_in)
                .checked_sub(Duration::from_secs(300))
                .unwrap_or(now),
            None => now + Duration::from_secs(3300),
        }
    }
}

impl From<StoredToken> for TimeBoundAccessToken {
    fn from(stored: StoredToken) -> Self {
        Self {
            token: stored.token,
            expires_at: SystemTime::from(stored.expires_at),
        }
    }
}

/// Runs the OAuth 2.0 flows for one client registration.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    secrets: ClientSecrets,
    oauth_done_html: &'static str,
    launch_browser: bool,
    /// Overrides the client used for token exchanges.
    http: Option<reqwest::Client>,
}

impl OAuthManager {
    /// Creates an OAuth manager for the given client registration.
    ///
    /// `oauth_done_html` is shown in the user's browser once the redirect arrives.
    /// When `launch_browser` is false the authorization URL is printed instead of
    /// opened, for terminals without a desktop session.
    pub fn new(secrets: ClientSecrets, oauth_done_html: &'static str, launch_browser: bool) -> Self {
        Self {
            secrets,
            oauth_done_html,
            launch_browser,
            http: None,
        }
    }

    /// Sends token exchanges through `http` instead of a client that refuses to
    /// follow redirects.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    fn token_url(&self) -> eyre::Result<TokenUrl> {
        TokenUrl::new(
            self.secrets
                .token_uri
                .clone()
                .unwrap_or_else(|| TOKEN_URL.to_string()),
        )
        .context("parse token endpoint URL")
    }

    fn http_client(&self) -> eyre::Result<reqwest::Client> {
        if let Some(http) = &self.http {
            return Ok(http.clone());
        }
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")
    }

    /// Performs a complete authorization-code flow and returns the issued token.
    ///
    /// 1. Starts a loopback HTTP server to receive the redirect
    /// 2. Sends the user to Google's consent page
    /// 3. Exchanges the returned code (plus PKCE verifier) for a token
    pub async fn authenticate(&self) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let auth_url = AuthUrl::new(
            self.secrets
                .auth_uri
                .clone()
                .unwrap_or_else(|| AUTH_URL.to_string()),
        )
        .context("parse authorization endpoint URL")?;
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(self.token_url()?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scope(Scope::new(YOUTUBE_SCOPE.to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if self.launch_browser {
            webbrowser::open(auth_url.as_ref()).context("open user's browser")?;
        } else {
            eprintln!("Open this URL in a browser to authorize access to YouTube:\n\n    {auth_url}\n");
        }
        let authorization_code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        let token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http_client()?)
            .await
            .context("exchange authorization code with access token")?;

        Ok(token)
    }

    /// Exchanges the refresh token in `token` for a new access token.
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded
    /// * `Ok(None)` - No refresh token, or the server says the grant is no longer valid
    /// * `Err(_)` - Network or other error occurred during refresh attempt
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");
        let client = BasicClient::new(ClientId::new(self.secrets.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.secrets.client_secret.clone()))
            .set_token_uri(self.token_url()?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&self.http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Starts a one-shot HTTP server on a random local port for the OAuth redirect.
    ///
    /// Returns the redirect URL to hand to Google and a future that resolves to the
    /// authorization code once a request with a matching `state` arrives.
    pub(crate) async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<AuthorizationCode>> + Send + use<>,
    )> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        let oauth_done = self.oauth_done_html;
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let mut presented_state = None;
                        let mut presented_code = None;
                        for (k, v) in
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                        {
                            match &*k {
                                "state" => presented_state = Some(v),
                                "code" => presented_code = Some(v),
                                _ => {}
                            }
                        }
                        if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let Some(code) = presented_code else {
                            return Err("no authorization code found");
                        };
                        let code = AuthorizationCode::new(code.into_owned());
                        if got.send(code).await.is_err() {
                            return Err("redirect already handled");
                        }
                        Ok(Response::new(Full::<Bytes>::from(oauth_done)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    code = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        // let the browser receive the completion page
                        let _ = serve.await;
                        code.ok_or_else(|| eyre::eyre!("redirect handler dropped"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}
