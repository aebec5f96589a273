use crate::youtube_api::ApiStatusError;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`SessionManager`](crate::SessionManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs an authorized or guest session, and there is none.
    #[error("not logged in")]
    NotAuthenticated,

    /// Guest mode was requested after logging in; sessions never downgrade.
    #[error("already logged in; restart to continue as a guest")]
    AlreadyAuthenticated,

    #[error("authentication with YouTube failed")]
    AuthenticationFailed {
        #[source]
        source: BoxError,
    },

    /// Any transport or API-level failure while talking to YouTube.
    #[error("YouTube API request failed")]
    RemoteApi {
        /// The HTTP status, when the API answered at all.
        status: Option<StatusCode>,
        #[source]
        source: BoxError,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    pub(crate) fn authentication(report: eyre::Report) -> Self {
        Self::AuthenticationFailed {
            source: report.into(),
        }
    }

    pub(crate) fn remote(report: eyre::Report) -> Self {
        let status = report
            .chain()
            .find_map(|e| e.downcast_ref::<ApiStatusError>())
            .map(|e| e.status);
        Self::RemoteApi {
            status,
            source: report.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Some of the files needed to talk to the YouTube API don't exist.
///
/// This is a warning, not an error: the operation that noticed it carries on, and
/// fails later only if a missing file turns out to be needed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Some files required for authenticating to the YouTube API are missing ({}). Please consult README if in doubt.",
    .missing.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
)]
pub struct MissingCredentialsFile {
    pub missing: Vec<PathBuf>,
}

impl MissingCredentialsFile {
    pub const TITLE: &'static str = "Missing files";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_finds_status_under_context() {
        let report = eyre::Report::new(ApiStatusError {
            url: "https://example.invalid/playlists".to_string(),
            status: StatusCode::NOT_FOUND,
            message: "playlist not found".to_string(),
        })
        .wrap_err("fetch items of playlist PL1");

        let err = SessionError::remote(report);
        let SessionError::RemoteApi { status, .. } = &err else {
            panic!("expected a remote API error");
        };
        assert_eq!(*status, Some(StatusCode::NOT_FOUND));

        let shown = format!("{:#}", eyre::Report::new(err));
        assert!(
            shown.starts_with("YouTube API request failed: fetch items of playlist PL1: "),
            "{shown}"
        );
        assert_eq!(shown.matches("playlist not found").count(), 1, "{shown}");
    }

    #[test]
    fn authentication_error_shows_each_cause_once() {
        let report = eyre::eyre!("invalid_grant").wrap_err("refresh stored token");

        let shown = format!("{:#}", eyre::Report::new(SessionError::authentication(report)));
        assert_eq!(
            shown,
            "authentication with YouTube failed: refresh stored token: invalid_grant"
        );
    }

    #[test]
    fn transport_errors_have_no_status() {
        let SessionError::RemoteApi { status, .. } =
            SessionError::remote(eyre::eyre!("connection refused"))
        else {
            panic!("expected a remote API error");
        };
        assert_eq!(status, None);
    }

    #[test]
    fn missing_files_are_listed() {
        let warning = MissingCredentialsFile {
            missing: vec!["client_secrets.json".into(), "api_key.txt".into()],
        };
        let text = warning.to_string();
        assert!(text.contains("(client_secrets.json, api_key.txt)"), "{text}");
    }
}
