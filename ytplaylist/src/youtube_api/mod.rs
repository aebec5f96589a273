//! YouTube Data API v3 client library.
//!
//! Only the read-side resources needed to browse and export playlists are modelled:
//!
//! - [`channels`]: resolving a legacy username to its channel ID
//! - [`playlists`]: the playlists owned by a channel (or by the authorized user)
//! - [`playlist_items`]: the videos in a playlist, in playlist order
//!
//! Requests are authorized either with an OAuth access token (see
//! [`YouTubeClient::authorized`]) or with a plain API key (see
//! [`YouTubeClient::with_api_key`]), which only grants access to public data.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tokio_stream::StreamExt;
//! use ytplaylist::youtube_api::{ApiEndpoint, YouTubeClient};
//!
//! # async fn example() -> eyre::Result<()> {
//! let client = YouTubeClient::with_api_key(
//!     Some("my-api-key".to_string()),
//!     reqwest::Client::new(),
//!     ApiEndpoint::default(),
//! );
//!
//! let items = client.list_playlist_items("PL590L5WQmH8fJ54F369BLDSqIwcs-TCfs");
//! let mut items = std::pin::pin!(items);
//! while let Some(item) = items.next().await {
//!     let item = item?;
//!     println!("{} ({})", item.snippet.title, item.snippet.resource_id.video_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod client;
pub mod playlist_items;
pub mod playlists;
pub mod types;

pub use client::{ApiEndpoint, ApiStatusError, PlaylistOwner, YouTubeClient};
pub use types::{PageInfo, PagedStream};

pub use channels::Channel;
pub use playlist_items::{PlaylistItem, PlaylistItemSnippet, ResourceId};
pub use playlists::{Playlist, PlaylistSnippet};
