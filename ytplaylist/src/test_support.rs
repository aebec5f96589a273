//! A stand-in for the YouTube Data API served from localhost.

use crate::youtube_api::ApiEndpoint;
use http_body_util::Full;
use hyper::body::{self, Bytes};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

/// What the stub saw of one request.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
}

impl RecordedRequest {
    fn from_request(req: &Request<body::Incoming>) -> Self {
        Self {
            path: req.uri().path().to_string(),
            query: form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                .into_owned()
                .collect(),
            authorization: req
                .headers()
                .get(hyper::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// Serves canned JSON responses chosen by `route` and records every request.
pub(crate) struct StubYouTube {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubYouTube {
    pub async fn serve<F>(route: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub API listener");
        let addr = listener.local_addr().expect("stub API address");
        let route = Arc::new(route);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((conn, _)) = listener.accept().await {
                let route = Arc::clone(&route);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<body::Incoming>| {
                        let request = RecordedRequest::from_request(&req);
                        recorded.lock().unwrap().push(request.clone());
                        let (status, body) = route(&request);
                        let mut response = Response::new(Full::<Bytes>::from(body.to_string()));
                        *response.status_mut() = status;
                        response.headers_mut().insert(
                            hyper::header::CONTENT_TYPE,
                            hyper::header::HeaderValue::from_static("application/json"),
                        );
                        async move { Ok::<_, Infallible>(response) }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(hyper_util::rt::TokioIo::new(conn), service)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn endpoint(&self) -> ApiEndpoint {
        ApiEndpoint::new(format!("http://{}/youtube/v3", self.addr))
    }

    /// URL of an arbitrary path on the stub, e.g. an OAuth token endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// An HTTP client that talks to the stub directly, ignoring any proxy settings.
    pub fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("build test HTTP client")
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made to one resource, e.g. `"playlistItems"`.
    pub fn requests_to(&self, resource: &str) -> Vec<RecordedRequest> {
        let path = format!("/youtube/v3/{resource}");
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn playlist_item(title: &str, video_id: &str) -> Value {
        json!({
            "kind": "youtube#playlistItem",
            "id": format!("item-{video_id}"),
            "snippet": {
                "title": title,
                "resourceId": {"kind": "youtube#video", "videoId": video_id},
            },
        })
    }

    pub fn page(items: Vec<Value>, next_page_token: Option<&str>) -> Value {
        let mut page = json!({
            "items": items,
            "pageInfo": {"totalResults": 0, "resultsPerPage": 50},
        });
        if let Some(token) = next_page_token {
            page["nextPageToken"] = json!(token);
        }
        page
    }

    /// A page of playlist items whose video IDs are `id-<title>`.
    pub fn playlist_items_page(titles: &[&str], next_page_token: Option<&str>) -> Value {
        Self::page(
            titles
                .iter()
                .map(|title| Self::playlist_item(title, &format!("id-{title}")))
                .collect(),
            next_page_token,
        )
    }

    pub fn playlists_page(playlists: &[(&str, &str)]) -> Value {
        Self::page(
            playlists
                .iter()
                .map(|(id, title)| json!({"kind": "youtube#playlist", "id": id, "snippet": {"title": title}}))
                .collect(),
            None,
        )
    }
}
