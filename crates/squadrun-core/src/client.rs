//! API client: pacing, HTTP transport, and typed decoding.
//!
//! `ApiClient` is generic over [`Transport`] so sweeps and the processor can
//! be driven against an in-memory server in tests. `HttpTransport` is the
//! reqwest-backed implementation used by the binary.

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use squadrun_proto::{ApiError, ApiRequest, ApiResult, Method, Transport};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::{ApiConfig, ConfigError};

/// Issues one call at a time with a fixed delay before each.
pub struct ApiClient<T> {
    transport: T,
    pacing: Duration,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, pacing: Duration) -> Self {
        Self { transport, pacing }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` and decodes the body into `R`.
    ///
    /// Sleeps the pacing delay first, whatever the outcome. Every failure is
    /// logged here, on the error channel, before it is returned.
    pub async fn call<R: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<R> {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        debug!(method = %request.method, path = %request.path, "API call");
        let body = match self.transport.send(&request).await {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "API call failed");
                return Err(e);
            }
        };

        serde_json::from_value(body).map_err(|e| {
            let err = ApiError::Malformed {
                path: request.path.clone(),
                reason: e.to_string(),
            };
            error!(error = %err, "API response did not match schema");
            err
        })
    }
}

/// reqwest-backed transport against a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport. A missing trailing slash on the base URL is
    /// added so request paths are appended rather than substituted.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let mut base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            client: reqwest::Client::new(),
            timeout,
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Transport {
                path: path.to_string(),
                reason: format!("invalid request path: {e}"),
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
        let url = self.url_for(&request.path)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self
            .client
            .request(method, url)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/json");
        if let Some(ref token) = request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let transport_error = |e: reqwest::Error| match self.timeout {
            Some(timeout) if e.is_timeout() => ApiError::Timeout {
                path: request.path.clone(),
                timeout,
            },
            _ => ApiError::Transport {
                path: request.path.clone(),
                reason: e.to_string(),
            },
        };

        let resp = builder.send().await.map_err(&transport_error)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                path: request.path.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await.map_err(&transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Malformed {
            path: request.path.clone(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use squadrun_proto::UserStatus;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct CannedTransport {
        reply: ApiResult<Value>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn canned(reply: ApiResult<Value>) -> ApiClient<CannedTransport> {
        ApiClient::new(
            CannedTransport {
                reply,
                seen: Mutex::new(Vec::new()),
            },
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_call_decodes_schema() {
        let client = canned(Ok(json!({
            "nickName": "pilot", "level": 3, "squadCoin": 10, "fuel": 2
        })));
        let user: UserStatus = client
            .call(ApiRequest::get("user").with_token("t"))
            .await
            .unwrap();
        assert_eq!(user.fuel, 2);
        assert_eq!(client.transport().seen.lock().unwrap()[0].token.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_malformed() {
        let client = canned(Ok(json!({"nickName": "pilot"})));
        let err = client
            .call::<UserStatus>(ApiRequest::get("user"))
            .await
            .unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(err.path(), "user");
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let client = canned(Err(ApiError::Status {
            path: "user".to_string(),
            status: 500,
            body: "boom".to_string(),
        }));
        let err = client
            .call::<UserStatus>(ApiRequest::get("user"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:9000/api", None).unwrap();
        assert_eq!(transport.base_url().as_str(), "http://localhost:9000/api/");
        assert_eq!(
            transport.url_for("squad/assistance?squadName=DAKI").unwrap().as_str(),
            "http://localhost:9000/api/squad/assistance?squadName=DAKI"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpTransport::new("::nope::", None).is_err());
    }

    /// Serves exactly one connection with a canned HTTP response and hands
    /// back the request head it received.
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{addr}/"), handle)
    }

    #[tokio::test]
    async fn test_http_success_sends_headers() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 19\r\nconnection: close\r\n\r\n{\"accessToken\":\"x\"}",
        )
        .await;
        let transport = HttpTransport::new(&base, Some(Duration::from_secs(5))).unwrap();
        let body = transport
            .send(&ApiRequest::get("user").with_token("secret"))
            .await
            .unwrap();
        assert_eq!(body["accessToken"], "x");

        let head = server.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /user http/1.1"));
        assert!(head.contains("authorization: bearer secret"));
        assert!(head.contains("accept: */*"));
        assert!(head.contains("content-type: application/json"));
    }

    #[tokio::test]
    async fn test_http_error_status_reads_body() {
        let (base, server) = serve_once(
            "HTTP/1.1 403 Forbidden\r\ncontent-length: 9\r\nconnection: close\r\n\r\nforbidden",
        )
        .await;
        let transport = HttpTransport::new(&base, Some(Duration::from_secs(5))).unwrap();
        let err = transport
            .send(&ApiRequest::post("squad/claim/rank", json!({"squadName": "DAKI"})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::Status {
                path: "squad/claim/rank".to_string(),
                status: 403,
                body: "forbidden".to_string(),
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_non_json_body_is_malformed() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
        )
        .await;
        let transport = HttpTransport::new(&base, Some(Duration::from_secs(5))).unwrap();
        let err = transport.send(&ApiRequest::get("mission")).await.unwrap_err();
        assert!(err.is_malformed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_http_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let transport =
            HttpTransport::new(&format!("http://{addr}/"), Some(Duration::from_millis(200)))
                .unwrap();
        let err = transport.send(&ApiRequest::get("user")).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout { .. }), "got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn test_http_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport =
            HttpTransport::new(&format!("http://{addr}/"), Some(Duration::from_secs(5))).unwrap();
        let err = transport.send(&ApiRequest::get("user")).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }), "got {err:?}");
    }
}
