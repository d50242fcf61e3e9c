//! HTTP transports shared by chain providers.
//!
//! Both clients map every transport failure into [`NetworkError`] so that
//! rotation can decide on retries without knowing which backend failed.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use chainkit_core::{ChainError, ConfigError, NetworkError, NetworkProvider};

use crate::config::ProviderConfig;

/// JSON-RPC code Ethereum nodes use for business rejections
/// (insufficient funds, nonce too low, underpriced).
pub const RPC_SERVER_REJECTION: i64 = -32000;

const MAX_ERROR_BODY: usize = 512;

fn build_client(config: &ProviderConfig) -> Result<Client, ConfigError> {
    Client::builder()
        .timeout(config.timeout())
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))
}

fn map_reqwest_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_decode() {
        NetworkError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        NetworkError::Http { status: status.as_u16(), body: String::new() }
    } else if err.is_builder() {
        NetworkError::InvalidRequest(err.to_string())
    } else {
        NetworkError::Connection(err.to_string())
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Read the body, turning non-2xx statuses into [`NetworkError::Http`].
async fn read_body(response: Response) -> Result<String, NetworkError> {
    let status = response.status();
    let body = response.text().await.map_err(map_reqwest_error)?;
    if !status.is_success() {
        return Err(NetworkError::Http {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }
    Ok(body)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, NetworkError> {
    serde_json::from_str(body).map_err(|e| NetworkError::Decode(e.to_string()))
}

// ── REST ──────────────────────────────────────────────────────────────────

/// Plain HTTP client rooted at a base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self { client: build_client(config)?, base_url: base_url.into() })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        let body = self.get_text(path).await?;
        Ok(decode(&body)?)
    }

    pub async fn get_text(&self, path: &str) -> Result<String, ChainError> {
        let url = join_url(&self.base_url, path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await.map_err(map_reqwest_error)?;
        Ok(read_body(response).await?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ChainError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = join_url(&self.base_url, path);
        debug!(%url, "POST json");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(decode(&read_body(response).await?)?)
    }

    /// POST a plain-text body and return the plain-text answer.
    pub async fn post_text(&self, path: &str, body: String) -> Result<String, ChainError> {
        let url = join_url(&self.base_url, path);
        debug!(%url, "POST text");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(read_body(response).await?)
    }
}

impl NetworkProvider for RestClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }
}

// ── JSON-RPC 2.0 ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Classify a JSON-RPC error envelope.
///
/// [`RPC_SERVER_REJECTION`] is the chain refusing the request and is
/// returned verbatim; any other envelope means this backend could not
/// serve the call, so another one should be tried.
pub fn rpc_error(code: i64, message: String) -> ChainError {
    if code == RPC_SERVER_REJECTION {
        ChainError::Remote { code, message }
    } else {
        NetworkError::ProviderFailure { code, message }.into()
    }
}

fn parse_rpc_response<T: DeserializeOwned>(body: &str) -> Result<T, ChainError> {
    let response: RpcResponse = decode(body)?;
    if let Some(err) = response.error {
        return Err(rpc_error(err.code, err.message));
    }
    let result = response.result.unwrap_or(Value::Null);
    Ok(serde_json::from_value(result).map_err(|e| NetworkError::Decode(e.to_string()))?)
}

/// JSON-RPC 2.0 client over HTTP POST.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoint: impl Into<String>, config: &ProviderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        debug!(endpoint = %self.endpoint, method, id, "rpc call");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        parse_rpc_response(&read_body(response).await?)
    }
}

impl NetworkProvider for JsonRpcClient {
    fn base_url(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("https://a/api/", "/address/x"), "https://a/api/address/x");
        assert_eq!(join_url("https://a/api", "fee-estimates"), "https://a/api/fee-estimates");
        assert_eq!(join_url("https://a", ""), "https://a");
    }

    #[test]
    fn server_rejection_is_remote() {
        let err = rpc_error(-32000, "insufficient funds".into());
        assert_eq!(err, ChainError::remote(-32000, "insufficient funds"));
        assert!(!err.is_transient());
    }

    #[test]
    fn other_envelopes_rotate() {
        assert!(rpc_error(-32603, "internal error".into()).is_transient());
        assert!(rpc_error(-32005, "limit exceeded".into()).is_transient());
    }

    #[test]
    fn parse_result_and_null() {
        let n: u64 = parse_rpc_response(r#"{"jsonrpc":"2.0","id":1,"result":5}"#).unwrap();
        assert_eq!(n, 5);
        let none: Option<String> = parse_rpc_response(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn garbage_body_is_transient_decode() {
        let err = parse_rpc_response::<u64>("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ChainError::Network(NetworkError::Decode(_))));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn rpc_call_round_trip() {
        let (url, server) = serve_once("200 OK", r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#).await;
        let client = JsonRpcClient::new(url, &ProviderConfig::default()).unwrap();

        let value: String = client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(value, "0x10");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST "));
        assert!(request.contains(r#""method":"eth_blockNumber""#));
        assert!(request.contains(r#""jsonrpc":"2.0""#));
    }

    #[tokio::test]
    async fn rpc_error_envelope_is_surfaced() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .await;
        let client = JsonRpcClient::new(url, &ProviderConfig::default()).unwrap();

        let err = client.call::<String>("eth_sendRawTransaction", json!(["0x00"])).await.unwrap_err();
        assert_eq!(err, ChainError::remote(-32000, "nonce too low"));
    }

    #[tokio::test]
    async fn server_error_status_is_transient() {
        let (url, _server) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let client = RestClient::new(url, &ProviderConfig::default()).unwrap();

        let err = client.get_json::<Value>("status").await.unwrap_err();
        match &err {
            ChainError::Network(NetworkError::Http { status, body }) => {
                assert_eq!(*status, 503);
                assert!(body.contains("busy"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_error_status_is_fatal() {
        let (url, _server) = serve_once("400 Bad Request", "bad address").await;
        let client = RestClient::new(url, &ProviderConfig::default()).unwrap();
        let err = client.get_text("address/zzz").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RestClient::new(format!("http://{addr}"), &ProviderConfig::default()).unwrap();
        let err = client.get_text("").await.unwrap_err();
        assert!(matches!(err, ChainError::Network(NetworkError::Connection(_))));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn post_text_sends_raw_body() {
        let (url, server) = serve_once("200 OK", "abcd").await;
        let client = RestClient::new(url, &ProviderConfig::default()).unwrap();

        assert_eq!(client.post_text("tx", "0100".into()).await.unwrap(), "abcd");
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /tx "));
        assert!(request.ends_with("0100"));
    }
}
