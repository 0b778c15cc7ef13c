use std::time::Duration;

use async_trait::async_trait;
use rainbow_common::{CommonError, CommonResult};
use reqwest::{Client as ReqwestClient, Method as ReqwestMethod};
use serde_json::Value;
use tracing::debug;

use super::{Headers, Method, Transport, TransportError};
use crate::config::SessionConfig;

/// Longest response excerpt carried in a status error
const MAX_ERROR_BODY: usize = 512;

/// [`Transport`] implementation backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: String,
}

impl HttpTransport {
    /// Start building a new HTTP transport.
    pub fn builder(base_url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    /// Build a transport from the session configuration.
    pub fn from_config(config: &SessionConfig) -> CommonResult<Self> {
        let mut builder = Self::builder(config.base_url())
            .timeout(Duration::from_secs(config.http.timeout_secs));
        if let Some(agent) = &config.http.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build()
    }

    /// URL every request path is appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = self.url(path);
        let mut builder = self.client.request(reqwest_method(method), &url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!(%method, path, "sending HTTP request");
        let response = builder.send().await.map_err(|err| map_send_error(path, &err))?;

        let status = response.status();
        debug!(%method, path, %status, "received HTTP response");

        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::decode(path, format!("failed to read body: {err}")))?;

        if !status.is_success() {
            let excerpt: String =
                String::from_utf8_lossy(&bytes).chars().take(MAX_ERROR_BODY).collect();
            let message = if excerpt.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                excerpt
            };
            return Err(TransportError::status(path, status.as_u16(), message));
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|err| TransportError::decode(path, format!("invalid JSON body: {err}")))
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: Option<String>,
}

impl HttpTransportBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: Duration::from_secs(30), user_agent: None }
    }

    /// Per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `User-Agent` header value
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the `reqwest` client
    pub fn build(self) -> CommonResult<HttpTransport> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CommonError::config_field(
                "http.base_url",
                format!("expected an http(s) URL, got '{base_url}'"),
            ));
        }

        let mut builder = ReqwestClient::builder().timeout(self.timeout);
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(|err| {
            CommonError::config_field("http", format!("failed to build HTTP client: {err}"))
        })?;

        Ok(HttpTransport { client, base_url })
    }
}

fn reqwest_method(method: Method) -> ReqwestMethod {
    match method {
        Method::Get => ReqwestMethod::GET,
        Method::Post => ReqwestMethod::POST,
        Method::Put => ReqwestMethod::PUT,
        Method::Delete => ReqwestMethod::DELETE,
    }
}

fn map_send_error(path: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::timeout(path, err.to_string());
    }
    if err.is_connect() || err.is_request() {
        return TransportError::connect(path, err.to_string());
    }
    TransportError::decode(path, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::transport::TransportErrorKind;

    fn transport_for(server: &MockServer) -> HttpTransport {
        HttpTransport::builder(server.uri())
            .timeout(Duration::from_secs(5))
            .build()
            .expect("http transport")
    }

    #[tokio::test]
    async fn returns_json_body_and_forwards_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rainbow/ping"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "OK"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = Headers::new();
        headers.insert("Accept".into(), "application/json".into());

        let value = transport_for(&server)
            .get("/api/rainbow/ping", &headers)
            .await
            .expect("ping response");
        assert_eq!(value, json!({"status": "OK"}));
    }

    #[tokio::test]
    async fn sends_json_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/rainbow/enduser/v1.0/rooms"))
            .and(body_json(json!({"name": "ops"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "r1"}})))
            .expect(1)
            .mount(&server)
            .await;

        let value = transport_for(&server)
            .post("/api/rainbow/enduser/v1.0/rooms", &Headers::new(), Some(&json!({"name": "ops"})))
            .await
            .expect("create room");
        assert_eq!(value["data"]["id"], "r1");
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value = transport_for(&server).delete("/anything", &Headers::new()).await.expect("ok");
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn maps_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .get("/api/rainbow/authentication/v1.0/login", &Headers::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Status);
        assert_eq!(err.status, Some(401));
        assert!(err.is_auth_rejection());
        assert!(err.message.contains("invalid credentials"));
    }

    #[tokio::test]
    async fn maps_gateway_status_to_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = transport_for(&server).get("/api/rainbow/ping", &Headers::new()).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn maps_invalid_json_to_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = transport_for(&server).get("/", &Headers::new()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Decode);
    }

    #[tokio::test]
    async fn refused_connection_is_connectivity() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let transport =
            HttpTransport::builder(format!("http://{addr}")).build().expect("http transport");
        let err = transport.get("/api/rainbow/ping", &Headers::new()).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connect);
        assert!(err.is_connectivity());
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(HttpTransport::builder("openrainbow.com").build().is_err());
        let transport = HttpTransport::builder("https://openrainbow.com/").build().expect("valid");
        assert_eq!(transport.base_url(), "https://openrainbow.com");
    }
}
