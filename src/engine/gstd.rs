//! GStreamer Daemon client.
//!
//! Speaks gstd's HTTP API. Every response body has the shape
//! `{"code": <n>, "description": "...", "response": ...}`; a non-zero code
//! is mapped onto [`EngineError`]:
//!
//! | gstd code | meaning           | error                              |
//! |-----------|-------------------|------------------------------------|
//! | 3, 6      | existing resource | [`EngineError::DuplicateName`]     |
//! | 4         | no resource       | [`EngineError::NotFound`]          |
//! | 5         | no create         | [`EngineError::InvalidDescription`]|
//! | other     |                   | [`EngineError::Rejected`]          |

// Standard library imports
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

// Internal module imports
use super::{BusMessage, EngineError, EngineResult, PipelineEngine};

const CODE_SUCCESS: i64 = 0;
const CODE_NO_RESOURCE: i64 = 4;
const CODE_EXISTING_RESOURCE: i64 = 3;
const CODE_NO_CREATE: i64 = 5;
const CODE_EXISTING_NAME: i64 = 6;

/// Default request timeout for ordinary commands
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GstdResponse {
    code: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    response: Value,
}

/// HTTP client for one gstd instance.
#[derive(Debug, Clone)]
pub struct GstdClient {
    base_url: String,
    http: Client,
}

impl GstdClient {
    /// Build a client for `http://<address>:<port>`.
    pub fn new(address: &str, port: u16) -> EngineResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: format!("http://{address}:{port}"),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that gstd answers by listing its pipelines.
    pub async fn ping(&self) -> EngineResult<()> {
        self.send(
            "pipelines",
            self.request(Method::GET, "/pipelines").timeout(PING_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    /// Ping until gstd answers, up to `attempts` times with `delay` between
    /// tries. Returns the last error.
    pub async fn wait_ready(&self, attempts: u32, delay: Duration) -> EngineResult<()> {
        let mut last = EngineError::Transport("no connection attempt made".to_string());
        for attempt in 1..=attempts.max(1) {
            match self.ping().await {
                Ok(()) => {
                    debug!(attempt, url = %self.base_url, "gstd reachable");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "gstd not reachable yet");
                    last = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a request and map the gstd envelope onto a result.
    async fn send(&self, subject: &str, request: RequestBuilder) -> EngineResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        let status = response.status();
        let body: GstdResponse = response.json().await.map_err(|e| {
            EngineError::Transport(format!("unreadable gstd response (HTTP {status}): {e}"))
        })?;
        trace!(subject, code = body.code, description = %body.description, "gstd response");
        map_code(subject, body)
    }

    async fn set_state(&self, name: &str, state: &str) -> EngineResult<()> {
        debug!(pipeline = name, state, "gstd set state");
        self.send(
            name,
            self.request(Method::PUT, &format!("/pipelines/{name}/state"))
                .query(&[("name", state)])
                .timeout(COMMAND_TIMEOUT),
        )
        .await
        .map(|_| ())
    }
}

fn map_code(subject: &str, body: GstdResponse) -> EngineResult<Value> {
    match body.code {
        CODE_SUCCESS => Ok(body.response),
        CODE_EXISTING_RESOURCE | CODE_EXISTING_NAME => {
            Err(EngineError::DuplicateName(subject.to_string()))
        }
        CODE_NO_RESOURCE => Err(EngineError::NotFound(subject.to_string())),
        CODE_NO_CREATE => Err(EngineError::InvalidDescription {
            name: subject.to_string(),
            reason: body.description,
        }),
        code => Err(EngineError::Rejected {
            code,
            description: body.description,
        }),
    }
}

/// Convert gstd's bus message payload. A `null` payload means the read
/// timed out.
fn parse_bus_message(value: Value) -> Option<BusMessage> {
    if value.is_null() {
        return None;
    }
    let field = |key: &str| {
        value
            .get(key)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    let text = match value.get("message") {
        Some(_) => field("message"),
        None => value.to_string(),
    };
    Some(BusMessage {
        kind: field("type"),
        source: field("source"),
        text,
    })
}

#[async_trait]
impl PipelineEngine for GstdClient {
    async fn create(&self, name: &str, description: &str) -> EngineResult<()> {
        debug!(pipeline = name, description, "gstd create");
        self.send(
            name,
            self.request(Method::POST, "/pipelines")
                .query(&[("name", name), ("description", description)])
                .timeout(COMMAND_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    async fn play(&self, name: &str) -> EngineResult<()> {
        self.set_state(name, "playing").await
    }

    async fn stop(&self, name: &str) -> EngineResult<()> {
        self.set_state(name, "null").await
    }

    async fn delete(&self, name: &str) -> EngineResult<()> {
        debug!(pipeline = name, "gstd delete");
        self.send(
            name,
            self.request(Method::DELETE, "/pipelines")
                .query(&[("name", name)])
                .timeout(COMMAND_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    async fn send_eos(&self, name: &str) -> EngineResult<()> {
        debug!(pipeline = name, "gstd eos");
        self.send(
            name,
            self.request(Method::POST, &format!("/pipelines/{name}/event"))
                .query(&[("name", "eos")])
                .timeout(COMMAND_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    async fn set_property(
        &self,
        name: &str,
        element: &str,
        property: &str,
        value: &str,
    ) -> EngineResult<()> {
        debug!(pipeline = name, element, property, value, "gstd set property");
        self.send(
            &format!("{name}.{element}"),
            self.request(
                Method::PUT,
                &format!("/pipelines/{name}/elements/{element}/properties/{property}"),
            )
            .query(&[("name", value)])
            .timeout(COMMAND_TIMEOUT),
        )
        .await
        .map(|_| ())
    }

    async fn wait_signal(&self, name: &str, element: &str, signal: &str) -> EngineResult<()> {
        // Blocks server-side until the signal fires, so no request timeout.
        self.send(
            &format!("{name}.{element}"),
            self.request(
                Method::GET,
                &format!("/pipelines/{name}/elements/{element}/signals/{signal}/callback"),
            ),
        )
        .await
        .map(|_| ())
    }

    async fn next_bus_message(
        &self,
        name: &str,
        timeout: Duration,
    ) -> EngineResult<Option<BusMessage>> {
        let timeout_ns = timeout.as_nanos().to_string();
        self.send(
            name,
            self.request(Method::PUT, &format!("/pipelines/{name}/bus/timeout"))
                .query(&[("name", timeout_ns.as_str())])
                .timeout(COMMAND_TIMEOUT),
        )
        .await?;

        let payload = self
            .send(
                name,
                self.request(Method::GET, &format!("/pipelines/{name}/bus/message"))
                    .timeout(timeout + COMMAND_TIMEOUT),
            )
            .await?;
        Ok(parse_bus_message(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(code: i64, description: &str) -> GstdResponse {
        GstdResponse {
            code,
            description: description.to_string(),
            response: Value::Null,
        }
    }

    #[test]
    fn test_code_mapping() {
        assert!(map_code("p", body(0, "Success")).is_ok());
        assert_eq!(
            map_code("p", body(3, "Existing resource")),
            Err(EngineError::DuplicateName("p".into()))
        );
        assert_eq!(
            map_code("p", body(6, "Existing name")),
            Err(EngineError::DuplicateName("p".into()))
        );
        assert_eq!(
            map_code("p", body(4, "No resource")),
            Err(EngineError::NotFound("p".into()))
        );
        assert!(matches!(
            map_code("p", body(5, "Cannot create")),
            Err(EngineError::InvalidDescription { .. })
        ));
        assert!(matches!(
            map_code("p", body(13, "Bad command")),
            Err(EngineError::Rejected { code: 13, .. })
        ));
    }

    #[test]
    fn test_envelope_deserializes() {
        let parsed: GstdResponse = serde_json::from_value(json!({
            "code": 0,
            "description": "Success",
            "response": null
        }))
        .unwrap();
        assert_eq!(parsed.code, 0);
    }

    #[test]
    fn test_parse_bus_message() {
        assert_eq!(parse_bus_message(Value::Null), None);
        let msg = parse_bus_message(json!({
            "type": "eos",
            "source": "record_h264",
            "timestamp": "99:99:99.999999999",
            "seqnum": 311
        }))
        .unwrap();
        assert_eq!(msg.kind, "eos");
        assert_eq!(msg.source, "record_h264");
    }

    #[test]
    fn test_base_url() {
        let client = GstdClient::new("127.0.0.1", 5001).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:5001");
    }
}
