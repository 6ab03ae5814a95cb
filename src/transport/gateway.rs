//! HTTP messaging-gateway client.
//!
//! Long-polls the gateway for inbound events and drives sends, contact
//! checks, media downloads, and blacklist management over its REST API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TransportError;

use super::{
    EventStream, InboundDocument, InboundEvent, InboundMessage, MessageTransport, SendOptions,
};

/// Long-poll wait passed to the gateway, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Gateway-backed messaging transport.
pub struct GatewayTransport {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl GatewayTransport {
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client: reqwest::Client::new(),
        }
    }

    /// Build config from environment variables.
    /// Returns `None` if `GATEWAY_BASE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("GATEWAY_BASE_URL").ok()?;
        let api_token = std::env::var("GATEWAY_API_TOKEN").ok();
        Some(Self::new(base_url, api_token))
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let resp = self
            .authorize(self.client.post(self.api_url(path)).json(body))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("{path} returned {status}: {detail}")));
        }
        resp.json()
            .await
            .map_err(|e| TransportError::Http(format!("{path} returned invalid JSON: {e}")))
    }
}

/// Map one raw gateway event into the inbound model. Unknown kinds and
/// malformed entries are dropped.
fn parse_event(raw: &serde_json::Value) -> Option<InboundEvent> {
    let from = raw.get("from")?.as_str()?.to_string();
    match raw.get("kind")?.as_str()? {
        "message" => {
            let body = raw.get("body")?.as_str()?.to_string();
            Some(InboundEvent::Text(InboundMessage { from, body }))
        }
        "document" => {
            let media_url = raw.get("media_url")?.as_str()?.to_string();
            let file_name = raw
                .get("file_name")
                .and_then(|v| v.as_str())
                .unwrap_or("upload")
                .to_string();
            let mime_type = raw
                .get("mime_type")
                .and_then(|v| v.as_str())
                .unwrap_or("application/octet-stream")
                .to_string();
            Some(InboundEvent::Document(InboundDocument {
                from,
                file_name,
                mime_type,
                media_url,
            }))
        }
        other => {
            tracing::debug!(kind = other, "Ignoring unsupported gateway event");
            None
        }
    }
}

#[async_trait]
impl MessageTransport for GatewayTransport {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn start(&self) -> Result<EventStream, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let base_url = self.base_url.clone();
        let api_token = self.api_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!(gateway = %base_url, "Gateway transport listening for events...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                });
                let mut req = client.post(format!("{base_url}/events")).json(&body);
                if let Some(ref token) = api_token {
                    req = req.bearer_auth(token);
                }

                let resp = match req.send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Gateway poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Gateway parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(events) = data.get("events").and_then(serde_json::Value::as_array) {
                    for raw in events {
                        if let Some(id) = raw.get("id").and_then(serde_json::Value::as_i64) {
                            offset = id + 1;
                        }

                        let Some(event) = parse_event(raw) else {
                            continue;
                        };

                        if tx.send(event).is_err() {
                            tracing::info!("Gateway listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        to: &str,
        body: &str,
        options: &SendOptions,
    ) -> Result<(), TransportError> {
        let mut payload = serde_json::json!({
            "to": to,
            "body": body,
        });
        if let Some(ref media_url) = options.media_url {
            payload["media_url"] = serde_json::Value::String(media_url.clone());
        }

        self.post_json("messages", &payload)
            .await
            .map_err(|e| TransportError::SendFailed {
                to: to.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn check_exists(&self, to: &str) -> Option<Result<bool, TransportError>> {
        let body = serde_json::json!({ "numbers": [to] });
        let result = self.post_json("contacts/check", &body).await;

        Some(match result {
            Ok(data) => data
                .get("results")
                .and_then(serde_json::Value::as_array)
                .and_then(|results| results.first())
                .and_then(|r| r.get("exists"))
                .and_then(serde_json::Value::as_bool)
                .ok_or_else(|| {
                    TransportError::CheckFailed("malformed contacts/check response".into())
                }),
            Err(e) => Err(TransportError::CheckFailed(e.to_string())),
        })
    }

    async fn save_document(
        &self,
        doc: &InboundDocument,
        dest_dir: &Path,
    ) -> Result<PathBuf, TransportError> {
        let resp = self
            .authorize(self.client.get(&doc.media_url))
            .send()
            .await
            .map_err(|e| TransportError::SaveFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::SaveFailed(format!(
                "media download returned {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::SaveFailed(e.to_string()))?;

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| TransportError::SaveFailed(e.to_string()))?;

        let file_name = sanitize_file_name(&doc.file_name);
        let path = dest_dir.join(format!("{}-{}", Uuid::new_v4(), file_name));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| TransportError::SaveFailed(e.to_string()))?;

        tracing::info!(from = %doc.from, path = %path.display(), "Inbound document saved");
        Ok(path)
    }

    async fn blacklist_add(&self, number: &str) -> Result<(), TransportError> {
        self.post_json("blacklist", &serde_json::json!({ "number": number }))
            .await
            .map_err(|e| TransportError::BlacklistFailed(e.to_string()))?;
        Ok(())
    }

    async fn blacklist_remove(&self, number: &str) -> Result<(), TransportError> {
        let resp = self
            .authorize(self.client.delete(self.api_url(&format!("blacklist/{number}"))))
            .send()
            .await
            .map_err(|e| TransportError::BlacklistFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::BlacklistFailed(format!(
                "blacklist remove returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn blacklist_list(&self) -> Result<Vec<String>, TransportError> {
        let resp = self
            .authorize(self.client.get(self.api_url("blacklist")))
            .send()
            .await
            .map_err(|e| TransportError::BlacklistFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TransportError::BlacklistFailed(format!(
                "blacklist list returned {}",
                resp.status()
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::BlacklistFailed(e.to_string()))?;

        Ok(data
            .get("numbers")
            .and_then(serde_json::Value::as_array)
            .map(|numbers| {
                numbers
                    .iter()
                    .filter_map(|n| n.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        let resp = self
            .authorize(self.client.get(self.api_url("status")))
            .send()
            .await
            .map_err(|e| TransportError::StartupFailed {
                name: "gateway".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::StartupFailed {
                name: "gateway".into(),
                reason: format!("status returned {}", resp.status()),
            })
        }
    }
}

/// Keep only filename-safe characters from an inbound attachment name.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

// ── Tests ───────────────────────────────────────────────────────────
