//! Gmail REST adapter for the core [`Mailbox`] trait.
//!
//! Incremental sync uses the mailbox `historyId`: `users.history.list`
//! returns messages added after a saved id, and a 404 from that endpoint
//! means the id has aged out of Gmail's history window. Authentication is
//! an OAuth2 access token minted from a long-lived refresh token.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;

use txmail_core::mailbox::{Mailbox, MailboxError, MessageDelta};
use txmail_core::models::RawMessage;

use crate::config::{GmailCredentials, MailboxConfig};

/// Gmail encodes bodies as base64url, with or without padding.
const BODY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(rename = "historyId")]
    history_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(rename = "historyId")]
    history_id: Option<String>,
    #[serde(default)]
    history: Vec<HistoryRecord>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(rename = "messagesAdded", default)]
    messages_added: Vec<MessageAdded>,
}

#[derive(Debug, Deserialize)]
struct MessageAdded {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "historyId", default)]
    history_id: String,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct MessagePart {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GmailMailbox {
    client: Client,
    credentials: GmailCredentials,
    api_base: String,
    token_url: String,
    user_id: String,
    sender_filter: String,
    max_results: u32,
    max_pages: u32,
    access_token: RwLock<Option<String>>,
}

impl GmailMailbox {
    pub fn new(config: &MailboxConfig, credentials: GmailCredentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            credentials,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            user_id: config.user_id.clone(),
            sender_filter: config.sender_filter.clone(),
            max_results: config.max_results,
            max_pages: config.max_pages,
            access_token: RwLock::new(None),
        })
    }

    fn user_url(&self, path: &str) -> String {
        format!("{}/gmail/v1/users/{}/{}", self.api_base, self.user_id, path)
    }

    async fn token(&self) -> Result<String, MailboxError> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_auth().await?;
        self.access_token
            .read()
            .await
            .clone()
            .ok_or(MailboxError::AuthExpired)
    }

    /// GET a Gmail endpoint. `not_found` is returned on HTTP 404 since its
    /// meaning depends on the endpoint.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        not_found: MailboxError,
    ) -> Result<T, MailboxError> {
        let token = self.token().await?;
        let resp = self
            .client
            .get(self.user_url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(MailboxError::transient)?;

        match resp.status() {
            s if s.is_success() => resp.json().await.map_err(MailboxError::transient),
            StatusCode::NOT_FOUND => Err(not_found),
            StatusCode::UNAUTHORIZED => Err(MailboxError::AuthExpired),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(MailboxError::Transient(format!(
                    "gmail {} returned {}: {}",
                    path,
                    status,
                    truncate(&body, 200)
                )))
            }
        }
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_new_message_ids(&self, since: &str) -> Result<MessageDelta, MailboxError> {
        let max_results = self.max_results.to_string();
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut current_position = None;
        let mut page_token: Option<String> = None;

        // Bounded pagination; anything past the last page is picked up next cycle.
        for _ in 0..self.max_pages {
            let mut query = vec![
                ("startHistoryId", since),
                ("historyTypes", "messageAdded"),
                ("maxResults", max_results.as_str()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }

            let page: HistoryPage = self
                .get_json(
                    "history",
                    &query,
                    MailboxError::PositionExpired(since.to_string()),
                )
                .await?;

            current_position = page.history_id.or(current_position);
            for record in page.history {
                for added in record.messages_added {
                    if seen.insert(added.message.id.clone()) {
                        ids.push(added.message.id);
                    }
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        if page_token.is_some() {
            tracing::warn!(
                max_pages = self.max_pages,
                "history listing truncated; remaining pages will be fetched next cycle"
            );
        }

        Ok(MessageDelta {
            ids,
            current_position,
        })
    }

    async fn latest_message_id(&self) -> Result<Option<String>, MailboxError> {
        let q = format!("from:{}", self.sender_filter);
        let list: MessageList = self
            .get_json(
                "messages",
                &[("q", q.as_str()), ("maxResults", "1")],
                MailboxError::NotFound("messages".to_string()),
            )
            .await?;
        Ok(list.messages.into_iter().next().map(|m| m.id))
    }

    async fn get_message_detail(&self, id: &str) -> Result<RawMessage, MailboxError> {
        let message: GmailMessage = self
            .get_json(
                &format!("messages/{}", id),
                &[("format", "full")],
                MailboxError::NotFound(id.to_string()),
            )
            .await?;
        Ok(to_raw_message(message))
    }

    async fn current_position(&self) -> Result<String, MailboxError> {
        let profile: Profile = self
            .get_json(
                "profile",
                &[],
                MailboxError::NotFound(format!("user {}", self.user_id)),
            )
            .await?;
        if profile.history_id.trim().is_empty() {
            return Err(MailboxError::Transient(
                "gmail profile missing historyId".to_string(),
            ));
        }
        Ok(profile.history_id)
    }

    async fn refresh_auth(&self) -> Result<(), MailboxError> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(MailboxError::transient)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::Transient(format!(
                "token refresh returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let token: TokenResponse = resp.json().await.map_err(MailboxError::transient)?;
        *self.access_token.write().await = Some(token.access_token);
        tracing::debug!("gmail access token refreshed");
        Ok(())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn header<'a>(part: &'a MessagePart, name: &str) -> Option<&'a str> {
    part.headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

fn decode_body(data: &str) -> Option<String> {
    BODY_ENGINE
        .decode(data.trim())
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Append every `text/html` body under `part`, depth first.
fn collect_html(part: &MessagePart, out: &mut String) {
    if part.mime_type.eq_ignore_ascii_case("text/html") {
        if let Some(html) = part
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_body)
        {
            out.push_str(&html);
        }
    }
    for child in &part.parts {
        collect_html(child, out);
    }
}

fn to_raw_message(message: GmailMessage) -> RawMessage {
    let mut body_markup = String::new();
    let mut subject = String::new();
    let mut sender = String::new();
    let mut date_header = None;

    if let Some(payload) = &message.payload {
        collect_html(payload, &mut body_markup);
        if body_markup.is_empty() {
            // Single-part message with the body on the root part.
            if let Some(text) = payload
                .body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .and_then(decode_body)
            {
                body_markup = text;
            }
        }
        subject = header(payload, "Subject").unwrap_or_default().to_string();
        sender = header(payload, "From").unwrap_or_default().to_string();
        date_header = header(payload, "Date").map(str::to_string);
    }

    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| {
            date_header
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);

    RawMessage {
        id: message.id,
        log_position: message.history_id,
        subject,
        sender,
        received_at,
        body_markup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(s)
    }

    fn parse(value: serde_json::Value) -> RawMessage {
        to_raw_message(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_nested_html_parts_are_concatenated() {
        let msg = parse(serde_json::json!({
            "id": "m1",
            "historyId": "4242",
            "internalDate": "1754419859000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    { "name": "Subject", "value": "Thông báo giao dịch" },
                    { "name": "from", "value": "Cake <no-reply@cake.vn>" }
                ],
                "parts": [
                    { "mimeType": "multipart/alternative", "parts": [
                        { "mimeType": "text/plain", "body": { "data": encode("plain") } },
                        { "mimeType": "text/html", "body": { "data": encode("<p>one</p>") } }
                    ]},
                    { "mimeType": "text/html", "body": { "data": encode("<p>two</p>") } }
                ]
            }
        }));
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.log_position, "4242");
        assert_eq!(msg.subject, "Thông báo giao dịch");
        assert_eq!(msg.sender, "Cake <no-reply@cake.vn>");
        assert_eq!(msg.body_markup, "<p>one</p><p>two</p>");
        assert_eq!(msg.received_at.timestamp_millis(), 1_754_419_859_000);
    }

    #[test]
    fn test_single_part_body_and_padded_base64() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("<td>Số tiền</td>");
        let msg = parse(serde_json::json!({
            "id": "m2",
            "payload": {
                "mimeType": "text/plain",
                "headers": [{ "name": "Date", "value": "Tue, 05 Aug 2025 18:50:59 +0000" }],
                "body": { "data": padded }
            }
        }));
        assert_eq!(msg.body_markup, "<td>Số tiền</td>");
        assert_eq!(msg.received_at.to_rfc3339(), "2025-08-05T18:50:59+00:00");
        assert_eq!(msg.log_position, "");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn mailbox(base: &str) -> GmailMailbox {
        let config = MailboxConfig {
            api_base: base.to_string(),
            token_url: format!("{}/token", base),
            ..MailboxConfig::default()
        };
        let credentials = GmailCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "refresh".into(),
        };
        GmailMailbox::new(&config, credentials).unwrap()
    }

    fn token_route() -> axum::routing::MethodRouter {
        post(|| async { Json(serde_json::json!({ "access_token": "t1", "expires_in": 3599 })) })
    }

    #[tokio::test]
    async fn test_history_404_is_position_expired() {
        let router = Router::new()
            .route("/token", token_route())
            .route(
                "/gmail/v1/users/me/history",
                get(|| async { AxumStatus::NOT_FOUND }),
            );
        let base = serve(router).await;
        let err = mailbox(&base).list_new_message_ids("17").await.unwrap_err();
        assert!(matches!(err, MailboxError::PositionExpired(p) if p == "17"));
    }

    #[tokio::test]
    async fn test_history_paginates_and_dedups() {
        let router = Router::new().route("/token", token_route()).route(
            "/gmail/v1/users/me/history",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let body = match q.get("pageToken").map(String::as_str) {
                    None => serde_json::json!({
                        "historyId": "20",
                        "history": [{ "messagesAdded": [
                            { "message": { "id": "a" } },
                            { "message": { "id": "b" } }
                        ]}],
                        "nextPageToken": "p2"
                    }),
                    Some(_) => serde_json::json!({
                        "historyId": "21",
                        "history": [{ "messagesAdded": [
                            { "message": { "id": "b" } },
                            { "message": { "id": "c" } }
                        ]}]
                    }),
                };
                Json(body)
            }),
        );
        let base = serve(router).await;
        let delta = mailbox(&base).list_new_message_ids("10").await.unwrap();
        assert_eq!(delta.ids, vec!["a", "b", "c"]);
        assert_eq!(delta.current_position.as_deref(), Some("21"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_expired() {
        let router = Router::new().route("/token", token_route()).route(
            "/gmail/v1/users/me/profile",
            get(|| async { AxumStatus::UNAUTHORIZED }),
        );
        let base = serve(router).await;
        let err = mailbox(&base).current_position().await.unwrap_err();
        assert!(matches!(err, MailboxError::AuthExpired));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let router = Router::new().route("/token", token_route()).route(
            "/gmail/v1/users/me/messages/x",
            get(|| async { AxumStatus::SERVICE_UNAVAILABLE }),
        );
        let base = serve(router).await;
        let err = mailbox(&base).get_message_detail("x").await.unwrap_err();
        assert!(matches!(err, MailboxError::Transient(_)));
    }
}
