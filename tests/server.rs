use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Notify;

use txmail::ingest::Orchestrator;
use txmail::server::router;
use txmail_core::assemble::Assembler;
use txmail_core::extract::Extractor;
use txmail_core::fields::LabelTable;
use txmail_core::mailbox::{Mailbox, MailboxError, MessageDelta, MessageFilter};
use txmail_core::models::RawMessage;
use txmail_core::store::memory::InMemoryStore;
use txmail_core::store::Store;

const NOTIFICATION: &str = r#"<table>
<tr><td>Tài khoản nhận</td><td>0011223344</td></tr>
<tr><td>Tài khoản chuyển</td><td>9988776655</td></tr>
<tr><td>Tên người chuyển</td><td>NGUYEN VAN A</td></tr>
<tr><td>Mã giao dịch</td><td>FT25218XYZ</td></tr>
<tr><td>Ngày giờ giao dịch</td><td>06/08/2025, 01:50:59</td></tr>
<tr><td>Số tiền</td><td>+2.000 VND</td></tr>
<tr><td>Nội dung giao dịch</td><td>an trua</td></tr>
</table>"#;

/// One notification after position "100"; optionally blocks listing until
/// the gate is opened.
struct StubMailbox {
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl Mailbox for StubMailbox {
    async fn list_new_message_ids(&self, since: &str) -> Result<MessageDelta, MailboxError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let ids = if since == "100" { vec!["m1".to_string()] } else { Vec::new() };
        Ok(MessageDelta {
            ids,
            current_position: Some("101".into()),
        })
    }

    async fn latest_message_id(&self) -> Result<Option<String>, MailboxError> {
        Ok(None)
    }

    async fn get_message_detail(&self, id: &str) -> Result<RawMessage, MailboxError> {
        if id != "m1" {
            return Err(MailboxError::NotFound(id.into()));
        }
        Ok(RawMessage {
            id: "m1".into(),
            log_position: "101".into(),
            subject: "Thông báo giao dịch".into(),
            sender: "CAKE <no-reply@cake.vn>".into(),
            received_at: Utc::now(),
            body_markup: NOTIFICATION.into(),
        })
    }

    async fn current_position(&self) -> Result<String, MailboxError> {
        Ok("101".into())
    }
}

async fn wait_until_processing(orchestrator: &Orchestrator) {
    let mut waited = 0;
    while !orchestrator.is_processing() {
        assert!(waited < 200, "cycle never started");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }
}

async fn spawn_app(gate: Option<Arc<Notify>>) -> (String, Arc<Orchestrator>) {
    let store = Arc::new(InMemoryStore::default());
    store.replace_cursor("100", 0).await.unwrap();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(StubMailbox { gate }),
        store,
        MessageFilter::default(),
        Assembler::new(Extractor::new(LabelTable::default())),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(orchestrator.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), orchestrator)
}

#[tokio::test]
async fn test_ping_and_health() {
    let (base, _) = spawn_app(None).await;
    let client = reqwest::Client::new();

    let pong = client.get(format!("{}/ping", base)).send().await.unwrap();
    assert_eq!(pong.status(), 200);
    assert_eq!(pong.text().await.unwrap(), "pong");

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["processing"], false);
    assert_eq!(health["cursor"]["position"], "100");
    assert_eq!(health["stats"]["cycles_completed"], 0);
}

#[tokio::test]
async fn test_trigger_stores_and_lists_transaction() {
    let (base, _) = spawn_app(None).await;
    let client = reqwest::Client::new();

    let resp = client.post(format!("{}/trigger", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["report"]["mode"], "steady");
    assert_eq!(body["report"]["succeeded"], 1);
    assert_eq!(body["report"]["cursor_advanced"], true);
    assert_eq!(body["stats"]["success_count"], 1);

    let recent: Value = client
        .get(format!("{}/transactions/recent?limit=5", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recent["count"], 1);
    let tx = &recent["transactions"][0];
    assert_eq!(tx["transaction_code"], "FT25218XYZ");
    assert_eq!(tx["amount"], 2000);
    assert_eq!(tx["message_id"], "m1");

    let stats: Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["store"]["total"], 1);
    assert_eq!(stats["store"]["cursor"]["position"], "101");
    assert_eq!(stats["run"]["cycles_completed"], 1);
}

#[tokio::test]
async fn test_recent_rejects_zero_limit() {
    let (base, _) = spawn_app(None).await;
    let resp = reqwest::get(format!("{}/transactions/recent?limit=0", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_recent_rejects_non_numeric_limit() {
    let (base, _) = spawn_app(None).await;
    let resp = reqwest::get(format!("{}/transactions/recent?limit=abc", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (base, _) = spawn_app(None).await;
    let resp = reqwest::get(format!("{}/nope", base)).await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_trigger_while_busy_returns_429() {
    let gate = Arc::new(Notify::new());
    let (base, orchestrator) = spawn_app(Some(gate.clone())).await;
    let client = reqwest::Client::new();

    let first = tokio::spawn({
        let client = client.clone();
        let url = format!("{}/trigger", base);
        async move { client.post(url).send().await.unwrap().status() }
    });

    wait_until_processing(&orchestrator).await;

    let busy = client.post(format!("{}/trigger", base)).send().await.unwrap();
    assert_eq!(busy.status(), 429);
    let body: Value = busy.json().await.unwrap();
    assert_eq!(body["error"]["code"], "already_processing");

    gate.notify_one();
    assert_eq!(first.await.unwrap(), 200);
    assert_eq!(orchestrator.stats().await.cycles_completed, 1);
}

#[tokio::test]
async fn test_trigger_completes_after_client_disconnects() {
    let gate = Arc::new(Notify::new());
    let (base, orchestrator) = spawn_app(Some(gate.clone())).await;
    let addr = base.trim_start_matches("http://").to_string();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(
            format!(
                "POST /trigger HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\n\r\n",
                addr
            )
            .as_bytes(),
        )
        .await
        .unwrap();
    wait_until_processing(&orchestrator).await;

    drop(stream);
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.notify_one();

    let mut waited = 0;
    while orchestrator.stats().await.cycles_completed == 0 || orchestrator.is_processing() {
        assert!(waited < 200, "cycle was cancelled with the connection");
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += 1;
    }

    let stats = orchestrator.stats().await;
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.success_count, 1);
    let cursor = orchestrator.cursor().await.unwrap().unwrap();
    assert_eq!(cursor.position, "101");
}
