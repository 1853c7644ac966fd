use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use wabot::console::{ConsoleInput, ConsoleSessionFactory};
use wabot::dispatcher::EventDispatcher;
use wabot::reply::ReplyConfig;
use wabot::state::ProcessState;
use wabot::store::{MessageCache, MultiFileAuthState};
use wabot::supervisor::{ConnectionSupervisor, SupervisorState};
use wabot::types::jid::Jid;

const SCRIPT: &str = r#"{"event":"messages.upsert","data":{"type":"notify","messages":[{"key":{"remoteJid":"15551234567@s.whatsapp.net","id":"IN1","fromMe":false},"message":{"conversation":"hi"},"messageTimestamp":1700000000,"pushName":"Ann"}]}}
{"event":"messages.upsert","data":{"type":"notify","messages":[{"key":{"remoteJid":"15551234567@s.whatsapp.net","id":"OUT1","fromMe":true},"message":{"conversation":"Hello there!"},"messageTimestamp":1700000001}]}}
{"event":"connection.update","data":{"connection":"close","lastDisconnect":{"statusCode":401,"message":"logged out"}}}
"#;

#[tokio::test]
async fn scripted_console_run_greets_and_logs_out() {
    let dir = tempfile::tempdir().unwrap();
    let auth = Arc::new(MultiFileAuthState::open(dir.path().join("auth")).await.unwrap());
    let cache = Arc::new(MessageCache::new());
    let process = ProcessState::default();

    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let input = Arc::new(ConsoleInput::new(SCRIPT.as_bytes()));
    let factory = Arc::new(ConsoleSessionFactory::with_output(input, writer));

    let dispatcher = EventDispatcher::new(process.clone())
        .with_reply_config(ReplyConfig {
            auto_reply: true,
            ..Default::default()
        })
        .with_typing(None)
        .with_cache(cache.clone())
        .with_auth_state(auth.clone())
        .with_echo(false);
    let supervisor = ConnectionSupervisor::new(factory, Arc::new(dispatcher), auth.clone(), process)
        .with_message_lookup(cache.clone());

    assert_eq!(supervisor.run().await, SupervisorState::ClosedTerminal);
    drop(supervisor);

    // The fresh auth dir went through QR linking, which registered it.
    assert!(auth.credentials().await.registered);
    let saved = tokio::fs::read_to_string(dir.path().join("auth/creds.json"))
        .await
        .unwrap();
    assert!(saved.contains("\"registered\":true"));

    let chat = Jid::user("15551234567");
    assert_eq!(cache.messages(&chat).await.len(), 2);

    let mut lines = BufReader::new(reader).lines();
    let mut calls = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let record: Value = serde_json::from_str(&line).unwrap();
        let done = record["call"] == "close";
        calls.push(record);
        if done {
            break;
        }
    }
    let names: Vec<&str> = calls.iter().filter_map(|c| c["call"].as_str()).collect();
    assert_eq!(names, ["readMessages", "sendMessage", "close"]);
    assert_eq!(calls[1]["content"]["text"]["text"], "Hello there!");
    assert_eq!(calls[0]["keys"][0]["id"], "IN1");
}
