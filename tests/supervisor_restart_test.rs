use std::sync::Arc;
use wabot::dispatcher::EventDispatcher;
use wabot::state::ProcessState;
use wabot::store::MultiFileAuthState;
use wabot::supervisor::{ConnectionSupervisor, SupervisorState};
use wabot::test_utils::MockSessionFactory;
use wabot::types::events::{DisconnectReason, Event};

async fn build(factory: Arc<MockSessionFactory>, dir: &tempfile::TempDir) -> ConnectionSupervisor {
    let auth = Arc::new(MultiFileAuthState::open(dir.path()).await.unwrap());
    let process = ProcessState::default();
    let dispatcher = Arc::new(EventDispatcher::new(process.clone()).with_echo(false));
    ConnectionSupervisor::new(factory, dispatcher, auth, process)
}

#[tokio::test(start_paused = true)]
async fn retry_counters_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(
        MockSessionFactory::new()
            .script(vec![
                Event::open(),
                Event::closed(DisconnectReason::ConnectionReplaced),
            ])
            .script(vec![Event::open(), Event::closed(DisconnectReason::LoggedOut)]),
    );
    let supervisor = build(factory.clone(), &dir).await;

    assert_eq!(supervisor.run().await, SupervisorState::ClosedTerminal);

    let configs = factory.configs();
    assert_eq!(configs.len(), 2);
    assert_eq!(configs[0].retry_counts.increment("MSG").await, Some(1));
    assert_eq!(configs[1].retry_counts.increment("MSG").await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn every_session_is_closed_before_the_next_starts() {
    let dir = tempfile::tempdir().unwrap();
    let factory = Arc::new(
        MockSessionFactory::new()
            .script(vec![Event::closed(DisconnectReason::RestartRequired)])
            .script(vec![Event::closed(DisconnectReason::BadSession)])
            .script(vec![Event::closed(DisconnectReason::LoggedOut)]),
    );
    let supervisor = build(factory.clone(), &dir).await;
    let cell = supervisor.session();

    supervisor.run().await;

    let sessions = factory.sessions();
    assert_eq!(sessions.len(), 3);
    for session in &sessions {
        assert!(session.calls().contains(&wabot::test_utils::SessionCall::Close));
    }
    assert!(cell.get().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn credentials_from_the_auth_dir_reach_the_factory() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(
        dir.path().join("creds.json"),
        r#"{"registered":true,"me":{"id":"15551234567@s.whatsapp.net"},"noiseKey":"abc"}"#,
    )
    .await
    .unwrap();
    let factory = Arc::new(
        MockSessionFactory::new().script(vec![Event::closed(DisconnectReason::LoggedOut)]),
    );

    build(factory.clone(), &dir).await.run().await;

    let creds = &factory.configs()[0].credentials;
    assert!(creds.registered);
    assert_eq!(creds.extra["noiseKey"], "abc");
}
