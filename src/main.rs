use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use wabot::config::{BotConfig, Cli};
use wabot::console::{ConsoleInput, ConsoleSessionFactory};
use wabot::dispatcher::EventDispatcher;
use wabot::reply::ReplyConfig;
use wabot::state::ProcessState;
use wabot::store::message_cache::DEFAULT_FLUSH_INTERVAL;
use wabot::store::{MessageCache, MultiFileAuthState};
use wabot::supervisor::{ConnectionSupervisor, SupervisorConfig};
use wabot::typing::TypingSimulator;

// Demo client driven through the console session.
//
// Usage:
//   cargo run                              # QR linking, echo only
//   cargo run -- --do-reply                # greet every incoming message
//   cargo run -- --use-pairing-code        # link with a phone-number code
//   cargo run -- --no-store                # no message cache file
//
// Events are read from stdin as JSON lines, e.g.
//   {"event":"messages.upsert","data":{"type":"notify","messages":[...]}}

fn main() -> anyhow::Result<()> {
    let config = BotConfig::from(Cli::parse());
    wabot::logging::init(&config.log_file)
        .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = rt.block_on(run(config));
    // The stdin reader parks a blocking thread that never returns on its own.
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(config: BotConfig) -> anyhow::Result<()> {
    let auth = Arc::new(
        MultiFileAuthState::open(&config.auth_dir)
            .await
            .with_context(|| format!("cannot open auth state {}", config.auth_dir.display()))?,
    );
    let process = ProcessState::new(config.retry_ttl);

    let cache = match &config.store_file {
        Some(path) => {
            let cache = Arc::new(MessageCache::new());
            if let Err(e) = cache.read_from_file(path).await {
                warn!("Ignoring unreadable cache file {}: {e}", path.display());
            }
            let saver = cache
                .clone()
                .run_background_saver(path.clone(), DEFAULT_FLUSH_INTERVAL);
            Some((cache, saver))
        }
        None => None,
    };

    let mut dispatcher = EventDispatcher::new(process.clone())
        .with_reply_config(ReplyConfig {
            auto_reply: config.auto_reply,
            ..Default::default()
        })
        .with_typing(config.simulate_typing.then(TypingSimulator::default))
        .with_auth_state(auth.clone());
    if let Some((cache, _)) = &cache {
        dispatcher = dispatcher.with_cache(cache.clone());
    }

    let input = Arc::new(ConsoleInput::stdin());
    let factory = Arc::new(ConsoleSessionFactory::new(input.clone()));
    let mut supervisor =
        ConnectionSupervisor::new(factory, Arc::new(dispatcher), auth.clone(), process)
            .with_config(SupervisorConfig {
                use_pairing_code: config.use_pairing_code,
                ..Default::default()
            })
            .with_prompt(input);
    if let Some((cache, _)) = &cache {
        supervisor = supervisor.with_message_lookup(cache.clone());
    }
    let supervisor = Arc::new(supervisor);

    let mut runner = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.run().await }
    });
    let final_state = tokio::select! {
        state = &mut runner => state?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down...");
            supervisor.shutdown().await;
            runner.await?
        }
    };
    info!("Supervisor finished: {final_state:?}");

    if let Err(e) = auth.save_creds().await {
        error!("Failed to save credentials on exit: {e}");
    }
    if let Some((cache, saver)) = cache {
        cache.stop_background_saver();
        if let Err(e) = saver.await {
            error!("Cache saver task failed: {e}");
        }
    }
    Ok(())
}
