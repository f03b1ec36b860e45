//! Reference stdin loop driving `kindred_engine::handle_turn` for one bot.
//! Not a chat frontend in its own right — it exists to exercise the pipeline
//! end to end against a real store and a real invoker from a terminal.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kindred_core::KindredConfig;
use kindred_llm::{Invoker, InvokerRouter, InvokerSlot};
use kindred_store::Store;
use tokio::sync::Mutex;

const DEFAULT_BOT_ID: &str = "kindred";
const DEFAULT_EXTERNAL_ID: &str = "local";

fn build_invoker(provider_env: &str, key_env: &str) -> anyhow::Result<(Box<dyn Invoker>, String)> {
    let provider = std::env::var(provider_env).unwrap_or_else(|_| "anthropic".to_string());
    let known = kindred_llm::find(&provider)
        .ok_or_else(|| anyhow::anyhow!("unknown invoker provider '{provider}', see kindred_llm::KNOWN_INVOKERS"))?;
    let key = std::env::var(key_env)
        .map_err(|_| anyhow::anyhow!("{key_env} is not set, needed for provider '{provider}'"))?;
    Ok(((known.build)(key), known.default_model.to_string()))
}

fn open_store(path: &str) -> anyhow::Result<Box<dyn Store>> {
    match kindred_store::SqliteStore::open(path) {
        Ok(store) => Ok(Box::new(store)),
        Err(e) => {
            tracing::warn!(error = %e, path, "failed to open sqlite store, falling back to filesystem store");
            let base_dir = std::path::Path::new(path)
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            Ok(Box::new(kindred_store::FilesystemStore::open(base_dir)?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "kindred_engine=info".into()),
        )
        .init();

    let config_path = std::env::var("KINDRED_CONFIG").ok();
    let config = KindredConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config load failed, using defaults");
        KindredConfig::default()
    });

    let store = open_store(&config.store.path)?;

    let (main_invoker, main_model) = build_invoker("KINDRED_MAIN_PROVIDER", "KINDRED_MAIN_API_KEY")?;
    let (fast_invoker, fast_model) = build_invoker("KINDRED_FAST_PROVIDER", "KINDRED_FAST_API_KEY")
        .unwrap_or_else(|_| {
            tracing::warn!("no dedicated fast-invoker credentials, reusing the main invoker's provider");
            (Box::new(InvokerRouter::new(vec![InvokerSlot::new(
                (kindred_llm::find("anthropic").unwrap().build)(std::env::var("KINDRED_MAIN_API_KEY").unwrap_or_default()),
                1,
            )])) as Box<dyn Invoker>, main_model.clone())
        });
    let judge_invoker = build_invoker("KINDRED_JUDGE_PROVIDER", "KINDRED_JUDGE_API_KEY").ok();

    let models = kindred_engine::ModelIds {
        main: main_model,
        fast: fast_model,
        judge: judge_invoker.as_ref().map(|(_, m)| m.clone()).unwrap_or_default(),
    };

    let locks: Arc<DashMap<(String, String), Arc<Mutex<()>>>> = Arc::new(DashMap::new());
    let timeout = Duration::from_secs_f64(config.turn_timeout_secs);

    println!("kindred-cli ready. type a line and press enter (ctrl-d to quit).");
    let mut line = String::new();
    loop {
        line.clear();
        print!("> ");
        std::io::stdout().flush().ok();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let key = (DEFAULT_BOT_ID.to_string(), DEFAULT_EXTERNAL_ID.to_string());
        let lock = locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let _guard = lock.lock().await;

        let deps = kindred_engine::TurnDeps {
            store: store.as_ref(),
            main_invoker: main_invoker.as_ref(),
            fast_invoker: fast_invoker.as_ref(),
            judge_invoker: judge_invoker.as_ref().map(|(inv, _)| inv.as_ref()),
            models: models.clone(),
            lats: config.lats.clone(),
        };

        match tokio::time::timeout(timeout, kindred_engine::handle_turn(&deps, DEFAULT_BOT_ID, DEFAULT_EXTERNAL_ID, text)).await {
            Ok(outcome) => {
                for segment in &outcome.final_segments {
                    println!("{segment}");
                }
            }
            Err(_) => {
                tracing::error!(turn_timeout_secs = config.turn_timeout_secs, "turn timed out");
                println!("...(that took too long, try again)");
            }
        }
    }

    Ok(())
}
