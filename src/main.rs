use std::env;
use std::sync::Arc;

use nestegg::store::{JsonFileStore, MemoryStore, ScenarioStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            let store: Arc<dyn ScenarioStore> = match raw_args.get(3) {
                Some(path) => Arc::new(JsonFileStore::open(path)),
                None => Arc::new(MemoryStore::new()),
            };
            if let Err(e) = nestegg::api::run_http_server(port, store).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("simulate") => {
            if let Err(e) = nestegg::api::run_simulate_command(&raw_args[1..]).await {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: cargo run -- serve [port] [scenario-file.json]");
            eprintln!("       cargo run -- simulate [options]");
            std::process::exit(1);
        }
    }
}
