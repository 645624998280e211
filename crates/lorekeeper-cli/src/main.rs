//! `lorekeeper` – game memory command line.
//!
//! One-shot commands (`create_collection`, `add_memory`, `query`, ...) print
//! exactly one JSON object to stdout and exit with status 0 on success or a
//! recoverable input fault, 1 otherwise. Two process-level commands sit
//! beside them:
//!
//! * `lorekeeper serve [port]` – run the HTTP bridge over the local store
//!   until Ctrl-C.
//! * `lorekeeper init` – write the default `~/.lorekeeper/config.toml`.
//!
//! Logs go to stderr; see [`telemetry`].

mod config;
mod dispatcher;
mod telemetry;

use std::sync::Arc;

use lorekeeper_bridge::{BridgeServer, RemoteStore};
use lorekeeper_store::{HashingEmbedder, MemoryStore, SqliteStore};
use lorekeeper_types::MemoryError;
use serde_json::json;
use tracing::{error, info};

use config::{Backend, Config};
use dispatcher::{Command, Dispatcher, Reply};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let serving = args.first().map(String::as_str) == Some("serve");

    // One-shot commands stay quiet unless RUST_LOG says otherwise.
    let guard = telemetry::init_tracing("lorekeeper", if serving { "info" } else { "warn" });

    let code = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(run(args)),
        Err(e) => emit(&Reply::from_error(&MemoryError::Backend(format!(
            "failed to start async runtime: {e}"
        )))),
    };

    // `process::exit` skips destructors; flush spans first.
    drop(guard);
    std::process::exit(code);
}

async fn run(args: Vec<String>) -> i32 {
    match args.first().map(String::as_str) {
        Some("serve") => serve(args.get(1).map(String::as_str)).await,
        Some("init") => match config::init() {
            Ok(path) => {
                println!("{}", json!({"success": true, "path": path.display().to_string()}));
                0
            }
            Err(e) => emit(&Reply::from_error(&MemoryError::InvalidArgument(e))),
        },
        _ => one_shot(&args).await,
    }
}

/// Parse first so argument faults never open a store, then execute.
async fn one_shot(args: &[String]) -> i32 {
    let command = match Command::parse(args) {
        Ok(c) => c,
        Err(e) => return emit(&Reply::from_error(&e)),
    };
    let store = match config::load()
        .map_err(MemoryError::InvalidArgument)
        .and_then(|cfg| open_store(&cfg))
    {
        Ok(s) => s,
        Err(e) => return emit(&Reply::from_error(&e)),
    };
    emit(&Dispatcher::new(store).dispatch(command).await)
}

async fn serve(port_arg: Option<&str>) -> i32 {
    let result = async {
        let cfg = config::load().map_err(MemoryError::InvalidArgument)?;
        let port = match port_arg {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                MemoryError::InvalidArgument(format!("port must be 0-65535, got {raw:?}"))
            })?,
            None => cfg.bridge_port,
        };
        let store = open_local(&cfg)?;
        info!(data_path = %cfg.data_path.display(), "serving local store");
        BridgeServer::new(Arc::new(store))
            .with_host(cfg.bridge_host.clone())
            .with_port(port)
            .run()
            .await
    }
    .await;

    match result {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "bridge stopped");
            eprintln!("lorekeeper serve: {e}");
            1
        }
    }
}

fn open_local(cfg: &Config) -> Result<SqliteStore, MemoryError> {
    SqliteStore::open_with_embedder(
        &cfg.data_path,
        Box::new(HashingEmbedder::new(cfg.embedding_dims)),
    )?
    .with_busy_timeout(cfg.busy_timeout())
}

fn open_store(cfg: &Config) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    let store: Arc<dyn MemoryStore> = match cfg.backend {
        Backend::Local => Arc::new(open_local(cfg)?),
        Backend::Remote => Arc::new(RemoteStore::new(&cfg.remote_url, cfg.request_timeout())?),
    };
    Ok(store)
}

fn emit(reply: &Reply) -> i32 {
    println!("{}", reply.to_json());
    reply.exit_code
}
