use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use sigil_chat::web::routes::model::load_model_into;
use sigil_chat::web::{logger, serve, AppConfig, AppState};
use sigil_chat::{sys_error, sys_info, sys_warn};
use sigil_chat_db::Database;

/// Sigil Chat HTTP backend for local GGUF models
#[derive(Parser)]
#[command(name = "sigil_chat_web", version)]
struct Cli {
    /// Address to bind (overrides SIGIL_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides SIGIL_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Model to load at startup (overrides SIGIL_DEFAULT_MODEL_PATH)
    #[arg(short, long)]
    model: Option<String>,

    /// SQLite session database (overrides SIGIL_DATABASE_PATH)
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.model {
        config.default_model_path = Some(model);
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    logger::init(config.log_level).context("Failed to install logger")?;

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    let db = Database::new(&config.database_path)
        .with_context(|| format!("Failed to open session database {}", config.database_path))?;
    let state = AppState::new(config, db)?;

    if let Some(raw_path) = state.config.default_model_path.clone() {
        let path = state.config.resolve_model_path(&raw_path);
        sys_info!("Loading default model from {}", path.display());
        let task_state = state.clone();
        match tokio::task::spawn_blocking(move || load_model_into(&task_state, &path)).await {
            Ok(Ok(_)) => {}
            // The server stays up so a model can be loaded over HTTP.
            Ok(Err(e)) => sys_warn!("Default model not loaded: {}", e),
            Err(e) => sys_error!("Default model load task failed: {}", e),
        }
    }

    sys_info!("Available endpoints:");
    sys_info!("  GET    /health                             - Health check");
    sys_info!("  GET    /api/v1/model/status                - Loaded model status");
    sys_info!("  POST   /api/v1/model/load                  - Load a GGUF model");
    sys_info!("  POST   /api/v1/model/unload                - Unload the current model");
    sys_info!("  POST   /api/v1/chat                        - Single message chat");
    sys_info!("  POST   /api/v1/chat/chat-v2                - Instruction / multi-turn chat");
    sys_info!("  GET    /api/v1/chat/sessions               - List sessions");
    sys_info!("  GET    /api/v1/chat/session/{{id}}           - Get a session");
    sys_info!("  DELETE /api/v1/chat/session/{{id}}           - Delete a session");
    sys_info!("  POST   /api/v1/chat/session/{{id}}/rename    - Rename a session");
    sys_info!("  GET    /api/v1/settings/current            - Current generation settings");
    sys_info!("  POST   /api/v1/settings/update             - Update generation settings");
    sys_info!("  GET    /api/v1/system/device               - Compute device");
    sys_info!("  GET    /themes                             - Available UI themes");

    serve(addr, state).await.context("Server error")?;
    Ok(())
}
