use std::sync::Arc;

use tokio::net::TcpListener;

use chatosi_server::chat::store::SqliteMessageStore;
use chatosi_server::config::{generate_config_template, Config};
use chatosi_server::media::DiskImageStore;
use chatosi_server::ws::ConnectionRegistry;
use chatosi_server::{auth, db, routes, state};

/// Headroom over the base64-expanded image for the rest of the JSON body.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("chatosi_server=info"))?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("Chatosi server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    // Load or generate JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let max_image_bytes = config.uploads().max_image_bytes();

    let app_state = state::AppState {
        db: db.clone(),
        jwt_secret,
        token_ttl_secs: config.token_ttl_secs,
        bcrypt_cost: config.bcrypt_cost,
        max_body_bytes: max_image_bytes / 3 * 4 + BODY_OVERHEAD_BYTES,
        connections: Arc::new(ConnectionRegistry::new()),
        messages: Arc::new(SqliteMessageStore::new(db)),
        images: Arc::new(DiskImageStore::new(&config.data_dir, max_image_bytes)),
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
