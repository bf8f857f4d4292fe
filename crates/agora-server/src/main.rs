use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use agora_api::auth::{AppState, AppStateInner};
use agora_core::{Forum, ForumConfig};
use agora_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "agora_server=debug,agora_api=debug,agora_core=debug,agora_db=debug,tower_http=debug"
                        .into()
                }),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("AGORA_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("AGORA_DB_PATH").unwrap_or_else(|_| "agora.db".into());
    let host = std::env::var("AGORA_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AGORA_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let auto_upvote: bool = std::env::var("AGORA_AUTO_UPVOTE")
        .unwrap_or_else(|_| "true".into())
        .parse()?;
    let token_ttl_hours: i64 = std::env::var("AGORA_TOKEN_TTL_HOURS")
        .unwrap_or_else(|_| "24".into())
        .parse()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let forum = Forum::new(db.clone(), ForumConfig { auto_upvote });
    let app_state: AppState = Arc::new(AppStateInner {
        forum,
        db,
        jwt_secret,
        token_ttl: chrono::Duration::hours(token_ttl_hours),
    });

    let app = agora_api::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Agora server listening on {} (auto upvote: {})", addr, auto_upvote);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
