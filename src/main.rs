use time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::Key};

use group_expense_server::{
    AppState, config::Config, constants::*, cors_layer, router, store::Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    let store = Store::open(&config.data_path).await?;
    let state = AppState::new(store, config.utc_offset);

    // TODO: swap MemoryStore for a persistent session store so logins survive restarts
    let session_store = MemoryStore::default();
    let key = Key::try_from(config.session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid session secret: {}", e))?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_name(SESSION_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::days(SESSION_EXPIRY_DAYS)))
        .with_signed(key);

    let app = router(state)
        .layer(session_layer)
        .layer(cors_layer(config.cors_origin.as_deref())?);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    log::info!("server running on http://{}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
