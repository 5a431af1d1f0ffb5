use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use time::UtcOffset;
use tower_http::cors::CorsLayer;

pub mod aggregator;
pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod expenses;
pub mod feed;
pub mod groups;
pub mod incomes;
pub mod live;
pub mod models;
pub mod preferences;
pub mod push;
pub mod store;
pub mod tracker;
pub mod utils;

use preferences::Preferences;
use push::PushService;
use store::Store;

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub preferences: Preferences,
    pub push: PushService,
    pub utc_offset: UtcOffset,
}

impl AppState {
    pub fn new(store: Store, utc_offset: UtcOffset) -> Self {
        let db = store.db().clone();
        AppState {
            store,
            preferences: Preferences::new(db.clone()),
            push: PushService::new(db),
            utc_offset,
        }
    }
}

pub fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(origin)?)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Routes without the session and CORS layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/groups", get(groups::get_groups).post(groups::post_group))
        .route(
            "/groups/{group_id}/expenses",
            get(expenses::get_expenses).post(expenses::create_expense),
        )
        .route(
            "/groups/{group_id}/expenses/month",
            get(expenses::get_month_expenses),
        )
        .route(
            "/groups/{group_id}/incomes",
            get(incomes::get_incomes).post(incomes::create_income),
        )
        .route("/groups/{group_id}/summary", get(expenses::get_summary))
        .route("/live", get(live::live_dashboard))
        .route(
            "/preferences/selected-group",
            get(preferences::get_selected_group)
                .put(preferences::put_selected_group)
                .delete(preferences::delete_selected_group),
        )
        .route(
            "/push/subscription",
            post(push::subscribe_user).delete(push::unsubscribe_user),
        )
        .route("/push/send", post(push::send_notification))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
