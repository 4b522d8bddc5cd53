mod app;
mod auth;
mod config;
mod error;
mod graphql;
mod kv;
mod mailer;
mod posts;
mod seed;
mod session;
mod state;
mod timestamps;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "reddit_clone=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = AppState::init().await?;

    sqlx::migrate!("./migrations").run(&app_state.db).await?;
    tracing::info!("migrations applied");

    if app_state.config.seed_demo_data {
        seed::demo_posts(&app_state.db).await?;
    }

    let schema = graphql::build_schema(app_state.clone());
    let app = app::build_app(app_state, schema)?;
    app::serve(app).await
}
