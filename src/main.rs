mod admin;
mod app;
mod auth;
mod billing;
mod config;
mod error;
mod essays;
mod grading;
mod payments;
mod state;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "essayiq=debug,axum=info,tower_http=info".to_string());
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

    let app_state = state::AppState::init().await?;
    tracing::info!(
        fallback = ?app_state.config.grading.fallback,
        auto_approve = ?app_state.config.payments.auto_approve_after,
        "essayiq starting"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}
