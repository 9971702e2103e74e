mod app;
mod auth;
mod config;
mod error;
mod state;

fn init_tracing() {
    // Resolver diagnostics sit at debug under `agil_backend::auth` and stay off by default.
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "agil_backend=info,axum=info,tower_http=info".to_string());
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let app_state = state::AppState::init().await?;
    let app = app::build_app(app_state);
    app::serve(app).await
}
