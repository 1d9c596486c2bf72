#![allow(dead_code)]

mod db;
mod event;
mod rate_limit;
mod room;
mod routes;
mod services;
mod state;
mod validation;
mod words;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "4000".into())
        .parse()
        .expect("invalid PORT");

    // Failing to bind the store is the only fatal startup condition.
    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let state = state::AppState::new(pool);

    // Background sweeps: idle rooms and stale rate-limit buckets.
    let _room_sweeper = services::sweeper::spawn_room_sweeper(state.clone());
    let _limiter_sweeper = services::sweeper::spawn_limiter_sweeper(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "sketchguess listening");
    axum::serve(listener, app).await.expect("server failed");
}
