// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use axum::http::HeaderName;
use chrono::Utc;
use server::config::Config;
use server::state::AppState;
use server::storage::BlobStore;
use server::{daily, database, routes};
use tokio::time;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting up the server...");

    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.storage_dir.display()))?;

    let db_pool = match database::establish_connection_pool(&config.database_url).await {
        Ok(pool) => {
            tracing::info!("Database connection was made successfully.");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect with the database: {:?}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(db_pool, BlobStore::new(&config.storage_dir));

    // Periodic sweep: everyone checked in today gets any daily tasks they are
    // still missing, including after midnight and after failed background checks.
    let watcher_state = state.clone();
    let period = config.rollover_check;
    tokio::spawn(async move {
        let mut interval = time::interval(period);

        // The first tick completes immediately. Skip it to wait for the first interval.
        interval.tick().await;

        loop {
            interval.tick().await;

            let today = Utc::now().date_naive();
            let created = daily::sweep_checked_in_users(&watcher_state, today).await;
            if created > 0 {
                tracing::info!("Created {} daily tasks for {}.", created, today);
            } else {
                tracing::debug!("No daily tasks missing for {}.", today);
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static(server::auth::USER_HEADER),
        ])
        .allow_origin(Any);

    let app = routes::create_router(state).layer(cors);

    tracing::info!("The server listens on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
