//! Server mode
//!
//! This module contains the HTTP server startup logic.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use tracing::{info, warn};

use crate::api::services::{WeatherState, weather_routes};
use crate::config::AppConfig;
use crate::runtime::lifetime;
use crate::utils::ip::parse_networks;

/// Run the HTTP server
///
/// Builds all components from `config`, starts the maintenance task and
/// serves until a shutdown signal arrives.
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server(config: Arc<AppConfig>) -> Result<()> {
    let startup = lifetime::startup::prepare_server_startup(config.clone())
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {:#}", e);
            e
        })?;

    let trusted_proxies = parse_networks(&config.server.trusted_proxies)?;
    let maintenance = lifetime::startup::spawn_maintenance(&startup);
    let state = WeatherState::new(startup.service.clone(), trusted_proxies);

    if config.server.trusted_proxies.is_empty() {
        warn!(
            "Client IP: Auto-detect mode enabled. \
             Connections from private IPs will use X-Forwarded-For. \
             To disable, configure server.trusted_proxies explicitly."
        );
    } else {
        info!(
            "Client IP: Explicit trusted proxies configured: {:?}",
            config.server.trusted_proxies
        );
    }

    let cpu_count = config.server.cpu_count.clamp(1, 32);
    info!("Using {} CPU cores for the server", cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Compress::default())
            .wrap(DefaultHeaders::new().add(("Cache-Control", "no-cache, no-store, must-revalidate")))
            .service(weather_routes())
    })
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_millis(5000))
    .client_disconnect_timeout(Duration::from_millis(1000))
    .workers(cpu_count)
    .disable_signals()
    .bind(&bind_address)?
    .run();

    warn!("Starting server at http://{}", bind_address);
    let handle = server.handle();

    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown() => {
            handle.stop(true).await;
            warn!("Graceful shutdown completed");
        }
    }

    maintenance.abort();
    Ok(())
}
