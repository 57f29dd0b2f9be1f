use mcp_railway_service::config::Settings;
use mcp_railway_service::{logging, Manager};

/// Thin process entry point: wire up logging, configuration, and the
/// Manager, auto-start whatever the registry marks `auto_start = true`,
/// then wait for a ctrl-c and tear every connection down before exiting.
///
/// Deliberately not an HTTP server - the design notes treat the HTTP
/// surface as an external collaborator this core is consumed by, not a
/// concern of the core itself.
#[tokio::main]
async fn main() {
    let settings = Settings::load();
    logging::init(&settings.app_env);

    let manager = Manager::with_default_registry(&settings.server_api_keys);

    let status = manager.status();
    tracing::info!(
        registered = status.registered_servers.len(),
        servers = ?status.registered_servers,
        "mcp-railway-service starting",
    );

    let startup = manager.initialize_default_servers().await;
    if !startup.errors.is_empty() {
        for (name, error) in &startup.errors {
            tracing::warn!(server = %name, %error, "auto-start failed at startup");
        }
    }
    tracing::info!(connected = startup.ok.len(), "auto-start complete");

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("ctrl-c received, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c, shutting down anyway"),
    }

    manager.disconnect_all().await;
    tracing::info!("all connections closed, exiting");
}
