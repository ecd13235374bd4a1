use crate::config::DestroyerConfig;
use crate::discord::DiscordClient;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::debug;

pub fn init(config: &DestroyerConfig) {
    tracing_subscriber::fmt()
        .with_level(true)
        .with_thread_ids(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();

    debug!(
        "Loaded config for environment '{}' (prod: {})",
        config.environment, config.is_prod
    );

    let metrics_port = config.metrics.port.unwrap_or(9090);
    let socket = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), metrics_port);
    PrometheusBuilder::new()
        .with_http_listener(socket)
        .install()
        .expect("Failed to set up Prometheus metrics exporter");

    debug!(
        "Metrics endpoint listening on http://0.0.0.0:{}",
        metrics_port
    );
}

pub fn http_client(config: &DestroyerConfig) -> DiscordClient {
    debug!("Creating Discord HTTP client");
    // Route through the configured proxy when present
    match config.discord.proxy.as_ref() {
        Some(proxy) => DiscordClient::with_base_url(config.discord.clone(), proxy),
        None => DiscordClient::new(config.discord.clone()),
    }
}
