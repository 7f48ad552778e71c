use std::sync::Arc;

use async_std::task;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use h2serve::config::ServerConfig;
use h2serve::handler::StaticSite;
use h2serve::log::Logger;
use h2serve::transport::http2::H2Transport;
use h2serve::{ResponseOptions, ServerEvent, ServerOptions, create_server};

const DEFAULT_CONFIG: &str = "conf.toml";

fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "h2serve=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = ServerConfig::from_file(&path).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Using default configuration");
        ServerConfig::default()
    });
    if config.process > 1 {
        tracing::warn!(process = config.process, "Only one worker is supported, ignoring `process`");
    }

    let log = Logger::new("server");
    let options = ServerOptions {
        response: ResponseOptions {
            headers: config.response_headers(),
            send_date: config.send_date,
            attach_timeout: config.attach_timeout,
        },
        log: log.clone(),
        on_event: Some(Arc::new(|event: &ServerEvent| {
            if let ServerEvent::ClientError { peer, error } = event {
                tracing::debug!(client = %peer, error = %error, "Connection dropped");
            }
        })),
    };

    let server = create_server(options, StaticSite::from_config(&config, &log));
    let transport = H2Transport::new(config.h2.clone());
    tracing::info!(address = %config.address, port = config.port, root = %config.directory.display(), "Starting");

    task::block_on(server.listen(transport, (config.address, config.port)))
}
