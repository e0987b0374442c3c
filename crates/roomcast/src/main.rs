use roomcast::config::ServerConfig;
use roomcast::logging::init_logging;
use roomcast::{RoomcastError, RoomcastServerBuilder};

#[tokio::main]
async fn main() -> Result<(), RoomcastError> {
    init_logging();

    let config = ServerConfig::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        execution_limit = config.dispatch.execution_limit,
        retry_scope = %config.dispatch.retry_scope,
        echo_to_sender = config.service.echo_to_sender,
        "starting roomcast"
    );

    let server = RoomcastServerBuilder::from_config(config).build().await?;
    server.run().await
}
