use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dailyfeed_content::{
    app::{ComponentRegistry, build_router, server},
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let bind_addr = config.http_bind();
    let registry = ComponentRegistry::build(config)
        .await
        .context("failed to build component registry")?;

    let shutdown_token = CancellationToken::new();
    let replayer = registry.spawn_replayer(shutdown_token.child_token());
    if replayer.is_none() {
        info!("dead letter replay disabled");
    }

    let router = build_router(registry);
    let served = server::serve(router, bind_addr, shutdown_token.clone()).await;
    shutdown_token.cancel();

    if let Some(handle) = replayer {
        if let Err(error) = handle.await {
            warn!(%error, "dead letter replayer task failed");
        }
    }

    served
}
