use etcd_httpsd::config::Config;
use etcd_httpsd::server;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 文件可选，缺失时只记录日志
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = dotenv {
        tracing::info!(error = %e, "Unable to load env file");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "etcd_httpsd starting");

    let config = Config::load()?;
    if let Err(e) = server::start(config).await {
        tracing::error!(error = %e, "Server exited with error");
        return Err(e.into());
    }
    Ok(())
}
