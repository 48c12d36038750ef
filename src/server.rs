use std::future::IntoFuture;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError};
use crate::services::web;
use crate::services::registration::{AgentError, RegistrationAgent};
use crate::services::store::LeaseStore;
use crate::services::supervisor::UnitGroup;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http server error: {0}")]
    Http(#[source] std::io::Error),

    #[error("unit panicked: {0}")]
    UnitPanicked(String),
}

/// 运行直到收到 SIGINT/SIGTERM 或任一任务失败
pub async fn start(config: Config) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    run(config, shutdown).await
}

/// 连接存储、注册本进程，并在 `shutdown` 取消前持续响应服务发现请求
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), ServerError> {
    let endpoints = config.endpoints();
    tracing::info!(endpoints = ?endpoints, "Connecting to etcd");
    let agent =
        RegistrationAgent::connect(&endpoints, config.connect_timeout(), config.registration())
            .await?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(addr = %addr, "Discovery server listening");

    serve(
        agent,
        listener,
        &config.discovery_prefix,
        config.shutdown_grace(),
        shutdown,
    )
    .await
}

/// 监管续约循环和 HTTP 监听
///
/// `shutdown` 被取消（外部信号或任务失败）后停止接受新连接，进行中的请求
/// 最多有 `drain` 时间完成。返回第一个任务错误。
pub async fn serve<S: LeaseStore>(
    agent: RegistrationAgent<S>,
    listener: TcpListener,
    prefix: &str,
    drain: Duration,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let app = web::router(agent.store().clone(), prefix);
    let mut units = UnitGroup::new(shutdown.clone());

    let renewal_shutdown = shutdown.clone();
    units.spawn("lease-renewal", async move {
        agent.run(renewal_shutdown).await.map_err(ServerError::from)
    });

    let http_shutdown = shutdown.clone();
    units.spawn("http", async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(http_shutdown.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => result.map_err(ServerError::Http),
            _ = http_shutdown.cancelled() => {
                tracing::info!(drain_secs = drain.as_secs_f64(), "Draining in-flight requests");
                match tokio::time::timeout(drain, &mut server).await {
                    Ok(result) => result.map_err(ServerError::Http),
                    Err(_) => {
                        tracing::warn!("Drain period elapsed, dropping remaining connections");
                        Ok(())
                    }
                }
            }
        }
    });

    let result = units.wait().await;
    tracing::info!("Shutdown complete");
    result
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for interrupt signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for terminate signal");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
