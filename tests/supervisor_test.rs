use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use etcd_httpsd::config::Config;
use etcd_httpsd::server::{self, ServerError};
use etcd_httpsd::services::{
    AgentError, MemoryStore, RegistrationAgent, RegistrationConfig, ServiceDef, StoreError,
};

fn registration(renew_interval: Duration, max_renewal_failures: u32) -> RegistrationConfig {
    RegistrationConfig {
        lease_ttl: Duration::from_secs(2),
        renew_interval,
        max_renewal_failures,
        key: "/discovery/etcd-httpsd/test-host".to_string(),
        service: ServiceDef {
            service_port: 8080,
            metrics_port: 8080,
            metrics_url: "/metrics".to_string(),
        },
    }
}

async fn fetch(addr: SocketAddr, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

#[tokio::test]
async fn test_shutdown_completes_in_flight_requests() {
    let store = MemoryStore::new();
    store.insert(
        "/discovery/webapp/instance-7",
        r#"{"service_port":8080,"metrics_port":9090,"metrics_url":"/metrics"}"#,
    );
    store.set_list_delay(Duration::from_millis(300));

    let agent = RegistrationAgent::start(store.clone(), registration(Duration::from_millis(500), 3))
        .await
        .expect("agent start failed");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().expect("local addr");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server::serve(
        agent,
        listener,
        "/",
        Duration::from_secs(5),
        shutdown.clone(),
    ));

    let in_flight = tokio::spawn(fetch(addr, "/services"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let response = in_flight
        .await
        .expect("join failed")
        .expect("in-flight request failed");
    assert!(response.starts_with("HTTP/1.1 200"), "response: {response}");
    assert!(response.contains(r#""targets":["instance-7:9090"]"#));

    server
        .await
        .expect("join failed")
        .expect("supervisor should exit cleanly");

    // 监听器已关闭，不再接受新连接
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_renewal_failure_stops_the_http_listener() {
    let store = MemoryStore::new();
    store.fail_next_keep_alives(u32::MAX);

    let agent = RegistrationAgent::start(store.clone(), registration(Duration::from_millis(200), 2))
        .await
        .expect("agent start failed");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let shutdown = CancellationToken::new();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        server::serve(agent, listener, "/", Duration::from_secs(1), shutdown.clone()),
    )
    .await
    .expect("supervisor did not stop");

    assert!(shutdown.is_cancelled());
    assert!(matches!(
        result,
        Err(ServerError::Agent(AgentError::LeaseRenewal { failures: 2, .. }))
    ));
}

#[tokio::test]
async fn test_unreachable_store_fails_startup() {
    let config = Config::from_vars([
        ("ETCD_SERVERS".to_string(), "http://127.0.0.1:1".to_string()),
        ("CONNECT_TIMEOUT_SECS".to_string(), "1".to_string()),
        ("PORT".to_string(), "0".to_string()),
    ])
    .expect("valid config");

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        server::run(config, CancellationToken::new()),
    )
    .await
    .expect("startup did not give up");

    assert!(matches!(
        result,
        Err(ServerError::Agent(AgentError::Connection(StoreError::Connection { .. })))
    ));
}
