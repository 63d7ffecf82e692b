use std::time::Duration;

use tokio::net::TcpListener;

use relay_probe_rs::prober::{probe_candidate, probe_port};

const TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn open_port_measures_latency() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let latency = probe_port(addr.ip(), addr.port(), TIMEOUT).await;
    assert!(latency.is_some());
    assert!(latency.expect("latency") < 500);
}

#[tokio::test]
async fn refused_port_is_unreachable() {
    // Nothing listens on port 1 of loopback; the connect is refused.
    let ip = "127.0.0.1".parse().expect("ip");
    assert!(probe_port(ip, 1, TIMEOUT).await.is_none());
}

#[tokio::test]
async fn chain_accepts_first_successful_port() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let hit = probe_candidate(addr.ip(), &[1, addr.port(), 2], TIMEOUT)
        .await
        .expect("one port reachable");
    assert_eq!(hit.port, addr.port());
}

#[tokio::test]
async fn chain_with_no_reachable_port_fails() {
    let ip = "127.0.0.1".parse().expect("ip");
    assert!(probe_candidate(ip, &[1, 2, 3], TIMEOUT).await.is_none());
}
