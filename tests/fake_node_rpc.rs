//! End-to-end tests against fake pNode RPC services.
//!
//! Each fake node is a raw TCP listener that speaks just enough HTTP/1.1
//! to accept `POST /rpc` with a JSON-RPC body and answer from a table.

use pnode_collector::app_context::AppContext;
use pnode_collector::config::Config;
use pnode_collector::rpc::{HttpTransport, RpcTransport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone)]
enum Reply {
    /// Full JSON-RPC envelope to send back
    Envelope(Value),
    /// Accept the request and never answer
    Hang,
}

struct FakeNode {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeNode {
    async fn start(replies: HashMap<&'static str, Reply>) -> Self {
        Self::start_on("127.0.0.1", replies).await
    }

    async fn start_on(host: &str, replies: HashMap<&'static str, Reply>) -> Self {
        let listener = TcpListener::bind((host, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(replies);

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let replies = replies.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(socket, replies, seen).await;
                });
            }
        });

        Self { port, requests }
    }

    fn methods_seen(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r["method"].as_str().map(str::to_string))
            .collect()
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    replies: Arc<HashMap<&'static str, Reply>>,
    seen: Arc<Mutex<Vec<Value>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    // Read headers
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buffer, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    if !head.starts_with("POST /rpc ") {
        let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        socket.write_all(response.as_bytes()).await?;
        return Ok(());
    }

    let request: Value = serde_json::from_slice(&buffer[header_end..]).unwrap_or(Value::Null);
    seen.lock().unwrap().push(request.clone());

    let method = request["method"].as_str().unwrap_or_default();
    let body = match replies.get(method) {
        Some(Reply::Envelope(envelope)) => envelope.to_string(),
        Some(Reply::Hang) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Ok(());
        }
        None => json!({
            "jsonrpc": "2.0",
            "error": {"code": -32601, "message": "Method not found"},
            "id": 1
        })
        .to_string(),
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn ok(result: Value) -> Reply {
    Reply::Envelope(json!({"jsonrpc": "2.0", "result": result, "id": 1}))
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_transport_returns_result_payload() {
    let node = FakeNode::start(HashMap::from([("get-stats", ok(json!({"uptime": 77})))])).await;
    let transport = HttpTransport::new(Duration::from_secs(1));

    let result = transport.call("127.0.0.1", node.port, "get-stats").await;
    assert_eq!(result, Some(json!({"uptime": 77})));

    let requests = node.requests.lock().unwrap().clone();
    assert_eq!(requests, vec![json!({"jsonrpc": "2.0", "method": "get-stats", "id": 1})]);
}

#[tokio::test]
async fn test_transport_error_field_is_no_result() {
    let node = FakeNode::start(HashMap::new()).await;
    let transport = HttpTransport::new(Duration::from_secs(1));

    assert_eq!(transport.call("127.0.0.1", node.port, "get-stats").await, None);
    assert_eq!(node.methods_seen(), vec!["get-stats".to_string()]);
}

#[tokio::test]
async fn test_transport_refused_connection_is_no_result() {
    let port = closed_port().await;
    let transport = HttpTransport::new(Duration::from_secs(1));
    assert_eq!(transport.call("127.0.0.1", port, "get-stats").await, None);
}

#[tokio::test]
async fn test_transport_times_out() {
    let node = FakeNode::start(HashMap::from([("get-stats", Reply::Hang)])).await;
    let transport = HttpTransport::new(Duration::from_millis(200));

    let started = Instant::now();
    assert_eq!(transport.call("127.0.0.1", node.port, "get-stats").await, None);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_discovery_and_enrichment_end_to_end() {
    let dir = tempfile::tempdir().unwrap();

    // Node A answers on gossip+1 (first candidate)
    let node_a = FakeNode::start(HashMap::from([(
        "get-stats",
        ok(json!({"file_size": 1000, "uptime": 60, "cpu_percent": 3.5})),
    )]))
    .await;
    // Node B answers only on its gossip port (third candidate). It lives on
    // another loopback address so the two nodes get separate cache slots.
    let node_b = FakeNode::start_on(
        "127.0.0.2",
        HashMap::from([("get-stats", ok(json!({"total_bytes": 42})))]),
    )
    .await;

    let addr_a = format!("127.0.0.1:{}", node_a.port - 1);
    let addr_b = format!("127.0.0.2:{}", node_b.port);

    let seed_one = FakeNode::start(HashMap::from([(
        "get-pods",
        ok(json!({"pods": [
            {"address": addr_a, "version": "0.8.0", "last_seen_timestamp": 100, "pubkey": "PK-A"},
            {"address": addr_b, "version": "0.8.0", "last_seen_timestamp": 50, "pubkey": null}
        ], "total_count": 2})),
    )]))
    .await;
    let seed_two = FakeNode::start(HashMap::from([(
        "get-pods",
        ok(json!({"pods": [
            {"address": addr_b, "version": "0.8.1", "last_seen_timestamp": 150, "pubkey": null}
        ], "total_count": 1})),
    )]))
    .await;
    let dead_seed = closed_port().await;

    let mut config = Config::default();
    config.discovery.seeds = vec![
        format!("127.0.0.1:{}", seed_one.port),
        format!("127.0.0.1:{}", seed_two.port),
        format!("127.0.0.1:{}", dead_seed),
    ];
    config.rpc.default_port = closed_port().await;
    config.rpc.timeout_ms = 500;
    config.cache.path = dir.path().join("rpc-cache.json").display().to_string();

    let transport: Arc<dyn RpcTransport> = Arc::new(HttpTransport::new(config.rpc.timeout()));
    let ctx = AppContext::with_transport(config, transport);
    let snapshot = ctx.collector.refresh().await;

    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.status.last_seeds_responding, 2);
    assert_eq!(snapshot.status.last_seeds_queried, 3);

    // Freshest first: B was last seen at 150 by the second seed
    let b = &snapshot.nodes[0];
    assert_eq!(b.record.address, addr_b);
    assert_eq!(b.record.last_seen_at, 150);
    assert_eq!(b.record.version, "0.8.1");
    assert_eq!(b.stats.as_ref().unwrap().total_bytes, Some(42));

    let a = &snapshot.nodes[1];
    assert_eq!(a.record.pubkey.as_deref(), Some("PK-A"));
    assert_eq!(a.stats.as_ref().unwrap().file_size, Some(1000));
    assert_eq!(a.stats.as_ref().unwrap().cpu_percent, Some(3.5));

    assert_eq!(node_a.methods_seen(), vec!["get-stats".to_string()]);
    assert_eq!(node_b.methods_seen(), vec!["get-stats".to_string()]);

    // A second pass inside the TTL is served entirely from the cache
    ctx.collector.refresh().await;
    assert_eq!(node_a.methods_seen().len(), 1);
    assert_eq!(node_b.methods_seen().len(), 1);

    ctx.cache.flush().unwrap();
    let persisted: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("rpc-cache.json")).unwrap()).unwrap();
    assert!(persisted.get("get-stats:127.0.0.1").is_some());
    assert_eq!(persisted["get-stats:127.0.0.2"]["data"]["total_bytes"], json!(42));
}
