use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use tower::ServiceExt;

use meridian_rpc::{
    create_router, AuthorityInfo, DebugBackend, FilterState, NetworkInfo, RpcError, RpcServer,
    RpcServerConfig, RpcState, ServerInfo,
};

#[derive(Default)]
struct MockBackend {
    delay: AtomicU64,
    drop_rate: AtomicU32,
    commands: Mutex<Vec<String>>,
    filters: Mutex<FilterState>,
}

impl DebugBackend for MockBackend {
    fn audit_servers(&self) -> Vec<ServerInfo> {
        Vec::new()
    }

    fn federated_servers(&self) -> Vec<ServerInfo> {
        vec![ServerInfo {
            chain_id: "ab".repeat(32),
            name: "FNode0".into(),
            online: true,
        }]
    }

    fn authorities(&self) -> Vec<AuthorityInfo> {
        vec![AuthorityInfo {
            chain_id: "ab".repeat(32),
            role: "federated".into(),
        }]
    }

    fn configuration(&self) -> Value {
        json!({ "node_name": "FNode0" })
    }

    fn reload_configuration(&self) -> Result<Value, String> {
        Err("no configuration file".into())
    }

    fn current_minute(&self) -> u8 {
        4
    }

    fn delay(&self) -> u64 {
        self.delay.load(Ordering::SeqCst)
    }

    fn set_delay(&self, delay_ms: u64) -> u64 {
        self.delay.store(delay_ms, Ordering::SeqCst);
        delay_ms
    }

    fn drop_rate(&self) -> u32 {
        self.drop_rate.load(Ordering::SeqCst)
    }

    fn set_drop_rate(&self, per_mille: u32) -> u32 {
        let applied = per_mille.min(1000);
        self.drop_rate.store(applied, Ordering::SeqCst);
        applied
    }

    fn holding_queue(&self) -> Vec<Value> {
        Vec::new()
    }

    fn messages(&self) -> Vec<Value> {
        vec![json!({ "kind": "network" })]
    }

    fn network_info(&self) -> NetworkInfo {
        NetworkInfo {
            network_number: 2,
            network_name: "local".into(),
            network_id: 0xFA92_E5A4,
        }
    }

    fn summary(&self) -> String {
        "FNode0 L vm0 h1 m4".into()
    }

    fn predictive_fer(&self) -> u64 {
        1234
    }

    fn process_list(&self) -> String {
        "process list h1 m4\n".into()
    }

    fn sim_ctrl(&self, commands: Vec<String>) -> Result<usize, String> {
        let n = commands.len();
        self.commands.lock().unwrap().extend(commands);
        Ok(n)
    }

    fn message_filter(&self, output: &str, input: &str) -> Result<FilterState, String> {
        if output.contains('(') && !output.contains(')') {
            return Err("unclosed group".into());
        }
        let mut guard = self.filters.lock().unwrap();
        let filters = &mut *guard;
        for (slot, pattern) in [(&mut filters.output, output), (&mut filters.input, input)] {
            match pattern {
                "" => {}
                "off" => *slot = None,
                p => *slot = Some(p.to_string()),
            }
        }
        Ok(filters.clone())
    }
}

fn router(backend: Arc<MockBackend>, credentials: Option<(&str, &str)>) -> Router {
    create_router(RpcState {
        backend,
        credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
        registry: None,
    })
}

async fn post(app: Router, body: &str, auth: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/debug")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let response = app
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn call(app: Router, method: &str, params: Value) -> Value {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let (status, value) = post(app, &body.to_string(), None).await;
    assert_eq!(status, StatusCode::OK);
    value
}

#[tokio::test]
async fn status_queries() {
    let backend = Arc::new(MockBackend::default());
    let v = call(router(backend.clone(), None), "current-minute", Value::Null).await;
    assert_eq!(v["result"]["minute"], 4);
    assert_eq!(v["id"], 1);

    let v = call(router(backend.clone(), None), "summary", Value::Null).await;
    assert_eq!(v["result"]["summary"], "FNode0 L vm0 h1 m4");

    let v = call(router(backend.clone(), None), "federated-servers", Value::Null).await;
    assert_eq!(v["result"]["federated_servers"][0]["name"], "FNode0");

    let v = call(router(backend, None), "network-info", Value::Null).await;
    assert_eq!(v["result"]["network_name"], "local");
}

#[tokio::test]
async fn fault_injection_knobs() {
    let backend = Arc::new(MockBackend::default());
    let v = call(router(backend.clone(), None), "set-drop-rate", json!({ "droprate": 250 })).await;
    assert_eq!(v["result"]["drop_rate"], 250);
    let v = call(router(backend.clone(), None), "drop-rate", Value::Null).await;
    assert_eq!(v["result"]["drop_rate"], 250);

    let v = call(router(backend.clone(), None), "set-delay", json!({ "delay": 40 })).await;
    assert_eq!(v["result"]["delay"], 40);
    assert_eq!(backend.delay(), 40);
}

#[tokio::test]
async fn malformed_params_are_invalid_params() {
    let backend = Arc::new(MockBackend::default());
    let v = call(router(backend, None), "set-delay", json!({ "delay": "soon" })).await;
    assert_eq!(v["error"]["code"], -32602);
    assert!(v.get("result").is_none());
}

#[tokio::test]
async fn unknown_method() {
    let v = call(router(Arc::default(), None), "launch", Value::Null).await;
    assert_eq!(v["error"]["code"], -32601);
}

#[tokio::test]
async fn parse_and_request_errors() {
    let (status, v) = post(router(Arc::default(), None), "{not json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["error"]["code"], -32700);

    let (_, v) = post(router(Arc::default(), None), r#"{"id": 7}"#, None).await;
    assert_eq!(v["error"]["code"], -32600);
    assert_eq!(v["id"], 7);
}

#[tokio::test]
async fn sim_ctrl_queues_commands() {
    let backend = Arc::new(MockBackend::default());
    let v = call(
        router(backend.clone(), None),
        "sim-ctrl",
        json!({ "commands": ["leader on", "summary"] }),
    )
    .await;
    assert_eq!(v["result"]["queued"], 2);
    assert_eq!(*backend.commands.lock().unwrap(), vec!["leader on", "summary"]);
}

#[tokio::test]
async fn message_filter_updates_and_rejects() {
    let backend = Arc::new(MockBackend::default());
    let v = call(
        router(backend.clone(), None),
        "message-filter",
        json!({ "output-regex": "EOM", "input-regex": "" }),
    )
    .await;
    assert_eq!(v["result"]["filters"]["output"], "EOM");
    assert_eq!(v["result"]["filters"]["input"], Value::Null);

    let v = call(
        router(backend.clone(), None),
        "message-filter",
        json!({ "output-regex": "(" }),
    )
    .await;
    assert_eq!(v["error"]["code"], -32602);
    assert_eq!(backend.filters.lock().unwrap().output.as_deref(), Some("EOM"));

    let v = call(router(backend, None), "message-filter", json!({ "output-regex": "off" })).await;
    assert_eq!(v["result"]["filters"]["output"], Value::Null);
}

#[tokio::test]
async fn reload_failure_is_internal_error() {
    let v = call(router(Arc::default(), None), "reload-configuration", Value::Null).await;
    assert_eq!(v["error"]["code"], -32603);
    assert_eq!(v["error"]["data"], "no configuration file");
}

#[tokio::test]
async fn basic_auth() {
    let body = r#"{"jsonrpc":"2.0","id":1,"method":"summary"}"#;
    let creds = Some(("admin", "secret"));

    let (status, v) = post(router(Arc::default(), creds), body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(v["error"]["code"], -32001);

    let wrong = format!("Basic {}", STANDARD.encode("admin:guess"));
    let (status, _) = post(router(Arc::default(), creds), body, Some(&wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = format!("Basic {}", STANDARD.encode("admin:secret"));
    let (status, v) = post(router(Arc::default(), creds), body, Some(&right)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["result"]["summary"], "FNode0 L vm0 h1 m4");
}

#[tokio::test]
async fn metrics_endpoint() {
    let registry = prometheus::Registry::new();
    let counter = prometheus::IntCounter::new("meridian_test_total", "test counter").unwrap();
    registry.register(Box::new(counter.clone())).unwrap();
    counter.inc();

    let app = create_router(RpcState {
        backend: Arc::new(MockBackend::default()),
        credentials: None,
        registry: Some(registry),
    });
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("meridian_test_total 1"));

    let response = router(Arc::default(), None)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn rpc_state() -> RpcState {
    RpcState {
        backend: Arc::new(MockBackend::default()),
        credentials: None,
        registry: None,
    }
}

#[tokio::test]
async fn port_clash_is_a_bind_error() {
    let (addr, first) = RpcServer::new(RpcServerConfig::local(0), rpc_state())
        .start(std::future::pending())
        .await
        .unwrap();
    let clash = RpcServer::new(RpcServerConfig::local(addr.port()), rpc_state())
        .start(std::future::pending())
        .await;
    assert!(matches!(clash, Err(RpcError::Bind(_))));
    first.abort();
}
