//! Routing and forwarding through a live gateway.

use std::sync::Arc;

use axum::http::StatusCode;
use frp_gateway::config::GatewayConfig;
use frp_gateway::observability::{MemorySink, Severity, CANCELLED};
use frp_gateway::routing::{Backend, Route, RouteTable};
use frp_gateway::GatewayServer;

mod common;

#[tokio::test]
async fn admin_prefix_reaches_control_backend_stripped() {
    let (admin_addr, admin_log) = common::start_recording_backend("admin").await;
    let (proxy_addr, proxy_log) = common::start_recording_backend("proxy").await;

    let mut config = GatewayConfig::default();
    config.tunnel.entry_port = admin_addr.port();
    config.tunnel.proxy_port = proxy_addr.port();

    let sink = Arc::new(MemorySink::new());
    let handle = GatewayServer::from_config(&config, sink.clone())
        .unwrap()
        .listen("127.0.0.1:0")
        .await
        .unwrap();
    let base = format!("http://{}", handle.local_addr());
    let client = common::client();

    let res = client
        .get(format!("{base}/~!frp/api/status?verbose=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "admin");

    let res = client.get(format!("{base}/~!frp")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "admin");

    let res = client.get(format!("{base}/dashboard/index.html")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "proxy");

    let admin = admin_log.lock().unwrap().clone();
    assert_eq!(admin.len(), 2);
    assert_eq!(admin[0].path_and_query, "/api/status?verbose=1");
    assert_eq!(admin[0].host.as_deref(), Some(admin_addr.to_string().as_str()));
    assert_eq!(admin[1].path_and_query, "/");

    let proxy = proxy_log.lock().unwrap().clone();
    assert_eq!(proxy.len(), 1);
    assert_eq!(proxy[0].path_and_query, "/dashboard/index.html");
    assert_eq!(proxy[0].host.as_deref(), Some(proxy_addr.to_string().as_str()));

    // One entry per request, logged with the path as received.
    let paths: Vec<_> = sink.entries().into_iter().map(|e| e.path).collect();
    assert_eq!(paths, vec!["/~!frp/api/status", "/~!frp", "/dashboard/index.html"]);

    handle.shutdown(std::time::Duration::from_secs(1)).await;
}

#[tokio::test]
async fn first_registered_route_wins() {
    let (first_addr, _) = common::start_recording_backend("first").await;
    let (second_addr, _) = common::start_recording_backend("second").await;

    let mut routes = RouteTable::new();
    routes.register(Route::new("/a", Backend::http("127.0.0.1", first_addr.port()), "").unwrap());
    routes.register(Route::new("/a/b", Backend::http("127.0.0.1", second_addr.port()), "").unwrap());

    let (handle, _) = common::start_gateway(routes).await;
    let res = common::client()
        .get(format!("http://{}/a/b/c", handle.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.text().await.unwrap(), "first");
}

#[tokio::test]
async fn request_body_and_method_are_forwarded() {
    let (addr, log) = common::start_recording_backend("ok").await;
    let mut routes = RouteTable::new();
    routes.register(Route::new("/", Backend::http("127.0.0.1", addr.port()), "").unwrap());

    let (handle, _) = common::start_gateway(routes).await;
    let res = common::client()
        .post(format!("http://{}/submit", handle.local_addr()))
        .header("x-forwarded-for", "198.51.100.7")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let seen = log.lock().unwrap()[0].clone();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, b"payload");
    assert_eq!(seen.forwarded_for.as_deref(), Some("198.51.100.7, 127.0.0.1"));
}

#[tokio::test]
async fn unmatched_path_is_not_found() {
    let (addr, log) = common::start_recording_backend("api").await;
    let mut routes = RouteTable::new();
    routes.register(Route::new("/api", Backend::http("127.0.0.1", addr.port()), "").unwrap());

    let (handle, sink) = common::start_gateway(routes).await;
    let res = common::client()
        .get(format!("http://{}/elsewhere", handle.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND.as_u16());
    assert_eq!(res.text().await.unwrap(), "404 page not found");
    assert!(log.lock().unwrap().is_empty());

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, Severity::Warn);
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway() {
    let mut routes = RouteTable::new();
    routes.register(Route::new("/", Backend::http("127.0.0.1", common::closed_port()), "").unwrap());

    let (handle, sink) = common::start_gateway(routes).await;
    let res = common::client()
        .get(format!("http://{}/", handle.local_addr()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY.as_u16());

    let entry = &sink.entries()[0];
    assert_eq!(entry.severity, Severity::Error);
    let error = entry.error.as_deref().unwrap();
    assert!(error.starts_with("backend request failed"), "{error}");
    assert_eq!(entry.to_string(), error);
}

#[tokio::test]
async fn backend_errors_pass_through_verbatim() {
    let addr = common::start_status_backend(503, "maintenance").await;
    let mut routes = RouteTable::new();
    routes.register(Route::new("/", Backend::http("127.0.0.1", addr.port()), "").unwrap());

    let (handle, sink) = common::start_gateway(routes).await;
    let res = common::client()
        .get(format!("http://{}/anything", handle.local_addr()))
        .header("user-agent", "probe/2.0")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE.as_u16());
    assert_eq!(res.text().await.unwrap(), "maintenance");

    let entry = &sink.entries()[0];
    assert_eq!(entry.severity, Severity::Error);
    assert_eq!(entry.error, None);
    assert_eq!(entry.user_agent, "probe/2.0");
    assert_eq!(entry.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(entry.to_string().contains("\"GET /anything\" 503 \"probe/2.0\""));
}

#[tokio::test]
async fn hop_by_hop_headers_are_not_forwarded() {
    let (addr, log) = common::start_recording_backend("ok").await;
    let mut routes = RouteTable::new();
    routes.register(Route::new("/", Backend::http("127.0.0.1", addr.port()), "").unwrap());

    let (handle, _) = common::start_gateway(routes).await;
    common::client()
        .get(format!("http://{}/", handle.local_addr()))
        .header("connection", "x-private")
        .header("x-private", "secret")
        .send()
        .await
        .unwrap();

    let seen = log.lock().unwrap()[0].clone();
    assert_ne!(seen.connection.as_deref(), Some("x-private"));
}

#[tokio::test]
async fn client_abort_is_logged_once() {
    let backend = common::start_slow_backend(std::time::Duration::from_secs(2)).await;
    let mut routes = RouteTable::new();
    routes.register(Route::new("/", Backend::http("127.0.0.1", backend.port()), "").unwrap());
    let (handle, sink) = common::start_gateway(routes).await;

    let impatient = reqwest::Client::builder()
        .no_proxy()
        .timeout(std::time::Duration::from_millis(300))
        .build()
        .unwrap();
    let result = impatient
        .get(format!("http://{}/slow", handle.local_addr()))
        .send()
        .await;
    assert!(result.is_err());

    assert!(common::eventually(std::time::Duration::from_secs(3), || !sink.entries().is_empty()).await);
    // Past the backend delay: no second entry from the completed handler.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "/slow");
    assert_eq!(entries[0].severity, Severity::Error);
    assert_eq!(entries[0].error.as_deref(), Some(CANCELLED));

    handle.shutdown(std::time::Duration::from_secs(1)).await;
}
