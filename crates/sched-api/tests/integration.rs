use axum::Router;
use sched_api::app;

#[tokio::test]
async fn healthz_and_metrics_respond() {
    let app: Router = app();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let base = format!("http://{}:{}", addr.ip(), addr.port());
    let client = reqwest::Client::new();

    let r = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(r.status().is_success());

    let r = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert!(r.status().is_success());

    srv.abort();
}
