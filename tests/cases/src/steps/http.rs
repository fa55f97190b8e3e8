use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crate::steps::cluster::CaseServer;

/// Sends one request to the HTTP API of `server`.
pub fn call(server: &CaseServer, method: Method, uri: &str) -> (StatusCode, Value) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("can build a runtime");

    runtime.block_on(async {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("valid request");
        let response = coordinator_modules::router(server.clone())
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("can read the body");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        info!("--{} {} -> {} {}", server.name(), uri, status, json);

        (status, json)
    })
}

pub fn list_member_names(server: &CaseServer) -> Vec<String> {
    let (status, json) = call(server, Method::GET, "/api/v1/members");
    assert_eq!(status, StatusCode::OK);

    json["members"]
        .as_array()
        .expect("member list")
        .iter()
        .map(|member| member["name"].as_str().expect("member name").to_string())
        .collect()
}

pub fn delete_member(server: &CaseServer, name: &str) -> StatusCode {
    let (status, _) = call(server, Method::DELETE, &format!("/api/v1/members/{}", name));
    status
}
