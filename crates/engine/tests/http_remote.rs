use contractgate_core::Subject;
use contractgate_engine::{
    CanTransitionRequest, DecisionContext, HttpRemoteAuthority, RemoteAuthority, RemoteConfig,
    RemoteError, RequestContext,
};
use contractgate_storage::SubjectRecord;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        base_url: server.uri(),
        api_key: Some("hos-key".to_string()),
        timeout_ms: 1500,
        retries: 1,
        retry_delay_ms: 10,
    }
}

fn request() -> CanTransitionRequest {
    CanTransitionRequest {
        subject_ref: SubjectRecord::new("order", "o-1", "t-1", "pending").subject_ref(),
        to: "paid".to_string(),
        ctx: DecisionContext {
            world: "marketplace".to_string(),
        },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn decide_posts_request_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contract/can-transition"))
        .and(header("X-HOS-API-KEY", "hos-key"))
        .and(header("X-Request-Id", "req-123"))
        .and(header("Accept", "application/json"))
        .and(body_json(json!({
            "subject_ref": {
                "type": "order",
                "class": "order",
                "id": "o-1",
                "tenant_id": "t-1",
                "status": "pending"
            },
            "to": "paid",
            "ctx": {"world": "marketplace"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "allowed": false,
            "reason": "terminal_state",
            "contract_version": "2026.10"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(config(&server));
    let decision = client
        .decide(&request(), &RequestContext::with_request_id("req-123"))
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "terminal_state");
    assert_eq!(decision.contract_version.as_deref(), Some("2026.10"));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_retried_then_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contract/can-transition"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(config(&server));
    let err = client
        .decide(&request(), &RequestContext::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RemoteError::Status {
            status: 500,
            body: "upstream exploded".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"allowed": true})))
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(config(&server));
    let decision = client
        .decide(&request(), &RequestContext::new())
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.reason, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn error_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("x".repeat(2000)))
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(RemoteConfig {
        retries: 0,
        ..config(&server)
    });
    match client.decide(&request(), &RequestContext::new()).await {
        Err(RemoteError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body.len(), 500);
        }
        other => panic!("expected Status error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(RemoteConfig {
        retries: 0,
        ..config(&server)
    });
    let err = client
        .decide(&request(), &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidBody(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn json_array_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(RemoteConfig {
        retries: 0,
        ..config(&server)
    });
    let err = client.get("health", &RequestContext::new()).await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidBody(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn get_returns_object_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .and(header("X-HOS-API-KEY", "hos-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(config(&server));
    let body = client.get("/health", &RequestContext::new()).await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"allowed": true}))
                .set_delay(std::time::Duration::from_millis(1500)),
        )
        .mount(&server)
        .await;

    let client = HttpRemoteAuthority::new(RemoteConfig {
        timeout_ms: 100,
        retries: 0,
        ..config(&server)
    });
    let err = client
        .decide(&request(), &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Transport(_)), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_never_starts_past_the_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    // Budget is 100ms x 6 = 600ms; a 1s delay can never fit.
    let client = HttpRemoteAuthority::new(RemoteConfig {
        timeout_ms: 100,
        retries: 5,
        retry_delay_ms: 1000,
        ..config(&server)
    });
    let err = client
        .decide(&request(), &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 500, .. }), "{err:?}");
}
