//! Routing tests for the bare SSE endpoints

mod common;

use axum::http::{Method, StatusCode};
use tower::ServiceExt;

use common::*;
use switchboard_mcp::{protocol::SESSION_ID_HEADER, RoutingKey};

#[tokio::test(start_paused = true)]
async fn test_sse_session_lifecycle() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/tenant1", &[], None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    let mut stream = response.into_body().into_data_stream();

    let endpoint = next_frame(&mut stream).await;
    assert_eq!(
        endpoint,
        "event: endpoint\ndata: /tenant1/messages?sessionId=session-1\n\n"
    );

    let established = next_frame(&mut stream).await;
    assert!(established.starts_with("event: message"));
    assert_eq!(frame_data(&established)["method"], "connection_established");

    assert!(h.registry.contains("session-1"));
    assert_eq!(h.factory.keys(), vec![RoutingKey::tenant("tenant1")]);

    // Nothing else happens until the first keepalive is due
    let keepalive = next_frame(&mut stream).await;
    assert_eq!(frame_data(&keepalive)["method"], "keepalive");
    assert!(frame_data(&keepalive).get("id").is_none());

    let transport = h.registry.lookup("session-1").unwrap();
    drop(stream);

    assert!(transport.is_closed());
    assert!(!h.registry.contains("session-1"));
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_sse_messages_answered_on_stream() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/tenant1", &[], None))
        .await
        .unwrap();
    let mut stream = response.into_body().into_data_stream();
    next_frame(&mut stream).await;
    next_frame(&mut stream).await;

    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/tenant1/messages?sessionId=session-1",
            &[],
            Some(&whoami_body(11)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_text(response).await, "Accepted");

    let reply = frame_data(&next_frame(&mut stream).await);
    assert_eq!(reply["id"], 11);
    assert_eq!(reply["result"]["instance"], 1);

    // Header works when the query parameter is absent
    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/tenant1/messages",
            &[(SESSION_ID_HEADER, "session-1")],
            Some(&whoami_body(12)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(frame_data(&next_frame(&mut stream).await)["id"], 12);

    assert_eq!(h.factory.created(), 1);
}

#[tokio::test]
async fn test_sse_sessions_are_independent() {
    let h = harness();

    let first = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/tenant1", &[], None))
        .await
        .unwrap();
    let second = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/tenant2", &[], None))
        .await
        .unwrap();

    assert_eq!(h.registry.len(), 2);
    assert_eq!(
        h.factory.keys(),
        vec![RoutingKey::tenant("tenant1"), RoutingKey::tenant("tenant2")]
    );

    let mut second = second.into_body().into_data_stream();
    assert_eq!(
        next_frame(&mut second).await,
        "event: endpoint\ndata: /tenant2/messages?sessionId=session-2\n\n"
    );

    drop(first);
    assert!(!h.registry.contains("session-1"));
    assert!(h.registry.contains("session-2"));
}

#[tokio::test]
async fn test_sse_message_for_unknown_session() {
    let h = harness();

    for uri in ["/tenant1/messages?sessionId=ghost", "/tenant1/messages"] {
        let response = h
            .app
            .clone()
            .oneshot(request(Method::POST, uri, &[], Some(&whoami_body(1))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Invalid or missing session ID");
    }
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_sse_factory_failure() {
    let (app, registry) = failing_app();

    let response = app
        .oneshot(request(Method::GET, "/tenant1", &[], None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response)
        .await
        .starts_with("Failed to establish SSE connection"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_sse_session_not_served_by_streamable_routes() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(request(Method::GET, "/tenant1", &[], None))
        .await
        .unwrap();
    let mut stream = response.into_body().into_data_stream();
    next_frame(&mut stream).await;
    next_frame(&mut stream).await;

    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/tenant2",
            &[(SESSION_ID_HEADER, "session-1")],
            Some(&whoami_body(3)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32000);
    assert_eq!(
        body["error"]["message"],
        "Bad Request: No valid session ID provided"
    );

    for method in [Method::GET, Method::DELETE] {
        let response = h
            .app
            .clone()
            .oneshot(request(
                method,
                "/v1/tenant1",
                &[(SESSION_ID_HEADER, "session-1")],
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Invalid or missing session ID");
    }

    // The SSE session is untouched and still answers on its own route
    assert!(h.registry.contains("session-1"));
    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/tenant1/messages?sessionId=session-1",
            &[],
            Some(&whoami_body(4)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(frame_data(&next_frame(&mut stream).await)["id"], 4);
}

#[tokio::test]
async fn test_streamable_session_not_served_by_sse_route() {
    let h = harness();

    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/tenant1",
            &[],
            Some(&initialize_body()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .clone()
        .oneshot(request(
            Method::POST,
            "/tenant1/messages?sessionId=session-1",
            &[],
            Some(&whoami_body(2)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Invalid or missing session ID");
    assert!(h.registry.contains("session-1"));
}
