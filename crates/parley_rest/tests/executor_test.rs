//! Request executor retry and rate-limit behavior.

mod test_utils;

use parley_error::RestErrorKind;
use parley_rest::{RestRequest, StaticToken, TokenStrategy};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use test_utils::{
    CountingToken, MockReply, MockTransport, executor, executor_with, messages_route, rest_config,
};
use tokio::time::Instant;

fn bot() -> Option<Arc<dyn TokenStrategy>> {
    Some(Arc::new(StaticToken::bot("secret-bot-token")))
}

#[tokio::test(start_paused = true)]
async fn test_success_returns_decoded_body() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(
        MockReply::json(200, json!([{"id": "1"}])).with_bucket("abc", 5, 4, 1.0),
    ));
    let executor = executor(transport.clone(), bot());

    let payload = executor.execute(RestRequest::new(messages_route(1))).await?;

    assert_eq!(payload, Some(json!([{"id": "1"}])));
    assert_eq!(transport.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sends_required_headers() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(204)));
    let executor = executor(transport.clone(), bot());

    let request = RestRequest::builder()
        .route(messages_route(1))
        .query_param("limit", 10)
        .reason("cleanup & audit")
        .header("x-custom", "yes")
        .build()?;
    let payload = executor.execute(request).await?;
    assert_eq!(payload, None);

    let sent = &transport.requests()[0];
    assert_eq!(
        sent.request.url,
        "https://chat.test/api/v10/channels/1/messages?limit=10"
    );
    assert_eq!(sent.header("authorization").as_deref(), Some("Bot secret-bot-token"));
    assert!(sent.request.headers["authorization"].is_sensitive());
    assert_eq!(sent.header("x-ratelimit-precision").as_deref(), Some("millisecond"));
    assert!(sent.header("user-agent").is_some_and(|ua| ua.starts_with("ParleyBot")));
    assert_eq!(
        sent.header("x-audit-log-reason").as_deref(),
        Some("cleanup%20%26%20audit")
    );
    assert_eq!(sent.header("x-custom").as_deref(), Some("yes"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_global_rate_limit_holds_every_route() -> anyhow::Result<()> {
    let limited = Arc::new(AtomicBool::new(false));
    let flag = limited.clone();
    let transport = Arc::new(MockTransport::new(move |request| {
        if request.url.contains("/channels/1/") && !flag.swap(true, Ordering::SeqCst) {
            MockReply::json(429, json!({"global": true, "retry_after": 1.0}))
                .with_header("x-ratelimit-global", "true")
        } else {
            MockReply::json(200, json!({}))
        }
    }));
    let executor = Arc::new(executor(transport.clone(), bot()));
    let start = Instant::now();

    let first = tokio::spawn({
        let executor = executor.clone();
        async move { executor.execute(RestRequest::new(messages_route(1))).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(limited.load(Ordering::SeqCst));
    assert!(executor.global().is_throttled());

    // A different bucket is still held by the global gate.
    executor.execute(RestRequest::new(messages_route(2))).await?;
    first.await??;

    let other = &transport.requests_to("/channels/2/")[0];
    assert!(other.at - start >= Duration::from_secs(1));
    let retried = &transport.requests_to("/channels/1/")[1];
    assert!(retried.at - start >= Duration::from_secs(1));

    let snapshot = executor
        .buckets()
        .snapshot(&messages_route(1))
        .expect("bucket tracked");
    assert_eq!(snapshot.reset_after, Duration::ZERO);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_bucket_429_waits_for_reset() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(429, json!({"global": false, "retry_after": 2.0}))
            .with_bucket("abc", 5, 0, 2.0),
        MockReply::json(200, json!({})).with_bucket("abc", 5, 4, 2.0),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].at - start >= Duration::from_secs(2));
    assert!(!executor.global().is_throttled());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_short_route_429_retries_immediately() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(429, json!({"retry_after": 0.001})),
        MockReply::json(200, json!({})),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;

    assert_eq!(transport.calls(), 2);
    assert!(transport.requests()[1].at - start < Duration::from_millis(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_route_429_sleeps_retry_after() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(429, json!({"retry_after": 3.0})),
        MockReply::json(200, json!({})),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;

    assert!(transport.requests()[1].at - start >= Duration::from_secs(3));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wait_beyond_budget_fails_fast() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::json(
        429,
        json!({"retry_after": 30.0}),
    )));
    let config = rest_config().with_max_rate_limit_secs(5.0);
    let executor = executor_with(config, transport.clone(), bot());
    let start = Instant::now();

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("budget exceeded");

    assert!(err.is_rate_limit_too_long());
    assert_eq!(transport.calls(), 1);
    assert!(Instant::now() - start < Duration::from_secs(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_refreshes_once() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(401, json!({"message": "401: Unauthorized", "code": 0})),
        MockReply::json(200, json!({"id": "1"})),
    ]));
    let token = Arc::new(CountingToken::default());
    let executor = executor(transport.clone(), Some(token.clone()));

    let payload = executor.execute(RestRequest::new(messages_route(1))).await?;

    assert_eq!(payload, Some(json!({"id": "1"})));
    assert_eq!(transport.calls(), 2);
    assert_eq!(token.invalidations(), 1);
    let requests = transport.requests();
    assert_eq!(requests[0].header("authorization").as_deref(), Some("Bearer token-0"));
    assert_eq!(requests[1].header("authorization").as_deref(), Some("Bearer token-1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_repeated_rejection_is_fatal() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::json(
        401,
        json!({"message": "401: Unauthorized", "code": 0}),
    )));
    let token = Arc::new(CountingToken::default());
    let executor = executor(transport.clone(), Some(token.clone()));

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("credential rejected");

    assert!(matches!(
        err.kind(),
        RestErrorKind::Unauthorized { status: 401, .. }
    ));
    assert_eq!(transport.calls(), 2);
    assert_eq!(token.invalidations(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_static_token_is_not_retried() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(401)));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("credential rejected");

    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.calls(), 1);
    assert!(!err.to_string().contains("secret-bot-token"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_retry_with_backoff() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::empty(502),
        MockReply::empty(503),
        MockReply::json(200, json!({})),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    let first_delay = requests[1].at - start;
    let second_delay = requests[2].at - requests[1].at;
    assert!(first_delay > Duration::ZERO);
    assert!(second_delay > first_delay);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_exhaust_retries() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(
        MockReply::json(500, json!({"message": "oops"})),
    ));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("server keeps failing");

    match err.kind() {
        RestErrorKind::ServerResponse { status, body, .. } => {
            assert_eq!(*status, 500);
            assert!(body.contains("oops"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.calls(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_not_implemented_is_not_retried() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(501)));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("501 is final");

    assert_eq!(err.status(), Some(501));
    assert_eq!(transport.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_exhaust_retries() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::transport_error()));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("connection keeps failing");

    assert!(matches!(err.kind(), RestErrorKind::Transport { .. }));
    assert_eq!(transport.calls(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_then_success() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::transport_error(),
        MockReply::json(200, json!({"ok": true})),
    ]));
    let executor = executor(transport.clone(), bot());

    let payload = executor.execute(RestRequest::new(messages_route(1))).await?;

    assert_eq!(payload, Some(json!({"ok": true})));
    assert_eq!(transport.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_client_error_is_immediate() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::json(
        404,
        json!({"message": "Unknown Channel", "code": 10003}),
    )));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("404 is final");

    assert!(err.is_not_found());
    match err.kind() {
        RestErrorKind::ClientResponse { code, message, .. } => {
            assert_eq!(*code, 10003);
            assert_eq!(message, "Unknown Channel");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.calls(), 1);
    assert!(!err.to_string().contains("secret-bot-token"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_html_success_is_unexpected_content() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::text(
        200,
        "text/html",
        "<html>maintenance</html>",
    )));
    let executor = executor(transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("html is not a payload");

    assert!(matches!(
        err.kind(),
        RestErrorKind::UnexpectedContent { status: 200, content_type, .. } if content_type == "text/html"
    ));
    assert_eq!(transport.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_call() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(
        MockReply::json(200, json!({})).delayed(Duration::from_secs(10)),
    ));
    let executor = executor(transport.clone(), bot());

    let request = RestRequest::builder()
        .route(messages_route(1))
        .deadline(Duration::from_secs(1))
        .build()?;
    let err = executor.execute(request).await.expect_err("deadline hit");

    assert!(err.is_timeout());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_configured_deadline_applies_to_rate_limit_waits() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::json(
        429,
        json!({"retry_after": 20.0}),
    )));
    let config = rest_config().with_request_deadline_secs(Some(5.0));
    let executor = executor_with(config, transport.clone(), bot());

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("deadline hit while waiting");

    assert!(err.is_timeout());
    assert_eq!(transport.calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_requests_bypass_global_throttle() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(204)));
    let executor = executor(transport.clone(), bot());
    executor.global().throttle(10.0);
    let start = Instant::now();

    let request = RestRequest::builder()
        .route(messages_route(1))
        .no_auth(true)
        .build()?;
    executor.execute(request).await?;

    let sent = &transport.requests()[0];
    assert!(sent.at - start < Duration::from_secs(1));
    assert!(sent.header("authorization").is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_requests_wait_for_global_throttle() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(204)));
    let executor = executor(transport.clone(), bot());
    executor.global().throttle(2.0);
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;

    assert!(transport.requests()[0].at - start >= Duration::from_secs(2));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_global_closure_beyond_budget_fails_fast() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(204)));
    let config = rest_config().with_max_rate_limit_secs(5.0);
    let executor = executor_with(config, transport.clone(), bot());
    executor.global().throttle(100.0);
    let start = Instant::now();

    let err = executor
        .execute(RestRequest::new(messages_route(1)))
        .await
        .expect_err("global closure exceeds budget");

    assert!(err.is_rate_limit_too_long());
    assert_eq!(transport.calls(), 0);
    assert!(Instant::now() - start < Duration::from_secs(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_global_429_leaves_gate_open() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(429, json!({"global": true, "retry_after": 30.0}))
            .with_header("x-ratelimit-global", "true"),
        MockReply::json(200, json!({})),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    let request = RestRequest::builder()
        .route(messages_route(1))
        .no_auth(true)
        .build()?;
    executor.execute(request).await?;

    assert!(!executor.global().is_throttled());
    assert_eq!(executor.global().available_at(), None);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].at - start >= Duration::from_secs(30));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_auth_override_wins_over_strategy() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::always(MockReply::empty(204)));
    let executor = executor(transport.clone(), bot());

    let request = RestRequest::builder()
        .route(messages_route(1))
        .auth("Basic Zm9vOmJhcg==")
        .build()?;
    executor.execute(request).await?;

    assert_eq!(
        transport.requests()[0].header("authorization").as_deref(),
        Some("Basic Zm9vOmJhcg==")
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_bucket_headers_pace_later_requests() -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::sequence(vec![
        MockReply::json(200, json!({})).with_bucket("abc", 1, 0, 2.0),
        MockReply::json(200, json!({})).with_bucket("abc", 1, 0, 2.0),
    ]));
    let executor = executor(transport.clone(), bot());
    let start = Instant::now();

    executor.execute(RestRequest::new(messages_route(1))).await?;
    executor.execute(RestRequest::new(messages_route(1))).await?;

    let requests = transport.requests();
    assert!(requests[0].at - start < Duration::from_millis(1));
    assert!(requests[1].at - start >= Duration::from_secs(2));
    Ok(())
}
