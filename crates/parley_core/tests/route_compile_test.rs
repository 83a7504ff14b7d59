//! Tests for route compilation and bucket keys.

use parley_core::{HttpMethod, Route, Snowflake, routes};
use parley_error::RouteErrorKind;

#[test]
fn test_compile_substitutes_every_placeholder() {
    let channel = Snowflake::new(111);
    let message = Snowflake::new(222);
    let compiled = routes::PATCH_CHANNEL_MESSAGE
        .compile(&[("channel", &channel), ("message", &message)])
        .expect("compiles");

    assert_eq!(compiled.method(), HttpMethod::Patch);
    assert_eq!(compiled.path(), "/channels/111/messages/222");
    assert_eq!(compiled.major_params(), "111");
    assert_eq!(
        compiled.route_identity(),
        "PATCH /channels/{channel}/messages/{message}"
    );
}

#[test]
fn test_missing_parameter_is_rejected() {
    let err = routes::GET_GUILD_MEMBER
        .compile(&[("guild", &1u64)])
        .expect_err("user is missing");

    match err.kind() {
        RouteErrorKind::MissingParameter { parameter, .. } => assert_eq!(parameter, "user"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_parameter_is_rejected() {
    let err = routes::GET_MY_USER
        .compile(&[("guild", &1u64)])
        .expect_err("no placeholders");

    assert!(matches!(
        err.kind(),
        RouteErrorKind::UnknownParameter { parameter, .. } if parameter == "guild"
    ));
}

#[test]
fn test_major_params_scope_bucket_keys() {
    let a = routes::GET_GUILD.compile(&[("guild", &1u64)]).unwrap();
    let b = routes::GET_GUILD.compile(&[("guild", &2u64)]).unwrap();

    assert_eq!(a.route_identity(), b.route_identity());
    assert_ne!(a.bucket_key("hash"), b.bucket_key("hash"));
}

#[test]
fn test_display_hides_compiled_path() {
    let compiled = routes::POST_WEBHOOK_WITH_TOKEN
        .compile(&[("webhook", &5u64), ("token", &"very-secret-token")])
        .unwrap();

    let shown = compiled.to_string();
    assert!(shown.starts_with("POST /webhooks/{webhook}/{token} [5:"));
    assert!(!shown.contains("very-secret-token"));
    assert!(compiled.path().contains("very-secret-token"));
}

#[test]
fn test_custom_route_definition() {
    const ROUTE: Route = Route::new(HttpMethod::Put, "/guilds/{guild}/bans/{user}");
    let compiled = ROUTE
        .compile(&[("user", &9u64), ("guild", &8u64)])
        .unwrap();
    assert_eq!(compiled.path(), "/guilds/8/bans/9");
    assert_eq!(compiled.major_params(), "8");
}

#[test]
fn test_values_are_not_rescanned_for_placeholders() {
    let compiled = routes::GET_CHANNEL_MESSAGE
        .compile(&[("channel", &"{message}"), ("message", &5u64)])
        .expect("compiles");

    assert_eq!(compiled.path(), "/channels/{message}/messages/5");
    assert_eq!(compiled.major_params(), "{message}");
}
