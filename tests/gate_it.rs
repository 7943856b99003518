#![cfg(feature = "test")]

// crates.io
use httpmock::prelude::*;
use oauth2_gate::oauth::oauth2::http::{
	Request, StatusCode,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::json;
use time::Duration;
// self
use oauth2_gate::{
	_preludet::*,
	auth::{ScopeSet, TokenSecret},
	error::Result,
	gate::{Access, AuthGate, RequestContext},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	response::{AUTHORIZATION_FIELD, ApiResponse},
	schema::{Schema, TypeSpec},
};

type Context = RequestContext<Vec<u8>, ReqwestHttpClient, ReqwestTransportErrorMapper>;

fn request(method: &str, uri: &str, authorization: Option<&str>, body: &str) -> Request<Vec<u8>> {
	let mut builder = Request::builder().method(method).uri(uri);

	if let Some(value) = authorization {
		builder = builder.header(AUTHORIZATION, value);
	}

	builder.body(body.as_bytes().to_vec()).expect("Request fixture should build.")
}

async fn join_handler(context: Context) -> Result<ApiResponse> {
	let schema = Schema::new("Join")
		.field("guild", TypeSpec::integer())
		.field("roles", TypeSpec::list(TypeSpec::string()));
	let params = context.params(&schema, false)?;

	Ok(ApiResponse::json(200, params.into_inner()))
}

#[tokio::test]
async fn unknown_refresh_tokens_are_forbidden() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("refresh_token=R1");
			then.status(400).json_body(json!({
				"error": "invalid_grant",
				"error_description": "Invalid \"refresh_token\" in request."
			}));
		})
		.await;
	let gate = AuthGate::new(build_test_factory(&server.url("")));
	let response = gate
		.handle(request("GET", "/me", Some("R1"), ""), Access::Public, |_| async {
			Ok(ApiResponse::ok())
		})
		.await
		.expect("Rejected tokens render as responses.");

	token.assert_calls_async(1).await;

	assert_eq!(response.status, 403);
	assert_eq!(response.get("message"), Some(&json!("Invalid login token")));

	let rendered = response.into_http().expect("Response should render.");

	assert_eq!(rendered.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rotated_refresh_tokens_are_echoed() {
	let server = MockServer::start_async().await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).json_body(test_token_body("access-2", "refresh-2"));
		})
		.await;
	let gate = AuthGate::new(build_test_factory(&server.url("")));
	let response = gate
		.handle(request("GET", "/me", Some("refresh-1"), ""), Access::LoggedIn, |context| async move {
			let session = context.session()?;

			Ok(ApiResponse::ok().with("access", session.access_token().expose()))
		})
		.await
		.expect("Handler should run.");

	assert_eq!(response.get("access"), Some(&json!("access-2")));
	assert_eq!(response.get(AUTHORIZATION_FIELD), Some(&json!("refresh-2")));

	// The rotated token resolves from the cache and needs no echo.
	let text = gate
		.handle(request("GET", "/me", Some("refresh-2"), ""), Access::LoggedIn, |_| async {
			Ok(ApiResponse::text(200, "pong"))
		})
		.await
		.expect("Handler should run.")
		.into_http()
		.expect("Text response should render.");

	assert!(text.headers().get(AUTHORIZATION).is_none());
	assert_eq!(text.body().as_slice(), b"pong");
}

#[tokio::test]
async fn refreshes_inside_handlers_are_echoed_too() {
	let server = MockServer::start_async().await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("refresh_token=refresh-old");
			then.status(200).json_body(test_token_body("access-new", "refresh-new"));
		})
		.await;
	let _stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/@me").header("authorization", "Bearer access-old");
			then.status(401).body("401: Unauthorized");
		})
		.await;
	let _fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/@me").header("authorization", "Bearer access-new");
			then.status(200).json_body(test_user_body("42"));
		})
		.await;
	let factory = build_test_factory(&server.url(""));

	factory.tokens.put(
		"refresh-old",
		TokenSecret::new("access-old"),
		Duration::minutes(5),
		ScopeSet::default(),
	);

	let gate = AuthGate::new(factory);
	let response = gate
		.handle(
			request("GET", "/me", Some("refresh-old"), ""),
			Access::LoggedIn,
			|context| async move {
				let identity = context.session()?.user_info().await?;

				Ok(ApiResponse::text(200, identity.username))
			},
		)
		.await
		.expect("Handler should run.");
	let rendered = response.into_http().expect("Text response should render.");

	assert_eq!(rendered.body().as_slice(), b"gate-user");
	assert_eq!(
		rendered.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
		Some("refresh-new")
	);
}

#[tokio::test]
async fn body_parameters_are_validated_at_the_boundary() {
	let server = MockServer::start_async().await;
	let gate = AuthGate::new(build_test_factory(&server.url("")));
	let body = r#"{"guild": 5, "roles": ["a"]}"#;
	let ok = gate
		.handle(request("POST", "/join", None, body), Access::Public, join_handler)
		.await
		.expect("Valid bodies reach the handler.");

	assert_eq!(ok.get("guild"), Some(&json!(5)));
	assert_eq!(ok.get("roles"), Some(&json!(["a"])));

	let arity = gate
		.handle(request("POST", "/join", None, r#"{"guild": 5}"#), Access::Public, join_handler)
		.await
		.expect("Arity failures render as responses.");

	assert_eq!(arity.status, 400);
	assert_eq!(arity.get("model"), Some(&json!("Join")));
	assert_eq!(arity.get("expected"), Some(&json!({ "guild": "integer", "roles": "List[string]" })));

	let malformed = gate
		.handle(request("POST", "/join", None, "{"), Access::Public, join_handler)
		.await
		.expect("Malformed JSON renders as a response.")
		.into_http()
		.expect("Error response should render.");

	assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
	assert_eq!(
		malformed.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
		Some("application/json")
	);
}

#[tokio::test]
async fn allow_listed_agents_skip_token_resolution() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(400).json_body(json!({ "error": "invalid_grant" }));
		})
		.await;
	let factory = build_test_factory_with(&server.url(""), test_config().with_bot_agents(true));
	let gate = AuthGate::new(factory);
	let request = Request::builder()
		.uri("/stats")
		.header(AUTHORIZATION, "webhook-secret")
		.header("user-agent", "Top.gg Webhooks")
		.body(Vec::<u8>::new())
		.expect("Request fixture should build.");
	let response = gate
		.handle(request, Access::Public, |context| async move {
			Ok(ApiResponse::ok().with("anonymous", context.session.is_none()))
		})
		.await
		.expect("Bot callers should reach public handlers.");

	assert_eq!(response.get("anonymous"), Some(&json!(true)));

	token.assert_calls_async(0).await;
}
