//! Walks a caller through the gate against a mock provider: authorization URL, code exchange,
//! a logged-in request that triggers a refresh, and the rotated token echoed back.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use oauth2_gate::oauth::oauth2::http::{Request, header::AUTHORIZATION};
use serde_json::json;
use url::Url;
// self
use oauth2_gate::{
	api::ProviderApi,
	auth::ScopeSet,
	config::GateConfig,
	gate::{Access, AuthGate},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::ProviderDescriptor,
	reqwest::Client,
	response::ApiResponse,
	session::ReqwestSessionFactory,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let code_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("grant_type=authorization_code");
			then.status(200).json_body(json!({
				"access_token": "demo-access-1",
				"token_type": "Bearer",
				"expires_in": 604800,
				"refresh_token": "demo-refresh-1",
				"scope": "identify guilds"
			}));
		})
		.await;
	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("grant_type=refresh_token");
			then.status(200).json_body(json!({
				"access_token": "demo-access-2",
				"token_type": "Bearer",
				"expires_in": 604800,
				"refresh_token": "demo-refresh-2",
				"scope": "identify guilds"
			}));
		})
		.await;
	let _stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/@me").header("authorization", "Bearer demo-access-1");
			then.status(401).body("401: Unauthorized");
		})
		.await;
	let _me = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/@me").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(json!({ "id": "80351110224678912", "username": "Nelly" }));
		})
		.await;
	let descriptor = ProviderDescriptor::builder("demo-provider")
		.authorization_endpoint(Url::parse(&server.url("/oauth2/authorize"))?)
		.token_endpoint(Url::parse(&server.url("/oauth2/token"))?)
		.api_base(Url::parse(&server.url("/api"))?)
		.build()?;
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()?;
	let config = GateConfig::new(
		"demo-client",
		"super-secret",
		Url::parse("https://app.example.com/callback")?,
	);
	let api = ProviderApi::with_client(descriptor.endpoints.api.clone(), client.clone());
	let factory = ReqwestSessionFactory::with_http_client(
		descriptor,
		config,
		ReqwestHttpClient::with_client(client),
		Arc::new(ReqwestTransportErrorMapper),
	)
	.with_api(api);
	let authorize = factory.authorize_url(&ScopeSet::new(["identify", "guilds"])?);

	println!("Send the user to {} (state {}).", authorize.url, authorize.state);

	authorize.validate_state(&authorize.state)?;

	let session = factory.from_code("demo-code").await?;
	let refresh_token = session.refresh_token().map(|token| token.expose().to_owned()).unwrap_or_default();

	println!("Caller stores refresh token {refresh_token}.");

	let gate = AuthGate::new(factory);
	let request = Request::builder()
		.uri("/me")
		.header(AUTHORIZATION, refresh_token.as_str())
		.body(Vec::<u8>::new())?;
	let response = gate
		.handle(request, Access::LoggedIn, |context| async move {
			let identity = context.session()?.user_info().await?;

			Ok(ApiResponse::ok().with("username", identity.username))
		})
		.await?;
	let rendered = response.into_http()?;

	println!("Handler answered {}: {}.", rendered.status(), String::from_utf8_lossy(rendered.body()));

	code_mock.assert_async().await;
	refresh_mock.assert_async().await;

	Ok(())
}
