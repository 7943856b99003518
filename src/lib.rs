//! OAuth 2.0 client gate for HTTP services: schema-checked request decoding, cached
//! refresh-token sessions, and one-shot refresh-and-retry for provider calls.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod response;
pub mod schema;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		api::ProviderApi,
		config::GateConfig,
		http::ReqwestHttpClient,
		provider::ProviderDescriptor,
		session::ReqwestSessionFactory,
	};

	/// Client identifier used by test factories.
	pub const TEST_CLIENT_ID: &str = "client-gate";
	/// Client secret used by test factories.
	pub const TEST_CLIENT_SECRET: &str = "secret-gate";
	/// Service credential used by test factories.
	pub const TEST_SERVICE_TOKEN: &str = "service-gate";
	/// Redirect URI used by test factories.
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/callback";

	/// Builds a reqwest client that accepts the self-signed certificates produced by `httpmock`
	/// during tests.
	pub fn test_reqwest_client() -> ReqwestClient {
		ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.")
	}

	/// Describes a provider whose token endpoint and API both live on the mock server at
	/// `base` (e.g. `server.url("")`).
	pub fn test_descriptor(base: &str) -> ProviderDescriptor {
		ProviderDescriptor::builder("mock-provider")
			.authorization_endpoint(
				Url::parse(&format!("{base}/oauth2/authorize"))
					.expect("Mock authorization endpoint should parse successfully."),
			)
			.token_endpoint(
				Url::parse(&format!("{base}/oauth2/token"))
					.expect("Mock token endpoint should parse successfully."),
			)
			.api_base(Url::parse(&format!("{base}/api")).expect("Mock API base should parse."))
			.build()
			.expect("Mock provider descriptor should build successfully.")
	}

	/// Gate configuration matching the constants above.
	pub fn test_config() -> GateConfig {
		GateConfig::new(
			TEST_CLIENT_ID,
			TEST_CLIENT_SECRET,
			Url::parse(TEST_REDIRECT_URI).expect("Redirect URI fixture should parse successfully."),
		)
		.with_service_token(TEST_SERVICE_TOKEN)
	}

	/// Constructs a [`ReqwestSessionFactory`] whose token endpoint and API point at `base`.
	pub fn build_test_factory(base: &str) -> ReqwestSessionFactory {
		build_test_factory_with(base, test_config())
	}

	/// Same as [`build_test_factory`] but with a caller-supplied configuration.
	pub fn build_test_factory_with(base: &str, config: GateConfig) -> ReqwestSessionFactory {
		let descriptor = test_descriptor(base);
		let client = test_reqwest_client();
		let api = ProviderApi::with_client(descriptor.endpoints.api.clone(), client.clone());

		ReqwestSessionFactory::with_http_client(
			descriptor,
			config,
			ReqwestHttpClient::with_client(client),
			Arc::new(crate::oauth::ReqwestTransportErrorMapper),
		)
		.with_api(api)
	}

	/// Token endpoint success body carrying both tokens.
	pub fn test_token_body(access: &str, refresh: &str) -> Value {
		serde_json::json!({
			"access_token": access,
			"token_type": "Bearer",
			"expires_in": 604800,
			"refresh_token": refresh,
			"scope": "identify guilds"
		})
	}

	/// `/users/@me` body for user `id`.
	pub fn test_user_body(id: &str) -> Value {
		serde_json::json!({ "id": id, "username": "gate-user", "discriminator": "0001", "avatar": null })
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
