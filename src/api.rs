//! Outbound provider API client.
//!
//! Calls made with a user's access token report a 401 as [`ApiError::Unauthorized`] so the
//! session layer can refresh and retry. Administrative calls use the service credential.

// crates.io
use reqwest::{RequestBuilder, StatusCode, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError, http};

/// Page size requested when listing the caller's guilds.
pub const GUILD_PAGE_LIMIT: u32 = 200;

/// Failures raised by provider API calls.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// The provider rejected the presented credential.
	#[error("Provider rejected the credential for {endpoint}.")]
	Unauthorized {
		/// Logical endpoint name.
		endpoint: &'static str,
		/// Response body, kept for diagnostics.
		body: String,
	},
	/// The provider answered with a non-success status.
	#[error("Provider returned HTTP {status} for {endpoint}: {body}")]
	Status {
		/// Logical endpoint name.
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
		/// Response body.
		body: String,
		/// Retry-After hint, if supplied.
		retry_after: Option<Duration>,
	},
	/// The response body did not match the expected shape.
	#[error("Provider response for {endpoint} is malformed.")]
	Decode {
		/// Logical endpoint name.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The request never produced a response.
	#[error("Network error occurred while calling {endpoint}.")]
	Transport {
		/// Logical endpoint name.
		endpoint: &'static str,
		/// Underlying client failure.
		#[source]
		source: ReqwestError,
	},
	/// The API base cannot carry path segments.
	#[error("API base URL cannot be extended: {base}.")]
	InvalidBase {
		/// Offending base URL.
		base: String,
	},
}
impl ApiError {
	/// Returns `true` for credential rejections.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self, Self::Unauthorized { .. })
	}

	/// Provider-facing detail for business-level failures; `None` for faults.
	pub fn detail(&self) -> Option<&str> {
		match self {
			Self::Unauthorized { body, .. } | Self::Status { body, .. } => Some(body),
			_ => None,
		}
	}
}

/// Account behind an access token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// Provider user identifier.
	pub id: String,
	/// Display name.
	pub username: String,
	/// Legacy discriminator.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub discriminator: Option<String>,
	/// Avatar hash.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub avatar: Option<String>,
	/// E-mail address, present with the `email` scope.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
}

/// Guild the caller belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GuildSummary {
	/// Guild identifier.
	pub id: String,
	/// Guild name.
	pub name: String,
	/// Icon hash.
	#[serde(default)]
	pub icon: Option<String>,
	/// Whether the caller owns the guild.
	#[serde(default)]
	pub owner: bool,
	/// Caller's permission bit set, as the provider encodes it.
	#[serde(default)]
	pub permissions: Option<Value>,
}

/// Reqwest-backed client for the provider's REST API.
#[derive(Clone, Debug)]
pub struct ProviderApi {
	base: Url,
	client: ReqwestClient,
}
impl ProviderApi {
	/// Creates a client with a fresh reqwest instance.
	pub fn new(base: Url) -> Result<Self, ConfigError> {
		Ok(Self::with_client(base, ReqwestClient::builder().build()?))
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(base: Url, client: ReqwestClient) -> Self {
		Self { base, client }
	}

	/// API base URL.
	pub fn base(&self) -> &Url {
		&self.base
	}

	/// `GET /users/@me`.
	pub async fn current_user(&self, access_token: &TokenSecret) -> Result<UserIdentity, ApiError> {
		const ENDPOINT: &str = "current_user";

		let url = self.endpoint(&["users", "@me"])?;
		let request = self.client.get(url).bearer_auth(access_token.expose());

		decode(ENDPOINT, &send(ENDPOINT, request).await?)
	}

	/// `GET /users/@me/guilds?limit=200`.
	pub async fn current_user_guilds(
		&self,
		access_token: &TokenSecret,
	) -> Result<Vec<GuildSummary>, ApiError> {
		const ENDPOINT: &str = "current_user_guilds";

		let mut url = self.endpoint(&["users", "@me", "guilds"])?;

		url.query_pairs_mut().append_pair("limit", &GUILD_PAGE_LIMIT.to_string());

		let request = self.client.get(url).bearer_auth(access_token.expose());

		decode(ENDPOINT, &send(ENDPOINT, request).await?)
	}

	/// `PUT /guilds/{guild_id}/members/{user_id}` authorized by `service_authorization`.
	///
	/// `payload` must carry the member's `access_token`.
	pub async fn add_guild_member(
		&self,
		service_authorization: &str,
		guild_id: &str,
		user_id: &str,
		payload: &JsonMap<String, Value>,
	) -> Result<(), ApiError> {
		const ENDPOINT: &str = "add_guild_member";

		let url = self.endpoint(&["guilds", guild_id, "members", user_id])?;
		let request =
			self.client.put(url).header(AUTHORIZATION, service_authorization).json(payload);

		send(ENDPOINT, request).await.map(|_| ())
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
		let mut url = self.base.clone();

		url.path_segments_mut()
			.map_err(|_| ApiError::InvalidBase { base: self.base.to_string() })?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}
}

async fn send(endpoint: &'static str, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
	let response =
		request.send().await.map_err(|source| ApiError::Transport { endpoint, source })?;
	let status = response.status();
	let retry_after = http::parse_retry_after(response.headers());
	let body = response
		.bytes()
		.await
		.map_err(|source| ApiError::Transport { endpoint, source })?
		.to_vec();

	if status == StatusCode::UNAUTHORIZED {
		return Err(ApiError::Unauthorized { endpoint, body: String::from_utf8_lossy(&body).into() });
	}
	if !status.is_success() {
		return Err(ApiError::Status {
			endpoint,
			status: status.as_u16(),
			body: String::from_utf8_lossy(&body).into(),
			retry_after,
		});
	}

	Ok(body)
}

fn decode<T>(endpoint: &'static str, body: &[u8]) -> Result<T, ApiError>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(de).map_err(|source| ApiError::Decode { endpoint, source })
}
