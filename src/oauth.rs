//! Token endpoint facade over the `oauth2` crate.
//!
//! Both grants the gate uses (authorization code and refresh token) resolve to a
//! [`TokenGrant`]. Provider rejections are classified into [`Error::InvalidGrant`] or
//! [`Error::InvalidClient`]; everything else surfaces as a transient or transport failure.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicErrorResponseType, BasicRequestTokenError,
		BasicRevocationErrorResponse, BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::ProviderDescriptor,
};

/// Token response carrying the provider's extra fields.
pub type ProviderTokenResponse = StandardTokenResponse<ProviderTokenFields, BasicTokenType>;

type GateClient<HasAuthUrl = EndpointSet, HasTokenUrl = EndpointSet> = oauth2::Client<
	BasicErrorResponse,
	ProviderTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	HasAuthUrl,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	HasTokenUrl,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Grant being exchanged, used to label classified failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// `grant_type=authorization_code`.
	AuthorizationCode,
	/// `grant_type=refresh_token`.
	RefreshToken,
}
impl GrantType {
	/// Wire name of the grant.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
		}
	}
}

// Ten years; longer lifetimes cannot be represented as an expiry instant.
const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Resource group the user picked on the consent screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRef {
	/// Provider identifier of the group.
	pub id: String,
}

/// Non-standard token response fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokenFields {
	/// Present when the authorization request asked to add a bot to a guild.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub guild: Option<GuildRef>,
}
impl ExtraTokenFields for ProviderTokenFields {}

/// Successful token endpoint answer.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
	/// New access token.
	pub access_token: TokenSecret,
	/// Refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token.
	pub expires_in: Duration,
	/// Granted scopes.
	pub scope: ScopeSet,
	/// Resource group reported with the grant.
	pub guild_id: Option<String>,
}
impl TokenGrant {
	fn from_response(response: ProviderTokenResponse) -> Result<Self> {
		let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
		let expires_in = i64::try_from(expires_in)
			.ok()
			.filter(|secs| *secs <= MAX_EXPIRES_IN_SECS)
			.ok_or(ConfigError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		let scope = match response.scopes() {
			Some(scopes) =>
				ScopeSet::new(scopes.iter().map(|scope| scope.as_ref())).map_err(ConfigError::from)?,
			None => ScopeSet::default(),
		};

		Ok(Self {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token: response
				.refresh_token()
				.map(|token| TokenSecret::new(token.secret().to_owned())),
			expires_in: Duration::seconds(expires_in),
			scope,
			guild_id: response.extra_fields().guild.as_ref().map(|guild| guild.id.clone()),
		})
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &self.access_token)
			.field("refresh_token", &self.refresh_token)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("guild_id", &self.guild_id)
			.finish()
	}
}

/// Maps HTTP transport failures into gate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a gate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => transient(
				format!("HTTP client error during {}: {message}", grant.as_str()),
				meta,
			),
			_ => transient(format!("HTTP client error during {}", grant.as_str()), meta),
		}
	}
}

/// Token endpoint operations used by sessions.
pub(crate) trait OAuth2Facade {
	fn exchange_code<'a>(&'a self, code: &'a str, redirect_uri: &'a Url) -> FacadeFuture<'a, TokenGrant>;

	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenGrant>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: GateClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a confidential client that posts its credentials in the request body.
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: &str,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Self {
		let auth_url = AuthUrl::from_url(descriptor.endpoints.authorization.clone());
		let token_url = TokenUrl::from_url(descriptor.endpoints.token.clone());
		let oauth_client =
			<GateClient<EndpointNotSet, EndpointNotSet>>::new(ClientId::new(client_id.to_owned()))
				.set_client_secret(ClientSecret::new(client_secret.to_owned()))
				.set_auth_uri(auth_url)
				.set_token_uri(token_url)
				.set_auth_type(AuthType::RequestBody);

		Self { oauth_client, http_client, error_mapper }
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_code<'a>(&'a self, code: &'a str, redirect_uri: &'a Url) -> FacadeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let redirect_url = RedirectUrl::from_url(redirect_uri.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.set_redirect_uri(Cow::Owned(redirect_url))
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						GrantType::AuthorizationCode,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			TokenGrant::from_response(response)
		})
	}

	fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> FacadeFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let response = self
				.oauth_client
				.exchange_refresh_token(&refresh_secret)
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					map_request_error(
						GrantType::RefreshToken,
						meta.take(),
						err,
						self.error_mapper.as_ref(),
					)
				})?;

			TokenGrant::from_response(response)
		})
	}
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(grant, response, meta),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta) }.into(),
		RequestTokenError::Other(message) =>
			transient(format!("unexpected {} response: {message}", grant.as_str()), meta),
	}
}

fn map_server_response_error(
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	match response.error() {
		BasicErrorResponseType::InvalidGrant | BasicErrorResponseType::UnauthorizedClient =>
			Error::InvalidGrant { reason },
		BasicErrorResponseType::InvalidClient => Error::InvalidClient { reason },
		// Unknown codes on a 4xx still mean the grant was refused.
		_ if meta_status(meta).is_some_and(|status| (400..500).contains(&status)) =>
			Error::InvalidGrant { reason },
		_ => TransientError::TokenEndpoint {
			message: format!("{} failed: {reason}", grant.as_str()),
			status: meta_status(meta),
			retry_after: meta.and_then(|value| value.retry_after),
		}
		.into(),
	}
}

fn map_reqwest_error(grant: GrantType, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return transient(format!("{} timed out", grant.as_str()), meta);
	}

	TransportError::from(err).into()
}

fn transient(message: String, meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message,
		status: meta_status(meta),
		retry_after: meta.and_then(|value| value.retry_after),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
