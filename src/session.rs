//! Session construction and the refresh-and-retry interceptor.
//!
//! [`SessionFactory`] turns one of three caller credentials (an authorization code, a refresh
//! token, or a bare access token) into a [`Session`]. Refresh tokens are resolved through the
//! factory's [`TokenCache`] first; on a miss, concurrent callers presenting the same refresh
//! token share a single token-endpoint round trip.
//!
//! Every provider call a [`Session`] makes on the user's behalf is wrapped so that a 401 triggers
//! at most one refresh, after which the call is replayed exactly once.

mod authorize;
mod metrics;

pub use authorize::AuthorizationRequest;
pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	api::{ApiError, GuildSummary, ProviderApi, UserIdentity},
	auth::{self, Credential, GUILDS_SCOPE, ScopeSet, TokenSecret},
	config::GateConfig,
	error::ConfigError,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{
		BasicFacade, OAuth2Facade, ReqwestTransportErrorMapper, TokenGrant, TransportErrorMapper,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderDescriptor,
	store::{IdentityCache, TokenCache},
};

type FlowGuard = Arc<AsyncMutex<Option<TokenGrant>>>;

/// Factory specialized for the crate's default reqwest transport stack.
pub type ReqwestSessionFactory = SessionFactory<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Builds [`Session`]s against one provider and owns the state they share.
///
/// Cloning is cheap; clones share the token cache, identity cache, metrics, and single-flight
/// guards.
pub struct SessionFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Provider endpoints.
	pub descriptor: ProviderDescriptor,
	/// Client credentials and gate switches.
	pub config: GateConfig,
	/// Transport used for token endpoint calls.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Provider REST API client.
	pub api: ProviderApi,
	/// Refresh token → access token cache.
	pub tokens: Arc<TokenCache>,
	/// Access token → identity cache.
	pub identities: Arc<IdentityCache>,
	/// Shared counters for token activity.
	pub refresh_metrics: Arc<RefreshMetrics>,
	flow_guards: Arc<Mutex<HashMap<String, FlowGuard>>>,
}
impl<C, M> SessionFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a factory that reuses the caller-provided transport + mapper pair.
	///
	/// The API client starts with a default reqwest instance; replace it with
	/// [`with_api`](Self::with_api) when the transport needs custom settings.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		config: GateConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let api = ProviderApi::with_client(descriptor.endpoints.api.clone(), ReqwestClient::default());
		let identities = IdentityCache::new(config.identity_ttl(), config.identity_capacity);

		Self {
			descriptor,
			config,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			api,
			tokens: Default::default(),
			identities: Arc::new(identities),
			refresh_metrics: Default::default(),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the provider API client.
	pub fn with_api(mut self, api: ProviderApi) -> Self {
		self.api = api;

		self
	}

	/// Replaces the token cache, e.g. to share one across factories.
	pub fn with_token_cache(mut self, tokens: Arc<TokenCache>) -> Self {
		self.tokens = tokens;

		self
	}

	/// Builds the provider authorization URL for `scopes`.
	pub fn authorize_url(&self, scopes: &ScopeSet) -> AuthorizationRequest {
		AuthorizationRequest::build(
			&self.descriptor.endpoints.authorization,
			&self.config.client_id,
			&self.config.redirect_uri,
			scopes,
		)
	}

	/// Exchanges an authorization code for a session.
	///
	/// Fails with [`Error::InvalidToken`] when the provider rejects the code or omits the
	/// refresh token.
	pub async fn from_code(&self, code: &str) -> Result<Session<C, M>> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		let span = FlowSpan::new(KIND, "from_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = self
					.facade()
					.exchange_code(code, &self.config.redirect_uri)
					.await
					.map_err(Error::into_token_rejection)?;
				let refresh_token = grant.refresh_token.clone().ok_or_else(|| {
					Error::invalid_token("token response did not include a refresh token")
				})?;

				self.tokens.put(
					refresh_token.expose(),
					grant.access_token.clone(),
					grant.expires_in,
					grant.scope.clone(),
				);

				Ok(self.session_from_grant(grant, refresh_token))
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	/// Resolves a refresh token into a session.
	///
	/// A cached access token is reused without any network call. Otherwise exactly one refresh
	/// is performed, shared with any concurrent caller presenting the same token.
	pub async fn from_refresh_token(&self, refresh_token: &str) -> Result<Session<C, M>> {
		if let Some(session) = self.cached_session(refresh_token) {
			return Ok(session);
		}

		let guard = self.flow_guard(refresh_token);
		let mut slot = guard.lock().await;

		if let Some(grant) = slot.as_ref() {
			self.refresh_metrics.record_cache_hit();
			obs::record_token_reuse();

			return Ok(self.session_from_grant(grant.clone(), TokenSecret::new(refresh_token)));
		}
		if let Some(session) = self.cached_session(refresh_token) {
			return Ok(session);
		}

		let result =
			self.refresh_grant(refresh_token, "from_refresh_token").await.and_then(|grant| {
				if grant.refresh_token.is_none() {
					self.tokens.remove(refresh_token);

					return Err(Error::invalid_token("token endpoint omitted the refresh token"));
				}

				Ok(grant)
			});

		if let Ok(grant) = &result {
			*slot = Some(grant.clone());
		}

		drop(slot);
		self.release_flow_guard(refresh_token, &guard);

		result.map(|grant| self.session_from_grant(grant, TokenSecret::new(refresh_token)))
	}

	/// Wraps a bare access token; the session cannot refresh.
	pub fn from_access_token(&self, access_token: &str) -> Session<C, M> {
		self.session(Credential::new(access_token, self.config.redirect_uri.clone()))
	}

	/// Adds `user_id` to `guild_id` using the service credential.
	///
	/// The member's `access_token` is merged into `extra` to form the payload. Provider-side
	/// refusals come back as `Ok(Some(detail))`; `Ok(None)` means the member was added.
	pub async fn join_guild(
		&self,
		guild_id: &str,
		user_id: &str,
		access_token: &TokenSecret,
		extra: JsonMap<String, Value>,
	) -> Result<Option<String>> {
		let service_authorization = self.config.service_authorization()?;
		let mut payload = extra;

		payload.insert("access_token".into(), Value::String(access_token.expose().to_owned()));

		match self.api.add_guild_member(&service_authorization, guild_id, user_id, &payload).await
		{
			Ok(()) => Ok(None),
			Err(err) => match err.detail() {
				Some(detail) => Ok(Some(detail.to_owned())),
				None => Err(err.into()),
			},
		}
	}

	/// Runs a refresh grant and caches the result.
	///
	/// The cache key is the rotated refresh token when the provider issued one.
	async fn refresh_grant(&self, refresh_token: &str, stage: &'static str) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.refresh_metrics.record_attempt();

				let grant = self.facade().refresh_token(refresh_token).await.map_err(|err| {
					self.refresh_metrics.record_failure();

					let err = err.into_token_rejection();

					if err.is_invalid_token() {
						obs::warn_rejected(KIND, &auth::fingerprint(refresh_token), &err);
					}

					err
				})?;
				let key = grant.refresh_token.as_ref().map_or(refresh_token, TokenSecret::expose);

				self.tokens.put(key, grant.access_token.clone(), grant.expires_in, grant.scope.clone());
				self.refresh_metrics.record_success();

				Ok(grant)
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}

	fn facade(&self) -> BasicFacade<C, M> {
		<BasicFacade<C, M>>::from_descriptor(
			&self.descriptor,
			&self.config.client_id,
			self.config.client_secret.expose(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	fn cached_session(&self, refresh_token: &str) -> Option<Session<C, M>> {
		let entry = self.tokens.get(refresh_token)?;

		self.refresh_metrics.record_cache_hit();
		obs::record_token_reuse();

		Some(self.session(
			Credential::new(entry.access_token, self.config.redirect_uri.clone())
				.with_refresh_token(refresh_token)
				.with_scopes(entry.scope),
		))
	}

	fn session_from_grant(&self, grant: TokenGrant, presented: TokenSecret) -> Session<C, M> {
		let refresh_token = grant.refresh_token.unwrap_or(presented);

		self.session(
			Credential::new(grant.access_token, self.config.redirect_uri.clone())
				.with_refresh_token(refresh_token)
				.with_scopes(grant.scope)
				.with_resource_group(grant.guild_id),
		)
	}

	fn session(&self, credential: Credential) -> Session<C, M> {
		Session { factory: self.clone(), credential: RwLock::new(credential) }
	}

	fn flow_guard(&self, refresh_token: &str) -> FlowGuard {
		let mut guards = self.flow_guards.lock();

		guards
			.entry(refresh_token.to_owned())
			.or_insert_with(|| Arc::new(AsyncMutex::new(None)))
			.clone()
	}

	fn release_flow_guard(&self, refresh_token: &str, guard: &FlowGuard) {
		let mut guards = self.flow_guards.lock();

		// Only the guard this caller led is removed; a newer one may already be registered.
		if guards.get(refresh_token).is_some_and(|current| Arc::ptr_eq(current, guard)) {
			guards.remove(refresh_token);
		}
	}
}
impl SessionFactory<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a factory with its own reqwest transports.
	pub fn new(descriptor: ProviderDescriptor, config: GateConfig) -> Result<Self, ConfigError> {
		let api = ProviderApi::new(descriptor.endpoints.api.clone())?;

		Ok(Self::with_http_client(
			descriptor,
			config,
			ReqwestHttpClient::new()?,
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_api(api))
	}
}
impl<C, M> Clone for SessionFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			descriptor: self.descriptor.clone(),
			config: self.config.clone(),
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			api: self.api.clone(),
			tokens: self.tokens.clone(),
			identities: self.identities.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C, M> Debug for SessionFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionFactory")
			.field("descriptor", &self.descriptor)
			.field("config", &self.config)
			.field("cached_tokens", &self.tokens.len())
			.field("cached_identities", &self.identities.len())
			.finish()
	}
}

/// Authenticated view of one caller.
///
/// The credential changes only when a provider call is rejected and the refresh succeeds.
pub struct Session<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	factory: SessionFactory<C, M>,
	credential: RwLock<Credential>,
}
impl<C, M> Session<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Factory that built the session.
	pub fn factory(&self) -> &SessionFactory<C, M> {
		&self.factory
	}

	/// Snapshot of the current credential.
	pub fn credential(&self) -> Credential {
		self.credential.read().clone()
	}

	/// Current access token.
	pub fn access_token(&self) -> TokenSecret {
		self.credential.read().access_token.clone()
	}

	/// Current refresh token, if any.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.credential.read().refresh_token.clone()
	}

	/// Granted scopes.
	pub fn scopes(&self) -> ScopeSet {
		self.credential.read().scopes.clone()
	}

	/// Guild picked during authorization.
	pub fn resource_group_id(&self) -> Option<String> {
		self.credential.read().resource_group_id.clone()
	}

	/// Identity behind the access token, served from the identity cache when possible.
	pub async fn user_info(&self) -> Result<UserIdentity> {
		if let Some(identity) = self.factory.identities.get(&self.access_token().expose().to_owned())
		{
			return Ok(identity);
		}

		let identity = self
			.authorized("user_info", move |token| async move {
				self.factory.api.current_user(&token).await
			})
			.await?;

		// Keyed by the token that succeeded, which differs from the original after a refresh.
		self.factory.identities.insert(self.access_token().expose().to_owned(), identity.clone());

		Ok(identity)
	}

	/// Guilds the caller belongs to; empty without a network call unless `guilds` was granted.
	pub async fn guilds(&self) -> Result<Vec<GuildSummary>> {
		if !self.scopes().contains(GUILDS_SCOPE) {
			return Ok(Vec::new());
		}

		self.authorized("guilds", move |token| async move {
			self.factory.api.current_user_guilds(&token).await
		})
		.await
	}

	/// Adds the session's user to `guild_id`; see [`SessionFactory::join_guild`].
	pub async fn join_guild(
		&self,
		guild_id: &str,
		extra: JsonMap<String, Value>,
	) -> Result<Option<String>> {
		let identity = self.user_info().await?;

		self.factory.join_guild(guild_id, &identity.id, &self.access_token(), extra).await
	}

	/// Runs `call` with the current access token, refreshing and replaying it once on a 401.
	async fn authorized<T, F, Fut>(&self, stage: &'static str, call: F) -> Result<T>
	where
		F: Fn(TokenSecret) -> Fut,
		Fut: Future<Output = Result<T, ApiError>>,
	{
		const KIND: FlowKind = FlowKind::ApiCall;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				match call(self.access_token()).await {
					Err(err) if err.is_unauthorized() => (),
					other => return other.map_err(Error::from),
				}

				let Some(refresh_token) = self.refresh_token() else {
					obs::warn_rejected(KIND, &self.access_token().fingerprint(), &"no refresh token");

					return Err(Error::invalid_token("access token was rejected and cannot be refreshed"));
				};
				obs::debug_replay(stage, &self.access_token().fingerprint());

				let grant =
					self.factory.refresh_grant(refresh_token.expose(), stage).await.map_err(|err| {
						if err.is_invalid_token() {
							err
						} else {
							Error::invalid_token(format!("refresh failed: {err}"))
						}
					})?;

				self.credential.write().rotate(grant.access_token.clone(), grant.refresh_token);
				self.factory.refresh_metrics.record_retry();
				obs::record_replay(stage);

				match call(grant.access_token).await {
					Err(err) if err.is_unauthorized() =>
						Err(Error::invalid_token("access token was rejected after a refresh")),
					other => other.map_err(Error::from),
				}
			})
			.await;

		obs::record_result(KIND, &result);

		result
	}
}
impl<C, M> Debug for Session<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session").field("credential", &*self.credential.read()).finish()
	}
}
