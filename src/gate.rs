//! Auth boundary wrapped around every handler.
//!
//! The inbound `Authorization` header carries the caller's raw refresh token. [`AuthGate`]
//! resolves it into a [`Session`], enforces [`Access`], converts validation and credential
//! failures into [`ApiResponse`]s, and echoes a rotated refresh token back under the
//! `authorization` attribute.

// crates.io
use oauth2::http::{
	Request,
	header::{AUTHORIZATION, USER_AGENT},
};
// self
use crate::{
	_prelude::*,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	response::{AUTHORIZATION_FIELD, ApiResponse, HttpError},
	schema::{self, DecodedRecord, Schema},
	session::{Session, SessionFactory},
};

const INVALID_LOGIN: &str = "Invalid login token";
const LOGIN_REQUIRED: &str = "You need to be logged in to use this endpoint";

/// Login requirement declared by a handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
	/// Anonymous callers are allowed.
	#[default]
	Public,
	/// Anonymous callers receive 403.
	LoggedIn,
}

/// Everything a handler receives.
pub struct RequestContext<B, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Inbound request.
	pub request: Request<B>,
	/// Factory, for handlers that complete the code exchange themselves.
	pub factory: SessionFactory<C, M>,
	/// Caller session; `None` for anonymous requests.
	pub session: Option<Arc<Session<C, M>>>,
}
impl<B, C, M> RequestContext<B, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Decodes the request parameters against `schema`.
	pub fn params(&self, schema: &Schema, allow_cast: bool) -> Result<DecodedRecord>
	where
		B: AsRef<[u8]>,
	{
		schema::decode_params(&self.request, schema, allow_cast)
	}

	/// Session of a logged-in caller.
	pub fn session(&self) -> Result<&Session<C, M>> {
		self.session.as_deref().ok_or_else(|| Error::invalid_token("request is anonymous"))
	}
}
impl<B, C, M> Debug for RequestContext<B, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestContext")
			.field("method", self.request.method())
			.field("uri", self.request.uri())
			.field("session", &self.session)
			.finish()
	}
}

/// Auth boundary bound to one [`SessionFactory`].
pub struct AuthGate<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	factory: SessionFactory<C, M>,
}
impl<C, M> AuthGate<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Wraps `factory`.
	pub fn new(factory: SessionFactory<C, M>) -> Self {
		Self { factory }
	}

	/// Factory shared with every request.
	pub fn factory(&self) -> &SessionFactory<C, M> {
		&self.factory
	}

	/// Runs `handler` behind the auth boundary.
	///
	/// Schema failures, [`HttpError`]s, and credential rejections come back as `Ok` responses;
	/// every other error propagates to the caller's own fault handling.
	pub async fn handle<B, F, Fut>(
		&self,
		request: Request<B>,
		access: Access,
		handler: F,
	) -> Result<ApiResponse>
	where
		F: FnOnce(RequestContext<B, C, M>) -> Fut,
		Fut: Future<Output = Result<ApiResponse>>,
	{
		let presented = match self.presented_token(&request) {
			Ok(presented) => presented,
			Err(_) => return Ok(HttpError::forbidden(INVALID_LOGIN).into()),
		};
		let session = match &presented {
			Some(token) => match self.factory.from_refresh_token(token).await {
				Ok(session) => Some(Arc::new(session)),
				Err(err) if err.is_invalid_token() =>
					return Ok(HttpError::forbidden(INVALID_LOGIN).into()),
				Err(err) => return Err(err),
			},
			None => None,
		};

		if access == Access::LoggedIn && session.is_none() {
			return Ok(HttpError::forbidden(LOGIN_REQUIRED).into());
		}

		let context =
			RequestContext { request, factory: self.factory.clone(), session: session.clone() };
		let mut response = match handler(context).await {
			Ok(response) => response,
			Err(err) => intercept(err)?,
		};

		// The old token is already spent once rotated, so every response carries the new one.
		if let (Some(session), Some(presented)) = (&session, &presented)
			&& let Some(current) = session.refresh_token()
			&& current.expose() != presented
		{
			response.insert(AUTHORIZATION_FIELD, current.expose());
		}

		Ok(response)
	}

	/// Refresh token presented by the caller, or `None` for anonymous access.
	fn presented_token<B>(&self, request: &Request<B>) -> Result<Option<String>> {
		let user_agent = request.headers().get(USER_AGENT).and_then(|value| value.to_str().ok());

		if self.factory.config.is_allowed_bot(user_agent) {
			return Ok(None);
		}

		let Some(value) = request.headers().get(AUTHORIZATION) else {
			return Ok(None);
		};
		let token = value
			.to_str()
			.map_err(|_| Error::invalid_token("authorization header is not visible ASCII"))?
			.trim();

		Ok((!token.is_empty()).then(|| token.to_owned()))
	}
}
impl<C, M> Clone for AuthGate<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { factory: self.factory.clone() }
	}
}
impl<C, M> Debug for AuthGate<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthGate").field("factory", &self.factory).finish()
	}
}

fn intercept(err: Error) -> Result<ApiResponse> {
	match err {
		Error::Http(err) => Ok(err.into()),
		Error::TypeCheck(err) => Ok(HttpError::from(err).into()),
		Error::InvalidToken { .. } => Ok(HttpError::forbidden(INVALID_LOGIN).into()),
		other => Err(other),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{ScopeSet, TokenSecret},
		error::{ConfigError, TypeCheckError},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		schema::TypeSpec,
		session::ReqwestSessionFactory,
	};

	type TestGate = AuthGate<ReqwestHttpClient, ReqwestTransportErrorMapper>;
	type TestContext = RequestContext<Vec<u8>, ReqwestHttpClient, ReqwestTransportErrorMapper>;

	fn gate() -> TestGate {
		let factory = build_test_factory_with(
			"https://provider.example.com",
			test_config().with_bot_agents(true),
		);

		factory.tokens.put(
			"refresh-cached",
			TokenSecret::new("access-cached"),
			Duration::minutes(5),
			ScopeSet::default(),
		);

		AuthGate::new(factory)
	}

	fn request(authorization: Option<&str>, user_agent: Option<&str>) -> Request<Vec<u8>> {
		let mut builder = Request::builder().uri("https://svc.example.com/me?id=5");

		if let Some(value) = authorization {
			builder = builder.header(AUTHORIZATION, value);
		}
		if let Some(value) = user_agent {
			builder = builder.header(USER_AGENT, value);
		}

		builder.body(Vec::new()).expect("Request fixture should build.")
	}

	async fn echo_login(context: TestContext) -> Result<ApiResponse> {
		Ok(ApiResponse::ok().with("logged_in", context.session.is_some()))
	}

	#[tokio::test]
	async fn anonymous_requests_reach_public_handlers_only() {
		let gate = gate();
		let public = gate
			.handle(request(None, None), Access::Public, echo_login)
			.await
			.expect("Public handler should run.");

		assert_eq!(public.status, 200);
		assert_eq!(public.get("logged_in"), Some(&json!(false)));

		let blocked = gate
			.handle(request(Some("  "), None), Access::LoggedIn, echo_login)
			.await
			.expect("Login failures render as responses.");

		assert_eq!(blocked.status, 403);
		assert_eq!(blocked.get("message"), Some(&json!(LOGIN_REQUIRED)));
	}

	#[tokio::test]
	async fn cached_tokens_log_in_without_an_echo() {
		let response = gate()
			.handle(request(Some("refresh-cached"), None), Access::LoggedIn, echo_login)
			.await
			.expect("Cached token should log in.");

		assert_eq!(response.get("logged_in"), Some(&json!(true)));
		assert_eq!(response.get(AUTHORIZATION_FIELD), None);
	}

	#[tokio::test]
	async fn allow_listed_agents_are_anonymous() {
		let response = gate()
			.handle(
				request(Some("refresh-cached"), Some("Top.gg Webhooks/1.0")),
				Access::Public,
				echo_login,
			)
			.await
			.expect("Bot callers should reach public handlers.");

		assert_eq!(response.get("logged_in"), Some(&json!(false)));
	}

	#[tokio::test]
	async fn handler_failures_are_intercepted() {
		let gate = gate();
		let schema = Schema::new("Me").field("id", TypeSpec::boolean());
		let response = gate
			.handle(request(None, None), Access::Public, |context| async move {
				context.params(&schema, true).map(|_| ApiResponse::ok())
			})
			.await
			.expect("Cast failures render as responses.");

		assert_eq!(response.status, 400);
		assert_eq!(response.get("message"), Some(&json!("5 was not of type `boolean`")));

		let response = gate
			.handle(request(None, None), Access::Public, |_| async {
				Err(TypeCheckError::TypeMismatch {
					expected: "string".into(),
					actual: "integer",
					value: "5".into(),
				}
				.into())
			})
			.await
			.expect("Type mismatches render as responses.");

		assert_eq!(response.status, 400);

		let response = gate
			.handle(request(None, None), Access::Public, |context| async move {
				context.session().map(|_| ApiResponse::ok())
			})
			.await
			.expect("Credential failures render as responses.");

		assert_eq!(response.status, 403);
		assert_eq!(response.get("message"), Some(&json!(INVALID_LOGIN)));

		let err = gate
			.handle(request(None, None), Access::Public, |_| async {
				Err(ConfigError::MissingServiceToken.into())
			})
			.await
			.expect_err("Faults propagate.");

		assert!(matches!(err, Error::Config(_)));
	}

	#[test]
	fn factory_is_shared() {
		let gate = gate();
		let _: &ReqwestSessionFactory = gate.factory();

		assert_eq!(gate.factory().tokens.len(), 1);
	}
}
