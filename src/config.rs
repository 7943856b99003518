//! Gate configuration loaded from code, JSON, or the environment.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ConfigError,
	store::{DEFAULT_IDENTITY_CAPACITY, DEFAULT_IDENTITY_TTL_SECS},
};

/// Prefix shared by every environment variable [`GateConfig::from_env`] reads.
pub const ENV_PREFIX: &str = "OAUTH2_GATE_";

/// OAuth client settings and gate behavior switches.
#[derive(Clone, Serialize, Deserialize)]
pub struct GateConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Privileged service credential used for administrative calls.
	#[serde(default)]
	pub service_token: Option<TokenSecret>,
	/// Authorization scheme prefixed to the service credential.
	#[serde(default = "default_service_token_scheme")]
	pub service_token_scheme: String,
	/// Treat requests whose user agent carries [`bot_agent_marker`](Self::bot_agent_marker) as
	/// anonymous.
	#[serde(default)]
	pub allow_bot_agents: bool,
	/// User-agent marker identifying allow-listed non-browser callers.
	#[serde(default = "default_bot_agent_marker")]
	pub bot_agent_marker: String,
	/// Identity cache entry lifetime in seconds.
	#[serde(default = "default_identity_ttl_secs")]
	pub identity_ttl_secs: i64,
	/// Identity cache size bound.
	#[serde(default = "default_identity_capacity")]
	pub identity_capacity: usize,
}
impl GateConfig {
	/// Configuration with the given client credentials and defaults elsewhere.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, redirect_uri: Url) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			redirect_uri,
			service_token: None,
			service_token_scheme: default_service_token_scheme(),
			allow_bot_agents: false,
			bot_agent_marker: default_bot_agent_marker(),
			identity_ttl_secs: DEFAULT_IDENTITY_TTL_SECS,
			identity_capacity: DEFAULT_IDENTITY_CAPACITY,
		}
	}

	/// Sets the service credential.
	pub fn with_service_token(mut self, token: impl Into<String>) -> Self {
		self.service_token = Some(TokenSecret::new(token));

		self
	}

	/// Enables or disables the bot user-agent allow-list.
	pub fn with_bot_agents(mut self, allow: bool) -> Self {
		self.allow_bot_agents = allow;

		self
	}

	/// Overrides the identity cache lifetime and size.
	pub fn with_identity_cache(mut self, ttl: Duration, capacity: usize) -> Self {
		self.identity_ttl_secs = ttl.whole_seconds();
		self.identity_capacity = capacity;

		self
	}

	/// Parses a JSON document, reporting the path of the first invalid value.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de).map_err(|err| ConfigError::InvalidSettings {
			path: err.path().to_string(),
			message: err.inner().to_string(),
		})
	}

	/// Reads `OAUTH2_GATE_*` variables from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads `OAUTH2_GATE_*` variables through `lookup`.
	///
	/// `CLIENT_ID`, `CLIENT_SECRET` and `REDIRECT_URI` are required; the rest fall back to the
	/// same defaults as [`GateConfig::new`].
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
		let required = |suffix: &str| {
			var(suffix).ok_or_else(|| ConfigError::InvalidSettings {
				path: format!("{ENV_PREFIX}{suffix}"),
				message: "variable is not set".into(),
			})
		};
		let redirect_uri = Url::parse(&required("REDIRECT_URI")?)
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut config = Self::new(required("CLIENT_ID")?, required("CLIENT_SECRET")?, redirect_uri);

		if let Some(token) = var("SERVICE_TOKEN") {
			config.service_token = Some(TokenSecret::new(token));
		}
		if let Some(scheme) = var("SERVICE_TOKEN_SCHEME") {
			config.service_token_scheme = scheme;
		}
		if let Some(allow) = var("ALLOW_BOT_AGENTS") {
			config.allow_bot_agents = parse_env("ALLOW_BOT_AGENTS", &allow)?;
		}
		if let Some(marker) = var("BOT_AGENT_MARKER") {
			config.bot_agent_marker = marker;
		}
		if let Some(ttl) = var("IDENTITY_TTL_SECS") {
			config.identity_ttl_secs = parse_env("IDENTITY_TTL_SECS", &ttl)?;
		}
		if let Some(capacity) = var("IDENTITY_CAPACITY") {
			config.identity_capacity = parse_env("IDENTITY_CAPACITY", &capacity)?;
		}

		Ok(config)
	}

	/// Identity cache entry lifetime.
	pub fn identity_ttl(&self) -> Duration {
		Duration::seconds(self.identity_ttl_secs)
	}

	/// `Authorization` header value for administrative calls.
	pub fn service_authorization(&self) -> Result<String, ConfigError> {
		let token = self.service_token.as_ref().ok_or(ConfigError::MissingServiceToken)?;

		Ok(format!("{} {}", self.service_token_scheme, token.expose()))
	}

	/// Returns `true` when `user_agent` identifies an allow-listed caller.
	pub fn is_allowed_bot(&self, user_agent: Option<&str>) -> bool {
		self.allow_bot_agents
			&& !self.bot_agent_marker.is_empty()
			&& user_agent.is_some_and(|agent| agent.contains(&self.bot_agent_marker))
	}
}
impl Debug for GateConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GateConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("service_token_set", &self.service_token.is_some())
			.field("service_token_scheme", &self.service_token_scheme)
			.field("allow_bot_agents", &self.allow_bot_agents)
			.field("bot_agent_marker", &self.bot_agent_marker)
			.field("identity_ttl_secs", &self.identity_ttl_secs)
			.field("identity_capacity", &self.identity_capacity)
			.finish()
	}
}

fn parse_env<T>(suffix: &str, raw: &str) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	raw.trim().parse().map_err(|err: T::Err| ConfigError::InvalidSettings {
		path: format!("{ENV_PREFIX}{suffix}"),
		message: err.to_string(),
	})
}

fn default_service_token_scheme() -> String {
	"Bot".into()
}

fn default_bot_agent_marker() -> String {
	"Top.gg".into()
}

fn default_identity_ttl_secs() -> i64 {
	DEFAULT_IDENTITY_TTL_SECS
}

fn default_identity_capacity() -> usize {
	DEFAULT_IDENTITY_CAPACITY
}
