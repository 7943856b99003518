//! Gate-level error types shared across decoding, sessions, and the auth boundary.

// self
use crate::{_prelude::*, api::ApiError, response::HttpError};

/// Gate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Request payload disagrees with its declared schema.
	#[error(transparent)]
	TypeCheck(#[from] TypeCheckError),
	/// Handler-level failure that already carries its own response shape.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// Outbound provider API failure.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Credential is missing, expired without a refresh path, or rejected by the provider.
	#[error("Invalid login token: {reason}.")]
	InvalidToken {
		/// Gate- or provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Shorthand for [`Error::InvalidToken`].
	pub fn invalid_token(reason: impl Into<String>) -> Self {
		Self::InvalidToken { reason: reason.into() }
	}

	/// Returns `true` when the error means the caller's credential cannot be used.
	pub fn is_invalid_token(&self) -> bool {
		matches!(self, Self::InvalidToken { .. })
	}

	/// Folds token-endpoint rejections into [`Error::InvalidToken`].
	///
	/// Grant and client rejections, and 4xx responses the endpoint answered with an unreadable
	/// body, all mean the provider did not hand out a usable access token. Network and 5xx
	/// failures pass through untouched.
	pub fn into_token_rejection(self) -> Self {
		match self {
			Self::InvalidGrant { reason } | Self::InvalidClient { reason } =>
				Self::InvalidToken { reason },
			Self::Transient(TransientError::TokenResponseParse { status: Some(status), .. })
				if (400..500).contains(&status) =>
				Self::InvalidToken { reason: format!("token endpoint answered with HTTP {status}") },
			Self::Transient(TransientError::TokenEndpoint { status: Some(status), message, .. })
				if (400..500).contains(&status) =>
				Self::InvalidToken { reason: message },
			other => other,
		}
	}
}

/// Schema validation failures raised while decoding request parameters.
#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum TypeCheckError {
	/// Value shape disagrees with the schema and no coercion applied.
	#[error("Typecheck failure: {expected}, given {actual} ({value})")]
	TypeMismatch {
		/// Declared type name.
		expected: String,
		/// Runtime type name of the received value.
		actual: &'static str,
		/// Rendered offending value.
		value: String,
	},
	/// Coercion to the declared primitive failed.
	#[error("Could not cast {value} to type {target}")]
	CastFailure {
		/// Primitive type the cast targeted.
		target: &'static str,
		/// Rendered offending value.
		value: String,
	},
	/// Field set of the payload differs from the declared record.
	#[error("Could not construct {model}(**{expected:?}). Got {got:?}")]
	ArityMismatch {
		/// Record (model) name.
		model: String,
		/// Declared field → type name mapping.
		expected: BTreeMap<String, String>,
		/// Received field → runtime type name mapping.
		got: BTreeMap<String, String>,
	},
}

/// Configuration and validation failures raised by the gate.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request or response construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Gate configuration could not be parsed.
	#[error("Gate configuration is invalid at `{path}`: {message}.")]
	InvalidSettings {
		/// JSON path (or environment variable) of the offending value.
		path: String,
		/// Parser message.
		message: String,
	},
	/// Administrative call attempted without a service credential.
	#[error("No service credential is configured.")]
	MissingServiceToken,
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a zero or negative `expires_in`.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Response payload could not be encoded.
	#[error("Response payload could not be encoded.")]
	ResponseEncode(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or gate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn grant_rejections_fold_into_invalid_token() {
		let err = Error::InvalidGrant { reason: "bad refresh".into() }.into_token_rejection();

		assert!(err.is_invalid_token());

		let err = Error::from(TransientError::TokenEndpoint {
			message: "upstream down".into(),
			status: Some(503),
			retry_after: None,
		})
		.into_token_rejection();

		assert!(matches!(err, Error::Transient(_)));
	}

	#[test]
	fn type_check_messages_name_types_and_values() {
		let err = TypeCheckError::TypeMismatch {
			expected: "string".into(),
			actual: "integer",
			value: "5".into(),
		};

		assert_eq!(err.to_string(), "Typecheck failure: string, given integer (5)");

		let err = TypeCheckError::CastFailure { target: "integer", value: "abc".into() };

		assert_eq!(err.to_string(), "Could not cast abc to type integer");
	}
}
