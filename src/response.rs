//! Response carriers that hold their own status independent of the HTTP framework.

// crates.io
use oauth2::http::{self, HeaderValue, StatusCode, header};
// self
use crate::{_prelude::*, error::ConfigError, error::TypeCheckError};

/// Field the auth boundary uses to echo a rotated refresh token back to the caller.
pub const AUTHORIZATION_FIELD: &str = "authorization";

/// How an [`ApiResponse`] renders its attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
	/// All attributes as a JSON object.
	Json,
	/// The `message` attribute as plain text.
	Text,
}

/// Handler response: a status plus a bag of attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
	/// HTTP-style status code.
	pub status: u16,
	/// Attributes rendered into the body.
	pub attrs: JsonMap<String, Value>,
	/// Rendering mode.
	pub kind: BodyKind,
}
impl ApiResponse {
	/// Empty JSON object with status 200.
	pub fn ok() -> Self {
		Self::json(200, JsonMap::new())
	}

	/// JSON response with the given attributes.
	pub fn json(status: u16, attrs: JsonMap<String, Value>) -> Self {
		Self { status, attrs, kind: BodyKind::Json }
	}

	/// JSON response built from any serializable object.
	///
	/// Non-object values are wrapped under a `data` attribute.
	pub fn from_serialize<T>(status: u16, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let attrs = match serde_json::to_value(body)? {
			Value::Object(attrs) => attrs,
			other => JsonMap::from_iter([("data".to_owned(), other)]),
		};

		Ok(Self::json(status, attrs))
	}

	/// Plain text response.
	pub fn text(status: u16, message: impl Into<String>) -> Self {
		let attrs = JsonMap::from_iter([("message".to_owned(), Value::String(message.into()))]);

		Self { status, attrs, kind: BodyKind::Text }
	}

	/// Sets an attribute, replacing any previous value.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
		self.attrs.insert(key.into(), value.into());

		self
	}

	/// Builder-style [`insert`](Self::insert).
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.insert(key, value);

		self
	}

	/// Attribute value, if set.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.attrs.get(key)
	}

	/// Renders the response for the transport layer.
	///
	/// Text responses only render their message, so an echoed refresh token travels in the
	/// `authorization` header instead.
	pub fn into_http(self) -> Result<http::Response<Vec<u8>>, ConfigError> {
		let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		let mut builder = http::Response::builder().status(status);
		let body = match self.kind {
			BodyKind::Json => {
				builder = builder.header(header::CONTENT_TYPE, "application/json");

				serde_json::to_vec(&self.attrs)?
			},
			BodyKind::Text => {
				builder = builder.header(header::CONTENT_TYPE, "text/plain; charset=utf-8");

				if let Some(token) = self.attrs.get(AUTHORIZATION_FIELD).and_then(Value::as_str)
					&& let Ok(value) = HeaderValue::from_str(token)
				{
					builder = builder.header(header::AUTHORIZATION, value);
				}

				self.attrs.get("message").and_then(Value::as_str).unwrap_or_default().as_bytes().to_vec()
			},
		};

		Ok(builder.body(body)?)
	}
}
impl Default for ApiResponse {
	fn default() -> Self {
		Self::ok()
	}
}
impl From<HttpError> for ApiResponse {
	fn from(err: HttpError) -> Self {
		err.into_response()
	}
}

/// Structured error payload returned to API callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
pub struct HttpError {
	/// HTTP-style status code.
	pub status: u16,
	/// Human-readable message.
	pub message: String,
	/// Record name for schema failures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	/// Declared field → type name mapping for schema failures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expected: Option<BTreeMap<String, String>>,
	/// Received field → type name mapping for schema failures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub got: Option<BTreeMap<String, String>>,
}
impl HttpError {
	/// Error with the given status and message.
	pub fn new(status: u16, message: impl Into<String>) -> Self {
		Self { status, message: message.into(), model: None, expected: None, got: None }
	}

	/// 400 error.
	pub fn bad_request(message: impl Into<String>) -> Self {
		Self::new(400, message)
	}

	/// 403 error.
	pub fn forbidden(message: impl Into<String>) -> Self {
		Self::new(403, message)
	}

	/// Converts the error into a JSON [`ApiResponse`] carrying every diagnostic field.
	pub fn into_response(self) -> ApiResponse {
		let status = self.status;

		match serde_json::to_value(&self) {
			Ok(Value::Object(attrs)) => ApiResponse::json(status, attrs),
			_ => ApiResponse::json(status, JsonMap::new()).with("message", self.message),
		}
	}
}
impl From<TypeCheckError> for HttpError {
	fn from(err: TypeCheckError) -> Self {
		match err {
			TypeCheckError::CastFailure { target, value } =>
				Self::bad_request(format!("{value} was not of type `{target}`")),
			TypeCheckError::ArityMismatch { model, expected, got } => Self {
				model: Some(model),
				expected: Some(expected),
				got: Some(got),
				..Self::bad_request("Invalid parameters passed")
			},
			mismatch @ TypeCheckError::TypeMismatch { .. } => Self::bad_request(mismatch.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn http_errors_render_diagnostics_only_when_present() {
		let plain = HttpError::forbidden("Invalid login token").into_response();

		assert_eq!(plain.status, 403);
		assert_eq!(Value::Object(plain.attrs), json!({ "status": 403, "message": "Invalid login token" }));

		let arity = HttpError::from(TypeCheckError::ArityMismatch {
			model: "Query".into(),
			expected: BTreeMap::from([("a".to_owned(), "integer".to_owned())]),
			got: BTreeMap::new(),
		})
		.into_response();

		assert_eq!(arity.get("model"), Some(&json!("Query")));
		assert_eq!(arity.get("expected"), Some(&json!({ "a": "integer" })));
		assert_eq!(arity.get("got"), Some(&json!({})));
	}

	#[test]
	fn json_responses_render_attributes() {
		let response = ApiResponse::ok().with("id", 7).with(AUTHORIZATION_FIELD, "refresh-2");
		let rendered = response.into_http().expect("JSON response should render.");

		assert_eq!(rendered.status(), StatusCode::OK);

		let body: Value = serde_json::from_slice(rendered.body()).expect("Body should be JSON.");

		assert_eq!(body, json!({ "id": 7, "authorization": "refresh-2" }));
	}

	#[test]
	fn text_responses_move_the_echo_into_a_header() {
		let response = ApiResponse::text(201, "created").with(AUTHORIZATION_FIELD, "refresh-3");
		let rendered = response.into_http().expect("Text response should render.");

		assert_eq!(rendered.status(), StatusCode::CREATED);
		assert_eq!(rendered.body().as_slice(), b"created");
		assert_eq!(
			rendered.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
			Some("refresh-3")
		);
	}

	#[test]
	fn serializable_bodies_wrap_non_objects() {
		let list = ApiResponse::from_serialize(200, &["a", "b"]).expect("Lists should serialize.");

		assert_eq!(list.get("data"), Some(&json!(["a", "b"])));
	}
}
