//! Wire parameter extraction for inbound requests.
//!
//! Read-style requests carry their parameters in the query string; `POST`, `PUT` and `DELETE`
//! carry a JSON body. Query keys ending in `[]` collect every value for that key into a list
//! stored under the key without the suffix.

// crates.io
use oauth2::http::{Method, Request};
// self
use crate::{
	_prelude::*,
	response::HttpError,
	schema::{DecodedRecord, Schema},
};

/// Decodes the parameters of `request` against `schema`.
///
/// Schema failures are returned as [`Error::Http`] with status 400 so the auth boundary can
/// render them directly.
pub fn decode_params<B>(request: &Request<B>, schema: &Schema, allow_cast: bool) -> Result<DecodedRecord>
where
	B: AsRef<[u8]>,
{
	let payload = if carries_body(request.method()) {
		body_payload(request.body().as_ref())?
	} else {
		query_payload(request.uri().query())
	};

	schema.decode(&payload, allow_cast).map_err(|err| HttpError::from(err).into())
}

/// Returns `true` for methods whose parameters travel in a JSON body.
pub fn carries_body(method: &Method) -> bool {
	*method == Method::POST || *method == Method::PUT || *method == Method::DELETE
}

/// Builds the untyped payload for a query string.
///
/// Plain keys keep their first value; `key[]` keys collect all values in order.
pub fn query_payload(query: Option<&str>) -> Value {
	let mut payload = JsonMap::new();

	for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
		match key.strip_suffix("[]") {
			Some(list_key) => {
				let slot = payload
					.entry(list_key.to_owned())
					.or_insert_with(|| Value::Array(Vec::new()));

				match slot {
					Value::Array(values) => values.push(Value::String(value.into_owned())),
					// A plain `key` arrived first; the list form replaces it.
					other => *other = Value::Array(vec![Value::String(value.into_owned())]),
				}
			},
			None => {
				payload.entry(key.into_owned()).or_insert_with(|| Value::String(value.into_owned()));
			},
		}
	}

	Value::Object(payload)
}

/// Parses a JSON request body.
pub fn body_payload(body: &[u8]) -> Result<Value, HttpError> {
	serde_json::from_slice(body).map_err(|_| HttpError::bad_request("Invalid JSON"))
}
