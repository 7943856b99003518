// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::ScopeSet};

const STATE_LEN: usize = 32;

/// Authorization redirect plus the `state` value that must come back with the code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
	/// Provider URL the user agent should be sent to.
	pub url: Url,
	/// Opaque anti-forgery value.
	pub state: String,
}
impl AuthorizationRequest {
	pub(super) fn build(
		endpoint: &Url,
		client_id: &str,
		redirect_uri: &Url,
		scopes: &ScopeSet,
	) -> Self {
		let state = random_state();
		let mut url = endpoint.clone();

		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", client_id)
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("scope", scopes.normalized())
			.append_pair("state", &state);

		Self { url, state }
	}

	/// Checks the `state` returned on the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::invalid_token("authorization state mismatch"))
		}
	}
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn authorize_urls_carry_every_parameter() {
		let endpoint =
			Url::parse("https://discord.com/api/v6/oauth2/authorize").expect("Endpoint should parse.");
		let redirect = Url::parse("https://app.example.com/callback").expect("Redirect should parse.");
		let scopes = ScopeSet::new(["identify", "guilds"]).expect("Scopes should be valid.");
		let request = AuthorizationRequest::build(&endpoint, "123", &redirect, &scopes);
		let pairs: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

		assert_eq!(request.state.len(), STATE_LEN);
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("123"));
		assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some(redirect.as_str()));
		assert_eq!(pairs.get("scope").map(String::as_str), Some("guilds identify"));
		assert_eq!(pairs.get("state"), Some(&request.state));
	}

	#[test]
	fn state_validation_errors_on_mismatch() {
		let request = AuthorizationRequest {
			url: Url::parse("https://example.com/auth").expect("URL fixture should parse."),
			state: "expected".into(),
		};

		assert!(request.validate_state("expected").is_ok());
		assert!(request.validate_state("other").expect_err("Mismatch should fail.").is_invalid_token());
	}
}
