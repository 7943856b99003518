//! Per-session OAuth credential.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Credential owned by one session.
///
/// Only the token pair changes over the credential's lifetime; the redirect URI, scopes, and
/// resource group are fixed when the session is built.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	/// Bearer token presented to the provider API.
	pub access_token: TokenSecret,
	/// Refresh token, absent for sessions built from a bare access token.
	pub refresh_token: Option<TokenSecret>,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Scopes granted to the access token.
	pub scopes: ScopeSet,
	/// Resource group (guild) selected during authorization, when the provider reported one.
	pub resource_group_id: Option<String>,
}
impl Credential {
	/// Credential holding `access_token` only.
	pub fn new(access_token: impl Into<TokenSecret>, redirect_uri: Url) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			redirect_uri,
			scopes: ScopeSet::default(),
			resource_group_id: None,
		}
	}

	/// Sets the refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Sets the granted scopes.
	pub fn with_scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = scopes;

		self
	}

	/// Sets the resource group identifier.
	pub fn with_resource_group(mut self, id: Option<String>) -> Self {
		self.resource_group_id = id;

		self
	}

	/// Returns `true` when a refresh is possible.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Replaces the access token and, when the provider issued one, the refresh token.
	pub fn rotate(&mut self, access_token: TokenSecret, refresh_token: Option<TokenSecret>) {
		self.access_token = access_token;

		if let Some(refresh_token) = refresh_token {
			self.refresh_token = Some(refresh_token);
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &self.access_token.fingerprint())
			.field("refresh_token", &self.refresh_token.as_ref().map(TokenSecret::fingerprint))
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("scopes", &self.scopes)
			.field("resource_group_id", &self.resource_group_id)
			.finish()
	}
}
