//! Scope sets granted by the provider.

// std
use std::{collections::BTreeSet, sync::OnceLock};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Scope granting access to the caller's resource group listing.
pub const GUILDS_SCOPE: &str = "guilds";

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Deduplicated, sorted set of scopes.
///
/// Providers report granted scopes as one space-delimited string; [`FromStr`] accepts that form
/// and [`Display`] renders it back in normalized order.
#[derive(Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	normalized: OnceLock<String>,
}
impl ScopeSet {
	/// Creates a normalized scope set from individual scope names.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let scope: String = scope.into();

			if scope.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if scope.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope });
			}

			set.insert(scope);
		}

		Ok(Self { scopes: set.into_iter().collect(), normalized: OnceLock::new() })
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns `true` when no scope was granted.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns `true` if `scope` was granted.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over scopes in normalized order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(String::as_str)
	}

	/// Space-delimited normalized form, cached after the first call.
	pub fn normalized(&self) -> &str {
		self.normalized.get_or_init(|| self.scopes.join(" "))
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { scopes: self.scopes.clone(), normalized: OnceLock::new() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.normalized())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		raw.parse().map_err(DeError::custom)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn provider_scope_strings_normalize() {
		let scopes = ScopeSet::from_str("identify  guilds identify\tguilds.join")
			.expect("Provider scope string should parse.");

		assert_eq!(scopes.len(), 3);
		assert_eq!(scopes.normalized(), "guilds guilds.join identify");
		assert!(scopes.contains(GUILDS_SCOPE));
		assert!(!scopes.contains("email"));
		assert!(ScopeSet::from_str("").expect("Empty scope string is valid.").is_empty());
	}

	#[test]
	fn individual_scopes_are_checked() {
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(matches!(
			ScopeSet::new(["two words"]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
	}

	#[test]
	fn scopes_serialize_as_the_provider_string() {
		let scopes = ScopeSet::new(["identify", "guilds"]).expect("Scopes should be valid.");
		let json = serde_json::to_string(&scopes).expect("Scopes should serialize.");

		assert_eq!(json, "\"guilds identify\"");
		assert_eq!(
			serde_json::from_str::<ScopeSet>(&json).expect("Scopes should deserialize."),
			scopes
		);
	}
}
