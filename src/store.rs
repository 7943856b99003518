//! In-process token state: the refresh-token cache and the identity cache.
//!
//! Both caches live for the lifetime of the owning factory and are never persisted; a process
//! restart simply starts cold.

pub mod identity;

pub use identity::*;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Default upper bound on cached refresh tokens.
pub const DEFAULT_TOKEN_CAPACITY: usize = 10_000;

/// Access credential cached under a refresh token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
	/// Access token issued for the refresh token.
	pub access_token: TokenSecret,
	/// Instant after which the entry is logically absent.
	pub expires_at: OffsetDateTime,
	/// Scopes granted with the access token.
	pub scope: ScopeSet,
}
impl CacheEntry {
	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at <= instant
	}
}

/// Bounded, time-expiring map from refresh token to [`CacheEntry`].
///
/// Expired entries are evicted lazily by the reader that observes them. When the cache is full,
/// an insert first drops expired entries and then the entry closest to expiry.
#[derive(Debug)]
pub struct TokenCache {
	entries: RwLock<HashMap<String, CacheEntry>>,
	capacity: usize,
}
impl TokenCache {
	/// Creates a cache holding at most `capacity` refresh tokens.
	pub fn with_capacity(capacity: usize) -> Self {
		Self { entries: RwLock::new(HashMap::new()), capacity: capacity.max(1) }
	}

	/// Looks up `refresh_token` against the current clock.
	pub fn get(&self, refresh_token: &str) -> Option<CacheEntry> {
		self.get_at(refresh_token, OffsetDateTime::now_utc())
	}

	/// Looks up `refresh_token` as of `instant`, evicting it when expired.
	pub fn get_at(&self, refresh_token: &str, instant: OffsetDateTime) -> Option<CacheEntry> {
		{
			let entries = self.entries.read();
			let entry = entries.get(refresh_token)?;

			if !entry.is_expired_at(instant) {
				return Some(entry.clone());
			}
		}

		let mut entries = self.entries.write();

		// A concurrent `put` may have replaced the entry between the two locks.
		match entries.get(refresh_token) {
			Some(entry) if entry.is_expired_at(instant) => {
				entries.remove(refresh_token);

				None
			},
			Some(entry) => Some(entry.clone()),
			None => None,
		}
	}

	/// Stores an entry expiring `ttl` from now, replacing any previous one.
	pub fn put(
		&self,
		refresh_token: impl Into<String>,
		access_token: TokenSecret,
		ttl: Duration,
		scope: ScopeSet,
	) {
		self.put_at(refresh_token, access_token, ttl, scope, OffsetDateTime::now_utc());
	}

	/// Stores an entry expiring `ttl` after `instant`.
	pub fn put_at(
		&self,
		refresh_token: impl Into<String>,
		access_token: TokenSecret,
		ttl: Duration,
		scope: ScopeSet,
		instant: OffsetDateTime,
	) {
		let refresh_token = refresh_token.into();
		let entry = CacheEntry { access_token, expires_at: instant.saturating_add(ttl), scope };
		let mut entries = self.entries.write();

		if entries.len() >= self.capacity && !entries.contains_key(&refresh_token) {
			entries.retain(|_, entry| !entry.is_expired_at(instant));

			if entries.len() >= self.capacity
				&& let Some(oldest) = entries
					.iter()
					.min_by_key(|(_, entry)| entry.expires_at)
					.map(|(key, _)| key.clone())
			{
				entries.remove(&oldest);
			}
		}

		entries.insert(refresh_token, entry);
	}

	/// Drops the entry for `refresh_token`.
	pub fn remove(&self, refresh_token: &str) -> Option<CacheEntry> {
		self.entries.write().remove(refresh_token)
	}

	/// Number of stored entries, expired ones included until they are observed.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl Default for TokenCache {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_TOKEN_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn scope() -> ScopeSet {
		ScopeSet::new(["x"]).expect("Scope fixture should be valid.")
	}

	#[test]
	fn entries_expire_lazily() {
		let cache = TokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.put_at("R1", TokenSecret::new("A1"), Duration::seconds(10), scope(), now);

		let entry = cache.get_at("R1", now).expect("Fresh entry should be served.");

		assert_eq!(entry.access_token.expose(), "A1");
		assert_eq!(entry.scope, scope());
		assert_eq!(entry.expires_at, now + Duration::seconds(10));

		let later = now + Duration::seconds(10);

		assert!(cache.get_at("R1", later).is_none(), "Entry at its expiry instant is absent.");
		assert!(cache.is_empty(), "Observed expiry should evict the entry.");
		assert!(cache.get_at("R1", later).is_none(), "Evicted entry stays a miss.");
		assert!(cache.get_at("R1", now).is_none(), "Eviction is permanent, not clock-relative.");
	}

	#[test]
	fn oversized_lifetimes_saturate() {
		let cache = TokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.put_at("R1", TokenSecret::new("A1"), Duration::MAX, scope(), now);

		assert!(cache.get_at("R1", now + Duration::days(365 * 100)).is_some());
	}

	#[test]
	fn put_overwrites_unconditionally() {
		let cache = TokenCache::default();
		let now = OffsetDateTime::now_utc();

		cache.put_at("R1", TokenSecret::new("A1"), Duration::seconds(10), scope(), now);
		cache.put_at("R1", TokenSecret::new("A2"), Duration::seconds(1), scope(), now);

		assert_eq!(cache.len(), 1);
		assert_eq!(
			cache.get_at("R1", now).map(|entry| entry.access_token.expose().to_owned()),
			Some("A2".into())
		);
		assert!(cache.get_at("R1", now + Duration::seconds(2)).is_none());
	}

	#[test]
	fn full_cache_drops_expired_then_soonest_expiring() {
		let cache = TokenCache::with_capacity(2);
		let now = OffsetDateTime::now_utc();

		cache.put_at("short", TokenSecret::new("A1"), Duration::seconds(5), scope(), now);
		cache.put_at("long", TokenSecret::new("A2"), Duration::seconds(50), scope(), now);
		cache.put_at("next", TokenSecret::new("A3"), Duration::seconds(30), scope(), now);

		assert_eq!(cache.len(), 2);
		assert!(cache.get_at("short", now).is_none());
		assert!(cache.get_at("long", now).is_some());

		let later = now + Duration::seconds(40);

		cache.put_at("fresh", TokenSecret::new("A4"), Duration::seconds(30), scope(), later);

		assert!(cache.get_at("long", later).is_some());
		assert!(cache.get_at("fresh", later).is_some());
		assert!(cache.remove("next").is_none(), "Expired entry should have been purged on insert.");
	}
}
