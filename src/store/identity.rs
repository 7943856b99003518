//! TTL + LRU cache used to memoize identity lookups per access token.

// std
use std::hash::Hash;
// self
use crate::{_prelude::*, api::UserIdentity};

/// Default identity lifetime in seconds.
pub const DEFAULT_IDENTITY_TTL_SECS: i64 = 36_000;
/// Default number of cached identities.
pub const DEFAULT_IDENTITY_CAPACITY: usize = 500;

/// Identity cache keyed by the raw access token.
pub type IdentityCache = TtlLruCache<String, UserIdentity>;

#[derive(Debug)]
struct Slot<V> {
	value: V,
	expires_at: OffsetDateTime,
	tick: u64,
}

#[derive(Debug)]
struct Inner<K, V> {
	slots: HashMap<K, Slot<V>>,
	// Recency index: smallest tick is the least recently used key.
	order: BTreeMap<u64, K>,
	tick: u64,
}
impl<K, V> Inner<K, V>
where
	K: Clone + Eq + Hash,
{
	fn touch(&mut self, key: &K) {
		self.tick += 1;

		let tick = self.tick;

		if let Some(slot) = self.slots.get_mut(key) {
			self.order.remove(&slot.tick);
			slot.tick = tick;
			self.order.insert(tick, key.clone());
		}
	}

	fn remove(&mut self, key: &K) -> Option<Slot<V>> {
		let slot = self.slots.remove(key)?;

		self.order.remove(&slot.tick);

		Some(slot)
	}
}

/// Bounded map whose entries expire a fixed time after insertion.
///
/// Once full, inserting a new key evicts the least recently used one.
#[derive(Debug)]
pub struct TtlLruCache<K, V> {
	inner: Mutex<Inner<K, V>>,
	ttl: Duration,
	capacity: usize,
}
impl<K, V> TtlLruCache<K, V>
where
	K: Clone + Eq + Hash,
	V: Clone,
{
	/// Creates a cache with the given entry lifetime and size bound.
	pub fn new(ttl: Duration, capacity: usize) -> Self {
		Self {
			inner: Mutex::new(Inner { slots: HashMap::new(), order: BTreeMap::new(), tick: 0 }),
			ttl,
			capacity: capacity.max(1),
		}
	}

	/// Entry lifetime.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Looks up `key` against the current clock.
	pub fn get(&self, key: &K) -> Option<V> {
		self.get_at(key, OffsetDateTime::now_utc())
	}

	/// Looks up `key` as of `instant`, marking it most recently used.
	pub fn get_at(&self, key: &K, instant: OffsetDateTime) -> Option<V> {
		let mut inner = self.inner.lock();
		let expired = inner.slots.get(key)?.expires_at <= instant;

		if expired {
			inner.remove(key);

			return None;
		}

		inner.touch(key);
		inner.slots.get(key).map(|slot| slot.value.clone())
	}

	/// Inserts `value` with a fresh lifetime.
	pub fn insert(&self, key: K, value: V) {
		self.insert_at(key, value, OffsetDateTime::now_utc());
	}

	/// Inserts `value` with a lifetime starting at `instant`.
	pub fn insert_at(&self, key: K, value: V, instant: OffsetDateTime) {
		let mut inner = self.inner.lock();

		inner.remove(&key);

		while inner.slots.len() >= self.capacity {
			let Some((_, lru)) = inner.order.pop_first() else {
				break;
			};

			inner.slots.remove(&lru);
		}

		inner.tick += 1;

		let tick = inner.tick;

		inner.order.insert(tick, key.clone());
		inner.slots.insert(key, Slot { value, expires_at: instant.saturating_add(self.ttl), tick });
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.inner.lock().slots.len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.inner.lock().slots.is_empty()
	}
}
impl<K, V> Default for TtlLruCache<K, V>
where
	K: Clone + Eq + Hash,
	V: Clone,
{
	fn default() -> Self {
		Self::new(Duration::seconds(DEFAULT_IDENTITY_TTL_SECS), DEFAULT_IDENTITY_CAPACITY)
	}
}
