//! Capability key store.
//!
//! Maps a minted identity to its [`CapabilityKeys`]. The management and
//! service identities are created on first open and reused afterwards.
//! Decoded keys are cached; the backing store holds the serialized form.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::keys::{CapabilityKeys, SerializedCapabilityKeys};
use super::keystore::KeyValueStore;
use crate::types::{GuardianError, Result};

/// Identity of the key used to provision token issuers
pub const MANAGEMENT_CAPABILITY_KEY: &str = "management_capability_key";

/// Identity of the guardian's own service key
pub const SERVICE_CAPABILITY_KEY: &str = "service_capability_key";

pub struct CapabilityKeyStore {
    store: Arc<dyn KeyValueStore>,
    cache: DashMap<String, Arc<CapabilityKeys>>,
    management_key: Arc<CapabilityKeys>,
    service_key: Arc<CapabilityKeys>,
}

impl CapabilityKeyStore {
    /// Open the store, provisioning the well-known identities when missing
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let cache = DashMap::new();
        let management_key = Self::get_or_create(&store, &cache, MANAGEMENT_CAPABILITY_KEY)?;
        let service_key = Self::get_or_create(&store, &cache, SERVICE_CAPABILITY_KEY)?;

        info!(
            service_verifying_key = %service_key.verifying_key(),
            "Capability key store ready"
        );

        Ok(Self {
            store,
            cache,
            management_key,
            service_key,
        })
    }

    fn get_or_create(
        store: &Arc<dyn KeyValueStore>,
        cache: &DashMap<String, Arc<CapabilityKeys>>,
        identity: &str,
    ) -> Result<Arc<CapabilityKeys>> {
        let keys = match load(store.as_ref(), identity)? {
            Some(keys) => keys,
            None => {
                info!(identity, "Provisioning well-known capability key");
                let keys = CapabilityKeys::create_new_keys()?;
                persist(store.as_ref(), identity, &keys)?;
                keys
            }
        };
        let keys = Arc::new(keys);
        cache.insert(identity.to_string(), keys.clone());
        Ok(keys)
    }

    /// Keys for `minted_identity`; [`GuardianError::UnknownIdentity`] if absent
    pub fn get_capability_key(&self, minted_identity: &str) -> Result<Arc<CapabilityKeys>> {
        if let Some(keys) = self.cache.get(minted_identity) {
            return Ok(keys.clone());
        }

        let keys = load(self.store.as_ref(), minted_identity)?
            .ok_or_else(|| GuardianError::UnknownIdentity(minted_identity.to_string()))?;

        // A concurrent create may have landed between the load and here
        let entry = self
            .cache
            .entry(minted_identity.to_string())
            .or_insert_with(|| Arc::new(keys));
        Ok(entry.value().clone())
    }

    /// Generate and persist fresh keys, replacing any existing ones
    pub fn create_capability_key(&self, minted_identity: &str) -> Result<Arc<CapabilityKeys>> {
        // RSA generation is slow, keep it outside the shard lock
        let keys = CapabilityKeys::create_new_keys()?;
        let keys = self.set_capability_key(minted_identity, keys)?;
        debug!(minted_identity, "Created capability key");
        Ok(keys)
    }

    pub fn set_capability_key(
        &self,
        minted_identity: &str,
        keys: CapabilityKeys,
    ) -> Result<Arc<CapabilityKeys>> {
        let keys = Arc::new(keys);
        // Persist under the entry lock, publish only once stored
        match self.cache.entry(minted_identity.to_string()) {
            Entry::Occupied(mut entry) => {
                persist(self.store.as_ref(), minted_identity, &keys)?;
                entry.insert(keys.clone());
            }
            Entry::Vacant(entry) => {
                persist(self.store.as_ref(), minted_identity, &keys)?;
                entry.insert(keys.clone());
            }
        }
        Ok(keys)
    }

    pub fn management_key(&self) -> Arc<CapabilityKeys> {
        self.management_key.clone()
    }

    pub fn service_key(&self) -> Arc<CapabilityKeys> {
        self.service_key.clone()
    }

    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

fn load(store: &dyn KeyValueStore, identity: &str) -> Result<Option<CapabilityKeys>> {
    match store.get(identity)? {
        Some(bytes) => {
            let serialized: SerializedCapabilityKeys = serde_json::from_slice(&bytes)?;
            Ok(Some(CapabilityKeys::deserialize(&serialized)?))
        }
        None => Ok(None),
    }
}

fn persist(store: &dyn KeyValueStore, identity: &str, keys: &CapabilityKeys) -> Result<()> {
    let serialized = keys.serialize()?;
    let bytes = zeroize::Zeroizing::new(serde_json::to_vec(&serialized)?);
    store.set(identity, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::keystore::{MemoryStore, SledStore};

    #[test]
    fn test_well_known_keys_provisioned() {
        let backing = Arc::new(MemoryStore::new());
        let store = CapabilityKeyStore::open(backing.clone()).unwrap();

        assert_eq!(backing.len(), 2);
        assert_eq!(
            store.get_capability_key(MANAGEMENT_CAPABILITY_KEY).unwrap().verifying_key(),
            store.management_key().verifying_key()
        );
        assert_ne!(
            store.management_key().verifying_key(),
            store.service_key().verifying_key()
        );
    }

    #[test]
    fn test_unknown_identity() {
        let store = CapabilityKeyStore::open(Arc::new(MemoryStore::new())).unwrap();
        assert!(matches!(
            store.get_capability_key("nobody"),
            Err(GuardianError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn test_create_then_get() {
        let store = CapabilityKeyStore::open(Arc::new(MemoryStore::new())).unwrap();
        let created = store.create_capability_key("user1").unwrap();
        let fetched = store.get_capability_key("user1").unwrap();
        assert_eq!(created.verifying_key(), fetched.verifying_key());

        let replaced = store.create_capability_key("user1").unwrap();
        assert_ne!(created.verifying_key(), replaced.verifying_key());
        assert_eq!(
            store.get_capability_key("user1").unwrap().verifying_key(),
            replaced.verifying_key()
        );
    }

    /// Accepts the well-known keys, then refuses every write
    struct FailingStore {
        inner: MemoryStore,
        writes_left: std::sync::atomic::AtomicUsize,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            use std::sync::atomic::Ordering;
            if self.writes_left.load(Ordering::SeqCst) == 0 {
                return Err(GuardianError::Internal("store is read-only".into()));
            }
            self.writes_left.fetch_sub(1, Ordering::SeqCst);
            self.inner.set(key, value)
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_persist_leaves_no_cached_key() {
        let backing = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            writes_left: std::sync::atomic::AtomicUsize::new(2),
        });
        let store = CapabilityKeyStore::open(backing).unwrap();

        assert!(store.create_capability_key("user1").is_err());
        assert!(matches!(
            store.get_capability_key("user1"),
            Err(GuardianError::UnknownIdentity(_))
        ));

        let management = store.management_key().verifying_key();
        assert!(store.create_capability_key(MANAGEMENT_CAPABILITY_KEY).is_err());
        assert_eq!(
            store.get_capability_key(MANAGEMENT_CAPABILITY_KEY).unwrap().verifying_key(),
            management
        );
    }

    #[test]
    fn test_keys_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.db");

        let (management, user) = {
            let store = CapabilityKeyStore::open(Arc::new(SledStore::open(&path).unwrap())).unwrap();
            let user = store.create_capability_key("user1").unwrap();
            store.close().unwrap();
            (store.management_key().verifying_key(), user.verifying_key())
        };

        let store = CapabilityKeyStore::open(Arc::new(SledStore::open(&path).unwrap())).unwrap();
        assert_eq!(store.management_key().verifying_key(), management);
        assert_eq!(store.get_capability_key("user1").unwrap().verifying_key(), user);
    }
}
