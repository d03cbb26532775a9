//! Capability keys, secret envelopes and the stores behind the guardian.

pub mod envelope;
pub mod keys;
pub mod keystore;
pub mod registry;
pub mod replay;
pub mod store;

pub use envelope::{recv_secret, send_secret};
pub use keys::{verify_signature, CapabilityKeys, EncryptionKey, SerializedCapabilityKeys};
pub use keystore::{KeyValueStore, MemoryStore, SledStore};
pub use registry::{EndpointRecord, EndpointRegistry};
pub use replay::RequestRegistry;
pub use store::{CapabilityKeyStore, MANAGEMENT_CAPABILITY_KEY, SERVICE_CAPABILITY_KEY};
