//! Contract families and the commands that provision them.
//!
//! A family is a set of context templates plus an operation table per
//! object type. Commands walk the [`DependencyGraph`] to create whatever a
//! requested object needs, then drive the object's operations through the
//! [`ContractPlatform`] seam.

pub mod bundle;
pub mod commands;
pub mod family;
pub mod graph;
pub mod operation;
pub mod platform;

pub use bundle::{export_bundle, import_bundle};
pub use commands::{ensure_created, CommandEnv};
pub use family::{families, ContractFamily, ObjectType, EXCHANGE_FAMILY};
pub use graph::{Dependency, DependencyGraph, DependencyKind, PlannedObject};
pub use operation::{invoke_operation, OperationSpec, OperationTable};
pub use platform::{
    compute_code_hash, ContractCode, ContractPlatform, CreateRequest, HttpPlatform, InvocationRequest,
    MemoryPlatform, SaveFile,
};
