//! Contract commands.
//!
//! Commands compose operations into creation and update workflows. Every
//! create is idempotent on the `save_file` recorded in its context, and
//! prerequisites are created by walking the [`DependencyGraph`] rather than
//! by commands calling each other.

pub mod asset;
pub mod exchange;
pub mod token;

pub use asset::{
    approve_issuer, create_asset_type, create_issuer, create_vetting, get_balance, issue_assets,
    transfer_assets,
};
pub use exchange::{cancel_order, claim_offer, claim_payment, create_order, examine_order, match_order};
pub use token::{create_guardian, create_token_issuer, create_token_object, echo, mint_tokens};

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::family::ObjectType;
use super::graph::{DependencyGraph, DependencyKind};
use super::operation::invoke_operation;
use super::platform::{ContractPlatform, CreateRequest};
use crate::client::{GuardianApi, GuardianConnector};
use crate::context::{save_context_file, Context, State};
use crate::types::{GuardianError, Result};

/// Context file rewritten after every step that changes contract state
#[derive(Debug, Clone)]
struct Checkpoint {
    file: PathBuf,
    prefix: String,
}

/// Everything a command needs besides its context
pub struct CommandEnv {
    state: State,
    platform: Arc<dyn ContractPlatform>,
    guardians: Arc<dyn GuardianConnector>,
    graph: DependencyGraph,
    checkpoint: Option<Checkpoint>,
}

impl CommandEnv {
    pub fn new(
        state: State,
        platform: Arc<dyn ContractPlatform>,
        guardians: Arc<dyn GuardianConnector>,
    ) -> Self {
        Self {
            state,
            platform,
            guardians,
            graph: DependencyGraph::standard(),
            checkpoint: None,
        }
    }

    /// Persist `prefix` to `file` after each created object or minted token
    pub fn with_checkpoint(mut self, file: &Path, prefix: &str) -> Self {
        self.checkpoint = Some(Checkpoint {
            file: file.to_path_buf(),
            prefix: prefix.to_string(),
        });
        self
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn platform(&self) -> &dyn ContractPlatform {
        self.platform.as_ref()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn checkpoint(&self) -> Result<()> {
        if let Some(checkpoint) = &self.checkpoint {
            save_context_file(&self.state, &checkpoint.file, &checkpoint.prefix)?;
            debug!(file = %checkpoint.file.display(), "Checkpointed context");
        }
        Ok(())
    }

    /// Invoke a named operation on the contract recorded in `context`
    pub async fn invoke(
        &self,
        object_type: ObjectType,
        context: &Context,
        operation: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value> {
        let save_file = require_save_file(context, object_type)?;
        self.invoke_on(object_type, &save_file, operation, parameters).await
    }

    /// Invoke a named operation on a contract known only by its save file
    pub async fn invoke_on(
        &self,
        object_type: ObjectType,
        save_file: &str,
        operation: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value> {
        invoke_operation(
            self.platform.as_ref(),
            &object_type.operations(),
            save_file,
            operation,
            parameters,
        )
        .await
    }

    /// Guardian service named by the `url` of a guardian context
    pub fn guardian(&self, guardian_context: &Context) -> Result<Arc<dyn GuardianApi>> {
        let url = guardian_context.require_str("url")?;
        self.guardians.connect(&url)
    }

    /// Allocate the contract for `context` and record its save file
    async fn create_contract(&self, object_type: ObjectType, context: &Context) -> Result<String> {
        let request = CreateRequest::from_context(context, object_type.class_name())?;
        let save_file = self.platform.create_contract(request).await?;
        context.set("save_file", save_file.as_str())?;
        self.checkpoint()?;
        info!(object = %object_type, context = %context.path(), save_file = %save_file, "Created contract");
        Ok(save_file)
    }
}

pub fn save_file(context: &Context) -> Result<Option<String>> {
    context.get_str("save_file")
}

pub fn require_save_file(context: &Context, object_type: ObjectType) -> Result<String> {
    save_file(context)?.ok_or_else(|| {
        GuardianError::Validation(format!(
            "{} contract at {} has not been created",
            object_type,
            context.path()
        ))
    })
}

/// Create `context` and everything it depends on, in dependency order.
/// Objects that already have a save file are left alone.
pub async fn ensure_created(env: &CommandEnv, object_type: ObjectType, context: &Context) -> Result<String> {
    for dependency in env.graph.dependencies(object_type) {
        if dependency.kind == DependencyKind::Existing {
            let existing = context.get_context(dependency.context_key)?;
            require_save_file(&existing, dependency.object_type)?;
        }
    }

    for planned in env.graph.creation_order(object_type, context)? {
        build(env, planned.object_type, &planned.context).await?;
    }
    require_save_file(context, object_type)
}

async fn build(env: &CommandEnv, object_type: ObjectType, context: &Context) -> Result<String> {
    if let Some(save_file) = save_file(context)? {
        return Ok(save_file);
    }
    match object_type {
        ObjectType::AssetType => asset::build_asset_type(env, context).await,
        ObjectType::Vetting => asset::build_vetting(env, context).await,
        ObjectType::Issuer => asset::build_issuer(env, context).await,
        ObjectType::Guardian => token::build_guardian(env, context).await,
        ObjectType::TokenIssuer => token::build_token_issuer(env, context).await,
        ObjectType::TokenObject => token::build_token_object(env, context).await,
        ObjectType::Order => exchange::build_order(env, context).await,
    }
}

/// Read `<identity>_public.pem` from the directories in `Key.SearchPath`
pub fn find_public_key(state: &State, identity: &str) -> Result<String> {
    let search_path: Vec<PathBuf> = state
        .get("Key.SearchPath")?
        .map(|value| value.try_into())
        .transpose()?
        .unwrap_or_else(|| vec![PathBuf::from(".")]);

    let file_name = format!("{}_public.pem", identity);
    let path = search_path
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| GuardianError::MissingKey(format!("public key for {}", identity)))?;
    Ok(std::fs::read_to_string(path)?)
}

/// Token issuer, guardian and token object must share one identity
pub(crate) fn require_same_identity(context: &Context, other: &Context, role: &str) -> Result<()> {
    let identity = context.require_str("identity")?;
    let other_identity = other.require_str("identity")?;
    if identity != other_identity {
        return Err(GuardianError::Validation(format!(
            "{} and token object must be created by the same identity",
            role
        )));
    }
    Ok(())
}

/// Positive count from a command argument or a context default
pub(crate) fn positive_count(count: i64, what: &str) -> Result<i64> {
    if count <= 0 {
        return Err(GuardianError::Validation(format!("{} must be positive, got {}", what, count)));
    }
    Ok(count)
}
