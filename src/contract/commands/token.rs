//! Guardian, token issuer and token object commands.
//!
//! Provisioning runs between three parties: the token issuer contract, the
//! token object contract and the guardian service. The guardian hands the
//! issuer its management key, the issuer vouches for each minted object,
//! and the guardian creates the object's capability key.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use super::asset::{approve, authority_for};
use super::{ensure_created, require_same_identity, require_save_file, CommandEnv};
use crate::context::Context;
use crate::contract::{CreateRequest, ObjectType};
use crate::params;
use crate::types::{
    AddEndpointRequest, CodeMetadata, ContractMetadata, GuardianError, Result, SecretEnvelope,
};

pub async fn create_guardian(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::Guardian, context).await
}

pub async fn create_token_issuer(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::TokenIssuer, context).await
}

/// Create a single token object in `context`, along with its issuer and
/// guardian if they do not exist yet
pub async fn create_token_object(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::TokenObject, context).await
}

/// Guardian contract, bound to the ledger key and the token issuer's code
pub(crate) async fn build_guardian(env: &CommandEnv, context: &Context) -> Result<String> {
    let ledger_key = env.platform().ledger_key().await?;
    let save_file = env.create_contract(ObjectType::Guardian, context).await?;

    let token_issuer = context.get_context("token_issuer_context")?;
    let source = token_issuer.require_str("source")?;
    let code = env
        .platform()
        .contract_code(ObjectType::TokenIssuer.class_name(), &source)
        .await?;

    env.invoke(
        ObjectType::Guardian,
        context,
        "initialize",
        params! {
            "ledger_verifying_key" => ledger_key,
            "token_issuer_code_hash" => code.code_hash(),
        },
    )
    .await?;

    info!(save_file = %save_file, "Created guardian");
    Ok(save_file)
}

/// Token issuer: register with the guardian, take its provisioning
/// package, get vetted and initialize
pub(crate) async fn build_token_issuer(env: &CommandEnv, context: &Context) -> Result<String> {
    let save_file = env.create_contract(ObjectType::TokenIssuer, context).await?;
    let platform = env.platform();

    let contract_id = platform.contract_id(&save_file).await?;
    let ledger_key = platform.ledger_key().await?;
    let ledger_attestation = platform.ledger_attestation(&contract_id).await?;

    let contract_metadata: ContractMetadata = decode(
        env.invoke(ObjectType::TokenIssuer, context, "get_contract_metadata", params! {})
            .await?,
        "contract metadata",
    )?;
    let code_metadata: CodeMetadata = decode(
        env.invoke(ObjectType::TokenIssuer, context, "get_contract_code_metadata", params! {})
            .await?,
        "code metadata",
    )?;

    let guardian = env.guardian(&context.get_context("guardian_context")?)?;
    guardian
        .add_endpoint(&AddEndpointRequest {
            contract_id: contract_id.clone(),
            ledger_attestation,
            contract_metadata: contract_metadata.clone(),
            contract_code_metadata: code_metadata,
        })
        .await?;
    let provisioning_package = guardian.provision_token_issuer(&contract_id).await?;

    let vetting = context.get_context("vetting_context")?;
    approve(env, ObjectType::Vetting, &vetting, &contract_metadata.verifying_key).await?;
    let authority = authority_for(env, ObjectType::Vetting, &vetting, &contract_metadata.verifying_key).await?;

    let token_object = context.get_context("token_object_context")?;
    let token_object_code = platform
        .contract_code(ObjectType::TokenObject.class_name(), &token_object.require_str("source")?)
        .await?;

    let count = context.get_as::<i64>("count")?.unwrap_or(0);
    env.invoke(
        ObjectType::TokenIssuer,
        context,
        "initialize",
        params! {
            "token_description" => context.require_str("description")?,
            "token_metadata" => context.get_json("token_metadata")?.unwrap_or_else(|| Value::Object(Default::default())),
            "maximum_token_count" => count,
            "ledger_verifying_key" => ledger_key,
            "initialization_package" => provisioning_package,
            "asset_authority_chain" => authority,
            "token_object_code_hash" => token_object_code.code_hash(),
        },
    )
    .await?;
    env.checkpoint()?;

    info!(save_file = %save_file, contract_id = %contract_id, "Created token issuer");
    Ok(save_file)
}

pub(crate) async fn build_token_object(env: &CommandEnv, context: &Context) -> Result<String> {
    let token_issuer = context.get_context("token_issuer_context")?;
    let guardian = context.get_context("data_guardian_context")?;

    let save_file = mint_one(env, context, &token_issuer, &guardian).await?;
    context.set("save_file", save_file.as_str())?;
    env.checkpoint()?;
    Ok(save_file)
}

/// Mint token objects until the issuer's `count` is reached.
///
/// Each minted object is recorded as `token_<n>` below the token object
/// context and in `token_save_file_list`, and the context is checkpointed
/// after every token, so a rerun picks up where a failed one stopped.
pub async fn mint_tokens(env: &CommandEnv, context: &Context) -> Result<Vec<String>> {
    let token_issuer = context.get_context("token_issuer_context")?;
    require_same_identity(context, &token_issuer, "token issuer")?;
    let guardian = context.get_context("data_guardian_context")?;
    require_same_identity(context, &guardian, "data guardian")?;

    let count = token_issuer.get_as::<i64>("count")?.unwrap_or(0);
    if count <= 0 {
        return Err(GuardianError::Validation(
            "invalid configuration, missing token count".into(),
        ));
    }

    ensure_created(env, ObjectType::TokenIssuer, &token_issuer).await?;
    ensure_created(env, ObjectType::Guardian, &guardian).await?;

    let mut minted: Vec<String> = context.get_as("token_save_file_list")?.unwrap_or_default();

    // a token object created from the template counts as the first token
    if let Some(created) = context.get_str("save_file")? {
        if !minted.contains(&created) {
            record_token(env, context, &mut minted, created)?;
        }
    }

    while (minted.len() as i64) < count {
        let save_file = mint_one(env, context, &token_issuer, &guardian).await?;
        record_token(env, context, &mut minted, save_file)?;
    }

    Ok(minted)
}

/// Append `save_file` as `token_<n>` and checkpoint
fn record_token(env: &CommandEnv, context: &Context, minted: &mut Vec<String>, save_file: String) -> Result<()> {
    minted.push(save_file);
    let index = minted.len();
    let save_file = &minted[index - 1];

    context.set(&format!("token_{}", index), toml::Value::Table(token_entry(save_file)))?;
    context.set(
        "token_save_file_list",
        toml::Value::Array(minted.iter().map(|s| toml::Value::from(s.as_str())).collect()),
    )?;
    env.checkpoint()?;

    info!(index, save_file = %save_file, "Recorded token object");
    Ok(())
}

/// Context entry for a minted token, sharing its template's settings
fn token_entry(save_file: &str) -> toml::Table {
    let mut entry = toml::Table::new();
    entry.insert("module".into(), "${..module}".into());
    entry.insert("identity".into(), "${..identity}".into());
    entry.insert("source".into(), "${..source}".into());
    entry.insert("token_issuer_context".into(), "@{..token_issuer_context}".into());
    entry.insert("data_guardian_context".into(), "@{..data_guardian_context}".into());
    entry.insert("save_file".into(), save_file.into());
    entry
}

async fn mint_one(
    env: &CommandEnv,
    template: &Context,
    token_issuer: &Context,
    guardian_context: &Context,
) -> Result<String> {
    let platform = env.platform();
    let ledger_key = platform.ledger_key().await?;

    let request = CreateRequest::from_context(template, ObjectType::TokenObject.class_name())?;
    let save_file = platform.create_contract(request).await?;
    let contract_id = platform.contract_id(&save_file).await?;
    let ledger_attestation = platform.ledger_attestation(&contract_id).await?;

    let metadata: ContractMetadata = decode(
        env.invoke_on(ObjectType::TokenObject, &save_file, "get_contract_metadata", params! {})
            .await?,
        "contract metadata",
    )?;
    let code_metadata = env
        .invoke_on(ObjectType::TokenObject, &save_file, "get_contract_code_metadata", params! {})
        .await?;

    let issuer_save_file = require_save_file(token_issuer, ObjectType::TokenIssuer)?;
    env.invoke(
        ObjectType::TokenIssuer,
        token_issuer,
        "add_endpoint",
        params! {
            "contract_id" => contract_id,
            "ledger_attestation" => ledger_attestation,
            "contract_metadata" => metadata,
            "contract_code_metadata" => code_metadata,
        },
    )
    .await?;
    env.invoke(
        ObjectType::TokenIssuer,
        token_issuer,
        "mint_token_object",
        params! { "contract_id" => contract_id },
    )
    .await?;

    // the issuer's package is bound to its freshly committed state
    let issuer_id = platform.contract_id(&issuer_save_file).await?;
    let signature = platform.current_state_attestation(&issuer_id).await?;
    let guardian_package: SecretEnvelope = decode(
        env.invoke(
            ObjectType::TokenIssuer,
            token_issuer,
            "provision_token_object",
            params! { "ledger_signature" => signature, "contract_id" => contract_id },
        )
        .await?,
        "guardian provisioning package",
    )?;

    // token objects are issuers in their own right so they can be exchanged
    approve(env, ObjectType::TokenIssuer, token_issuer, &metadata.verifying_key).await?;
    let authority = authority_for(env, ObjectType::TokenIssuer, token_issuer, &metadata.verifying_key).await?;

    let token_package = env
        .guardian(guardian_context)?
        .provision_token_object(&guardian_package)
        .await?;

    env.invoke_on(
        ObjectType::TokenObject,
        &save_file,
        "initialize",
        params! {
            "ledger_verifying_key" => ledger_key,
            "initialization_package" => token_package,
            "asset_authority_chain" => authority,
        },
    )
    .await?;

    Ok(save_file)
}

/// Have the token object produce an echo capability and relay it through
/// its guardian
pub async fn echo(env: &CommandEnv, context: &Context, message: &str) -> Result<Value> {
    require_save_file(context, ObjectType::TokenObject)?;
    let guardian_context = context.get_context("data_guardian_context")?;
    require_same_identity(context, &guardian_context, "data guardian")?;
    require_save_file(&guardian_context, ObjectType::Guardian)?;

    let capability = env
        .invoke(ObjectType::TokenObject, context, "echo", params! { "message" => message })
        .await?;

    let result = env.guardian(&guardian_context)?.process_capability(&capability).await?;
    info!(context = %context.path(), result = %result, "Echo capability returned");
    Ok(result)
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| GuardianError::Platform(format!("unexpected {} from contract: {}", what, e)))
}
