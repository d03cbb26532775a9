//! Asset type, vetting organization and issuer commands

use serde_json::Value;
use tracing::info;

use super::{ensure_created, find_public_key, positive_count, require_save_file, CommandEnv};
use crate::context::Context;
use crate::contract::ObjectType;
use crate::params;
use crate::types::{GuardianError, Result};

pub async fn create_asset_type(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::AssetType, context).await
}

pub async fn create_vetting(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::Vetting, context).await
}

pub async fn create_issuer(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::Issuer, context).await
}

/// Vetting organization approves an issuer's verifying key
pub async fn approve_issuer(env: &CommandEnv, vetting: &Context, issuer_verifying_key: &str) -> Result<()> {
    ensure_created(env, ObjectType::Vetting, vetting).await?;
    approve(env, ObjectType::Vetting, vetting, issuer_verifying_key).await
}

pub(crate) async fn build_asset_type(env: &CommandEnv, context: &Context) -> Result<String> {
    let save_file = env.create_contract(ObjectType::AssetType, context).await?;

    env.invoke(
        ObjectType::AssetType,
        context,
        "initialize",
        params! {
            "name" => context.require_str("name")?,
            "description" => context.require_str("description")?,
            "link" => context.require_str("link")?,
        },
    )
    .await?;

    info!(save_file = %save_file, "Created asset type");
    Ok(save_file)
}

pub(crate) async fn build_vetting(env: &CommandEnv, context: &Context) -> Result<String> {
    let asset_type = context.get_context("asset_type_context")?;
    let asset_type_id = env
        .invoke(ObjectType::AssetType, &asset_type, "get_asset_type_identifier", params! {})
        .await?;

    let save_file = env.create_contract(ObjectType::Vetting, context).await?;
    env.invoke(
        ObjectType::Vetting,
        context,
        "initialize",
        params! { "asset_type_identifier" => asset_type_id },
    )
    .await?;

    info!(save_file = %save_file, "Created vetting organization");
    Ok(save_file)
}

/// Create the issuer, have the vetting organization approve its key and
/// initialize it with the resulting authority
pub(crate) async fn build_issuer(env: &CommandEnv, context: &Context) -> Result<String> {
    let save_file = env.create_contract(ObjectType::Issuer, context).await?;

    let verifying_key = env
        .invoke(ObjectType::Issuer, context, "get_verifying_key", params! {})
        .await?;
    let verifying_key = expect_str(verifying_key, "issuer verifying key")?;
    context.set("verifying_key", verifying_key.as_str())?;

    let vetting = context.get_context("vetting_context")?;
    approve(env, ObjectType::Vetting, &vetting, &verifying_key).await?;
    let authority = authority_for(env, ObjectType::Vetting, &vetting, &verifying_key).await?;

    env.invoke(
        ObjectType::Issuer,
        context,
        "initialize",
        params! { "asset_authority_chain" => authority },
    )
    .await?;
    env.checkpoint()?;

    info!(save_file = %save_file, "Created issuer");
    Ok(save_file)
}

/// Issue `count` assets to the owner named by `owner`
pub async fn issue_assets(env: &CommandEnv, issuer: &Context, owner: &str, count: i64) -> Result<()> {
    let count = positive_count(count, "issue count")?;
    let owner_key = find_public_key(env.state(), owner)?;

    env.invoke(
        ObjectType::Issuer,
        issuer,
        "issue",
        params! { "owner_identity" => owner_key, "count" => count },
    )
    .await?;

    info!(owner, count, "Issued assets");
    Ok(())
}

pub async fn get_balance(env: &CommandEnv, issuer: &Context) -> Result<Value> {
    require_save_file(issuer, ObjectType::Issuer)?;
    let balance = env
        .invoke(ObjectType::Issuer, issuer, "get_balance", params! {})
        .await?;
    info!(context = %issuer.path(), balance = %balance, "Current balance");
    Ok(balance)
}

pub async fn transfer_assets(env: &CommandEnv, issuer: &Context, new_owner: &str, count: i64) -> Result<()> {
    let count = positive_count(count, "transfer count")?;
    let new_owner_key = find_public_key(env.state(), new_owner)?;

    env.invoke(
        ObjectType::Issuer,
        issuer,
        "transfer",
        params! { "new_owner_identity" => new_owner_key, "count" => count },
    )
    .await?;

    info!(new_owner, count, "Transferred assets");
    Ok(())
}

// =============================================================================
// Shared with the token family, whose token issuer also vets issuers
// =============================================================================

pub(crate) async fn approve(
    env: &CommandEnv,
    object_type: ObjectType,
    vetting: &Context,
    issuer_verifying_key: &str,
) -> Result<()> {
    env.invoke(
        object_type,
        vetting,
        "approve_issuer",
        params! { "issuer_verifying_key" => issuer_verifying_key },
    )
    .await?;
    Ok(())
}

pub(crate) async fn authority_for(
    env: &CommandEnv,
    object_type: ObjectType,
    vetting: &Context,
    issuer_verifying_key: &str,
) -> Result<Value> {
    env.invoke(
        object_type,
        vetting,
        "get_issuer_authority",
        params! { "issuer_verifying_key" => issuer_verifying_key },
    )
    .await
}

pub(crate) fn expect_str(value: Value, what: &str) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(GuardianError::Platform(format!("{} is not a string: {}", what, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::asset_env;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_issuer_flow() {
        let (env, platform, context) = asset_env();
        platform.respond("get_asset_type_identifier", |_, _| Ok(json!("gold-type")));
        platform.respond("get_issuer_authority", |_, req| {
            Ok(json!({ "approved": req.str_param("issuer_verifying_key")? }))
        });

        let issuer = context.get_context("issuer").unwrap();
        create_issuer(&env, &issuer).await.unwrap();

        let verifying_key = issuer.require_str("verifying_key").unwrap();
        let vetting_init = platform.calls_to("initialize");
        // asset type, vetting, issuer
        assert_eq!(vetting_init.len(), 3);
        assert_eq!(vetting_init[1].request.keyword["asset_type_identifier"], "gold-type");
        assert_eq!(
            vetting_init[2].request.keyword["asset_authority_chain"]["approved"],
            verifying_key.as_str()
        );

        let approvals = platform.calls_to("add_approved_issuer");
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].class_name, "vetting");
    }

    #[tokio::test]
    async fn test_approve_issuer_creates_vetting_first() {
        let (env, platform, context) = asset_env();
        let vetting = context.get_context("vetting").unwrap();
        approve_issuer(&env, &vetting, "issuer-vk").await.unwrap();
        assert_eq!(platform.created("asset_type"), 1);
        assert_eq!(platform.created("vetting"), 1);
        assert_eq!(platform.calls_to("add_approved_issuer").len(), 1);
    }

    #[tokio::test]
    async fn test_issue_requires_created_issuer() {
        let (env, _platform, context) = asset_env();
        let issuer = context.get_context("issuer").unwrap();
        let result = get_balance(&env, &issuer).await;
        assert!(matches!(result, Err(GuardianError::Validation(_))));
        assert!(issue_assets(&env, &issuer, "bob", 0).await.is_err());
    }

    #[test]
    fn test_expect_str() {
        assert_eq!(expect_str(json!("vk"), "key").unwrap(), "vk");
        assert!(expect_str(json!(1), "key").is_err());
    }
}
