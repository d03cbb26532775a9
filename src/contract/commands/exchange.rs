//! Exchange order commands.
//!
//! An order escrows `offer.count` assets of the offer issuer with the order
//! contract and asks for `request.count` assets of the request issuer in
//! return. Both issuers belong to their owners and are never created here.

use serde_json::{json, Value};
use tracing::{error, info};

use super::asset::expect_str;
use super::{ensure_created, find_public_key, positive_count, require_save_file, CommandEnv};
use crate::context::Context;
use crate::contract::ObjectType;
use crate::params;
use crate::types::Result;

pub async fn create_order(env: &CommandEnv, context: &Context) -> Result<String> {
    ensure_created(env, ObjectType::Order, context).await
}

pub(crate) async fn build_order(env: &CommandEnv, context: &Context) -> Result<String> {
    let offer_issuer = context.get_context("offer.issuer_context")?;
    let request_issuer = context.get_context("request.issuer_context")?;
    require_save_file(&offer_issuer, ObjectType::Issuer)?;
    require_save_file(&request_issuer, ObjectType::Issuer)?;

    let offer_count = positive_count(context.get_as::<i64>("offer.count")?.unwrap_or(1), "offer count")?;
    let request_count = positive_count(context.get_as::<i64>("request.count")?.unwrap_or(1), "request count")?;

    let request_issuer_key = expect_str(
        env.invoke(ObjectType::Issuer, &request_issuer, "get_verifying_key", params! {})
            .await?,
        "request issuer verifying key",
    )?;
    let asset_type_identifier = env
        .invoke(ObjectType::Issuer, &request_issuer, "get_asset_type_identifier", params! {})
        .await?;
    let owner_identity = requested_owner(env, context)?;

    let save_file = env.create_contract(ObjectType::Order, context).await?;
    let order_key = expect_str(
        env.invoke(ObjectType::Order, context, "get_verifying_key", params! {})
            .await?,
        "order verifying key",
    )?;

    let offered = escrow(env, &offer_issuer, &order_key, offer_count).await?;

    let initialized = env
        .invoke(
            ObjectType::Order,
            context,
            "initialize",
            params! {
                "asset_request" => json!({
                    "issuer_verifying_key": request_issuer_key,
                    "asset_type_identifier": asset_type_identifier,
                    "count": request_count,
                    "owner_identity": owner_identity,
                }),
                "offered_authoritative_asset" => offered,
            },
        )
        .await;
    if let Err(e) = initialized {
        // escrowed assets stay with the order until cancelled
        error!(save_file = %save_file, error = %e, "Failed to initialize exchange order");
        return Err(e);
    }
    env.checkpoint()?;

    info!(save_file = %save_file, offer_count, request_count, "Created exchange order");
    Ok(save_file)
}

/// Owner the requested assets must belong to, if the order names one
fn requested_owner(env: &CommandEnv, context: &Context) -> Result<String> {
    if let Some(key) = context.get_str("request.user_verifying_key")? {
        return Ok(key);
    }
    match context.get_str("request.user_identity")? {
        Some(identity) => find_public_key(env.state(), &identity),
        None => Ok(String::new()),
    }
}

/// Escrow `count` assets with `agent` and return the issuer's attestation
async fn escrow(env: &CommandEnv, issuer: &Context, agent: &str, count: i64) -> Result<Value> {
    env.invoke(
        ObjectType::Issuer,
        issuer,
        "escrow",
        params! { "escrow_agent_identity" => agent, "count" => count },
    )
    .await?;
    env.invoke(
        ObjectType::Issuer,
        issuer,
        "escrow_attestation",
        params! { "escrow_agent_identity" => agent },
    )
    .await
}

/// Offered and requested assets of an order
pub async fn examine_order(env: &CommandEnv, context: &Context) -> Result<(Value, Value)> {
    let offered = env
        .invoke(ObjectType::Order, context, "examine_offered_asset", params! {})
        .await?;
    let requested = env
        .invoke(ObjectType::Order, context, "examine_requested_asset", params! {})
        .await?;
    Ok((offered, requested))
}

/// Respond to an order with assets from `payment_issuer`
pub async fn match_order(env: &CommandEnv, context: &Context, payment_issuer: &Context) -> Result<()> {
    require_save_file(payment_issuer, ObjectType::Issuer)?;
    let count = positive_count(context.get_as::<i64>("request.count")?.unwrap_or(1), "request count")?;
    let order_key = expect_str(
        env.invoke(ObjectType::Order, context, "get_verifying_key", params! {})
            .await?,
        "order verifying key",
    )?;

    let payment = escrow(env, payment_issuer, &order_key, count).await?;
    env.invoke(
        ObjectType::Order,
        context,
        "exchange_asset",
        params! { "exchanged_authoritative_asset" => payment },
    )
    .await?;

    info!(order = %context.path(), count, "Matched exchange order");
    Ok(())
}

/// Cancel an open order and release the escrowed offer back to its owner
pub async fn cancel_order(env: &CommandEnv, context: &Context) -> Result<()> {
    env.invoke(ObjectType::Order, context, "cancel_exchange", params! {})
        .await?;
    let release_request = env
        .invoke(ObjectType::Order, context, "cancel_exchange_attestation", params! {})
        .await?;

    let offer_issuer = context.get_context("offer.issuer_context")?;
    env.invoke(
        ObjectType::Issuer,
        &offer_issuer,
        "release",
        params! { "release_request" => release_request },
    )
    .await?;

    info!(order = %context.path(), "Cancelled exchange order");
    Ok(())
}

/// Matching party takes the offered assets
pub async fn claim_offer(env: &CommandEnv, context: &Context) -> Result<()> {
    let claim_request = env
        .invoke(ObjectType::Order, context, "claim_offered_asset", params! {})
        .await?;
    let offer_issuer = context.get_context("offer.issuer_context")?;
    env.invoke(
        ObjectType::Issuer,
        &offer_issuer,
        "claim",
        params! { "claim_request" => claim_request },
    )
    .await?;

    info!(order = %context.path(), "Claimed offered assets");
    Ok(())
}

/// Order creator takes the assets paid in exchange
pub async fn claim_payment(env: &CommandEnv, context: &Context) -> Result<()> {
    let claim_request = env
        .invoke(ObjectType::Order, context, "claim_exchanged_asset", params! {})
        .await?;
    let request_issuer = context.get_context("request.issuer_context")?;
    env.invoke(
        ObjectType::Issuer,
        &request_issuer,
        "claim",
        params! { "claim_request" => claim_request },
    )
    .await?;

    info!(order = %context.path(), "Claimed exchanged assets");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::tests::asset_env;
    use super::*;
    use crate::context::{initialize_context, TemplateRegistry};
    use crate::contract::platform::MemoryPlatform;
    use crate::types::GuardianError;
    use std::sync::Arc;

    /// Gold issuer under `asset.gold`, silver issuer under `asset.silver`
    /// and an order trading one for the other
    async fn order_env() -> (CommandEnv, Arc<MemoryPlatform>, Context) {
        let (env, platform, gold) = asset_env();
        platform.respond("escrow_attestation", |contract, req| {
            Ok(json!({ "issuer": contract.save_file, "agent": req.str_param("escrow_agent_identity")? }))
        });
        platform.respond("cancel_exchange_attestation", |_, _| Ok(json!("release-token")));
        platform.respond("claim_offered_asset", |_, _| Ok(json!("offer-claim")));
        platform.respond("claim_exchanged_asset", |_, _| Ok(json!("payment-claim")));

        let registry = TemplateRegistry::builtin().unwrap();
        let silver = initialize_context(
            env.state(),
            None,
            "asset.silver",
            &registry,
            &["asset_type", "vetting", "issuer"],
            [("identity", toml::Value::from("bob"))],
        )
        .unwrap();

        ensure_created(&env, ObjectType::Issuer, &gold.get_context("issuer").unwrap())
            .await
            .unwrap();
        ensure_created(&env, ObjectType::Issuer, &silver.get_context("issuer").unwrap())
            .await
            .unwrap();

        let state = env.state().clone();
        state
            .merge(
                toml::from_str(
                    r#"
                    [ContractFamily.Exchange.exchange]
                    source = "order.b64"
                    "#,
                )
                .unwrap(),
            )
            .unwrap();
        let order = initialize_context(
            &state,
            None,
            "trade.t1",
            &registry,
            &["exchange"],
            [
                ("identity", toml::Value::from("alice")),
                ("exchange.offer.issuer_context", toml::Value::from("@{asset.gold.issuer}")),
                ("exchange.request.issuer_context", toml::Value::from("@{asset.silver.issuer}")),
                ("exchange.offer.count", toml::Value::from(5i64)),
            ],
        )
        .unwrap();
        (env, platform, order.get_context("exchange").unwrap())
    }

    #[tokio::test]
    async fn test_create_order_escrows_offer() {
        let (env, platform, order) = order_env().await;
        let save_file = create_order(&env, &order).await.unwrap();
        let contract = platform.contract(&save_file).unwrap();

        let escrows = platform.calls_to("escrow");
        assert_eq!(escrows.len(), 1);
        assert_eq!(escrows[0].request.keyword["count"], 5);
        assert_eq!(
            escrows[0].request.keyword["escrow_agent_identity"],
            contract.keys.verifying_key().as_str()
        );

        let init = contract.get("initialize").unwrap();
        assert_eq!(init["asset_request"]["count"], 1);
        assert_eq!(init["offered_authoritative_asset"]["agent"], contract.keys.verifying_key().as_str());

        // second create is a no-op
        create_order(&env, &order).await.unwrap();
        assert_eq!(platform.created("exchange_contract"), 1);
    }

    #[tokio::test]
    async fn test_order_requires_existing_issuers() {
        let (env, _platform, _gold) = asset_env();
        let registry = TemplateRegistry::builtin().unwrap();
        let order = initialize_context(
            env.state(),
            None,
            "trade.t2",
            &registry,
            &["exchange"],
            [
                ("identity", toml::Value::from("alice")),
                ("exchange.offer.issuer_context", toml::Value::from("@{asset.gold.issuer}")),
                ("exchange.request.issuer_context", toml::Value::from("@{asset.gold.issuer}")),
            ],
        )
        .unwrap();

        let result = create_order(&env, &order.get_context("exchange").unwrap()).await;
        assert!(matches!(result, Err(GuardianError::Validation(ref msg)) if msg.contains("has not been created")));
    }

    #[tokio::test]
    async fn test_match_and_claim() {
        let (env, platform, order) = order_env().await;
        create_order(&env, &order).await.unwrap();

        let silver = order.get_context("request.issuer_context").unwrap();
        match_order(&env, &order, &silver).await.unwrap();
        let exchanged = platform.calls_to("exchange_asset");
        assert_eq!(exchanged.len(), 1);
        assert_eq!(
            exchanged[0].request.keyword["exchanged_authoritative_asset"]["issuer"],
            silver.require_str("save_file").unwrap().as_str()
        );

        claim_offer(&env, &order).await.unwrap();
        claim_payment(&env, &order).await.unwrap();
        let claims = platform.calls_to("claim");
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].request.keyword["claim_request"], "offer-claim");
        assert_eq!(claims[1].save_file, silver.require_str("save_file").unwrap());
    }

    #[tokio::test]
    async fn test_cancel_releases_offer() {
        let (env, platform, order) = order_env().await;
        create_order(&env, &order).await.unwrap();
        cancel_order(&env, &order).await.unwrap();

        let releases = platform.calls_to("release");
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].request.keyword["release_request"], "release-token");
        assert_eq!(
            releases[0].save_file,
            order.get_context("offer.issuer_context").unwrap().require_str("save_file").unwrap()
        );
    }

    #[tokio::test]
    async fn test_examine_order() {
        let (env, platform, order) = order_env().await;
        platform.respond("examine_offered_asset", |_, _| Ok(json!({ "count": 5 })));
        platform.respond("examine_requested_asset", |_, _| Ok(json!({ "count": 1 })));
        create_order(&env, &order).await.unwrap();

        let (offered, requested) = examine_order(&env, &order).await.unwrap();
        assert_eq!(offered["count"], 5);
        assert_eq!(requested["count"], 1);
    }
}
