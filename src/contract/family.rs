//! Contract families.
//!
//! A family is a static list of context templates plus the contract object
//! types it creates. The exchange family is the only built-in one.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::operation::{OperationSpec, OperationTable};

#[derive(Debug, Clone, Copy)]
pub struct ContractFamily {
    pub name: &'static str,
    /// `(template key, template TOML)` pairs
    pub templates: &'static [(&'static str, &'static str)],
}

/// Every built-in family, in registration order
pub fn families() -> &'static [ContractFamily] {
    &FAMILIES
}

static FAMILIES: [ContractFamily; 1] = [EXCHANGE_FAMILY];

pub const EXCHANGE_FAMILY: ContractFamily = ContractFamily {
    name: "exchange",
    templates: &[
        ("asset_type", ASSET_TYPE_TEMPLATE),
        ("vetting", VETTING_TEMPLATE),
        ("issuer", ISSUER_TEMPLATE),
        ("guardian", GUARDIAN_TEMPLATE),
        ("token_issuer", TOKEN_ISSUER_TEMPLATE),
        ("token_object", TOKEN_OBJECT_TEMPLATE),
        ("exchange", ORDER_TEMPLATE),
    ],
};

// =============================================================================
// Templates
// =============================================================================

const ASSET_TYPE_TEMPLATE: &str = r#"
module = "exchange.asset_type"
identity = "${..identity}"
source = "${ContractFamily.Exchange.asset_type.source}"
name = "asset_type"
description = "asset type"
link = "http://"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"
"#;

const VETTING_TEMPLATE: &str = r#"
module = "exchange.vetting"
identity = "${..identity}"
source = "${ContractFamily.Exchange.vetting.source}"
asset_type_context = "@{..asset_type}"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"
"#;

const ISSUER_TEMPLATE: &str = r#"
module = "exchange.issuer"
identity = "${..identity}"
source = "${ContractFamily.Exchange.issuer.source}"
asset_type_context = "@{..asset_type}"
vetting_context = "@{..vetting}"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"
"#;

const GUARDIAN_TEMPLATE: &str = r#"
module = "exchange.guardian"
identity = "${..token_issuer.identity}"
source = "${ContractFamily.Exchange.guardian.source}"
token_issuer_context = "@{..token_issuer}"
url = "http://localhost:7900"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"
"#;

const TOKEN_ISSUER_TEMPLATE: &str = r#"
module = "exchange.token_issuer"
identity = "${..identity}"
source = "${ContractFamily.Exchange.token_issuer.source}"
token_object_context = "@{..token_object}"
vetting_context = "@{..vetting}"
guardian_context = "@{..guardian}"
description = "issuer for token"
count = 10
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"

[token_metadata]
opaque = ""
"#;

const TOKEN_OBJECT_TEMPLATE: &str = r#"
module = "exchange.token_object"
identity = "${..token_issuer.identity}"
source = "${ContractFamily.Exchange.token_object.source}"
token_issuer_context = "@{..token_issuer}"
data_guardian_context = "@{..guardian}"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"
"#;

const ORDER_TEMPLATE: &str = r#"
module = "exchange.order"
identity = "${..identity}"
source = "${ContractFamily.Exchange.exchange.source}"
eservice_group = "${..eservice_group}"
pservice_group = "${..pservice_group}"
sservice_group = "${..sservice_group}"

[offer]
issuer_context = "@{...offer.issuer}"
count = 1

[request]
issuer_context = "@{...request.issuer}"
count = 1
"#;

// =============================================================================
// Object types
// =============================================================================

/// Kinds of contract object the command layer creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    AssetType,
    Vetting,
    Issuer,
    Guardian,
    TokenIssuer,
    TokenObject,
    Order,
}

impl ObjectType {
    pub const ALL: [ObjectType; 7] = [
        ObjectType::AssetType,
        ObjectType::Vetting,
        ObjectType::Issuer,
        ObjectType::Guardian,
        ObjectType::TokenIssuer,
        ObjectType::TokenObject,
        ObjectType::Order,
    ];

    /// Template key, also the conventional context key below a prefix
    pub fn template_key(self) -> &'static str {
        match self {
            ObjectType::AssetType => "asset_type",
            ObjectType::Vetting => "vetting",
            ObjectType::Issuer => "issuer",
            ObjectType::Guardian => "guardian",
            ObjectType::TokenIssuer => "token_issuer",
            ObjectType::TokenObject => "token_object",
            ObjectType::Order => "exchange",
        }
    }

    /// Contract class passed to the platform on creation
    pub fn class_name(self) -> &'static str {
        match self {
            ObjectType::AssetType => "asset_type",
            ObjectType::Vetting => "vetting",
            ObjectType::Issuer => "issuer_contract",
            ObjectType::Guardian => "guardian",
            ObjectType::TokenIssuer => "token_issuer",
            ObjectType::TokenObject => "token_object",
            ObjectType::Order => "exchange_contract",
        }
    }

    /// Parse a template key; `order` is accepted for exchange orders
    pub fn parse(name: &str) -> Option<Self> {
        if name == "order" {
            return Some(ObjectType::Order);
        }
        Self::ALL.into_iter().find(|t| t.template_key() == name)
    }

    /// Operations the object's contract accepts: the shared base set
    /// composed with the family entries
    pub fn operations(self) -> OperationTable {
        let family: &[OperationSpec] = match self {
            ObjectType::AssetType => ASSET_TYPE_OPERATIONS,
            ObjectType::Vetting => VETTING_OPERATIONS,
            ObjectType::Issuer => ISSUER_OPERATIONS,
            ObjectType::Guardian => GUARDIAN_OPERATIONS,
            ObjectType::TokenIssuer => TOKEN_ISSUER_OPERATIONS,
            ObjectType::TokenObject => TOKEN_OBJECT_OPERATIONS,
            ObjectType::Order => ORDER_OPERATIONS,
        };
        OperationTable::base().with(family)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_key())
    }
}

// =============================================================================
// Operation tables
// =============================================================================

const ASSET_TYPE_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update("initialize", &["name", "description", "link"]),
    OperationSpec::query("get_asset_type_identifier", &[]),
];

const VETTING_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update("initialize", &["asset_type_identifier"]),
    OperationSpec::new("approve_issuer", "add_approved_issuer", &["issuer_verifying_key"], true),
    OperationSpec::query("get_issuer_authority", &["issuer_verifying_key"]),
    OperationSpec::query("get_asset_type_identifier", &[]),
];

const ISSUER_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update("initialize", &["asset_authority_chain"]),
    OperationSpec::query("get_authority", &[]),
    OperationSpec::query("get_balance", &[]),
    OperationSpec::query("get_entry", &[]),
    OperationSpec::query("get_asset_type_identifier", &[]),
    OperationSpec::update("issue", &["owner_identity", "count"]),
    OperationSpec::update("transfer", &["new_owner_identity", "count"]),
    OperationSpec::update("escrow", &["escrow_agent_identity", "count"]),
    OperationSpec::query("escrow_attestation", &["escrow_agent_identity"]),
    OperationSpec::update("release", &["release_request"]),
    OperationSpec::update("claim", &["claim_request"]),
];

const GUARDIAN_OPERATIONS: &[OperationSpec] = &[OperationSpec::update(
    "initialize",
    &["ledger_verifying_key", "token_issuer_code_hash"],
)];

const TOKEN_ISSUER_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update(
        "initialize",
        &[
            "token_description",
            "token_metadata",
            "maximum_token_count",
            "ledger_verifying_key",
            "initialization_package",
            "asset_authority_chain",
            "token_object_code_hash",
        ],
    ),
    OperationSpec::update(
        "add_endpoint",
        &["contract_id", "ledger_attestation", "contract_metadata", "contract_code_metadata"],
    ),
    OperationSpec::update("mint_token_object", &["contract_id"]),
    OperationSpec::new(
        "provision_token_object",
        "provision_minted_token_object",
        &["ledger_signature", "contract_id"],
        false,
    ),
    OperationSpec::new("approve_issuer", "add_approved_issuer", &["issuer_verifying_key"], true),
    OperationSpec::query("get_issuer_authority", &["issuer_verifying_key"]),
];

const TOKEN_OBJECT_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update(
        "initialize",
        &["ledger_verifying_key", "initialization_package", "asset_authority_chain"],
    ),
    OperationSpec::query("echo", &["message"]),
];

const ORDER_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::update("initialize", &["asset_request", "offered_authoritative_asset"]),
    OperationSpec::update("cancel_exchange", &[]),
    OperationSpec::query("cancel_exchange_attestation", &[]),
    OperationSpec::query("examine_offered_asset", &[]),
    OperationSpec::query("examine_requested_asset", &[]),
    OperationSpec::update("exchange_asset", &["exchanged_authoritative_asset"]),
    OperationSpec::update("claim_offered_asset", &[]),
    OperationSpec::update("claim_exchanged_asset", &[]),
];
