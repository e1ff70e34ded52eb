//! JSON-in, JSON-out entry points for the host RPC layer.
//!
//! Every call is identified by name and carries a flat JSON object. The caller
//! identity has already been resolved upstream.

use crate::Registry;
use crate::engine::ConsumeRequest;
use crate::error::{AppResult, DomainError, ErrorCode};
use crate::models::inventory::{Inventory, ItemProperties};
use crate::models::types::{ItemKey, PlayerId};
use crate::services::parse_instance_keys;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

pub const RPC_LIST: &str = "inventory_list";
pub const RPC_LIST_OWNED: &str = "inventory_list_owned";
pub const RPC_GRANT: &str = "inventory_grant";
pub const RPC_CONSUME: &str = "inventory_consume";
pub const RPC_UPDATE_PROPERTIES: &str = "inventory_update_properties";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListRequest {
    /// Empty means every category
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub items: HashMap<ItemKey, i64>,
    #[serde(default)]
    pub full_inventory: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConsumeItemsRequest {
    pub items: HashMap<ItemKey, i64>,
    /// Keyed by instance id
    pub instances: HashMap<String, i64>,
    pub overconsume: bool,
    pub full_inventory: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePropertiesRequest {
    /// Keyed by instance id
    pub instances: HashMap<String, ItemProperties>,
    #[serde(default)]
    pub full_inventory: bool,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub items: Inventory,
}

/// Error returned to the host, serialized as a flat JSON object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub grpc_code: u32,
    pub message: String,
    pub details: Value,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            grpc_code: code.grpc_code(),
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"code":"{}"}}"#, self.code))
    }
}

impl From<DomainError> for RpcError {
    fn from(e: DomainError) -> Self {
        let code = e.code();
        // internals stay in the log
        let message = if code == ErrorCode::Internal {
            tracing::error!(error = %e, "rpc failed with internal error");
            "internal error".to_string()
        } else {
            e.to_string()
        };

        Self {
            code,
            grpc_code: code.grpc_code(),
            message,
            details: e.details(),
        }
    }
}

/// Run the named RPC for a player and return the JSON response body
pub async fn dispatch(registry: &Registry, player_id: PlayerId, name: &str, payload: &str) -> Result<String, RpcError> {
    tracing::debug!(rpc = name, player = %player_id, "rpc call");

    let out = match name {
        RPC_LIST => list(registry, payload),
        RPC_LIST_OWNED => list_owned(registry, player_id, payload).await,
        RPC_GRANT => grant(registry, player_id, payload).await,
        RPC_CONSUME => consume(registry, player_id, payload).await,
        RPC_UPDATE_PROPERTIES => update_properties(registry, player_id, payload).await,
        _ => return Err(RpcError::new(ErrorCode::NotFound, format!("unknown rpc: {name}"))),
    };

    Ok(out?)
}

fn list(registry: &Registry, payload: &str) -> AppResult<String> {
    let req: ListRequest = parse(payload)?;
    let items = registry.inventory().list_catalog(&req.category);
    to_json(&InventoryResponse { items })
}

async fn list_owned(registry: &Registry, player_id: PlayerId, payload: &str) -> AppResult<String> {
    let req: ListRequest = parse(payload)?;
    let items = registry.inventory().list_owned(player_id, &req.category).await?;
    to_json(&InventoryResponse { items })
}

async fn grant(registry: &Registry, player_id: PlayerId, payload: &str) -> AppResult<String> {
    let req: GrantRequest = parse(payload)?;
    let out = registry.inventory().grant(player_id, &req.items, req.full_inventory).await?;
    to_json(&out)
}

async fn consume(registry: &Registry, player_id: PlayerId, payload: &str) -> AppResult<String> {
    let req: ConsumeItemsRequest = parse(payload)?;
    let request = ConsumeRequest {
        items: req.items,
        instances: parse_instance_keys("instances", &req.instances)?,
        overconsume: req.overconsume,
    };
    let out = registry.inventory().consume(player_id, &request, req.full_inventory).await?;
    to_json(&out)
}

async fn update_properties(registry: &Registry, player_id: PlayerId, payload: &str) -> AppResult<String> {
    let req: UpdatePropertiesRequest = parse(payload)?;
    let items = registry
        .inventory()
        .update_properties(player_id, &req.instances, req.full_inventory)
        .await?;
    to_json(&InventoryResponse { items })
}

/// An empty payload is read as `{}`
fn parse<T: DeserializeOwned>(payload: &str) -> AppResult<T> {
    let payload = payload.trim();
    let payload = if payload.is_empty() { "{}" } else { payload };
    Ok(serde_json::from_str(payload)?)
}

fn to_json<T: Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|e| DomainError::InternalError(format!("response encoding: {e}")))
}
