//! # Asset Registry
//!
//! Tracks unique ownership of identified assets (deeds, titles, and
//! anything else that exists exactly once). Transfers follow an
//! approve-then-pull model: the owner designates an operator for a
//! specific asset, and that operator may then move the asset on the
//! owner's behalf. The escrow ledger relies on this to take custody of
//! a listed asset without the seller handing it over manually.
//!
//! The [`AssetRegistry`] trait is the seam the escrow ledger depends on;
//! [`DeedRegistry`] is the in-memory implementation used by the node and
//! the test harness.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

/// Unique identifier for a registered asset. Ids are positive and
/// assigned sequentially starting at 1.
pub type AssetId = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The referenced asset id has never been minted.
    #[error("unknown asset: {0}")]
    UnknownAsset(AssetId),

    /// The `from` account of a transfer is not the current owner.
    #[error("not owner: asset {asset_id} is owned by {owner}, not {claimed}")]
    NotOwner {
        /// The asset being transferred.
        asset_id: AssetId,
        /// The actual current owner.
        owner: AccountId,
        /// The account the caller claimed owns the asset.
        claimed: AccountId,
    },

    /// The operator attempting a pull transfer has no approval for this
    /// asset.
    #[error("operator {operator} is not approved to transfer asset {asset_id}")]
    NotApproved {
        /// The asset being transferred.
        asset_id: AssetId,
        /// The unapproved operator.
        operator: AccountId,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The registry interface the escrow ledger consumes.
///
/// `transfer_ownership` carries an explicit `operator`: the account on
/// whose authority the transfer happens. An owner may always move its
/// own assets (`operator == from`); anyone else needs a standing
/// approval recorded via [`approve_transfer`](Self::approve_transfer).
pub trait AssetRegistry {
    /// Returns the current owner of an asset, or `None` if the id has
    /// never been minted.
    fn owner_of(&self, asset_id: AssetId) -> Option<AccountId>;

    /// Records `operator` as approved to pull `asset_id` out of the
    /// owner's account. Only the current owner may grant approval.
    /// A later approval replaces an earlier one.
    fn approve_transfer(
        &mut self,
        asset_id: AssetId,
        owner: &AccountId,
        operator: &AccountId,
    ) -> Result<(), RegistryError>;

    /// Moves `asset_id` from `from` to `to` on the authority of
    /// `operator`. Any standing approval is consumed by the transfer.
    fn transfer_ownership(
        &mut self,
        asset_id: AssetId,
        from: &AccountId,
        to: &AccountId,
        operator: &AccountId,
    ) -> Result<(), RegistryError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Ownership record for a single minted asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    /// The asset's unique id.
    pub asset_id: AssetId,
    /// Current owner.
    pub owner: AccountId,
    /// Off-registry metadata pointer (typically an IPFS or HTTPS URI).
    pub uri: String,
    /// Timestamp when the asset was minted.
    pub minted_at: DateTime<Utc>,
    /// Operator currently approved to pull this asset, if any.
    pub approved: Option<AccountId>,
}

/// In-memory asset registry.
///
/// In production this state would live in the host environment's state
/// store; the in-memory representation carries the same rules and is
/// what the node and the tests run against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeedRegistry {
    assets: HashMap<AssetId, AssetRecord>,
    next_id: AssetId,
}

impl DeedRegistry {
    /// Creates an empty registry. The first minted asset gets id 1.
    pub fn new() -> Self {
        Self {
            assets: HashMap::new(),
            next_id: 0,
        }
    }

    /// Mints a new asset owned by `owner` and returns its id.
    pub fn mint(&mut self, owner: AccountId, uri: String) -> AssetId {
        self.next_id += 1;
        let asset_id = self.next_id;
        self.assets.insert(
            asset_id,
            AssetRecord {
                asset_id,
                owner: owner.clone(),
                uri,
                minted_at: Utc::now(),
                approved: None,
            },
        );
        tracing::debug!(asset_id, owner = %owner, "asset minted");
        asset_id
    }

    /// Returns the full record for an asset, or `None` if unminted.
    pub fn record(&self, asset_id: AssetId) -> Option<&AssetRecord> {
        self.assets.get(&asset_id)
    }

    /// Returns the number of minted assets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }
}

impl AssetRegistry for DeedRegistry {
    fn owner_of(&self, asset_id: AssetId) -> Option<AccountId> {
        self.assets.get(&asset_id).map(|r| r.owner.clone())
    }

    fn approve_transfer(
        &mut self,
        asset_id: AssetId,
        owner: &AccountId,
        operator: &AccountId,
    ) -> Result<(), RegistryError> {
        let record = self
            .assets
            .get_mut(&asset_id)
            .ok_or(RegistryError::UnknownAsset(asset_id))?;

        if record.owner != *owner {
            return Err(RegistryError::NotOwner {
                asset_id,
                owner: record.owner.clone(),
                claimed: owner.clone(),
            });
        }

        record.approved = Some(operator.clone());
        Ok(())
    }

    fn transfer_ownership(
        &mut self,
        asset_id: AssetId,
        from: &AccountId,
        to: &AccountId,
        operator: &AccountId,
    ) -> Result<(), RegistryError> {
        let record = self
            .assets
            .get_mut(&asset_id)
            .ok_or(RegistryError::UnknownAsset(asset_id))?;

        if record.owner != *from {
            return Err(RegistryError::NotOwner {
                asset_id,
                owner: record.owner.clone(),
                claimed: from.clone(),
            });
        }

        if operator != from && record.approved.as_ref() != Some(operator) {
            return Err(RegistryError::NotApproved {
                asset_id,
                operator: operator.clone(),
            });
        }

        record.owner = to.clone();
        // Approvals do not survive a change of ownership.
        record.approved = None;

        tracing::debug!(asset_id, from = %from, to = %to, "ownership transferred");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_assigns_sequential_ids_from_one() {
        let mut registry = DeedRegistry::new();
        let a = registry.mint("alice".into(), "ipfs://a".into());
        let b = registry.mint("bob".into(), "ipfs://b".into());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(registry.asset_count(), 2);
    }

    #[test]
    fn owner_of_tracks_minted_owner() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        assert_eq!(registry.owner_of(id), Some("alice".to_string()));
        assert_eq!(registry.owner_of(99), None);
    }

    #[test]
    fn owner_can_transfer_own_asset() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        registry
            .transfer_ownership(id, &"alice".into(), &"bob".into(), &"alice".into())
            .unwrap();
        assert_eq!(registry.owner_of(id), Some("bob".to_string()));
    }

    #[test]
    fn approved_operator_can_pull() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        registry
            .approve_transfer(id, &"alice".into(), &"escrow".into())
            .unwrap();
        registry
            .transfer_ownership(id, &"alice".into(), &"escrow".into(), &"escrow".into())
            .unwrap();
        assert_eq!(registry.owner_of(id), Some("escrow".to_string()));
    }

    #[test]
    fn unapproved_operator_rejected() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        let result =
            registry.transfer_ownership(id, &"alice".into(), &"mallory".into(), &"mallory".into());
        assert!(matches!(result, Err(RegistryError::NotApproved { .. })));
        assert_eq!(registry.owner_of(id), Some("alice".to_string()));
    }

    #[test]
    fn transfer_with_wrong_from_rejected() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        let result = registry.transfer_ownership(id, &"bob".into(), &"carol".into(), &"bob".into());
        assert!(matches!(result, Err(RegistryError::NotOwner { .. })));
    }

    #[test]
    fn approval_consumed_by_transfer() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        registry
            .approve_transfer(id, &"alice".into(), &"escrow".into())
            .unwrap();
        registry
            .transfer_ownership(id, &"alice".into(), &"escrow".into(), &"escrow".into())
            .unwrap();

        // The old approval must not let the operator pull again.
        let result =
            registry.transfer_ownership(id, &"escrow".into(), &"mallory".into(), &"mallory".into());
        assert!(matches!(result, Err(RegistryError::NotApproved { .. })));
    }

    #[test]
    fn only_owner_may_approve() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());
        let result = registry.approve_transfer(id, &"bob".into(), &"escrow".into());
        assert!(matches!(result, Err(RegistryError::NotOwner { .. })));
    }

    #[test]
    fn unknown_asset_rejected() {
        let mut registry = DeedRegistry::new();
        let result = registry.approve_transfer(7, &"alice".into(), &"escrow".into());
        assert!(matches!(result, Err(RegistryError::UnknownAsset(7))));
    }

    #[test]
    fn registry_serialization_roundtrip() {
        let mut registry = DeedRegistry::new();
        let id = registry.mint("alice".into(), "ipfs://a".into());

        let json = serde_json::to_string(&registry).unwrap();
        let restored: DeedRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.owner_of(id), Some("alice".to_string()));
        assert_eq!(restored.asset_count(), 1);
    }
}
