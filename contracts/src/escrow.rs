//! # Escrow Ledger
//!
//! Coordinates the sale of a uniquely identified asset between four
//! parties — seller, buyer, inspector, and lender — through gated
//! approvals. The lifecycle per listing is:
//!
//! 1. **List** — the seller lists an asset; the ledger pulls custody of
//!    it from the seller through the asset registry.
//! 2. **Deposit** — the buyer places earnest money into escrow.
//! 3. **Inspect** — the inspector attests a pass/fail result.
//! 4. **Approve** — buyer, seller, and lender each record approval;
//!    the lender supplies the remaining funds.
//! 5. **Finalize** — once every gate holds, the seller is paid and the
//!    asset title moves to the buyer. Or **Cancel** — held funds are
//!    returned per a deterministic disposition rule.
//!
//! The seller, inspector, and lender are fixed at setup time and shared
//! across all listings; the buyer is fixed per listing at creation.
//! Held funds are tracked per listing, so concurrently active listings
//! can never confuse each other's custody.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{LedgerError, ValueLedger};
use crate::registry::{AssetId, AssetRegistry, RegistryError};
use crate::AccountId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The finalize precondition that was not yet satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gate {
    /// The inspector has not attested a pass.
    Inspection,
    /// The buyer has not approved the sale.
    BuyerApproval,
    /// The seller has not approved the sale.
    SellerApproval,
    /// The lender has not approved the sale.
    LenderApproval,
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gate::Inspection => write!(f, "inspection"),
            Gate::BuyerApproval => write!(f, "buyer approval"),
            Gate::SellerApproval => write!(f, "seller approval"),
            Gate::LenderApproval => write!(f, "lender approval"),
        }
    }
}

/// Errors that can occur during escrow operations.
#[derive(Debug, Error)]
pub enum EscrowError {
    /// The caller does not hold the role this operation requires.
    #[error("unauthorized: {caller} is not the {expected}")]
    Unauthorized {
        /// The account that attempted the operation.
        caller: AccountId,
        /// The role the operation requires.
        expected: &'static str,
    },

    /// The asset has no active listing.
    #[error("asset {0} is not listed")]
    NotListed(AssetId),

    /// The asset already has an active listing.
    #[error("asset {0} is already listed")]
    AlreadyListed(AssetId),

    /// The listing terms are inconsistent: the earnest amount exceeds
    /// the purchase price.
    #[error("invalid terms: escrow amount {escrow_amount} exceeds purchase price {purchase_price}")]
    InvalidTerms {
        /// The full sale price.
        purchase_price: u64,
        /// The required earnest deposit.
        escrow_amount: u64,
    },

    /// A finalize gate is not yet satisfied.
    #[error("not ready to finalize: {gate} missing")]
    NotReady {
        /// The first gate found unsatisfied.
        gate: Gate,
    },

    /// A value transfer into or out of escrow was refused by the ledger.
    #[error("value transfer failed")]
    InsufficientFunds(#[source] LedgerError),

    /// The funds held for this listing do not cover the purchase price.
    #[error("insufficient escrowed funds: held {held}, required {required}")]
    InsufficientEscrowFunds {
        /// Total held for this listing.
        held: u64,
        /// The listing's purchase price.
        required: u64,
    },

    /// The registry refused the custody pull at listing time.
    #[error("custody transfer failed")]
    CustodyTransferFailed(#[source] RegistryError),

    /// The registry refused the title transfer at finalize time.
    #[error("asset transfer failed")]
    AssetTransferFailed(#[source] RegistryError),

    /// Arithmetic on held amounts would overflow.
    #[error("amount overflow")]
    AmountOverflow,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The inspector's attestation for a listing.
///
/// `Unset` gates exactly like `Failed`: finalize requires an explicit
/// `Passed`, and cancellation refunds the buyer unless the inspection
/// passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inspection {
    /// The inspector has not attested yet.
    #[default]
    Unset,
    /// The inspector attested a pass.
    Passed,
    /// The inspector attested a failure.
    Failed,
}

impl std::fmt::Display for Inspection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inspection::Unset => write!(f, "Unset"),
            Inspection::Passed => write!(f, "Passed"),
            Inspection::Failed => write!(f, "Failed"),
        }
    }
}

/// One escrowed sale of one asset.
///
/// Born at `list`, lives through deposit/inspection/approval events, and
/// dies (`is_listed = false`) at finalize or cancel. Listing records are
/// never deleted, only marked not-listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Unique identifier for this listing record.
    pub listing_id: String,
    /// The asset under escrow.
    pub asset_id: AssetId,
    /// The designated buyer, fixed at creation.
    pub buyer: AccountId,
    /// Full sale price in smallest units. Invariant:
    /// `purchase_price >= escrow_amount`.
    pub purchase_price: u64,
    /// Earnest deposit the buyer is expected to place.
    pub escrow_amount: u64,
    /// True from creation until finalize or cancel; false is terminal.
    pub is_listed: bool,
    /// The inspector's attestation.
    pub inspection: Inspection,
    /// Approval flags keyed by account. Append-only: an approval is
    /// never unset.
    pub approvals: HashMap<AccountId, bool>,
    /// Earnest funds the buyer has deposited for this listing.
    pub buyer_deposit: u64,
    /// Loan funds the lender has supplied for this listing.
    pub lender_contribution: u64,
    /// Timestamp when the listing was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent state change.
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Returns `true` if `account` has approved this sale.
    pub fn approved_by(&self, account: &AccountId) -> bool {
        self.approvals.get(account).copied().unwrap_or(false)
    }

    /// Total value held in escrow for this listing.
    pub fn held_total(&self) -> Option<u64> {
        self.buyer_deposit.checked_add(self.lender_contribution)
    }
}

// ---------------------------------------------------------------------------
// Escrow Ledger
// ---------------------------------------------------------------------------

/// The escrow ledger: per-listing state plus the gating logic around
/// every money- or title-moving action.
///
/// Collaborator handles are shared (`Arc<Mutex<_>>`) so the harness and
/// the ledger operate on the same registry and balances. All operations
/// take `&mut self`; wrapping the whole ledger in a single mutex
/// linearizes concurrent callers, and collaborator locks are only taken
/// inside an operation, making the cross-component sequence part of the
/// same critical section.
pub struct EscrowLedger<R, L> {
    registry: Arc<Mutex<R>>,
    ledger: Arc<Mutex<L>>,
    /// The account under which escrowed assets and funds are held.
    escrow_account: AccountId,
    seller: AccountId,
    inspector: AccountId,
    lender: AccountId,
    listings: HashMap<AssetId, Listing>,
}

impl<R: AssetRegistry, L: ValueLedger> EscrowLedger<R, L> {
    /// Creates an escrow ledger with its process-wide parties fixed.
    ///
    /// `seller`, `inspector`, and `lender` are invariant for the
    /// lifetime of the instance and shared across all listings.
    pub fn new(
        registry: Arc<Mutex<R>>,
        ledger: Arc<Mutex<L>>,
        escrow_account: AccountId,
        seller: AccountId,
        inspector: AccountId,
        lender: AccountId,
    ) -> Self {
        Self {
            registry,
            ledger,
            escrow_account,
            seller,
            inspector,
            lender,
            listings: HashMap::new(),
        }
    }

    // -- State-changing operations ------------------------------------------

    /// Lists an asset for sale to a designated buyer.
    ///
    /// Pulls custody of the asset from the seller into the escrow
    /// account as part of the call; the seller must have approved the
    /// escrow account as transfer operator beforehand. Fails without
    /// any state change if the pull is refused.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Unauthorized`] if the caller is not the seller,
    /// [`EscrowError::InvalidTerms`] if the earnest amount exceeds the
    /// price, [`EscrowError::AlreadyListed`] if the asset has an active
    /// listing, [`EscrowError::CustodyTransferFailed`] if the registry
    /// refuses the pull.
    pub fn list(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
        buyer: AccountId,
        purchase_price: u64,
        escrow_amount: u64,
    ) -> Result<(), EscrowError> {
        if *caller != self.seller {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "seller",
            });
        }

        if escrow_amount > purchase_price {
            return Err(EscrowError::InvalidTerms {
                purchase_price,
                escrow_amount,
            });
        }

        if self.listings.get(&asset_id).is_some_and(|l| l.is_listed) {
            return Err(EscrowError::AlreadyListed(asset_id));
        }

        // Custody first: if the pull fails, no listing is written.
        self.registry
            .lock()
            .transfer_ownership(asset_id, &self.seller, &self.escrow_account, &self.escrow_account)
            .map_err(EscrowError::CustodyTransferFailed)?;

        let now = Utc::now();
        self.listings.insert(
            asset_id,
            Listing {
                listing_id: Uuid::new_v4().to_string(),
                asset_id,
                buyer: buyer.clone(),
                purchase_price,
                escrow_amount,
                is_listed: true,
                inspection: Inspection::Unset,
                approvals: HashMap::new(),
                buyer_deposit: 0,
                lender_contribution: 0,
                created_at: now,
                updated_at: now,
            },
        );

        tracing::info!(asset_id, buyer = %buyer, purchase_price, escrow_amount, "asset listed");
        Ok(())
    }

    /// Buyer deposits earnest money for a listing.
    ///
    /// Any positive amount is accepted and accumulated; whether enough
    /// has been deposited is checked at finalize. Touches only the held
    /// funds — gates, ownership, and `is_listed` are unaffected.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] for inactive listings,
    /// [`EscrowError::Unauthorized`] if the caller is not the listing's
    /// buyer, [`EscrowError::InsufficientFunds`] if the value ledger
    /// refuses the transfer.
    pub fn deposit_earnest(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
        amount: u64,
    ) -> Result<(), EscrowError> {
        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        if *caller != listing.buyer {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "buyer",
            });
        }

        // Validate the bookkeeping before money moves.
        let new_deposit = listing
            .buyer_deposit
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow)?;

        self.ledger
            .lock()
            .transfer(caller, &self.escrow_account, amount)
            .map_err(EscrowError::InsufficientFunds)?;

        listing.buyer_deposit = new_deposit;
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, amount, total = new_deposit, "earnest deposited");
        Ok(())
    }

    /// Lender supplies loan funds for a listing.
    ///
    /// The contribution is held in escrow for this listing until
    /// finalize or cancel.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`deposit_earnest`](Self::deposit_earnest),
    /// with the lender as the required role.
    pub fn fund_loan(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
        amount: u64,
    ) -> Result<(), EscrowError> {
        if *caller != self.lender {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "lender",
            });
        }

        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        let new_contribution = listing
            .lender_contribution
            .checked_add(amount)
            .ok_or(EscrowError::AmountOverflow)?;

        self.ledger
            .lock()
            .transfer(caller, &self.escrow_account, amount)
            .map_err(EscrowError::InsufficientFunds)?;

        listing.lender_contribution = new_contribution;
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, amount, total = new_contribution, "loan funded");
        Ok(())
    }

    /// Inspector records the inspection result.
    ///
    /// Idempotent — may be called multiple times, last write wins.
    ///
    /// # Errors
    ///
    /// [`EscrowError::Unauthorized`] if the caller is not the inspector,
    /// [`EscrowError::NotListed`] for inactive listings.
    pub fn update_inspection(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
        passed: bool,
    ) -> Result<(), EscrowError> {
        if *caller != self.inspector {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "inspector",
            });
        }

        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        listing.inspection = if passed {
            Inspection::Passed
        } else {
            Inspection::Failed
        };
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, passed, "inspection recorded");
        Ok(())
    }

    /// Records the caller's approval of the sale.
    ///
    /// Only the listing's buyer, the seller, or the lender may approve;
    /// anyone else is rejected outright. Monotonic and idempotent — an
    /// approval never reverts.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] for inactive listings,
    /// [`EscrowError::Unauthorized`] for unrecognized callers.
    pub fn approve_sale(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
    ) -> Result<(), EscrowError> {
        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        if *caller != listing.buyer && *caller != self.seller && *caller != self.lender {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "buyer, seller, or lender",
            });
        }

        listing.approvals.insert(caller.clone(), true);
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, approver = %caller, "sale approved");
        Ok(())
    }

    /// Finalizes the sale: pays the seller and transfers title to the
    /// buyer.
    ///
    /// Requires, all at once: an active listing, a passed inspection,
    /// approvals from buyer, seller, and lender, and held funds covering
    /// the purchase price. Effects are all-or-nothing: the seller is
    /// paid the purchase price, any surplus held beyond it is returned
    /// to the buyer, and title moves escrow → buyer. A refused title
    /// transfer rolls the payments back and leaves the listing active.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`], [`EscrowError::NotReady`] naming the
    /// first unsatisfied gate, [`EscrowError::InsufficientEscrowFunds`],
    /// [`EscrowError::AssetTransferFailed`].
    pub fn finalize_sale(&mut self, asset_id: AssetId) -> Result<(), EscrowError> {
        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        if listing.inspection != Inspection::Passed {
            return Err(EscrowError::NotReady {
                gate: Gate::Inspection,
            });
        }
        if !listing.approved_by(&listing.buyer) {
            return Err(EscrowError::NotReady {
                gate: Gate::BuyerApproval,
            });
        }
        if !listing.approved_by(&self.seller) {
            return Err(EscrowError::NotReady {
                gate: Gate::SellerApproval,
            });
        }
        if !listing.approved_by(&self.lender) {
            return Err(EscrowError::NotReady {
                gate: Gate::LenderApproval,
            });
        }

        let held = listing.held_total().ok_or(EscrowError::AmountOverflow)?;
        if held < listing.purchase_price {
            return Err(EscrowError::InsufficientEscrowFunds {
                held,
                required: listing.purchase_price,
            });
        }
        let surplus = held - listing.purchase_price;
        let price = listing.purchase_price;
        let buyer = listing.buyer.clone();

        // Validate the registry side before any money moves.
        {
            let registry = self.registry.lock();
            match registry.owner_of(asset_id) {
                Some(owner) if owner == self.escrow_account => {}
                Some(owner) => {
                    return Err(EscrowError::AssetTransferFailed(RegistryError::NotOwner {
                        asset_id,
                        owner,
                        claimed: self.escrow_account.clone(),
                    }));
                }
                None => {
                    return Err(EscrowError::AssetTransferFailed(
                        RegistryError::UnknownAsset(asset_id),
                    ));
                }
            }
        }

        // Pay the seller, return any overage to the buyer.
        {
            let mut ledger = self.ledger.lock();
            ledger
                .transfer(&self.escrow_account, &self.seller, price)
                .map_err(EscrowError::InsufficientFunds)?;

            if surplus > 0 {
                if let Err(e) = ledger.transfer(&self.escrow_account, &buyer, surplus) {
                    if let Err(undo) = ledger.transfer(&self.seller, &self.escrow_account, price) {
                        tracing::error!(asset_id, error = %undo, "rollback of seller payment failed");
                    }
                    return Err(EscrowError::InsufficientFunds(e));
                }
            }
        }

        // Title last. A refusal here reverses the payments.
        {
            let mut registry = self.registry.lock();
            if let Err(e) =
                registry.transfer_ownership(asset_id, &self.escrow_account, &buyer, &self.escrow_account)
            {
                let mut ledger = self.ledger.lock();
                if let Err(undo) = ledger.transfer(&self.seller, &self.escrow_account, price) {
                    tracing::error!(asset_id, error = %undo, "rollback of seller payment failed");
                }
                if surplus > 0 {
                    if let Err(undo) = ledger.transfer(&buyer, &self.escrow_account, surplus) {
                        tracing::error!(asset_id, error = %undo, "rollback of surplus refund failed");
                    }
                }
                return Err(EscrowError::AssetTransferFailed(e));
            }
        }

        listing.is_listed = false;
        listing.buyer_deposit = 0;
        listing.lender_contribution = 0;
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, price, surplus, buyer = %buyer, "sale finalized");
        Ok(())
    }

    /// Cancels the sale and disposes of held funds deterministically.
    ///
    /// Only the seller or the listing's buyer may cancel. If the
    /// inspection passed, the buyer backed out of a sound deal and the
    /// entire held balance goes to the seller; otherwise the buyer's
    /// deposit returns to the buyer and the lender's contribution
    /// returns to the lender.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotListed`] if the listing already finalized or
    /// cancelled, [`EscrowError::Unauthorized`] for other callers.
    pub fn cancel_sale(
        &mut self,
        caller: &AccountId,
        asset_id: AssetId,
    ) -> Result<(), EscrowError> {
        let listing = self
            .listings
            .get_mut(&asset_id)
            .filter(|l| l.is_listed)
            .ok_or(EscrowError::NotListed(asset_id))?;

        if *caller != listing.buyer && *caller != self.seller {
            return Err(EscrowError::Unauthorized {
                caller: caller.clone(),
                expected: "buyer or seller",
            });
        }

        let deposit = listing.buyer_deposit;
        let contribution = listing.lender_contribution;
        let buyer = listing.buyer.clone();
        let forfeited = listing.inspection == Inspection::Passed;

        {
            let mut ledger = self.ledger.lock();
            if forfeited {
                let held = listing.held_total().ok_or(EscrowError::AmountOverflow)?;
                if held > 0 {
                    ledger
                        .transfer(&self.escrow_account, &self.seller, held)
                        .map_err(EscrowError::InsufficientFunds)?;
                }
            } else {
                if deposit > 0 {
                    ledger
                        .transfer(&self.escrow_account, &buyer, deposit)
                        .map_err(EscrowError::InsufficientFunds)?;
                }
                if contribution > 0 {
                    if let Err(e) = ledger.transfer(&self.escrow_account, &self.lender, contribution)
                    {
                        if deposit > 0 {
                            if let Err(undo) =
                                ledger.transfer(&buyer, &self.escrow_account, deposit)
                            {
                                tracing::error!(asset_id, error = %undo, "rollback of buyer refund failed");
                            }
                        }
                        return Err(EscrowError::InsufficientFunds(e));
                    }
                }
            }
        }

        listing.is_listed = false;
        listing.buyer_deposit = 0;
        listing.lender_contribution = 0;
        listing.updated_at = Utc::now();

        tracing::info!(asset_id, forfeited, "sale cancelled");
        Ok(())
    }

    // -- Read-only queries ---------------------------------------------------
    //
    // Open to any caller, never fail: unknown listings read as
    // empty/zero so inspecting them stays side-effect-free.

    /// Whether the asset has an active listing.
    pub fn is_listed(&self, asset_id: AssetId) -> bool {
        self.listings
            .get(&asset_id)
            .is_some_and(|l| l.is_listed)
    }

    /// The designated buyer, or `None` for unknown assets.
    pub fn buyer(&self, asset_id: AssetId) -> Option<AccountId> {
        self.listings.get(&asset_id).map(|l| l.buyer.clone())
    }

    /// The listing's purchase price, or 0 for unknown assets.
    pub fn purchase_price(&self, asset_id: AssetId) -> u64 {
        self.listings
            .get(&asset_id)
            .map(|l| l.purchase_price)
            .unwrap_or(0)
    }

    /// The listing's required earnest amount, or 0 for unknown assets.
    pub fn escrow_amount(&self, asset_id: AssetId) -> u64 {
        self.listings
            .get(&asset_id)
            .map(|l| l.escrow_amount)
            .unwrap_or(0)
    }

    /// The inspection attestation, `Unset` for unknown assets.
    pub fn inspection(&self, asset_id: AssetId) -> Inspection {
        self.listings
            .get(&asset_id)
            .map(|l| l.inspection)
            .unwrap_or_default()
    }

    /// Whether `account` has approved this listing's sale.
    pub fn approval(&self, asset_id: AssetId, account: &AccountId) -> bool {
        self.listings
            .get(&asset_id)
            .is_some_and(|l| l.approved_by(account))
    }

    /// Total value held in escrow for this listing.
    pub fn held_balance(&self, asset_id: AssetId) -> u64 {
        self.listings
            .get(&asset_id)
            .and_then(|l| l.held_total())
            .unwrap_or(0)
    }

    /// The full listing record, or `None` for unknown assets.
    pub fn listing(&self, asset_id: AssetId) -> Option<&Listing> {
        self.listings.get(&asset_id)
    }

    /// Number of currently active listings.
    pub fn active_listing_count(&self) -> usize {
        self.listings.values().filter(|l| l.is_listed).count()
    }

    /// The process-wide seller account.
    pub fn seller(&self) -> &AccountId {
        &self.seller
    }

    /// The process-wide inspector account.
    pub fn inspector(&self) -> &AccountId {
        &self.inspector
    }

    /// The process-wide lender account.
    pub fn lender(&self) -> &AccountId {
        &self.lender
    }

    /// The account under which escrowed assets and funds are held.
    pub fn escrow_account(&self) -> &AccountId {
        &self.escrow_account
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
