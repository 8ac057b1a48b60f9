//! Integration tests for the escrow ledger.
//!
//! These tests exercise full sale lifecycles across module boundaries,
//! with the in-memory registry and ledger standing in for the external
//! collaborators: the happy-path sale, cancellations in both
//! dispositions, and isolation between concurrently active listings.

use std::sync::Arc;

use parking_lot::Mutex;

use deedflow_contracts::escrow::{EscrowError, EscrowLedger, Gate, Inspection};
use deedflow_contracts::ledger::{CashLedger, ValueLedger};
use deedflow_contracts::registry::{AssetRegistry, DeedRegistry};
use deedflow_contracts::AccountId;

const PRICE: u64 = 10;
const EARNEST: u64 = 5;

struct World {
    escrow: EscrowLedger<DeedRegistry, CashLedger>,
    registry: Arc<Mutex<DeedRegistry>>,
    ledger: Arc<Mutex<CashLedger>>,
}

fn acct(name: &str) -> AccountId {
    name.to_string()
}

/// Deploys the escrow with fixed parties and funds buyer and lender.
fn world() -> World {
    let registry = Arc::new(Mutex::new(DeedRegistry::new()));
    let ledger = Arc::new(Mutex::new(CashLedger::new()));

    ledger.lock().credit(&acct("buyer"), 100).unwrap();
    ledger.lock().credit(&acct("lender"), 100).unwrap();

    let escrow = EscrowLedger::new(
        Arc::clone(&registry),
        Arc::clone(&ledger),
        acct("escrow"),
        acct("seller"),
        acct("inspector"),
        acct("lender"),
    );

    World {
        escrow,
        registry,
        ledger,
    }
}

/// Seller mints an asset and approves the escrow account to pull it.
fn mint_and_approve(w: &World) -> u64 {
    let id = w
        .registry
        .lock()
        .mint(acct("seller"), "ipfs://deed".into());
    w.registry
        .lock()
        .approve_transfer(id, &acct("seller"), &acct("escrow"))
        .unwrap();
    id
}

// ---------------------------------------------------------------------------
// End-to-end lifecycle
// ---------------------------------------------------------------------------

#[test]
fn full_sale_happy_path() {
    let mut w = world();

    // Seller mints asset id 1 and lists it for the buyer at 10 / earnest 5.
    let id = mint_and_approve(&w);
    assert_eq!(id, 1);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    assert!(w.escrow.is_listed(id));
    assert_eq!(w.registry.lock().owner_of(id), Some(acct("escrow")));

    // Buyer deposits the earnest.
    w.escrow.deposit_earnest(&acct("buyer"), id, EARNEST).unwrap();

    // Inspector attests pass; every party approves.
    w.escrow
        .update_inspection(&acct("inspector"), id, true)
        .unwrap();
    w.escrow.approve_sale(&acct("buyer"), id).unwrap();
    w.escrow.approve_sale(&acct("seller"), id).unwrap();
    w.escrow.approve_sale(&acct("lender"), id).unwrap();

    // Lender supplies the remaining 5.
    w.escrow
        .fund_loan(&acct("lender"), id, PRICE - EARNEST)
        .unwrap();

    w.escrow.finalize_sale(id).unwrap();

    // Seller received the full price; buyer holds the title; the
    // listing is terminal.
    assert_eq!(w.ledger.lock().balance_of(&acct("seller")), PRICE);
    assert_eq!(w.registry.lock().owner_of(id), Some(acct("buyer")));
    assert!(!w.escrow.is_listed(id));
    assert_eq!(w.ledger.lock().balance_of(&acct("escrow")), 0);
}

#[test]
fn failed_inspection_cancel_makes_everyone_whole() {
    let mut w = world();
    let id = mint_and_approve(&w);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow.deposit_earnest(&acct("buyer"), id, EARNEST).unwrap();
    w.escrow.fund_loan(&acct("lender"), id, 3).unwrap();
    w.escrow
        .update_inspection(&acct("inspector"), id, false)
        .unwrap();

    w.escrow.cancel_sale(&acct("buyer"), id).unwrap();

    assert_eq!(w.ledger.lock().balance_of(&acct("buyer")), 100);
    assert_eq!(w.ledger.lock().balance_of(&acct("lender")), 100);
    assert_eq!(w.ledger.lock().balance_of(&acct("seller")), 0);
    assert_eq!(w.ledger.lock().balance_of(&acct("escrow")), 0);
    assert!(!w.escrow.is_listed(id));
}

#[test]
fn backing_out_after_passed_inspection_forfeits_earnest() {
    let mut w = world();
    let id = mint_and_approve(&w);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow.deposit_earnest(&acct("buyer"), id, EARNEST).unwrap();
    w.escrow
        .update_inspection(&acct("inspector"), id, true)
        .unwrap();

    w.escrow.cancel_sale(&acct("buyer"), id).unwrap();

    assert_eq!(w.ledger.lock().balance_of(&acct("seller")), EARNEST);
    assert_eq!(w.ledger.lock().balance_of(&acct("buyer")), 100 - EARNEST);
}

#[test]
fn asset_can_be_relisted_after_cancel() {
    let mut w = world();
    let id = mint_and_approve(&w);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow.cancel_sale(&acct("seller"), id).unwrap();

    // Custody stayed with the escrow after cancel; the escrow returns
    // nothing automatically, so the seller reclaims out-of-band. Here
    // the registry hands it back for the relist.
    w.registry
        .lock()
        .transfer_ownership(id, &acct("escrow"), &acct("seller"), &acct("escrow"))
        .unwrap();
    w.registry
        .lock()
        .approve_transfer(id, &acct("seller"), &acct("escrow"))
        .unwrap();

    w.escrow
        .list(&acct("seller"), id, acct("other-buyer"), 20, 8)
        .unwrap();
    assert!(w.escrow.is_listed(id));
    assert_eq!(w.escrow.buyer(id), Some(acct("other-buyer")));
    assert_eq!(w.escrow.purchase_price(id), 20);
    // Fresh listing: gates reset.
    assert_eq!(w.escrow.inspection(id), Inspection::Unset);
    assert!(!w.escrow.approval(id, &acct("buyer")));
}

// ---------------------------------------------------------------------------
// Cross-listing isolation
// ---------------------------------------------------------------------------

#[test]
fn concurrent_listings_do_not_share_held_funds() {
    let mut w = world();
    let a = mint_and_approve(&w);
    let b = mint_and_approve(&w);

    w.escrow
        .list(&acct("seller"), a, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow
        .list(&acct("seller"), b, acct("buyer"), 40, 20)
        .unwrap();

    w.escrow.deposit_earnest(&acct("buyer"), a, EARNEST).unwrap();
    w.escrow.deposit_earnest(&acct("buyer"), b, 20).unwrap();
    w.escrow.fund_loan(&acct("lender"), a, PRICE - EARNEST).unwrap();

    assert_eq!(w.escrow.held_balance(a), PRICE);
    assert_eq!(w.escrow.held_balance(b), 20);

    // Listing b's deposit cannot satisfy listing a's price, and
    // finalizing a must not drain b's funds.
    w.escrow
        .update_inspection(&acct("inspector"), a, true)
        .unwrap();
    w.escrow.approve_sale(&acct("buyer"), a).unwrap();
    w.escrow.approve_sale(&acct("seller"), a).unwrap();
    w.escrow.approve_sale(&acct("lender"), a).unwrap();
    w.escrow.finalize_sale(a).unwrap();

    assert_eq!(w.escrow.held_balance(b), 20);
    assert_eq!(w.ledger.lock().balance_of(&acct("escrow")), 20);

    // And b can still be cancelled with a full refund.
    w.escrow.cancel_sale(&acct("buyer"), b).unwrap();
    assert_eq!(w.ledger.lock().balance_of(&acct("escrow")), 0);
}

#[test]
fn underfunded_listing_cannot_borrow_from_its_sibling() {
    let mut w = world();
    let a = mint_and_approve(&w);
    let b = mint_and_approve(&w);

    w.escrow
        .list(&acct("seller"), a, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow
        .list(&acct("seller"), b, acct("buyer"), PRICE, EARNEST)
        .unwrap();

    // Only listing b is funded, but all of a's gates are otherwise open.
    w.escrow.deposit_earnest(&acct("buyer"), b, PRICE).unwrap();
    w.escrow
        .update_inspection(&acct("inspector"), a, true)
        .unwrap();
    w.escrow.approve_sale(&acct("buyer"), a).unwrap();
    w.escrow.approve_sale(&acct("seller"), a).unwrap();
    w.escrow.approve_sale(&acct("lender"), a).unwrap();

    let err = w.escrow.finalize_sale(a).unwrap_err();
    assert!(matches!(
        err,
        EscrowError::InsufficientEscrowFunds {
            held: 0,
            required: PRICE,
        }
    ));
}

// ---------------------------------------------------------------------------
// Authorization leaves state unchanged
// ---------------------------------------------------------------------------

#[test]
fn unauthorized_calls_never_mutate() {
    let mut w = world();
    let id = mint_and_approve(&w);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();
    w.escrow.deposit_earnest(&acct("buyer"), id, EARNEST).unwrap();

    let before = w.escrow.listing(id).unwrap().clone();

    assert!(matches!(
        w.escrow.update_inspection(&acct("buyer"), id, true),
        Err(EscrowError::Unauthorized { .. })
    ));
    assert!(matches!(
        w.escrow.approve_sale(&acct("stranger"), id),
        Err(EscrowError::Unauthorized { .. })
    ));
    assert!(matches!(
        w.escrow.cancel_sale(&acct("inspector"), id),
        Err(EscrowError::Unauthorized { .. })
    ));
    assert!(matches!(
        w.escrow.fund_loan(&acct("buyer"), id, 1),
        Err(EscrowError::Unauthorized { .. })
    ));

    let after = w.escrow.listing(id).unwrap();
    assert_eq!(after.is_listed, before.is_listed);
    assert_eq!(after.inspection, before.inspection);
    assert_eq!(after.approvals, before.approvals);
    assert_eq!(after.buyer_deposit, before.buyer_deposit);
    assert_eq!(after.lender_contribution, before.lender_contribution);
}

#[test]
fn finalize_reports_first_missing_gate() {
    let mut w = world();
    let id = mint_and_approve(&w);
    w.escrow
        .list(&acct("seller"), id, acct("buyer"), PRICE, EARNEST)
        .unwrap();

    // Nothing attested or approved: inspection is reported first.
    let err = w.escrow.finalize_sale(id).unwrap_err();
    assert!(matches!(
        err,
        EscrowError::NotReady {
            gate: Gate::Inspection
        }
    ));
}
