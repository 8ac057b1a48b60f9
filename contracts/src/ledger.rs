//! # Value Ledger
//!
//! Fungible account balances with atomic, all-or-nothing settlement.
//! Amounts are unsigned integers denominated in the smallest unit of
//! value; there is no floating point anywhere near money.
//!
//! The [`ValueLedger`] trait is the seam the escrow ledger depends on;
//! [`CashLedger`] is the in-memory implementation used by the node and
//! the test harness. `credit` is the issuance entry point — the harness
//! uses it to give parties spendable balances.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Attempted to move more than the sender's available balance.
    #[error("insufficient balance: {account} has {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: AccountId,
        /// The sender's current balance.
        available: u64,
        /// The amount the transfer asked for.
        requested: u64,
    },

    /// A credit would push a balance past `u64::MAX`.
    #[error("balance overflow: {account} holds {current}, credit {credit}")]
    Overflow {
        /// The account being credited.
        account: AccountId,
        /// Balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The value-transfer interface the escrow ledger consumes.
///
/// `transfer` is all-or-nothing: on error, neither balance has changed.
pub trait ValueLedger {
    /// Returns the balance of an account. Accounts that have never been
    /// credited hold zero.
    fn balance_of(&self, account: &AccountId) -> u64;

    /// Moves `amount` from `from` to `to` atomically.
    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory value ledger. Balances live in a flat map keyed by account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CashLedger {
    balances: HashMap<AccountId, u64>,
}

impl CashLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            balances: HashMap::new(),
        }
    }

    /// Issues `amount` of new value to `account`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Overflow`] if the credit would exceed
    /// `u64::MAX`.
    pub fn credit(&mut self, account: &AccountId, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                account: account.clone(),
                current: *balance,
                credit: amount,
            })?;
        Ok(*balance)
    }

    /// Returns the number of accounts with a balance entry.
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }
}

impl ValueLedger for CashLedger {
    fn balance_of(&self, account: &AccountId) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                available,
                requested: amount,
            });
        }

        // A self-transfer settles trivially once the balance check passed.
        if from == to {
            return Ok(());
        }

        let to_balance = self.balance_of(to);
        let credited = to_balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                account: to.clone(),
                current: to_balance,
                credit: amount,
            })?;

        // Both sides validated — commit.
        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);
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
    fn unknown_account_holds_zero() {
        let ledger = CashLedger::new();
        assert_eq!(ledger.balance_of(&"nobody".into()), 0);
    }

    #[test]
    fn credit_accumulates() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 500).unwrap();
        ledger.credit(&"alice".into(), 300).unwrap();
        assert_eq!(ledger.balance_of(&"alice".into()), 800);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), u64::MAX).unwrap();
        let result = ledger.credit(&"alice".into(), 1);
        assert!(matches!(result, Err(LedgerError::Overflow { .. })));
    }

    #[test]
    fn transfer_moves_value() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 1000).unwrap();
        ledger
            .transfer(&"alice".into(), &"bob".into(), 400)
            .unwrap();
        assert_eq!(ledger.balance_of(&"alice".into()), 600);
        assert_eq!(ledger.balance_of(&"bob".into()), 400);
    }

    #[test]
    fn transfer_insufficient_balance_rejected() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 100).unwrap();
        let result = ledger.transfer(&"alice".into(), &"bob".into(), 200);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            })
        ));
        // All-or-nothing: nothing moved.
        assert_eq!(ledger.balance_of(&"alice".into()), 100);
        assert_eq!(ledger.balance_of(&"bob".into()), 0);
    }

    #[test]
    fn transfer_overflow_leaves_sender_intact() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 10).unwrap();
        ledger.credit(&"bob".into(), u64::MAX).unwrap();
        let result = ledger.transfer(&"alice".into(), &"bob".into(), 10);
        assert!(matches!(result, Err(LedgerError::Overflow { .. })));
        assert_eq!(ledger.balance_of(&"alice".into()), 10);
    }

    #[test]
    fn transfer_to_self_is_a_noop_in_effect() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 100).unwrap();
        ledger
            .transfer(&"alice".into(), &"alice".into(), 40)
            .unwrap();
        assert_eq!(ledger.balance_of(&"alice".into()), 100);
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let mut ledger = CashLedger::new();
        ledger.credit(&"alice".into(), 42).unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        let restored: CashLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.balance_of(&"alice".into()), 42);
    }
}
