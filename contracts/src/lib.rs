//! # Deedflow Contracts
//!
//! State-machine logic for escrowed sales of uniquely identified assets.
//! A sale involves four fixed parties — seller, buyer, inspector, and
//! lender — and only completes once every gate (inspection pass, three
//! approvals, sufficient escrowed funds) holds:
//!
//! - **Escrow Ledger** — the core registry of listings, deposits, and
//!   approval gates; the only component with money-moving invariants.
//! - **Asset Registry** — ownership tracking for unique asset ids with
//!   approve-then-pull transfer semantics.
//! - **Value Ledger** — fungible account balances with atomic,
//!   all-or-nothing settlement.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. Every state-changing operation either fully commits or fully
//!    fails; a rejected call leaves the listing exactly as it was.
//! 3. Role checks gate every privileged operation; read-only queries are
//!    open to anyone and never fail.
//! 4. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod escrow;
pub mod ledger;
pub mod registry;

/// Opaque account identifier. Compared for equality only — the escrow
/// layer attaches no meaning to its contents.
pub type AccountId = String;
