//! Core business logic - framework-agnostic operations over the database.
//!
//! Every mutating operation follows the same shape: resolve the target through
//! [`scope`] (so other tenants' records look missing), take the keyed lock for the
//! owner/group/membership it touches, open a transaction, re-read, validate, write and
//! commit. Reads take a plain connection.

/// Account registration, principal resolution, blocking
pub mod accounts;
/// Gateway-backed subscription renewal
pub mod billing;
/// Shared state handed to every mutating operation
pub mod context;
/// Group creation, editing, closing and member enrollment
pub mod lifecycle;
/// Per-membership monthly payment ledger and member status
pub mod ledger;
/// Keyed async locks serialising check-then-act sequences
pub mod locks;
/// Outbound notification events and their delivery worker
pub mod notify;
/// Authenticated principal passed into core calls
pub mod principal;
/// Read-only reporting projections
pub mod report;
/// Auction scheduling and the month grid
pub mod rotation;
/// Ownership scoping shared by every entry point
pub mod scope;
/// Effective subscription resolution, status and quotas
pub mod subscription;
/// Winner eligibility, assignment and random draw
pub mod winner;
