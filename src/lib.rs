//! Leave entitlement ledger and multi-level approval workflow.
//!
//! The [`ledger`] owns per-staff entitlement balances under optimistic
//! concurrency, the [`router`] computes the approval chain from
//! organizational context, the [`engine`] advances requests through
//! that chain, and the [`compliance`] gate validates requests without
//! ever mutating state. [`service::LeaveService`] wires them together.

pub mod compliance;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod policy;
pub mod request;
pub mod router;
pub mod service;
pub mod staff;
pub mod types;
pub mod utils;
