//! `vetledger-access` — the authorization collaborator contract.
//!
//! The core consumes an explicit [`AccessContext`] value; it never reads
//! process-wide session state.

pub mod context;

pub use context::{AccessContext, Role};
