//! Policy evaluation and the fail-closed decision pipeline.
//!
//! - [`client`]: OPA client behind the [`PolicyDecider`] seam
//! - [`decision`]: ordered checks turning a call outcome into a [`Decision`]

pub mod client;
pub mod decision;

pub use client::{OpaClient, PolicyDecider, PolicyError, PolicyQuery, PolicyVerdict};
pub use decision::{Decision, DecisionInput, OPA_ERROR_PREFIX, UNEXPECTED_IDENTITY, decide};
