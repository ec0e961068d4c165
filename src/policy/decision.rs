//! Fail-closed decision pipeline.
//!
//! The final verdict is produced by an ordered list of named checks. Each
//! check either lets evaluation continue or returns the final [`Decision`].
//!
//! | Order | Check | Fires when | Result |
//! |-------|-------|------------|--------|
//! | 1 | `policy-call` | evaluator call failed | deny, `opa_error: <detail>` |
//! | 2 | `identity-match` | verdict allows, expected identity set and different | deny, `unexpected identity` |
//! | 3 | `policy-verdict` | verdict present | allow or deny, empty reason |
//!
//! If nothing fires the request is denied.

use tracing::trace;

use super::client::PolicyError;

/// Reason recorded when the approved caller is not the expected one.
pub const UNEXPECTED_IDENTITY: &str = "unexpected identity";

/// Prefix of the reason recorded when the evaluator could not be consulted.
pub const OPA_ERROR_PREFIX: &str = "opa_error: ";

/// Final allow/deny outcome with its audit reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Audit-only explanation; empty when no anomaly occurred.
    pub reason: String,
}

impl Decision {
    /// Allow with no reason.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    /// Deny with the given reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Everything a check may look at.
#[derive(Debug)]
pub struct DecisionInput<'a> {
    /// Extracted caller identity (empty when unattested).
    pub identity: &'a str,
    /// Outcome of the policy evaluator call.
    pub outcome: &'a Result<bool, PolicyError>,
    /// Configured expected caller, if any.
    pub expected_identity: Option<&'a str>,
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Defer to the next check.
    Continue,
    /// Stop; this is the decision.
    Final(Decision),
}

/// A named pipeline stage.
pub type Check = fn(&DecisionInput<'_>) -> Step;

/// Checks in precedence order.
pub const CHECKS: &[(&str, Check)] = &[
    ("policy-call", policy_call),
    ("identity-match", identity_match),
    ("policy-verdict", policy_verdict),
];

/// Run the pipeline.
#[must_use]
pub fn decide(input: &DecisionInput<'_>) -> Decision {
    for (name, check) in CHECKS {
        if let Step::Final(decision) = check(input) {
            trace!(check = name, allowed = decision.allowed, "Decision pipeline settled");
            return decision;
        }
    }
    Decision::deny("no decision")
}

/// A failed evaluator call is a denial.
#[must_use]
pub fn policy_call(input: &DecisionInput<'_>) -> Step {
    match input.outcome {
        Err(e) => Step::Final(Decision::deny(format!("{OPA_ERROR_PREFIX}{e}"))),
        Ok(_) => Step::Continue,
    }
}

/// An approval for anyone but the expected caller is overridden.
#[must_use]
pub fn identity_match(input: &DecisionInput<'_>) -> Step {
    match (input.outcome, input.expected_identity) {
        (Ok(true), Some(expected)) if input.identity != expected => {
            Step::Final(Decision::deny(UNEXPECTED_IDENTITY))
        }
        _ => Step::Continue,
    }
}

/// The evaluator's own answer.
#[must_use]
pub fn policy_verdict(input: &DecisionInput<'_>) -> Step {
    match input.outcome {
        Ok(true) => Step::Final(Decision::allow()),
        Ok(false) => Step::Final(Decision::deny("")),
        Err(_) => Step::Continue,
    }
}
