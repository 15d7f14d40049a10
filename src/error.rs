// Outcome and error types for filter decoding and evaluation.

use crate::ber::BerError;
use thiserror::Error;

/// Three-valued result of evaluating a filter against one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    True,
    False,
    Undefined,
}

impl Verdict {
    /// NOT semantics: True and False flip, Undefined passes through.
    pub fn negate(self) -> Verdict {
        match self {
            Verdict::True => Verdict::False,
            Verdict::False => Verdict::True,
            Verdict::Undefined => Verdict::Undefined,
        }
    }
}

/// Outcome carried by a pre-decided Computed leaf. Decoding degrades
/// semantically odd content (unknown attribute, unrecognized choice) to
/// `Computed(Undefined)` instead of failing the whole filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedOutcome {
    False,
    True,
    Undefined,
    Error,
}

impl ComputedOutcome {
    pub(crate) fn wire_byte(self) -> u8 {
        match self {
            ComputedOutcome::False => 0,
            ComputedOutcome::True => 1,
            ComputedOutcome::Undefined => 2,
            ComputedOutcome::Error => 3,
        }
    }

    pub(crate) fn from_wire_byte(b: u8) -> ComputedOutcome {
        match b {
            0 => ComputedOutcome::False,
            1 => ComputedOutcome::True,
            3 => ComputedOutcome::Error,
            _ => ComputedOutcome::Undefined,
        }
    }
}

/// Errors from building a filter tree out of wire bytes or text.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Malformed or truncated framing. The connection cannot be trusted to
    /// stay in sync; the caller must terminate it.
    #[error("malformed filter encoding: {0}")]
    Disconnect(String),
    /// Well-formed BER carrying grammar-violating content (misplaced
    /// substring components, missing extensible value, bad filter text).
    #[error("filter protocol error: {0}")]
    Protocol(String),
    /// An extensible match named no usable matching rule. Unlike unknown
    /// attributes elsewhere, this is a hard error, not a Computed leaf.
    #[error("inappropriate matching: {0}")]
    InappropriateMatching(String),
    /// An assertion value failed its declared validator or normalizer.
    #[error("invalid assertion value syntax: {0}")]
    InvalidSyntax(String),
}

impl From<BerError> for DecodeError {
    fn from(e: BerError) -> Self {
        DecodeError::Disconnect(e.to_string())
    }
}

/// Terminal errors from filter evaluation. These propagate immediately
/// through And/Or and are never collapsed into False or Undefined.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// A leaf comparison was blocked by access control.
    #[error("insufficient access")]
    InsufficientAccess,
    /// A matching-rule comparison genuinely failed.
    #[error("matching failed: {0}")]
    Matching(String),
}

/// Failure inside a matching rule's validate/normalize/compare capability.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MatchError(pub String);

impl From<MatchError> for EvalError {
    fn from(e: MatchError) -> Self {
        EvalError::Matching(e.0)
    }
}
