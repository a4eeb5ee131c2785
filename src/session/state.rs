//! Negotiation state
//!
//! The two flags of the perfect-negotiation pattern plus the fixed politeness
//! of the session. Together with the engine's signaling state they make up
//! the negotiation state machine:
//!
//! | signaling state | `making_offer` | incoming offer          |
//! |-----------------|----------------|-------------------------|
//! | stable          | false          | applied and answered    |
//! | stable          | true           | collision               |
//! | anything else   | any            | collision               |
//!
//! An impolite session drops a colliding offer; a polite one applies it.

use std::sync::atomic::{AtomicBool, Ordering};

/// Per-session negotiation flags
///
/// Written by the media event task (`making_offer`) and the connection task
/// (`ignore_offer`) of the same session, so plain atomics suffice.
#[derive(Debug)]
pub struct NegotiationState {
    making_offer: AtomicBool,
    ignore_offer: AtomicBool,
    polite: bool,
}

impl NegotiationState {
    /// Create state for a session with fixed politeness
    pub fn new(polite: bool) -> Self {
        Self {
            making_offer: AtomicBool::new(false),
            ignore_offer: AtomicBool::new(false),
            polite,
        }
    }

    /// Whether a local offer is being generated and sent
    pub fn making_offer(&self) -> bool {
        self.making_offer.load(Ordering::SeqCst)
    }

    pub(crate) fn set_making_offer(&self, value: bool) {
        self.making_offer.store(value, Ordering::SeqCst);
    }

    /// Whether the last incoming description was dropped by the glare rule
    pub fn ignore_offer(&self) -> bool {
        self.ignore_offer.load(Ordering::SeqCst)
    }

    /// Whether this session yields to colliding offers
    pub fn is_polite(&self) -> bool {
        self.polite
    }

    /// Evaluate an incoming description and record whether it must be ignored
    ///
    /// `stable` is whether the engine currently reports a stable signaling state.
    pub(crate) fn evaluate_incoming(&self, is_offer: bool, stable: bool) -> bool {
        let collision = is_offer && (self.making_offer() || !stable);
        let ignore = !self.polite && collision;
        self.ignore_offer.store(ignore, Ordering::SeqCst);
        ignore
    }
}
