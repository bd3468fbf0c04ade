// Path: crates/vm/src/netguard.rs
//! The in-process network block.
//!
//! While any plan executes, the guard blocks every non-metadata egress
//! attempt made from the execution context. The guard is installed into the
//! egress gate once at wiring time; entering execution is an RAII token, so
//! a panicking or cancelled plan can never leave the block engaged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use veil_egress::{EgressInterlock, EgressRequestType};

/// Counts plans currently executing; non-zero engages the block.
#[derive(Debug, Default)]
pub struct NetworkGuard {
    executing: AtomicUsize,
}

/// RAII token for one execution.
pub struct ExecutionToken {
    guard: Arc<NetworkGuard>,
}

impl NetworkGuard {
    /// A guard with no executions in flight.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enters execution; the block stays engaged until the token drops.
    pub fn enter(self: &Arc<Self>) -> ExecutionToken {
        self.executing.fetch_add(1, Ordering::SeqCst);
        ExecutionToken {
            guard: Arc::clone(self),
        }
    }

    /// True while at least one plan is executing.
    pub fn executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst) > 0
    }
}

impl Drop for ExecutionToken {
    fn drop(&mut self) {
        self.guard.executing.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EgressInterlock for NetworkGuard {
    fn blocks(&self, request_type: EgressRequestType) -> bool {
        self.executing() && request_type != EgressRequestType::Metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_engages_and_releases_the_block() {
        let guard = NetworkGuard::new();
        assert!(!guard.blocks(EgressRequestType::CapsuleTransfer));
        {
            let _token = guard.enter();
            assert!(guard.blocks(EgressRequestType::CapsuleTransfer));
            assert!(guard.blocks(EgressRequestType::Signaling));
            // Metadata stays permitted for control-plane chatter.
            assert!(!guard.blocks(EgressRequestType::Metadata));
        }
        assert!(!guard.blocks(EgressRequestType::CapsuleTransfer));
    }

    #[test]
    fn gate_fails_closed_while_a_plan_executes() {
        use veil_egress::{EgressGate, EgressRequest};
        use veil_types::error::SafetyError;

        let gate = EgressGate::new();
        gate.allow("relay.example.net", "Capsule relay");
        let guard = NetworkGuard::new();
        gate.add_interlock(guard.clone());

        let request = EgressRequest {
            destination: "relay.example.net".into(),
            payload: vec![],
            request_type: EgressRequestType::CapsuleTransfer,
            headers: Default::default(),
        };

        let _token = guard.enter();
        let err = gate.send(&request).unwrap_err();
        assert!(matches!(err, SafetyError::NetworkBlocked));
        drop(_token);
        gate.send(&request).unwrap();
    }

    #[test]
    fn nested_executions_keep_the_block_engaged() {
        let guard = NetworkGuard::new();
        let a = guard.enter();
        let b = guard.enter();
        drop(a);
        assert!(guard.blocks(EgressRequestType::CapsuleTransfer));
        drop(b);
        assert!(!guard.blocks(EgressRequestType::CapsuleTransfer));
    }
}
