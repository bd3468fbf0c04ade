// Path: crates/vm/src/exec.rs
//! Sequential plan execution under the resource monitor and network block.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use veil_types::error::{CoreError, SafetyError};
use veil_types::plan::{Operator, QueryPlan, ResourceLimits};
use veil_types::request::OutputMode;

use crate::netguard::NetworkGuard;
use crate::ops;
use crate::validate::{validate_plan, PlanValidationError};
use crate::value::{approx_map_bytes, DataMap};

/// The packaged result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// The final data map (the capsule payload source).
    pub data: DataMap,
    /// TTL the PACK_CAPSULE step declared, in seconds.
    pub capsule_ttl_secs: u64,
    /// When the result was packed, UTC epoch milliseconds.
    pub packed_at_ms: u64,
    /// Whether an EXPORT step tagged the output.
    pub export_requested: bool,
}

/// A controlled execution failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    /// Index of the failing step; `None` for validation failures.
    pub step_index: Option<u32>,
    /// The failure.
    pub error: CoreError,
}

fn validation_error(e: PlanValidationError) -> CoreError {
    match e {
        PlanValidationError::DisallowedOperator(op) => SafetyError::DisallowedOperator(op).into(),
        other => CoreError::Validation(other.to_string()),
    }
}

/// One sample per executed step, observed by the monitor task through a
/// bounded channel (the monitor holds no reference back into execution).
#[derive(Debug, Clone, Copy)]
struct StepSample {
    index: u32,
    map_bytes: usize,
    wall_elapsed_ms: u64,
    cpu_elapsed_ms: u64,
}

struct ResourceMonitor {
    cancel: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
    tx: mpsc::Sender<StepSample>,
    handle: tokio::task::JoinHandle<()>,
}

impl ResourceMonitor {
    fn start(limits: ResourceLimits) -> Self {
        let (tx, mut rx) = mpsc::channel::<StepSample>(16);
        let cancel = Arc::new(AtomicBool::new(false));
        let reason = Arc::new(Mutex::new(None));
        let cancel_task = Arc::clone(&cancel);
        let reason_task = Arc::clone(&reason);

        let handle = tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                let violation = if sample.map_bytes as u64 > limits.memory_bytes {
                    Some(format!(
                        "memory {} bytes over the {} byte budget",
                        sample.map_bytes, limits.memory_bytes
                    ))
                } else if sample.wall_elapsed_ms > limits.wall_millis {
                    Some(format!(
                        "wall time {} ms over the {} ms budget",
                        sample.wall_elapsed_ms, limits.wall_millis
                    ))
                } else if sample.cpu_elapsed_ms > limits.cpu_millis {
                    Some(format!(
                        "cpu time {} ms over the {} ms budget",
                        sample.cpu_elapsed_ms, limits.cpu_millis
                    ))
                } else {
                    None
                };
                if let Some(v) = violation {
                    warn!(step = sample.index, violation = %v, "resource monitor cancelling plan");
                    *reason_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(v);
                    cancel_task.store(true, Ordering::SeqCst);
                    break;
                }
            }
        });

        Self {
            cancel,
            reason,
            tx,
            handle,
        }
    }

    async fn observe(&self, sample: StepSample) {
        // A full channel means the monitor is mid-verdict; never block the
        // plan on it.
        let _ = self.tx.try_send(sample);
        tokio::task::yield_now().await;
    }

    fn cancelled(&self) -> Option<String> {
        if self.cancel.load(Ordering::SeqCst) {
            Some(
                self.reason
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone()
                    .unwrap_or_else(|| "resource limit exceeded".to_string()),
            )
        } else {
            None
        }
    }

    async fn stop(self) {
        drop(self.tx);
        let _ = self.handle.await;
    }
}

/// Executes validated plans.
pub struct PlanExecutor {
    guard: Arc<NetworkGuard>,
}

impl PlanExecutor {
    /// An executor whose runs engage `guard`.
    pub fn new(guard: Arc<NetworkGuard>) -> Self {
        Self { guard }
    }

    /// The guard this executor engages; install it into the egress gate.
    pub fn guard(&self) -> Arc<NetworkGuard> {
        Arc::clone(&self.guard)
    }

    /// Validates and executes a plan over `input`.
    ///
    /// Steps run sequentially in index order; execution yields after each
    /// step and never suspends on the network. Operator errors and panics
    /// become structured failures carrying the step index.
    pub async fn execute(
        &self,
        plan: &QueryPlan,
        contract_output_mode: OutputMode,
        input: DataMap,
        now_ms: u64,
    ) -> Result<ExecutionOutput, ExecutionFailure> {
        validate_plan(plan, contract_output_mode, now_ms).map_err(|e| ExecutionFailure {
            step_index: None,
            error: validation_error(e),
        })?;

        let _token = self.guard.enter();
        let monitor = ResourceMonitor::start(plan.limits);
        let started = Instant::now();
        let mut cpu_busy_ms: u64 = 0;
        let mut data = input;
        let mut ttl_secs = 0u64;

        for step in &plan.steps {
            if let Some(reason) = monitor.cancelled() {
                monitor.stop().await;
                return Err(ExecutionFailure {
                    step_index: Some(step.index),
                    error: SafetyError::ResourceLimitExceeded(reason).into(),
                });
            }

            // Validation guarantees the operator parses.
            let op = match step.parsed_operator() {
                Ok(op) => op,
                Err(name) => {
                    monitor.stop().await;
                    return Err(ExecutionFailure {
                        step_index: Some(step.index),
                        error: SafetyError::DisallowedOperator(name).into(),
                    });
                }
            };

            if op == Operator::PackCapsule {
                match step
                    .parameters
                    .get("ttl_secs")
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    Some(ttl) if ttl >= 1 => ttl_secs = ttl,
                    _ => {
                        monitor.stop().await;
                        return Err(ExecutionFailure {
                            step_index: Some(step.index),
                            error: CoreError::Validation(
                                "PACK_CAPSULE requires ttl_secs >= 1".into(),
                            ),
                        });
                    }
                }
                break;
            }

            let step_started = Instant::now();
            let applied = catch_unwind(AssertUnwindSafe(|| {
                ops::apply(op, step, data.clone(), &plan.allowed_fields)
            }));
            cpu_busy_ms += step_started.elapsed().as_millis() as u64;

            data = match applied {
                Ok(Ok(next)) => next,
                Ok(Err(step_err)) => {
                    monitor.stop().await;
                    return Err(ExecutionFailure {
                        step_index: Some(step.index),
                        error: CoreError::Validation(format!(
                            "step {} ({}) failed: {}",
                            step.index, step.operator, step_err.0
                        )),
                    });
                }
                Err(_) => {
                    monitor.stop().await;
                    return Err(ExecutionFailure {
                        step_index: Some(step.index),
                        error: CoreError::Validation(format!(
                            "step {} ({}) failed: operator panicked",
                            step.index, step.operator
                        )),
                    });
                }
            };

            let sample = StepSample {
                index: step.index,
                map_bytes: approx_map_bytes(&data),
                wall_elapsed_ms: started.elapsed().as_millis() as u64,
                cpu_elapsed_ms: cpu_busy_ms,
            };
            debug!(step = step.index, bytes = sample.map_bytes, "step complete");
            monitor.observe(sample).await;

            // Hard wall deadline, independent of the monitor's sampling.
            if sample.wall_elapsed_ms > plan.limits.wall_millis {
                monitor.stop().await;
                return Err(ExecutionFailure {
                    step_index: Some(step.index),
                    error: SafetyError::ResourceLimitExceeded(format!(
                        "wall time {} ms over the {} ms budget",
                        sample.wall_elapsed_ms, plan.limits.wall_millis
                    ))
                    .into(),
                });
            }
            if sample.map_bytes as u64 > plan.limits.memory_bytes {
                monitor.stop().await;
                return Err(ExecutionFailure {
                    step_index: Some(step.index),
                    error: SafetyError::ResourceLimitExceeded(format!(
                        "memory {} bytes over the {} byte budget",
                        sample.map_bytes, plan.limits.memory_bytes
                    ))
                    .into(),
                });
            }
        }

        monitor.stop().await;
        let export_requested = data.contains_key("_export_requested");
        Ok(ExecutionOutput {
            data,
            capsule_ttl_secs: ttl_secs,
            packed_at_ms: now_ms,
            export_requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PlanValue;
    use veil_test_utils::fixtures::plan_fixture;

    const NOW: u64 = 1_705_314_600_000;

    fn input() -> DataMap {
        let mut d = DataMap::new();
        d.insert(
            "domain:activity|2024-01-15".to_string(),
            PlanValue::Integer(12),
        );
        d.insert("count".to_string(), PlanValue::Integer(42));
        d
    }

    fn executor() -> PlanExecutor {
        PlanExecutor::new(NetworkGuard::new())
    }

    #[tokio::test]
    async fn simple_plan_packs_a_result() {
        let plan = plan_fixture(&["SELECT", "AGGREGATE", "PACK_CAPSULE"], NOW);
        let out = executor()
            .execute(&plan, OutputMode::AggregateOnly, input(), NOW)
            .await
            .unwrap();
        assert_eq!(out.capsule_ttl_secs, 3_600);
        assert_eq!(out.packed_at_ms, NOW);
        assert!(!out.export_requested);
        assert_eq!(
            out.data.get("_aggregate_value"),
            Some(&PlanValue::Integer(2))
        );
    }

    #[tokio::test]
    async fn validation_failures_carry_no_step_index() {
        let plan = plan_fixture(&["SELECT", "EXEC", "PACK_CAPSULE"], NOW);
        let failure = executor()
            .execute(&plan, OutputMode::AggregateOnly, input(), NOW)
            .await
            .unwrap_err();
        assert_eq!(failure.step_index, None);
        assert!(matches!(
            failure.error,
            CoreError::Safety(SafetyError::DisallowedOperator(_))
        ));
    }

    #[tokio::test]
    async fn operator_errors_become_structured_step_failures() {
        let mut plan = plan_fixture(&["BUCKETIZE", "PACK_CAPSULE"], NOW);
        plan.steps[0]
            .parameters
            .insert("bucket_size".to_string(), "0".to_string());
        let failure = executor()
            .execute(&plan, OutputMode::AggregateOnly, input(), NOW)
            .await
            .unwrap_err();
        assert_eq!(failure.step_index, Some(0));
        assert!(failure.error.to_string().contains("BUCKETIZE"));
    }

    #[tokio::test]
    async fn memory_budget_cancels_the_run() {
        let mut plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        plan.limits.memory_bytes = 16;
        plan.output.max_bytes = 8;
        let failure = executor()
            .execute(&plan, OutputMode::AggregateOnly, input(), NOW)
            .await
            .unwrap_err();
        assert_eq!(failure.step_index, Some(0));
        assert!(matches!(
            failure.error,
            CoreError::Safety(SafetyError::ResourceLimitExceeded(_))
        ));
    }

    #[tokio::test]
    async fn export_tag_survives_to_the_output() {
        let plan = plan_fixture(&["SELECT", "EXPORT", "PACK_CAPSULE"], NOW);
        let out = executor()
            .execute(&plan, OutputMode::ExportAllowed, input(), NOW)
            .await
            .unwrap();
        assert!(out.export_requested);
    }

    #[tokio::test]
    async fn network_block_is_engaged_only_during_execution() {
        let exec = executor();
        let guard = exec.guard();
        assert!(!guard.executing());
        let plan = plan_fixture(&["SELECT", "AGGREGATE", "PACK_CAPSULE"], NOW);
        exec.execute(&plan, OutputMode::AggregateOnly, input(), NOW)
            .await
            .unwrap();
        assert!(!guard.executing());
    }
}
