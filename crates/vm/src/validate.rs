// Path: crates/vm/src/validate.rs
//! Plan validation against the operator allowlist, field allowset, and
//! resource maxima.

use thiserror::Error;
use veil_types::plan::{Operator, QueryPlan, ResourceLimits};
use veil_types::request::OutputMode;

/// Validation failures, with caller-visible messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanValidationError {
    /// The plan carries no signature.
    #[error("Plan is not signed")]
    Unsigned,
    /// The plan's expiry has passed.
    #[error("Plan has expired")]
    Expired,
    /// A step uses an operator outside the allowlist.
    #[error("Disallowed operator: {0}")]
    DisallowedOperator(String),
    /// The final step is not PACK_CAPSULE, or a step follows it.
    #[error("PACK_CAPSULE must be the final step")]
    CapsuleNotFinal,
    /// A step touches a field outside the allowed set.
    #[error("Field {0} not in allowed set")]
    FieldNotAllowed(String),
    /// Declared limits exceed the absolute maxima.
    #[error("Resource limits exceed maxima")]
    LimitsExceedMaxima,
    /// The output configuration exceeds the declared limits.
    #[error("Output config exceeds limits")]
    OutputConfigExceedsLimits,
    /// The plan exports but the governing contract forbids it.
    #[error("Export is not permitted by the governing contract")]
    ExportForbidden,
}

/// Validates a plan against its governing contract's output mode.
pub fn validate_plan(
    plan: &QueryPlan,
    contract_output_mode: OutputMode,
    now_ms: u64,
) -> Result<(), PlanValidationError> {
    if plan.signature.is_empty() {
        return Err(PlanValidationError::Unsigned);
    }
    if plan.is_expired(now_ms) {
        return Err(PlanValidationError::Expired);
    }

    let mut operators = Vec::with_capacity(plan.steps.len());
    for step in &plan.steps {
        let op = step
            .parsed_operator()
            .map_err(PlanValidationError::DisallowedOperator)?;
        operators.push(op);
    }

    match operators.last() {
        Some(Operator::PackCapsule) => {}
        _ => return Err(PlanValidationError::CapsuleNotFinal),
    }
    // PACK_CAPSULE anywhere but last means later steps were emitted.
    if operators
        .iter()
        .take(operators.len() - 1)
        .any(|op| *op == Operator::PackCapsule)
    {
        return Err(PlanValidationError::CapsuleNotFinal);
    }

    for step in &plan.steps {
        for field in step.input_fields.iter().chain(step.output_fields.iter()) {
            if !plan.allowed_fields.contains(field) {
                return Err(PlanValidationError::FieldNotAllowed(field.clone()));
            }
        }
    }

    if !plan.limits.within_maxima() {
        return Err(PlanValidationError::LimitsExceedMaxima);
    }
    if plan.output.max_bytes > plan.limits.memory_bytes {
        return Err(PlanValidationError::OutputConfigExceedsLimits);
    }

    let export_permitted = matches!(
        contract_output_mode,
        OutputMode::ExportAllowed | OutputMode::RawExport
    );
    let plan_exports = operators.contains(&Operator::Export) || plan.output.export_allowed;
    if plan_exports && !export_permitted {
        return Err(PlanValidationError::ExportForbidden);
    }

    // Declared limits above the hard defaults are legal up to the maxima;
    // execution still enforces whatever was declared.
    debug_assert!(ResourceLimits::MAX.within_maxima());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_test_utils::fixtures::plan_fixture;
    use veil_types::plan::PlanStep;

    const NOW: u64 = 1_705_314_600_000;

    #[test]
    fn well_formed_plan_validates() {
        let plan = plan_fixture(&["SELECT", "AGGREGATE", "PACK_CAPSULE"], NOW);
        validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap();
    }

    #[test]
    fn missing_pack_capsule_fails() {
        let plan = plan_fixture(&["SELECT", "AGGREGATE"], NOW);
        assert_eq!(
            validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err(),
            PlanValidationError::CapsuleNotFinal
        );
        assert_eq!(
            PlanValidationError::CapsuleNotFinal.to_string(),
            "PACK_CAPSULE must be the final step"
        );
    }

    #[test]
    fn disallowed_operator_fails_with_its_name() {
        let plan = plan_fixture(&["SELECT", "EXEC", "PACK_CAPSULE"], NOW);
        let err = validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err();
        assert_eq!(err.to_string(), "Disallowed operator: EXEC");
    }

    #[test]
    fn early_pack_capsule_fails() {
        let plan = plan_fixture(&["PACK_CAPSULE", "SELECT", "PACK_CAPSULE"], NOW);
        assert_eq!(
            validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err(),
            PlanValidationError::CapsuleNotFinal
        );
    }

    #[test]
    fn unsigned_and_expired_plans_fail() {
        let mut plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        plan.signature = String::new();
        assert_eq!(
            validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err(),
            PlanValidationError::Unsigned
        );

        let plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        let err = validate_plan(&plan, OutputMode::AggregateOnly, plan.expires_at_ms).unwrap_err();
        assert_eq!(err, PlanValidationError::Expired);
    }

    #[test]
    fn foreign_field_fails() {
        let mut plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        plan.steps[0] = PlanStep {
            input_fields: ["not_allowed".to_string()].into(),
            ..plan.steps[0].clone()
        };
        let err = validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err();
        assert_eq!(err.to_string(), "Field not_allowed not in allowed set");
    }

    #[test]
    fn limits_above_maxima_fail() {
        let mut plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        plan.limits.cpu_millis = 60_001;
        assert_eq!(
            validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err(),
            PlanValidationError::LimitsExceedMaxima
        );
    }

    #[test]
    fn output_config_above_limits_fails() {
        let mut plan = plan_fixture(&["SELECT", "PACK_CAPSULE"], NOW);
        plan.output.max_bytes = plan.limits.memory_bytes + 1;
        assert_eq!(
            validate_plan(&plan, OutputMode::AggregateOnly, NOW).unwrap_err(),
            PlanValidationError::OutputConfigExceedsLimits
        );
    }

    #[test]
    fn export_against_clean_room_contract_fails() {
        let plan = plan_fixture(&["SELECT", "EXPORT", "PACK_CAPSULE"], NOW);
        assert_eq!(
            validate_plan(&plan, OutputMode::CleanRoom, NOW).unwrap_err(),
            PlanValidationError::ExportForbidden
        );
        validate_plan(&plan, OutputMode::ExportAllowed, NOW).unwrap();
    }
}
