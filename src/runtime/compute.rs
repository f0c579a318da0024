// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Computed-field engine (§4.3): `ref`+`polynomial`, `compute`, `value`,
//! and the deprecated `formula` source, gated by an optional [`Guard`].
//!
//! Grounded on `_decode_computed_field`/`_evaluate_polynomial` (Horner's
//! method)/`_evaluate_compute`/`_evaluate_guard`/`_resolve_ref_value` in
//! `examples/original_source/tools/schema_interpreter.py`.

use crate::core::{CodecError, Result};
use crate::runtime::env::VariableEnvironment;
use crate::runtime::formula;
use crate::runtime::modifiers::{apply_transforms, evaluate_guard};
use crate::schema::ast::{ComputeOp, ComputedField, ComputedSource, Operand};

/// Evaluates a computed field's declared source against the variable
/// environment, applies its transform pipeline, and returns `None` only
/// when the field's guard fails and carries no else-value (the spec's
/// "suppressed" outcome; guard failure with an else-value instead yields
/// `Some(else_value)`, matching §4.3).
pub fn evaluate(field: &ComputedField, env: &VariableEnvironment) -> Result<Option<f64>> {
    if let Some(guard) = &field.guard {
        if !evaluate_guard(guard, env) {
            if guard.else_value.is_nan() {
                return Ok(Some(f64::NAN));
            }
            return Ok(Some(guard.else_value));
        }
    }

    let raw = match &field.source {
        ComputedSource::Ref { name, polynomial } => {
            let x = env
                .get(name)
                .ok_or_else(|| CodecError::structural(&field.name, format!("unresolved ref '${name}'")))?;
            match polynomial {
                Some(coeffs) if coeffs.len() >= 2 => evaluate_polynomial(coeffs, x),
                _ => x,
            }
        }
        ComputedSource::Compute { op, a, b } => {
            let a = resolve_operand(a, env);
            let b = resolve_operand(b, env);
            evaluate_compute(*op, a, b)
        }
        ComputedSource::Value(v) => *v,
        ComputedSource::Formula(expr) => formula::evaluate(expr, None, env)?,
    };

    Ok(Some(apply_transforms(raw, &field.transforms)))
}

fn resolve_operand(operand: &Operand, env: &VariableEnvironment) -> f64 {
    match operand {
        Operand::Literal(v) => *v,
        Operand::Ref(name) => env.get(name).unwrap_or(0.0),
    }
}

/// Cross-field binary computation. Division by zero yields NaN rather
/// than erroring, matching the grounded Python's `_evaluate_compute`.
fn evaluate_compute(op: ComputeOp, a: f64, b: f64) -> f64 {
    match op {
        ComputeOp::Add => a + b,
        ComputeOp::Sub => a - b,
        ComputeOp::Mul => a * b,
        ComputeOp::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                a / b
            }
        }
        ComputeOp::Mod => {
            if b == 0.0 {
                f64::NAN
            } else {
                a % b
            }
        }
        ComputeOp::IDiv => {
            if b == 0.0 {
                f64::NAN
            } else {
                (a / b).trunc()
            }
        }
    }
}

/// Evaluates a descending-power-order polynomial via Horner's method:
/// `a_n*x^n + ... + a_1*x + a_0`, computed as
/// `(((a_n*x + a_{n-1})*x + a_{n-2})*x + ...)*x + a_0`.
fn evaluate_polynomial(coefficients: &[f64], x: f64) -> f64 {
    let mut result = coefficients[0];
    for coef in &coefficients[1..] {
        result = result * x + coef;
    }
    result
}
