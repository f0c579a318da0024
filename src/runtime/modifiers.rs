// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Modifier chain, transform pipeline, and guard evaluation (§3, §4.2).

use crate::core::CodecError;
use crate::runtime::env::VariableEnvironment;
use crate::schema::ast::{
    Guard, GuardOp, Modifier, ModifierOp, TransformOp, TransformPipeline,
};

type Result<T> = std::result::Result<T, CodecError>;

/// Applies a modifier chain in source order (§3.1, §4.2 step 4).
///
/// `div` by zero is a decode-time error (**Guard-Divide-Zero**, modeled
/// here as [`CodecError::ModifierDomain`]); `field` names the owning
/// field for diagnostics.
pub fn apply_modifiers(mut value: f64, modifiers: &[Modifier], field: &str) -> Result<f64> {
    for m in modifiers {
        value = match m.op {
            ModifierOp::Mult => value * m.constant,
            ModifierOp::Div => {
                if m.constant == 0.0 {
                    return Err(CodecError::modifier_domain(field, "division by zero"));
                }
                value / m.constant
            }
            ModifierOp::Add => value + m.constant,
        };
    }
    Ok(value)
}

/// Reverses a modifier chain for encode: walk it in reverse, with
/// inverse operators (add -> subtract, mult -> divide, div -> multiply).
pub fn reverse_modifiers(mut value: f64, modifiers: &[Modifier], field: &str) -> Result<f64> {
    for m in modifiers.iter().rev() {
        value = match m.op {
            ModifierOp::Add => value - m.constant,
            ModifierOp::Mult => {
                if m.constant == 0.0 {
                    return Err(CodecError::modifier_domain(field, "division by zero"));
                }
                value / m.constant
            }
            ModifierOp::Div => value * m.constant,
        };
    }
    Ok(value)
}

/// Applies a transform pipeline in listed order. Out-of-domain inputs
/// clamp to the nearest defined value rather than raising (§3.1).
pub fn apply_transforms(mut value: f64, pipeline: &TransformPipeline) -> f64 {
    for op in pipeline {
        value = match *op {
            TransformOp::Sqrt => value.max(0.0).sqrt(),
            TransformOp::Abs => value.abs(),
            TransformOp::Pow(k) => value.powf(k),
            TransformOp::Floor(lo) => value.max(lo),
            TransformOp::Ceiling(hi) => value.min(hi),
            TransformOp::Clamp(lo, hi) => value.clamp(lo, hi),
            TransformOp::Log10 => value.max(f64::MIN_POSITIVE).log10(),
            TransformOp::Log => value.max(f64::MIN_POSITIVE).ln(),
            TransformOp::Add(k) => value + k,
            TransformOp::Mult(k) => value * k,
            TransformOp::Div(k) => {
                if k == 0.0 {
                    f64::NAN
                } else {
                    value / k
                }
            }
            TransformOp::Round(n) => round_to_digits(value, n),
        };
    }
    value
}

fn round_to_digits(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    round_half_to_even(value * factor) / factor
}

/// Round-half-to-even (banker's rounding), matching `f64::round_ties_even`
/// semantics by hand for toolchains whose std predates it.
pub fn round_half_to_even(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let floor = value.floor();
    let diff = value - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// Evaluates a guard's predicates against the variable environment.
/// Returns `true` (proceed with the value source) if every predicate
/// holds, `false` (emit the else-value) otherwise.
pub fn evaluate_guard(guard: &Guard, env: &VariableEnvironment) -> bool {
    guard.predicates.iter().all(|p| {
        let Some(actual) = env.get(&p.field) else {
            return false;
        };
        match p.op {
            GuardOp::Gt => actual > p.constant,
            GuardOp::Gte => actual >= p.constant,
            GuardOp::Lt => actual < p.constant,
            GuardOp::Lte => actual <= p.constant,
            GuardOp::Eq => actual == p.constant,
            GuardOp::Ne => actual != p.constant,
        }
    })
}
