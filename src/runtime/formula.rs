// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Restricted formula evaluator for the deprecated `formula` computed-field
//! source (§4.3, §9).
//!
//! This is deliberately not a general-purpose scripting evaluator: the
//! grammar only admits arithmetic, comparisons, a C-style ternary, and a
//! fixed whitelist of math functions over `$name` variable references and
//! the `x` placeholder (bound to the raw value being re-derived).
//!
//! Grounded on `_evaluate_formula` in
//! `examples/original_source/tools/schema_interpreter.py` for the
//! function whitelist and ternary semantics; the pest grammar/derive
//! idiom is grounded on `src/schema/parser/idl_parser/mod.rs`.

use crate::core::{CodecError, Result};
use crate::runtime::env::VariableEnvironment;
use crate::runtime::modifiers::round_half_to_even;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "runtime/formula.pest"]
struct FormulaParser;

/// Parses and evaluates a formula expression. `x`, if given, binds the
/// placeholder token; `$name` references resolve against `env`.
pub fn evaluate(expr: &str, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut parsed = FormulaParser::parse(Rule::formula, expr)
        .map_err(|e| CodecError::structural("formula", format!("parse error: {e}")))?;
    let formula_pair = next_pair(&mut parsed)?;
    let expr_pair = formula_pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| CodecError::structural("formula", "empty formula"))?;
    eval_expr(expr_pair, x, env)
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| CodecError::structural("formula", "malformed expression"))
}

fn eval_expr(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut inner = pair.into_inner();
    eval_ternary(next_pair(&mut inner)?, x, env)
}

fn eval_ternary(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut it = pair.into_inner();
    let cond_or_value = eval_comparison(next_pair(&mut it)?, x, env)?;
    match it.next() {
        None => Ok(cond_or_value),
        Some(true_pair) => {
            let true_val = eval_comparison(true_pair, x, env)?;
            let false_val = eval_comparison(next_pair(&mut it)?, x, env)?;
            Ok(if cond_or_value != 0.0 { true_val } else { false_val })
        }
    }
}

fn eval_comparison(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut it = pair.into_inner();
    let left = eval_arith(next_pair(&mut it)?, x, env)?;
    match it.next() {
        None => Ok(left),
        Some(op_pair) => {
            let right = eval_arith(next_pair(&mut it)?, x, env)?;
            let passed = match op_pair.as_str() {
                ">=" => left >= right,
                "<=" => left <= right,
                "==" => left == right,
                "!=" => left != right,
                ">" => left > right,
                "<" => left < right,
                other => return Err(CodecError::structural("formula", format!("unknown comparison '{other}'"))),
            };
            Ok(if passed { 1.0 } else { 0.0 })
        }
    }
}

fn eval_arith(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut it = pair.into_inner();
    let mut result = eval_term(next_pair(&mut it)?, x, env)?;
    loop {
        let Some(op_pair) = it.next() else { break };
        let rhs = eval_term(next_pair(&mut it)?, x, env)?;
        result = match op_pair.as_str() {
            "+" => result + rhs,
            "-" => result - rhs,
            other => return Err(CodecError::structural("formula", format!("unknown operator '{other}'"))),
        };
    }
    Ok(result)
}

fn eval_term(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut it = pair.into_inner();
    let mut result = eval_value(next_pair(&mut it)?, x, env)?;
    loop {
        let Some(op_pair) = it.next() else { break };
        let rhs = eval_value(next_pair(&mut it)?, x, env)?;
        result = match op_pair.as_str() {
            "*" => result * rhs,
            "/" => {
                if rhs == 0.0 {
                    f64::NAN
                } else {
                    result / rhs
                }
            }
            other => return Err(CodecError::structural("formula", format!("unknown operator '{other}'"))),
        };
    }
    Ok(result)
}

fn eval_value(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    match pair.as_rule() {
        Rule::unary => eval_unary(pair, x, env),
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map_err(|_| CodecError::structural("formula", format!("bad number literal '{}'", pair.as_str()))),
        Rule::var_ref => {
            let name = &pair.as_str()[1..];
            Ok(env.get(name).unwrap_or(0.0))
        }
        Rule::placeholder => {
            x.ok_or_else(|| CodecError::structural("formula", "'x' referenced with no bound value"))
        }
        Rule::func_call => eval_func_call(pair, x, env),
        Rule::expr => eval_expr(pair, x, env),
        other => Err(CodecError::structural("formula", format!("unexpected expression node {other:?}"))),
    }
}

fn eval_unary(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let negate = pair.as_str().starts_with('-');
    let mut it = pair.into_inner();
    let value = eval_value(next_pair(&mut it)?, x, env)?;
    Ok(if negate { -value } else { value })
}

/// Fixed function whitelist: `abs`/`sqrt`/`min`/`max`/`pow`/`log`/`exp`/
/// `floor`/`ceil`/`round` (§9). Domain errors clamp rather than raise,
/// matching the rest of the transform pipeline's philosophy.
fn eval_func_call(pair: Pair<Rule>, x: Option<f64>, env: &VariableEnvironment) -> Result<f64> {
    let mut it = pair.into_inner();
    let name_pair = next_pair(&mut it)?;
    let name = name_pair.as_str();
    let args = it
        .map(|p| eval_expr(p, x, env))
        .collect::<Result<Vec<f64>>>()?;
    let arg = |i: usize| args.get(i).copied().unwrap_or(0.0);
    match name {
        "sqrt" => Ok(arg(0).max(0.0).sqrt()),
        "abs" => Ok(arg(0).abs()),
        "min" => Ok(arg(0).min(arg(1))),
        "max" => Ok(arg(0).max(arg(1))),
        "pow" => Ok(arg(0).powf(arg(1))),
        "log" => Ok(arg(0).max(f64::MIN_POSITIVE).ln()),
        "exp" => Ok(arg(0).exp()),
        "floor" => Ok(arg(0).floor()),
        "ceil" => Ok(arg(0).ceil()),
        "round" => Ok(round_half_to_even(arg(0))),
        other => Err(CodecError::structural("formula", format!("unknown function '{other}'"))),
    }
}
