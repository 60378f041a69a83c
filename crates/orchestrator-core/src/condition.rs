// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Closed-grammar condition evaluator for `when`/`if`/`unless`.
//!
//! The grammar is intentionally not Turing-complete (see design notes in the
//! accompanying specification): unknown syntax produces an evaluation error,
//! which callers treat as "skip with reason", never as a silent "runs anyway".

use crate::context::{ExecutionContext, StepStatus};
use crate::error::{OrchestratorError, Result};
use crate::workflow::Step;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Outcome of deciding whether a step should run.
pub struct ConditionOutcome {
    pub should_run: bool,
    pub skip_reason: Option<String>,
}

fn comparison_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"==|!=|<=|>=|<|>").expect("static pattern is valid"))
}

fn infix_predicate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^(.*?)\s+(contains|startsWith|endsWith|matches)\s+(.*)$")
            .expect("static pattern is valid")
    })
}

fn method_predicate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^(.*)\.(contains|startsWith|endsWith|matches)\((.*)\)$")
            .expect("static pattern is valid")
    })
}

fn step_status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_\-]+)\.(success|succeeded|failed|failure|skipped)$")
            .expect("static pattern is valid")
    })
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Evaluates `step.when` against recorded step statuses. Returns `None` when
/// the step should run unconditionally on this axis, or `Some(reason)` when
/// it should be skipped.
fn evaluate_when(when: &Option<String>, ctx: &ExecutionContext) -> Option<String> {
    let when = match when {
        None => return None,
        Some(w) if w.trim().is_empty() => return None,
        Some(w) => w.trim(),
    };

    match when {
        "always" => None,
        "on_success" | "success" => {
            if ctx.any_step_failed() {
                Some("when: on_success, but a prior step has failed".to_string())
            } else {
                None
            }
        }
        "on_failure" | "failure" => {
            if ctx.any_step_failed() {
                None
            } else {
                Some("when: on_failure, but no steps have failed".to_string())
            }
        }
        "manual" => Some("manual approval required".to_string()),
        other => Some(format!("unknown when condition '{other}'")),
    }
}

/// Evaluates an `if`/`unless` expression against current context state.
fn evaluate_expr(expr: &str, ctx: &ExecutionContext, env: &HashMap<String, String>) -> Result<bool> {
    let expr = ctx.interpolate(expr, env);
    let expr = expr.trim();

    if expr.is_empty() {
        return Ok(true);
    }

    // 1. Comparison operators.
    if let Some(m) = comparison_pattern().find(expr) {
        let op = m.as_str();
        let lhs = strip_quotes(&expr[..m.start()]);
        let rhs = strip_quotes(&expr[m.end()..]);
        return Ok(compare(lhs, rhs, op));
    }

    // 2. String predicates (infix or method-call form).
    if let Some(caps) = infix_predicate_pattern().captures(expr) {
        let lhs = strip_quotes(caps.get(1).unwrap().as_str());
        let method = caps.get(2).unwrap().as_str();
        let rhs = strip_quotes(caps.get(3).unwrap().as_str());
        return eval_predicate(lhs, method, rhs);
    }
    if let Some(caps) = method_predicate_pattern().captures(expr) {
        let lhs = strip_quotes(caps.get(1).unwrap().as_str());
        let method = caps.get(2).unwrap().as_str();
        let rhs = strip_quotes(caps.get(3).unwrap().as_str());
        return eval_predicate(lhs, method, rhs);
    }

    // 3. Literal true/false.
    if expr.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if expr.eq_ignore_ascii_case("false") {
        return Ok(false);
    }

    // 4. stepName.status.
    if let Some(caps) = step_status_pattern().captures(expr) {
        let step_name = caps.get(1).unwrap().as_str();
        let status_word = caps.get(2).unwrap().as_str();
        let status = ctx.get_step_status(step_name).ok_or_else(|| OrchestratorError::ConditionError {
            reason: format!("unknown step '{step_name}' referenced in condition"),
        })?;
        return Ok(match status_word {
            "success" | "succeeded" => status == StepStatus::Success,
            "failed" | "failure" => status == StepStatus::Failed,
            "skipped" => status == StepStatus::Skipped,
            _ => unreachable!("pattern only captures known status words"),
        });
    }

    // 5. Bare token: environment variable lookup.
    let value = env.get(expr).cloned().or_else(|| std::env::var(expr).ok());
    Ok(match value {
        Some(v) => !matches!(v.as_str(), "" | "false" | "0"),
        None => false,
    })
}

fn compare(lhs: &str, rhs: &str, op: &str) -> bool {
    if let (Ok(l), Ok(r)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<=" => l <= r,
            ">=" => l >= r,
            "<" => l < r,
            ">" => l > r,
            _ => false,
        };
    }
    match op {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        "<=" => lhs <= rhs,
        ">=" => lhs >= rhs,
        "<" => lhs < rhs,
        ">" => lhs > rhs,
        _ => false,
    }
}

fn eval_predicate(lhs: &str, method: &str, rhs: &str) -> Result<bool> {
    Ok(match method {
        "contains" => lhs.contains(rhs),
        "startsWith" => lhs.starts_with(rhs),
        "endsWith" => lhs.ends_with(rhs),
        "matches" => {
            let re = Regex::new(rhs).map_err(|e| OrchestratorError::ConditionError {
                reason: format!("invalid regex '{rhs}': {e}"),
            })?;
            re.is_match(lhs)
        }
        _ => unreachable!("pattern only captures known predicate methods"),
    })
}

/// Evaluates `when`/`if`/`unless` together and decides whether a step runs.
///
/// Evaluation errors in `if` or `unless` are treated as a skip: `unless` is
/// the safer default, so an evaluation error there also skips the step
/// rather than letting it run.
pub fn should_execute(step: &Step, ctx: &ExecutionContext, env: &HashMap<String, String>) -> ConditionOutcome {
    if let Some(reason) = evaluate_when(&step.when, ctx) {
        return ConditionOutcome {
            should_run: false,
            skip_reason: Some(reason),
        };
    }

    if let Some(if_expr) = &step.if_condition {
        match evaluate_expr(if_expr, ctx, env) {
            Ok(true) => {}
            Ok(false) => {
                return ConditionOutcome {
                    should_run: false,
                    skip_reason: Some(format!("if condition '{if_expr}' evaluated to false")),
                }
            }
            Err(e) => {
                return ConditionOutcome {
                    should_run: false,
                    skip_reason: Some(format!("if condition error: {e}")),
                }
            }
        }
    }

    if let Some(unless_expr) = &step.unless {
        match evaluate_expr(unless_expr, ctx, env) {
            Ok(false) => {}
            Ok(true) => {
                return ConditionOutcome {
                    should_run: false,
                    skip_reason: Some(format!("unless condition '{unless_expr}' evaluated to true")),
                }
            }
            Err(e) => {
                return ConditionOutcome {
                    should_run: false,
                    skip_reason: Some(format!("unless condition error: {e}")),
                }
            }
        }
    }

    ConditionOutcome {
        should_run: true,
        skip_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(HashMap::new())
    }

    #[test]
    fn on_failure_skips_when_nothing_failed() {
        let ctx = ctx();
        let outcome = evaluate_when(&Some("on_failure".to_string()), &ctx);
        assert!(outcome.unwrap().contains("no steps have failed"));
    }

    #[test]
    fn on_failure_runs_when_something_failed() {
        let ctx = ctx();
        ctx.set_step_status("earlier", StepStatus::Failed);
        assert!(evaluate_when(&Some("on_failure".to_string()), &ctx).is_none());
    }

    #[test]
    fn manual_always_skips() {
        let ctx = ctx();
        assert_eq!(
            evaluate_when(&Some("manual".to_string()), &ctx),
            Some("manual approval required".to_string())
        );
    }

    #[test]
    fn unknown_when_skips_with_reason() {
        let ctx = ctx();
        let reason = evaluate_when(&Some("somethingelse".to_string()), &ctx).unwrap();
        assert!(reason.contains("unknown when"));
    }

    #[test]
    fn numeric_comparison() {
        let ctx = ctx();
        let env = HashMap::new();
        assert!(evaluate_expr("3 > 2", &ctx, &env).unwrap());
        assert!(!evaluate_expr("3 < 2", &ctx, &env).unwrap());
        assert!(evaluate_expr("2.5 >= 2.5", &ctx, &env).unwrap());
    }

    #[test]
    fn string_comparison_with_quotes() {
        let ctx = ctx();
        let env = HashMap::new();
        assert!(evaluate_expr("\"prod\" == \"prod\"", &ctx, &env).unwrap());
        assert!(evaluate_expr("'prod' != 'staging'", &ctx, &env).unwrap());
    }

    #[test]
    fn infix_and_method_predicates() {
        let ctx = ctx();
        let env = HashMap::new();
        assert!(evaluate_expr("hello-world contains world", &ctx, &env).unwrap());
        assert!(evaluate_expr("hello-world.startsWith(hello)", &ctx, &env).unwrap());
        assert!(evaluate_expr("v1.2.3.matches(^v[0-9]+\\.[0-9]+\\.[0-9]+$)", &ctx, &env).unwrap());
    }

    #[test]
    fn step_status_reference() {
        let ctx = ctx();
        ctx.set_step_status("build", StepStatus::Success);
        let env = HashMap::new();
        assert!(evaluate_expr("build.success", &ctx, &env).unwrap());
        assert!(!evaluate_expr("build.failed", &ctx, &env).unwrap());
    }

    #[test]
    fn unknown_step_reference_is_an_error() {
        let ctx = ctx();
        let env = HashMap::new();
        assert!(evaluate_expr("ghost.success", &ctx, &env).is_err());
    }

    #[test]
    fn bare_token_is_env_lookup() {
        let ctx = ctx();
        let env = HashMap::from([("FEATURE_X".to_string(), "true".to_string())]);
        assert!(evaluate_expr("FEATURE_X", &ctx, &env).unwrap());

        let env_off = HashMap::from([("FEATURE_X".to_string(), "false".to_string())]);
        assert!(!evaluate_expr("FEATURE_X", &ctx, &env_off).unwrap());
    }

    fn make_step(when: Option<&str>, if_cond: Option<&str>, unless: Option<&str>) -> Step {
        Step {
            name: "s".to_string(),
            step_type: "policy".to_string(),
            config: HashMap::new(),
            depends_on: vec![],
            parallel: false,
            parallel_group: 0,
            when: when.map(String::from),
            if_condition: if_cond.map(String::from),
            unless: unless.map(String::from),
            env: HashMap::new(),
            set_variables: HashMap::new(),
            output_file: None,
            outputs: vec![],
            resource: None,
            timeout: None,
        }
    }

    #[test]
    fn should_execute_combines_all_three_axes() {
        let ctx = ctx();
        let env = HashMap::new();
        let step = make_step(Some("always"), Some("true"), Some("false"));
        assert!(should_execute(&step, &ctx, &env).should_run);

        let step = make_step(Some("on_failure"), None, None);
        let outcome = should_execute(&step, &ctx, &env);
        assert!(!outcome.should_run);
        assert!(outcome.skip_reason.unwrap().contains("no steps have failed"));
    }

    #[test]
    fn unless_error_is_treated_as_skip() {
        let ctx = ctx();
        let env = HashMap::new();
        let step = make_step(None, None, Some("ghost.success"));
        let outcome = should_execute(&step, &ctx, &env);
        assert!(!outcome.should_run);
    }
}
