//! Condition evaluation for gateway transitions.
//!
//! Expressions use the Jinja2 expression syntax provided by `minijinja`:
//! comparisons, `==`/`!=`, `and`/`or`/`not`, variable references and
//! string/number/bool literals. `${...}` and `{{ ... }}` wrappers are
//! accepted and stripped, and `&&`/`||` are read as `and`/`or`.

use std::collections::HashMap;

use minijinja::value::ValueKind;
use minijinja::{Environment, UndefinedBehavior};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Condition evaluator for sequence flow expressions.
///
/// Stateless apart from the compiled environment, so a single instance can
/// be shared across threads and calls.
pub struct ConditionEvaluator {
    env: Environment<'static>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Referencing an unknown variable is an evaluation error, not `false`.
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Evaluate `expression` against `variables`.
    ///
    /// An empty expression is `true`. Compile failures, runtime failures and
    /// non-boolean results fail with `ConditionEvaluation`.
    pub fn evaluate(
        &self,
        expression: &str,
        variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let source = normalize(expression);
        if source.is_empty() {
            return Ok(true);
        }

        let compiled = self
            .env
            .compile_expression(&source)
            .map_err(|e| evaluation_error(expression, e.to_string()))?;

        let value = compiled
            .eval(variables)
            .map_err(|e| evaluation_error(expression, e.to_string()))?;

        if value.kind() != ValueKind::Bool {
            return Err(evaluation_error(
                expression,
                format!("expected a boolean but got {}", value.kind()),
            ));
        }

        Ok(value.is_true())
    }
}

/// Evaluate a single expression with a fresh evaluator.
pub fn evaluate(
    expression: &str,
    variables: &HashMap<String, serde_json::Value>,
) -> OrchestratorResult<bool> {
    ConditionEvaluator::new().evaluate(expression, variables)
}

fn evaluation_error(expression: &str, reason: String) -> OrchestratorError {
    OrchestratorError::ConditionEvaluation {
        expression: expression.to_string(),
        reason,
    }
}

fn normalize(expression: &str) -> String {
    let mut source = expression.trim();

    for (open, close) in [("${", "}"), ("#{", "}"), ("{{", "}}")] {
        if source.starts_with(open) && source.ends_with(close) && source.len() >= open.len() + close.len() {
            source = source[open.len()..source.len() - close.len()].trim();
            break;
        }
    }

    rewrite_logical_operators(source)
}

/// Rewrite `&&`/`||` as `and`/`or`, leaving quoted literals untouched.
fn rewrite_logical_operators(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 8);
    let mut quote: Option<char> = None;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '&' | '|' if chars.peek() == Some(&c) => {
                    chars.next();
                    out.push_str(if c == '&' { " and " } else { " or " });
                }
                _ => out.push(c),
            },
        }
    }
    out
}
