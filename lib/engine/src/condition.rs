//! Branch predicate evaluation against the execution context.
//!
//! A condition compares a dotted-path context field against a literal value.
//! Multiple conditions combine via an explicit `logic` connective; the
//! default combinator is AND when omitted. Mixed connectives evaluate
//! left-to-right, accumulator-style, with each condition's own `logic`
//! deciding how it joins the running result.

use crate::context::ExecutionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Comparison operator for a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    In,
    NotIn,
}

/// Logical connective joining a condition with the preceding result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

/// A single branch predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the execution context.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Literal value to compare against.
    pub value: JsonValue,
    /// Connective with the preceding condition; AND when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<ConditionLogic>,
}

impl Condition {
    /// Creates a condition with the default AND connective.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logic: None,
        }
    }

    /// Sets the connective to OR.
    #[must_use]
    pub fn or(mut self) -> Self {
        self.logic = Some(ConditionLogic::Or);
        self
    }

    /// Evaluates this condition in isolation.
    #[must_use]
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        let actual = context.get_path(&self.field);
        match self.operator {
            ConditionOperator::Equals => actual == Some(&self.value),
            ConditionOperator::NotEquals => actual != Some(&self.value),
            ConditionOperator::GreaterThan => {
                compare_numbers(actual, &self.value).is_some_and(|ord| ord.is_gt())
            }
            ConditionOperator::LessThan => {
                compare_numbers(actual, &self.value).is_some_and(|ord| ord.is_lt())
            }
            ConditionOperator::Contains => contains(actual, &self.value),
            ConditionOperator::In => member_of(actual, &self.value),
            ConditionOperator::NotIn => !member_of(actual, &self.value),
        }
    }
}

/// Evaluates a condition list against the context.
///
/// An empty list evaluates to `true` (an unconditional branch).
#[must_use]
pub fn evaluate_all(conditions: &[Condition], context: &ExecutionContext) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else {
        return true;
    };

    let mut result = first.evaluate(context);
    for condition in iter {
        let value = condition.evaluate(context);
        result = match condition.logic.unwrap_or_default() {
            ConditionLogic::And => result && value,
            ConditionLogic::Or => result || value,
        };
    }
    result
}

fn compare_numbers(actual: Option<&JsonValue>, expected: &JsonValue) -> Option<std::cmp::Ordering> {
    let left = actual?.as_f64()?;
    let right = expected.as_f64()?;
    left.partial_cmp(&right)
}

/// String containment is substring; array containment is membership.
fn contains(actual: Option<&JsonValue>, needle: &JsonValue) -> bool {
    match actual {
        Some(JsonValue::String(haystack)) => needle
            .as_str()
            .is_some_and(|needle| haystack.contains(needle)),
        Some(JsonValue::Array(items)) => items.contains(needle),
        _ => false,
    }
}

fn member_of(actual: Option<&JsonValue>, set: &JsonValue) -> bool {
    match (actual, set) {
        (Some(value), JsonValue::Array(items)) => items.contains(value),
        _ => false,
    }
}
