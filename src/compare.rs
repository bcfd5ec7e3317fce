//! Comparison of captured output against an audit's expected value.
//!
//! Both sides are first parsed as base-10 signed integers. When both parse,
//! the comparison is numeric; when neither parses it is a string comparison;
//! a mix of the two is always an error.
//!
//! `contains` and `containsReg` on two numeric-looking values land in the
//! numeric branch, where they are not defined, and therefore fail with the
//! string/integer mismatch error. This corner is kept as-is.

use crate::error_codes::{AuditError, ErrorCode};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Output recorded when a script produced no value at all.
pub const NOTHING_RETURNED: &str = "§NOTHING_WAS_RETURNED!§";

/// Comparison operators accepted in `typeExpected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    Nil,
    Contains,
    ContainsReg,
}

impl Operator {
    /// All operators in their canonical spelling.
    pub const ALL: [Self; 9] = [
        Self::Eq,
        Self::Ne,
        Self::Ge,
        Self::Gt,
        Self::Le,
        Self::Lt,
        Self::Nil,
        Self::Contains,
        Self::ContainsReg,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Nil => "nil",
            Self::Contains => "contains",
            Self::ContainsReg => "containsReg",
        }
    }

    /// Whether the operator only makes sense for numbers.
    #[must_use]
    pub const fn is_ordering(&self) -> bool {
        matches!(self, Self::Ge | Self::Gt | Self::Le | Self::Lt)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = CompareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| CompareError::InvalidOperator(s.to_string()))
    }
}

/// Why two values could not be compared.
#[derive(Debug, Clone)]
pub enum CompareError {
    InvalidOperator(String),
    StringOperator(Operator),
    TypeMismatch,
    InvalidRegex { pattern: String, source: regex::Error },
}

impl CompareError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidOperator(_) => ErrorCode::InvalidOperator,
            Self::StringOperator(_) => ErrorCode::StringOperator,
            Self::TypeMismatch => ErrorCode::TypeMismatch,
            Self::InvalidRegex { .. } => ErrorCode::InvalidRegex,
        }
    }
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperator(op) => write!(f, "invalid operator: {op:?}"),
            Self::StringOperator(op) => write!(f, "{op} cannot be used on a string"),
            Self::TypeMismatch => write!(f, "cannot compare string and integer"),
            Self::InvalidRegex { pattern, source } => {
                write!(f, "invalid regular expression {pattern:?}: {source}")
            }
        }
    }
}

impl std::error::Error for CompareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRegex { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<&CompareError> for AuditError {
    fn from(err: &CompareError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Map the "nothing returned" sentinel back to an empty string.
#[must_use]
pub fn normalize_output(output: &str) -> &str {
    if output == NOTHING_RETURNED { "" } else { output }
}

/// Judge `output` against `expected` with the operator named `operator`.
pub fn compare(output: &str, expected: &str, operator: &str) -> Result<bool, CompareError> {
    let operator: Operator = operator.parse()?;
    compare_with(output, expected, operator)
}

/// [`compare`] with an already parsed operator.
pub fn compare_with(output: &str, expected: &str, operator: Operator) -> Result<bool, CompareError> {
    if operator == Operator::Nil {
        return Ok(true);
    }
    let output = normalize_output(output);

    match (output.parse::<i64>(), expected.parse::<i64>()) {
        (Ok(actual), Ok(wanted)) => match operator {
            Operator::Eq => Ok(actual == wanted),
            Operator::Ne => Ok(actual != wanted),
            Operator::Ge => Ok(actual >= wanted),
            Operator::Gt => Ok(actual > wanted),
            Operator::Le => Ok(actual <= wanted),
            Operator::Lt => Ok(actual < wanted),
            Operator::Contains | Operator::ContainsReg | Operator::Nil => {
                Err(CompareError::TypeMismatch)
            }
        },
        (Err(_), Err(_)) => match operator {
            Operator::Eq => Ok(output == expected),
            Operator::Ne => Ok(output != expected),
            Operator::Contains => Ok(output.contains(expected)),
            Operator::ContainsReg => {
                let regex = Regex::new(expected).map_err(|source| CompareError::InvalidRegex {
                    pattern: expected.to_string(),
                    source,
                })?;
                Ok(regex.is_match(output))
            }
            op => Err(CompareError::StringOperator(op)),
        },
        _ => Err(CompareError::TypeMismatch),
    }
}
