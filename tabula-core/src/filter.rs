//! Filter clauses and their evaluation against records.
//!
//! A query carries a list of `{field, operator, value}` clauses combined with
//! AND. Malformed clauses (missing field, missing or unknown operator, an
//! `in` clause without a list) are dropped individually and reported in
//! [`FilterSet::ignored`]; the remaining clauses still apply. A filter
//! document that is not a JSON array is rejected outright.

use crate::value::parse_timestamp;
use crate::{CellValue, Record, ValidationError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (case-insensitive)
    Contains,
    /// Starts with (case-insensitive)
    StartsWith,
    /// Ends with (case-insensitive)
    EndsWith,
    /// Equal to any value in a list
    In,
}

impl FilterOperator {
    /// Parse an operator token. Symbols and names are both accepted.
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" | "equals" => FilterOperator::Eq,
            "!=" | "<>" | "ne" | "neq" => FilterOperator::Ne,
            ">" | "gt" => FilterOperator::Gt,
            "<" | "lt" => FilterOperator::Lt,
            ">=" | "gte" => FilterOperator::Gte,
            "<=" | "lte" => FilterOperator::Lte,
            "contains" => FilterOperator::Contains,
            "startswith" | "starts_with" => FilterOperator::StartsWith,
            "endswith" | "ends_with" => FilterOperator::EndsWith,
            "in" => FilterOperator::In,
            _ => return None,
        };
        Some(op)
    }
}

/// A single filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against
    pub value: serde_json::Value,
}

impl FilterExpr {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a contains filter.
    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Contains, value)
    }

    /// Evaluate this clause against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let cell = record.get(&self.field);
        let target = CellValue::from_json(&self.value);

        if cell.is_blank() {
            return match self.operator {
                FilterOperator::Eq => target.is_blank(),
                FilterOperator::Ne => !target.is_blank(),
                _ => false,
            };
        }

        match self.operator {
            FilterOperator::Eq => compare_cells(&cell, &target) == Some(Ordering::Equal),
            FilterOperator::Ne => compare_cells(&cell, &target) != Some(Ordering::Equal),
            FilterOperator::Gt => compare_cells(&cell, &target) == Some(Ordering::Greater),
            FilterOperator::Lt => compare_cells(&cell, &target) == Some(Ordering::Less),
            FilterOperator::Gte => matches!(
                compare_cells(&cell, &target),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::Lte => matches!(
                compare_cells(&cell, &target),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Contains => lowered(&cell).contains(&lowered(&target)),
            FilterOperator::StartsWith => lowered(&cell).starts_with(&lowered(&target)),
            FilterOperator::EndsWith => lowered(&cell).ends_with(&lowered(&target)),
            FilterOperator::In => match &self.value {
                serde_json::Value::Array(items) => items.iter().any(|item| {
                    compare_cells(&cell, &CellValue::from_json(item)) == Some(Ordering::Equal)
                }),
                _ => false,
            },
        }
    }
}

/// Compare two cells.
///
/// Numeric when either side is a number and both coerce, chronological when
/// either side is a timestamp (or both are timestamp text), boolean when
/// either side is a boolean, otherwise by text.
pub fn compare_cells(left: &CellValue, right: &CellValue) -> Option<Ordering> {
    let numeric = matches!(left, CellValue::Number(_)) || matches!(right, CellValue::Number(_));
    if numeric {
        if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
            return a.partial_cmp(&b);
        }
    }

    let temporal = matches!(left, CellValue::Timestamp(_))
        || matches!(right, CellValue::Timestamp(_))
        || (looks_temporal(left) && looks_temporal(right));
    if temporal {
        if let (Some(a), Some(b)) = (left.as_timestamp(), right.as_timestamp()) {
            return Some(a.cmp(&b));
        }
    }

    let boolean = matches!(left, CellValue::Bool(_)) || matches!(right, CellValue::Bool(_));
    if boolean {
        if let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) {
            return Some(a.cmp(&b));
        }
    }

    Some(left.to_string().cmp(&right.to_string()))
}

fn looks_temporal(cell: &CellValue) -> bool {
    cell.as_text().and_then(parse_timestamp).is_some()
}

fn lowered(cell: &CellValue) -> String {
    cell.to_string().to_lowercase()
}

/// A clause that was dropped during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredClause {
    pub index: usize,
    pub reason: String,
}

/// Parsed filter list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSet {
    pub clauses: Vec<FilterExpr>,
    pub ignored: Vec<IgnoredClause>,
}

impl FilterSet {
    pub fn new(clauses: Vec<FilterExpr>) -> Self {
        Self {
            clauses,
            ignored: Vec::new(),
        }
    }

    /// Parse a JSON-encoded filter array.
    ///
    /// Blank input means "no filters".
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ValidationError::InvalidValue {
                field: "filter".to_string(),
                reason: format!("not valid JSON: {}", e),
            })?;
        Self::from_json(&value)
    }

    /// Build from an already decoded JSON value, which must be an array.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let items = value.as_array().ok_or_else(|| ValidationError::InvalidValue {
            field: "filter".to_string(),
            reason: "expected an array of clauses".to_string(),
        })?;

        let mut set = FilterSet::default();
        for (index, item) in items.iter().enumerate() {
            match parse_clause(item) {
                Ok(clause) => set.clauses.push(clause),
                Err(reason) => {
                    tracing::warn!(index, %reason, "ignoring malformed filter clause");
                    set.ignored.push(IgnoredClause { index, reason });
                }
            }
        }
        Ok(set)
    }

    /// AND of all clauses. An empty set matches everything.
    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

fn parse_clause(item: &serde_json::Value) -> Result<FilterExpr, String> {
    let obj = item.as_object().ok_or("clause is not an object")?;
    let field = obj
        .get("field")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or("missing field")?;
    let token = obj
        .get("operator")
        .or_else(|| obj.get("op"))
        .and_then(|v| v.as_str())
        .ok_or("missing operator")?;
    let operator =
        FilterOperator::parse(token).ok_or_else(|| format!("unknown operator '{}'", token))?;
    let value = obj.get("value").cloned().unwrap_or(serde_json::Value::Null);
    if operator == FilterOperator::In && !value.is_array() {
        return Err("'in' requires a list value".to_string());
    }
    Ok(FilterExpr::new(field, operator, value))
}
