//! Filters: one `field op value` condition of a query plan.
//!
//! A [`Filter`] can only be obtained through [`Filter::new`] (or one of its
//! shorthands), and JSON decoding goes through the same constructor, so every
//! `Filter` in the process satisfies the operator/value-shape rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FilterValidationError;

/// Catalog dimensions a filter can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterField {
    Publisher,
    /// City-level place of publication.
    Place,
    /// National-level country of publication.
    Country,
    Year,
    Language,
    Title,
    Subject,
    /// Agent name as written in the record.
    Agent,
    /// Agent name after index-time normalization.
    AgentNorm,
    AgentRole,
    AgentType,
}

impl FilterField {
    pub const ALL: [FilterField; 11] = [
        Self::Publisher,
        Self::Place,
        Self::Country,
        Self::Year,
        Self::Language,
        Self::Title,
        Self::Subject,
        Self::Agent,
        Self::AgentNorm,
        Self::AgentRole,
        Self::AgentType,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Place => "place",
            Self::Country => "country",
            Self::Year => "year",
            Self::Language => "language",
            Self::Title => "title",
            Self::Subject => "subject",
            Self::Agent => "agent",
            Self::AgentNorm => "agent_norm",
            Self::AgentRole => "agent_role",
            Self::AgentType => "agent_type",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterField {
    type Err = FilterValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| FilterValidationError::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Equals,
    Contains,
    Range,
    In,
}

impl FilterOp {
    pub const ALL: [FilterOp; 4] = [Self::Equals, Self::Contains, Self::Range, Self::In];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Range => "range",
            Self::In => "in",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = FilterValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| FilterValidationError::UnknownOperator(s.to_string()))
    }
}

/// Value payload; its shape must agree with the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Range { start: i32, end: i32 },
    Set(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FilterWire", into = "FilterWire")]
pub struct Filter {
    field: FilterField,
    op: FilterOp,
    value: FilterValue,
    negate: bool,
    confidence: Option<f64>,
    notes: Option<String>,
}

impl Filter {
    pub fn new(
        field: FilterField,
        op: FilterOp,
        value: FilterValue,
    ) -> Result<Self, FilterValidationError> {
        let value = validate_value(field, op, value)?;
        Ok(Self {
            field,
            op,
            value,
            negate: false,
            confidence: None,
            notes: None,
        })
    }

    pub fn equals(field: FilterField, value: impl Into<String>) -> Result<Self, FilterValidationError> {
        Self::new(field, FilterOp::Equals, FilterValue::Text(value.into()))
    }

    pub fn contains(field: FilterField, value: impl Into<String>) -> Result<Self, FilterValidationError> {
        Self::new(field, FilterOp::Contains, FilterValue::Text(value.into()))
    }

    pub fn range(field: FilterField, start: i32, end: i32) -> Result<Self, FilterValidationError> {
        Self::new(field, FilterOp::Range, FilterValue::Range { start, end })
    }

    pub fn one_of<I, S>(field: FilterField, values: I) -> Result<Self, FilterValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = values.into_iter().map(Into::into).collect();
        Self::new(field, FilterOp::In, FilterValue::Set(set))
    }

    #[must_use]
    pub fn negated(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Result<Self, FilterValidationError> {
        self.confidence = Some(validate_confidence(confidence)?);
        Ok(self)
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn field(&self) -> FilterField {
        self.field
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    pub fn negate(&self) -> bool {
        self.negate
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// The single string for `equals` / `contains`.
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            FilterValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bounds(&self) -> Option<(i32, i32)> {
        match self.value {
            FilterValue::Range { start, end } => Some((start, end)),
            _ => None,
        }
    }

    pub fn set(&self) -> Option<&[String]> {
        match &self.value {
            FilterValue::Set(values) => Some(values),
            _ => None,
        }
    }

    /// The filter value as shown to users (`'x'`, `1500-1599`, `('a', 'b')`).
    pub fn display_value(&self) -> String {
        match &self.value {
            FilterValue::Text(text) => format!("'{text}'"),
            FilterValue::Range { start, end } => format!("{start}-{end}"),
            FilterValue::Set(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
                format!("({})", quoted.join(", "))
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("NOT ")?;
        }
        write!(f, "{} {} {}", self.field, self.op, self.display_value())
    }
}

fn validate_confidence(confidence: f64) -> Result<f64, FilterValidationError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(FilterValidationError::ConfidenceOutOfRange(confidence))
    }
}

fn validate_value(
    field: FilterField,
    op: FilterOp,
    value: FilterValue,
) -> Result<FilterValue, FilterValidationError> {
    match (op, value) {
        (FilterOp::Equals | FilterOp::Contains, FilterValue::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(FilterValidationError::EmptyValue { field, op });
            }
            if field == FilterField::Year && op == FilterOp::Equals && text.parse::<i32>().is_err() {
                return Err(FilterValidationError::NonNumericYear {
                    op,
                    value: text.to_string(),
                });
            }
            Ok(FilterValue::Text(text.to_string()))
        }
        (FilterOp::Equals | FilterOp::Contains, _) => Err(FilterValidationError::ValueShape {
            field,
            op,
            expected: "a single string value",
        }),
        (FilterOp::Range, FilterValue::Range { start, end }) => {
            if start > end {
                Err(FilterValidationError::InvertedRange { field, start, end })
            } else {
                Ok(FilterValue::Range { start, end })
            }
        }
        (FilterOp::Range, _) => Err(FilterValidationError::ValueShape {
            field,
            op,
            expected: "integer `start` and `end` bounds",
        }),
        (FilterOp::In, FilterValue::Set(values)) => {
            let trimmed: Vec<String> = values.iter().map(|v| v.trim().to_string()).collect();
            if trimmed.is_empty() || trimmed.iter().any(String::is_empty) {
                return Err(FilterValidationError::EmptySet { field });
            }
            Ok(FilterValue::Set(trimmed))
        }
        (FilterOp::In, _) => Err(FilterValidationError::ValueShape {
            field,
            op,
            expected: "an array of strings",
        }),
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// JSON shape of a filter: `{field, op, value | start+end, negate, confidence, notes}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterWire {
    field: String,
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<WireValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<i32>,
    #[serde(default)]
    negate: bool,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Text(String),
    Set(Vec<String>),
    // Models sometimes emit a bare integer for `year equals`.
    Integer(i64),
}

impl TryFrom<FilterWire> for Filter {
    type Error = FilterValidationError;

    fn try_from(wire: FilterWire) -> Result<Self, Self::Error> {
        let field: FilterField = wire.field.parse()?;
        let op: FilterOp = wire.op.parse()?;

        let value = match (op, wire.value, wire.start, wire.end) {
            (FilterOp::Range, _, Some(start), Some(end)) => FilterValue::Range { start, end },
            (FilterOp::Range, _, _, _) => {
                return Err(FilterValidationError::ValueShape {
                    field,
                    op,
                    expected: "integer `start` and `end` bounds",
                })
            }
            (FilterOp::In, Some(WireValue::Set(values)), _, _) => FilterValue::Set(values),
            (FilterOp::In, Some(WireValue::Text(text)), _, _) => FilterValue::Set(vec![text]),
            (_, Some(WireValue::Text(text)), _, _) => FilterValue::Text(text),
            (_, Some(WireValue::Integer(n)), _, _) => FilterValue::Text(n.to_string()),
            (_, Some(WireValue::Set(_)) | None, _, _) => {
                return Err(FilterValidationError::ValueShape {
                    field,
                    op,
                    expected: match op {
                        FilterOp::In => "an array of strings",
                        _ => "a single string value",
                    },
                })
            }
        };

        let mut filter = Filter::new(field, op, value)?.negated(wire.negate);
        if let Some(confidence) = wire.confidence {
            filter = filter.with_confidence(confidence)?;
        }
        filter.notes = wire.notes;
        Ok(filter)
    }
}

impl From<Filter> for FilterWire {
    fn from(filter: Filter) -> Self {
        let (value, start, end) = match filter.value {
            FilterValue::Text(text) => (Some(WireValue::Text(text)), None, None),
            FilterValue::Range { start, end } => (None, Some(start), Some(end)),
            FilterValue::Set(values) => (Some(WireValue::Set(values)), None, None),
        };
        Self {
            field: filter.field.as_str().to_string(),
            op: filter.op.as_str().to_string(),
            value,
            start,
            end,
            negate: filter.negate,
            confidence: filter.confidence,
            notes: filter.notes,
        }
    }
}
