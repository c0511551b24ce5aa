use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{CohortError, Result};

pub const CONTINUOUS_CONCEPT_CLASS: &str = "MVP Continuous";
pub const ORDINAL_CONCEPT_CLASS: &str = "MVP Ordinal";
pub const TEXT_CONCEPT_CLASS: &str = "MVP Text";

const CONCEPT_ID_PREFIX: &str = "ID_";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Concept {
    pub concept_id: i64,
    pub concept_name: String,
    pub domain_id: String,
    pub domain_name: Option<String>,
}

/// Vocabulary row used to decide how a concept's observations carry their value.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConceptInfo {
    pub concept_id: i64,
    pub concept_name: String,
    pub concept_class_id: Option<String>,
}

/// Which observation column holds a concept's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConceptType {
    /// `value_as_concept_id`; zero is treated as "no value".
    Coded,
    /// `value_as_number`
    Numeric,
    /// `value_as_string`
    Text,
}

impl ConceptType {
    pub fn from_concept_class(concept_class: &str) -> Option<Self> {
        match concept_class {
            ORDINAL_CONCEPT_CLASS => Some(ConceptType::Coded),
            CONTINUOUS_CONCEPT_CLASS => Some(ConceptType::Numeric),
            TEXT_CONCEPT_CLASS => Some(ConceptType::Text),
            _ => None,
        }
    }

    /// Resolves the type of a vocabulary row, failing hard for unmapped classes.
    pub fn of(info: &ConceptInfo) -> Result<Self> {
        let concept_class = info.concept_class_id.as_deref().unwrap_or_default();
        Self::from_concept_class(concept_class).ok_or_else(|| CohortError::UnsupportedConceptType {
            concept_id: info.concept_id,
            concept_class: concept_class.to_string(),
        })
    }

    /// SQL predicate that holds when the observation row aliased `alias` carries a value.
    pub fn value_not_null_check(self, alias: &str) -> String {
        match self {
            ConceptType::Coded => format!(
                "{alias}.value_as_concept_id is not null and {alias}.value_as_concept_id != 0"
            ),
            ConceptType::Numeric => format!("{alias}.value_as_number is not null"),
            ConceptType::Text => format!("{alias}.value_as_string is not null"),
        }
    }
}

/// Missing-data statistics of one concept within one cohort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptStats {
    pub concept_id: i64,
    pub prefixed_concept_id: String,
    pub concept_name: String,
    pub domain_id: String,
    pub domain_name: Option<String>,
    pub cohort_size: i64,
    pub n_missing_ratio: f64,
}

/// Number of filtered subjects holding one value of the breakdown concept.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConceptBreakdown {
    pub value_as_concept_id: i64,
    pub concept_value: Option<String>,
    pub value_name: Option<String>,
    pub persons_in_cohort_with_value: i64,
}

pub fn prefixed_concept_id(concept_id: i64) -> String {
    format!("{CONCEPT_ID_PREFIX}{concept_id}")
}

pub fn parse_prefixed_concept_id(prefixed: &str) -> Result<i64> {
    prefixed
        .strip_prefix(CONCEPT_ID_PREFIX)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| {
            CohortError::InvalidArgument(format!("'{}' is not a prefixed concept id", prefixed))
        })
}
