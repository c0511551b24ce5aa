use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CohortDefinition {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Cohort definition with its subject count in one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortDefinitionStats {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub cohort_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortOverlapStats {
    pub case_control_overlap: i64,
}

/// One observation of a cohort member; exactly one value column is normally set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PersonConceptValue {
    pub person_id: i64,
    pub concept_id: i64,
    pub value_as_concept_id: Option<i64>,
    pub value_as_number: Option<f64>,
    pub value_as_string: Option<String>,
}

/// Numeric value of the histogram concept for one filtered subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistogramValue {
    pub person_id: i64,
    pub value_as_number: f64,
}

/// Result of the multi-valued observation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// No concept ids were given, so nothing was checked.
    NotApplicable,
    /// Subjects found with more than one distinct coded value, summed over concepts.
    Checked { issues: i64 },
}

impl ValidationOutcome {
    /// Legacy integer form: `-1` for not applicable, otherwise the issue count.
    pub fn as_sentinel(self) -> i64 {
        match self {
            ValidationOutcome::NotApplicable => -1,
            ValidationOutcome::Checked { issues } => issues,
        }
    }
}
