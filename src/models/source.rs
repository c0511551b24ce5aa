use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A warehouse registered in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Source {
    pub source_id: i64,
    pub source_name: String,
    #[serde(skip_serializing)]
    pub source_connection: String,
    #[serde(skip_serializing)]
    pub source_dialect: Option<String>,
}

/// Logical schema role inside a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceRole {
    ClinicalData,
    Results,
    Temp,
    Misc,
    Dbo,
}

impl SourceRole {
    /// `source_daimon.daimon_type` code for roles that are registered per source.
    pub fn daimon_type(self) -> Option<i64> {
        match self {
            SourceRole::ClinicalData => Some(0),
            SourceRole::Results => Some(2),
            SourceRole::Temp => Some(5),
            SourceRole::Misc | SourceRole::Dbo => None,
        }
    }

    /// Schema name for roles that never go through the daimon lookup.
    pub fn fixed_schema(self) -> Option<&'static str> {
        match self {
            SourceRole::Misc => Some("MISC"),
            SourceRole::Dbo => Some("DBO"),
            _ => None,
        }
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceRole::ClinicalData => "clinical-data",
            SourceRole::Results => "results",
            SourceRole::Temp => "temp",
            SourceRole::Misc => "misc",
            SourceRole::Dbo => "dbo",
        };
        f.write_str(name)
    }
}
