//! Composable SQL for subject sets.
//!
//! A [`SubjectSetQuery`] starts as the members of a population cohort and is
//! narrowed by predicates appended by the pair and concept filter builders.
//! Nothing is evaluated here; the engines in `repository` embed the final SQL
//! in their aggregate queries so subject lists never leave the warehouse.
//!
//! All values spliced into the SQL are `i64` ids, never caller strings. Ids are
//! inlined rather than bound so one statement text serves every `Any` backend
//! and filters nest as plain subqueries; text arguments such as names go
//! through `DataSource::fetch_all_bound` instead.

pub mod concepts;
pub mod pairs;

pub use concepts::{build_concept_filter, ConceptFilter, ValueEquals};
pub use pairs::{apply_pair_filter, build_pair_filter, PairFilterMode};

pub const COHORT_TABLE: &str = "cohort";
pub const OBSERVATION_TABLE: &str = "observation";
pub const CONCEPT_TABLE: &str = "concept";
pub const DOMAIN_TABLE: &str = "domain";

const DEFAULT_LABEL: &str = "population";

/// Schema-qualified table name.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// Comma separated id list for `IN (...)`. Callers must not pass an empty slice.
pub fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
pub struct SubjectSetQuery {
    label: String,
    results_schema: String,
    population_cohort_id: i64,
    predicates: Vec<String>,
    alias_counter: usize,
}

impl SubjectSetQuery {
    pub fn new(results_schema: &str, population_cohort_id: i64) -> Self {
        Self::labelled(results_schema, population_cohort_id, DEFAULT_LABEL)
    }

    /// The label is the alias of the population table and the prefix of every
    /// generated alias, so two labelled sets can share one statement.
    pub fn labelled(results_schema: &str, population_cohort_id: i64, label: &str) -> Self {
        Self {
            label: label.to_string(),
            results_schema: results_schema.to_string(),
            population_cohort_id,
            predicates: Vec::new(),
            alias_counter: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn results_schema(&self) -> &str {
        &self.results_schema
    }

    pub fn population_cohort_id(&self) -> i64 {
        self.population_cohort_id
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    /// Column holding the subject id of the running set.
    pub fn subject_column(&self) -> String {
        format!("{}.subject_id", self.label)
    }

    /// Returns an alias not used before in this query.
    pub fn next_alias(&mut self, kind: &str) -> String {
        let alias = format!("{}_{}_{}", self.label, kind, self.alias_counter);
        self.alias_counter += 1;
        alias
    }

    pub fn and_where(&mut self, predicate: String) {
        self.predicates.push(predicate);
    }

    /// `SELECT DISTINCT` of the subject ids in the set, single column `subject_id`.
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT DISTINCT {label}.subject_id FROM {table} {label} WHERE {label}.cohort_definition_id = {cohort}",
            label = self.label,
            table = qualified(&self.results_schema, COHORT_TABLE),
            cohort = self.population_cohort_id,
        );
        for predicate in &self.predicates {
            sql.push_str(" AND (");
            sql.push_str(predicate);
            sql.push(')');
        }
        sql
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM ({}) {}_count", self.to_sql(), self.label)
    }
}
