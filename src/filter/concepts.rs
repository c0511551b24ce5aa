use crate::models::ConceptType;

use super::{qualified, SubjectSetQuery, OBSERVATION_TABLE};

/// Subjects must have an observation of `concept_id` whose coded value is `value_as_concept_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueEquals {
    pub concept_id: i64,
    pub value_as_concept_id: i64,
}

/// Observation requirements layered on top of a subject set.
#[derive(Debug, Clone, Default)]
pub struct ConceptFilter {
    /// Concepts that must carry a value, with the type that says where the value lives.
    pub concepts: Vec<(i64, ConceptType)>,
    pub value_equals: Option<ValueEquals>,
    /// Concept the result will be grouped by; subjects need a coded value for it.
    pub breakdown_concept_id: Option<i64>,
}

impl ConceptFilter {
    pub fn new(concepts: Vec<(i64, ConceptType)>) -> Self {
        Self {
            concepts,
            ..Self::default()
        }
    }

    pub fn with_value_equals(mut self, concept_id: i64, value_as_concept_id: i64) -> Self {
        self.value_equals = Some(ValueEquals {
            concept_id,
            value_as_concept_id,
        });
        self
    }

    pub fn with_breakdown(mut self, breakdown_concept_id: i64) -> Self {
        self.breakdown_concept_id = Some(breakdown_concept_id);
        self
    }
}

/// Restricts `query` to subjects with qualifying observations in `clinical_schema`.
///
/// Every observation reference gets its own alias from the query, so the
/// same concept may appear more than once without ambiguous columns.
pub fn build_concept_filter(
    mut query: SubjectSetQuery,
    clinical_schema: &str,
    filter: &ConceptFilter,
) -> SubjectSetQuery {
    let observation_table = qualified(clinical_schema, OBSERVATION_TABLE);

    for &(concept_id, concept_type) in &filter.concepts {
        let alias = query.next_alias("obs_filter");
        let value_check = concept_type.value_not_null_check(&alias);
        let predicate =
            observation_exists(&observation_table, &alias, &query, concept_id, &value_check);
        query.and_where(predicate);
    }

    if let Some(value) = filter.value_equals {
        let alias = query.next_alias("obs_value");
        let value_check = format!("{}.value_as_concept_id = {}", alias, value.value_as_concept_id);
        let predicate =
            observation_exists(&observation_table, &alias, &query, value.concept_id, &value_check);
        query.and_where(predicate);
    }

    if let Some(breakdown_concept_id) = filter.breakdown_concept_id {
        let alias = query.next_alias("obs_breakdown");
        let value_check = ConceptType::Coded.value_not_null_check(&alias);
        let predicate = observation_exists(
            &observation_table,
            &alias,
            &query,
            breakdown_concept_id,
            &value_check,
        );
        query.and_where(predicate);
    }

    query
}

fn observation_exists(
    observation_table: &str,
    alias: &str,
    query: &SubjectSetQuery,
    concept_id: i64,
    value_check: &str,
) -> String {
    format!(
        "EXISTS (SELECT 1 FROM {table} {alias} WHERE {alias}.person_id = {subject} \
         AND {alias}.observation_concept_id = {concept_id} AND {value_check})",
        table = observation_table,
        subject = query.subject_column(),
    )
}
