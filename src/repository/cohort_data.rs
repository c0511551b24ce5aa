use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{CohortError, Result};
use crate::filter::{
    apply_pair_filter, build_concept_filter, build_pair_filter, id_list, ConceptFilter,
    PairFilterMode, SubjectSetQuery, ValueEquals, COHORT_TABLE, OBSERVATION_TABLE,
};
use crate::models::{
    CohortOverlapStats, CohortPair, ConceptType, HistogramValue, PersonConceptValue, SourceRole,
    ValidationOutcome,
};

use super::concept::ConceptRepository;
use super::source::{DataSource, SourceResolver};

const CASE_LABEL: &str = "case_subjects";
const CONTROL_LABEL: &str = "control_subjects";

pub struct CohortDataRepository {
    sources: Arc<SourceResolver>,
    concepts: ConceptRepository,
}

impl CohortDataRepository {
    pub fn new(sources: Arc<SourceResolver>) -> Self {
        Self {
            concepts: ConceptRepository::new(sources.clone()),
            sources,
        }
    }

    /// Number of subjects present in both the filtered case cohort and the
    /// filtered control cohort, where both sides additionally need
    /// `filter_concept_id` observed with value `filter_concept_value`.
    ///
    /// Case and control may be the same cohort.
    #[allow(clippy::too_many_arguments)]
    pub async fn cohort_overlap_stats(
        &self,
        source_id: i64,
        case_cohort_id: i64,
        control_cohort_id: i64,
        filter_concept_id: i64,
        filter_concept_value: i64,
        other_filter_concept_ids: &[i64],
        pairs: &[CohortPair],
    ) -> Result<CohortOverlapStats> {
        let value_equals = ValueEquals {
            concept_id: filter_concept_id,
            value_as_concept_id: filter_concept_value,
        };
        self.overlap(
            source_id,
            case_cohort_id,
            control_cohort_id,
            Some(value_equals),
            other_filter_concept_ids,
            pairs,
        )
        .await
    }

    pub async fn cohort_overlap_stats_without_value_filter(
        &self,
        source_id: i64,
        case_cohort_id: i64,
        control_cohort_id: i64,
        other_filter_concept_ids: &[i64],
        pairs: &[CohortPair],
    ) -> Result<CohortOverlapStats> {
        self.overlap(
            source_id,
            case_cohort_id,
            control_cohort_id,
            None,
            other_filter_concept_ids,
            pairs,
        )
        .await
    }

    /// Numeric values of `histogram_concept_id` for the population after the
    /// pair and concept filters, ordered by person.
    pub async fn histogram_data(
        &self,
        source_id: i64,
        cohort_id: i64,
        histogram_concept_id: i64,
        filter_concept_ids: &[i64],
        pairs: &[CohortPair],
    ) -> Result<Vec<HistogramValue>> {
        let concept_types = self.concepts.concept_types(source_id, filter_concept_ids).await?;
        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;

        let subjects = build_pair_filter(
            &results.schema,
            pairs,
            cohort_id,
            PairFilterMode::UnionAndIntersect,
        );
        let subjects =
            build_concept_filter(subjects, &omop.schema, &ConceptFilter::new(concept_types));

        let sql = format!(
            "SELECT histogram.person_id, \
             CAST(histogram.value_as_number AS DOUBLE PRECISION) AS value_as_number \
             FROM {observation} histogram \
             WHERE histogram.observation_concept_id = {histogram_concept_id} \
             AND {value_check} \
             AND histogram.person_id IN ({subjects}) \
             ORDER BY histogram.person_id, histogram.value_as_number",
            observation = omop.table(OBSERVATION_TABLE),
            value_check = ConceptType::Numeric.value_not_null_check("histogram"),
            subjects = subjects.to_sql(),
        );
        let values: Vec<HistogramValue> = omop.fetch_all(&sql).await?;

        tracing::info!(
            source_id,
            cohort_id,
            histogram_concept_id,
            pairs = pairs.len(),
            values = values.len(),
            "Retrieved histogram data"
        );
        Ok(values)
    }

    /// Raw observations of `concept_ids` for every member of the cohort,
    /// ordered by person and concept.
    pub async fn person_data(
        &self,
        source_id: i64,
        cohort_id: i64,
        concept_ids: &[i64],
    ) -> Result<Vec<PersonConceptValue>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }

        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;
        let sql = format!(
            "SELECT observation.person_id, observation.observation_concept_id AS concept_id, \
             observation.value_as_concept_id, \
             CAST(observation.value_as_number AS DOUBLE PRECISION) AS value_as_number, \
             observation.value_as_string \
             FROM {observation} observation \
             WHERE observation.observation_concept_id IN ({ids}) \
             AND observation.person_id IN (SELECT cohort.subject_id FROM {cohort} cohort \
             WHERE cohort.cohort_definition_id = {cohort_id}) \
             ORDER BY observation.person_id, observation.observation_concept_id",
            observation = omop.table(OBSERVATION_TABLE),
            cohort = results.table(COHORT_TABLE),
            ids = id_list(concept_ids),
        );
        let data: Vec<PersonConceptValue> = omop.fetch_all(&sql).await?;

        tracing::info!(source_id, cohort_id, rows = data.len(), "Retrieved person level data");
        Ok(data)
    }

    /// Counts, per concept, subjects recorded with more than one distinct coded
    /// value, and sums the counts.
    ///
    /// An empty `concept_ids` list checks nothing and yields `NotApplicable`.
    pub async fn validate_observation_data(
        &self,
        source_id: i64,
        concept_ids: &[i64],
    ) -> Result<ValidationOutcome> {
        if concept_ids.is_empty() {
            tracing::info!(source_id, "No concepts given, observation validation skipped");
            return Ok(ValidationOutcome::NotApplicable);
        }

        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let sql = format!(
            "SELECT multi_valued.observation_concept_id, COUNT(*) \
             FROM (SELECT observation.observation_concept_id, observation.person_id \
             FROM {observation} observation \
             WHERE observation.observation_concept_id IN ({ids}) \
             AND observation.value_as_concept_id != 0 \
             GROUP BY observation.observation_concept_id, observation.person_id \
             HAVING COUNT(DISTINCT observation.value_as_concept_id) > 1) multi_valued \
             GROUP BY multi_valued.observation_concept_id",
            observation = omop.table(OBSERVATION_TABLE),
            ids = id_list(concept_ids),
        );
        let per_concept: Vec<(i64, i64)> = omop.fetch_all(&sql).await?;

        let mut issues = 0;
        for (concept_id, persons) in per_concept {
            tracing::warn!(
                source_id,
                concept_id,
                persons,
                "Persons with more than one distinct value for a single-valued concept"
            );
            issues += persons;
        }

        tracing::info!(source_id, concepts = concept_ids.len(), issues, "Observation data validated");
        Ok(ValidationOutcome::Checked { issues })
    }

    async fn overlap(
        &self,
        source_id: i64,
        case_cohort_id: i64,
        control_cohort_id: i64,
        value_equals: Option<ValueEquals>,
        other_filter_concept_ids: &[i64],
        pairs: &[CohortPair],
    ) -> Result<CohortOverlapStats> {
        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;

        require_observations(&omop, other_filter_concept_ids).await?;
        let concept_types = self
            .concepts
            .concept_types(source_id, other_filter_concept_ids)
            .await?;

        let mut filter = ConceptFilter::new(concept_types);
        filter.value_equals = value_equals;

        let case = filtered_subjects(&results, &omop, case_cohort_id, CASE_LABEL, pairs, &filter);
        let control =
            filtered_subjects(&results, &omop, control_cohort_id, CONTROL_LABEL, pairs, &filter);

        let sql = format!(
            "SELECT COUNT(*) FROM ({} INTERSECT {}) case_control_overlap",
            case.to_sql(),
            control.to_sql()
        );
        let case_control_overlap = omop.fetch_count(&sql).await?;

        tracing::info!(
            source_id,
            case_cohort_id,
            control_cohort_id,
            pairs = pairs.len(),
            case_control_overlap,
            "Computed cohort overlap"
        );
        Ok(CohortOverlapStats {
            case_control_overlap,
        })
    }
}

fn filtered_subjects(
    results: &DataSource,
    omop: &DataSource,
    cohort_id: i64,
    label: &str,
    pairs: &[CohortPair],
    filter: &ConceptFilter,
) -> SubjectSetQuery {
    let population = SubjectSetQuery::labelled(&results.schema, cohort_id, label);
    let paired = apply_pair_filter(population, pairs, PairFilterMode::UnionAndIntersect);
    build_concept_filter(paired, &omop.schema, filter)
}

/// Fails when any concept has no observations at all: a zero overlap would
/// otherwise be indistinguishable from a misconfigured request.
async fn require_observations(omop: &DataSource, concept_ids: &[i64]) -> Result<()> {
    if concept_ids.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "SELECT DISTINCT observation.observation_concept_id FROM {} observation \
         WHERE observation.observation_concept_id IN ({})",
        omop.table(OBSERVATION_TABLE),
        id_list(concept_ids)
    );
    let observed: HashSet<i64> = omop
        .fetch_all::<(i64,)>(&sql)
        .await?
        .into_iter()
        .map(|(concept_id,)| concept_id)
        .collect();

    let mut missing: Vec<i64> = concept_ids
        .iter()
        .copied()
        .filter(|concept_id| !observed.contains(concept_id))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    missing.dedup();
    tracing::error!(concept_ids = ?missing, "Filter concepts without any observations");
    Err(CohortError::NoObservations(missing))
}
