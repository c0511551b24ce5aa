use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CohortError, Result};
use crate::filter::{
    build_concept_filter, build_pair_filter, id_list, ConceptFilter, PairFilterMode,
    COHORT_TABLE, CONCEPT_TABLE, DOMAIN_TABLE, OBSERVATION_TABLE,
};
use crate::models::concept::prefixed_concept_id;
use crate::models::{
    CohortPair, Concept, ConceptBreakdown, ConceptInfo, ConceptStats, ConceptType, SourceRole,
};

use super::source::SourceResolver;

pub struct ConceptRepository {
    sources: Arc<SourceResolver>,
}

impl ConceptRepository {
    pub fn new(sources: Arc<SourceResolver>) -> Self {
        Self { sources }
    }

    /// Vocabulary entry of one concept.
    pub async fn concept_info(&self, source_id: i64, concept_id: i64) -> Result<ConceptInfo> {
        let mut infos = self.concept_infos(source_id, &[concept_id]).await?;
        infos.pop().ok_or(CohortError::ConceptNotFound(concept_id))
    }

    /// Observation type of every concept, in input order.
    ///
    /// Unknown concepts and unmapped concept classes are errors: a filter
    /// built on a guessed type would silently produce wrong statistics.
    pub async fn concept_types(
        &self,
        source_id: i64,
        concept_ids: &[i64],
    ) -> Result<Vec<(i64, ConceptType)>> {
        let infos: HashMap<i64, ConceptInfo> = self
            .concept_infos(source_id, concept_ids)
            .await?
            .into_iter()
            .map(|info| (info.concept_id, info))
            .collect();

        concept_ids
            .iter()
            .map(|concept_id| {
                let info = infos
                    .get(concept_id)
                    .ok_or(CohortError::ConceptNotFound(*concept_id))?;
                Ok((*concept_id, ConceptType::of(info)?))
            })
            .collect()
    }

    /// Per concept, the share of cohort subjects without any recorded value.
    ///
    /// Concepts missing from the vocabulary are left out of the result.
    pub async fn concept_stats(
        &self,
        source_id: i64,
        cohort_id: i64,
        concept_ids: &[i64],
    ) -> Result<Vec<ConceptStats>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }

        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;

        let concepts_sql = format!(
            "SELECT concept.concept_id, concept.concept_name, concept.domain_id, concept_domain.domain_name \
             FROM {concept} concept \
             LEFT JOIN {domain} concept_domain ON concept_domain.domain_id = concept.domain_id \
             WHERE concept.concept_id IN ({ids}) \
             ORDER BY concept.concept_name",
            concept = omop.table(CONCEPT_TABLE),
            domain = omop.table(DOMAIN_TABLE),
            ids = id_list(concept_ids),
        );
        let concepts: Vec<Concept> = omop.fetch_all(&concepts_sql).await?;

        let cohort_members = format!(
            "SELECT cohort.subject_id FROM {} cohort WHERE cohort.cohort_definition_id = {}",
            results.table(COHORT_TABLE),
            cohort_id
        );
        let cohort_size = omop
            .fetch_count(&format!(
                "SELECT COUNT(DISTINCT members.subject_id) FROM ({}) members",
                cohort_members
            ))
            .await?;

        let persons_with_data: HashMap<i64, i64> = if cohort_size == 0 || concepts.is_empty() {
            HashMap::new()
        } else {
            let counts_sql = format!(
                "SELECT observation.observation_concept_id, COUNT(DISTINCT observation.person_id) \
                 FROM {observation} observation \
                 WHERE observation.observation_concept_id IN ({ids}) \
                 AND ((observation.value_as_concept_id is not null and observation.value_as_concept_id != 0) \
                 OR observation.value_as_number is not null \
                 OR observation.value_as_string is not null) \
                 AND observation.person_id IN ({members}) \
                 GROUP BY observation.observation_concept_id",
                observation = omop.table(OBSERVATION_TABLE),
                ids = id_list(concept_ids),
                members = cohort_members,
            );
            let counts: Vec<(i64, i64)> = omop.fetch_all(&counts_sql).await?;
            counts.into_iter().collect()
        };

        let stats = concepts
            .into_iter()
            .map(|concept| {
                let with_data = persons_with_data
                    .get(&concept.concept_id)
                    .copied()
                    .unwrap_or(0);
                ConceptStats {
                    prefixed_concept_id: prefixed_concept_id(concept.concept_id),
                    concept_id: concept.concept_id,
                    concept_name: concept.concept_name,
                    domain_id: concept.domain_id,
                    domain_name: concept.domain_name,
                    cohort_size,
                    n_missing_ratio: missing_ratio(cohort_size, with_data),
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            source_id,
            cohort_id,
            cohort_size,
            concepts = stats.len(),
            "Computed missing data ratios"
        );
        Ok(stats)
    }

    /// Counts distinct subjects per coded value of `breakdown_concept_id`
    /// after applying the pair and concept filters to the population.
    ///
    /// Subjects without a value are not counted. A subject holding several
    /// values is counted once per value, so the counts can add up to more
    /// than the population.
    pub async fn breakdown_stats(
        &self,
        source_id: i64,
        population_cohort_id: i64,
        filter_concept_ids: &[i64],
        pairs: &[CohortPair],
        breakdown_concept_id: i64,
    ) -> Result<Vec<ConceptBreakdown>> {
        let concept_types = self.concept_types(source_id, filter_concept_ids).await?;
        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;

        let subjects = build_pair_filter(
            &results.schema,
            pairs,
            population_cohort_id,
            PairFilterMode::UnionAndIntersect,
        );
        let subjects = build_concept_filter(
            subjects,
            &omop.schema,
            &ConceptFilter::new(concept_types).with_breakdown(breakdown_concept_id),
        );

        let sql = format!(
            "SELECT breakdown.value_as_concept_id, value_concept.concept_code AS concept_value, \
             value_concept.concept_name AS value_name, \
             COUNT(DISTINCT breakdown.person_id) AS persons_in_cohort_with_value \
             FROM {observation} breakdown \
             LEFT JOIN {concept} value_concept ON value_concept.concept_id = breakdown.value_as_concept_id \
             WHERE breakdown.observation_concept_id = {breakdown_concept_id} \
             AND {value_check} \
             AND breakdown.person_id IN ({subjects}) \
             GROUP BY breakdown.value_as_concept_id, value_concept.concept_code, value_concept.concept_name \
             ORDER BY value_concept.concept_name, breakdown.value_as_concept_id",
            observation = omop.table(OBSERVATION_TABLE),
            concept = omop.table(CONCEPT_TABLE),
            value_check = ConceptType::Coded.value_not_null_check("breakdown"),
            subjects = subjects.to_sql(),
        );

        let stats: Vec<ConceptBreakdown> = omop.fetch_all(&sql).await?;
        tracing::info!(
            source_id,
            population_cohort_id,
            breakdown_concept_id,
            pairs = pairs.len(),
            values = stats.len(),
            "Computed breakdown"
        );
        Ok(stats)
    }

    /// Breakdown of a whole cohort, without pair or concept filters.
    pub async fn breakdown_stats_for_cohort(
        &self,
        source_id: i64,
        cohort_id: i64,
        breakdown_concept_id: i64,
    ) -> Result<Vec<ConceptBreakdown>> {
        self.breakdown_stats(source_id, cohort_id, &[], &[], breakdown_concept_id)
            .await
    }

    async fn concept_infos(&self, source_id: i64, concept_ids: &[i64]) -> Result<Vec<ConceptInfo>> {
        if concept_ids.is_empty() {
            return Ok(Vec::new());
        }

        let omop = self.sources.resolve(source_id, SourceRole::ClinicalData).await?;
        let sql = format!(
            "SELECT concept.concept_id, concept.concept_name, concept.concept_class_id \
             FROM {} concept WHERE concept.concept_id IN ({})",
            omop.table(CONCEPT_TABLE),
            id_list(concept_ids)
        );
        omop.fetch_all(&sql).await
    }
}

/// Share of `cohort_size` subjects lacking a value; zero for an empty cohort.
pub fn missing_ratio(cohort_size: i64, persons_with_data: i64) -> f64 {
    if cohort_size <= 0 {
        return 0.0;
    }
    let missing = (cohort_size - persons_with_data).clamp(0, cohort_size);
    missing as f64 / cohort_size as f64
}
