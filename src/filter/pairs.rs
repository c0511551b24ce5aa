use crate::models::CohortPair;

use super::{qualified, SubjectSetQuery, COHORT_TABLE};

/// How the pairs combine with the running subject set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairFilterMode {
    /// Each pair contributes `(A ∪ B) − (A ∩ B)`, intersected with the running set.
    #[default]
    UnionAndIntersect,
}

/// Subjects of the population cohort that survive every pair.
///
/// An empty `pairs` slice leaves the population untouched. A pair whose two
/// cohorts are equal contributes nothing, so the whole result is empty.
pub fn build_pair_filter(
    results_schema: &str,
    pairs: &[CohortPair],
    population_cohort_id: i64,
    mode: PairFilterMode,
) -> SubjectSetQuery {
    apply_pair_filter(
        SubjectSetQuery::new(results_schema, population_cohort_id),
        pairs,
        mode,
    )
}

/// Narrows an existing subject set by `pairs`.
///
/// Pairs are normalized, sorted and deduplicated first, so every permutation
/// of the same pairs yields the same SQL text.
pub fn apply_pair_filter(
    mut query: SubjectSetQuery,
    pairs: &[CohortPair],
    mode: PairFilterMode,
) -> SubjectSetQuery {
    if let Some(pair) = pairs.iter().find(|pair| pair.is_degenerate()) {
        tracing::debug!(
            cohort_id = pair.cohort_id1,
            pair = %pair.provided_name,
            "Pair of identical cohorts, subject set will be empty"
        );
    }

    let mut normalized: Vec<(i64, i64)> = pairs.iter().map(CohortPair::normalized).collect();
    normalized.sort_unstable();
    normalized.dedup();

    for (first, second) in normalized {
        let predicate = match mode {
            PairFilterMode::UnionAndIntersect => {
                union_minus_intersection(&mut query, first, second)
            }
        };
        query.and_where(predicate);
    }

    query
}

fn union_minus_intersection(query: &mut SubjectSetQuery, first: i64, second: i64) -> String {
    let cohort_table = qualified(query.results_schema(), COHORT_TABLE);
    let subject = query.subject_column();
    let union_alias = query.next_alias("pair_union");
    let first_alias = query.next_alias("pair_first");
    let second_alias = query.next_alias("pair_second");

    format!(
        "EXISTS (SELECT 1 FROM {table} {u} WHERE {u}.subject_id = {subject} \
         AND {u}.cohort_definition_id IN ({first}, {second})) \
         AND NOT EXISTS (SELECT 1 FROM {table} {a} INNER JOIN {table} {b} ON {b}.subject_id = {a}.subject_id \
         WHERE {a}.subject_id = {subject} AND {a}.cohort_definition_id = {first} \
         AND {b}.cohort_definition_id = {second})",
        table = cohort_table,
        u = union_alias,
        a = first_alias,
        b = second_alias,
    )
}
