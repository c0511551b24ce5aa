use serde::{Deserialize, Serialize};

/// Dichotomous variable made of two cohorts: subjects in exactly one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortPair {
    pub cohort_id1: i64,
    pub cohort_id2: i64,
    #[serde(default)]
    pub provided_name: String,
}

impl CohortPair {
    pub fn new(cohort_id1: i64, cohort_id2: i64, provided_name: impl Into<String>) -> Self {
        Self {
            cohort_id1,
            cohort_id2,
            provided_name: provided_name.into(),
        }
    }

    /// Union-minus-intersection is symmetric, so `(a, b)` and `(b, a)` select the same subjects.
    pub fn normalized(&self) -> (i64, i64) {
        if self.cohort_id1 <= self.cohort_id2 {
            (self.cohort_id1, self.cohort_id2)
        } else {
            (self.cohort_id2, self.cohort_id1)
        }
    }

    /// A pair of the same cohort twice selects nobody.
    pub fn is_degenerate(&self) -> bool {
        self.cohort_id1 == self.cohort_id2
    }
}

/// Every cohort referenced by a request: the population plus both sides of each pair, deduplicated.
pub fn unique_cohort_ids(population_cohort_id: i64, pairs: &[CohortPair]) -> Vec<i64> {
    let mut ids = vec![population_cohort_id];
    for pair in pairs {
        ids.push(pair.cohort_id1);
        ids.push(pair.cohort_id2);
    }
    ids.sort_unstable();
    ids.dedup();
    ids
}
