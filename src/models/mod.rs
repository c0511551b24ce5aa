pub mod cohort;
pub mod concept;
pub mod pair;
pub mod source;

pub use cohort::{
    CohortDefinition, CohortDefinitionStats, CohortOverlapStats, HistogramValue, PersonConceptValue,
    ValidationOutcome,
};
pub use concept::{Concept, ConceptBreakdown, ConceptInfo, ConceptStats, ConceptType};
pub use pair::{unique_cohort_ids, CohortPair};
pub use source::{Source, SourceRole};
