pub mod cohort;
pub mod cohort_data;
pub mod concept;
pub mod source;

pub use cohort::CohortRepository;
pub use cohort_data::CohortDataRepository;
pub use concept::ConceptRepository;
pub use source::{DataSource, SourceResolver, UrlConnector, WarehouseConnector};
