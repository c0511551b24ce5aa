#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cohort_stats::error::Result;
use cohort_stats::models::Source;
use cohort_stats::repository::{SourceResolver, WarehouseConnector};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

/// Source with clinical data and results daimons, both in the `main` schema.
pub const SOURCE_ID: i64 = 1;
/// Source registered with a clinical data daimon only.
pub const PARTIAL_SOURCE_ID: i64 = 2;

pub const SCHEMA: &str = "main";

// Vocabulary used across the tests.
pub const SMOKING: i64 = 2000000324;
pub const SMOKING_CURRENT: i64 = 2000000325;
pub const SMOKING_NEVER: i64 = 2000000326;
pub const BMI: i64 = 2000006885;
pub const NOTES: i64 = 2000006886;
pub const UNSUPPORTED: i64 = 2000000999;

const SCHEMA_DDL: &[&str] = &[
    "CREATE TABLE source (source_id INTEGER PRIMARY KEY, source_name TEXT NOT NULL, \
     source_connection TEXT NOT NULL, source_dialect TEXT)",
    "CREATE TABLE source_daimon (source_id INTEGER NOT NULL, daimon_type INTEGER NOT NULL, \
     table_qualifier TEXT NOT NULL)",
    "CREATE TABLE cohort_definition (id INTEGER PRIMARY KEY, name TEXT NOT NULL, description TEXT)",
    "CREATE TABLE cohort_definition_team_project (cohort_definition_id INTEGER NOT NULL, \
     team_project TEXT NOT NULL)",
    "CREATE TABLE cohort (cohort_definition_id INTEGER NOT NULL, subject_id INTEGER NOT NULL)",
    "CREATE TABLE observation (person_id INTEGER NOT NULL, observation_concept_id INTEGER NOT NULL, \
     value_as_concept_id INTEGER, value_as_number REAL, value_as_string TEXT)",
    "CREATE TABLE concept (concept_id INTEGER PRIMARY KEY, concept_name TEXT NOT NULL, \
     domain_id TEXT NOT NULL, concept_class_id TEXT, concept_code TEXT)",
    "CREATE TABLE domain (domain_id TEXT PRIMARY KEY, domain_name TEXT NOT NULL)",
];

/// Test helper to create an in-memory database holding both the metadata
/// store and the warehouse tables.
///
/// A single connection that never expires keeps the in-memory database alive
/// for the whole test.
pub async fn setup_test_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    for statement in SCHEMA_DDL {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create schema");
    }

    register_source(&pool, SOURCE_ID, "Test warehouse", &[0, 2]).await;
    register_source(&pool, PARTIAL_SOURCE_ID, "Clinical only", &[0]).await;
    insert_domain(&pool, "Observation", "Observation").await;
    insert_concept(&pool, SMOKING, "Smoking status", "MVP Ordinal", None).await;
    insert_concept(&pool, SMOKING_CURRENT, "Current smoker", "Answer", Some("SMOKE_CURRENT")).await;
    insert_concept(&pool, SMOKING_NEVER, "Never smoked", "Answer", Some("SMOKE_NEVER")).await;
    insert_concept(&pool, BMI, "Body mass index", "MVP Continuous", None).await;
    insert_concept(&pool, NOTES, "Free text notes", "MVP Text", None).await;
    insert_concept(&pool, UNSUPPORTED, "Lab panel", "Lab Test", None).await;

    pool
}

/// Hands out the shared test pool for every source and counts the calls.
pub struct SharedPoolConnector {
    pool: AnyPool,
    pub connects: AtomicUsize,
}

impl SharedPoolConnector {
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseConnector for SharedPoolConnector {
    async fn connect(&self, _source: &Source) -> Result<AnyPool> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.pool.clone())
    }
}

pub fn resolver(pool: &AnyPool) -> Arc<SourceResolver> {
    resolver_with(pool, Arc::new(SharedPoolConnector::new(pool.clone())))
}

pub fn resolver_with(pool: &AnyPool, connector: Arc<SharedPoolConnector>) -> Arc<SourceResolver> {
    Arc::new(SourceResolver::new(
        pool.clone(),
        SCHEMA,
        connector,
        Duration::from_secs(30),
    ))
}

pub async fn register_source(pool: &AnyPool, source_id: i64, name: &str, daimon_types: &[i64]) {
    sqlx::query("INSERT INTO source (source_id, source_name, source_connection, source_dialect) VALUES (?, ?, ?, ?)")
        .bind(source_id)
        .bind(name)
        .bind("sqlite::memory:")
        .bind("sqlite")
        .execute(pool)
        .await
        .expect("Failed to insert source");

    for daimon_type in daimon_types {
        sqlx::query("INSERT INTO source_daimon (source_id, daimon_type, table_qualifier) VALUES (?, ?, ?)")
            .bind(source_id)
            .bind(*daimon_type)
            .bind(SCHEMA)
            .execute(pool)
            .await
            .expect("Failed to insert source daimon");
    }
}

pub async fn insert_domain(pool: &AnyPool, domain_id: &str, domain_name: &str) {
    sqlx::query("INSERT INTO domain (domain_id, domain_name) VALUES (?, ?)")
        .bind(domain_id)
        .bind(domain_name)
        .execute(pool)
        .await
        .expect("Failed to insert domain");
}

pub async fn insert_concept(
    pool: &AnyPool,
    concept_id: i64,
    name: &str,
    concept_class: &str,
    code: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO concept (concept_id, concept_name, domain_id, concept_class_id, concept_code) \
         VALUES (?, ?, 'Observation', ?, ?)",
    )
    .bind(concept_id)
    .bind(name)
    .bind(concept_class)
    .bind(code.map(str::to_string))
    .execute(pool)
    .await
    .expect("Failed to insert concept");
}

pub async fn insert_cohort_definition(pool: &AnyPool, cohort_id: i64, name: &str) {
    sqlx::query("INSERT INTO cohort_definition (id, name, description) VALUES (?, ?, ?)")
        .bind(cohort_id)
        .bind(name)
        .bind(format!("{} description", name))
        .execute(pool)
        .await
        .expect("Failed to insert cohort definition");
}

pub async fn insert_cohort(pool: &AnyPool, cohort_id: i64, subjects: impl IntoIterator<Item = i64>) {
    for subject_id in subjects {
        sqlx::query("INSERT INTO cohort (cohort_definition_id, subject_id) VALUES (?, ?)")
            .bind(cohort_id)
            .bind(subject_id)
            .execute(pool)
            .await
            .expect("Failed to insert cohort member");
    }
}

pub async fn insert_team_project(pool: &AnyPool, cohort_id: i64, team_project: &str) {
    sqlx::query("INSERT INTO cohort_definition_team_project (cohort_definition_id, team_project) VALUES (?, ?)")
        .bind(cohort_id)
        .bind(team_project)
        .execute(pool)
        .await
        .expect("Failed to insert team project");
}

/// Coded observation; `None` stores a row without a value.
pub async fn observe_coded(pool: &AnyPool, person_id: i64, concept_id: i64, value: Option<i64>) {
    sqlx::query(
        "INSERT INTO observation (person_id, observation_concept_id, value_as_concept_id) VALUES (?, ?, ?)",
    )
    .bind(person_id)
    .bind(concept_id)
    .bind(value)
    .execute(pool)
    .await
    .expect("Failed to insert observation");
}

pub async fn observe_number(pool: &AnyPool, person_id: i64, concept_id: i64, value: Option<f64>) {
    sqlx::query(
        "INSERT INTO observation (person_id, observation_concept_id, value_as_number) VALUES (?, ?, ?)",
    )
    .bind(person_id)
    .bind(concept_id)
    .bind(value)
    .execute(pool)
    .await
    .expect("Failed to insert observation");
}

pub async fn observe_text(pool: &AnyPool, person_id: i64, concept_id: i64, value: Option<&str>) {
    sqlx::query(
        "INSERT INTO observation (person_id, observation_concept_id, value_as_string) VALUES (?, ?, ?)",
    )
    .bind(person_id)
    .bind(concept_id)
    .bind(value.map(str::to_string))
    .execute(pool)
    .await
    .expect("Failed to insert observation");
}
