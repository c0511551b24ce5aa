use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::filter::{id_list, COHORT_TABLE};
use crate::models::{CohortDefinition, CohortDefinitionStats, SourceRole};

use super::source::SourceResolver;

const DEFINITION_TABLE: &str = "cohort_definition";
const TEAM_PROJECT_TABLE: &str = "cohort_definition_team_project";

pub struct CohortRepository {
    sources: Arc<SourceResolver>,
}

impl CohortRepository {
    pub fn new(sources: Arc<SourceResolver>) -> Self {
        Self { sources }
    }

    pub async fn definition_by_id(&self, cohort_id: i64) -> Result<Option<CohortDefinition>> {
        let metadata = self.sources.metadata();
        let sql = format!(
            "SELECT cohort_definition.id, cohort_definition.name, cohort_definition.description \
             FROM {} cohort_definition WHERE cohort_definition.id = {}",
            metadata.table(DEFINITION_TABLE),
            cohort_id
        );
        let mut definitions: Vec<CohortDefinition> = metadata.fetch_all(&sql).await?;
        Ok(definitions.pop())
    }

    pub async fn definition_by_name(&self, name: &str) -> Result<Option<CohortDefinition>> {
        let metadata = self.sources.metadata();
        let sql = format!(
            "SELECT cohort_definition.id, cohort_definition.name, cohort_definition.description \
             FROM {} cohort_definition WHERE cohort_definition.name = $1 \
             ORDER BY cohort_definition.id",
            metadata.table(DEFINITION_TABLE)
        );
        let definitions: Vec<CohortDefinition> = metadata.fetch_all_bound(&sql, name).await?;
        Ok(definitions.into_iter().next())
    }

    /// Every cohort with at least one member in the source, largest first.
    ///
    /// Names live in the metadata store and membership in the warehouse, so
    /// the two are read separately and merged here.
    pub async fn definitions_with_stats(&self, source_id: i64) -> Result<Vec<CohortDefinitionStats>> {
        let results = self.sources.resolve(source_id, SourceRole::Results).await?;
        let sizes_sql = format!(
            "SELECT cohort.cohort_definition_id, COUNT(DISTINCT cohort.subject_id) \
             FROM {} cohort GROUP BY cohort.cohort_definition_id",
            results.table(COHORT_TABLE)
        );
        let sizes: Vec<(i64, i64)> = results.fetch_all(&sizes_sql).await?;
        if sizes.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = sizes.iter().map(|(id, _)| *id).collect();
        let metadata = self.sources.metadata();
        let definitions_sql = format!(
            "SELECT cohort_definition.id, cohort_definition.name, cohort_definition.description \
             FROM {} cohort_definition WHERE cohort_definition.id IN ({})",
            metadata.table(DEFINITION_TABLE),
            id_list(&ids)
        );
        let definitions: HashMap<i64, CohortDefinition> = metadata
            .fetch_all::<CohortDefinition>(&definitions_sql)
            .await?
            .into_iter()
            .map(|definition| (definition.id, definition))
            .collect();

        let mut stats: Vec<CohortDefinitionStats> = sizes
            .into_iter()
            .filter_map(|(id, cohort_size)| {
                let definition = definitions.get(&id)?;
                Some(CohortDefinitionStats {
                    id,
                    name: definition.name.clone(),
                    description: definition.description.clone(),
                    cohort_size,
                })
            })
            .collect();
        stats.sort_by(|a, b| b.cohort_size.cmp(&a.cohort_size).then(a.id.cmp(&b.id)));

        tracing::info!(source_id, cohorts = stats.len(), "Listed cohort definitions");
        Ok(stats)
    }

    /// Team projects associated with every one of `cohort_ids`.
    pub async fn owning_team_projects(&self, cohort_ids: &[i64]) -> Result<Vec<String>> {
        let mut ids = cohort_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let metadata = self.sources.metadata();
        let sql = format!(
            "SELECT team_project.team_project FROM {table} team_project \
             WHERE team_project.cohort_definition_id IN ({ids}) \
             GROUP BY team_project.team_project \
             HAVING COUNT(DISTINCT team_project.cohort_definition_id) = {count} \
             ORDER BY team_project.team_project",
            table = metadata.table(TEAM_PROJECT_TABLE),
            ids = id_list(&ids),
            count = ids.len(),
        );
        let projects: Vec<(String,)> = metadata.fetch_all(&sql).await?;

        tracing::debug!(cohorts = ids.len(), projects = projects.len(), "Resolved owning team projects");
        Ok(projects.into_iter().map(|(project,)| project).collect())
    }
}
