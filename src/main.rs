use sqlx::any::AnyPoolOptions;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohort_stats::api::health_routes;
use cohort_stats::config::Config;
use cohort_stats::repository::{CohortDataRepository, SourceResolver, UrlConnector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cohort_stats=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting cohort statistics service on {}", config.server_addr());

    sqlx::any::install_default_drivers();

    let metadata = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    tracing::info!(schema = %config.atlas_schema, "Connected to metadata store");

    let resolver = Arc::new(SourceResolver::new(
        metadata,
        config.atlas_schema.clone(),
        Arc::new(UrlConnector::new(config.warehouse_max_connections)),
        config.query_timeout,
    ));

    if let Some(source_id) = config.validation_source_id {
        let cohort_data = CohortDataRepository::new(resolver.clone());
        match cohort_data
            .validate_observation_data(source_id, &config.validation_concept_ids)
            .await
        {
            Ok(outcome) => {
                tracing::info!(source_id, issues = outcome.as_sentinel(), "Startup validation finished")
            }
            // A broken warehouse must not keep the health endpoints down.
            Err(e) => tracing::error!(source_id, error = %e, "Startup validation failed"),
        }
    }

    let app = health_routes(resolver).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
