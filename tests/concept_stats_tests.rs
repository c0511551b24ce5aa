mod common;

use cohort_stats::error::CohortError;
use cohort_stats::models::{CohortPair, ConceptBreakdown, ConceptType};
use cohort_stats::repository::ConceptRepository;
use common::{BMI, NOTES, SMOKING, SMOKING_CURRENT, SMOKING_NEVER, SOURCE_ID, UNSUPPORTED};

const POPULATION: i64 = 20;

/// Ten cohort members: 1-5 current smokers, 6-8 never smoked, 9 recorded
/// without a value, 10 never asked. Person 99 is outside the cohort.
async fn smoking_survey(pool: &sqlx::AnyPool) {
    common::insert_cohort(pool, POPULATION, 1..=10).await;
    for person in 1..=5 {
        common::observe_coded(pool, person, SMOKING, Some(SMOKING_CURRENT)).await;
    }
    for person in 6..=8 {
        common::observe_coded(pool, person, SMOKING, Some(SMOKING_NEVER)).await;
    }
    common::observe_coded(pool, 9, SMOKING, None).await;
    common::observe_coded(pool, 99, SMOKING, Some(SMOKING_CURRENT)).await;
}

fn count_of(stats: &[ConceptBreakdown], value: i64) -> i64 {
    stats
        .iter()
        .find(|s| s.value_as_concept_id == value)
        .map(|s| s.persons_in_cohort_with_value)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_missing_ratio_per_concept() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let stats = repo
        .concept_stats(SOURCE_ID, POPULATION, &[SMOKING, BMI, 424242])
        .await
        .expect("Failed to compute concept stats");

    assert_eq!(stats.len(), 2, "unknown concepts are left out");
    assert_eq!(stats[0].concept_name, "Body mass index");
    assert_eq!(stats[0].n_missing_ratio, 1.0);

    let smoking = &stats[1];
    assert_eq!(smoking.concept_id, SMOKING);
    assert_eq!(smoking.prefixed_concept_id, "ID_2000000324");
    assert_eq!(smoking.domain_name.as_deref(), Some("Observation"));
    assert_eq!(smoking.cohort_size, 10);
    assert_eq!(smoking.n_missing_ratio, 0.2);
}

#[tokio::test]
async fn test_missing_ratio_counts_numeric_and_text_values() {
    let pool = common::setup_test_db().await;
    common::insert_cohort(&pool, POPULATION, 1..=4).await;
    common::observe_number(&pool, 1, BMI, Some(22.5)).await;
    common::observe_number(&pool, 2, BMI, None).await;
    common::observe_text(&pool, 3, NOTES, Some("none")).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let stats = repo
        .concept_stats(SOURCE_ID, POPULATION, &[BMI, NOTES])
        .await
        .unwrap();

    for concept in &stats {
        assert_eq!(concept.n_missing_ratio, 0.75, "{}", concept.concept_name);
        assert!((0.0..=1.0).contains(&concept.n_missing_ratio));
    }
}

#[tokio::test]
async fn test_missing_ratio_of_empty_cohort_is_zero() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let stats = repo.concept_stats(SOURCE_ID, 999, &[SMOKING]).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].cohort_size, 0);
    assert_eq!(stats[0].n_missing_ratio, 0.0);
}

#[tokio::test]
async fn test_concept_types_follow_concept_class() {
    let pool = common::setup_test_db().await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let types = repo
        .concept_types(SOURCE_ID, &[NOTES, SMOKING, BMI])
        .await
        .unwrap();
    assert_eq!(
        types,
        vec![
            (NOTES, ConceptType::Text),
            (SMOKING, ConceptType::Coded),
            (BMI, ConceptType::Numeric),
        ]
    );

    match repo.concept_types(SOURCE_ID, &[SMOKING, UNSUPPORTED]).await {
        Err(CohortError::UnsupportedConceptType { concept_id, .. }) => {
            assert_eq!(concept_id, UNSUPPORTED)
        }
        other => panic!("expected unsupported concept type, got {:?}", other),
    }

    assert!(matches!(
        repo.concept_types(SOURCE_ID, &[424242]).await,
        Err(CohortError::ConceptNotFound(424242))
    ));
}

#[tokio::test]
async fn test_breakdown_conserves_subjects_with_a_value() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    common::observe_coded(&pool, 10, SMOKING, Some(0)).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let stats = repo
        .breakdown_stats_for_cohort(SOURCE_ID, POPULATION, SMOKING)
        .await
        .expect("Failed to compute breakdown");

    assert_eq!(stats.len(), 2, "null and zero values are not counted");
    assert_eq!(stats[0].value_name.as_deref(), Some("Current smoker"));
    assert_eq!(stats[0].concept_value.as_deref(), Some("SMOKE_CURRENT"));
    assert_eq!(count_of(&stats, SMOKING_CURRENT), 5);
    assert_eq!(count_of(&stats, SMOKING_NEVER), 3);

    let total: i64 = stats.iter().map(|s| s.persons_in_cohort_with_value).sum();
    assert_eq!(total, 8);
}

#[tokio::test]
async fn test_breakdown_counts_multi_valued_subject_per_value() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    common::observe_coded(&pool, 1, SMOKING, Some(SMOKING_NEVER)).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let stats = repo
        .breakdown_stats_for_cohort(SOURCE_ID, POPULATION, SMOKING)
        .await
        .unwrap();

    assert_eq!(count_of(&stats, SMOKING_CURRENT), 5);
    assert_eq!(count_of(&stats, SMOKING_NEVER), 4);
    let total: i64 = stats.iter().map(|s| s.persons_in_cohort_with_value).sum();
    assert_eq!(total, 9);
}

#[tokio::test]
async fn test_breakdown_applies_pairs_and_concept_filters() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    common::insert_cohort(&pool, 21, [1, 2, 3]).await;
    common::insert_cohort(&pool, 22, [3, 4, 6]).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let pairs = vec![CohortPair::new(22, 21, "treated vs untreated")];
    let stats = repo
        .breakdown_stats(SOURCE_ID, POPULATION, &[], &pairs, SMOKING)
        .await
        .unwrap();
    assert_eq!(count_of(&stats, SMOKING_CURRENT), 3);
    assert_eq!(count_of(&stats, SMOKING_NEVER), 1);

    common::observe_number(&pool, 1, BMI, Some(31.0)).await;
    common::observe_number(&pool, 6, BMI, Some(19.5)).await;
    common::observe_number(&pool, 2, BMI, None).await;
    let stats = repo
        .breakdown_stats(SOURCE_ID, POPULATION, &[BMI], &[], SMOKING)
        .await
        .unwrap();
    assert_eq!(count_of(&stats, SMOKING_CURRENT), 1);
    assert_eq!(count_of(&stats, SMOKING_NEVER), 1);
}

#[tokio::test]
async fn test_breakdown_rejects_unsupported_filter_concept() {
    let pool = common::setup_test_db().await;
    smoking_survey(&pool).await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let err = repo
        .breakdown_stats(SOURCE_ID, POPULATION, &[UNSUPPORTED], &[], SMOKING)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("error: concept type not supported"));
}

#[tokio::test]
async fn test_concept_info_lookup() {
    let pool = common::setup_test_db().await;
    let repo = ConceptRepository::new(common::resolver(&pool));

    let info = repo.concept_info(SOURCE_ID, BMI).await.unwrap();
    assert_eq!(info.concept_name, "Body mass index");
    assert_eq!(info.concept_class_id.as_deref(), Some("MVP Continuous"));

    assert!(matches!(
        repo.concept_info(SOURCE_ID, 424242).await,
        Err(CohortError::ConceptNotFound(424242))
    ));
}
