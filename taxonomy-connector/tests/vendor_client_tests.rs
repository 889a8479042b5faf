//! Vendor client tests against the stub vendor

mod helpers;

use helpers::{skill_id_for, start_stub_vendor};
use std::sync::atomic::Ordering;
use taxonomy_connector::vendor::{RankingFacet, Scope, VendorError};

#[tokio::test]
async fn test_token_cached_per_scope() {
    let vendor = start_stub_vendor().await;
    let client = vendor.client();

    client.get_product_skills("rust").await.unwrap();
    client.get_product_skills("sql").await.unwrap();
    client.get_skill_details(&skill_id_for("rust")).await.unwrap();
    assert_eq!(vendor.token_calls(), 1);

    client
        .get_jobs(RankingFacet::Title, RankingFacet::Skills, &[skill_id_for("rust")])
        .await
        .unwrap();
    assert_eq!(vendor.token_calls(), 2);

    let first = client.get_token(Scope::Skills).await.unwrap();
    assert_eq!(first, "token-1");
}

#[tokio::test]
async fn test_rate_limit_retried_then_reported() {
    let vendor = start_stub_vendor().await;
    vendor.state.rate_limit_extract.store(true, Ordering::SeqCst);

    let err = vendor.client().get_product_skills("rust").await.unwrap_err();

    assert!(matches!(err, VendorError::RateLimited { attempts: 3 }));
    assert!(!err.is_fatal());
    assert_eq!(vendor.extract_calls(), 3);
}

#[tokio::test]
async fn test_rejected_credentials_are_fatal() {
    let vendor = start_stub_vendor().await;
    vendor.state.reject_credentials.store(true, Ordering::SeqCst);

    let err = vendor.client().get_product_skills("rust").await.unwrap_err();

    assert!(matches!(err, VendorError::AuthRejected(401)));
    assert!(err.is_fatal());
    assert_eq!(vendor.extract_calls(), 0);
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let vendor = start_stub_vendor().await;
    vendor.state.fail_on_boom.store(true, Ordering::SeqCst);

    let err = vendor.client().get_product_skills("boom").await.unwrap_err();

    assert!(matches!(err, VendorError::Api(500, _)));
    assert_eq!(vendor.extract_calls(), 1);
}

#[tokio::test]
async fn test_oversized_text_is_split_and_merged() {
    let vendor = start_stub_vendor().await;
    let text = "rust ".repeat(15_000);

    let skills = vendor.client().get_product_skills(&text).await.unwrap();

    assert_eq!(vendor.extract_calls(), 2);
    assert_eq!(skills.skills.len(), 1);
    assert_eq!(skills.skills[0].skill.id, skill_id_for("rust"));
    assert!(skills.malformed.is_empty());
}

#[tokio::test]
async fn test_skill_details_categories() {
    let vendor = start_stub_vendor().await;

    let details = vendor
        .client()
        .get_skill_details(&skill_id_for("rust"))
        .await
        .unwrap();

    let (category, subcategory) = details.category_names();
    assert_eq!(category.as_deref(), Some("Information Technology"));
    assert_eq!(subcategory.as_deref(), Some("Software Development"));
}

#[tokio::test]
async fn test_revoked_token_is_replaced_within_the_call() {
    let vendor = start_stub_vendor().await;
    vendor.state.revoked_token.store(1, Ordering::SeqCst);

    let details = vendor
        .client()
        .get_skill_details(&skill_id_for("rust"))
        .await
        .unwrap();

    assert_eq!(details.category_names().0.as_deref(), Some("Information Technology"));
    assert_eq!(vendor.token_calls(), 2);
    assert_eq!(vendor.state.details_calls.load(Ordering::SeqCst), 2);
}
