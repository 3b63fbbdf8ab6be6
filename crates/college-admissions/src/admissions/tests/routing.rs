use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::admissions::domain::DocumentSlot;
use crate::admissions::form::UploadedFile;
use crate::admissions::intake::IntakePolicy;
use crate::admissions::media::InMemoryMediaHost;
use crate::admissions::memory::InMemoryApplicationStore;
use crate::admissions::router::{error_response, AdminGuard};
use crate::admissions::{admission_router, AdmissionError, UniqueField};

fn document_parts() -> Vec<(&'static str, UploadedFile)> {
    vec![
        (DocumentSlot::DmcMetric.field_name(), pdf("dmc.pdf")),
        (DocumentSlot::PassportPhoto.field_name(), png("photo.png")),
        (DocumentSlot::FatherCnic.field_name(), png("cnic.png")),
        (DocumentSlot::TransactionReceipt.field_name(), png("receipt.png")),
    ]
}

fn submit_request(fields: &[(&str, &str)], documents: &[(&str, UploadedFile)]) -> Request<Body> {
    let files: Vec<(&str, &UploadedFile)> =
        documents.iter().map(|(name, file)| (*name, file)).collect();
    multipart_request("/api/applications", fields, &files)
}

fn router_for(
    harness: &Harness<InMemoryApplicationStore, InMemoryMediaHost>,
    admin_token: Option<&str>,
) -> axum::Router {
    admission_router(harness.service.clone(), admin_token.map(str::to_string))
}

#[tokio::test]
async fn submit_route_creates_application() {
    let harness = build_harness();
    let router = router_for(&harness, None);

    let response = router
        .oneshot(submit_request(&form_pairs(), &document_parts()))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("status"), Some(&json!("pending")));
    assert!(payload
        .get("applicationId")
        .and_then(Value::as_str)
        .is_some_and(|id| id.starts_with("app-")));
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn duplicate_submission_returns_conflict() {
    let harness = build_harness();

    let first = router_for(&harness, None)
        .oneshot(submit_request(&form_pairs(), &document_parts()))
        .await
        .expect("route executes");
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = router_for(&harness, None)
        .oneshot(submit_request(&form_pairs(), &document_parts()))
        .await
        .expect("route executes");

    assert_eq!(second.status(), StatusCode::CONFLICT);
    let payload = read_json_body(second).await;
    assert_eq!(payload.get("error"), Some(&json!("already submitted")));
    assert_eq!(
        payload.get("details"),
        Some(&json!("transaction id already used"))
    );
}

#[tokio::test]
async fn missing_documents_return_bad_request() {
    let harness = build_harness();
    let mut documents = document_parts();
    documents.retain(|(name, _)| *name != "fatherCNIC");

    let response = router_for(&harness, None)
        .oneshot(submit_request(&form_pairs(), &documents))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("error"), Some(&json!("missing information")));
    assert!(payload
        .get("details")
        .and_then(Value::as_str)
        .is_some_and(|details| details.contains("fatherCNIC")));
    assert!(harness.media.stored().is_empty());
}

#[tokio::test]
async fn unknown_file_fields_are_rejected() {
    let harness = build_harness();
    let mut documents = document_parts();
    documents.push(("selfie", png("selfie.png")));

    let response = router_for(&harness, None)
        .oneshot(submit_request(&form_pairs(), &documents))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn status_routes_answer_by_id_and_query() {
    let harness = build_harness();
    let receipt = harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");

    let response = crate::admissions::router::status_handler::<
        InMemoryApplicationStore,
        InMemoryMediaHost,
    >(
        State(harness.service.clone()),
        Path(receipt.application_id.0.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let by_id = read_json_body(response).await;
    assert_eq!(by_id.get("name"), Some(&json!("Ayesha Khan")));
    assert_eq!(by_id.get("program"), Some(&json!("FSC Pre-Medical")));
    assert_eq!(by_id.get("paymentAmount"), Some(&json!("200")));
    assert!(by_id.get("submittedDate").is_some());

    for uri in [
        "/api/applications/status?phone=%2B92%20300%201234567",
        "/api/applications/status?email=AYESHA.KHAN%40example.com",
        "/api/applications/status?transactionId=TX1",
    ] {
        let response = router_for(&harness, None)
            .oneshot(
                Request::get(uri)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(read_json_body(response).await, by_id);
    }
}

#[tokio::test]
async fn status_query_without_key_is_bad_request() {
    let harness = build_harness();

    let response = router_for(&harness, None)
        .oneshot(
            Request::get("/api/applications/status")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_application_returns_not_found() {
    let harness = build_harness();

    let response = router_for(&harness, None)
        .oneshot(
            Request::get("/api/applications/status/app-404404")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("error"), Some(&json!("application not found")));
}

#[tokio::test]
async fn admin_routes_require_the_configured_token() {
    let harness = build_harness();
    let receipt = harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");
    let uri = format!("/api/admin/applications/{}", receipt.application_id);

    let denied = router_for(&harness, Some("s3cret"))
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("route executes");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = router_for(&harness, Some("s3cret"))
        .oneshot(
            Request::get(uri.as_str())
                .header(header::AUTHORIZATION, "Bearer s3cret")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(allowed.status(), StatusCode::OK);
    let payload = read_json_body(allowed).await;
    assert_eq!(payload.get("transactionId"), Some(&json!("TX1")));
    assert!(payload.pointer("/documents/dmcMetric").is_some());

    let public = router_for(&harness, Some("s3cret"))
        .oneshot(
            Request::get("/api/applications/status?transactionId=TX1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(public.status(), StatusCode::OK, "public routes stay open");
}

#[tokio::test]
async fn patch_updates_status_and_notes() {
    let harness = build_harness();
    let receipt = harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");

    let response = router_for(&harness, None)
        .oneshot(
            Request::patch(format!("/api/admin/applications/{}", receipt.application_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "status": "approved", "notes": "welcome aboard" }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("status"), Some(&json!("approved")));
    assert_eq!(payload.get("notes"), Some(&json!("welcome aboard")));
    assert_eq!(
        payload.get("applicationId"),
        Some(&json!(receipt.application_id.0))
    );
}

#[tokio::test]
async fn patch_rejects_unknown_status() {
    let harness = build_harness();
    let receipt = harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");

    let response = router_for(&harness, None)
        .oneshot(
            Request::patch(format!("/api/admin/applications/{}", receipt.application_id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "status": "archived" }).to_string()))
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_listing_and_statistics() {
    let harness = build_harness();
    for transaction_id in ["TX1", "TX2"] {
        harness
            .service
            .submit(submission_for(transaction_id))
            .await
            .expect("submission succeeds");
    }

    let response = router_for(&harness, None)
        .oneshot(
            Request::get("/api/admin/applications?page=1&limit=1&status=pending&program=FSC%20Pre-Medical")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let page = read_json_body(response).await;
    assert_eq!(page.get("total"), Some(&json!(2)));
    assert_eq!(page.get("totalPages"), Some(&json!(2)));
    assert_eq!(page.get("currentPage"), Some(&json!(1)));
    assert_eq!(
        page.get("applications").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );

    let response = router_for(&harness, None)
        .oneshot(
            Request::get("/api/admin/statistics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    let stats = read_json_body(response).await;
    assert_eq!(stats.get("pending"), Some(&json!(2)));
    assert_eq!(stats.pointer("/byProgram/FSC Pre-Medical"), Some(&json!(2)));
}

#[tokio::test]
async fn admin_listing_rejects_unknown_filters() {
    let harness = build_harness();

    let response = router_for(&harness, None)
        .oneshot(
            Request::get("/api/admin/applications?status=archived")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_maps_to_service_unavailable() {
    let harness = harness_with(UnavailableStore, InMemoryMediaHost::default(), IntakePolicy::default());

    let response = crate::admissions::router::status_handler::<UnavailableStore, InMemoryMediaHost>(
        State(Arc::clone(&harness.service)),
        Path("app-000001".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("error"), Some(&json!("service unavailable")));
}

#[tokio::test]
async fn upload_failures_map_to_bad_gateway() {
    let response = error_response(&AdmissionError::Upload {
        slot: "dmcMetric".to_string(),
        source: crate::admissions::media::MediaError::Transport("timeout".to_string()),
    });

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error"),
        Some(&json!("file upload failed, try again"))
    );
    assert_eq!(
        error_response(&AdmissionError::Conflict(UniqueField::Email)).status(),
        StatusCode::CONFLICT
    );
}

#[test]
fn admin_guard_without_token_allows_everything() {
    assert!(AdminGuard::new(None).allows(None));
    assert!(AdminGuard::new(Some("  ".to_string())).allows(None));
    assert!(!AdminGuard::new(Some("abc".to_string())).allows(Some("Bearer abd")));
    assert!(!AdminGuard::new(Some("abc".to_string())).allows(Some("abc")));
}
