use super::common::*;
use crate::admissions::domain::{ApplicationStatus, Program};
use crate::admissions::intake::ValidationError;
use crate::admissions::memory::InMemoryApplicationStore;
use crate::admissions::AdmissionError;

#[tokio::test]
async fn every_lookup_key_finds_the_same_application() {
    let harness = build_harness();
    let receipt = harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");

    let by_id = harness
        .service
        .status_by_id(&receipt.application_id.0)
        .await
        .expect("by id");
    let by_email = harness
        .service
        .status_by_email("  AYESHA.KHAN@example.COM ")
        .await
        .expect("by email");
    let by_phone = harness
        .service
        .status_by_phone("0300-1234567")
        .await
        .expect("by phone");
    let by_guardian = harness
        .service
        .status_by_phone("+923007654321")
        .await
        .expect("by guardian phone");
    let by_transaction = harness
        .service
        .status_by_transaction_id(" TX1 ")
        .await
        .expect("by transaction");

    assert_eq!(by_id.name, "Ayesha Khan");
    assert_eq!(by_id.program, Program::PreMedical);
    assert_eq!(by_id.status, ApplicationStatus::Pending);
    assert_eq!(by_id.payment_amount, "200");
    for view in [&by_email, &by_phone, &by_guardian, &by_transaction] {
        assert_eq!(view, &by_id);
    }
}

#[tokio::test]
async fn phone_lookup_is_invariant_under_normalization() {
    let harness = build_harness();
    harness
        .service
        .submit(complete_submission())
        .await
        .expect("submission succeeds");

    for typed in ["+92 300 1234567", "0300-1234567", "03001234567", "+92-300-123-4567"] {
        let view = harness
            .service
            .status_by_phone(typed)
            .await
            .unwrap_or_else(|err| panic!("lookup for {typed} failed: {err}"));
        assert_eq!(view.transaction_id, "TX1");
    }
}

#[tokio::test]
async fn phone_lookup_falls_back_to_the_raw_key_for_legacy_records() {
    let store = InMemoryApplicationStore::default();
    let mut form = application_form("LEGACY-1");
    form.phone = Some("+92 301 5550000".to_string());
    store.seed(stored_record("legacy-1", form, at(1)));
    let harness = harness_with(
        store,
        crate::admissions::media::InMemoryMediaHost::default(),
        Default::default(),
    );

    let view = harness
        .service
        .status_by_phone(" +92 301 5550000 ")
        .await
        .expect("raw key matches legacy record");

    assert_eq!(view.transaction_id, "LEGACY-1");
}

#[tokio::test]
async fn most_recent_submission_wins() {
    let store = InMemoryApplicationStore::default();
    let mut older = application_form("TX-OLD");
    older.first_name = "Older".to_string();
    let mut newer = application_form("TX-NEW");
    newer.first_name = "Newer".to_string();
    store.seed(stored_record("app-a", older, at(1)));
    store.seed(stored_record("app-b", newer, at(9)));
    let harness = harness_with(
        store,
        crate::admissions::media::InMemoryMediaHost::default(),
        Default::default(),
    );

    let by_email = harness
        .service
        .status_by_email("bilal@example.com")
        .await
        .expect("by email");
    let by_phone = harness
        .service
        .status_by_phone("03001234567")
        .await
        .expect("by phone");

    assert_eq!(by_email.transaction_id, "TX-NEW");
    assert_eq!(by_phone.transaction_id, "TX-NEW");
    assert_eq!(by_email.name, "Newer Ahmed");
}

#[tokio::test]
async fn blank_keys_are_validation_errors() {
    let harness = build_harness();

    for result in [
        harness.service.status_by_email("   ").await,
        harness.service.status_by_phone("").await,
        harness.service.status_by_transaction_id(" ").await,
        harness.service.status_by_id("").await,
    ] {
        assert!(matches!(
            result,
            Err(AdmissionError::Validation(ValidationError::BlankLookupKey(_)))
        ));
    }
}

#[tokio::test]
async fn unknown_keys_are_not_found() {
    let harness = build_harness();

    assert!(matches!(
        harness.service.status_by_transaction_id("TX404").await,
        Err(AdmissionError::NotFound)
    ));
    assert!(matches!(
        harness.service.status_by_phone("03009999999").await,
        Err(AdmissionError::NotFound)
    ));
}
