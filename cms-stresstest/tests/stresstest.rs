use std::collections::BTreeSet;
use std::time::Duration;

use bytesize::ByteSize;
use cms_stresstest::config::{
    Config, ConfigSecret, FlatWorkload, LifecycleWorkload, Payload, Workload,
};
use cms_test::server::{MockConfig, TestServer, UploadBehavior};
use secrecy::SecretBox;

fn config(server: &TestServer, workload: Workload) -> Config {
    Config {
        remote: server.url("/"),
        identifier: server.config().identifier.clone(),
        password: SecretBox::new(Box::new(ConfigSecret::from(
            server.config().password.as_str(),
        ))),
        concurrency: 2,
        payload: Payload {
            size: ByteSize::kib(4),
            seed: Some(7),
            ..Default::default()
        },
        workload,
        ..Default::default()
    }
}

fn flat(records: usize, images_per_record: usize) -> Workload {
    Workload::Flat(FlatWorkload {
        records,
        images_per_record,
        patient: "existingpatient".to_owned(),
        ..Default::default()
    })
}

fn lifecycle(patients: usize, records: usize, lesions: usize, photos: usize) -> Workload {
    Workload::Lifecycle(LifecycleWorkload {
        patients,
        records_per_patient: records,
        lesions_per_record: lesions,
        photos_per_lesion: photos,
        ..Default::default()
    })
}

#[tokio::test]
async fn flat_run_reuses_one_credential() {
    cms_test::tracing::init();
    let server = TestServer::new().await;

    let summary = cms_stresstest::run(config(&server, flat(3, 2))).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.uploads, 6);
    assert_eq!(summary.bytes_uploaded, 6 * 4096);
    assert!(summary.to_string().contains("3/3"));

    let recorded = server.recorded();
    assert_eq!(recorded.auth_calls, 1);
    assert_eq!(recorded.tokens.len(), 1);
    assert_eq!(recorded.upload_calls, 6);
    assert!(recorded.upload_sizes.iter().all(|&size| size == 4096));
    assert_eq!(recorded.patient_calls, 0);
    assert_eq!(recorded.treatment_calls, 3);

    for treatment in &recorded.treatments {
        assert_eq!(treatment["patient"], "existingpatient");
        assert_eq!(treatment["details"].as_array().unwrap().len(), 1);
        assert_eq!(treatment["details"][0]["photos"].as_array().unwrap().len(), 2);
        assert_eq!(treatment["details"][0]["part"], "Maxillofacial");
        assert!(treatment["sequence_number"].is_u64());
    }
}

#[tokio::test]
async fn lifecycle_run_creates_patients() {
    cms_test::tracing::init();
    let server = TestServer::new().await;

    let summary = cms_stresstest::run(config(&server, lifecycle(2, 2, 2, 1)))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.patients_created, 2);
    assert_eq!(summary.records_created, 4);
    assert_eq!(summary.uploads, 8);

    let recorded = server.recorded();
    assert_eq!(recorded.patient_calls, 2);
    assert_eq!(recorded.treatment_calls, 4);
    for patient in &recorded.patients {
        assert!(patient["Name"].as_str().unwrap().starts_with("StressUser_"));
        assert_eq!(patient["Birthday"], "1990-01-01");
    }
}

#[tokio::test]
async fn rejected_uploads_submit_no_records() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        uploads: UploadBehavior::RejectAll,
        ..Default::default()
    })
    .await;

    let summary = cms_stresstest::run(config(&server, flat(2, 2))).await.unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.uploads_rejected, 4);
    assert_eq!(summary.records_attempted, 0);
    assert_eq!(summary.mean_upload(), None);
    assert!(summary.to_string().contains("n/a"));
    assert_eq!(server.recorded().treatment_calls, 0);
}

#[tokio::test]
async fn drops_lesions_without_photos() {
    cms_test::tracing::init();
    // The first lesion's uploads are the first two calls on the server.
    let server = TestServer::with_config(MockConfig {
        uploads: UploadBehavior::RejectCalls(BTreeSet::from([1, 2])),
        ..Default::default()
    })
    .await;

    let mut config = config(&server, lifecycle(1, 1, 2, 2));
    config.concurrency = 1;
    let summary = cms_stresstest::run(config).await.unwrap();

    assert_eq!(summary.uploads_rejected, 2);
    assert_eq!(summary.records_created, 1);

    let recorded = server.recorded();
    assert_eq!(recorded.treatments.len(), 1);
    let details = recorded.treatments[0]["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["photos"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn skips_records_without_lesions() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        uploads: UploadBehavior::RejectCalls(BTreeSet::from([1, 2])),
        ..Default::default()
    })
    .await;

    let mut config = config(&server, lifecycle(1, 3, 1, 2));
    config.concurrency = 1;
    let summary = cms_stresstest::run(config).await.unwrap();

    assert_eq!(summary.records_attempted, 2);
    assert!(summary.records_attempted <= 3);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(server.recorded().treatment_calls, 2);
}

#[tokio::test]
async fn counts_stalled_uploads_as_ignored() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        uploads: UploadBehavior::Stall(Duration::from_secs(5)),
        ..Default::default()
    })
    .await;

    let mut config = config(&server, flat(1, 2));
    config.timeout = Some(Duration::from_millis(200));
    config.log_transport_errors = false;
    let summary = cms_stresstest::run(config).await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.uploads_ignored, 2);
    assert_eq!(summary.uploads_rejected, 0);
    assert_eq!(server.recorded().treatment_calls, 0);
}

#[tokio::test]
async fn repeated_runs_do_not_collide() {
    cms_test::tracing::init();
    let server = TestServer::new().await;

    cms_stresstest::run(config(&server, lifecycle(2, 1, 1, 1)))
        .await
        .unwrap();
    cms_stresstest::run(config(&server, lifecycle(2, 1, 1, 1)))
        .await
        .unwrap();

    let recorded = server.recorded();
    assert_eq!(recorded.auth_calls, 2);

    let filenames: BTreeSet<_> = recorded.filenames.iter().collect();
    assert_eq!(recorded.filenames.len(), 4);
    assert_eq!(filenames.len(), 4);

    let names: BTreeSet<_> = recorded
        .patients
        .iter()
        .map(|patient| patient["Name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 4);
}

#[tokio::test]
async fn fails_on_invalid_credentials() {
    cms_test::tracing::init();
    let server = TestServer::new().await;

    let mut config = config(&server, flat(2, 1));
    config.password = SecretBox::new(Box::new(ConfigSecret::from("wrong")));
    let result = cms_stresstest::run(config).await;

    assert!(result.is_err());
    let recorded = server.recorded();
    assert_eq!(recorded.auth_calls, 1);
    assert_eq!(recorded.upload_calls, 0);
}

#[tokio::test]
async fn rejected_patients_end_units_early() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        reject_patients: true,
        ..Default::default()
    })
    .await;

    let summary = cms_stresstest::run(config(&server, lifecycle(2, 2, 1, 1)))
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.patients_created, 0);
    assert_eq!(summary.records_attempted, 0);

    let recorded = server.recorded();
    assert_eq!(recorded.patient_calls, 2);
    assert_eq!(recorded.upload_calls, 0);
}

#[tokio::test]
async fn rejected_records_fail_units() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        reject_treatments: true,
        ..Default::default()
    })
    .await;

    let summary = cms_stresstest::run(config(&server, flat(2, 1))).await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.records_attempted, 2);
    assert_eq!(summary.records_created, 0);
    assert_eq!(summary.uploads, 2);
}

#[tokio::test]
async fn records_count_as_created_on_success_status() {
    cms_test::tracing::init();
    let server = TestServer::with_config(MockConfig {
        bare_treatments: true,
        ..Default::default()
    })
    .await;

    let summary = cms_stresstest::run(config(&server, flat(2, 1))).await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.records_created, 2);
    assert_eq!(server.recorded().treatments.len(), 2);
}
