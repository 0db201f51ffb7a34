//! Contains a remote implementation using HTTP to interact with the CMS.
//!
//! Every call catches its own errors. Failures are logged and reported as outcomes, so a
//! degraded CMS never aborts a unit of work.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use cms_client::{
    Client, Error, Gender, NewPatient, NewTreatment, Patient, Session, StatusCode, UploadedFile,
};
use rand::Rng;

/// The result of a single upload.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The CMS stored the file under `id`.
    Uploaded {
        /// The file ID to link into records.
        id: u64,
        /// Time from sending the request until the response was parsed.
        elapsed: Duration,
    },
    /// The CMS answered, but did not store the file.
    Rejected {
        /// The status code, if the CMS answered with a failure status.
        status: Option<StatusCode>,
        /// The truncated response body, or the reason a successful response was unusable.
        reason: String,
        /// Time until the rejection arrived.
        elapsed: Duration,
    },
    /// The request failed at the network level and was not retried.
    ///
    /// These are counted separately since they say nothing about the CMS's answer, only that
    /// it did not answer in time.
    Ignored {
        /// The underlying network error.
        error: Error,
        /// Time until the failure surfaced.
        elapsed: Duration,
    },
}

impl UploadOutcome {
    fn from_result(result: cms_client::Result<UploadedFile>, elapsed: Duration) -> Self {
        match result {
            Ok(file) => UploadOutcome::Uploaded {
                id: file.id,
                elapsed,
            },
            Err(error) if error.is_transport() => UploadOutcome::Ignored { error, elapsed },
            Err(Error::Status { status, body }) => UploadOutcome::Rejected {
                status: Some(status),
                reason: body,
                elapsed,
            },
            Err(error) => UploadOutcome::Rejected {
                status: error.status(),
                reason: error.to_string(),
                elapsed,
            },
        }
    }

    fn log(&self, log_transport_errors: bool) {
        match self {
            UploadOutcome::Uploaded { .. } => {}
            UploadOutcome::Rejected {
                status: Some(status),
                reason,
                elapsed,
            } => {
                tracing::warn!(%status, body = %reason, ?elapsed, "upload failed");
            }
            UploadOutcome::Rejected {
                status: None,
                reason,
                elapsed,
            } => {
                tracing::warn!(reason = %reason, ?elapsed, "upload failed");
            }
            UploadOutcome::Ignored { error, elapsed } if log_transport_errors => {
                tracing::warn!(
                    error = error as &dyn std::error::Error,
                    ?elapsed,
                    "upload failed at the network level"
                );
            }
            UploadOutcome::Ignored { error, elapsed } => {
                tracing::trace!(
                    error = error as &dyn std::error::Error,
                    ?elapsed,
                    "upload failed at the network level"
                );
            }
        }
    }
}

/// A remote implementation using HTTP to interact with the CMS.
#[derive(Debug)]
pub struct HttpRemote {
    /// The authenticated session shared by all units of work.
    session: Session,
    content_type: String,
    log_transport_errors: bool,
}

impl HttpRemote {
    /// Logs in once and returns a remote bound to the obtained credential.
    pub async fn authenticate(
        client: &Client,
        identifier: &str,
        password: &str,
    ) -> cms_client::Result<Self> {
        let credential = client.login(identifier, password).await?;
        Ok(Self {
            session: client.session(credential),
            content_type: "application/octet-stream".to_owned(),
            log_transport_errors: true,
        })
    }

    /// Sets the MIME type sent with every upload.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Controls whether network-level upload failures are logged.
    pub fn log_transport_errors(mut self, log: bool) -> Self {
        self.log_transport_errors = log;
        self
    }

    pub(crate) async fn upload(&self, payload: Bytes, filename: String) -> UploadOutcome {
        let start = Instant::now();
        let result = self
            .session
            .upload(payload)
            .filename(filename)
            .content_type(self.content_type.clone())
            .send()
            .await;
        let outcome = UploadOutcome::from_result(result, start.elapsed());
        outcome.log(self.log_transport_errors);
        outcome
    }

    pub(crate) async fn create_patient(&self, index: usize, rng: &mut impl Rng) -> Option<Patient> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let patient = NewPatient {
            name: format!("StressUser_{timestamp}_{index}_{}", &suffix[..8]),
            gender: if rng.random_bool(0.5) {
                Gender::Male
            } else {
                Gender::Female
            },
            birthday: "1990-01-01".to_owned(),
            past_treatments: Vec::new(),
        };

        match self.session.create_patient(&patient).await {
            Ok(patient) => {
                tracing::info!(
                    name = %patient.name,
                    document_id = %patient.document_id,
                    "created patient"
                );
                Some(patient)
            }
            Err(err) => {
                log_rejection("patient creation", &err);
                None
            }
        }
    }

    pub(crate) async fn create_treatment(&self, treatment: &NewTreatment) -> bool {
        match self.session.create_treatment(treatment).await {
            Ok(_) => true,
            Err(err) => {
                log_rejection("treatment creation", &err);
                false
            }
        }
    }
}

fn log_rejection(operation: &str, err: &Error) {
    match err {
        Error::Status { status, body } => {
            tracing::warn!(%status, body = %body, "{operation} failed");
        }
        err => {
            tracing::warn!(error = err as &dyn std::error::Error, "{operation} failed");
        }
    }
}
