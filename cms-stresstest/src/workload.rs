//! A module for defining the [`Shape`] of a unit of work.
//!
//! A unit of work simulates one actor using the CMS: it optionally creates a patient, then
//! creates a number of treatment records for it. Each record bundles a number of lesions, and
//! each lesion links a number of freshly uploaded photos. Both stress test variants are just
//! different shapes of this composition:
//!
//! - *flat*: attach one record with one lesion of `n` photos to an existing patient.
//! - *lifecycle*: create a patient, then `m` records with `l` lesions of `k` photos each.

use std::time::Duration;

use bytes::Bytes;
use cms_client::{LesionDetail, NewTreatment, TreatmentTarget};
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::http::{HttpRemote, UploadOutcome};

/// The patient that records are attached to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PatientSource {
    /// All units attach their records to one pre-existing patient.
    Existing(String),
    /// Every unit creates its own patient first.
    Create,
}

/// A builder for creating a [`Shape`].
#[derive(Debug)]
pub struct ShapeBuilder {
    patient: PatientSource,
    records: usize,
    lesions: usize,
    photos: usize,
    parts: Vec<TreatmentTarget>,
    notes: String,
    record_duration: u32,
    lesion_duration: u32,
    filename_prefix: String,
}

impl ShapeBuilder {
    /// The number of records created per unit of work.
    pub fn records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// The number of lesions per record.
    pub fn lesions(mut self, lesions: usize) -> Self {
        self.lesions = lesions;
        self
    }

    /// The number of photos uploaded per lesion.
    pub fn photos(mut self, photos: usize) -> Self {
        self.photos = photos;
        self
    }

    /// The targets lesions are randomly assigned to.
    pub fn parts(mut self, parts: impl IntoIterator<Item = TreatmentTarget>) -> Self {
        self.parts = parts.into_iter().collect();
        self
    }

    /// Notes attached to every lesion.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// The durations written into records and lesions, in minutes.
    pub fn durations(mut self, record: u32, lesion: u32) -> Self {
        self.record_duration = record;
        self.lesion_duration = lesion;
        self
    }

    /// Uploaded files are named `<prefix>_<uuid>.jpg`.
    pub fn filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = prefix.into();
        self
    }

    /// Creates the shape instance.
    pub fn build(self) -> Shape {
        let parts = if self.parts.is_empty() {
            vec![TreatmentTarget::Maxillofacial]
        } else {
            self.parts
        };

        Shape {
            patient: self.patient,
            records: self.records,
            lesions: self.lesions,
            photos: self.photos,
            parts,
            notes: self.notes,
            record_duration: self.record_duration,
            lesion_duration: self.lesion_duration,
            filename_prefix: self.filename_prefix,
        }
    }
}

/// The composition of remote calls performed by one unit of work.
#[derive(Clone, Debug)]
pub struct Shape {
    patient: PatientSource,
    records: usize,
    lesions: usize,
    photos: usize,
    /// Never empty.
    parts: Vec<TreatmentTarget>,
    notes: String,
    record_duration: u32,
    lesion_duration: u32,
    filename_prefix: String,
}

impl Shape {
    fn builder(patient: PatientSource) -> ShapeBuilder {
        ShapeBuilder {
            patient,
            records: 1,
            lesions: 1,
            photos: 1,
            parts: vec![TreatmentTarget::Maxillofacial],
            notes: "Stress test auto-generated".to_owned(),
            record_duration: 60,
            lesion_duration: 30,
            filename_prefix: "stress_test".to_owned(),
        }
    }

    /// Starts a shape that attaches records to the existing patient `document_id`.
    pub fn existing_patient(document_id: impl Into<String>) -> ShapeBuilder {
        Self::builder(PatientSource::Existing(document_id.into()))
    }

    /// Starts a shape that creates one patient per unit of work.
    pub fn new_patient() -> ShapeBuilder {
        Self::builder(PatientSource::Create)
    }

    /// The number of records each unit of work attempts to create.
    pub fn records(&self) -> usize {
        self.records
    }

    /// The number of uploads each unit of work performs.
    pub fn uploads_per_unit(&self) -> usize {
        self.records * self.lesions * self.photos
    }

    /// Whether each unit of work creates its own patient.
    pub fn creates_patients(&self) -> bool {
        self.patient == PatientSource::Create
    }

    /// Runs one unit of work against the remote.
    ///
    /// Failing calls never abort the unit. A failed upload leaves its lesion with fewer
    /// photos, a lesion without photos is left out of its record, and a record without lesions
    /// is not submitted. Only a failed patient creation ends the unit early, since there is
    /// nothing to attach records to.
    pub async fn execute(&self, remote: &HttpRemote, index: usize, payload: Bytes) -> WorkResult {
        let mut rng = SmallRng::seed_from_u64(rand::random());
        let mut result = WorkResult {
            index,
            ..Default::default()
        };

        let patient = match &self.patient {
            PatientSource::Existing(document_id) => document_id.clone(),
            PatientSource::Create => match remote.create_patient(index, &mut rng).await {
                Some(patient) => {
                    result.patient = Some(patient.document_id.clone());
                    patient.document_id
                }
                None => return result,
            },
        };

        for record in 0..self.records {
            let mut details = Vec::with_capacity(self.lesions);
            for _ in 0..self.lesions {
                let photos = self.upload_photos(remote, &payload, &mut result).await;
                if photos.is_empty() {
                    tracing::warn!(index, record, "all uploads of a lesion failed, skipping it");
                    continue;
                }

                details.push(LesionDetail {
                    part: self.random_part(&mut rng),
                    notes: self.notes.clone(),
                    duration: self.lesion_duration,
                    photos,
                });
            }

            if details.is_empty() {
                tracing::warn!(index, record, "record has no lesions, not submitting it");
                continue;
            }

            let treatment = NewTreatment {
                patient: patient.clone(),
                sequence_number: rng.random_range(1..=100),
                duration: self.record_duration,
                details,
            };

            result.records_attempted += 1;
            if remote.create_treatment(&treatment).await {
                result.records_created += 1;
                tracing::info!(
                    index,
                    record = record + 1,
                    records = self.records,
                    lesions = treatment.details.len(),
                    "created treatment record"
                );
            }
        }

        result.success = self.records > 0 && result.records_created == self.records;
        result
    }

    async fn upload_photos(
        &self,
        remote: &HttpRemote,
        payload: &Bytes,
        result: &mut WorkResult,
    ) -> Vec<u64> {
        let mut photos = Vec::with_capacity(self.photos);
        for _ in 0..self.photos {
            let filename = format!(
                "{}_{}.jpg",
                self.filename_prefix,
                uuid::Uuid::new_v4().simple()
            );
            match remote.upload(payload.clone(), filename).await {
                UploadOutcome::Uploaded { id, elapsed } => {
                    photos.push(id);
                    result.upload_timings.push(elapsed);
                    result.bytes_uploaded += payload.len() as u64;
                }
                UploadOutcome::Rejected { .. } => result.uploads_rejected += 1,
                UploadOutcome::Ignored { .. } => result.uploads_ignored += 1,
            }
        }
        photos
    }

    fn random_part(&self, rng: &mut impl Rng) -> TreatmentTarget {
        self.parts
            .choose(rng)
            .copied()
            .unwrap_or(TreatmentTarget::Maxillofacial)
    }
}

/// The outcome of one unit of work.
#[derive(Clone, Debug, Default)]
pub struct WorkResult {
    /// Submission index of the unit.
    pub index: usize,
    /// Whether every record of the unit was created.
    pub success: bool,
    /// The patient created by this unit, if any.
    pub patient: Option<String>,
    /// Records submitted to the CMS.
    pub records_attempted: usize,
    /// Records the CMS accepted.
    pub records_created: usize,
    /// Duration of each successful upload.
    pub upload_timings: Vec<Duration>,
    /// Uploads the CMS answered with an error.
    pub uploads_rejected: usize,
    /// Uploads that failed at the network level.
    pub uploads_ignored: usize,
    /// Total size of all successful uploads.
    pub bytes_uploaded: u64,
}

impl WorkResult {
    /// The number of successful uploads.
    pub fn uploads(&self) -> usize {
        self.upload_timings.len()
    }

    /// The mean duration of successful uploads, if there were any.
    pub fn mean_upload(&self) -> Option<Duration> {
        let count = u32::try_from(self.upload_timings.len()).ok()?;
        if count == 0 {
            return None;
        }
        Some(self.upload_timings.iter().sum::<Duration>() / count)
    }
}
