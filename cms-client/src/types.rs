//! Request and response bodies of the CMS API.
//!
//! The CMS wraps every entity in a `data` envelope, both in requests and responses. Field names
//! follow the CMS's content-type schema verbatim, which is why some of them are capitalized.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The `{"data": ...}` envelope used by all entity endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope<T> {
    /// The wrapped entity.
    pub data: T,
}

/// Credentials sent to the login endpoint.
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct LoginResponse {
    pub jwt: String,
}

/// A file stored by the upload endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// The numeric ID used to link the file to other entities.
    pub id: u64,
    /// The document ID of the file entity.
    #[serde(default)]
    pub document_id: Option<String>,
    /// The file name as stored.
    #[serde(default)]
    pub name: Option<String>,
}

/// Gender of a [`Patient`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// `male`
    Male,
    /// `female`
    Female,
}

/// The body of a patient creation request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPatient {
    /// Display name of the patient.
    #[serde(rename = "Name")]
    pub name: String,
    /// Gender of the patient.
    #[serde(rename = "Gender")]
    pub gender: Gender,
    /// Birthday in `YYYY-MM-DD` format.
    #[serde(rename = "Birthday")]
    pub birthday: String,
    /// Treatments to link on creation. Always empty for new patients.
    pub past_treatments: Vec<String>,
}

/// A patient as returned by the CMS.
#[derive(Debug, Clone, Deserialize)]
pub struct Patient {
    /// The document ID referenced by treatments.
    #[serde(rename = "documentId")]
    pub document_id: String,
    /// Display name of the patient.
    #[serde(rename = "Name", default)]
    pub name: String,
}

/// Body part a lesion is located on.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum TreatmentTarget {
    /// `Maxillofacial`
    Maxillofacial,
    /// `Chest`
    Chest,
    /// `Abdomen & Buttocks`
    #[serde(rename = "Abdomen & Buttocks")]
    AbdomenButtocks,
    /// `Shoulder & Back`
    #[serde(rename = "Shoulder & Back")]
    ShoulderBack,
    /// `Limbs`
    Limbs,
    /// `Whole Body`
    #[serde(rename = "Whole Body")]
    WholeBody,
    /// `Multiple Sites`
    #[serde(rename = "Multiple Sites")]
    MultipleSites,
}

impl TreatmentTarget {
    /// All targets accepted by the CMS.
    pub const ALL: [TreatmentTarget; 7] = [
        TreatmentTarget::Maxillofacial,
        TreatmentTarget::Chest,
        TreatmentTarget::AbdomenButtocks,
        TreatmentTarget::ShoulderBack,
        TreatmentTarget::Limbs,
        TreatmentTarget::WholeBody,
        TreatmentTarget::MultipleSites,
    ];

    /// The value as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TreatmentTarget::Maxillofacial => "Maxillofacial",
            TreatmentTarget::Chest => "Chest",
            TreatmentTarget::AbdomenButtocks => "Abdomen & Buttocks",
            TreatmentTarget::ShoulderBack => "Shoulder & Back",
            TreatmentTarget::Limbs => "Limbs",
            TreatmentTarget::WholeBody => "Whole Body",
            TreatmentTarget::MultipleSites => "Multiple Sites",
        }
    }
}

impl fmt::Display for TreatmentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lesion of a treatment, bundling a target with its photos.
#[derive(Debug, Clone, Serialize)]
pub struct LesionDetail {
    /// Where the lesion is located.
    pub part: TreatmentTarget,
    /// Free-form notes.
    pub notes: String,
    /// Treatment duration of this lesion in minutes.
    pub duration: u32,
    /// IDs of uploaded files, see [`UploadedFile::id`].
    pub photos: Vec<u64>,
}

/// The body of a treatment record creation request.
#[derive(Debug, Clone, Serialize)]
pub struct NewTreatment {
    /// Document ID of the treated patient.
    pub patient: String,
    /// Position of the treatment in the patient's history.
    pub sequence_number: u32,
    /// Total treatment duration in minutes.
    pub duration: u32,
    /// The lesions treated in this session.
    pub details: Vec<LesionDetail>,
}

/// A treatment record as returned by the CMS.
#[derive(Debug, Clone, Deserialize)]
pub struct Treatment {
    /// The document ID of the created record.
    #[serde(rename = "documentId")]
    pub document_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_treatment_schema() {
        let treatment = NewTreatment {
            patient: "abc".into(),
            sequence_number: 7,
            duration: 60,
            details: vec![LesionDetail {
                part: TreatmentTarget::AbdomenButtocks,
                notes: "notes".into(),
                duration: 30,
                photos: vec![1, 2],
            }],
        };

        let value = serde_json::to_value(Envelope { data: treatment }).unwrap();
        assert_eq!(
            value,
            json!({
                "data": {
                    "patient": "abc",
                    "sequence_number": 7,
                    "duration": 60,
                    "details": [{
                        "part": "Abdomen & Buttocks",
                        "notes": "notes",
                        "duration": 30,
                        "photos": [1, 2],
                    }],
                }
            })
        );
    }

    #[test]
    fn target_names_match_wire_format() {
        for target in TreatmentTarget::ALL {
            let value = serde_json::to_value(target).unwrap();
            assert_eq!(value, target.as_str());
        }
    }
}
