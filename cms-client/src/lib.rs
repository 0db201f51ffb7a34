//! # CMS Client
//!
//! A typed client for the hospital content-management API. It covers the calls needed to
//! populate the CMS with patients and treatment records: local login, file upload, patient
//! creation and treatment creation.
//!
//! ## Usage
//!
//! ```no_run
//! use cms_client::{Client, Gender, NewPatient};
//!
//! #[tokio::main]
//! # async fn main() -> cms_client::Result<()> {
//!     let client = Client::builder("http://localhost:1337/").build()?;
//!     let credential = client.login("lisi", "secret").await?;
//!     let session = client.session(credential);
//!
//!     let photo = session
//!         .upload(vec![0u8; 1024])
//!         .filename("test.jpg")
//!         .content_type("image/jpeg")
//!         .send()
//!         .await?;
//!
//!     let patient = session
//!         .create_patient(&NewPatient {
//!             name: "Jane Doe".into(),
//!             gender: Gender::Female,
//!             birthday: "1990-01-01".into(),
//!             past_treatments: vec![],
//!         })
//!         .await?;
//!     println!("{} ({}), photo {}", patient.name, patient.document_id, photo.id);
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod client;
mod error;
mod records;
mod types;
mod upload;

pub use reqwest::StatusCode;

pub use client::*;
pub use error::*;
pub use types::*;
pub use upload::*;
