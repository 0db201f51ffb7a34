//! This is a stress test library which populates a hospital CMS with synthetic patients and
//! treatment records.
//!
//! Every unit of work uploads a number of images and links them into treatment records. The
//! [`Shape`](workload::Shape) of a unit is configurable:
//!
//! - A *flat* workload attaches a single record per unit to one pre-existing patient.
//! - A *lifecycle* workload creates a patient per unit, followed by its full treatment history.
//!
//! Units run concurrently up to a configured limit. Failing calls are logged and counted, but
//! never abort a run. Only a failed login is fatal.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod dispatcher;
pub mod http;
pub mod observability;
pub mod payload;
pub mod stresstest;
pub mod summary;
pub mod workload;

pub use crate::config::Config;
pub use crate::stresstest::run;
pub use crate::summary::RunSummary;
