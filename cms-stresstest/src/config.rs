//! Configuration for the stress test.
//!
//! Configuration is loaded once at startup and passed into [`run`](crate::run) as an immutable
//! value. Sources are merged with the following precedence (highest to lowest):
//!
//! 1. Environment variables (prefixed with `CMS__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested structures, for example
//! `CMS__WORKLOAD__TYPE=lifecycle` or `CMS__PAYLOAD__SIZE=1MiB`.
//!
//! A complete YAML configuration looks like this:
//!
//! ```yaml
//! remote: http://localhost:1337
//! identifier: lisi
//! password: secret
//! concurrency: 4
//! timeout: 60s
//!
//! payload:
//!   source: file
//!   path: ./test.jpg
//!   size: 3MiB
//!
//! log_transport_errors: false
//!
//! workload:
//!   type: lifecycle
//!   patients: 20
//!   records_per_patient: 3
//!   lesions_per_record: 2
//!   photos_per_lesion: 2
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use cms_client::TreatmentTarget;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CMS__";

/// Newtype around `String` that protects against accidental logging of secrets in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Exposes the secret value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Paths of the CMS endpoints, relative to [`Config::remote`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Endpoints {
    /// Local login.
    pub auth: String,
    /// Multipart file upload.
    pub upload: String,
    /// Patient creation.
    pub patients: String,
    /// Treatment record creation.
    pub treatments: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        let cms_client::Endpoints {
            auth,
            upload,
            patients,
            treatments,
        } = cms_client::Endpoints::default();
        Self {
            auth,
            upload,
            patients,
            treatments,
        }
    }
}

impl From<Endpoints> for cms_client::Endpoints {
    fn from(endpoints: Endpoints) -> Self {
        Self {
            auth: endpoints.auth,
            upload: endpoints.upload,
            patients: endpoints.patients,
            treatments: endpoints.treatments,
        }
    }
}

/// Where the upload payload comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSource {
    /// Pseudo-random bytes of [`Payload::size`].
    Random,
    /// The contents of [`Payload::path`], falling back to random bytes if the file is missing.
    File,
}

/// The blob uploaded as every image.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Payload {
    /// Whether to read a file or generate random bytes.
    pub source: PayloadSource,
    /// Size of random payloads. Ignored when a file is read.
    pub size: ByteSize,
    /// The image file read with [`PayloadSource::File`].
    pub path: Option<PathBuf>,
    /// Seed for random payloads. A random seed is used if unset.
    pub seed: Option<u64>,
    /// MIME type sent with each upload.
    pub content_type: String,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            source: PayloadSource::Random,
            size: ByteSize::mib(3),
            path: None,
            seed: None,
            content_type: "image/jpeg".to_owned(),
        }
    }
}

/// Uploads images for one treatment record of an existing patient per unit of work.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlatWorkload {
    /// Number of units of work, i.e. treatment records to create.
    pub records: usize,
    /// Images uploaded for each record.
    pub images_per_record: usize,
    /// Document ID of the existing patient all records are attached to.
    pub patient: String,
    /// Target of the single lesion of each record.
    pub part: TreatmentTarget,
}

impl Default for FlatWorkload {
    fn default() -> Self {
        Self {
            records: 5,
            images_per_record: 2,
            patient: "ao5wnx3snjfcu58xzykwsg9j".to_owned(),
            part: TreatmentTarget::Maxillofacial,
        }
    }
}

/// Creates a patient and its whole treatment history per unit of work.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleWorkload {
    /// Number of units of work, i.e. patients to create.
    pub patients: usize,
    /// Treatment records created for each patient.
    pub records_per_patient: usize,
    /// Lesions bundled into each record.
    pub lesions_per_record: usize,
    /// Photos uploaded for each lesion.
    pub photos_per_lesion: usize,
    /// Targets randomly assigned to lesions.
    pub parts: Vec<TreatmentTarget>,
}

impl Default for LifecycleWorkload {
    fn default() -> Self {
        Self {
            patients: 20,
            records_per_patient: 3,
            lesions_per_record: 2,
            photos_per_lesion: 2,
            parts: vec![
                TreatmentTarget::Maxillofacial,
                TreatmentTarget::Chest,
                TreatmentTarget::AbdomenButtocks,
                TreatmentTarget::ShoulderBack,
            ],
        }
    }
}

/// The shape of each unit of work.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Workload {
    /// Variant `"flat"`, see [`FlatWorkload`].
    Flat(FlatWorkload),
    /// Variant `"lifecycle"`, see [`LifecycleWorkload`].
    Lifecycle(LifecycleWorkload),
}

impl Workload {
    /// The number of units of work dispatched for this workload.
    pub fn units(&self) -> usize {
        match self {
            Workload::Flat(flat) => flat.records,
            Workload::Lifecycle(lifecycle) => lifecycle.patients,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, progress and the summary go to stdout.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Top-level stress test configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the CMS.
    pub remote: String,
    /// Login identifier (username or email) of an authenticated user.
    pub identifier: String,
    /// Login password.
    pub password: SecretBox<ConfigSecret>,

    /// The maximum number of units of work running at the same time.
    pub concurrency: usize,
    /// Total timeout of each request. Requests never time out if unset.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Paths of the CMS endpoints.
    pub endpoints: Endpoints,
    /// The blob uploaded as every image.
    pub payload: Payload,

    /// Whether network-level upload failures are logged.
    ///
    /// They are always counted in the summary. Disabling the log keeps the output readable when
    /// the CMS is expected to drop connections under load.
    pub log_transport_errors: bool,

    /// Logging configuration.
    pub logging: Logging,
    /// The shape and number of units of work.
    pub workload: Workload,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: "http://localhost:1337".to_owned(),
            identifier: "lisi".to_owned(),
            password: SecretBox::new(Box::new(ConfigSecret::default())),

            concurrency: 5,
            timeout: None,

            endpoints: Endpoints::default(),
            payload: Payload::default(),
            log_transport_errors: true,

            logging: Logging::default(),
            workload: Workload::Flat(FlatWorkload::default()),
        }
    }
}

impl Config {
    /// Loads configuration from the given YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `CMS__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    /// - `concurrency` is zero
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        anyhow::ensure!(config.concurrency > 0, "concurrency must be at least 1");
        Ok(config)
    }
}
