//! Generates the blob that is uploaded as every image.
//!
//! The blob is produced once per run and shared by all units of work. [`Bytes`] clones are
//! reference counted, so uploads never copy it.

use std::io;

use bytes::Bytes;
use bytesize::ByteSize;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::config::{Payload, PayloadSource};

/// Produces the upload payload described by `config`.
///
/// With [`PayloadSource::File`], the file is returned verbatim and [`Payload::size`] has no
/// effect. A missing file falls back to random content of the configured size, which is
/// logged as a warning. Files that exist but cannot be read are an error.
pub fn generate(config: &Payload) -> io::Result<Bytes> {
    if config.source == PayloadSource::File {
        match &config.path {
            Some(path) if path.exists() => {
                let contents = std::fs::read(path)?;
                if u64::try_from(contents.len()).ok() != Some(config.size.as_u64()) {
                    tracing::info!(
                        path = %path.display(),
                        file_size = contents.len(),
                        configured_size = config.size.as_u64(),
                        "uploading payload file, configured size does not apply",
                    );
                }
                return Ok(contents.into());
            }
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "payload file does not exist, falling back to random bytes",
                );
            }
            None => {
                tracing::warn!("no payload file configured, falling back to random bytes");
            }
        }
    }

    let len = payload_len(config.size)?;
    let seed = config.seed.unwrap_or_else(rand::random);
    Ok(random_bytes(len, seed))
}

/// Converts the configured size to a buffer length, failing if it does not fit in memory.
fn payload_len(size: ByteSize) -> io::Result<usize> {
    usize::try_from(size.as_u64()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload size {size} exceeds the address space"),
        )
    })
}

/// Fills a buffer of exactly `len` bytes from an RNG seeded with `seed`.
pub fn random_bytes(len: usize, seed: u64) -> Bytes {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut buf = vec![0; len];
    rng.fill_bytes(&mut buf);
    buf.into()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn random_config(size: u64) -> Payload {
        Payload {
            size: ByteSize::b(size),
            ..Default::default()
        }
    }

    #[test]
    fn random_payload_has_exact_size() {
        let payload = generate(&random_config(12345)).unwrap();
        assert_eq!(payload.len(), 12345);
    }

    #[test]
    fn converts_configured_size() {
        assert_eq!(payload_len(ByteSize::kib(3)).unwrap(), 3072);
        assert_eq!(payload_len(ByteSize::b(0)).unwrap(), 0);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn rejects_sizes_beyond_address_space() {
        let err = payload_len(ByteSize::gib(8)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn seeded_payloads_are_reproducible() {
        let config = Payload {
            seed: Some(42),
            ..random_config(1024)
        };

        assert_eq!(generate(&config).unwrap(), generate(&config).unwrap());
        assert_ne!(random_bytes(1024, 42), random_bytes(1024, 43));
    }

    #[test]
    fn file_payload_ignores_size() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really a jpeg").unwrap();

        let config = Payload {
            source: PayloadSource::File,
            path: Some(file.path().to_owned()),
            ..random_config(1024)
        };

        let payload = generate(&config).unwrap();
        assert_eq!(payload.as_ref(), b"not really a jpeg");
    }

    #[test]
    fn missing_file_falls_back_to_random() {
        let dir = tempfile::tempdir().unwrap();
        let config = Payload {
            source: PayloadSource::File,
            path: Some(dir.path().join("missing.jpg")),
            ..random_config(256)
        };

        let payload = generate(&config).unwrap();
        assert_eq!(payload.len(), 256);
    }
}
