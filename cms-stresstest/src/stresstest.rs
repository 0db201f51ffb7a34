//! Run units of work concurrently against the CMS and print metrics.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytesize::ByteSize;
use cms_client::Client;
use futures::{Stream, StreamExt};
use secrecy::ExposeSecret;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::config::{Config, Workload};
use crate::dispatcher::{Completion, Dispatcher};
use crate::http::HttpRemote;
use crate::payload;
use crate::summary::RunSummary;
use crate::workload::{Shape, WorkResult};

/// Runs the configured workload against the remote and returns its summary.
///
/// Authentication happens once upfront. If it fails, nothing else is attempted and the error
/// is returned. Once authenticated, failures of individual calls only reduce the number of
/// successful units.
pub async fn run(config: Config) -> Result<RunSummary> {
    let payload = payload::generate(&config.payload).context("failed to prepare payload")?;
    let shape = shape(&config.workload);
    let units = config.workload.units();

    print_plan(&config, &shape, payload.len());

    let mut builder = Client::builder(config.remote.as_str()).endpoints(config.endpoints.into());
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().context("failed to create CMS client")?;

    let remote = HttpRemote::authenticate(
        &client,
        &config.identifier,
        config.password.expose_secret().as_str(),
    )
    .await
    .with_context(|| format!("failed to log in as `{}`", config.identifier))?
    .content_type(config.payload.content_type)
    .log_transport_errors(config.log_transport_errors);
    tracing::info!(identifier = %config.identifier, "authenticated");

    let remote = Arc::new(remote);
    let shape = Arc::new(shape);

    let start = Instant::now();
    let completions = Dispatcher::new(config.concurrency).dispatch((0..units).map(move |index| {
        let remote = Arc::clone(&remote);
        let shape = Arc::clone(&shape);
        let payload = payload.clone();
        async move { shape.execute(&remote, index, payload).await }
    }));

    let mut summary = collect(completions, units).await;
    summary.elapsed = start.elapsed();

    println!();
    print_summary(&summary);

    Ok(summary)
}

/// Drains `completions` in arrival order, printing one progress line per finished unit.
pub async fn collect(
    completions: impl Stream<Item = Completion<WorkResult>>,
    total: usize,
) -> RunSummary {
    let mut summary = RunSummary::new(total);
    let mut completions = std::pin::pin!(completions);

    while let Some(Completion { index, output }) = completions.next().await {
        let position = summary.completed + 1;
        match output {
            Ok(result) => {
                summary.record(&result);
                match result.mean_upload() {
                    Some(mean) if result.success => println!(
                        "[{position}/{total}] {} (avg upload: {:.2}s)",
                        "done".green(),
                        mean.as_secs_f64()
                    ),
                    _ if result.success => println!("[{position}/{total}] {}", "done".green()),
                    _ => println!("[{position}/{total}] {}", "failed".red()),
                }
            }
            Err(err) => {
                tracing::error!(index, error = &err as &dyn std::error::Error, "unit panicked");
                summary.record_panic();
                println!("[{position}/{total}] {}", "failed".red());
            }
        }
    }

    summary
}

/// Translates the configured workload into the shape every unit of work executes.
pub fn shape(workload: &Workload) -> Shape {
    match workload {
        Workload::Flat(flat) => Shape::existing_patient(flat.patient.as_str())
            .records(1)
            .lesions(1)
            .photos(flat.images_per_record)
            .parts([flat.part])
            .notes("Stress test auto-generated")
            .durations(48, 66)
            .filename_prefix("stress_test")
            .build(),
        Workload::Lifecycle(lifecycle) => Shape::new_patient()
            .records(lifecycle.records_per_patient)
            .lesions(lifecycle.lesions_per_record)
            .photos(lifecycle.photos_per_lesion)
            .parts(lifecycle.parts.iter().copied())
            .notes("Full Stress Test Auto-gen")
            .durations(60, 30)
            .filename_prefix("full_stress")
            .build(),
    }
}

fn print_plan(config: &Config, shape: &Shape, payload_size: usize) {
    let units = config.workload.units();
    let records = units * shape.records();
    let uploads = units * shape.uploads_per_unit();
    let bytes = ByteSize::b(uploads as u64 * payload_size as u64);

    println!(
        "{} {} (concurrency: {})",
        "## Stresstest".bold(),
        config.remote.as_str().bold().blue(),
        config.concurrency.bold()
    );
    if shape.creates_patients() {
        println!("  patients: {}", units.bold());
    }
    println!("  records: {}", records.bold());
    println!("  images: {} ({:.2})", uploads.bold(), bytes.bold());
    println!();
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} ({} units in {:.2?})",
        "## SUMMARY".bold(),
        summary.total.bold(),
        summary.elapsed
    );

    let timing = &summary.upload_timing;
    print!("{} ({} ops", "UPLOAD:".bold().green(), timing.count().bold());
    if summary.uploads_rejected > 0 {
        print!(
            ", {}",
            format!("{} FAILURES", summary.uploads_rejected).bold().red()
        );
    }
    if summary.uploads_ignored > 0 {
        print!(
            ", {}",
            format!("{} IGNORED", summary.uploads_ignored).bold().yellow()
        );
    }
    println!(")");
    if timing.count() > 0 {
        print_ops(timing, summary.elapsed);
        print_throughput(summary.bytes_uploaded, summary.elapsed);
        print_percentiles(timing, Duration::from_secs_f64);
    }

    if summary.patients_created > 0 {
        println!("{} {}", "PATIENTS:".bold().green(), summary.patients_created);
    }
    println!(
        "{} {}/{}",
        "RECORDS:".bold().green(),
        summary.records_created,
        summary.records_attempted
    );
    if summary.panicked > 0 {
        println!(
            "{}",
            format!("{} UNITS PANICKED", summary.panicked).bold().red()
        );
    }

    println!();
    println!("{summary}");
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let ops = sketch.count();
    let quantile = |q| map(sketch.quantile(q).ok().flatten().unwrap_or_default());
    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = quantile(0.5);
    let p90 = quantile(0.9);
    let p99 = quantile(0.99);
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} operations/s", ops_ps.bold());
}

fn print_throughput(total: u64, duration: Duration) {
    let throughput = (total as f64 / duration.as_secs_f64()) as u64;
    println!(", {:.2}/s", ByteSize::b(throughput).bold());
}

#[cfg(test)]
mod tests {
    use cms_client::TreatmentTarget;

    use super::*;
    use crate::config::{FlatWorkload, LifecycleWorkload};

    #[test]
    fn flat_shape_has_single_lesion() {
        let workload = Workload::Flat(FlatWorkload {
            images_per_record: 4,
            ..Default::default()
        });
        let shape = shape(&workload);

        assert_eq!(shape.records(), 1);
        assert_eq!(shape.uploads_per_unit(), 4);
        assert!(!shape.creates_patients());
    }

    #[test]
    fn lifecycle_shape_multiplies_counts() {
        let workload = Workload::Lifecycle(LifecycleWorkload {
            records_per_patient: 3,
            lesions_per_record: 2,
            photos_per_lesion: 2,
            parts: vec![TreatmentTarget::Limbs],
            ..Default::default()
        });
        let shape = shape(&workload);

        assert_eq!(shape.records(), 3);
        assert_eq!(shape.uploads_per_unit(), 12);
        assert!(shape.creates_patients());
    }

    #[tokio::test]
    async fn collects_synthetic_results() {
        let results = (0..3).map(|index| WorkResult {
            index,
            success: true,
            records_attempted: 1,
            records_created: 1,
            upload_timings: vec![Duration::from_secs(1)],
            ..Default::default()
        });
        let completions = Dispatcher::new(1).dispatch(results.map(|r| async move { r }));

        let summary = collect(completions, 3).await;

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.records_created, 3);
        let output = summary.to_string();
        assert!(output.contains("3/3"));
        assert!(output.contains("1.00"));
    }
}
