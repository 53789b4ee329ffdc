use clap::Parser;
use std::{fs, path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicom_posterize::{BandMask2D, BandObserver, CancellationFlag, Cli, Pipeline, PipelineError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let preview_dir = cli.preview_dir.clone();
    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancellation = CancellationFlag::new();
    let mut pipeline = Pipeline::new(config).with_cancellation(cancellation.clone());
    if pipeline.config().preview {
        pipeline = pipeline.with_observer(PreviewWriter { directory: preview_dir });
    }

    let mut worker = tokio::task::spawn_blocking(move || pipeline.run());
    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping after the current band");
            cancellation.cancel();
            worker.await
        }
    };

    match joined {
        Ok(Ok(report)) => {
            for region in &report.regions {
                info!(
                    "  {:<10} color {:?}, {} voxels",
                    region.name, region.color, region.voxels
                );
            }
            if !report.skipped.is_empty() {
                warn!("Empty bands not written: {}", report.skipped.join(", "));
            }
            info!("Wrote {}", report.output.display());
            ExitCode::SUCCESS
        }
        Ok(Err(PipelineError::Cancelled)) => {
            warn!("Cancelled, no structure set written");
            ExitCode::FAILURE
        }
        Ok(Err(e)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Pipeline worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dicom_posterize=debug"
    } else {
        "dicom_posterize=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Saves each band mask as `band_<index>.png`.
struct PreviewWriter {
    directory: PathBuf,
}

impl BandObserver for PreviewWriter {
    fn on_band(&mut self, mask: &BandMask2D, total: usize) {
        if let Err(e) = fs::create_dir_all(&self.directory) {
            warn!("Cannot create preview directory {}: {}", self.directory.display(), e);
            return;
        }
        let path = self.directory.join(format!("band_{}.png", mask.index()));
        match mask.to_display_image().save(&path) {
            Ok(()) => info!(
                "Preview {}/{}: {} ({} px)",
                mask.index() + 1,
                total,
                path.display(),
                mask.pixel_count()
            ),
            Err(e) => warn!("Cannot write preview {}: {}", path.display(), e),
        }
    }
}
