//! WSI Tiler - mask-filtered parallel tile processing for Whole Slide Images.
//!
//! This binary runs the tiling pipeline over a slide image and reports grid
//! plans.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{
        Cli, Command, PlanConfig, PlanOutputFormat, ProcessConfig, ProcessorKind, TransformKind,
    },
    grid::MaskFilter,
    mask::load_mask,
    pipeline::{
        plan_grid, rescale, GrayscaleProcessor, IdentityProcessor, MeanIntensityProcessor,
        TilePipeline, TileProcessor,
    },
    slide::ImageFileSource,
    store::{save_array, DiskStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Process(config) => run_process(config).await,
        Command::Plan(config) => run_plan(config),
    }
}

// =============================================================================
// Process Command
// =============================================================================

async fn run_process(config: ProcessConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match config.processor {
        ProcessorKind::Identity => execute(&config, IdentityProcessor).await,
        ProcessorKind::Grayscale => execute(&config, GrayscaleProcessor).await,
        ProcessorKind::MeanIntensity => execute(&config, MeanIntensityProcessor).await,
    }
}

/// Plan the grid, create a store of the right shape and run the pipeline.
async fn execute<P: TileProcessor + 'static>(config: &ProcessConfig, processor: P) -> ExitCode {
    let params = config.tiling_params();

    let mask = match load_mask(&config.mask) {
        Ok(mask) => mask,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let plan = match plan_grid(&ImageFileSource, &config.slide, &mask, &params) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let shape = plan.output_shape(processor.output_kind());
    let chunks = [config.chunk_size, config.chunk_size];
    let store = match DiskStore::create(&config.store, shape, chunks) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create output store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Slide: {}", config.slide.display());
    info!("  Mask: {}", config.mask.display());
    info!("  Store: {} {:?}", config.store.display(), shape);
    info!(
        "  Grid: {}x{} (tile {}, stride {}, pad {}x{})",
        plan.width, plan.height, plan.tile_size, plan.stride, plan.pad_w, plan.pad_h
    );
    info!("  Workers: {}", params.n_workers);

    let mut pipeline = TilePipeline::new(ImageFileSource, store, processor, params);
    if config.transform == TransformKind::Rescale {
        pipeline = pipeline.with_output_transform(rescale);
    }

    let output = match Arc::new(pipeline)
        .run_async_with_mask(config.slide.clone(), mask)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Processed {} of {} tiles ({} skipped by the mask)",
        output.report.written, output.report.considered, output.report.skipped
    );

    if let Some(ref path) = config.output {
        if let Err(e) = save_array(path, &output.array) {
            error!("Failed to save output: {}", e);
            return ExitCode::FAILURE;
        }
        info!("Saved {:?} array to {}", output.array.shape(), path.display());
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Plan Command
// =============================================================================

fn run_plan(config: PlanConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let mask = match load_mask(&config.mask) {
        Ok(mask) => mask,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let params = config.geometry.tiling_params();
    let plan = match plan_grid(&ImageFileSource, &config.slide, &mask, &params) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let accepted = MaskFilter::new(&plan, &mask, params.mask_ratio)
        .accepted()
        .count();

    match config.format {
        PlanOutputFormat::Text => {
            println!("Grid plan for {}", config.slide.display());
            println!("─────────────────────────────────");
            println!("  Unpadded size: {}x{}", plan.unpadded_width, plan.unpadded_height);
            println!("  Grid size:     {}x{}", plan.width, plan.height);
            println!("  Padding:       {}x{}", plan.pad_w, plan.pad_h);
            println!("  Tile size:     {} (stride {})", plan.tile_size, plan.stride);
            println!(
                "  Mask:          {}x{} (downsample {}, {} px per tile)",
                mask.rows(),
                mask.cols(),
                plan.mask_ds,
                plan.mask_tile_size
            );
            println!();
            println!(
                "  Tiles:         {} of {} accepted (ratio > {})",
                accepted,
                plan.candidate_count(),
                params.mask_ratio
            );
        }
        PlanOutputFormat::Json => {
            let json = serde_json::json!({
                "slide": config.slide.display().to_string(),
                "plan": plan,
                "candidates": plan.candidate_count(),
                "accepted": accepted,
                "mask_ratio": params.mask_ratio,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
