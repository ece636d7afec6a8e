use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use skysub_core::pipeline::run_apply_sky_batch;

#[derive(Args)]
pub struct SubSkyArgs {
    /// List of target frames with previously built `_sky` maps
    #[arg(short, long)]
    pub list: PathBuf,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Instrument-level reference sky to reintroduce before subtraction
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Residual clipping threshold in sigma
    #[arg(long)]
    pub clip_sigma: Option<f32>,

    /// Background mesh size in pixels
    #[arg(long)]
    pub back_size: Option<u32>,

    /// Background filter size in meshes
    #[arg(long)]
    pub back_filter: Option<u32>,

    /// Skip the external background flattening step
    #[arg(long)]
    pub no_background: bool,

    /// Skip destriping
    #[arg(long)]
    pub no_destripe: bool,
}

pub fn run(args: &SubSkyArgs) -> Result<()> {
    let mut cfg = super::load_config(args.config.as_deref())?;
    if let Some(reference) = &args.reference {
        cfg.subtract.reference = Some(reference.clone());
    }
    if let Some(clip) = args.clip_sigma {
        cfg.subtract.clip_sigma = clip;
    }
    if let Some(size) = args.back_size {
        cfg.background.back_size = size;
    }
    if let Some(filter) = args.back_filter {
        cfg.background.back_filter_size = filter;
    }
    if args.no_background {
        cfg.background.enabled = false;
    }
    if args.no_destripe {
        cfg.destripe.enabled = false;
    }

    let targets = skysub_core::io::candidates::read_list(&args.list)?;
    println!("Applying skies to {} targets", targets.len());

    let pb = super::batch_progress(targets.len(), "Applying skies")?;
    let summary = run_apply_sky_batch(&targets, &cfg, |_, _| pb.inc(1));
    pb.finish();

    println!(
        "Done: {} cleaned, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(())
}
