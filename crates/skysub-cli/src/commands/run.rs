use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use skysub_core::pipeline::run_batch;

use super::SkyOptions;

#[derive(Args)]
pub struct RunArgs {
    /// List of target frames (one path per line)
    #[arg(short, long)]
    pub list: PathBuf,

    /// Separate list of candidate sky frames (defaults to the target list)
    #[arg(short = 'S', long)]
    pub sublist: Option<PathBuf>,

    /// Instrument-level reference sky to reintroduce before subtraction
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Skip the external background flattening step
    #[arg(long)]
    pub no_background: bool,

    /// Skip destriping
    #[arg(long)]
    pub no_destripe: bool,

    #[command(flatten)]
    pub sky: SkyOptions,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut cfg = args.sky.build_config()?;
    if let Some(reference) = &args.reference {
        cfg.subtract.reference = Some(reference.clone());
    }
    if args.no_background {
        cfg.background.enabled = false;
    }
    if args.no_destripe {
        cfg.destripe.enabled = false;
    }

    let (targets, pool) = super::load_inputs(&args.list, args.sublist.as_deref())?;
    println!(
        "Processing {} targets (pool: {} frames)",
        targets.len(),
        pool.len()
    );

    let pb = super::batch_progress(targets.len(), "Processing")?;
    let summary = run_batch(&targets, &pool, &cfg, |_, _| pb.inc(1));
    pb.finish();

    println!(
        "Done: {} cleaned, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        anyhow::bail!("{} frames failed", summary.failed);
    }
    Ok(())
}
