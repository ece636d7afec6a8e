use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use skysub_core::pipeline::run_make_sky_batch;

use super::SkyOptions;

#[derive(Args)]
pub struct MkSkyArgs {
    /// List of target frames (one path per line)
    #[arg(short, long)]
    pub list: PathBuf,

    /// Separate list of candidate sky frames (defaults to the target list)
    #[arg(short = 'S', long)]
    pub sublist: Option<PathBuf>,

    #[command(flatten)]
    pub sky: SkyOptions,
}

pub fn run(args: &MkSkyArgs) -> Result<()> {
    let cfg = args.sky.build_config()?;
    let (targets, pool) = super::load_inputs(&args.list, args.sublist.as_deref())?;

    println!(
        "Building skies for {} targets (pool: {} frames)",
        targets.len(),
        pool.len()
    );

    let pb = super::batch_progress(targets.len(), "Building skies")?;
    let summary = run_make_sky_batch(&targets, &pool, &cfg, |_, _| pb.inc(1));
    pb.finish();

    println!(
        "Done: {} built, {} skipped, {} failed",
        summary.processed, summary.skipped, summary.failed
    );
    Ok(())
}
