use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;
use skysub_core::pipeline::check_batch;

use super::SkyOptions;

#[derive(Args)]
pub struct CheckArgs {
    /// List of target frames (one path per line)
    #[arg(short, long)]
    pub list: PathBuf,

    /// Separate list of candidate sky frames (defaults to the target list)
    #[arg(short = 'S', long)]
    pub sublist: Option<PathBuf>,

    #[command(flatten)]
    pub sky: SkyOptions,
}

pub fn run(args: &CheckArgs) -> Result<()> {
    let cfg = args.sky.build_config()?;
    let (targets, pool) = super::load_inputs(&args.list, args.sublist.as_deref())?;

    println!(
        "Checking {} targets against a pool of {} frames",
        targets.len(),
        pool.len()
    );

    let mut usable = 0usize;
    for (path, result) in check_batch(&targets, &pool, &cfg) {
        match result {
            Ok(count) => {
                usable += 1;
                println!("  {} {}: {} candidates", style("ok").green(), path.display(), count);
            }
            Err(e) => {
                println!("  {} {}: {}", style("skip").yellow(), path.display(), e);
            }
        }
    }

    println!("{} of {} targets have enough candidates", usable, targets.len());
    Ok(())
}
