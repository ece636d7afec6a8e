use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use skysub_core::io::container::ContainerReader;

#[derive(Args)]
pub struct InfoArgs {
    /// Input container file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let reader = ContainerReader::open(&args.file)?;
    let meta = &reader.header.meta;
    let (rows, cols) = reader.dims();

    println!("File:        {}", args.file.display());
    println!("Exposure:    {}", meta.exposure_id);
    println!("Filter:      {}", meta.filter);
    println!("Chips:       {}", reader.chip_count());
    println!("Dimensions:  {}x{}", cols, rows);
    match (meta.ra_deg, meta.dec_deg) {
        (Some(ra), Some(dec)) => println!("Position:    RA {:.6}  Dec {:.6}", ra, dec),
        _ => println!("Position:    (missing)"),
    }
    match meta.mjd {
        Some(mjd) => println!("MJD:         {:.6}", mjd),
        None => println!("MJD:         (missing)"),
    }
    if !meta.sky_levels.is_empty() {
        let levels: Vec<String> = meta.sky_levels.iter().map(|l| format!("{l:.1}")).collect();
        println!("Sky levels:  {}", levels.join(", "));
    }
    if !meta.history.is_empty() {
        println!("History:");
        for entry in &meta.history {
            println!("  {}", entry);
        }
    }

    Ok(())
}
