pub mod check;
pub mod config;
pub mod info;
pub mod mksky;
pub mod run;
pub mod subsky;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use skysub_core::config::{CubeMode, NormalizePolicy, SkyConfig};
use skysub_core::io::candidates;
use skysub_core::select::PoolEntry;

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Subtract,
    Rescale,
}

impl From<PolicyArg> for NormalizePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Subtract => NormalizePolicy::Subtract,
            PolicyArg::Rescale => NormalizePolicy::Rescale,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Median,
    Regression,
}

impl From<ModeArg> for CubeMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Median => CubeMode::Median,
            ModeArg::Regression => CubeMode::Regression,
        }
    }
}

/// Options shared by the sky-building and full-run commands.
#[derive(Args)]
pub struct SkyOptions {
    /// Pipeline config file (TOML); command-line flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of candidates used to build each sky
    #[arg(short = 'n', long)]
    pub num_images: Option<usize>,

    /// Minimum number of candidates required per target
    #[arg(short = 's', long)]
    pub min_skies: Option<usize>,

    /// Maximum time separation in minutes
    #[arg(short = 't', long)]
    pub time: Option<f64>,

    /// Maximum angular separation in arcminutes
    #[arg(short = 'd', long)]
    pub dist: Option<f64>,

    /// Candidate normalization policy
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Sky estimation mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Rejection threshold (sigma) for the regression refit
    #[arg(long)]
    pub nsig: Option<f32>,

    /// Also write the per-pixel standard deviation map
    #[arg(long)]
    pub rms: bool,
}

impl SkyOptions {
    /// Load the TOML config (or defaults) and apply flag overrides.
    pub fn build_config(&self) -> Result<SkyConfig> {
        let mut cfg = load_config(self.config.as_deref())?;
        if let Some(n) = self.num_images {
            cfg.selection.max_candidates = n;
        }
        if let Some(s) = self.min_skies {
            cfg.selection.min_candidates = s;
        }
        if let Some(t) = self.time {
            cfg.selection.max_time_delta_min = t;
        }
        if let Some(d) = self.dist {
            cfg.selection.max_angular_distance_arcmin = d;
        }
        if let Some(policy) = self.policy {
            cfg.cube.policy = policy.into();
        }
        if let Some(mode) = self.mode {
            cfg.cube.mode = mode.into();
        }
        if let Some(nsig) = self.nsig {
            cfg.cube.nsig = nsig;
        }
        if self.rms {
            cfg.cube.with_rms = true;
        }
        Ok(cfg)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<SkyConfig> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents).context("Invalid pipeline config")
        }
        None => Ok(SkyConfig::default()),
    }
}

/// Read the target list and build the candidate pool. When no separate
/// pool list is given, the target list doubles as the pool.
pub fn load_inputs(
    list: &Path,
    sublist: Option<&Path>,
) -> Result<(Vec<PathBuf>, Vec<PoolEntry>)> {
    let targets = candidates::read_list(list)
        .with_context(|| format!("Failed to read target list {}", list.display()))?;
    let pool_paths = match sublist {
        Some(sublist) => candidates::read_list(sublist)
            .with_context(|| format!("Failed to read sky list {}", sublist.display()))?,
        None => targets.clone(),
    };
    let pool = candidates::build_pool(&pool_paths).context("Failed to build candidate pool")?;
    Ok((targets, pool))
}

pub fn batch_progress(total: usize, label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!("{label} [{{bar:40}}] {{pos}}/{{len}}"))?
            .progress_chars("=> "),
    );
    Ok(pb)
}
