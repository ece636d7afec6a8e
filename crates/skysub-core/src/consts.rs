/// Minimum pixel count (h*w) to use row-level Rayon parallelism in the
/// cube reduction.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// File extension shared by all container artifacts.
pub const CONTAINER_EXT: &str = "mcf";

/// Companion validity mask for a frame (1 = valid pixel).
pub const SUFFIX_MASK: &str = "_mask";

/// Modeled sky pattern for a frame.
pub const SUFFIX_SKY: &str = "_sky";

/// Per-pixel contributing-candidate counts for a sky map.
pub const SUFFIX_COUNT: &str = "_cnt";

/// Per-pixel standard deviation across the sky cube.
pub const SUFFIX_RMS: &str = "_rms";

/// Background map returned by the external source extractor.
pub const SUFFIX_BACKGROUND: &str = "_bg";

/// Subtracted frame staged for the external extractor, removed afterward.
pub const SUFFIX_SUB: &str = "_sub";

/// Final cleaned frame (sky-subtracted, flattened, destriped).
pub const SUFFIX_CLEAN: &str = "_cln";

/// Values above this after background flattening are extractor sentinels
/// and get folded into the mask before destriping.
pub const FLATTEN_SENTINEL_HIGH: f32 = 1e5;

/// Values at or below this are extractor bad-pixel fill.
pub const FLATTEN_SENTINEL_LOW: f32 = -1e30;
