//! Anchor grid generation.
//!
//! RetinaFace predicts offsets relative to a fixed grid of prior boxes. The grid depends only
//! on the model input size and the level layout the network was exported with, and its order
//! must match the flattening of the network outputs exactly: levels in order, cells row-major
//! within a level, then anchor sizes within a cell.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use log::debug;
use retinaface_utils::config::PriorSettings;

use crate::error::PipelineError;
use crate::preprocess::InputSize;

/// A single anchor in normalized `[0, 1]` model-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBox {
    pub cx: f32,
    pub cy: f32,
    /// Anchor width relative to the input width.
    pub sx: f32,
    /// Anchor height relative to the input height.
    pub sy: f32,
}

/// One feature-map level of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriorLevel {
    pub stride: u32,
    pub min_sizes: Vec<u32>,
}

/// Level layout of the anchor grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PriorConfig {
    pub levels: Vec<PriorLevel>,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                PriorLevel {
                    stride: 8,
                    min_sizes: vec![16, 32],
                },
                PriorLevel {
                    stride: 16,
                    min_sizes: vec![64, 128],
                },
                PriorLevel {
                    stride: 32,
                    min_sizes: vec![256, 512],
                },
            ],
        }
    }
}

impl From<&PriorSettings> for PriorConfig {
    fn from(settings: &PriorSettings) -> Self {
        Self {
            levels: settings
                .levels
                .iter()
                .map(|level| PriorLevel {
                    stride: level.stride,
                    min_sizes: level.min_sizes.clone(),
                })
                .collect(),
        }
    }
}

impl PriorConfig {
    /// Reject layouts that cannot produce a grid: no levels, a zero stride, or a level
    /// without anchor sizes.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.levels.is_empty() {
            return Err(PipelineError::EmptyPriorLayout);
        }
        for (level, settings) in self.levels.iter().enumerate() {
            if settings.stride == 0 {
                return Err(PipelineError::InvalidPriorLevel {
                    level,
                    reason: "stride must be non-zero",
                });
            }
            if settings.min_sizes.is_empty() {
                return Err(PipelineError::InvalidPriorLevel {
                    level,
                    reason: "min_sizes must not be empty",
                });
            }
        }
        Ok(())
    }
}

/// Feature-map `(rows, cols)` of a level: `ceil(H / stride)`, `ceil(W / stride)`.
///
/// A zero stride yields an empty map; [`PriorConfig::validate`] rejects it before generation.
fn feature_map(input: InputSize, stride: u32) -> (u32, u32) {
    if stride == 0 {
        return (0, 0);
    }
    (input.height.div_ceil(stride), input.width.div_ceil(stride))
}

/// Number of priors [`generate_priors`] yields for `input`.
///
/// This is the anchor dimension every network output tensor must have.
pub fn expected_prior_count(input: InputSize, config: &PriorConfig) -> usize {
    config
        .levels
        .iter()
        .map(|level| {
            let (rows, cols) = feature_map(input, level.stride);
            rows as usize * cols as usize * level.min_sizes.len()
        })
        .sum()
}

/// Generate the ordered anchor grid for `input`.
pub fn generate_priors(
    input: InputSize,
    config: &PriorConfig,
) -> Result<Vec<PriorBox>, PipelineError> {
    if input.width == 0 || input.height == 0 {
        return Err(PipelineError::InvalidInputSize {
            width: input.width,
            height: input.height,
        });
    }
    config.validate()?;

    let width = input.width as f32;
    let height = input.height as f32;
    let mut priors = Vec::with_capacity(expected_prior_count(input, config));

    for level in &config.levels {
        let (rows, cols) = feature_map(input, level.stride);
        let stride = level.stride as f32;
        for i in 0..rows {
            let cy = (i as f32 + 0.5) * stride / height;
            for j in 0..cols {
                let cx = (j as f32 + 0.5) * stride / width;
                for &min_size in &level.min_sizes {
                    priors.push(PriorBox {
                        cx,
                        cy,
                        sx: min_size as f32 / width,
                        sy: min_size as f32 / height,
                    });
                }
            }
        }
    }

    debug_assert_eq!(priors.len(), expected_prior_count(input, config));
    Ok(priors)
}

/// Immutable prior grid for one input size, shareable across threads.
#[derive(Debug)]
pub struct PriorSet {
    input_size: InputSize,
    priors: Vec<PriorBox>,
}

impl PriorSet {
    pub fn new(input_size: InputSize, config: &PriorConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            input_size,
            priors: generate_priors(input_size, config)?,
        })
    }

    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    pub fn as_slice(&self) -> &[PriorBox] {
        &self.priors
    }

    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }
}

type PriorCache = Mutex<HashMap<(InputSize, PriorConfig), Arc<PriorSet>>>;

static PRIOR_CACHE: OnceLock<PriorCache> = OnceLock::new();

/// Return the shared prior grid for `input`, generating it on first use.
pub fn cached_priors(
    input: InputSize,
    config: &PriorConfig,
) -> Result<Arc<PriorSet>, PipelineError> {
    let cache = PRIOR_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let key = (input, config.clone());
    if let Some(existing) = guard.get(&key) {
        return Ok(Arc::clone(existing));
    }

    let set = Arc::new(PriorSet::new(input, config)?);
    debug!(
        "generated {} priors for {}x{} input",
        set.len(),
        input.width,
        input.height
    );
    guard.insert(key, Arc::clone(&set));
    Ok(set)
}
