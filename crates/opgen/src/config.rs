use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};

/// What to do when an element function has no implementation for the widest
/// provable vector width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorFallback {
    /// Narrow to the widest width the element function supports.
    #[default]
    Scalar,
    /// Fail with `UnsupportedFusion`.
    Reject,
}

/// Tunables shared by the kernel generators.
///
/// None of these change what a generated kernel computes, only how the work is
/// partitioned across threads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Elements (or vectors) processed by one thread.
    pub elems_per_thread: usize,
    pub threads_per_block: usize,
    /// Upper bound on lanes per vectorized load/store; 1 disables vectorization.
    pub max_vector_width: usize,
    pub vector_fallback: VectorFallback,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            elems_per_thread: 8,
            threads_per_block: 256,
            max_vector_width: 8,
            vector_fallback: VectorFallback::Scalar,
        }
    }
}

impl GeneratorConfig {
    /// Unrolled loop trip count ceiling.
    pub const MAX_ELEMS_PER_THREAD: usize = 1024;
    pub const MAX_THREADS_PER_BLOCK: usize = 1024;
    /// One 16-byte access of the narrowest element type.
    pub const MAX_VECTOR_WIDTH: usize = 16;

    pub fn from_json_str(src: &str) -> GenResult<Self> {
        let config: GeneratorConfig =
            serde_json::from_str(src).map_err(|err| GenError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_elems_per_thread(mut self, value: usize) -> Self {
        self.elems_per_thread = value;
        self
    }

    pub fn with_max_vector_width(mut self, value: usize) -> Self {
        self.max_vector_width = value;
        self
    }

    pub fn with_vector_fallback(mut self, value: VectorFallback) -> Self {
        self.vector_fallback = value;
        self
    }

    pub fn validate(&self) -> GenResult<()> {
        if !(1..=Self::MAX_ELEMS_PER_THREAD).contains(&self.elems_per_thread) {
            return Err(GenError::InvalidConfig(format!(
                "elems_per_thread must be in 1..={}, got {}",
                Self::MAX_ELEMS_PER_THREAD,
                self.elems_per_thread
            )));
        }
        if !(1..=Self::MAX_THREADS_PER_BLOCK).contains(&self.threads_per_block) {
            return Err(GenError::InvalidConfig(format!(
                "threads_per_block must be in 1..={}, got {}",
                Self::MAX_THREADS_PER_BLOCK,
                self.threads_per_block
            )));
        }
        if !self.max_vector_width.is_power_of_two() {
            return Err(GenError::InvalidConfig(format!(
                "max_vector_width must be a power of two, got {}",
                self.max_vector_width
            )));
        }
        if self.max_vector_width > Self::MAX_VECTOR_WIDTH {
            return Err(GenError::InvalidConfig(format!(
                "max_vector_width must be at most {}, got {}",
                Self::MAX_VECTOR_WIDTH,
                self.max_vector_width
            )));
        }
        Ok(())
    }
}
