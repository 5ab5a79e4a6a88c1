//! CUDA and ROCm generators for opgen operations.

pub mod fusion;
pub mod slice_reshape_scatter;
pub mod targets;

use std::sync::Arc;

use opgen::GeneratorRegistry;

pub use slice_reshape_scatter::{
    generate_artifact, lower, LoweredScatter, SliceReshapeScatterGenerator,
};
pub use targets::{CudaTarget, RocmTarget, CUDA_TARGET, ROCM_TARGET};

/// Adds this crate's generators for every platform it knows to `registry`.
pub fn register_generators(registry: &mut GeneratorRegistry) {
    for target in [CUDA_TARGET, ROCM_TARGET] {
        registry.register(target, Arc::new(SliceReshapeScatterGenerator::new()));
    }
}

pub fn default_registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    register_generators(&mut registry);
    registry
}
