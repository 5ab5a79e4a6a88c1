use serde::{Deserialize, Serialize};

use crate::config::VectorFallback;
use crate::error::{GenError, GenResult};
use crate::ir::Expr;
use crate::spec::DType;
use crate::unit::{Prelude, PreludeRequest};

/// One available implementation of an element function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FusionImpl {
    pub dtype: DType,
    /// Elements transformed per call; 1 is the scalar overload.
    pub lanes: usize,
    /// Lowest compute capability the overload compiles for.
    pub min_capability: Option<u32>,
}

/// Device element function applied to every copied element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionSpec {
    pub func: String,
    pub impls: Vec<FusionImpl>,
    pub includes: Vec<String>,
    pub definitions: Vec<Prelude>,
}

impl FusionSpec {
    pub fn supports(&self, dtype: DType, lanes: usize, capability: Option<u32>) -> bool {
        self.impls.iter().any(|imp| {
            imp.dtype == dtype
                && imp.lanes == lanes
                && match (imp.min_capability, capability) {
                    (None, _) => true,
                    (Some(min), Some(cap)) => cap >= min,
                    (Some(_), None) => false,
                }
        })
    }

    /// Includes and definitions the function needs in the generated file.
    pub fn prelude_request(&self) -> PreludeRequest {
        PreludeRequest {
            includes: self.includes.clone(),
            preludes: self.definitions.clone(),
        }
    }

    /// Picks the width the fused copy runs at, given the widest width the
    /// addressing allows.
    ///
    /// Widths are powers of two, so every narrower candidate divides `max_lanes`.
    pub fn negotiate_lanes(
        &self,
        op: &str,
        dtype: DType,
        max_lanes: usize,
        capability: Option<u32>,
        fallback: VectorFallback,
    ) -> GenResult<usize> {
        if self.supports(dtype, max_lanes, capability) {
            return Ok(max_lanes);
        }
        let unsupported = || GenError::UnsupportedFusion {
            op: op.to_string(),
            func: self.func.clone(),
            dtype,
            lanes: max_lanes,
            capability,
        };
        if fallback == VectorFallback::Reject {
            return Err(unsupported());
        }
        let mut lanes = max_lanes / 2;
        while lanes >= 1 {
            if self.supports(dtype, lanes, capability) {
                tracing::warn!(
                    op,
                    func = %self.func,
                    from = max_lanes,
                    to = lanes,
                    "element function narrows vector width"
                );
                return Ok(lanes);
            }
            lanes /= 2;
        }
        Err(unsupported())
    }
}

/// Wraps a loaded element in the fusion call, or returns it unchanged.
pub fn inject(value: Expr, fusion: Option<&FusionSpec>) -> Expr {
    match fusion {
        Some(spec) => Expr::call(spec.func.clone(), vec![value]),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> FusionSpec {
        FusionSpec {
            func: "act".to_string(),
            impls: vec![
                FusionImpl {
                    dtype: DType::F16,
                    lanes: 1,
                    min_capability: None,
                },
                FusionImpl {
                    dtype: DType::F16,
                    lanes: 2,
                    min_capability: Some(75),
                },
            ],
            includes: Vec::new(),
            definitions: Vec::new(),
        }
    }

    #[test]
    fn capability_gates_vector_overloads() {
        let spec = spec();
        assert!(spec.supports(DType::F16, 2, Some(80)));
        assert!(!spec.supports(DType::F16, 2, Some(70)));
        assert!(!spec.supports(DType::F16, 2, None));
        assert!(spec.supports(DType::F16, 1, None));
    }

    #[test]
    fn scalar_policy_narrows_to_supported_width() {
        let lanes = spec()
            .negotiate_lanes("op", DType::F16, 8, Some(70), VectorFallback::Scalar)
            .expect("scalar exists");
        assert_eq!(lanes, 1);
        let lanes = spec()
            .negotiate_lanes("op", DType::F16, 8, Some(80), VectorFallback::Scalar)
            .expect("half2 exists");
        assert_eq!(lanes, 2);
    }

    #[test]
    fn reject_policy_reports_requested_width() {
        let err = spec()
            .negotiate_lanes("op", DType::F16, 4, Some(80), VectorFallback::Reject)
            .expect_err("no 4-wide overload");
        assert!(matches!(err, GenError::UnsupportedFusion { lanes: 4, .. }));
    }

    #[test]
    fn missing_dtype_is_unsupported_under_any_policy() {
        let err = spec()
            .negotiate_lanes("op", DType::F32, 1, Some(80), VectorFallback::Scalar)
            .expect_err("no f32 overload");
        assert!(matches!(err, GenError::UnsupportedFusion { dtype: DType::F32, .. }));
    }

    #[test]
    fn inject_without_fusion_is_identity() {
        let load = Expr::var("x");
        assert_eq!(inject(load.clone(), None), load);
        assert_eq!(
            inject(load.clone(), Some(&spec())),
            Expr::call("act", vec![load])
        );
    }
}
