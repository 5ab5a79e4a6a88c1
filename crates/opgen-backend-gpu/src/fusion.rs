//! Built-in element functions.

use opgen::{DType, FusionImpl, FusionSpec, Prelude};

pub const FAST_TANH: &str = "fast_tanh";

/// Hardware tanh for f16 values. The packed overloads need sm_75 PTX; the
/// scalar overload falls back to CUTLASS' float approximation on older parts.
/// `float2`/`float4` overloads treat their bytes as 2/4 `half2` lanes.
const FAST_TANH_DEF: &str = r#"#ifndef OPGEN_HALF2_BITS
#define OPGEN_HALF2_BITS(var) *(reinterpret_cast<unsigned int*>(&(var)))
#endif

#ifndef OPGEN_HALF_BITS
#define OPGEN_HALF_BITS(var) *(reinterpret_cast<unsigned short*>(&(var)))
#endif

__device__ half2 fast_tanh(half2 x) {
#if defined(__CUDA_ARCH__) && (__CUDACC_VER_MAJOR__ >= 11) && (__CUDA_ARCH__ >= 750)
  asm volatile("tanh.approx.f16x2 %0, %1;" : "=r"(OPGEN_HALF2_BITS(x)) : "r"(OPGEN_HALF2_BITS(x)));
  return x;
#else
  CUTLASS_NOT_IMPLEMENTED();
  return x;
#endif
}

__device__ half fast_tanh(half x) {
#if defined(__CUDA_ARCH__) && (__CUDACC_VER_MAJOR__ >= 11) && (__CUDA_ARCH__ >= 750)
  asm volatile("tanh.approx.f16 %0, %1;" : "=h"(OPGEN_HALF_BITS(x)) : "h"(OPGEN_HALF_BITS(x)));
  return x;
#else
  return half(cutlass::fast_tanh(float(x)));
#endif
}

template <int N>
__device__ void fast_tanh_half2s(const half2* x, half2* y) {
#pragma unroll
  for (int i = 0; i < N; ++i) {
    y[i] = fast_tanh(x[i]);
  }
}

__device__ float2 fast_tanh(float2 x) {
  float2 y;
  fast_tanh_half2s<2>(reinterpret_cast<const half2*>(&x), reinterpret_cast<half2*>(&y));
  return y;
}

__device__ float4 fast_tanh(float4 x) {
  float4 y;
  fast_tanh_half2s<4>(reinterpret_cast<const half2*>(&x), reinterpret_cast<half2*>(&y));
  return y;
}
"#;

const PACKED_MIN_SM: u32 = 75;

pub fn fast_tanh_spec() -> FusionSpec {
    let mut impls = vec![FusionImpl {
        dtype: DType::F16,
        lanes: 1,
        min_capability: None,
    }];
    impls.extend([2, 4, 8].into_iter().map(|lanes| FusionImpl {
        dtype: DType::F16,
        lanes,
        min_capability: Some(PACKED_MIN_SM),
    }));
    FusionSpec {
        func: FAST_TANH.to_string(),
        impls,
        includes: vec!["cutlass/fast_math.h".to_string()],
        definitions: vec![Prelude::new(FAST_TANH, FAST_TANH_DEF)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_overloads_need_turing() {
        let spec = fast_tanh_spec();
        assert!(spec.supports(DType::F16, 1, Some(70)));
        assert!(!spec.supports(DType::F16, 8, Some(70)));
        assert!(spec.supports(DType::F16, 8, Some(75)));
        assert!(!spec.supports(DType::F32, 1, Some(90)));
    }

    #[test]
    fn definitions_cover_every_vector_overload() {
        let spec = fast_tanh_spec();
        let text = &spec.definitions[0].text;
        for signature in [
            "half2 fast_tanh(half2 x)",
            "half fast_tanh(half x)",
            "float2 fast_tanh(float2 x)",
            "float4 fast_tanh(float4 x)",
        ] {
            assert!(text.contains(signature), "missing {signature}");
        }
    }
}
