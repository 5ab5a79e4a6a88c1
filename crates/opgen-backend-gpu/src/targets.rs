use opgen::{DType, Dialect, FusionSpec, LaunchSyntax, TargetPlatform};

use crate::fusion::{fast_tanh_spec, FAST_TANH};

pub const CUDA_TARGET: &str = "cuda";
pub const ROCM_TARGET: &str = "rocm";

const DEFAULT_SM: u32 = 80;

/// NVIDIA CUDA, compiled for one compute capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CudaTarget {
    sm: u32,
}

impl CudaTarget {
    pub fn new(sm: u32) -> Self {
        Self { sm }
    }

    pub fn sm(&self) -> u32 {
        self.sm
    }
}

impl Default for CudaTarget {
    fn default() -> Self {
        Self::new(DEFAULT_SM)
    }
}

fn cuda_elem_type(dtype: DType) -> &'static str {
    match dtype {
        DType::I1 => "bool",
        DType::Si8 => "int8_t",
        DType::Ui8 => "uint8_t",
        DType::Si32 => "int32_t",
        DType::Si64 => "int64_t",
        DType::F16 => "half",
        DType::Bf16 => "__nv_bfloat16",
        DType::F32 => "float",
        DType::F64 => "double",
    }
}

/// Vector access types shared by both platforms for non-bf16 dtypes.
fn common_vector_type(dtype: DType, lanes: usize) -> Option<&'static str> {
    match (dtype, lanes) {
        (DType::F16, 2) => Some("half2"),
        (DType::F16, 4) | (DType::F32, 2) => Some("float2"),
        (DType::F16, 8) | (DType::F32, 4) => Some("float4"),
        (DType::Si32, 2) => Some("int2"),
        (DType::Si32, 4) => Some("int4"),
        (DType::Si64, 2) => Some("longlong2"),
        (DType::F64, 2) => Some("double2"),
        (DType::I1 | DType::Si8 | DType::Ui8, 2) => Some("char2"),
        (DType::I1 | DType::Si8 | DType::Ui8, 4) => Some("char4"),
        (DType::I1 | DType::Si8 | DType::Ui8, 8) => Some("int2"),
        (DType::I1 | DType::Si8 | DType::Ui8, 16) => Some("int4"),
        _ => None,
    }
}

impl TargetPlatform for CudaTarget {
    fn name(&self) -> &str {
        CUDA_TARGET
    }

    fn dialect(&self) -> Dialect {
        Dialect {
            kernel_qualifier: "__global__",
            restrict: "__restrict__",
            launch: LaunchSyntax::TripleChevron,
        }
    }

    fn elem_type(&self, dtype: DType) -> Option<&'static str> {
        Some(cuda_elem_type(dtype))
    }

    fn vector_type(&self, dtype: DType, lanes: usize) -> Option<&'static str> {
        match (dtype, lanes) {
            (_, 1) => Some(cuda_elem_type(dtype)),
            (DType::Bf16, 2) => Some("__nv_bfloat162"),
            (DType::Bf16, 4) => Some("float2"),
            (DType::Bf16, 8) => Some("float4"),
            _ => common_vector_type(dtype, lanes),
        }
    }

    fn stream_type(&self) -> &'static str {
        "cudaStream_t"
    }

    fn headers(&self) -> Vec<String> {
        ["cuda_fp16.h", "cuda_bf16.h", "cstdint", "stdexcept"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn capability(&self) -> Option<u32> {
        Some(self.sm)
    }

    fn resolve_fusion(&self, func: &str) -> Option<FusionSpec> {
        match func {
            FAST_TANH => Some(fast_tanh_spec()),
            _ => None,
        }
    }
}

/// AMD ROCm through HIP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RocmTarget;

impl RocmTarget {
    pub fn new() -> Self {
        Self
    }
}

impl TargetPlatform for RocmTarget {
    fn name(&self) -> &str {
        ROCM_TARGET
    }

    fn dialect(&self) -> Dialect {
        Dialect {
            kernel_qualifier: "__global__",
            restrict: "__restrict__",
            launch: LaunchSyntax::HipLaunchKernelGgl,
        }
    }

    fn elem_type(&self, dtype: DType) -> Option<&'static str> {
        Some(match dtype {
            DType::Bf16 => "hip_bfloat16",
            other => cuda_elem_type(other),
        })
    }

    fn vector_type(&self, dtype: DType, lanes: usize) -> Option<&'static str> {
        match (dtype, lanes) {
            (_, 1) => self.elem_type(dtype),
            (DType::Bf16, _) => None,
            _ => common_vector_type(dtype, lanes),
        }
    }

    fn stream_type(&self) -> &'static str {
        "hipStream_t"
    }

    fn headers(&self) -> Vec<String> {
        [
            "hip/hip_runtime.h",
            "hip/hip_fp16.h",
            "hip/hip_bfloat16.h",
            "cstdint",
            "stdexcept",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn capability(&self) -> Option<u32> {
        None
    }

    fn resolve_fusion(&self, _func: &str) -> Option<FusionSpec> {
        None
    }
}
