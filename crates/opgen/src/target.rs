use crate::fusion::FusionSpec;
use crate::spec::DType;

/// How a host launcher starts a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchSyntax {
    /// `kernel<<<grid, block, shared, stream>>>(args...)`
    TripleChevron,
    /// `hipLaunchKernelGGL(kernel, grid, block, shared, stream, args...)`
    HipLaunchKernelGgl,
}

/// Spelling details of the platform's systems language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dialect {
    pub kernel_qualifier: &'static str,
    pub restrict: &'static str,
    pub launch: LaunchSyntax,
}

/// Supplies the platform-specific names a generator must not hard-code.
pub trait TargetPlatform: Send + Sync {
    /// Registry key, e.g. `cuda`.
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Scalar element type name, or `None` when the dtype is unsupported.
    fn elem_type(&self, dtype: DType) -> Option<&'static str>;

    /// Type that moves `lanes` elements of `dtype` in one access.
    fn vector_type(&self, dtype: DType, lanes: usize) -> Option<&'static str>;

    fn stream_type(&self) -> &'static str;

    /// Variable holding the stream at call sites.
    fn stream_var(&self) -> &'static str {
        "stream"
    }

    /// Headers every generated file for this platform includes.
    fn headers(&self) -> Vec<String>;

    /// Compute capability (e.g. 80 for sm_80); `None` when not applicable.
    fn capability(&self) -> Option<u32>;

    /// Looks up a device element function by name.
    fn resolve_fusion(&self, func: &str) -> Option<FusionSpec>;
}
