use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};
use crate::spec::{Dimension, TensorDesc};

/// Per-axis window into an input tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceSpec {
    pub starts: Vec<usize>,
    pub sizes: Vec<Dimension>,
}

impl SliceSpec {
    pub fn new(starts: Vec<usize>, sizes: Vec<Dimension>) -> Self {
        Self { starts, sizes }
    }

    /// The whole tensor.
    pub fn full(dims: &[Dimension]) -> Self {
        Self {
            starts: vec![0; dims.len()],
            sizes: dims.to_vec(),
        }
    }

    /// Half-open static bounds `[starts[a], ends[a])` per axis.
    pub fn from_bounds(starts: &[usize], ends: &[usize]) -> GenResult<Self> {
        if starts.len() != ends.len() {
            return Err(GenError::invalid_attrs(
                "slice",
                format!("{} starts but {} ends", starts.len(), ends.len()),
            ));
        }
        let mut sizes = Vec::with_capacity(ends.len());
        for (axis, (start, end)) in starts.iter().zip(ends).enumerate() {
            let size = end.checked_sub(*start).ok_or_else(|| {
                GenError::invalid_attrs(
                    "slice",
                    format!("end {end} precedes start {start} on axis {axis}"),
                )
            })?;
            sizes.push(Dimension::Static(size));
        }
        Ok(Self {
            starts: starts.to_vec(),
            sizes,
        })
    }

    pub fn rank(&self) -> usize {
        self.sizes.len()
    }
}

/// One input of a scatter: the tensor, the window read from it, and where
/// along the scatter axis the window lands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScatterMember {
    pub input: TensorDesc,
    pub slice: SliceSpec,
    pub dest_offset: usize,
}

impl ScatterMember {
    pub fn new(input: TensorDesc, slice: SliceSpec, dest_offset: usize) -> Self {
        Self {
            input,
            slice,
            dest_offset,
        }
    }

    /// Scatter the whole of `input` at `dest_offset`.
    pub fn whole(input: TensorDesc, dest_offset: usize) -> Self {
        let slice = SliceSpec::full(input.dims());
        Self::new(input, slice, dest_offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScatterGroup {
    pub scatter_dim: usize,
    pub members: Vec<ScatterMember>,
}

/// Slices several inputs, stacks the slices along `group.scatter_dim` and
/// writes the result into `output`, which must hold the same number of
/// elements in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceReshapeScatterAttrs {
    /// Operator name; the generated launcher is called this.
    pub name: String,
    pub group: ScatterGroup,
    pub output: TensorDesc,
}

/// Attribute records of the operations generators exist for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpAttrs {
    SliceReshapeScatter(SliceReshapeScatterAttrs),
}

impl OpAttrs {
    pub const SLICE_RESHAPE_SCATTER: &'static str = "slice_reshape_scatter";

    pub fn op_kind(&self) -> &'static str {
        match self {
            OpAttrs::SliceReshapeScatter(_) => Self::SLICE_RESHAPE_SCATTER,
        }
    }
}

impl From<SliceReshapeScatterAttrs> for OpAttrs {
    fn from(attrs: SliceReshapeScatterAttrs) -> Self {
        OpAttrs::SliceReshapeScatter(attrs)
    }
}
