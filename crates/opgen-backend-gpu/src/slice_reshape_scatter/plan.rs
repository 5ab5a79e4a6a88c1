//! Validation and address arithmetic for slice + reshape + scatter.
//!
//! The slices are stacked along the scatter axis into a "scatter view"; the
//! output tensor is a row-major reshape of that view, so every write offset is
//! computed with the view's strides. All extents, starts and strides kept in a
//! [`ScatterPlan`] are in units of `lanes` elements along the innermost axis.

use opgen::fusion::FusionSpec;
use opgen::ir::{Expr, Stmt, Ty};
use opgen::shape::{dim_expr, product, row_major_strides};
use opgen::symbols::{sanitize_symbol, symbol_ident};
use opgen::unit::PreludeRequest;
use opgen::{
    DType, DimSymbol, Dimension, GenContext, GenError, GenResult, ScatterMember,
    SliceReshapeScatterAttrs,
};

const MAX_VECTOR_BYTES: usize = 16;

/// Names the generated kernel and launcher declare themselves.
fn is_reserved(ident: &str) -> bool {
    const FIXED: [&str; 7] = [
        "output",
        "output_shape",
        "stream",
        "chunk",
        "base",
        "idx",
        "total_chunks",
    ];
    let numbered = |prefix: &str| {
        ident
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    };
    FIXED.contains(&ident) || ident == "j" || numbered("input_") || numbered("i")
}

pub(crate) fn input_param(member: usize) -> String {
    format!("input_{member}")
}

pub(crate) fn coord_var(axis: usize) -> String {
    format!("i{axis}")
}

#[derive(Debug, Clone)]
pub(crate) struct MemberPlan {
    pub(crate) index: usize,
    pub(crate) sizes: Vec<Expr>,
    pub(crate) starts: Vec<Expr>,
    pub(crate) in_strides: Vec<Expr>,
    /// Displacement along the scatter axis.
    pub(crate) dest_offset: Expr,
    /// Vector elements this member copies.
    pub(crate) count: Expr,
}

impl MemberPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.count.as_int() == Some(0)
    }
}

/// Per-element addressing for one member, in terms of the flat index `idx`.
#[derive(Debug, Clone)]
pub(crate) struct MemberAddressing {
    /// `const int64_t i<a> = ...;` for every axis.
    pub(crate) coords: Vec<Stmt>,
    pub(crate) read: Expr,
    pub(crate) write: Expr,
}

/// Immutable result of validating one set of attributes.
#[derive(Debug, Clone)]
pub(crate) struct ScatterPlan {
    pub(crate) op: String,
    pub(crate) dtype: DType,
    pub(crate) elem_type: &'static str,
    pub(crate) scatter_dim: usize,
    pub(crate) members: Vec<MemberPlan>,
    pub(crate) view_strides: Vec<Expr>,
    pub(crate) output_dims: Vec<Dimension>,
    /// Dynamic dimensions in order of first appearance, with their C identifiers.
    pub(crate) symbols: Vec<(String, DimSymbol)>,
    /// Deferred checks run by the launcher before any launch.
    pub(crate) guards: Vec<Stmt>,
    pub(crate) lanes: usize,
    pub(crate) vector_type: Option<&'static str>,
    pub(crate) fusion: Option<FusionSpec>,
    pub(crate) prelude: PreludeRequest,
    pub(crate) elems_per_thread: usize,
    pub(crate) threads_per_block: usize,
}

impl ScatterPlan {
    pub(crate) fn build(
        ctx: GenContext<'_>,
        attrs: &SliceReshapeScatterAttrs,
        element_func: Option<&str>,
    ) -> GenResult<Self> {
        ctx.config.validate()?;
        let op = attrs.name.as_str();
        let dtype = attrs.output.dtype();
        let elem_type = ctx
            .target
            .elem_type(dtype)
            .ok_or_else(|| GenError::UnsupportedDType {
                op: op.to_string(),
                dtype,
                target: ctx.target.name().to_string(),
            })?;
        let rank = check_structure(op, attrs, dtype)?;
        check_index_range(op, attrs)?;
        let scatter_dim = attrs.group.scatter_dim;
        let symbols = collect_symbols(op, attrs)?;
        check_function_names(op, attrs, &symbols, ctx.target.stream_var())?;

        let mut guards = Vec::new();
        check_slice_bounds(op, attrs, &mut guards)?;
        let extents = scatter_extents(op, attrs)?;
        check_extent_agreement(op, attrs, &mut guards)?;
        let total = check_coverage(op, attrs, &extents)?;
        check_reshape(op, attrs, total, &mut guards)?;

        let max_lanes = provable_lanes(ctx, attrs, dtype, total);
        let capability = ctx.target.capability();
        let fusion = match element_func {
            Some(func) => Some(ctx.target.resolve_fusion(func).ok_or_else(|| {
                GenError::UnsupportedFusion {
                    op: op.to_string(),
                    func: func.to_string(),
                    dtype,
                    lanes: max_lanes,
                    capability,
                }
            })?),
            None => None,
        };
        let lanes = match &fusion {
            Some(spec) => spec.negotiate_lanes(
                op,
                dtype,
                max_lanes,
                capability,
                ctx.config.vector_fallback,
            )?,
            None => max_lanes,
        };
        let vector_type = if lanes > 1 {
            Some(
                ctx.target
                    .vector_type(dtype, lanes)
                    .ok_or_else(|| GenError::UnsupportedDType {
                        op: op.to_string(),
                        dtype,
                        target: ctx.target.name().to_string(),
                    })?,
            )
        } else {
            None
        };

        let last = rank - 1;
        let scale = |axis: usize, value: Expr| {
            if axis == last {
                value / Expr::from(lanes)
            } else {
                value
            }
        };
        let view_dims: Vec<Expr> = (0..rank)
            .map(|axis| {
                let extent = if axis == scatter_dim {
                    Expr::from(total)
                } else {
                    dim_expr(&attrs.group.members[0].slice.sizes[axis])
                };
                scale(axis, extent)
            })
            .collect();
        let view_strides = row_major_strides(&view_dims);

        let members = attrs
            .group
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                let sizes: Vec<Expr> = (0..rank)
                    .map(|axis| scale(axis, dim_expr(&member.slice.sizes[axis])))
                    .collect();
                let starts = (0..rank)
                    .map(|axis| scale(axis, Expr::from(member.slice.starts[axis])))
                    .collect();
                let input_dims: Vec<Expr> = member
                    .input
                    .dims()
                    .iter()
                    .enumerate()
                    .map(|(axis, dim)| scale(axis, dim_expr(dim)))
                    .collect();
                MemberPlan {
                    index,
                    count: product(&sizes),
                    sizes,
                    starts,
                    in_strides: row_major_strides(&input_dims),
                    dest_offset: scale(scatter_dim, Expr::from(member.dest_offset)),
                }
            })
            .collect();

        let mut prelude = PreludeRequest::default();
        for header in ctx.target.headers() {
            prelude.include(header);
        }
        if let Some(spec) = &fusion {
            prelude.merge(spec.prelude_request());
        }

        Ok(Self {
            op: op.to_string(),
            dtype,
            elem_type,
            scatter_dim,
            members,
            view_strides,
            output_dims: attrs.output.dims().to_vec(),
            symbols,
            guards,
            lanes,
            vector_type,
            fusion,
            prelude,
            elems_per_thread: ctx.config.elems_per_thread,
            threads_per_block: ctx.config.threads_per_block,
        })
    }

    pub(crate) fn input_view(&self) -> Option<Ty> {
        self.vector_type.map(|ty| Ty::const_ptr(Ty::named(ty)))
    }

    pub(crate) fn output_view(&self) -> Option<Ty> {
        self.vector_type.map(|ty| Ty::ptr(Ty::named(ty)))
    }

    /// Coordinates, read offset and write offset of element `idx` of `member`.
    ///
    /// `i<a> = (idx / prod(sizes[a+1..])) % sizes[a]`; the read offset adds the
    /// slice start per axis and uses the input's strides, the write offset uses
    /// the scatter view's strides and adds the destination displacement.
    pub(crate) fn addressing(&self, member: &MemberPlan, idx: &Expr) -> MemberAddressing {
        let rank = member.sizes.len();
        let mut coords = Vec::with_capacity(rank);
        let mut read = Expr::int(0);
        let mut write = Expr::int(0);
        for axis in 0..rank {
            let inner = product(&member.sizes[axis + 1..]);
            let mut coord = idx.clone() / inner;
            if axis > 0 {
                coord = coord % member.sizes[axis].clone();
            }
            let name = coord_var(axis);
            coords.push(Stmt::const_i64(name.clone(), coord));
            let var = Expr::var(name);
            read = read
                + (member.starts[axis].clone() + var.clone()) * member.in_strides[axis].clone();
            write = write + var * self.view_strides[axis].clone();
        }
        write = write + member.dest_offset.clone() * self.view_strides[self.scatter_dim].clone();
        MemberAddressing {
            coords,
            read,
            write,
        }
    }
}

fn check_structure(op: &str, attrs: &SliceReshapeScatterAttrs, dtype: DType) -> GenResult<usize> {
    let members = &attrs.group.members;
    let first = members
        .first()
        .ok_or_else(|| GenError::invalid_attrs(op, "scatter group has no inputs"))?;
    let rank = first.input.rank();
    if rank == 0 {
        return Err(GenError::invalid_attrs(op, "scattered inputs must have rank >= 1"));
    }
    if attrs.group.scatter_dim >= rank {
        return Err(GenError::invalid_attrs(
            op,
            format!(
                "scatter_dim {} is out of range for rank-{rank} inputs",
                attrs.group.scatter_dim
            ),
        ));
    }
    for (k, member) in members.iter().enumerate() {
        if member.input.dtype() != dtype {
            return Err(GenError::invalid_attrs(
                op,
                format!(
                    "input {k} has dtype {}, output has {dtype}",
                    member.input.dtype()
                ),
            ));
        }
        if member.input.rank() != rank {
            return Err(GenError::invalid_attrs(
                op,
                format!(
                    "input {k} has rank {}, input 0 has rank {rank}",
                    member.input.rank()
                ),
            ));
        }
        let slice = &member.slice;
        if slice.starts.len() != rank || slice.sizes.len() != rank {
            return Err(GenError::invalid_slice(
                op,
                k,
                slice.starts.len().min(slice.sizes.len()),
                format!(
                    "{} starts and {} sizes for a rank-{rank} input",
                    slice.starts.len(),
                    slice.sizes.len()
                ),
            ));
        }
    }
    Ok(rank)
}

fn collect_symbols(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
) -> GenResult<Vec<(String, DimSymbol)>> {
    let member_dims = attrs
        .group
        .members
        .iter()
        .flat_map(|member| member.input.dims().iter().chain(&member.slice.sizes));
    let mut symbols: Vec<(String, DimSymbol)> = Vec::new();
    for dim in attrs.output.dims().iter().chain(member_dims) {
        let Some(sym) = dim.as_symbol() else {
            continue;
        };
        let ident = symbol_ident(sym);
        if is_reserved(&ident) {
            return Err(GenError::invalid_attrs(
                op,
                format!("dimension `{sym}` clashes with a generated identifier"),
            ));
        }
        match symbols.iter().find(|(existing, _)| *existing == ident) {
            Some((_, existing)) if existing != sym => {
                return Err(GenError::invalid_attrs(
                    op,
                    format!("dimensions `{existing}` and `{sym}` both map to identifier `{ident}`"),
                ));
            }
            Some(_) => {}
            None => symbols.push((ident, sym.clone())),
        }
    }
    Ok(symbols)
}

/// Static elements in `dims`, or `None` when an extent or the product leaves
/// the `int64_t` range generated index arithmetic works in.
fn static_count(values: &[usize]) -> Option<usize> {
    let limit = i64::MAX as usize;
    if values.iter().any(|&value| value > limit) {
        return None;
    }
    if values.contains(&0) {
        return Some(0);
    }
    values
        .iter()
        .try_fold(1usize, |acc, &value| acc.checked_mul(value))
        .filter(|&count| count <= limit)
}

fn check_index_range(op: &str, attrs: &SliceReshapeScatterAttrs) -> GenResult<()> {
    let out_of_range = |what: String| {
        GenError::invalid_attrs(op, format!("{what} exceeds the int64_t index range"))
    };
    let statics = |dims: &[Dimension]| {
        dims.iter()
            .filter_map(Dimension::as_static)
            .collect::<Vec<_>>()
    };
    let members = &attrs.group.members;
    for (k, member) in members.iter().enumerate() {
        if static_count(&statics(member.input.dims())).is_none() {
            return Err(out_of_range(format!("input {k} shape {}", member.input.spec.shape)));
        }
        if static_count(&statics(&member.slice.sizes)).is_none() {
            return Err(out_of_range(format!("slice of input {k}")));
        }
        if member.slice.starts.iter().any(|&start| start > i64::MAX as usize) {
            return Err(out_of_range(format!("slice start of input {k}")));
        }
        if member.dest_offset > i64::MAX as usize {
            return Err(out_of_range(format!("destination offset of input {k}")));
        }
    }
    if static_count(&statics(attrs.output.dims())).is_none() {
        return Err(out_of_range(format!("output shape {}", attrs.output.spec.shape)));
    }

    let dim = attrs.group.scatter_dim;
    let total = members
        .iter()
        .filter_map(|member| member.slice.sizes[dim].as_static())
        .try_fold(0usize, |acc, extent| acc.checked_add(extent));
    let view: Option<Vec<usize>> = members[0]
        .slice
        .sizes
        .iter()
        .enumerate()
        .map(|(axis, size)| if axis == dim { total } else { Some(size.as_static().unwrap_or(1)) })
        .collect();
    if view.as_deref().and_then(static_count).is_none() {
        return Err(out_of_range("scattered slices".to_string()));
    }
    Ok(())
}

/// The call site names the launcher next to the caller's variables, and the
/// launcher names the kernel next to its own parameters.
fn check_function_names(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
    symbols: &[(String, DimSymbol)],
    stream_var: &str,
) -> GenResult<()> {
    let launcher = sanitize_symbol(op);
    let kernel = format!("{launcher}_kernel");
    let caller_names = attrs
        .group
        .members
        .iter()
        .map(|member| member.input.name.as_str())
        .chain([attrs.output.name.as_str(), stream_var])
        .chain(symbols.iter().map(|(ident, _)| ident.as_str()));
    for name in caller_names {
        if name == launcher {
            return Err(GenError::invalid_attrs(
                op,
                format!("`{name}` clashes with the generated launcher name"),
            ));
        }
    }
    if let Some((ident, _)) = symbols.iter().find(|(ident, _)| *ident == kernel) {
        return Err(GenError::invalid_attrs(
            op,
            format!("dimension `{ident}` clashes with the generated kernel name"),
        ));
    }
    Ok(())
}

fn check_slice_bounds(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
    guards: &mut Vec<Stmt>,
) -> GenResult<()> {
    for (k, member) in attrs.group.members.iter().enumerate() {
        let slice = &member.slice;
        for (axis, extent) in member.input.dims().iter().enumerate() {
            let start = slice.starts[axis];
            let size = &slice.sizes[axis];
            match (size.as_static(), extent.as_static()) {
                (Some(size), Some(extent)) => {
                    if start.checked_add(size).map_or(true, |end| end > extent) {
                        return Err(GenError::invalid_slice(
                            op,
                            k,
                            axis,
                            format!("start {start} + size {size} exceeds extent {extent}"),
                        ));
                    }
                }
                (_, static_extent) => {
                    if let Some(extent) = static_extent {
                        if start > extent {
                            return Err(GenError::invalid_slice(
                                op,
                                k,
                                axis,
                                format!("start {start} exceeds extent {extent}"),
                            ));
                        }
                    }
                    if start == 0 && size == extent {
                        continue;
                    }
                    let cond = (Expr::from(start) + dim_expr(size)).le(dim_expr(extent));
                    guards.extend(Stmt::guard(
                        cond,
                        format!("{op}: slice of input {k} on axis {axis} exceeds the input extent"),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn scatter_extents(op: &str, attrs: &SliceReshapeScatterAttrs) -> GenResult<Vec<usize>> {
    let dim = attrs.group.scatter_dim;
    attrs
        .group
        .members
        .iter()
        .enumerate()
        .map(|(k, member)| {
            let size = &member.slice.sizes[dim];
            size.as_static().ok_or_else(|| {
                GenError::shape_mismatch(
                    op,
                    Some(k),
                    format!("extent {size} along scatter axis {dim} must be static"),
                )
            })
        })
        .collect()
}

fn check_extent_agreement(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
    guards: &mut Vec<Stmt>,
) -> GenResult<()> {
    let members = &attrs.group.members;
    let reference = &members[0].slice.sizes;
    for (k, member) in members.iter().enumerate().skip(1) {
        for (axis, size) in member.slice.sizes.iter().enumerate() {
            if axis == attrs.group.scatter_dim || size == &reference[axis] {
                continue;
            }
            if let (Some(lhs), Some(rhs)) = (size.as_static(), reference[axis].as_static()) {
                return Err(GenError::shape_mismatch(
                    op,
                    Some(k),
                    format!("extent {lhs} on axis {axis} differs from input 0 ({rhs})"),
                ));
            }
            let cond = dim_expr(size).equals(dim_expr(&reference[axis]));
            guards.extend(Stmt::guard(
                cond,
                format!("{op}: input {k} extent on axis {axis} differs from input 0"),
            ));
        }
    }
    Ok(())
}

/// Checks that the non-empty members tile `[0, total)` of the scatter axis and
/// returns `total`.
fn check_coverage(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
    extents: &[usize],
) -> GenResult<usize> {
    let members = &attrs.group.members;
    let total = extents
        .iter()
        .try_fold(0usize, |acc, extent| acc.checked_add(*extent))
        .ok_or_else(|| GenError::shape_mismatch(op, None, "scatter axis extent overflows"))?;

    let mut order: Vec<usize> = (0..members.len()).filter(|&k| extents[k] > 0).collect();
    order.sort_by_key(|&k| (members[k].dest_offset, k));
    let mut cursor = 0usize;
    for k in order {
        let offset = members[k].dest_offset;
        let end = offset.saturating_add(extents[k]);
        if offset < cursor {
            return Err(GenError::shape_mismatch(
                op,
                Some(k),
                format!("destination range [{offset}, {end}) overlaps positions written before {cursor}"),
            ));
        }
        if offset > cursor {
            return Err(GenError::shape_mismatch(
                op,
                Some(k),
                format!("destination offset {offset} leaves positions [{cursor}, {offset}) unwritten"),
            ));
        }
        cursor = end;
    }

    for (k, member) in members.iter().enumerate() {
        if extents[k] == 0 && member.dest_offset > total {
            return Err(GenError::shape_mismatch(
                op,
                Some(k),
                format!(
                    "destination offset {} lies past the end of the scatter axis ({total})",
                    member.dest_offset
                ),
            ));
        }
    }
    Ok(total)
}

fn check_reshape(
    op: &str,
    attrs: &SliceReshapeScatterAttrs,
    total: usize,
    guards: &mut Vec<Stmt>,
) -> GenResult<()> {
    let reference = &attrs.group.members[0].slice.sizes;
    let view: Vec<Expr> = reference
        .iter()
        .enumerate()
        .map(|(axis, size)| {
            if axis == attrs.group.scatter_dim {
                Expr::from(total)
            } else {
                dim_expr(size)
            }
        })
        .collect();
    let view_count = product(&view);
    let output: Vec<Expr> = attrs.output.dims().iter().map(dim_expr).collect();
    let output_count = product(&output);
    if let (Some(out), Some(scattered)) = (output_count.as_int(), view_count.as_int()) {
        if out != scattered {
            return Err(GenError::shape_mismatch(
                op,
                None,
                format!(
                    "output {} holds {out} elements but the scattered slices hold {scattered}",
                    attrs.output.spec.shape
                ),
            ));
        }
        return Ok(());
    }
    guards.extend(Stmt::guard(
        output_count.equals(view_count),
        format!("{op}: output element count differs from the scattered slices"),
    ));
    Ok(())
}

fn member_is_empty(member: &ScatterMember) -> bool {
    member.slice.sizes.iter().any(|size| size.as_static() == Some(0))
}

/// Widest vector width every non-empty member's innermost axis is provably
/// divisible by, capped by the config and by what the target can name.
fn provable_lanes(
    ctx: GenContext<'_>,
    attrs: &SliceReshapeScatterAttrs,
    dtype: DType,
    total: usize,
) -> usize {
    let members = &attrs.group.members;
    let last = members[0].slice.sizes.len() - 1;
    let scatter_dim = attrs.group.scatter_dim;
    let mut lanes = ctx.config.max_vector_width;
    while lanes > 1 {
        let divisible = |dim: &Dimension| dim.as_static().is_some_and(|value| value % lanes == 0);
        let view_last = if scatter_dim == last {
            Dimension::Static(total)
        } else {
            members[0].slice.sizes[last].clone()
        };
        let aligned = divisible(&view_last)
            && members
                .iter()
                .filter(|member| !member_is_empty(member))
                .all(|member| {
                    divisible(&member.slice.sizes[last])
                        && member.slice.starts[last] % lanes == 0
                        && divisible(&member.input.dims()[last])
                        && (scatter_dim != last || member.dest_offset % lanes == 0)
                });
        if aligned
            && lanes
                .checked_mul(dtype.size_in_bytes())
                .is_some_and(|bytes| bytes <= MAX_VECTOR_BYTES)
            && ctx.target.vector_type(dtype, lanes).is_some()
        {
            return lanes;
        }
        lanes /= 2;
    }
    1
}
