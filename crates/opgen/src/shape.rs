//! Shape expressions for generated code.

use serde::{Deserialize, Serialize};

use crate::error::{GenError, GenResult};
use crate::ir::{Expr, Stmt, Ty};
use crate::spec::Dimension;
use crate::symbols::{symbol_ident, SymbolScope};

/// Source-level value of a dimension: a literal or the symbol's identifier.
pub fn dim_expr(dim: &Dimension) -> Expr {
    match dim {
        Dimension::Static(value) => Expr::from(*value),
        Dimension::Dynamic(sym) => Expr::var(symbol_ident(sym)),
    }
}

pub fn product(dims: &[Expr]) -> Expr {
    dims.iter()
        .fold(Expr::int(1), |acc, dim| acc * dim.clone())
}

/// Row-major strides: `strides[a] = prod(dims[a+1..])`.
pub fn row_major_strides(dims: &[Expr]) -> Vec<Expr> {
    let mut strides = vec![Expr::int(1); dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1].clone() * dims[axis + 1].clone();
    }
    strides
}

/// A static extent bound to a fresh local at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeBinding {
    pub name: String,
    pub value: usize,
}

/// Result of resolving an output shape for a call site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolvedShape {
    /// One binding per static dimension, in dimension order.
    pub bindings: Vec<ShapeBinding>,
    /// One name per dimension, in dimension order.
    pub refs: Vec<String>,
}

impl ResolvedShape {
    /// `int64_t <name> = <value>;` for each binding.
    pub fn binding_stmts(&self) -> Vec<Stmt> {
        self.bindings
            .iter()
            .map(|binding| Stmt::Decl {
                ty: Ty::I64,
                name: binding.name.clone(),
                init: Some(Expr::from(binding.value)),
                is_const: false,
            })
            .collect()
    }

    /// `{&ref0, &ref1, ...}`, the initializer of the output shape array.
    pub fn pointer_array(&self) -> Expr {
        Expr::InitList(
            self.refs
                .iter()
                .map(|name| Expr::addr_of(Expr::var(name.clone())))
                .collect(),
        )
    }
}

/// Resolves `dims` for the call site of operator `op` writing `output_name`.
///
/// Static dimensions get a fresh local named after the output; dynamic ones are
/// referenced through their symbol, which must already be bound in `scope`.
pub fn resolve_output_shape(
    op: &str,
    output_name: &str,
    dims: &[Dimension],
    scope: &SymbolScope,
) -> GenResult<ResolvedShape> {
    let mut local = scope.clone();
    let mut resolved = ResolvedShape::default();
    for (axis, dim) in dims.iter().enumerate() {
        match dim {
            Dimension::Static(value) => {
                let name = local.fresh(&format!("{output_name}_dim_{axis}"));
                local.bind(name.clone());
                resolved.bindings.push(ShapeBinding {
                    name: name.clone(),
                    value: *value,
                });
                resolved.refs.push(name);
            }
            Dimension::Dynamic(sym) => {
                if !scope.contains_symbol(sym) {
                    return Err(GenError::unresolved(op, sym.as_str()));
                }
                resolved.refs.push(symbol_ident(sym));
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_fold_for_static_dims() {
        let dims = [Expr::int(4), Expr::int(3), Expr::int(5)];
        assert_eq!(
            row_major_strides(&dims),
            vec![Expr::int(15), Expr::int(5), Expr::int(1)]
        );
        assert_eq!(product(&dims), Expr::int(60));
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn strides_keep_symbols() {
        let dims = [Expr::var("batch"), Expr::var("seq"), Expr::int(8)];
        let strides = row_major_strides(&dims);
        assert_eq!(strides[1], Expr::int(8));
        assert_eq!(strides[0], Expr::int(8) * Expr::var("seq"));
    }

    #[test]
    fn static_dims_bind_and_dynamic_dims_reference() {
        let scope = SymbolScope::with_symbols(["batch"]);
        let dims = vec![Dimension::symbol("batch"), Dimension::Static(8)];
        let resolved = resolve_output_shape("op", "y", &dims, &scope).expect("resolves");
        assert_eq!(
            resolved.bindings,
            vec![ShapeBinding {
                name: "y_dim_1".to_string(),
                value: 8
            }]
        );
        assert_eq!(resolved.refs, vec!["batch".to_string(), "y_dim_1".to_string()]);
    }

    #[test]
    fn fresh_names_avoid_scope() {
        let scope = SymbolScope::with_symbols(["y_dim_0"]);
        let resolved =
            resolve_output_shape("op", "y", &[Dimension::Static(2)], &scope).expect("resolves");
        assert_eq!(resolved.refs, vec!["y_dim_0_1".to_string()]);
    }

    #[test]
    fn unbound_symbol_is_unresolved() {
        let err = resolve_output_shape("srs", "y", &[Dimension::symbol("seq")], &SymbolScope::new())
            .expect_err("seq is not bound");
        assert_eq!(
            err,
            GenError::UnresolvedDimension {
                op: "srs".to_string(),
                symbol: "seq".to_string()
            }
        );
    }
}
