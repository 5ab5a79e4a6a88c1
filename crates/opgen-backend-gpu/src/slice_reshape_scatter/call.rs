use opgen::ir::printer::Printer;
use opgen::ir::{Expr, Stmt, Ty};
use opgen::{
    resolve_output_shape, sanitize_symbol, GenError, GenResult, SliceReshapeScatterAttrs,
    SymbolScope, TargetPlatform,
};

use super::plan::ScatterPlan;
use super::signature::{KernelSignature, ParamRole};

/// External declaration: the launcher prototype.
pub(crate) fn declaration(printer: &Printer, plan: &ScatterPlan, sig: &KernelSignature) -> String {
    let launcher = super::kernel::launcher_function(plan, sig);
    printer.prototype(&launcher)
}

/// Braced call-site block: static output extents bound to locals, the
/// `int64_t*` shape array, then the launcher call in signature order.
pub(crate) fn call_site(
    printer: &Printer,
    target: &dyn TargetPlatform,
    attrs: &SliceReshapeScatterAttrs,
    plan: &ScatterPlan,
    sig: &KernelSignature,
    scope: &SymbolScope,
    indent: &str,
) -> GenResult<String> {
    for (ident, sym) in &plan.symbols {
        if !scope.contains(ident) {
            return Err(GenError::unresolved(&plan.op, sym.as_str()));
        }
    }
    let output = &attrs.output.name;
    let mut local = scope.clone();
    local.bind(sig.launcher.clone());
    let resolved = resolve_output_shape(&plan.op, output, attrs.output.dims(), &local)?;

    for binding in &resolved.bindings {
        local.bind(binding.name.clone());
    }
    let shape_array = local.fresh(&format!("{}_shape", sanitize_symbol(output)));

    let args = sig
        .roles()
        .map(|role| match role {
            ParamRole::Output => Expr::var(output.clone()),
            ParamRole::OutputShape => Expr::var(shape_array.clone()),
            ParamRole::Input(k) => Expr::var(attrs.group.members[*k].input.name.clone()),
            ParamRole::Symbol(ident) => Expr::var(ident.clone()),
            ParamRole::Stream => Expr::var(target.stream_var()),
        })
        .collect();

    let mut block = resolved.binding_stmts();
    block.push(Stmt::Decl {
        ty: Ty::array(Ty::ptr(Ty::I64)),
        name: shape_array,
        init: Some(resolved.pointer_array()),
        is_const: false,
    });
    block.push(Stmt::Expr(Expr::call(sig.launcher.clone(), args)));
    Ok(printer.stmts(&[Stmt::Block(block)], indent))
}
