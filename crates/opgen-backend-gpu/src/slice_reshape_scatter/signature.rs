use opgen::ir::{Expr, Param, Ty};
use opgen::sanitize_symbol;
use opgen::TargetPlatform;

use super::plan::{input_param, ScatterPlan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParamRole {
    Output,
    OutputShape,
    Input(usize),
    Symbol(String),
    Stream,
}

/// Parameter list shared by the kernel, the launcher definition, its
/// declaration and the call site. Each is derived from this one description.
#[derive(Debug, Clone)]
pub(crate) struct KernelSignature {
    pub(crate) launcher: String,
    pub(crate) kernel: String,
    params: Vec<(ParamRole, Param)>,
}

impl KernelSignature {
    pub(crate) const OUTPUT: &'static str = "output";
    pub(crate) const OUTPUT_SHAPE: &'static str = "output_shape";
    pub(crate) const STREAM: &'static str = "stream";

    pub(crate) fn new(plan: &ScatterPlan, target: &dyn TargetPlatform) -> Self {
        let launcher = sanitize_symbol(&plan.op);
        let elem = Ty::named(plan.elem_type);
        let mut params = vec![
            (
                ParamRole::Output,
                Param::new(Ty::ptr(elem.clone()), Self::OUTPUT),
            ),
            (
                ParamRole::OutputShape,
                Param::new(Ty::array(Ty::ptr(Ty::I64)), Self::OUTPUT_SHAPE),
            ),
        ];
        for member in &plan.members {
            params.push((
                ParamRole::Input(member.index),
                Param::new(Ty::const_ptr(elem.clone()), input_param(member.index)),
            ));
        }
        for (ident, _) in &plan.symbols {
            params.push((ParamRole::Symbol(ident.clone()), Param::new(Ty::I64, ident.clone())));
        }
        params.push((
            ParamRole::Stream,
            Param::new(Ty::named(target.stream_type()), Self::STREAM),
        ));
        Self {
            kernel: format!("{launcher}_kernel"),
            launcher,
            params,
        }
    }

    pub(crate) fn roles(&self) -> impl Iterator<Item = &ParamRole> {
        self.params.iter().map(|(role, _)| role)
    }

    pub(crate) fn launcher_params(&self) -> Vec<Param> {
        self.params.iter().map(|(_, param)| param.clone()).collect()
    }

    fn on_device(role: &ParamRole) -> bool {
        !matches!(role, ParamRole::OutputShape | ParamRole::Stream)
    }

    /// Launcher parameters the kernel receives; pointers become non-aliasing.
    pub(crate) fn kernel_params(&self) -> Vec<Param> {
        self.params
            .iter()
            .filter(|(role, _)| Self::on_device(role))
            .map(|(_, param)| Param::new(param.ty.clone().restricted(), param.name.clone()))
            .collect()
    }

    /// Launcher variables forwarded to the kernel, in kernel parameter order.
    pub(crate) fn kernel_args(&self) -> Vec<Expr> {
        self.params
            .iter()
            .filter(|(role, _)| Self::on_device(role))
            .map(|(_, param)| Expr::var(param.name.clone()))
            .collect()
    }
}
