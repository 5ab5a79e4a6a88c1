//! Slice several tensors, stack the slices along one axis and scatter the
//! result into an output buffer of a possibly different (reshaped) shape.

mod call;
mod kernel;
mod plan;
mod signature;

use opgen::ir::printer::Printer;
use opgen::ir::Function;
use opgen::{
    CompilationUnit, GenContext, GenResult, GeneratedArtifact, OpAttrs, OpGenerator,
    PreludeRequest, SliceReshapeScatterAttrs, SymbolScope,
};

use plan::ScatterPlan;
use signature::KernelSignature;

/// Kernel and launcher IR for one operator, before printing.
#[derive(Debug, Clone)]
pub struct LoweredScatter {
    pub kernel: Function,
    pub launcher: Function,
    /// Elements moved per load/store.
    pub lanes: usize,
    /// File-level text the functions depend on.
    pub prelude: PreludeRequest,
}

struct Lowering {
    plan: ScatterPlan,
    sig: KernelSignature,
}

impl Lowering {
    fn new(
        ctx: GenContext<'_>,
        attrs: &SliceReshapeScatterAttrs,
        element_func: Option<&str>,
    ) -> GenResult<Self> {
        let plan = ScatterPlan::build(ctx, attrs, element_func)?;
        let sig = KernelSignature::new(&plan, ctx.target);
        tracing::debug!(
            op = %plan.op,
            platform = ctx.target.name(),
            dtype = %plan.dtype,
            members = plan.members.len(),
            lanes = plan.lanes,
            guards = plan.guards.len(),
            "planned slice_reshape_scatter"
        );
        Ok(Self { plan, sig })
    }

    fn body(&self, printer: &Printer) -> String {
        let kernel = kernel::kernel_function(&self.plan, &self.sig);
        let launcher = kernel::launcher_function(&self.plan, &self.sig);
        format!("{}\n{}", printer.function(&kernel), printer.function(&launcher))
    }
}

fn scatter_attrs(attrs: &OpAttrs) -> &SliceReshapeScatterAttrs {
    let OpAttrs::SliceReshapeScatter(attrs) = attrs;
    attrs
}

/// Builds the kernel and launcher IR without printing them.
pub fn lower(
    ctx: GenContext<'_>,
    attrs: &SliceReshapeScatterAttrs,
    element_func: Option<&str>,
) -> GenResult<LoweredScatter> {
    let lowering = Lowering::new(ctx, attrs, element_func)?;
    Ok(LoweredScatter {
        kernel: kernel::kernel_function(&lowering.plan, &lowering.sig),
        launcher: kernel::launcher_function(&lowering.plan, &lowering.sig),
        lanes: lowering.plan.lanes,
        prelude: lowering.plan.prelude.clone(),
    })
}

/// Declaration, body and call site from one validated plan.
///
/// Includes and helper definitions are committed to `unit` only when all three
/// render successfully.
pub fn generate_artifact(
    ctx: GenContext<'_>,
    attrs: &SliceReshapeScatterAttrs,
    element_func: Option<&str>,
    scope: &SymbolScope,
    indent: &str,
    unit: &mut CompilationUnit,
) -> GenResult<GeneratedArtifact> {
    let lowering = Lowering::new(ctx, attrs, element_func)?;
    let printer = Printer::new(ctx.target.dialect());
    let call = call::call_site(
        &printer,
        ctx.target,
        attrs,
        &lowering.plan,
        &lowering.sig,
        scope,
        indent,
    )?;
    let artifact = GeneratedArtifact {
        decl: call::declaration(&printer, &lowering.plan, &lowering.sig),
        body: lowering.body(&printer),
        call,
    };
    unit.commit(lowering.plan.prelude);
    Ok(artifact)
}

/// [`OpGenerator`] for [`OpAttrs::SliceReshapeScatter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceReshapeScatterGenerator;

impl SliceReshapeScatterGenerator {
    pub const CALL_INDENT: &'static str = "  ";

    pub fn new() -> Self {
        Self
    }
}

impl OpGenerator for SliceReshapeScatterGenerator {
    fn op_kind(&self) -> &'static str {
        OpAttrs::SLICE_RESHAPE_SCATTER
    }

    fn gen_function_decl(&self, ctx: GenContext<'_>, attrs: &OpAttrs) -> GenResult<String> {
        let lowering = Lowering::new(ctx, scatter_attrs(attrs), None)?;
        let printer = Printer::new(ctx.target.dialect());
        Ok(call::declaration(&printer, &lowering.plan, &lowering.sig))
    }

    fn gen_function(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        element_func: Option<&str>,
        unit: &mut CompilationUnit,
    ) -> GenResult<String> {
        let lowering = Lowering::new(ctx, scatter_attrs(attrs), element_func)?;
        let body = lowering.body(&Printer::new(ctx.target.dialect()));
        unit.commit(lowering.plan.prelude);
        Ok(body)
    }

    fn gen_function_call(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        scope: &SymbolScope,
        indent: &str,
    ) -> GenResult<String> {
        let attrs = scatter_attrs(attrs);
        let lowering = Lowering::new(ctx, attrs, None)?;
        call::call_site(
            &Printer::new(ctx.target.dialect()),
            ctx.target,
            attrs,
            &lowering.plan,
            &lowering.sig,
            scope,
            indent,
        )
    }

    fn generate(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        element_func: Option<&str>,
        scope: &SymbolScope,
        unit: &mut CompilationUnit,
    ) -> GenResult<GeneratedArtifact> {
        generate_artifact(
            ctx,
            scatter_attrs(attrs),
            element_func,
            scope,
            Self::CALL_INDENT,
            unit,
        )
    }
}
