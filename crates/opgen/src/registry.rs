use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;
use crate::error::{GenError, GenResult};
use crate::ops::OpAttrs;
use crate::symbols::SymbolScope;
use crate::target::TargetPlatform;
use crate::unit::CompilationUnit;

/// Declaration, body and call site of one operator, rendered from one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub decl: String,
    pub body: String,
    pub call: String,
}

/// Platform and tunables a generation request runs against.
#[derive(Clone, Copy)]
pub struct GenContext<'a> {
    pub target: &'a dyn TargetPlatform,
    pub config: &'a GeneratorConfig,
}

impl<'a> GenContext<'a> {
    pub fn new(target: &'a dyn TargetPlatform, config: &'a GeneratorConfig) -> Self {
        Self { target, config }
    }
}

/// Source generator for one operation kind.
///
/// All hooks are pure functions of their inputs; the only state they touch is
/// the caller-owned [`CompilationUnit`].
pub trait OpGenerator: Send + Sync {
    /// Operation kind this generator handles (see [`OpAttrs::op_kind`]).
    fn op_kind(&self) -> &'static str;

    /// External declaration of the generated host function.
    fn gen_function_decl(&self, ctx: GenContext<'_>, attrs: &OpAttrs) -> GenResult<String>;

    /// Kernel and host function source. File-level requirements go to `unit`.
    fn gen_function(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        element_func: Option<&str>,
        unit: &mut CompilationUnit,
    ) -> GenResult<String>;

    /// Invocation of the host function, with names in `scope` already bound.
    fn gen_function_call(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        scope: &SymbolScope,
        indent: &str,
    ) -> GenResult<String>;

    /// All three hooks from a single validated plan.
    fn generate(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        element_func: Option<&str>,
        scope: &SymbolScope,
        unit: &mut CompilationUnit,
    ) -> GenResult<GeneratedArtifact>;
}

/// Dispatch table from `(target, op_kind)` to a generator.
///
/// Built explicitly by the embedding compiler; nothing registers itself.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<(String, String), Arc<dyn OpGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `generator` for `target`, replacing any previous entry.
    pub fn register(&mut self, target: impl Into<String>, generator: Arc<dyn OpGenerator>) {
        let key = (target.into(), generator.op_kind().to_string());
        tracing::debug!(platform = %key.0, op_kind = %key.1, "registering generator");
        self.generators.insert(key, generator);
    }

    pub fn get(&self, target: &str, op_kind: &str) -> GenResult<Arc<dyn OpGenerator>> {
        self.generators
            .get(&(target.to_string(), op_kind.to_string()))
            .cloned()
            .ok_or_else(|| GenError::UnknownGenerator {
                target: target.to_string(),
                op_kind: op_kind.to_string(),
            })
    }

    /// Generator for `attrs` on the context's target.
    pub fn lookup(&self, ctx: GenContext<'_>, attrs: &OpAttrs) -> GenResult<Arc<dyn OpGenerator>> {
        self.get(ctx.target.name(), attrs.op_kind())
    }

    /// Registered `(target, op_kind)` pairs, sorted.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.generators.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn generate(
        &self,
        ctx: GenContext<'_>,
        attrs: &OpAttrs,
        element_func: Option<&str>,
        scope: &SymbolScope,
        unit: &mut CompilationUnit,
    ) -> GenResult<GeneratedArtifact> {
        self.lookup(ctx, attrs)?
            .generate(ctx, attrs, element_func, scope, unit)
    }
}
