//! Single-operator GPU code generation.
//!
//! Operation attributes go in, source text comes out: a host launcher
//! declaration, the kernel plus launcher definitions, and the call site the
//! surrounding generated program uses. Generators build a typed IR
//! ([`ir`]) that is validated and rendered by one printer, and record
//! file-level includes and helpers in a [`CompilationUnit`].
//!
//! Platform details live behind [`TargetPlatform`]; operation kinds are
//! dispatched through an explicit [`GeneratorRegistry`].

pub mod config;
pub mod error;
pub mod fusion;
pub mod ir;
pub mod ops;
pub mod registry;
pub mod shape;
pub mod spec;
pub mod symbols;
pub mod target;
pub mod unit;

pub use config::{GeneratorConfig, VectorFallback};
pub use error::{GenError, GenResult};
pub use fusion::{FusionImpl, FusionSpec};
pub use ops::{OpAttrs, ScatterGroup, ScatterMember, SliceReshapeScatterAttrs, SliceSpec};
pub use registry::{GenContext, GeneratedArtifact, GeneratorRegistry, OpGenerator};
pub use shape::{resolve_output_shape, ResolvedShape, ShapeBinding};
pub use spec::{DType, DimSymbol, Dimension, Shape, TensorDesc, TensorSpec};
pub use symbols::{sanitize_symbol, SymbolScope};
pub use target::{Dialect, LaunchSyntax, TargetPlatform};
pub use unit::{CompilationUnit, Prelude, PreludeRequest};
