use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Helper definitions that must appear once, ahead of any kernel using them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prelude {
    /// De-duplication key; two preludes with the same id are the same text.
    pub id: String,
    pub text: String,
}

impl Prelude {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// File-level text a generator needs, collected while planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreludeRequest {
    pub includes: Vec<String>,
    pub preludes: Vec<Prelude>,
}

impl PreludeRequest {
    pub fn include(&mut self, header: impl Into<String>) {
        let header = header.into();
        if !self.includes.contains(&header) {
            self.includes.push(header);
        }
    }

    pub fn prelude(&mut self, prelude: Prelude) {
        if !self.preludes.iter().any(|existing| existing.id == prelude.id) {
            self.preludes.push(prelude);
        }
    }

    pub fn merge(&mut self, other: PreludeRequest) {
        for header in other.includes {
            self.include(header);
        }
        for prelude in other.preludes {
            self.prelude(prelude);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.preludes.is_empty()
    }
}

/// One generated source file.
///
/// Generators record includes and helper definitions here instead of emitting
/// them inline, so a file that holds several kernels gets each exactly once.
/// Requests are committed only after a generator succeeds.
#[derive(Debug, Clone, Default)]
pub struct CompilationUnit {
    includes: Vec<String>,
    preludes: Vec<Prelude>,
    seen_preludes: HashSet<String>,
    sources: Vec<String>,
}

impl CompilationUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `request`; returns the part that was not already present.
    pub fn commit(&mut self, request: PreludeRequest) -> PreludeRequest {
        let mut added = PreludeRequest::default();
        for header in request.includes {
            if self.includes.contains(&header) {
                continue;
            }
            self.includes.push(header.clone());
            added.includes.push(header);
        }
        for prelude in request.preludes {
            if !self.seen_preludes.insert(prelude.id.clone()) {
                tracing::trace!(id = %prelude.id, "prelude already present in unit");
                continue;
            }
            self.preludes.push(prelude.clone());
            added.preludes.push(prelude);
        }
        added
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn preludes(&self) -> &[Prelude] {
        &self.preludes
    }

    pub fn push_source(&mut self, source: impl Into<String>) {
        self.sources.push(source.into());
    }

    /// Includes, then preludes, then function sources in insertion order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for header in &self.includes {
            out.push_str(&format!("#include <{header}>\n"));
        }
        for prelude in &self.preludes {
            out.push('\n');
            out.push_str(prelude.text.trim_end());
            out.push('\n');
        }
        for source in &self.sources {
            out.push('\n');
            out.push_str(source);
        }
        out
    }
}
