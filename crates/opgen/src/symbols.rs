use std::collections::BTreeSet;

use crate::spec::DimSymbol;

/// Turns an arbitrary name into a valid C identifier.
pub fn sanitize_symbol(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (idx, ch) in value.chars().enumerate() {
        let is_valid = ch.is_ascii_alphanumeric() || ch == '_';
        if idx == 0 && ch.is_ascii_digit() {
            out.push('_');
        }
        out.push(if is_valid { ch } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// C identifier a dynamic dimension is referenced by in generated code.
pub fn symbol_ident(sym: &DimSymbol) -> String {
    sanitize_symbol(sym.as_str())
}

/// Names already bound in the generated program at the point a call site is
/// emitted. Dynamic dimensions may only be referenced through names in here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolScope {
    names: BTreeSet<String>,
}

impl SymbolScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn contains_symbol(&self, sym: &DimSymbol) -> bool {
        self.contains(&symbol_ident(sym))
    }

    /// Returns `base`, or `base_<n>` for the first `n` that is not yet bound.
    pub fn fresh(&self, base: &str) -> String {
        let base = sanitize_symbol(base);
        if !self.contains(&base) {
            return base;
        }
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !self.contains(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_symbol("batch-size"), "batch_size");
        assert_eq!(sanitize_symbol("0dim"), "_0dim");
        assert_eq!(sanitize_symbol(""), "_");
    }

    #[test]
    fn fresh_skips_bound_names() {
        let scope = SymbolScope::with_symbols(["y_dim_0", "y_dim_0_1"]);
        assert_eq!(scope.fresh("y_dim_0"), "y_dim_0_2");
        assert_eq!(scope.fresh("y_dim_1"), "y_dim_1");
    }
}
