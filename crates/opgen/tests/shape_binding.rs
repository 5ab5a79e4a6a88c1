//! Call-site shape resolution over random mixes of static and dynamic dims.

use std::collections::BTreeSet;

use opgen::{resolve_output_shape, Dimension, GenError, SymbolScope};
use proptest::prelude::*;

fn dims_strategy() -> impl Strategy<Value = Vec<Dimension>> {
    prop::collection::vec(
        prop_oneof![
            (0usize..64).prop_map(Dimension::Static),
            prop::sample::select(vec!["batch", "seq", "heads"]).prop_map(Dimension::symbol),
        ],
        0..6,
    )
}

proptest! {
    #[test]
    fn static_dims_get_fresh_locals_and_dynamic_dims_pass_through(
        dims in dims_strategy(),
        taken in prop::collection::vec(0usize..6, 0..4),
    ) {
        let mut scope = SymbolScope::with_symbols(["batch", "seq", "heads"]);
        for axis in &taken {
            scope.bind(format!("out_dim_{axis}"));
        }
        let resolved = resolve_output_shape("op", "out", &dims, &scope)
            .expect("every symbol is bound");

        prop_assert_eq!(resolved.refs.len(), dims.len());
        let statics: Vec<usize> = dims.iter().filter_map(Dimension::as_static).collect();
        let values: Vec<usize> = resolved.bindings.iter().map(|b| b.value).collect();
        prop_assert_eq!(values, statics);

        let mut bindings = resolved.bindings.iter();
        for (dim, name) in dims.iter().zip(&resolved.refs) {
            match dim {
                Dimension::Static(_) => {
                    let binding = bindings.next().expect("one binding per static dim");
                    prop_assert_eq!(&binding.name, name);
                    prop_assert!(!scope.contains(name));
                }
                Dimension::Dynamic(sym) => prop_assert_eq!(name.as_str(), sym.as_str()),
            }
        }

        let unique: BTreeSet<&str> = resolved.bindings.iter().map(|b| b.name.as_str()).collect();
        prop_assert_eq!(unique.len(), resolved.bindings.len());
    }

    #[test]
    fn unbound_symbols_are_reported(
        prefix in prop::collection::vec((0usize..8).prop_map(Dimension::Static), 0..3),
    ) {
        let mut dims = prefix;
        dims.push(Dimension::symbol("tokens"));
        let err = resolve_output_shape("op", "out", &dims, &SymbolScope::new())
            .expect_err("tokens is unbound");
        prop_assert_eq!(
            err,
            GenError::UnresolvedDimension {
                op: "op".to_string(),
                symbol: "tokens".to_string(),
            }
        );
    }
}

#[test]
fn renders_bindings_before_the_pointer_array() {
    use opgen::ir::printer::Printer;
    use opgen::ir::{Stmt, Ty};
    use opgen::{Dialect, LaunchSyntax};

    let dims = [Dimension::Static(4), Dimension::symbol("seq"), Dimension::Static(8)];
    let scope = SymbolScope::with_symbols(["seq", "logits_dim_0"]);
    let resolved = resolve_output_shape("op", "logits", &dims, &scope).expect("resolved");
    let mut block = resolved.binding_stmts();
    block.push(Stmt::Decl {
        ty: Ty::array(Ty::ptr(Ty::I64)),
        name: "logits_shape".to_string(),
        init: Some(resolved.pointer_array()),
        is_const: false,
    });
    let printer = Printer::new(Dialect {
        kernel_qualifier: "__global__",
        restrict: "__restrict__",
        launch: LaunchSyntax::TripleChevron,
    });
    assert_eq!(
        printer.stmts(&block, ""),
        "int64_t logits_dim_0_1 = 4;\n\
         int64_t logits_dim_2 = 8;\n\
         int64_t* logits_shape[] = {&logits_dim_0_1, &seq, &logits_dim_2};\n"
    );
}
