use opgen::{
    CompilationUnit, DType, Dimension, GenContext, GenError, GeneratorConfig, OpAttrs,
    ScatterGroup, ScatterMember, SliceReshapeScatterAttrs, SliceSpec, SymbolScope, TensorDesc,
};
use opgen_backend_gpu::{default_registry, CudaTarget, RocmTarget, CUDA_TARGET, ROCM_TARGET};

fn static_desc(name: &str, dtype: DType, dims: &[usize]) -> TensorDesc {
    TensorDesc::with_shape(name, dtype, dims.iter().copied().map(Dimension::Static).collect())
}

fn two_way_concat() -> OpAttrs {
    OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_0".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![
                ScatterMember::whole(static_desc("x0", DType::F32, &[4, 3]), 0),
                ScatterMember::whole(static_desc("x1", DType::F32, &[4, 5]), 3),
            ],
        },
        output: static_desc("y", DType::F32, &[4, 8]),
    })
}

#[test]
fn cuda_kernel_uses_output_strides_and_displacement() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let registry = default_registry();
    let generator = registry
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let mut unit = CompilationUnit::new();
    let body = generator
        .gen_function(ctx, &two_way_concat(), None, &mut unit)
        .expect("generation succeeds");

    assert!(body.contains(
        "__global__ void srs_0_kernel(float* __restrict__ output, const float* __restrict__ input_0, const float* __restrict__ input_1)"
    ));
    assert!(body.contains(
        "const int64_t chunk = (int64_t)blockIdx.x * (int64_t)blockDim.x + (int64_t)threadIdx.x;"
    ));
    assert!(body.contains("if (chunk < 2) {"));
    assert!(body.contains("if (chunk < 5) {"));
    assert!(body.contains("const int64_t base = (chunk - 2) * 8;"));
    assert!(body.contains("#pragma unroll"));
    assert!(body.contains("if (idx >= 12) {"));
    assert!(body.contains("const int64_t i0 = idx / 3;"));
    assert!(body.contains("const int64_t i1 = idx % 3;"));
    assert!(body.contains("output[i0 * 8 + i1] = input_0[i0 * 3 + i1];"));
    assert!(body.contains("output[i0 * 8 + i1 + 3] = input_1[i0 * 5 + i1];"));
    assert!(body.contains("*output_shape[0] = 4;"));
    assert!(body.contains("*output_shape[1] = 8;"));
    assert!(body.contains(
        "srs_0_kernel<<<dim3(1), dim3(256), 0, stream>>>(output, input_0, input_1);"
    ));
    assert!(!body.contains("fast_tanh"));
    assert_eq!(unit.includes(), &["cuda_fp16.h", "cuda_bf16.h", "cstdint", "stdexcept"]);
    assert!(unit.preludes().is_empty());
}

#[test]
fn declaration_and_call_follow_one_signature() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let attrs = two_way_concat();

    let decl = generator
        .gen_function_decl(ctx, &attrs)
        .expect("declaration");
    assert_eq!(
        decl,
        "void srs_0(float* output, int64_t* output_shape[], const float* input_0, const float* input_1, cudaStream_t stream);\n"
    );

    let call = generator
        .gen_function_call(ctx, &attrs, &SymbolScope::new(), "  ")
        .expect("call site");
    let expected = [
        "  {",
        "    int64_t y_dim_0 = 4;",
        "    int64_t y_dim_1 = 8;",
        "    int64_t* y_shape[] = {&y_dim_0, &y_dim_1};",
        "    srs_0(y, y_shape, x0, x1, stream);",
        "  }",
    ]
    .join("\n");
    assert_eq!(call.trim_end(), expected);
}

#[test]
fn generate_matches_individual_hooks() {
    let target = CudaTarget::new(75);
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let registry = default_registry();
    let attrs = two_way_concat();
    let scope = SymbolScope::new();

    let mut unit = CompilationUnit::new();
    let artifact = registry
        .generate(ctx, &attrs, None, &scope, &mut unit)
        .expect("artifact");
    let generator = registry.lookup(ctx, &attrs).expect("generator");
    let mut other_unit = CompilationUnit::new();
    assert_eq!(
        artifact.body,
        generator
            .gen_function(ctx, &attrs, None, &mut other_unit)
            .expect("body")
    );
    assert_eq!(
        artifact.decl,
        generator.gen_function_decl(ctx, &attrs).expect("decl")
    );
    assert_eq!(
        artifact.call,
        generator
            .gen_function_call(ctx, &attrs, &scope, "  ")
            .expect("call")
    );
    assert_eq!(unit.includes(), other_unit.includes());

    let json = serde_json::to_string(&artifact).expect("serialize artifact");
    assert!(json.contains("\"decl\""));
}

#[test]
fn rocm_uses_hip_launch_and_stream() {
    let target = RocmTarget::new();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(ROCM_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let mut unit = CompilationUnit::new();
    let body = generator
        .gen_function(ctx, &two_way_concat(), None, &mut unit)
        .expect("generation succeeds");
    assert!(body.contains(
        "hipLaunchKernelGGL(srs_0_kernel, dim3(1), dim3(256), 0, stream, output, input_0, input_1);"
    ));
    assert!(body.contains("hipStream_t stream"));
    assert!(unit.includes().iter().any(|header| header == "hip/hip_runtime.h"));
}

#[test]
fn aligned_half_slices_use_vector_access() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let attrs = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_vec".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![
                ScatterMember::whole(static_desc("a", DType::F16, &[2, 8]), 0),
                ScatterMember::new(
                    static_desc("b", DType::F16, &[2, 24]),
                    SliceSpec::from_bounds(&[0, 8], &[2, 16]).expect("bounds"),
                    8,
                ),
            ],
        },
        output: static_desc("y", DType::F16, &[2, 16]),
    });
    let mut unit = CompilationUnit::new();
    let body = default_registry()
        .lookup(ctx, &attrs)
        .expect("generator")
        .gen_function(ctx, &attrs, None, &mut unit)
        .expect("generation succeeds");
    assert!(body.contains(
        "reinterpret_cast<float4*>(output)[i0 * 2 + i1 + 1] = reinterpret_cast<const float4*>(input_1)[i0 * 3 + (1 + i1)];"
    ));
    assert!(body.contains("const int64_t i1 = 0;"));
    assert!(body.contains("half* __restrict__ output"));
}

#[test]
fn dynamic_dims_become_parameters_and_guards() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let attrs = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_dyn".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![
                ScatterMember::whole(
                    TensorDesc::with_shape(
                        "x0",
                        DType::F32,
                        vec![Dimension::symbol("batch"), Dimension::Static(3)],
                    ),
                    0,
                ),
                ScatterMember::whole(
                    TensorDesc::with_shape(
                        "x1",
                        DType::F32,
                        vec![Dimension::symbol("rows"), Dimension::Static(5)],
                    ),
                    3,
                ),
            ],
        },
        output: TensorDesc::with_shape(
            "y",
            DType::F32,
            vec![Dimension::symbol("batch"), Dimension::Static(8)],
        ),
    });
    let generator = default_registry().lookup(ctx, &attrs).expect("generator");
    let mut unit = CompilationUnit::new();
    let body = generator
        .gen_function(ctx, &attrs, None, &mut unit)
        .expect("generation succeeds");
    assert!(body.contains("int64_t batch, int64_t rows, cudaStream_t stream)"));
    assert!(body.contains("if (!(rows == batch)) {"));
    assert!(body.contains(
        r#"throw std::runtime_error("srs_dyn: input 1 extent on axis 0 differs from input 0");"#
    ));
    assert!(body.contains("*output_shape[0] = batch;"));
    assert!(body.contains("if (total_chunks == 0) {"));
    assert!(body.contains("(total_chunks + 255) / 256"));

    let err = generator
        .gen_function_call(ctx, &attrs, &SymbolScope::with_symbols(["batch"]), "")
        .expect_err("rows is not bound at the call site");
    assert_eq!(
        err,
        GenError::UnresolvedDimension {
            op: "srs_dyn".to_string(),
            symbol: "rows".to_string(),
        }
    );

    let call = generator
        .gen_function_call(ctx, &attrs, &SymbolScope::with_symbols(["batch", "rows"]), "")
        .expect("call site");
    assert!(call.contains("int64_t* y_shape[] = {&batch, &y_dim_1};"));
    assert!(call.contains("srs_dyn(y, y_shape, x0, x1, batch, rows, stream);"));
}

#[test]
fn deferred_checks_become_launcher_guards() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let mut unit = CompilationUnit::new();

    let window = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_window".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![ScatterMember::new(
                TensorDesc::with_shape(
                    "x0",
                    DType::F32,
                    vec![Dimension::symbol("n"), Dimension::Static(3)],
                ),
                SliceSpec::new(vec![1, 0], vec![Dimension::symbol("m"), Dimension::Static(3)]),
                0,
            )],
        },
        output: TensorDesc::with_shape(
            "y",
            DType::F32,
            vec![Dimension::symbol("m"), Dimension::Static(3)],
        ),
    });
    let body = generator
        .gen_function(ctx, &window, None, &mut unit)
        .expect("bounds are checked at launch");
    assert!(body.contains("int64_t m, int64_t n, cudaStream_t stream)"));
    assert!(body.contains("if (!(1 + m <= n)) {"));
    assert!(body.contains(
        r#"throw std::runtime_error("srs_window: slice of input 0 on axis 0 exceeds the input extent");"#
    ));
    assert!(!body.contains("element count"));

    let flatten = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_flat".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![ScatterMember::whole(
                TensorDesc::with_shape(
                    "x0",
                    DType::F32,
                    vec![Dimension::symbol("b"), Dimension::Static(4)],
                ),
                0,
            )],
        },
        output: TensorDesc::with_shape("y", DType::F32, vec![Dimension::symbol("c")]),
    });
    let body = generator
        .gen_function(ctx, &flatten, None, &mut unit)
        .expect("element count is checked at launch");
    assert!(body.contains("if (!(c == b * 4)) {"));
    assert!(body.contains(
        r#"throw std::runtime_error("srs_flat: output element count differs from the scattered slices");"#
    ));
}

#[test]
fn out_of_range_tunables_fail_instead_of_miscompiling() {
    let target = CudaTarget::default();
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let mut unit = CompilationUnit::new();

    let huge_chunks = GeneratorConfig {
        elems_per_thread: 1usize << 63,
        ..GeneratorConfig::default()
    };
    let err = generator
        .gen_function(GenContext::new(&target, &huge_chunks), &two_way_concat(), None, &mut unit)
        .expect_err("chunk size past the unroll cap");
    assert!(matches!(err, GenError::InvalidConfig(_)));

    let empty = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_empty".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![ScatterMember::whole(static_desc("x0", DType::F32, &[4, 0]), 0)],
        },
        output: static_desc("y", DType::F32, &[4, 0]),
    });
    let wide = GeneratorConfig {
        max_vector_width: 1usize << 63,
        ..GeneratorConfig::default()
    };
    let err = generator
        .gen_function(GenContext::new(&target, &wide), &empty, None, &mut unit)
        .expect_err("vector width past sixteen bytes");
    assert!(matches!(err, GenError::InvalidConfig(_)));
    assert!(unit.includes().is_empty());
}

#[test]
fn extents_past_the_index_range_are_rejected() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");

    let huge = 1usize << 62;
    let attrs = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_huge".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![ScatterMember::whole(static_desc("x0", DType::F32, &[huge, 4]), 0)],
        },
        output: static_desc("y", DType::F32, &[huge, 4]),
    });
    let err = generator
        .gen_function_decl(ctx, &attrs)
        .expect_err("2^64 elements");
    assert!(matches!(err, GenError::InvalidAttrs { .. }));
    assert!(err.to_string().contains("exceeds the int64_t index range"));
}

#[test]
fn launcher_name_may_not_shadow_call_site_names() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");
    let with_rows = |name: &str, input: &str, rows: &str| {
        OpAttrs::from(SliceReshapeScatterAttrs {
            name: name.to_string(),
            group: ScatterGroup {
                scatter_dim: 1,
                members: vec![ScatterMember::whole(
                    TensorDesc::with_shape(
                        input,
                        DType::F32,
                        vec![Dimension::symbol(rows), Dimension::Static(3)],
                    ),
                    0,
                )],
            },
            output: TensorDesc::with_shape(
                "y",
                DType::F32,
                vec![Dimension::symbol(rows), Dimension::Static(3)],
            ),
        })
    };

    for (attrs, clash) in [
        (with_rows("batch", "x0", "batch"), "`batch`"),
        (with_rows("x0", "x0", "batch"), "`x0`"),
        (with_rows("y", "x0", "batch"), "`y`"),
        (with_rows("stream", "x0", "batch"), "`stream`"),
        (with_rows("srs", "x0", "srs_kernel"), "`srs_kernel`"),
    ] {
        let err = generator
            .gen_function_decl(ctx, &attrs)
            .expect_err("name clash");
        assert!(matches!(err, GenError::InvalidAttrs { .. }), "{err}");
        assert!(err.to_string().contains(clash), "{err}");
    }

    let call = generator
        .gen_function_call(
            ctx,
            &with_rows("batch_copy", "x0", "batch"),
            &SymbolScope::with_symbols(["batch"]),
            "",
        )
        .expect("distinct names");
    assert!(call.contains("batch_copy(y, y_shape, x0, batch, stream);"));
}

#[test]
fn coverage_violations_name_the_member() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let generator = default_registry()
        .get(CUDA_TARGET, OpAttrs::SLICE_RESHAPE_SCATTER)
        .expect("generator registered");

    let overlapping = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_bad".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![
                ScatterMember::whole(static_desc("x0", DType::F32, &[4, 3]), 0),
                ScatterMember::whole(static_desc("x1", DType::F32, &[4, 5]), 2),
            ],
        },
        output: static_desc("y", DType::F32, &[4, 8]),
    });
    let err = generator
        .gen_function_decl(ctx, &overlapping)
        .expect_err("ranges overlap");
    assert!(matches!(
        err,
        GenError::ShapeMismatch {
            member: Some(1),
            ..
        }
    ));
    assert_eq!(err.op(), Some("srs_bad"));

    let OpAttrs::SliceReshapeScatter(mut gapped) = overlapping;
    gapped.name = "srs_gap".to_string();
    gapped.group.members[1].dest_offset = 4;
    let err = generator
        .gen_function_decl(ctx, &OpAttrs::from(gapped))
        .expect_err("position 3 is never written");
    assert!(matches!(
        err,
        GenError::ShapeMismatch {
            member: Some(1),
            ..
        }
    ));
    assert!(err
        .to_string()
        .contains("destination offset 4 leaves positions [3, 4) unwritten"));

    let out_of_bounds = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_oob".to_string(),
        group: ScatterGroup {
            scatter_dim: 0,
            members: vec![ScatterMember::new(
                static_desc("x0", DType::F32, &[6]),
                SliceSpec::from_bounds(&[4], &[8]).expect("bounds"),
                0,
            )],
        },
        output: static_desc("y", DType::F32, &[4]),
    });
    let err = generator
        .gen_function_decl(ctx, &out_of_bounds)
        .expect_err("slice leaves the input");
    assert!(matches!(
        err,
        GenError::InvalidSliceSpec {
            member: 0,
            axis: 0,
            ..
        }
    ));
}

#[test]
fn reshaped_output_must_hold_the_scattered_elements() {
    let target = CudaTarget::default();
    let config = GeneratorConfig::default();
    let ctx = GenContext::new(&target, &config);
    let mut unit = CompilationUnit::new();
    let attrs = OpAttrs::from(SliceReshapeScatterAttrs {
        name: "srs_reshape".to_string(),
        group: ScatterGroup {
            scatter_dim: 1,
            members: vec![
                ScatterMember::whole(static_desc("x0", DType::F32, &[4, 3]), 0),
                ScatterMember::whole(static_desc("x1", DType::F32, &[4, 5]), 3),
            ],
        },
        output: static_desc("y", DType::F32, &[2, 16]),
    });
    let generator = default_registry().lookup(ctx, &attrs).expect("generator");
    generator
        .gen_function(ctx, &attrs, None, &mut unit)
        .expect("a [2, 16] output holds 32 elements");

    let OpAttrs::SliceReshapeScatter(mut wrong) = attrs;
    wrong.output = static_desc("y", DType::F32, &[4, 7]);
    let err = generator
        .gen_function(ctx, &OpAttrs::from(wrong), None, &mut unit)
        .expect_err("28 != 32");
    assert!(err.to_string().contains("holds 28 elements"));
}

#[test]
fn unknown_target_is_reported() {
    let registry = default_registry();
    let err = registry
        .get("metal", OpAttrs::SLICE_RESHAPE_SCATTER)
        .err()
        .expect("no metal generators");
    assert!(matches!(err, GenError::UnknownGenerator { .. }));
    assert_eq!(
        registry.list(),
        vec![
            (CUDA_TARGET.to_string(), OpAttrs::SLICE_RESHAPE_SCATTER.to_string()),
            (ROCM_TARGET.to_string(), OpAttrs::SLICE_RESHAPE_SCATTER.to_string()),
        ]
    );
}
