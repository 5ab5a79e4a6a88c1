use opgen::fusion::inject;
use opgen::ir::{Builtin, Expr, FnKind, Function, Launch, Stmt, Ty};
use opgen::shape::dim_expr;

use super::plan::{input_param, ScatterPlan};
use super::signature::KernelSignature;

const CHUNK: &str = "chunk";
const BASE: &str = "base";
const IDX: &str = "idx";
const LANE: &str = "j";
const TOTAL_CHUNKS: &str = "total_chunks";

fn chunk_count(plan: &ScatterPlan, count: &Expr) -> Expr {
    count.clone().ceil_div(Expr::from(plan.elems_per_thread))
}

/// Device kernel: one thread per chunk of `elems_per_thread` vector elements.
///
/// Chunks are numbered member after member; a thread finds its member by
/// comparing its chunk index against the running chunk totals.
pub(crate) fn kernel_function(plan: &ScatterPlan, sig: &KernelSignature) -> Function {
    let as_i64 = |builtin| Expr::cast(Ty::I64, Expr::builtin(builtin));
    let mut body = Vec::new();
    let live: Vec<_> = plan.members.iter().filter(|m| !m.is_empty()).collect();
    if live.is_empty() {
        body.push(Stmt::comment("no elements to scatter"));
    } else {
        body.push(Stmt::const_i64(
            CHUNK,
            as_i64(Builtin::BlockIdxX) * as_i64(Builtin::BlockDimX) + as_i64(Builtin::ThreadIdxX),
        ));
    }

    let mut begin = Expr::int(0);
    let mut emitted = 0;
    for member in &plan.members {
        if member.is_empty() {
            body.push(Stmt::comment(format!(
                "input {} contributes no elements",
                member.index
            )));
            continue;
        }
        emitted += 1;
        let end = begin.clone() + chunk_count(plan, &member.count);
        let idx = Expr::var(IDX);
        let addressing = plan.addressing(member, &idx);

        let load = Expr::element(
            Expr::var(input_param(member.index)),
            addressing.read,
            plan.input_view(),
            plan.lanes,
        );
        let store = Stmt::assign(
            Expr::element(
                Expr::var(KernelSignature::OUTPUT),
                addressing.write,
                plan.output_view(),
                plan.lanes,
            ),
            inject(load, plan.fusion.as_ref()),
        );

        let mut lane_body = vec![
            Stmt::const_i64(IDX, Expr::var(BASE) + Expr::var(LANE)),
            Stmt::if_then(idx.ge(member.count.clone()), vec![Stmt::Break]),
        ];
        lane_body.extend(addressing.coords);
        lane_body.push(store);

        let mut then_body = vec![
            Stmt::const_i64(
                BASE,
                (Expr::var(CHUNK) - begin.clone()) * Expr::from(plan.elems_per_thread),
            ),
            Stmt::For {
                var: LANE.to_string(),
                start: Expr::int(0),
                end: Expr::from(plan.elems_per_thread),
                body: lane_body,
                unroll: true,
            },
        ];
        if emitted < live.len() {
            then_body.push(Stmt::Return);
        }
        body.push(Stmt::if_then(Expr::var(CHUNK).lt(end.clone()), then_body));
        begin = end;
    }

    Function {
        kind: FnKind::Kernel,
        name: sig.kernel.clone(),
        params: sig.kernel_params(),
        body,
    }
}

/// Host launcher: deferred checks, output shape, then the launch.
pub(crate) fn launcher_function(plan: &ScatterPlan, sig: &KernelSignature) -> Function {
    let mut body = plan.guards.clone();
    for (axis, dim) in plan.output_dims.iter().enumerate() {
        body.push(Stmt::assign(
            Expr::deref(Expr::index(
                Expr::var(KernelSignature::OUTPUT_SHAPE),
                Expr::from(axis),
            )),
            dim_expr(dim),
        ));
    }

    let total = plan
        .members
        .iter()
        .fold(Expr::int(0), |acc, member| acc + chunk_count(plan, &member.count));
    let threads = Expr::from(plan.threads_per_block);
    let launch = |grid: Expr| {
        Stmt::Launch(Launch {
            kernel: sig.kernel.clone(),
            grid,
            block: threads.clone(),
            shared_bytes: Expr::int(0),
            stream: Expr::var(KernelSignature::STREAM),
            args: sig.kernel_args(),
        })
    };
    match total.as_int() {
        Some(0) => body.push(Stmt::comment("no elements to scatter")),
        Some(_) => body.push(launch(total.ceil_div(threads.clone()))),
        None => {
            body.push(Stmt::const_i64(TOTAL_CHUNKS, total));
            body.push(Stmt::if_then(
                Expr::var(TOTAL_CHUNKS).equals(Expr::int(0)),
                vec![Stmt::Return],
            ));
            body.push(launch(Expr::var(TOTAL_CHUNKS).ceil_div(threads.clone())));
        }
    }

    Function {
        kind: FnKind::Host,
        name: sig.launcher.clone(),
        params: sig.launcher_params(),
        body,
    }
}
