use std::fmt::Write as _;

use super::{Expr, FnKind, Function, Launch, Stmt, Ty, UnOp};
use crate::target::{Dialect, LaunchSyntax};

const INDENT: &str = "  ";
const PREC_UNARY: u8 = 15;
const PREC_POSTFIX: u8 = 16;

pub fn escape_c_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders IR as source text for one platform dialect.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    dialect: Dialect,
}

impl Printer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn ty(&self, ty: &Ty) -> String {
        match ty {
            Ty::I64 => "int64_t".to_string(),
            Ty::Named(name) => name.clone(),
            Ty::Ptr {
                pointee,
                is_const,
                restrict,
            } => {
                let mut out = String::new();
                if *is_const {
                    out.push_str("const ");
                }
                out.push_str(&self.ty(pointee));
                out.push('*');
                if *restrict {
                    out.push(' ');
                    out.push_str(self.dialect.restrict);
                }
                out
            }
            Ty::Array { elem, .. } => format!("{}*", self.ty(elem)),
        }
    }

    fn declarator(&self, ty: &Ty, name: &str) -> String {
        match ty {
            Ty::Array { elem, len } => {
                let len = len.map(|len| len.to_string()).unwrap_or_default();
                format!("{} {name}[{len}]", self.ty(elem))
            }
            other => format!("{} {name}", self.ty(other)),
        }
    }

    pub fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Int(value) => value.to_string(),
            Expr::Var(name) => name.clone(),
            Expr::Builtin(builtin) => builtin.as_str().to_string(),
            Expr::Unary(op, inner) => {
                let operand = self.expr_min(inner, PREC_UNARY);
                let symbol = match op {
                    UnOp::Deref => "*",
                    UnOp::AddrOf => "&",
                };
                format!("{symbol}{operand}")
            }
            Expr::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                format!(
                    "{} {} {}",
                    self.expr_min(lhs, prec),
                    op.symbol(),
                    self.expr_min(rhs, prec + 1)
                )
            }
            Expr::Index(base, index) => {
                format!("{}[{}]", self.expr_min(base, PREC_POSTFIX), self.expr(index))
            }
            Expr::Element {
                base, index, view, ..
            } => match view {
                Some(view) => format!(
                    "reinterpret_cast<{}>({})[{}]",
                    self.ty(view),
                    self.expr(base),
                    self.expr(index)
                ),
                None => format!("{}[{}]", self.expr_min(base, PREC_POSTFIX), self.expr(index)),
            },
            Expr::Call { func, args } => format!("{func}({})", self.expr_list(args)),
            Expr::Cast(ty, inner) => {
                format!("({}){}", self.ty(ty), self.expr_min(inner, PREC_UNARY))
            }
            Expr::InitList(items) => format!("{{{}}}", self.expr_list(items)),
        }
    }

    fn expr_list(&self, items: &[Expr]) -> String {
        items
            .iter()
            .map(|item| self.expr(item))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders `expr`, parenthesized when it binds looser than `min_prec`.
    fn expr_min(&self, expr: &Expr, min_prec: u8) -> String {
        let text = self.expr(expr);
        if precedence(expr) < min_prec {
            format!("({text})")
        } else {
            text
        }
    }

    fn signature(&self, func: &Function) -> String {
        let params = func
            .params
            .iter()
            .map(|param| self.declarator(&param.ty, &param.name))
            .collect::<Vec<_>>()
            .join(", ");
        match func.kind {
            FnKind::Kernel => format!(
                "{} void {}({params})",
                self.dialect.kernel_qualifier, func.name
            ),
            FnKind::Host => format!("void {}({params})", func.name),
        }
    }

    /// `void name(params);`
    pub fn prototype(&self, func: &Function) -> String {
        format!("{};\n", self.signature(func))
    }

    pub fn function(&self, func: &Function) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {{", self.signature(func));
        self.write_stmts(&mut out, &func.body, "", 1);
        out.push_str("}\n");
        out
    }

    /// Renders statements with every line prefixed by `base_indent`.
    pub fn stmts(&self, stmts: &[Stmt], base_indent: &str) -> String {
        let mut out = String::new();
        self.write_stmts(&mut out, stmts, base_indent, 0);
        out
    }

    fn write_stmts(&self, out: &mut String, stmts: &[Stmt], base: &str, level: usize) {
        for stmt in stmts {
            self.write_stmt(out, stmt, base, level);
        }
    }

    fn write_stmt(&self, out: &mut String, stmt: &Stmt, base: &str, level: usize) {
        let pad = format!("{base}{}", INDENT.repeat(level));
        match stmt {
            Stmt::Decl {
                ty,
                name,
                init,
                is_const,
            } => {
                let qualifier = if *is_const { "const " } else { "" };
                let decl = self.declarator(ty, name);
                match init {
                    Some(init) => {
                        let _ = writeln!(out, "{pad}{qualifier}{decl} = {};", self.expr(init));
                    }
                    None => {
                        let _ = writeln!(out, "{pad}{qualifier}{decl};");
                    }
                }
            }
            Stmt::Assign { target, value } => {
                let _ = writeln!(out, "{pad}{} = {};", self.expr(target), self.expr(value));
            }
            Stmt::Expr(expr) => {
                let _ = writeln!(out, "{pad}{};", self.expr(expr));
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let _ = writeln!(out, "{pad}if ({}) {{", self.expr(cond));
                self.write_stmts(out, then_body, base, level + 1);
                if !else_body.is_empty() {
                    let _ = writeln!(out, "{pad}}} else {{");
                    self.write_stmts(out, else_body, base, level + 1);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::For {
                var,
                start,
                end,
                body,
                unroll,
            } => {
                if *unroll {
                    let _ = writeln!(out, "{pad}#pragma unroll");
                }
                let _ = writeln!(
                    out,
                    "{pad}for (int64_t {var} = {}; {var} < {}; ++{var}) {{",
                    self.expr(start),
                    self.expr(end)
                );
                self.write_stmts(out, body, base, level + 1);
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Guard { cond, message } => {
                let _ = writeln!(out, "{pad}if (!({})) {{", self.expr(cond));
                let _ = writeln!(
                    out,
                    "{pad}{INDENT}throw std::runtime_error(\"{}\");",
                    escape_c_string(message)
                );
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Launch(launch) => {
                let _ = writeln!(out, "{pad}{};", self.launch(launch));
            }
            Stmt::Block(body) => {
                let _ = writeln!(out, "{pad}{{");
                self.write_stmts(out, body, base, level + 1);
                let _ = writeln!(out, "{pad}}}");
            }
            Stmt::Comment(text) => {
                for line in text.lines() {
                    let _ = writeln!(out, "{pad}// {line}");
                }
            }
            Stmt::Break => {
                let _ = writeln!(out, "{pad}break;");
            }
            Stmt::Return => {
                let _ = writeln!(out, "{pad}return;");
            }
        }
    }

    fn launch(&self, launch: &Launch) -> String {
        let grid = format!("dim3({})", self.expr(&launch.grid));
        let block = format!("dim3({})", self.expr(&launch.block));
        let shared = self.expr(&launch.shared_bytes);
        let stream = self.expr(&launch.stream);
        let args = self.expr_list(&launch.args);
        match self.dialect.launch {
            LaunchSyntax::TripleChevron => format!(
                "{}<<<{grid}, {block}, {shared}, {stream}>>>({args})",
                launch.kernel
            ),
            LaunchSyntax::HipLaunchKernelGgl => {
                let mut out = format!(
                    "hipLaunchKernelGGL({}, {grid}, {block}, {shared}, {stream}",
                    launch.kernel
                );
                if !args.is_empty() {
                    out.push_str(", ");
                    out.push_str(&args);
                }
                out.push(')');
                out
            }
        }
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary(op, _, _) => op.precedence(),
        Expr::Unary(..) | Expr::Cast(..) => PREC_UNARY,
        Expr::Int(value) if *value < 0 => PREC_UNARY,
        _ => PREC_POSTFIX,
    }
}
