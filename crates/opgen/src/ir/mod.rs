//! Typed expression/statement tree for generated device and host code.
//!
//! Generators build functions out of these nodes and hand them to
//! [`printer::Printer`] for rendering. Arithmetic builders fold constants
//! eagerly so statically known extents collapse to literals before printing.

pub mod eval;
pub mod printer;

use std::ops::{Add, Div, Mul, Rem, Sub};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    I64,
    /// Platform type spelled verbatim (`half`, `float4`, `cudaStream_t`).
    Named(String),
    Ptr {
        pointee: Box<Ty>,
        is_const: bool,
        restrict: bool,
    },
    /// Array declarator; `len: None` prints as `[]`.
    Array { elem: Box<Ty>, len: Option<usize> },
}

impl Ty {
    pub fn named(name: impl Into<String>) -> Self {
        Ty::Named(name.into())
    }

    pub fn ptr(pointee: Ty) -> Self {
        Ty::Ptr {
            pointee: Box::new(pointee),
            is_const: false,
            restrict: false,
        }
    }

    pub fn const_ptr(pointee: Ty) -> Self {
        Ty::Ptr {
            pointee: Box::new(pointee),
            is_const: true,
            restrict: false,
        }
    }

    /// Marks a pointer type as non-aliasing; other types are returned as-is.
    pub fn restricted(self) -> Self {
        match self {
            Ty::Ptr {
                pointee, is_const, ..
            } => Ty::Ptr {
                pointee,
                is_const,
                restrict: true,
            },
            other => other,
        }
    }

    pub fn array(elem: Ty) -> Self {
        Ty::Array {
            elem: Box::new(elem),
            len: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Ge,
    Eq,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
        }
    }

    /// C operator precedence, higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Rem => 13,
            BinOp::Add | BinOp::Sub => 12,
            BinOp::Lt | BinOp::Le | BinOp::Ge => 10,
            BinOp::Eq => 9,
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        let bool_int = |value: bool| Some(i64::from(value));
        match self {
            BinOp::Add => lhs.checked_add(rhs),
            BinOp::Sub => lhs.checked_sub(rhs),
            BinOp::Mul => lhs.checked_mul(rhs),
            BinOp::Div => lhs.checked_div(rhs),
            BinOp::Rem => lhs.checked_rem(rhs),
            BinOp::Lt => bool_int(lhs < rhs),
            BinOp::Le => bool_int(lhs <= rhs),
            BinOp::Ge => bool_int(lhs >= rhs),
            BinOp::Eq => bool_int(lhs == rhs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Deref,
    AddrOf,
}

/// Per-thread launch coordinates available inside a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    ThreadIdxX,
    BlockIdxX,
    BlockDimX,
}

impl Builtin {
    pub fn as_str(self) -> &'static str {
        match self {
            Builtin::ThreadIdxX => "threadIdx.x",
            Builtin::BlockIdxX => "blockIdx.x",
            Builtin::BlockDimX => "blockDim.x",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Int(i64),
    Var(String),
    Builtin(Builtin),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    /// Tensor element access. With a `view` the base pointer is reinterpreted
    /// as a pointer to a `lanes`-wide vector type and `index` counts vectors.
    Element {
        base: Box<Expr>,
        index: Box<Expr>,
        view: Option<Ty>,
        lanes: usize,
    },
    Call {
        func: String,
        args: Vec<Expr>,
    },
    Cast(Ty, Box<Expr>),
    InitList(Vec<Expr>),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Expr::Builtin(builtin)
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
        }
    }

    pub fn cast(ty: Ty, expr: Expr) -> Self {
        Expr::Cast(ty, Box::new(expr))
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index(Box::new(base), Box::new(index))
    }

    pub fn element(base: Expr, index: Expr, view: Option<Ty>, lanes: usize) -> Self {
        Expr::Element {
            base: Box::new(base),
            index: Box::new(index),
            view,
            lanes,
        }
    }

    pub fn deref(expr: Expr) -> Self {
        Expr::Unary(UnOp::Deref, Box::new(expr))
    }

    pub fn addr_of(expr: Expr) -> Self {
        Expr::Unary(UnOp::AddrOf, Box::new(expr))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// `true` when evaluating the expression cannot call out of the program.
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Int(_) | Expr::Var(_) | Expr::Builtin(_) => true,
            Expr::Unary(_, inner) | Expr::Cast(_, inner) => inner.is_pure(),
            Expr::Binary(_, lhs, rhs) | Expr::Index(lhs, rhs) => lhs.is_pure() && rhs.is_pure(),
            Expr::Element { base, index, .. } => base.is_pure() && index.is_pure(),
            Expr::Call { .. } => false,
            Expr::InitList(items) => items.iter().all(Expr::is_pure),
        }
    }

    /// Builds `lhs op rhs`, folding literals and arithmetic identities.
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
            if let Some(value) = op.apply(a, b) {
                return Expr::Int(value);
            }
        }
        let lhs_int = lhs.as_int();
        let rhs_int = rhs.as_int();
        match op {
            BinOp::Add if lhs_int == Some(0) => return rhs,
            BinOp::Add | BinOp::Sub if rhs_int == Some(0) => return lhs,
            BinOp::Mul if lhs_int == Some(1) => return rhs,
            BinOp::Mul | BinOp::Div if rhs_int == Some(1) => return lhs,
            BinOp::Mul if lhs_int == Some(0) && rhs.is_pure() => return Expr::Int(0),
            BinOp::Mul if rhs_int == Some(0) && lhs.is_pure() => return Expr::Int(0),
            BinOp::Rem if rhs_int == Some(1) && lhs.is_pure() => return Expr::Int(0),
            _ => {}
        }
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Lt, self, rhs.into())
    }

    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Le, self, rhs.into())
    }

    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Ge, self, rhs.into())
    }

    pub fn equals(self, rhs: impl Into<Expr>) -> Self {
        // Structurally identical pure expressions are equal at run time too.
        let rhs = rhs.into();
        if self == rhs && self.is_pure() {
            return Expr::Int(1);
        }
        Expr::binary(BinOp::Eq, self, rhs)
    }

    /// `(self + rhs - 1) / rhs`, for non-negative operands.
    pub fn ceil_div(self, rhs: impl Into<Expr>) -> Self {
        let rhs = rhs.into();
        match rhs.as_int() {
            Some(1) => self,
            Some(divisor) => (self + Expr::int(divisor.saturating_sub(1))) / rhs,
            None => (self + rhs.clone() - Expr::int(1)) / rhs,
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Int(value)
    }
}

/// Values past `i64::MAX` saturate; generators reject such extents up front.
impl From<usize> for Expr {
    fn from(value: usize) -> Self {
        Expr::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Expr {
    fn from(name: &str) -> Self {
        Expr::Var(name.to_string())
    }
}

macro_rules! folding_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Expr>> $trait<T> for Expr {
            type Output = Expr;

            fn $method(self, rhs: T) -> Expr {
                Expr::binary($op, self, rhs.into())
            }
        }
    };
}

folding_op!(Add, add, BinOp::Add);
folding_op!(Sub, sub, BinOp::Sub);
folding_op!(Mul, mul, BinOp::Mul);
folding_op!(Div, div, BinOp::Div);
folding_op!(Rem, rem, BinOp::Rem);

/// Launch of a kernel from host code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub kernel: String,
    pub grid: Expr,
    pub block: Expr,
    pub shared_bytes: Expr,
    pub stream: Expr,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Decl {
        ty: Ty,
        name: String,
        init: Option<Expr>,
        is_const: bool,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    /// `for (int64_t var = start; var < end; ++var)`.
    For {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
        unroll: bool,
    },
    /// Host-side check that aborts the generated program with `message`.
    Guard {
        cond: Expr,
        message: String,
    },
    Launch(Launch),
    Block(Vec<Stmt>),
    Comment(String),
    Break,
    Return,
}

impl Stmt {
    pub fn const_i64(name: impl Into<String>, init: Expr) -> Self {
        Stmt::Decl {
            ty: Ty::I64,
            name: name.into(),
            init: Some(init),
            is_const: true,
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign { target, value }
    }

    pub fn if_then(cond: Expr, then_body: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_body,
            else_body: Vec::new(),
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Stmt::Comment(text.into())
    }

    /// Returns `None` when `cond` is statically true.
    pub fn guard(cond: Expr, message: impl Into<String>) -> Option<Self> {
        match cond.as_int() {
            Some(value) if value != 0 => None,
            _ => Some(Stmt::Guard {
                cond,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnKind {
    Kernel,
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: Ty,
    pub name: String,
}

impl Param {
    pub fn new(ty: Ty, name: impl Into<String>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }
}

/// A `void` function; kernels and host launchers never return values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub kind: FnKind,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_literal_arithmetic() {
        let expr = Expr::int(3) * Expr::int(8) + Expr::int(5);
        assert_eq!(expr, Expr::Int(29));
        assert_eq!(Expr::int(7).ceil_div(Expr::int(4)), Expr::Int(2));
    }

    #[test]
    fn drops_identities_around_symbols() {
        let x = Expr::var("x");
        assert_eq!(x.clone() * Expr::int(1) + Expr::int(0), x);
        assert_eq!(x.clone() * Expr::int(0), Expr::Int(0));
        assert_eq!(x.clone() % Expr::int(1), Expr::Int(0));
        assert_eq!(x.clone().equals(x.clone()), Expr::Int(1));
    }

    #[test]
    fn keeps_calls_under_zero_multiplication() {
        let call = Expr::call("f", vec![Expr::var("x")]);
        let expr = call.clone() * Expr::int(0);
        assert_eq!(expr, Expr::Binary(BinOp::Mul, Box::new(call), Box::new(Expr::Int(0))));
    }

    #[test]
    fn division_by_literal_zero_is_not_folded() {
        let expr = Expr::int(4) / Expr::int(0);
        assert!(matches!(expr, Expr::Binary(BinOp::Div, _, _)));
    }

    #[test]
    fn static_true_guards_vanish() {
        assert!(Stmt::guard(Expr::int(2).le(Expr::int(4)), "never").is_none());
        assert!(Stmt::guard(Expr::var("n").le(Expr::int(4)), "n too large").is_some());
    }
}
