//! Host-side interpreter for generated IR.
//!
//! Runs a host launcher and the kernels it launches on plain host buffers so
//! addressing, guards and element functions can be checked without a device.
//! Buffers hold raw element bits (`u64` per element, whatever the dtype);
//! element functions are registered as per-lane host closures.

use std::collections::HashMap;

use thiserror::Error;

use super::{BinOp, Builtin, Expr, FnKind, Function, Stmt, UnOp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("unbound variable `{0}`")]
    UnboundVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("`{function}` expects {expected} arguments, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("out-of-bounds access to buffer {buffer} at element {index} (len {len})")]
    OutOfBounds { buffer: usize, index: i64, len: usize },
    #[error("runtime guard failed: {0}")]
    RuntimeGuard(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    /// One or more element bit patterns loaded from a buffer.
    Lanes(Vec<u64>),
    Buffer(BufferId),
    /// `int64_t* shape[]` argument; each slot receives one output extent.
    Shape(ShapeId),
    /// Stream handles and anything else the interpreter only passes along.
    Opaque,
}

impl Value {
    fn as_int(&self) -> EvalResult<i64> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(EvalError::TypeMismatch(format!(
                "expected integer, found {other:?}"
            ))),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<BufferId> for Value {
    fn from(id: BufferId) -> Self {
        Value::Buffer(id)
    }
}

impl From<ShapeId> for Value {
    fn from(id: ShapeId) -> Self {
        Value::Shape(id)
    }
}

type HostFn = Box<dyn Fn(u64) -> u64>;

struct Buffer {
    data: Vec<u64>,
    writes: Option<Vec<u32>>,
}

#[derive(Clone, Copy)]
struct ThreadCtx {
    thread_idx: i64,
    block_idx: i64,
    block_dim: i64,
}

enum Flow {
    Normal,
    Break,
    Return,
}

#[derive(Default)]
pub struct Machine {
    functions: HashMap<String, Function>,
    host_fns: HashMap<String, HostFn>,
    buffers: Vec<Buffer>,
    shapes: Vec<Vec<Option<i64>>>,
    launches: usize,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, func: Function) {
        self.functions.insert(func.name.clone(), func);
    }

    /// Registers a host stand-in for a device element function, applied lane by lane.
    pub fn register_host_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(u64) -> u64 + 'static,
    {
        self.host_fns.insert(name.into(), Box::new(func));
    }

    pub fn alloc(&mut self, data: Vec<u64>) -> BufferId {
        self.buffers.push(Buffer { data, writes: None });
        BufferId(self.buffers.len() - 1)
    }

    /// Allocates a buffer that counts writes per element.
    pub fn alloc_tracked(&mut self, len: usize, fill: u64) -> BufferId {
        self.buffers.push(Buffer {
            data: vec![fill; len],
            writes: Some(vec![0; len]),
        });
        BufferId(self.buffers.len() - 1)
    }

    pub fn alloc_shape(&mut self, rank: usize) -> ShapeId {
        self.shapes.push(vec![None; rank]);
        ShapeId(self.shapes.len() - 1)
    }

    pub fn buffer(&self, id: BufferId) -> &[u64] {
        &self.buffers[id.0].data
    }

    pub fn write_counts(&self, id: BufferId) -> Option<&[u32]> {
        self.buffers[id.0].writes.as_deref()
    }

    pub fn shape(&self, id: ShapeId) -> &[Option<i64>] {
        &self.shapes[id.0]
    }

    /// Number of kernel launches executed so far.
    pub fn launches(&self) -> usize {
        self.launches
    }

    /// Runs a host function to completion.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> EvalResult<()> {
        let func = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        self.invoke(&func, args, None)
    }

    fn invoke(&mut self, func: &Function, args: Vec<Value>, ctx: Option<ThreadCtx>) -> EvalResult<()> {
        if func.params.len() != args.len() {
            return Err(EvalError::Arity {
                function: func.name.clone(),
                expected: func.params.len(),
                got: args.len(),
            });
        }
        let mut env: HashMap<String, Value> = func
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(args)
            .collect();
        let mut frame = Frame { env: &mut env, ctx };
        self.exec_block(&mut frame, &func.body)?;
        Ok(())
    }

    fn exec_block(&mut self, frame: &mut Frame<'_>, stmts: &[Stmt]) -> EvalResult<Flow> {
        for stmt in stmts {
            match self.exec(frame, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, frame: &mut Frame<'_>, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Decl { name, init, .. } => {
                if let Some(init) = init {
                    let value = self.eval(frame, init)?;
                    frame.env.insert(name.clone(), value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(frame, value)?;
                self.store(frame, target, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                if self.eval(frame, cond)?.as_int()? != 0 {
                    self.exec_block(frame, then_body)
                } else {
                    self.exec_block(frame, else_body)
                }
            }
            Stmt::For {
                var,
                start,
                end,
                body,
                ..
            } => {
                let mut current = self.eval(frame, start)?.as_int()?;
                loop {
                    frame.env.insert(var.clone(), Value::Int(current));
                    if current >= self.eval(frame, end)?.as_int()? {
                        return Ok(Flow::Normal);
                    }
                    match self.exec_block(frame, body)? {
                        Flow::Normal => {}
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return => return Ok(Flow::Return),
                    }
                    current = current.checked_add(1).ok_or(EvalError::Overflow)?;
                }
            }
            Stmt::Guard { cond, message } => {
                if self.eval(frame, cond)?.as_int()? == 0 {
                    return Err(EvalError::RuntimeGuard(message.clone()));
                }
                Ok(Flow::Normal)
            }
            Stmt::Launch(launch) => {
                let kernel = self
                    .functions
                    .get(&launch.kernel)
                    .cloned()
                    .ok_or_else(|| EvalError::UnknownFunction(launch.kernel.clone()))?;
                if kernel.kind != FnKind::Kernel {
                    return Err(EvalError::TypeMismatch(format!(
                        "`{}` is not a kernel",
                        kernel.name
                    )));
                }
                let grid = self.eval(frame, &launch.grid)?.as_int()?;
                let block = self.eval(frame, &launch.block)?.as_int()?;
                let args = launch
                    .args
                    .iter()
                    .map(|arg| self.eval(frame, arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.launches += 1;
                for block_idx in 0..grid {
                    for thread_idx in 0..block {
                        let ctx = ThreadCtx {
                            thread_idx,
                            block_idx,
                            block_dim: block,
                        };
                        self.invoke(&kernel, args.clone(), Some(ctx))?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => self.exec_block(frame, body),
            Stmt::Comment(_) => Ok(Flow::Normal),
            Stmt::Break => Ok(Flow::Break),
            Stmt::Return => Ok(Flow::Return),
        }
    }

    fn store(&mut self, frame: &mut Frame<'_>, target: &Expr, value: Value) -> EvalResult<()> {
        match target {
            Expr::Var(name) => {
                frame.env.insert(name.clone(), value);
                Ok(())
            }
            Expr::Element {
                base, index, lanes, ..
            } => {
                let id = self.buffer_id(frame, base)?;
                let index = self.eval(frame, index)?.as_int()?;
                let lanes_value = match value {
                    Value::Lanes(lanes_value) if lanes_value.len() == *lanes => lanes_value,
                    other => {
                        return Err(EvalError::TypeMismatch(format!(
                            "storing {other:?} into a {lanes}-lane element"
                        )))
                    }
                };
                let start = lane_start(index, *lanes)?;
                self.write_lanes(id, start, &lanes_value)
            }
            Expr::Index(base, index) => {
                let id = self.buffer_id(frame, base)?;
                let index = self.eval(frame, index)?.as_int()?;
                let lanes_value = match value {
                    Value::Lanes(lanes_value) if lanes_value.len() == 1 => lanes_value,
                    other => {
                        return Err(EvalError::TypeMismatch(format!(
                            "storing {other:?} into a scalar element"
                        )))
                    }
                };
                self.write_lanes(id, index, &lanes_value)
            }
            Expr::Unary(UnOp::Deref, inner) => match inner.as_ref() {
                Expr::Index(base, slot) => {
                    let shape = match self.eval(frame, base)? {
                        Value::Shape(id) => id,
                        other => {
                            return Err(EvalError::TypeMismatch(format!(
                                "dereferencing slot of {other:?}"
                            )))
                        }
                    };
                    let slot = self.eval(frame, slot)?.as_int()?;
                    let extent = value.as_int()?;
                    let slots = &mut self.shapes[shape.0];
                    let len = slots.len();
                    let entry = usize::try_from(slot)
                        .ok()
                        .and_then(|slot| slots.get_mut(slot))
                        .ok_or(EvalError::OutOfBounds {
                            buffer: shape.0,
                            index: slot,
                            len,
                        })?;
                    *entry = Some(extent);
                    Ok(())
                }
                other => Err(EvalError::TypeMismatch(format!(
                    "unsupported store target *{other:?}"
                ))),
            },
            other => Err(EvalError::TypeMismatch(format!(
                "unsupported store target {other:?}"
            ))),
        }
    }

    fn write_lanes(&mut self, id: BufferId, start: i64, values: &[u64]) -> EvalResult<()> {
        let buffer = &mut self.buffers[id.0];
        let range = checked_range(id, start, values.len(), buffer.data.len())?;
        buffer.data[range.clone()].copy_from_slice(values);
        if let Some(writes) = buffer.writes.as_mut() {
            for count in &mut writes[range] {
                *count += 1;
            }
        }
        Ok(())
    }

    fn read_lanes(&self, id: BufferId, start: i64, lanes: usize) -> EvalResult<Value> {
        let buffer = &self.buffers[id.0];
        let range = checked_range(id, start, lanes, buffer.data.len())?;
        Ok(Value::Lanes(buffer.data[range].to_vec()))
    }

    fn buffer_id(&mut self, frame: &mut Frame<'_>, base: &Expr) -> EvalResult<BufferId> {
        match self.eval(frame, base)? {
            Value::Buffer(id) => Ok(id),
            other => Err(EvalError::TypeMismatch(format!(
                "expected buffer, found {other:?}"
            ))),
        }
    }

    fn eval(&mut self, frame: &mut Frame<'_>, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Var(name) => frame
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Builtin(builtin) => {
                let ctx = frame.ctx.ok_or_else(|| {
                    EvalError::TypeMismatch(format!("{} outside a kernel", builtin.as_str()))
                })?;
                Ok(Value::Int(match builtin {
                    Builtin::ThreadIdxX => ctx.thread_idx,
                    Builtin::BlockIdxX => ctx.block_idx,
                    Builtin::BlockDimX => ctx.block_dim,
                }))
            }
            Expr::Unary(..) => Err(EvalError::TypeMismatch(
                "pointer arithmetic is not interpreted".to_string(),
            )),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(frame, lhs)?.as_int()?;
                let rhs = self.eval(frame, rhs)?.as_int()?;
                binary_int(*op, lhs, rhs).map(Value::Int)
            }
            Expr::Index(base, index) => {
                let id = self.buffer_id(frame, base)?;
                let index = self.eval(frame, index)?.as_int()?;
                self.read_lanes(id, index, 1)
            }
            Expr::Element {
                base, index, lanes, ..
            } => {
                let id = self.buffer_id(frame, base)?;
                let index = self.eval(frame, index)?.as_int()?;
                let start = lane_start(index, *lanes)?;
                self.read_lanes(id, start, *lanes)
            }
            Expr::Call { func, args } => {
                if args.len() != 1 {
                    return Err(EvalError::Arity {
                        function: func.clone(),
                        expected: 1,
                        got: args.len(),
                    });
                }
                let lanes = match self.eval(frame, &args[0])? {
                    Value::Lanes(lanes) => lanes,
                    other => {
                        return Err(EvalError::TypeMismatch(format!(
                            "`{func}` applied to {other:?}"
                        )))
                    }
                };
                let host_fn = self
                    .host_fns
                    .get(func)
                    .ok_or_else(|| EvalError::UnknownFunction(func.clone()))?;
                Ok(Value::Lanes(lanes.into_iter().map(|lane| host_fn(lane)).collect()))
            }
            Expr::Cast(_, inner) => self.eval(frame, inner),
            Expr::InitList(_) => Err(EvalError::TypeMismatch(
                "initializer lists are not interpreted".to_string(),
            )),
        }
    }
}

struct Frame<'a> {
    env: &'a mut HashMap<String, Value>,
    ctx: Option<ThreadCtx>,
}

fn binary_int(op: BinOp, lhs: i64, rhs: i64) -> EvalResult<i64> {
    let bool_int = |value: bool| Ok(i64::from(value));
    match op {
        BinOp::Add => lhs.checked_add(rhs).ok_or(EvalError::Overflow),
        BinOp::Sub => lhs.checked_sub(rhs).ok_or(EvalError::Overflow),
        BinOp::Mul => lhs.checked_mul(rhs).ok_or(EvalError::Overflow),
        BinOp::Div | BinOp::Rem if rhs == 0 => Err(EvalError::DivisionByZero),
        BinOp::Div => lhs.checked_div(rhs).ok_or(EvalError::Overflow),
        BinOp::Rem => lhs.checked_rem(rhs).ok_or(EvalError::Overflow),
        BinOp::Lt => bool_int(lhs < rhs),
        BinOp::Le => bool_int(lhs <= rhs),
        BinOp::Ge => bool_int(lhs >= rhs),
        BinOp::Eq => bool_int(lhs == rhs),
    }
}

fn lane_start(index: i64, lanes: usize) -> EvalResult<i64> {
    let lanes = i64::try_from(lanes).map_err(|_| EvalError::Overflow)?;
    index.checked_mul(lanes).ok_or(EvalError::Overflow)
}

fn checked_range(
    id: BufferId,
    start: i64,
    lanes: usize,
    len: usize,
) -> EvalResult<std::ops::Range<usize>> {
    let out_of_bounds = EvalError::OutOfBounds {
        buffer: id.0,
        index: start,
        len,
    };
    let begin = usize::try_from(start).map_err(|_| out_of_bounds.clone())?;
    match begin.checked_add(lanes) {
        Some(end) if end <= len => Ok(begin..end),
        _ => Err(out_of_bounds),
    }
}

/// Evaluates a host-side integer expression against named bindings.
pub fn evaluate_int(expr: &Expr, bindings: &HashMap<String, i64>) -> EvalResult<i64> {
    let mut env: HashMap<String, Value> = bindings
        .iter()
        .map(|(name, value)| (name.clone(), Value::Int(*value)))
        .collect();
    let mut frame = Frame {
        env: &mut env,
        ctx: None,
    };
    Machine::new().eval(&mut frame, expr)?.as_int()
}
