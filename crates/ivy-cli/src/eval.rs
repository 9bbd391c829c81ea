//! Tree-walking interpreter for Ivy.
//!
//! Executes an analyzed program in two passes (register definitions, then
//! run top-level statements, then `main()`), sending output lines and
//! memory events to caller-provided sinks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use ivy_ast::ast::{
    BinOp, Expr, ExternFnDef, FnDef, ImplBlock, Lit, MatchCase, Pattern, Program, Stmt,
    VariantBinding, VariantPayload,
};

use crate::events::{EventValue, MemEvent};

/// Maximum call depth, to keep runaway recursion from overflowing the stack.
const MAX_CALL_DEPTH: u32 = 1000;

/// Runtime values.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    /// Struct instance. Carries the erased base name only; method dispatch
    /// prefix-matches impl target types against it.
    Struct {
        name: String,
        fields: HashMap<String, Value>,
    },
    Enum {
        enum_type: String,
        variant: String,
        payload: EnumPayload,
    },
    Closure {
        params: Vec<String>,
        body: ivy_ast::ast::Block,
        env: Env,
    },
    /// Reference to a named function (user, builtin, or extern).
    FnRef(String),
}

#[derive(Debug, Clone)]
pub enum EnumPayload {
    None,
    /// Tuple-like payload. Multiple constructor arguments collapse into one
    /// tuple value.
    Single(Box<Value>),
    /// Struct-like payload.
    Fields(HashMap<String, Value>),
}

impl Value {
    /// Primitives are exempt from move semantics and MOVE events.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Bool(_) | Value::Str(_) | Value::Null
        )
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Null => write!(f, "null"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Struct { name, fields } => {
                write!(f, "{} {{ ", name)?;
                let mut sorted: Vec<_> = fields.iter().collect();
                sorted.sort_by_key(|(k, _)| k.as_str());
                for (i, (k, v)) in sorted.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, " }}")
            }
            Value::Enum {
                enum_type,
                variant,
                payload,
            } => {
                write!(f, "{}::{}", enum_type, variant)?;
                match payload {
                    EnumPayload::None => Ok(()),
                    EnumPayload::Single(v) => write!(f, "({})", v),
                    EnumPayload::Fields(fields) => {
                        write!(f, " {{ ")?;
                        let mut sorted: Vec<_> = fields.iter().collect();
                        sorted.sort_by_key(|(k, _)| k.as_str());
                        for (i, (k, v)) in sorted.into_iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}: {}", k, v)?;
                        }
                        write!(f, " }}")
                    }
                }
            }
            Value::Closure { params, .. } => write!(f, "<fn({})>", params.join(", ")),
            Value::FnRef(name) => write!(f, "<fn {}>", name),
        }
    }
}

/// Control flow through statement execution. `return` unwinds as a value
/// until the enclosing call frame catches it.
#[derive(Debug, Clone)]
enum ControlFlow {
    Value(Value),
    Return(Value),
}

impl ControlFlow {
    fn into_value(self) -> Value {
        match self {
            ControlFlow::Value(v) | ControlFlow::Return(v) => v,
        }
    }

    fn is_return(&self) -> bool {
        matches!(self, ControlFlow::Return(_))
    }
}

// ======= environments =======

/// A reference-counted environment node. Closures hold on to the
/// environment they captured, so nodes are shared rather than snapshotted;
/// the id is stable for the event stream.
#[derive(Debug, Clone)]
pub struct Env(Rc<RefCell<EnvNode>>);

#[derive(Debug)]
struct EnvNode {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
    id: u64,
}

impl Env {
    fn root(id: u64) -> Self {
        Env(Rc::new(RefCell::new(EnvNode {
            vars: HashMap::new(),
            parent: None,
            id,
        })))
    }

    fn child(&self, id: u64) -> Self {
        Env(Rc::new(RefCell::new(EnvNode {
            vars: HashMap::new(),
            parent: Some(self.clone()),
            id,
        })))
    }

    fn id(&self) -> u64 {
        self.0.borrow().id
    }

    fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// Look up a name, returning the value and the id of the scope that
    /// owns the binding.
    fn get(&self, name: &str) -> Option<(Value, u64)> {
        let node = self.0.borrow();
        if let Some(v) = node.vars.get(name) {
            return Some((v.clone(), node.id));
        }
        let parent = node.parent.clone();
        drop(node);
        parent.and_then(|p| p.get(name))
    }

    /// Update the nearest binding of `name`, returning its scope id.
    fn set(&self, name: &str, value: Value) -> Option<u64> {
        let mut node = self.0.borrow_mut();
        if let Some(slot) = node.vars.get_mut(name) {
            *slot = value;
            return Some(node.id);
        }
        let parent = node.parent.clone();
        drop(node);
        parent.and_then(|p| p.set(name, value))
    }
}

// ======= interpreter =======

/// A host-provided implementation of an `extern fn`.
pub type ExternHostFn = Box<dyn FnMut(&[Value]) -> Value>;

/// The interpreter. Use [`run`] for the common case; construct one directly
/// to bind host functions to `extern fn` declarations.
#[derive(Default)]
pub struct Interpreter {
    fns: HashMap<String, FnDef>,
    impls: Vec<ImplBlock>,
    externs: HashMap<String, ExternFnDef>,
    hosts: HashMap<String, ExternHostFn>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a host function to an extern name. `alert` consults this table
    /// before falling back to the output sink.
    pub fn bind_extern(mut self, name: &str, f: ExternHostFn) -> Self {
        self.hosts.insert(name.to_string(), f);
        self
    }

    pub fn run(
        &mut self,
        program: &Program,
        out: &mut dyn FnMut(String),
        events: &mut dyn FnMut(MemEvent),
    ) -> Result<()> {
        // Pass 1: register definitions.
        for stmt in &program.stmts {
            match stmt {
                Stmt::Fn(f) => {
                    self.fns.insert(f.name.clone(), f.clone());
                }
                Stmt::Impl(i) => self.impls.push(i.clone()),
                Stmt::ExternFn(x) => {
                    self.externs.insert(x.name.clone(), x.clone());
                }
                _ => {}
            }
        }

        let globals = Env::root(0);
        let mut exec = Exec {
            fns: &self.fns,
            impls: &self.impls,
            externs: &self.externs,
            hosts: &mut self.hosts,
            globals: globals.clone(),
            out,
            events,
            next_scope: 1,
            depth: 0,
        };

        exec.emit(MemEvent::EnterScope {
            scope_id: 0,
            parent_scope_id: None,
        });

        // Pass 2: run non-definition statements in source order.
        for stmt in &program.stmts {
            if stmt.is_definition() {
                continue;
            }
            let flow = exec.exec_stmt(stmt, &globals)?;
            if flow.is_return() {
                break;
            }
        }

        // Finally, invoke main() when present.
        if let Some(main) = exec.fns.get("main").cloned() {
            exec.call_fn(&main, None, Vec::new())?;
        }

        exec.emit(MemEvent::ExitScope { scope_id: 0 });
        Ok(())
    }
}

/// Run a program with output and event sinks. Hosts should only call this
/// after `ivy_types::analyze` returned no diagnostics.
pub fn run(
    program: &Program,
    out: &mut dyn FnMut(String),
    events: &mut dyn FnMut(MemEvent),
) -> Result<()> {
    Interpreter::new().run(program, out, events)
}

struct Exec<'a> {
    fns: &'a HashMap<String, FnDef>,
    impls: &'a [ImplBlock],
    externs: &'a HashMap<String, ExternFnDef>,
    hosts: &'a mut HashMap<String, ExternHostFn>,
    globals: Env,
    out: &'a mut dyn FnMut(String),
    events: &'a mut dyn FnMut(MemEvent),
    next_scope: u64,
    depth: u32,
}

impl<'a> Exec<'a> {
    fn emit(&mut self, event: MemEvent) {
        (self.events)(event);
    }

    fn enter_scope(&mut self, parent: &Env) -> Env {
        let id = self.next_scope;
        self.next_scope += 1;
        self.emit(MemEvent::EnterScope {
            scope_id: id,
            parent_scope_id: Some(parent.id()),
        });
        parent.child(id)
    }

    fn declare(&mut self, env: &Env, name: &str, value: Value) {
        self.emit(MemEvent::Declare {
            scope_id: env.id(),
            name: name.to_string(),
            value: EventValue::from_value(&value),
            moved: false,
        });
        env.define(name, value);
    }

    // ======= statements =======

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> Result<ControlFlow> {
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, env)?;
            if flow.is_return() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Value(Value::Null))
    }

    /// Run statements in a fresh child scope, always emitting the exit
    /// event, even when execution fails partway through.
    fn exec_in_scope(
        &mut self,
        stmts: &[Stmt],
        parent: &Env,
        bindings: Vec<(String, Value)>,
    ) -> Result<ControlFlow> {
        let env = self.enter_scope(parent);
        for (name, value) in bindings {
            self.declare(&env, &name, value);
        }
        let result = self.exec_stmts(stmts, &env);
        self.emit(MemEvent::ExitScope { scope_id: env.id() });
        result
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<ControlFlow> {
        match stmt {
            // definitions were registered up front
            Stmt::Fn(_)
            | Stmt::Struct(_)
            | Stmt::Enum(_)
            | Stmt::Trait(_)
            | Stmt::Impl(_)
            | Stmt::ExternFn(_) => Ok(ControlFlow::Value(Value::Null)),

            Stmt::Let(v) => {
                let value = match &v.init {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Null,
                };
                self.declare(env, &v.name, value);
                Ok(ControlFlow::Value(Value::Null))
            }

            Stmt::DestructuringLet(d) => {
                let value = self.eval(&d.init, env)?;
                let items = match value {
                    Value::Tuple(items) => items,
                    other => bail!("cannot destructure non-tuple value: {}", other),
                };
                if items.len() != d.names.len() {
                    bail!(
                        "destructuring expects {} values, got {}",
                        d.names.len(),
                        items.len()
                    );
                }
                for (name, item) in d.names.iter().zip(items) {
                    self.declare(env, name, item);
                }
                Ok(ControlFlow::Value(Value::Null))
            }

            Stmt::Assign(a) => {
                let value = self.eval(&a.value, env)?;
                let snapshot = EventValue::from_value(&value);
                match env.set(&a.name, value) {
                    Some(scope_id) => {
                        self.emit(MemEvent::Update {
                            scope_id,
                            name: a.name.clone(),
                            value: snapshot,
                            moved: false,
                        });
                        Ok(ControlFlow::Value(Value::Null))
                    }
                    None => bail!("undefined variable '{}'", a.name),
                }
            }

            Stmt::If(i) => {
                let cond = self.eval_bool(&i.cond, env)?;
                if cond {
                    self.exec_in_scope(&i.then_block.stmts, env, Vec::new())
                } else if let Some(else_block) = &i.else_block {
                    self.exec_in_scope(&else_block.stmts, env, Vec::new())
                } else {
                    Ok(ControlFlow::Value(Value::Null))
                }
            }

            Stmt::While(w) => {
                loop {
                    if !self.eval_bool(&w.cond, env)? {
                        break;
                    }
                    let flow = self.exec_in_scope(&w.body.stmts, env, Vec::new())?;
                    if flow.is_return() {
                        return Ok(flow);
                    }
                }
                Ok(ControlFlow::Value(Value::Null))
            }

            Stmt::For(f) => {
                let iterable = self.eval(&f.iter, env)?;
                let items: Vec<Value> = match iterable {
                    Value::Array(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => bail!("cannot iterate over value: {}", other),
                };
                // the loop item is rebound fresh each iteration
                for item in items {
                    let flow = self.exec_in_scope(
                        &f.body.stmts,
                        env,
                        vec![(f.item.clone(), item)],
                    )?;
                    if flow.is_return() {
                        return Ok(flow);
                    }
                }
                Ok(ControlFlow::Value(Value::Null))
            }

            Stmt::Return(r) => {
                let value = match &r.value {
                    Some(e) => self.eval(e, env)?,
                    None => Value::Null,
                };
                Ok(ControlFlow::Return(value))
            }

            Stmt::Match(m) => {
                let subject = self.eval(&m.subject, env)?;
                for case in &m.cases {
                    if let Some(bindings) = match_pattern(&case.pat, &subject) {
                        return self.exec_match_case(case, env, bindings);
                    }
                }
                bail!("no match arm matched value: {}", subject)
            }

            Stmt::Expr(e) => {
                self.eval(&e.expr, env)?;
                Ok(ControlFlow::Value(Value::Null))
            }
        }
    }

    fn exec_match_case(
        &mut self,
        case: &MatchCase,
        env: &Env,
        bindings: Vec<(String, Value)>,
    ) -> Result<ControlFlow> {
        self.exec_in_scope(&case.body.stmts, env, bindings)
    }

    fn eval_bool(&mut self, e: &Expr, env: &Env) -> Result<bool> {
        match self.eval(e, env)? {
            Value::Bool(b) => Ok(b),
            other => bail!("condition must be a bool, got: {}", other),
        }
    }

    // ======= expressions =======

    fn eval(&mut self, e: &Expr, env: &Env) -> Result<Value> {
        match e {
            Expr::Literal(lit, _) => Ok(lit_value(lit)),

            Expr::Ident(id) => self.read_ident(&id.name, env, true),

            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.eval(lhs, env)?;
                let r = self.eval(rhs, env)?;
                eval_binop(*op, l, r)
            }

            Expr::Call { callee, args, .. } => self.eval_call(callee, args, env),

            Expr::Member { obj, field, .. } => {
                let value = self.eval(obj, env)?;
                match value {
                    Value::Struct { fields, .. } => fields
                        .get(field)
                        .cloned()
                        .ok_or_else(|| anyhow!("no field '{}' on struct value", field)),
                    other => bail!("cannot access field '{}' on value: {}", field, other),
                }
            }

            Expr::Index { obj, index, .. } => {
                let value = self.eval(obj, env)?;
                let idx = match self.eval(index, env)? {
                    Value::Int(n) => n,
                    other => bail!("index must be an int, got: {}", other),
                };
                match value {
                    Value::Array(items) => {
                        usize::try_from(idx)
                            .ok()
                            .and_then(|i| items.get(i).cloned())
                            .ok_or_else(|| {
                                anyhow!("index {} out of bounds (len {})", idx, items.len())
                            })
                    }
                    Value::Str(s) => usize::try_from(idx)
                        .ok()
                        .and_then(|i| s.chars().nth(i))
                        .map(|c| Value::Str(c.to_string()))
                        .ok_or_else(|| anyhow!("string index {} out of bounds", idx)),
                    other => bail!("cannot index value: {}", other),
                }
            }

            Expr::Array { elems, .. } => {
                let mut items = Vec::with_capacity(elems.len());
                for e in elems {
                    items.push(self.eval(e, env)?);
                }
                Ok(Value::Array(items))
            }

            Expr::Tuple { elems, .. } => {
                let mut items = Vec::with_capacity(elems.len());
                for e in elems {
                    items.push(self.eval(e, env)?);
                }
                Ok(Value::Tuple(items))
            }

            Expr::StructInit { name, fields, .. } => {
                let mut values = HashMap::new();
                for f in fields {
                    let v = self.eval(&f.value, env)?;
                    values.insert(f.name.clone(), v);
                }
                Ok(Value::Struct {
                    name: name.clone(),
                    fields: values,
                })
            }

            Expr::EnumVariant {
                enum_name,
                variant,
                payload,
                ..
            } => {
                let payload = match payload {
                    VariantPayload::Unit => EnumPayload::None,
                    VariantPayload::Tuple(args) => {
                        let mut values = Vec::with_capacity(args.len());
                        for a in args {
                            values.push(self.eval(a, env)?);
                        }
                        match values.len() {
                            0 => EnumPayload::None,
                            1 => EnumPayload::Single(Box::new(values.pop().unwrap())),
                            _ => EnumPayload::Single(Box::new(Value::Tuple(values))),
                        }
                    }
                    VariantPayload::Struct(inits) => {
                        let mut values = HashMap::new();
                        for f in inits {
                            let v = self.eval(&f.value, env)?;
                            values.insert(f.name.clone(), v);
                        }
                        EnumPayload::Fields(values)
                    }
                };
                Ok(Value::Enum {
                    enum_type: enum_name.clone(),
                    variant: variant.clone(),
                    payload,
                })
            }

            // borrows read without consuming: no MOVE event
            Expr::Borrow { expr, .. } => match expr.as_ref() {
                Expr::Ident(id) => self.read_ident(&id.name, env, false),
                other => self.eval(other, env),
            },

            Expr::Lambda { params, body, .. } => Ok(Value::Closure {
                params: params.clone(),
                body: body.clone(),
                env: env.clone(),
            }),
        }
    }

    /// Read an identifier. Non-primitive reads emit a MOVE event unless
    /// `track` is false (borrows, callee lookups).
    fn read_ident(&mut self, name: &str, env: &Env, track: bool) -> Result<Value> {
        if let Some((value, scope_id)) = env.get(name) {
            if track && !value.is_primitive() {
                self.emit(MemEvent::Move {
                    scope_id,
                    name: name.to_string(),
                    value: EventValue::from_value(&value),
                    moved: true,
                });
            }
            return Ok(value);
        }
        if self.fns.contains_key(name)
            || self.externs.contains_key(name)
            || is_builtin(name)
        {
            return Ok(Value::FnRef(name.to_string()));
        }
        bail!("undefined variable '{}'", name)
    }

    // ======= calls =======

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> Result<Value> {
        self.depth += 1;
        if self.depth > MAX_CALL_DEPTH {
            self.depth -= 1;
            bail!("maximum call depth exceeded (limit: {})", MAX_CALL_DEPTH);
        }
        let result = self.eval_call_inner(callee, args, env);
        self.depth -= 1;
        result
    }

    fn eval_call_inner(&mut self, callee: &Expr, args: &[Expr], env: &Env) -> Result<Value> {
        // method call: dispatch on the receiver's type tag
        if let Expr::Member { obj, field, .. } = callee {
            let receiver = self.eval(obj, env)?;
            let arg_values = self.eval_args(args, env)?;
            return self.call_method(receiver, field, arg_values);
        }

        let name = match callee {
            Expr::Ident(id) => id.name.clone(),
            other => {
                // e.g. an immediately-invoked lambda
                let value = self.eval(other, env)?;
                let arg_values = self.eval_args(args, env)?;
                return self.call_value(value, arg_values);
            }
        };

        // local bindings (closures) shadow function names; the callee
        // lookup itself is by name, not an identifier read
        if let Some((value, _)) = env.get(&name) {
            let arg_values = self.eval_args(args, env)?;
            return self.call_value(value, arg_values);
        }

        if let Some(decl) = self.fns.get(&name).cloned() {
            let arg_values = self.eval_args(args, env)?;
            return self.call_fn(&decl, None, arg_values);
        }

        if is_builtin(&name) {
            let arg_values = self.eval_args(args, env)?;
            return self.call_builtin(&name, arg_values);
        }

        if self.externs.contains_key(&name) {
            let arg_values = self.eval_args(args, env)?;
            return Ok(self.call_extern(&name, &arg_values));
        }

        bail!("undefined function '{}'", name)
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.eval(a, env)?);
        }
        Ok(values)
    }

    fn call_value(&mut self, value: Value, args: Vec<Value>) -> Result<Value> {
        match value {
            Value::Closure { params, body, env } => {
                if args.len() != params.len() {
                    bail!(
                        "closure expects {} argument(s), got {}",
                        params.len(),
                        args.len()
                    );
                }
                let call_env = self.enter_scope(&env);
                for (p, v) in params.iter().zip(args) {
                    self.declare(&call_env, p, v);
                }
                let flow = self.exec_stmts(&body.stmts, &call_env);
                self.emit(MemEvent::ExitScope {
                    scope_id: call_env.id(),
                });
                Ok(flow?.into_value())
            }
            Value::FnRef(name) => {
                if let Some(decl) = self.fns.get(&name).cloned() {
                    return self.call_fn(&decl, None, args);
                }
                if is_builtin(&name) {
                    return self.call_builtin(&name, args);
                }
                if self.externs.contains_key(&name) {
                    return Ok(self.call_extern(&name, &args));
                }
                bail!("undefined function '{}'", name)
            }
            other => bail!("cannot call non-function value: {}", other),
        }
    }

    /// Call a named function. Function bodies close over the global scope.
    fn call_fn(&mut self, decl: &FnDef, this: Option<Value>, args: Vec<Value>) -> Result<Value> {
        if args.len() != decl.params.len() {
            bail!(
                "'{}' expects {} argument(s), got {}",
                decl.name,
                decl.params.len(),
                args.len()
            );
        }
        let globals = self.globals.clone();
        let call_env = self.enter_scope(&globals);
        if let Some(receiver) = this {
            self.declare(&call_env, "this", receiver);
        }
        for (p, v) in decl.params.iter().zip(args) {
            self.declare(&call_env, &p.name, v);
        }
        let flow = self.exec_stmts(&decl.body.stmts, &call_env);
        self.emit(MemEvent::ExitScope {
            scope_id: call_env.id(),
        });
        Ok(flow?.into_value())
    }

    /// Dynamic trait-method dispatch: the receiver's tag is the struct's
    /// erased base name, so the first impl whose target type string starts
    /// with the tag and contains the method supplies the body.
    fn call_method(&mut self, receiver: Value, method: &str, args: Vec<Value>) -> Result<Value> {
        let tag = match &receiver {
            Value::Struct { name, .. } => name.clone(),
            other => bail!("cannot call method '{}' on value: {}", method, other),
        };
        let decl = self.impls.iter().find_map(|i| {
            if i.target_ty.starts_with(tag.as_str()) {
                i.methods.iter().find(|m| m.name == method).cloned()
            } else {
                None
            }
        });
        match decl {
            Some(decl) => self.call_fn(&decl, Some(receiver), args),
            None => bail!("method '{}' not found for type '{}'", method, tag),
        }
    }

    // ======= builtins / externs =======

    fn call_builtin(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value> {
        let arity_err = |expected: usize, got: usize| {
            anyhow!("'{}' expects {} argument(s), got {}", name, expected, got)
        };
        match name {
            "print" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                let line = args[0].to_string();
                (self.out)(line);
                Ok(Value::Null)
            }
            "len" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                match &args[0] {
                    Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    other => bail!("len expects an array or string, got: {}", other),
                }
            }
            "range" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                match args[0] {
                    Value::Int(n) => {
                        Ok(Value::Array((0..n.max(0)).map(Value::Int).collect()))
                    }
                    ref other => bail!("range expects an int, got: {}", other),
                }
            }
            "to_string" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                Ok(Value::Str(args[0].to_string()))
            }
            "to_int" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                match args.pop().unwrap() {
                    Value::Int(n) => Ok(Value::Int(n)),
                    Value::Bool(b) => Ok(Value::Int(b as i64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| anyhow!("cannot convert '{}' to int", s)),
                    other => bail!("cannot convert value to int: {}", other),
                }
            }
            "alert" => {
                if args.len() != 1 {
                    return Err(arity_err(1, args.len()));
                }
                if self.hosts.contains_key("alert") {
                    return Ok(self.call_extern("alert", &args));
                }
                let msg = args[0].to_string();
                (self.out)(format!("[ALERT] {}", msg));
                Ok(Value::Null)
            }
            _ => bail!("undefined function '{}'", name),
        }
    }

    /// Call a declared extern. Without a host binding, externs return null.
    fn call_extern(&mut self, name: &str, args: &[Value]) -> Value {
        match self.hosts.get_mut(name) {
            Some(f) => f(args),
            None => Value::Null,
        }
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "print" | "len" | "range" | "to_string" | "to_int" | "alert"
    )
}

fn lit_value(lit: &Lit) -> Value {
    match lit {
        Lit::Int(n) => Value::Int(*n),
        Lit::Str(s) => Value::Str(s.clone()),
        Lit::Bool(b) => Value::Bool(*b),
    }
}

fn eval_binop(op: BinOp, l: Value, r: Value) -> Result<Value> {
    use BinOp::*;
    match op {
        // `+` concatenates as soon as either side is a string
        Add => match (l, r) {
            (Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
            (a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (a, b) => bail!("unsupported operands for '+': {} and {}", a, b),
        },
        Sub | Mul | Div => match (l, r) {
            (Value::Int(a), Value::Int(b)) => match op {
                Sub => Ok(Value::Int(a.wrapping_sub(b))),
                Mul => Ok(Value::Int(a.wrapping_mul(b))),
                _ => {
                    if b == 0 {
                        bail!("division by zero");
                    }
                    Ok(Value::Int(a.wrapping_div(b)))
                }
            },
            (a, b) => bail!("arithmetic expects ints, got: {} and {}", a, b),
        },
        Eq => Ok(Value::Bool(values_equal(&l, &r))),
        Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        Lt | Le | Gt | Ge => {
            let ord = match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => bail!("comparison expects two ints or two strings"),
            };
            let res = match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(res))
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Array(xs), Value::Array(ys)) | (Value::Tuple(xs), Value::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (
            Value::Struct { name: na, fields: fa },
            Value::Struct { name: nb, fields: fb },
        ) => {
            na == nb
                && fa.len() == fb.len()
                && fa
                    .iter()
                    .all(|(k, v)| fb.get(k).is_some_and(|w| values_equal(v, w)))
        }
        (
            Value::Enum {
                enum_type: ea,
                variant: va,
                payload: pa,
            },
            Value::Enum {
                enum_type: eb,
                variant: vb,
                payload: pb,
            },
        ) => ea == eb && va == vb && payloads_equal(pa, pb),
        _ => false,
    }
}

fn payloads_equal(a: &EnumPayload, b: &EnumPayload) -> bool {
    match (a, b) {
        (EnumPayload::None, EnumPayload::None) => true,
        (EnumPayload::Single(x), EnumPayload::Single(y)) => values_equal(x, y),
        (EnumPayload::Fields(fa), EnumPayload::Fields(fb)) => {
            fa.len() == fb.len()
                && fa
                    .iter()
                    .all(|(k, v)| fb.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => false,
    }
}

/// Try a pattern against a value, producing the arm's bindings on success.
fn match_pattern(pat: &Pattern, value: &Value) -> Option<Vec<(String, Value)>> {
    match pat {
        Pattern::Wildcard(_) => Some(vec![]),

        Pattern::Ident(id) => Some(vec![(id.name.clone(), value.clone())]),

        Pattern::Literal(lit, _) => {
            let matched = match (lit, value) {
                (Lit::Int(a), Value::Int(b)) => a == b,
                (Lit::Str(a), Value::Str(b)) => a == b,
                (Lit::Bool(a), Value::Bool(b)) => a == b,
                _ => false,
            };
            if matched {
                Some(vec![])
            } else {
                None
            }
        }

        Pattern::Variant {
            enum_name,
            variant,
            binding,
            ..
        } => {
            let Value::Enum {
                enum_type,
                variant: value_variant,
                payload,
            } = value
            else {
                return None;
            };
            if enum_type != enum_name || value_variant != variant {
                return None;
            }
            match binding {
                VariantBinding::Unit => Some(vec![]),
                VariantBinding::Inner(name) => match payload {
                    EnumPayload::Single(inner) => {
                        Some(vec![(name.clone(), inner.as_ref().clone())])
                    }
                    _ => None,
                },
                VariantBinding::Fields(names) => match payload {
                    EnumPayload::Fields(fields) => {
                        let mut bindings = Vec::with_capacity(names.len());
                        for name in names {
                            bindings.push((name.clone(), fields.get(name)?.clone()));
                        }
                        Some(bindings)
                    }
                    _ => None,
                },
            }
        }
    }
}
