//! Two-pass semantic analysis: a registration pass over top-level
//! definitions, then a full walk that type-checks statements and enforces
//! the move/mutability discipline. Diagnostics accumulate; the analyzer
//! never aborts.

use std::collections::HashMap;

use ivy_ast::ast::{
    Block, Expr, ExternFnDef, FnDef, ImplBlock, Lit, MatchCase, Pattern, Program, Stmt,
    StructDef, EnumDef, TraitDef, VariantBinding, VariantFields, VariantPayload,
};
use ivy_ast::pos::Pos;

use crate::scope::ScopeStack;
use crate::types::{self, ANY, NULL};

/// One analyzer finding. Never fatal; collected into a list.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    UndefinedVariable { name: String, pos: Pos },
    UndefinedFunction { name: String, pos: Pos },
    UseOfMoved { name: String, pos: Pos },
    AssignToMoved { name: String, pos: Pos },
    ImmutableAssignment { name: String, pos: Pos },
    TypeMismatch { context: String, expected: String, found: String, pos: Pos },
    ArityMismatch { name: String, expected: usize, found: usize, pos: Pos },
    DuplicateStruct { name: String, pos: Pos },
    NonIterable { ty: String, pos: Pos },
    InvalidIndex { ty: String, pos: Pos },
    IndexNotInt { found: String, pos: Pos },
    UnknownStruct { name: String, pos: Pos },
    MissingField { struct_name: String, field: String, pos: Pos },
    UnknownField { ty: String, field: String, pos: Pos },
    UnknownEnum { name: String, pos: Pos },
    UnknownVariant { enum_name: String, variant: String, pos: Pos },
    EnumPatternMismatch { expected: String, found: String, pos: Pos },
    MethodNotFound { method: String, ty: String, pos: Pos },
    UnknownTrait { name: String, pos: Pos },
    NotCallable { name: String, pos: Pos },
    ArrayElementMismatch { expected: String, found: String, pos: Pos },
    DestructureMismatch { found: String, pos: Pos },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UndefinedVariable { name, pos } => {
                write!(f, "Undefined variable '{}' at {}", name, pos)
            }
            Diagnostic::UndefinedFunction { name, pos } => {
                write!(f, "Undefined function '{}' at {}", name, pos)
            }
            Diagnostic::UseOfMoved { name, pos } => {
                write!(f, "Use of moved value '{}' at {}", name, pos)
            }
            Diagnostic::AssignToMoved { name, pos } => {
                write!(f, "Assignment to moved value '{}' at {}", name, pos)
            }
            Diagnostic::ImmutableAssignment { name, pos } => {
                write!(
                    f,
                    "Cannot assign to immutable variable '{}' at {}",
                    name, pos
                )
            }
            Diagnostic::TypeMismatch {
                context,
                expected,
                found,
                pos,
            } => {
                write!(
                    f,
                    "Type mismatch {}: expected {}, found {} at {}",
                    context, expected, found, pos
                )
            }
            Diagnostic::ArityMismatch {
                name,
                expected,
                found,
                pos,
            } => {
                write!(
                    f,
                    "'{}' expects {} argument(s), found {} at {}",
                    name, expected, found, pos
                )
            }
            Diagnostic::DuplicateStruct { name, pos } => {
                write!(f, "Duplicate struct definition '{}' at {}", name, pos)
            }
            Diagnostic::NonIterable { ty, pos } => {
                write!(f, "Cannot iterate over type '{}' at {}", ty, pos)
            }
            Diagnostic::InvalidIndex { ty, pos } => {
                write!(f, "Cannot index type '{}' at {}", ty, pos)
            }
            Diagnostic::IndexNotInt { found, pos } => {
                write!(f, "Index must be int, found '{}' at {}", found, pos)
            }
            Diagnostic::UnknownStruct { name, pos } => {
                write!(f, "Unknown struct '{}' at {}", name, pos)
            }
            Diagnostic::MissingField {
                struct_name,
                field,
                pos,
            } => {
                write!(
                    f,
                    "Missing field '{}' in '{}' at {}",
                    field, struct_name, pos
                )
            }
            Diagnostic::UnknownField { ty, field, pos } => {
                write!(f, "Unknown field '{}' on type '{}' at {}", field, ty, pos)
            }
            Diagnostic::UnknownEnum { name, pos } => {
                write!(f, "Unknown enum '{}' at {}", name, pos)
            }
            Diagnostic::UnknownVariant {
                enum_name,
                variant,
                pos,
            } => {
                write!(
                    f,
                    "Unknown variant '{}::{}' at {}",
                    enum_name, variant, pos
                )
            }
            Diagnostic::EnumPatternMismatch {
                expected,
                found,
                pos,
            } => {
                write!(
                    f,
                    "Pattern expects '{}' but subject has type '{}' at {}",
                    expected, found, pos
                )
            }
            Diagnostic::MethodNotFound { method, ty, pos } => {
                write!(
                    f,
                    "Method '{}' not found for type '{}' at {}",
                    method, ty, pos
                )
            }
            Diagnostic::UnknownTrait { name, pos } => {
                write!(f, "Unknown trait '{}' at {}", name, pos)
            }
            Diagnostic::NotCallable { name, pos } => {
                write!(f, "'{}' is not callable at {}", name, pos)
            }
            Diagnostic::ArrayElementMismatch {
                expected,
                found,
                pos,
            } => {
                write!(
                    f,
                    "Array elements must share one type: expected {}, found {} at {}",
                    expected, found, pos
                )
            }
            Diagnostic::DestructureMismatch { found, pos } => {
                write!(
                    f,
                    "Cannot destructure non-tuple type '{}' at {}",
                    found, pos
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
struct FnSig {
    params: Vec<String>,
    ret: String,
}

/// Run both analysis passes over a program.
pub fn analyze(program: &Program) -> Vec<Diagnostic> {
    let mut a = Analyzer::new();
    a.register(program);
    a.check(program);
    a.diags
}

struct Analyzer {
    structs: HashMap<String, StructDef>,
    enums: HashMap<String, EnumDef>,
    traits: HashMap<String, TraitDef>,
    impls: Vec<ImplBlock>,
    fns: HashMap<String, FnSig>,
    scopes: ScopeStack,
    /// Declared return types of the enclosing functions; `None` entries are
    /// lambdas and functions without an annotation.
    ret_stack: Vec<Option<String>>,
    diags: Vec<Diagnostic>,
}

impl Analyzer {
    fn new() -> Self {
        let mut fns = HashMap::new();
        // standard library signatures, injected up front
        fns.insert("print".into(), sig(&[ANY], NULL));
        fns.insert("len".into(), sig(&[ANY], "int"));
        fns.insert("range".into(), sig(&["int"], "[int]"));
        fns.insert("to_string".into(), sig(&[ANY], "str"));
        fns.insert("to_int".into(), sig(&[ANY], "int"));
        fns.insert("alert".into(), sig(&["str"], NULL));
        Self {
            structs: HashMap::new(),
            enums: HashMap::new(),
            traits: HashMap::new(),
            impls: Vec::new(),
            fns,
            scopes: ScopeStack::new(),
            ret_stack: Vec::new(),
            diags: Vec::new(),
        }
    }

    // ======= pass A: registration =======

    fn register(&mut self, program: &Program) {
        for stmt in &program.stmts {
            match stmt {
                Stmt::Fn(f) => {
                    self.fns.insert(f.name.clone(), fn_sig(f));
                }
                Stmt::ExternFn(x) => {
                    self.fns.insert(x.name.clone(), extern_sig(x));
                }
                Stmt::Struct(s) => {
                    if self.structs.contains_key(&s.name) {
                        self.diags.push(Diagnostic::DuplicateStruct {
                            name: s.name.clone(),
                            pos: s.pos,
                        });
                    } else {
                        self.structs.insert(s.name.clone(), s.clone());
                    }
                }
                Stmt::Enum(e) => {
                    self.enums.insert(e.name.clone(), e.clone());
                }
                Stmt::Trait(t) => {
                    self.traits.insert(t.name.clone(), t.clone());
                }
                Stmt::Impl(i) => {
                    self.impls.push(i.clone());
                }
                _ => {}
            }
        }
    }

    // ======= pass B: statement walk =======

    fn check(&mut self, program: &Program) {
        for stmt in &program.stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Fn(f) => self.check_fn(f, None),
            Stmt::Impl(i) => {
                if !self.traits.contains_key(&i.trait_name) {
                    self.diags.push(Diagnostic::UnknownTrait {
                        name: i.trait_name.clone(),
                        pos: i.pos,
                    });
                }
                let target = i.target_ty.clone();
                for m in &i.methods {
                    self.check_fn(m, Some(target.clone()));
                }
            }
            Stmt::Struct(_) | Stmt::Enum(_) | Stmt::Trait(_) | Stmt::ExternFn(_) => {}

            Stmt::Let(v) => {
                let init_ty = v.init.as_ref().map(|e| {
                    let t = self.type_of(e);
                    self.consume(e);
                    t
                });
                if let (Some(decl), Some(init)) = (&v.ty, &init_ty) {
                    if !types::matches(decl, init) {
                        self.diags.push(Diagnostic::TypeMismatch {
                            context: format!("for '{}'", v.name),
                            expected: decl.clone(),
                            found: init.clone(),
                            pos: v.pos,
                        });
                    }
                }
                let ty = v
                    .ty
                    .clone()
                    .or(init_ty)
                    .unwrap_or_else(|| ANY.to_string());
                self.scopes.declare(&v.name, ty, v.mutable);
            }

            Stmt::DestructuringLet(d) => {
                let init_ty = self.type_of(&d.init);
                self.consume(&d.init);
                match types::tuple_elems(&init_ty) {
                    Some(elems) => {
                        if elems.len() != d.names.len() {
                            self.diags.push(Diagnostic::ArityMismatch {
                                name: "destructuring".into(),
                                expected: d.names.len(),
                                found: elems.len(),
                                pos: d.pos,
                            });
                        }
                        let elems: Vec<String> =
                            elems.into_iter().map(|s| s.to_string()).collect();
                        for (i, name) in d.names.iter().enumerate() {
                            let ty = elems.get(i).cloned().unwrap_or_else(|| ANY.into());
                            self.scopes.declare(name, ty, d.mutable);
                        }
                    }
                    None if init_ty == ANY => {
                        for name in &d.names {
                            self.scopes.declare(name, ANY.into(), d.mutable);
                        }
                    }
                    None => {
                        self.diags.push(Diagnostic::DestructureMismatch {
                            found: init_ty,
                            pos: d.pos,
                        });
                        for name in &d.names {
                            self.scopes.declare(name, ANY.into(), d.mutable);
                        }
                    }
                }
            }

            Stmt::Assign(a) => {
                let value_ty = self.type_of(&a.value);
                self.consume(&a.value);
                match self.scopes.get(&a.name) {
                    None => self.diags.push(Diagnostic::UndefinedVariable {
                        name: a.name.clone(),
                        pos: a.pos,
                    }),
                    Some(b) => {
                        let (moved, mutable, ty) = (b.moved, b.mutable, b.ty.clone());
                        if moved {
                            self.diags.push(Diagnostic::AssignToMoved {
                                name: a.name.clone(),
                                pos: a.pos,
                            });
                        } else {
                            if !mutable {
                                self.diags.push(Diagnostic::ImmutableAssignment {
                                    name: a.name.clone(),
                                    pos: a.pos,
                                });
                            }
                            if !types::matches(&ty, &value_ty) {
                                self.diags.push(Diagnostic::TypeMismatch {
                                    context: format!("for '{}'", a.name),
                                    expected: ty,
                                    found: value_ty,
                                    pos: a.pos,
                                });
                            }
                        }
                    }
                }
            }

            Stmt::If(i) => {
                self.expect_bool(&i.cond, "if condition");
                self.check_block(&i.then_block);
                if let Some(e) = &i.else_block {
                    self.check_block(e);
                }
            }

            Stmt::While(w) => {
                self.expect_bool(&w.cond, "while condition");
                self.check_block(&w.body);
            }

            Stmt::For(f) => {
                let iter_ty = self.type_of(&f.iter);
                let item_ty = if let Some(elem) = types::list_elem(&iter_ty) {
                    elem.to_string()
                } else if iter_ty == "str" {
                    "str".to_string()
                } else if iter_ty == ANY {
                    ANY.to_string()
                } else {
                    self.diags.push(Diagnostic::NonIterable {
                        ty: iter_ty.clone(),
                        pos: f.pos,
                    });
                    ANY.to_string()
                };
                self.scopes.push();
                self.scopes.declare(&f.item, item_ty, false);
                for s in &f.body.stmts {
                    self.check_stmt(s);
                }
                self.scopes.pop();
            }

            Stmt::Return(r) => {
                let found = match &r.value {
                    Some(e) => self.type_of(e),
                    None => NULL.to_string(),
                };
                if let Some(Some(expected)) = self.ret_stack.last() {
                    if !types::matches(expected, &found) {
                        self.diags.push(Diagnostic::TypeMismatch {
                            context: "in return value".into(),
                            expected: expected.clone(),
                            found,
                            pos: r.pos,
                        });
                    }
                }
            }

            Stmt::Match(m) => {
                let subject_ty = self.type_of(&m.subject);
                self.consume(&m.subject);
                for case in &m.cases {
                    self.check_case(case, &subject_ty);
                }
            }

            Stmt::Expr(e) => {
                let _ = self.type_of(&e.expr);
            }
        }
    }

    fn check_fn(&mut self, f: &FnDef, this_ty: Option<String>) {
        self.scopes.push();
        if let Some(t) = this_ty {
            self.scopes.declare("this", t, false);
        }
        for p in &f.params {
            self.scopes.declare(&p.name, p.ty.clone(), false);
        }
        self.ret_stack.push(f.ret_ty.clone());
        for s in &f.body.stmts {
            self.check_stmt(s);
        }
        self.ret_stack.pop();
        self.scopes.pop();
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push();
        for s in &block.stmts {
            self.check_stmt(s);
        }
        self.scopes.pop();
    }

    fn check_case(&mut self, case: &MatchCase, subject_ty: &str) {
        self.scopes.push();
        match &case.pat {
            Pattern::Wildcard(_) => {}
            Pattern::Ident(id) => {
                self.scopes.declare(&id.name, subject_ty.to_string(), false);
            }
            Pattern::Literal(lit, pos) => {
                let lit_ty = lit_type(lit);
                if !types::matches(subject_ty, lit_ty) {
                    self.diags.push(Diagnostic::TypeMismatch {
                        context: "in match pattern".into(),
                        expected: subject_ty.to_string(),
                        found: lit_ty.to_string(),
                        pos: *pos,
                    });
                }
            }
            Pattern::Variant {
                enum_name,
                variant,
                binding,
                pos,
            } => {
                if enum_name == "Option" || enum_name == "Result" {
                    if !subject_ty.starts_with(enum_name.as_str()) && subject_ty != ANY {
                        self.diags.push(Diagnostic::EnumPatternMismatch {
                            expected: enum_name.clone(),
                            found: subject_ty.to_string(),
                            pos: *pos,
                        });
                    }
                    if let VariantBinding::Inner(name) = binding {
                        let args = types::generic_args(subject_ty).unwrap_or_default();
                        let inner_ty = match variant.as_str() {
                            // Err binds the error slot when it is present
                            "Err" => args.get(1).or_else(|| args.first()),
                            _ => args.first(),
                        };
                        let inner_ty = inner_ty.map(|s| s.to_string()).unwrap_or_else(|| ANY.into());
                        self.scopes.declare(name, inner_ty, false);
                    }
                } else {
                    if subject_ty != enum_name.as_str() && subject_ty != ANY {
                        self.diags.push(Diagnostic::EnumPatternMismatch {
                            expected: enum_name.clone(),
                            found: subject_ty.to_string(),
                            pos: *pos,
                        });
                    }
                    match self.enums.get(enum_name) {
                        None => self.diags.push(Diagnostic::UnknownEnum {
                            name: enum_name.clone(),
                            pos: *pos,
                        }),
                        Some(def) => {
                            if !def.variants.iter().any(|v| &v.name == variant) {
                                self.diags.push(Diagnostic::UnknownVariant {
                                    enum_name: enum_name.clone(),
                                    variant: variant.clone(),
                                    pos: *pos,
                                });
                            }
                        }
                    }
                    if let VariantBinding::Fields(names) = binding {
                        // destructured variant fields bind loosely as `any`
                        for name in names {
                            self.scopes.declare(name, ANY.into(), false);
                        }
                    }
                }
            }
        }
        for s in &case.body.stmts {
            self.check_stmt(s);
        }
        self.scopes.pop();
    }

    // ======= expressions =======

    fn expect_bool(&mut self, e: &Expr, context: &str) {
        let ty = self.type_of(e);
        if !types::matches(&ty, "bool") {
            self.diags.push(Diagnostic::TypeMismatch {
                context: format!("in {}", context),
                expected: "bool".into(),
                found: ty,
                pos: e.pos(),
            });
        }
    }

    /// Consume the source binding when the expression is a bare identifier
    /// of non-primitive type. Called only at the consuming positions:
    /// var-decl initializers, assignment values, call arguments, struct-init
    /// field values, and match subjects.
    fn consume(&mut self, e: &Expr) {
        if let Expr::Ident(id) = e {
            self.scopes.mark_moved(&id.name);
        }
    }

    /// Compute an expression's type, reporting diagnostics along the way.
    fn type_of(&mut self, e: &Expr) -> String {
        match e {
            Expr::Literal(lit, _) => lit_type(lit).to_string(),

            Expr::Ident(id) => match self.scopes.get(&id.name) {
                Some(b) => {
                    let ty = b.ty.clone();
                    if b.moved {
                        self.diags.push(Diagnostic::UseOfMoved {
                            name: id.name.clone(),
                            pos: id.pos,
                        });
                    }
                    ty
                }
                None => {
                    if self.fns.contains_key(&id.name) {
                        "fn".to_string()
                    } else {
                        self.diags.push(Diagnostic::UndefinedVariable {
                            name: id.name.clone(),
                            pos: id.pos,
                        });
                        ANY.to_string()
                    }
                }
            },

            Expr::Binary { op, lhs, rhs, pos } => {
                use ivy_ast::ast::BinOp::*;
                let lt = self.type_of(lhs);
                let rt = self.type_of(rhs);
                match op {
                    Eq | Ne | Lt | Le | Gt | Ge => "bool".to_string(),
                    Add if lt == "str" || rt == "str" => "str".to_string(),
                    Add | Sub | Mul | Div => {
                        if types::matches(&lt, &rt) {
                            types::resolve(&lt, &rt).to_string()
                        } else {
                            self.diags.push(Diagnostic::TypeMismatch {
                                context: "in arithmetic".into(),
                                expected: lt,
                                found: rt,
                                pos: *pos,
                            });
                            ANY.to_string()
                        }
                    }
                }
            }

            Expr::Call { callee, args, pos } => self.type_of_call(callee, args, *pos),

            Expr::Member { obj, field, pos } => {
                let obj_ty = self.type_of(obj);
                if obj_ty == ANY {
                    return ANY.to_string();
                }
                let base = types::base_name(&obj_ty).to_string();
                match self.structs.get(&base) {
                    Some(def) => match def.fields.iter().find(|f| &f.name == field) {
                        Some(fd) => {
                            // a field declared as the struct's generic
                            // parameter takes its type from the instance
                            if def.type_param.as_deref() == Some(fd.ty.as_str()) {
                                types::generic_args(&obj_ty)
                                    .and_then(|args| args.first().map(|s| s.to_string()))
                                    .unwrap_or_else(|| ANY.to_string())
                            } else {
                                fd.ty.clone()
                            }
                        }
                        None => {
                            self.diags.push(Diagnostic::UnknownField {
                                ty: obj_ty.clone(),
                                field: field.clone(),
                                pos: *pos,
                            });
                            ANY.to_string()
                        }
                    },
                    None => {
                        self.diags.push(Diagnostic::UnknownField {
                            ty: obj_ty.clone(),
                            field: field.clone(),
                            pos: *pos,
                        });
                        ANY.to_string()
                    }
                }
            }

            Expr::Index { obj, index, pos } => {
                let obj_ty = self.type_of(obj);
                let idx_ty = self.type_of(index);
                if !types::matches(&idx_ty, "int") {
                    self.diags.push(Diagnostic::IndexNotInt {
                        found: idx_ty,
                        pos: *pos,
                    });
                }
                if let Some(elem) = types::list_elem(&obj_ty) {
                    elem.to_string()
                } else if obj_ty == "str" {
                    "str".to_string()
                } else if obj_ty == ANY {
                    ANY.to_string()
                } else {
                    self.diags.push(Diagnostic::InvalidIndex {
                        ty: obj_ty,
                        pos: *pos,
                    });
                    ANY.to_string()
                }
            }

            Expr::Array { elems, .. } => {
                if elems.is_empty() {
                    return format!("[{}]", ANY);
                }
                let first = self.type_of(&elems[0]);
                for e in &elems[1..] {
                    let t = self.type_of(e);
                    if !types::matches(&first, &t) {
                        self.diags.push(Diagnostic::ArrayElementMismatch {
                            expected: first.clone(),
                            found: t,
                            pos: e.pos(),
                        });
                    }
                }
                format!("[{}]", first)
            }

            Expr::Tuple { elems, .. } => {
                let tys: Vec<String> = elems.iter().map(|e| self.type_of(e)).collect();
                format!("({})", tys.join(", "))
            }

            Expr::StructInit { name, fields, pos } => {
                let def = match self.structs.get(name) {
                    Some(d) => d.clone(),
                    None => {
                        self.diags.push(Diagnostic::UnknownStruct {
                            name: name.clone(),
                            pos: *pos,
                        });
                        for f in fields {
                            let _ = self.type_of(&f.value);
                            self.consume(&f.value);
                        }
                        return ANY.to_string();
                    }
                };

                for fd in &def.fields {
                    if !fields.iter().any(|f| f.name == fd.name) {
                        self.diags.push(Diagnostic::MissingField {
                            struct_name: name.clone(),
                            field: fd.name.clone(),
                            pos: *pos,
                        });
                    }
                }

                // infer the single generic argument from any field declared
                // with the parameter's type
                let mut inferred: Option<String> = None;
                for f in fields {
                    let val_ty = self.type_of(&f.value);
                    self.consume(&f.value);
                    match def.fields.iter().find(|fd| fd.name == f.name) {
                        None => self.diags.push(Diagnostic::UnknownField {
                            ty: name.clone(),
                            field: f.name.clone(),
                            pos: f.value.pos(),
                        }),
                        Some(fd) => {
                            if def.type_param.as_deref() == Some(fd.ty.as_str()) {
                                if inferred.is_none() && val_ty != ANY {
                                    inferred = Some(val_ty);
                                }
                            } else if !types::matches(&fd.ty, &val_ty) {
                                self.diags.push(Diagnostic::TypeMismatch {
                                    context: format!("for field '{}'", f.name),
                                    expected: fd.ty.clone(),
                                    found: val_ty,
                                    pos: f.value.pos(),
                                });
                            }
                        }
                    }
                }

                match (def.type_param.as_ref(), inferred) {
                    (Some(_), Some(arg)) => format!("{}<{}>", name, arg),
                    _ => name.clone(),
                }
            }

            Expr::EnumVariant {
                enum_name,
                variant,
                payload,
                pos,
            } => self.type_of_variant(enum_name, variant, payload, *pos),

            Expr::Borrow { expr, .. } => self.type_of(expr),

            Expr::Lambda { params, body, .. } => {
                self.scopes.push();
                for p in params {
                    self.scopes.declare(p, ANY.into(), false);
                }
                self.ret_stack.push(None);
                for s in &body.stmts {
                    self.check_stmt(s);
                }
                self.ret_stack.pop();
                self.scopes.pop();
                "fn".to_string()
            }
        }
    }

    fn type_of_call(&mut self, callee: &Expr, args: &[Expr], pos: Pos) -> String {
        match callee {
            Expr::Ident(id) => {
                // print is the one builtin whose arguments are not consumed
                let is_print = id.name == "print";

                // local bindings (closures) shadow function names
                if let Some(b) = self.scopes.get(&id.name) {
                    let (ty, moved) = (b.ty.clone(), b.moved);
                    if moved {
                        self.diags.push(Diagnostic::UseOfMoved {
                            name: id.name.clone(),
                            pos: id.pos,
                        });
                    }
                    if ty != "fn" && ty != ANY {
                        self.diags.push(Diagnostic::NotCallable {
                            name: id.name.clone(),
                            pos: id.pos,
                        });
                    }
                    for a in args {
                        let _ = self.type_of(a);
                        self.consume(a);
                    }
                    return ANY.to_string();
                }

                match self.fns.get(&id.name).cloned() {
                    Some(sig) => {
                        if args.len() != sig.params.len() {
                            self.diags.push(Diagnostic::ArityMismatch {
                                name: id.name.clone(),
                                expected: sig.params.len(),
                                found: args.len(),
                                pos,
                            });
                        }
                        for (i, a) in args.iter().enumerate() {
                            let at = self.type_of(a);
                            if !is_print {
                                self.consume(a);
                            }
                            if let Some(pt) = sig.params.get(i) {
                                if !types::matches(pt, &at) {
                                    self.diags.push(Diagnostic::TypeMismatch {
                                        context: format!(
                                            "in argument {} of '{}'",
                                            i + 1,
                                            id.name
                                        ),
                                        expected: pt.clone(),
                                        found: at,
                                        pos: a.pos(),
                                    });
                                }
                            }
                        }
                        sig.ret
                    }
                    None => {
                        self.diags.push(Diagnostic::UndefinedFunction {
                            name: id.name.clone(),
                            pos: id.pos,
                        });
                        for a in args {
                            let _ = self.type_of(a);
                        }
                        ANY.to_string()
                    }
                }
            }

            // method call: receiver.method(args), dispatched on the exact
            // type string of the receiver across registered impls
            Expr::Member { obj, field, .. } => {
                let recv_ty = self.type_of(obj);
                for a in args {
                    let _ = self.type_of(a);
                    self.consume(a);
                }
                if recv_ty == ANY {
                    return ANY.to_string();
                }
                let found = self.impls.iter().find_map(|i| {
                    if i.target_ty == recv_ty {
                        i.methods.iter().find(|m| &m.name == field).cloned()
                    } else {
                        None
                    }
                });
                match found {
                    Some(m) => {
                        if args.len() != m.params.len() {
                            self.diags.push(Diagnostic::ArityMismatch {
                                name: field.clone(),
                                expected: m.params.len(),
                                found: args.len(),
                                pos,
                            });
                        }
                        m.ret_ty.unwrap_or_else(|| NULL.to_string())
                    }
                    None => {
                        self.diags.push(Diagnostic::MethodNotFound {
                            method: field.clone(),
                            ty: recv_ty,
                            pos,
                        });
                        ANY.to_string()
                    }
                }
            }

            other => {
                let _ = self.type_of(other);
                for a in args {
                    let _ = self.type_of(a);
                    self.consume(a);
                }
                ANY.to_string()
            }
        }
    }

    fn type_of_variant(
        &mut self,
        enum_name: &str,
        variant: &str,
        payload: &VariantPayload,
        pos: Pos,
    ) -> String {
        // built-in Option / Result constructors
        if enum_name == "Option" || enum_name == "Result" {
            let inner = match payload {
                VariantPayload::Tuple(args) => {
                    let tys: Vec<String> = args.iter().map(|a| self.type_of(a)).collect();
                    tys.into_iter().next().unwrap_or_else(|| ANY.into())
                }
                _ => ANY.to_string(),
            };
            return match (enum_name, variant) {
                ("Option", _) => {
                    if variant == "None" {
                        format!("Option<{}>", ANY)
                    } else {
                        format!("Option<{}>", inner)
                    }
                }
                (_, "Ok") => format!("Result<{}, {}>", inner, ANY),
                _ => format!("Result<{}, {}>", ANY, inner),
            };
        }

        let def = match self.enums.get(enum_name) {
            Some(d) => d.clone(),
            None => {
                self.diags.push(Diagnostic::UnknownEnum {
                    name: enum_name.to_string(),
                    pos,
                });
                self.type_of_payload(payload);
                return ANY.to_string();
            }
        };

        let vdef = match def.variants.iter().find(|v| v.name == variant) {
            Some(v) => v.clone(),
            None => {
                self.diags.push(Diagnostic::UnknownVariant {
                    enum_name: enum_name.to_string(),
                    variant: variant.to_string(),
                    pos,
                });
                self.type_of_payload(payload);
                return enum_name.to_string();
            }
        };

        match (&vdef.fields, payload) {
            (VariantFields::Struct(field_defs), VariantPayload::Struct(inits)) => {
                for fd in field_defs {
                    if !inits.iter().any(|f| f.name == fd.name) {
                        self.diags.push(Diagnostic::MissingField {
                            struct_name: format!("{}::{}", enum_name, variant),
                            field: fd.name.clone(),
                            pos,
                        });
                    }
                }
                for init in inits {
                    let val_ty = self.type_of(&init.value);
                    match field_defs.iter().find(|fd| fd.name == init.name) {
                        None => self.diags.push(Diagnostic::UnknownField {
                            ty: format!("{}::{}", enum_name, variant),
                            field: init.name.clone(),
                            pos: init.value.pos(),
                        }),
                        Some(fd) => {
                            if !types::matches(&fd.ty, &val_ty) {
                                self.diags.push(Diagnostic::TypeMismatch {
                                    context: format!("for field '{}'", init.name),
                                    expected: fd.ty.clone(),
                                    found: val_ty,
                                    pos: init.value.pos(),
                                });
                            }
                        }
                    }
                }
            }
            (VariantFields::Struct(field_defs), VariantPayload::Unit) => {
                for fd in field_defs {
                    self.diags.push(Diagnostic::MissingField {
                        struct_name: format!("{}::{}", enum_name, variant),
                        field: fd.name.clone(),
                        pos,
                    });
                }
            }
            // tuple variants are typed loosely (payload visited, not checked)
            _ => self.type_of_payload(payload),
        }

        enum_name.to_string()
    }

    fn type_of_payload(&mut self, payload: &VariantPayload) {
        match payload {
            VariantPayload::Unit => {}
            VariantPayload::Tuple(args) => {
                for a in args {
                    let _ = self.type_of(a);
                }
            }
            VariantPayload::Struct(inits) => {
                for f in inits {
                    let _ = self.type_of(&f.value);
                }
            }
        }
    }
}

fn lit_type(lit: &Lit) -> &'static str {
    match lit {
        Lit::Int(_) => "int",
        Lit::Str(_) => "str",
        Lit::Bool(_) => "bool",
    }
}

fn sig(params: &[&str], ret: &str) -> FnSig {
    FnSig {
        params: params.iter().map(|s| s.to_string()).collect(),
        ret: ret.to_string(),
    }
}

fn fn_sig(f: &FnDef) -> FnSig {
    FnSig {
        params: f.params.iter().map(|p| p.ty.clone()).collect(),
        ret: f.ret_ty.clone().unwrap_or_else(|| NULL.to_string()),
    }
}

fn extern_sig(x: &ExternFnDef) -> FnSig {
    FnSig {
        params: x.params.iter().map(|p| p.ty.clone()).collect(),
        ret: NULL.to_string(),
    }
}
