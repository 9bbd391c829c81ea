#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod pos {
    use serde::Serialize;

    /// A source position. Lines and columns are 1-based; layout tokens
    /// synthesized by the lexer carry the position that triggered them.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
    pub struct Pos {
        pub line: u32,
        pub col: u32,
    }

    impl Pos {
        pub fn new(line: u32, col: u32) -> Self {
            Self { line, col }
        }
    }

    impl std::fmt::Display for Pos {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "line {}, column {}", self.line, self.col)
        }
    }
}

pub mod ast {
    use super::pos::Pos;
    use serde::Serialize;

    /// Type annotations are carried as canonical strings: `int`, `str`,
    /// `bool`, `[T]`, `(T1, T2)`, `Name`, `Name<T>`. The analyzer and the
    /// interpreter both key on this textual form.
    pub type TypeRef = String;

    #[derive(Debug, Clone, Serialize)]
    pub struct Program {
        pub stmts: Vec<Stmt>,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Ident {
        pub name: String,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
        pub pos: Pos,
    }

    // ======= definitions =======

    #[derive(Debug, Clone, Serialize)]
    pub struct Param {
        pub name: String,
        pub ty: TypeRef,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FnDef {
        pub name: String,
        pub params: Vec<Param>,
        pub ret_ty: Option<TypeRef>,
        pub body: Block,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FieldDef {
        pub name: String,
        pub ty: TypeRef,
    }

    /// Struct definition. At most one generic parameter is admitted.
    #[derive(Debug, Clone, Serialize)]
    pub struct StructDef {
        pub name: String,
        pub type_param: Option<String>,
        pub fields: Vec<FieldDef>,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum VariantFields {
        Unit,
        /// Struct-like variant: `Stopped { reason: str }`
        Struct(Vec<FieldDef>),
        /// Tuple-like variant: `Pair(int, str)`
        Tuple(Vec<TypeRef>),
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct VariantDef {
        pub name: String,
        pub fields: VariantFields,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct EnumDef {
        pub name: String,
        pub variants: Vec<VariantDef>,
        pub pos: Pos,
    }

    /// Trait method signatures carry a name and return type only.
    #[derive(Debug, Clone, Serialize)]
    pub struct TraitMethodSig {
        pub name: String,
        pub ret_ty: TypeRef,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct TraitDef {
        pub name: String,
        pub methods: Vec<TraitMethodSig>,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct ImplBlock {
        pub trait_name: String,
        /// The target type as written, e.g. `P<int>`.
        pub target_ty: TypeRef,
        pub methods: Vec<FnDef>,
        pub pos: Pos,
    }

    /// `extern fn name(p: T, ...)` — host-provided, no body, no return type.
    #[derive(Debug, Clone, Serialize)]
    pub struct ExternFnDef {
        pub name: String,
        pub params: Vec<Param>,
        pub pos: Pos,
    }

    // ======= statements =======

    #[derive(Debug, Clone, Serialize)]
    pub enum Stmt {
        Fn(FnDef),
        Struct(StructDef),
        Enum(EnumDef),
        Trait(TraitDef),
        Impl(ImplBlock),
        ExternFn(ExternFnDef),
        Let(VarDecl),
        DestructuringLet(DestructuringLet),
        Assign(Assign),
        If(IfStmt),
        While(WhileStmt),
        For(ForStmt),
        Return(ReturnStmt),
        Match(MatchStmt),
        Expr(ExprStmt),
    }

    impl Stmt {
        /// True for items registered up front rather than executed in order.
        pub fn is_definition(&self) -> bool {
            matches!(
                self,
                Stmt::Fn(_)
                    | Stmt::Struct(_)
                    | Stmt::Enum(_)
                    | Stmt::Trait(_)
                    | Stmt::Impl(_)
                    | Stmt::ExternFn(_)
            )
        }
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct VarDecl {
        pub name: String,
        pub ty: Option<TypeRef>,
        pub mutable: bool,
        pub init: Option<Expr>,
        pub pos: Pos,
    }

    /// `let (a, b, ...) = expr`
    #[derive(Debug, Clone, Serialize)]
    pub struct DestructuringLet {
        pub names: Vec<String>,
        pub mutable: bool,
        pub init: Expr,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Assign {
        pub name: String,
        pub value: Expr,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct IfStmt {
        pub cond: Expr,
        pub then_block: Block,
        pub else_block: Option<Block>,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct WhileStmt {
        pub cond: Expr,
        pub body: Block,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct ForStmt {
        pub item: String,
        pub iter: Expr,
        pub body: Block,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct ReturnStmt {
        pub value: Option<Expr>,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct MatchCase {
        pub pat: Pattern,
        pub body: Block,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct MatchStmt {
        pub subject: Expr,
        pub cases: Vec<MatchCase>,
        pub pos: Pos,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct ExprStmt {
        pub expr: Expr,
        pub pos: Pos,
    }

    // ======= expressions =======

    #[derive(Debug, Clone, Serialize)]
    pub enum Lit {
        Int(i64),
        Str(String),
        Bool(bool),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub enum BinOp {
        Eq,
        Ne,
        Lt,
        Le,
        Gt,
        Ge,
        Add,
        Sub,
        Mul,
        Div,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct FieldInit {
        pub name: String,
        pub value: Expr,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum VariantPayload {
        Unit,
        /// `Name::Variant(a, b)` and the `Some(x)` / `Ok(x)` / `Err(x)` sugars.
        Tuple(Vec<Expr>),
        /// `Name::Variant { f: v, ... }`
        Struct(Vec<FieldInit>),
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Expr {
        Literal(Lit, Pos),
        Ident(Ident),
        Binary {
            op: BinOp,
            lhs: Box<Expr>,
            rhs: Box<Expr>,
            pos: Pos,
        },
        /// Callee is an `Ident` for plain calls or a `Member` for method calls.
        Call {
            callee: Box<Expr>,
            args: Vec<Expr>,
            pos: Pos,
        },
        Member {
            obj: Box<Expr>,
            field: String,
            pos: Pos,
        },
        Index {
            obj: Box<Expr>,
            index: Box<Expr>,
            pos: Pos,
        },
        Array {
            elems: Vec<Expr>,
            pos: Pos,
        },
        Tuple {
            elems: Vec<Expr>,
            pos: Pos,
        },
        StructInit {
            name: String,
            fields: Vec<FieldInit>,
            pos: Pos,
        },
        EnumVariant {
            enum_name: String,
            variant: String,
            payload: VariantPayload,
            pos: Pos,
        },
        Borrow {
            mutable: bool,
            expr: Box<Expr>,
            pos: Pos,
        },
        Lambda {
            params: Vec<String>,
            body: Block,
            pos: Pos,
        },
    }

    impl Expr {
        pub fn pos(&self) -> Pos {
            match self {
                Expr::Literal(_, pos) => *pos,
                Expr::Ident(id) => id.pos,
                Expr::Binary { pos, .. } => *pos,
                Expr::Call { pos, .. } => *pos,
                Expr::Member { pos, .. } => *pos,
                Expr::Index { pos, .. } => *pos,
                Expr::Array { pos, .. } => *pos,
                Expr::Tuple { pos, .. } => *pos,
                Expr::StructInit { pos, .. } => *pos,
                Expr::EnumVariant { pos, .. } => *pos,
                Expr::Borrow { pos, .. } => *pos,
                Expr::Lambda { pos, .. } => *pos,
            }
        }
    }

    // ======= patterns =======

    #[derive(Debug, Clone, Serialize)]
    pub enum VariantBinding {
        Unit,
        /// The single payload binding of the `Some(x)` / `Ok(x)` / `Err(x)` sugars.
        Inner(String),
        /// Destructured field names of a struct-like variant.
        Fields(Vec<String>),
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Pattern {
        Wildcard(Pos),
        Variant {
            enum_name: String,
            variant: String,
            binding: VariantBinding,
            pos: Pos,
        },
        Ident(Ident),
        Literal(Lit, Pos),
    }

    impl Pattern {
        pub fn pos(&self) -> Pos {
            match self {
                Pattern::Wildcard(pos) => *pos,
                Pattern::Variant { pos, .. } => *pos,
                Pattern::Ident(id) => id.pos,
                Pattern::Literal(_, pos) => *pos,
            }
        }
    }
}
