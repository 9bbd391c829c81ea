use crate::lexer::Lexer;
use crate::token::{Tok, TokKind};
use anyhow::{bail, Result};
use ivy_ast::ast::{
    Assign, BinOp, Block, DestructuringLet, EnumDef, Expr, ExprStmt, ExternFnDef, FieldDef,
    FieldInit, FnDef, ForStmt, Ident, IfStmt, Lit, MatchCase, MatchStmt, Param, Pattern, Program,
    ReturnStmt, Stmt, StructDef, TraitDef, TraitMethodSig, TypeRef, VarDecl, VariantBinding,
    VariantDef, VariantFields, VariantPayload, WhileStmt, ImplBlock,
};
use ivy_ast::pos::Pos;

/// Maximum nesting depth for blocks and expressions, to keep pathological
/// input from overflowing the stack.
const MAX_NESTING_DEPTH: u32 = 512;

/// Parse a whole program. Aborts at the first lexical or syntactic error.
pub fn parse_str(src: &str) -> Result<Program> {
    let mut p = Parser::new(src);
    p.parse_program()
}

struct Parser<'a> {
    lex: Lexer<'a>,
    cur: Tok,
    nxt: Tok,
    depth: u32,
    /// Set when an expression consumed a DEDENT (block-bodied lambda), in
    /// which case the enclosing statement needs no newline of its own.
    closed_block: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        let mut lex = Lexer::new(src);
        let cur = lex.next_tok();
        let nxt = lex.next_tok();
        Self {
            lex,
            cur,
            nxt,
            depth: 0,
            closed_block: false,
        }
    }

    fn enter_nesting(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            bail!(
                "maximum nesting depth exceeded (limit: {})",
                MAX_NESTING_DEPTH
            );
        }
        Ok(())
    }

    fn exit_nesting(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn bump(&mut self) {
        self.cur = std::mem::replace(&mut self.nxt, self.lex.next_tok());
    }

    fn pos(&self) -> Pos {
        self.cur.pos()
    }

    fn at(&self, k: &TokKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(k)
    }

    fn check_lex_error(&self) -> Result<()> {
        if let TokKind::Error(msg) = &self.cur.kind {
            bail!("line {}, column {}: {}", self.cur.line, self.cur.col, msg);
        }
        Ok(())
    }

    fn expect(&mut self, k: TokKind) -> Result<Tok> {
        self.check_lex_error()?;
        if self.at(&k) {
            let t = self.cur.clone();
            self.bump();
            Ok(t)
        } else {
            bail!(
                "line {}, column {}: expected {:?}, found {:?}",
                self.cur.line,
                self.cur.col,
                k,
                self.cur.kind
            )
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Pos)> {
        self.check_lex_error()?;
        match &self.cur.kind {
            TokKind::Ident(s) => {
                let name = s.clone();
                let pos = self.pos();
                self.bump();
                Ok((name, pos))
            }
            _ => bail!(
                "line {}, column {}: expected identifier, found {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        }
    }

    /// A variant name: a plain identifier, or one of the built-in
    /// constructor keywords when spelled through a path.
    fn expect_variant_name(&mut self) -> Result<String> {
        let name = match &self.cur.kind {
            TokKind::Ident(s) => s.clone(),
            TokKind::KwSome => "Some".into(),
            TokKind::KwNone => "None".into(),
            TokKind::KwOk => "Ok".into(),
            TokKind::KwErr => "Err".into(),
            _ => bail!(
                "line {}, column {}: expected variant name, found {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        };
        self.bump();
        Ok(name)
    }

    /// Consume the end of a statement line. A statement whose expression
    /// already closed an indented block needs no newline of its own.
    fn end_stmt(&mut self) -> Result<()> {
        if self.closed_block {
            self.closed_block = false;
            if matches!(self.cur.kind, TokKind::Newline) {
                self.bump();
            }
            return Ok(());
        }
        match self.cur.kind {
            TokKind::Newline => {
                self.bump();
                Ok(())
            }
            TokKind::Dedent | TokKind::Eof => Ok(()),
            _ => bail!(
                "line {}, column {}: expected end of line, found {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        }
    }

    // ======= program / statements =======

    fn parse_program(&mut self) -> Result<Program> {
        let mut stmts = Vec::new();
        loop {
            self.check_lex_error()?;
            match self.cur.kind {
                TokKind::Eof => break,
                TokKind::Newline => {
                    self.bump();
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(Program { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        self.check_lex_error()?;
        match self.cur.kind {
            TokKind::KwFn => Ok(Stmt::Fn(self.parse_fn_def()?)),
            TokKind::KwStruct => Ok(Stmt::Struct(self.parse_struct_def()?)),
            TokKind::KwEnum => Ok(Stmt::Enum(self.parse_enum_def()?)),
            TokKind::KwTrait => Ok(Stmt::Trait(self.parse_trait_def()?)),
            TokKind::KwImpl => Ok(Stmt::Impl(self.parse_impl_block()?)),
            TokKind::KwExtern => {
                let e = self.parse_extern_fn()?;
                self.end_stmt()?;
                Ok(Stmt::ExternFn(e))
            }
            TokKind::KwIf => Ok(Stmt::If(self.parse_if()?)),
            TokKind::KwWhile => Ok(Stmt::While(self.parse_while()?)),
            TokKind::KwFor => Ok(Stmt::For(self.parse_for()?)),
            TokKind::KwMatch => Ok(Stmt::Match(self.parse_match()?)),
            _ => self.parse_simple_stmt(true),
        }
    }

    /// The statements that may appear on a single line: `let`, `return`,
    /// assignment, and expression statements. When `terminated` is false the
    /// caller owns line termination (braced match-case bodies).
    fn parse_simple_stmt(&mut self, terminated: bool) -> Result<Stmt> {
        let stmt = match self.cur.kind {
            TokKind::KwLet => self.parse_let()?,
            TokKind::KwReturn => {
                let pos = self.pos();
                self.bump();
                let value = match self.cur.kind {
                    TokKind::Newline | TokKind::Dedent | TokKind::Eof | TokKind::RBrace => None,
                    _ => Some(self.parse_expr()?),
                };
                Stmt::Return(ReturnStmt { value, pos })
            }
            TokKind::Ident(_) if matches!(self.nxt.kind, TokKind::Assign) => {
                let (name, pos) = self.expect_ident()?;
                self.expect(TokKind::Assign)?;
                let value = self.parse_expr()?;
                Stmt::Assign(Assign { name, value, pos })
            }
            _ => {
                let pos = self.pos();
                let expr = self.parse_expr()?;
                Stmt::Expr(ExprStmt { expr, pos })
            }
        };
        if terminated {
            self.end_stmt()?;
        }
        Ok(stmt)
    }

    fn parse_let(&mut self) -> Result<Stmt> {
        let pos = self.pos();
        self.expect(TokKind::KwLet)?;
        let mutable = if matches!(self.cur.kind, TokKind::KwMut) {
            self.bump();
            true
        } else {
            false
        };

        // `let (a, b, ...) = expr`
        if matches!(self.cur.kind, TokKind::LParen) {
            self.bump();
            let mut names = Vec::new();
            names.push(self.expect_ident()?.0);
            while matches!(self.cur.kind, TokKind::Comma) {
                self.bump();
                names.push(self.expect_ident()?.0);
            }
            self.expect(TokKind::RParen)?;
            self.expect(TokKind::Assign)?;
            let init = self.parse_expr()?;
            return Ok(Stmt::DestructuringLet(DestructuringLet {
                names,
                mutable,
                init,
                pos,
            }));
        }

        let (name, _) = self.expect_ident()?;
        let ty = if matches!(self.cur.kind, TokKind::Colon) {
            self.bump();
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if matches!(self.cur.kind, TokKind::Assign) {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Stmt::Let(VarDecl {
            name,
            ty,
            mutable,
            init,
            pos,
        }))
    }

    // ======= definitions =======

    fn parse_fn_def(&mut self) -> Result<FnDef> {
        let pos = self.pos();
        self.expect(TokKind::KwFn)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokKind::RParen)?;
        let ret_ty = if matches!(self.cur.kind, TokKind::Arrow) {
            self.bump();
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FnDef {
            name,
            params,
            ret_ty,
            body,
            pos,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if matches!(self.cur.kind, TokKind::RParen) {
            return Ok(params);
        }
        loop {
            let (name, _) = self.expect_ident()?;
            self.expect(TokKind::Colon)?;
            let ty = self.parse_type()?;
            params.push(Param { name, ty });
            if matches!(self.cur.kind, TokKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(params)
    }

    fn parse_struct_def(&mut self) -> Result<StructDef> {
        let pos = self.pos();
        self.expect(TokKind::KwStruct)?;
        let (name, _) = self.expect_ident()?;

        // at most one generic parameter
        let type_param = if matches!(self.cur.kind, TokKind::Lt) {
            self.bump();
            let (p, _) = self.expect_ident()?;
            self.expect(TokKind::Gt)?;
            Some(p)
        } else {
            None
        };

        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut fields = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                _ => {
                    let (fname, _) = self.expect_ident()?;
                    self.expect(TokKind::Colon)?;
                    let ty = self.parse_type()?;
                    fields.push(FieldDef { name: fname, ty });
                    self.end_stmt()?;
                }
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(StructDef {
            name,
            type_param,
            fields,
            pos,
        })
    }

    fn parse_enum_def(&mut self) -> Result<EnumDef> {
        let pos = self.pos();
        self.expect(TokKind::KwEnum)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut variants = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                _ => {
                    let (vname, _) = self.expect_ident()?;
                    let fields = if matches!(self.cur.kind, TokKind::LBrace) {
                        self.bump();
                        let mut fs = Vec::new();
                        while !matches!(self.cur.kind, TokKind::RBrace) {
                            let (fname, _) = self.expect_ident()?;
                            self.expect(TokKind::Colon)?;
                            let ty = self.parse_type()?;
                            fs.push(FieldDef { name: fname, ty });
                            if matches!(self.cur.kind, TokKind::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                        self.expect(TokKind::RBrace)?;
                        VariantFields::Struct(fs)
                    } else if matches!(self.cur.kind, TokKind::LParen) {
                        self.bump();
                        let mut tys = Vec::new();
                        if !matches!(self.cur.kind, TokKind::RParen) {
                            tys.push(self.parse_type()?);
                            while matches!(self.cur.kind, TokKind::Comma) {
                                self.bump();
                                tys.push(self.parse_type()?);
                            }
                        }
                        self.expect(TokKind::RParen)?;
                        VariantFields::Tuple(tys)
                    } else {
                        VariantFields::Unit
                    };
                    variants.push(VariantDef {
                        name: vname,
                        fields,
                    });
                    self.end_stmt()?;
                }
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(EnumDef {
            name,
            variants,
            pos,
        })
    }

    fn parse_trait_def(&mut self) -> Result<TraitDef> {
        let pos = self.pos();
        self.expect(TokKind::KwTrait)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut methods = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                _ => {
                    self.expect(TokKind::KwFn)?;
                    let (mname, _) = self.expect_ident()?;
                    self.expect(TokKind::LParen)?;
                    self.expect(TokKind::RParen)?;
                    self.expect(TokKind::Arrow)?;
                    let ret_ty = self.parse_type()?;
                    methods.push(TraitMethodSig { name: mname, ret_ty });
                    self.end_stmt()?;
                }
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(TraitDef { name, methods, pos })
    }

    fn parse_impl_block(&mut self) -> Result<ImplBlock> {
        let pos = self.pos();
        self.expect(TokKind::KwImpl)?;
        let (trait_name, _) = self.expect_ident()?;
        self.expect(TokKind::KwFor)?;
        let target_ty = self.parse_type()?;
        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut methods = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                _ => methods.push(self.parse_fn_def()?),
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(ImplBlock {
            trait_name,
            target_ty,
            methods,
            pos,
        })
    }

    fn parse_extern_fn(&mut self) -> Result<ExternFnDef> {
        let pos = self.pos();
        self.expect(TokKind::KwExtern)?;
        self.expect(TokKind::KwFn)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokKind::RParen)?;
        if matches!(self.cur.kind, TokKind::Arrow) {
            bail!(
                "line {}, column {}: extern functions cannot declare a return type",
                self.cur.line,
                self.cur.col
            );
        }
        Ok(ExternFnDef { name, params, pos })
    }

    // ======= control flow =======

    fn parse_if(&mut self) -> Result<IfStmt> {
        let pos = self.pos();
        self.expect(TokKind::KwIf)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_block = if matches!(self.cur.kind, TokKind::KwElse) {
            self.bump();
            if matches!(self.cur.kind, TokKind::KwIf) {
                // else-if chain: wrap the nested if in a synthetic block
                self.enter_nesting()?;
                let nested = self.parse_if();
                self.exit_nesting();
                let nested = nested?;
                let nested_pos = nested.pos;
                Some(Block {
                    stmts: vec![Stmt::If(nested)],
                    pos: nested_pos,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(IfStmt {
            cond,
            then_block,
            else_block,
            pos,
        })
    }

    fn parse_while(&mut self) -> Result<WhileStmt> {
        let pos = self.pos();
        self.expect(TokKind::KwWhile)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(WhileStmt { cond, body, pos })
    }

    fn parse_for(&mut self) -> Result<ForStmt> {
        let pos = self.pos();
        self.expect(TokKind::KwFor)?;
        let (item, _) = self.expect_ident()?;
        self.expect(TokKind::KwIn)?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(ForStmt {
            item,
            iter,
            body,
            pos,
        })
    }

    fn parse_match(&mut self) -> Result<MatchStmt> {
        let pos = self.pos();
        self.expect(TokKind::KwMatch)?;
        let subject = self.parse_expr()?;
        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut cases = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                _ => cases.push(self.parse_match_case()?),
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(MatchStmt {
            subject,
            cases,
            pos,
        })
    }

    fn parse_match_case(&mut self) -> Result<MatchCase> {
        let pos = self.pos();
        let pat = self.parse_pattern()?;
        self.expect(TokKind::FatArrow)?;

        let body = match self.cur.kind {
            // indented block body
            TokKind::Newline => {
                let bpos = self.pos();
                self.bump();
                self.expect(TokKind::Indent)?;
                let mut stmts = Vec::new();
                loop {
                    match self.cur.kind {
                        TokKind::Newline => {
                            self.bump();
                        }
                        TokKind::Dedent => break,
                        _ => stmts.push(self.parse_stmt()?),
                    }
                }
                self.expect(TokKind::Dedent)?;
                Block { stmts, pos: bpos }
            }
            // braced body: layout is suppressed inside the braces
            TokKind::LBrace => {
                let bpos = self.pos();
                self.bump();
                let mut stmts = Vec::new();
                while !matches!(self.cur.kind, TokKind::RBrace) {
                    stmts.push(self.parse_simple_stmt(false)?);
                }
                self.expect(TokKind::RBrace)?;
                self.end_stmt()?;
                Block { stmts, pos: bpos }
            }
            // single statement on the arrow line
            _ => {
                let bpos = self.pos();
                let stmt = self.parse_simple_stmt(true)?;
                Block {
                    stmts: vec![stmt],
                    pos: bpos,
                }
            }
        };

        Ok(MatchCase { pat, body, pos })
    }

    // ======= patterns =======

    fn parse_pattern(&mut self) -> Result<Pattern> {
        let pos = self.pos();
        match self.cur.kind.clone() {
            TokKind::Underscore => {
                self.bump();
                Ok(Pattern::Wildcard(pos))
            }
            TokKind::KwNone => {
                self.bump();
                Ok(Pattern::Variant {
                    enum_name: "Option".into(),
                    variant: "None".into(),
                    binding: VariantBinding::Unit,
                    pos,
                })
            }
            TokKind::KwSome | TokKind::KwOk | TokKind::KwErr => {
                let (enum_name, variant) = match self.cur.kind {
                    TokKind::KwSome => ("Option", "Some"),
                    TokKind::KwOk => ("Result", "Ok"),
                    _ => ("Result", "Err"),
                };
                self.bump();
                self.expect(TokKind::LParen)?;
                let (inner, _) = self.expect_ident()?;
                self.expect(TokKind::RParen)?;
                Ok(Pattern::Variant {
                    enum_name: enum_name.into(),
                    variant: variant.into(),
                    binding: VariantBinding::Inner(inner),
                    pos,
                })
            }
            TokKind::Int(v) => {
                self.bump();
                Ok(Pattern::Literal(Lit::Int(v), pos))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(Pattern::Literal(Lit::Str(s), pos))
            }
            TokKind::Bool(b) => {
                self.bump();
                Ok(Pattern::Literal(Lit::Bool(b), pos))
            }
            TokKind::Ident(_) => {
                let (name, _) = self.expect_ident()?;
                if matches!(self.cur.kind, TokKind::ColonColon) {
                    self.bump();
                    let variant = self.expect_variant_name()?;
                    let binding = if matches!(self.cur.kind, TokKind::LBrace) {
                        self.bump();
                        let mut fields = Vec::new();
                        while !matches!(self.cur.kind, TokKind::RBrace) {
                            fields.push(self.expect_ident()?.0);
                            if matches!(self.cur.kind, TokKind::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                        self.expect(TokKind::RBrace)?;
                        VariantBinding::Fields(fields)
                    } else {
                        VariantBinding::Unit
                    };
                    Ok(Pattern::Variant {
                        enum_name: name,
                        variant,
                        binding,
                        pos,
                    })
                } else {
                    Ok(Pattern::Ident(Ident { name, pos }))
                }
            }
            _ => bail!(
                "line {}, column {}: expected pattern, found {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        }
    }

    // ======= types =======

    /// Parse a type annotation into its canonical string form.
    fn parse_type(&mut self) -> Result<TypeRef> {
        self.enter_nesting()?;
        let r = self.parse_type_inner();
        self.exit_nesting();
        r
    }

    fn parse_type_inner(&mut self) -> Result<TypeRef> {
        match self.cur.kind.clone() {
            TokKind::KwInt => {
                self.bump();
                Ok("int".into())
            }
            TokKind::KwStr => {
                self.bump();
                Ok("str".into())
            }
            TokKind::KwBool => {
                self.bump();
                Ok("bool".into())
            }
            TokKind::LBracket => {
                self.bump();
                let inner = self.parse_type()?;
                self.expect(TokKind::RBracket)?;
                Ok(format!("[{}]", inner))
            }
            TokKind::LParen => {
                self.bump();
                let mut elems = vec![self.parse_type()?];
                while matches!(self.cur.kind, TokKind::Comma) {
                    self.bump();
                    elems.push(self.parse_type()?);
                }
                self.expect(TokKind::RParen)?;
                if elems.len() == 1 {
                    Ok(elems.pop().unwrap())
                } else {
                    Ok(format!("({})", elems.join(", ")))
                }
            }
            TokKind::Ident(_) => {
                let (name, _) = self.expect_ident()?;
                if matches!(self.cur.kind, TokKind::Lt) {
                    self.bump();
                    let mut args = vec![self.parse_type()?];
                    while matches!(self.cur.kind, TokKind::Comma) {
                        self.bump();
                        args.push(self.parse_type()?);
                    }
                    self.expect(TokKind::Gt)?;
                    Ok(format!("{}<{}>", name, args.join(", ")))
                } else {
                    Ok(name)
                }
            }
            _ => bail!(
                "line {}, column {}: expected type, found {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        }
    }

    // ======= expressions =======
    //
    // Precedence (low -> high): comparison 5, additive 10, multiplicative 20.
    // Postfix chains (.field, [index], (args)) bind tighter than all of them.

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_postfix()?;
        loop {
            let (op, lbp, rbp) = match self.cur.kind {
                TokKind::EqEq => (BinOp::Eq, 5, 6),
                TokKind::NotEq => (BinOp::Ne, 5, 6),
                TokKind::Lt => (BinOp::Lt, 5, 6),
                TokKind::Le => (BinOp::Le, 5, 6),
                TokKind::Gt => (BinOp::Gt, 5, 6),
                TokKind::Ge => (BinOp::Ge, 5, 6),
                TokKind::Plus => (BinOp::Add, 10, 11),
                TokKind::Minus => (BinOp::Sub, 10, 11),
                TokKind::Star => (BinOp::Mul, 20, 21),
                TokKind::Slash => (BinOp::Div, 20, 21),
                _ => break,
            };
            if lbp < min_bp {
                break;
            }
            let pos = lhs.pos();
            self.bump();
            self.enter_nesting()?;
            let rhs = self.parse_expr_bp(rbp);
            self.exit_nesting();
            let rhs = rhs?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                pos,
            };
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            match self.cur.kind {
                TokKind::Dot => {
                    let pos = e.pos();
                    self.bump();
                    let (field, _) = self.expect_ident()?;
                    e = Expr::Member {
                        obj: Box::new(e),
                        field,
                        pos,
                    };
                }
                TokKind::LBracket => {
                    let pos = e.pos();
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(TokKind::RBracket)?;
                    e = Expr::Index {
                        obj: Box::new(e),
                        index: Box::new(index),
                        pos,
                    };
                }
                TokKind::LParen => {
                    let pos = e.pos();
                    let args = self.parse_call_args()?;
                    e = Expr::Call {
                        callee: Box::new(e),
                        args,
                        pos,
                    };
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>> {
        self.expect(TokKind::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.cur.kind, TokKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.cur.kind, TokKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(TokKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.check_lex_error()?;
        let pos = self.pos();
        match self.cur.kind.clone() {
            TokKind::Int(v) => {
                self.bump();
                Ok(Expr::Literal(Lit::Int(v), pos))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(Expr::Literal(Lit::Str(s), pos))
            }
            TokKind::Bool(b) => {
                self.bump();
                Ok(Expr::Literal(Lit::Bool(b), pos))
            }
            TokKind::KwThis => {
                self.bump();
                Ok(Expr::Ident(Ident {
                    name: "this".into(),
                    pos,
                }))
            }

            // parenthesized expression or tuple literal
            TokKind::LParen => {
                self.enter_nesting()?;
                let r = self.parse_paren_or_tuple(pos);
                self.exit_nesting();
                r
            }

            // array literal
            TokKind::LBracket => {
                self.bump();
                let mut elems = Vec::new();
                if !matches!(self.cur.kind, TokKind::RBracket) {
                    loop {
                        elems.push(self.parse_expr()?);
                        if matches!(self.cur.kind, TokKind::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokKind::RBracket)?;
                Ok(Expr::Array { elems, pos })
            }

            // lambda: |p, ...|: <block>  or  |p, ...| expr
            TokKind::Pipe => {
                self.bump();
                let mut params = Vec::new();
                if !matches!(self.cur.kind, TokKind::Pipe) {
                    loop {
                        params.push(self.expect_ident()?.0);
                        if matches!(self.cur.kind, TokKind::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokKind::Pipe)?;
                let body = if matches!(self.cur.kind, TokKind::Colon) {
                    let b = self.parse_block()?;
                    self.closed_block = true;
                    b
                } else {
                    // single-expression form lowers to `return expr`
                    let epos = self.pos();
                    self.enter_nesting()?;
                    let e = self.parse_expr();
                    self.exit_nesting();
                    let e = e?;
                    Block {
                        stmts: vec![Stmt::Return(ReturnStmt {
                            value: Some(e),
                            pos: epos,
                        })],
                        pos: epos,
                    }
                };
                Ok(Expr::Lambda { params, body, pos })
            }

            // borrow: &expr / &mut expr
            TokKind::Amp => {
                self.bump();
                let mutable = if matches!(self.cur.kind, TokKind::KwMut) {
                    self.bump();
                    true
                } else {
                    false
                };
                self.enter_nesting()?;
                let inner = self.parse_postfix();
                self.exit_nesting();
                Ok(Expr::Borrow {
                    mutable,
                    expr: Box::new(inner?),
                    pos,
                })
            }

            // built-in constructors lower to Option / Result variants
            TokKind::KwNone => {
                self.bump();
                Ok(Expr::EnumVariant {
                    enum_name: "Option".into(),
                    variant: "None".into(),
                    payload: VariantPayload::Unit,
                    pos,
                })
            }
            TokKind::KwSome | TokKind::KwOk | TokKind::KwErr => {
                let (enum_name, variant) = match self.cur.kind {
                    TokKind::KwSome => ("Option", "Some"),
                    TokKind::KwOk => ("Result", "Ok"),
                    _ => ("Result", "Err"),
                };
                self.bump();
                self.expect(TokKind::LParen)?;
                let arg = self.parse_expr()?;
                self.expect(TokKind::RParen)?;
                Ok(Expr::EnumVariant {
                    enum_name: enum_name.into(),
                    variant: variant.into(),
                    payload: VariantPayload::Tuple(vec![arg]),
                    pos,
                })
            }

            TokKind::Ident(_) => {
                let (name, _) = self.expect_ident()?;

                // Name::Variant [...]
                if matches!(self.cur.kind, TokKind::ColonColon) {
                    self.bump();
                    let variant = self.expect_variant_name()?;
                    let payload = if matches!(self.cur.kind, TokKind::LBrace) {
                        self.bump();
                        let mut fields = Vec::new();
                        while !matches!(self.cur.kind, TokKind::RBrace) {
                            let (fname, _) = self.expect_ident()?;
                            self.expect(TokKind::Colon)?;
                            let value = self.parse_expr()?;
                            fields.push(FieldInit { name: fname, value });
                            if matches!(self.cur.kind, TokKind::Comma) {
                                self.bump();
                            } else {
                                break;
                            }
                        }
                        self.expect(TokKind::RBrace)?;
                        VariantPayload::Struct(fields)
                    } else if matches!(self.cur.kind, TokKind::LParen) {
                        VariantPayload::Tuple(self.parse_call_args()?)
                    } else {
                        VariantPayload::Unit
                    };
                    return Ok(Expr::EnumVariant {
                        enum_name: name,
                        variant,
                        payload,
                        pos,
                    });
                }

                // Name { field: value, ... } resolves as struct init
                if matches!(self.cur.kind, TokKind::LBrace) {
                    self.bump();
                    let mut fields = Vec::new();
                    while !matches!(self.cur.kind, TokKind::RBrace) {
                        let (fname, _) = self.expect_ident()?;
                        self.expect(TokKind::Colon)?;
                        let value = self.parse_expr()?;
                        fields.push(FieldInit { name: fname, value });
                        if matches!(self.cur.kind, TokKind::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.expect(TokKind::RBrace)?;
                    return Ok(Expr::StructInit { name, fields, pos });
                }

                Ok(Expr::Ident(Ident { name, pos }))
            }

            _ => bail!(
                "line {}, column {}: unexpected token in expression: {:?}",
                self.cur.line,
                self.cur.col,
                self.cur.kind
            ),
        }
    }

    /// Called at `(`: a parenthesized expression or a tuple literal.
    fn parse_paren_or_tuple(&mut self, pos: Pos) -> Result<Expr> {
        self.expect(TokKind::LParen)?;
        if matches!(self.cur.kind, TokKind::RParen) {
            self.bump();
            return Ok(Expr::Tuple { elems: vec![], pos });
        }
        let first = self.parse_expr()?;
        if matches!(self.cur.kind, TokKind::Comma) {
            let mut elems = vec![first];
            while matches!(self.cur.kind, TokKind::Comma) {
                self.bump();
                if matches!(self.cur.kind, TokKind::RParen) {
                    break;
                }
                elems.push(self.parse_expr()?);
            }
            self.expect(TokKind::RParen)?;
            Ok(Expr::Tuple { elems, pos })
        } else {
            self.expect(TokKind::RParen)?;
            Ok(first)
        }
    }

    /// Parse an indented block opened by `: NEWLINE INDENT`.
    fn parse_block(&mut self) -> Result<Block> {
        self.enter_nesting()?;
        let r = self.parse_block_inner();
        self.exit_nesting();
        r
    }

    fn parse_block_inner(&mut self) -> Result<Block> {
        let pos = self.pos();
        self.expect(TokKind::Colon)?;
        self.expect(TokKind::Newline)?;
        self.expect(TokKind::Indent)?;
        let mut stmts = Vec::new();
        loop {
            match self.cur.kind {
                TokKind::Newline => {
                    self.bump();
                }
                TokKind::Dedent => break,
                TokKind::Eof => break,
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        self.expect(TokKind::Dedent)?;
        Ok(Block { stmts, pos })
    }
}
