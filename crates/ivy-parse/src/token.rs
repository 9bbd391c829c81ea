use ivy_ast::pos::Pos;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    /// Lexical error (unexpected character, unterminated string,
    /// inconsistent dedent). The lexer latches after emitting one.
    Error(String),
    // layout (synthesized, never written in source)
    Newline,
    Indent,
    Dedent,
    // delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    // operators
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Amp,
    Pipe,
    Dot,
    ColonColon,
    Arrow,    // ->
    FatArrow, // =>
    // keywords
    KwFn,
    KwStruct,
    KwEnum,
    KwTrait,
    KwImpl,
    KwLet,
    KwMut,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwReturn,
    KwMatch,
    KwExtern,
    KwThis,
    Underscore,
    KwSome,
    KwNone,
    KwOk,
    KwErr,
    // type keywords
    KwInt,
    KwStr,
    KwBool,
    // literals / identifiers
    Int(i64),
    Str(String),
    Bool(bool),
    Ident(String),
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub line: u32,
    pub col: u32,
}

impl Tok {
    pub fn pos(&self) -> Pos {
        Pos::new(self.line, self.col)
    }
}
