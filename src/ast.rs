use std::borrow::Cow;

/// A parsed condition, borrowing identifiers from the condition text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr<'a> {
    /// A literal value. Strings with escapes are owned, otherwise borrowed.
    Literal(Literal<'a>),
    /// A bare identifier, resolved against the state at evaluation time.
    Identifier { name: &'a str },
    /// Conditional NOT
    Not { operand: Box<Expr<'a>> },
    /// Conditional AND
    And {
        left: Box<Expr<'a>>,
        right: Box<Expr<'a>>,
    },
    /// Conditional OR
    Or {
        left: Box<Expr<'a>>,
        right: Box<Expr<'a>>,
    },
    /// A binary comparison.
    Compare {
        op: CompareOp,
        left: Box<Expr<'a>>,
        right: Box<Expr<'a>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal<'a> {
    Number(f64),
    String(Cow<'a, str>),
    Boolean(bool),
    Null,
    Undefined,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CompareOp {
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Longest spellings first, so `===` wins over `==`.
    pub(crate) const TOKENS: [(&'static str, Self); 8] = [
        ("===", Self::StrictEq),
        ("!==", Self::StrictNe),
        ("==", Self::LooseEq),
        ("!=", Self::LooseNe),
        ("<=", Self::Le),
        (">=", Self::Ge),
        ("<", Self::Lt),
        (">", Self::Gt),
    ];
}
