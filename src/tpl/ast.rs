use crate::data::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    And,
    Or,
}

/// One step of a variable path: `a.b`, `a[0]`, `a[key]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(i64),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub root: String,
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            segments: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(Path),
    Binary(Op, Box<Expr>, Box<Expr>),
    Filter {
        base: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    /// `(start..end)`, inclusive.
    Range(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub values: Vec<Expr>,
    pub body: Vec<Node>,
}

/// One `elsif` of an `if` chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ElsifClause {
    pub condition: Expr,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    If {
        condition: Expr,
        then_branch: Vec<Node>,
        /// Tried in order when `condition` is falsy. Kept flat so a long
        /// chain does not nest.
        elsifs: Vec<ElsifClause>,
        else_branch: Option<Vec<Node>>,
    },
    Case {
        subject: Expr,
        whens: Vec<WhenClause>,
        else_branch: Option<Vec<Node>>,
    },
    For {
        variable: String,
        iterable: Expr,
        limit: Option<Expr>,
        offset: Option<Expr>,
        reversed: bool,
        body: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
    Break,
    Continue,
    Assign {
        name: String,
        expr: Expr,
    },
    Capture {
        name: String,
        body: Vec<Node>,
    },
    /// `increment` (step 1) and `decrement` (step -1).
    Counter {
        name: String,
        step: i64,
    },
    Include {
        template: Expr,
        args: Vec<(String, Expr)>,
        /// `render` starts from an empty scope; `include` shares the caller's.
        isolated: bool,
    },
    Block(Vec<Node>),
}
