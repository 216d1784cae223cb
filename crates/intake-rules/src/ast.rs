use intake_core::Value;

/// Whitelisted functions callable from rule expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// Processing date of the current file.
    Today,
    Len,
    StartsWith,
    /// Tuple uniqueness across the rows of one file; the only stateful call.
    Unique,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "today" => Some(Function::Today),
            "len" => Some(Function::Len),
            "startswith" => Some(Function::StartsWith),
            "unique" => Some(Function::Unique),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Today => "today",
            Function::Len => "len",
            Function::StartsWith => "startswith",
            Function::Unique => "unique",
            Function::Abs => "abs",
        }
    }

    /// Accepted argument count as `(min, max)`; `None` means unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Today => (0, Some(0)),
            Function::Len | Function::Abs => (1, Some(1)),
            Function::StartsWith => (2, Some(2)),
            Function::Unique => (1, None),
        }
    }

    pub fn arity_label(&self) -> &'static str {
        match self {
            Function::Today => "0",
            Function::Len | Function::Abs => "1",
            Function::StartsWith => "2",
            Function::Unique => "at least 1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

/// Parsed rule expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field {
        name: String,
        position: usize,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        position: usize,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        position: usize,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
        /// Distinguishes several `unique()` calls within one expression.
        call_site: usize,
        position: usize,
    },
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
                ..
            } => expr.is_literal(),
            _ => false,
        }
    }

    /// Whether evaluating this expression touches per-file state.
    pub fn is_stateful(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Field { .. } => false,
            Expr::Unary { expr, .. } => expr.is_stateful(),
            Expr::Binary { left, right, .. } => left.is_stateful() || right.is_stateful(),
            Expr::Call { function, args, .. } => {
                *function == Function::Unique || args.iter().any(Expr::is_stateful)
            }
        }
    }

    /// Field names referenced anywhere in the expression, in source order.
    pub fn fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field { name, .. } => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Unary { expr, .. } => expr.collect_fields(names),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(names);
                right.collect_fields(names);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_fields(names);
                }
            }
        }
    }

    /// Height of the tree; a lone field or literal is 1.
    pub fn depth(&self) -> usize {
        match self {
            Expr::Literal(_) | Expr::Field { .. } => 1,
            Expr::Unary { expr, .. } => 1 + expr.depth(),
            Expr::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            Expr::Call { args, .. } => 1 + args.iter().map(Expr::depth).max().unwrap_or(0),
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,
            Expr::Field { position, .. }
            | Expr::Unary { position, .. }
            | Expr::Binary { position, .. }
            | Expr::Call { position, .. } => *position,
        }
    }
}
