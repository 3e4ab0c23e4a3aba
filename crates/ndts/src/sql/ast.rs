//! Parsed representation of the supported SQL subset.

use ndts_core::ColumnDef;

#[derive(Debug, Clone)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Upsert(UpsertStmt),
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
    DropIndex(DropIndexStmt),
}

#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DropIndexStmt {
    pub name: String,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Expr>>,
    /// Present when parsed from `INSERT ... ON CONFLICT (cols) DO UPDATE SET
    /// col = EXCLUDED.col, ...`; absent for a plain `INSERT`.
    pub on_conflict: Option<UpsertClause>,
}

#[derive(Debug, Clone)]
pub struct UpsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Expr>>,
    pub clause: UpsertClause,
}

/// Only `col = EXCLUDED.col` update assignments are supported — the update
/// always takes the incoming row's own value for that column, which is
/// what both surface forms express in practice.
#[derive(Debug, Clone)]
pub struct UpsertClause {
    pub conflict_columns: Vec<String>,
    pub update_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SelectStmt {
    pub ctes: Vec<(String, Box<SelectStmt>)>,
    pub columns: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    Star,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    /// Multi-clause equi-join `ON`, ANDed together: `(left_expr, right_expr)` pairs.
    pub on: Vec<(Expr, Expr)>,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStart {
    UnboundedPreceding,
    Preceding(u64),
}

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Box<Expr>,
    pub desc: bool,
    pub frame_start: FrameStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFuncKind {
    RowNumber,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Variance,
    Stddev,
}

#[derive(Debug, Clone)]
pub struct WindowExpr {
    pub func: WindowFuncKind,
    pub arg: Option<Box<Expr>>,
    pub spec: WindowSpec,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Column { table: Option<String>, name: String },
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Concat(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Like(Box<Expr>, String),
    InList(Box<Expr>, Vec<Expr>),
    InSubquery(Box<Expr>, Box<SelectStmt>),
    /// Tuple-form multi-column `IN`, always reported as `Unsupported` at
    /// execution time — recorded distinctly from `InSubquery` so the error
    /// message can name the construct precisely.
    InTuple,
    Func(String, Vec<Expr>),
    Window(Box<WindowExpr>),
    /// Parenthesized comma list, e.g. `(a, b)`. Only ever produced while
    /// parsing an `IN` left- or right-hand side; not evaluable on its own.
    Tuple(Vec<Expr>),
}
