//! Executes a parsed [`super::ast::Statement`] against a catalog of
//! in-memory [`Table`]s: CTE materialization, equi-joins, WHERE, GROUP BY /
//! HAVING, window functions, ORDER BY / LIMIT / OFFSET, and UPSERT.
//!
//! WHERE evaluation is two-staged when the query has no joins: an index
//! probe first narrows to a candidate row set using any of the base
//! table's registered [`crate::table::TableIndex`]es whose columns match a
//! leading run of AND-ed equality/range conjuncts, then the residual
//! filter re-evaluates the full predicate over that candidate set. A probe
//! miss (no matching index, or a join in play) just runs the residual
//! filter over every row, same as before — the probe only ever narrows the
//! candidate set, so imprecision in how it merges conjuncts can't produce
//! wrong results, only a less-optimal candidate set.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::Bound;

use ndts_core::{ColumnDef, ColumnType, NdtsError, Result, Schema, Value};

use crate::table::Table;

use super::ast::*;
use super::window;

pub enum QueryOutcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<Value>> },
    /// INSERT/UPSERT: insert-count + update-count. CREATE TABLE: always 0.
    Affected(usize),
}

pub type Catalog = HashMap<String, Table>;

pub fn execute(stmt: &Statement, catalog: &mut Catalog) -> Result<QueryOutcome> {
    match stmt {
        Statement::CreateTable(c) => exec_create_table(c, catalog),
        Statement::CreateIndex(c) => exec_create_index(c, catalog),
        Statement::DropIndex(d) => exec_drop_index(d, catalog),
        Statement::Insert(i) => exec_insert(i, catalog),
        Statement::Upsert(u) => exec_upsert(u, catalog),
        Statement::Select(s) => {
            let empty = HashMap::new();
            let (columns, rows) = exec_select(s, catalog, &empty)?;
            Ok(QueryOutcome::Rows { columns, rows })
        }
    }
}

// ---------------------------------------------------------------------
// DDL / DML
// ---------------------------------------------------------------------

fn exec_create_table(stmt: &CreateTableStmt, catalog: &mut Catalog) -> Result<QueryOutcome> {
    if catalog.contains_key(&stmt.name) {
        return Err(NdtsError::Invariant(format!("table {} already exists", stmt.name)));
    }
    catalog.insert(stmt.name.clone(), Table::create(Schema::new(stmt.columns.clone()), 0));
    Ok(QueryOutcome::Affected(0))
}

fn exec_create_index(stmt: &CreateIndexStmt, catalog: &mut Catalog) -> Result<QueryOutcome> {
    let table = catalog.get_mut(&stmt.table).ok_or_else(|| NdtsError::not_found(format!("table {}", stmt.table)))?;
    table.create_index(&stmt.name, &stmt.columns)?;
    Ok(QueryOutcome::Affected(0))
}

fn exec_drop_index(stmt: &DropIndexStmt, catalog: &mut Catalog) -> Result<QueryOutcome> {
    let table = catalog.get_mut(&stmt.table).ok_or_else(|| NdtsError::not_found(format!("table {}", stmt.table)))?;
    table.drop_index(&stmt.name)?;
    Ok(QueryOutcome::Affected(0))
}

fn resolve_insert_columns(columns: &Option<Vec<String>>, schema: &Schema) -> Result<Vec<usize>> {
    match columns {
        Some(names) => names
            .iter()
            .map(|n| schema.index_of(n).ok_or_else(|| NdtsError::not_found(format!("column {n}"))))
            .collect(),
        None => Ok((0..schema.len()).collect()),
    }
}

fn project_insert_row(exprs: &[Expr], positional: &[usize], width: usize) -> Result<Vec<Value>> {
    if exprs.len() > positional.len() {
        return Err(NdtsError::type_mismatch("more values than target columns"));
    }
    let mut row = vec![Value::Null; width];
    for (expr, &col_idx) in exprs.iter().zip(positional) {
        row[col_idx] = eval_const(expr)?;
    }
    Ok(row)
}

fn exec_insert(stmt: &InsertStmt, catalog: &mut Catalog) -> Result<QueryOutcome> {
    let table = catalog.get_mut(&stmt.table).ok_or_else(|| NdtsError::not_found(format!("table {}", stmt.table)))?;
    let positional = resolve_insert_columns(&stmt.columns, table.schema())?;
    let width = table.schema().len();
    let rows: Vec<Vec<Value>> = stmt.rows.iter().map(|r| project_insert_row(r, &positional, width)).collect::<Result<_>>()?;

    match &stmt.on_conflict {
        None => {
            let count = rows.len();
            table.append_batch(&rows);
            Ok(QueryOutcome::Affected(count))
        }
        Some(clause) => upsert_rows(table, &rows, clause),
    }
}

fn exec_upsert(stmt: &UpsertStmt, catalog: &mut Catalog) -> Result<QueryOutcome> {
    let table = catalog.get_mut(&stmt.table).ok_or_else(|| NdtsError::not_found(format!("table {}", stmt.table)))?;
    let positional = resolve_insert_columns(&stmt.columns, table.schema())?;
    let width = table.schema().len();
    let rows: Vec<Vec<Value>> = stmt.rows.iter().map(|r| project_insert_row(r, &positional, width)).collect::<Result<_>>()?;
    upsert_rows(table, &rows, &stmt.clause)
}

/// `conflict_columns` define a composite key over an in-memory map built
/// from the target table's current contents. For each input row: update in
/// place if the key exists, else append and register the new index.
fn upsert_rows(table: &mut Table, rows: &[Vec<Value>], clause: &UpsertClause) -> Result<QueryOutcome> {
    let schema = table.schema().clone();
    let key_indices: Vec<usize> = clause
        .conflict_columns
        .iter()
        .map(|c| schema.index_of(c).ok_or_else(|| NdtsError::not_found(format!("column {c}"))))
        .collect::<Result<_>>()?;
    let update_indices: Vec<(usize, &str)> = clause
        .update_columns
        .iter()
        .map(|c| schema.index_of(c).map(|i| (i, c.as_str())).ok_or_else(|| NdtsError::not_found(format!("column {c}"))))
        .collect::<Result<_>>()?;

    let key_of = |values: &[Value]| -> String { key_indices.iter().map(|&ix| values[ix].order_key()).collect::<Vec<_>>().join("\u{1}") };

    let mut key_to_index: HashMap<String, usize> = HashMap::new();
    for i in 0..table.row_count() {
        let row = table.row_at(i)?;
        key_to_index.insert(key_of(&row.values), i);
    }

    let mut inserted = 0usize;
    let mut updated = 0usize;
    for row in rows {
        let key = key_of(row);
        if let Some(&idx) = key_to_index.get(&key) {
            let updates: Vec<(&str, Value)> = update_indices.iter().map(|&(ix, name)| (name, row[ix].clone())).collect();
            table.update_row(idx, &updates)?;
            updated += 1;
        } else {
            table.append_row(row);
            key_to_index.insert(key, table.row_count() - 1);
            inserted += 1;
        }
    }
    Ok(QueryOutcome::Affected(inserted + updated))
}

/// Evaluates a `VALUES` cell: literals and arithmetic on literals only. No
/// column or table context exists in an `INSERT`/`UPSERT` row.
fn eval_const(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::IntLit(n) => Ok(Value::I64(*n)),
        Expr::FloatLit(f) => Ok(Value::F64(*f)),
        Expr::StringLit(s) => Ok(Value::Str(s.clone())),
        Expr::Unary(UnaryOp::Neg, inner) => Ok(Value::F64(-eval_const(inner)?.as_f64())),
        Expr::Binary(l, op, r) => Ok(Value::F64(binary_numeric(*op, eval_const(l)?.as_f64(), eval_const(r)?.as_f64()))),
        Expr::Concat(l, r) => Ok(Value::Str(format!("{}{}", eval_const(l)?, eval_const(r)?))),
        other => Err(NdtsError::unsupported(format!("non-constant expression in VALUES: {other:?}"))),
    }
}

fn binary_numeric(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => l / r,
        BinOp::Mod => l % r,
        BinOp::Eq => (l == r) as i32 as f64,
        BinOp::Ne => (l != r) as i32 as f64,
        BinOp::Lt => (l < r) as i32 as f64,
        BinOp::Gt => (l > r) as i32 as f64,
        BinOp::Le => (l <= r) as i32 as f64,
        BinOp::Ge => (l >= r) as i32 as f64,
    }
}

// ---------------------------------------------------------------------
// Combined schema / frame: materializes FROM + JOIN into row-major storage
// ---------------------------------------------------------------------

#[derive(Clone)]
struct ColEntry {
    alias: String,
    name: String,
}

#[derive(Clone, Default)]
struct CombinedSchema {
    entries: Vec<ColEntry>,
}

impl CombinedSchema {
    fn push_all(&mut self, alias: &str, schema: &Schema) {
        for c in &schema.columns {
            self.entries.push(ColEntry { alias: alias.to_string(), name: c.name.clone() });
        }
    }

    fn resolve(&self, table: Option<&str>, name: &str) -> Result<usize> {
        match table {
            Some(t) => self
                .entries
                .iter()
                .position(|e| e.alias == t && e.name == name)
                .ok_or_else(|| NdtsError::not_found(format!("column {t}.{name}"))),
            None => self.entries.iter().position(|e| e.name == name).ok_or_else(|| NdtsError::not_found(format!("column {name}"))),
        }
    }
}

struct Frame {
    schema: CombinedSchema,
    rows: Vec<Vec<Value>>,
}

// ---------------------------------------------------------------------
// Index probe: narrows WHERE evaluation to a candidate row set using the
// base table's registered indexes, before the residual filter re-checks
// the full predicate. Only attempted when the query has no joins, since
// that's the only case where a frame row's position matches the base
// table's row id directly.
// ---------------------------------------------------------------------

fn split_and(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::And(l, r) => {
            let mut out = split_and(l);
            out.extend(split_and(r));
            out
        }
        other => vec![other],
    }
}

fn flip(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Gt => BinOp::Lt,
        BinOp::Le => BinOp::Ge,
        BinOp::Ge => BinOp::Le,
        other => other,
    }
}

/// Recognizes `column op literal` or `literal op column` conjuncts; any
/// other shape (both sides columns, function calls, OR, etc.) isn't
/// probeable and falls through to the residual filter untouched.
fn classify(expr: &Expr) -> Option<(String, BinOp, Value)> {
    let Expr::Binary(l, op, r) = expr else { return None };
    if let Expr::Column { name, .. } = &**l {
        if let Ok(v) = eval_const(r) {
            return Some((name.clone(), *op, v));
        }
    }
    if let Expr::Column { name, .. } = &**r {
        if let Ok(v) = eval_const(l) {
            return Some((name.clone(), flip(*op), v));
        }
    }
    None
}

/// Widens `(lo, hi)` with one more bound. Last-write-wins rather than
/// tightest-bound-wins when several conjuncts bound the same side — the
/// probe only ever narrows to a candidate superset, and the residual
/// filter re-checks every conjunct regardless, so this can't produce a
/// wrong result, only a less-narrow candidate set.
fn merge_range(op: BinOp, value: &Value, lo: &mut Bound<String>, hi: &mut Bound<String>) {
    let key = value.order_key();
    match op {
        BinOp::Lt => *hi = Bound::Excluded(key),
        BinOp::Le => *hi = Bound::Included(key),
        BinOp::Gt => *lo = Bound::Excluded(key),
        BinOp::Ge => *lo = Bound::Included(key),
        _ => {}
    }
}

/// Tries each registered index in turn: an equality run over its leading
/// columns, optionally followed by a range on the column right after that
/// run (a single-column index is just the `matched == 0` case of this).
/// Returns the first index whose columns line up with the predicate.
fn index_probe(table: &Table, where_clause: &Expr) -> Option<Vec<usize>> {
    let conjuncts = split_and(where_clause);
    let classified: Vec<(String, BinOp, Value)> = conjuncts.iter().filter_map(|e| classify(e)).collect();
    if classified.is_empty() {
        return None;
    }
    for (_, index) in table.indexes() {
        let cols = index.columns();
        let mut prefix: Vec<String> = Vec::new();
        let mut matched = 0usize;
        for col in cols {
            match classified.iter().find(|(cn, op, _)| cn == col && *op == BinOp::Eq) {
                Some((_, _, v)) => {
                    prefix.push(v.order_key());
                    matched += 1;
                }
                None => break,
            }
        }
        if matched == cols.len() {
            return Some(index.equal(&prefix));
        }
        if let Some(next_col) = cols.get(matched) {
            let mut lo = Bound::Unbounded;
            let mut hi = Bound::Unbounded;
            let mut has_range = false;
            for (cn, op, v) in &classified {
                if cn == next_col && matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) {
                    merge_range(*op, v, &mut lo, &mut hi);
                    has_range = true;
                }
            }
            if matched > 0 || has_range {
                return Some(index.prefix_range(&prefix, lo, hi));
            }
        }
    }
    None
}

fn resolve_table<'a>(name: &str, catalog: &'a Catalog, ctes: &'a Catalog) -> Result<&'a Table> {
    ctes.get(name).or_else(|| catalog.get(name)).ok_or_else(|| NdtsError::not_found(format!("table {name}")))
}

fn base_frame(table: &Table, alias: &str) -> Result<Frame> {
    let mut schema = CombinedSchema::default();
    schema.push_all(alias, table.schema());
    let mut rows = Vec::with_capacity(table.row_count());
    for i in 0..table.row_count() {
        rows.push(table.row_at(i)?.values);
    }
    Ok(Frame { schema, rows })
}

fn apply_join(frame: Frame, right_table: &Table, right_alias: &str, join: &Join) -> Result<Frame> {
    let mut schema = frame.schema.clone();
    schema.push_all(right_alias, right_table.schema());

    let mut right_rows = Vec::with_capacity(right_table.row_count());
    for i in 0..right_table.row_count() {
        right_rows.push(right_table.row_at(i)?.values);
    }
    let right_width = right_table.schema().len();

    let mut out_rows = Vec::new();
    for left_row in &frame.rows {
        let mut matched = false;
        for right_row in &right_rows {
            let combined: Vec<Value> = left_row.iter().cloned().chain(right_row.iter().cloned()).collect();
            let mut ok = true;
            for (l_expr, r_expr) in &join.on {
                let lv = eval_plain(l_expr, &schema, &combined)?;
                let rv = eval_plain(r_expr, &schema, &combined)?;
                if !values_equal(&lv, &rv) {
                    ok = false;
                    break;
                }
            }
            if ok {
                out_rows.push(combined);
                matched = true;
            }
        }
        if !matched && join.kind == JoinKind::Left {
            let mut combined = left_row.clone();
            combined.extend(std::iter::repeat(Value::Null).take(right_width));
            out_rows.push(combined);
        }
    }
    Ok(Frame { schema, rows: out_rows })
}

/// Evaluates `expr` against a single concrete row with no aggregate/window
/// context. Used for `JOIN ... ON` clauses, which never contain either.
fn eval_plain(expr: &Expr, schema: &CombinedSchema, row: &[Value]) -> Result<Value> {
    let owned = row.to_vec();
    let empty_windows = HashMap::new();
    let empty_subs = HashMap::new();
    let ctx = Ctx { schema, rows: std::slice::from_ref(&owned), window_row_idx: None, windows: &empty_windows, subqueries: &empty_subs };
    eval(expr, &ctx)
}

// ---------------------------------------------------------------------
// Expression evaluation
// ---------------------------------------------------------------------

/// `rows.len() == 1` evaluates an ordinary per-row expression (column refs
/// read `rows[0]`); `rows.len() > 1` is a GROUP BY (or whole-table implicit)
/// aggregation context, where aggregate `Func` nodes reduce over `rows`.
struct Ctx<'a> {
    schema: &'a CombinedSchema,
    rows: &'a [Vec<Value>],
    window_row_idx: Option<usize>,
    windows: &'a HashMap<usize, Vec<f64>>,
    subqueries: &'a HashMap<usize, Vec<Value>>,
}

impl<'a> Ctx<'a> {
    fn single(&self, row: &'a Vec<Value>) -> Ctx<'a> {
        Ctx { schema: self.schema, rows: std::slice::from_ref(row), window_row_idx: None, windows: self.windows, subqueries: self.subqueries }
    }
}

const AGG_NAMES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "FIRST", "LAST", "VARIANCE", "VAR", "STDDEV", "STD"];

fn truthy(v: &Value) -> bool {
    v.as_f64() != 0.0
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Str(_), _) | (_, Value::Str(_)) => false,
        _ => a.as_f64() == b.as_f64(),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Null, _) | (_, Value::Null) => None,
        _ => a.as_f64().partial_cmp(&b.as_f64()),
    }
}

fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let mut dp = vec![vec![false; p.len() + 1]; s.len() + 1];
    dp[0][0] = true;
    for j in 1..=p.len() {
        if p[j - 1] == '%' {
            dp[0][j] = dp[0][j - 1];
        }
    }
    for i in 1..=s.len() {
        for j in 1..=p.len() {
            dp[i][j] = match p[j - 1] {
                '%' => dp[i - 1][j] || dp[i][j - 1],
                '_' => dp[i - 1][j - 1],
                c => c == s[i - 1] && dp[i - 1][j - 1],
            };
        }
    }
    dp[s.len()][p.len()]
}

fn eval(expr: &Expr, ctx: &Ctx) -> Result<Value> {
    match expr {
        Expr::IntLit(n) => Ok(Value::I64(*n)),
        Expr::FloatLit(f) => Ok(Value::F64(*f)),
        Expr::StringLit(s) => Ok(Value::Str(s.clone())),
        Expr::Column { table, name } => {
            let idx = ctx.schema.resolve(table.as_deref(), name)?;
            Ok(ctx.rows[0][idx].clone())
        }
        Expr::Unary(UnaryOp::Neg, inner) => Ok(Value::F64(-eval(inner, ctx)?.as_f64())),
        Expr::Binary(l, op, r) => {
            let lv = eval(l, ctx)?;
            let rv = eval(r, ctx)?;
            match op {
                BinOp::Eq => Ok(bool_value(values_equal(&lv, &rv))),
                BinOp::Ne => Ok(bool_value(!values_equal(&lv, &rv))),
                BinOp::Lt => Ok(bool_value(compare(&lv, &rv) == Some(Ordering::Less))),
                BinOp::Gt => Ok(bool_value(compare(&lv, &rv) == Some(Ordering::Greater))),
                BinOp::Le => Ok(bool_value(matches!(compare(&lv, &rv), Some(Ordering::Less | Ordering::Equal)))),
                BinOp::Ge => Ok(bool_value(matches!(compare(&lv, &rv), Some(Ordering::Greater | Ordering::Equal)))),
                _ => Ok(Value::F64(binary_numeric(*op, lv.as_f64(), rv.as_f64()))),
            }
        }
        Expr::Concat(l, r) => Ok(Value::Str(format!("{}{}", eval(l, ctx)?, eval(r, ctx)?))),
        Expr::And(l, r) => Ok(bool_value(truthy(&eval(l, ctx)?) && truthy(&eval(r, ctx)?))),
        Expr::Or(l, r) => Ok(bool_value(truthy(&eval(l, ctx)?) || truthy(&eval(r, ctx)?))),
        Expr::Not(e) => Ok(bool_value(!truthy(&eval(e, ctx)?))),
        Expr::Like(e, pattern) => Ok(bool_value(like_match(&eval(e, ctx)?.to_string(), pattern))),
        Expr::InList(e, items) => {
            if items.is_empty() {
                return Ok(bool_value(false));
            }
            let v = eval(e, ctx)?;
            for item in items {
                if values_equal(&v, &eval(item, ctx)?) {
                    return Ok(bool_value(true));
                }
            }
            Ok(bool_value(false))
        }
        Expr::InSubquery(e, sub) => {
            let v = eval(e, ctx)?;
            let key = &**sub as *const SelectStmt as usize;
            let list = ctx.subqueries.get(&key).ok_or_else(|| NdtsError::Invariant("subquery result not precomputed".into()))?;
            Ok(bool_value(list.iter().any(|item| values_equal(&v, item))))
        }
        Expr::InTuple => Err(NdtsError::unsupported("multi-column IN is not supported")),
        Expr::Tuple(_) => Err(NdtsError::unsupported("bare tuple expression")),
        Expr::Func(name, args) => eval_func(name, args, ctx),
        Expr::Window(w) => {
            let idx = ctx.window_row_idx.ok_or_else(|| NdtsError::unsupported("window function outside a row context"))?;
            let key = &**w as *const WindowExpr as usize;
            let values = ctx.windows.get(&key).ok_or_else(|| NdtsError::Invariant("window result not precomputed".into()))?;
            Ok(Value::F64(values[idx]))
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::I64(b as i64)
}

fn eval_func(name: &str, args: &[Expr], ctx: &Ctx) -> Result<Value> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "SQRT" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().sqrt())),
        "ABS" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().abs())),
        "LN" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().ln())),
        "LOG" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().log10())),
        "EXP" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().exp())),
        "POW" | "POWER" => Ok(Value::F64(eval(&args[0], ctx)?.as_f64().powf(eval(&args[1], ctx)?.as_f64()))),
        "ROUND" => {
            let x = eval(&args[0], ctx)?.as_f64();
            let digits = match args.get(1) {
                Some(e) => eval(e, ctx)?.as_f64() as i32,
                None => 0,
            };
            let scale = 10f64.powi(digits);
            Ok(Value::F64((x * scale).round() / scale))
        }
        "MIN" | "MAX" if args.len() != 1 => {
            let values: Vec<f64> = args.iter().map(|a| eval(a, ctx).map(|v| v.as_f64())).collect::<Result<_>>()?;
            let reduced = if upper == "MIN" {
                values.into_iter().fold(f64::INFINITY, f64::min)
            } else {
                values.into_iter().fold(f64::NEG_INFINITY, f64::max)
            };
            Ok(Value::F64(reduced))
        }
        _ if AGG_NAMES.contains(&upper.as_str()) && args.len() == 1 => Ok(Value::F64(reduce_agg(&upper, &args[0], ctx)?)),
        other => Err(NdtsError::unsupported(format!("unknown function {other}"))),
    }
}

fn reduce_agg(name: &str, arg: &Expr, ctx: &Ctx) -> Result<f64> {
    if name == "COUNT" {
        let mut count = 0usize;
        for row in ctx.rows {
            if !eval(arg, &ctx.single(row))?.is_null() {
                count += 1;
            }
        }
        return Ok(count as f64);
    }
    let values: Vec<f64> = ctx.rows.iter().map(|row| eval(arg, &ctx.single(row)).map(|v| v.as_f64())).collect::<Result<_>>()?;
    Ok(match name {
        "SUM" => values.iter().sum(),
        "AVG" => {
            if values.is_empty() {
                f64::NAN
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        "MIN" => values.iter().cloned().fold(f64::INFINITY, f64::min),
        "MAX" => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        "FIRST" => values.first().copied().unwrap_or(f64::NAN),
        "LAST" => values.last().copied().unwrap_or(f64::NAN),
        "VARIANCE" | "VAR" => sample_variance(&values),
        "STDDEV" | "STD" => sample_variance(&values).sqrt(),
        other => return Err(NdtsError::unsupported(format!("unknown aggregate {other}"))),
    })
}

fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    let mean = sum / n as f64;
    ((sum_sq - n as f64 * mean * mean) / (n as f64 - 1.0)).max(0.0)
}

fn has_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Func(name, args) => {
            let upper = name.to_ascii_uppercase();
            (AGG_NAMES.contains(&upper.as_str()) && args.len() == 1) || args.iter().any(has_aggregate)
        }
        Expr::Unary(_, e) | Expr::Not(e) | Expr::Like(e, _) => has_aggregate(e),
        Expr::Binary(l, _, r) | Expr::Concat(l, r) | Expr::And(l, r) | Expr::Or(l, r) => has_aggregate(l) || has_aggregate(r),
        Expr::InList(e, items) => has_aggregate(e) || items.iter().any(has_aggregate),
        _ => false,
    }
}

fn collect_windows<'e>(expr: &'e Expr, out: &mut Vec<&'e WindowExpr>) {
    match expr {
        Expr::Window(w) => out.push(w),
        Expr::Unary(_, e) | Expr::Not(e) | Expr::Like(e, _) => collect_windows(e, out),
        Expr::Binary(l, _, r) | Expr::Concat(l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            collect_windows(l, out);
            collect_windows(r, out);
        }
        Expr::InList(e, items) => {
            collect_windows(e, out);
            for i in items {
                collect_windows(i, out);
            }
        }
        Expr::Func(_, args) => {
            for a in args {
                collect_windows(a, out);
            }
        }
        _ => {}
    }
}

fn collect_subqueries<'e>(expr: &'e Expr, out: &mut Vec<&'e SelectStmt>) {
    match expr {
        Expr::InSubquery(_, sub) => out.push(sub),
        Expr::Unary(_, e) | Expr::Not(e) | Expr::Like(e, _) => collect_subqueries(e, out),
        Expr::Binary(l, _, r) | Expr::Concat(l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            collect_subqueries(l, out);
            collect_subqueries(r, out);
        }
        Expr::InList(e, items) => {
            collect_subqueries(e, out);
            for i in items {
                collect_subqueries(i, out);
            }
        }
        Expr::Func(_, args) => {
            for a in args {
                collect_subqueries(a, out);
            }
        }
        _ => {}
    }
}

fn gather_subqueries(stmt: &SelectStmt) -> Vec<&SelectStmt> {
    let mut out = Vec::new();
    if let Some(e) = &stmt.where_clause {
        collect_subqueries(e, &mut out);
    }
    if let Some(e) = &stmt.having {
        collect_subqueries(e, &mut out);
    }
    for item in &stmt.columns {
        if let SelectItem::Expr { expr, .. } = item {
            collect_subqueries(expr, &mut out);
        }
    }
    for ob in &stmt.order_by {
        collect_subqueries(&ob.expr, &mut out);
    }
    for g in &stmt.group_by {
        collect_subqueries(g, &mut out);
    }
    out
}

fn eval_subqueries(stmt: &SelectStmt, catalog: &Catalog, ctes: &Catalog) -> Result<HashMap<usize, Vec<Value>>> {
    let mut out = HashMap::new();
    for sub in gather_subqueries(stmt) {
        let key = sub as *const SelectStmt as usize;
        if out.contains_key(&key) {
            continue;
        }
        let (cols, rows) = exec_select(sub, catalog, ctes)?;
        if cols.len() != 1 {
            return Err(NdtsError::unsupported("sub-select in IN must return a single column"));
        }
        out.insert(key, rows.into_iter().map(|mut r| r.remove(0)).collect());
    }
    Ok(out)
}

fn select_item_names(columns: &[SelectItem], schema: &CombinedSchema) -> Vec<String> {
    let mut out = Vec::new();
    for item in columns {
        match item {
            SelectItem::Star => {
                for e in &schema.entries {
                    out.push(e.name.clone());
                }
            }
            SelectItem::Expr { expr, alias } => {
                if let Some(a) = alias {
                    out.push(a.clone());
                } else if let Expr::Column { name, .. } = expr {
                    out.push(name.clone());
                } else {
                    out.push(format!("col{}", out.len()));
                }
            }
        }
    }
    out
}

/// Computes one window's value aligned to each position in `filtered`:
/// partitions by the concatenation of `PARTITION BY` columns, sorts within
/// the partition by `ORDER BY`, applies the frame, then scatters the
/// computed values back to their original filtered-row positions.
fn compute_window(w: &WindowExpr, schema: &CombinedSchema, filtered: &[(usize, Vec<Value>)], subqueries: &HashMap<usize, Vec<Value>>) -> Result<Vec<f64>> {
    let empty_windows = HashMap::new();
    let mut partitions: HashMap<String, Vec<usize>> = HashMap::new();
    let mut partition_order: Vec<String> = Vec::new();
    for (p, (_, row)) in filtered.iter().enumerate() {
        let ctx = Ctx { schema, rows: std::slice::from_ref(row), window_row_idx: None, windows: &empty_windows, subqueries };
        let mut key = String::new();
        for part_expr in &w.spec.partition_by {
            key.push_str(&eval(part_expr, &ctx)?.order_key());
            key.push('\u{1}');
        }
        if !partitions.contains_key(&key) {
            partition_order.push(key.clone());
        }
        partitions.entry(key).or_default().push(p);
    }

    let mut out = vec![0.0f64; filtered.len()];
    for key in &partition_order {
        let mut members = partitions[key].clone();
        let mut order_vals = Vec::with_capacity(members.len());
        for &p in &members {
            let ctx = Ctx { schema, rows: std::slice::from_ref(&filtered[p].1), window_row_idx: None, windows: &empty_windows, subqueries };
            order_vals.push(eval(&w.spec.order_by, &ctx)?.as_f64());
        }
        let mut zipped: Vec<(usize, f64)> = members.drain(..).zip(order_vals).collect();
        zipped.sort_by(|a, b| {
            let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
            if w.spec.desc {
                ord.reverse()
            } else {
                ord
            }
        });
        let sorted_positions: Vec<usize> = zipped.iter().map(|(p, _)| *p).collect();

        let arg_values: Vec<f64> = match &w.arg {
            Some(arg) => sorted_positions
                .iter()
                .map(|&p| {
                    let ctx = Ctx { schema, rows: std::slice::from_ref(&filtered[p].1), window_row_idx: None, windows: &empty_windows, subqueries };
                    eval(arg, &ctx).map(|v| v.as_f64())
                })
                .collect::<Result<_>>()?,
            None => vec![0.0; sorted_positions.len()],
        };
        let computed = window::compute(&arg_values, &w.spec.frame_start, w.func);
        for (rank, &p) in sorted_positions.iter().enumerate() {
            out[p] = computed[rank];
        }
    }
    Ok(out)
}

fn rows_to_table(columns: &[String], rows: &[Vec<Value>]) -> Table {
    let col_types: Vec<ColumnType> = (0..columns.len())
        .map(|i| rows.iter().find_map(|r| r.get(i).and_then(Value::column_type)).unwrap_or(ColumnType::F64))
        .collect();
    let schema = Schema::new(columns.iter().zip(col_types).map(|(n, t)| ColumnDef::new(n.clone(), t)).collect());
    let mut table = Table::create(schema, rows.len());
    table.append_batch(rows);
    table
}

// ---------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------

pub fn exec_select(stmt: &SelectStmt, catalog: &Catalog, ctes: &Catalog) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    if let Some(result) = try_tail_window(stmt, catalog, ctes)? {
        return Ok(result);
    }
    if let Some(result) = try_partition_tail(stmt, catalog, ctes)? {
        return Ok(result);
    }
    general_select(stmt, catalog, ctes)
}

fn general_select(stmt: &SelectStmt, catalog: &Catalog, ctes: &Catalog) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut combined_ctes = ctes.clone();
    for (name, inner) in &stmt.ctes {
        let (cols, rows) = exec_select(inner, catalog, &combined_ctes)?;
        combined_ctes.insert(name.clone(), rows_to_table(&cols, &rows));
    }

    let base_table = resolve_table(&stmt.from.name, catalog, &combined_ctes)?;
    let base_alias = stmt.from.alias.as_deref().unwrap_or(&stmt.from.name);
    let mut frame = base_frame(base_table, base_alias)?;
    for join in &stmt.joins {
        let right_table = resolve_table(&join.table.name, catalog, &combined_ctes)?;
        let right_alias = join.table.alias.as_deref().unwrap_or(&join.table.name);
        frame = apply_join(frame, right_table, right_alias, join)?;
    }

    let subqueries = eval_subqueries(stmt, catalog, &combined_ctes)?;

    let probe = if stmt.joins.is_empty() { stmt.where_clause.as_ref().and_then(|w| index_probe(base_table, w)) } else { None };

    let empty_windows: HashMap<usize, Vec<f64>> = HashMap::new();
    let mut filtered: Vec<(usize, Vec<Value>)> = Vec::new();
    if let Some(mut candidates) = probe {
        candidates.sort_unstable();
        candidates.dedup();
        for i in candidates {
            let row = frame.rows[i].clone();
            let keep = match &stmt.where_clause {
                Some(e) => {
                    let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(&row), window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
                    truthy(&eval(e, &ctx)?)
                }
                None => true,
            };
            if keep {
                filtered.push((i, row));
            }
        }
    } else {
        for (i, row) in frame.rows.into_iter().enumerate() {
            let keep = match &stmt.where_clause {
                Some(e) => {
                    let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(&row), window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
                    truthy(&eval(e, &ctx)?)
                }
                None => true,
            };
            if keep {
                filtered.push((i, row));
            }
        }
    }

    let mut windows: HashMap<usize, Vec<f64>> = HashMap::new();
    if stmt.group_by.is_empty() {
        let mut exprs = Vec::new();
        for item in &stmt.columns {
            if let SelectItem::Expr { expr, .. } = item {
                collect_windows(expr, &mut exprs);
            }
        }
        for ob in &stmt.order_by {
            collect_windows(&ob.expr, &mut exprs);
        }
        for w in exprs {
            let key = w as *const WindowExpr as usize;
            if windows.contains_key(&key) {
                continue;
            }
            let values = compute_window(w, &frame.schema, &filtered, &subqueries)?;
            windows.insert(key, values);
        }
    }

    let implicit_group = stmt.group_by.is_empty() && stmt.columns.iter().any(|item| matches!(item, SelectItem::Expr { expr, .. } if has_aggregate(expr)));

    // (projected row, row-set used to re-evaluate ORDER BY expressions)
    let mut results: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();

    if stmt.group_by.is_empty() && !implicit_group {
        for (p, (_, row)) in filtered.iter().enumerate() {
            let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(row), window_row_idx: Some(p), windows: &windows, subqueries: &subqueries };
            let mut out_row = Vec::new();
            for item in &stmt.columns {
                match item {
                    SelectItem::Star => out_row.extend(row.clone()),
                    SelectItem::Expr { expr, .. } => out_row.push(eval(expr, &ctx)?),
                }
            }
            results.push((out_row, vec![row.clone()]));
        }
    } else {
        let mut group_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Vec<Value>>> = HashMap::new();
        for (_, row) in &filtered {
            let key = if stmt.group_by.is_empty() {
                String::new()
            } else {
                let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(row), window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
                let mut k = String::new();
                for g in &stmt.group_by {
                    k.push_str(&eval(g, &ctx)?.order_key());
                    k.push('\u{1}');
                }
                k
            };
            if !groups.contains_key(&key) {
                group_order.push(key.clone());
            }
            groups.entry(key).or_default().push(row.clone());
        }

        for key in &group_order {
            let group_rows = &groups[key];
            let gctx = Ctx { schema: &frame.schema, rows: group_rows, window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
            if let Some(having) = &stmt.having {
                if !truthy(&eval(having, &gctx)?) {
                    continue;
                }
            }
            let mut out_row = Vec::new();
            for item in &stmt.columns {
                match item {
                    SelectItem::Star => out_row.extend(group_rows[0].clone()),
                    SelectItem::Expr { expr, .. } => out_row.push(eval(expr, &gctx)?),
                }
            }
            results.push((out_row, group_rows.clone()));
        }
    }

    let col_names = select_item_names(&stmt.columns, &frame.schema);

    let has_star = stmt.columns.iter().any(|i| matches!(i, SelectItem::Star));
    let alias_index: HashMap<String, usize> = if has_star {
        HashMap::new()
    } else {
        stmt.columns
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                SelectItem::Expr { alias: Some(a), .. } => Some((a.clone(), i)),
                _ => None,
            })
            .collect()
    };

    let mut with_keys: Vec<(Vec<Value>, usize, Vec<Value>)> = Vec::with_capacity(results.len());
    for (seq, (out_row, group_rows)) in results.into_iter().enumerate() {
        let mut keys = Vec::with_capacity(stmt.order_by.len());
        for item in &stmt.order_by {
            keys.push(order_value(item, &out_row, &alias_index, &frame.schema, &group_rows, &subqueries)?);
        }
        with_keys.push((out_row, seq, keys));
    }

    with_keys.sort_by(|a, b| {
        for (i, ob) in stmt.order_by.iter().enumerate() {
            let ord = compare(&a.2[i], &b.2[i]).unwrap_or(Ordering::Equal);
            let ord = if ob.desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.1.cmp(&b.1)
    });

    let offset = stmt.offset.unwrap_or(0);
    let limit = stmt.limit.unwrap_or(usize::MAX);
    let final_rows: Vec<Vec<Value>> = with_keys.into_iter().skip(offset).take(limit).map(|(row, _, _)| row).collect();

    Ok((col_names, final_rows))
}

fn order_value(
    item: &OrderByItem,
    out_row: &[Value],
    alias_index: &HashMap<String, usize>,
    schema: &CombinedSchema,
    group_rows: &[Vec<Value>],
    subqueries: &HashMap<usize, Vec<Value>>,
) -> Result<Value> {
    if let Expr::IntLit(n) = &item.expr {
        if *n >= 1 && (*n as usize) <= out_row.len() {
            return Ok(out_row[*n as usize - 1].clone());
        }
    }
    if let Expr::Column { table: None, name } = &item.expr {
        if let Some(&idx) = alias_index.get(name) {
            if idx < out_row.len() {
                return Ok(out_row[idx].clone());
            }
        }
    }
    let empty_windows = HashMap::new();
    let ctx = Ctx { schema, rows: group_rows, window_row_idx: None, windows: &empty_windows, subqueries };
    eval(&item.expr, &ctx)
}

// ---------------------------------------------------------------------
// Fast path (a): ORDER BY col DESC LIMIT 1, identifier + window projections
// whose window ORDER BY is the same column ascending with a ROWS frame —
// compute each window from the ascending-sorted sequence's last position.
// ---------------------------------------------------------------------

fn try_tail_window(stmt: &SelectStmt, catalog: &Catalog, ctes: &Catalog) -> Result<Option<(Vec<String>, Vec<Vec<Value>>)>> {
    if !stmt.ctes.is_empty() || !stmt.group_by.is_empty() || stmt.having.is_some() {
        return Ok(None);
    }
    if stmt.limit != Some(1) || stmt.offset.unwrap_or(0) != 0 || stmt.order_by.len() != 1 {
        return Ok(None);
    }
    let ob = &stmt.order_by[0];
    if !ob.desc {
        return Ok(None);
    }
    let Expr::Column { name: order_col, .. } = &ob.expr else {
        return Ok(None);
    };

    let mut window_items: Vec<&WindowExpr> = Vec::new();
    for item in &stmt.columns {
        match item {
            SelectItem::Star => {}
            SelectItem::Expr { expr: Expr::Column { .. }, .. } => {}
            SelectItem::Expr { expr: Expr::Window(w), .. } => {
                let Expr::Column { name: win_col, .. } = &*w.spec.order_by else {
                    return Ok(None);
                };
                if win_col != order_col || w.spec.desc || !w.spec.partition_by.is_empty() {
                    return Ok(None);
                }
                window_items.push(w);
            }
            _ => return Ok(None),
        }
    }
    if window_items.is_empty() {
        return Ok(None);
    }

    let base_table = resolve_table(&stmt.from.name, catalog, ctes)?;
    let base_alias = stmt.from.alias.as_deref().unwrap_or(&stmt.from.name);
    let mut frame = base_frame(base_table, base_alias)?;
    for join in &stmt.joins {
        let right_table = resolve_table(&join.table.name, catalog, ctes)?;
        let right_alias = join.table.alias.as_deref().unwrap_or(&join.table.name);
        frame = apply_join(frame, right_table, right_alias, join)?;
    }

    let subqueries = eval_subqueries(stmt, catalog, ctes)?;
    let empty_windows: HashMap<usize, Vec<f64>> = HashMap::new();
    let mut filtered: Vec<Vec<Value>> = Vec::new();
    for row in frame.rows {
        let keep = match &stmt.where_clause {
            Some(e) => {
                let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(&row), window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
                truthy(&eval(e, &ctx)?)
            }
            None => true,
        };
        if keep {
            filtered.push(row);
        }
    }

    let col_names = select_item_names(&stmt.columns, &frame.schema);
    if filtered.is_empty() {
        return Ok(Some((col_names, Vec::new())));
    }

    let order_idx = frame.schema.resolve(None, order_col)?;
    filtered.sort_by(|a, b| a[order_idx].as_f64().partial_cmp(&b[order_idx].as_f64()).unwrap_or(Ordering::Equal));

    let mut window_last: HashMap<usize, f64> = HashMap::new();
    for w in &window_items {
        let arg_values: Vec<f64> = match &w.arg {
            Some(arg) => filtered
                .iter()
                .map(|r| {
                    let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(r), window_row_idx: None, windows: &empty_windows, subqueries: &subqueries };
                    eval(arg, &ctx).map(|v| v.as_f64())
                })
                .collect::<Result<_>>()?,
            None => vec![0.0; filtered.len()],
        };
        let computed = window::compute(&arg_values, &w.spec.frame_start, w.func);
        window_last.insert(*w as *const WindowExpr as usize, *computed.last().unwrap());
    }

    let last_row = filtered.last().unwrap().clone();
    let mut out_row = Vec::new();
    for item in &stmt.columns {
        match item {
            SelectItem::Star => out_row.extend(last_row.clone()),
            SelectItem::Expr { expr: Expr::Column { table, name }, .. } => {
                let idx = frame.schema.resolve(table.as_deref(), name)?;
                out_row.push(last_row[idx].clone());
            }
            SelectItem::Expr { expr: Expr::Window(w), .. } => {
                out_row.push(Value::F64(window_last[&(&**w as *const WindowExpr as usize)]));
            }
            _ => unreachable!("filtered by the shape check above"),
        }
    }
    Ok(Some((col_names, vec![out_row])))
}

// ---------------------------------------------------------------------
// Fast path (b): a single CTE keyed by
// `ROW_NUMBER() OVER (PARTITION BY ... ORDER BY col DESC) AS rn`, outer
// query filters `rn = 1` — compute the tail row per partition directly
// instead of materializing and sorting the whole CTE.
// ---------------------------------------------------------------------

fn try_partition_tail(stmt: &SelectStmt, catalog: &Catalog, ctes: &Catalog) -> Result<Option<(Vec<String>, Vec<Vec<Value>>)>> {
    if stmt.ctes.len() != 1 || !stmt.joins.is_empty() || !stmt.group_by.is_empty() || stmt.having.is_some() {
        return Ok(None);
    }
    let (cte_name, cte_stmt) = &stmt.ctes[0];
    if stmt.from.name != *cte_name {
        return Ok(None);
    }

    let Some(Expr::Binary(l, BinOp::Eq, r)) = &stmt.where_clause else {
        return Ok(None);
    };
    let is_rn = |e: &Expr| matches!(e, Expr::Column { name, .. } if name == "rn");
    let is_one = |e: &Expr| matches!(e, Expr::IntLit(1));
    if !((is_rn(l) && is_one(r)) || (is_rn(r) && is_one(l))) {
        return Ok(None);
    }

    if !cte_stmt.ctes.is_empty() || !cte_stmt.joins.is_empty() || !cte_stmt.group_by.is_empty() {
        return Ok(None);
    }
    let mut rn_spec: Option<&WindowSpec> = None;
    for item in &cte_stmt.columns {
        if let SelectItem::Expr { expr: Expr::Window(w), alias: Some(a) } = item {
            if a == "rn" && w.func == WindowFuncKind::RowNumber {
                rn_spec = Some(&w.spec);
            }
        }
    }
    let Some(spec) = rn_spec else {
        return Ok(None);
    };
    if !spec.desc {
        return Ok(None);
    }
    let Expr::Column { name: order_col, .. } = &*spec.order_by else {
        return Ok(None);
    };

    let base_table = resolve_table(&cte_stmt.from.name, catalog, ctes)?;
    let base_alias = cte_stmt.from.alias.as_deref().unwrap_or(&cte_stmt.from.name);
    let frame = base_frame(base_table, base_alias)?;
    let empty_windows: HashMap<usize, Vec<f64>> = HashMap::new();
    let empty_subs: HashMap<usize, Vec<Value>> = HashMap::new();

    let mut filtered = Vec::new();
    for row in frame.rows {
        let keep = match &cte_stmt.where_clause {
            Some(e) => {
                let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(&row), window_row_idx: None, windows: &empty_windows, subqueries: &empty_subs };
                truthy(&eval(e, &ctx)?)
            }
            None => true,
        };
        if keep {
            filtered.push(row);
        }
    }

    let order_idx = frame.schema.resolve(None, order_col)?;
    let mut part_order: Vec<String> = Vec::new();
    let mut part_best: HashMap<String, Vec<Value>> = HashMap::new();
    for row in &filtered {
        let ctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(row), window_row_idx: None, windows: &empty_windows, subqueries: &empty_subs };
        let mut key = String::new();
        for p in &spec.partition_by {
            key.push_str(&eval(p, &ctx)?.order_key());
            key.push('\u{1}');
        }
        match part_best.get(&key) {
            None => {
                part_order.push(key.clone());
                part_best.insert(key, row.clone());
            }
            Some(best) => {
                if row[order_idx].as_f64() > best[order_idx].as_f64() {
                    part_best.insert(key, row.clone());
                }
            }
        }
    }

    let cte_col_names = select_item_names(&cte_stmt.columns, &frame.schema);
    let mut cte_output_schema = CombinedSchema::default();
    for n in &cte_col_names {
        cte_output_schema.entries.push(ColEntry { alias: cte_name.clone(), name: n.clone() });
    }

    let mut cte_rows = Vec::with_capacity(part_order.len());
    for key in &part_order {
        let row = &part_best[key];
        let rctx = Ctx { schema: &frame.schema, rows: std::slice::from_ref(row), window_row_idx: None, windows: &empty_windows, subqueries: &empty_subs };
        let mut cte_row = Vec::with_capacity(cte_stmt.columns.len());
        for item in &cte_stmt.columns {
            match item {
                SelectItem::Star => cte_row.extend(row.clone()),
                SelectItem::Expr { expr: Expr::Window(w), .. } if w.func == WindowFuncKind::RowNumber => cte_row.push(Value::F64(1.0)),
                SelectItem::Expr { expr, .. } => cte_row.push(eval(expr, &rctx)?),
            }
        }
        cte_rows.push(cte_row);
    }

    let mut final_rows = Vec::with_capacity(cte_rows.len());
    for cte_row in &cte_rows {
        let mut out_row = Vec::new();
        for item in &stmt.columns {
            match item {
                SelectItem::Star => out_row.extend(cte_row.clone()),
                SelectItem::Expr { expr: Expr::Column { name, .. }, .. } => {
                    let Some(idx) = cte_col_names.iter().position(|n| n == name) else {
                        return Ok(None);
                    };
                    out_row.push(cte_row[idx].clone());
                }
                _ => return Ok(None),
            }
        }
        final_rows.push(out_row);
    }

    let out_names = select_item_names(&stmt.columns, &cte_output_schema);
    Ok(Some((out_names, final_rows)))
}
