//! Recursive-descent parser over the token stream from [`super::lexer`].
//! Parse errors fail eagerly as position-agnostic `Syntax` errors.

use ndts_core::{ColumnDef, ColumnType, NdtsError, Result};

use super::ast::*;
use super::lexer::{Lexer, Token};

pub fn parse(src: &str) -> Result<Statement> {
    let tokens = Lexer::tokenize(src)?;
    let mut p = Parser { tokens, pos: 0 };
    let stmt = p.parse_statement()?;
    p.expect_eof()?;
    Ok(stmt)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect_eof(&self) -> Result<()> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(NdtsError::syntax("unexpected trailing input"))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(NdtsError::syntax(format!("expected keyword {kw}")))
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<()> {
        if self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(NdtsError::syntax(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(NdtsError::syntax(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.is_keyword("CREATE") {
            return self.parse_create();
        }
        if self.is_keyword("DROP") {
            return self.parse_drop_index().map(Statement::DropIndex);
        }
        if self.is_keyword("INSERT") {
            return self.parse_insert();
        }
        if self.is_keyword("UPSERT") {
            return self.parse_upsert().map(Statement::Upsert);
        }
        self.parse_select().map(Statement::Select)
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword("CREATE")?;
        if self.is_keyword("INDEX") {
            return self.parse_create_index_body().map(Statement::CreateIndex);
        }
        self.parse_create_table_body().map(Statement::CreateTable)
    }

    fn parse_create_index_body(&mut self) -> Result<CreateIndexStmt> {
        self.expect_keyword("INDEX")?;
        let name = self.ident()?;
        self.expect_keyword("ON")?;
        let table = self.ident()?;
        self.expect(&Token::LParen)?;
        let columns = self.parse_ident_list()?;
        self.expect(&Token::RParen)?;
        Ok(CreateIndexStmt { name, table, columns })
    }

    fn parse_drop_index(&mut self) -> Result<DropIndexStmt> {
        self.expect_keyword("DROP")?;
        self.expect_keyword("INDEX")?;
        let name = self.ident()?;
        self.expect_keyword("ON")?;
        let table = self.ident()?;
        Ok(DropIndexStmt { name, table })
    }

    fn parse_create_table_body(&mut self) -> Result<CreateTableStmt> {
        self.expect_keyword("TABLE")?;
        let name = self.ident()?;
        self.expect(&Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            let col_name = self.ident()?;
            let type_name = self.ident()?;
            let col_type = parse_column_type(&type_name)?;
            columns.push(ColumnDef::new(col_name, col_type));
            if self.peek() == &Token::Comma {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(&Token::RParen)?;
        Ok(CreateTableStmt { name, columns })
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.ident()?;
        let columns = self.parse_optional_column_list()?;
        self.expect_keyword("VALUES")?;
        let rows = self.parse_value_rows()?;

        let on_conflict = if self.eat_keyword("ON") {
            self.expect_keyword("CONFLICT")?;
            self.expect(&Token::LParen)?;
            let conflict_columns = self.parse_ident_list()?;
            self.expect(&Token::RParen)?;
            self.expect_keyword("DO")?;
            self.expect_keyword("UPDATE")?;
            self.expect_keyword("SET")?;
            let update_columns = self.parse_set_excluded_list()?;
            Some(UpsertClause { conflict_columns, update_columns })
        } else {
            None
        };

        Ok(Statement::Insert(InsertStmt { table, columns, rows, on_conflict }))
    }

    fn parse_upsert(&mut self) -> Result<UpsertStmt> {
        self.expect_keyword("UPSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.ident()?;
        let columns = self.parse_optional_column_list()?;
        self.expect_keyword("VALUES")?;
        let rows = self.parse_value_rows()?;
        self.expect_keyword("KEY")?;
        self.expect(&Token::LParen)?;
        let conflict_columns = self.parse_ident_list()?;
        self.expect(&Token::RParen)?;

        let update_columns = match &columns {
            Some(cols) => cols.iter().filter(|c| !conflict_columns.contains(c)).cloned().collect(),
            None => Vec::new(),
        };
        Ok(UpsertStmt { table, columns, rows, clause: UpsertClause { conflict_columns, update_columns } })
    }

    fn parse_optional_column_list(&mut self) -> Result<Option<Vec<String>>> {
        if self.peek() == &Token::LParen {
            self.advance();
            let cols = self.parse_ident_list()?;
            self.expect(&Token::RParen)?;
            Ok(Some(cols))
        } else {
            Ok(None)
        }
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>> {
        let mut out = vec![self.ident()?];
        while self.peek() == &Token::Comma {
            self.advance();
            out.push(self.ident()?);
        }
        Ok(out)
    }

    fn parse_set_excluded_list(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        loop {
            let col = self.ident()?;
            self.expect(&Token::Eq)?;
            let excluded = self.ident()?;
            if !excluded.eq_ignore_ascii_case("EXCLUDED") {
                return Err(NdtsError::syntax("only `col = EXCLUDED.col` SET assignments are supported"));
            }
            self.expect(&Token::Dot)?;
            let _ = self.ident()?;
            out.push(col);
            if self.peek() == &Token::Comma {
                self.advance();
                continue;
            }
            break;
        }
        Ok(out)
    }

    fn parse_value_rows(&mut self) -> Result<Vec<Vec<Expr>>> {
        let mut rows = vec![self.parse_value_row()?];
        while self.peek() == &Token::Comma {
            self.advance();
            rows.push(self.parse_value_row()?);
        }
        Ok(rows)
    }

    fn parse_value_row(&mut self) -> Result<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        let mut out = vec![self.parse_expr()?];
        while self.peek() == &Token::Comma {
            self.advance();
            out.push(self.parse_expr()?);
        }
        self.expect(&Token::RParen)?;
        Ok(out)
    }

    fn parse_select(&mut self) -> Result<SelectStmt> {
        let mut ctes = Vec::new();
        if self.eat_keyword("WITH") {
            loop {
                let name = self.ident()?;
                self.expect_keyword("AS")?;
                self.expect(&Token::LParen)?;
                let inner = self.parse_select()?;
                self.expect(&Token::RParen)?;
                ctes.push((name, Box::new(inner)));
                if self.peek() == &Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }

        self.expect_keyword("SELECT")?;
        let columns = self.parse_select_list()?;
        self.expect_keyword("FROM")?;
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        loop {
            let kind = if self.eat_keyword("INNER") {
                self.expect_keyword("JOIN")?;
                JoinKind::Inner
            } else if self.eat_keyword("LEFT") {
                self.expect_keyword("JOIN")?;
                JoinKind::Left
            } else if self.eat_keyword("JOIN") {
                JoinKind::Inner
            } else {
                break;
            };
            let table = self.parse_table_ref()?;
            self.expect_keyword("ON")?;
            let mut on = vec![self.parse_equi_clause()?];
            while self.eat_keyword("AND") {
                on.push(self.parse_equi_clause()?);
            }
            joins.push(Join { kind, table, on });
        }

        let where_clause = if self.eat_keyword("WHERE") { Some(self.parse_expr()?) } else { None };

        let mut group_by = Vec::new();
        if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            group_by.push(self.parse_expr()?);
            while self.peek() == &Token::Comma {
                self.advance();
                group_by.push(self.parse_expr()?);
            }
        }

        let having = if self.eat_keyword("HAVING") {
            if group_by.is_empty() {
                return Err(NdtsError::syntax("HAVING without GROUP BY"));
            }
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            order_by.push(self.parse_order_item()?);
            while self.peek() == &Token::Comma {
                self.advance();
                order_by.push(self.parse_order_item()?);
            }
        }

        let limit = if self.eat_keyword("LIMIT") { Some(self.parse_usize()?) } else { None };
        let offset = if self.eat_keyword("OFFSET") { Some(self.parse_usize()?) } else { None };

        Ok(SelectStmt { ctes, columns, from, joins, where_clause, group_by, having, order_by, limit, offset })
    }

    fn parse_usize(&mut self) -> Result<usize> {
        match self.advance() {
            Token::IntLit(n) if n >= 0 => Ok(n as usize),
            other => Err(NdtsError::syntax(format!("expected non-negative integer, found {other:?}"))),
        }
    }

    fn parse_equi_clause(&mut self) -> Result<(Expr, Expr)> {
        let left = self.parse_concat_expr()?;
        self.expect(&Token::Eq)?;
        let right = self.parse_concat_expr()?;
        Ok((left, right))
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>> {
        if self.peek() == &Token::Star {
            self.advance();
            return Ok(vec![SelectItem::Star]);
        }
        let mut out = vec![self.parse_select_item()?];
        while self.peek() == &Token::Comma {
            self.advance();
            out.push(self.parse_select_item()?);
        }
        Ok(out)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        let expr = self.parse_expr()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.ident()?)
        } else if let Token::Ident(s) = self.peek() {
            if is_reserved(s) {
                None
            } else {
                Some(self.ident()?)
            }
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let name = self.ident()?;
        let alias = if self.eat_keyword("AS") {
            Some(self.ident()?)
        } else if let Token::Ident(s) = self.peek() {
            if is_reserved(s) {
                None
            } else {
                Some(self.ident()?)
            }
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn parse_order_item(&mut self) -> Result<OrderByItem> {
        let expr = self.parse_expr()?;
        let desc = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        Ok(OrderByItem { expr, desc })
    }

    // ---- expression precedence climb: or -> and -> not -> predicate ----

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr> {
        if self.peek() == &Token::LParen {
            if let Some(tuple) = self.try_parse_tuple()? {
                return self.finish_predicate_from(tuple);
            }
        }
        let left = self.parse_concat_expr()?;
        self.finish_predicate_from(left)
    }

    /// Tries to parse a parenthesized comma list at the current position.
    /// Returns `None` (without consuming input) if it's a single
    /// parenthesized expression instead — that case is handled by
    /// `parse_primary`.
    fn try_parse_tuple(&mut self) -> Result<Option<Expr>> {
        let save = self.pos;
        self.advance(); // LParen
        let first = self.parse_expr()?;
        if self.peek() != &Token::Comma {
            self.pos = save;
            return Ok(None);
        }
        let mut items = vec![first];
        while self.peek() == &Token::Comma {
            self.advance();
            items.push(self.parse_expr()?);
        }
        self.expect(&Token::RParen)?;
        Ok(Some(Expr::Tuple(items)))
    }

    fn finish_predicate_from(&mut self, left: Expr) -> Result<Expr> {
        let op = match self.peek() {
            Token::Eq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Lt => Some(BinOp::Lt),
            Token::Gt => Some(BinOp::Gt),
            Token::Le => Some(BinOp::Le),
            Token::Ge => Some(BinOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            if self.peek() == &Token::LParen {
                if let Some(tuple) = self.try_parse_tuple()? {
                    let _ = tuple;
                    return Ok(Expr::InTuple);
                }
            }
            let right = self.parse_concat_expr()?;
            return Ok(Expr::Binary(Box::new(left), op, Box::new(right)));
        }

        if self.is_keyword("LIKE") {
            self.advance();
            let pattern = match self.advance() {
                Token::StringLit(s) => s,
                other => return Err(NdtsError::syntax(format!("expected string after LIKE, found {other:?}"))),
            };
            return Ok(Expr::Like(Box::new(left), pattern));
        }

        if self.is_keyword("IN") {
            self.advance();
            return self.parse_in_rhs(left);
        }

        Ok(left)
    }

    /// `(a, b) IN ((1,2), (3,4))` — multi-column `IN` — is always
    /// `Unsupported` at execution time, so the right-hand side is skipped
    /// syntactically rather than parsed into real tuple expressions.
    fn parse_in_rhs(&mut self, left: Expr) -> Result<Expr> {
        if matches!(left, Expr::Tuple(_)) {
            self.skip_parenthesized_group()?;
            return Ok(Expr::InTuple);
        }

        self.expect(&Token::LParen)?;
        if self.is_keyword("SELECT") || self.is_keyword("WITH") {
            let inner = self.parse_select()?;
            self.expect(&Token::RParen)?;
            return Ok(Expr::InSubquery(Box::new(left), Box::new(inner)));
        }
        if self.peek() == &Token::LParen && self.try_parse_tuple()?.is_some() {
            while self.peek() == &Token::Comma {
                self.advance();
                self.try_parse_tuple()?;
            }
            self.expect(&Token::RParen)?;
            return Ok(Expr::InTuple);
        }

        let mut items = vec![self.parse_expr()?];
        while self.peek() == &Token::Comma {
            self.advance();
            items.push(self.parse_expr()?);
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::InList(Box::new(left), items))
    }

    fn skip_parenthesized_group(&mut self) -> Result<()> {
        self.expect(&Token::LParen)?;
        let mut depth = 1;
        while depth > 0 {
            match self.advance() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                Token::Eof => return Err(NdtsError::syntax("unterminated parenthesized group")),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_concat_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        while self.peek() == &Token::PipePipe {
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Concat(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == &Token::Minus {
            self.advance();
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.peek() == &Token::Plus {
            self.advance();
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::IntLit(n) => Ok(Expr::IntLit(n)),
            Token::FloatLit(f) => Ok(Expr::FloatLit(f)),
            Token::StringLit(s) => Ok(Expr::StringLit(s)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.parse_ident_expr(name),
            other => Err(NdtsError::syntax(format!("unexpected token {other:?} in expression"))),
        }
    }

    fn parse_ident_expr(&mut self, name: String) -> Result<Expr> {
        if self.peek() == &Token::Dot {
            self.advance();
            let col = self.ident()?;
            return Ok(Expr::Column { table: Some(name), name: col });
        }
        if self.peek() == &Token::LParen {
            return self.parse_call(name);
        }
        Ok(Expr::Column { table: None, name })
    }

    fn parse_call(&mut self, name: String) -> Result<Expr> {
        self.advance(); // LParen
        let mut args = Vec::new();
        if self.peek() != &Token::RParen {
            if self.peek() == &Token::Star {
                self.advance();
                args.push(Expr::IntLit(1));
            } else {
                args.push(self.parse_expr()?);
                while self.peek() == &Token::Comma {
                    self.advance();
                    args.push(self.parse_expr()?);
                }
            }
        }
        self.expect(&Token::RParen)?;

        if self.is_keyword("OVER") {
            if let Some(kind) = window_func_kind(&name) {
                self.advance();
                let spec = self.parse_window_spec()?;
                return Ok(Expr::Window(Box::new(WindowExpr { func: kind, arg: args.into_iter().next().map(Box::new), spec })));
            }
        }
        Ok(Expr::Func(name, args))
    }

    fn parse_window_spec(&mut self) -> Result<WindowSpec> {
        self.expect(&Token::LParen)?;
        let mut partition_by = Vec::new();
        if self.eat_keyword("PARTITION") {
            self.expect_keyword("BY")?;
            partition_by.push(self.parse_expr()?);
            while self.peek() == &Token::Comma {
                self.advance();
                partition_by.push(self.parse_expr()?);
            }
        }
        self.expect_keyword("ORDER")?;
        self.expect_keyword("BY")?;
        let order_by = self.parse_expr()?;
        let desc = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };

        let frame_start = if self.eat_keyword("ROWS") {
            self.expect_keyword("BETWEEN")?;
            let start = if self.eat_keyword("UNBOUNDED") {
                self.expect_keyword("PRECEDING")?;
                FrameStart::UnboundedPreceding
            } else {
                let n = self.parse_usize()?;
                self.expect_keyword("PRECEDING")?;
                FrameStart::Preceding(n as u64)
            };
            self.expect_keyword("AND")?;
            self.expect_keyword("CURRENT")?;
            self.expect_keyword("ROW")?;
            start
        } else {
            FrameStart::UnboundedPreceding
        };

        self.expect(&Token::RParen)?;
        Ok(WindowSpec { partition_by, order_by: Box::new(order_by), desc, frame_start })
    }
}

fn parse_column_type(name: &str) -> Result<ColumnType> {
    match name.to_ascii_lowercase().as_str() {
        "i16" => Ok(ColumnType::I16),
        "i32" => Ok(ColumnType::I32),
        "i64" => Ok(ColumnType::I64),
        "f64" => Ok(ColumnType::F64),
        "string" => Ok(ColumnType::String),
        other => Err(NdtsError::syntax(format!("unknown column type {other}"))),
    }
}

fn window_func_kind(name: &str) -> Option<WindowFuncKind> {
    match name.to_ascii_uppercase().as_str() {
        "ROW_NUMBER" => Some(WindowFuncKind::RowNumber),
        "COUNT" => Some(WindowFuncKind::Count),
        "SUM" => Some(WindowFuncKind::Sum),
        "AVG" => Some(WindowFuncKind::Avg),
        "MIN" => Some(WindowFuncKind::Min),
        "MAX" => Some(WindowFuncKind::Max),
        "VARIANCE" | "VAR" => Some(WindowFuncKind::Variance),
        "STDDEV" | "STD" => Some(WindowFuncKind::Stddev),
        _ => None,
    }
}

fn is_reserved(s: &str) -> bool {
    matches!(
        s.to_ascii_uppercase().as_str(),
        "FROM"
            | "WHERE"
            | "GROUP"
            | "HAVING"
            | "ORDER"
            | "LIMIT"
            | "OFFSET"
            | "JOIN"
            | "INNER"
            | "LEFT"
            | "ON"
            | "AND"
            | "OR"
            | "NOT"
            | "AS"
    )
}
