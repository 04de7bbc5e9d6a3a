//! Recursive-descent parser for CREATE TABLE / INDEX / VIEW / TRIGGER
//!
//! Expressions (defaults, checks, trigger bodies, view selects) are kept
//! as verbatim source slices rather than parsed trees: the editor never
//! evaluates them, it only needs to carry them around and re-emit them.

use litedesk_core::{
    ColumnDef, ConstraintKind, ForeignKeyClause, GeneratedColumn, IndexMeta, IndexedColumn,
    ObjectCategory, ObjectMeta, ParseError, TableConstraint, TableMeta, TriggerEvent, TriggerMeta,
    TriggerTiming, ViewMeta,
};
use uuid::Uuid;

use crate::lexer::{Lexer, Token, TokenKind, line_col};

/// Parse exactly one CREATE statement into its structured form.
pub fn parse(sql: &str) -> Result<ObjectMeta, ParseError> {
    let mut parser = Parser::new(sql)?;
    let meta = parser.parse_create()?;
    parser.expect_end()?;
    Ok(meta)
}

/// Parse and verify the statement creates an object of `category`.
pub fn parse_as(sql: &str, category: ObjectCategory) -> Result<ObjectMeta, ParseError> {
    let meta = parse(sql)?;
    if meta.category() != category {
        return Err(ParseError::new(
            1,
            1,
            format!(
                "expected a CREATE {} statement, found CREATE {}",
                category.as_sql_keyword(),
                meta.category().as_sql_keyword()
            ),
        ));
    }
    Ok(meta)
}

/// Keywords that terminate a column's declared type.
const TYPE_STOPPERS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
];

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    /// Index of the next unconsumed token.
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            src,
            tokens: Lexer::tokenize(src)?,
            pos: 0,
        })
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let (line, column) = line_col(self.src, offset);
        ParseError::new(line, column, message)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let offset = self
            .peek()
            .map(|t| t.start)
            .unwrap_or_else(|| self.src.len());
        self.error_at(offset, message)
    }

    /// Next meaningful token, trivia skipped, without consuming.
    fn peek(&self) -> Option<Token> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| !t.kind.is_trivia())
            .copied()
    }

    fn next(&mut self) -> Option<Token> {
        while let Some(token) = self.tokens.get(self.pos).copied() {
            self.pos += 1;
            if !token.kind.is_trivia() {
                return Some(token);
            }
        }
        None
    }

    fn peek_is_kw(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_kw(self.src, kw))
    }

    fn peek_is_punct(&self, c: char) -> bool {
        self.peek().is_some_and(|t| t.kind == TokenKind::Punct(c))
    }

    fn accept_kw(&mut self, kw: &str) -> bool {
        if self.peek_is_kw(kw) {
            self.next();
            true
        } else {
            false
        }
    }

    fn accept_punct(&mut self, c: char) -> bool {
        if self.peek_is_punct(c) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<Token, ParseError> {
        if self.peek_is_kw(kw) {
            Ok(self.next().unwrap())
        } else {
            Err(self.error_here(format!("expected {}", kw)))
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<Token, ParseError> {
        if self.peek_is_punct(c) {
            Ok(self.next().unwrap())
        } else {
            Err(self.error_here(format!("expected '{}'", c)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(t) if t.kind.is_name() => {
                self.next();
                Ok(t.ident_text(self.src))
            }
            _ => Err(self.error_here(format!("expected {}", what))),
        }
    }

    /// Object name, dropping an optional schema qualifier (`main.t`).
    fn expect_object_name(&mut self, what: &str) -> Result<String, ParseError> {
        let mut name = self.expect_ident(what)?;
        if self.accept_punct('.') {
            name = self.expect_ident(what)?;
        }
        Ok(name)
    }

    fn expect_end(&mut self) -> Result<(), ParseError> {
        self.accept_punct(';');
        if let Some(t) = self.peek() {
            return Err(self.error_at(t.start, "unexpected content after statement"));
        }
        Ok(())
    }

    /// Verbatim source between the current position and the first stop,
    /// with parenthesis depth tracking. Stops are only honoured at depth
    /// zero; the stop token itself is not consumed.
    fn capture_until(&mut self, stops: &[Stop]) -> Result<String, ParseError> {
        let begin = self
            .peek()
            .map(|t| t.start)
            .unwrap_or_else(|| self.src.len());
        let mut end = begin;
        let mut depth = 0usize;
        loop {
            let Some(token) = self.peek() else {
                break;
            };
            if depth == 0 && stops.iter().any(|s| s.matches(self.src, token)) {
                break;
            }
            match token.kind {
                TokenKind::Punct('(') => depth += 1,
                TokenKind::Punct(')') => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.next();
            end = token.end;
        }
        Ok(self.src[begin..end].trim().to_string())
    }

    /// Consume `( ... )` and return the inner text, trimmed.
    fn capture_parenthesized(&mut self) -> Result<String, ParseError> {
        self.expect_punct('(')?;
        let inner = self.capture_until(&[])?;
        self.expect_punct(')')?;
        Ok(inner)
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_create(&mut self) -> Result<ObjectMeta, ParseError> {
        self.expect_kw("CREATE")?;
        let _ = self.accept_kw("TEMP") || self.accept_kw("TEMPORARY");

        if self.accept_kw("TABLE") {
            self.accept_if_not_exists();
            self.parse_table().map(ObjectMeta::Table)
        } else if self.accept_kw("UNIQUE") {
            self.expect_kw("INDEX")?;
            self.accept_if_not_exists();
            self.parse_index(true).map(ObjectMeta::Index)
        } else if self.accept_kw("INDEX") {
            self.accept_if_not_exists();
            self.parse_index(false).map(ObjectMeta::Index)
        } else if self.accept_kw("VIEW") {
            self.accept_if_not_exists();
            self.parse_view().map(ObjectMeta::View)
        } else if self.accept_kw("TRIGGER") {
            self.accept_if_not_exists();
            self.parse_trigger().map(ObjectMeta::Trigger)
        } else {
            Err(self.error_here("expected TABLE, INDEX, VIEW or TRIGGER"))
        }
    }

    fn accept_if_not_exists(&mut self) {
        if self.peek_is_kw("IF") {
            self.next();
            let _ = self.accept_kw("NOT");
            let _ = self.accept_kw("EXISTS");
        }
    }

    fn parse_table(&mut self) -> Result<TableMeta, ParseError> {
        let name = self.expect_object_name("table name")?;
        self.expect_punct('(')?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.peek_at_table_constraint() {
                constraints.push(self.parse_table_constraint()?);
            } else {
                columns.push(self.parse_column()?);
            }
            if self.accept_punct(',') {
                continue;
            }
            self.expect_punct(')')?;
            break;
        }

        let mut without_rowid = false;
        loop {
            if self.accept_kw("WITHOUT") {
                self.expect_kw("ROWID")?;
                without_rowid = true;
            } else if self.accept_kw("STRICT") {
                // Accepted, not modelled.
            } else {
                break;
            }
            if !self.accept_punct(',') {
                break;
            }
        }

        if columns.is_empty() {
            return Err(self.error_here("table has no columns"));
        }
        Ok(TableMeta {
            name,
            columns,
            constraints,
            without_rowid,
        })
    }

    fn peek_at_table_constraint(&self) -> bool {
        ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"]
            .iter()
            .any(|kw| self.peek_is_kw(kw))
    }

    fn parse_column(&mut self) -> Result<ColumnDef, ParseError> {
        let name = self.expect_ident("column name")?;
        let mut column = ColumnDef {
            column_id: Uuid::new_v4(),
            name,
            type_name: None,
            not_null: false,
            primary_key: false,
            pk_descending: false,
            autoincrement: false,
            unique: false,
            default: None,
            collate: None,
            check: None,
            references: None,
            generated: None,
        };

        // Declared type: a run of words, optionally followed by a
        // parenthesized size like VARCHAR(10) or DECIMAL(10, 5).
        let mut type_parts: Vec<String> = Vec::new();
        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Word
                || TYPE_STOPPERS
                    .iter()
                    .any(|kw| token.is_kw(self.src, kw))
            {
                break;
            }
            self.next();
            type_parts.push(token.text(self.src).to_string());
        }
        if !type_parts.is_empty() {
            let mut type_name = type_parts.join(" ");
            if self.peek_is_punct('(') {
                let inner = self.capture_parenthesized()?;
                type_name.push_str(&format!("({})", inner));
            }
            column.type_name = Some(type_name);
        }

        // Column constraints, any order.
        loop {
            if self.accept_kw("CONSTRAINT") {
                // Per-column constraint names are accepted and dropped.
                self.expect_ident("constraint name")?;
                continue;
            }
            if self.accept_kw("PRIMARY") {
                self.expect_kw("KEY")?;
                column.primary_key = true;
                if self.accept_kw("DESC") {
                    column.pk_descending = true;
                } else {
                    let _ = self.accept_kw("ASC");
                }
                self.accept_conflict_clause()?;
                if self.accept_kw("AUTOINCREMENT") {
                    column.autoincrement = true;
                }
            } else if self.accept_kw("NOT") {
                self.expect_kw("NULL")?;
                column.not_null = true;
                self.accept_conflict_clause()?;
            } else if self.accept_kw("NULL") {
                self.accept_conflict_clause()?;
            } else if self.accept_kw("UNIQUE") {
                column.unique = true;
                self.accept_conflict_clause()?;
            } else if self.accept_kw("CHECK") {
                column.check = Some(self.capture_parenthesized()?);
            } else if self.accept_kw("DEFAULT") {
                column.default = Some(self.parse_default_value()?);
            } else if self.accept_kw("COLLATE") {
                column.collate = Some(self.expect_ident("collation name")?);
            } else if self.accept_kw("REFERENCES") {
                column.references = Some(self.parse_references_clause()?);
            } else if self.peek_is_kw("GENERATED") || self.peek_is_kw("AS") {
                if self.accept_kw("GENERATED") {
                    self.expect_kw("ALWAYS")?;
                }
                self.expect_kw("AS")?;
                let expr = self.capture_parenthesized()?;
                let stored = self.accept_kw("STORED");
                if !stored {
                    let _ = self.accept_kw("VIRTUAL");
                }
                column.generated = Some(GeneratedColumn { expr, stored });
            } else {
                break;
            }
        }
        Ok(column)
    }

    /// DEFAULT value, verbatim. A parenthesized expression keeps its
    /// parentheses so callers can tell it apart from a plain literal.
    fn parse_default_value(&mut self) -> Result<String, ParseError> {
        if self.peek_is_punct('(') {
            let open = self.next().unwrap();
            let _ = self.capture_until(&[])?;
            let close = self.expect_punct(')')?;
            return Ok(self.src[open.start..close.end].to_string());
        }
        // Signed number
        if self.peek_is_punct('-') || self.peek_is_punct('+') {
            let sign = self.next().unwrap();
            let number = self.next().ok_or_else(|| self.error_here("expected number"))?;
            if number.kind != TokenKind::Number {
                return Err(self.error_at(number.start, "expected number after sign"));
            }
            return Ok(format!(
                "{}{}",
                sign.text(self.src),
                number.text(self.src)
            ));
        }
        match self.peek() {
            Some(t)
                if matches!(
                    t.kind,
                    TokenKind::Number | TokenKind::String | TokenKind::Blob | TokenKind::Word
                ) =>
            {
                self.next();
                Ok(t.text(self.src).to_string())
            }
            _ => Err(self.error_here("expected default value")),
        }
    }

    fn accept_conflict_clause(&mut self) -> Result<Option<String>, ParseError> {
        if self.accept_kw("ON") {
            self.expect_kw("CONFLICT")?;
            let action = self.expect_ident("conflict action")?;
            return Ok(Some(action.to_ascii_uppercase()));
        }
        Ok(None)
    }

    fn parse_references_clause(&mut self) -> Result<ForeignKeyClause, ParseError> {
        let table = self.expect_object_name("referenced table")?;
        let mut columns = Vec::new();
        if self.peek_is_punct('(') {
            self.expect_punct('(')?;
            loop {
                columns.push(self.expect_ident("referenced column")?);
                if !self.accept_punct(',') {
                    break;
                }
            }
            self.expect_punct(')')?;
        }

        let mut clause = ForeignKeyClause {
            table,
            columns,
            on_delete: None,
            on_update: None,
            deferred: false,
        };
        loop {
            if self.accept_kw("ON") {
                let is_delete = if self.accept_kw("DELETE") {
                    true
                } else {
                    self.expect_kw("UPDATE")?;
                    false
                };
                let action = self.parse_fk_action()?;
                if is_delete {
                    clause.on_delete = Some(action);
                } else {
                    clause.on_update = Some(action);
                }
            } else if self.accept_kw("MATCH") {
                self.expect_ident("match type")?;
            } else if self.accept_kw("NOT") {
                self.expect_kw("DEFERRABLE")?;
                self.accept_initially()?;
            } else if self.accept_kw("DEFERRABLE") {
                if let Some(initially) = self.accept_initially()? {
                    clause.deferred = initially.eq_ignore_ascii_case("DEFERRED");
                }
            } else {
                break;
            }
        }
        Ok(clause)
    }

    fn accept_initially(&mut self) -> Result<Option<String>, ParseError> {
        if self.accept_kw("INITIALLY") {
            let mode = self.expect_ident("DEFERRED or IMMEDIATE")?;
            return Ok(Some(mode));
        }
        Ok(None)
    }

    fn parse_fk_action(&mut self) -> Result<String, ParseError> {
        if self.accept_kw("SET") {
            let what = self.expect_ident("NULL or DEFAULT")?;
            Ok(format!("SET {}", what.to_ascii_uppercase()))
        } else if self.accept_kw("CASCADE") {
            Ok("CASCADE".into())
        } else if self.accept_kw("RESTRICT") {
            Ok("RESTRICT".into())
        } else if self.accept_kw("NO") {
            self.expect_kw("ACTION")?;
            Ok("NO ACTION".into())
        } else {
            Err(self.error_here("expected foreign key action"))
        }
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint, ParseError> {
        let name = if self.accept_kw("CONSTRAINT") {
            Some(self.expect_ident("constraint name")?)
        } else {
            None
        };

        if self.accept_kw("PRIMARY") {
            self.expect_kw("KEY")?;
            let columns = self.parse_key_column_list()?;
            let conflict_clause = self.accept_conflict_clause()?;
            Ok(TableConstraint {
                kind: ConstraintKind::PrimaryKey,
                name,
                columns,
                check_expr: None,
                foreign_key: None,
                conflict_clause,
            })
        } else if self.accept_kw("UNIQUE") {
            let columns = self.parse_key_column_list()?;
            let conflict_clause = self.accept_conflict_clause()?;
            Ok(TableConstraint {
                kind: ConstraintKind::Unique,
                name,
                columns,
                check_expr: None,
                foreign_key: None,
                conflict_clause,
            })
        } else if self.accept_kw("CHECK") {
            let expr = self.capture_parenthesized()?;
            Ok(TableConstraint {
                kind: ConstraintKind::Check,
                name,
                columns: Vec::new(),
                check_expr: Some(expr),
                foreign_key: None,
                conflict_clause: None,
            })
        } else if self.accept_kw("FOREIGN") {
            self.expect_kw("KEY")?;
            let columns = self.parse_key_column_list()?;
            self.expect_kw("REFERENCES")?;
            let foreign_key = self.parse_references_clause()?;
            Ok(TableConstraint {
                kind: ConstraintKind::ForeignKey,
                name,
                columns,
                check_expr: None,
                foreign_key: Some(foreign_key),
                conflict_clause: None,
            })
        } else {
            Err(self.error_here("expected table constraint"))
        }
    }

    /// `( col [COLLATE c] [ASC|DESC], ... )` keeping only the names.
    fn parse_key_column_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_punct('(')?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.expect_ident("column name")?);
            if self.accept_kw("COLLATE") {
                self.expect_ident("collation name")?;
            }
            let _ = self.accept_kw("ASC") || self.accept_kw("DESC");
            if !self.accept_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;
        Ok(columns)
    }

    fn parse_index(&mut self, unique: bool) -> Result<IndexMeta, ParseError> {
        let name = self.expect_object_name("index name")?;
        self.expect_kw("ON")?;
        let table = self.expect_object_name("table name")?;

        self.expect_punct('(')?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_indexed_column()?);
            if !self.accept_punct(',') {
                break;
            }
        }
        self.expect_punct(')')?;

        let where_expr = if self.accept_kw("WHERE") {
            Some(self.capture_until(&[Stop::Punct(';')])?)
        } else {
            None
        };

        Ok(IndexMeta {
            name,
            table,
            unique,
            columns,
            where_expr,
        })
    }

    fn parse_indexed_column(&mut self) -> Result<IndexedColumn, ParseError> {
        // Plain column reference when a lone name is followed by one of
        // the clause keywords or the list continues; otherwise an
        // expression captured verbatim.
        let save = self.pos;
        if let Some(token) = self.peek() {
            if token.kind.is_name() {
                self.next();
                let mut column = IndexedColumn {
                    expr: token.ident_text(self.src),
                    descending: false,
                    collate: None,
                };
                if self.accept_kw("COLLATE") {
                    column.collate = Some(self.expect_ident("collation name")?);
                }
                if self.accept_kw("DESC") {
                    column.descending = true;
                } else {
                    let _ = self.accept_kw("ASC");
                }
                if self.peek_is_punct(',') || self.peek_is_punct(')') {
                    return Ok(column);
                }
                self.pos = save;
            }
        }
        let expr = self.capture_until(&[
            Stop::Punct(','),
            Stop::Kw("COLLATE"),
            Stop::Kw("ASC"),
            Stop::Kw("DESC"),
        ])?;
        if expr.is_empty() {
            return Err(self.error_here("expected indexed column"));
        }
        let mut column = IndexedColumn {
            expr,
            descending: false,
            collate: None,
        };
        if self.accept_kw("COLLATE") {
            column.collate = Some(self.expect_ident("collation name")?);
        }
        if self.accept_kw("DESC") {
            column.descending = true;
        } else {
            let _ = self.accept_kw("ASC");
        }
        Ok(column)
    }

    fn parse_view(&mut self) -> Result<ViewMeta, ParseError> {
        let name = self.expect_object_name("view name")?;
        let mut columns = Vec::new();
        if self.peek_is_punct('(') {
            self.expect_punct('(')?;
            loop {
                columns.push(self.expect_ident("column name")?);
                if !self.accept_punct(',') {
                    break;
                }
            }
            self.expect_punct(')')?;
        }
        self.expect_kw("AS")?;
        let select = self.capture_until(&[Stop::Punct(';')])?;
        if select.is_empty() {
            return Err(self.error_here("expected SELECT body"));
        }
        Ok(ViewMeta {
            name,
            columns,
            select,
        })
    }

    fn parse_trigger(&mut self) -> Result<TriggerMeta, ParseError> {
        let name = self.expect_object_name("trigger name")?;

        let timing = if self.accept_kw("BEFORE") {
            TriggerTiming::Before
        } else if self.accept_kw("AFTER") {
            TriggerTiming::After
        } else if self.accept_kw("INSTEAD") {
            self.expect_kw("OF")?;
            TriggerTiming::InsteadOf
        } else {
            TriggerTiming::After
        };

        let event = if self.accept_kw("DELETE") {
            TriggerEvent::Delete
        } else if self.accept_kw("INSERT") {
            TriggerEvent::Insert
        } else if self.accept_kw("UPDATE") {
            let mut columns = Vec::new();
            if self.accept_kw("OF") {
                loop {
                    columns.push(self.expect_ident("column name")?);
                    if !self.accept_punct(',') {
                        break;
                    }
                }
            }
            TriggerEvent::Update(columns)
        } else {
            return Err(self.error_here("expected DELETE, INSERT or UPDATE"));
        };

        self.expect_kw("ON")?;
        let table = self.expect_object_name("table name")?;

        let mut for_each_row = false;
        if self.accept_kw("FOR") {
            self.expect_kw("EACH")?;
            self.expect_kw("ROW")?;
            for_each_row = true;
        }

        let when = if self.accept_kw("WHEN") {
            Some(self.capture_until(&[Stop::Kw("BEGIN")])?)
        } else {
            None
        };

        self.expect_kw("BEGIN")?;
        let mut body = Vec::new();
        loop {
            if self.peek_is_kw("END") {
                self.next();
                break;
            }
            if self.peek().is_none() {
                return Err(self.error_here("expected END"));
            }
            let statement = self.capture_until(&[Stop::Punct(';')])?;
            self.expect_punct(';')?;
            if !statement.is_empty() {
                body.push(statement);
            }
        }

        if body.is_empty() {
            return Err(self.error_here("trigger body is empty"));
        }
        Ok(TriggerMeta {
            name,
            table,
            timing,
            event,
            for_each_row,
            when,
            body,
        })
    }
}

/// A stop condition for verbatim capture.
enum Stop {
    Punct(char),
    Kw(&'static str),
}

impl Stop {
    fn matches(&self, src: &str, token: Token) -> bool {
        match self {
            Stop::Punct(c) => token.kind == TokenKind::Punct(*c),
            Stop::Kw(kw) => token.is_kw(src, kw),
        }
    }
}

#[cfg(test)]
mod tests;
