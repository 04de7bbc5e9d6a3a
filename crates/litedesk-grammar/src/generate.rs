//! Canonical DDL generation from parsed metadata

use litedesk_core::{
    ColumnDef, ConstraintKind, ForeignKeyClause, IndexMeta, ObjectMeta, TableConstraint, TableMeta,
    TriggerEvent, TriggerMeta, TriggerTiming, ViewMeta, quote_ident,
};

use crate::lexer::{Lexer, TokenKind};

/// Render canonical DDL text for a parsed object.
///
/// Round-trip law: `parse(generate(meta))` equals `meta` up to the
/// freshly assigned column ids.
pub fn generate(meta: &ObjectMeta) -> String {
    match meta {
        ObjectMeta::Table(t) => generate_table(t),
        ObjectMeta::Index(i) => generate_index(i),
        ObjectMeta::View(v) => generate_view(v),
        ObjectMeta::Trigger(t) => generate_trigger(t),
    }
}

fn generate_table(meta: &TableMeta) -> String {
    let mut body: Vec<String> = meta
        .columns
        .iter()
        .map(|c| format!("  {}", column_def_sql(c)))
        .collect();
    body.extend(
        meta.constraints
            .iter()
            .map(|c| format!("  {}", table_constraint_sql(c))),
    );

    let mut sql = format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_ident(&meta.name),
        body.join(",\n")
    );
    if meta.without_rowid {
        sql.push_str(" WITHOUT ROWID");
    }
    sql
}

/// A single column definition as it appears inside CREATE TABLE.
pub fn column_def_sql(column: &ColumnDef) -> String {
    let mut sql = quote_ident(&column.name);
    if let Some(type_name) = &column.type_name {
        sql.push(' ');
        sql.push_str(type_name);
    }
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
        if column.pk_descending {
            sql.push_str(" DESC");
        }
        if column.autoincrement {
            sql.push_str(" AUTOINCREMENT");
        }
    }
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    if let Some(collate) = &column.collate {
        sql.push_str(" COLLATE ");
        sql.push_str(collate);
    }
    if let Some(check) = &column.check {
        sql.push_str(&format!(" CHECK ({})", check));
    }
    if let Some(references) = &column.references {
        sql.push(' ');
        sql.push_str(&references_sql(references));
    }
    if let Some(generated) = &column.generated {
        sql.push_str(&format!(" GENERATED ALWAYS AS ({})", generated.expr));
        if generated.stored {
            sql.push_str(" STORED");
        }
    }
    sql
}

fn table_constraint_sql(constraint: &TableConstraint) -> String {
    let mut sql = String::new();
    if let Some(name) = &constraint.name {
        sql.push_str(&format!("CONSTRAINT {} ", quote_ident(name)));
    }
    match constraint.kind {
        ConstraintKind::PrimaryKey => {
            sql.push_str(&format!("PRIMARY KEY ({})", ident_list(&constraint.columns)));
        }
        ConstraintKind::Unique => {
            sql.push_str(&format!("UNIQUE ({})", ident_list(&constraint.columns)));
        }
        ConstraintKind::Check => {
            sql.push_str(&format!(
                "CHECK ({})",
                constraint.check_expr.as_deref().unwrap_or_default()
            ));
        }
        ConstraintKind::ForeignKey => {
            sql.push_str(&format!(
                "FOREIGN KEY ({}) {}",
                ident_list(&constraint.columns),
                references_sql(constraint.foreign_key.as_ref().expect("fk constraint")),
            ));
        }
    }
    if let Some(conflict) = &constraint.conflict_clause {
        sql.push_str(&format!(" ON CONFLICT {}", conflict));
    }
    sql
}

fn references_sql(clause: &ForeignKeyClause) -> String {
    let mut sql = format!("REFERENCES {}", quote_ident(&clause.table));
    if !clause.columns.is_empty() {
        sql.push_str(&format!(" ({})", ident_list(&clause.columns)));
    }
    if let Some(action) = &clause.on_delete {
        sql.push_str(&format!(" ON DELETE {}", action));
    }
    if let Some(action) = &clause.on_update {
        sql.push_str(&format!(" ON UPDATE {}", action));
    }
    if clause.deferred {
        sql.push_str(" DEFERRABLE INITIALLY DEFERRED");
    }
    sql
}

fn generate_index(meta: &IndexMeta) -> String {
    let unique = if meta.unique { "UNIQUE " } else { "" };
    let columns: Vec<String> = meta
        .columns
        .iter()
        .map(|c| {
            // A stored expression is emitted verbatim, a plain column name
            // gets identifier quoting.
            let mut part = if is_plain_name(&c.expr) {
                quote_ident(&c.expr)
            } else {
                c.expr.clone()
            };
            if let Some(collate) = &c.collate {
                part.push_str(&format!(" COLLATE {}", collate));
            }
            if c.descending {
                part.push_str(" DESC");
            }
            part
        })
        .collect();
    let mut sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&meta.name),
        quote_ident(&meta.table),
        columns.join(", ")
    );
    if let Some(where_expr) = &meta.where_expr {
        sql.push_str(&format!(" WHERE {}", where_expr));
    }
    sql
}

fn generate_view(meta: &ViewMeta) -> String {
    let mut sql = format!("CREATE VIEW {}", quote_ident(&meta.name));
    if !meta.columns.is_empty() {
        sql.push_str(&format!(" ({})", ident_list(&meta.columns)));
    }
    sql.push_str(&format!(" AS {}", meta.select));
    sql
}

fn generate_trigger(meta: &TriggerMeta) -> String {
    let timing = match meta.timing {
        TriggerTiming::Before => "BEFORE",
        TriggerTiming::After => "AFTER",
        TriggerTiming::InsteadOf => "INSTEAD OF",
    };
    let event = match &meta.event {
        TriggerEvent::Insert => "INSERT".to_string(),
        TriggerEvent::Delete => "DELETE".to_string(),
        TriggerEvent::Update(columns) if columns.is_empty() => "UPDATE".to_string(),
        TriggerEvent::Update(columns) => format!("UPDATE OF {}", ident_list(columns)),
    };
    let mut sql = format!(
        "CREATE TRIGGER {} {} {} ON {}",
        quote_ident(&meta.name),
        timing,
        event,
        quote_ident(&meta.table)
    );
    if meta.for_each_row {
        sql.push_str(" FOR EACH ROW");
    }
    if let Some(when) = &meta.when {
        sql.push_str(&format!(" WHEN {}", when));
    }
    sql.push_str("\nBEGIN\n");
    for statement in &meta.body {
        sql.push_str(&format!("  {};\n", statement));
    }
    sql.push_str("END");
    sql
}

fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_plain_name(expr: &str) -> bool {
    !expr.is_empty()
        && expr
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

/// Normalize a statement for diffing (`sql0`): comments stripped,
/// whitespace runs outside strings and identifiers collapsed to one
/// space, trailing semicolon dropped. Quoting and identifier case are
/// preserved, which is exactly what the planner's rename-only check
/// needs after column-id substitution.
pub fn canonical_sql(sql: &str) -> String {
    let Ok(tokens) = Lexer::tokenize(sql) else {
        // Unlexable input normalizes by whitespace alone.
        return sql.split_whitespace().collect::<Vec<_>>().join(" ");
    };
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    for token in tokens {
        match token.kind {
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment => {
                pending_space = true;
            }
            _ => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push_str(token.text(sql));
            }
        }
    }
    out.trim_end_matches(';').trim().to_string()
}
