//! Rename-map transformation of SQL text
//!
//! Rewrites identifier tokens that resolve to a renamed table or column
//! and re-emits every other token verbatim, so comments, whitespace and
//! the quoting of untouched identifiers survive the rewrite.

use indexmap::IndexMap;
use litedesk_core::{ParseError, ident_key, quote_ident};

use crate::lexer::{Lexer, QuoteStyle, Token, TokenKind};

/// Old-name to new-name mapping for tables and per-table columns.
#[derive(Debug, Clone, Default)]
pub struct RenameMap {
    /// `ident_key(old table)` to new table name.
    tables: IndexMap<String, String>,
    /// `ident_key(table)` to (`ident_key(old column)` to new column name).
    columns: IndexMap<String, IndexMap<String, String>>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.values().all(|m| m.is_empty())
    }

    pub fn rename_table(&mut self, old: &str, new: impl Into<String>) {
        self.tables.insert(ident_key(old), new.into());
    }

    pub fn rename_column(&mut self, table: &str, old: &str, new: impl Into<String>) {
        self.columns
            .entry(ident_key(table))
            .or_default()
            .insert(ident_key(old), new.into());
    }

    pub fn table_target(&self, name: &str) -> Option<&str> {
        self.tables.get(&ident_key(name)).map(|s| s.as_str())
    }

    pub fn column_target(&self, table: &str, column: &str) -> Option<&str> {
        self.columns
            .get(&ident_key(table))?
            .get(&ident_key(column))
            .map(|s| s.as_str())
    }

    /// Column target across every table map, when the name resolves to
    /// exactly one rename. Used for unqualified references.
    pub fn column_target_any(&self, column: &str) -> Option<&str> {
        let key = ident_key(column);
        let mut found: Option<&str> = None;
        for map in self.columns.values() {
            if let Some(new) = map.get(&key) {
                if found.is_some_and(|f| f != new.as_str()) {
                    return None;
                }
                found = Some(new.as_str());
            }
        }
        found
    }
}

/// Apply the rename map to a statement, preserving everything else.
pub fn transform(sql: &str, renames: &RenameMap) -> Result<String, ParseError> {
    let tokens = Lexer::tokenize(sql)?;
    if renames.is_empty() {
        return Ok(sql.to_string());
    }

    // Indices of meaningful tokens, for context lookups.
    let meaningful: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.kind.is_trivia())
        .map(|(i, _)| i)
        .collect();
    let position_of: IndexMap<usize, usize> = meaningful
        .iter()
        .enumerate()
        .map(|(pos, &i)| (i, pos))
        .collect();

    let mut out = String::with_capacity(sql.len());
    for (i, token) in tokens.iter().enumerate() {
        if !token.kind.is_name() {
            out.push_str(token.text(sql));
            continue;
        }
        let name = token.ident_text(sql);
        let pos = position_of[&i];
        let prev = pos
            .checked_sub(1)
            .map(|p| tokens[meaningful[p]])
            .filter(|t| t.kind == TokenKind::Punct('.'));
        let next_is_dot = meaningful
            .get(pos + 1)
            .is_some_and(|&n| tokens[n].kind == TokenKind::Punct('.'));

        let target = if next_is_dot {
            // Qualifier position: a table (or alias) reference.
            renames.table_target(&name)
        } else if prev.is_some() {
            // Qualified column: resolve through the qualifier when it
            // names a mapped table, otherwise fall back to the unique
            // column match (the qualifier may be an alias).
            let qualifier = pos
                .checked_sub(2)
                .map(|p| tokens[meaningful[p]])
                .filter(|t| t.kind.is_name())
                .map(|t| t.ident_text(sql));
            match qualifier {
                Some(q) if renames.columns.contains_key(&ident_key(&q)) => {
                    renames.column_target(&q, &name)
                }
                _ => renames.column_target_any(&name),
            }
        } else {
            renames
                .table_target(&name)
                .or_else(|| renames.column_target_any(&name))
        };

        match target {
            Some(new_name) => out.push_str(&requote(token, new_name)),
            None => out.push_str(token.text(sql)),
        }
    }
    Ok(out)
}

/// Emit a renamed identifier in the original token's quoting style.
fn requote(token: &Token, new_name: &str) -> String {
    match token.kind {
        TokenKind::QuotedIdent(QuoteStyle::Double) => {
            format!("\"{}\"", new_name.replace('"', "\"\""))
        }
        TokenKind::QuotedIdent(QuoteStyle::Backtick) => {
            format!("`{}`", new_name.replace('`', "``"))
        }
        TokenKind::QuotedIdent(QuoteStyle::Bracket) => format!("[{}]", new_name),
        _ => quote_ident(new_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table_rename(old: &str, new: &str) -> RenameMap {
        let mut map = RenameMap::new();
        map.rename_table(old, new);
        map
    }

    #[test]
    fn test_table_rename_in_index() {
        let map = table_rename("people", "persons");
        let sql = "CREATE INDEX idx ON people (name)";
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE INDEX idx ON persons (name)"
        );
    }

    #[test]
    fn test_column_rename_keeps_comments_and_whitespace() {
        let mut map = RenameMap::new();
        map.rename_column("t", "a", "aa");
        let sql = "CREATE INDEX i ON t ( -- keep me\n  a )";
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE INDEX i ON t ( -- keep me\n  aa )"
        );
    }

    #[test]
    fn test_qualified_column_rename() {
        let mut map = RenameMap::new();
        map.rename_column("t", "a", "aa");
        let sql = "CREATE VIEW v AS SELECT t.a, u.a FROM t, u";
        // u has no column map, so the unique-match fallback also moves
        // its unqualified reference.
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE VIEW v AS SELECT t.aa, u.aa FROM t, u"
        );
    }

    #[test]
    fn test_quoting_style_preserved() {
        let mut map = RenameMap::new();
        map.rename_table("old t", "new t");
        let sql = "CREATE INDEX i ON \"old t\" (a)";
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE INDEX i ON \"new t\" (a)"
        );
    }

    #[test]
    fn test_new_name_gets_quoted_when_needed() {
        let map = table_rename("t", "new table");
        let sql = "CREATE INDEX i ON t (a)";
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE INDEX i ON \"new table\" (a)"
        );
    }

    #[test]
    fn test_strings_are_never_touched() {
        let map = table_rename("t", "x");
        let sql = "CREATE VIEW v AS SELECT 't' FROM t";
        assert_eq!(
            transform(sql, &map).unwrap(),
            "CREATE VIEW v AS SELECT 't' FROM x"
        );
    }

    #[test]
    fn test_empty_map_is_identity() {
        let sql = "CREATE TABLE t (a INT) -- trailing";
        assert_eq!(transform(sql, &RenameMap::new()).unwrap(), sql);
    }

    #[test]
    fn test_ambiguous_unqualified_column_is_left_alone() {
        let mut map = RenameMap::new();
        map.rename_column("t", "a", "x");
        map.rename_column("u", "a", "y");
        let sql = "CREATE VIEW v AS SELECT a FROM t";
        assert_eq!(transform(sql, &map).unwrap(), sql);
    }
}
