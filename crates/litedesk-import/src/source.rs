//! Import source files
//!
//! A source exposes one or more sheets of rows. CSV is a single
//! positional sheet streamed record by record; JSON and YAML documents
//! are parsed once and expose either one named sheet per top-level key
//! (a map of arrays) or a single sheet (a top-level array).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use litedesk_core::{CoreError, Result, Value};

/// Detected file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
    Yaml,
}

/// One sheet of the source.
#[derive(Debug, Clone)]
pub struct SheetInfo {
    pub name: String,
    /// Row count when the format knows it up front; CSV does not.
    pub rows: Option<u64>,
    /// Column names: first-record cells for CSV, key union for
    /// document formats.
    pub columns: Vec<String>,
}

/// What `SourceFile::open` learned about the file.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub format: SourceFormat,
    pub size: u64,
    pub sheets: Vec<SheetInfo>,
}

/// One row out of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRow {
    /// Cells by position (CSV, arrays of scalars).
    Positional(Vec<Value>),
    /// Cells by name (JSON/YAML objects).
    Named(IndexMap<String, Value>),
}

#[derive(Debug)]
enum SourceData {
    /// CSV re-opens the file per iteration and streams.
    Csv,
    /// Parsed document: sheet name to its rows.
    Document(IndexMap<String, Vec<serde_json::Value>>),
}

/// An opened import source.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    info: SourceInfo,
    data: SourceData,
}

impl SourceFile {
    /// Open and inspect a source file. The database is not touched; an
    /// unreadable or unparsable file fails here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)
            .map_err(|e| CoreError::Source(format!("cannot read {}: {}", path.display(), e)))?
            .len();
        let format = detect_format(&path)?;
        tracing::info!(path = %path.display(), ?format, size, "opening import source");

        match format {
            SourceFormat::Csv => {
                let columns = first_csv_record(&path)?;
                let name = sheet_name_from(&path);
                Ok(Self {
                    path,
                    info: SourceInfo {
                        format,
                        size,
                        sheets: vec![SheetInfo {
                            name,
                            rows: None,
                            columns,
                        }],
                    },
                    data: SourceData::Csv,
                })
            }
            SourceFormat::Json | SourceFormat::Yaml => {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    CoreError::Source(format!("cannot read {}: {}", path.display(), e))
                })?;
                let document: serde_json::Value = if format == SourceFormat::Json {
                    serde_json::from_str(&text)
                        .map_err(|e| CoreError::Source(format!("invalid JSON: {}", e)))?
                } else {
                    serde_yaml::from_str(&text)
                        .map_err(|e| CoreError::Source(format!("invalid YAML: {}", e)))?
                };
                let sheets_data = split_into_sheets(document, &sheet_name_from(&path))?;
                let sheets = sheets_data
                    .iter()
                    .map(|(name, rows)| SheetInfo {
                        name: name.clone(),
                        rows: Some(rows.len() as u64),
                        columns: column_union(rows),
                    })
                    .collect();
                Ok(Self {
                    path,
                    info: SourceInfo {
                        format,
                        size,
                        sheets,
                    },
                    data: SourceData::Document(sheets_data),
                })
            }
        }
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetInfo> {
        self.info
            .sheets
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Iterate the rows of one sheet. CSV streams from disk; document
    /// formats iterate the parsed tree.
    pub fn iter_rows(
        &self,
        sheet: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<SourceRow>> + '_>> {
        match &self.data {
            SourceData::Csv => {
                let reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .from_path(&self.path)
                    .map_err(|e| CoreError::Source(format!("cannot read CSV: {}", e)))?;
                Ok(Box::new(reader.into_records().map(|record| {
                    record
                        .map(|r| {
                            SourceRow::Positional(
                                r.iter().map(|cell| Value::Text(cell.to_string())).collect(),
                            )
                        })
                        .map_err(|e| CoreError::Source(format!("CSV read failed: {}", e)))
                })))
            }
            SourceData::Document(sheets) => {
                let rows = sheets
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(sheet))
                    .map(|(_, rows)| rows)
                    .ok_or_else(|| CoreError::Source(format!("no such sheet: {}", sheet)))?;
                Ok(Box::new(rows.iter().map(|row| Ok(convert_row(row)))))
            }
        }
    }
}

fn sheet_name_from(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string())
}

fn detect_format(path: &Path) -> Result<SourceFormat> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" | "tsv" | "txt" => Ok(SourceFormat::Csv),
        "json" => Ok(SourceFormat::Json),
        "yaml" | "yml" => Ok(SourceFormat::Yaml),
        _ => {
            // Sniff: a document start means JSON, otherwise assume CSV.
            let head = std::fs::read_to_string(path)
                .map_err(|e| CoreError::Source(format!("cannot read {}: {}", path.display(), e)))?;
            let trimmed = head.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                Ok(SourceFormat::Json)
            } else {
                Ok(SourceFormat::Csv)
            }
        }
    }
}

fn first_csv_record(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| CoreError::Source(format!("cannot read CSV: {}", e)))?;
    let mut records = reader.records();
    match records.next() {
        Some(Ok(record)) => Ok(record.iter().map(|c| c.to_string()).collect()),
        Some(Err(e)) => Err(CoreError::Source(format!("CSV read failed: {}", e))),
        None => Ok(Vec::new()),
    }
}

/// A top-level map whose values are all arrays becomes one sheet per
/// key; a top-level array becomes a single sheet named after the file.
fn split_into_sheets(
    document: serde_json::Value,
    default_name: &str,
) -> Result<IndexMap<String, Vec<serde_json::Value>>> {
    let mut sheets = IndexMap::new();
    match document {
        serde_json::Value::Object(map)
            if !map.is_empty() && map.values().all(|v| v.is_array()) =>
        {
            for (key, value) in map {
                let serde_json::Value::Array(rows) = value else {
                    unreachable!();
                };
                sheets.insert(key, rows);
            }
        }
        serde_json::Value::Array(rows) => {
            sheets.insert(default_name.to_string(), rows);
        }
        other => {
            sheets.insert(default_name.to_string(), vec![other]);
        }
    }
    Ok(sheets)
}

/// Union of object keys across the first rows, for the sheet listing.
fn column_union(rows: &[serde_json::Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows.iter().take(100) {
        if let serde_json::Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(key)) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

fn convert_row(row: &serde_json::Value) -> SourceRow {
    match row {
        serde_json::Value::Object(map) => SourceRow::Named(
            map.iter()
                .map(|(k, v)| (k.clone(), convert_scalar(v)))
                .collect(),
        ),
        serde_json::Value::Array(cells) => {
            SourceRow::Positional(cells.iter().map(convert_scalar).collect())
        }
        scalar => SourceRow::Positional(vec![convert_scalar(scalar)]),
    }
}

fn convert_scalar(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        // Nested structures flatten to their JSON text.
        nested => Value::Text(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_csv_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "people.csv", "name,age\nalice,31\nbob,45\n");
        let source = SourceFile::open(&path).unwrap();

        let info = source.info();
        assert_eq!(info.format, SourceFormat::Csv);
        assert!(info.size > 0);
        assert_eq!(info.sheets.len(), 1);
        assert_eq!(info.sheets[0].name, "people");
        assert_eq!(info.sheets[0].rows, None);
        assert_eq!(info.sheets[0].columns, vec!["name", "age"]);

        let rows: Vec<_> = source
            .iter_rows("people")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[1],
            SourceRow::Positional(vec![
                Value::Text("alice".into()),
                Value::Text("31".into())
            ])
        );
    }

    #[test]
    fn test_json_map_of_arrays_is_multi_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "dump.json",
            r#"{"users": [{"id": 1, "name": "a"}], "tags": [{"tag": "x"}, {"tag": "y"}]}"#,
        );
        let source = SourceFile::open(&path).unwrap();
        let info = source.info();
        assert_eq!(info.format, SourceFormat::Json);
        assert_eq!(info.sheets.len(), 2);
        assert_eq!(info.sheets[0].name, "users");
        assert_eq!(info.sheets[0].rows, Some(1));
        assert_eq!(info.sheets[1].columns, vec!["tag"]);

        let rows: Vec<_> = source
            .iter_rows("tags")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        let SourceRow::Named(first) = &rows[0] else {
            panic!("expected named row");
        };
        assert_eq!(first["tag"], Value::Text("x".into()));
    }

    #[test]
    fn test_yaml_array_is_single_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "rows.yaml", "- {id: 1, ok: true}\n- {id: 2.5, ok: false}\n");
        let source = SourceFile::open(&path).unwrap();
        assert_eq!(source.info().format, SourceFormat::Yaml);
        assert_eq!(source.info().sheets[0].name, "rows");

        let rows: Vec<_> = source
            .iter_rows("rows")
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        let SourceRow::Named(first) = &rows[0] else {
            panic!("expected named row");
        };
        assert_eq!(first["id"], Value::Integer(1));
        assert_eq!(first["ok"], Value::Integer(1));
        let SourceRow::Named(second) = &rows[1] else {
            panic!("expected named row");
        };
        assert_eq!(second["id"], Value::Real(2.5));
    }

    #[test]
    fn test_unreadable_source_fails_cleanly() {
        let err = SourceFile::open("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CoreError::Source(_)));
    }

    #[test]
    fn test_malformed_json_fails_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.json", "{nope");
        assert!(matches!(
            SourceFile::open(&path).unwrap_err(),
            CoreError::Source(_)
        ));
    }
}
