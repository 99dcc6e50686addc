//! Ephemeral SQL engine over a loaded dataset.
//!
//! Every [`QueryEngine::execute`] call opens a private in-memory SQLite
//! connection, loads the dataset into table `df`, runs the query with a row
//! cap, and closes the connection before returning, on both the success and
//! the failure path.  If the caller abandons the future (stage deadline), the
//! connection is dropped with it.

pub mod dataset;
pub mod table;

use futures::TryStreamExt;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column as _, Connection, Executor, Row, Sqlite, SqliteConnection, Statement, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{debug, warn};

use self::dataset::{Dataset, Schema};
use self::table::{Table, Value};

/// Name of the table the dataset is loaded into.
pub const TABLE_NAME: &str = "df";

#[derive(Debug, Error)]
/// All errors the query engine can throw
pub enum EngineError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

/// Remove markdown code fences and a leading `sql` language tag.
pub fn clean_query(raw: &str) -> String {
    let unfenced = raw.replace("```", "");
    let trimmed = unfenced.trim();
    let without_tag = match trimmed.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") => {
            let rest = &trimmed[3..];
            if rest.starts_with(char::is_whitespace) {
                rest
            } else {
                trimmed
            }
        }
        _ => trimmed,
    };
    without_tag.trim().to_owned()
}

/// SQLite column type for a declared schema type.
fn sqlite_type(declared: Option<&String>) -> &'static str {
    match declared.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        Some("int" | "int32" | "int64" | "integer" | "bigint") => "INTEGER",
        Some("float" | "float32" | "float64" | "double" | "real" | "number") => "REAL",
        _ => "TEXT",
    }
}

/// `text` stored under a column affinity, if the affinity converts it.
fn coerce(text: &str, affinity: &str) -> Option<Value> {
    let text = text.trim();
    match affinity {
        "INTEGER" => text
            .parse::<i64>()
            .map(Value::Int)
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(Value::Real)),
        "REAL" => text.parse::<f64>().ok().map(Value::Real),
        _ => None,
    }
}

/// The full dataset with each column converted to its declared type, the
/// way loading it into `df` would store it.  Not subject to the row cap.
pub fn typed_table(dataset: &Dataset, schema: &Schema) -> Table {
    let mut table = dataset.table.clone();
    for col in &mut table.columns {
        let affinity = sqlite_type(schema.get(&col.name));
        for value in &mut col.values {
            if let Value::Text(text) = value {
                if let Some(converted) = coerce(text, affinity) {
                    *value = converted;
                }
            }
        }
    }
    table
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Query engine bound to a row cap.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    row_cap: usize,
}

impl QueryEngine {
    pub fn new(row_cap: usize) -> Self {
        Self { row_cap }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Run `query` against `dataset` and return at most `row_cap` rows.
    pub async fn execute(
        &self,
        dataset: &Dataset,
        schema: &Schema,
        query: &str,
    ) -> Result<Table, EngineError> {
        let query = clean_query(query);
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let mut conn = SqliteConnection::connect("sqlite::memory:").await?;
        let result = self.run(&mut conn, dataset, schema, &query).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "failed to close query engine connection");
        }
        result
    }

    async fn run(
        &self,
        conn: &mut SqliteConnection,
        dataset: &Dataset,
        schema: &Schema,
        query: &str,
    ) -> Result<Table, EngineError> {
        load_table(conn, dataset, schema).await?;

        let stmt = (&mut *conn).prepare(query).await?;
        let names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_owned()).collect();
        let mut table = Table::with_columns(names);

        let mut rows = stmt.query().fetch(&mut *conn);
        while table.row_count() < self.row_cap {
            let Some(row) = rows.try_next().await? else {
                break;
            };
            table.push_row(decode_row(&row)?);
        }
        drop(rows);

        debug!(rows = table.row_count(), cap = self.row_cap, "query executed");
        Ok(table)
    }
}

async fn load_table(
    conn: &mut SqliteConnection,
    dataset: &Dataset,
    schema: &Schema,
) -> Result<(), EngineError> {
    let columns = &dataset.table.columns;
    let defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), sqlite_type(schema.get(&c.name))))
        .collect();
    let ddl = format!("CREATE TABLE {TABLE_NAME} ({})", defs.join(", "));
    sqlx::query(&ddl).execute(&mut *conn).await?;

    let placeholders = vec!["?"; columns.len()].join(", ");
    let insert = format!("INSERT INTO {TABLE_NAME} VALUES ({placeholders})");

    let mut tx = conn.begin().await?;
    for idx in 0..dataset.row_count() {
        let mut q = sqlx::query(&insert);
        for col in columns {
            q = bind_value(q, &col.values[idx]);
        }
        q.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

fn bind_value<'q>(
    q: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => q.bind(None::<String>),
        Value::Int(i) => q.bind(*i),
        Value::Real(r) => q.bind(*r),
        Value::Text(s) => q.bind(s.as_str()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    let mut out = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let (is_null, ty) = {
            let raw = row.try_get_raw(idx)?;
            (raw.is_null(), raw.type_info().name().to_owned())
        };
        let value = if is_null {
            Value::Null
        } else {
            match ty.as_str() {
                "INTEGER" => Value::Int(row.try_get(idx)?),
                "REAL" => Value::Real(row.try_get(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    Value::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::Text(row.try_get(idx)?),
            }
        };
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::dataset::FileKind;

    fn dataset(rows: i64) -> (Dataset, Schema) {
        let mut table = Table::with_columns(["a", "b"]);
        for i in 0..rows {
            table.push_row(vec![Value::Text(i.to_string()), Value::Text((i * 2).to_string())]);
        }
        let schema = Schema::from([
            ("a".to_owned(), "int".to_owned()),
            ("b".to_owned(), "int".to_owned()),
        ]);
        (Dataset { kind: FileKind::Csv, table }, schema)
    }

    #[test]
    fn clean_query_strips_fences_and_tag() {
        assert_eq!(clean_query("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(clean_query("  SELECT a FROM df  "), "SELECT a FROM df");
        assert_eq!(clean_query("sqlite_master"), "sqlite_master");
    }

    #[test]
    fn declared_types_map_to_sqlite_affinity() {
        assert_eq!(sqlite_type(Some(&"int".to_owned())), "INTEGER");
        assert_eq!(sqlite_type(Some(&"Float64".to_owned())), "REAL");
        assert_eq!(sqlite_type(Some(&"str".to_owned())), "TEXT");
        assert_eq!(sqlite_type(None), "TEXT");
    }

    #[test]
    fn typed_table_follows_declared_types() {
        let mut table = Table::with_columns(["n", "x", "s"]);
        table.push_row(vec![
            Value::Text("7".into()),
            Value::Text("2.5".into()),
            Value::Text("7".into()),
        ]);
        table.push_row(vec![Value::Text("n/a".into()), Value::Null, Value::Text("b".into())]);
        let ds = Dataset { kind: FileKind::Csv, table };
        let schema = Schema::from([
            ("n".to_owned(), "int".to_owned()),
            ("x".to_owned(), "float".to_owned()),
        ]);

        let typed = typed_table(&ds, &schema);
        assert_eq!(typed.column("n").unwrap().values, vec![Value::Int(7), Value::Text("n/a".into())]);
        assert_eq!(typed.column("x").unwrap().values, vec![Value::Real(2.5), Value::Null]);
        assert_eq!(typed.column("s").unwrap().values[0], Value::Text("7".into()));
    }

    #[tokio::test]
    async fn result_is_capped_at_row_limit() {
        let (ds, schema) = dataset(500);
        let table = QueryEngine::new(100)
            .execute(&ds, &schema, "SELECT a, b FROM df LIMIT 1000")
            .await
            .unwrap();
        assert_eq!(table.row_count(), 100);
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(table.column("b").unwrap().values[3], Value::Int(6));
    }

    #[tokio::test]
    async fn small_results_are_returned_whole() {
        let (ds, schema) = dataset(40);
        let table = QueryEngine::new(100)
            .execute(&ds, &schema, "SELECT SUM(a) AS total, AVG(b) AS mean FROM df")
            .await
            .unwrap();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column("total").unwrap().values[0], Value::Int(780));
        assert_eq!(table.column("mean").unwrap().values[0], Value::Real(39.0));
    }

    #[tokio::test]
    async fn empty_result_keeps_column_names() {
        let (ds, schema) = dataset(5);
        let table = QueryEngine::new(100)
            .execute(&ds, &schema, "SELECT a FROM df WHERE a > 1000")
            .await
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    async fn malformed_query_is_an_error() {
        let (ds, schema) = dataset(5);
        let err = QueryEngine::new(100)
            .execute(&ds, &schema, "SELEC nope")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Sqlite(_)));

        let err = QueryEngine::new(100).execute(&ds, &schema, "``` ```").await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyQuery));
    }
}
