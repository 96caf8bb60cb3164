use anyhow::Context;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

use crate::record::StudentRecord;
use crate::registry::SubjectRegistry;
use crate::scoring::ExamType;

pub const DB_FILE: &str = "results.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            exam_type TEXT NOT NULL,
            mean REAL,
            rubric TEXT,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_group ON results(class_name, exam_type, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_scores(
            result_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            value REAL,
            PRIMARY KEY(result_id, subject),
            FOREIGN KEY(result_id) REFERENCES results(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_scores_result ON result_scores(result_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("malformed setting {}", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Filter for `list_results`. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub exam_type: Option<ExamType>,
    pub class_name: Option<String>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn write_scores(conn: &Connection, rec: &StudentRecord, id: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM result_scores WHERE result_id = ?", [id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO result_scores(result_id, subject, value) VALUES(?, ?, ?)",
    )?;
    for s in rec.scores() {
        stmt.execute((id, &s.subject, s.value))?;
    }
    Ok(())
}

/// Persist a new record and give it an id.
pub fn insert_result(conn: &Connection, rec: &mut StudentRecord) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    let ts = now();
    let tx = conn.unchecked_transaction()?;
    let sort_order: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM results",
        [],
        |r| r.get(0),
    )?;
    tx.execute(
        "INSERT INTO results(id, name, class_name, exam_type, mean, rubric, sort_order, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            rec.name(),
            rec.class_name(),
            rec.exam_type().as_str(),
            rec.mean(),
            rec.rubric().map(|r| r.label()),
            sort_order,
            &ts,
            &ts,
        ),
    )
    .context("insert results row")?;
    write_scores(&tx, rec, &id).context("insert result_scores rows")?;
    tx.commit()?;
    rec.set_id(id.clone());
    debug!(id = %id, class = rec.class_name(), exam = %rec.exam_type(), "result created");
    Ok(id)
}

/// Overwrite the stored copy of `rec`. Returns false when no row has its id.
pub fn update_result(conn: &Connection, rec: &StudentRecord) -> anyhow::Result<bool> {
    let Some(id) = rec.id() else {
        return Ok(false);
    };
    let tx = conn.unchecked_transaction()?;
    let changed = tx
        .execute(
            "UPDATE results
             SET name = ?, class_name = ?, exam_type = ?, mean = ?, rubric = ?, updated_at = ?
             WHERE id = ?",
            (
                rec.name(),
                rec.class_name(),
                rec.exam_type().as_str(),
                rec.mean(),
                rec.rubric().map(|r| r.label()),
                now(),
                id,
            ),
        )
        .context("update results row")?;
    if changed == 0 {
        return Ok(false);
    }
    write_scores(&tx, rec, id).context("rewrite result_scores rows")?;
    tx.commit()?;
    debug!(id = %id, mean = ?rec.mean(), "result updated");
    Ok(true)
}

pub fn delete_result(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM result_scores WHERE result_id = ?", [id])?;
    let n = tx.execute("DELETE FROM results WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(n > 0)
}

struct ResultRow {
    id: String,
    name: String,
    class_name: String,
    exam_type: String,
}

fn load_scores(
    conn: &Connection,
    ids: &[String],
) -> anyhow::Result<HashMap<String, Vec<(String, Option<f64>)>>> {
    let mut out: HashMap<String, Vec<(String, Option<f64>)>> = HashMap::new();
    if ids.is_empty() {
        return Ok(out);
    }
    let placeholders = std::iter::repeat("?")
        .take(ids.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT result_id, subject, value FROM result_scores WHERE result_id IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(ids.iter().map(|id| Value::Text(id.clone()))),
        |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<f64>>(2)?,
            ))
        },
    )?;
    for row in rows {
        let (rid, subject, value) = row?;
        out.entry(rid).or_default().push((subject, value));
    }
    Ok(out)
}

fn hydrate(
    registry: &SubjectRegistry,
    rows: Vec<ResultRow>,
    mut scores: HashMap<String, Vec<(String, Option<f64>)>>,
) -> anyhow::Result<Vec<StudentRecord>> {
    rows.into_iter()
        .map(|row| {
            let exam_type = ExamType::parse(&row.exam_type).with_context(|| {
                format!("result {} has unknown exam type {:?}", row.id, row.exam_type)
            })?;
            let stored = scores.remove(&row.id).unwrap_or_default();
            Ok(StudentRecord::restore(
                registry,
                row.id,
                row.name,
                row.class_name,
                exam_type,
                stored,
            ))
        })
        .collect()
}

pub fn get_result(
    conn: &Connection,
    registry: &SubjectRegistry,
    id: &str,
) -> anyhow::Result<Option<StudentRecord>> {
    let row: Option<ResultRow> = conn
        .query_row(
            "SELECT id, name, class_name, exam_type FROM results WHERE id = ?",
            [id],
            |r| {
                Ok(ResultRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    class_name: r.get(2)?,
                    exam_type: r.get(3)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };
    let scores = load_scores(conn, &[row.id.clone()])?;
    Ok(hydrate(registry, vec![row], scores)?.pop())
}

/// Records matching `filter`, in creation order.
pub fn list_results(
    conn: &Connection,
    registry: &SubjectRegistry,
    filter: &ResultFilter,
) -> anyhow::Result<Vec<StudentRecord>> {
    let mut sql = String::from("SELECT id, name, class_name, exam_type FROM results");
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(t) = filter.exam_type {
        clauses.push("exam_type = ?");
        binds.push(Value::Text(t.as_str().to_string()));
    }
    if let Some(c) = &filter.class_name {
        clauses.push("class_name = ?");
        binds.push(Value::Text(c.clone()));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY sort_order");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(ResultRow {
                id: r.get(0)?,
                name: r.get(1)?,
                class_name: r.get(2)?,
                exam_type: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    let scores = load_scores(conn, &ids)?;
    hydrate(registry, rows, scores)
}
