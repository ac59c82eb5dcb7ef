//! Entity store: typed CRUD over the five gradebook tables plus the undo
//! log over every mutation.
//!
//! Each mutation runs as one transaction. Row snapshots are captured inside
//! the transaction and pushed onto the undo log only after a successful
//! commit, so a failed write leaves both the database and the log untouched.

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::db;
use crate::undo::{EntityKind, OpKind, RowImage, UndoLog, UndoRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(#[source] rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Storage(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub term: String,
    pub created_at: Option<String>,
}

/// Storage-shaped student row. `badges` keeps the raw JSON text so undo can
/// restore the column verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_no: String,
    pub class_id: Option<String>,
    pub badges: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRow {
    pub id: String,
    pub name: String,
    pub sort_order: i64,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitleRow {
    pub id: String,
    pub label: String,
    pub category_id: String,
    pub class_id: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    pub id: String,
    pub student_id: String,
    pub title_id: String,
    pub score: f64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StudentListItem {
    pub row: StudentRow,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TitleListItem {
    pub row: TitleRow,
    pub category_name: String,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GradeListItem {
    pub row: GradeRow,
    pub title_label: String,
    pub category_name: String,
    pub student_first_name: String,
    pub student_last_name: String,
}

/// Comparison used by `filter_students_by_average`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageFilterOp {
    Below,
    Above,
    AtMost,
    AtLeast,
    Equal,
}

impl AverageFilterOp {
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "<" => Ok(Self::Below),
            ">" => Ok(Self::Above),
            "<=" => Ok(Self::AtMost),
            ">=" => Ok(Self::AtLeast),
            "=" | "==" => Ok(Self::Equal),
            other => Err(StoreError::Validation(format!(
                "unknown comparison operator: {}",
                other
            ))),
        }
    }

    fn matches(self, avg: f64, value: f64) -> bool {
        match self {
            Self::Below => avg < value,
            Self::Above => avg > value,
            Self::AtMost => avg <= value,
            Self::AtLeast => avg >= value,
            Self::Equal => (avg - value).abs() < f64::EPSILON,
        }
    }
}

/// Clamp a raw score into [0, 100] and round it to two decimal places.
/// Score validation normalizes rather than rejects.
pub fn normalize_score(raw: f64) -> f64 {
    let clamped = raw.clamp(0.0, 100.0);
    (clamped * 100.0).round() / 100.0
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct Store {
    conn: Connection,
    undo: UndoLog,
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        Ok(Self {
            conn,
            undo: UndoLog::new(),
        })
    }

    /// Wrap an existing connection (tests use an in-memory one).
    pub fn new(conn: Connection) -> anyhow::Result<Self> {
        db::init_schema(&conn)?;
        Ok(Self {
            conn,
            undo: UndoLog::new(),
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    // ---- classes ----

    pub fn add_class(&mut self, name: &str, term: &str) -> Result<String, StoreError> {
        let id = new_id();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO classes(id, name, term, created_at) VALUES (?, ?, ?, ?)",
            (&id, name, term, now_iso()),
        )?;
        let after = fetch_class(&tx, &id)?.ok_or(StoreError::NotFound("class"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::insert(RowImage::Class(after)));
        Ok(id)
    }

    pub fn update_class(&mut self, id: &str, name: &str, term: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_class(&tx, id)?.ok_or(StoreError::NotFound("class"))?;
        tx.execute(
            "UPDATE classes SET name = ?, term = ? WHERE id = ?",
            (name, term, id),
        )?;
        let after = fetch_class(&tx, id)?.ok_or(StoreError::NotFound("class"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::update(
            RowImage::Class(before),
            RowImage::Class(after),
        ));
        Ok(())
    }

    /// Delete a class. Its students stay, unassigned, and its class-scoped
    /// titles fall back to school-wide; grade entries are untouched.
    pub fn delete_class(&mut self, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_class(&tx, id)?.ok_or(StoreError::NotFound("class"))?;
        tx.execute("DELETE FROM classes WHERE id = ?", [id])?;
        tx.commit()?;
        self.undo.record(UndoRecord::delete(RowImage::Class(before)));
        Ok(())
    }

    pub fn get_class(&self, id: &str) -> Result<Option<ClassRow>, StoreError> {
        Ok(fetch_class(&self.conn, id)?)
    }

    pub fn list_classes(&self) -> Result<Vec<ClassRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, term, created_at FROM classes ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    term: r.get(2)?,
                    created_at: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Clone a class roster into a fresh class for a new term. Grades are
    /// not copied. The copy is a bulk setup action and is not undoable.
    pub fn copy_class_to_term(
        &mut self,
        id: &str,
        new_name: &str,
        new_term: &str,
    ) -> Result<String, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        if fetch_class(&tx, id)?.is_none() {
            return Err(StoreError::NotFound("class"));
        }
        let new_id_ = new_id();
        tx.execute(
            "INSERT INTO classes(id, name, term, created_at) VALUES (?, ?, ?, ?)",
            (&new_id_, new_name, new_term, now_iso()),
        )?;
        let students: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT first_name, last_name, student_no FROM students WHERE class_id = ?",
            )?;
            let rows = stmt
                .query_map([id], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        for (first, last, no) in students {
            tx.execute(
                "INSERT INTO students(id, first_name, last_name, student_no, class_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                (new_id(), first, last, no, &new_id_, now_iso()),
            )?;
        }
        tx.commit()?;
        Ok(new_id_)
    }

    // ---- students ----

    pub fn add_student(
        &mut self,
        first_name: &str,
        last_name: &str,
        student_no: &str,
        class_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = new_id();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO students(id, first_name, last_name, student_no, class_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (&id, first_name, last_name, student_no, class_id, now_iso()),
        )?;
        let after = fetch_student(&tx, &id)?.ok_or(StoreError::NotFound("student"))?;
        tx.commit()?;
        self.undo
            .record(UndoRecord::insert(RowImage::Student(after)));
        Ok(id)
    }

    pub fn update_student(
        &mut self,
        id: &str,
        first_name: &str,
        last_name: &str,
        student_no: &str,
        class_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_student(&tx, id)?.ok_or(StoreError::NotFound("student"))?;
        tx.execute(
            "UPDATE students SET first_name = ?, last_name = ?, student_no = ?, class_id = ?
             WHERE id = ?",
            (first_name, last_name, student_no, class_id, id),
        )?;
        let after = fetch_student(&tx, id)?.ok_or(StoreError::NotFound("student"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::update(
            RowImage::Student(before),
            RowImage::Student(after),
        ));
        Ok(())
    }

    pub fn delete_student(&mut self, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_student(&tx, id)?.ok_or(StoreError::NotFound("student"))?;
        tx.execute("DELETE FROM students WHERE id = ?", [id])?;
        tx.commit()?;
        self.undo
            .record(UndoRecord::delete(RowImage::Student(before)));
        Ok(())
    }

    pub fn set_student_badges(&mut self, id: &str, badges: &[String]) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(badges)
            .map_err(|e| StoreError::Validation(format!("bad badge set: {}", e)))?;
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_student(&tx, id)?.ok_or(StoreError::NotFound("student"))?;
        tx.execute("UPDATE students SET badges = ? WHERE id = ?", (&encoded, id))?;
        let after = fetch_student(&tx, id)?.ok_or(StoreError::NotFound("student"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::update(
            RowImage::Student(before),
            RowImage::Student(after),
        ));
        Ok(())
    }

    pub fn get_student(&self, id: &str) -> Result<Option<StudentRow>, StoreError> {
        Ok(fetch_student(&self.conn, id)?)
    }

    pub fn list_students(
        &self,
        class_id: Option<&str>,
    ) -> Result<Vec<StudentListItem>, StoreError> {
        let base = "SELECT s.id, s.first_name, s.last_name, s.student_no, s.class_id,
                           s.badges, s.created_at, c.name
                    FROM students s
                    LEFT JOIN classes c ON s.class_id = c.id";
        let map_row = |r: &rusqlite::Row<'_>| {
            Ok(StudentListItem {
                row: StudentRow {
                    id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    student_no: r.get(3)?,
                    class_id: r.get(4)?,
                    badges: r.get(5)?,
                    created_at: r.get(6)?,
                },
                class_name: r.get(7)?,
            })
        };
        let rows = match class_id {
            Some(cid) => {
                let sql = format!(
                    "{} WHERE s.class_id = ? ORDER BY s.last_name, s.first_name",
                    base
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([cid], map_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!("{} ORDER BY s.last_name, s.first_name", base);
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    /// Keep only students whose overall average satisfies the comparison.
    /// Students without any grade entries have no average and never match.
    pub fn filter_students_by_average(
        &self,
        class_id: Option<&str>,
        op: AverageFilterOp,
        value: f64,
    ) -> Result<Vec<StudentListItem>, StoreError> {
        let students = self.list_students(class_id)?;
        let mut kept = Vec::new();
        for item in students {
            let Some(avg) = crate::calc::overall_average(&self.conn, &item.row.id)? else {
                continue;
            };
            if op.matches(avg, value) {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    // ---- categories ----

    pub fn add_category(&mut self, name: &str, sort_order: i64) -> Result<String, StoreError> {
        let id = new_id();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO categories(id, name, sort_order, is_default) VALUES (?, ?, ?, 0)",
            (&id, name, sort_order),
        )?;
        let after = fetch_category(&tx, &id)?.ok_or(StoreError::NotFound("category"))?;
        tx.commit()?;
        self.undo
            .record(UndoRecord::insert(RowImage::Category(after)));
        Ok(id)
    }

    pub fn update_category(
        &mut self,
        id: &str,
        name: &str,
        sort_order: Option<i64>,
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_category(&tx, id)?.ok_or(StoreError::NotFound("category"))?;
        match sort_order {
            Some(sort) => {
                tx.execute(
                    "UPDATE categories SET name = ?, sort_order = ? WHERE id = ?",
                    (name, sort, id),
                )?;
            }
            None => {
                tx.execute("UPDATE categories SET name = ? WHERE id = ?", (name, id))?;
            }
        }
        let after = fetch_category(&tx, id)?.ok_or(StoreError::NotFound("category"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::update(
            RowImage::Category(before),
            RowImage::Category(after),
        ));
        Ok(())
    }

    /// Delete a category, cascading to its titles and their grade entries.
    /// Default categories carry no special protection.
    pub fn delete_category(&mut self, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_category(&tx, id)?.ok_or(StoreError::NotFound("category"))?;
        tx.execute("DELETE FROM categories WHERE id = ?", [id])?;
        tx.commit()?;
        self.undo
            .record(UndoRecord::delete(RowImage::Category(before)));
        Ok(())
    }

    pub fn get_category(&self, id: &str) -> Result<Option<CategoryRow>, StoreError> {
        Ok(fetch_category(&self.conn, id)?)
    }

    pub fn list_categories(&self) -> Result<Vec<CategoryRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, sort_order, is_default FROM categories ORDER BY sort_order, name",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(CategoryRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    sort_order: r.get(2)?,
                    is_default: r.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- assignment titles ----

    pub fn add_title(
        &mut self,
        label: &str,
        category_id: &str,
        class_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = new_id();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO assignment_titles(id, label, category_id, class_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (&id, label, category_id, class_id, now_iso()),
        )?;
        let after = fetch_title(&tx, &id)?.ok_or(StoreError::NotFound("assignment title"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::insert(RowImage::Title(after)));
        Ok(id)
    }

    pub fn update_title(&mut self, id: &str, label: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_title(&tx, id)?.ok_or(StoreError::NotFound("assignment title"))?;
        tx.execute(
            "UPDATE assignment_titles SET label = ? WHERE id = ?",
            (label, id),
        )?;
        let after = fetch_title(&tx, id)?.ok_or(StoreError::NotFound("assignment title"))?;
        tx.commit()?;
        self.undo.record(UndoRecord::update(
            RowImage::Title(before),
            RowImage::Title(after),
        ));
        Ok(())
    }

    pub fn delete_title(&mut self, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_title(&tx, id)?.ok_or(StoreError::NotFound("assignment title"))?;
        tx.execute("DELETE FROM assignment_titles WHERE id = ?", [id])?;
        tx.commit()?;
        self.undo.record(UndoRecord::delete(RowImage::Title(before)));
        Ok(())
    }

    pub fn get_title(&self, id: &str) -> Result<Option<TitleRow>, StoreError> {
        Ok(fetch_title(&self.conn, id)?)
    }

    pub fn list_titles(
        &self,
        category_id: Option<&str>,
        class_id: Option<&str>,
    ) -> Result<Vec<TitleListItem>, StoreError> {
        let mut sql = String::from(
            "SELECT t.id, t.label, t.category_id, t.class_id, t.created_at, k.name, c.name
             FROM assignment_titles t
             LEFT JOIN categories k ON t.category_id = k.id
             LEFT JOIN classes c ON t.class_id = c.id
             WHERE 1=1",
        );
        let mut params: Vec<&str> = Vec::new();
        if let Some(cid) = category_id {
            sql.push_str(" AND t.category_id = ?");
            params.push(cid);
        }
        if let Some(cid) = class_id {
            sql.push_str(" AND t.class_id = ?");
            params.push(cid);
        }
        sql.push_str(" ORDER BY t.created_at DESC, t.label");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |r| {
                Ok(TitleListItem {
                    row: TitleRow {
                        id: r.get(0)?,
                        label: r.get(1)?,
                        category_id: r.get(2)?,
                        class_id: r.get(3)?,
                        created_at: r.get(4)?,
                    },
                    category_name: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    class_name: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- grade entries ----

    /// Insert or overwrite the single grade entry for (student, title).
    /// A second score for the same pair replaces the first and refreshes
    /// the modification timestamp.
    pub fn upsert_grade(
        &mut self,
        student_id: &str,
        title_id: &str,
        score: f64,
    ) -> Result<String, StoreError> {
        let score = normalize_score(score);
        let tx = self.conn.unchecked_transaction()?;
        let existing = fetch_grade_by_pair(&tx, student_id, title_id)?;
        let record = match existing {
            Some(before) => {
                tx.execute(
                    "UPDATE grade_entries SET score = ?, updated_at = ?
                     WHERE student_id = ? AND title_id = ?",
                    (score, now_iso(), student_id, title_id),
                )?;
                let after =
                    fetch_grade(&tx, &before.id)?.ok_or(StoreError::NotFound("grade entry"))?;
                let id = before.id.clone();
                (UndoRecord::update(RowImage::Grade(before), RowImage::Grade(after)), id)
            }
            None => {
                let id = new_id();
                tx.execute(
                    "INSERT INTO grade_entries(id, student_id, title_id, score, updated_at)
                     VALUES (?, ?, ?, ?, ?)",
                    (&id, student_id, title_id, score, now_iso()),
                )?;
                let after = fetch_grade(&tx, &id)?.ok_or(StoreError::NotFound("grade entry"))?;
                (UndoRecord::insert(RowImage::Grade(after)), id)
            }
        };
        tx.commit()?;
        let (rec, id) = record;
        self.undo.record(rec);
        Ok(id)
    }

    /// Upsert one title's scores for many students at once. `None` scores
    /// mean "no entry" and are skipped, not written as zero.
    pub fn bulk_upsert_grades(
        &mut self,
        title_id: &str,
        scores: &[(String, Option<f64>)],
    ) -> Result<usize, StoreError> {
        let mut written = 0;
        for (student_id, score) in scores {
            if let Some(score) = score {
                self.upsert_grade(student_id, title_id, *score)?;
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn delete_grade(&mut self, student_id: &str, title_id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let before = fetch_grade_by_pair(&tx, student_id, title_id)?
            .ok_or(StoreError::NotFound("grade entry"))?;
        tx.execute(
            "DELETE FROM grade_entries WHERE student_id = ? AND title_id = ?",
            (student_id, title_id),
        )?;
        tx.commit()?;
        self.undo.record(UndoRecord::delete(RowImage::Grade(before)));
        Ok(())
    }

    pub fn list_grades(
        &self,
        student_id: Option<&str>,
        title_id: Option<&str>,
    ) -> Result<Vec<GradeListItem>, StoreError> {
        let mut sql = String::from(
            "SELECT g.id, g.student_id, g.title_id, g.score, g.updated_at,
                    t.label, k.name, s.first_name, s.last_name
             FROM grade_entries g
             LEFT JOIN assignment_titles t ON g.title_id = t.id
             LEFT JOIN categories k ON t.category_id = k.id
             LEFT JOIN students s ON g.student_id = s.id
             WHERE 1=1",
        );
        let mut params: Vec<&str> = Vec::new();
        if let Some(sid) = student_id {
            sql.push_str(" AND g.student_id = ?");
            params.push(sid);
        }
        if let Some(tid) = title_id {
            sql.push_str(" AND g.title_id = ?");
            params.push(tid);
        }
        sql.push_str(" ORDER BY t.created_at DESC, g.updated_at DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |r| {
                Ok(GradeListItem {
                    row: GradeRow {
                        id: r.get(0)?,
                        student_id: r.get(1)?,
                        title_id: r.get(2)?,
                        score: r.get(3)?,
                        updated_at: r.get(4)?,
                    },
                    title_label: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    category_name: r.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    student_first_name: r.get::<_, Option<String>>(7)?.unwrap_or_default(),
                    student_last_name: r.get::<_, Option<String>>(8)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- undo ----

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn describe_last(&self) -> Option<String> {
        self.undo.describe_last()
    }

    /// Reverse the most recent surviving mutation. Returns `Ok(false)` when
    /// the log is empty. On a failed reversal the record goes back on top of
    /// the log and the error propagates.
    pub fn undo_last(&mut self) -> Result<bool, StoreError> {
        let Some(rec) = self.undo.pop() else {
            return Ok(false);
        };
        match self.apply_reversal(&rec) {
            Ok(()) => Ok(true),
            Err(e) => {
                self.undo.restore(rec);
                Err(e)
            }
        }
    }

    fn apply_reversal(&self, rec: &UndoRecord) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        match (rec.op, rec.before.as_ref()) {
            (OpKind::Insert, _) => {
                delete_by_id(&tx, rec.kind, &rec.record_id)?;
            }
            (OpKind::Update, Some(img)) => {
                rewrite_row(&tx, img)?;
            }
            (OpKind::Delete, Some(img)) => {
                reinsert_row(&tx, img)?;
            }
            (_, None) => {
                return Err(StoreError::Validation(
                    "undo record is missing its row snapshot".to_string(),
                ));
            }
        }
        tx.commit()?;
        Ok(())
    }
}

// ---- row fetch helpers (shared by reads and snapshot capture) ----

fn fetch_class(conn: &Connection, id: &str) -> Result<Option<ClassRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, term, created_at FROM classes WHERE id = ?",
        [id],
        |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                term: r.get(2)?,
                created_at: r.get(3)?,
            })
        },
    )
    .optional()
}

fn fetch_student(conn: &Connection, id: &str) -> Result<Option<StudentRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, first_name, last_name, student_no, class_id, badges, created_at
         FROM students WHERE id = ?",
        [id],
        |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                student_no: r.get(3)?,
                class_id: r.get(4)?,
                badges: r.get(5)?,
                created_at: r.get(6)?,
            })
        },
    )
    .optional()
}

fn fetch_category(conn: &Connection, id: &str) -> Result<Option<CategoryRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, sort_order, is_default FROM categories WHERE id = ?",
        [id],
        |r| {
            Ok(CategoryRow {
                id: r.get(0)?,
                name: r.get(1)?,
                sort_order: r.get(2)?,
                is_default: r.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()
}

fn fetch_title(conn: &Connection, id: &str) -> Result<Option<TitleRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, label, category_id, class_id, created_at
         FROM assignment_titles WHERE id = ?",
        [id],
        |r| {
            Ok(TitleRow {
                id: r.get(0)?,
                label: r.get(1)?,
                category_id: r.get(2)?,
                class_id: r.get(3)?,
                created_at: r.get(4)?,
            })
        },
    )
    .optional()
}

fn fetch_grade(conn: &Connection, id: &str) -> Result<Option<GradeRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, student_id, title_id, score, updated_at FROM grade_entries WHERE id = ?",
        [id],
        |r| {
            Ok(GradeRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                title_id: r.get(2)?,
                score: r.get(3)?,
                updated_at: r.get(4)?,
            })
        },
    )
    .optional()
}

fn fetch_grade_by_pair(
    conn: &Connection,
    student_id: &str,
    title_id: &str,
) -> Result<Option<GradeRow>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, student_id, title_id, score, updated_at
         FROM grade_entries WHERE student_id = ? AND title_id = ?",
        (student_id, title_id),
        |r| {
            Ok(GradeRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                title_id: r.get(2)?,
                score: r.get(3)?,
                updated_at: r.get(4)?,
            })
        },
    )
    .optional()
}

// ---- undo reversal: one explicit statement per entity kind ----

fn delete_by_id(conn: &Connection, kind: EntityKind, id: &str) -> Result<(), rusqlite::Error> {
    let sql = match kind {
        EntityKind::Class => "DELETE FROM classes WHERE id = ?",
        EntityKind::Student => "DELETE FROM students WHERE id = ?",
        EntityKind::Category => "DELETE FROM categories WHERE id = ?",
        EntityKind::Title => "DELETE FROM assignment_titles WHERE id = ?",
        EntityKind::Grade => "DELETE FROM grade_entries WHERE id = ?",
    };
    conn.execute(sql, [id])?;
    Ok(())
}

/// Write a before-image back verbatim, every captured column included.
fn rewrite_row(conn: &Connection, img: &RowImage) -> Result<(), rusqlite::Error> {
    match img {
        RowImage::Class(r) => {
            conn.execute(
                "UPDATE classes SET name = ?, term = ?, created_at = ? WHERE id = ?",
                (&r.name, &r.term, &r.created_at, &r.id),
            )?;
        }
        RowImage::Student(r) => {
            conn.execute(
                "UPDATE students SET first_name = ?, last_name = ?, student_no = ?,
                        class_id = ?, badges = ?, created_at = ?
                 WHERE id = ?",
                (
                    &r.first_name,
                    &r.last_name,
                    &r.student_no,
                    &r.class_id,
                    &r.badges,
                    &r.created_at,
                    &r.id,
                ),
            )?;
        }
        RowImage::Category(r) => {
            conn.execute(
                "UPDATE categories SET name = ?, sort_order = ?, is_default = ? WHERE id = ?",
                (&r.name, r.sort_order, r.is_default as i64, &r.id),
            )?;
        }
        RowImage::Title(r) => {
            conn.execute(
                "UPDATE assignment_titles SET label = ?, category_id = ?, class_id = ?,
                        created_at = ?
                 WHERE id = ?",
                (&r.label, &r.category_id, &r.class_id, &r.created_at, &r.id),
            )?;
        }
        RowImage::Grade(r) => {
            conn.execute(
                "UPDATE grade_entries SET student_id = ?, title_id = ?, score = ?,
                        updated_at = ?
                 WHERE id = ?",
                (&r.student_id, &r.title_id, r.score, &r.updated_at, &r.id),
            )?;
        }
    }
    Ok(())
}

/// Re-insert a deleted row with its original primary key, so surviving
/// foreign keys that referenced it stay valid.
fn reinsert_row(conn: &Connection, img: &RowImage) -> Result<(), rusqlite::Error> {
    match img {
        RowImage::Class(r) => {
            conn.execute(
                "INSERT INTO classes(id, name, term, created_at) VALUES (?, ?, ?, ?)",
                (&r.id, &r.name, &r.term, &r.created_at),
            )?;
        }
        RowImage::Student(r) => {
            conn.execute(
                "INSERT INTO students(id, first_name, last_name, student_no, class_id,
                        badges, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    &r.id,
                    &r.first_name,
                    &r.last_name,
                    &r.student_no,
                    &r.class_id,
                    &r.badges,
                    &r.created_at,
                ),
            )?;
        }
        RowImage::Category(r) => {
            conn.execute(
                "INSERT INTO categories(id, name, sort_order, is_default) VALUES (?, ?, ?, ?)",
                (&r.id, &r.name, r.sort_order, r.is_default as i64),
            )?;
        }
        RowImage::Title(r) => {
            conn.execute(
                "INSERT INTO assignment_titles(id, label, category_id, class_id, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                (&r.id, &r.label, &r.category_id, &r.class_id, &r.created_at),
            )?;
        }
        RowImage::Grade(r) => {
            conn.execute(
                "INSERT INTO grade_entries(id, student_id, title_id, score, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                (&r.id, &r.student_id, &r.title_id, r.score, &r.updated_at),
            )?;
        }
    }
    Ok(())
}
