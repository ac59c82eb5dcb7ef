use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "gradetrack.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            term TEXT NOT NULL DEFAULT '',
            created_at TEXT
        )",
        [],
    )?;

    // class_id is nullable: deleting a class keeps its students, unassigned.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            student_no TEXT NOT NULL,
            class_id TEXT,
            badges TEXT NOT NULL DEFAULT '[]',
            created_at TEXT,
            UNIQUE(class_id, student_no),
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_default INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // A title scoped to a deleted class falls back to school-wide; only a
    // category delete takes titles (and their entries) with it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_titles(
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            category_id TEXT NOT NULL,
            class_id TEXT,
            created_at TEXT,
            FOREIGN KEY(category_id) REFERENCES categories(id) ON DELETE CASCADE,
            FOREIGN KEY(class_id) REFERENCES classes(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_titles_category ON assignment_titles(category_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_titles_class ON assignment_titles(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            title_id TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            UNIQUE(student_id, title_id),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            FOREIGN KEY(title_id) REFERENCES assignment_titles(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grade_entries(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_title ON grade_entries(title_id)",
        [],
    )?;

    seed_default_categories(conn)?;

    Ok(())
}

/// Seed the stock grading dimensions only into an empty table, so a user's
/// later renames and deletions are never resurrected on restart.
fn seed_default_categories(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }

    let defaults = [("Davran\u{131}\u{15f}", 1), ("\u{d6}dev", 2), ("Quiz", 3)];
    for (name, sort_order) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO categories(id, name, sort_order, is_default)
             VALUES (?, ?, ?, 1)",
            (uuid::Uuid::new_v4().to_string(), name, sort_order),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seeded_once() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("init schema");

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))
            .expect("count categories");
        assert_eq!(count, 3);

        // A deleted default must stay deleted across re-init.
        conn.execute("DELETE FROM categories WHERE name = 'Quiz'", [])
            .expect("delete Quiz");
        init_schema(&conn).expect("re-init schema");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))
            .expect("count categories");
        assert_eq!(count, 2);
    }
}
