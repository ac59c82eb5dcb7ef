//! Aggregation engine: averages derived from raw grade entries.
//!
//! Every function returns `Option<f64>` semantics for "no contributing
//! entries". Absence is never reported as 0, because 0 is a valid earned
//! score. Values are unrounded; display rounding happens at the IPC
//! boundary so composed averages (overall from category) stay exact.

use rusqlite::Connection;
use serde::Serialize;

use crate::store::StoreError;

/// Mean of one student's entries on titles in one category.
pub fn category_average(
    conn: &Connection,
    student_id: &str,
    category_id: &str,
) -> Result<Option<f64>, StoreError> {
    let avg: Option<f64> = conn.query_row(
        "SELECT AVG(g.score)
         FROM grade_entries g
         JOIN assignment_titles t ON g.title_id = t.id
         WHERE g.student_id = ? AND t.category_id = ?",
        (student_id, category_id),
        |r| r.get(0),
    )?;
    Ok(avg)
}

/// Mean of the per-category averages, so each category weighs equally no
/// matter how many titles it holds. Categories without entries for this
/// student are excluded, not counted as 0.
pub fn overall_average(conn: &Connection, student_id: &str) -> Result<Option<f64>, StoreError> {
    let category_ids = all_category_ids(conn)?;
    let mut sums = Vec::new();
    for category_id in &category_ids {
        if let Some(avg) = category_average(conn, student_id, category_id)? {
            sums.push(avg);
        }
    }
    Ok(mean(&sums))
}

/// Mean over all raw entries of in-scope students for one category.
/// `class_id = None` widens the scope to the whole school.
pub fn class_average(
    conn: &Connection,
    category_id: &str,
    class_id: Option<&str>,
) -> Result<Option<f64>, StoreError> {
    let avg: Option<f64> = match class_id {
        Some(cid) => conn.query_row(
            "SELECT AVG(g.score)
             FROM grade_entries g
             JOIN assignment_titles t ON g.title_id = t.id
             JOIN students s ON g.student_id = s.id
             WHERE s.class_id = ? AND t.category_id = ?",
            (cid, category_id),
            |r| r.get(0),
        )?,
        None => conn.query_row(
            "SELECT AVG(g.score)
             FROM grade_entries g
             JOIN assignment_titles t ON g.title_id = t.id
             WHERE t.category_id = ?",
            [category_id],
            |r| r.get(0),
        )?,
    };
    Ok(avg)
}

/// Mean of the per-category class averages (same equal-category weighting
/// as [`overall_average`], at class or school scope).
pub fn class_overall_average(
    conn: &Connection,
    class_id: Option<&str>,
) -> Result<Option<f64>, StoreError> {
    let category_ids = all_category_ids(conn)?;
    let mut sums = Vec::new();
    for category_id in &category_ids {
        if let Some(avg) = class_average(conn, category_id, class_id)? {
            sums.push(avg);
        }
    }
    Ok(mean(&sums))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category_id: String,
    pub name: String,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRow {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_no: String,
    pub class_name: Option<String>,
    pub categories: Vec<CategoryAverage>,
    pub overall: Option<f64>,
}

/// Per-student category and overall averages for every student, feeding
/// the evaluation grid and the export adapters.
pub fn evaluation_rows(conn: &Connection) -> Result<Vec<EvaluationRow>, StoreError> {
    let categories = all_categories(conn)?;
    let students = roster(conn, None)?;

    let mut rows = Vec::with_capacity(students.len());
    for s in students {
        let mut per_category = Vec::with_capacity(categories.len());
        for (category_id, name) in &categories {
            per_category.push(CategoryAverage {
                category_id: category_id.clone(),
                name: name.clone(),
                average: category_average(conn, &s.id, category_id)?,
            });
        }
        let overall = mean(
            &per_category
                .iter()
                .filter_map(|c| c.average)
                .collect::<Vec<_>>(),
        );
        rows.push(EvaluationRow {
            student_id: s.id,
            first_name: s.first_name,
            last_name: s.last_name,
            student_no: s.student_no,
            class_name: s.class_name,
            categories: per_category,
            overall,
        });
    }
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub title_label: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCategory {
    pub name: String,
    pub entries: Vec<ReportEntry>,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReportRow {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub student_no: String,
    pub categories: Vec<ReportCategory>,
    pub overall: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReport {
    pub class_id: String,
    pub class_name: String,
    pub rows: Vec<ClassReportRow>,
}

/// The raw material for spreadsheet/PDF reports: per class, per student,
/// per category entries plus averages. `class_id = None` covers every
/// class.
pub fn class_report_rows(
    conn: &Connection,
    class_id: Option<&str>,
) -> Result<Vec<ClassReport>, StoreError> {
    let categories = all_categories(conn)?;

    let mut class_filter = String::from("SELECT id, name FROM classes");
    if class_id.is_some() {
        class_filter.push_str(" WHERE id = ?");
    }
    class_filter.push_str(" ORDER BY name");
    let mut stmt = conn.prepare(&class_filter)?;
    let params: Vec<&str> = class_id.into_iter().collect();
    let classes: Vec<(String, String)> = stmt
        .query_map(rusqlite::params_from_iter(params), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = Vec::with_capacity(classes.len());
    for (cid, cname) in classes {
        let students = roster(conn, Some(&cid))?;
        let mut rows = Vec::with_capacity(students.len());
        for s in students {
            let mut per_category = Vec::with_capacity(categories.len());
            for (category_id, name) in &categories {
                let entries = student_category_entries(conn, &s.id, category_id)?;
                per_category.push(ReportCategory {
                    name: name.clone(),
                    average: category_average(conn, &s.id, category_id)?,
                    entries,
                });
            }
            let overall = mean(
                &per_category
                    .iter()
                    .filter_map(|c| c.average)
                    .collect::<Vec<_>>(),
            );
            rows.push(ClassReportRow {
                student_id: s.id,
                first_name: s.first_name,
                last_name: s.last_name,
                student_no: s.student_no,
                categories: per_category,
                overall,
            });
        }
        report.push(ClassReport {
            class_id: cid,
            class_name: cname,
            rows,
        });
    }
    Ok(report)
}

/// Per-student overall averages for one class, for distribution charts.
/// Students without any entries are omitted.
pub fn class_distribution(conn: &Connection, class_id: &str) -> Result<Vec<f64>, StoreError> {
    let students = roster(conn, Some(class_id))?;
    let mut values = Vec::new();
    for s in students {
        if let Some(avg) = overall_average(conn, &s.id)? {
            values.push(avg);
        }
    }
    Ok(values)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn all_category_ids(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT id FROM categories ORDER BY sort_order, name")?;
    let ids = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn all_categories(conn: &Connection) -> Result<Vec<(String, String)>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY sort_order, name")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

struct RosterStudent {
    id: String,
    first_name: String,
    last_name: String,
    student_no: String,
    class_name: Option<String>,
}

fn roster(conn: &Connection, class_id: Option<&str>) -> Result<Vec<RosterStudent>, StoreError> {
    let mut sql = String::from(
        "SELECT s.id, s.first_name, s.last_name, s.student_no, c.name
         FROM students s
         LEFT JOIN classes c ON s.class_id = c.id",
    );
    if class_id.is_some() {
        sql.push_str(" WHERE s.class_id = ?");
    }
    sql.push_str(" ORDER BY s.last_name, s.first_name");
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&str> = class_id.into_iter().collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                student_no: r.get(3)?,
                class_name: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn student_category_entries(
    conn: &Connection,
    student_id: &str,
    category_id: &str,
) -> Result<Vec<ReportEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT t.label, g.score
         FROM grade_entries g
         JOIN assignment_titles t ON g.title_id = t.id
         WHERE g.student_id = ? AND t.category_id = ?
         ORDER BY t.created_at, t.label",
    )?;
    let rows = stmt
        .query_map((student_id, category_id), |r| {
            Ok(ReportEntry {
                title_label: r.get(0)?,
                score: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
