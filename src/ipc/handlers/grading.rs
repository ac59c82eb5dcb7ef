use serde_json::json;

use super::{opt_str_param, require_store, str_param};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::store::{CategoryRow, GradeListItem, TitleListItem};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "categories.list" => Some(list_categories(state, req)),
        "categories.create" => Some(create_category(state, req)),
        "categories.update" => Some(update_category(state, req)),
        "categories.delete" => Some(delete_category(state, req)),
        "titles.list" => Some(list_titles(state, req)),
        "titles.create" => Some(create_title(state, req)),
        "titles.update" => Some(update_title(state, req)),
        "titles.delete" => Some(delete_title(state, req)),
        "grades.list" => Some(list_grades(state, req)),
        "grades.upsert" => Some(upsert_grade(state, req)),
        "grades.bulkUpsert" => Some(bulk_upsert_grades(state, req)),
        "grades.delete" => Some(delete_grade(state, req)),
        _ => None,
    }
}

/// Accept a score as a number, a numeric string (comma decimals allowed),
/// or null/empty meaning "no entry".
fn parse_score(v: Option<&serde_json::Value>) -> Result<Option<f64>, String> {
    let Some(v) = v else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    if let Some(n) = v.as_f64() {
        return Ok(Some(n));
    }
    if let Some(s) = v.as_str() {
        let t = s.trim();
        if t.is_empty() {
            return Ok(None);
        }
        return match t.replace(',', ".").parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(format!("score is not numeric: {}", s)),
        };
    }
    Err("score must be a number, a numeric string, or null".to_string())
}

fn category_json(row: &CategoryRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "name": row.name,
        "sortOrder": row.sort_order,
        "isDefault": row.is_default,
    })
}

fn title_json(item: &TitleListItem) -> serde_json::Value {
    json!({
        "id": item.row.id,
        "label": item.row.label,
        "categoryId": item.row.category_id,
        "categoryName": item.category_name,
        "classId": item.row.class_id,
        "className": item.class_name,
        "createdAt": item.row.created_at,
    })
}

fn grade_json(item: &GradeListItem) -> serde_json::Value {
    json!({
        "id": item.row.id,
        "studentId": item.row.student_id,
        "titleId": item.row.title_id,
        "score": item.row.score,
        "updatedAt": item.row.updated_at,
        "titleLabel": item.title_label,
        "categoryName": item.category_name,
        "studentFirstName": item.student_first_name,
        "studentLastName": item.student_last_name,
    })
}

fn list_categories(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.list_categories() {
        Ok(rows) => ok(
            &req.id,
            json!({ "categories": rows.iter().map(category_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn create_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match str_param(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = req
        .params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.add_category(&name, sort_order) {
        Ok(id) => ok(&req.id, json!({ "categoryId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn update_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category_id = match str_param(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match str_param(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort_order = req.params.get("sortOrder").and_then(|v| v.as_i64());
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.update_category(&category_id, &name, sort_order) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn delete_category(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category_id = match str_param(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.delete_category(&category_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn list_titles(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category_id = opt_str_param(req, "categoryId");
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.list_titles(category_id.as_deref(), class_id.as_deref()) {
        Ok(items) => ok(
            &req.id,
            json!({ "titles": items.iter().map(title_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn create_title(state: &mut AppState, req: &Request) -> serde_json::Value {
    let label = match str_param(req, "label") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match str_param(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.add_title(&label, &category_id, class_id.as_deref()) {
        Ok(id) => ok(&req.id, json!({ "titleId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn update_title(state: &mut AppState, req: &Request) -> serde_json::Value {
    let title_id = match str_param(req, "titleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let label = match str_param(req, "label") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.update_title(&title_id, &label) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn delete_title(state: &mut AppState, req: &Request) -> serde_json::Value {
    let title_id = match str_param(req, "titleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.delete_title(&title_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn list_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = opt_str_param(req, "studentId");
    let title_id = opt_str_param(req, "titleId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.list_grades(student_id.as_deref(), title_id.as_deref()) {
        Ok(items) => ok(
            &req.id,
            json!({ "grades": items.iter().map(grade_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn upsert_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title_id = match str_param(req, "titleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match parse_score(req.params.get("score")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "validation", msg, None),
    };
    // An empty score means "no entry", never zero.
    let Some(score) = score else {
        return ok(&req.id, json!({ "skipped": true }));
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.upsert_grade(&student_id, &title_id, score) {
        Ok(id) => ok(&req.id, json!({ "gradeId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn bulk_upsert_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let title_id = match str_param(req, "titleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("scores").and_then(|v| v.as_object()) else {
        return err(
            &req.id,
            "bad_params",
            "scores must be an object of studentId to score",
            None,
        );
    };
    let mut scores = Vec::with_capacity(raw.len());
    for (student_id, value) in raw {
        match parse_score(Some(value)) {
            Ok(score) => scores.push((student_id.clone(), score)),
            Err(msg) => return err(&req.id, "validation", msg, None),
        }
    }
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.bulk_upsert_grades(&title_id, &scores) {
        Ok(written) => ok(
            &req.id,
            json!({ "written": written, "skipped": scores.len() - written }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn delete_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title_id = match str_param(req, "titleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.delete_grade(&student_id, &title_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}
