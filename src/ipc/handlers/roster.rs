use serde_json::json;

use super::{opt_str_param, require_store, str_param};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::types::{AppState, Request};
use crate::store::{AverageFilterOp, ClassRow, StudentListItem};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(list_classes(state, req)),
        "classes.create" => Some(create_class(state, req)),
        "classes.update" => Some(update_class(state, req)),
        "classes.delete" => Some(delete_class(state, req)),
        "classes.copyToTerm" => Some(copy_class_to_term(state, req)),
        "students.list" => Some(list_students(state, req)),
        "students.create" => Some(create_student(state, req)),
        "students.update" => Some(update_student(state, req)),
        "students.delete" => Some(delete_student(state, req)),
        "students.setBadges" => Some(set_badges(state, req)),
        "students.filterByAverage" => Some(filter_by_average(state, req)),
        _ => None,
    }
}

fn class_json(row: &ClassRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "name": row.name,
        "term": row.term,
        "createdAt": row.created_at,
    })
}

fn student_json(item: &StudentListItem) -> serde_json::Value {
    let badges: Vec<String> = serde_json::from_str(&item.row.badges).unwrap_or_default();
    json!({
        "id": item.row.id,
        "firstName": item.row.first_name,
        "lastName": item.row.last_name,
        "studentNo": item.row.student_no,
        "classId": item.row.class_id,
        "className": item.class_name,
        "badges": badges,
        "createdAt": item.row.created_at,
    })
}

fn list_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.list_classes() {
        Ok(rows) => ok(
            &req.id,
            json!({ "classes": rows.iter().map(class_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn create_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match str_param(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = opt_str_param(req, "term").unwrap_or_default();
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.add_class(&name, &term) {
        Ok(id) => ok(&req.id, json!({ "classId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn update_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match str_param(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match str_param(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term = opt_str_param(req, "term").unwrap_or_default();
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.update_class(&class_id, &name, &term) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn delete_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match str_param(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.delete_class(&class_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn copy_class_to_term(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match str_param(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new_name = match str_param(req, "newName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let new_term = opt_str_param(req, "newTerm").unwrap_or_default();
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.copy_class_to_term(&class_id, &new_name, &new_term) {
        Ok(id) => ok(&req.id, json!({ "classId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn list_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.list_students(class_id.as_deref()) {
        Ok(items) => ok(
            &req.id,
            json!({ "students": items.iter().map(student_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn create_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let first_name = match str_param(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match str_param(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = match str_param(req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.add_student(&first_name, &last_name, &student_no, class_id.as_deref()) {
        Ok(id) => ok(&req.id, json!({ "studentId": id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn update_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match str_param(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match str_param(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = match str_param(req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.update_student(
        &student_id,
        &first_name,
        &last_name,
        &student_no,
        class_id.as_deref(),
    ) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn delete_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.delete_student(&student_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn set_badges(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("badges").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "badges must be an array", None);
    };
    let mut badges = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "badges must be strings", None);
        };
        badges.push(s.to_string());
    }
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match store.set_student_badges(&student_id, &badges) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn filter_by_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let op_raw = match str_param(req, "op") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(value) = req.params.get("value").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing numeric value", None);
    };
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let op = match AverageFilterOp::parse(&op_raw) {
        Ok(op) => op,
        Err(e) => return store_err(&req.id, &e),
    };
    match store.filter_students_by_average(class_id.as_deref(), op, value) {
        Ok(items) => ok(
            &req.id,
            json!({ "students": items.iter().map(student_json).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}
