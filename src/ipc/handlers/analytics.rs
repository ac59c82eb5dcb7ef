use serde_json::json;

use super::{opt_str_param, require_store, str_param};
use crate::calc;
use crate::ipc::error::{ok, store_err};
use crate::ipc::types::{AppState, Request};

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "averages.category" => Some(category_average(state, req)),
        "averages.overall" => Some(overall_average(state, req)),
        "averages.class" => Some(class_average(state, req)),
        "analytics.evaluation" => Some(evaluation(state, req)),
        "analytics.classReport" => Some(class_report(state, req)),
        "analytics.distribution" => Some(distribution(state, req)),
        _ => None,
    }
}

/// Display rounding lives here, at the presentation boundary; the engine
/// itself composes unrounded values.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `null` for "no data", so the UI can render a placeholder instead of a
/// misleading zero.
fn display(avg: Option<f64>) -> serde_json::Value {
    match avg {
        Some(v) => json!(round2(v)),
        None => serde_json::Value::Null,
    }
}

fn category_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match str_param(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match calc::category_average(store.conn(), &student_id, &category_id) {
        Ok(avg) => ok(&req.id, json!({ "average": display(avg) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn overall_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match str_param(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match calc::overall_average(store.conn(), &student_id) {
        Ok(avg) => ok(&req.id, json!({ "average": display(avg) })),
        Err(e) => store_err(&req.id, &e),
    }
}

/// Without a `categoryId` this reports the class-wide overall mean,
/// weighting every category equally.
fn class_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let category_id = opt_str_param(req, "categoryId");
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let avg = match category_id {
        Some(cid) => calc::class_average(store.conn(), &cid, class_id.as_deref()),
        None => calc::class_overall_average(store.conn(), class_id.as_deref()),
    };
    match avg {
        Ok(avg) => ok(&req.id, json!({ "average": display(avg) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn evaluation(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match calc::evaluation_rows(store.conn()) {
        Ok(mut rows) => {
            for row in &mut rows {
                row.overall = row.overall.map(round2);
                for cat in &mut row.categories {
                    cat.average = cat.average.map(round2);
                }
            }
            ok(&req.id, json!({ "rows": rows }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn class_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = opt_str_param(req, "classId");
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match calc::class_report_rows(store.conn(), class_id.as_deref()) {
        Ok(mut report) => {
            for class in &mut report {
                for row in &mut class.rows {
                    row.overall = row.overall.map(round2);
                    for cat in &mut row.categories {
                        cat.average = cat.average.map(round2);
                    }
                }
            }
            ok(&req.id, json!({ "report": report }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn distribution(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match str_param(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let store = match require_store(state, &req.id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    match calc::class_distribution(store.conn(), &class_id) {
        Ok(values) => ok(
            &req.id,
            json!({ "values": values.iter().map(|v| round2(*v)).collect::<Vec<_>>() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}
