use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradetrackd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradetrackd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: u64,
}

impl Sidecar {
    fn open(workspace: &PathBuf) -> Self {
        let (child, stdin, reader) = spawn_sidecar();
        let mut me = Sidecar {
            child,
            stdin,
            reader,
            seq: 0,
        };
        me.call(
            "workspace.open",
            json!({ "path": workspace.to_string_lossy() }),
        );
        me
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.seq += 1;
        request_ok(
            &mut self.stdin,
            &mut self.reader,
            &self.seq.to_string(),
            method,
            params,
        )
    }

    fn category_id(&mut self, name: &str) -> String {
        let cats = self.call("categories.list", json!({}));
        cats.get("categories")
            .and_then(|v| v.as_array())
            .unwrap()
            .iter()
            .find(|c| c.get("name").and_then(|v| v.as_str()) == Some(name))
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string()
    }

    fn add_student(&mut self, first: &str, last: &str, no: &str, class_id: Option<&str>) -> String {
        let result = self.call(
            "students.create",
            json!({
                "firstName": first,
                "lastName": last,
                "studentNo": no,
                "classId": class_id,
            }),
        );
        result
            .get("studentId")
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string()
    }

    fn add_title(&mut self, label: &str, category_id: &str) -> String {
        let result = self.call(
            "titles.create",
            json!({ "label": label, "categoryId": category_id }),
        );
        result
            .get("titleId")
            .and_then(|v| v.as_str())
            .unwrap()
            .to_string()
    }

    fn enter_score(&mut self, student_id: &str, title_id: &str, score: f64) {
        self.call(
            "grades.upsert",
            json!({ "studentId": student_id, "titleId": title_id, "score": score }),
        );
    }

    fn finish(mut self, workspace: PathBuf) {
        drop(self.stdin);
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(workspace);
    }
}

#[test]
fn overall_weighs_categories_equally() {
    let workspace = temp_dir("gradetrack-calc-overall");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let odev = sc.category_id("Ödev");
    let student = sc.add_student("Ali", "Kaya", "1", None);

    // Three quizzes at 100 and one homework at 0: category averages are
    // 100 and 0, so the overall is 50 regardless of entry counts.
    for i in 0..3 {
        let t = sc.add_title(&format!("Quiz {}", i + 1), &quiz);
        sc.enter_score(&student, &t, 100.0);
    }
    let hw = sc.add_title("Ödev 1", &odev);
    sc.enter_score(&student, &hw, 0.0);

    let q = sc.call(
        "averages.category",
        json!({ "studentId": student, "categoryId": quiz }),
    );
    assert_eq!(q.get("average").and_then(|v| v.as_f64()), Some(100.0));

    let h = sc.call(
        "averages.category",
        json!({ "studentId": student, "categoryId": odev }),
    );
    assert_eq!(h.get("average").and_then(|v| v.as_f64()), Some(0.0));

    let overall = sc.call("averages.overall", json!({ "studentId": student }));
    assert_eq!(overall.get("average").and_then(|v| v.as_f64()), Some(50.0));

    sc.finish(workspace);
}

#[test]
fn no_entries_yields_null_not_zero() {
    let workspace = temp_dir("gradetrack-calc-null");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let student = sc.add_student("Ali", "Kaya", "1", None);

    let avg = sc.call(
        "averages.category",
        json!({ "studentId": student, "categoryId": quiz }),
    );
    assert!(avg.get("average").unwrap().is_null());

    let overall = sc.call("averages.overall", json!({ "studentId": student }));
    assert!(overall.get("average").unwrap().is_null());

    // A real zero entry is data, not absence.
    let t = sc.add_title("Quiz 1", &quiz);
    sc.enter_score(&student, &t, 0.0);
    let avg = sc.call(
        "averages.category",
        json!({ "studentId": student, "categoryId": quiz }),
    );
    assert_eq!(avg.get("average").and_then(|v| v.as_f64()), Some(0.0));

    sc.finish(workspace);
}

#[test]
fn class_average_scopes_to_class_or_school() {
    let workspace = temp_dir("gradetrack-calc-class");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let class_a = sc.call("classes.create", json!({ "name": "5-A" }));
    let class_a = class_a.get("classId").and_then(|v| v.as_str()).unwrap().to_string();
    let class_b = sc.call("classes.create", json!({ "name": "5-B" }));
    let class_b = class_b.get("classId").and_then(|v| v.as_str()).unwrap().to_string();

    let s1 = sc.add_student("Ali", "Kaya", "1", Some(&class_a));
    let s2 = sc.add_student("Ayse", "Demir", "2", Some(&class_b));
    let t = sc.add_title("Quiz 1", &quiz);
    sc.enter_score(&s1, &t, 80.0);
    sc.enter_score(&s2, &t, 40.0);

    let scoped = sc.call(
        "averages.class",
        json!({ "categoryId": quiz, "classId": class_a }),
    );
    assert_eq!(scoped.get("average").and_then(|v| v.as_f64()), Some(80.0));

    let school = sc.call("averages.class", json!({ "categoryId": quiz }));
    assert_eq!(school.get("average").and_then(|v| v.as_f64()), Some(60.0));

    // No categoryId: the class-wide overall mean. Only Quiz has entries,
    // so it equals the Quiz figure here.
    let overall = sc.call("averages.class", json!({ "classId": class_a }));
    assert_eq!(overall.get("average").and_then(|v| v.as_f64()), Some(80.0));

    sc.finish(workspace);
}

#[test]
fn averages_round_to_two_decimals_on_the_wire() {
    let workspace = temp_dir("gradetrack-calc-round");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let student = sc.add_student("Ali", "Kaya", "1", None);
    for (i, score) in [70.0, 75.0, 72.0].iter().enumerate() {
        let t = sc.add_title(&format!("Quiz {}", i + 1), &quiz);
        sc.enter_score(&student, &t, *score);
    }

    // 217 / 3 = 72.333... -> 72.33 at the presentation boundary.
    let avg = sc.call(
        "averages.category",
        json!({ "studentId": student, "categoryId": quiz }),
    );
    assert_eq!(avg.get("average").and_then(|v| v.as_f64()), Some(72.33));

    sc.finish(workspace);
}

#[test]
fn evaluation_rows_carry_per_category_and_overall() {
    let workspace = temp_dir("gradetrack-calc-eval");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let student = sc.add_student("Ali", "Kaya", "1", None);
    let t = sc.add_title("Quiz 1", &quiz);
    sc.enter_score(&student, &t, 85.0);

    let result = sc.call("analytics.evaluation", json!({}));
    let rows = result.get("rows").and_then(|v| v.as_array()).unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("studentId").and_then(|v| v.as_str()), Some(student.as_str()));
    assert_eq!(row.get("overall").and_then(|v| v.as_f64()), Some(85.0));

    let categories = row.get("categories").and_then(|v| v.as_array()).unwrap();
    assert_eq!(categories.len(), 3);
    let quiz_cell = categories
        .iter()
        .find(|c| c.get("name").and_then(|v| v.as_str()) == Some("Quiz"))
        .unwrap();
    assert_eq!(quiz_cell.get("average").and_then(|v| v.as_f64()), Some(85.0));
    let hw_cell = categories
        .iter()
        .find(|c| c.get("name").and_then(|v| v.as_str()) == Some("Ödev"))
        .unwrap();
    assert!(hw_cell.get("average").unwrap().is_null());

    sc.finish(workspace);
}

#[test]
fn distribution_skips_unscored_students() {
    let workspace = temp_dir("gradetrack-calc-dist");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let class = sc.call("classes.create", json!({ "name": "5-A" }));
    let class_id = class.get("classId").and_then(|v| v.as_str()).unwrap().to_string();

    let s1 = sc.add_student("Ali", "Kaya", "1", Some(&class_id));
    sc.add_student("Ayse", "Demir", "2", Some(&class_id));
    let t = sc.add_title("Quiz 1", &quiz);
    sc.enter_score(&s1, &t, 90.0);

    let result = sc.call("analytics.distribution", json!({ "classId": class_id }));
    assert_eq!(result.get("values"), Some(&json!([90.0])));

    sc.finish(workspace);
}

#[test]
fn filter_by_average_selects_on_overall() {
    let workspace = temp_dir("gradetrack-calc-filter");
    let mut sc = Sidecar::open(&workspace);

    let quiz = sc.category_id("Quiz");
    let s1 = sc.add_student("Ali", "Kaya", "1", None);
    let s2 = sc.add_student("Ayse", "Demir", "2", None);
    sc.add_student("Can", "Oz", "3", None);
    let t = sc.add_title("Quiz 1", &quiz);
    sc.enter_score(&s1, &t, 90.0);
    sc.enter_score(&s2, &t, 45.0);

    let result = sc.call(
        "students.filterByAverage",
        json!({ "op": ">=", "value": 50 }),
    );
    let students = result.get("students").and_then(|v| v.as_array()).unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("id").and_then(|v| v.as_str()),
        Some(s1.as_str())
    );

    sc.finish(workspace);
}
