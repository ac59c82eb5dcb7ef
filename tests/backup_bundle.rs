use serde_json::json;
use std::fs::File;
use std::io::Read;
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

#[test]
fn export_import_round_trip_carries_data() {
    let workspace_a = temp_dir("gradetrack-bundle-src");
    let workspace_b = temp_dir("gradetrack-bundle-dst");
    let out_dir = temp_dir("gradetrack-bundle-out");
    let bundle = out_dir.join("term.gtbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace_a.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "5-A", "term": "2025-Güz" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("gradetrack-workspace-v1")
    );
    assert!(exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .is_some_and(|s| s.len() == 64));

    // The bundle is a zip with a manifest and the database inside.
    let f = File::open(&bundle).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains("gradetrack-workspace-v1"));
    archive
        .by_name("db/gradetrack.sqlite3")
        .expect("database entry in bundle");

    // Import into a fresh workspace and see the class again.
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.open",
        json!({ "path": workspace_b.to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    assert_eq!(
        listed.get("classes").and_then(|v| v.as_array()).unwrap().len(),
        0
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("gradetrack-workspace-v1")
    );

    let listed = request_ok(&mut stdin, &mut reader, "7", "classes.list", json!({}));
    let classes = listed.get("classes").and_then(|v| v.as_array()).unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].get("name").and_then(|v| v.as_str()), Some("5-A"));

    drop(stdin);
    let _ = child.wait();
    for dir in [workspace_a, workspace_b, out_dir] {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn bare_sqlite_files_import_as_legacy_backups() {
    let workspace_a = temp_dir("gradetrack-bundle-legacy-src");
    let workspace_b = temp_dir("gradetrack-bundle-legacy-dst");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.open",
        json!({ "path": workspace_a.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "6-B" }),
    );

    // A copy of the raw database file stands in for an old manual backup.
    let raw_copy = workspace_a.join("manual-copy.sqlite3");
    std::fs::copy(workspace_a.join("gradetrack.sqlite3"), &raw_copy)
        .expect("copy raw database");

    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.open",
        json!({ "path": workspace_b.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.import",
        json!({ "inPath": raw_copy.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("legacy-sqlite3")
    );

    let listed = request_ok(&mut stdin, &mut reader, "5", "classes.list", json!({}));
    let classes = listed.get("classes").and_then(|v| v.as_array()).unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].get("name").and_then(|v| v.as_str()), Some("6-B"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace_a);
    let _ = std::fs::remove_dir_all(workspace_b);
}
