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
    let exe = env!("CARGO_BIN_EXE_plannerd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn plannerd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn export_then_import_into_fresh_workspace_carries_data() {
    let src_workspace = temp_dir("planner-backup-src");
    let dst_workspace = temp_dir("planner-backup-dst");
    let out_dir = temp_dir("planner-backup-out");
    let bundle = out_dir.join("semester.plannerbundle.zip");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "w1",
        "workspace.select",
        json!({ "path": src_workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedules.create",
        json!({ "term": "2025-1", "name": "Final Plan" }),
    );
    let schedule_id = created
        .get("scheduleId")
        .and_then(|v| v.as_str())
        .expect("scheduleId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "blocks.add",
        json!({
            "scheduleId": schedule_id,
            "courseCode": "CSCI 21",
            "day": 1,
            "startTime": "09:00",
            "endTime": "10:30"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.upsert",
        json!({ "term": "2025-1", "courseCode": "CSCI 21", "units": 3.0, "letter": "A" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("planner-workspace-v1")
    );
    let sha = exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .expect("dbSha256");
    assert_eq!(sha.len(), 64);
    assert!(bundle.is_file());

    // Import into a brand-new workspace, which also becomes the selected one.
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.import",
        json!({
            "inPath": bundle.to_string_lossy(),
            "path": dst_workspace.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("planner-workspace-v1")
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedules.list",
        json!({ "term": "2025-1" }),
    );
    let schedules = listed
        .get("schedules")
        .and_then(|v| v.as_array())
        .expect("schedules");
    assert_eq!(schedules.len(), 1);
    assert_eq!(
        schedules[0].get("name").and_then(|v| v.as_str()),
        Some("Final Plan")
    );
    assert_eq!(
        schedules[0].get("blockCount").and_then(|v| v.as_i64()),
        Some(1)
    );

    let grades = request_ok(&mut stdin, &mut reader, "7", "grades.list", json!({}));
    assert_eq!(
        grades
            .get("grades")
            .and_then(|v| v.as_array())
            .expect("grades")
            .len(),
        1
    );

    let _ = std::fs::remove_dir_all(src_workspace);
    let _ = std::fs::remove_dir_all(dst_workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected_and_session_survives() {
    let workspace = temp_dir("planner-backup-tamper");
    let out_dir = temp_dir("planner-backup-tamper-out");
    let junk = out_dir.join("junk.plannerbundle.zip");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedules.create",
        json!({ "term": "2025-1", "name": "Keep Me" }),
    );

    // Zip signature but no readable archive behind it.
    std::fs::write(&junk, [0x50, 0x4B, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFF]).expect("write junk");

    let value = request(
        &mut stdin,
        &mut reader,
        "2",
        "backup.import",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("import_failed")
    );

    // The previously open workspace still answers queries.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedules.list",
        json!({ "term": "2025-1" }),
    );
    assert_eq!(
        listed
            .get("schedules")
            .and_then(|v| v.as_array())
            .expect("schedules")
            .len(),
        1
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(out_dir);
}
