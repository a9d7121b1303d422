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

fn setup_schedule(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "w",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "s",
        "schedules.create",
        json!({ "term": "2025-1", "name": "Draft" }),
    );
    created
        .get("scheduleId")
        .and_then(|v| v.as_str())
        .expect("scheduleId")
        .to_string()
}

fn add_block(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    schedule_id: &str,
    course: &str,
    day: i64,
    start: &str,
    end: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "blocks.add",
        json!({
            "scheduleId": schedule_id,
            "courseCode": course,
            "day": day,
            "startTime": start,
            "endTime": end
        }),
    );
    result
        .get("block")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("block id")
        .to_string()
}

fn block_times(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    schedule_id: &str,
    block_id: &str,
) -> (i64, String, String) {
    let listed = request_ok(
        stdin,
        reader,
        id,
        "blocks.list",
        json!({ "scheduleId": schedule_id }),
    );
    let block = listed
        .get("blocks")
        .and_then(|v| v.as_array())
        .expect("blocks")
        .iter()
        .find(|b| b.get("id").and_then(|v| v.as_str()) == Some(block_id))
        .expect("block present")
        .clone();
    (
        block.get("dayOfWeek").and_then(|v| v.as_i64()).expect("day"),
        block
            .get("startTime")
            .and_then(|v| v.as_str())
            .expect("startTime")
            .to_string(),
        block
            .get("endTime")
            .and_then(|v| v.as_str())
            .expect("endTime")
            .to_string(),
    )
}

#[test]
fn clear_move_commits_and_preserves_duration() {
    let workspace = temp_dir("planner-move-clear");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let schedule_id = setup_schedule(&mut stdin, &mut reader, &workspace);
    let block_id = add_block(
        &mut stdin,
        &mut reader,
        "1",
        &schedule_id,
        "CS101",
        1,
        "09:00",
        "10:30",
    );

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "blocks.move",
        json!({ "blockId": block_id, "day": 3, "startTime": "13:15" }),
    );
    assert_eq!(moved.get("moved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(moved.get("clear").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        moved.get("newStart").and_then(|v| v.as_str()),
        Some("13:15:00")
    );
    assert_eq!(
        moved.get("newEnd").and_then(|v| v.as_str()),
        Some("14:45:00")
    );

    let (day, start, end) = block_times(&mut stdin, &mut reader, "3", &schedule_id, &block_id);
    assert_eq!(day, 3);
    assert_eq!(start, "13:15:00");
    assert_eq!(end, "14:45:00");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn conflicting_move_without_confirm_is_rejected_and_state_unchanged() {
    let workspace = temp_dir("planner-move-reject");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let schedule_id = setup_schedule(&mut stdin, &mut reader, &workspace);
    let cs = add_block(
        &mut stdin,
        &mut reader,
        "1",
        &schedule_id,
        "CS101",
        1,
        "09:00",
        "10:30",
    );
    let math = add_block(
        &mut stdin,
        &mut reader,
        "2",
        &schedule_id,
        "MATH20",
        2,
        "10:00",
        "11:00",
    );

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "blocks.move",
        json!({ "blockId": math, "day": 1, "startTime": "10:00" }),
    );
    assert_eq!(moved.get("moved").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(moved.get("clear").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        moved.get("proposedStart").and_then(|v| v.as_str()),
        Some("10:00:00")
    );
    assert_eq!(
        moved.get("proposedEnd").and_then(|v| v.as_str()),
        Some("11:00:00")
    );
    let conflicts = moved
        .get("conflicts")
        .and_then(|v| v.as_array())
        .expect("conflicts");
    assert_eq!(conflicts.len(), 1);
    assert_eq!(
        conflicts[0].get("courseCode").and_then(|v| v.as_str()),
        Some("CS101")
    );

    // Block snapped back: stored day and times are untouched.
    let (day, start, end) = block_times(&mut stdin, &mut reader, "4", &schedule_id, &math);
    assert_eq!(day, 2);
    assert_eq!(start, "10:00:00");
    assert_eq!(end, "11:00:00");

    // The untouched CS101 block is where it was, too.
    let (cs_day, cs_start, _) = block_times(&mut stdin, &mut reader, "5", &schedule_id, &cs);
    assert_eq!(cs_day, 1);
    assert_eq!(cs_start, "09:00:00");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn conflicting_move_with_confirm_commits() {
    let workspace = temp_dir("planner-move-confirm");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let schedule_id = setup_schedule(&mut stdin, &mut reader, &workspace);
    let _cs = add_block(
        &mut stdin,
        &mut reader,
        "1",
        &schedule_id,
        "CS101",
        1,
        "09:00",
        "10:30",
    );
    let math = add_block(
        &mut stdin,
        &mut reader,
        "2",
        &schedule_id,
        "MATH20",
        2,
        "10:00",
        "11:00",
    );

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "blocks.move",
        json!({ "blockId": math, "day": 1, "startTime": "10:00", "confirm": true }),
    );
    assert_eq!(moved.get("moved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(moved.get("clear").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        moved
            .get("conflictScan")
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let (day, start, end) = block_times(&mut stdin, &mut reader, "4", &schedule_id, &math);
    assert_eq!(day, 1);
    assert_eq!(start, "10:00:00");
    assert_eq!(end, "11:00:00");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn move_onto_own_courses_other_section_is_clear() {
    let workspace = temp_dir("planner-move-same-course");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let schedule_id = setup_schedule(&mut stdin, &mut reader, &workspace);
    let _lec = add_block(
        &mut stdin,
        &mut reader,
        "1",
        &schedule_id,
        "CS101",
        1,
        "09:00",
        "10:30",
    );
    let lab = add_block(
        &mut stdin,
        &mut reader,
        "2",
        &schedule_id,
        "CS101",
        3,
        "14:00",
        "17:00",
    );

    // Overlap with a sibling of the same course does not block the move,
    // but the post-commit scan still reports it.
    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "blocks.move",
        json!({ "blockId": lab, "day": 1, "startTime": "09:30" }),
    );
    assert_eq!(moved.get("moved").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(moved.get("clear").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        moved
            .get("conflictScan")
            .and_then(|v| v.get("count"))
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
