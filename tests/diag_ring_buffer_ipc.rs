use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

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
fn log_list_limit_and_clear() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Diagnostics work without a workspace; the buffer lives in the process.
    for (i, (level, msg)) in [
        ("info", "first"),
        ("warn", "second"),
        ("error", "third"),
    ]
    .iter()
    .enumerate()
    {
        let logged = request_ok(
            &mut stdin,
            &mut reader,
            &format!("log-{}", i),
            "diag.log",
            json!({ "level": level, "source": "frontend", "message": msg }),
        );
        assert_eq!(
            logged.get("seq").and_then(|v| v.as_u64()),
            Some(i as u64 + 1)
        );
    }

    let logs = request_ok(&mut stdin, &mut reader, "all", "diag.logs", json!({}));
    let entries = logs
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries");
    assert_eq!(entries.len(), 3);
    assert_eq!(
        entries[0].get("message").and_then(|v| v.as_str()),
        Some("first")
    );
    assert_eq!(
        entries[2].get("message").and_then(|v| v.as_str()),
        Some("third")
    );
    let metrics = logs.get("metrics").expect("metrics");
    assert_eq!(
        metrics.get("totalAppended").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(metrics.get("warnCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(metrics.get("errorCount").and_then(|v| v.as_u64()), Some(1));

    // limit keeps the newest entries.
    let logs = request_ok(
        &mut stdin,
        &mut reader,
        "limited",
        "diag.logs",
        json!({ "limit": 2 }),
    );
    let entries = logs
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[0].get("message").and_then(|v| v.as_str()),
        Some("second")
    );

    let cleared = request_ok(&mut stdin, &mut reader, "clear", "diag.clear", json!({}));
    assert_eq!(cleared.get("cleared").and_then(|v| v.as_i64()), Some(3));

    // Counters and sequence survive the clear.
    let logged = request_ok(
        &mut stdin,
        &mut reader,
        "after",
        "diag.log",
        json!({ "level": "info", "source": "frontend", "message": "fourth" }),
    );
    assert_eq!(logged.get("seq").and_then(|v| v.as_u64()), Some(4));
    let logs = request_ok(&mut stdin, &mut reader, "final", "diag.logs", json!({}));
    let metrics = logs.get("metrics").expect("metrics");
    assert_eq!(
        metrics.get("totalAppended").and_then(|v| v.as_u64()),
        Some(4)
    );
    assert_eq!(metrics.get("retained").and_then(|v| v.as_u64()), Some(1));
}

#[test]
fn unknown_level_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let value = request(
        &mut stdin,
        &mut reader,
        "1",
        "diag.log",
        json!({ "level": "trace", "source": "frontend", "message": "nope" }),
    );
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );
}
