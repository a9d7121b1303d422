use crate::aisis;
use crate::diag::LogLevel;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, opt_string, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::qpi::{compute_qpi, GradeEntry, Letter};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn load_grade_entries(conn: &Connection, term: Option<&str>) -> rusqlite::Result<Vec<GradeEntry>> {
    let base = "SELECT term, course_code, units, letter FROM grades";
    let (sql, params): (String, Vec<String>) = match term {
        Some(t) => (
            format!("{} WHERE term = ? ORDER BY term, course_code", base),
            vec![t.to_string()],
        ),
        None => (format!("{} ORDER BY term, course_code", base), Vec::new()),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |r| {
        let term: String = r.get(0)?;
        let course_code: String = r.get(1)?;
        let units: f64 = r.get(2)?;
        let letter_raw: String = r.get(3)?;
        Ok((term, course_code, units, letter_raw))
    })?;

    let mut out: Vec<GradeEntry> = Vec::new();
    for row in rows {
        let (term, course_code, units, letter_raw) = row?;
        // Rows with an unknown letter are skipped rather than poisoning the
        // whole summary; upsert validates, so these only appear if the DB
        // was edited externally.
        let Some(letter) = Letter::parse(&letter_raw) else {
            continue;
        };
        out.push(GradeEntry {
            term,
            course_code,
            units,
            letter,
        });
    }
    Ok(out)
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let term = match opt_string(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let base = "SELECT id, term, course_code, course_title, units, letter FROM grades";
    let (sql, params): (String, Vec<String>) = match term {
        Some(t) => (
            format!("{} WHERE term = ? ORDER BY term, course_code", base),
            vec![t],
        ),
        None => (format!("{} ORDER BY term, course_code", base), Vec::new()),
    };
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |r| {
            let id: String = r.get(0)?;
            let term: String = r.get(1)?;
            let course_code: String = r.get(2)?;
            let course_title: Option<String> = r.get(3)?;
            let units: f64 = r.get(4)?;
            let letter: String = r.get(5)?;
            Ok(json!({
                "id": id,
                "term": term,
                "courseCode": course_code,
                "courseTitle": course_title,
                "units": units,
                "letter": letter
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn upsert_grade(
    conn: &Connection,
    term: &str,
    course_code: &str,
    course_title: Option<&str>,
    units: f64,
    letter: Letter,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO grades(id, term, course_code, course_title, units, letter, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(term, course_code) DO UPDATE SET
            course_title = COALESCE(excluded.course_title, course_title),
            units = excluded.units,
            letter = excluded.letter,
            updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            term,
            course_code,
            course_title,
            units,
            letter.as_str(),
            now_ts(),
        ),
    )?;
    Ok(())
}

fn handle_grades_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_title = match opt_string(req, "courseTitle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let units = match required_f64(req, "units") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if units <= 0.0 {
        return err(&req.id, "bad_params", "units must be positive", None);
    }
    let letter_raw = match required_str(req, "letter") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(letter) = Letter::parse(&letter_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown letter grade: {}", letter_raw),
            None,
        );
    };

    if let Err(e) = upsert_grade(
        conn,
        &term,
        &course_code,
        course_title.as_deref(),
        units,
        letter,
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "term": term, "courseCode": course_code, "letter": letter.as_str() }),
    )
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = match conn.execute(
        "DELETE FROM grades WHERE term = ? AND course_code = ?",
        (&term, &course_code),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "grade not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_grades_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let entries = match load_grade_entries(conn, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let summary = compute_qpi(&entries);
    match serde_json::to_value(&summary) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

fn handle_grades_import_text(state: &mut AppState, req: &Request) -> serde_json::Value {
    let text = match required_str(req, "text") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let report = aisis::parse_grade_report(&text);
    let rows: Vec<serde_json::Value> = report
        .rows
        .iter()
        .map(|r| {
            json!({
                "courseCode": r.course_code,
                "courseTitle": r.course_title,
                "units": r.units,
                "letter": r.letter.as_str()
            })
        })
        .collect();

    state.diag.append(
        LogLevel::Info,
        "grades",
        &format!(
            "grade report parsed: {} rows, {} lines skipped",
            rows.len(),
            report.skipped_lines.len()
        ),
    );

    // Preview only; nothing is persisted until grades.applyImport.
    ok(
        &req.id,
        json!({
            "rows": rows,
            "skippedCount": report.skipped_lines.len(),
            "skippedLines": report.skipped_lines,
        }),
    )
}

fn handle_grades_apply_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(rows) = req.params.get("rows").and_then(|v| v.as_array()).cloned() else {
        return err(&req.id, "bad_params", "rows must be an array", None);
    };

    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // Validate every row before touching the database.
    let mut parsed: Vec<(String, Option<String>, f64, Letter)> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let Some(course_code) = row.get("courseCode").and_then(|v| v.as_str()) else {
            return err(
                &req.id,
                "bad_params",
                format!("rows[{}] missing courseCode", i),
                None,
            );
        };
        let course_title = row
            .get("courseTitle")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let Some(units) = row.get("units").and_then(|v| v.as_f64()).filter(|u| *u > 0.0) else {
            return err(
                &req.id,
                "bad_params",
                format!("rows[{}] units must be positive", i),
                None,
            );
        };
        let Some(letter) = row
            .get("letter")
            .and_then(|v| v.as_str())
            .and_then(Letter::parse)
        else {
            return err(
                &req.id,
                "bad_params",
                format!("rows[{}] has an unknown letter grade", i),
                None,
            );
        };
        parsed.push((course_code.to_string(), course_title, units, letter));
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for (course_code, course_title, units, letter) in &parsed {
        if let Err(e) = upsert_grade(
            &tx,
            &term,
            course_code,
            course_title.as_deref(),
            *units,
            *letter,
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let applied = parsed.len();
    state.diag.append(
        LogLevel::Info,
        "grades",
        &format!("import applied: {} grades into term {}", applied, term),
    );

    ok(&req.id, json!({ "applied": applied, "term": term }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.upsert" => Some(handle_grades_upsert(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        "grades.summary" => Some(handle_grades_summary(state, req)),
        "grades.importText" => Some(handle_grades_import_text(state, req)),
        "grades.applyImport" => Some(handle_grades_apply_import(state, req)),
        _ => None,
    }
}
