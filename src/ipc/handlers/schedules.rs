use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, opt_string, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_schedules_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let term = match opt_string(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let base = "SELECT
           s.id,
           s.term,
           s.name,
           s.is_active,
           (SELECT COUNT(*) FROM schedule_blocks b WHERE b.schedule_id = s.id) AS block_count
         FROM schedules s";
    let (sql, params): (String, Vec<String>) = match term {
        Some(t) => (
            format!("{} WHERE s.term = ? ORDER BY s.term, s.name", base),
            vec![t],
        ),
        None => (format!("{} ORDER BY s.term, s.name", base), Vec::new()),
    };

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            let id: String = row.get(0)?;
            let term: String = row.get(1)?;
            let name: String = row.get(2)?;
            let is_active: i64 = row.get(3)?;
            let block_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "term": term,
                "name": name,
                "isActive": is_active != 0,
                "blockCount": block_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(schedules) => ok(&req.id, json!({ "schedules": schedules })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_schedules_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let term = match required_str(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let schedule_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO schedules(id, term, name, is_active, created_at) VALUES(?, ?, ?, 0, ?)",
        (&schedule_id, &term, &name, now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "schedules" })),
        );
    }

    ok(
        &req.id,
        json!({ "scheduleId": schedule_id, "term": term, "name": name }),
    )
}

fn handle_schedules_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let updated = match conn.execute(
        "UPDATE schedules SET name = ? WHERE id = ?",
        (&name, &schedule_id),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "schedule not found", None);
    }
    ok(&req.id, json!({ "scheduleId": schedule_id, "name": name }))
}

fn handle_schedules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM schedules WHERE id = ?", [&schedule_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "schedule not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM schedule_blocks WHERE schedule_id = ?",
        [&schedule_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schedule_blocks" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM schedules WHERE id = ?", [&schedule_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schedules" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_schedules_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let term: Option<String> = match conn
        .query_row(
            "SELECT term FROM schedules WHERE id = ?",
            [&schedule_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(term) = term else {
        return err(&req.id, "not_found", "schedule not found", None);
    };

    // At most one active schedule per term: clear siblings, then set.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute("UPDATE schedules SET is_active = 0 WHERE term = ?", [&term]) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.execute(
        "UPDATE schedules SET is_active = 1 WHERE id = ?",
        [&schedule_id],
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let _ = db::settings_set_json(conn, "ui.lastActiveTerm", &json!(term));

    ok(&req.id, json!({ "scheduleId": schedule_id, "term": term }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedules.list" => Some(handle_schedules_list(state, req)),
        "schedules.create" => Some(handle_schedules_create(state, req)),
        "schedules.rename" => Some(handle_schedules_rename(state, req)),
        "schedules.delete" => Some(handle_schedules_delete(state, req)),
        "schedules.setActive" => Some(handle_schedules_set_active(state, req)),
        _ => None,
    }
}
