use crate::diag::LogLevel;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, opt_bool, opt_string, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{
    assign_color, detect_conflicts, format_time_of_day, parse_time_of_day, validate_move,
    validate_placement, BlockError, MoveDecision, ScheduleBlock,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Canonical order matches the conflict scan: day, then start, then course.
fn load_blocks(conn: &Connection, schedule_id: &str) -> rusqlite::Result<Vec<ScheduleBlock>> {
    let mut stmt = conn.prepare(
        "SELECT id, schedule_id, course_code, section, room, course_title,
                day_of_week, start_time, end_time, color
         FROM schedule_blocks
         WHERE schedule_id = ?
         ORDER BY day_of_week, start_time, course_code",
    )?;
    stmt.query_map([schedule_id], |r| {
        Ok(ScheduleBlock {
            id: r.get(0)?,
            schedule_id: r.get(1)?,
            course_code: r.get(2)?,
            section: r.get(3)?,
            room: r.get(4)?,
            course_title: r.get(5)?,
            day_of_week: r.get(6)?,
            start_time: r.get(7)?,
            end_time: r.get(8)?,
            color: r.get(9)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
}

fn conflicts_json(blocks: &[ScheduleBlock]) -> Result<serde_json::Value, BlockError> {
    let conflicts = detect_conflicts(blocks)?;
    Ok(json!({
        "count": conflicts.len(),
        "conflicts": conflicts,
    }))
}

fn block_error(req: &Request, e: &BlockError) -> serde_json::Value {
    if e.code == "not_found" {
        return err(&req.id, "not_found", e.message.clone(), None);
    }
    err(
        &req.id,
        "invalid_block",
        e.message.clone(),
        Some(json!({ "code": e.code })),
    )
}

fn schedule_exists(conn: &Connection, schedule_id: &str) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM schedules WHERE id = ?", [schedule_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn handle_blocks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match schedule_exists(conn, &schedule_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "schedule not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let blocks = match load_blocks(conn, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let conflicts = match conflicts_json(&blocks) {
        Ok(v) => v,
        Err(e) => return block_error(req, &e),
    };

    ok(&req.id, json!({ "blocks": blocks, "conflictScan": conflicts }))
}

fn handle_blocks_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let day = match required_i64(req, "day") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let start_time = match required_str(req, "startTime") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let end_time = match required_str(req, "endTime") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match opt_string(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let room = match opt_string(req, "room") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_title = match opt_string(req, "courseTitle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match schedule_exists(conn, &schedule_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "schedule not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    // Reject malformed day/time/duration at the boundary, before anything
    // reaches the conflict scan.
    let (start_s, end_s) = match validate_placement(day, &start_time, &end_time) {
        Ok(v) => v,
        Err(e) => return block_error(req, &e),
    };

    let existing = match load_blocks(conn, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let color = assign_color(&course_code, &existing);

    let block = ScheduleBlock {
        id: Uuid::new_v4().to_string(),
        schedule_id: schedule_id.clone(),
        course_code,
        section,
        room,
        course_title,
        day_of_week: day,
        start_time: format_time_of_day(start_s),
        end_time: format_time_of_day(end_s),
        color,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO schedule_blocks(
            id, schedule_id, course_code, section, room, course_title,
            day_of_week, start_time, end_time, color, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &block.id,
            &block.schedule_id,
            &block.course_code,
            &block.section,
            &block.room,
            &block.course_title,
            block.day_of_week,
            &block.start_time,
            &block.end_time,
            &block.color,
            now_ts(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "schedule_blocks" })),
        );
    }

    let after = match load_blocks(conn, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let conflicts = match conflicts_json(&after) {
        Ok(v) => v,
        Err(e) => return block_error(req, &e),
    };

    ok(&req.id, json!({ "block": block, "conflictScan": conflicts }))
}

fn handle_blocks_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let block_id = match required_str(req, "blockId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let day = match required_i64(req, "day") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let start_time = match required_str(req, "startTime") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let confirm = match opt_bool(req, "confirm", false) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let schedule_id: Option<String> = match conn
        .query_row(
            "SELECT schedule_id FROM schedule_blocks WHERE id = ?",
            [&block_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(schedule_id) = schedule_id else {
        return err(&req.id, "not_found", "block not found", None);
    };

    // Validate and commit against one snapshot inside one transaction, so
    // a second move can never be checked against stale state.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let blocks = match load_blocks(&tx, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let decision = match validate_move(&blocks, &block_id, day, &start_time) {
        Ok(d) => d,
        Err(e) => return block_error(req, &e),
    };

    let (commit, clear, new_start, new_end, conflicts) = match decision {
        MoveDecision::Clear { new_start, new_end } => (true, true, new_start, new_end, Vec::new()),
        MoveDecision::Conflicting { conflicts } => {
            // The overlap is advisory; an explicit confirm commits anyway.
            let start_s = match parse_time_of_day(&start_time) {
                Ok(s) => s,
                Err(e) => return block_error(req, &e),
            };
            let Some(moved) = blocks.iter().find(|b| b.id == block_id) else {
                return err(&req.id, "not_found", "block not found", None);
            };
            let duration = match (
                parse_time_of_day(&moved.start_time),
                parse_time_of_day(&moved.end_time),
            ) {
                (Ok(s), Ok(e)) => e - s,
                _ => return err(&req.id, "db_query_failed", "stored block time is corrupt", None),
            };
            (
                confirm,
                false,
                format_time_of_day(start_s),
                format_time_of_day(start_s + duration),
                conflicts,
            )
        }
    };

    if !commit {
        // Rejected move: nothing written, the block snaps back in the UI.
        let _ = tx.rollback();
        return ok(
            &req.id,
            json!({
                "moved": false,
                "clear": false,
                "proposedStart": new_start,
                "proposedEnd": new_end,
                "conflicts": conflicts
            }),
        );
    }

    if let Err(e) = tx.execute(
        "UPDATE schedule_blocks
         SET day_of_week = ?, start_time = ?, end_time = ?, updated_at = ?
         WHERE id = ?",
        (day, &new_start, &new_end, now_ts(), &block_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let after = match load_blocks(conn, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let scan = match conflicts_json(&after) {
        Ok(v) => v,
        Err(e) => return block_error(req, &e),
    };

    if !clear {
        state.diag.append(
            LogLevel::Warn,
            "blocks",
            &format!("conflicting move confirmed for block {}", block_id),
        );
    }

    ok(
        &req.id,
        json!({
            "moved": true,
            "clear": clear,
            "newStart": new_start,
            "newEnd": new_end,
            "conflicts": conflicts,
            "conflictScan": scan
        }),
    )
}

fn handle_blocks_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let block_id = match required_str(req, "blockId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match opt_string(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let room = match opt_string(req, "room") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_title = match opt_string(req, "courseTitle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let schedule_id: Option<String> = match conn
        .query_row(
            "SELECT schedule_id FROM schedule_blocks WHERE id = ?",
            [&block_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(schedule_id) = schedule_id else {
        return err(&req.id, "not_found", "block not found", None);
    };

    // Retiming is all-or-nothing: day, startTime and endTime together.
    let retime = match (
        req.params.get("day").and_then(|v| v.as_i64()),
        req.params.get("startTime").and_then(|v| v.as_str()),
        req.params.get("endTime").and_then(|v| v.as_str()),
    ) {
        (None, None, None) => None,
        (Some(d), Some(s), Some(e)) => match validate_placement(d, s, e) {
            Ok((start_s, end_s)) => {
                Some((d, format_time_of_day(start_s), format_time_of_day(end_s)))
            }
            Err(e) => return block_error(req, &e),
        },
        _ => {
            return err(
                &req.id,
                "bad_params",
                "retiming requires day, startTime and endTime together",
                None,
            )
        }
    };

    if section.is_some() || room.is_some() || course_title.is_some() {
        if let Err(e) = conn.execute(
            "UPDATE schedule_blocks SET
                section = COALESCE(?, section),
                room = COALESCE(?, room),
                course_title = COALESCE(?, course_title),
                updated_at = ?
             WHERE id = ?",
            (&section, &room, &course_title, now_ts(), &block_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Some((d, start, end)) = &retime {
        if let Err(e) = conn.execute(
            "UPDATE schedule_blocks
             SET day_of_week = ?, start_time = ?, end_time = ?, updated_at = ?
             WHERE id = ?",
            (d, start, end, now_ts(), &block_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let after = match load_blocks(conn, &schedule_id) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let conflicts = match conflicts_json(&after) {
        Ok(v) => v,
        Err(e) => return block_error(req, &e),
    };
    let block = after.iter().find(|b| b.id == block_id).cloned();

    ok(&req.id, json!({ "block": block, "conflictScan": conflicts }))
}

fn handle_blocks_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let block_id = match required_str(req, "blockId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = match conn.execute("DELETE FROM schedule_blocks WHERE id = ?", [&block_id]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "block not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "blocks.list" => Some(handle_blocks_list(state, req)),
        "blocks.add" => Some(handle_blocks_add(state, req)),
        "blocks.move" => Some(handle_blocks_move(state, req)),
        "blocks.update" => Some(handle_blocks_update(state, req)),
        "blocks.delete" => Some(handle_blocks_delete(state, req)),
        _ => None,
    }
}
