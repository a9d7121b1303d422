use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, opt_string, required_f64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::qpi::Letter;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn handle_curriculum_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let program_code = match opt_string(req, "programCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let base = "SELECT id, program_code, course_code, title, units, category, sort_order
         FROM curriculum_courses";
    let (sql, params): (String, Vec<String>) = match program_code {
        Some(p) => (
            format!("{} WHERE program_code = ? ORDER BY sort_order", base),
            vec![p],
        ),
        None => (
            format!("{} ORDER BY program_code, sort_order", base),
            Vec::new(),
        ),
    };

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |r| {
            let id: String = r.get(0)?;
            let program_code: String = r.get(1)?;
            let course_code: String = r.get(2)?;
            let title: String = r.get(3)?;
            let units: f64 = r.get(4)?;
            let category: String = r.get(5)?;
            let sort_order: i64 = r.get(6)?;
            Ok(json!({
                "id": id,
                "programCode": program_code,
                "courseCode": course_code,
                "title": title,
                "units": units,
                "category": category,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_curriculum_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let program_code = match required_str(req, "programCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match required_str(req, "title") {
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
    let category = match required_str(req, "category") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let sort_order = req
        .params
        .get("sortOrder")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    if let Err(e) = conn.execute(
        "INSERT INTO curriculum_courses(
            id, program_code, course_code, title, units, category, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(program_code, course_code) DO UPDATE SET
            title = excluded.title,
            units = excluded.units,
            category = excluded.category,
            sort_order = excluded.sort_order",
        (
            Uuid::new_v4().to_string(),
            &program_code,
            &course_code,
            &title,
            units,
            &category,
            sort_order,
        ),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "programCode": program_code, "courseCode": course_code }),
    )
}

fn handle_curriculum_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let program_code = match required_str(req, "programCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = match conn.execute(
        "DELETE FROM curriculum_courses WHERE program_code = ? AND course_code = ?",
        (&program_code, &course_code),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "curriculum course not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

/// Checklist of a program's curriculum against recorded grades. A course
/// counts as complete when any term carries a passing letter for its code;
/// a failed or withdrawn attempt leaves it open.
fn handle_curriculum_progress(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let program_code = match required_str(req, "programCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Best letter seen per course code (passing beats non-passing).
    let mut grade_by_course: HashMap<String, String> = HashMap::new();
    {
        let mut stmt = match conn.prepare("SELECT course_code, letter FROM grades") {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let rows = stmt
            .query_map([], |r| {
                let code: String = r.get(0)?;
                let letter: String = r.get(1)?;
                Ok((code, letter))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>());
        let rows = match rows {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        for (code, letter) in rows {
            let key = code.to_ascii_uppercase();
            let incoming_passing = Letter::parse(&letter).map(|l| l.is_passing()).unwrap_or(false);
            let current_passing = grade_by_course
                .get(&key)
                .and_then(|l| Letter::parse(l))
                .map(|l| l.is_passing())
                .unwrap_or(false);
            if incoming_passing || !current_passing {
                grade_by_course.insert(key, letter);
            }
        }
    }

    let mut stmt = match conn.prepare(
        "SELECT course_code, title, units, category
         FROM curriculum_courses
         WHERE program_code = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&program_code], |r| {
            let course_code: String = r.get(0)?;
            let title: String = r.get(1)?;
            let units: f64 = r.get(2)?;
            let category: String = r.get(3)?;
            Ok((course_code, title, units, category))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if rows.is_empty() {
        return err(&req.id, "not_found", "no curriculum for program", None);
    }

    let mut courses: Vec<serde_json::Value> = Vec::new();
    // category -> (total_units, completed_units, total_count, completed_count)
    let mut per_category: Vec<(String, f64, f64, usize, usize)> = Vec::new();
    let mut total_units = 0.0_f64;
    let mut completed_units = 0.0_f64;
    let mut completed_count = 0usize;

    for (course_code, title, units, category) in &rows {
        let letter = grade_by_course.get(&course_code.to_ascii_uppercase());
        let completed = letter
            .and_then(|l| Letter::parse(l))
            .map(|l| l.is_passing())
            .unwrap_or(false);

        total_units += units;
        if completed {
            completed_units += units;
            completed_count += 1;
        }

        let idx = match per_category.iter().position(|(c, ..)| c == category) {
            Some(i) => i,
            None => {
                per_category.push((category.clone(), 0.0, 0.0, 0, 0));
                per_category.len() - 1
            }
        };
        per_category[idx].1 += units;
        per_category[idx].3 += 1;
        if completed {
            per_category[idx].2 += units;
            per_category[idx].4 += 1;
        }

        courses.push(json!({
            "courseCode": course_code,
            "title": title,
            "units": units,
            "category": category,
            "completed": completed,
            "letter": letter
        }));
    }

    let categories: Vec<serde_json::Value> = per_category
        .into_iter()
        .map(|(name, units, units_done, count, count_done)| {
            json!({
                "category": name,
                "totalUnits": units,
                "completedUnits": units_done,
                "totalCourses": count,
                "completedCourses": count_done
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "programCode": program_code,
            "courses": courses,
            "categories": categories,
            "totalUnits": total_units,
            "completedUnits": completed_units,
            "totalCourses": rows.len(),
            "completedCourses": completed_count
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.list" => Some(handle_curriculum_list(state, req)),
        "curriculum.upsert" => Some(handle_curriculum_upsert(state, req)),
        "curriculum.delete" => Some(handle_curriculum_delete(state, req)),
        "curriculum.progress" => Some(handle_curriculum_progress(state, req)),
        _ => None,
    }
}
