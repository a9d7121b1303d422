use chrono::{NaiveTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

pub const DAY_MIN: i64 = 1; // Monday
pub const DAY_MAX: i64 = 7;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Display palette for course colors. Tokens, not CSS values; the shell
/// maps them to its theme.
pub const PALETTE: [&str; 8] = [
    "sky", "rose", "amber", "emerald", "violet", "teal", "orange", "slate",
];

const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Clone, Serialize)]
pub struct BlockError {
    pub code: String,
    pub message: String,
}

impl BlockError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// One weekly class meeting. Times are stored as `HH:MM:SS` strings; all
/// comparisons happen on parsed seconds-since-midnight.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: String,
    pub schedule_id: String,
    pub course_code: String,
    pub section: Option<String>,
    pub room: Option<String>,
    pub course_title: Option<String>,
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub block_a_id: String,
    pub block_b_id: String,
    pub course_a: String,
    pub course_b: String,
    pub day_of_week: i64,
    pub overlap_start: String,
    pub overlap_end: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveConflict {
    pub course_code: String,
    pub time_range_label: String,
}

#[derive(Debug, Clone)]
pub enum MoveDecision {
    Clear {
        new_start: String,
        new_end: String,
    },
    Conflicting {
        conflicts: Vec<MoveConflict>,
    },
}

pub fn day_name(day: i64) -> &'static str {
    if (DAY_MIN..=DAY_MAX).contains(&day) {
        DAY_NAMES[(day - 1) as usize]
    } else {
        "?"
    }
}

pub fn validate_day(day: i64) -> Result<(), BlockError> {
    if !(DAY_MIN..=DAY_MAX).contains(&day) {
        return Err(BlockError::new(
            "invalid_day",
            format!("dayOfWeek must be in {}..={}", DAY_MIN, DAY_MAX),
        ));
    }
    Ok(())
}

/// Parses `HH:MM` or `HH:MM:SS` into seconds since midnight.
pub fn parse_time_of_day(s: &str) -> Result<i64, BlockError> {
    let t = s.trim();
    let parsed = NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .map_err(|_| BlockError::new("invalid_time", format!("unparseable time: {}", s)))?;
    Ok(parsed.num_seconds_from_midnight() as i64)
}

pub fn format_time_of_day(secs: i64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Short label for human-readable messages; seconds are dropped.
fn short_time(secs: i64) -> String {
    format!("{:02}:{:02}", secs / 3600, (secs % 3600) / 60)
}

fn time_range_label(day: i64, start: i64, end: i64) -> String {
    format!(
        "{} {}-{}",
        day_name(day),
        short_time(start),
        short_time(end)
    )
}

/// Validates a block's placement fields. Zero or negative duration is
/// rejected here rather than relying on the overlap check to catch it.
pub fn validate_placement(day: i64, start: &str, end: &str) -> Result<(i64, i64), BlockError> {
    validate_day(day)?;
    let start_s = parse_time_of_day(start)?;
    let end_s = parse_time_of_day(end)?;
    if start_s >= end_s {
        return Err(BlockError::new(
            "invalid_duration",
            "startTime must be strictly before endTime",
        ));
    }
    Ok((start_s, end_s))
}

/// Half-open interval overlap on a fixed 7-value day axis: a block ending
/// at 10:00 does not conflict with one starting at 10:00.
pub fn overlaps(day_a: i64, start_a: i64, end_a: i64, day_b: i64, start_b: i64, end_b: i64) -> bool {
    day_a == day_b && start_a < end_b && start_b < end_a
}

fn block_times(block: &ScheduleBlock) -> Result<(i64, i64), BlockError> {
    let start = parse_time_of_day(&block.start_time)?;
    let end = parse_time_of_day(&block.end_time)?;
    Ok((start, end))
}

/// Scans all blocks of one schedule for pairwise same-day overlaps.
///
/// No same-course exemption here: two meetings of one course that overlap
/// are still reported (the move validator exempts them; the full scan does
/// not). Result is canonically ordered by day, overlap start, then course
/// codes, so content is identical regardless of input order.
pub fn detect_conflicts(blocks: &[ScheduleBlock]) -> Result<Vec<Conflict>, BlockError> {
    let mut by_day: HashMap<i64, Vec<(usize, i64, i64)>> = HashMap::new();
    for (i, b) in blocks.iter().enumerate() {
        let (start, end) = block_times(b)?;
        by_day.entry(b.day_of_week).or_default().push((i, start, end));
    }

    let mut conflicts: Vec<Conflict> = Vec::new();
    for bucket in by_day.values() {
        for (p, &(ia, start_a, end_a)) in bucket.iter().enumerate() {
            for &(ib, start_b, end_b) in bucket.iter().skip(p + 1) {
                let a = &blocks[ia];
                let b = &blocks[ib];
                if !overlaps(a.day_of_week, start_a, end_a, b.day_of_week, start_b, end_b) {
                    continue;
                }
                let overlap_start = start_a.max(start_b);
                let overlap_end = end_a.min(end_b);
                // Canonical pair order: earlier start first, course code as tiebreak.
                let (first, second) =
                    if (start_a, a.course_code.as_str()) <= (start_b, b.course_code.as_str()) {
                        (a, b)
                    } else {
                        (b, a)
                    };
                conflicts.push(Conflict {
                    block_a_id: first.id.clone(),
                    block_b_id: second.id.clone(),
                    course_a: first.course_code.clone(),
                    course_b: second.course_code.clone(),
                    day_of_week: a.day_of_week,
                    overlap_start: format_time_of_day(overlap_start),
                    overlap_end: format_time_of_day(overlap_end),
                    message: format!(
                        "{} overlaps {} on {} {}-{}",
                        first.course_code,
                        second.course_code,
                        day_name(a.day_of_week),
                        short_time(overlap_start),
                        short_time(overlap_end)
                    ),
                });
            }
        }
    }

    conflicts.sort_by(|x, y| {
        (x.day_of_week, x.overlap_start.as_str(), x.course_a.as_str(), x.course_b.as_str())
            .cmp(&(y.day_of_week, y.overlap_start.as_str(), y.course_a.as_str(), y.course_b.as_str()))
    });
    Ok(conflicts)
}

/// Decides whether moving `block_id` to `(target_day, target_start)` is
/// safe. The meeting's duration is preserved exactly; the moved block and
/// its same-course siblings are excluded from the conflict scan. Malformed
/// input (bad day, bad time, end past midnight) is a validation error, not
/// a conflict. Pure decision: nothing is committed here.
pub fn validate_move(
    blocks: &[ScheduleBlock],
    block_id: &str,
    target_day: i64,
    target_start: &str,
) -> Result<MoveDecision, BlockError> {
    validate_day(target_day)?;
    let Some(moved) = blocks.iter().find(|b| b.id == block_id) else {
        return Err(BlockError::new("not_found", "block not found"));
    };
    let (old_start, old_end) = block_times(moved)?;
    let duration = old_end - old_start;

    let new_start = parse_time_of_day(target_start)?;
    let new_end = new_start + duration;
    if new_end >= SECONDS_PER_DAY {
        return Err(BlockError::new(
            "past_midnight",
            "move would push the block past the end of the day",
        ));
    }

    let mut conflicts: Vec<MoveConflict> = Vec::new();
    for other in blocks {
        if other.id == moved.id {
            continue;
        }
        if other.course_code.eq_ignore_ascii_case(&moved.course_code) {
            // Sibling meetings of one course are allowed to be placed freely.
            continue;
        }
        let (other_start, other_end) = block_times(other)?;
        if overlaps(
            target_day, new_start, new_end,
            other.day_of_week, other_start, other_end,
        ) {
            conflicts.push(MoveConflict {
                course_code: other.course_code.clone(),
                time_range_label: time_range_label(other.day_of_week, other_start, other_end),
            });
        }
    }

    if conflicts.is_empty() {
        Ok(MoveDecision::Clear {
            new_start: format_time_of_day(new_start),
            new_end: format_time_of_day(new_end),
        })
    } else {
        conflicts.sort_by(|a, b| {
            a.time_range_label
                .cmp(&b.time_range_label)
                .then_with(|| a.course_code.cmp(&b.course_code))
        });
        Ok(MoveDecision::Conflicting { conflicts })
    }
}

/// Picks a display color for a course code: reuse the color already carried
/// by the same course in this schedule, otherwise the first palette token
/// not taken by another course. When every token is taken, cycle.
pub fn assign_color(course_code: &str, existing: &[ScheduleBlock]) -> String {
    for b in existing {
        if b.course_code.eq_ignore_ascii_case(course_code) {
            return b.color.clone();
        }
    }

    let mut used: Vec<&str> = Vec::new();
    let mut distinct_courses = 0usize;
    let mut seen: Vec<String> = Vec::new();
    for b in existing {
        let key = b.course_code.to_ascii_uppercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        distinct_courses += 1;
        if !used.contains(&b.color.as_str()) {
            used.push(&b.color);
        }
    }

    for token in PALETTE.iter() {
        if !used.contains(token) {
            return (*token).to_string();
        }
    }
    PALETTE[distinct_courses % PALETTE.len()].to_string()
}
