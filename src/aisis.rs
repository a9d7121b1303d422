use crate::qpi::Letter;

/// Parsed view of a pasted (or OCR-extracted) AISIS grade report.
///
/// The source is a loosely columnar text dump: optional school-year/semester
/// prefix, a course code ("CSCI 21", "MATH 30.23"), a free-text title, a
/// units figure and a trailing letter grade. OCR output adds noise lines
/// and stray columns, so parsing is heuristic and per-line: anything that
/// does not yield a code, units and grade is skipped and reported back,
/// never guessed at.
pub struct ParsedGradeReport {
    pub rows: Vec<ParsedGradeRow>,
    pub skipped_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGradeRow {
    pub course_code: String,
    pub course_title: Option<String>,
    pub units: f64,
    pub letter: Letter,
}

pub fn parse_grade_report(text: &str) -> ParsedGradeReport {
    let mut rows: Vec<ParsedGradeRow> = Vec::new();
    let mut skipped_lines: Vec<String> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || is_header_line(line) {
            continue;
        }
        match parse_grade_line(line) {
            Some(row) => rows.push(row),
            None => skipped_lines.push(line.to_string()),
        }
    }

    ParsedGradeReport {
        rows,
        skipped_lines,
    }
}

fn is_header_line(line: &str) -> bool {
    let up = line.to_ascii_uppercase();
    if up.contains("COURSE") && (up.contains("UNITS") || up.contains("GRADE")) {
        return true;
    }
    up.starts_with("SCHOOL YEAR")
        || up.starts_with("MY GRADES")
        || up.starts_with("SEMESTER")
        || up.starts_with("PAGE ")
}

fn parse_grade_line(line: &str) -> Option<ParsedGradeRow> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }

    // Grade is the last token that parses on the letter scale. Scanning from
    // the end tolerates trailing OCR columns after the grade.
    let (grade_idx, letter) = tokens
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, t)| Letter::parse(t).map(|l| (i, l)))?;

    // Course code: first all-caps alpha token, plus a following catalog
    // number if present ("CSCI" + "41.02" -> "CSCI 41.02").
    let code_start = tokens
        .iter()
        .position(|t| is_subject_token(t))
        .filter(|&i| i < grade_idx)?;
    let mut code_end = code_start + 1;
    if code_end < grade_idx && is_catalog_number(tokens[code_end]) {
        code_end += 1;
    }
    let course_code = tokens[code_start..code_end].join(" ");

    // Units: nearest number before the grade that sits in a plausible range.
    let (units_idx, units) = tokens[code_end..grade_idx]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, t)| {
            t.parse::<f64>()
                .ok()
                .filter(|u| (0.5..=12.0).contains(u))
                .map(|u| (code_end + i, u))
        })?;

    let title = tokens[code_end..units_idx].join(" ");
    let course_title = if title.is_empty() { None } else { Some(title) };

    Some(ParsedGradeRow {
        course_code,
        course_title,
        units,
        letter,
    })
}

fn is_subject_token(t: &str) -> bool {
    (2..=8).contains(&t.len()) && t.chars().all(|c| c.is_ascii_uppercase())
}

fn is_catalog_number(t: &str) -> bool {
    !t.is_empty()
        && t.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        && t.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_pasted_rows() {
        let text = "\
MY GRADES
School Year 2025-2026, First Semester
Course Title Units Grade
CSCI 21 INTRODUCTION TO COMPUTING II 3 A
MATH 30.23 CALCULUS FOR CS 5 B+
FIL 11 SINING NG PAKIKIPAGTALASTASAN 3 C
";
        let report = parse_grade_report(text);
        assert_eq!(report.rows.len(), 3);
        assert!(report.skipped_lines.is_empty());

        let r0 = &report.rows[0];
        assert_eq!(r0.course_code, "CSCI 21");
        assert_eq!(r0.course_title.as_deref(), Some("INTRODUCTION TO COMPUTING II"));
        assert_eq!(r0.units, 3.0);
        assert_eq!(r0.letter, Letter::A);

        assert_eq!(report.rows[1].course_code, "MATH 30.23");
        assert_eq!(report.rows[1].units, 5.0);
        assert_eq!(report.rows[1].letter, Letter::BPlus);
    }

    #[test]
    fn tolerates_year_and_semester_prefix_columns() {
        let text = "2025-2026 1 PHYS 41.1 PHYSICS LAB 1 1 A";
        let report = parse_grade_report(text);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].course_code, "PHYS 41.1");
        assert_eq!(report.rows[0].units, 1.0);
    }

    #[test]
    fn skips_noise_lines_and_reports_them() {
        let text = "\
CSCI 21 INTRO 3 A
~~ scanned artifact line ~~
TOTAL UNITS 18
INTERSESSION
";
        let report = parse_grade_report(text);
        assert_eq!(report.rows.len(), 1);
        // Noise carries no parsable (code, units, grade) triple.
        assert_eq!(report.skipped_lines.len(), 3);
    }

    #[test]
    fn w_and_inc_rows_parse_like_any_grade() {
        let text = "PE 1 PHYSICAL EDUCATION 2 W\nTHEO 11 FAITH SEEKING 3 INC";
        let report = parse_grade_report(text);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].letter, Letter::W);
        assert_eq!(report.rows[1].letter, Letter::Inc);
    }

    #[test]
    fn units_out_of_range_do_not_match() {
        // "2025" must not be mistaken for units; the real units token is 3.
        let text = "HIST 1 WORLD HISTORY 2025 EDITION 3 B";
        let report = parse_grade_report(text);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].units, 3.0);
    }

    #[test]
    fn line_without_grade_is_skipped() {
        let report = parse_grade_report("CSCI 40 OPERATING SYSTEMS 3");
        assert!(report.rows.is_empty());
        assert_eq!(report.skipped_lines.len(), 1);
    }
}
