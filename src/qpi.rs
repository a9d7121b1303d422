use serde::Serialize;
use std::collections::BTreeMap;

/// Letter grades on the institutional scale. W and INC carry no quality
/// points and are excluded from the QPI denominator; F counts its units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Letter {
    A,
    BPlus,
    B,
    CPlus,
    C,
    D,
    F,
    W,
    Inc,
}

impl Letter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B+" => Some(Self::BPlus),
            "B" => Some(Self::B),
            "C+" => Some(Self::CPlus),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            "W" => Some(Self::W),
            "INC" => Some(Self::Inc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
            Self::W => "W",
            Self::Inc => "INC",
        }
    }

    /// Quality points per unit; None for grades excluded from the average.
    pub fn points(self) -> Option<f64> {
        match self {
            Self::A => Some(4.0),
            Self::BPlus => Some(3.5),
            Self::B => Some(3.0),
            Self::CPlus => Some(2.5),
            Self::C => Some(2.0),
            Self::D => Some(1.0),
            Self::F => Some(0.0),
            Self::W | Self::Inc => None,
        }
    }

    /// Whether the grade earns its units toward degree progress.
    pub fn is_passing(self) -> bool {
        !matches!(self, Self::F | Self::W | Self::Inc)
    }
}

#[derive(Debug, Clone)]
pub struct GradeEntry {
    pub term: String,
    pub course_code: String,
    pub units: f64,
    pub letter: Letter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermQpi {
    pub term: String,
    pub qpi: Option<f64>,
    pub units_counted: f64,
    pub units_earned: f64,
    pub excluded_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QpiSummary {
    pub per_term: Vec<TermQpi>,
    pub cumulative_qpi: Option<f64>,
    pub cumulative_units_counted: f64,
    pub cumulative_units_earned: f64,
}

/// Half-up rounding to 2 decimals, the display precision for QPI.
pub fn round_half_up_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
struct Accum {
    weighted_points: f64,
    units_counted: f64,
    units_earned: f64,
    excluded_count: usize,
}

impl Accum {
    fn add(&mut self, entry: &GradeEntry) {
        match entry.letter.points() {
            Some(p) => {
                self.weighted_points += p * entry.units;
                self.units_counted += entry.units;
            }
            None => {
                self.excluded_count += 1;
            }
        }
        if entry.letter.is_passing() {
            self.units_earned += entry.units;
        }
    }

    fn qpi(&self) -> Option<f64> {
        if self.units_counted > 0.0 {
            Some(round_half_up_2(self.weighted_points / self.units_counted))
        } else {
            None
        }
    }
}

/// Units-weighted QPI per term plus the cumulative figure. Terms come back
/// in lexicographic order, which matches the `YYYY-S` term naming.
pub fn compute_qpi(entries: &[GradeEntry]) -> QpiSummary {
    let mut per_term: BTreeMap<String, Accum> = BTreeMap::new();
    let mut overall = Accum::default();

    for e in entries {
        per_term.entry(e.term.clone()).or_default().add(e);
        overall.add(e);
    }

    let per_term = per_term
        .into_iter()
        .map(|(term, acc)| TermQpi {
            term,
            qpi: acc.qpi(),
            units_counted: acc.units_counted,
            units_earned: acc.units_earned,
            excluded_count: acc.excluded_count,
        })
        .collect();

    QpiSummary {
        per_term,
        cumulative_qpi: overall.qpi(),
        cumulative_units_counted: overall.units_counted,
        cumulative_units_earned: overall.units_earned,
    }
}
