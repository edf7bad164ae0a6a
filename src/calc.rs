use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Letter grade derived from an integer mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed threshold table: >=90 A, >=80 B, >=70 C, >=60 D, >=40 E, else F.
pub fn grade_for_mark(mark: i64) -> Grade {
    if mark >= 90 {
        Grade::A
    } else if mark >= 80 {
        Grade::B
    } else if mark >= 70 {
        Grade::C
    } else if mark >= 60 {
        Grade::D
    } else if mark >= 40 {
        Grade::E
    } else {
        Grade::F
    }
}

/// Rounds half away from zero to 2 decimals.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn mean(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64
}

/// `days / school_days * 100`, not clamped: more recorded days than the
/// period length yields more than 100.
pub fn attendance_percentage(days: usize, school_days: u32) -> f64 {
    if school_days == 0 {
        return 0.0;
    }
    (days as f64 / school_days as f64) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSummary {
    pub average: f64,
    pub max: i64,
    pub min: i64,
    pub count: usize,
}

/// Unrounded mean plus extremes; all zero when there are no marks.
pub fn summarize_marks(values: &[i64]) -> MarkSummary {
    MarkSummary {
        average: mean(values),
        max: values.iter().copied().max().unwrap_or(0),
        min: values.iter().copied().min().unwrap_or(0),
        count: values.len(),
    }
}

/// Letter -> count, ordered A..F. Only letters that occur are present.
pub fn grade_distribution<'a, I>(grades: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: BTreeMap<String, usize> = BTreeMap::new();
    for g in grades {
        *out.entry(g.to_string()).or_insert(0) += 1;
    }
    out
}

/// Accepts JSON integers, integral floats and numeric strings. Empty strings,
/// nulls and anything unparseable yield `None`.
pub fn parse_mark_value(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
