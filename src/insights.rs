//! Rule-based performance insights for a single student.
//!
//! Every rule is a threshold comparison on the student's average mark, their
//! per-subject marks and their attendance percentage. Rules are applied in a
//! fixed order so recommendation lists are stable.
use crate::calc::round2;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub performance_level: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub trend_analysis: String,
    pub attendance_impact: String,
    pub overall_assessment: String,
}

/// Formats a percentage-like value with at most 2 decimals, without a
/// trailing `.0` for whole numbers.
fn fmt_pct(x: f64) -> String {
    format!("{}", round2(x))
}

/// `marks` is `(subject, mark)` in display order; ties on best/worst subject
/// resolve to the first entry.
pub fn generate(name: &str, marks: &[(String, i64)], avg: f64, attendance_pct: f64) -> Insights {
    let mut out = Insights::default();
    let avg_txt = fmt_pct(avg);

    let (level, assessment) = if avg >= 90.0 {
        (
            "Excellent",
            format!(
                "{name} is performing exceptionally well with an average of {avg_txt}%. \
                 This student demonstrates strong academic capabilities."
            ),
        )
    } else if avg >= 80.0 {
        (
            "Good",
            format!(
                "{name} is performing well with an average of {avg_txt}%. \
                 There's room for improvement but overall solid performance."
            ),
        )
    } else if avg >= 70.0 {
        (
            "Average",
            format!(
                "{name} has average performance with {avg_txt}%. \
                 This student needs additional support to improve."
            ),
        )
    } else if avg >= 60.0 {
        (
            "Below Average",
            format!(
                "{name} is struggling academically with {avg_txt}%. \
                 Immediate intervention is recommended."
            ),
        )
    } else {
        (
            "Needs Improvement",
            format!(
                "{name} requires significant academic support with {avg_txt}%. \
                 Urgent attention needed."
            ),
        )
    };
    out.performance_level = level.to_string();
    out.overall_assessment = assessment;

    if let (Some(best), Some(worst)) = (best_subject(marks), worst_subject(marks)) {
        if best.1 >= 85 {
            out.strengths
                .push(format!("Excels in {} with {}%", best.0, best.1));
        } else if best.1 >= 75 {
            out.strengths
                .push(format!("Shows potential in {} with {}%", best.0, best.1));
        }

        if worst.1 < 70 {
            out.weaknesses
                .push(format!("Struggles in {} with {}%", worst.0, worst.1));
            out.recommendations
                .push(format!("Provide additional support in {}", worst.0));
        }

        let high = marks.iter().filter(|(_, m)| *m >= 80).count();
        let low = marks.iter().filter(|(_, m)| *m < 70).count();
        out.trend_analysis = if high > low {
            "Student shows consistent performance across most subjects"
        } else if low > high {
            "Student needs improvement in multiple subjects"
        } else {
            "Mixed performance across subjects"
        }
        .to_string();
    }

    out.attendance_impact = if attendance_pct >= 95.0 {
        "Excellent attendance - this positively contributes to academic performance"
    } else if attendance_pct >= 85.0 {
        "Good attendance - consistent presence supports learning"
    } else if attendance_pct >= 75.0 {
        "Moderate attendance - irregular attendance may affect performance"
    } else {
        out.recommendations
            .push("Address attendance issues to improve academic outcomes".to_string());
        "Poor attendance - this significantly impacts academic performance"
    }
    .to_string();

    if avg < 75.0 {
        out.recommendations
            .push("Consider additional tutoring or remedial classes".to_string());
        out.recommendations
            .push("Implement regular progress monitoring".to_string());
    }

    if attendance_pct < 80.0 {
        out.recommendations
            .push("Develop attendance improvement plan".to_string());
    }

    if out.recommendations.is_empty() {
        out.recommendations
            .push("Continue current academic support strategies".to_string());
        out.recommendations
            .push("Encourage participation in advanced learning opportunities".to_string());
    }

    out
}

fn best_subject(marks: &[(String, i64)]) -> Option<&(String, i64)> {
    marks.iter().fold(None, |best, cur| match best {
        Some(b) if b.1 >= cur.1 => Some(b),
        _ => Some(cur),
    })
}

fn worst_subject(marks: &[(String, i64)]) -> Option<&(String, i64)> {
    marks.iter().fold(None, |worst, cur| match worst {
        Some(w) if w.1 <= cur.1 => Some(w),
        _ => Some(cur),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marks(items: &[(&str, i64)]) -> Vec<(String, i64)> {
        items.iter().map(|(s, m)| (s.to_string(), *m)).collect()
    }

    #[test]
    fn strong_student_gets_default_recommendations() {
        let m = marks(&[("Math", 95), ("Science", 92)]);
        let i = generate("Ana", &m, 93.5, 100.0);
        assert_eq!(i.performance_level, "Excellent");
        assert!(i
            .overall_assessment
            .starts_with("Ana is performing exceptionally well with an average of 93.5%"));
        assert_eq!(i.strengths, vec!["Excels in Math with 95%"]);
        assert!(i.weaknesses.is_empty());
        assert_eq!(
            i.trend_analysis,
            "Student shows consistent performance across most subjects"
        );
        assert!(i.attendance_impact.starts_with("Excellent attendance"));
        assert_eq!(
            i.recommendations,
            vec![
                "Continue current academic support strategies",
                "Encourage participation in advanced learning opportunities"
            ]
        );
    }

    #[test]
    fn weak_student_collects_recommendations_in_order() {
        let m = marks(&[("Math", 55), ("History", 76), ("Art", 55)]);
        let avg = (55.0 + 76.0 + 55.0) / 3.0;
        let i = generate("Ben", &m, avg, 40.0);
        assert_eq!(i.performance_level, "Below Average");
        assert_eq!(
            i.overall_assessment,
            "Ben is struggling academically with 62%. Immediate intervention is recommended."
        );
        assert_eq!(i.strengths, vec!["Shows potential in History with 76%"]);
        assert_eq!(i.weaknesses, vec!["Struggles in Math with 55%"]);
        assert_eq!(i.trend_analysis, "Student needs improvement in multiple subjects");
        assert!(i.attendance_impact.starts_with("Poor attendance"));
        assert_eq!(
            i.recommendations,
            vec![
                "Provide additional support in Math",
                "Address attendance issues to improve academic outcomes",
                "Consider additional tutoring or remedial classes",
                "Implement regular progress monitoring",
                "Develop attendance improvement plan",
            ]
        );
    }

    #[test]
    fn no_marks_skips_subject_rules() {
        let i = generate("Cy", &[], 0.0, 86.0);
        assert_eq!(i.performance_level, "Needs Improvement");
        assert!(i.strengths.is_empty());
        assert!(i.trend_analysis.is_empty());
        assert!(i.attendance_impact.starts_with("Good attendance"));
        assert_eq!(
            i.recommendations,
            vec![
                "Consider additional tutoring or remedial classes",
                "Implement regular progress monitoring",
            ]
        );
    }

    #[test]
    fn balanced_subjects_are_mixed() {
        let m = marks(&[("Math", 85), ("Art", 65), ("Music", 75)]);
        let i = generate("Di", &m, 75.0, 76.0);
        assert_eq!(i.trend_analysis, "Mixed performance across subjects");
        assert!(i.attendance_impact.starts_with("Moderate attendance"));
        assert_eq!(
            i.recommendations,
            vec![
                "Provide additional support in Art",
                "Develop attendance improvement plan",
            ]
        );
    }

    #[test]
    fn ties_resolve_to_first_subject() {
        let m = marks(&[("Biology", 88), ("Chemistry", 88)]);
        let i = generate("Eve", &m, 88.0, 95.0);
        assert_eq!(i.performance_level, "Good");
        assert_eq!(i.strengths, vec!["Excels in Biology with 88%"]);
    }
}
