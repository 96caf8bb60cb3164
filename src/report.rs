use serde::Serialize;

use crate::ranking::{class_average, position_of, rank, Position};
use crate::record::StudentRecord;
use crate::registry::SubjectRegistry;
use crate::scoring::{compute_mean, compute_weighted_overall, round_to, ExamType, RubricBand};

/// Display options stored in the workspace `reports` settings section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSettings {
    pub mean_decimals: u32,
    pub placeholder: String,
    pub school_name: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            mean_decimals: 2,
            placeholder: "-".to_string(),
            school_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectColumn {
    pub code: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarklistRow {
    pub position: Position,
    pub id: Option<String>,
    pub name: String,
    pub scores: Vec<Option<f64>>,
    pub mean: Option<f64>,
    pub rubric: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Marklist {
    pub school_name: String,
    pub class: String,
    pub resolved_class: String,
    pub exam_type: ExamType,
    pub subjects: Vec<SubjectColumn>,
    pub rows: Vec<MarklistRow>,
    pub class_average: f64,
    pub subject_averages: Vec<f64>,
}

fn subject_columns(registry: &SubjectRegistry, class_name: &str) -> Vec<SubjectColumn> {
    registry
        .subjects_for_class(class_name)
        .iter()
        .map(|code| SubjectColumn {
            code: code.to_string(),
            display_name: registry.display_name(code).to_string(),
        })
        .collect()
}

/// Class marklist for one (class, exam type) group. `records` is the group
/// in store order; the rows come back in ranked order.
pub fn build_marklist(
    registry: &SubjectRegistry,
    settings: &ReportSettings,
    class_name: &str,
    exam_type: ExamType,
    records: &[StudentRecord],
) -> Marklist {
    let subjects = subject_columns(registry, class_name);
    let decimals = settings.mean_decimals;

    let subject_averages = subjects
        .iter()
        .map(|col| {
            let vals: Vec<f64> = records.iter().filter_map(|r| r.score(&col.code)).collect();
            round_to(compute_mean(&vals), decimals)
        })
        .collect();

    let rows = rank(records.iter().collect())
        .into_iter()
        .map(|ranked| {
            let r = ranked.item;
            MarklistRow {
                position: ranked.position,
                id: r.id().map(str::to_string),
                name: r.name().to_string(),
                scores: subjects.iter().map(|col| r.score(&col.code)).collect(),
                mean: r.mean().map(|m| round_to(m, decimals)),
                rubric: r.rubric().map(RubricBand::label),
            }
        })
        .collect();

    Marklist {
        school_name: settings.school_name.clone(),
        class: class_name.to_string(),
        resolved_class: registry.resolve(class_name).0.to_string(),
        exam_type,
        subjects,
        rows,
        class_average: round_to(class_average(records), decimals),
        subject_averages,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub code: String,
    pub display_name: String,
    pub score: Option<f64>,
    pub rubric: Option<&'static str>,
    pub remark: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub school_name: String,
    pub id: Option<String>,
    pub name: String,
    pub class: String,
    pub exam_type: ExamType,
    pub position: Position,
    pub group_size: usize,
    pub subjects: Vec<SubjectLine>,
    pub mean: Option<f64>,
    pub rubric: Option<&'static str>,
    pub overall_remark: Option<&'static str>,
    pub class_average: f64,
}

/// Individual report for `group[index]`, positioned within `group`.
pub fn build_student_report(
    registry: &SubjectRegistry,
    settings: &ReportSettings,
    group: &[StudentRecord],
    index: usize,
) -> Option<StudentReport> {
    let rec = group.get(index)?;
    let decimals = settings.mean_decimals;
    let subjects = rec
        .scores()
        .iter()
        .map(|s| {
            let band = s.value.map(RubricBand::classify);
            SubjectLine {
                code: s.subject.clone(),
                display_name: registry.display_name(&s.subject).to_string(),
                score: s.value,
                rubric: band.map(RubricBand::label),
                remark: band.map(RubricBand::subject_remark),
            }
        })
        .collect();

    Some(StudentReport {
        school_name: settings.school_name.clone(),
        id: rec.id().map(str::to_string),
        name: rec.name().to_string(),
        class: rec.class_name().to_string(),
        exam_type: rec.exam_type(),
        position: position_of(group, index),
        group_size: group.len(),
        subjects,
        mean: rec.mean().map(|m| round_to(m, decimals)),
        rubric: rec.rubric().map(RubricBand::label),
        overall_remark: rec.rubric().map(RubricBand::overall_remark),
        class_average: round_to(class_average(group), decimals),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SittingMean {
    pub exam_type: ExamType,
    pub weight: f64,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallReport {
    pub name: String,
    pub class: String,
    pub sittings: Vec<SittingMean>,
    pub overall: Option<f64>,
}

/// Cross-sitting view for one student. When a sitting has several records
/// for the same name the first one in store order is used. The weighted
/// overall is only produced when all three sittings have a mean.
pub fn build_overall_report(
    settings: &ReportSettings,
    name: &str,
    class_name: &str,
    records: &[StudentRecord],
) -> OverallReport {
    let sittings: Vec<SittingMean> = ExamType::ALL
        .iter()
        .map(|&t| SittingMean {
            exam_type: t,
            weight: t.weight(),
            mean: records
                .iter()
                .find(|r| r.exam_type() == t && r.name() == name && r.class_name() == class_name)
                .and_then(StudentRecord::mean),
        })
        .collect();

    let overall = match (sittings[0].mean, sittings[1].mean, sittings[2].mean) {
        (Some(o), Some(m), Some(e)) => Some(round_to(
            compute_weighted_overall(o, m, e),
            settings.mean_decimals,
        )),
        _ => None,
    };

    OverallReport {
        name: name.to_string(),
        class: class_name.to_string(),
        sittings: sittings
            .into_iter()
            .map(|s| SittingMean {
                mean: s.mean.map(|m| round_to(m, settings.mean_decimals)),
                ..s
            })
            .collect(),
        overall,
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn fmt_number(v: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, v)
}

pub fn marklist_csv(marklist: &Marklist, settings: &ReportSettings) -> String {
    let ph = csv_quote(&settings.placeholder);
    let mut out = String::new();

    let mut header = vec!["Position".to_string(), "Name".to_string()];
    header.extend(marklist.subjects.iter().map(|c| csv_quote(&c.display_name)));
    header.push("Mean".to_string());
    header.push("Rubric".to_string());
    out.push_str(&header.join(","));
    out.push('\n');

    for row in &marklist.rows {
        let mut cells = vec![
            row.position
                .ordinal()
                .map(|n| n.to_string())
                .unwrap_or_else(|| ph.clone()),
            csv_quote(&row.name),
        ];
        cells.extend(
            row.scores
                .iter()
                .map(|s| s.map(|v| v.to_string()).unwrap_or_else(|| ph.clone())),
        );
        cells.push(
            row.mean
                .map(|m| fmt_number(m, settings.mean_decimals))
                .unwrap_or_else(|| ph.clone()),
        );
        cells.push(row.rubric.map(csv_quote).unwrap_or_else(|| ph.clone()));
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
