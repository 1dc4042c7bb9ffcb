//! Markdown rendering and provenance for study reports.

use std::path::Path;

use super::{GroupReport, JudgeAgreement, PairAgreement, ReferenceMode, StudyReport};
use crate::binarize::Direction;
use crate::comparator::{EvaluatorKind, TieBreak};

/// blake3 digest of the ratings file, hex-encoded.
pub fn hash_input(path: impl AsRef<Path>) -> Result<String, std::io::Error> {
    let bytes = std::fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Three-decimal rendering of an optional coefficient; `n/a` when undefined.
pub fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => "n/a".to_string(),
    }
}

fn fmt_signed(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:+.3}"),
        None => "n/a".to_string(),
    }
}

pub fn render_report_markdown(report: &StudyReport) -> String {
    let mut out = String::new();
    out.push_str("# Inter-Rater Agreement Report\n\n");
    if let Some(hash) = &report.input_hash {
        out.push_str(&format!("- Input hash: `{hash}`\n"));
    }
    let b = &report.binarizer;
    let rule = match b.direction {
        Direction::AtLeast => format!("accept if score >= {}", b.threshold),
        Direction::AtMost => format!("accept if score <= {}", b.threshold),
    };
    out.push_str(&format!("- Binarization: {rule}\n"));
    if let Some((lo, hi)) = b.scale {
        out.push_str(&format!("- Scale: {lo}..={hi}\n"));
    }
    out.push_str(&format!("- Humans: {}\n", report.humans.join(", ")));
    out.push_str(&format!("- Judges: {}\n", report.judges.join(", ")));
    let reference = match report.reference {
        ReferenceMode::Majority => "human majority",
        ReferenceMode::MeanPairwise => "mean over humans",
    };
    out.push_str(&format!("- Reference: {reference}\n"));
    out.push_str(&format!(
        "- Best judge (pooled): {}\n",
        report.best_judge.as_deref().unwrap_or("none")
    ));

    for group in &report.groups {
        render_group(&mut out, group);
    }
    out
}

fn render_group(out: &mut String, group: &GroupReport) {
    out.push_str(&format!("\n## Group `{}` ({} items)\n", group.group, group.subjects));

    if let Some(multi) = &group.humans {
        out.push_str("\n### Human raters\n\n");
        out.push_str(&format!("- Raters: {}\n", multi.raters.join(", ")));
        if let Some(f) = &multi.fleiss {
            out.push_str(&format!(
                "- Fleiss' kappa: {} ({} subjects x {} raters, {} dropped)\n",
                fmt_opt(f.kappa),
                f.subjects,
                f.raters_per_subject,
                f.dropped_subjects
            ));
        }
        if let Some(a) = &multi.ac1 {
            let ci = a
                .conf_int
                .map(|(lo, hi)| format!(" [{lo:.3}, {hi:.3}]"))
                .unwrap_or_default();
            out.push_str(&format!("- Gwet's AC1: {}{ci}\n", fmt_opt(a.coefficient)));
        }
        if let Some(r) = &multi.raw {
            out.push_str(&format!(
                "- Raw agreement: {:.3} unanimous, {:.3} pairwise\n",
                r.all_agree, r.pairwise
            ));
        }
    }

    if !group.human_pairs.is_empty() {
        out.push_str("\n### Human pairs\n\n");
        pair_table(out, &group.human_pairs);
    }

    if !group.judges.is_empty() {
        out.push_str("\n### Judges\n\n");
        if group.reference_ties > 0 {
            out.push_str(&format!(
                "_{} items with a split human majority were excluded._\n\n",
                group.reference_ties
            ));
        }
        out.push_str("| Judge | n | kappa | AC1 | raw | BI |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for j in &group.judges {
            judge_row(out, j);
        }
    }

    out.push_str(&format!("\n### Ranking (by {})\n\n", group.ranking.primary));
    if let Some(base) = group.ranking.human_baseline {
        out.push_str(&format!("Human baseline: {base:.3}\n\n"));
    }
    for e in &group.ranking.entries {
        let kind = match e.score.kind {
            EvaluatorKind::HumanPair => "human pair",
            EvaluatorKind::Judge => "judge",
        };
        let decided = match e.decided_by {
            TieBreak::Leader => String::new(),
            other => format!(", separated from previous by {other:?}"),
        };
        let baseline = match e.meets_human_baseline {
            Some(true) => ", meets human baseline",
            Some(false) => ", below human baseline",
            None => "",
        };
        out.push_str(&format!(
            "{}. {} ({kind}) kappa {}, AC1 {}, |BI| {}{baseline}{decided}\n",
            e.rank,
            e.score.name,
            fmt_opt(e.score.cohen_kappa),
            fmt_opt(e.score.ac1),
            fmt_opt(e.score.abs_bias),
        ));
    }
}

fn pair_table(out: &mut String, pairs: &[PairAgreement]) {
    out.push_str("| Pair | n | kappa | boot CI | weighted | AC1 | raw | BI | PABAK |\n");
    out.push_str("|---|---|---|---|---|---|---|---|---|\n");
    for p in pairs {
        let ci = p
            .kappa_ci
            .as_ref()
            .map(|ci| format!("[{:.3}, {:.3}]", ci.lower, ci.upper))
            .unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "| {} vs {} | {} | {} | {} | {} | {} | {:.3} | {:+.3} | {:.3} |\n",
            p.rater_a,
            p.rater_b,
            p.subjects,
            fmt_opt(p.cohen.kappa),
            ci,
            fmt_opt(p.weighted_kappa),
            fmt_opt(p.ac1),
            p.raw_agreement,
            p.bias.bias_index,
            p.bias.pabak,
        ));
    }
}

fn judge_row(out: &mut String, j: &JudgeAgreement) {
    out.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n",
        j.judge,
        j.subjects,
        fmt_opt(j.cohen_kappa),
        fmt_opt(j.ac1),
        fmt_opt(j.raw_agreement),
        fmt_signed(j.bias_index),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_values_render_as_na_when_undefined() {
        assert_eq!(fmt_opt(Some(0.12345)), "0.123");
        assert_eq!(fmt_opt(Some(-1.0)), "-1.000");
        assert_eq!(fmt_opt(None), "n/a");
        assert_eq!(fmt_signed(Some(0.1)), "+0.100");
    }
}
