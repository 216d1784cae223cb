use std::collections::BTreeMap;

use crate::model::{FileStatus, ValidationResponse};

/// Render a deterministic markdown report from a validation response.
pub fn render_report(response: &ValidationResponse, max_examples: usize) -> String {
    let mut lines = Vec::new();

    lines.push("# Intake Validation Report".to_string());
    lines.push(String::new());
    lines.push("## File summary".to_string());
    lines.push(format!("- source: {}", response.source));
    match response.record_type {
        Some(record_type) => lines.push(format!("- record_type: {record_type}")),
        None => lines.push("- record_type: unknown".to_string()),
    }
    lines.push(format!("- status: {}", response.status.as_str()));
    lines.push(format!(
        "- rule_set_fingerprint: {}",
        response.rule_set_fingerprint
    ));
    if let Some(error) = &response.file_error {
        lines.push(format!("- file_error: {error}"));
    }
    lines.push(String::new());

    lines.push("## Row counts".to_string());
    lines.push("| total | valid | invalid | critical | warning | info |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    lines.push(format!(
        "| {} | {} | {} | {} | {} | {} |",
        response.total_rows,
        response.valid_rows,
        response.invalid_rows,
        response.critical_errors,
        response.warnings,
        response.info_messages
    ));
    lines.push(String::new());

    if !response.batches.is_empty() {
        lines.push("## Batches".to_string());
        lines.push("| batch | rows | valid | invalid |".to_string());
        lines.push("| --- | --- | --- | --- |".to_string());
        for batch in &response.batches {
            lines.push(format!(
                "| {} | {}-{} | {} | {} |",
                batch.batch_index, batch.first_row, batch.last_row, batch.valid_rows,
                batch.invalid_rows
            ));
        }
        lines.push(String::new());
    }

    if !response.rule_warnings.is_empty() {
        lines.push("## Skipped rules".to_string());
        for warning in &response.rule_warnings {
            lines.push(format!(
                "- {} ({}): {}",
                warning.rule_id, warning.code, warning.message
            ));
        }
        lines.push(String::new());
    }

    if !response.field_errors.is_empty() {
        lines.push("## Top field errors".to_string());
        for error in response.field_errors.iter().take(max_examples) {
            lines.push(format!(
                "- row {} {} [{}] {}: {}",
                error.row_index,
                error.field,
                error.severity,
                error.code.as_str(),
                error.message
            ));
        }
        lines.push(String::new());
    }

    if !response.business_violations.is_empty() {
        lines.push("## Top rule violations".to_string());
        for violation in response.business_violations.iter().take(max_examples) {
            lines.push(format!(
                "- row {} {} [{}]: {}",
                violation.row_index, violation.rule_id, violation.severity, violation.message
            ));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(response));
    lines.join("\n")
}

fn recommendations(response: &ValidationResponse) -> Vec<String> {
    let mut lines = Vec::new();
    match response.status {
        FileStatus::Failed => {
            lines.push("- fix the source container and resubmit the file.".to_string())
        }
        FileStatus::Cancelled => {
            lines.push("- processing was cancelled; resubmit to validate remaining rows.".to_string())
        }
        FileStatus::Completed => {}
    }

    if !response.rule_warnings.is_empty() {
        lines.push("- repair or deactivate rules that failed to compile.".to_string());
    }

    let mut by_rule: BTreeMap<&str, u64> = BTreeMap::new();
    for violation in &response.business_violations {
        *by_rule.entry(violation.rule_id.as_str()).or_default() += 1;
    }
    if let Some((rule_id, count)) = by_rule
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
    {
        lines.push(format!(
            "- most frequent rule violation: {rule_id} ({count} row(s))."
        ));
    }

    if response.invalid_rows == 0 && response.file_error.is_none() {
        lines.push("- no invalid rows detected; compare counts across runs for drift.".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use intake_core::{RecordType, Severity};
    use intake_rules::{Violation, ViolationKind};

    use super::*;

    fn response() -> ValidationResponse {
        ValidationResponse {
            response_version: "0.1".to_string(),
            source: "Reports/Inventory/day.csv".to_string(),
            record_type: Some(RecordType::Inventory),
            status: FileStatus::Completed,
            total_rows: 2,
            valid_rows: 2,
            invalid_rows: 0,
            critical_errors: 0,
            warnings: 0,
            info_messages: 2,
            field_errors: Vec::new(),
            business_violations: (1..=2)
                .map(|row_index| Violation {
                    row_index,
                    rule_id: "INV_LOW_STOCK".to_string(),
                    severity: Severity::Info,
                    kind: ViolationKind::Rule,
                    message: "stock below reorder level".to_string(),
                })
                .collect(),
            rule_warnings: Vec::new(),
            batches: Vec::new(),
            file_error: None,
            rule_set_fingerprint: "f00d".to_string(),
        }
    }

    #[test]
    fn report_is_stable_and_truncated() {
        let response = response();
        let first = render_report(&response, 1);
        assert_eq!(first, render_report(&response, 1));
        assert!(first.contains("- row 1 INV_LOW_STOCK [INFO]: stock below reorder level"));
        assert!(!first.contains("- row 2 INV_LOW_STOCK"));
        assert!(first.contains("most frequent rule violation: INV_LOW_STOCK (2 row(s))"));
    }
}
