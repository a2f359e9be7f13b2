use std::fmt::Write;

use crate::models::{CompanyYearEntry, DriveStatus, YearDoc};

/// Companies of a year ordered by placements, busiest first.
pub fn companies_by_placed(doc: &YearDoc) -> Vec<(&String, &CompanyYearEntry)> {
    let mut entries: Vec<(&String, &CompanyYearEntry)> = doc.company_wise.iter().collect();
    entries.sort_by(|a, b| b.1.placed.cmp(&a.1.placed).then_with(|| a.0.cmp(b.0)));
    entries
}

pub fn build_year_report(doc: &YearDoc) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Placement Report {}", doc.year);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Companies: {}", doc.total_companies);
    let _ = writeln!(output, "- Running: {}", doc.running_companies);
    let _ = writeln!(output, "- Completed: {}", doc.completed_companies);
    let _ = writeln!(output, "- Students placed: {}", doc.total_placed);
    let _ = writeln!(
        output,
        "- Students participated: {}",
        doc.total_students_participated
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Companies");

    let entries = companies_by_placed(doc);
    if entries.is_empty() {
        let _ = writeln!(output, "No drives recorded for this year.");
    } else {
        for (drive_key, entry) in entries {
            let status = match entry.status {
                DriveStatus::Running => "running",
                DriveStatus::Completed => "completed",
            };
            let _ = writeln!(
                output,
                "- {} ({}): {} placed, {}",
                entry.company_name, drive_key, entry.placed, status
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn year_doc() -> YearDoc {
        let mut company_wise = BTreeMap::new();
        company_wise.insert(
            "AcmeCorp2025".to_string(),
            CompanyYearEntry {
                company_name: "Acme Corp".to_string(),
                placed: 2,
                status: DriveStatus::Completed,
            },
        );
        company_wise.insert(
            "Globex2025".to_string(),
            CompanyYearEntry {
                company_name: "Globex".to_string(),
                placed: 7,
                status: DriveStatus::Running,
            },
        );
        YearDoc {
            year: 2025,
            total_companies: 2,
            completed_companies: 1,
            running_companies: 1,
            total_placed: 9,
            total_students_participated: 40,
            company_wise,
        }
    }

    #[test]
    fn companies_sort_by_placed_descending() {
        let doc = year_doc();
        let entries = companies_by_placed(&doc);
        assert_eq!(entries[0].1.company_name, "Globex");
        assert_eq!(entries[1].1.company_name, "Acme Corp");
    }

    #[test]
    fn report_lists_totals_and_companies() {
        let report = build_year_report(&year_doc());
        assert!(report.contains("# Placement Report 2025"));
        assert!(report.contains("- Students placed: 9"));
        assert!(report.contains("- Globex (Globex2025): 7 placed, running"));
        assert!(report.contains("- Acme Corp (AcmeCorp2025): 2 placed, completed"));
    }

    #[test]
    fn empty_year_renders_placeholder() {
        let report = build_year_report(&YearDoc::empty(2026));
        assert!(report.contains("No drives recorded for this year."));
    }
}
