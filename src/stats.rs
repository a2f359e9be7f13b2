use tracing::info;

use crate::models::{CompanyYearEntry, Drive, DriveStatus, YearDoc};

/// Advance a drive document for a round upload: create it on first sight,
/// otherwise patch round bookkeeping. `status` moves running -> completed
/// exactly once and never back; `total_rounds` is the highest round seen.
pub fn advance_drive(
    existing: Option<Drive>,
    drive_key: &str,
    company_name: &str,
    year: i32,
    round_number: i32,
    is_final: bool,
) -> Drive {
    match existing {
        Some(mut drive) => {
            drive.current_round = round_number;
            drive.total_rounds = drive.total_rounds.max(round_number);
            if is_final {
                if drive.status == DriveStatus::Running {
                    info!(%drive_key, "drive status: running -> completed");
                }
                drive.status = DriveStatus::Completed;
                drive.final_round = Some(round_number);
            }
            drive
        }
        None => Drive {
            id: drive_key.to_string(),
            company_name: company_name.to_string(),
            year,
            status: if is_final {
                DriveStatus::Completed
            } else {
                DriveStatus::Running
            },
            current_round: round_number,
            final_round: is_final.then_some(round_number),
            total_rounds: round_number,
            total_applied: 0,
            total_placed: 0,
        },
    }
}

/// Counter changes to apply to a drive after its rows are written.
/// `total_applied` is set (not incremented) at round 1 only; later rounds
/// are eliminations, not new applicants. `placed_delta` is only non-zero
/// on final rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveTotalsUpdate {
    pub set_total_applied: Option<i32>,
    pub placed_delta: i32,
}

pub fn drive_totals_update(round_number: i32, total_applied: i32, placed: i32) -> DriveTotalsUpdate {
    DriveTotalsUpdate {
        set_total_applied: (round_number == 1).then_some(total_applied),
        placed_delta: placed,
    }
}

/// Merge one round upload into the year document. The running/completed
/// transition is detected from the *previously stored* status of the
/// drive's entry, never inferred from `is_final` alone, so re-uploading a
/// final round cannot decrement `running_companies` twice.
pub fn merge_year(
    existing: Option<YearDoc>,
    year: i32,
    drive_key: &str,
    company_name: &str,
    placed: i32,
    new_students: i32,
    is_final: bool,
) -> YearDoc {
    let mut doc = existing.unwrap_or_else(|| YearDoc::empty(year));

    let previous_status = doc.company_wise.get(drive_key).map(|entry| entry.status);

    match doc.company_wise.get_mut(drive_key) {
        Some(entry) => {
            entry.placed += placed;
            if is_final {
                entry.status = DriveStatus::Completed;
            }
        }
        None => {
            doc.company_wise.insert(
                drive_key.to_string(),
                CompanyYearEntry {
                    company_name: company_name.to_string(),
                    placed,
                    status: if is_final {
                        DriveStatus::Completed
                    } else {
                        DriveStatus::Running
                    },
                },
            );
        }
    }

    doc.total_placed += placed;
    doc.total_students_participated += new_students;

    match previous_status {
        None => {
            doc.total_companies += 1;
            if is_final {
                doc.completed_companies += 1;
            } else {
                doc.running_companies += 1;
            }
        }
        Some(DriveStatus::Running) if is_final => {
            doc.running_companies -= 1;
            doc.completed_companies += 1;
            info!(%drive_key, year, "drive transitioned from running to completed");
        }
        Some(_) => {}
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upload_creates_running_drive() {
        let drive = advance_drive(None, "AcmeCorp2025", "Acme", 2025, 1, false);
        assert_eq!(drive.status, DriveStatus::Running);
        assert_eq!(drive.current_round, 1);
        assert_eq!(drive.final_round, None);
        assert_eq!(drive.total_rounds, 1);
        assert_eq!(drive.total_applied, 0);
    }

    #[test]
    fn final_upload_completes_drive_and_pins_final_round() {
        let running = advance_drive(None, "AcmeCorp2025", "Acme", 2025, 1, false);
        let completed = advance_drive(Some(running), "AcmeCorp2025", "Acme", 2025, 2, true);
        assert_eq!(completed.status, DriveStatus::Completed);
        assert_eq!(completed.final_round, Some(2));
        assert_eq!(completed.current_round, 2);
        assert_eq!(completed.total_rounds, 2);
    }

    #[test]
    fn total_rounds_never_decreases() {
        let mut drive = advance_drive(None, "AcmeCorp2025", "Acme", 2025, 3, false);
        drive = advance_drive(Some(drive), "AcmeCorp2025", "Acme", 2025, 2, false);
        assert_eq!(drive.total_rounds, 3);
        assert_eq!(drive.current_round, 2);
    }

    #[test]
    fn applied_count_is_set_at_round_one_only() {
        let round_one = drive_totals_update(1, 120, 0);
        assert_eq!(round_one.set_total_applied, Some(120));

        // round 2's row count must not touch totalApplied
        let round_two = drive_totals_update(2, 45, 0);
        assert_eq!(round_two.set_total_applied, None);
        assert_eq!(round_two.placed_delta, 0);
    }

    #[test]
    fn placed_delta_flows_through_on_final_rounds() {
        let update = drive_totals_update(3, 20, 20);
        assert_eq!(update.set_total_applied, None);
        assert_eq!(update.placed_delta, 20);
    }

    #[test]
    fn new_running_drive_bumps_year_counters() {
        // new drive "Acme" 2025, round 1, not final, 3 new students
        let doc = merge_year(None, 2025, "AcmeCorp2025", "Acme", 0, 3, false);
        assert_eq!(doc.total_companies, 1);
        assert_eq!(doc.running_companies, 1);
        assert_eq!(doc.completed_companies, 0);
        assert_eq!(doc.total_placed, 0);
        assert_eq!(doc.total_students_participated, 3);
        assert_eq!(doc.company_wise["AcmeCorp2025"].status, DriveStatus::Running);
    }

    #[test]
    fn final_round_moves_drive_from_running_to_completed() {
        let doc = merge_year(None, 2025, "AcmeCorp2025", "Acme", 0, 3, false);
        let doc = merge_year(Some(doc), 2025, "AcmeCorp2025", "Acme", 2, 0, true);
        assert_eq!(doc.total_companies, 1);
        assert_eq!(doc.running_companies, 0);
        assert_eq!(doc.completed_companies, 1);
        assert_eq!(doc.total_placed, 2);
        assert_eq!(doc.company_wise["AcmeCorp2025"].placed, 2);
        assert_eq!(
            doc.company_wise["AcmeCorp2025"].status,
            DriveStatus::Completed
        );
    }

    #[test]
    fn repeated_final_rounds_transition_only_once() {
        let doc = merge_year(None, 2025, "AcmeCorp2025", "Acme", 0, 0, false);
        let doc = merge_year(Some(doc), 2025, "AcmeCorp2025", "Acme", 2, 0, true);
        // misuse: a second consecutive final upload for the same drive
        let doc = merge_year(Some(doc), 2025, "AcmeCorp2025", "Acme", 1, 0, true);
        assert_eq!(doc.running_companies, 0);
        assert_eq!(doc.completed_companies, 1);
        assert_eq!(doc.total_companies, 1);
        // cumulative placed still accumulates
        assert_eq!(doc.company_wise["AcmeCorp2025"].placed, 3);
        assert_eq!(doc.total_placed, 3);
    }

    #[test]
    fn drive_completed_on_its_first_round_counts_as_completed() {
        let doc = merge_year(None, 2025, "FlashHire2025", "FlashHire", 5, 5, true);
        assert_eq!(doc.total_companies, 1);
        assert_eq!(doc.running_companies, 0);
        assert_eq!(doc.completed_companies, 1);
    }

    #[test]
    fn running_plus_completed_always_equals_total() {
        let mut doc = None;
        let uploads = [
            ("AcmeCorp2025", "Acme", false),
            ("Globex2025", "Globex", false),
            ("AcmeCorp2025", "Acme", true),
            ("Initech2025", "Initech", true),
            ("Globex2025", "Globex", true),
        ];
        for (key, company, is_final) in uploads {
            let merged = merge_year(doc.take(), 2025, key, company, 0, 0, is_final);
            assert_eq!(
                merged.running_companies + merged.completed_companies,
                merged.total_companies
            );
            doc = Some(merged);
        }
        let final_doc = doc.unwrap();
        assert_eq!(final_doc.total_companies, 3);
        assert_eq!(final_doc.completed_companies, 3);
    }
}
