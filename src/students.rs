use tracing::debug;

use crate::models::{
    DriveStanding, PlacementStatus, StandingStatus, Student, StudentRow,
};
use crate::normalize::{normalize_email, normalize_name, normalize_roll_number};

/// Round being processed, shared by every row merge in one upload.
#[derive(Debug, Clone, Copy)]
pub struct RoundContext<'a> {
    pub drive_key: &'a str,
    pub company_name: &'a str,
    pub year: i32,
    pub round_number: i32,
    pub is_final: bool,
}

/// Merged student document plus the transition facts the statistics
/// updater consumes downstream.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub student: Student,
    pub created_new: bool,
    pub transitioned_to_placed: bool,
}

/// Merge one resolved row into the registry state. Existing students get
/// backfill-only identifier merges; unresolved rows become new documents.
/// Pure: the caller persists the returned student.
pub fn apply_row(
    existing: Option<&Student>,
    row: &StudentRow,
    student_id: &str,
    ctx: &RoundContext<'_>,
) -> MergeOutcome {
    match existing {
        Some(student) => merge_existing(student, row, ctx),
        None => create_new(row, student_id, ctx),
    }
}

fn standing_for_round(ctx: &RoundContext<'_>) -> DriveStanding {
    DriveStanding {
        status: if ctx.is_final {
            StandingStatus::Selected
        } else {
            StandingStatus::InProcess
        },
        round_reached: ctx.round_number,
        final_selection: if ctx.is_final { Some(true) } else { None },
        year: ctx.year,
    }
}

fn merge_existing(existing: &Student, row: &StudentRow, ctx: &RoundContext<'_>) -> MergeOutcome {
    let mut student = existing.clone();

    backfill(&mut student.roll_number, row.roll_number.as_deref(), normalize_roll_number);
    backfill(&mut student.name, row.name.as_deref(), normalize_name);
    backfill(&mut student.email, row.email.as_deref(), normalize_email);

    student
        .company_status
        .insert(ctx.drive_key.to_string(), standing_for_round(ctx));

    let mut transitioned_to_placed = false;
    if ctx.is_final {
        if !student
            .selected_companies
            .iter()
            .any(|company| company == ctx.company_name)
        {
            student.selected_companies.push(ctx.company_name.to_string());
        }
        transitioned_to_placed = student.current_status != PlacementStatus::Placed;
        student.current_status = PlacementStatus::Placed;
        student.total_offers += 1;
    }

    MergeOutcome {
        student,
        created_new: false,
        transitioned_to_placed,
    }
}

fn create_new(row: &StudentRow, student_id: &str, ctx: &RoundContext<'_>) -> MergeOutcome {
    let mut company_status = std::collections::BTreeMap::new();
    company_status.insert(ctx.drive_key.to_string(), standing_for_round(ctx));

    let student = Student {
        id: student_id.to_string(),
        roll_number: normalized_field(row.roll_number.as_deref(), normalize_roll_number),
        name: normalized_field(row.name.as_deref(), normalize_name),
        email: normalized_field(row.email.as_deref(), normalize_email),
        company_status,
        selected_companies: if ctx.is_final {
            vec![ctx.company_name.to_string()]
        } else {
            Vec::new()
        },
        current_status: if ctx.is_final {
            PlacementStatus::Placed
        } else {
            PlacementStatus::NotPlaced
        },
        total_offers: if ctx.is_final { 1 } else { 0 },
    };

    MergeOutcome {
        student,
        created_new: true,
        transitioned_to_placed: ctx.is_final,
    }
}

/// Fill a canonical field only when it is currently empty. Non-empty
/// fields are never overwritten.
fn backfill(field: &mut Option<String>, raw: Option<&str>, normalizer: fn(&str) -> String) {
    let current_empty = field
        .as_deref()
        .map(|value| value.trim().is_empty())
        .unwrap_or(true);
    if !current_empty {
        return;
    }
    if let Some(value) = normalized_field(raw, normalizer) {
        debug!(value = %value, "backfilled canonical field");
        *field = Some(value);
    }
}

fn normalized_field(raw: Option<&str>, normalizer: fn(&str) -> String) -> Option<String> {
    raw.map(normalizer).filter(|value| !value.is_empty())
}

/// Mark a student eliminated from a drive: standing drops to
/// `not_selected`, `finalSelection` is cleared, `roundReached` keeps the
/// last round attended. Returns false when the student has no standing for
/// the drive. This is the only place a standing can regress.
pub fn mark_eliminated(student: &mut Student, drive_key: &str) -> bool {
    match student.company_status.get_mut(drive_key) {
        Some(standing) => {
            standing.status = StandingStatus::NotSelected;
            standing.final_selection = Some(false);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn ctx(is_final: bool) -> RoundContext<'static> {
        RoundContext {
            drive_key: "AcmeCorp2025",
            company_name: "Acme Corp",
            year: 2025,
            round_number: 2,
            is_final,
        }
    }

    fn existing_student() -> Student {
        Student {
            id: "student_22951A0516".to_string(),
            roll_number: Some("22951A0516".to_string()),
            name: Some("john doe".to_string()),
            email: None,
            company_status: BTreeMap::new(),
            selected_companies: Vec::new(),
            current_status: PlacementStatus::NotPlaced,
            total_offers: 0,
        }
    }

    fn row(roll: Option<&str>, name: Option<&str>, email: Option<&str>) -> StudentRow {
        StudentRow {
            roll_number: roll.map(str::to_string),
            name: name.map(str::to_string),
            email: email.map(str::to_string),
            row_data: BTreeMap::new(),
        }
    }

    #[test]
    fn backfill_never_overwrites_existing_fields() {
        let student = existing_student();
        let outcome = apply_row(
            Some(&student),
            &row(Some("99999Z9999"), Some("Jonathan Doe"), Some("JD@Example.com")),
            &student.id,
            &ctx(false),
        );
        // name and roll number keep their stored values, email is backfilled
        assert_eq!(outcome.student.name.as_deref(), Some("john doe"));
        assert_eq!(outcome.student.roll_number.as_deref(), Some("22951A0516"));
        assert_eq!(outcome.student.email.as_deref(), Some("jd@example.com"));
        assert!(!outcome.created_new);
    }

    #[test]
    fn non_final_round_records_in_process_standing() {
        let student = existing_student();
        let outcome = apply_row(Some(&student), &row(None, None, None), &student.id, &ctx(false));
        let standing = &outcome.student.company_status["AcmeCorp2025"];
        assert_eq!(standing.status, StandingStatus::InProcess);
        assert_eq!(standing.round_reached, 2);
        assert_eq!(standing.final_selection, None);
        assert_eq!(standing.year, 2025);
        assert_eq!(outcome.student.current_status, PlacementStatus::NotPlaced);
        assert!(!outcome.transitioned_to_placed);
    }

    #[test]
    fn final_round_places_student_and_counts_offer() {
        let student = existing_student();
        let outcome = apply_row(Some(&student), &row(None, None, None), &student.id, &ctx(true));
        assert_eq!(outcome.student.current_status, PlacementStatus::Placed);
        assert_eq!(outcome.student.total_offers, 1);
        assert_eq!(outcome.student.selected_companies, vec!["Acme Corp"]);
        assert!(outcome.transitioned_to_placed);
        let standing = &outcome.student.company_status["AcmeCorp2025"];
        assert_eq!(standing.status, StandingStatus::Selected);
        assert_eq!(standing.final_selection, Some(true));
    }

    #[test]
    fn placement_is_monotonic_and_not_double_counted() {
        let mut student = existing_student();
        student.current_status = PlacementStatus::Placed;
        student.total_offers = 1;
        student.selected_companies = vec!["Acme Corp".to_string()];

        let outcome = apply_row(Some(&student), &row(None, None, None), &student.id, &ctx(true));
        assert!(!outcome.transitioned_to_placed);
        assert_eq!(outcome.student.total_offers, 2);
        // company list stays deduplicated
        assert_eq!(outcome.student.selected_companies, vec!["Acme Corp"]);
    }

    #[test]
    fn placed_student_stays_placed_through_later_non_final_rounds() {
        let mut student = existing_student();
        student.current_status = PlacementStatus::Placed;
        let outcome = apply_row(Some(&student), &row(None, None, None), &student.id, &ctx(false));
        assert_eq!(outcome.student.current_status, PlacementStatus::Placed);
    }

    #[test]
    fn new_student_stores_normalized_identifiers() {
        let outcome = apply_row(
            None,
            &row(Some(" 22951-a0516 "), Some("Dr. Akshaya M S"), Some("A@X.com")),
            "student_22951A0516",
            &ctx(false),
        );
        assert!(outcome.created_new);
        assert_eq!(outcome.student.roll_number.as_deref(), Some("22951A0516"));
        assert_eq!(outcome.student.name.as_deref(), Some("akshaya m s"));
        assert_eq!(outcome.student.email.as_deref(), Some("a@x.com"));
        assert_eq!(outcome.student.total_offers, 0);
        assert!(!outcome.transitioned_to_placed);
    }

    #[test]
    fn new_student_on_final_round_is_immediately_placed() {
        let outcome = apply_row(None, &row(Some("X1"), None, None), "student_X1", &ctx(true));
        assert!(outcome.created_new);
        assert!(outcome.transitioned_to_placed);
        assert_eq!(outcome.student.current_status, PlacementStatus::Placed);
        assert_eq!(outcome.student.total_offers, 1);
    }

    #[test]
    fn elimination_regresses_standing_but_keeps_round_reached() {
        let mut student = existing_student();
        student.company_status.insert(
            "AcmeCorp2025".to_string(),
            DriveStanding {
                status: StandingStatus::InProcess,
                round_reached: 1,
                final_selection: None,
                year: 2025,
            },
        );

        assert!(mark_eliminated(&mut student, "AcmeCorp2025"));
        let standing = &student.company_status["AcmeCorp2025"];
        assert_eq!(standing.status, StandingStatus::NotSelected);
        assert_eq!(standing.final_selection, Some(false));
        assert_eq!(standing.round_reached, 1);
    }

    #[test]
    fn elimination_without_standing_reports_false() {
        let mut student = existing_student();
        assert!(!mark_eliminated(&mut student, "OtherCo2025"));
    }
}
