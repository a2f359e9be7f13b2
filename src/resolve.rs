use tracing::debug;

use crate::error::PipelineError;
use crate::models::{MatchType, Resolution, Student, StudentRow};
use crate::normalize::{normalize_email, normalize_name, normalize_roll_number};

/// Point lookups into the student registry, one canonical field each,
/// LIMIT 1. Injected so the resolver never touches storage directly.
#[allow(async_fn_in_trait)]
pub trait StudentDirectory {
    async fn find_by_roll_number(&self, roll_number: &str)
        -> Result<Option<Student>, PipelineError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Student>, PipelineError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, PipelineError>;
}

/// Decide whether a row refers to a known student. Priority order is
/// roll number, then name, then email, stopping at the first exact hit;
/// lookups are only issued for fields the row actually carries, so the
/// registry-read cost is at most three point reads per row. Read-only.
pub async fn resolve<D: StudentDirectory>(
    directory: &D,
    row: &StudentRow,
) -> Result<Resolution, PipelineError> {
    if let Some(raw) = row.roll_number.as_deref() {
        let roll_number = normalize_roll_number(raw);
        if !roll_number.is_empty() {
            if let Some(student) = directory.find_by_roll_number(&roll_number).await? {
                debug!(student = %student.id, %roll_number, "matched by roll number");
                return Ok(matched(student, MatchType::RollNumber));
            }
        }
    }

    if let Some(raw) = row.name.as_deref() {
        let name = normalize_name(raw);
        if !name.is_empty() {
            if let Some(student) = directory.find_by_name(&name).await? {
                debug!(student = %student.id, %name, "matched by name");
                return Ok(matched(student, MatchType::Name));
            }
        }
    }

    if let Some(raw) = row.email.as_deref() {
        let email = normalize_email(raw);
        if !email.is_empty() {
            if let Some(student) = directory.find_by_email(&email).await? {
                debug!(student = %student.id, %email, "matched by email");
                return Ok(matched(student, MatchType::Email));
            }
        }
    }

    Ok(Resolution {
        student: None,
        match_type: MatchType::None,
        confidence: 0,
    })
}

fn matched(student: Student, match_type: MatchType) -> Resolution {
    Resolution {
        student: Some(student),
        match_type,
        confidence: 100,
    }
}
