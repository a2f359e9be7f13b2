use chrono::Utc;
use sha2::{Digest, Sha256};

/// Strip everything except letters and digits, uppercase the rest.
/// Idempotent: normalizing an already-normalized value is a no-op.
pub fn normalize_roll_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Lowercase, collapse whitespace runs, and drop standalone honorific
/// tokens (mr/mrs/ms/dr/prof, with or without a trailing period).
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let kept: Vec<&str> = lowered
        .split_whitespace()
        .filter(|token| {
            let bare = token.strip_suffix('.').unwrap_or(token);
            !matches!(bare, "mr" | "mrs" | "ms" | "dr" | "prof")
        })
        .collect();
    kept.join(" ")
}

/// Lowercase and trim surrounding whitespace.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..4].iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Derive a stable student id from whichever identifiers survived
/// extraction. Priority: roll number > email > name. With no identifier at
/// all the id is a timestamp digest; such rows can never be deduplicated,
/// so callers log them as a data-quality concern.
pub fn derive_student_id(
    roll_number: Option<&str>,
    name: Option<&str>,
    email: Option<&str>,
) -> String {
    if let Some(roll) = roll_number.filter(|value| !value.trim().is_empty()) {
        return format!("student_{}", normalize_roll_number(roll));
    }
    if let Some(email) = email.filter(|value| !value.trim().is_empty()) {
        let normalized = normalize_email(email);
        let local_part = normalized.split('@').next().unwrap_or(&normalized);
        return format!("student_{local_part}");
    }
    if let Some(name) = name.filter(|value| !value.trim().is_empty()) {
        return format!("student_{}", short_digest(&normalize_name(name)));
    }
    format!("student_{}", short_digest(&Utc::now().to_rfc3339()))
}

/// Drive key: company name with non-alphanumerics removed, then the year.
/// "Acme Corp." + 2025 becomes "AcmeCorp2025".
pub fn drive_key(company_name: &str, year: i32) -> String {
    let clean: String = company_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{clean}{year}")
}

pub fn round_id(drive_key: &str, round_number: i32) -> String {
    format!("{drive_key}_round_{round_number}")
}

pub fn row_id(round_id: &str, student_id: &str) -> String {
    format!("{round_id}_{student_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_number_strips_separators_and_uppercases() {
        assert_eq!(normalize_roll_number(" 22951-a/05 16 "), "22951A0516");
        assert_eq!(normalize_roll_number("###"), "");
    }

    #[test]
    fn roll_number_normalization_is_idempotent() {
        for raw in [" 22951-a/05 16 ", "abc123", "A B C", "!!", ""] {
            let once = normalize_roll_number(raw);
            assert_eq!(normalize_roll_number(&once), once);
        }
    }

    #[test]
    fn name_drops_honorifics_and_collapses_whitespace() {
        assert_eq!(normalize_name("  Dr.  John   DOE "), "john doe");
        assert_eq!(normalize_name("Mrs Maria Garcia"), "maria garcia");
        assert_eq!(normalize_name("prof"), "");
    }

    #[test]
    fn name_keeps_honorific_substrings_inside_words() {
        // "driti" contains "dr" but is not a title token
        assert_eq!(normalize_name("Driti Prof. Rao"), "driti rao");
    }

    #[test]
    fn email_lowercases_and_trims() {
        assert_eq!(normalize_email("  AKSHAYA@Example.COM "), "akshaya@example.com");
    }

    #[test]
    fn student_id_prefers_roll_number_over_email_and_name() {
        let id = derive_student_id(Some("22951A0516"), Some("Akshaya"), Some("a@x.com"));
        assert_eq!(id, "student_22951A0516");
    }

    #[test]
    fn student_id_falls_back_to_email_local_part() {
        let id = derive_student_id(None, Some("Akshaya"), Some("Akshaya.MS@Example.com"));
        assert_eq!(id, "student_akshaya.ms");
    }

    #[test]
    fn student_id_from_name_is_a_stable_short_digest() {
        let first = derive_student_id(None, Some("Dr. John Doe"), None);
        let second = derive_student_id(None, Some("john   doe"), None);
        assert_eq!(first, second);
        let digest = first.strip_prefix("student_").unwrap();
        assert_eq!(digest.len(), 8);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn student_id_without_identifiers_still_has_the_expected_shape() {
        let id = derive_student_id(None, None, None);
        let digest = id.strip_prefix("student_").unwrap();
        assert_eq!(digest.len(), 8);
    }

    #[test]
    fn blank_identifiers_are_treated_as_absent() {
        let id = derive_student_id(Some("   "), None, Some("a@x.com"));
        assert_eq!(id, "student_a");
    }

    #[test]
    fn key_generators_match_wire_formats() {
        assert_eq!(drive_key("Acme Corp.", 2025), "AcmeCorp2025");
        assert_eq!(round_id("AcmeCorp2025", 2), "AcmeCorp2025_round_2");
        assert_eq!(
            row_id("AcmeCorp2025_round_2", "student_22951A0516"),
            "AcmeCorp2025_round_2_student_22951A0516"
        );
    }
}
