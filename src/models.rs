use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One spreadsheet cell after parsing. Numeric-looking cells are kept as
/// numbers so exported sheets round-trip the way the source produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    /// Empty means blank/whitespace-only text or a NaN sentinel from the
    /// spreadsheet layer.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(number) => number.is_nan(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            CellValue::Text(text) => text.trim().to_string(),
            CellValue::Number(number) => {
                if number.fract() == 0.0 && number.is_finite() {
                    format!("{}", *number as i64)
                } else {
                    number.to_string()
                }
            }
        }
    }
}

/// One spreadsheet row with its identifier cells pulled out. The remaining
/// columns travel as an open map of column name to cell value; identifier
/// fields are only populated when the cell held a non-empty value.
#[derive(Debug, Clone, Default)]
pub struct StudentRow {
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub row_data: BTreeMap<String, CellValue>,
}

/// How the resolver matched a row to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    RollNumber,
    Name,
    Email,
    None,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchType::RollNumber => "roll_number",
            MatchType::Name => "name",
            MatchType::Email => "email",
            MatchType::None => "none",
        }
    }
}

/// Resolver verdict for one row. Confidence is binary: matches are exact.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub student: Option<Student>,
    pub match_type: MatchType,
    pub confidence: u8,
}

/// Per-drive standing stored inside a student's `companyStatus` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveStanding {
    pub status: StandingStatus,
    pub round_reached: i32,
    #[serde(default)]
    pub final_selection: Option<bool>,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingStatus {
    InProcess,
    Selected,
    NotSelected,
}

/// Overall placement state of a student across all drives. Transitions only
/// from `NotPlaced` to `Placed`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    NotPlaced,
    Placed,
}

impl PlacementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlacementStatus::NotPlaced => "not_placed",
            PlacementStatus::Placed => "placed",
        }
    }

    pub fn parse(text: &str) -> Self {
        match text {
            "placed" => PlacementStatus::Placed,
            _ => PlacementStatus::NotPlaced,
        }
    }
}

/// One student tracked across companies and years. Canonical identifier
/// fields hold normalized values; once non-empty they are never overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub id: String,
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company_status: BTreeMap<String, DriveStanding>,
    pub selected_companies: Vec<String>,
    pub current_status: PlacementStatus,
    pub total_offers: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStatus {
    Running,
    Completed,
}

impl DriveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DriveStatus::Running => "running",
            DriveStatus::Completed => "completed",
        }
    }

    pub fn parse(text: &str) -> Self {
        match text {
            "completed" => DriveStatus::Completed,
            _ => DriveStatus::Running,
        }
    }
}

/// One company's hiring process for one year, keyed by `<CompanyName><year>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Drive {
    pub id: String,
    pub company_name: String,
    pub year: i32,
    pub status: DriveStatus,
    pub current_round: i32,
    pub final_round: Option<i32>,
    pub total_rounds: i32,
    pub total_applied: i32,
    pub total_placed: i32,
}

/// Round metadata, written once per round number per drive.
#[derive(Debug, Clone)]
pub struct RoundMeta {
    pub id: String,
    pub drive_id: String,
    pub round_number: i32,
    pub round_name: Option<String>,
    pub raw_columns: Vec<String>,
    pub student_count: i32,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Pending,
    Qualified,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Qualified => "qualified",
        }
    }
}

/// One per-student row inside a round's ledger.
#[derive(Debug, Clone)]
pub struct RowRecord {
    pub id: String,
    pub round_id: String,
    pub student_id: String,
    pub row_data: BTreeMap<String, CellValue>,
    pub status: RowStatus,
}

/// Per-drive entry in a year document's company map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyYearEntry {
    pub company_name: String,
    pub placed: i32,
    pub status: DriveStatus,
}

/// Aggregate analytics for one placement year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearDoc {
    pub year: i32,
    pub total_companies: i32,
    pub completed_companies: i32,
    pub running_companies: i32,
    pub total_placed: i32,
    pub total_students_participated: i32,
    pub company_wise: BTreeMap<String, CompanyYearEntry>,
}

impl YearDoc {
    pub fn empty(year: i32) -> Self {
        YearDoc {
            year,
            total_companies: 0,
            completed_companies: 0,
            running_companies: 0,
            total_placed: 0,
            total_students_participated: 0,
            company_wise: BTreeMap::new(),
        }
    }
}

/// Fully validated input to the round-upload pipeline. The CLI (or any
/// other outer glue) is responsible for reading the spreadsheet and
/// classifying its columns before building one of these.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub company_name: String,
    pub year: i32,
    pub round_number: Option<i32>,
    pub round_name: Option<String>,
    pub is_final: bool,
    pub rows: Vec<StudentRow>,
    pub raw_columns: Vec<String>,
    pub missing_fields: Vec<String>,
}

/// What one round upload did, returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub drive_key: String,
    pub round_id: String,
    pub total_students: usize,
    pub matched_students: usize,
    pub new_students: usize,
    pub placed_students: usize,
    pub is_final_round: bool,
    pub missing_fields: Vec<String>,
    pub raw_columns: Vec<String>,
}
