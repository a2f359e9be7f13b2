use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::CellValue;

/// Which spreadsheet column holds each student identifier field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    pub roll_number: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl ColumnMapping {
    /// Identifier fields the classifier could not map, in wire naming.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.roll_number.is_none() {
            missing.push("rollNumber".to_string());
        }
        if self.name.is_none() {
            missing.push("name".to_string());
        }
        if self.email.is_none() {
            missing.push("email".to_string());
        }
        missing
    }

    pub fn is_empty(&self) -> bool {
        self.roll_number.is_none() && self.name.is_none() && self.email.is_none()
    }
}

/// Decides which spreadsheet columns carry rollNumber/name/email. The
/// pipeline only depends on this capability, never on which implementation
/// is active.
#[allow(async_fn_in_trait)]
pub trait ColumnClassifier {
    async fn classify(
        &self,
        columns: &[String],
        sample_rows: &[BTreeMap<String, CellValue>],
    ) -> Result<ColumnMapping, PipelineError>;
}

const ROLL_NUMBER_HEADERS: &[&str] = &[
    "roll number",
    "rollnumber",
    "roll no",
    "rollno",
    "roll_no",
    "student id",
    "studentid",
    "student_id",
    "registration number",
    "regno",
    "reg no",
    "reg_no",
    "registration no",
];

const NAME_HEADERS: &[&str] = &[
    "name",
    "student name",
    "studentname",
    "student_name",
    "full name",
    "fullname",
    "full_name",
];

const EMAIL_HEADERS: &[&str] = &[
    "email",
    "e-mail",
    "email id",
    "emailid",
    "email_id",
    "mail",
    "student email",
    "studentemail",
];

fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header-driven classifier: exact synonym lists first, then looser
/// name-shape guesses, then an `@`-sniff over the sample rows for email.
#[derive(Debug, Default, Clone)]
pub struct RuleClassifier;

impl RuleClassifier {
    fn classify_headers(
        columns: &[String],
        sample_rows: &[BTreeMap<String, CellValue>],
    ) -> ColumnMapping {
        let normalized: Vec<(usize, String)> = columns
            .iter()
            .enumerate()
            .map(|(index, header)| (index, normalize_header(header)))
            .collect();

        let mut mapping = ColumnMapping::default();

        for (index, header) in &normalized {
            if mapping.roll_number.is_none() && ROLL_NUMBER_HEADERS.contains(&header.as_str()) {
                mapping.roll_number = Some(columns[*index].clone());
            }
            if mapping.name.is_none() && NAME_HEADERS.contains(&header.as_str()) {
                mapping.name = Some(columns[*index].clone());
            }
            if mapping.email.is_none() && EMAIL_HEADERS.contains(&header.as_str()) {
                mapping.email = Some(columns[*index].clone());
            }
        }

        // Looser guesses for sheets with generic headers like "Column1".
        // The name guess runs first so a "Candidate Name" header cannot be
        // mistaken for an id column by the substring patterns below.
        if mapping.name.is_none() {
            for (index, header) in &normalized {
                if header.contains("name")
                    && !header.contains("college")
                    && !header.contains("company")
                {
                    info!(column = %columns[*index], "guessed name column from header");
                    mapping.name = Some(columns[*index].clone());
                    break;
                }
            }
        }

        if mapping.roll_number.is_none() {
            for (index, header) in &normalized {
                if Some(&columns[*index]) == mapping.name.as_ref()
                    || Some(&columns[*index]) == mapping.email.as_ref()
                {
                    continue;
                }
                if ["column1", "col1", "id", "roll", "regno", "reg"]
                    .iter()
                    .any(|pattern| header.contains(pattern))
                {
                    info!(column = %columns[*index], "guessed rollNumber column from header");
                    mapping.roll_number = Some(columns[*index].clone());
                    break;
                }
            }
        }

        // Header lists failed for email: look at the data instead.
        if mapping.email.is_none() {
            'columns: for column in columns {
                if Some(column) == mapping.roll_number.as_ref()
                    || Some(column) == mapping.name.as_ref()
                {
                    continue;
                }
                for row in sample_rows {
                    if let Some(cell) = row.get(column) {
                        if cell.to_text().contains('@') {
                            info!(column = %column, "guessed email column from sample values");
                            mapping.email = Some(column.clone());
                            continue 'columns;
                        }
                    }
                }
            }
        }

        mapping
    }
}

impl ColumnClassifier for RuleClassifier {
    async fn classify(
        &self,
        columns: &[String],
        sample_rows: &[BTreeMap<String, CellValue>],
    ) -> Result<ColumnMapping, PipelineError> {
        Ok(Self::classify_headers(columns, sample_rows))
    }
}

/// Model-backed classifier calling an OpenAI-compatible chat-completions
/// endpoint. Any transport or parse failure falls back to the rule-based
/// classifier rather than failing the upload.
pub struct ModelClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    fallback: RuleClassifier,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct MappingReply {
    #[serde(rename = "rollNumber")]
    roll_number: Option<String>,
    name: Option<String>,
    email: Option<String>,
}

impl ModelClassifier {
    pub fn new(api_key: &str, model: &str, endpoint: &str) -> Self {
        ModelClassifier {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            fallback: RuleClassifier,
        }
    }

    fn build_prompt(columns: &[String], sample_rows: &[BTreeMap<String, CellValue>]) -> String {
        let mut prompt = String::from(
            "Map spreadsheet columns to student identifier fields. Judge by the DATA \
             VALUES, not the header names: a roll number is an alphanumeric id like \
             22951A0516 (never a serial 1,2,3), a name looks like AKSHAYA M S, an \
             email contains @.\n\nColumns:\n",
        );
        for (index, column) in columns.iter().enumerate() {
            prompt.push_str(&format!("{}. \"{column}\"\n", index + 1));
        }
        prompt.push_str("\nSample rows:\n");
        for (index, row) in sample_rows.iter().take(2).enumerate() {
            prompt.push_str(&format!("Row {}:\n", index + 1));
            for (column, value) in row {
                prompt.push_str(&format!("  \"{column}\" contains: {}\n", value.to_text()));
            }
        }
        prompt.push_str(
            "\nRespond with ONLY a JSON object using the exact column names:\n\
             {\"rollNumber\": \"...\", \"name\": \"...\", \"email\": \"...\", \"missing\": []}\n\
             Use null for fields you cannot find.\n",
        );
        prompt
    }

    async fn ask_model(
        &self,
        columns: &[String],
        sample_rows: &[BTreeMap<String, CellValue>],
    ) -> Result<ColumnMapping, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a data mapping expert. Analyze the actual data \
                                values to identify field types. Respond only with valid JSON."
                },
                { "role": "user", "content": Self::build_prompt(columns, sample_rows) }
            ],
            "temperature": 0.1,
            "max_tokens": 500
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Classifier(err.to_string()))?
            .error_for_status()
            .map_err(|err| PipelineError::Classifier(err.to_string()))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::Classifier(err.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| PipelineError::Classifier("empty completion".to_string()))?;

        let reply: MappingReply = serde_json::from_str(extract_json_block(content))
            .map_err(|err| PipelineError::Classifier(format!("unparseable reply: {err}")))?;

        let keep = |field: Option<String>| -> Option<String> {
            field
                .filter(|column| column != "null" && !column.trim().is_empty())
                .filter(|column| columns.contains(column))
        };

        Ok(ColumnMapping {
            roll_number: keep(reply.roll_number),
            name: keep(reply.name),
            email: keep(reply.email),
        })
    }
}

impl ColumnClassifier for ModelClassifier {
    async fn classify(
        &self,
        columns: &[String],
        sample_rows: &[BTreeMap<String, CellValue>],
    ) -> Result<ColumnMapping, PipelineError> {
        match self.ask_model(columns, sample_rows).await {
            Ok(mapping) if !mapping.is_empty() => {
                info!(?mapping, "model classifier mapped identifier columns");
                Ok(mapping)
            }
            Ok(_) => {
                warn!("model classifier found no identifier columns, using header rules");
                self.fallback.classify(columns, sample_rows).await
            }
            Err(err) => {
                warn!(error = %err, "model classifier failed, using header rules");
                self.fallback.classify(columns, sample_rows).await
            }
        }
    }
}

/// Completions often arrive wrapped in markdown code fences.
fn extract_json_block(content: &str) -> &str {
    let trimmed = content.trim();
    for fence in ["```json", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
            return rest.trim();
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(headers: &[&str]) -> Vec<String> {
        headers.iter().map(|header| header.to_string()).collect()
    }

    #[tokio::test]
    async fn maps_well_known_headers() {
        let mapping = RuleClassifier
            .classify(
                &columns(&["Roll No", "Student Name", "Email ID", "CGPA"]),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(mapping.roll_number.as_deref(), Some("Roll No"));
        assert_eq!(mapping.name.as_deref(), Some("Student Name"));
        assert_eq!(mapping.email.as_deref(), Some("Email ID"));
        assert!(mapping.missing_fields().is_empty());
    }

    #[tokio::test]
    async fn guesses_generic_roll_number_header() {
        let mapping = RuleClassifier
            .classify(&columns(&["Column1", "Candidate Name"]), &[])
            .await
            .unwrap();
        assert_eq!(mapping.roll_number.as_deref(), Some("Column1"));
        assert_eq!(mapping.name.as_deref(), Some("Candidate Name"));
        assert_eq!(mapping.missing_fields(), vec!["email".to_string()]);
    }

    #[tokio::test]
    async fn skips_college_and_company_name_headers() {
        let mapping = RuleClassifier
            .classify(&columns(&["College Name", "Candidate Name"]), &[])
            .await
            .unwrap();
        assert_eq!(mapping.name.as_deref(), Some("Candidate Name"));
    }

    #[tokio::test]
    async fn sniffs_email_column_from_sample_values() {
        let mut row = BTreeMap::new();
        row.insert(
            "Contact".to_string(),
            CellValue::Text("akshaya@example.com".to_string()),
        );
        row.insert("Score".to_string(), CellValue::Number(92.0));
        let mapping = RuleClassifier
            .classify(&columns(&["Contact", "Score"]), &[row])
            .await
            .unwrap();
        assert_eq!(mapping.email.as_deref(), Some("Contact"));
    }

    #[test]
    fn strips_markdown_fences_around_json() {
        let fenced = "```json\n{\"name\": \"Student Name\"}\n```";
        assert_eq!(extract_json_block(fenced), "{\"name\": \"Student Name\"}");
        let bare = "{\"name\": null}";
        assert_eq!(extract_json_block(bare), bare);
    }

    #[test]
    fn missing_fields_use_wire_names() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.missing_fields(), vec!["rollNumber", "name", "email"]);
        assert!(mapping.is_empty());
    }
}
