use std::collections::HashSet;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{RoundMeta, RowRecord, RowStatus, UploadRequest, UploadSummary};
use crate::normalize;
use crate::resolve;
use crate::stats;
use crate::store;
use crate::students::{self, RoundContext};

/// Process one round upload end to end: resolve every row against the
/// registry, write the round ledger, mark eliminations, snapshot
/// placements on final rounds, merge student documents, then update the
/// company and yearly aggregates.
///
/// Writes are batched, not transactional across collections: a failure
/// partway leaves earlier-committed batches applied. Callers must treat
/// partial application as a possible outcome.
pub async fn process_round_upload(
    pool: &PgPool,
    config: &Config,
    request: UploadRequest,
) -> Result<UploadSummary, PipelineError> {
    validate(&request)?;

    let drive_key = normalize::drive_key(&request.company_name, request.year);
    let existing_drive = store::get_drive(pool, &drive_key).await?;

    let round_number = match request.round_number {
        Some(number) => number,
        None => {
            let next = existing_drive
                .as_ref()
                .map(|drive| drive.current_round + 1)
                .unwrap_or(1);
            info!(round = next, "auto-computed round number");
            next
        }
    };

    info!(
        %drive_key,
        round_number,
        is_final = request.is_final,
        rows = request.rows.len(),
        "processing round upload"
    );

    let drive = stats::advance_drive(
        existing_drive,
        &drive_key,
        &request.company_name,
        request.year,
        round_number,
        request.is_final,
    );
    store::upsert_drive(pool, &drive).await?;

    // Resolve each row, deriving fresh ids for unmatched ones.
    let directory = store::PgDirectory::new(pool);
    let ctx = RoundContext {
        drive_key: &drive_key,
        company_name: &request.company_name,
        year: request.year,
        round_number,
        is_final: request.is_final,
    };

    let mut merges = Vec::with_capacity(request.rows.len());
    let mut matched_students = 0usize;
    for row in &request.rows {
        let resolution = resolve::resolve(&directory, row).await?;
        let student_id = match &resolution.student {
            Some(student) => {
                matched_students += 1;
                info!(
                    student = %student.id,
                    matched_by = resolution.match_type.as_str(),
                    "row matched existing student"
                );
                student.id.clone()
            }
            None => {
                let id = normalize::derive_student_id(
                    row.roll_number.as_deref(),
                    row.name.as_deref(),
                    row.email.as_deref(),
                );
                if row.roll_number.is_none() && row.name.is_none() && row.email.is_none() {
                    warn!(student = %id, "row carries no identifier, derived id cannot be deduplicated");
                }
                id
            }
        };
        merges.push(students::apply_row(
            resolution.student.as_ref(),
            row,
            &student_id,
            &ctx,
        ));
    }

    // Round ledger: metadata once, then the row records.
    let round_id = normalize::round_id(&drive_key, round_number);
    let meta = RoundMeta {
        id: round_id.clone(),
        drive_id: drive_key.clone(),
        round_number,
        round_name: request.round_name.clone(),
        raw_columns: request.raw_columns.clone(),
        student_count: request.rows.len() as i32,
        is_final: request.is_final,
    };
    store::insert_round(pool, &meta).await?;

    let records: Vec<RowRecord> = merges
        .iter()
        .zip(&request.rows)
        .map(|(merge, row)| RowRecord {
            id: normalize::row_id(&round_id, &merge.student.id),
            round_id: round_id.clone(),
            student_id: merge.student.id.clone(),
            row_data: row.row_data.clone(),
            status: if request.is_final {
                RowStatus::Qualified
            } else {
                RowStatus::Pending
            },
        })
        .collect();
    store::insert_round_rows(pool, &records, config.batch_size).await?;

    // Students seen in the previous round but absent now were eliminated.
    if round_number > 1 {
        let previous_round_id = normalize::round_id(&drive_key, round_number - 1);
        let previous = store::fetch_round_student_ids(pool, &previous_round_id).await?;
        let current: HashSet<&str> = records
            .iter()
            .map(|record| record.student_id.as_str())
            .collect();
        let eliminated = eliminated_ids(&previous, &current);
        if eliminated.is_empty() {
            info!("all students from previous round are continuing");
        } else {
            info!(
                count = eliminated.len(),
                previous_round = round_number - 1,
                "marking eliminated students"
            );
            store::mark_eliminated(pool, &eliminated, &drive_key, config.batch_size).await?;
        }
    }

    // Every row in a final round is a placement.
    let placed_students = if request.is_final { records.len() } else { 0 };
    if request.is_final {
        store::insert_placements(pool, &drive_key, &records, config.batch_size).await?;
    }

    let student_docs: Vec<&crate::models::Student> =
        merges.iter().map(|merge| &merge.student).collect();
    store::save_students(pool, &student_docs, config.batch_size).await?;

    let new_students = merges.iter().filter(|merge| merge.created_new).count();
    let newly_placed = merges
        .iter()
        .filter(|merge| merge.transitioned_to_placed)
        .count();
    if newly_placed > 0 {
        info!(newly_placed, "students transitioned to placed");
    }

    let totals = stats::drive_totals_update(
        round_number,
        request.rows.len() as i32,
        placed_students as i32,
    );
    store::update_drive_totals(pool, &drive_key, &totals).await?;

    let existing_year = store::get_year(pool, request.year).await?;
    let year_doc = stats::merge_year(
        existing_year,
        request.year,
        &drive_key,
        &request.company_name,
        placed_students as i32,
        new_students as i32,
        request.is_final,
    );
    store::save_year(pool, &year_doc).await?;

    let summary = UploadSummary {
        drive_key,
        round_id,
        total_students: request.rows.len(),
        matched_students,
        new_students,
        placed_students,
        is_final_round: request.is_final,
        missing_fields: request.missing_fields,
        raw_columns: request.raw_columns,
    };
    info!(?summary, "round upload complete");
    Ok(summary)
}

/// Reject bad requests before any write is issued.
fn validate(request: &UploadRequest) -> Result<(), PipelineError> {
    if request.company_name.trim().is_empty() {
        return Err(PipelineError::InvalidInput(
            "company name must not be empty".to_string(),
        ));
    }
    if !(2000..=2100).contains(&request.year) {
        return Err(PipelineError::InvalidInput(format!(
            "year {} is outside 2000-2100",
            request.year
        )));
    }
    if let Some(round) = request.round_number {
        if round < 1 {
            return Err(PipelineError::InvalidInput(format!(
                "round number {round} must be positive"
            )));
        }
    }
    if request.rows.is_empty() {
        return Err(PipelineError::InvalidInput(
            "no student rows to process".to_string(),
        ));
    }
    Ok(())
}

/// Previous-round students missing from the current upload, in the order
/// the previous round recorded them.
fn eliminated_ids(previous: &[String], current: &HashSet<&str>) -> Vec<String> {
    previous
        .iter()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect()
}
