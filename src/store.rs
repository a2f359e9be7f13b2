use std::collections::BTreeMap;

use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{
    CompanyYearEntry, Drive, DriveStanding, DriveStatus, PlacementStatus, RoundMeta, RowRecord,
    Student, YearDoc,
};
use crate::resolve::StudentDirectory;
use crate::students;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let sample = vec![
        ("student_22951A0516", "22951A0516", "akshaya m s", "akshaya.ms@example.com"),
        ("student_23951A6291", "23951A6291", "rohan verma", "rohan.verma@example.com"),
        ("student_22951A0533", "22951A0533", "maria garcia", "maria.garcia@example.com"),
    ];

    for (id, roll_number, name, email) in sample {
        sqlx::query(
            r#"
            INSERT INTO placement_tracker.students
            (id, roll_number, name, email, current_status, total_offers)
            VALUES ($1, $2, $3, $4, 'not_placed', 0)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(roll_number)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Atomic write batching: statements accumulate in one transaction until
/// the size bound is reached, then that transaction commits and a fresh
/// one starts. Batches commit strictly in sequence, so per-document write
/// ordering within one upload is preserved. An earlier-committed batch is
/// never rolled back when a later one fails.
struct WriteBatch<'a> {
    pool: &'a PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    pending: usize,
    limit: usize,
}

impl<'a> WriteBatch<'a> {
    fn new(pool: &'a PgPool, limit: usize) -> Self {
        WriteBatch {
            pool,
            tx: None,
            pending: 0,
            limit: limit.max(1),
        }
    }

    async fn conn(&mut self) -> Result<&mut PgConnection, sqlx::Error> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(&mut **self.tx.insert(tx))
    }

    async fn mark_written(&mut self) -> Result<(), sqlx::Error> {
        self.pending += 1;
        if self.pending >= self.limit {
            self.commit_pending().await?;
        }
        Ok(())
    }

    async fn commit_pending(&mut self) -> Result<(), sqlx::Error> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(statements = self.pending, "committed write batch");
        }
        self.pending = 0;
        Ok(())
    }

    async fn finish(mut self) -> Result<(), sqlx::Error> {
        self.commit_pending().await
    }
}

const STUDENT_COLUMNS: &str = "id, roll_number, name, email, company_status, \
     selected_companies, current_status, total_offers";

fn student_from_row(row: &PgRow) -> Result<Student, sqlx::Error> {
    let company_status: Json<BTreeMap<String, DriveStanding>> = row.try_get("company_status")?;
    let selected_companies: Json<Vec<String>> = row.try_get("selected_companies")?;
    let current_status: String = row.try_get("current_status")?;
    Ok(Student {
        id: row.try_get("id")?,
        roll_number: row.try_get("roll_number")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        company_status: company_status.0,
        selected_companies: selected_companies.0,
        current_status: PlacementStatus::parse(&current_status),
        total_offers: row.try_get("total_offers")?,
    })
}

async fn find_student_where(
    pool: &PgPool,
    predicate: &str,
    value: &str,
) -> Result<Option<Student>, sqlx::Error> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM placement_tracker.students WHERE {predicate} = $1 LIMIT 1"
    );
    let row = sqlx::query(&sql).bind(value).fetch_optional(pool).await?;
    row.as_ref().map(student_from_row).transpose()
}

pub async fn get_student(pool: &PgPool, id: &str) -> Result<Option<Student>, sqlx::Error> {
    find_student_where(pool, "id", id).await
}

/// Registry lookups backed by Postgres point reads, one per canonical
/// field, each LIMIT 1.
pub struct PgDirectory<'a> {
    pool: &'a PgPool,
}

impl<'a> PgDirectory<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        PgDirectory { pool }
    }
}

impl StudentDirectory for PgDirectory<'_> {
    async fn find_by_roll_number(
        &self,
        roll_number: &str,
    ) -> Result<Option<Student>, PipelineError> {
        Ok(find_student_where(self.pool, "roll_number", roll_number).await?)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Student>, PipelineError> {
        Ok(find_student_where(self.pool, "name", name).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, PipelineError> {
        Ok(find_student_where(self.pool, "email", email).await?)
    }
}

pub async fn get_drive(pool: &PgPool, drive_key: &str) -> Result<Option<Drive>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, company_name, year, status, current_round, final_round, total_rounds, \
         total_applied, total_placed \
         FROM placement_tracker.drives WHERE id = $1",
    )
    .bind(drive_key)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let status: String = row.try_get("status")?;
        Ok(Drive {
            id: row.try_get("id")?,
            company_name: row.try_get("company_name")?,
            year: row.try_get("year")?,
            status: DriveStatus::parse(&status),
            current_round: row.try_get("current_round")?,
            final_round: row.try_get("final_round")?,
            total_rounds: row.try_get("total_rounds")?,
            total_applied: row.try_get("total_applied")?,
            total_placed: row.try_get("total_placed")?,
        })
    })
    .transpose()
}

/// Create or patch a drive document. Counter columns are owned by
/// `update_drive_totals` and never touched here.
pub async fn upsert_drive(pool: &PgPool, drive: &Drive) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO placement_tracker.drives
        (id, company_name, year, status, current_round, final_round, total_rounds)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            current_round = EXCLUDED.current_round,
            final_round = EXCLUDED.final_round,
            total_rounds = EXCLUDED.total_rounds,
            updated_at = now()
        "#,
    )
    .bind(&drive.id)
    .bind(&drive.company_name)
    .bind(drive.year)
    .bind(drive.status.as_str())
    .bind(drive.current_round)
    .bind(drive.final_round)
    .bind(drive.total_rounds)
    .execute(pool)
    .await?;
    info!(drive = %drive.id, status = drive.status.as_str(), "upserted drive");
    Ok(())
}

pub async fn insert_round(pool: &PgPool, meta: &RoundMeta) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO placement_tracker.rounds
        (id, drive_id, round_number, round_name, raw_columns, student_count, is_final)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            round_name = EXCLUDED.round_name,
            raw_columns = EXCLUDED.raw_columns,
            student_count = EXCLUDED.student_count,
            is_final = EXCLUDED.is_final
        "#,
    )
    .bind(&meta.id)
    .bind(&meta.drive_id)
    .bind(meta.round_number)
    .bind(&meta.round_name)
    .bind(Json(&meta.raw_columns))
    .bind(meta.student_count)
    .bind(meta.is_final)
    .execute(pool)
    .await?;
    info!(round = %meta.id, students = meta.student_count, "created round");
    Ok(())
}

pub async fn insert_round_rows(
    pool: &PgPool,
    records: &[RowRecord],
    batch_size: usize,
) -> Result<(), sqlx::Error> {
    let mut batch = WriteBatch::new(pool, batch_size);
    for record in records {
        let conn = batch.conn().await?;
        sqlx::query(
            r#"
            INSERT INTO placement_tracker.round_rows (id, round_id, student_id, row_data, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                row_data = EXCLUDED.row_data,
                status = EXCLUDED.status
            "#,
        )
        .bind(&record.id)
        .bind(&record.round_id)
        .bind(&record.student_id)
        .bind(Json(&record.row_data))
        .bind(record.status.as_str())
        .execute(conn)
        .await?;
        batch.mark_written().await?;
    }
    batch.finish().await
}

pub async fn fetch_round_student_ids(
    pool: &PgPool,
    round_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT student_id FROM placement_tracker.round_rows WHERE round_id = $1",
    )
    .bind(round_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(|row| row.try_get("student_id")).collect()
}

/// Mark students eliminated from a drive. A student absent from the
/// registry cannot be marked and is skipped with a warning; the round they
/// reached stays at the last round they attended.
pub async fn mark_eliminated(
    pool: &PgPool,
    student_ids: &[String],
    drive_key: &str,
    batch_size: usize,
) -> Result<usize, sqlx::Error> {
    let mut batch = WriteBatch::new(pool, batch_size);
    let mut marked = 0usize;

    for student_id in student_ids {
        let Some(mut student) = get_student(pool, student_id).await? else {
            warn!(student = %student_id, "student not found, skipping elimination marking");
            continue;
        };
        if !students::mark_eliminated(&mut student, drive_key) {
            warn!(student = %student_id, %drive_key, "no standing for drive, skipping elimination marking");
            continue;
        }

        let conn = batch.conn().await?;
        sqlx::query(
            "UPDATE placement_tracker.students \
             SET company_status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(student_id)
        .bind(Json(&student.company_status))
        .execute(conn)
        .await?;
        batch.mark_written().await?;
        marked += 1;
    }

    batch.finish().await?;
    if marked > 0 {
        info!(marked, %drive_key, "marked students as not_selected");
    }
    Ok(marked)
}

/// Snapshot qualified rows into the drive's placements collection.
/// Placement records are written once and never updated.
pub async fn insert_placements(
    pool: &PgPool,
    drive_key: &str,
    records: &[RowRecord],
    batch_size: usize,
) -> Result<(), sqlx::Error> {
    let mut batch = WriteBatch::new(pool, batch_size);
    for record in records {
        let conn = batch.conn().await?;
        sqlx::query(
            r#"
            INSERT INTO placement_tracker.placements (drive_id, student_id, row_data)
            VALUES ($1, $2, $3)
            ON CONFLICT (drive_id, student_id) DO NOTHING
            "#,
        )
        .bind(drive_key)
        .bind(&record.student_id)
        .bind(Json(&record.row_data))
        .execute(conn)
        .await?;
        batch.mark_written().await?;
    }
    batch.finish().await
}

/// Persist merged student documents. Each student appears at most once per
/// upload and batches commit in sequence, so no document can be written in
/// two batches out of order.
pub async fn save_students(
    pool: &PgPool,
    merged: &[&Student],
    batch_size: usize,
) -> Result<(), sqlx::Error> {
    let mut batch = WriteBatch::new(pool, batch_size);
    for student in merged {
        let conn = batch.conn().await?;
        sqlx::query(
            r#"
            INSERT INTO placement_tracker.students
            (id, roll_number, name, email, company_status, selected_companies,
             current_status, total_offers, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (id) DO UPDATE SET
                roll_number = EXCLUDED.roll_number,
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                company_status = EXCLUDED.company_status,
                selected_companies = EXCLUDED.selected_companies,
                current_status = EXCLUDED.current_status,
                total_offers = EXCLUDED.total_offers,
                updated_at = now()
            "#,
        )
        .bind(&student.id)
        .bind(&student.roll_number)
        .bind(&student.name)
        .bind(&student.email)
        .bind(Json(&student.company_status))
        .bind(Json(&student.selected_companies))
        .bind(student.current_status.as_str())
        .bind(student.total_offers)
        .execute(conn)
        .await?;
        batch.mark_written().await?;
    }
    batch.finish().await
}

/// Apply a drive's counter changes for one round. `total_applied` is set
/// only when the update carries a value (round 1); `total_placed` is an
/// increment so concurrent drives cannot clobber each other.
pub async fn update_drive_totals(
    pool: &PgPool,
    drive_key: &str,
    update: &crate::stats::DriveTotalsUpdate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE placement_tracker.drives SET
            total_applied = COALESCE($2, total_applied),
            total_placed = total_placed + $3,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(drive_key)
    .bind(update.set_total_applied)
    .bind(update.placed_delta)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_year(pool: &PgPool, year: i32) -> Result<Option<YearDoc>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT year, total_companies, completed_companies, running_companies, total_placed, \
         total_students_participated, company_wise \
         FROM placement_tracker.years WHERE year = $1",
    )
    .bind(year)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let company_wise: Json<BTreeMap<String, CompanyYearEntry>> =
            row.try_get("company_wise")?;
        Ok(YearDoc {
            year: row.try_get("year")?,
            total_companies: row.try_get("total_companies")?,
            completed_companies: row.try_get("completed_companies")?,
            running_companies: row.try_get("running_companies")?,
            total_placed: row.try_get("total_placed")?,
            total_students_participated: row.try_get("total_students_participated")?,
            company_wise: company_wise.0,
        })
    })
    .transpose()
}

pub async fn save_year(pool: &PgPool, doc: &YearDoc) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO placement_tracker.years
        (year, total_companies, completed_companies, running_companies, total_placed,
         total_students_participated, company_wise)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (year) DO UPDATE SET
            total_companies = EXCLUDED.total_companies,
            completed_companies = EXCLUDED.completed_companies,
            running_companies = EXCLUDED.running_companies,
            total_placed = EXCLUDED.total_placed,
            total_students_participated = EXCLUDED.total_students_participated,
            company_wise = EXCLUDED.company_wise
        "#,
    )
    .bind(doc.year)
    .bind(doc.total_companies)
    .bind(doc.completed_companies)
    .bind(doc.running_companies)
    .bind(doc.total_placed)
    .bind(doc.total_students_participated)
    .bind(Json(&doc.company_wise))
    .execute(pool)
    .await?;
    info!(year = doc.year, "updated yearly analytics");
    Ok(())
}
