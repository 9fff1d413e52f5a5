use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::Result;
use crate::features::{FeatureVector, GradeLabel};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentRecord {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub features: FeatureVector,
    pub predicted_grade: GradeLabel,
    pub created_at: DateTime<Utc>,
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    attendance REAL NOT NULL,
    marks REAL NOT NULL,
    assignments REAL NOT NULL,
    study_hours REAL NOT NULL,
    extracurriculars REAL NOT NULL,
    predicted_grade TEXT NOT NULL CHECK (predicted_grade IN ('A','B','C','D')),
    created_at DATETIME NOT NULL
)
"#;

const INSERT_SQL: &str = "INSERT INTO students \
                          (name, attendance, marks, assignments, study_hours, extracurriculars, \
                          predicted_grade, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_COLUMNS: &str = "SELECT id, name, attendance, marks, assignments, study_hours, \
                              extracurriculars, predicted_grade, created_at FROM students";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and creates the schema if needed. An in-memory URL gets a single connection,
    /// since every SQLite memory connection is its own database.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(url).await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        tracing::info!("Database ready at {}", url);

        Ok(Database { pool })
    }

    pub async fn add_student(
        &self,
        name: &str,
        features: &FeatureVector,
        grade: GradeLabel,
    ) -> Result<i64> {
        let result = sqlx::query(INSERT_SQL)
            .bind(name)
            .bind(features.attendance)
            .bind(features.marks)
            .bind(features.assignments)
            .bind(features.study_hours)
            .bind(features.extracurriculars)
            .bind(grade.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Inserts every row in one transaction: either all rows are stored or none are.
    /// Ids come back in input order.
    pub async fn add_students(
        &self,
        rows: &[(String, FeatureVector, GradeLabel)],
    ) -> Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for (name, features, grade) in rows {
            let result = sqlx::query(INSERT_SQL)
                .bind(name.as_str())
                .bind(features.attendance)
                .bind(features.marks)
                .bind(features.assignments)
                .bind(features.study_hours)
                .bind(features.extracurriculars)
                .bind(grade.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Returns false when no record has this id.
    pub async fn update_student(
        &self,
        id: i64,
        name: &str,
        features: &FeatureVector,
        grade: GradeLabel,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET name = ?, attendance = ?, marks = ?, assignments = ?, study_hours = ?,
                extracurriculars = ?, predicted_grade = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(features.attendance)
        .bind(features.marks)
        .bind(features.assignments)
        .bind(features.study_hours)
        .bind(features.extracurriculars)
        .bind(grade.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_student(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_student(&self, id: i64) -> Result<Option<StudentRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Newest first.
    pub async fn get_all_students(&self) -> Result<Vec<StudentRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY id DESC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Newest first.
    pub async fn get_students_by_name(&self, name: &str) -> Result<Vec<StudentRecord>> {
        let rows = sqlx::query(&format!("{} WHERE name = ? ORDER BY id DESC", SELECT_COLUMNS))
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<StudentRecord> {
    let grade: String = row.try_get("predicted_grade")?;

    Ok(StudentRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        features: FeatureVector {
            attendance: row.try_get("attendance")?,
            marks: row.try_get("marks")?,
            assignments: row.try_get("assignments")?,
            study_hours: row.try_get("study_hours")?,
            extracurriculars: row.try_get("extracurriculars")?,
        },
        predicted_grade: grade.parse()?,
        created_at: row.try_get("created_at")?,
    })
}
