//! Database repository for CRUD operations.
//!
//! Every client query is scoped by coach id.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    ClientMetric, ClientRecord, ClientStatus, Coach, CreateClientRequest, CreateCoachRequest,
    CurrentUser, LastWorkout, SessionProgress, UpdateClientRequest, Watermark,
};

/// Columns written on insert. `seq` is assigned by SQLite.
const CLIENT_COLUMNS: &str = "id, coach_id, name, email, phone, status, goal, program, \
     initials, bg_color, text_color, sessions_completed, sessions_total, completion, \
     last_workout, metrics, user_id, invite_code, notes, created_at, updated_at, version";

/// Current time truncated to the precision stored in the database.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 form, so lexicographic order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== COACH OPERATIONS ====================

    /// Register a coach and open a session for them.
    pub async fn create_coach(
        &self,
        request: &CreateCoachRequest,
    ) -> Result<(Coach, String), AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let token = uuid::Uuid::new_v4().simple().to_string();
        let created_at = format_timestamp(&now());

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO coaches (id, display_name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(&request.display_name)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO sessions (token, coach_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(&id)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((
            Coach {
                uid: id,
                display_name: request.display_name.clone(),
                created_at,
            },
            token,
        ))
    }

    /// Resolve a session token to the coach it belongs to.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<CurrentUser>, AppError> {
        let row = sqlx::query("SELECT coach_id FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| CurrentUser {
            uid: r.get("coach_id"),
        }))
    }

    // ==================== CLIENT OPERATIONS ====================

    /// List a coach's clients, newest first, with the highest commit sequence
    /// visible to the same read.
    ///
    /// Both statements run in one transaction, so they see one snapshot: any
    /// client missing from the list commits later and gets a larger `seq`.
    pub async fn list_clients(&self, coach_id: &str) -> Result<(Vec<ClientRecord>, i64), AppError> {
        let sql = format!(
            "SELECT seq, {} FROM clients WHERE coach_id = ? ORDER BY created_at DESC, seq DESC",
            CLIENT_COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(&sql)
            .bind(coach_id)
            .fetch_all(&mut *tx)
            .await?;
        let cursor: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM clients")
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((rows.iter().map(client_from_row).collect(), cursor))
    }

    /// List a coach's clients past `watermark`, newest first.
    pub async fn list_clients_for_feed(
        &self,
        coach_id: &str,
        watermark: &Watermark,
    ) -> Result<Vec<ClientRecord>, AppError> {
        let filter = match watermark {
            Watermark::After(_) => "seq > ?",
            Watermark::Since(_) => "created_at > ?",
        };
        let sql = format!(
            "SELECT seq, {} FROM clients WHERE coach_id = ? AND {} ORDER BY created_at DESC, seq DESC",
            CLIENT_COLUMNS, filter
        );

        let query = sqlx::query(&sql).bind(coach_id);
        let query = match watermark {
            Watermark::After(seq) => query.bind(*seq),
            Watermark::Since(at) => query.bind(format_timestamp(at)),
        };
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(client_from_row).collect())
    }

    /// List every client of every coach. Used to rebuild the search index.
    pub async fn list_all_clients(&self) -> Result<Vec<ClientRecord>, AppError> {
        let sql = format!("SELECT seq, {} FROM clients", CLIENT_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(client_from_row).collect())
    }

    /// Get one of a coach's clients by ID.
    pub async fn get_client(
        &self,
        coach_id: &str,
        id: &str,
    ) -> Result<Option<ClientRecord>, AppError> {
        let sql = format!(
            "SELECT seq, {} FROM clients WHERE coach_id = ? AND id = ?",
            CLIENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(coach_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(client_from_row))
    }

    /// Create a new client for a coach.
    pub async fn create_client(
        &self,
        coach_id: &str,
        request: &CreateClientRequest,
    ) -> Result<ClientRecord, AppError> {
        let mut client =
            ClientRecord::new(uuid::Uuid::new_v4().to_string(), request.name.trim(), now());
        client.coach_id = coach_id.to_string();
        client.email = request.email.clone();
        client.phone = request.phone.clone();
        client.status = request.status.unwrap_or_default();
        client.goal = request.goal.clone();
        client.program = request.program.clone();
        client.user_id = request.user_id.clone();
        client.invite_code = request.invite_code.clone();
        client.notes = request.notes.clone();

        let metrics_json = serde_json::to_string(&client.metrics)?;
        let created_at = format_timestamp(&client.created_at);

        let sql = format!(
            "INSERT INTO clients ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            CLIENT_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(&client.id)
            .bind(coach_id)
            .bind(&client.name)
            .bind(&client.email)
            .bind(&client.phone)
            .bind(client.status.as_str())
            .bind(&client.goal)
            .bind(&client.program)
            .bind(&client.initials)
            .bind(&client.bg_color)
            .bind(&client.text_color)
            .bind(client.sessions.completed as i64)
            .bind(client.sessions.total as i64)
            .bind(client.completion as i64)
            .bind(None::<String>)
            .bind(&metrics_json)
            .bind(&client.user_id)
            .bind(&client.invite_code)
            .bind(&client.notes)
            .bind(&created_at)
            .bind(&created_at)
            .bind(client.version)
            .execute(&self.pool)
            .await?;
        client.seq = result.last_insert_rowid();

        Ok(client)
    }

    /// Update a client with optimistic concurrency control.
    pub async fn update_client(
        &self,
        coach_id: &str,
        id: &str,
        request: &UpdateClientRequest,
    ) -> Result<ClientRecord, AppError> {
        let existing = self
            .get_client(coach_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Client {} not found", id)))?;

        // Check version for optimistic concurrency
        if let Some(expected) = request.expected_version {
            if existing.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, existing.version
                    ),
                    current_version: existing.version,
                });
            }
        }

        let previous_version = existing.version;
        let mut client = existing;
        if let Some(name) = &request.name {
            client.name = name.trim().to_string();
            client.refresh_display();
        }
        client.email = request.email.clone().or(client.email);
        client.phone = request.phone.clone().or(client.phone);
        client.status = request.status.unwrap_or(client.status);
        client.goal = request.goal.clone().or(client.goal);
        client.program = request.program.clone().or(client.program);
        client.sessions = request.sessions.unwrap_or(client.sessions);
        client.completion = request.completion.unwrap_or(client.completion);
        client.last_workout = request.last_workout.clone().or(client.last_workout);
        client.metrics = request.metrics.clone().unwrap_or(client.metrics);
        client.user_id = request.user_id.clone().or(client.user_id);
        client.notes = request.notes.clone().or(client.notes);
        client.updated_at = now();
        client.version = previous_version + 1;

        let last_workout_json = client
            .last_workout
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let metrics_json = serde_json::to_string(&client.metrics)?;

        // Use conditional UPDATE with version check to prevent race conditions
        let result = sqlx::query(
            r#"UPDATE clients SET
                name = ?, email = ?, phone = ?, status = ?, goal = ?, program = ?,
                initials = ?, bg_color = ?, text_color = ?,
                sessions_completed = ?, sessions_total = ?, completion = ?,
                last_workout = ?, metrics = ?, user_id = ?, notes = ?,
                updated_at = ?, version = ?
            WHERE coach_id = ? AND id = ? AND version = ?"#,
        )
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(client.status.as_str())
        .bind(&client.goal)
        .bind(&client.program)
        .bind(&client.initials)
        .bind(&client.bg_color)
        .bind(&client.text_color)
        .bind(client.sessions.completed as i64)
        .bind(client.sessions.total as i64)
        .bind(client.completion as i64)
        .bind(&last_workout_json)
        .bind(&metrics_json)
        .bind(&client.user_id)
        .bind(&client.notes)
        .bind(format_timestamp(&client.updated_at))
        .bind(client.version)
        .bind(coach_id)
        .bind(id)
        .bind(previous_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Race condition - version changed between read and write
            let current = self.get_client(coach_id, id).await?;
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|c| c.version).unwrap_or(0),
            });
        }

        Ok(client)
    }

    /// Delete a client, returning the removed record.
    pub async fn delete_client(&self, coach_id: &str, id: &str) -> Result<ClientRecord, AppError> {
        let existing = self
            .get_client(coach_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Client {} not found", id)))?;

        let result = sqlx::query("DELETE FROM clients WHERE coach_id = ? AND id = ?")
            .bind(coach_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Client {} not found", id)));
        }

        Ok(existing)
    }
}

// Helper functions for row conversion

fn client_from_row(row: &SqliteRow) -> ClientRecord {
    let status: String = row.get("status");
    let last_workout: Option<String> = row.get("last_workout");
    let metrics: Option<String> = row.get("metrics");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let sessions_completed: i64 = row.get("sessions_completed");
    let sessions_total: i64 = row.get("sessions_total");
    let completion: i64 = row.get("completion");

    ClientRecord {
        id: row.get("id"),
        coach_id: row.get("coach_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        status: ClientStatus::parse(&status).unwrap_or_default(),
        goal: row.get("goal"),
        program: row.get("program"),
        initials: row.get("initials"),
        bg_color: row.get("bg_color"),
        text_color: row.get("text_color"),
        sessions: SessionProgress {
            completed: sessions_completed.max(0) as u32,
            total: sessions_total.max(0) as u32,
        },
        completion: completion.clamp(0, 100) as u8,
        last_workout: last_workout.and_then(|s| serde_json::from_str::<LastWorkout>(&s).ok()),
        metrics: metrics
            .and_then(|s| serde_json::from_str::<Vec<ClientMetric>>(&s).ok())
            .unwrap_or_default(),
        user_id: row.get("user_id"),
        invite_code: row.get("invite_code"),
        notes: row.get("notes"),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
        version: row.get("version"),
        seq: row.get("seq"),
    }
}
