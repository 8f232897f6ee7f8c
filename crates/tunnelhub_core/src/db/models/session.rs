use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, query_scalar, Error as SqlxError, FromRow, SqliteExecutor, Type};
use tunnelhub_common::db::{Id, NoId};

use super::Protocol;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connected,
    Disconnected,
    Failed,
}

/// One client attachment to a relay server, from admission to disconnection.
/// Status only ever moves forward; once `disconnected` the byte counters and
/// duration are frozen.
#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
pub struct Session<I = NoId> {
    pub id: I,
    pub user_id: Id,
    // kept nullable so connection history survives server removal
    pub server_id: Option<Id>,
    pub protocol: Protocol,
    pub device_info: Option<String>,
    pub uploaded: i64,
    pub downloaded: i64,
    pub status: SessionStatus,
    pub disconnect_reason: Option<String>,
    pub connected_at: NaiveDateTime,
    pub disconnected_at: Option<NaiveDateTime>,
    pub duration_seconds: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn new(
        user_id: Id,
        server_id: Option<Id>,
        protocol: Protocol,
        device_info: Option<String>,
    ) -> Self {
        Self {
            id: NoId,
            user_id,
            server_id,
            protocol,
            device_info,
            uploaded: 0,
            downloaded: 0,
            status: SessionStatus::Connected,
            disconnect_reason: None,
            connected_at: Utc::now().naive_utc(),
            disconnected_at: None,
            duration_seconds: None,
        }
    }

    pub async fn save<'e, E>(self, executor: E) -> Result<Session<Id>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let id = query_scalar(
            "INSERT INTO session (user_id, server_id, protocol, device_info, uploaded, \
            downloaded, status, disconnect_reason, connected_at, disconnected_at, \
            duration_seconds) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(self.user_id)
        .bind(self.server_id)
        .bind(self.protocol)
        .bind(&self.device_info)
        .bind(self.uploaded)
        .bind(self.downloaded)
        .bind(self.status)
        .bind(&self.disconnect_reason)
        .bind(self.connected_at)
        .bind(self.disconnected_at)
        .bind(self.duration_seconds)
        .fetch_one(executor)
        .await?;
        Ok(Session::<Id> {
            id,
            user_id: self.user_id,
            server_id: self.server_id,
            protocol: self.protocol,
            device_info: self.device_info,
            uploaded: self.uploaded,
            downloaded: self.downloaded,
            status: self.status,
            disconnect_reason: self.disconnect_reason,
            connected_at: self.connected_at,
            disconnected_at: self.disconnected_at,
            duration_seconds: self.duration_seconds,
        })
    }
}

impl Session<Id> {
    pub async fn find_by_id<'e, E>(executor: E, id: Id) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, user_id, server_id, protocol, device_info, uploaded, downloaded, status, \
            disconnect_reason, connected_at, disconnected_at, duration_seconds \
            FROM session WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_id_and_user<'e, E>(
        executor: E,
        id: Id,
        user_id: Id,
    ) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, user_id, server_id, protocol, device_info, uploaded, downloaded, status, \
            disconnect_reason, connected_at, disconnected_at, duration_seconds \
            FROM session WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn count_connected_for_user<'e, E>(executor: E, user_id: Id) -> Result<i64, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_scalar("SELECT count(*) FROM session WHERE user_id = ? AND status = ?")
            .bind(user_id)
            .bind(SessionStatus::Connected)
            .fetch_one(executor)
            .await
    }

    pub async fn all_connected_for_user<'e, E>(
        executor: E,
        user_id: Id,
    ) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, user_id, server_id, protocol, device_info, uploaded, downloaded, status, \
            disconnect_reason, connected_at, disconnected_at, duration_seconds \
            FROM session WHERE user_id = ? AND status = ? ORDER BY connected_at",
        )
        .bind(user_id)
        .bind(SessionStatus::Connected)
        .fetch_all(executor)
        .await
    }

    pub async fn all_for_user<'e, E>(
        executor: E,
        user_id: Id,
        limit: i64,
    ) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, user_id, server_id, protocol, device_info, uploaded, downloaded, status, \
            disconnect_reason, connected_at, disconnected_at, duration_seconds \
            FROM session WHERE user_id = ? ORDER BY connected_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Guarded `connected -> disconnected` transition. Only one caller can win
    /// the guard; everyone else sees `false` and must not apply side effects
    /// (counter release, usage roll-up) again.
    pub(crate) async fn try_finalize<'e, E>(
        executor: E,
        id: Id,
        uploaded: i64,
        downloaded: i64,
        reason: Option<&str>,
        disconnected_at: NaiveDateTime,
        duration_seconds: i64,
    ) -> Result<bool, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = query(
            "UPDATE session SET status = ?, uploaded = ?, downloaded = ?, disconnect_reason = ?, \
            disconnected_at = ?, duration_seconds = ? WHERE id = ? AND status = ?",
        )
        .bind(SessionStatus::Disconnected)
        .bind(uploaded)
        .bind(downloaded)
        .bind(reason)
        .bind(disconnected_at)
        .bind(duration_seconds)
        .bind(id)
        .bind(SessionStatus::Connected)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }
}

/// Live connection listing for the admin panel.
#[derive(Clone, Debug, FromRow, Serialize)]
pub struct LiveSessionInfo {
    pub id: Id,
    pub user_id: Id,
    pub username: String,
    pub server_id: Option<Id>,
    pub server_name: Option<String>,
    pub server_country: Option<String>,
    pub protocol: Protocol,
    pub device_info: Option<String>,
    pub connected_at: NaiveDateTime,
}

impl LiveSessionInfo {
    pub async fn all_connected<'e, E>(executor: E) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT s.id, s.user_id, u.username, s.server_id, r.name server_name, \
            r.country_code server_country, s.protocol, s.device_info, s.connected_at \
            FROM session s \
            JOIN \"user\" u ON s.user_id = u.id \
            LEFT JOIN relay_server r ON s.server_id = r.id \
            WHERE s.status = ? ORDER BY s.connected_at DESC",
        )
        .bind(SessionStatus::Connected)
        .fetch_all(executor)
        .await
    }
}
