use std::fmt;

use chrono::{NaiveDateTime, Utc};
use sqlx::{query, query_as, query_scalar, Error as SqlxError, FromRow, SqliteExecutor};
use tunnelhub_common::db::{Id, NoId};

use super::Protocol;

/// A relay endpoint of the fleet. `current_users` and `current_load` are live
/// occupancy counters owned by the connection tracker; nothing else may write
/// them (see `try_reserve_slot` / `release_slot`).
#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
pub struct RelayServer<I = NoId> {
    pub id: I,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub ssh_port: Option<i64>,
    pub ssl_port: Option<i64>,
    pub udp_port: Option<i64>,
    pub protocol: Protocol,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    #[serde(skip_serializing)]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub sni_host: Option<String>,
    #[serde(skip_serializing)]
    pub ssl_payload: Option<String>,
    pub is_active: bool,
    pub is_premium: bool,
    pub max_users: i64,
    pub current_users: i64,
    pub current_load: f64,
    pub latency_ms: Option<i64>,
    pub bandwidth_mbps: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl fmt::Display for RelayServer<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ID {}] {} ({})", self.id, self.name, self.host)
    }
}

impl RelayServer {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, host: S, port: i64, protocol: Protocol) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: NoId,
            name: name.into(),
            host: host.into(),
            port,
            ssh_port: None,
            ssl_port: None,
            udp_port: None,
            protocol,
            country: None,
            country_code: None,
            city: None,
            username: None,
            password: None,
            sni_host: None,
            ssl_payload: None,
            is_active: true,
            is_premium: false,
            max_users: 100,
            current_users: 0,
            current_load: 0.0,
            latency_ms: None,
            bandwidth_mbps: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn save<'e, E>(self, executor: E) -> Result<RelayServer<Id>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let id = query_scalar(
            "INSERT INTO relay_server (name, host, port, ssh_port, ssl_port, udp_port, protocol, \
            country, country_code, city, username, password, sni_host, ssl_payload, is_active, \
            is_premium, max_users, current_users, current_load, latency_ms, bandwidth_mbps, \
            created_at, updated_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
            RETURNING id",
        )
        .bind(&self.name)
        .bind(&self.host)
        .bind(self.port)
        .bind(self.ssh_port)
        .bind(self.ssl_port)
        .bind(self.udp_port)
        .bind(self.protocol)
        .bind(&self.country)
        .bind(&self.country_code)
        .bind(&self.city)
        .bind(&self.username)
        .bind(&self.password)
        .bind(&self.sni_host)
        .bind(&self.ssl_payload)
        .bind(self.is_active)
        .bind(self.is_premium)
        .bind(self.max_users)
        .bind(self.current_users)
        .bind(self.current_load)
        .bind(self.latency_ms)
        .bind(self.bandwidth_mbps)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(RelayServer::<Id> {
            id,
            name: self.name,
            host: self.host,
            port: self.port,
            ssh_port: self.ssh_port,
            ssl_port: self.ssl_port,
            udp_port: self.udp_port,
            protocol: self.protocol,
            country: self.country,
            country_code: self.country_code,
            city: self.city,
            username: self.username,
            password: self.password,
            sni_host: self.sni_host,
            ssl_payload: self.ssl_payload,
            is_active: self.is_active,
            is_premium: self.is_premium,
            max_users: self.max_users,
            current_users: self.current_users,
            current_load: self.current_load,
            latency_ms: self.latency_ms,
            bandwidth_mbps: self.bandwidth_mbps,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl RelayServer<Id> {
    pub async fn find_by_id<'e, E>(executor: E, id: Id) -> Result<Option<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, name, host, port, ssh_port, ssl_port, udp_port, protocol, country, \
            country_code, city, username, password, sni_host, ssl_payload, is_active, is_premium, \
            max_users, current_users, current_load, latency_ms, bandwidth_mbps, created_at, \
            updated_at FROM relay_server WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, name, host, port, ssh_port, ssl_port, udp_port, protocol, country, \
            country_code, city, username, password, sni_host, ssl_payload, is_active, is_premium, \
            max_users, current_users, current_load, latency_ms, bandwidth_mbps, created_at, \
            updated_at FROM relay_server ORDER BY country, name",
        )
        .fetch_all(executor)
        .await
    }

    /// Persist editable fields. Occupancy counters are deliberately excluded;
    /// they change only through `try_reserve_slot` / `release_slot`.
    pub async fn save<'e, E>(&self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "UPDATE relay_server SET name = ?, host = ?, port = ?, ssh_port = ?, ssl_port = ?, \
            udp_port = ?, protocol = ?, country = ?, country_code = ?, city = ?, username = ?, \
            password = ?, sni_host = ?, ssl_payload = ?, is_active = ?, is_premium = ?, \
            max_users = ?, latency_ms = ?, bandwidth_mbps = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&self.name)
        .bind(&self.host)
        .bind(self.port)
        .bind(self.ssh_port)
        .bind(self.ssl_port)
        .bind(self.udp_port)
        .bind(self.protocol)
        .bind(&self.country)
        .bind(&self.country_code)
        .bind(&self.city)
        .bind(&self.username)
        .bind(&self.password)
        .bind(&self.sni_host)
        .bind(&self.ssl_payload)
        .bind(self.is_active)
        .bind(self.is_premium)
        .bind(self.max_users)
        .bind(self.latency_ms)
        .bind(self.bandwidth_mbps)
        .bind(Utc::now().naive_utc())
        .bind(self.id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete<'e, E>(self, executor: E) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query("DELETE FROM relay_server WHERE id = ?")
            .bind(self.id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Claim one capacity slot. The capacity check runs inside the UPDATE so a
    /// stale selector snapshot can never push `current_users` past `max_users`;
    /// a `false` return means the server filled up (or went inactive) since the
    /// caller looked at it.
    pub(crate) async fn try_reserve_slot<'e, E>(executor: E, id: Id) -> Result<bool, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = query(
            "UPDATE relay_server SET current_users = current_users + 1, \
            current_load = 100.0 * (current_users + 1) / max_users \
            WHERE id = ? AND is_active = TRUE AND current_users < max_users",
        )
        .bind(id)
        .execute(executor)
        .await?
        .rows_affected();
        Ok(rows == 1)
    }

    /// Give a capacity slot back, never dropping below zero.
    pub(crate) async fn release_slot<'e, E>(executor: E, id: Id) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "UPDATE relay_server SET current_users = MAX(current_users - 1, 0), \
            current_load = 100.0 * MAX(current_users - 1, 0) / max_users \
            WHERE id = ?",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Number of sessions currently connected to this server.
    pub async fn connected_session_count<'e, E>(&self, executor: E) -> Result<i64, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_scalar("SELECT count(*) FROM session WHERE server_id = ? AND status = ?")
            .bind(self.id)
            .bind(super::session::SessionStatus::Connected)
            .fetch_one(executor)
            .await
    }
}
