use chrono::NaiveDate;
use sqlx::{query, query_as, Error as SqlxError, FromRow, SqliteExecutor};
use tunnelhub_common::db::{Id, NoId};

use super::Protocol;

/// Daily per-protocol transfer aggregate for one account. Unique per
/// (user, date, protocol); rolled forward in place as sessions finish.
#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
pub struct DailyUsage<I = NoId> {
    pub id: I,
    pub user_id: Id,
    pub date: NaiveDate,
    pub protocol: Protocol,
    pub uploaded: i64,
    pub downloaded: i64,
    pub connection_count: i64,
    pub connected_seconds: i64,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_uploaded: i64,
    pub total_downloaded: i64,
    pub total_connections: i64,
    pub total_time_seconds: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

impl DailyUsage<Id> {
    /// Fold one finished session into the matching daily row, creating it on
    /// first use of the (user, date, protocol) key.
    pub(crate) async fn upsert<'e, E>(
        executor: E,
        user_id: Id,
        date: NaiveDate,
        protocol: Protocol,
        uploaded: i64,
        downloaded: i64,
        connected_seconds: i64,
    ) -> Result<(), SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "INSERT INTO daily_usage (user_id, date, protocol, uploaded, downloaded, \
            connection_count, connected_seconds) VALUES (?, ?, ?, ?, ?, 1, ?) \
            ON CONFLICT (user_id, date, protocol) DO UPDATE SET \
            uploaded = uploaded + excluded.uploaded, \
            downloaded = downloaded + excluded.downloaded, \
            connection_count = connection_count + 1, \
            connected_seconds = connected_seconds + excluded.connected_seconds",
        )
        .bind(user_id)
        .bind(date)
        .bind(protocol)
        .bind(uploaded)
        .bind(downloaded)
        .bind(connected_seconds)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Daily rows for an account since `start`, newest first.
    pub async fn all_for_user_since<'e, E>(
        executor: E,
        user_id: Id,
        start: NaiveDate,
    ) -> Result<Vec<Self>, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT id, user_id, date, protocol, uploaded, downloaded, connection_count, \
            connected_seconds FROM daily_usage WHERE user_id = ? AND date >= ? \
            ORDER BY date DESC",
        )
        .bind(user_id)
        .bind(start)
        .fetch_all(executor)
        .await
    }

    /// Aggregate over all protocols for an account between `start` and `end`
    /// inclusive. Always equals the sum of the corresponding daily rows.
    pub async fn summary_for_user<'e, E>(
        executor: E,
        user_id: Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<UsageSummary, SqlxError>
    where
        E: SqliteExecutor<'e>,
    {
        let (uploaded, downloaded, connections, seconds): (i64, i64, i64, i64) = query_as(
            "SELECT COALESCE(SUM(uploaded), 0), COALESCE(SUM(downloaded), 0), \
            COALESCE(SUM(connection_count), 0), COALESCE(SUM(connected_seconds), 0) \
            FROM daily_usage WHERE user_id = ? AND date >= ? AND date <= ?",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(executor)
        .await?;
        Ok(UsageSummary {
            total_uploaded: uploaded,
            total_downloaded: downloaded,
            total_connections: connections,
            total_time_seconds: seconds,
            period_start: start,
            period_end: end,
        })
    }
}
