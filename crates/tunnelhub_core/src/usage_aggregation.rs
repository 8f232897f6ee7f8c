use sqlx::{Error as SqlxError, SqliteConnection};

use crate::db::{DailyUsage, Id, Session, SessionStatus, User};

/// Roll a finalized session into the daily per-protocol aggregates and advance
/// the owning account's lifetime transfer counters.
///
/// Must only be called by the winner of the session's `connected ->
/// disconnected` transition, inside the same transaction; that guard is what
/// makes repeated disconnect requests for one session count exactly once.
pub(crate) async fn record_session(
    transaction: &mut SqliteConnection,
    session: &Session<Id>,
) -> Result<(), SqlxError> {
    debug_assert_eq!(session.status, SessionStatus::Disconnected);
    debug!(
        "Rolling up session {} for user {} ({} up / {} down)",
        session.id, session.user_id, session.uploaded, session.downloaded
    );

    DailyUsage::upsert(
        &mut *transaction,
        session.user_id,
        session.connected_at.date(),
        session.protocol,
        session.uploaded,
        session.downloaded,
        session.duration_seconds.unwrap_or(0),
    )
    .await?;

    User::add_usage(
        &mut *transaction,
        session.user_id,
        session.uploaded,
        session.downloaded,
    )
    .await?;

    Ok(())
}
