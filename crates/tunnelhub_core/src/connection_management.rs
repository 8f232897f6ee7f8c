use chrono::Utc;
use tunnelhub_common::db::{DbPool, Id};

use crate::{
    db::{Protocol, RelayServer, Session, SessionStatus, User},
    error::WebError,
    server_selection::eligible_candidates,
    usage_aggregation,
};

pub const ADMIN_DISCONNECT_REASON: &str = "administrative";

#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionRequest {
    pub server_id: Option<Id>,
    pub protocol: Protocol,
    pub device_info: Option<String>,
}

/// Admit a new connection for `user`.
///
/// All policy checks and counter mutations run inside a single transaction, so
/// a rejected request leaves no trace and a crash cannot strand a reserved
/// capacity slot without its session row. When no explicit server is given the
/// selector snapshot is only a hint; each candidate is claimed with a guarded
/// capacity update and admission falls through to the next candidate if a
/// concurrent connect takes the last slot first.
pub async fn admit_connection(
    pool: &DbPool,
    user_id: Id,
    request: &ConnectionRequest,
) -> Result<Session<Id>, WebError> {
    debug!("Admitting connection for user ID {user_id}: {request:?}");
    let mut transaction = pool.begin().await?;

    // work on a fresh account row; the extractor snapshot may be stale
    let account = User::find_by_id(&mut *transaction, user_id)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("User {user_id} not found")))?;

    let server = match request.server_id {
        Some(server_id) => {
            let server = RelayServer::find_by_id(&mut *transaction, server_id)
                .await?
                .filter(|server| server.is_active)
                .ok_or_else(|| {
                    WebError::ObjectNotFound(format!(
                        "Relay server {server_id} not found or unavailable"
                    ))
                })?;
            if server.is_premium && !account.role.has_premium_access() {
                return Err(WebError::Forbidden(
                    "Premium relay requires a premium subscription".into(),
                ));
            }
            check_account_limits(&mut transaction, &account).await?;
            if !RelayServer::try_reserve_slot(&mut *transaction, server.id).await? {
                debug!("Relay server {server} filled up during admission");
                return Err(WebError::NoAvailableServer);
            }
            server
        }
        None => {
            check_account_limits(&mut transaction, &account).await?;
            let candidates =
                eligible_candidates(&mut *transaction, &account, Some(request.protocol)).await?;
            let mut selected = None;
            for candidate in candidates {
                if RelayServer::try_reserve_slot(&mut *transaction, candidate.id).await? {
                    selected = Some(candidate);
                    break;
                }
                debug!("Relay server {candidate} filled up during admission, trying next");
            }
            selected.ok_or(WebError::NoAvailableServer)?
        }
    };

    let session = Session::new(
        account.id,
        Some(server.id),
        request.protocol,
        request.device_info.clone(),
    )
    .save(&mut *transaction)
    .await?;
    User::touch_last_connection(&mut *transaction, account.id, session.connected_at).await?;

    transaction.commit().await?;
    info!(
        "User {} connected to relay server {server} (session {})",
        account.username, session.id
    );
    Ok(session)
}

async fn check_account_limits(
    transaction: &mut sqlx::SqliteConnection,
    account: &User<Id>,
) -> Result<(), WebError> {
    let connected = Session::count_connected_for_user(&mut *transaction, account.id).await?;
    if connected >= account.max_devices {
        return Err(WebError::Forbidden(format!(
            "Maximum {} simultaneous connections allowed",
            account.max_devices
        )));
    }
    if account.quota_exceeded() {
        return Err(WebError::Forbidden("Data limit exceeded".into()));
    }
    Ok(())
}

/// Finalize a connection with the transfer totals reported by the client.
///
/// The status transition is guarded, so when a finalize races an
/// administrative disconnect only one of them applies the side effects; the
/// loser gets the already-finalized row back as a successful no-op.
pub async fn finalize_connection(
    pool: &DbPool,
    user_id: Id,
    session_id: Id,
    uploaded: i64,
    downloaded: i64,
) -> Result<Session<Id>, WebError> {
    debug!("Finalizing session {session_id} for user ID {user_id}");
    let mut transaction = pool.begin().await?;

    let session = Session::find_by_id_and_user(&mut *transaction, session_id, user_id)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("Connection {session_id} not found")))?;
    if session.status != SessionStatus::Connected {
        debug!("Session {session_id} is already finalized");
        transaction.commit().await?;
        return Ok(session);
    }

    let now = Utc::now().naive_utc();
    let duration_seconds = (now - session.connected_at).num_seconds().max(0);
    let won_transition = Session::try_finalize(
        &mut *transaction,
        session.id,
        uploaded,
        downloaded,
        None,
        now,
        duration_seconds,
    )
    .await?;
    if !won_transition {
        let session = Session::find_by_id(&mut *transaction, session_id)
            .await?
            .ok_or_else(|| WebError::ObjectNotFound(format!("Connection {session_id} not found")))?;
        transaction.commit().await?;
        return Ok(session);
    }

    if let Some(server_id) = session.server_id {
        RelayServer::release_slot(&mut *transaction, server_id).await?;
    }

    let session = Session {
        uploaded,
        downloaded,
        status: SessionStatus::Disconnected,
        disconnected_at: Some(now),
        duration_seconds: Some(duration_seconds),
        ..session
    };
    usage_aggregation::record_session(&mut transaction, &session).await?;

    transaction.commit().await?;
    info!(
        "User ID {user_id} disconnected session {} ({} up / {} down, {}s)",
        session.id, uploaded, downloaded, duration_seconds
    );
    Ok(session)
}

/// Administrative disconnect of every live connection of an account. Clients
/// never report transfer totals here, so sessions are rolled up with zero byte
/// deltas; connection counts and durations are still recorded. Returns the
/// number of sessions affected.
pub async fn force_disconnect_account(pool: &DbPool, user_id: Id) -> Result<usize, WebError> {
    debug!("Force-disconnecting all sessions of user ID {user_id}");
    let mut transaction = pool.begin().await?;

    let sessions = Session::all_connected_for_user(&mut *transaction, user_id).await?;
    let now = Utc::now().naive_utc();
    let mut affected = 0;
    for session in sessions {
        let duration_seconds = (now - session.connected_at).num_seconds().max(0);
        let won_transition = Session::try_finalize(
            &mut *transaction,
            session.id,
            0,
            0,
            Some(ADMIN_DISCONNECT_REASON),
            now,
            duration_seconds,
        )
        .await?;
        if !won_transition {
            continue;
        }
        if let Some(server_id) = session.server_id {
            RelayServer::release_slot(&mut *transaction, server_id).await?;
        }
        let session = Session {
            uploaded: 0,
            downloaded: 0,
            status: SessionStatus::Disconnected,
            disconnect_reason: Some(ADMIN_DISCONNECT_REASON.into()),
            disconnected_at: Some(now),
            duration_seconds: Some(duration_seconds),
            ..session
        };
        usage_aggregation::record_session(&mut transaction, &session).await?;
        affected += 1;
    }

    transaction.commit().await?;
    info!("Force-disconnected {affected} sessions of user ID {user_id}");
    Ok(affected)
}
