use sqlx::{Error as SqlxError, QueryBuilder, Sqlite, SqliteExecutor};

use crate::{
    db::{Id, Protocol, RelayServer, User},
    error::WebError,
};

const SERVER_COLUMNS: &str = "id, name, host, port, ssh_port, ssl_port, udp_port, protocol, \
    country, country_code, city, username, password, sni_host, ssl_payload, is_active, \
    is_premium, max_users, current_users, current_load, latency_ms, bandwidth_mbps, created_at, \
    updated_at";

/// Relay servers the account may be admitted to right now, best candidate
/// first: active, with free capacity, premium tier permitting, protocol
/// matching when a filter is given. Ordered by load, then latency (unknown
/// latency sorts last), then id so equally loaded servers rank the same way
/// on every call.
pub async fn eligible_candidates<'e, E>(
    executor: E,
    user: &User<Id>,
    protocol: Option<Protocol>,
) -> Result<Vec<RelayServer<Id>>, SqlxError>
where
    E: SqliteExecutor<'e>,
{
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {SERVER_COLUMNS} FROM relay_server \
        WHERE is_active = TRUE AND current_users < max_users"
    ));
    if !user.role.has_premium_access() {
        query.push(" AND is_premium = FALSE");
    }
    if let Some(protocol) = protocol {
        query.push(" AND protocol = ");
        query.push_bind(protocol);
    }
    query.push(" ORDER BY current_load, latency_ms IS NULL, latency_ms, id");
    query.build_query_as().fetch_all(executor).await
}

/// Pick the single best relay for the account. This reads a snapshot and does
/// not reserve capacity; admission re-validates under the row lock and may
/// still lose the slot to a concurrent connect.
pub async fn select_best_server<'e, E>(
    executor: E,
    user: &User<Id>,
    protocol: Option<Protocol>,
) -> Result<RelayServer<Id>, WebError>
where
    E: SqliteExecutor<'e>,
{
    eligible_candidates(executor, user, protocol)
        .await?
        .into_iter()
        .next()
        .ok_or(WebError::NoAvailableServer)
}

/// Servers the account is allowed to see, without the capacity cut. Used for
/// the server browser rather than automatic selection.
pub async fn list_eligible_servers<'e, E>(
    executor: E,
    user: &User<Id>,
    country: Option<&str>,
    protocol: Option<Protocol>,
) -> Result<Vec<RelayServer<Id>>, SqlxError>
where
    E: SqliteExecutor<'e>,
{
    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {SERVER_COLUMNS} FROM relay_server WHERE is_active = TRUE"
    ));
    if !user.role.has_premium_access() {
        query.push(" AND is_premium = FALSE");
    }
    if let Some(country) = country {
        query.push(" AND country_code = ");
        query.push_bind(country.to_owned());
    }
    if let Some(protocol) = protocol {
        query.push(" AND protocol = ");
        query.push_bind(protocol);
    }
    query.push(" ORDER BY country, name");
    query.build_query_as().fetch_all(executor).await
}
