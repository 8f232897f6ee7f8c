use chrono::{TimeDelta, Utc};
use tunnelhub_common::db::{setup_pool, DbPool, Id};
use tunnelhub_core::{
    connection_management::{admit_connection, finalize_connection, ConnectionRequest},
    db::{DailyUsage, Protocol, RelayServer, User},
};

const MB: i64 = 1024 * 1024;

async fn connect_and_disconnect(
    pool: &DbPool,
    user_id: Id,
    server_id: Id,
    protocol: Protocol,
    uploaded: i64,
    downloaded: i64,
) {
    let request = ConnectionRequest {
        server_id: Some(server_id),
        protocol,
        device_info: None,
    };
    let session = admit_connection(pool, user_id, &request).await.unwrap();
    finalize_connection(pool, user_id, session.id, uploaded, downloaded)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_daily_rows_are_keyed_by_protocol() {
    let pool = setup_pool().await;
    let mut user = User::new("scott", Some("pass123"), None);
    user.max_devices = 5;
    let user = user.save(&pool).await.unwrap();
    let server = RelayServer::new("relay-1", "relay.example.com", 443, Protocol::SshSsl)
        .save(&pool)
        .await
        .unwrap();

    connect_and_disconnect(&pool, user.id, server.id, Protocol::SshSsl, MB, 2 * MB).await;
    connect_and_disconnect(&pool, user.id, server.id, Protocol::SshSsl, 3 * MB, MB).await;
    connect_and_disconnect(&pool, user.id, server.id, Protocol::Wireguard, 5 * MB, 0).await;

    let start = Utc::now().date_naive() - TimeDelta::days(1);
    let rows = DailyUsage::all_for_user_since(&pool, user.id, start).await.unwrap();
    assert_eq!(rows.len(), 2, "one row per (date, protocol) pair");

    let ssh = rows.iter().find(|r| r.protocol == Protocol::SshSsl).unwrap();
    assert_eq!(ssh.uploaded, 4 * MB);
    assert_eq!(ssh.downloaded, 3 * MB);
    assert_eq!(ssh.connection_count, 2);

    let wireguard = rows.iter().find(|r| r.protocol == Protocol::Wireguard).unwrap();
    assert_eq!(wireguard.uploaded, 5 * MB);
    assert_eq!(wireguard.connection_count, 1);
}

#[tokio::test]
async fn test_summary_equals_sum_of_daily_rows() {
    let pool = setup_pool().await;
    let mut user = User::new("scott", Some("pass123"), None);
    user.max_devices = 5;
    let user = user.save(&pool).await.unwrap();
    let server = RelayServer::new("relay-1", "relay.example.com", 443, Protocol::SshSsl)
        .save(&pool)
        .await
        .unwrap();

    for (protocol, uploaded, downloaded) in [
        (Protocol::SshSsl, 10 * MB, 20 * MB),
        (Protocol::Wireguard, 7 * MB, MB),
        (Protocol::Trojan, 0, 42 * MB),
    ] {
        connect_and_disconnect(&pool, user.id, server.id, protocol, uploaded, downloaded).await;
    }

    let end = Utc::now().date_naive();
    let start = end - TimeDelta::days(30);
    let summary = DailyUsage::summary_for_user(&pool, user.id, start, end)
        .await
        .unwrap();
    let rows = DailyUsage::all_for_user_since(&pool, user.id, start).await.unwrap();

    assert_eq!(
        summary.total_uploaded,
        rows.iter().map(|r| r.uploaded).sum::<i64>()
    );
    assert_eq!(
        summary.total_downloaded,
        rows.iter().map(|r| r.downloaded).sum::<i64>()
    );
    assert_eq!(
        summary.total_connections,
        rows.iter().map(|r| r.connection_count).sum::<i64>()
    );
    assert_eq!(
        summary.total_time_seconds,
        rows.iter().map(|r| r.connected_seconds).sum::<i64>()
    );
    assert_eq!(summary.total_uploaded, 17 * MB);
    assert_eq!(summary.total_downloaded, 63 * MB);
    assert_eq!(summary.total_connections, 3);

    // lifetime totals carried to the account ledger match as well
    let user = User::find_by_id(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(user.total_uploaded, summary.total_uploaded);
    assert_eq!(user.total_downloaded, summary.total_downloaded);
}

#[tokio::test]
async fn test_empty_summary_is_zeroed() {
    let pool = setup_pool().await;
    let user = User::new("scott", Some("pass123"), None)
        .save(&pool)
        .await
        .unwrap();

    let end = Utc::now().date_naive();
    let summary = DailyUsage::summary_for_user(&pool, user.id, end - TimeDelta::days(7), end)
        .await
        .unwrap();
    assert_eq!(summary.total_uploaded, 0);
    assert_eq!(summary.total_downloaded, 0);
    assert_eq!(summary.total_connections, 0);
    assert_eq!(summary.total_time_seconds, 0);
}
