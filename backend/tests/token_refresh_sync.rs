//! Token refresh, incremental sync and the monthly quota working together
//! through the public domain API.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rstest::{fixture, rstest};

use solarboard::domain::ports::{ConnectionRepository, VendorApiError, VendorEndpoint};
use solarboard::domain::{
    Connection, QuotaLedger, RangeFetcher, RecordSource, RecordWriter, SyncError, SyncService,
    SystemId, TokenVault, UserId,
};
use solarboard::test_support::{
    InMemoryApiCallLog, InMemoryConnections, InMemoryProductionRecords, MutableClock,
    StubMonitoringApi, StubOAuthClient, connection_fixture,
};

struct World {
    owner: UserId,
    connection: Connection,
    connections: Arc<InMemoryConnections>,
    records: Arc<InMemoryProductionRecords>,
    log: Arc<InMemoryApiCallLog>,
    oauth: Arc<StubOAuthClient>,
    clock: Arc<MutableClock>,
    vault: TokenVault,
    ledger: QuotaLedger,
    sync: SyncService,
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 30, 22, 0, 0)
        .single()
        .expect("valid instant")
}

#[fixture]
fn world() -> World {
    let owner = UserId::random();
    let mut connection = connection_fixture(owner, SystemId::new("900").expect("system"), now());
    connection.token_expires_at = now() + TimeDelta::minutes(2);

    let connections = Arc::new(InMemoryConnections::default());
    connections.insert(connection.clone());
    let records = Arc::new(InMemoryProductionRecords::default());
    let log = Arc::new(InMemoryApiCallLog::default());
    let oauth = Arc::new(StubOAuthClient::default());
    let api = Arc::new(StubMonitoringApi::new(now().date_naive()));
    let clock = Arc::new(MutableClock::new(now()));

    let vault = TokenVault::new(connections.clone(), oauth.clone(), clock.clone());
    let ledger = QuotaLedger::new(log.clone(), clock.clone());
    let sync = SyncService::new(
        connections.clone(),
        RangeFetcher::new(api, ledger.clone()),
        RecordWriter::new(records.clone()),
        clock.clone(),
    );
    World {
        owner,
        connection,
        connections,
        records,
        log,
        oauth,
        clock,
        vault,
        ledger,
        sync,
    }
}

#[rstest]
#[tokio::test]
async fn expiring_token_is_refreshed_before_syncing(world: World) {
    let token = world
        .vault
        .ensure_valid_token(&world.owner)
        .await
        .expect("token");
    assert_eq!(token.expose(), "access-1");
    assert_eq!(world.oauth.issued(), 1);

    let stored = world
        .connections
        .find_active_for_user(&world.owner)
        .await
        .expect("lookup")
        .expect("connection");
    assert_eq!(stored.access_token.expose(), "access-1");
    assert_eq!(stored.refresh_token.expose(), "refresh-1");
    assert_eq!(stored.token_expires_at, now() + TimeDelta::days(1));

    let again = world
        .vault
        .ensure_valid_token(&world.owner)
        .await
        .expect("cached token");
    assert_eq!(again.expose(), "access-1");
    assert_eq!(world.oauth.issued(), 1);
}

#[rstest]
#[tokio::test]
async fn failed_refresh_keeps_the_stored_tokens(world: World) {
    world
        .oauth
        .fail(VendorApiError::unauthorized(401_u16, "refresh token revoked"));

    let outcome = world.vault.ensure_valid_token(&world.owner).await;
    assert!(outcome.is_err());

    let stored = world
        .connections
        .get(world.connection.id)
        .expect("connection");
    assert_eq!(stored.access_token.expose(), "access-token");
    assert_eq!(stored.token_expires_at, world.connection.token_expires_at);
}

#[rstest]
#[tokio::test]
async fn unknown_user_has_no_token(world: World) {
    let outcome = world.vault.ensure_valid_token(&UserId::random()).await;
    assert!(matches!(outcome, Err(SyncError::ConnectionNotFound)));
}

#[rstest]
#[tokio::test]
async fn sync_calls_count_until_the_month_rolls_over(world: World) {
    let target = world
        .vault
        .sync_target_for(&world.connection)
        .await
        .expect("target");

    let report = world.sync.sync_all_data(&target).await.expect("sync");
    assert!(!report.skipped);
    assert_eq!(report.api_calls, 6);
    assert_eq!(
        world
            .ledger
            .count_calls_this_month(&world.connection.id)
            .await
            .expect("count"),
        6
    );
    assert_eq!(world.log.successes(), 6);
    assert_eq!(world.records.count_source(world.connection.id, RecordSource::Summary), 1);

    world.clock.advance(TimeDelta::days(2));
    assert_eq!(
        world
            .ledger
            .count_calls_this_month(&world.connection.id)
            .await
            .expect("count"),
        0
    );
}

#[rstest]
#[tokio::test]
async fn second_sync_only_covers_the_gap(world: World) {
    let target = world
        .vault
        .sync_target_for(&world.connection)
        .await
        .expect("target");
    world.sync.sync_all_data(&target).await.expect("first sync");

    world.clock.advance(TimeDelta::hours(1));
    let report = world.sync.sync_all_data(&target).await.expect("second sync");

    assert_eq!(report.api_calls, 5);
    let events_path = VendorEndpoint::Events.path(&world.connection.system_id);
    let events = world
        .log
        .entries()
        .into_iter()
        .filter(|entry| entry.endpoint == events_path)
        .count();
    assert_eq!(events, 1);
    let stored = world
        .connections
        .get(world.connection.id)
        .expect("connection");
    assert_eq!(stored.last_sync_at, Some(now() + TimeDelta::hours(1)));
}
