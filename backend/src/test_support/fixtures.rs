//! Ready-made domain values.

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{
    AuthenticatedUser, Connection, ConnectionId, ProductionRecord, RecordMetadata, RecordSource,
    SecretToken, SnapshotMetadata, SystemDisplay, SystemId, UserId, UserRole,
};

fn token(raw: &str) -> SecretToken {
    SecretToken::new(raw).unwrap_or_else(|error| panic!("fixture token: {error}"))
}

/// An active connection whose token is valid for another day.
pub fn connection_fixture(user: UserId, system: SystemId, now: DateTime<Utc>) -> Connection {
    Connection {
        id: ConnectionId::random(),
        user_id: user,
        system_id: system,
        access_token: token("access-token"),
        refresh_token: token("refresh-token"),
        token_expires_at: now + TimeDelta::days(1),
        last_sync_at: None,
        is_active: true,
        display: SystemDisplay {
            name: Some("Garage roof".to_owned()),
            size_w: Some(6_000),
            timezone: Some("Europe/Paris".to_owned()),
        },
        consumption_unavailable: false,
        created_at: now - TimeDelta::days(30),
    }
}

/// A summary row for `connection` taken at `at`.
pub fn snapshot_fixture(connection: ConnectionId, at: DateTime<Utc>) -> ProductionRecord {
    ProductionRecord {
        connection_id: connection,
        system_id: SystemId::new("1").unwrap_or_else(|error| panic!("fixture system: {error}")),
        source: RecordSource::Summary,
        energy_wh: 1_000,
        power_w: 500,
        electrical: Default::default(),
        device_serial: None,
        timestamp: at,
        interval_seconds: 0,
        metadata: RecordMetadata::Snapshot(SnapshotMetadata {
            status: Some("normal".to_owned()),
            ..SnapshotMetadata::default()
        }),
    }
}

/// A user with `role` and no creator.
pub fn user_fixture(role: UserRole) -> AuthenticatedUser {
    AuthenticatedUser {
        id: UserId::random(),
        role,
        created_by: None,
    }
}
