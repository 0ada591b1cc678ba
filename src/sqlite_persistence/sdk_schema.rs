//! Versioned schemas for the SDK database.
//!
//! Version 1 shipped the notification and preference tables. Version 2 added
//! the in-app message statistics table.

use super::VersionedSchema;
use crate::in_app::schema::IN_APP_MESSAGE_TABLE_V2;
use crate::notifications::schema::NOTIFICATION_TABLE_V1;
use crate::preferences::SDK_PREFERENCE_TABLE_V1;
use anyhow::{Context, Result};
use rusqlite::Connection;

fn migrate_to_v2(conn: &Connection) -> Result<()> {
    IN_APP_MESSAGE_TABLE_V2
        .create(conn)
        .context("Failed to create in_app_message table")
}

pub const SDK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[NOTIFICATION_TABLE_V1, SDK_PREFERENCE_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            NOTIFICATION_TABLE_V1,
            SDK_PREFERENCE_TABLE_V1,
            IN_APP_MESSAGE_TABLE_V2,
        ],
        migration: Some(migrate_to_v2),
    },
];
