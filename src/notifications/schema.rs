//! Schema for the `notification` table.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table};

pub const NOTIFICATION_TABLE_NAME: &str = "notification";

pub const NOTIFICATION_TABLE_V1: Table = Table {
    name: NOTIFICATION_TABLE_NAME,
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("notification_id", &SqlType::Text),
        sqlite_column!("local_display_id", &SqlType::Integer, non_null = true),
        sqlite_column!("group_id", &SqlType::Text),
        sqlite_column!(
            "is_summary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "opened",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "dismissed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("message", &SqlType::Text),
        sqlite_column!("full_payload", &SqlType::Text, non_null = true),
        sqlite_column!("created_time", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_notification_notification_id", "notification_id"),
        ("idx_notification_local_display_id", "local_display_id"),
        ("idx_notification_group_id", "group_id"),
        ("idx_notification_created_time", "created_time"),
    ],
};
