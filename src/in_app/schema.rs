//! Schema for the `in_app_message` table.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table};

pub const IN_APP_MESSAGE_TABLE_NAME: &str = "in_app_message";

pub const IN_APP_MESSAGE_TABLE_V2: Table = Table {
    name: IN_APP_MESSAGE_TABLE_NAME,
    columns: &[
        sqlite_column!("message_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "display_quantity",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "last_display_time",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("-1")
        ),
    ],
    indices: &[("idx_in_app_message_last_display_time", "last_display_time")],
};
