mod database;
mod sdk_schema;
mod versioned_schema;

pub use database::{open_in_memory_sdk_database, open_sdk_database, SharedConnection};
pub use sdk_schema::SDK_VERSIONED_SCHEMAS;
pub use versioned_schema::{Column, SqlType, Table, VersionedSchema, BASE_DB_VERSION};
