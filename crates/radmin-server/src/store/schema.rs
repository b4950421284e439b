//! FreeRADIUS table layout for SQLite development databases.
//!
//! Production MySQL schemas ship with FreeRADIUS itself; this only exists so a
//! local `sqlite:` database can be brought up without it.

use super::db::{DatabaseType, Result, Store, StoreError};

const SQLITE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS radcheck (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL DEFAULT '',
        attribute TEXT NOT NULL DEFAULT '',
        op TEXT NOT NULL DEFAULT '==',
        value TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS radreply (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL DEFAULT '',
        attribute TEXT NOT NULL DEFAULT '',
        op TEXT NOT NULL DEFAULT '=',
        value TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS radusergroup (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL DEFAULT '',
        groupname TEXT NOT NULL DEFAULT '',
        priority INTEGER NOT NULL DEFAULT 1
    )"#,
    r#"CREATE TABLE IF NOT EXISTS userinfo (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL DEFAULT '',
        creationdate TEXT,
        creationby TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS radacct (
        radacctid INTEGER PRIMARY KEY AUTOINCREMENT,
        acctsessionid TEXT NOT NULL DEFAULT '',
        username TEXT NOT NULL DEFAULT '',
        nasipaddress TEXT NOT NULL DEFAULT '',
        acctstarttime TEXT,
        acctstoptime TEXT,
        acctsessiontime INTEGER,
        acctinputoctets INTEGER,
        acctoutputoctets INTEGER,
        framedipaddress TEXT NOT NULL DEFAULT ''
    )"#,
    r#"CREATE TABLE IF NOT EXISTS api_users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        api_key TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL DEFAULT 'viewer'
    )"#,
    "CREATE INDEX IF NOT EXISTS radcheck_username ON radcheck (username)",
    "CREATE INDEX IF NOT EXISTS radreply_username ON radreply (username)",
    "CREATE INDEX IF NOT EXISTS radacct_username ON radacct (username)",
];

/// Creates the credential, accounting and API-user tables if they are missing.
pub async fn create_sqlite_schema(store: &Store) -> Result<()> {
    if store.database_type() != DatabaseType::SQLite {
        return Err(StoreError::UnsupportedScheme(
            "schema bootstrap is only available for sqlite".to_owned(),
        ));
    }
    for statement in SQLITE_TABLES {
        sqlx::query(statement).execute(store.pool()).await?;
    }
    Ok(())
}
