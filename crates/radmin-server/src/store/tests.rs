//! Tests for the credential store adapter, against in-memory SQLite.

use sqlx::Row;

use super::model::{DOWNLOAD_RATE_ATTRIBUTE, PASSWORD_ATTRIBUTE, UPLOAD_RATE_ATTRIBUTE};
use super::schema::create_sqlite_schema;
use super::{DatabaseConfig, DatabaseType, Mutation, NewUser, Store, StoreError, UserUpdate};

async fn setup_store() -> Store {
    let config = DatabaseConfig::new("sqlite::memory:").max_connections(1);
    let store = Store::connect(&config).await.expect("connect sqlite");
    create_sqlite_schema(&store).await.expect("create schema");
    store
}

fn new_user(username: &str, password: &str) -> NewUser {
    NewUser {
        username: username.to_owned(),
        password: password.to_owned(),
        bandwidth_up: "10M".to_owned(),
        bandwidth_down: "10M".to_owned(),
        profile: None,
    }
}

async fn count(store: &Store, table: &str, username: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) AS n FROM {table} WHERE username = ?");
    sqlx::query(&sql)
        .bind(username)
        .fetch_one(store.pool())
        .await
        .unwrap()
        .try_get("n")
        .unwrap()
}

async fn row_counts(store: &Store, username: &str) -> [i64; 4] {
    [
        count(store, "radcheck", username).await,
        count(store, "radreply", username).await,
        count(store, "radusergroup", username).await,
        count(store, "userinfo", username).await,
    ]
}

async fn insert_session(
    store: &Store,
    username: &str,
    start_modifier: &str,
    stopped: bool,
    input: i64,
    output: i64,
    seconds: i64,
) {
    let stop = if stopped { "datetime('now')" } else { "NULL" };
    let sql = format!(
        "INSERT INTO radacct (username, acctstarttime, acctstoptime, acctsessiontime, \
         acctinputoctets, acctoutputoctets, framedipaddress, nasipaddress) \
         VALUES (?, datetime('now', ?), {stop}, ?, ?, ?, '10.0.0.2', '10.0.0.1')"
    );
    sqlx::query(&sql)
        .bind(username)
        .bind(start_modifier)
        .bind(seconds)
        .bind(input)
        .bind(output)
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_database_type_detection() {
    assert_eq!(
        DatabaseType::from_url("mysql://radius:pw@localhost/radius"),
        Some(DatabaseType::MySQL)
    );
    assert_eq!(
        DatabaseType::from_url("mariadb://localhost/radius"),
        Some(DatabaseType::MySQL)
    );
    assert_eq!(
        DatabaseType::from_url("sqlite::memory:"),
        Some(DatabaseType::SQLite)
    );
    assert_eq!(DatabaseType::from_url("postgres://localhost/radius"), None);
}

#[tokio::test]
async fn test_connect_rejects_unknown_scheme() {
    let err = Store::connect(&DatabaseConfig::new("redis://localhost"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedScheme(s) if s == "redis"));
}

#[tokio::test]
async fn test_create_user_writes_all_rows() {
    let store = setup_store().await;
    let mut user = new_user("bob", "pw");
    user.bandwidth_up = "5M".into();
    user.bandwidth_down = "20M".into();
    user.profile = Some("gold".into());

    assert!(store.create_user(&user).await.unwrap());
    assert_eq!(row_counts(&store, "bob").await, [1, 2, 1, 1]);

    let rows = store.user_rows("bob").await.unwrap();
    assert_eq!(rows.check.len(), 1);
    assert_eq!(rows.check[0].attribute, PASSWORD_ATTRIBUTE);
    assert_eq!(rows.check[0].op, ":=");
    assert_eq!(rows.check[0].value, "pw");

    let up = rows
        .reply
        .iter()
        .find(|r| r.attribute == UPLOAD_RATE_ATTRIBUTE)
        .unwrap();
    let down = rows
        .reply
        .iter()
        .find(|r| r.attribute == DOWNLOAD_RATE_ATTRIBUTE)
        .unwrap();
    assert_eq!(up.value, "5M");
    assert_eq!(down.value, "20M");
}

#[tokio::test]
async fn test_create_without_profile_skips_group_row() {
    let store = setup_store().await;
    let mut user = new_user("carol", "pw");
    user.profile = Some(String::new());
    assert!(store.create_user(&user).await.unwrap());
    assert_eq!(row_counts(&store, "carol").await, [1, 2, 0, 1]);
}

#[tokio::test]
async fn test_duplicate_create_writes_nothing() {
    let store = setup_store().await;
    assert!(store.create_user(&new_user("dave", "one")).await.unwrap());

    let mut again = new_user("dave", "two");
    again.profile = Some("silver".into());
    assert!(!store.create_user(&again).await.unwrap());

    assert_eq!(row_counts(&store, "dave").await, [1, 2, 0, 1]);
    let rows = store.user_rows("dave").await.unwrap();
    assert_eq!(rows.check[0].value, "one");
}

#[tokio::test]
async fn test_failed_create_rolls_back() {
    let store = setup_store().await;
    sqlx::query("DROP TABLE userinfo")
        .execute(store.pool())
        .await
        .unwrap();

    let err = store
        .create_user(&new_user("erin", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));

    assert_eq!(count(&store, "radcheck", "erin").await, 0);
    assert_eq!(count(&store, "radreply", "erin").await, 0);
}

async fn rename_table(store: &Store, from: &str, to: &str) {
    sqlx::query(&format!("ALTER TABLE {from} RENAME TO {to}"))
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failed_delete_rolls_back() {
    let store = setup_store().await;
    let mut user = new_user("bob", "pw");
    user.profile = Some("gold".into());
    store.create_user(&user).await.unwrap();

    rename_table(&store, "userinfo", "userinfo_moved").await;
    let err = store.delete_user("bob", false).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
    rename_table(&store, "userinfo_moved", "userinfo").await;

    assert_eq!(row_counts(&store, "bob").await, [1, 2, 1, 1]);
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let store = setup_store().await;
    store.create_user(&new_user("cleo", "old")).await.unwrap();

    rename_table(&store, "radreply", "radreply_moved").await;
    let update = UserUpdate {
        username: "cleo".into(),
        password: Some("new".into()),
        bandwidth_up: Some("1M".into()),
        bandwidth_down: None,
    };
    let err = store.update_user(&update, false).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
    rename_table(&store, "radreply_moved", "radreply").await;

    let rows = store.user_rows("cleo").await.unwrap();
    assert_eq!(rows.check[0].value, "old");
    assert!(rows.reply.iter().all(|r| r.value == "10M"));
}

#[tokio::test]
async fn test_empty_update_runs_no_statements() {
    let store = setup_store().await;
    store.create_user(&new_user("dora", "pw")).await.unwrap();
    rename_table(&store, "radcheck", "radcheck_moved").await;

    let update = UserUpdate {
        username: "dora".into(),
        ..Default::default()
    };
    assert_eq!(
        store.update_user(&update, false).await.unwrap(),
        Mutation::Applied
    );
    assert!(store.update_user(&update, true).await.is_err());
}

#[tokio::test]
async fn test_concurrent_creates_insert_once() {
    let store = setup_store().await;
    let first = new_user("twin", "one");
    let second = new_user("twin", "two");

    let (a, b) = tokio::join!(store.create_user(&first), store.create_user(&second));
    let created = [a.unwrap(), b.unwrap()];
    assert_eq!(created.iter().filter(|c| **c).count(), 1);
    assert_eq!(row_counts(&store, "twin").await, [1, 2, 0, 1]);
}

#[tokio::test]
async fn test_delete_removes_every_row() {
    let store = setup_store().await;
    let mut user = new_user("frank", "pw");
    user.profile = Some("gold".into());
    store.create_user(&user).await.unwrap();

    assert_eq!(
        store.delete_user("frank", false).await.unwrap(),
        Mutation::Applied
    );
    assert_eq!(row_counts(&store, "frank").await, [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_delete_missing_user() {
    let store = setup_store().await;
    assert_eq!(
        store.delete_user("ghost", false).await.unwrap(),
        Mutation::Applied
    );
    assert_eq!(
        store.delete_user("ghost", true).await.unwrap(),
        Mutation::NotFound
    );
    assert_eq!(row_counts(&store, "ghost").await, [0, 0, 0, 0]);
}

#[tokio::test]
async fn test_update_changes_only_given_fields() {
    let store = setup_store().await;
    store.create_user(&new_user("gina", "old")).await.unwrap();

    let update = UserUpdate {
        username: "gina".into(),
        password: Some("new".into()),
        bandwidth_up: None,
        bandwidth_down: Some("50M".into()),
    };
    assert_eq!(
        store.update_user(&update, false).await.unwrap(),
        Mutation::Applied
    );

    let rows = store.user_rows("gina").await.unwrap();
    assert_eq!(rows.check[0].value, "new");
    let values: Vec<(&str, &str)> = rows
        .reply
        .iter()
        .map(|r| (r.attribute.as_str(), r.value.as_str()))
        .collect();
    assert!(values.contains(&(UPLOAD_RATE_ATTRIBUTE, "10M")));
    assert!(values.contains(&(DOWNLOAD_RATE_ATTRIBUTE, "50M")));
}

#[tokio::test]
async fn test_update_missing_user_is_noop() {
    let store = setup_store().await;
    let update = UserUpdate {
        username: "nobody".into(),
        password: Some("x".into()),
        bandwidth_up: Some("1M".into()),
        bandwidth_down: Some("1M".into()),
    };
    assert_eq!(
        store.update_user(&update, false).await.unwrap(),
        Mutation::Applied
    );
    assert_eq!(row_counts(&store, "nobody").await, [0, 0, 0, 0]);

    assert_eq!(
        store.update_user(&update, true).await.unwrap(),
        Mutation::NotFound
    );
}

#[tokio::test]
async fn test_list_users_paging_and_search() {
    let store = setup_store().await;
    for name in ["alpha", "alpine", "beta", "gamma", "alfred"] {
        store.create_user(&new_user(name, "pw")).await.unwrap();
    }

    assert_eq!(store.count_users("").await.unwrap(), 5);
    assert_eq!(store.count_users("AL").await.unwrap(), 3);

    let all = store.list_users("", 50, 0).await.unwrap();
    let names: Vec<_> = all.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["alfred", "gamma", "beta", "alpine", "alpha"]);

    let page = store.list_users("al", 2, 1).await.unwrap();
    let names: Vec<_> = page.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["alpine", "alpha"]);
    assert_eq!(store.count_users("al").await.unwrap(), 3);

    let first = &all[0];
    assert_eq!(first.password.as_deref(), Some("pw"));
    let attrs = first.attributes.as_deref().unwrap();
    assert!(attrs.contains("Huawei-Input-Average-Rate=10M"));
    assert!(attrs.contains("Huawei-Output-Average-Rate=10M"));
}

#[tokio::test]
async fn test_export_rows_newest_first() {
    let store = setup_store().await;
    let mut first = new_user("old", "pw1");
    first.profile = Some("gold".into());
    store.create_user(&first).await.unwrap();
    store.create_user(&new_user("new", "pw2")).await.unwrap();

    let rows = store.export_rows().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].username, "new");
    assert_eq!(rows[0].profile, None);
    assert_eq!(rows[1].username, "old");
    assert_eq!(rows[1].profile.as_deref(), Some("gold"));
    assert_eq!(rows[1].bandwidth_up.as_deref(), Some("10M"));
    assert!(rows[1].creationdate.is_some());
}

#[tokio::test]
async fn test_export_collapses_multiple_groups() {
    let store = setup_store().await;
    let mut user = new_user("multi", "pw");
    user.profile = Some("gold".into());
    store.create_user(&user).await.unwrap();
    sqlx::query(
        "INSERT INTO radusergroup (username, groupname, priority) VALUES ('multi', 'bronze', 5)",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let rows = store.export_rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].profile.as_deref(), Some("gold"));
    assert_eq!(store.count_users("").await.unwrap(), 1);
}

#[tokio::test]
async fn test_history_newest_first_with_limit() {
    let store = setup_store().await;
    insert_session(&store, "hank", "-3 days", true, 10, 20, 30).await;
    insert_session(&store, "hank", "-1 days", true, 1, 2, 3).await;
    insert_session(&store, "hank", "-2 days", false, 5, 5, 5).await;
    insert_session(&store, "other", "-1 hours", true, 1, 1, 1).await;

    let all = store.history("hank", 50).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].acctinputoctets, Some(1));
    assert_eq!(all[1].acctinputoctets, Some(5));
    assert!(all[1].is_active());
    assert_eq!(all[2].acctinputoctets, Some(10));

    let limited = store.history("hank", 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_bandwidth_stats_groups_by_day() {
    let store = setup_store().await;
    insert_session(&store, "ivy", "-1 days", true, 100, 200, 10).await;
    insert_session(&store, "ivy", "-1 days", true, 1, 2, 3).await;
    insert_session(&store, "ivy", "-3 days", true, 7, 8, 9).await;
    insert_session(&store, "jon", "-1 days", true, 1000, 1000, 1000).await;
    insert_session(&store, "ivy", "-40 days", true, 5, 5, 5).await;

    let ivy = store.bandwidth_stats(Some("ivy"), 30).await.unwrap();
    assert_eq!(ivy.len(), 2);
    assert!(ivy[0].date > ivy[1].date);
    assert_eq!(ivy[0].input_bytes, 101);
    assert_eq!(ivy[0].output_bytes, 202);
    assert_eq!(ivy[0].total_time, 13);
    assert_eq!(ivy[1].input_bytes, 7);

    let everyone = store.bandwidth_stats(None, 30).await.unwrap();
    assert_eq!(everyone.len(), 2);
    assert_eq!(everyone[0].input_bytes, 1101);

    let narrow = store.bandwidth_stats(Some("ivy"), 2).await.unwrap();
    assert_eq!(narrow.len(), 1);
}

#[tokio::test]
async fn test_stats_counts_users_and_open_sessions() {
    let store = setup_store().await;
    store.create_user(&new_user("kim", "pw")).await.unwrap();
    store.create_user(&new_user("lee", "pw")).await.unwrap();
    insert_session(&store, "kim", "-1 hours", false, 0, 0, 0).await;
    insert_session(&store, "lee", "-2 hours", true, 0, 0, 0).await;

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.active_sessions, 1);
}

#[tokio::test]
async fn test_role_for_key() {
    let store = setup_store().await;
    sqlx::query("INSERT INTO api_users (api_key, role) VALUES ('k-op', 'operator')")
        .execute(store.pool())
        .await
        .unwrap();

    assert_eq!(
        store.role_for_key("k-op").await.unwrap().as_deref(),
        Some("operator")
    );
    assert_eq!(store.role_for_key("unknown").await.unwrap(), None);
}
