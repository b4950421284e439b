#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use radmin_server::{
    auth::{AuthMode, Gate},
    build_router,
    store::{schema::create_sqlite_schema, DatabaseConfig, MemoryRegistry, Store, WebhookRepository},
    webhooks::{DispatcherConfig, WebhookDispatcher},
    AppState,
};
use serde_json::Value;
use sqlx::Row;

pub const API_KEY: &str = "test-api-key";

pub struct Harness {
    pub server: TestServer,
    pub state: AppState,
}

#[derive(Default)]
pub struct Options {
    pub auth_mode: AuthMode,
    pub strict_not_found: bool,
    pub dispatch: Option<DispatcherConfig>,
    pub base_path: Option<&'static str>,
}

pub async fn harness() -> Harness {
    harness_with(Options::default()).await
}

pub async fn harness_with(opts: Options) -> Harness {
    let store = Store::connect(&DatabaseConfig::new("sqlite::memory:").max_connections(1))
        .await
        .expect("connect sqlite");
    create_sqlite_schema(&store).await.expect("create schema");

    let registry: Arc<dyn WebhookRepository> = Arc::new(MemoryRegistry::new());
    let dispatcher = opts.dispatch.map(|cfg| {
        WebhookDispatcher::spawn(registry.clone(), cfg).expect("spawn dispatcher")
    });

    let state = AppState {
        store,
        gate: Gate::new(API_KEY, opts.auth_mode),
        registry,
        dispatcher,
        strict_not_found: opts.strict_not_found,
    };

    let app = build_router(state.clone(), opts.base_path, None);
    let server = TestServer::new(app).expect("build test server");
    Harness { server, state }
}

impl Harness {
    pub async fn count_rows(&self, table: &str, username: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) AS n FROM {table} WHERE username = ?");
        sqlx::query(&sql)
            .bind(username)
            .fetch_one(self.state.store.pool())
            .await
            .unwrap()
            .try_get("n")
            .unwrap()
    }

    /// Row counts in radcheck, radreply, radusergroup, userinfo.
    pub async fn row_counts(&self, username: &str) -> [i64; 4] {
        [
            self.count_rows("radcheck", username).await,
            self.count_rows("radreply", username).await,
            self.count_rows("radusergroup", username).await,
            self.count_rows("userinfo", username).await,
        ]
    }

    pub async fn execute(&self, sql: &str) {
        sqlx::query(sql)
            .execute(self.state.store.pool())
            .await
            .unwrap();
    }

    pub async fn create_user(&self, body: Value) -> Value {
        self.server
            .post("/users")
            .authorization_bearer(API_KEY)
            .json(&body)
            .await
            .json::<Value>()
    }
}
