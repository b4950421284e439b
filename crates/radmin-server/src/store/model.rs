use serde::{Deserialize, Serialize};

/// Attribute holding the user's password; its presence marks the user as existing.
pub const PASSWORD_ATTRIBUTE: &str = "Cleartext-Password";
/// Reply attribute carrying the upload rate limit.
pub const UPLOAD_RATE_ATTRIBUTE: &str = "Huawei-Input-Average-Rate";
/// Reply attribute carrying the download rate limit.
pub const DOWNLOAD_RATE_ATTRIBUTE: &str = "Huawei-Output-Average-Rate";
/// Operator written on every credential and reply row.
pub const ASSIGN_OP: &str = ":=";
/// `userinfo.creationby` value for users created through the API.
pub const CREATED_BY: &str = "API";
/// Rate applied when a create request omits one.
pub const DEFAULT_RATE: &str = "10M";

/// One row from the user list: the password row joined with its reply attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub password: Option<String>,
    /// Comma-joined `attribute=value` pairs from `radreply`.
    pub attributes: Option<String>,
}

/// A raw `radcheck` or `radreply` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRow {
    pub id: i64,
    pub username: String,
    pub attribute: String,
    pub op: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRows {
    pub check: Vec<AttributeRow>,
    pub reply: Vec<AttributeRow>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub bandwidth_up: String,
    pub bandwidth_down: String,
    pub profile: Option<String>,
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: String,
    pub password: Option<String>,
    pub bandwidth_up: Option<String>,
    pub bandwidth_down: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.bandwidth_up.is_none() && self.bandwidth_down.is_none()
    }
}

/// Result of an update or delete when the caller asked for an existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Applied,
    NotFound,
}

/// One user flattened across all credential tables, as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub username: String,
    pub password: Option<String>,
    pub bandwidth_up: Option<String>,
    pub bandwidth_down: Option<String>,
    pub profile: Option<String>,
    pub creationdate: Option<String>,
}

/// A `radacct` session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingRecord {
    pub radacctid: i64,
    pub acctstarttime: Option<String>,
    /// `None` while the session is still open.
    pub acctstoptime: Option<String>,
    pub acctsessiontime: Option<i64>,
    pub acctinputoctets: Option<i64>,
    pub acctoutputoctets: Option<i64>,
    pub framedipaddress: Option<String>,
    pub nasipaddress: Option<String>,
}

impl AccountingRecord {
    pub fn is_active(&self) -> bool {
        self.acctstoptime.is_none()
    }
}

/// Traffic totals for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: String,
    pub input_bytes: i64,
    pub output_bytes: i64,
    pub total_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_users: i64,
    pub active_sessions: i64,
}
