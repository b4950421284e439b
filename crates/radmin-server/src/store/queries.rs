//! SQL for the FreeRADIUS tables.
//!
//! MySQL columns are cast to `SIGNED`/`CHAR` where the generic driver would
//! otherwise see unsigned integers, DECIMAL sums or DATETIME values.

// ── Users ────────────────────────────────────────────────────────────────────

pub const LIST_USERS_MYSQL: &str = r#"
SELECT CAST(u.id AS SIGNED) AS id, u.username AS username, r.value AS password,
       CAST(GROUP_CONCAT(DISTINCT CONCAT(ra.attribute, '=', ra.value)) AS CHAR) AS attributes
FROM radcheck u
LEFT JOIN radcheck r ON u.username = r.username AND r.attribute = 'Cleartext-Password'
LEFT JOIN radreply ra ON u.username = ra.username
WHERE u.attribute = 'Cleartext-Password' AND u.username LIKE ?
GROUP BY u.id, u.username, r.value
ORDER BY u.id DESC
LIMIT ? OFFSET ?
"#;

pub const LIST_USERS_SQLITE: &str = r#"
SELECT u.id AS id, u.username AS username, r.value AS password,
       GROUP_CONCAT(DISTINCT ra.attribute || '=' || ra.value) AS attributes
FROM radcheck u
LEFT JOIN radcheck r ON u.username = r.username AND r.attribute = 'Cleartext-Password'
LEFT JOIN radreply ra ON u.username = ra.username
WHERE u.attribute = 'Cleartext-Password' AND u.username LIKE ?
GROUP BY u.id, u.username, r.value
ORDER BY u.id DESC
LIMIT ? OFFSET ?
"#;

pub const COUNT_USERS: &str = r#"
SELECT COUNT(DISTINCT username) AS total
FROM radcheck
WHERE attribute = 'Cleartext-Password' AND username LIKE ?
"#;

/// Locks the username's index range so a concurrent create of the same name
/// waits for this transaction.
pub const COUNT_CHECK_ROWS_MYSQL: &str =
    "SELECT COUNT(*) AS n FROM radcheck WHERE username = ? FOR UPDATE";

pub const COUNT_CHECK_ROWS_SQLITE: &str = "SELECT COUNT(*) AS n FROM radcheck WHERE username = ?";

pub const COUNT_PASSWORD_ROWS: &str =
    "SELECT COUNT(*) AS n FROM radcheck WHERE username = ? AND attribute = 'Cleartext-Password'";

pub const CHECK_ROWS_MYSQL: &str = r#"
SELECT CAST(id AS SIGNED) AS id, username, attribute, op, value
FROM radcheck WHERE username = ? ORDER BY id
"#;

pub const CHECK_ROWS_SQLITE: &str =
    "SELECT id, username, attribute, op, value FROM radcheck WHERE username = ? ORDER BY id";

pub const REPLY_ROWS_MYSQL: &str = r#"
SELECT CAST(id AS SIGNED) AS id, username, attribute, op, value
FROM radreply WHERE username = ? ORDER BY id
"#;

pub const REPLY_ROWS_SQLITE: &str =
    "SELECT id, username, attribute, op, value FROM radreply WHERE username = ? ORDER BY id";

// ── Mutations (portable) ─────────────────────────────────────────────────────

pub const INSERT_CHECK: &str =
    "INSERT INTO radcheck (username, attribute, op, value) VALUES (?, ?, ?, ?)";

pub const INSERT_REPLY: &str =
    "INSERT INTO radreply (username, attribute, op, value) VALUES (?, ?, ?, ?)";

pub const INSERT_GROUP: &str =
    "INSERT INTO radusergroup (username, groupname, priority) VALUES (?, ?, 0)";

pub const INSERT_USERINFO: &str =
    "INSERT INTO userinfo (username, creationdate, creationby) VALUES (?, CURRENT_TIMESTAMP, ?)";

pub const UPDATE_CHECK_VALUE: &str =
    "UPDATE radcheck SET value = ? WHERE username = ? AND attribute = ?";

pub const UPDATE_REPLY_VALUE: &str =
    "UPDATE radreply SET value = ? WHERE username = ? AND attribute = ?";

pub const DELETE_CHECK: &str = "DELETE FROM radcheck WHERE username = ?";
pub const DELETE_REPLY: &str = "DELETE FROM radreply WHERE username = ?";
pub const DELETE_GROUP: &str = "DELETE FROM radusergroup WHERE username = ?";
pub const DELETE_USERINFO: &str = "DELETE FROM userinfo WHERE username = ?";

// ── Export ───────────────────────────────────────────────────────────────────

/// One row per user; with several groups the lowest priority wins.
pub const EXPORT_MYSQL: &str = r#"
SELECT u.username AS username, r.value AS password,
       ra_up.value AS bandwidth_up, ra_down.value AS bandwidth_down,
       (SELECT g.groupname FROM radusergroup g WHERE g.username = u.username
        ORDER BY g.priority, g.groupname LIMIT 1) AS profile,
       CAST(ui.creationdate AS CHAR) AS creationdate
FROM radcheck u
LEFT JOIN radcheck r ON u.username = r.username AND r.attribute = 'Cleartext-Password'
LEFT JOIN radreply ra_up ON u.username = ra_up.username AND ra_up.attribute = 'Huawei-Input-Average-Rate'
LEFT JOIN radreply ra_down ON u.username = ra_down.username AND ra_down.attribute = 'Huawei-Output-Average-Rate'
LEFT JOIN userinfo ui ON u.username = ui.username
WHERE u.attribute = 'Cleartext-Password'
ORDER BY u.id DESC
"#;

pub const EXPORT_SQLITE: &str = r#"
SELECT u.username AS username, r.value AS password,
       ra_up.value AS bandwidth_up, ra_down.value AS bandwidth_down,
       (SELECT g.groupname FROM radusergroup g WHERE g.username = u.username
        ORDER BY g.priority, g.groupname LIMIT 1) AS profile,
       ui.creationdate AS creationdate
FROM radcheck u
LEFT JOIN radcheck r ON u.username = r.username AND r.attribute = 'Cleartext-Password'
LEFT JOIN radreply ra_up ON u.username = ra_up.username AND ra_up.attribute = 'Huawei-Input-Average-Rate'
LEFT JOIN radreply ra_down ON u.username = ra_down.username AND ra_down.attribute = 'Huawei-Output-Average-Rate'
LEFT JOIN userinfo ui ON u.username = ui.username
WHERE u.attribute = 'Cleartext-Password'
ORDER BY u.id DESC
"#;

// ── Accounting ───────────────────────────────────────────────────────────────

pub const HISTORY_MYSQL: &str = r#"
SELECT CAST(radacctid AS SIGNED) AS radacctid,
       CAST(acctstarttime AS CHAR) AS acctstarttime,
       CAST(acctstoptime AS CHAR) AS acctstoptime,
       CAST(acctsessiontime AS SIGNED) AS acctsessiontime,
       CAST(acctinputoctets AS SIGNED) AS acctinputoctets,
       CAST(acctoutputoctets AS SIGNED) AS acctoutputoctets,
       framedipaddress, nasipaddress
FROM radacct
WHERE username = ?
ORDER BY radacct.acctstarttime DESC
LIMIT ?
"#;

pub const HISTORY_SQLITE: &str = r#"
SELECT radacctid, acctstarttime, acctstoptime, acctsessiontime,
       acctinputoctets, acctoutputoctets, framedipaddress, nasipaddress
FROM radacct
WHERE username = ?
ORDER BY acctstarttime DESC
LIMIT ?
"#;

/// Binds: days, username (nullable), username (nullable).
pub const BANDWIDTH_MYSQL: &str = r#"
SELECT CAST(DATE(acctstarttime) AS CHAR) AS date,
       CAST(COALESCE(SUM(acctinputoctets), 0) AS SIGNED) AS input_bytes,
       CAST(COALESCE(SUM(acctoutputoctets), 0) AS SIGNED) AS output_bytes,
       CAST(COALESCE(SUM(acctsessiontime), 0) AS SIGNED) AS total_time
FROM radacct
WHERE acctstarttime >= DATE_SUB(NOW(), INTERVAL ? DAY)
  AND (? IS NULL OR username = ?)
GROUP BY DATE(acctstarttime)
ORDER BY DATE(acctstarttime) DESC
"#;

/// Binds: datetime modifier such as `-30 days`, username (nullable), username (nullable).
pub const BANDWIDTH_SQLITE: &str = r#"
SELECT DATE(acctstarttime) AS date,
       COALESCE(SUM(acctinputoctets), 0) AS input_bytes,
       COALESCE(SUM(acctoutputoctets), 0) AS output_bytes,
       COALESCE(SUM(acctsessiontime), 0) AS total_time
FROM radacct
WHERE acctstarttime >= datetime('now', ?)
  AND (? IS NULL OR username = ?)
GROUP BY DATE(acctstarttime)
ORDER BY DATE(acctstarttime) DESC
"#;

pub const COUNT_ACTIVE_SESSIONS: &str =
    "SELECT COUNT(*) AS active_sessions FROM radacct WHERE acctstoptime IS NULL";

pub const COUNT_ALL_USERS: &str =
    "SELECT COUNT(DISTINCT username) AS total_users FROM radcheck WHERE attribute = 'Cleartext-Password'";

// ── API users (role mode) ────────────────────────────────────────────────────

pub const ROLE_FOR_KEY: &str = "SELECT role FROM api_users WHERE api_key = ?";
