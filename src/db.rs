// ==========================================
// 促销基线估算系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表幂等（CREATE ... IF NOT EXISTS），新库首次打开即可用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 建表（幂等）并登记 schema_version
///
/// 库中版本高于当前代码时只告警，不做任何迁移
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    if let Some(v) = read_schema_version(conn)? {
        if v > CURRENT_SCHEMA_VERSION {
            tracing::warn!(
                db_version = v,
                code_version = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本高于当前程序"
            );
        }
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS baseline (
    baseline_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    baseline_type TEXT NOT NULL,
    calculation_method TEXT NOT NULL,
    granularity TEXT NOT NULL,
    customer_id TEXT,
    product_id TEXT,
    category TEXT,
    brand TEXT,
    channel TEXT,
    region TEXT,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    base_year INTEGER NOT NULL,
    periods_used INTEGER NOT NULL CHECK (periods_used > 0),
    seasonality_enabled INTEGER NOT NULL DEFAULT 0,
    trend_enabled INTEGER NOT NULL DEFAULT 0,
    outlier_removal_enabled INTEGER NOT NULL DEFAULT 0,
    outlier_threshold REAL NOT NULL DEFAULT 1.5,
    confidence_level REAL NOT NULL DEFAULT 0.95,
    status TEXT NOT NULL DEFAULT 'draft',
    prior_status TEXT,
    revision INTEGER NOT NULL DEFAULT 0,
    total_base_volume REAL,
    avg_weekly_volume REAL,
    r_squared REAL,
    mape REAL,
    trend_coefficient REAL,
    confidence_half_width REAL,
    calculated_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_baseline_status ON baseline(status);

CREATE TABLE IF NOT EXISTS baseline_period (
    baseline_id TEXT NOT NULL REFERENCES baseline(baseline_id) ON DELETE CASCADE,
    period_number INTEGER NOT NULL,
    period_label TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    base_volume REAL NOT NULL CHECK (base_volume >= 0),
    seasonality_factor REAL NOT NULL,
    trend_adjustment REAL NOT NULL,
    actual_volume REAL NOT NULL,
    variance_volume REAL NOT NULL,
    variance_pct REAL,
    is_promoted INTEGER NOT NULL DEFAULT 0,
    incremental_volume REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (baseline_id, period_number)
);

CREATE TABLE IF NOT EXISTS volume_decomposition (
    decomposition_id TEXT PRIMARY KEY,
    baseline_id TEXT NOT NULL REFERENCES baseline(baseline_id),
    promotion_id TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    total_volume REAL NOT NULL,
    base_volume REAL NOT NULL,
    incremental_volume REAL NOT NULL,
    cannibalization_volume REAL NOT NULL,
    pantry_loading_volume REAL NOT NULL,
    halo_volume REAL NOT NULL,
    pull_forward_volume REAL NOT NULL,
    lift_pct REAL,
    incremental_revenue REAL NOT NULL,
    promotion_cost REAL NOT NULL,
    roi REAL,
    efficiency_score REAL NOT NULL,
    underperformed INTEGER NOT NULL DEFAULT 0,
    cannibalization_rate REAL NOT NULL,
    pantry_loading_rate REAL NOT NULL,
    halo_rate REAL NOT NULL,
    pull_forward_rate REAL NOT NULL,
    weights_json TEXT NOT NULL,
    baseline_revision INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_volume_decomposition_baseline
    ON volume_decomposition(baseline_id, created_at);

-- 分解结果只追加
CREATE TRIGGER IF NOT EXISTS trg_volume_decomposition_no_update
BEFORE UPDATE ON volume_decomposition
BEGIN
    SELECT RAISE(ABORT, 'volume_decomposition is append-only');
END;

CREATE TABLE IF NOT EXISTS sales_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT,
    product_id TEXT,
    category TEXT,
    brand TEXT,
    channel TEXT,
    region TEXT,
    granularity TEXT NOT NULL,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    volume REAL NOT NULL DEFAULT 0,
    revenue REAL NOT NULL DEFAULT 0,
    units REAL NOT NULL DEFAULT 0,
    is_promoted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_sales_history_period
    ON sales_history(granularity, period_start);

CREATE TABLE IF NOT EXISTS promotion (
    promotion_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    run_start TEXT NOT NULL,
    run_end TEXT NOT NULL,
    cost REAL NOT NULL DEFAULT 0,
    average_selling_price REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS promotion_actual (
    promotion_id TEXT NOT NULL REFERENCES promotion(promotion_id) ON DELETE CASCADE,
    period_start TEXT NOT NULL,
    period_end TEXT NOT NULL,
    volume REAL NOT NULL DEFAULT 0,
    revenue REAL NOT NULL DEFAULT 0,
    units REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (promotion_id, period_start)
);
"#;
