// ==========================================
// 促销基线估算系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 说明: 缺失或格式错误的配置回退默认值并记录 warn，不阻断计算
// ==========================================

use crate::config::engine_config_trait::EngineConfigReader;
use crate::config::engine_settings::{EfficiencyWeights, EngineSettings};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式，按 key 排序）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 加载引擎参数（逐项回退默认值）
    pub fn load_engine_settings(&self) -> ConfigResult<EngineSettings> {
        let defaults = EngineSettings::default();

        let calc_timeout_ms = self
            .parsed_or_default::<u64>(config_keys::CALC_TIMEOUT_MS, defaults.calc_timeout_ms)?
            .max(1);
        let moving_average_max_window = self
            .parsed_or_default::<usize>(
                config_keys::MOVING_AVERAGE_MAX_WINDOW,
                defaults.moving_average_max_window,
            )?
            .max(1);
        let outlier_median_window = self
            .parsed_or_default::<usize>(
                config_keys::OUTLIER_MEDIAN_WINDOW,
                defaults.outlier_median_window,
            )?
            .max(3);

        Ok(EngineSettings {
            calc_timeout_ms,
            moving_average_max_window,
            outlier_median_window,
            es_alpha_grid: self.load_alpha_grid(defaults.es_alpha_grid)?,
            efficiency_weights: self.load_efficiency_weights()?,
        })
    }

    /// 读取效率分权重（JSON），非法时回退默认
    pub fn load_efficiency_weights(&self) -> ConfigResult<EfficiencyWeights> {
        let raw = match self.get_global_config_value(config_keys::EFFICIENCY_WEIGHTS)? {
            Some(v) => v,
            None => return Ok(EfficiencyWeights::default()),
        };

        let parsed = serde_json::from_str::<EfficiencyWeights>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|w| w.validate().map(|_| w));

        match parsed {
            Ok(w) => Ok(w),
            Err(reason) => {
                tracing::warn!(key = config_keys::EFFICIENCY_WEIGHTS, raw = %raw, %reason, "配置非法，使用默认值");
                Ok(EfficiencyWeights::default())
            }
        }
    }

    fn load_alpha_grid(&self, default: Vec<f64>) -> ConfigResult<Vec<f64>> {
        let raw = match self.get_global_config_value(config_keys::ES_ALPHA_GRID)? {
            Some(v) => v,
            None => return Ok(default),
        };

        let grid: Vec<f64> = raw
            .split(',')
            .filter_map(|s| s.trim().parse::<f64>().ok())
            .filter(|a| *a > 0.0 && *a < 1.0)
            .collect();

        if grid.is_empty() {
            tracing::warn!(key = config_keys::ES_ALPHA_GRID, raw = %raw, "配置非法，使用默认值");
            return Ok(default);
        }
        Ok(grid)
    }

    fn parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        match self.get_global_config_value(key)? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key, raw = %raw, default = %default, "配置非法，使用默认值");
                    Ok(default)
                }
            },
        }
    }
}

#[async_trait]
impl EngineConfigReader for ConfigManager {
    async fn get_calc_timeout_ms(&self) -> ConfigResult<u64> {
        Ok(self.load_engine_settings()?.calc_timeout_ms)
    }

    async fn get_efficiency_weights(&self) -> ConfigResult<EfficiencyWeights> {
        self.load_efficiency_weights()
    }

    async fn get_engine_settings(&self) -> ConfigResult<EngineSettings> {
        self.load_engine_settings()
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 计算
    pub const CALC_TIMEOUT_MS: &str = "calc_timeout_ms";

    // 模型
    pub const MOVING_AVERAGE_MAX_WINDOW: &str = "moving_average_max_window";
    pub const ES_ALPHA_GRID: &str = "es_alpha_grid"; // 逗号分隔

    // 预处理
    pub const OUTLIER_MEDIAN_WINDOW: &str = "outlier_median_window";

    // 分解
    pub const EFFICIENCY_WEIGHTS: &str = "efficiency_weights"; // JSON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let settings = manager().load_engine_settings().unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.calc_timeout_ms, 30_000);
        assert_eq!(settings.es_alpha_grid.len(), 9);
    }

    #[test]
    fn test_overrides_and_malformed_values() {
        let m = manager();
        m.set_config_value(config_keys::CALC_TIMEOUT_MS, "500").unwrap();
        m.set_config_value(config_keys::MOVING_AVERAGE_MAX_WINDOW, "abc").unwrap();
        m.set_config_value(config_keys::ES_ALPHA_GRID, "0.2, 0.5, 1.5").unwrap();
        m.set_config_value(config_keys::EFFICIENCY_WEIGHTS, r#"{"lift":-1}"#).unwrap();

        let settings = m.load_engine_settings().unwrap();
        assert_eq!(settings.calc_timeout_ms, 500);
        assert_eq!(settings.moving_average_max_window, 12);
        assert_eq!(settings.es_alpha_grid, vec![0.2, 0.5]);
        assert_eq!(settings.efficiency_weights, EfficiencyWeights::default());
    }

    #[test]
    fn test_snapshot_is_sorted_json() {
        let m = manager();
        m.set_config_value("b_key", "2").unwrap();
        m.set_config_value("a_key", "1").unwrap();
        let snapshot = m.get_config_snapshot().unwrap();
        assert_eq!(snapshot, r#"{"a_key":"1","b_key":"2"}"#);
    }

    #[tokio::test]
    async fn test_reader_trait_matches_loader() {
        let m = manager();
        m.set_config_value(config_keys::EFFICIENCY_WEIGHTS, r#"{"lift":0.5,"roi":0.5,"leakage":0.0}"#)
            .unwrap();

        let reader: &dyn EngineConfigReader = &m;
        let weights = reader.get_efficiency_weights().await.unwrap();
        assert_eq!(weights.lift, 0.5);
        assert_eq!(weights.leakage, 0.0);
        assert_eq!(weights.lift_target_pct, 100.0);
        assert_eq!(reader.get_calc_timeout_ms().await.unwrap(), 30_000);
        assert_eq!(
            reader.get_engine_settings().await.unwrap(),
            m.load_engine_settings().unwrap()
        );
    }
}
