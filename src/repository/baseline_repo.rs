// ==========================================
// 促销基线估算系统 - 基线数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（状态机判断在引擎层）
// 红线: 基线期整体替换必须与汇总/状态更新处于同一事务
// 说明: 每次写 baseline 行都递增 revision
// ==========================================

use crate::domain::baseline::{Baseline, BaselineAggregates, BaselinePeriod, BaselineScope};
use crate::domain::types::BaselineStatus;
use crate::repository::error::{parse_column, RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const BASELINE_COLUMNS: &str = r#"
    baseline_id, name, baseline_type, calculation_method, granularity,
    customer_id, product_id, category, brand, channel, region,
    start_date, end_date, base_year, periods_used,
    seasonality_enabled, trend_enabled, outlier_removal_enabled,
    outlier_threshold, confidence_level,
    status, prior_status, revision,
    total_base_volume, avg_weekly_volume, r_squared, mape,
    trend_coefficient, confidence_half_width, calculated_at,
    created_at, updated_at
"#;

const PERIOD_COLUMNS: &str = r#"
    baseline_id, period_number, period_label, period_start, period_end,
    base_volume, seasonality_factor, trend_adjustment, actual_volume,
    variance_volume, variance_pct, is_promoted, incremental_volume
"#;

// ==========================================
// BaselineRepository - 基线仓储
// ==========================================
pub struct BaselineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BaselineRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入新基线
    pub fn insert(&self, baseline: &Baseline) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO baseline ({}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                    ?31, ?32
                )",
                BASELINE_COLUMNS
            ),
            params![
                baseline.baseline_id,
                baseline.name,
                baseline.baseline_type.to_db_str(),
                baseline.calculation_method.as_str(),
                baseline.granularity.to_db_str(),
                baseline.scope.customer_id,
                baseline.scope.product_id,
                baseline.scope.category,
                baseline.scope.brand,
                baseline.scope.channel,
                baseline.scope.region,
                baseline.start_date,
                baseline.end_date,
                baseline.base_year,
                baseline.periods_used,
                baseline.seasonality_enabled,
                baseline.trend_enabled,
                baseline.outlier_removal_enabled,
                baseline.outlier_threshold,
                baseline.confidence_level,
                baseline.status.to_db_str(),
                baseline.prior_status.map(|s| s.to_db_str()),
                baseline.revision,
                baseline.total_base_volume,
                baseline.avg_weekly_volume,
                baseline.r_squared,
                baseline.mape,
                baseline.trend_coefficient,
                baseline.confidence_half_width,
                baseline.calculated_at,
                baseline.created_at,
                baseline.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询基线
    pub fn find_by_id(&self, baseline_id: &str) -> RepositoryResult<Option<Baseline>> {
        let conn = self.get_conn()?;
        Ok(query_baseline(&conn, baseline_id)?)
    }

    /// 在同一次加锁内读取基线及其全部基线期（保证两者属于同一修订）
    pub fn find_with_periods(
        &self,
        baseline_id: &str,
    ) -> RepositoryResult<Option<(Baseline, Vec<BaselinePeriod>)>> {
        let conn = self.get_conn()?;
        let baseline = match query_baseline(&conn, baseline_id)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let periods = query_periods(&conn, baseline_id)?;
        Ok(Some((baseline, periods)))
    }

    /// 列出基线（可按状态过滤）
    pub fn list(&self, status: Option<BaselineStatus>) -> RepositoryResult<Vec<Baseline>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM baseline WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at, baseline_id",
            BASELINE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![status.map(|s| s.to_db_str())], map_baseline_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 查询基线期（按期号升序）
    pub fn find_periods(&self, baseline_id: &str) -> RepositoryResult<Vec<BaselinePeriod>> {
        let conn = self.get_conn()?;
        Ok(query_periods(&conn, baseline_id)?)
    }

    /// 进入 calculating，并记录计算前的稳定态
    pub fn mark_calculating(
        &self,
        baseline_id: &str,
        prior_status: BaselineStatus,
    ) -> RepositoryResult<Baseline> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE baseline
            SET status = 'calculating', prior_status = ?2,
                revision = revision + 1, updated_at = ?3
            WHERE baseline_id = ?1
            "#,
            params![baseline_id, prior_status.to_db_str(), Utc::now().naive_utc()],
        )?;
        if affected == 0 {
            return Err(not_found(baseline_id));
        }
        query_baseline(&conn, baseline_id)?.ok_or_else(|| not_found(baseline_id))
    }

    /// 从 calculating 恢复到指定稳定态
    ///
    /// # 返回
    /// - false: 基线当前不在 calculating（无需恢复）
    pub fn restore_status(
        &self,
        baseline_id: &str,
        status: BaselineStatus,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE baseline
            SET status = ?2, prior_status = NULL,
                revision = revision + 1, updated_at = ?3
            WHERE baseline_id = ?1 AND status = 'calculating'
            "#,
            params![baseline_id, status.to_db_str(), Utc::now().naive_utc()],
        )?;
        Ok(affected > 0)
    }

    /// 条件状态变更（仅当当前状态等于 from）
    pub fn transition_status(
        &self,
        baseline_id: &str,
        from: BaselineStatus,
        to: BaselineStatus,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE baseline
            SET status = ?3, revision = revision + 1, updated_at = ?4
            WHERE baseline_id = ?1 AND status = ?2
            "#,
            params![
                baseline_id,
                from.to_db_str(),
                to.to_db_str(),
                Utc::now().naive_utc()
            ],
        )?;
        Ok(affected > 0)
    }

    /// 提交计算结果（单事务）
    ///
    /// 1. 删除旧基线期
    /// 2. 写入新基线期
    /// 3. 回写汇总指标，状态置为 active
    pub fn commit_calculation(
        &self,
        baseline_id: &str,
        aggregates: &BaselineAggregates,
        periods: &[BaselinePeriod],
    ) -> RepositoryResult<Baseline> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            "DELETE FROM baseline_period WHERE baseline_id = ?1",
            params![baseline_id],
        )?;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO baseline_period ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                PERIOD_COLUMNS
            ))?;
            for p in periods {
                stmt.execute(params![
                    baseline_id,
                    p.period_number,
                    p.period_label,
                    p.period_start,
                    p.period_end,
                    p.base_volume,
                    p.seasonality_factor,
                    p.trend_adjustment,
                    p.actual_volume,
                    p.variance_volume,
                    p.variance_pct,
                    p.is_promoted,
                    p.incremental_volume,
                ])?;
            }
        }

        let affected = tx.execute(
            r#"
            UPDATE baseline
            SET total_base_volume = ?2, avg_weekly_volume = ?3,
                r_squared = ?4, mape = ?5, trend_coefficient = ?6,
                confidence_half_width = ?7, calculated_at = ?8,
                status = 'active', prior_status = NULL,
                revision = revision + 1, updated_at = ?9
            WHERE baseline_id = ?1
            "#,
            params![
                baseline_id,
                aggregates.total_base_volume,
                aggregates.avg_weekly_volume,
                aggregates.r_squared,
                aggregates.mape,
                aggregates.trend_coefficient,
                aggregates.confidence_half_width,
                aggregates.calculated_at,
                Utc::now().naive_utc(),
            ],
        )?;
        if affected == 0 {
            // tx 未提交，drop 时自动回滚
            return Err(not_found(baseline_id));
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        query_baseline(&conn, baseline_id)?.ok_or_else(|| not_found(baseline_id))
    }
}

fn not_found(baseline_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "Baseline".to_string(),
        id: baseline_id.to_string(),
    }
}

fn query_baseline(conn: &Connection, baseline_id: &str) -> rusqlite::Result<Option<Baseline>> {
    conn.query_row(
        &format!("SELECT {} FROM baseline WHERE baseline_id = ?1", BASELINE_COLUMNS),
        params![baseline_id],
        map_baseline_row,
    )
    .optional()
}

fn query_periods(conn: &Connection, baseline_id: &str) -> rusqlite::Result<Vec<BaselinePeriod>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM baseline_period WHERE baseline_id = ?1 ORDER BY period_number",
        PERIOD_COLUMNS
    ))?;
    let rows = stmt.query_map(params![baseline_id], map_period_row)?;
    rows.collect()
}

fn map_baseline_row(row: &Row<'_>) -> rusqlite::Result<Baseline> {
    let prior_status = match row.get::<_, Option<String>>(21)? {
        Some(raw) => Some(parse_column(21, raw)?),
        None => None,
    };

    Ok(Baseline {
        baseline_id: row.get(0)?,
        name: row.get(1)?,
        baseline_type: parse_column(2, row.get(2)?)?,
        calculation_method: parse_column(3, row.get(3)?)?,
        granularity: parse_column(4, row.get(4)?)?,
        scope: BaselineScope {
            customer_id: row.get(5)?,
            product_id: row.get(6)?,
            category: row.get(7)?,
            brand: row.get(8)?,
            channel: row.get(9)?,
            region: row.get(10)?,
        },
        start_date: row.get(11)?,
        end_date: row.get(12)?,
        base_year: row.get(13)?,
        periods_used: row.get(14)?,
        seasonality_enabled: row.get(15)?,
        trend_enabled: row.get(16)?,
        outlier_removal_enabled: row.get(17)?,
        outlier_threshold: row.get(18)?,
        confidence_level: row.get(19)?,
        status: parse_column(20, row.get(20)?)?,
        prior_status,
        revision: row.get(22)?,
        total_base_volume: row.get(23)?,
        avg_weekly_volume: row.get(24)?,
        r_squared: row.get(25)?,
        mape: row.get(26)?,
        trend_coefficient: row.get(27)?,
        confidence_half_width: row.get(28)?,
        calculated_at: row.get(29)?,
        created_at: row.get(30)?,
        updated_at: row.get(31)?,
    })
}

fn map_period_row(row: &Row<'_>) -> rusqlite::Result<BaselinePeriod> {
    Ok(BaselinePeriod {
        baseline_id: row.get(0)?,
        period_number: row.get(1)?,
        period_label: row.get(2)?,
        period_start: row.get(3)?,
        period_end: row.get(4)?,
        base_volume: row.get(5)?,
        seasonality_factor: row.get(6)?,
        trend_adjustment: row.get(7)?,
        actual_volume: row.get(8)?,
        variance_volume: row.get(9)?,
        variance_pct: row.get(10)?,
        is_promoted: row.get(11)?,
        incremental_volume: row.get(12)?,
    })
}
