// ==========================================
// 促销基线估算系统 - 历史销售仓储
// ==========================================
// 职责: sales_history 表读写；作为 HistoricalSalesProvider 的 SQLite 实现
// 说明: 范围内多行（如品类下多个产品）按期起始日汇总
//       任一行标记促销，则该期视为促销期
// ==========================================

use crate::domain::baseline::BaselineScope;
use crate::domain::sales::SalesPeriod;
use crate::domain::types::Granularity;
use crate::engine::providers::{HistoricalSalesProvider, ProviderError};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct SalesHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SalesHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量写入同一范围、同一粒度的历史销售（单事务）
    pub fn insert_periods(
        &self,
        scope: &BaselineScope,
        granularity: Granularity,
        periods: &[SalesPeriod],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO sales_history (
                    customer_id, product_id, category, brand, channel, region,
                    granularity, period_start, period_end,
                    volume, revenue, units, is_promoted
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )?;
            for p in periods {
                stmt.execute(params![
                    scope.customer_id,
                    scope.product_id,
                    scope.category,
                    scope.brand,
                    scope.channel,
                    scope.region,
                    granularity.to_db_str(),
                    p.period_start,
                    p.period_end,
                    p.volume,
                    p.revenue,
                    p.units,
                    p.is_promoted,
                ])?;
            }
        }
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(periods.len())
    }

    /// 按范围查询并按期汇总
    pub fn query_series(
        &self,
        scope: &BaselineScope,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RepositoryResult<Vec<SalesPeriod>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT period_start, MAX(period_end),
                   SUM(volume), SUM(revenue), SUM(units), MAX(is_promoted)
            FROM sales_history
            WHERE granularity = ?1
              AND period_start BETWEEN ?2 AND ?3
              AND (?4 IS NULL OR customer_id = ?4)
              AND (?5 IS NULL OR product_id = ?5)
              AND (?6 IS NULL OR category = ?6)
              AND (?7 IS NULL OR brand = ?7)
              AND (?8 IS NULL OR channel = ?8)
              AND (?9 IS NULL OR region = ?9)
            GROUP BY period_start
            ORDER BY period_start
            "#,
        )?;

        let rows = stmt.query_map(
            params![
                granularity.to_db_str(),
                start,
                end,
                scope.customer_id,
                scope.product_id,
                scope.category,
                scope.brand,
                scope.channel,
                scope.region,
            ],
            |row| {
                Ok(SalesPeriod {
                    period_start: row.get(0)?,
                    period_end: row.get(1)?,
                    volume: row.get(2)?,
                    revenue: row.get(3)?,
                    units: row.get(4)?,
                    is_promoted: row.get(5)?,
                })
            },
        )?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl HistoricalSalesProvider for SalesHistoryRepository {
    fn get_series(
        &self,
        scope: &BaselineScope,
        granularity: Granularity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SalesPeriod>, ProviderError> {
        Ok(self.query_series(scope, granularity, start, end)?)
    }
}
