// ==========================================
// 促销基线估算系统 - 促销活动仓储
// ==========================================
// 职责: promotion / promotion_actual 表读写；作为 PromotionProvider 的 SQLite 实现
// ==========================================

use crate::domain::sales::{Promotion, PromotionActual};
use crate::engine::providers::{PromotionProvider, ProviderError};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct PromotionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PromotionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入促销及其按期实际表现（单事务，已存在则整体覆盖）
    pub fn upsert(&self, promotion: &Promotion) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        tx.execute(
            r#"
            INSERT INTO promotion (promotion_id, name, run_start, run_end, cost, average_selling_price)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(promotion_id) DO UPDATE SET
                name = ?2, run_start = ?3, run_end = ?4,
                cost = ?5, average_selling_price = ?6
            "#,
            params![
                promotion.promotion_id,
                promotion.name,
                promotion.run_start,
                promotion.run_end,
                promotion.cost,
                promotion.average_selling_price,
            ],
        )?;

        tx.execute(
            "DELETE FROM promotion_actual WHERE promotion_id = ?1",
            params![promotion.promotion_id],
        )?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO promotion_actual (promotion_id, period_start, period_end, volume, revenue, units)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for a in &promotion.actuals {
                stmt.execute(params![
                    promotion.promotion_id,
                    a.period_start,
                    a.period_end,
                    a.volume,
                    a.revenue,
                    a.units,
                ])?;
            }
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    pub fn find_by_id(&self, promotion_id: &str) -> RepositoryResult<Option<Promotion>> {
        let conn = self.get_conn()?;

        let header = conn
            .query_row(
                r#"
                SELECT promotion_id, name, run_start, run_end, cost, average_selling_price
                FROM promotion WHERE promotion_id = ?1
                "#,
                params![promotion_id],
                |row| {
                    Ok(Promotion {
                        promotion_id: row.get(0)?,
                        name: row.get(1)?,
                        run_start: row.get(2)?,
                        run_end: row.get(3)?,
                        cost: row.get(4)?,
                        average_selling_price: row.get(5)?,
                        actuals: Vec::new(),
                    })
                },
            )
            .optional()?;

        let mut promotion = match header {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT period_start, period_end, volume, revenue, units
            FROM promotion_actual WHERE promotion_id = ?1
            ORDER BY period_start
            "#,
        )?;
        let rows = stmt.query_map(params![promotion_id], |row| {
            Ok(PromotionActual {
                period_start: row.get(0)?,
                period_end: row.get(1)?,
                volume: row.get(2)?,
                revenue: row.get(3)?,
                units: row.get(4)?,
            })
        })?;
        promotion.actuals = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(Some(promotion))
    }
}

impl PromotionProvider for PromotionRepository {
    fn get_promotion(&self, promotion_id: &str) -> Result<Option<Promotion>, ProviderError> {
        Ok(self.find_by_id(promotion_id)?)
    }
}
