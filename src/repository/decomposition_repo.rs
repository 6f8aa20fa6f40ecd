// ==========================================
// 促销基线估算系统 - 促销量分解仓储
// ==========================================
// 红线: 只追加，不提供任何 UPDATE 语句（表上另有触发器拦截）
// ==========================================

use crate::domain::decomposition::{EffectRates, VolumeDecomposition};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const DECOMPOSITION_COLUMNS: &str = r#"
    decomposition_id, baseline_id, promotion_id, period_start, period_end,
    total_volume, base_volume, incremental_volume,
    cannibalization_volume, pantry_loading_volume, halo_volume, pull_forward_volume,
    lift_pct, incremental_revenue, promotion_cost, roi, efficiency_score, underperformed,
    cannibalization_rate, pantry_loading_rate, halo_rate, pull_forward_rate,
    weights_json, baseline_revision, created_at
"#;

pub struct DecompositionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DecompositionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条分解记录
    pub fn insert(&self, d: &VolumeDecomposition) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO volume_decomposition ({}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
                )",
                DECOMPOSITION_COLUMNS
            ),
            params![
                d.decomposition_id,
                d.baseline_id,
                d.promotion_id,
                d.period_start,
                d.period_end,
                d.total_volume,
                d.base_volume,
                d.incremental_volume,
                d.cannibalization_volume,
                d.pantry_loading_volume,
                d.halo_volume,
                d.pull_forward_volume,
                d.lift_pct,
                d.incremental_revenue,
                d.promotion_cost,
                d.roi,
                d.efficiency_score,
                d.underperformed,
                d.rates.cannibalization_rate,
                d.rates.pantry_loading_rate,
                d.rates.halo_rate,
                d.rates.pull_forward_rate,
                d.weights_json,
                d.baseline_revision,
                d.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id(&self, decomposition_id: &str) -> RepositoryResult<Option<VolumeDecomposition>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT {} FROM volume_decomposition WHERE decomposition_id = ?1",
                    DECOMPOSITION_COLUMNS
                ),
                params![decomposition_id],
                map_row,
            )
            .optional()?;
        Ok(found)
    }

    /// 按基线列出分解记录（按创建时间升序）
    pub fn list_by_baseline(&self, baseline_id: &str) -> RepositoryResult<Vec<VolumeDecomposition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM volume_decomposition WHERE baseline_id = ?1 ORDER BY created_at, rowid",
            DECOMPOSITION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![baseline_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<VolumeDecomposition> {
    Ok(VolumeDecomposition {
        decomposition_id: row.get(0)?,
        baseline_id: row.get(1)?,
        promotion_id: row.get(2)?,
        period_start: row.get(3)?,
        period_end: row.get(4)?,
        total_volume: row.get(5)?,
        base_volume: row.get(6)?,
        incremental_volume: row.get(7)?,
        cannibalization_volume: row.get(8)?,
        pantry_loading_volume: row.get(9)?,
        halo_volume: row.get(10)?,
        pull_forward_volume: row.get(11)?,
        lift_pct: row.get(12)?,
        incremental_revenue: row.get(13)?,
        promotion_cost: row.get(14)?,
        roi: row.get(15)?,
        efficiency_score: row.get(16)?,
        underperformed: row.get(17)?,
        rates: EffectRates {
            cannibalization_rate: row.get(18)?,
            pantry_loading_rate: row.get(19)?,
            halo_rate: row.get(20)?,
            pull_forward_rate: row.get(21)?,
        },
        weights_json: row.get(22)?,
        baseline_revision: row.get(23)?,
        created_at: row.get(24)?,
    })
}
