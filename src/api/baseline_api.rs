// ==========================================
// 促销基线估算系统 - 基线 API
// ==========================================
// 职责: 基线创建 / 计算 / 审批 / 归档 / 回滚 / 增量分解 / 查询
// 说明: 引擎为同步实现；异步入口经 spawn_blocking 派发并施加超时
// 红线: 超时不提交任何数据，基线保持 calculating，需重试或 force_rollback
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::baseline::{Baseline, BaselinePeriod, NewBaseline};
use crate::domain::decomposition::VolumeDecomposition;
use crate::domain::types::{BaselineStatus, CalculationMethod};
use crate::engine::calculator::{BaselineCalculator, CalculationResult};
use crate::engine::decomposer::{DecompositionRequest, VolumeDecomposer};
use crate::engine::validation::validate_new_baseline;
use crate::repository::{BaselineRepository, DecompositionRepository};

// ==========================================
// CalculationSummary - 计算结果摘要
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationSummary {
    pub baseline_id: String,
    pub status: BaselineStatus,
    pub calculation_method: CalculationMethod,
    pub revision: i32,
    pub period_count: usize,
    pub total_base_volume: Option<f64>,
    pub avg_weekly_volume: Option<f64>,
    pub r_squared: Option<f64>,
    pub mape: Option<f64>,
    pub trend_coefficient: Option<f64>,
    pub confidence_half_width: Option<f64>,
    pub outliers_replaced: usize,
    pub model_parameters: Vec<(String, f64)>,
    pub calculated_at: Option<NaiveDateTime>,
}

impl From<CalculationResult> for CalculationSummary {
    fn from(result: CalculationResult) -> Self {
        let b = result.baseline;
        Self {
            baseline_id: b.baseline_id,
            status: b.status,
            calculation_method: b.calculation_method,
            revision: b.revision,
            period_count: result.periods.len(),
            total_base_volume: b.total_base_volume,
            avg_weekly_volume: b.avg_weekly_volume,
            r_squared: b.r_squared,
            mape: b.mape,
            trend_coefficient: b.trend_coefficient,
            confidence_half_width: b.confidence_half_width,
            outliers_replaced: result.outliers_replaced.len(),
            model_parameters: result.model_parameters,
            calculated_at: b.calculated_at,
        }
    }
}

// ==========================================
// BaselineApi
// ==========================================
pub struct BaselineApi {
    baseline_repo: Arc<BaselineRepository>,
    decomposition_repo: Arc<DecompositionRepository>,
    calculator: Arc<BaselineCalculator>,
    decomposer: Arc<VolumeDecomposer>,
    calc_timeout: Duration,
}

impl BaselineApi {
    pub fn new(
        baseline_repo: Arc<BaselineRepository>,
        decomposition_repo: Arc<DecompositionRepository>,
        calculator: Arc<BaselineCalculator>,
        decomposer: Arc<VolumeDecomposer>,
        calc_timeout_ms: u64,
    ) -> Self {
        Self {
            baseline_repo,
            decomposition_repo,
            calculator,
            decomposer,
            calc_timeout: Duration::from_millis(calc_timeout_ms),
        }
    }

    /// 覆盖计算超时
    pub fn with_calc_timeout(mut self, timeout: Duration) -> Self {
        self.calc_timeout = timeout;
        self
    }

    // ==========================================
    // 创建与查询
    // ==========================================

    /// 创建草稿基线
    ///
    /// # 错误
    /// - InvalidInput: 名称为空、未知类型/方法/粒度、数值配置非法
    pub fn create_baseline(&self, draft: NewBaseline) -> ApiResult<Baseline> {
        let kinds = validate_new_baseline(&draft)?;
        let now = Utc::now().naive_utc();

        let baseline = Baseline {
            baseline_id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            baseline_type: kinds.baseline_type,
            calculation_method: kinds.calculation_method,
            granularity: kinds.granularity,
            scope: draft.scope,
            start_date: draft.start_date,
            end_date: draft.end_date,
            base_year: draft.base_year.unwrap_or_else(|| draft.start_date.year()),
            periods_used: draft.periods_used,
            seasonality_enabled: draft.seasonality_enabled,
            trend_enabled: draft.trend_enabled,
            outlier_removal_enabled: draft.outlier_removal_enabled,
            outlier_threshold: draft.outlier_threshold,
            confidence_level: draft.confidence_level,
            status: BaselineStatus::Draft,
            prior_status: None,
            revision: 0,
            total_base_volume: None,
            avg_weekly_volume: None,
            r_squared: None,
            mape: None,
            trend_coefficient: None,
            confidence_half_width: None,
            calculated_at: None,
            created_at: now,
            updated_at: now,
        };

        self.baseline_repo.insert(&baseline)?;
        tracing::info!(
            baseline_id = %baseline.baseline_id,
            method = %baseline.calculation_method,
            granularity = %baseline.granularity,
            "基线已创建"
        );
        Ok(baseline)
    }

    pub fn get_baseline(&self, baseline_id: &str) -> ApiResult<Baseline> {
        ensure_id(baseline_id, "基线ID")?;
        self.baseline_repo
            .find_by_id(baseline_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Baseline(id={})不存在", baseline_id)))
    }

    pub fn list_baselines(&self, status: Option<BaselineStatus>) -> ApiResult<Vec<Baseline>> {
        Ok(self.baseline_repo.list(status)?)
    }

    pub fn list_periods(&self, baseline_id: &str) -> ApiResult<Vec<BaselinePeriod>> {
        ensure_id(baseline_id, "基线ID")?;
        Ok(self.baseline_repo.find_periods(baseline_id)?)
    }

    // ==========================================
    // 计算
    // ==========================================

    /// 同步计算（在调用线程上执行，无超时）
    pub fn calculate_baseline(&self, baseline_id: &str) -> ApiResult<CalculationSummary> {
        ensure_id(baseline_id, "基线ID")?;
        let result = self.calculator.calculate(baseline_id)?;
        Ok(result.into())
    }

    /// 带超时的异步计算
    ///
    /// 先领票再派发；超时后作废该票，在途任务跑完也不会提交
    pub async fn calculate_baseline_with_timeout(
        &self,
        baseline_id: &str,
    ) -> ApiResult<CalculationSummary> {
        ensure_id(baseline_id, "基线ID")?;

        let calculator = Arc::clone(&self.calculator);
        let ticket = calculator.issue_ticket(baseline_id);
        let handle = tokio::task::spawn_blocking(move || calculator.calculate_with_ticket(ticket));

        match tokio::time::timeout(self.calc_timeout, handle).await {
            Ok(Ok(result)) => Ok(result?.into()),
            Ok(Err(join_err)) => Err(ApiError::InternalError(format!(
                "计算任务异常终止: baseline_id={}, {}",
                baseline_id, join_err
            ))),
            Err(_) => {
                self.calculator.abandon(baseline_id);
                let timeout_ms = self.calc_timeout.as_millis() as u64;
                tracing::warn!(baseline_id, timeout_ms, "基线计算超时，在途计算已作废");
                Err(ApiError::Timeout {
                    baseline_id: baseline_id.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// 并行计算多个基线，按输入顺序逐个返回结果
    pub async fn calculate_many(
        &self,
        baseline_ids: &[String],
    ) -> Vec<(String, ApiResult<CalculationSummary>)> {
        let futures = baseline_ids
            .iter()
            .map(|id| async move { (id.clone(), self.calculate_baseline_with_timeout(id).await) });
        futures::future::join_all(futures).await
    }

    // ==========================================
    // 生命周期
    // ==========================================

    pub fn approve_baseline(&self, baseline_id: &str) -> ApiResult<Baseline> {
        ensure_id(baseline_id, "基线ID")?;
        let baseline = self.calculator.approve(baseline_id)?;
        tracing::info!(baseline_id, "基线已审批");
        Ok(baseline)
    }

    pub fn archive_baseline(&self, baseline_id: &str) -> ApiResult<Baseline> {
        ensure_id(baseline_id, "基线ID")?;
        let baseline = self.calculator.archive(baseline_id)?;
        tracing::info!(baseline_id, "基线已归档");
        Ok(baseline)
    }

    /// 人工回滚卡在 calculating 的基线
    pub fn force_rollback(&self, baseline_id: &str) -> ApiResult<Baseline> {
        ensure_id(baseline_id, "基线ID")?;
        Ok(self.calculator.force_rollback(baseline_id)?)
    }

    // ==========================================
    // 增量分解
    // ==========================================

    pub fn decompose_volume(&self, request: DecompositionRequest) -> ApiResult<VolumeDecomposition> {
        ensure_id(&request.baseline_id, "基线ID")?;
        ensure_id(&request.promotion_id, "促销ID")?;
        Ok(self.decomposer.decompose(&request)?)
    }

    pub fn get_decomposition(&self, decomposition_id: &str) -> ApiResult<VolumeDecomposition> {
        ensure_id(decomposition_id, "分解ID")?;
        self.decomposition_repo
            .find_by_id(decomposition_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("VolumeDecomposition(id={})不存在", decomposition_id))
            })
    }

    pub fn list_decompositions(&self, baseline_id: &str) -> ApiResult<Vec<VolumeDecomposition>> {
        ensure_id(baseline_id, "基线ID")?;
        Ok(self.decomposition_repo.list_by_baseline(baseline_id)?)
    }
}

fn ensure_id(id: &str, label: &str) -> ApiResult<()> {
    if id.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", label)));
    }
    Ok(())
}
