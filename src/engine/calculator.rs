// ==========================================
// 促销基线估算系统 - 基线计算编排
// ==========================================
// 流程: 拉取范围历史 → 异常值处理 → 模型拟合 → 拟合评分
//       → 事务内整体替换基线期 + 回写汇总 + 状态 active
// 状态机: draft → calculating → active → approved
//         active / approved → calculating（重算）
//         任意稳定态 → archived（终态）
// 红线: 全有或全无；失败时恢复计算前状态，不留半套基线期
// 红线: 历史期必须连续，缺期时在拉取阶段拒绝
// 红线: 同一基线串行计算，过期请求不写数据（CalculationGate）
// ==========================================

use crate::config::EngineSettings;
use crate::domain::baseline::{Baseline, BaselineAggregates, BaselinePeriod};
use crate::domain::sales::SalesPeriod;
use crate::domain::types::{BaselineStatus, Granularity};
use crate::engine::error::{CalcStage, EngineError, EngineResult};
use crate::engine::gate::{CalcTicket, CalculationGate};
use crate::engine::models::{model_for, ModelFit, ModelSettings};
use crate::engine::preprocessor::{OutlierSettings, TimeSeriesPreprocessor};
use crate::engine::providers::HistoricalSalesProvider;
use crate::engine::scorer::{FitStatistics, StatisticalScorer};
use crate::engine::validation::validate_baseline_config;
use crate::repository::BaselineRepository;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

// ==========================================
// CalculationResult - 计算结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub baseline: Baseline,
    pub periods: Vec<BaselinePeriod>,
    pub statistics: FitStatistics,
    /// 被替换为局部中位数的期下标（从 0 开始）
    pub outliers_replaced: Vec<usize>,
    /// 模型内部参数（平滑系数、季节因子等）
    pub model_parameters: Vec<(String, f64)>,
}

/// 计算阶段产物（尚未落库）
struct ComputedBaseline {
    periods: Vec<BaselinePeriod>,
    aggregates: BaselineAggregates,
    statistics: FitStatistics,
    outliers_replaced: Vec<usize>,
    model_parameters: Vec<(String, f64)>,
}

// ==========================================
// BaselineCalculator
// ==========================================
pub struct BaselineCalculator {
    baseline_repo: Arc<BaselineRepository>,
    sales_provider: Arc<dyn HistoricalSalesProvider>,
    gate: Arc<CalculationGate>,
    preprocessor: TimeSeriesPreprocessor,
    scorer: StatisticalScorer,
    model_settings: ModelSettings,
}

impl BaselineCalculator {
    pub fn new(
        baseline_repo: Arc<BaselineRepository>,
        sales_provider: Arc<dyn HistoricalSalesProvider>,
        gate: Arc<CalculationGate>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            baseline_repo,
            sales_provider,
            gate,
            preprocessor: TimeSeriesPreprocessor::new(settings.outlier_median_window),
            scorer: StatisticalScorer::new(),
            model_settings: settings.model_settings(),
        }
    }

    /// 领取计算票
    ///
    /// 异步调用方需在派发任务之前领票，超时后 abandon 才能确保作废的是这次请求
    pub fn issue_ticket(&self, baseline_id: &str) -> CalcTicket {
        self.gate.issue(baseline_id)
    }

    /// 作废该基线的在途计算（超时后调用）
    pub fn abandon(&self, baseline_id: &str) {
        self.gate.abandon(baseline_id);
    }

    /// 计算基线
    pub fn calculate(&self, baseline_id: &str) -> EngineResult<CalculationResult> {
        let ticket = self.issue_ticket(baseline_id);
        self.calculate_with_ticket(ticket)
    }

    /// 持票计算基线
    ///
    /// # 错误
    /// - NotFound / InvalidStateTransition / InputValidation: 计算前拒绝，状态不变
    /// - Superseded: 有更新的请求，本次不写任何数据
    /// - Calculation: 计算或落库失败，已恢复计算前状态
    #[instrument(skip(self, ticket), fields(
        baseline_id = %ticket.baseline_id(),
        generation = ticket.generation()
    ))]
    pub fn calculate_with_ticket(&self, ticket: CalcTicket) -> EngineResult<CalculationResult> {
        let started = Instant::now();
        let baseline_id = ticket.baseline_id().to_string();
        let _run = ticket.acquire();

        let baseline = ticket.run_if_current(|| self.begin(&baseline_id))?;
        let prior = baseline.prior_status.unwrap_or(BaselineStatus::Draft);

        let computed = match self.compute(&baseline) {
            Ok(c) => c,
            Err(e) => return Err(self.fail(&ticket, prior, e)),
        };

        let committed = ticket.run_if_current(|| {
            self.baseline_repo
                .commit_calculation(&baseline_id, &computed.aggregates, &computed.periods)
                .map_err(|e| EngineError::storage(CalcStage::Persist, &baseline_id, e))
        });

        let updated = match committed {
            Ok(b) => b,
            Err(e @ EngineError::Superseded { .. }) => {
                tracing::info!(baseline_id = %baseline_id, "计算结果已被更新的请求取代，未提交");
                return Err(e);
            }
            Err(e) => return Err(self.fail(&ticket, prior, e)),
        };

        tracing::info!(
            baseline_id = %baseline_id,
            method = %updated.calculation_method,
            periods = computed.periods.len(),
            outliers = computed.outliers_replaced.len(),
            revision = updated.revision,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "基线计算完成"
        );

        Ok(CalculationResult {
            baseline: updated,
            periods: computed.periods,
            statistics: computed.statistics,
            outliers_replaced: computed.outliers_replaced,
            model_parameters: computed.model_parameters,
        })
    }

    /// 审批: active → approved，不重算
    pub fn approve(&self, baseline_id: &str) -> EngineResult<Baseline> {
        self.transition(baseline_id, BaselineStatus::Approved)
    }

    /// 归档: 任意稳定态 → archived
    pub fn archive(&self, baseline_id: &str) -> EngineResult<Baseline> {
        self.transition(baseline_id, BaselineStatus::Archived)
    }

    /// 人工回滚卡在 calculating 的基线（超时后使用）
    ///
    /// 先作废在途计算，再恢复计算前状态（无记录时回到 draft）
    pub fn force_rollback(&self, baseline_id: &str) -> EngineResult<Baseline> {
        let baseline = self.load(baseline_id, CalcStage::Persist)?;
        let target = baseline.prior_status.unwrap_or(BaselineStatus::Draft);
        if baseline.status != BaselineStatus::Calculating {
            return Err(EngineError::InvalidStateTransition {
                baseline_id: baseline_id.to_string(),
                from: baseline.status,
                to: target,
            });
        }

        self.gate.abandon(baseline_id);
        self.baseline_repo
            .restore_status(baseline_id, target)
            .map_err(|e| EngineError::storage(CalcStage::Persist, baseline_id, e))?;

        tracing::warn!(baseline_id, restored = %target, "基线已人工回滚");
        self.load(baseline_id, CalcStage::Persist)
    }

    // ==========================================
    // 内部流程
    // ==========================================

    fn load(&self, baseline_id: &str, stage: CalcStage) -> EngineResult<Baseline> {
        self.baseline_repo
            .find_by_id(baseline_id)
            .map_err(|e| EngineError::storage(stage, baseline_id, e))?
            .ok_or_else(|| EngineError::NotFound {
                entity: "Baseline".to_string(),
                id: baseline_id.to_string(),
            })
    }

    /// 校验并进入 calculating
    ///
    /// 已处于 calculating（上次超时未回滚）时视为重试，沿用记录的原状态
    fn begin(&self, baseline_id: &str) -> EngineResult<Baseline> {
        let baseline = self.load(baseline_id, CalcStage::Validate)?;

        let prior = match baseline.status {
            BaselineStatus::Calculating => baseline.prior_status.unwrap_or(BaselineStatus::Draft),
            status if status.can_transition_to(BaselineStatus::Calculating) => status,
            status => {
                return Err(EngineError::InvalidStateTransition {
                    baseline_id: baseline_id.to_string(),
                    from: status,
                    to: BaselineStatus::Calculating,
                })
            }
        };

        validate_baseline_config(&baseline)?;

        self.baseline_repo
            .mark_calculating(baseline_id, prior)
            .map_err(|e| EngineError::storage(CalcStage::Validate, baseline_id, e))
    }

    /// 失败收尾: 票仍有效时恢复原状态，统一包装为 Calculation
    fn fail(&self, ticket: &CalcTicket, prior: BaselineStatus, err: EngineError) -> EngineError {
        let baseline_id = ticket.baseline_id();
        let restored = ticket.run_if_current(|| {
            self.baseline_repo
                .restore_status(baseline_id, prior)
                .map_err(|e| EngineError::storage(CalcStage::Persist, baseline_id, e))
        });
        if let Err(restore_err) = restored {
            tracing::error!(baseline_id, error = %restore_err, "恢复计算前状态失败");
        }

        let wrapped = err.into_calculation(baseline_id);
        tracing::warn!(baseline_id, error = %wrapped, "基线计算失败");
        wrapped
    }

    /// 纯计算部分（除拉取历史外无 I/O）
    fn compute(&self, baseline: &Baseline) -> EngineResult<ComputedBaseline> {
        let history = self.fetch_history(baseline)?;

        let actual: Vec<f64> = history
            .iter()
            .map(|p| p.measure(baseline.baseline_type))
            .collect();
        let promoted: Vec<bool> = history.iter().map(|p| p.is_promoted).collect();

        let cleaned = self.preprocessor.clean(
            &actual,
            &OutlierSettings {
                enabled: baseline.outlier_removal_enabled,
                threshold: baseline.outlier_threshold,
                seasonality_enabled: baseline.seasonality_enabled,
                seasonal_cycle: baseline.granularity.seasonal_cycle(),
            },
        )?;

        let model = model_for(baseline.calculation_method, &self.model_settings);
        let fit = model.fit(&cleaned.values, &baseline.model_config())?;
        let base = checked_base_values(&fit, actual.len())?;

        let statistics = self.scorer.score(
            &actual,
            &base,
            &promoted,
            baseline.confidence_level,
            fit.trend_coefficient,
        )?;

        let periods = build_periods(baseline, &history, &fit, &base);
        let aggregates = aggregate(&periods, &statistics);

        Ok(ComputedBaseline {
            periods,
            aggregates,
            statistics,
            outliers_replaced: cleaned.replaced,
            model_parameters: fit.parameters,
        })
    }

    /// 拉取范围历史，取最近 periods_used 期
    fn fetch_history(&self, baseline: &Baseline) -> EngineResult<Vec<SalesPeriod>> {
        let mut history = self
            .sales_provider
            .get_series(
                &baseline.scope,
                baseline.granularity,
                baseline.start_date,
                baseline.end_date,
            )
            .map_err(|e| EngineError::provider(CalcStage::FetchHistory, &baseline.baseline_id, e))?;

        history.sort_by_key(|p| p.period_start);
        let keep = usize::try_from(baseline.periods_used).unwrap_or(0);
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }

        if history.is_empty() {
            return Err(EngineError::InsufficientData {
                stage: CalcStage::FetchHistory,
                required: 1,
                available: 0,
            });
        }

        ensure_contiguous(baseline.granularity, &history)?;

        tracing::debug!(
            baseline_id = %baseline.baseline_id,
            periods = history.len(),
            requested = baseline.periods_used,
            "历史销售已加载"
        );
        Ok(history)
    }

    fn transition(&self, baseline_id: &str, target: BaselineStatus) -> EngineResult<Baseline> {
        let baseline = self.load(baseline_id, CalcStage::Persist)?;
        let invalid = || EngineError::InvalidStateTransition {
            baseline_id: baseline_id.to_string(),
            from: baseline.status,
            to: target,
        };

        if !baseline.status.can_transition_to(target) {
            return Err(invalid());
        }

        // 条件更新: 期间状态被并发修改时不覆盖
        let applied = self
            .baseline_repo
            .transition_status(baseline_id, baseline.status, target)
            .map_err(|e| EngineError::storage(CalcStage::Persist, baseline_id, e))?;
        if !applied {
            let current = self.load(baseline_id, CalcStage::Persist)?;
            return Err(EngineError::InvalidStateTransition {
                baseline_id: baseline_id.to_string(),
                from: current.status,
                to: target,
            });
        }

        tracing::info!(baseline_id, from = %baseline.status, to = %target, "基线状态变更");
        self.load(baseline_id, CalcStage::Persist)
    }
}

/// 校验历史期首尾相接且每期恰好覆盖一个粒度单位
///
/// 缺期或重叠直接拒绝，不补齐
fn ensure_contiguous(granularity: Granularity, history: &[SalesPeriod]) -> EngineResult<()> {
    let gap = |period_number: usize, field: &'static str, expected: NaiveDate, found: NaiveDate| {
        EngineError::HistoryGap {
            stage: CalcStage::FetchHistory,
            period_number,
            field,
            expected,
            found,
        }
    };

    for (i, p) in history.iter().enumerate() {
        let expected_end = granularity.period_end(p.period_start);
        if p.period_end != expected_end {
            return Err(gap(i + 1, "period_end", expected_end, p.period_end));
        }
        if let Some(next) = history.get(i + 1) {
            let expected_start = granularity.next_period_start(p.period_start);
            if next.period_start != expected_start {
                return Err(gap(i + 2, "period_start", expected_start, next.period_start));
            }
        }
    }
    Ok(())
}

/// 校验模型输出并截断为非负
fn checked_base_values(fit: &ModelFit, expected: usize) -> EngineResult<Vec<f64>> {
    if fit.estimates.len() != expected {
        return Err(EngineError::Numeric {
            stage: CalcStage::Fit,
            message: format!(
                "模型输出期数 {} 与历史期数 {} 不一致",
                fit.estimates.len(),
                expected
            ),
        });
    }

    fit.estimates
        .iter()
        .enumerate()
        .map(|(i, e)| {
            if e.base_volume.is_finite() && e.seasonality_factor.is_finite() {
                Ok(e.base_volume.max(0.0))
            } else {
                Err(EngineError::Numeric {
                    stage: CalcStage::Fit,
                    message: format!("第 {} 期基线值非有限数: {}", i + 1, e.base_volume),
                })
            }
        })
        .collect()
}

fn build_periods(
    baseline: &Baseline,
    history: &[SalesPeriod],
    fit: &ModelFit,
    base: &[f64],
) -> Vec<BaselinePeriod> {
    history
        .iter()
        .zip(fit.estimates.iter())
        .zip(base.iter())
        .enumerate()
        .map(|(i, ((sales, estimate), &base_volume))| {
            let actual_volume = sales.measure(baseline.baseline_type);
            let variance_volume = actual_volume - base_volume;
            BaselinePeriod {
                baseline_id: baseline.baseline_id.clone(),
                period_number: i as i32 + 1,
                period_label: baseline.granularity.period_label(sales.period_start),
                period_start: sales.period_start,
                period_end: sales.period_end,
                base_volume,
                seasonality_factor: estimate.seasonality_factor,
                trend_adjustment: estimate.trend_adjustment,
                actual_volume,
                variance_volume,
                variance_pct: (base_volume > 0.0).then(|| variance_volume / base_volume * 100.0),
                is_promoted: sales.is_promoted,
                incremental_volume: if sales.is_promoted {
                    variance_volume.max(0.0)
                } else {
                    0.0
                },
            }
        })
        .collect()
}

fn aggregate(periods: &[BaselinePeriod], statistics: &FitStatistics) -> BaselineAggregates {
    let total_base_volume: f64 = periods.iter().map(|p| p.base_volume).sum();
    let total_days: i64 = periods.iter().map(|p| p.day_count()).sum();
    let weeks = total_days as f64 / 7.0;

    BaselineAggregates {
        total_base_volume,
        avg_weekly_volume: if weeks > 0.0 {
            total_base_volume / weeks
        } else {
            0.0
        },
        r_squared: statistics.r_squared,
        mape: statistics.mape,
        trend_coefficient: statistics.trend_coefficient,
        confidence_half_width: statistics.confidence_half_width,
        calculated_at: Utc::now().naive_utc(),
    }
}
