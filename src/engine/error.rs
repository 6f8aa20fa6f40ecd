// ==========================================
// 促销基线估算系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 每个错误必须携带失败阶段与基线/促销标识，便于诊断
// 红线: 引擎内部不做自动重试
// ==========================================

use crate::domain::types::{BaselineStatus, Granularity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ==========================================
// CalcStage - 失败阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalcStage {
    Validate,     // 配置校验
    FetchHistory, // 拉取历史销售
    Preprocess,   // 异常值处理
    Fit,          // 模型拟合
    Score,        // 拟合质量评分
    Persist,      // 落库
    Decompose,    // 增量分解
}

impl CalcStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalcStage::Validate => "validate",
            CalcStage::FetchHistory => "fetch_history",
            CalcStage::Preprocess => "preprocess",
            CalcStage::Fit => "fit",
            CalcStage::Score => "score",
            CalcStage::Persist => "persist",
            CalcStage::Decompose => "decompose",
        }
    }
}

impl fmt::Display for CalcStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 输入错误（计算前拒绝） =====
    #[error("输入校验失败 [{stage}] {subject}: {message}")]
    InputValidation {
        stage: CalcStage,
        subject: String,
        message: String,
    },

    // ===== 数据不足（不静默降级） =====
    #[error("历史数据不足 [{stage}]: 需要至少 {required} 期，实际 {available} 期")]
    InsufficientData {
        stage: CalcStage,
        required: usize,
        available: usize,
    },

    #[error("历史序列不连续 [{stage}]: 第 {period_number} 期 {field} 应为 {expected}，实际 {found}")]
    HistoryGap {
        stage: CalcStage,
        period_number: usize,
        field: &'static str,
        expected: NaiveDate,
        found: NaiveDate,
    },

    #[error("季节历史不足: 粒度={granularity} 需要至少 {required} 期（一个完整季节周期），实际 {available} 期")]
    InsufficientSeasonalHistory {
        granularity: Granularity,
        required: usize,
        available: usize,
    },

    // ===== 数值错误 =====
    #[error("数值计算失败 [{stage}]: {message}")]
    Numeric { stage: CalcStage, message: String },

    // ===== 分解前置条件 =====
    #[error("基线未就绪: baseline_id={baseline_id}, promotion_id={promotion_id}, status={status}（需要 active/approved）")]
    BaselineNotReady {
        baseline_id: String,
        promotion_id: String,
        status: BaselineStatus,
    },

    #[error("窗口无重叠基线期: baseline_id={baseline_id}, promotion_id={promotion_id}, window=[{window_start}, {window_end}]")]
    NoOverlap {
        baseline_id: String,
        promotion_id: String,
        window_start: NaiveDate,
        window_end: NaiveDate,
    },

    // ===== 计算包装错误 =====
    #[error("基线计算失败 [{stage}] baseline_id={baseline_id}: {source}")]
    Calculation {
        stage: CalcStage,
        baseline_id: String,
        #[source]
        source: Box<EngineError>,
    },

    // ===== 生命周期错误 =====
    #[error("无效的状态转换: baseline_id={baseline_id}, from={from} to={to}")]
    InvalidStateTransition {
        baseline_id: String,
        from: BaselineStatus,
        to: BaselineStatus,
    },

    #[error("计算请求已被更新的请求取代: baseline_id={baseline_id}")]
    Superseded { baseline_id: String },

    #[error("基线计算超时: baseline_id={baseline_id}, timeout={timeout_ms}ms（基线保持 calculating，需重试或人工回滚）")]
    Timeout { baseline_id: String, timeout_ms: u64 },

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    // ===== 外部协作方错误 =====
    #[error("存储失败 [{stage}] {subject}: {message}")]
    Storage {
        stage: CalcStage,
        subject: String,
        message: String,
    },

    #[error("数据源失败 [{stage}] {subject}: {message}")]
    Provider {
        stage: CalcStage,
        subject: String,
        message: String,
    },
}

impl EngineError {
    /// 构造输入校验错误
    pub fn invalid(stage: CalcStage, subject: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::InputValidation {
            stage,
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// 构造存储错误
    pub fn storage(stage: CalcStage, subject: impl Into<String>, err: impl fmt::Display) -> Self {
        EngineError::Storage {
            stage,
            subject: subject.into(),
            message: err.to_string(),
        }
    }

    /// 构造数据源错误
    pub fn provider(stage: CalcStage, subject: impl Into<String>, err: impl fmt::Display) -> Self {
        EngineError::Provider {
            stage,
            subject: subject.into(),
            message: err.to_string(),
        }
    }

    /// 失败阶段（无阶段信息的错误返回 None）
    pub fn stage(&self) -> Option<CalcStage> {
        match self {
            EngineError::InputValidation { stage, .. }
            | EngineError::InsufficientData { stage, .. }
            | EngineError::HistoryGap { stage, .. }
            | EngineError::Numeric { stage, .. }
            | EngineError::Calculation { stage, .. }
            | EngineError::Storage { stage, .. }
            | EngineError::Provider { stage, .. } => Some(*stage),
            EngineError::InsufficientSeasonalHistory { .. } => Some(CalcStage::Fit),
            EngineError::BaselineNotReady { .. } | EngineError::NoOverlap { .. } => {
                Some(CalcStage::Decompose)
            }
            _ => None,
        }
    }

    /// 去掉 Calculation 包装，返回最内层原因
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::Calculation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 包装为 Calculation 错误（已包装的错误不重复包装）
    pub fn into_calculation(self, baseline_id: &str) -> Self {
        match self {
            EngineError::Calculation { .. } => self,
            other => EngineError::Calculation {
                stage: other.stage().unwrap_or(CalcStage::Persist),
                baseline_id: baseline_id.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
