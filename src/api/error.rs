// ==========================================
// 促销基线估算系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Engine/Repository错误为用户友好的错误消息
// 红线: 错误信息必须包含失败阶段与基线/促销标识
// ==========================================

use crate::engine::error::{CalcStage, EngineError};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入与业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: baseline_id={baseline_id}, from={from} to={to}")]
    InvalidStateTransition {
        baseline_id: String,
        from: String,
        to: String,
    },

    /// 历史不足、基线未就绪、窗口无重叠等前置条件不满足
    #[error("前置条件不满足: {0}")]
    PreconditionFailed(String),

    // ==========================================
    // 计算错误
    // ==========================================
    #[error("基线计算失败 [{stage}] baseline_id={baseline_id}: {cause}")]
    CalculationFailed {
        baseline_id: String,
        stage: CalcStage,
        cause: String,
    },

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("计算请求已被取代: baseline_id={0}")]
    Superseded(String),

    #[error("计算超时: baseline_id={baseline_id}, timeout={timeout_ms}ms")]
    Timeout { baseline_id: String, timeout_ms: u64 },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InputValidation { .. } => ApiError::InvalidInput(err.to_string()),
            EngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            EngineError::InvalidStateTransition {
                baseline_id,
                from,
                to,
            } => ApiError::InvalidStateTransition {
                baseline_id,
                from: from.to_string(),
                to: to.to_string(),
            },
            EngineError::Calculation {
                stage,
                baseline_id,
                source,
            } => ApiError::CalculationFailed {
                baseline_id,
                stage,
                cause: source.to_string(),
            },
            EngineError::Superseded { baseline_id } => ApiError::Superseded(baseline_id),
            EngineError::Timeout {
                baseline_id,
                timeout_ms,
            } => ApiError::Timeout {
                baseline_id,
                timeout_ms,
            },
            EngineError::InsufficientData { .. }
            | EngineError::HistoryGap { .. }
            | EngineError::InsufficientSeasonalHistory { .. }
            | EngineError::BaselineNotReady { .. }
            | EngineError::NoOverlap { .. } => ApiError::PreconditionFailed(err.to_string()),
            EngineError::Numeric { .. } => ApiError::InternalError(err.to_string()),
            EngineError::Storage { .. } => ApiError::DatabaseError(err.to_string()),
            EngineError::Provider { .. } => ApiError::InternalError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
