// ==========================================
// 促销基线估算系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod baseline_repo;
pub mod decomposition_repo;
pub mod error;
pub mod promotion_repo;
pub mod sales_history_repo;

// 重导出核心仓储
pub use baseline_repo::BaselineRepository;
pub use decomposition_repo::DecompositionRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use promotion_repo::PromotionRepository;
pub use sales_history_repo::SalesHistoryRepository;
