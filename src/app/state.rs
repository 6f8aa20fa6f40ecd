// ==========================================
// 促销基线估算系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 所有仓储共享同一个 SQLite 连接
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::BaselineApi;
use crate::config::config_manager::ConfigManager;
use crate::config::EngineSettings;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{BaselineCalculator, CalculationGate, VolumeDecomposer};
use crate::repository::{
    BaselineRepository, DecompositionRepository, PromotionRepository, SalesHistoryRepository,
};

/// 应用状态
///
/// 包含API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 基线API
    pub baseline_api: Arc<BaselineApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 启动时加载的引擎参数
    pub settings: EngineSettings,

    /// 历史销售仓储（数据录入）
    pub sales_history_repo: Arc<SalesHistoryRepository>,

    /// 促销仓储（数据录入）
    pub promotion_repo: Arc<PromotionRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并建表
    /// 2. 从 config_kv 加载引擎参数
    /// 3. 初始化仓储、引擎与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let settings = config_manager
            .load_engine_settings()
            .map_err(|e| format!("加载引擎参数失败: {}", e))?;

        // ==========================================
        // Repository层
        // ==========================================
        let baseline_repo = Arc::new(BaselineRepository::new(conn.clone()));
        let decomposition_repo = Arc::new(DecompositionRepository::new(conn.clone()));
        let sales_history_repo = Arc::new(SalesHistoryRepository::new(conn.clone()));
        let promotion_repo = Arc::new(PromotionRepository::new(conn.clone()));

        // ==========================================
        // Engine层
        // ==========================================
        let gate = Arc::new(CalculationGate::new());
        let calculator = Arc::new(BaselineCalculator::new(
            baseline_repo.clone(),
            sales_history_repo.clone(),
            gate,
            &settings,
        ));
        let decomposer = Arc::new(VolumeDecomposer::new(
            baseline_repo.clone(),
            decomposition_repo.clone(),
            promotion_repo.clone(),
            settings.efficiency_weights.clone(),
        ));

        // ==========================================
        // API层
        // ==========================================
        let baseline_api = Arc::new(BaselineApi::new(
            baseline_repo,
            decomposition_repo,
            calculator,
            decomposer,
            settings.calc_timeout_ms,
        ));

        tracing::info!(
            calc_timeout_ms = settings.calc_timeout_ms,
            "AppState初始化完成"
        );

        Ok(Self {
            db_path,
            baseline_api,
            config_manager,
            settings,
            sales_history_repo,
            promotion_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 PROMO_BASELINE_DB_PATH，其次为用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("PROMO_BASELINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./promo_baseline.db");

    if let Some(data_dir) = dirs::data_dir() {
        // 开发环境使用独立目录，避免污染生产数据
        #[cfg(debug_assertions)]
        let dir = data_dir.join("promo-baseline-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("promo-baseline");

        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("promo_baseline.db");
        }
    }

    path.to_string_lossy().to_string()
}
