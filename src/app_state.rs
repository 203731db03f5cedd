use std::sync::Arc;

use crate::config::Settings;
use crate::engine::LlmEngine;
use crate::record_log::RecordLog;

/// Rocket 托管的共享状态：
/// - settings: 启动时构造的只读配置
/// - engine: 生成后端（stub 或 OpenAI 兼容）
/// - records: prompt/response 日志写入端
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: Arc<dyn LlmEngine>,
    pub records: RecordLog,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, engine: Arc<dyn LlmEngine>) -> Self {
        let records = RecordLog::new(settings.log_file.clone());
        Self {
            settings,
            engine,
            records,
        }
    }
}
