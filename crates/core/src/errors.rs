use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务元素加载失败: {0}")]
    ElementLoad(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("调度任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("未注册的任务执行单元: {0}")]
    RunnableNotFound(String),

    #[error("生命周期状态错误: {0}")]
    Lifecycle(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
