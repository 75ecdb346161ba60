//! 错误定义模块

use thiserror::Error;

/// Mediscan系统统一错误类型
#[derive(Error, Debug)]
pub enum MediscanError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("影像下载失败: {0}")]
    Download(String),

    #[error("远程推理调用失败: {0}")]
    RemoteCall(String),

    #[error("模型响应解析失败: {0}")]
    Parse(String),

    #[error("未知任务状态: {0}")]
    UnexpectedStatus(String),

    #[error("轮询超时: 任务 {job_id} 在 {attempts} 次尝试后仍未结束")]
    Timeout { job_id: String, attempts: u32 },

    #[error("网络错误: {0}")]
    Network(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// Mediscan系统统一结果类型
pub type Result<T> = std::result::Result<T, MediscanError>;
