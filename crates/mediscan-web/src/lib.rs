//! # Mediscan Web模块
//!
//! 对外HTTP接口：上传URL签发、扫描提交、结果查询与统计，
//! 提交后的分析在后台任务中执行。

pub mod handlers;
pub mod server;

pub use handlers::AppState;
pub use server::WebServer;
