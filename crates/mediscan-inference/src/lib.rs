//! # Mediscan推理模块
//!
//! 封装扫描分析所需的全部远程推理能力，包括：
//! - 影像获取器：把远程影像下载到受守卫保护的本地临时文件
//! - 诊断客户端：异步任务式视觉语言模型接口，轮询至终态
//! - 质量客户端：单次调用式生成模型接口
//! - 扫描分析编排器：并发调用两个模型并按固定策略合并判定

pub mod analyzer;
pub mod diagnostic;
pub mod extract;
pub mod fetcher;
pub mod locator;
pub mod quality;

pub use analyzer::ScanAnalyzer;
pub use diagnostic::{DiagnosticClient, DiagnosticConfig, DiagnosticProvider, DiagnosticVerdict};
pub use fetcher::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use locator::ImageLocators;
pub use quality::{QualityClient, QualityConfig, QualityProvider, QualityVerdict};
