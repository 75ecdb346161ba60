//! Mediscan服务器主程序

mod config;

use clap::Parser;
use config::AppConfig;
use mediscan_core::{MediscanError, Result};
use mediscan_database::{DatabasePool, DatabaseQueries};
use mediscan_inference::{DiagnosticClient, HttpImageFetcher, QualityClient, ScanAnalyzer};
use mediscan_storage::UploadStore;
use mediscan_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Mediscan服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "mediscan-server")]
#[command(about = "医学影像AI质检服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 服务器端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动Mediscan服务器...");

    let mut app_config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        app_config.server.port = port;
    }

    info!("Mediscan服务器配置:");
    info!("  监听地址: {}:{}", app_config.server.host, app_config.server.port);
    info!("  存储桶: {}", app_config.storage.bucket);
    info!("  诊断模型: {}", app_config.diagnostic.model);
    info!("  质量模型: {}", app_config.quality.model);

    // 数据库
    let db = Arc::new(
        DatabasePool::connect(
            &app_config.database.url,
            app_config.database.max_connections,
        )
        .await?,
    );
    DatabaseQueries::new(&db).create_tables().await?;

    // 对象存储
    let store = Arc::new(UploadStore::new(app_config.storage.clone())?);

    // 推理依赖在进程启动时构造一次，注入编排器
    let fetcher = Arc::new(HttpImageFetcher::new());
    let diagnostic = Arc::new(DiagnosticClient::new(app_config.diagnostic.clone()));
    let quality = Arc::new(QualityClient::new(app_config.quality.clone()));
    let analyzer = Arc::new(ScanAnalyzer::new(fetcher, diagnostic, quality));

    let state = AppState {
        db,
        store,
        analyzer,
    };

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|e| MediscanError::Config(format!("invalid listen address: {}", e)))?;

    // 启动Web服务器
    let server = WebServer::new(addr, state);
    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        return Err(e);
    }

    Ok(())
}
