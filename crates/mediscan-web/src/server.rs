//! Web服务器

use axum::{
    routing::{get, post},
    Router,
};
use mediscan_core::{MediscanError, Result};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers::{
    api_root, generate_upload_url, get_result, get_stats, health, list_submissions, submit_scan,
    AppState,
};

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = Self::create_app(state);
        Self { addr, app }
    }

    fn create_app(state: AppState) -> Router {
        Router::new()
            // 根路径
            .route("/", get(api_root))

            // 健康检查
            .route("/health", get(health))

            // API路由
            .nest("/api", api_routes())
            .with_state(state)

            // 全局中间件
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(
                        CorsLayer::new()
                            .allow_origin(Any)
                            .allow_methods(Any)
                            .allow_headers(Any),
                    ),
            )
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| MediscanError::Internal(format!("web server: {}", e)))?;

        Ok(())
    }
}

/// API 路由
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/generate-upload-url", post(generate_upload_url))
        .route("/submit-scan", post(submit_scan))
        .route("/result/:submission_id", get(get_result))
        .route("/submissions", get(list_submissions))
        .route("/stats", get(get_stats))
}
