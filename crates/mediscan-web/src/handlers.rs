//! HTTP处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Form,
};
use mediscan_core::{MediscanError, SubmissionStatus};
use mediscan_database::{DatabasePool, DatabaseQueries, NewResult, NewSubmission};
use mediscan_inference::{ImageLocators, ScanAnalyzer};
use mediscan_storage::UploadStore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 应用共享状态
///
/// 所有外部依赖在进程启动时构造一次，经此注入各处理器
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabasePool>,
    pub store: Arc<UploadStore>,
    pub analyzer: Arc<ScanAnalyzer>,
}

/// API错误包装，映射为统一的JSON错误响应
pub struct ApiError(MediscanError);

impl From<MediscanError> for ApiError {
    fn from(e: MediscanError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            MediscanError::NotFound(_) => StatusCode::NOT_FOUND,
            MediscanError::Validation(_) => StatusCode::BAD_REQUEST,
            MediscanError::Download(_)
            | MediscanError::RemoteCall(_)
            | MediscanError::Timeout { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": true,
            "message": self.0.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Mediscan Web API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

/// 上传URL签发请求
#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub filename: String,
    pub content_type: String,
}

/// 签发对象存储直传URL
pub async fn generate_upload_url(
    State(state): State<AppState>,
    Json(request): Json<UploadUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Generating upload URL for {}", request.filename);

    let data = state
        .store
        .generate_upload_url(&request.filename, &request.content_type)
        .await?;

    Ok(Json(json!(data)))
}

/// 扫描提交表单
#[derive(Debug, Deserialize)]
pub struct SubmitScanForm {
    pub scan_name: String,
    pub modality: String,
    pub age: i32,
    pub sex: String,
    pub image_url: String,
    pub blob_name: String,
}

/// 接收扫描提交并派发后台分析
pub async fn submit_scan(
    State(state): State<AppState>,
    Form(form): Form<SubmitScanForm>,
) -> Result<impl IntoResponse, ApiError> {
    // 在边界处校验定位符可解析，后台任务不再面对畸形输入
    let locators = ImageLocators::parse(&form.image_url)?;
    if locators.is_empty() {
        return Err(MediscanError::Validation("image_url is required".to_string()).into());
    }

    let submission = NewSubmission::new(
        form.scan_name,
        form.modality,
        form.age,
        form.sex,
        form.image_url,
        form.blob_name,
    );

    let queries = DatabaseQueries::new(&state.db);
    let submission_id = queries.create_submission(&submission).await?;

    info!("Submission {} accepted, dispatching analysis", submission_id);

    let task_state = state.clone();
    tokio::spawn(async move {
        process_scan(task_state, submission_id).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "submission_id": submission_id,
            "status": "submitted",
            "message": "Scan submitted for processing"
        })),
    ))
}

/// 后台分析任务
///
/// 任何失败都落在提交状态上，不向上传播
async fn process_scan(state: AppState, submission_id: Uuid) {
    let queries = DatabaseQueries::new(&state.db);

    let submission = match queries.get_submission(&submission_id).await {
        Ok(Some(submission)) => submission,
        Ok(None) => {
            warn!("Submission {} vanished before processing", submission_id);
            return;
        }
        Err(e) => {
            error!("Failed to load submission {}: {}", submission_id, e);
            return;
        }
    };

    if let Err(e) = queries
        .update_submission_status(&submission_id, &SubmissionStatus::Processing)
        .await
    {
        error!("Failed to mark submission {} processing: {}", submission_id, e);
        return;
    }

    let order = submission.order();
    let locators = match ImageLocators::parse(&submission.image_url) {
        Ok(locators) => locators,
        Err(e) => {
            error!("Submission {} has malformed locators: {}", submission_id, e);
            let _ = queries
                .update_submission_status(&submission_id, &SubmissionStatus::Failed)
                .await;
            return;
        }
    };

    let started = Instant::now();
    let report = state.analyzer.analyze(&locators, &order).await;
    let processing_time = started.elapsed().as_secs_f64();

    info!(
        "Submission {} analyzed in {:.1}s with status {}",
        submission_id,
        processing_time,
        report.status.as_str()
    );

    let result = NewResult::from_report(
        submission_id,
        &submission.image_url,
        report,
        processing_time,
    );

    if let Err(e) = queries.save_result(&result).await {
        error!("Failed to save result for submission {}: {}", submission_id, e);
        let _ = queries
            .update_submission_status(&submission_id, &SubmissionStatus::Failed)
            .await;
    }
}

/// 查询提交及其分析结果
pub async fn get_result(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let queries = DatabaseQueries::new(&state.db);

    let data = queries
        .get_submission_with_result(&submission_id)
        .await?
        .ok_or_else(|| MediscanError::NotFound(format!("submission {}", submission_id)))?;

    let submission = &data.submission;
    let mut response = json!({
        "submission_id": submission.id,
        "status": submission.status.as_str(),
        "scan_name": submission.scan_name,
        "modality": submission.modality,
        "age": submission.age,
        "sex": submission.sex,
        "image_url": submission.image_url,
        "created_at": submission.created_at.to_rfc3339(),
    });

    // 已有分析结果时，平铺合并到响应中
    if let (Some(merged), Some(result)) = (response.as_object_mut(), &data.result) {
        merged.insert("status".to_string(), json!(result.status));
        merged.insert("quality".to_string(), json!(result.quality));
        merged.insert("scan_match".to_string(), json!(result.scan_match));
        merged.insert("modality_match".to_string(), json!(result.modality_match));
        merged.insert(
            "reason_of_rejection".to_string(),
            json!(result.reason_of_rejection),
        );
        merged.insert("diagnosis".to_string(), json!(result.diagnosis));
        merged.insert(
            "processing_time".to_string(),
            json!(result.processing_time),
        );
    }

    Ok(Json(response))
}

/// 列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

/// 查询最近的提交列表
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let queries = DatabaseQueries::new(&state.db);
    let submissions = queries.list_submissions(limit).await?;
    let total = submissions.len();

    Ok(Json(json!({
        "submissions": submissions,
        "total": total,
        "limit": limit
    })))
}

/// 查询系统统计
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let queries = DatabaseQueries::new(&state.db);
    let stats = queries.get_stats().await?;
    Ok(Json(json!(stats)))
}
