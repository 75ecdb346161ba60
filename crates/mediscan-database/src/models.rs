//! 数据库模型

use chrono::{DateTime, Utc};
use mediscan_core::{
    AnalysisReport, ReportStatus, ScanQuality, Submission, SubmissionStatus,
};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库提交记录表
#[derive(Debug, FromRow)]
pub struct DbSubmission {
    pub id: Uuid,
    pub scan_name: String,
    pub modality: String,
    pub age: i32,
    pub sex: String,
    pub image_url: String,
    pub blob_name: String,
    pub status: String, // 存储为字符串，转换为SubmissionStatus枚举
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbSubmission> for Submission {
    fn from(db: DbSubmission) -> Self {
        Submission {
            id: db.id,
            scan_name: db.scan_name,
            modality: db.modality,
            age: db.age,
            sex: db.sex,
            image_url: db.image_url,
            blob_name: db.blob_name,
            status: match db.status.as_str() {
                "pending" => SubmissionStatus::Pending,
                "processing" => SubmissionStatus::Processing,
                "completed" => SubmissionStatus::Completed,
                "failed" => SubmissionStatus::Failed,
                _ => SubmissionStatus::Pending, // 默认状态
            },
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// 数据库分析结果表
#[derive(Debug, FromRow)]
pub struct DbResult {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub scan_name: String,
    pub image_path: String,
    pub age: i32,
    pub sex: String,
    pub modality: String,
    pub status: String,
    pub quality: String,
    pub scan_match: bool,
    pub modality_match: bool,
    pub reason_of_rejection: Option<String>,
    pub diagnosis: Option<String>,
    pub diagnostic_error: Option<String>,
    pub quality_error: Option<String>,
    pub processing_time: f64,
    pub created_at: DateTime<Utc>,
}

/// 供API返回的分析结果视图
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub status: ReportStatus,
    pub quality: ScanQuality,
    pub scan_match: bool,
    pub modality_match: bool,
    pub reason_of_rejection: Option<String>,
    pub diagnosis: Option<String>,
    pub diagnostic_error: Option<String>,
    pub quality_error: Option<String>,
    pub processing_time: f64,
}

impl From<DbResult> for ResultSummary {
    fn from(db: DbResult) -> Self {
        ResultSummary {
            status: match db.status.as_str() {
                "ACCEPTED" => ReportStatus::Accepted,
                "PENDING" => ReportStatus::Pending,
                _ => ReportStatus::Rejected,
            },
            quality: ScanQuality::parse(&db.quality),
            scan_match: db.scan_match,
            modality_match: db.modality_match,
            reason_of_rejection: db.reason_of_rejection,
            diagnosis: db.diagnosis,
            diagnostic_error: db.diagnostic_error,
            quality_error: db.quality_error,
            processing_time: db.processing_time,
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新提交插入模型
#[derive(Debug)]
pub struct NewSubmission {
    pub id: Uuid,
    pub scan_name: String,
    pub modality: String,
    pub age: i32,
    pub sex: String,
    pub image_url: String,
    pub blob_name: String,
}

impl NewSubmission {
    pub fn new(
        scan_name: String,
        modality: String,
        age: i32,
        sex: String,
        image_url: String,
        blob_name: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_name,
            modality,
            age,
            sex,
            image_url,
            blob_name,
        }
    }
}

/// 新分析结果插入模型
#[derive(Debug)]
pub struct NewResult {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub image_path: String,
    pub report: AnalysisReport,
    pub processing_time: f64,
}

impl NewResult {
    pub fn from_report(
        submission_id: Uuid,
        image_path: &str,
        report: AnalysisReport,
        processing_time: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            submission_id,
            image_path: image_path.to_string(),
            report,
            processing_time,
        }
    }
}
