//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 检查申请单
///
/// 提交时由调用方给出的患者/扫描元数据，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub scan_name: String, // 申请的扫描名称 (如 "CT Head")
    pub modality: String,  // 成像设备类型 (CT, MR, X-ray等)
    pub age: i32,          // 患者年龄
    pub sex: String,       // 患者性别
}

/// 影像质量等级
///
/// 反序列化接受模型返回的任意大小写写法，未识别的取值归为rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ScanQuality {
    #[serde(rename = "optimal")]
    Optimal,
    #[serde(rename = "sub-optimal")]
    SubOptimal,
    #[serde(rename = "rejected")]
    Rejected,
}

impl From<String> for ScanQuality {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl ScanQuality {
    /// 解析模型返回的质量等级字符串
    ///
    /// 未识别的取值一律归为Rejected，保证严格的判定策略不会被绕过
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "optimal" => Self::Optimal,
            "sub-optimal" | "suboptimal" => Self::SubOptimal,
            _ => Self::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::SubOptimal => "sub-optimal",
            Self::Rejected => "rejected",
        }
    }
}

/// 分析报告最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl ReportStatus {
    /// 由判定要素推导最终状态
    ///
    /// 状态是 (质量, 部位匹配, 设备匹配) 的纯函数，任一不满足即拒绝
    pub fn derive(quality: ScanQuality, scan_match: bool, modality_match: bool) -> Self {
        if scan_match && modality_match && quality != ScanQuality::Rejected {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// 扫描分析报告
///
/// 每次分析尝试生成一份，生成后不再修改；
/// 失败的尝试生成携带错误上下文的REJECTED报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub scan_name: String,
    pub age: i32,
    pub sex: String,
    pub modality: String,
    pub status: ReportStatus,
    pub quality: ScanQuality,
    pub scan_match: bool,
    pub modality_match: bool,
    pub reason_of_rejection: Option<String>,
    pub diagnosis: Option<String>,
    pub diagnostic_error: Option<String>,
    pub quality_error: Option<String>,
}

impl AnalysisReport {
    /// 由两个模型的判定结果合并生成报告
    pub fn from_verdicts(
        order: &Order,
        quality: ScanQuality,
        scan_match: bool,
        modality_match: bool,
        reason_of_rejection: Option<String>,
        diagnosis: String,
    ) -> Self {
        Self {
            scan_name: order.scan_name.clone(),
            age: order.age,
            sex: order.sex.clone(),
            modality: order.modality.clone(),
            status: ReportStatus::derive(quality, scan_match, modality_match),
            quality,
            scan_match,
            modality_match,
            reason_of_rejection,
            diagnosis: Some(diagnosis),
            diagnostic_error: None,
            quality_error: None,
        }
    }

    /// 生成携带错误上下文的拒绝报告
    ///
    /// 两个错误字段都会填充，调用方能看到完整的失败情况
    pub fn rejected(
        order: &Order,
        reason: &str,
        diagnostic_error: Option<String>,
        quality_error: Option<String>,
    ) -> Self {
        Self {
            scan_name: order.scan_name.clone(),
            age: order.age,
            sex: order.sex.clone(),
            modality: order.modality.clone(),
            status: ReportStatus::Rejected,
            quality: ScanQuality::Rejected,
            scan_match: false,
            modality_match: false,
            reason_of_rejection: Some(reason.to_string()),
            diagnosis: None,
            diagnostic_error,
            quality_error,
        }
    }
}

/// 提交记录状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// 扫描提交记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub scan_name: String,
    pub modality: String,
    pub age: i32,
    pub sex: String,
    pub image_url: String,  // 对象存储中的公开访问URL
    pub blob_name: String,  // 对象存储中的键
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    /// 提取本条提交对应的申请单
    pub fn order(&self) -> Order {
        Order {
            scan_name: self.scan_name.clone(),
            modality: self.modality.clone(),
            age: self.age,
            sex: self.sex.clone(),
        }
    }
}
