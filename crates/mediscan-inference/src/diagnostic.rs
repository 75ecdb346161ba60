//! 诊断模型客户端
//!
//! 将影像URL与申请单提交给远端视觉语言模型的异步任务接口，
//! 轮询任务状态直至终态，再从回复文本中提取结构化判定

use crate::extract::parse_json_response;
use async_trait::async_trait;
use mediscan_core::{MediscanError, Order, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 诊断模型系统指令
const DIAGNOSTIC_SYSTEM_PROMPT: &str = r#"YOU ARE A RADIOLOGY AI. ANALYZE THE MEDICAL IMAGE AND RETURN A STRUCTURED REPORT.

The user provides:
- ordered_scan: {"scan_name": "...", "modality": "...", "age": "...", "sex": "..."}
- scan image(s)

TASKS:
1. Compare the body part shown in the image with the ordered scan_name.
   If they match then scan_match = true, otherwise scan_match = false.
2. Write a diagnosis describing only what is visible in the image,
   covering normal and abnormal findings. Do NOT mention the patient's
   age, sex, image quality or clinical history in the diagnosis field.

OUTPUT FORMAT (STRICT JSON):
{
  "scan_name": "...",
  "age": "...",
  "sex": "...",
  "scan_match": true,
  "modality": "...",
  "diagnosis": "..."
}
"#;

/// 诊断客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    /// 推理服务基地址
    pub base_url: String,
    /// API密钥
    pub api_key: String,
    /// 模型标识
    pub model: String,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 最大轮询次数，超出即判定超时
    pub max_poll_attempts: u32,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.runpod.ai/v2/medgemma".to_string(),
            api_key: String::new(),
            model: "google/medgemma-4b-it".to_string(),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 150,
        }
    }
}

/// 模型回显的年龄字段，可能是数字也可能是字符串
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgeField {
    Number(i64),
    Text(String),
}

/// 诊断判定结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticVerdict {
    pub scan_name: String,
    #[serde(default)]
    pub age: Option<AgeField>,
    #[serde(default)]
    pub sex: Option<String>,
    pub scan_match: bool,
    pub modality: String,
    pub diagnosis: String,
}

/// 诊断服务接口
#[async_trait]
pub trait DiagnosticProvider: Send + Sync {
    /// 对远程影像与申请单做诊断与部位匹配判定
    async fn diagnose(&self, image_urls: &[String], order: &Order) -> Result<DiagnosticVerdict>;
}

/// 任务提交响应
#[derive(Debug, Deserialize)]
struct JobSubmitResponse {
    id: String,
}

/// 任务状态响应
#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: String,
    #[serde(default)]
    output: Option<JobOutput>,
    #[serde(default)]
    error: Option<String>,
}

/// 任务输出，text字段携带含围栏JSON的回复文本
#[derive(Debug, Deserialize)]
struct JobOutput {
    text: String,
}

/// 轮询到的任务进展
#[derive(Debug)]
enum JobProgress {
    Running,
    Completed(DiagnosticVerdict),
}

/// 异步任务式诊断客户端
pub struct DiagnosticClient {
    client: reqwest::Client,
    config: DiagnosticConfig,
}

impl DiagnosticClient {
    pub fn new(config: DiagnosticConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// 提交分析任务，返回任务ID
    async fn submit_job(&self, image_urls: &[String], order: &Order) -> Result<String> {
        let url = format!("{}/run", self.config.base_url);
        let payload = json!({
            "input": {
                "model": self.config.model,
                "system_prompt": DIAGNOSTIC_SYSTEM_PROMPT,
                "order": order,
                "images": image_urls,
                "max_tokens": 1024,
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("diagnostic submit: {}", e)))?;

        if !response.status().is_success() {
            return Err(MediscanError::RemoteCall(format!(
                "diagnostic submit: HTTP {}",
                response.status()
            )));
        }

        let submit: JobSubmitResponse = response
            .json()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("diagnostic submit: {}", e)))?;

        debug!("Diagnostic job {} submitted", submit.id);
        Ok(submit.id)
    }

    /// 查询一次任务状态并分类
    async fn poll_job(&self, job_id: &str) -> Result<JobProgress> {
        let url = format!("{}/status/{}", self.config.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("diagnostic status: {}", e)))?;

        if !response.status().is_success() {
            return Err(MediscanError::RemoteCall(format!(
                "diagnostic status: HTTP {}",
                response.status()
            )));
        }

        let status: JobStatusResponse = response
            .json()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("diagnostic status: {}", e)))?;

        Self::classify_status(job_id, status)
    }

    /// 终态判定
    ///
    /// IN_QUEUE/IN_PROGRESS继续轮询，COMPLETED提取判定，FAILED与未知状态直接失败
    fn classify_status(job_id: &str, response: JobStatusResponse) -> Result<JobProgress> {
        let JobStatusResponse {
            status,
            output,
            error,
        } = response;

        match status.as_str() {
            "IN_QUEUE" | "IN_PROGRESS" => Ok(JobProgress::Running),
            "COMPLETED" => {
                let output = output.ok_or_else(|| {
                    MediscanError::Parse(format!("job {}: completed without output", job_id))
                })?;
                let verdict = parse_json_response(&output.text)?;
                Ok(JobProgress::Completed(verdict))
            }
            "FAILED" => Err(MediscanError::RemoteCall(format!(
                "job {} failed: {}",
                job_id,
                error.unwrap_or_else(|| "no detail".to_string())
            ))),
            other => Err(MediscanError::UnexpectedStatus(format!(
                "job {}: {}",
                job_id, other
            ))),
        }
    }
}

/// 按固定间隔轮询直至终态，尝试次数耗尽即判定超时
async fn poll_until_terminal<F, Fut>(
    job_id: &str,
    interval: Duration,
    max_attempts: u32,
    mut poll: F,
) -> Result<DiagnosticVerdict>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<JobProgress>>,
{
    for attempt in 1..=max_attempts {
        match poll().await? {
            JobProgress::Completed(verdict) => {
                info!("Diagnostic job {} completed after {} polls", job_id, attempt);
                return Ok(verdict);
            }
            JobProgress::Running => {
                tokio::time::sleep(interval).await;
            }
        }
    }

    warn!(
        "Diagnostic job {} still running after {} polls, giving up",
        job_id, max_attempts
    );
    Err(MediscanError::Timeout {
        job_id: job_id.to_string(),
        attempts: max_attempts,
    })
}

#[async_trait]
impl DiagnosticProvider for DiagnosticClient {
    async fn diagnose(&self, image_urls: &[String], order: &Order) -> Result<DiagnosticVerdict> {
        let job_id = self.submit_job(image_urls, order).await?;

        poll_until_terminal(
            &job_id,
            self.config.poll_interval,
            self.config.max_poll_attempts,
            || self.poll_job(&job_id),
        )
        .await
    }
}
