//! 质量评估模型客户端
//!
//! 单次同步调用生成式模型，输入为系统提示、本地影像与申请单上下文，
//! 从回复文本中提取质量/匹配判定

use crate::extract::parse_json_response;
use async_trait::async_trait;
use base64::Engine;
use mediscan_core::{MediscanError, Order, Result, ScanQuality};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

/// 质量评估系统指令
const QUALITY_SYSTEM_PROMPT: &str = r#"YOU ARE AN AI SPECIALIZED IN MEDICAL IMAGE QUALITY ASSESSMENT.

INPUT:
- a medical scan image
- the ordered scan details

TASKS:
1. Examine the image for clarity, artifacts, blur and noise, then assign
   image_quality:
   - "optimal": clear and sharp, no artifacts or blur
   - "sub-optimal": minor issues but still diagnostically useful
   - "rejected": unreadable, heavy artifacts or critical structures missing
2. Set scan_match to whether the imaged body part matches the ordered scan.
3. Set modality_match to whether the imaging modality matches the order.
4. If anything disqualifies the scan, explain it in reason_of_rejection,
   otherwise use null.

OUTPUT FORMAT (STRICT JSON):
{
  "image_quality": "optimal",
  "scan_match": true,
  "modality_match": true,
  "reason_of_rejection": null
}
"#;

/// 质量客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// 生成式模型服务基地址
    pub base_url: String,
    /// API密钥
    pub api_key: String,
    /// 模型标识
    pub model: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

/// 质量判定结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub image_quality: ScanQuality,
    pub scan_match: bool,
    pub modality_match: bool,
    #[serde(default)]
    pub reason_of_rejection: Option<String>,
}

/// 质量评估接口
#[async_trait]
pub trait QualityProvider: Send + Sync {
    /// 对本地影像文件与申请单做质量评估
    async fn assess(&self, image_paths: &[PathBuf], order: &Order) -> Result<QualityVerdict>;
}

/// 响应的候选回复结构
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// 单次调用式质量客户端
pub struct QualityClient {
    client: reqwest::Client,
    config: QualityConfig,
}

impl QualityClient {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// 组装多部分请求体：系统提示 + 内联影像 + 申请单上下文
    async fn build_parts(
        &self,
        image_paths: &[PathBuf],
        order: &Order,
    ) -> Result<Vec<serde_json::Value>> {
        let mut parts = vec![json!({ "text": QUALITY_SYSTEM_PROMPT })];

        for path in image_paths {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| MediscanError::RemoteCall(format!("read image {:?}: {}", path, e)))?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/png",
                    "data": encoded,
                }
            }));
        }

        let order_json = serde_json::to_string(order)?;
        parts.push(json!({ "text": format!("ordered_scan: {}", order_json) }));

        Ok(parts)
    }

    /// 从候选回复中取出首个文本段
    fn response_text(response: GenerateContentResponse) -> Result<String> {
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| {
                MediscanError::Parse("quality response contained no text part".to_string())
            })
    }
}

#[async_trait]
impl QualityProvider for QualityClient {
    async fn assess(&self, image_paths: &[PathBuf], order: &Order) -> Result<QualityVerdict> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );

        let parts = self.build_parts(image_paths, order).await?;
        let payload = json!({ "contents": [{ "parts": parts }] });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("quality call: {}", e)))?;

        if !response.status().is_success() {
            return Err(MediscanError::RemoteCall(format!(
                "quality call: HTTP {}",
                response.status()
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| MediscanError::RemoteCall(format!("quality call: {}", e)))?;

        let text = Self::response_text(body)?;
        debug!("Quality model replied with {} chars", text.len());

        parse_json_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parses_fenced_response() {
        let text = "```json\n{\"image_quality\":\"Optimal\",\"scan_match\":true,\"modality_match\":true,\"reason_of_rejection\":null}\n```";
        let verdict: QualityVerdict = parse_json_response(text).unwrap();
        assert_eq!(verdict.image_quality, ScanQuality::Optimal);
        assert!(verdict.scan_match);
        assert!(verdict.modality_match);
        assert!(verdict.reason_of_rejection.is_none());
    }

    #[test]
    fn test_unknown_quality_degrades_to_rejected() {
        // 模型返回了约定之外的等级字符串，保守归为rejected
        let text = "{\"image_quality\":\"Bad\",\"scan_match\":true,\"modality_match\":true}";
        let verdict: QualityVerdict = parse_json_response(text).unwrap();
        assert_eq!(verdict.image_quality, ScanQuality::Rejected);
    }

    #[test]
    fn test_response_text_picks_first_text_part() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello" }] }
            }]
        }))
        .unwrap();
        assert_eq!(QualityClient::response_text(body).unwrap(), "hello");
    }

    #[test]
    fn test_empty_candidates_is_parse_error() {
        let body: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(QualityClient::response_text(body).is_err());
    }
}
