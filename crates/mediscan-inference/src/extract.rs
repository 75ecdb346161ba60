//! 模型响应中的JSON提取
//!
//! 模型的自然语言回复里预期包含一个JSON对象，可能用```json围栏包裹，
//! 也可能用普通围栏或完全裸露。按宽松顺序依次尝试，找不到时返回解析错误

use mediscan_core::{MediscanError, Result};

/// 从响应文本中提取JSON对象字符串
///
/// 依次尝试：```json代码块、普通```代码块、首尾大括号截取
pub fn extract_json_object(text: &str) -> Result<String> {
    // ```json 代码块
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Ok(text[json_start..json_start + end].trim().to_string());
        }
    }

    // 普通 ``` 代码块
    if let Some(start) = text.find("```") {
        let block_start = start + 3;
        let content_start = text[block_start..]
            .find('\n')
            .map(|i| block_start + i + 1)
            .unwrap_or(block_start);
        if let Some(end) = text[content_start..].find("```") {
            return Ok(text[content_start..content_start + end].trim().to_string());
        }
    }

    // 裸JSON对象
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return Ok(text[start..=end].to_string());
            }
        }
    }

    Err(MediscanError::Parse(
        "no JSON object found in model response".to_string(),
    ))
}

/// 提取并反序列化为目标类型
pub fn parse_json_response<T>(text: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let json = extract_json_object(text)?;
    serde_json::from_str(&json)
        .map_err(|e| MediscanError::Parse(format!("malformed JSON in model response: {}", e)))
}
