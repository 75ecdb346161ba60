//! 影像定位符规范化
//!
//! 调用方可能给出单个URL、URL列表或字符串编码的JSON列表，
//! 在边界处统一解码为一个定位符列表，后续逻辑不再区分

use mediscan_core::{MediscanError, Result};
use serde::{Deserialize, Serialize};

/// 规范化后的影像定位符集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLocators(Vec<String>);

impl ImageLocators {
    /// 解析原始输入
    ///
    /// 接受字符串编码的JSON列表（如 `'["a","b"]'`）或单个URL
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self(Vec::new()));
        }

        if trimmed.starts_with('[') {
            let urls: Vec<String> = serde_json::from_str(trimmed).map_err(|e| {
                MediscanError::Validation(format!("invalid locator list: {}", e))
            })?;
            return Ok(Self::from_list(urls));
        }

        Ok(Self(vec![trimmed.to_string()]))
    }

    /// 由已有列表构造
    pub fn from_list(urls: Vec<String>) -> Self {
        let urls = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        Self(urls)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<String>> for ImageLocators {
    fn from(urls: Vec<String>) -> Self {
        Self::from_list(urls)
    }
}
