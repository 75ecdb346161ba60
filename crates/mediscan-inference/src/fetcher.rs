//! 远程影像获取
//!
//! 质量评估模型只能读取本地文件，分析前先把远程影像下载到临时文件。
//! 临时文件由守卫对象持有，任何退出路径上都会随Drop删除

use async_trait::async_trait;
use mediscan_core::{MediscanError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// 已下载到本地的影像
///
/// 持有期间文件存在，Drop时删除
#[derive(Debug)]
pub struct FetchedImage {
    file: NamedTempFile,
    locator: String,
}

impl FetchedImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    /// 来源定位符
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// 由已有的临时文件构造，文件所有权随守卫转移
    pub fn from_temp(file: NamedTempFile, locator: String) -> Self {
        Self { file, locator }
    }
}

/// 影像获取接口
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// 下载所有可达的影像
    ///
    /// 允许部分失败；全部失败时返回携带失败定位符列表的错误，
    /// 只要有一个影像可达就不会返回空结果
    async fn fetch_all(&self, locators: &[String]) -> Result<Vec<FetchedImage>>;
}

/// 基于HTTP的影像获取器
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_one(&self, locator: &str) -> Result<FetchedImage> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| MediscanError::Download(format!("{}: {}", locator, e)))?;

        if !response.status().is_success() {
            return Err(MediscanError::Download(format!(
                "{}: HTTP {}",
                locator,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediscanError::Download(format!("{}: {}", locator, e)))?;

        let mut file = tempfile::Builder::new()
            .prefix("mediscan-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| MediscanError::Download(format!("temp file: {}", e)))?;

        file.write_all(&bytes)
            .map_err(|e| MediscanError::Download(format!("temp file write: {}", e)))?;

        debug!("Fetched {} ({} bytes) to {:?}", locator, bytes.len(), file.path());

        Ok(FetchedImage {
            file,
            locator: locator.to_string(),
        })
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_all(&self, locators: &[String]) -> Result<Vec<FetchedImage>> {
        let mut fetched = Vec::new();
        let mut failed = Vec::new();

        for locator in locators {
            match self.fetch_one(locator).await {
                Ok(image) => fetched.push(image),
                Err(e) => {
                    warn!("Failed to fetch image {}: {}", locator, e);
                    failed.push(locator.clone());
                }
            }
        }

        if fetched.is_empty() && !locators.is_empty() {
            return Err(MediscanError::Download(format!(
                "no image could be downloaded: {}",
                failed.join(", ")
            )));
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_image_removed_on_drop() {
        let mut file = tempfile::Builder::new()
            .prefix("mediscan-")
            .suffix(".png")
            .tempfile()
            .unwrap();
        file.write_all(b"fake image bytes").unwrap();

        let image = FetchedImage {
            file,
            locator: "https://example.com/scan.png".to_string(),
        };
        let path = image.path_buf();
        assert!(path.exists());

        drop(image);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_all_unreachable_reports_failing_locators() {
        let fetcher = HttpImageFetcher::new();
        let locators = vec![
            "http://127.0.0.1:1/missing-a.png".to_string(),
            "http://127.0.0.1:1/missing-b.png".to_string(),
        ];

        let err = fetcher.fetch_all(&locators).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing-a.png"));
        assert!(message.contains("missing-b.png"));
    }
}
