//! 影像上传存储管理
//!
//! 浏览器直传对象存储：后端只负责签发限时上传URL并换算公开访问URL，
//! 影像数据本身不经过本服务

use mediscan_core::{utils::generate_blob_key, MediscanError, Result};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::ObjectStore;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// 上传存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStoreConfig {
    /// 桶名
    pub bucket: String,
    /// 区域
    pub region: String,
    /// 访问密钥
    pub access_key: String,
    /// 密钥
    pub secret_key: String,
    /// 自定义端点URL（兼容S3协议的服务）
    pub endpoint: Option<String>,
    /// 公开访问URL前缀，不设置时按标准桶地址拼接
    pub public_base_url: Option<String>,
    /// 上传URL有效期（秒）
    pub upload_url_expiry_secs: u64,
}

impl Default for UploadStoreConfig {
    fn default() -> Self {
        Self {
            bucket: "mediscan-uploads".to_string(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            endpoint: None,
            public_base_url: None,
            upload_url_expiry_secs: 3600,
        }
    }
}

/// 签发的上传信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadUrlData {
    pub upload_url: String,
    pub blob_name: String,
    pub public_url: String,
    pub content_type: String,
}

/// 上传存储管理器
pub struct UploadStore {
    store: AmazonS3,
    config: UploadStoreConfig,
}

impl UploadStore {
    pub fn new(config: UploadStoreConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(config.bucket.as_str())
            .with_region(config.region.as_str())
            .with_access_key_id(config.access_key.as_str())
            .with_secret_access_key(config.secret_key.as_str());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint.as_str()).with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| MediscanError::Storage(e.to_string()))?;

        info!("Upload store ready on bucket {}", config.bucket);
        Ok(Self { store, config })
    }

    /// 为一次直传签发限时PUT URL
    pub async fn generate_upload_url(
        &self,
        filename: &str,
        content_type: &str,
    ) -> Result<UploadUrlData> {
        let blob_name = generate_blob_key(filename);
        let path = ObjectPath::from(blob_name.as_str());

        let upload_url = self
            .store
            .signed_url(
                Method::PUT,
                &path,
                Duration::from_secs(self.config.upload_url_expiry_secs),
            )
            .await
            .map_err(|e| MediscanError::Storage(e.to_string()))?;

        debug!("Signed upload URL for {}", blob_name);

        Ok(UploadUrlData {
            upload_url: upload_url.to_string(),
            public_url: self.public_url(&blob_name),
            blob_name,
            content_type: content_type.to_string(),
        })
    }

    /// 对象的公开访问URL
    pub fn public_url(&self, blob_name: &str) -> String {
        match &self.config.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), blob_name),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.config.bucket, self.config.region, blob_name
            ),
        }
    }

    /// 下载对象内容
    pub async fn download(&self, blob_name: &str) -> Result<Vec<u8>> {
        let path = ObjectPath::from(blob_name);
        let data = self
            .store
            .get(&path)
            .await
            .map_err(|e| MediscanError::Storage(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| MediscanError::Storage(e.to_string()))?;
        Ok(data.to_vec())
    }

    /// 删除对象
    pub async fn delete(&self, blob_name: &str) -> Result<()> {
        let path = ObjectPath::from(blob_name);
        self.store
            .delete(&path)
            .await
            .map_err(|e| MediscanError::Storage(e.to_string()))?;
        info!("Deleted blob {}", blob_name);
        Ok(())
    }
}
