//! 通用工具函数

use chrono::Utc;
use uuid::Uuid;

/// 生成按日期分区的对象存储键
///
/// 形如 uploads/2026/08/06/{uuid}_{filename}
pub fn generate_blob_key(filename: &str) -> String {
    format!(
        "uploads/{}/{}_{}",
        Utc::now().format("%Y/%m/%d"),
        Uuid::new_v4(),
        filename
    )
}

/// 验证影像定位符是否为可下载的URL
pub fn is_valid_locator(locator: &str) -> bool {
    !locator.is_empty()
        && (locator.starts_with("http://") || locator.starts_with("https://"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_blob_key() {
        let key = generate_blob_key("scan.png");
        assert!(key.starts_with("uploads/"));
        assert!(key.ends_with("_scan.png"));
    }

    #[test]
    fn test_is_valid_locator() {
        assert!(is_valid_locator("https://example.com/scan.png"));
        assert!(is_valid_locator("http://example.com/scan.png"));
        assert!(!is_valid_locator(""));
        assert!(!is_valid_locator("ftp://example.com/scan.png"));
        assert!(!is_valid_locator("/local/path.png"));
    }
}
