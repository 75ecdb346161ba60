//! 扫描分析编排器
//!
//! 并发调用诊断模型与质量模型，合并两方判定并按固定策略得出
//! 接受/拒绝结论。这是系统里唯一有协调逻辑的部分

use crate::diagnostic::DiagnosticProvider;
use crate::fetcher::ImageFetcher;
use crate::locator::ImageLocators;
use crate::quality::QualityProvider;
use mediscan_core::{AnalysisReport, MediscanError, Order, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// 影像完全不可达时的固定拒绝原因
const DOWNLOAD_FAILED_REASON: &str = "image download failed";

/// 任一远程调用失败时的拒绝原因
const API_ERROR_REASON: &str = "Failed to complete analysis due to API errors.";

/// 扫描分析编排器
///
/// 依赖通过构造注入，便于测试时替换为桩实现
pub struct ScanAnalyzer {
    fetcher: Arc<dyn ImageFetcher>,
    diagnostic: Arc<dyn DiagnosticProvider>,
    quality: Arc<dyn QualityProvider>,
}

impl ScanAnalyzer {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        diagnostic: Arc<dyn DiagnosticProvider>,
        quality: Arc<dyn QualityProvider>,
    ) -> Self {
        Self {
            fetcher,
            diagnostic,
            quality,
        }
    }

    /// 对一份申请单执行完整分析
    ///
    /// 总是返回一份结构完整的报告，内部错误折叠为REJECTED而不是向外抛出
    pub async fn analyze(&self, locators: &ImageLocators, order: &Order) -> AnalysisReport {
        if locators.is_empty() {
            warn!("Analysis requested without any image locator");
            return Self::download_failure(order, "no image locator supplied");
        }

        // 下载到本地：质量模型需要本地文件
        let images = match self.fetcher.fetch_all(locators.as_slice()).await {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => return Self::download_failure(order, "no image could be downloaded"),
            Err(e) => return Self::download_failure(order, &e.to_string()),
        };

        let image_urls = locators.as_slice().to_vec();
        let local_paths: Vec<PathBuf> = images.iter().map(|i| i.path_buf()).collect();

        // 诊断模型直接接受远程URL，质量模型读取本地文件，二者并发执行
        let diagnostic = self.diagnostic.clone();
        let diag_order = order.clone();
        let diag_task =
            tokio::spawn(async move { diagnostic.diagnose(&image_urls, &diag_order).await });

        let quality = self.quality.clone();
        let quality_order = order.clone();
        let quality_task =
            tokio::spawn(async move { quality.assess(&local_paths, &quality_order).await });

        // 合流点而非竞速：无条件等待两个结果
        let diag_result = Self::flatten(diag_task.await);
        let quality_result = Self::flatten(quality_task.await);

        // 两个任务都已结束，本地影像无条件清理
        drop(images);

        match (diag_result, quality_result) {
            (Ok(diag), Ok(quality)) => {
                let report = AnalysisReport::from_verdicts(
                    order,
                    quality.image_quality,
                    diag.scan_match,
                    quality.modality_match,
                    quality.reason_of_rejection,
                    diag.diagnosis,
                );
                info!(
                    "Analysis of '{}' finished with status {}",
                    order.scan_name,
                    report.status.as_str()
                );
                report
            }
            (diag_result, quality_result) => {
                let diagnostic_error = diag_result.err().map(|e| e.to_string());
                let quality_error = quality_result.err().map(|e| e.to_string());
                warn!(
                    "Analysis of '{}' rejected on errors (diagnostic: {:?}, quality: {:?})",
                    order.scan_name, diagnostic_error, quality_error
                );
                AnalysisReport::rejected(order, API_ERROR_REASON, diagnostic_error, quality_error)
            }
        }
    }

    /// 影像获取失败的短路报告，不触发任何远程调用
    fn download_failure(order: &Order, detail: &str) -> AnalysisReport {
        AnalysisReport::rejected(
            order,
            DOWNLOAD_FAILED_REASON,
            Some(detail.to_string()),
            Some(detail.to_string()),
        )
    }

    fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
        match joined {
            Ok(result) => result,
            Err(e) => Err(MediscanError::Internal(format!(
                "analysis task aborted: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticVerdict, DiagnosticProvider};
    use crate::fetcher::FetchedImage;
    use crate::quality::{QualityProvider, QualityVerdict};
    use async_trait::async_trait;
    use mediscan_core::{ReportStatus, ScanQuality};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn order() -> Order {
        Order {
            scan_name: "CT Head".to_string(),
            modality: "CT".to_string(),
            age: 45,
            sex: "Male".to_string(),
        }
    }

    fn diag_verdict(scan_match: bool) -> DiagnosticVerdict {
        DiagnosticVerdict {
            scan_name: "CT Head".to_string(),
            age: None,
            sex: None,
            scan_match,
            modality: "CT".to_string(),
            diagnosis: "No acute findings.".to_string(),
        }
    }

    fn quality_verdict(quality: ScanQuality, modality_match: bool) -> QualityVerdict {
        QualityVerdict {
            image_quality: quality,
            scan_match: true,
            modality_match,
            reason_of_rejection: None,
        }
    }

    /// 产出真实临时文件的桩获取器，记录产出路径供清理断言
    struct FakeFetcher {
        fail: bool,
        calls: AtomicU32,
        produced: Mutex<Vec<PathBuf>>,
    }

    impl FakeFetcher {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicU32::new(0),
                produced: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageFetcher for FakeFetcher {
        async fn fetch_all(&self, locators: &[String]) -> Result<Vec<FetchedImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MediscanError::Download(format!(
                    "no image could be downloaded: {}",
                    locators.join(", ")
                )));
            }

            let mut images = Vec::new();
            for locator in locators {
                let mut file = tempfile::Builder::new()
                    .prefix("mediscan-test-")
                    .suffix(".png")
                    .tempfile()
                    .unwrap();
                file.write_all(b"fake image bytes").unwrap();
                self.produced
                    .lock()
                    .unwrap()
                    .push(file.path().to_path_buf());
                images.push(FetchedImage::from_temp(file, locator.clone()));
            }
            Ok(images)
        }
    }

    /// 记录调用入参与次数的桩诊断服务
    struct FakeDiagnostic {
        verdict: Option<DiagnosticVerdict>,
        calls: AtomicU32,
        seen_urls: Mutex<Vec<String>>,
    }

    impl FakeDiagnostic {
        fn succeeding(verdict: DiagnosticVerdict) -> Self {
            Self {
                verdict: Some(verdict),
                calls: AtomicU32::new(0),
                seen_urls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                verdict: None,
                calls: AtomicU32::new(0),
                seen_urls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DiagnosticProvider for FakeDiagnostic {
        async fn diagnose(
            &self,
            image_urls: &[String],
            _order: &Order,
        ) -> Result<DiagnosticVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_urls.lock().unwrap().extend_from_slice(image_urls);
            match &self.verdict {
                Some(v) => Ok(v.clone()),
                None => Err(MediscanError::RemoteCall(
                    "diagnostic provider unavailable".to_string(),
                )),
            }
        }
    }

    /// 记录调用入参与次数的桩质量服务
    struct FakeQuality {
        verdict: Option<QualityVerdict>,
        calls: AtomicU32,
        seen_paths: Mutex<Vec<PathBuf>>,
    }

    impl FakeQuality {
        fn succeeding(verdict: QualityVerdict) -> Self {
            Self {
                verdict: Some(verdict),
                calls: AtomicU32::new(0),
                seen_paths: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                verdict: None,
                calls: AtomicU32::new(0),
                seen_paths: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QualityProvider for FakeQuality {
        async fn assess(&self, image_paths: &[PathBuf], _order: &Order) -> Result<QualityVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_paths
                .lock()
                .unwrap()
                .extend_from_slice(image_paths);
            match &self.verdict {
                Some(v) => Ok(v.clone()),
                None => Err(MediscanError::RemoteCall(
                    "quality provider unavailable".to_string(),
                )),
            }
        }
    }

    fn analyzer(
        fetcher: Arc<FakeFetcher>,
        diagnostic: Arc<FakeDiagnostic>,
        quality: Arc<FakeQuality>,
    ) -> ScanAnalyzer {
        ScanAnalyzer::new(fetcher, diagnostic, quality)
    }

    #[tokio::test]
    async fn test_accepts_when_all_checks_pass() {
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(true)));
        let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
            ScanQuality::Optimal,
            true,
        )));

        let analyzer = analyzer(fetcher.clone(), diagnostic.clone(), quality.clone());
        let locators = ImageLocators::parse("https://example.com/scan.png").unwrap();
        let report = analyzer.analyze(&locators, &order()).await;

        assert_eq!(report.status, ReportStatus::Accepted);
        assert_eq!(report.quality, ScanQuality::Optimal);
        assert!(report.scan_match);
        assert!(report.modality_match);
        assert_eq!(report.diagnosis.as_deref(), Some("No acute findings."));
        assert!(report.diagnostic_error.is_none());
        assert!(report.quality_error.is_none());

        // 诊断方收到原始URL，质量方收到本地路径
        assert_eq!(
            diagnostic.seen_urls.lock().unwrap().as_slice(),
            &["https://example.com/scan.png"]
        );
        let seen_paths = quality.seen_paths.lock().unwrap();
        assert_eq!(seen_paths.len(), 1);
        assert_ne!(
            seen_paths[0].to_string_lossy(),
            "https://example.com/scan.png"
        );
    }

    #[tokio::test]
    async fn test_rejects_on_any_mismatch_or_bad_quality() {
        for (diag_match, quality_tier, modality_match) in [
            (false, ScanQuality::Optimal, true),
            (true, ScanQuality::Rejected, true),
            (true, ScanQuality::Optimal, false),
        ] {
            let fetcher = Arc::new(FakeFetcher::new(false));
            let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(diag_match)));
            let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
                quality_tier,
                modality_match,
            )));

            let analyzer = analyzer(fetcher, diagnostic, quality);
            let locators = ImageLocators::parse("https://example.com/scan.png").unwrap();
            let report = analyzer.analyze(&locators, &order()).await;

            assert_eq!(report.status, ReportStatus::Rejected);
        }
    }

    #[tokio::test]
    async fn test_zero_locators_short_circuits_without_remote_calls() {
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(true)));
        let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
            ScanQuality::Optimal,
            true,
        )));

        let analyzer = analyzer(fetcher.clone(), diagnostic.clone(), quality.clone());
        let report = analyzer
            .analyze(&ImageLocators::parse("").unwrap(), &order())
            .await;

        assert_eq!(report.status, ReportStatus::Rejected);
        assert_eq!(report.reason_of_rejection.as_deref(), Some("image download failed"));
        assert_eq!(diagnostic.calls.load(Ordering::SeqCst), 0);
        assert_eq!(quality.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_download_failure_short_circuits_without_remote_calls() {
        let fetcher = Arc::new(FakeFetcher::new(true));
        let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(true)));
        let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
            ScanQuality::Optimal,
            true,
        )));

        let analyzer = analyzer(fetcher.clone(), diagnostic.clone(), quality.clone());
        let locators = ImageLocators::parse("https://example.com/gone.png").unwrap();
        let report = analyzer.analyze(&locators, &order()).await;

        assert_eq!(report.status, ReportStatus::Rejected);
        assert_eq!(report.reason_of_rejection.as_deref(), Some("image download failed"));
        assert!(report.diagnostic_error.is_some());
        assert!(report.quality_error.is_some());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(diagnostic.calls.load(Ordering::SeqCst), 0);
        assert_eq!(quality.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_provider_error_rejects_with_error_context() {
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::failing());
        let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
            ScanQuality::Optimal,
            true,
        )));

        let analyzer = analyzer(fetcher, diagnostic.clone(), quality.clone());
        let locators = ImageLocators::parse("https://example.com/scan.png").unwrap();
        let report = analyzer.analyze(&locators, &order()).await;

        assert_eq!(report.status, ReportStatus::Rejected);
        assert!(report
            .diagnostic_error
            .as_deref()
            .unwrap()
            .contains("diagnostic provider unavailable"));
        assert!(report.quality_error.is_none());
        // 一方失败不取消另一方，两个调用都已执行
        assert_eq!(diagnostic.calls.load(Ordering::SeqCst), 1);
        assert_eq!(quality.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_provider_errors_are_reported() {
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::failing());
        let quality = Arc::new(FakeQuality::failing());

        let analyzer = analyzer(fetcher, diagnostic, quality);
        let locators = ImageLocators::parse("https://example.com/scan.png").unwrap();
        let report = analyzer.analyze(&locators, &order()).await;

        assert_eq!(report.status, ReportStatus::Rejected);
        assert!(report.diagnostic_error.is_some());
        assert!(report.quality_error.is_some());
    }

    #[tokio::test]
    async fn test_temp_files_removed_after_analysis() {
        // 成功路径
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(true)));
        let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
            ScanQuality::Optimal,
            true,
        )));

        let analyzer_ok = analyzer(fetcher.clone(), diagnostic, quality);
        let locators = ImageLocators::parse(r#"["https://a/1.png","https://a/2.png"]"#).unwrap();
        analyzer_ok.analyze(&locators, &order()).await;

        for path in fetcher.produced.lock().unwrap().iter() {
            assert!(!path.exists(), "temp file {:?} not cleaned up", path);
        }

        // 失败路径
        let fetcher = Arc::new(FakeFetcher::new(false));
        let diagnostic = Arc::new(FakeDiagnostic::failing());
        let quality = Arc::new(FakeQuality::failing());

        let analyzer_err = analyzer(fetcher.clone(), diagnostic, quality);
        analyzer_err.analyze(&locators, &order()).await;

        for path in fetcher.produced.lock().unwrap().iter() {
            assert!(!path.exists(), "temp file {:?} not cleaned up", path);
        }
    }

    #[tokio::test]
    async fn test_string_encoded_and_literal_locators_behave_identically() {
        for locators in [
            ImageLocators::parse(r#"["https://a/1.png","https://a/2.png"]"#).unwrap(),
            ImageLocators::from_list(vec![
                "https://a/1.png".to_string(),
                "https://a/2.png".to_string(),
            ]),
        ] {
            let fetcher = Arc::new(FakeFetcher::new(false));
            let diagnostic = Arc::new(FakeDiagnostic::succeeding(diag_verdict(true)));
            let quality = Arc::new(FakeQuality::succeeding(quality_verdict(
                ScanQuality::Optimal,
                true,
            )));

            let analyzer = analyzer(fetcher, diagnostic.clone(), quality.clone());
            let report = analyzer.analyze(&locators, &order()).await;

            assert_eq!(report.status, ReportStatus::Accepted);
            assert_eq!(
                diagnostic.seen_urls.lock().unwrap().as_slice(),
                &["https://a/1.png", "https://a/2.png"]
            );
            assert_eq!(quality.seen_paths.lock().unwrap().len(), 2);
        }
    }
}
