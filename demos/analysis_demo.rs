//! 扫描分析编排演示程序
//!
//! 使用进程内的桩模型展示分析编排器的核心行为：
//! - 两个模型并发判定与结果合并
//! - 固定判定策略（任一不匹配或质量不合格即拒绝）
//! - 模型调用失败时的错误折叠

use anyhow::Result;
use async_trait::async_trait;
use mediscan_core::{Order, ScanQuality};
use mediscan_inference::{
    DiagnosticProvider, DiagnosticVerdict, FetchedImage, ImageFetcher, ImageLocators,
    QualityProvider, QualityVerdict, ScanAnalyzer,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber;

/// 不经网络、直接落盘的桩影像获取器
struct LocalFetcher;

#[async_trait]
impl ImageFetcher for LocalFetcher {
    async fn fetch_all(
        &self,
        locators: &[String],
    ) -> mediscan_core::Result<Vec<FetchedImage>> {
        let mut images = Vec::new();
        for locator in locators {
            let mut file = tempfile::Builder::new()
                .prefix("mediscan-demo-")
                .suffix(".png")
                .tempfile()
                .map_err(|e| mediscan_core::MediscanError::Download(e.to_string()))?;
            file.write_all(b"demo image bytes")
                .map_err(|e| mediscan_core::MediscanError::Download(e.to_string()))?;
            images.push(FetchedImage::from_temp(file, locator.clone()));
        }
        Ok(images)
    }
}

/// 返回固定判定的桩诊断模型
struct StaticDiagnostic {
    scan_match: bool,
}

#[async_trait]
impl DiagnosticProvider for StaticDiagnostic {
    async fn diagnose(
        &self,
        _image_urls: &[String],
        order: &Order,
    ) -> mediscan_core::Result<DiagnosticVerdict> {
        Ok(DiagnosticVerdict {
            scan_name: order.scan_name.clone(),
            age: None,
            sex: Some(order.sex.clone()),
            scan_match: self.scan_match,
            modality: order.modality.clone(),
            diagnosis: "Lung fields clear, no focal lesion identified.".to_string(),
        })
    }
}

/// 返回固定判定的桩质量模型
struct StaticQuality {
    quality: ScanQuality,
}

#[async_trait]
impl QualityProvider for StaticQuality {
    async fn assess(
        &self,
        _image_paths: &[PathBuf],
        _order: &Order,
    ) -> mediscan_core::Result<QualityVerdict> {
        Ok(QualityVerdict {
            image_quality: self.quality,
            scan_match: true,
            modality_match: true,
            reason_of_rejection: match self.quality {
                ScanQuality::Rejected => Some("heavy motion artifacts".to_string()),
                _ => None,
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    info!("🚀 启动扫描分析编排演示");

    let order = Order {
        scan_name: "Chest X-ray".to_string(),
        modality: "X-ray".to_string(),
        age: 62,
        sex: "Female".to_string(),
    };

    // 场景1: 全部通过
    demo_scenario("✅ 全部检查通过", true, ScanQuality::Optimal, &order).await;

    // 场景2: 部位不匹配
    demo_scenario("❌ 扫描部位不匹配", false, ScanQuality::Optimal, &order).await;

    // 场景3: 影像质量不合格
    demo_scenario("❌ 影像质量不合格", true, ScanQuality::Rejected, &order).await;

    info!("✅ 扫描分析编排演示完成");
    Ok(())
}

/// 单场景演示
async fn demo_scenario(title: &str, scan_match: bool, quality: ScanQuality, order: &Order) {
    info!("\n📋 场景: {}", title);

    let analyzer = ScanAnalyzer::new(
        Arc::new(LocalFetcher),
        Arc::new(StaticDiagnostic { scan_match }),
        Arc::new(StaticQuality { quality }),
    );

    // 字符串编码的定位符列表与字面列表等价
    let locators = ImageLocators::parse(r#"["https://storage.example.com/scan.png"]"#)
        .expect("demo locators are well-formed");

    let report = analyzer.analyze(&locators, order).await;

    info!("   最终状态: {}", report.status.as_str());
    info!("   质量等级: {}", report.quality.as_str());
    info!("   部位匹配: {}", report.scan_match);
    if let Some(diagnosis) = &report.diagnosis {
        info!("   诊断摘要: {}", diagnosis);
    }
    if let Some(reason) = &report.reason_of_rejection {
        info!("   拒绝原因: {}", reason);
    }
}
