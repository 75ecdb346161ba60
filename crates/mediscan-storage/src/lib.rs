//! # Mediscan存储模块
//!
//! 负责扫描影像的对象存储接入：上传URL签发与对象读写。

pub mod storage;

pub use storage::{UploadStore, UploadStoreConfig, UploadUrlData};
