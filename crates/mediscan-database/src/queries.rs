//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use mediscan_core::{MediscanError, Result, Submission, SubmissionStatus};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

/// 提交记录与分析结果的合并视图
#[derive(Debug, Serialize)]
pub struct SubmissionWithResult {
    #[serde(flatten)]
    pub submission: Submission,
    pub result: Option<ResultSummary>,
}

/// 系统统计
#[derive(Debug, Serialize)]
pub struct SubmissionStats {
    pub total_submissions: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub accepted: i64,
    pub rejected: i64,
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建提交记录表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id UUID PRIMARY KEY,
                scan_name VARCHAR(255) NOT NULL,
                modality VARCHAR(50) NOT NULL,
                age INTEGER NOT NULL,
                sex VARCHAR(10) NOT NULL,
                image_url VARCHAR(500) NOT NULL,
                blob_name VARCHAR(500) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MediscanError::Database(e.to_string()))?;

        // 创建分析结果表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS results (
                id UUID PRIMARY KEY,
                submission_id UUID NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
                scan_name TEXT NOT NULL,
                image_path TEXT NOT NULL,
                age INTEGER NOT NULL,
                sex VARCHAR(50) NOT NULL,
                modality VARCHAR(100) NOT NULL,
                status VARCHAR(50) NOT NULL,
                quality VARCHAR(50) NOT NULL,
                scan_match BOOLEAN NOT NULL,
                modality_match BOOLEAN NOT NULL,
                reason_of_rejection TEXT,
                diagnosis TEXT,
                diagnostic_error TEXT,
                quality_error TEXT,
                processing_time DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MediscanError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status)",
            "CREATE INDEX IF NOT EXISTS idx_submissions_created_at ON submissions(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_results_submission_id ON results(submission_id)",
            "CREATE INDEX IF NOT EXISTS idx_results_status ON results(status)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| MediscanError::Database(e.to_string()))?;
        }

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    // ========== 提交相关操作 ==========

    /// 创建新提交
    pub async fn create_submission(&self, submission: &NewSubmission) -> Result<Uuid> {
        let pool = self.pool.pool();

        sqlx::query(r#"
            INSERT INTO submissions (id, scan_name, modality, age, sex, image_url, blob_name, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING id
        "#)
        .bind(submission.id)
        .bind(&submission.scan_name)
        .bind(&submission.modality)
        .bind(submission.age)
        .bind(&submission.sex)
        .bind(&submission.image_url)
        .bind(&submission.blob_name)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MediscanError::Database(e.to_string()))
    }

    /// 根据ID查找提交
    pub async fn get_submission(&self, id: &Uuid) -> Result<Option<Submission>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbSubmission>(
            "SELECT * FROM submissions WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| MediscanError::Database(e.to_string()))?;

        Ok(result.map(Submission::from))
    }

    /// 更新提交状态
    pub async fn update_submission_status(
        &self,
        id: &Uuid,
        status: &SubmissionStatus,
    ) -> Result<bool> {
        let pool = self.pool.pool();

        let result = sqlx::query(
            "UPDATE submissions SET status = $1, updated_at = NOW() WHERE id = $2"
        )
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| MediscanError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// 获取最近的提交列表
    pub async fn list_submissions(&self, limit: i64) -> Result<Vec<Submission>> {
        let pool = self.pool.pool();

        let results = sqlx::query_as::<_, DbSubmission>(
            "SELECT * FROM submissions ORDER BY created_at DESC LIMIT $1"
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|e| MediscanError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Submission::from).collect())
    }

    // ========== 结果相关操作 ==========

    /// 保存分析结果，并把提交状态同步为报告的终态
    pub async fn save_result(&self, result: &NewResult) -> Result<Uuid> {
        let pool = self.pool.pool();

        let report = &result.report;
        let id: Uuid = sqlx::query(r#"
            INSERT INTO results (id, submission_id, scan_name, image_path, age, sex, modality,
                                 status, quality, scan_match, modality_match,
                                 reason_of_rejection, diagnosis, diagnostic_error, quality_error,
                                 processing_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
        "#)
        .bind(result.id)
        .bind(result.submission_id)
        .bind(&report.scan_name)
        .bind(&result.image_path)
        .bind(report.age)
        .bind(&report.sex)
        .bind(&report.modality)
        .bind(report.status.as_str())
        .bind(report.quality.as_str())
        .bind(report.scan_match)
        .bind(report.modality_match)
        .bind(&report.reason_of_rejection)
        .bind(&report.diagnosis)
        .bind(&report.diagnostic_error)
        .bind(&report.quality_error)
        .bind(result.processing_time)
        .fetch_one(pool)
        .await
        .map(|row| row.get("id"))
        .map_err(|e| MediscanError::Database(e.to_string()))?;

        self.update_submission_status(&result.submission_id, &SubmissionStatus::Completed)
            .await?;

        Ok(id)
    }

    /// 根据提交ID查找结果
    pub async fn get_result_by_submission(&self, submission_id: &Uuid) -> Result<Option<ResultSummary>> {
        let pool = self.pool.pool();

        let result = sqlx::query_as::<_, DbResult>(
            "SELECT * FROM results WHERE submission_id = $1 ORDER BY created_at DESC LIMIT 1"
        )
        .bind(submission_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| MediscanError::Database(e.to_string()))?;

        Ok(result.map(ResultSummary::from))
    }

    /// 获取提交及其分析结果
    pub async fn get_submission_with_result(
        &self,
        id: &Uuid,
    ) -> Result<Option<SubmissionWithResult>> {
        let submission = match self.get_submission(id).await? {
            Some(s) => s,
            None => return Ok(None),
        };

        let result = self.get_result_by_submission(id).await?;

        Ok(Some(SubmissionWithResult { submission, result }))
    }

    // ========== 统计 ==========

    /// 获取基础统计数据
    pub async fn get_stats(&self) -> Result<SubmissionStats> {
        Ok(SubmissionStats {
            total_submissions: self.count("SELECT COUNT(*) FROM submissions", None).await?,
            pending: self.count_by_status("submissions", "pending").await?,
            processing: self.count_by_status("submissions", "processing").await?,
            completed: self.count_by_status("submissions", "completed").await?,
            failed: self.count_by_status("submissions", "failed").await?,
            accepted: self.count_by_status("results", "ACCEPTED").await?,
            rejected: self.count_by_status("results", "REJECTED").await?,
        })
    }

    async fn count(&self, sql: &str, bind: Option<&str>) -> Result<i64> {
        let pool = self.pool.pool();
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        query
            .fetch_one(pool)
            .await
            .map(|row| row.get::<i64, _>(0))
            .map_err(|e| MediscanError::Database(e.to_string()))
    }

    async fn count_by_status(&self, table: &str, status: &str) -> Result<i64> {
        // 表名来自固定调用点，不接受外部输入
        let sql = format!("SELECT COUNT(*) FROM {} WHERE status = $1", table);
        self.count(&sql, Some(status)).await
    }
}
