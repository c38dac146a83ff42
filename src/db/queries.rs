use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use super::{MissionStore, StoreError};
use crate::models::{
    CallbackStatus, Mission, MissionRecord, MissionResult, MissionStatus, PictureRecord,
};

/// `MissionStore` over the `missions` / `pictures` tables.
#[derive(Clone)]
pub struct PgMissionStore {
    pool: PgPool,
}

impl PgMissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MissionStore for PgMissionStore {
    async fn save_mission(&self, mission: &Mission) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO missions (task_serial, type, callback_url, callback_status, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (task_serial) DO UPDATE
            SET type = EXCLUDED.type,
                callback_url = EXCLUDED.callback_url,
                callback_status = EXCLUDED.callback_status,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(&mission.task_serial)
        .bind(&mission.mission_type)
        .bind(&mission.callback_url)
        .bind(CallbackStatus::Waiting.to_string())
        .bind(MissionStatus::Pending.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM pictures WHERE task_serial = $1")
            .bind(&mission.task_serial)
            .execute(&mut *tx)
            .await?;

        for picture in &mission.picture_list {
            sqlx::query(
                "INSERT INTO pictures (task_serial, pic_id, download_url) VALUES ($1, $2, $3)",
            )
            .bind(&mission.task_serial)
            .bind(&picture.pic_id)
            .bind(picture.resolved_url())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn complete_mission(&self, result: &MissionResult) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE missions
            SET status = $1, updated_at = NOW()
            WHERE task_serial = $2 AND status = $3
            "#,
        )
        .bind(MissionStatus::Completed.to_string())
        .bind(&result.task_serial)
        .bind(MissionStatus::Pending.to_string())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for picture in &result.data {
            sqlx::query(
                r#"
                UPDATE pictures
                SET result = $1, reason = $2
                WHERE task_serial = $3 AND pic_id = $4
                "#,
            )
            .bind(picture.verdict)
            .bind(&picture.reason)
            .bind(&result.task_serial)
            .bind(&picture.pic_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn callback_url(&self, task_serial: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT callback_url FROM missions WHERE task_serial = $1")
            .bind(task_serial)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(r) => Some(r.try_get("callback_url")?),
            None => None,
        })
    }

    async fn update_callback_status(
        &self,
        task_serial: &str,
        status: CallbackStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE missions
            SET callback_status = $1, updated_at = NOW()
            WHERE task_serial = $2
            "#,
        )
        .bind(status.to_string())
        .bind(task_serial)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_mission(&self, task_serial: &str) -> Result<Option<MissionRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT task_serial, type, callback_url, callback_status, status, created_at, updated_at
            FROM missions
            WHERE task_serial = $1
            "#,
        )
        .bind(task_serial)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let status: String = r.try_get("status")?;
        let callback_status: String = r.try_get("callback_status")?;

        let pictures = sqlx::query(
            r#"
            SELECT pic_id, download_url, result, reason
            FROM pictures
            WHERE task_serial = $1
            ORDER BY id ASC
            "#,
        )
        .bind(task_serial)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|p| {
            Ok(PictureRecord {
                pic_id: p.try_get("pic_id")?,
                download_url: p.try_get("download_url")?,
                result: p.try_get("result")?,
                reason: p.try_get("reason")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(MissionRecord {
            task_serial: r.try_get("task_serial")?,
            mission_type: r.try_get("type")?,
            callback_url: r.try_get("callback_url")?,
            status: MissionStatus::from_str(&status)
                .map_err(|_| StoreError::Corrupt(format!("mission status {status}")))?,
            callback_status: CallbackStatus::from_str(&callback_status)
                .map_err(|_| StoreError::Corrupt(format!("callback status {callback_status}")))?,
            created_at: r.try_get("created_at")?,
            updated_at: r.try_get("updated_at")?,
            pictures,
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
