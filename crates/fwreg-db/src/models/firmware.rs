//! Firmware metadata rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Metadata for one stored firmware binary.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Firmware {
    /// Device type the firmware targets.
    #[sqlx(rename = "type")]
    pub firmware_type: String,
    pub version: String,
    /// Original upload filename.
    pub filename: String,
    pub size_bytes: i64,
    /// Lower-case hex SHA-256 of the binary.
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl Firmware {
    /// Insert or replace the row for `(firmware_type, version)`.
    pub async fn upsert(pool: &SqlitePool, firmware: &Firmware) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO firmwares (type, version, filename, size_bytes, sha256, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (type, version) DO UPDATE SET
                filename = excluded.filename,
                size_bytes = excluded.size_bytes,
                sha256 = excluded.sha256,
                created_at = excluded.created_at
            ",
        )
        .bind(&firmware.firmware_type)
        .bind(&firmware.version)
        .bind(&firmware.filename)
        .bind(firmware.size_bytes)
        .bind(&firmware.sha256)
        .bind(firmware.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch one version.
    pub async fn get(
        pool: &SqlitePool,
        firmware_type: &str,
        version: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT type, version, filename, size_bytes, sha256, created_at
            FROM firmwares
            WHERE type = $1 AND version = $2
            ",
        )
        .bind(firmware_type)
        .bind(version)
        .fetch_optional(pool)
        .await
    }

    /// All versions of a type, in insertion-independent text order.
    pub async fn list_by_type(
        pool: &SqlitePool,
        firmware_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r"
            SELECT type, version, filename, size_bytes, sha256, created_at
            FROM firmwares
            WHERE type = $1
            ORDER BY version
            ",
        )
        .bind(firmware_type)
        .fetch_all(pool)
        .await
    }

    /// Delete one version. Returns whether a row was removed.
    pub async fn delete(
        pool: &SqlitePool,
        firmware_type: &str,
        version: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM firmwares WHERE type = $1 AND version = $2")
            .bind(firmware_type)
            .bind(version)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    fn firmware(version: &str, sha: &str) -> Firmware {
        Firmware {
            firmware_type: "sensor-v2".to_string(),
            version: version.to_string(),
            filename: format!("sensor-{version}.bin"),
            size_bytes: 1024,
            sha256: sha.to_string(),
            created_at: DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = test_pool().await.unwrap();
        let fw = firmware("1.0.0", "aa");
        Firmware::upsert(db.inner(), &fw).await.unwrap();

        let loaded = Firmware::get(db.inner(), "sensor-v2", "1.0.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, fw);
        assert!(Firmware::get(db.inner(), "sensor-v2", "9.9.9")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_version() {
        let db = test_pool().await.unwrap();
        Firmware::upsert(db.inner(), &firmware("1.0.0", "aa")).await.unwrap();
        Firmware::upsert(db.inner(), &firmware("1.0.0", "bb")).await.unwrap();

        let all = Firmware::list_by_type(db.inner(), "sensor-v2").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sha256, "bb");
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_type() {
        let db = test_pool().await.unwrap();
        Firmware::upsert(db.inner(), &firmware("1.0.0", "aa")).await.unwrap();
        Firmware::upsert(db.inner(), &firmware("1.1.0", "ab")).await.unwrap();
        let other = Firmware {
            firmware_type: "gateway".to_string(),
            ..firmware("3.0.0", "cc")
        };
        Firmware::upsert(db.inner(), &other).await.unwrap();

        let sensors = Firmware::list_by_type(db.inner(), "sensor-v2").await.unwrap();
        assert_eq!(sensors.len(), 2);
        assert!(sensors.iter().all(|f| f.firmware_type == "sensor-v2"));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_row_existed() {
        let db = test_pool().await.unwrap();
        Firmware::upsert(db.inner(), &firmware("1.0.0", "aa")).await.unwrap();

        assert!(Firmware::delete(db.inner(), "sensor-v2", "1.0.0").await.unwrap());
        assert!(!Firmware::delete(db.inner(), "sensor-v2", "1.0.0").await.unwrap());
    }
}
