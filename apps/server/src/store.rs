use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;

use crate::models::{Appointment, Order, User};
use crate::schedule::ScheduleSettings;

/// Durable storage collaborator: whole-collection get/replace per entity.
///
/// Concurrency model is deliberately coarse: callers read a full collection,
/// mutate, and write it back; concurrent writers are last-write-wins. A
/// higher-concurrency implementation can add per-entity versioning behind
/// this trait without touching the lifecycle managers.
#[async_trait]
pub trait Store: Send + Sync {
    async fn appointments(&self) -> Result<Vec<Appointment>>;
    async fn save_appointments(&self, all: &[Appointment]) -> Result<()>;

    async fn orders(&self) -> Result<Vec<Order>>;
    async fn save_orders(&self, all: &[Order]) -> Result<()>;

    async fn users(&self) -> Result<Vec<User>>;
    async fn save_users(&self, all: &[User]) -> Result<()>;

    async fn schedule_settings(&self) -> Result<ScheduleSettings>;
    async fn save_schedule_settings(&self, settings: &ScheduleSettings) -> Result<()>;

    async fn ping(&self) -> bool;
}

// ── SQLite implementation ──

/// Each entity collection is one JSON document in the `collections` table.
pub struct SqliteStore {
    pool: SqlitePool,
}

const APPOINTMENTS: &str = "appointments";
const ORDERS: &str = "orders";
const USERS: &str = "users";
const SCHEDULE_SETTINGS: &str = "schedule_settings";

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // WAL for better concurrent reads
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        let applied: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_collections'")
                .fetch_one(&self.pool)
                .await?;

        if !applied {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS collections (
                    name TEXT PRIMARY KEY,
                    body TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            // Seed the schedule policy so the calculator has something to
            // read before the admin touches it.
            let defaults = serde_json::to_string(&ScheduleSettings::default())?;
            sqlx::query("INSERT OR IGNORE INTO collections (name, body) VALUES (?, ?)")
                .bind(SCHEDULE_SETTINGS)
                .bind(&defaults)
                .execute(&self.pool)
                .await?;

            sqlx::query("INSERT INTO _migrations (name) VALUES ('001_collections')")
                .execute(&self.pool)
                .await?;
            tracing::info!("Applied migration: 001_collections");
        }

        tracing::info!("Database migrations up to date");
        Ok(())
    }

    async fn get_collection<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let body: Option<String> =
            sqlx::query_scalar("SELECT body FROM collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("reading collection {name}"))?;

        match body {
            Some(body) => Ok(Some(
                serde_json::from_str(&body)
                    .with_context(|| format!("decoding collection {name}"))?,
            )),
            None => Ok(None),
        }
    }

    async fn put_collection<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let body = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO collections (name, body) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body",
        )
        .bind(name)
        .bind(&body)
        .execute(&self.pool)
        .await
        .with_context(|| format!("writing collection {name}"))?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn appointments(&self) -> Result<Vec<Appointment>> {
        Ok(self.get_collection(APPOINTMENTS).await?.unwrap_or_default())
    }

    async fn save_appointments(&self, all: &[Appointment]) -> Result<()> {
        self.put_collection(APPOINTMENTS, &all).await
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.get_collection(ORDERS).await?.unwrap_or_default())
    }

    async fn save_orders(&self, all: &[Order]) -> Result<()> {
        self.put_collection(ORDERS, &all).await
    }

    async fn users(&self) -> Result<Vec<User>> {
        Ok(self.get_collection(USERS).await?.unwrap_or_default())
    }

    async fn save_users(&self, all: &[User]) -> Result<()> {
        self.put_collection(USERS, &all).await
    }

    async fn schedule_settings(&self) -> Result<ScheduleSettings> {
        Ok(self
            .get_collection(SCHEDULE_SETTINGS)
            .await?
            .unwrap_or_default())
    }

    async fn save_schedule_settings(&self, settings: &ScheduleSettings) -> Result<()> {
        self.put_collection(SCHEDULE_SETTINGS, settings).await
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// ── Tests ──
