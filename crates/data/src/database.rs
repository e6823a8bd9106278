//! PostgreSQL client and schema bootstrap.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::repositories::{
    AlertHistoryRepository, AlertRuleRepository, BarRepository, TickRepository,
};

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL`
    /// database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool (used by tests and embedders).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a clone of the underlying pool.
    #[must_use]
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Creates tables and indexes if they do not exist.
    ///
    /// Unreachable storage or a failing DDL statement at boot is fatal for
    /// the process; callers should propagate this error instead of retrying.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trade_ticks (
                id BIGSERIAL PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                symbol VARCHAR(20) NOT NULL,
                price NUMERIC NOT NULL,
                quantity NUMERIC NOT NULL,
                volume NUMERIC NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trade_ticks table")?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_ticks_symbol_timestamp
            ON trade_ticks (symbol, timestamp)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS ohlcv_bars (
                timestamp TIMESTAMPTZ NOT NULL,
                symbol VARCHAR(20) NOT NULL,
                timeframe VARCHAR(10) NOT NULL,
                open NUMERIC NOT NULL,
                high NUMERIC NOT NULL,
                low NUMERIC NOT NULL,
                close NUMERIC NOT NULL,
                volume NUMERIC NOT NULL,
                trade_count BIGINT NOT NULL,
                vwap NUMERIC,
                PRIMARY KEY (symbol, timeframe, timestamp)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create ohlcv_bars table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alert_rules (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                alert_type VARCHAR(50) NOT NULL,
                symbol1 VARCHAR(50) NOT NULL,
                symbol2 VARCHAR(50),
                timeframe VARCHAR(10) NOT NULL DEFAULT '1m',
                threshold_upper DOUBLE PRECISION,
                threshold_lower DOUBLE PRECISION,
                notification_channels JSONB NOT NULL DEFAULT '[]',
                notification_config JSONB NOT NULL DEFAULT '{}',
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                cooldown_minutes BIGINT NOT NULL DEFAULT 15,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                last_triggered_at TIMESTAMPTZ,
                trigger_count BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create alert_rules table")?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alert_history (
                id BIGSERIAL PRIMARY KEY,
                rule_id BIGINT NOT NULL,
                alert_type VARCHAR(50) NOT NULL,
                symbol1 VARCHAR(50) NOT NULL,
                symbol2 VARCHAR(50),
                trigger_value DOUBLE PRECISION NOT NULL,
                threshold_breached DOUBLE PRECISION NOT NULL,
                context_data JSONB NOT NULL DEFAULT '{}',
                notifications_sent JSONB NOT NULL DEFAULT '[]',
                notification_errors JSONB NOT NULL DEFAULT '[]',
                triggered_at TIMESTAMPTZ NOT NULL,
                acknowledged BOOLEAN NOT NULL DEFAULT FALSE,
                acknowledged_at TIMESTAMPTZ
            )
            ",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create alert_history table")?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_history_triggered_at
            ON alert_history (triggered_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema initialized");
        Ok(())
    }

    /// Repository for raw trade ticks.
    #[must_use]
    pub fn ticks(&self) -> TickRepository {
        TickRepository::new(self.pool.clone())
    }

    /// Repository for OHLCV bars.
    #[must_use]
    pub fn bars(&self) -> BarRepository {
        BarRepository::new(self.pool.clone())
    }

    /// Repository for alert rules.
    #[must_use]
    pub fn alert_rules(&self) -> AlertRuleRepository {
        AlertRuleRepository::new(self.pool.clone())
    }

    /// Repository for alert history.
    #[must_use]
    pub fn alert_history(&self) -> AlertHistoryRepository {
        AlertHistoryRepository::new(self.pool.clone())
    }
}
