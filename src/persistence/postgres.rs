//! PostgreSQL implementation of the [`Ledger`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{Ledger, LedgerError};
use crate::config::BridgeConfig;
use crate::domain::{
    CachedPayment, ChannelBalanceSnapshot, ContractId, NewTransaction, Transaction,
    TransactionStatus,
};

const TRANSACTION_COLUMNS: &str = "id, status, date, amount, tx_hash, contract_id, \
     hash_lock_timestamp, ln_invoice, user_address, transaction_type, secret";

type TransactionRow = (
    i64,
    String,
    DateTime<Utc>,
    i64,
    String,
    String,
    i64,
    String,
    String,
    String,
    Option<String>,
);

type SnapshotRow = (DateTime<Utc>, i64, i64, i64, i64);

/// PostgreSQL-backed ledger using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from the bridge configuration and applies
    /// the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Database`] if the database is unreachable
    /// or a migration fails.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        tracing::info!("ledger migrations applied");
        Ok(Self::new(pool))
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::Corrupt(format!("{field} out of range: {value}")))
}

fn to_u64(value: i64, field: &str) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::Corrupt(format!("negative {field}: {value}")))
}

fn map_transaction(row: TransactionRow) -> Result<Transaction, LedgerError> {
    let (
        id,
        status,
        date,
        amount,
        tx_hash,
        contract_id,
        hash_lock_timestamp,
        ln_invoice,
        user_address,
        transaction_type,
        secret,
    ) = row;

    Ok(Transaction {
        id,
        status: status.parse().map_err(LedgerError::Corrupt)?,
        date,
        amount: to_u64(amount, "amount")?,
        tx_hash,
        contract_id: contract_id
            .parse()
            .map_err(|e| LedgerError::Corrupt(format!("contract_id: {e}")))?,
        hash_lock_timestamp,
        ln_invoice,
        user_address,
        transaction_type: transaction_type.parse().map_err(LedgerError::Corrupt)?,
        secret: secret
            .map(|s| s.parse())
            .transpose()
            .map_err(|e| LedgerError::Corrupt(format!("secret: {e}")))?,
    })
}

fn map_snapshot(row: SnapshotRow) -> Result<ChannelBalanceSnapshot, LedgerError> {
    let (date, local, remote, unsettled, combined) = row;
    Ok(ChannelBalanceSnapshot {
        date,
        total_local_balance: to_u64(local, "total_local_balance")?,
        total_remote_balance: to_u64(remote, "total_remote_balance")?,
        total_unsettled_balance: to_u64(unsettled, "total_unsettled_balance")?,
        combined_balance: to_u64(combined, "combined_balance")?,
    })
}

fn status_list(statuses: &[TransactionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction, LedgerError> {
        let sql = format!(
            "INSERT INTO transactions (status, amount, tx_hash, contract_id, hash_lock_timestamp, \
             ln_invoice, user_address, transaction_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {TRANSACTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(new.status.as_str())
            .bind(to_i64(new.amount, "amount")?)
            .bind(&new.tx_hash)
            .bind(new.contract_id.to_string())
            .bind(new.hash_lock_timestamp)
            .bind(&new.ln_invoice)
            .bind(&new.user_address)
            .bind(new.transaction_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    LedgerError::Duplicate(new.contract_id)
                }
                other => LedgerError::from(other),
            })?;

        map_transaction(row)
    }

    async fn find_transaction(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<Transaction>, LedgerError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE contract_id = $1");
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(contract_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_transaction).transpose()
    }

    async fn transition_status(
        &self,
        contract_id: &ContractId,
        expected: &[TransactionStatus],
        next: TransactionStatus,
    ) -> Result<bool, LedgerError> {
        let sources: Vec<TransactionStatus> = expected
            .iter()
            .copied()
            .filter(|from| from.can_transition_to(next))
            .collect();
        if sources.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE transactions SET status = $1, date = now() \
             WHERE contract_id = $2 AND status = ANY($3)",
        )
        .bind(next.as_str())
        .bind(contract_id.to_string())
        .bind(status_list(&sources))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_tx_hash(
        &self,
        contract_id: &ContractId,
        tx_hash: &str,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query("UPDATE transactions SET tx_hash = $1 WHERE contract_id = $2")
            .bind(tx_hash)
            .bind(contract_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_refunded(
        &self,
        contract_id: &ContractId,
        tx_hash: &str,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $1, tx_hash = $2, date = now() \
             WHERE contract_id = $3 AND status = $4",
        )
        .bind(TransactionStatus::Refunded.as_str())
        .bind(tx_hash)
        .bind(contract_id.to_string())
        .bind(TransactionStatus::Failed.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transactions_for_user(
        &self,
        user_address: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE lower(user_address) = lower($1) ORDER BY date DESC, id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(user_address)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(map_transaction).collect()
    }

    async fn transactions_with_status(
        &self,
        status: TransactionStatus,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = $1 ORDER BY date ASC"
        );
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(map_transaction).collect()
    }

    async fn cache_payment(&self, payment: &CachedPayment) -> Result<bool, LedgerError> {
        let mut db_tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE transactions SET status = $1, secret = $2, date = now() \
             WHERE contract_id = $3 AND status = $4",
        )
        .bind(TransactionStatus::Cached.as_str())
        .bind(payment.secret.to_plain_hex())
        .bind(payment.contract_id.to_string())
        .bind(TransactionStatus::Pending.as_str())
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() != 1 {
            db_tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO cached_payments (contract_id, secret, required_balance) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (contract_id) DO UPDATE \
             SET secret = EXCLUDED.secret, required_balance = EXCLUDED.required_balance",
        )
        .bind(payment.contract_id.to_string())
        .bind(payment.secret.to_plain_hex())
        .bind(payment.required_balance.map(|wei| wei.to_string()))
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(true)
    }

    async fn cached_payment(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<CachedPayment>, LedgerError> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT secret, required_balance FROM cached_payments WHERE contract_id = $1",
        )
        .bind(contract_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some((secret, required_balance)) = row else {
            return Ok(None);
        };

        Ok(Some(CachedPayment {
            contract_id: *contract_id,
            secret: secret
                .parse()
                .map_err(|e| LedgerError::Corrupt(format!("secret: {e}")))?,
            required_balance: required_balance
                .map(|wei| wei.parse::<u128>())
                .transpose()
                .map_err(|e| LedgerError::Corrupt(format!("required_balance: {e}")))?,
        }))
    }

    async fn settle_cached_payment(&self, contract_id: &ContractId) -> Result<bool, LedgerError> {
        let mut db_tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE transactions SET status = $1, date = now() \
             WHERE contract_id = $2 AND status = $3",
        )
        .bind(TransactionStatus::Completed.as_str())
        .bind(contract_id.to_string())
        .bind(TransactionStatus::Cached.as_str())
        .execute(&mut *db_tx)
        .await?;

        if updated.rows_affected() != 1 {
            db_tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM cached_payments WHERE contract_id = $1")
            .bind(contract_id.to_string())
            .execute(&mut *db_tx)
            .await?;

        db_tx.commit().await?;
        Ok(true)
    }

    async fn latest_snapshot(&self) -> Result<Option<ChannelBalanceSnapshot>, LedgerError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT date, total_local_balance, total_remote_balance, total_unsettled_balance, \
             combined_balance FROM channel_balances ORDER BY date DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_snapshot).transpose()
    }

    async fn record_snapshot(
        &self,
        snapshot: &ChannelBalanceSnapshot,
        retain: usize,
    ) -> Result<(), LedgerError> {
        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO channel_balances (date, total_local_balance, total_remote_balance, \
             total_unsettled_balance, combined_balance) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.date)
        .bind(to_i64(snapshot.total_local_balance, "total_local_balance")?)
        .bind(to_i64(snapshot.total_remote_balance, "total_remote_balance")?)
        .bind(to_i64(snapshot.total_unsettled_balance, "total_unsettled_balance")?)
        .bind(to_i64(snapshot.combined_balance, "combined_balance")?)
        .execute(&mut *db_tx)
        .await?;

        sqlx::query(
            "DELETE FROM channel_balances WHERE id NOT IN \
             (SELECT id FROM channel_balances ORDER BY date DESC, id DESC LIMIT $1)",
        )
        .bind(i64::try_from(retain).unwrap_or(i64::MAX))
        .execute(&mut *db_tx)
        .await?;

        db_tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn row(status: &str, secret: Option<&str>) -> TransactionRow {
        (
            7,
            status.to_string(),
            Utc::now(),
            50_000,
            String::new(),
            format!("0x{}", "12".repeat(32)),
            1_700_000_000,
            "lnbc1".to_string(),
            "0xabc".to_string(),
            "RECEIVED".to_string(),
            secret.map(str::to_string),
        )
    }

    #[test]
    fn maps_valid_row() {
        let Ok(tx) = map_transaction(row("COMPLETED", None)) else {
            panic!("row should map");
        };
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.amount, 50_000);
        assert_eq!(tx.contract_id, ContractId::from_bytes([0x12; 32]));
        assert!(tx.secret.is_none());
    }

    #[test]
    fn maps_secret_column() {
        let secret = "ab".repeat(32);
        let Ok(tx) = map_transaction(row("CACHED", Some(&secret))) else {
            panic!("row should map");
        };
        assert_eq!(tx.secret.map(|s| s.to_plain_hex()), Some(secret));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        assert!(matches!(
            map_transaction(row("RELAYED", None)),
            Err(LedgerError::Corrupt(_))
        ));
    }

    #[test]
    fn negative_balance_is_corrupt() {
        assert!(matches!(
            map_snapshot((Utc::now(), -1, 0, 0, 0)),
            Err(LedgerError::Corrupt(_))
        ));
    }
}
