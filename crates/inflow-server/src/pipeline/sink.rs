//! Postgres COPY sink
//!
//! Bulk rows enter the database through a single COPY statement. COPY is
//! atomic: if the stream is aborted or the connection drops, Postgres rolls
//! the whole load back, so a failed upload leaves zero rows behind and the
//! client can simply re-run processing.

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgCopyIn, PgPoolCopyExt};
use sqlx::{PgPool, Postgres};

const COPY_STATEMENT: &str =
    "COPY webhook_events (provider, event_id, timestamp, data) FROM STDIN WITH (FORMAT csv)";

#[derive(Clone)]
pub struct BulkCopySink {
    pool: PgPool,
}

impl BulkCopySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Start a COPY session on a pooled connection.
    pub async fn begin(&self) -> Result<BulkCopySession, sqlx::Error> {
        let copy = self.pool.copy_in_raw(COPY_STATEMENT).await?;
        Ok(BulkCopySession { copy })
    }
}

/// One in-flight COPY. Must end in `finish` or `abort`; either way the
/// pooled connection is released.
pub struct BulkCopySession {
    copy: PgCopyIn<PoolConnection<Postgres>>,
}

impl BulkCopySession {
    pub async fn send(&mut self, line: &[u8]) -> Result<(), sqlx::Error> {
        self.copy.send(line).await?;
        Ok(())
    }

    /// Complete the COPY, returning the number of rows written.
    pub async fn finish(self) -> Result<u64, sqlx::Error> {
        self.copy.finish().await
    }

    /// Cancel the COPY. Postgres discards everything sent so far.
    pub async fn abort(self, reason: &str) -> Result<(), sqlx::Error> {
        self.copy.abort(reason).await
    }
}
