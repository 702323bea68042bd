use crate::row::LogRow;
use futures::future::BoxFuture;
use ingest_core::IngestError;

/// The shared row table every replica reads and writes its own row to.
/// Implementations talk to the cloud's row-store resource (§4.8); a single
/// boxed future per method keeps this object-safe so tests can substitute
/// an in-memory fake.
pub trait RowStore: Send + Sync {
    /// A snapshot of every row currently in the table. A replica whose row
    /// has expired is not omitted here — omission handling (back-fill from
    /// the last snapshot) is the coordinator's responsibility, not the
    /// store's.
    fn read_all(&self) -> BoxFuture<'static, Result<Vec<LogRow>, IngestError>>;

    fn write_row(&self, row: LogRow) -> BoxFuture<'static, Result<(), IngestError>>;
}
