use tokio::time::Instant;

/// One replica's row in the shared state table, keyed by replica index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub key: String,
    pub timestamp: Instant,
    pub active: bool,
}

impl LogRow {
    pub fn new(key: impl Into<String>, timestamp: Instant, active: bool) -> Self {
        Self { key: key.into(), timestamp, active }
    }

    pub fn index(&self) -> Option<usize> {
        self.key.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn index_parses_the_replica_key() {
        let row = LogRow::new("3", Instant::now(), true);
        assert_eq!(row.index(), Some(3));
    }

    #[tokio::test]
    async fn index_is_none_for_a_non_numeric_key() {
        let row = LogRow::new("leader", Instant::now(), true);
        assert_eq!(row.index(), None);
    }
}
