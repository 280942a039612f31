use crate::domain::Snapshot;
use crate::storage::HistoryStore;
use tokio::sync::Mutex;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    inner: Mutex<Vec<Snapshot>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<Snapshot>) -> Self {
        Self {
            inner: Mutex::new(history),
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> anyhow::Result<Vec<Snapshot>> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, history: &[Snapshot]) -> anyhow::Result<()> {
        *self.inner.lock().await = history.to_vec();
        Ok(())
    }
}
