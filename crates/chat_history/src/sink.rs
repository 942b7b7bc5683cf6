use crate::error::HistoryStoreError;
use crate::record::ConversationTurn;
use crate::store::JsonlHistoryStore;

/// Destination for finished conversation turns.
///
/// Implementations block; async callers run them on a blocking task.
pub trait HistorySink: Send + Sync {
    fn record(&self, turn: ConversationTurn) -> Result<(), HistoryStoreError>;
}

impl HistorySink for JsonlHistoryStore {
    fn record(&self, turn: ConversationTurn) -> Result<(), HistoryStoreError> {
        self.append(turn).map(|_| ())
    }
}
