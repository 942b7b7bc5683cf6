mod error;
mod record;
mod sink;
mod store;

pub use error::HistoryStoreError;
pub use record::{ConversationTurn, HistoryRecord};
pub use sink::HistorySink;
pub use store::JsonlHistoryStore;
