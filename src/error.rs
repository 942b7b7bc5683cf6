use chat_history::HistoryStoreError;
use coze_api::CozeApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Api(#[from] CozeApiError),

    #[error("history store error: {0}")]
    History(#[from] HistoryStoreError),
}
