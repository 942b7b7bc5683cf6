#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::time::{sleep, Duration};

use chat_history::{ConversationTurn, HistorySink, HistoryStoreError};
use coze_agent::AgentService;

#[path = "../../crates/coze_api/tests/common/mod.rs"]
mod server;

pub use server::*;

/// Service constructors over the transport test server.
pub trait ServiceExt {
    fn service(&self) -> AgentService;
    fn service_with_history(&self) -> (AgentService, Arc<RecordingSink>);
}

impl ServiceExt for ScriptedServer {
    fn service(&self) -> AgentService {
        AgentService::new(self.client())
    }

    fn service_with_history(&self) -> (AgentService, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (self.service().with_history(sink.clone()), sink)
    }
}

/// History sink that keeps turns in memory.
#[derive(Default)]
pub struct RecordingSink {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl RecordingSink {
    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.lock().expect("turns lock").clone()
    }

    /// Saves run on a detached task; wait briefly for `count` turns.
    pub async fn wait_for(&self, count: usize) -> Vec<ConversationTurn> {
        for _ in 0..100 {
            let turns = self.turns();
            if turns.len() >= count {
                return turns;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.turns()
    }
}

impl HistorySink for RecordingSink {
    fn record(&self, turn: ConversationTurn) -> Result<(), HistoryStoreError> {
        self.turns.lock().expect("turns lock").push(turn);
        Ok(())
    }
}
