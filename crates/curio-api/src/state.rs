//! Shared application state.

use std::sync::Arc;

use curio_chat::{ContextRetriever, SessionMemory, ToolRegistry, TurnLoop};
use curio_core::{
    ChatBackend, Encoder, ItemRepository, JobQueue, SessionRepository, TurnRepository,
};
use curio_db::{
    Database, PgFtsSearch, PgItemRepository, PgJobQueue, PgSessionRepository, PgTurnRepository,
    PgVectorSearch,
};
use curio_search::HybridRanker;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub encoder: Arc<dyn Encoder>,
    pub chat: Arc<dyn ChatBackend>,
    pub ranker: Arc<HybridRanker>,
    pub items: Arc<dyn ItemRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub turns: Arc<dyn TurnRepository>,
    pub jobs: Arc<dyn JobQueue>,
}

impl AppState {
    /// Assemble state from a connected database and the model backends.
    pub fn new(db: Database, encoder: Arc<dyn Encoder>, chat: Arc<dyn ChatBackend>) -> Self {
        let pool = db.pool.clone();
        let ranker = Arc::new(HybridRanker::new(
            Arc::new(PgFtsSearch::new(pool.clone())),
            Arc::new(PgVectorSearch::new(pool.clone())),
        ));
        Self {
            db,
            encoder,
            chat,
            ranker,
            items: Arc::new(PgItemRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            turns: Arc::new(PgTurnRepository::new(pool.clone())),
            jobs: Arc::new(PgJobQueue::new(pool)),
        }
    }

    /// Build the dialogue loop for one chat turn.
    pub fn turn_loop(&self) -> TurnLoop {
        TurnLoop::new(
            self.chat.clone(),
            ContextRetriever::new(
                self.encoder.clone(),
                self.ranker.clone(),
                self.items.clone(),
                self.sessions.clone(),
            ),
            SessionMemory::new(self.sessions.clone(), self.encoder.clone()),
            ToolRegistry::new(self.encoder.clone(), self.ranker.clone()),
            self.sessions.clone(),
            self.turns.clone(),
        )
    }
}
