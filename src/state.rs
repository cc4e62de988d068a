use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::DatabaseProxy;
use crate::id::IdGenerator;
use crate::services::audio::AudioService;
use crate::services::llm::LLMProvider;
use crate::services::translator::WordTranslator;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    db_proxy: Option<Arc<DatabaseProxy>>,
    id_generator: Arc<IdGenerator>,
    llm: Arc<LLMProvider>,
    translator: Arc<WordTranslator>,
    audio: Arc<AudioService>,
}

impl AppState {
    pub fn new(db_proxy: Option<Arc<DatabaseProxy>>, id_generator: Arc<IdGenerator>) -> Self {
        let llm = Arc::new(LLMProvider::from_env());
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            db_proxy,
            id_generator,
            translator: Arc::new(WordTranslator::new(Arc::clone(&llm))),
            audio: Arc::new(AudioService::from_env()),
            llm,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn db_proxy(&self) -> Option<Arc<DatabaseProxy>> {
        self.db_proxy.clone()
    }

    pub fn id_generator(&self) -> Arc<IdGenerator> {
        Arc::clone(&self.id_generator)
    }

    pub fn llm(&self) -> Arc<LLMProvider> {
        Arc::clone(&self.llm)
    }

    pub fn translator(&self) -> Arc<WordTranslator> {
        Arc::clone(&self.translator)
    }

    pub fn audio(&self) -> Arc<AudioService> {
        Arc::clone(&self.audio)
    }
}
