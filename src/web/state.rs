// Shared application state handed to every request handler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use sigil_chat_db::{Database, SharedDatabase};
use sigil_chat_engine::{LanguageModel, ModelInfo};
use sigil_chat_types::{GenerationSettings, SharedSettings};

use super::config::AppConfig;

/// The loaded model, if any. Held for the whole of a generation call.
pub type SharedModel = Arc<Mutex<Option<Box<dyn LanguageModel>>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: SharedDatabase,
    pub model: SharedModel,
    /// Status of the loaded model, readable while a generation holds `model`.
    loaded: Arc<RwLock<Option<ModelInfo>>>,
    pub settings: SharedSettings,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database) -> anyhow::Result<Self> {
        let settings = config.generation_settings()?;
        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            model: Arc::new(Mutex::new(None)),
            loaded: Arc::new(RwLock::new(None)),
            settings: Arc::new(RwLock::new(settings)),
        })
    }

    /// Lock the model slot. A panic during generation leaves the slot usable.
    pub fn lock_model(&self) -> MutexGuard<'_, Option<Box<dyn LanguageModel>>> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status of the loaded model. Never waits on a running generation.
    pub fn model_info(&self) -> Option<ModelInfo> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn install_model(&self, model: Box<dyn LanguageModel>) {
        let mut slot = self.lock_model();
        let info = model.info();
        *slot = Some(model);
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = Some(info);
    }

    pub fn take_model(&self) -> Option<Box<dyn LanguageModel>> {
        let mut slot = self.lock_model();
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = None;
        slot.take()
    }

    /// Consistent copy of the runtime settings for one request.
    pub fn settings_snapshot(&self) -> GenerationSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
