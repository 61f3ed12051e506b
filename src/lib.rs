pub mod config;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod history;
pub mod models;
pub mod queue;
pub mod settings;
pub mod state;
pub mod store;

use std::sync::Arc;

use crate::config::Config;
use crate::delivery::DeliveryProvider;
use crate::history::HistoryTracker;
use crate::settings::SettingCache;
use crate::state::{AppState, SharedState};
use crate::store::QueueStore;

/// Builds the shared application state over the given store and delivery
/// adapters.
pub fn build_state(
    store: Arc<dyn QueueStore>,
    delivery: Arc<dyn DeliveryProvider>,
    config: Config,
) -> SharedState {
    Arc::new(AppState {
        store,
        delivery,
        config,
        templates: SettingCache::new(),
        lists: SettingCache::new(),
        autoresponders: SettingCache::new(),
        history: HistoryTracker::new(),
    })
}
