use std::sync::Arc;

use crate::config::Config;
use crate::delivery::DeliveryProvider;
use crate::history::HistoryTracker;
use crate::models::autoresponder::Autoresponder;
use crate::settings::{ListSettings, SettingCache, TemplateSettings};
use crate::store::QueueStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn QueueStore>,
    pub delivery: Arc<dyn DeliveryProvider>,
    pub config: Config,
    pub templates: SettingCache<TemplateSettings>,
    pub lists: SettingCache<ListSettings>,
    pub autoresponders: SettingCache<Autoresponder>,
    pub history: HistoryTracker,
}
