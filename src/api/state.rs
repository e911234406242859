use std::sync::Arc;

use crate::config::AppConfig;
use crate::render::RenderBackend;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn RenderBackend>,
}
