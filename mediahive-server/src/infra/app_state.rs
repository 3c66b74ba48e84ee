use std::{fmt, sync::Arc};

use mediahive_core::MediaLibrary;

use super::middleware::auth::ApiTokens;

#[derive(Clone)]
pub struct AppState {
    pub library: Arc<MediaLibrary>,
    pub tokens: Arc<ApiTokens>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(library: MediaLibrary, tokens: ApiTokens) -> Self {
        Self {
            library: Arc::new(library),
            tokens: Arc::new(tokens),
        }
    }

    pub fn library(&self) -> &MediaLibrary {
        &self.library
    }
}
