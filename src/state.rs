use std::sync::Arc;

use crate::auth::{Authenticator, PasswordAuth};
use crate::config::Config;
use crate::storage::ShareStore;
use crate::upload::UploadManager;

/// shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub shares: Arc<ShareStore>,
    /// track ongoing chunked uploads by upload id
    pub uploads: Arc<UploadManager>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// create the state, preparing shares/ and uploads/ under the data directory
    pub fn new(config: Config) -> std::io::Result<Self> {
        let shares = Arc::new(ShareStore::new(&config.data_dir)?);
        let uploads = Arc::new(UploadManager::new(&config.data_dir, config.chunk_size)?);
        let auth: Arc<dyn Authenticator> = Arc::new(PasswordAuth::new(config.cookie_secret.as_deref()));

        Ok(Self {
            config,
            shares,
            uploads,
            auth,
        })
    }
}
