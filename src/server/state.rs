use std::sync::Arc;

use crate::transfer::TransferService;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TransferService>,
}

impl AppState {
    pub fn new(service: Arc<TransferService>) -> Self {
        Self { service }
    }
}
