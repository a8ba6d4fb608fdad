use std::sync::Arc;

use crate::config::CONFIG;
use crate::grouping::GroupConsolidator;
use crate::relay::RelayHandle;

/// Shared state handed to every dptree endpoint. Grouping state is only ever
/// touched through the consolidator's entry points; the relay handle is the
/// only path to outbound sends.
#[derive(Clone)]
pub struct AppState {
    pub consolidator: Arc<GroupConsolidator>,
    pub relay: RelayHandle,
}

impl AppState {
    pub fn new(relay: RelayHandle) -> Self {
        AppState {
            consolidator: Arc::new(GroupConsolidator::new(CONFIG.finalized_group_ttl())),
            relay,
        }
    }
}
