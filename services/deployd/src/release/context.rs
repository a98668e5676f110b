//! Per-job execution state.

use std::collections::HashMap;

use slipway_id::ServiceId;

use crate::repo::Checkout;

/// State threaded through the actions of one release execution.
///
/// The checkout is scratch space owned by the context; dropping the
/// context removes it, on success and failure alike. The pod controller
/// map holds the rewritten manifest bytes for exactly the workloads the
/// final batch regrade will address.
#[derive(Default)]
pub struct ReleaseContext {
    pub checkout: Option<Checkout>,
    pub pod_controllers: HashMap<ServiceId, Vec<u8>>,
}

impl ReleaseContext {
    pub fn new() -> Self {
        Self::default()
    }
}
