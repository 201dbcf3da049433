use std::sync::Arc;
use std::time::Duration;

use hail_trip::supervisor::{run_expiry_loop, run_expiry_sweep, AssignmentExpiry};
use hail_trip::{DispatchWorker, TripService};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

/// Long-running tasks that keep dispatch moving outside request handling.
pub struct BackgroundWorkers {
    pub dispatch: DispatchWorker,
    pub expiries: UnboundedReceiver<AssignmentExpiry>,
    pub sweep_interval: Duration,
}

impl BackgroundWorkers {
    pub fn spawn(self, service: Arc<TripService>) -> Vec<JoinHandle<()>> {
        info!("Starting background workers");
        vec![
            tokio::spawn(self.dispatch.run()),
            tokio::spawn(run_expiry_loop(service.clone(), self.expiries)),
            tokio::spawn(run_expiry_sweep(service, self.sweep_interval)),
        ]
    }
}
