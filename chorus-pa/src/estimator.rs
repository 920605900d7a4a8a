//! Background clock-offset estimator
//!
//! Runs as its own task: every cycle it fires a burst of probes at the
//! coordinator's clock channel, appends the candidate offsets to the shared
//! history, then idles. The main scheduling loop only ever reads the
//! resulting estimate through [`OffsetHandle`]; the estimator task is the
//! sole writer.
//!
//! There is no timeout, retry, or reconnect: a transport error ends the
//! estimator task and the agent keeps scheduling with its last estimate.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::debug;

use chorus_common::clock::{
    candidate_offset, probe, ClockEstimate, BURST_IDLE, PROBES_PER_BURST,
};
use chorus_common::{time, Result};

/// Shared, read-mostly view of the offset estimate.
#[derive(Debug, Clone, Default)]
pub struct OffsetHandle {
    estimate: Arc<RwLock<ClockEstimate>>,
}

impl OffsetHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset estimate in microseconds (0 with an empty history).
    pub async fn offset(&self) -> i64 {
        self.estimate.read().await.offset()
    }

    pub async fn sample_count(&self) -> usize {
        self.estimate.read().await.len()
    }

    /// Append one candidate sample. Only the estimator task writes here.
    pub async fn push(&self, sample_us: i64) {
        self.estimate.write().await.push(sample_us);
    }
}

/// Probe the reference clock forever, feeding `handle`.
pub async fn run(clock_addr: String, handle: OffsetHandle) -> Result<()> {
    let mut stream = TcpStream::connect(&clock_addr).await?;
    debug!("clock estimator connected to {}", clock_addr);
    loop {
        for _ in 0..PROBES_PER_BURST {
            let t0 = time::now_us();
            let tr = probe(&mut stream).await?;
            let t1 = time::now_us();
            handle.push(candidate_offset(t0, t1, tr)).await;
        }
        debug!(
            "offset estimate {}us over {} samples",
            handle.offset().await,
            handle.sample_count().await
        );
        tokio::time::sleep(BURST_IDLE).await;
    }
}
