//! Clock-offset estimation between an agent and the coordinator's
//! reference clock.
//!
//! Each round-trip probe yields one candidate offset under the assumption
//! that network latency is symmetric: if the probe left at local time `t0`,
//! the reference replied `tr`, and the reply landed at local time `t1`, then
//! the reference read its clock at roughly the local midpoint `(t0 + t1) / 2`
//! and the candidate offset is `(t0 + t1) / 2 - tr`.
//!
//! Single candidates are noisy (an asymmetric-latency round trip skews the
//! midpoint), so the exposed estimate is a trimmed mean over a bounded
//! sample history: sort, drop the lowest and highest quartiles, average the
//! middle half.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;

/// Maximum number of offset samples retained; oldest evicted on overflow.
pub const HISTORY_CAPACITY: usize = 100;

/// Probes issued back-to-back per estimator cycle.
pub const PROBES_PER_BURST: usize = 5;

/// Idle time between probe bursts.
pub const BURST_IDLE: Duration = Duration::from_secs(5);

/// Candidate offset from one round-trip probe, in microseconds.
///
/// `t0`/`t1` are local dispatch/receipt times, `tr` the reference reading
/// returned by the peer.
pub fn candidate_offset(t0: i64, t1: i64, tr: i64) -> i64 {
    (t0 + t1) / 2 - tr
}

/// Bounded history of offset samples with a trimmed-mean estimate.
#[derive(Debug, Default)]
pub struct ClockEstimate {
    samples: VecDeque<i64>,
}

impl ClockEstimate {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append a sample, evicting the oldest once at capacity.
    pub fn push(&mut self, sample_us: i64) {
        if self.samples.len() == HISTORY_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample_us);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Current offset estimate in microseconds: the average of the sorted
    /// middle half of the history (`sorted[n/4 .. n/4 + (n+1)/2]`), or 0
    /// when no samples have been collected yet.
    pub fn offset(&self) -> i64 {
        let mut sorted: Vec<i64> = self.samples.iter().copied().collect();
        if sorted.is_empty() {
            return 0;
        }
        sorted.sort_unstable();
        let n = sorted.len();
        let middle = &sorted[n / 4..n / 4 + (n + 1) / 2];
        middle.iter().sum::<i64>() / middle.len() as i64
    }
}

/// Single request byte on the probe channel. A zero-length request is not
/// delimitable on a byte stream, so one fixed byte stands in for "empty".
pub const PROBE_REQUEST: u8 = 0;

/// Issue one probe on an established connection and return the reference
/// clock reading. Blocks until the peer replies; there is no timeout.
pub async fn probe<S>(stream: &mut S) -> Result<i64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_u8(PROBE_REQUEST).await?;
    stream.flush().await?;
    Ok(stream.read_i64().await?)
}

/// Answer a single probe with the current reference reading, sampled after
/// the request arrives. The reference side validates nothing; any request
/// byte gets a reply.
pub async fn answer_probe<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.read_u8().await?;
    stream.write_i64(crate::time::now_us()).await?;
    stream.flush().await?;
    Ok(())
}
