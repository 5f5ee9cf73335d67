//! Position sampler
//!
//! While the active adapter is playing, a sampling cycle asks it for its
//! position once per frame and forwards genuine values to the coordinator.
//! Each cycle is tied to one track generation and can be cancelled at any
//! time; samples from a cancelled cycle are recognisable by their cycle id.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audio::{Adapter, Generation};
use crate::model::TrackSource;

/// A position read from the active adapter
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub generation: Generation,
    pub cycle: u64,
    /// Seconds; unavailable positions are never sampled
    pub position: f64,
}

struct SamplerCycle {
    generation: Generation,
    source: TrackSource,
    cycle: u64,
    token: CancellationToken,
}

pub struct PositionSampler {
    frame: Duration,
    samples: mpsc::UnboundedSender<Sample>,
    active: Option<SamplerCycle>,
    next_cycle: u64,
}

impl PositionSampler {
    pub fn new(frame: Duration, samples: mpsc::UnboundedSender<Sample>) -> Self {
        Self {
            frame,
            samples,
            active: None,
            next_cycle: 0,
        }
    }

    /// Re-evaluate the sampling condition for the current track.
    ///
    /// Keeps a running cycle when it already targets this generation and
    /// source, otherwise replaces or stops it.
    pub fn reconcile(&mut self, should_run: bool, generation: Generation, adapter: &Adapter) {
        if !should_run {
            self.cancel();
            return;
        }
        let up_to_date = self
            .active
            .as_ref()
            .is_some_and(|c| c.generation == generation && c.source == adapter.source());
        if !up_to_date {
            self.restart(generation, adapter);
        }
    }

    /// Cancel the running cycle (if any) and start a fresh one
    pub fn restart(&mut self, generation: Generation, adapter: &Adapter) {
        self.cancel();

        self.next_cycle += 1;
        let cycle = self.next_cycle;
        let token = CancellationToken::new();
        self.active = Some(SamplerCycle {
            generation,
            source: adapter.source(),
            cycle,
            token: token.clone(),
        });

        tracing::debug!(%generation, cycle, source = %adapter.source(), "Position sampling started");
        tokio::spawn(sample_loop(
            adapter.clone(),
            self.frame,
            Sample { generation, cycle, position: 0.0 },
            token,
            self.samples.clone(),
        ));
    }

    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            tracing::debug!(generation = %active.generation, cycle = active.cycle, "Position sampling cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `sample` was produced by the cycle that is currently running
    pub fn is_current(&self, sample: &Sample) -> bool {
        self.active
            .as_ref()
            .is_some_and(|c| c.cycle == sample.cycle && c.generation == sample.generation)
    }

    #[cfg(test)]
    pub(crate) fn current_cycle(&self) -> Option<(Generation, u64)> {
        self.active.as_ref().map(|c| (c.generation, c.cycle))
    }
}

impl Drop for PositionSampler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn sample_loop(
    adapter: Adapter,
    frame: Duration,
    tag: Sample,
    token: CancellationToken,
    samples: mpsc::UnboundedSender<Sample>,
) {
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(position) = adapter.get_position().await else {
            continue;
        };
        if token.is_cancelled() {
            break;
        }
        if samples.send(Sample { position, ..tag }).is_err() {
            break;
        }
    }
    tracing::trace!(cycle = tag.cycle, "Position sampling loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::audio::testing::FakeRemote;
    use crate::audio::{event_channel, AdapterEvent, RemoteSdkAdapter};
    use crate::config::AppConfig;
    use crate::model::Track;
    use tokio::time::timeout;

    fn remote_track() -> Track {
        Track {
            id: "r".to_string(),
            title: "R".to_string(),
            artist: String::new(),
            source: TrackSource::RemoteSdk,
            locator: "spotify:track:r".to_string(),
            duration_ms: 120_000,
        }
    }

    async fn remote_adapter(load: bool) -> Adapter {
        let (tx, mut rx) = event_channel();
        let adapter = RemoteSdkAdapter::new(Arc::new(FakeRemote::default()), &AppConfig::default(), tx);
        adapter.set_token("t").await;
        if load {
            adapter.load(&remote_track(), Generation(1)).await;
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            assert!(matches!(event, AdapterEvent::Loaded { .. }));
            adapter.seek(12.0).await;
        }
        Adapter::RemoteSdk(adapter)
    }

    #[tokio::test]
    async fn samples_tagged_with_running_cycle() {
        let adapter = remote_adapter(true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sampler = PositionSampler::new(Duration::from_millis(5), tx);

        sampler.reconcile(true, Generation(1), &adapter);
        let sample = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();

        assert!(sampler.is_current(&sample));
        assert_eq!(sample.generation, Generation(1));
        assert_eq!(sample.position, 12.0);
    }

    #[tokio::test]
    async fn reconcile_keeps_cycle_for_same_generation() {
        let adapter = remote_adapter(true).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sampler = PositionSampler::new(Duration::from_millis(5), tx);

        sampler.reconcile(true, Generation(1), &adapter);
        let first = sampler.current_cycle();
        sampler.reconcile(true, Generation(1), &adapter);
        assert_eq!(sampler.current_cycle(), first);

        sampler.reconcile(true, Generation(2), &adapter);
        assert_ne!(sampler.current_cycle(), first);

        sampler.reconcile(false, Generation(2), &adapter);
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn cancelled_cycle_stops_writing() {
        let adapter = remote_adapter(true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sampler = PositionSampler::new(Duration::from_millis(5), tx);

        sampler.reconcile(true, Generation(1), &adapter);
        let sample = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        sampler.cancel();
        assert!(!sampler.is_current(&sample));

        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unavailable_positions_are_never_sampled() {
        let adapter = remote_adapter(false).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sampler = PositionSampler::new(Duration::from_millis(5), tx);

        sampler.reconcile(true, Generation(1), &adapter);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(sampler.is_running());
        assert!(rx.try_recv().is_err());
    }
}
