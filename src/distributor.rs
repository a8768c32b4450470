//! Fan-out of receiver sample blocks to the spectrum and demodulation paths.
//!
//! The driver callback only enqueues: every block goes to the demodulation
//! worker, and at most one block per throttle interval goes to the spectrum
//! worker. Each worker runs on its own thread, so a slow render never delays
//! audio and the other way round.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;
use tracing::{debug, trace, warn};

use crate::SampleBlock;
use crate::error::{Error, Result};

/// Spectrum frame-rate cap.
pub const SPECTRUM_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Blocks the demodulation worker may fall behind before the oldest is dropped.
pub const DEMOD_QUEUE_BLOCKS: usize = 64;

const NEVER: u64 = u64::MAX;

/// Consumer of sample blocks, run on a worker thread.
pub trait BlockSink: Send {
    fn process(&mut self, block: &SampleBlock);
}

impl<F> BlockSink for F
where
    F: FnMut(&SampleBlock) + Send,
{
    fn process(&mut self, block: &SampleBlock) {
        self(block)
    }
}

/**
 * Lock-free rate limiter
 *
 * The check and the timestamp update are one compare-and-swap, so two
 * concurrent deliveries cannot both pass within the same interval.
 */
#[derive(Debug)]
pub struct SpectrumThrottle {
    interval: Duration,
    epoch: Instant,
    /// Nanoseconds since `epoch` of the last accepted update
    last: AtomicU64,
}

impl SpectrumThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            epoch: Instant::now(),
            last: AtomicU64::new(NEVER),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true and records `now` if an interval has elapsed since the
    /// last accepted call.
    pub fn try_acquire(&self, now: Instant) -> bool {
        let now_ns = now.saturating_duration_since(self.epoch).as_nanos() as u64;
        let interval_ns = self.interval.as_nanos() as u64;
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            if last != NEVER && now_ns.saturating_sub(last) < interval_ns {
                return false;
            }
            match self
                .last
                .compare_exchange_weak(last, now_ns, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => last = actual,
            }
        }
    }

    pub fn reset(&self) {
        self.last.store(NEVER, Ordering::Release);
    }
}

/// Per-path delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DistributorStats {
    pub received: u64,
    pub spectrum_forwarded: u64,
    /// Blocks that passed the throttle while the spectrum worker was busy
    pub spectrum_busy: u64,
    /// Oldest blocks evicted because the demodulation worker fell behind
    pub demod_dropped: u64,
    /// Blocks waiting for the demodulation worker
    pub demod_queued: usize,
}

/**
 * Sample distributor
 *
 * `on_samples` is safe to call from any thread, including after the workers
 * have stopped, in which case blocks are discarded.
 */
pub struct SampleDistributor {
    demod_tx: Sender<SampleBlock>,
    /// Producer-side handle on the demod queue, used to evict the oldest block
    demod_backlog: Receiver<SampleBlock>,
    /// Cleared once the workers are stopped
    open: Arc<AtomicBool>,
    spectrum_tx: Sender<SampleBlock>,
    throttle: SpectrumThrottle,
    received: AtomicU64,
    spectrum_forwarded: AtomicU64,
    spectrum_busy: AtomicU64,
    demod_dropped: AtomicU64,
}

impl SampleDistributor {
    pub fn on_samples(&self, block: SampleBlock) {
        self.received.fetch_add(1, Ordering::Relaxed);
        let now = block.received_at();

        if self.throttle.try_acquire(now) {
            match self.spectrum_tx.try_send(block.clone()) {
                Ok(()) => {
                    self.spectrum_forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    self.spectrum_busy.fetch_add(1, Ordering::Relaxed);
                    trace!("spectrum worker busy, block not rendered");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }

        self.forward_demod(block);
    }

    /// Queues `block` for demodulation. A full queue loses its oldest block,
    /// as the audio ring does, so latency stays bounded.
    fn forward_demod(&self, mut block: SampleBlock) {
        // `demod_backlog` keeps the channel connected, so check the workers
        if !self.open.load(Ordering::Acquire) {
            trace!("demodulation worker stopped, block discarded");
            return;
        }
        loop {
            match self.demod_tx.try_send(block) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.demod_backlog.try_recv().is_ok() {
                        self.demod_dropped.fetch_add(1, Ordering::Relaxed);
                        debug!("demodulation falling behind, oldest block dropped");
                    }
                    block = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    trace!("demodulation worker stopped, block discarded");
                    return;
                }
            }
        }
    }

    pub fn stats(&self) -> DistributorStats {
        DistributorStats {
            received: self.received.load(Ordering::Relaxed),
            spectrum_forwarded: self.spectrum_forwarded.load(Ordering::Relaxed),
            spectrum_busy: self.spectrum_busy.load(Ordering::Relaxed),
            demod_dropped: self.demod_dropped.load(Ordering::Relaxed),
            demod_queued: self.demod_tx.len(),
        }
    }

    pub fn throttle(&self) -> &SpectrumThrottle {
        &self.throttle
    }
}

/// Worker threads behind a distributor.
pub struct Workers {
    open: Arc<AtomicBool>,
    shutdown: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Stops the workers and waits for them. Blocks being processed are
    /// completed first; queued blocks are dropped.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.open.store(false, Ordering::Release);
        self.shutdown.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("sample worker panicked");
            }
        }
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_worker<S: BlockSink + 'static>(
    name: &str,
    mut sink: S,
    blocks: Receiver<SampleBlock>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let label = name.to_string();
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            debug!("{} worker started", label);
            loop {
                select! {
                    recv(shutdown) -> _ => break,
                    recv(blocks) -> msg => match msg {
                        Ok(block) => sink.process(&block),
                        Err(_) => break,
                    },
                }
            }
            debug!("{} worker stopped", label);
        })
        .map_err(Error::from)
}

/// Starts one worker per path and returns the distributor feeding them.
pub fn spawn<D, S>(
    demod: D,
    spectrum: S,
    interval: Duration,
) -> Result<(Arc<SampleDistributor>, Workers)>
where
    D: BlockSink + 'static,
    S: BlockSink + 'static,
{
    spawn_with_backlog(demod, spectrum, interval, DEMOD_QUEUE_BLOCKS)
}

/// As [`spawn`], with `backlog` blocks of demodulation queue.
pub fn spawn_with_backlog<D, S>(
    demod: D,
    spectrum: S,
    interval: Duration,
    backlog: usize,
) -> Result<(Arc<SampleDistributor>, Workers)>
where
    D: BlockSink + 'static,
    S: BlockSink + 'static,
{
    if backlog == 0 {
        return Err(Error::invalid_parameter("demodulation backlog of 0 blocks"));
    }
    let (demod_tx, demod_rx) = channel::bounded(backlog);
    let demod_backlog = demod_rx.clone();
    let (spectrum_tx, spectrum_rx) = channel::bounded(1);
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

    let open = Arc::new(AtomicBool::new(true));
    let mut workers = Workers {
        open: open.clone(),
        shutdown: Some(shutdown_tx),
        handles: Vec::with_capacity(2),
    };
    workers
        .handles
        .push(spawn_worker("demod", demod, demod_rx, shutdown_rx.clone())?);
    workers
        .handles
        .push(spawn_worker("spectrum", spectrum, spectrum_rx, shutdown_rx)?);

    let distributor = SampleDistributor {
        demod_tx,
        demod_backlog,
        open,
        spectrum_tx,
        throttle: SpectrumThrottle::new(interval),
        received: AtomicU64::new(0),
        spectrum_forwarded: AtomicU64::new(0),
        spectrum_busy: AtomicU64::new(0),
        demod_dropped: AtomicU64::new(0),
    };
    Ok((Arc::new(distributor), workers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    fn block(n: usize) -> SampleBlock {
        SampleBlock::new(vec![Complex::new(0.0, 0.0); n])
    }

    #[test]
    fn test_throttle_interval() {
        let throttle = SpectrumThrottle::new(Duration::from_millis(10));
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(5)));
        assert!(throttle.try_acquire(t0 + Duration::from_millis(10)));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(19)));
        throttle.reset();
        assert!(throttle.try_acquire(t0 + Duration::from_millis(19)));
    }

    #[test]
    fn test_throttle_single_winner_under_contention() {
        let throttle = Arc::new(SpectrumThrottle::new(Duration::from_secs(60)));
        let now = Instant::now();
        let winners: usize = (0..8)
            .map(|_| {
                let throttle = throttle.clone();
                std::thread::spawn(move || throttle.try_acquire(now) as usize)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_every_block_reaches_demod() {
        let (tx, rx) = channel::unbounded();
        let demod = move |b: &SampleBlock| {
            tx.send(b.len()).unwrap();
        };
        let spectrum = |_: &SampleBlock| {};
        let (distributor, workers) = spawn(demod, spectrum, Duration::from_secs(60)).unwrap();

        for i in 1..=50 {
            distributor.on_samples(block(i));
        }
        let lens: Vec<usize> = (0..50)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(lens, (1..=50).collect::<Vec<_>>());

        let stats = distributor.stats();
        assert_eq!(stats.received, 50);
        // Only the first block passes a one-minute throttle
        assert_eq!(stats.spectrum_forwarded + stats.spectrum_busy, 1);
        workers.shutdown();
    }

    #[test]
    fn test_slow_spectrum_does_not_hold_demod() {
        let (tx, rx) = channel::unbounded();
        let demod = move |_: &SampleBlock| {
            tx.send(()).unwrap();
        };
        let spectrum = |_: &SampleBlock| std::thread::sleep(Duration::from_millis(200));
        let (distributor, workers) = spawn(demod, spectrum, Duration::ZERO).unwrap();

        for _ in 0..20 {
            distributor.on_samples(block(8));
        }
        for _ in 0..20 {
            rx.recv_timeout(Duration::from_millis(150)).unwrap();
        }
        let stats = distributor.stats();
        assert!(stats.spectrum_busy > 0);
        workers.shutdown();
    }

    #[test]
    fn test_demod_backlog_drops_oldest() {
        let (started_tx, started_rx) = channel::bounded(1);
        let (gate_tx, gate_rx) = channel::bounded::<()>(0);
        let (out_tx, out_rx) = channel::unbounded();
        let mut first = true;
        let demod = move |b: &SampleBlock| {
            if first {
                first = false;
                started_tx.send(()).unwrap();
                let _ = gate_rx.recv();
            }
            out_tx.send(b.len()).unwrap();
        };
        let (distributor, workers) =
            spawn_with_backlog(demod, |_: &SampleBlock| {}, Duration::from_secs(60), 2).unwrap();

        distributor.on_samples(block(1));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Worker is held on block 1: 2..=6 overflow a backlog of two
        for i in 2..=6 {
            distributor.on_samples(block(i));
        }
        let stats = distributor.stats();
        assert_eq!(stats.demod_dropped, 3);
        assert_eq!(stats.demod_queued, 2);

        drop(gate_tx);
        let lens: Vec<usize> = (0..3)
            .map(|_| out_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(lens, vec![1, 5, 6]);
        workers.shutdown();
    }

    #[test]
    fn test_zero_backlog_rejected() {
        let result = spawn_with_backlog(|_: &SampleBlock| {}, |_: &SampleBlock| {}, SPECTRUM_INTERVAL, 0);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_delivery_after_shutdown_is_harmless() {
        let (distributor, workers) =
            spawn(|_: &SampleBlock| {}, |_: &SampleBlock| {}, SPECTRUM_INTERVAL).unwrap();
        workers.shutdown();
        for _ in 0..(DEMOD_QUEUE_BLOCKS + 1) {
            distributor.on_samples(block(16));
        }
        let stats = distributor.stats();
        assert_eq!(stats.received, DEMOD_QUEUE_BLOCKS as u64 + 1);
        assert_eq!(stats.demod_queued, 0);
        assert_eq!(stats.demod_dropped, 0);
    }
}
