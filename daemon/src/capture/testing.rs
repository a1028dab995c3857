//! Scriptable [`AudioInput`] used by the state machine tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{AudioInput, CaptureError, Encoding, InputHandle};

/// What happened to the fake device, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Opened(Instant),
    Closed(Instant),
}

#[derive(Clone)]
pub struct FakeInput {
    clip: Bytes,
    supported: Vec<Encoding>,
    failure: Option<CaptureError>,
    close_delay: Duration,
    counters: Arc<Counters>,
    log: Arc<Mutex<Vec<DeviceEvent>>>,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeInput {
    /// A device that records `clip` as a single chunk
    pub fn with_clip(clip: &[u8]) -> Self {
        Self {
            clip: Bytes::copy_from_slice(clip),
            supported: vec![Encoding::Wav],
            failure: None,
            close_delay: Duration::ZERO,
            counters: Arc::default(),
            log: Arc::default(),
        }
    }

    /// A device that records nothing
    pub fn silent() -> Self {
        Self::with_clip(b"")
    }

    /// A device whose `open` always fails with `error`
    pub fn failing(error: CaptureError) -> Self {
        let mut input = Self::silent();
        input.failure = Some(error);
        input
    }

    pub fn supporting(mut self, encodings: &[Encoding]) -> Self {
        self.supported = encodings.to_vec();
        self
    }

    /// Time the device takes to shut down after a stop request
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Calls to `open`, failed ones included
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                DeviceEvent::Opened(at) => Some(at),
                DeviceEvent::Closed(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl AudioInput for FakeInput {
    fn supports(&self, encoding: Encoding) -> bool {
        self.supported.contains(&encoding)
    }

    async fn open(&self, _encoding: Encoding) -> Result<InputHandle, CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let now_active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.log.lock().unwrap().push(DeviceEvent::Opened(Instant::now()));

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        let clip = self.clip.clone();
        let close_delay = self.close_delay;
        let counters = Arc::clone(&self.counters);
        let log = Arc::clone(&self.log);

        tokio::spawn(async move {
            stopped.cancelled().await;
            if !close_delay.is_zero() {
                tokio::time::sleep(close_delay).await;
            }
            if !clip.is_empty() {
                let _ = tx.send(clip);
            }
            counters.active.fetch_sub(1, Ordering::SeqCst);
            counters.closes.fetch_add(1, Ordering::SeqCst);
            log.lock().unwrap().push(DeviceEvent::Closed(Instant::now()));
        });

        Ok(InputHandle::new(rx, stop))
    }
}
