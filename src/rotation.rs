//! Background image rotation.
//!
//! [`Rotation`] is the plain state machine; [`RotationController`] drives its
//! ticks from a tokio timer and publishes the current image on a watch
//! channel.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DEFAULT_ROTATION_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Empty,
    Rotating,
    Paused,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationError {
    #[error("rotation has been disposed")]
    Disposed,
    #[error("no images to rotate")]
    Empty,
    #[error("index {index} out of range for {len} images")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    phase: RotationPhase,
    images: Vec<String>,
    current: usize,
}

impl Default for Rotation {
    fn default() -> Self {
        Self::new()
    }
}

impl Rotation {
    pub fn new() -> Self {
        Self {
            phase: RotationPhase::Empty,
            images: Vec::new(),
            current: 0,
        }
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn current_image(&self) -> Option<&str> {
        match self.phase {
            RotationPhase::Rotating | RotationPhase::Paused => {
                self.images.get(self.current).map(String::as_str)
            }
            RotationPhase::Empty | RotationPhase::Disposed => None,
        }
    }

    /// Starts rotating over `images` from index 0. An empty list leaves the
    /// rotation inert.
    pub fn load(&mut self, images: Vec<String>) -> Result<(), RotationError> {
        if self.phase == RotationPhase::Disposed {
            return Err(RotationError::Disposed);
        }
        self.current = 0;
        self.phase = if images.is_empty() {
            RotationPhase::Empty
        } else {
            RotationPhase::Rotating
        };
        self.images = images;
        Ok(())
    }

    /// Advances one step. Only has an effect while rotating.
    pub fn tick(&mut self) -> bool {
        if self.phase != RotationPhase::Rotating || self.images.is_empty() {
            return false;
        }
        self.current = (self.current + 1) % self.images.len();
        true
    }

    pub fn select(&mut self, index: usize) -> Result<(), RotationError> {
        match self.phase {
            RotationPhase::Disposed => return Err(RotationError::Disposed),
            RotationPhase::Empty => return Err(RotationError::Empty),
            RotationPhase::Rotating | RotationPhase::Paused => {}
        }
        if index >= self.images.len() {
            return Err(RotationError::OutOfRange {
                index,
                len: self.images.len(),
            });
        }
        self.current = index;
        self.phase = RotationPhase::Paused;
        Ok(())
    }

    /// Paused -> Rotating. Returns false from any other phase.
    pub fn resume(&mut self) -> bool {
        if self.phase != RotationPhase::Paused {
            return false;
        }
        self.phase = RotationPhase::Rotating;
        true
    }

    pub fn dispose(&mut self) {
        self.phase = RotationPhase::Disposed;
    }
}

struct Inner {
    rotation: Rotation,
    generation: u64,
    ticker: Option<CancellationToken>,
}

/// Timer-driven owner of one [`Rotation`]. Must be used inside a tokio
/// runtime. Dropping the controller disposes it.
pub struct RotationController {
    inner: Arc<Mutex<Inner>>,
    interval: Duration,
    current: Arc<watch::Sender<Option<String>>>,
}

impl Default for RotationController {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_ROTATION_MS))
    }
}

impl RotationController {
    pub fn new(interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                rotation: Rotation::new(),
                generation: 0,
                ticker: None,
            })),
            interval,
            current: Arc::new(tx),
        }
    }

    /// Receives the image to show whenever it changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }

    pub fn phase(&self) -> RotationPhase {
        self.inner.lock().rotation.phase()
    }

    pub fn current_index(&self) -> usize {
        self.inner.lock().rotation.current_index()
    }

    pub fn snapshot(&self) -> Rotation {
        self.inner.lock().rotation.clone()
    }

    pub fn load(&self, images: Vec<String>) -> Result<(), RotationError> {
        let mut inner = self.inner.lock();
        inner.rotation.load(images)?;
        Self::stop_ticker(&mut inner);
        self.publish(&inner);
        if inner.rotation.phase() == RotationPhase::Rotating {
            self.start_ticker(&mut inner);
        }
        Ok(())
    }

    /// Shows image `index` and stops the automatic rotation.
    pub fn select(&self, index: usize) -> Result<(), RotationError> {
        let mut inner = self.inner.lock();
        inner.rotation.select(index)?;
        Self::stop_ticker(&mut inner);
        self.publish(&inner);
        Ok(())
    }

    /// Restarts rotation with a full interval before the next step.
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.rotation.resume() {
            return false;
        }
        self.start_ticker(&mut inner);
        true
    }

    /// Terminal. No tick changes the index once this returns.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.rotation.phase() == RotationPhase::Disposed {
            return;
        }
        inner.rotation.dispose();
        Self::stop_ticker(&mut inner);
        self.current.send_replace(None);
        debug!("rotation disposed");
    }

    fn publish(&self, inner: &Inner) {
        self.current
            .send_replace(inner.rotation.current_image().map(str::to_string));
    }

    fn stop_ticker(inner: &mut Inner) {
        inner.generation += 1;
        if let Some(token) = inner.ticker.take() {
            token.cancel();
        }
    }

    fn start_ticker(&self, inner: &mut Inner) {
        Self::stop_ticker(inner);
        let generation = inner.generation;
        let token = CancellationToken::new();
        inner.ticker = Some(token.clone());

        let shared = Arc::clone(&self.inner);
        let current = Arc::clone(&self.current);
        let period = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !apply_tick(&shared, &current, generation, &token) {
                            break;
                        }
                    }
                }
            }
        });
    }
}

/// One timer step. Returns false once the ticker has been superseded.
fn apply_tick(
    shared: &Mutex<Inner>,
    current: &watch::Sender<Option<String>>,
    generation: u64,
    token: &CancellationToken,
) -> bool {
    let mut inner = shared.lock();
    if inner.generation != generation || token.is_cancelled() {
        return false;
    }
    if inner.rotation.tick() {
        current.send_replace(inner.rotation.current_image().map(str::to_string));
    }
    true
}

impl Drop for RotationController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn ticks_wrap_around_the_list() {
        let mut rotation = Rotation::new();
        rotation.load(images()).expect("load");
        let mut seen = vec![rotation.current_index()];
        for _ in 0..4 {
            assert!(rotation.tick());
            seen.push(rotation.current_index());
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn disposed_rotation_ignores_ticks() {
        let mut rotation = Rotation::new();
        rotation.load(images()).expect("load");
        rotation.tick();
        rotation.dispose();
        for _ in 0..5 {
            assert!(!rotation.tick());
        }
        assert_eq!(rotation.current_index(), 1);
        assert_eq!(rotation.current_image(), None);
        assert_eq!(rotation.load(images()), Err(RotationError::Disposed));
        assert_eq!(rotation.select(0), Err(RotationError::Disposed));
    }

    #[test]
    fn empty_rotation_is_inert() {
        let mut rotation = Rotation::new();
        rotation.load(Vec::new()).expect("load");
        assert_eq!(rotation.phase(), RotationPhase::Empty);
        assert!(!rotation.tick());
        assert_eq!(rotation.select(0), Err(RotationError::Empty));
    }

    #[test]
    fn select_pauses_and_resume_continues() {
        let mut rotation = Rotation::new();
        rotation.load(images()).expect("load");
        rotation.select(2).expect("select");
        assert_eq!(rotation.phase(), RotationPhase::Paused);
        assert!(!rotation.tick());
        assert_eq!(rotation.current_index(), 2);
        assert_eq!(
            rotation.select(3),
            Err(RotationError::OutOfRange { index: 3, len: 3 })
        );
        assert!(rotation.resume());
        assert!(!rotation.resume());
        rotation.tick();
        assert_eq!(rotation.current_index(), 0);
    }

    #[test]
    fn single_image_stays_put() {
        let mut rotation = Rotation::new();
        rotation.load(vec!["only".to_string()]).expect("load");
        rotation.tick();
        assert_eq!(rotation.current_index(), 0);
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn controller_advances_on_interval() {
        let controller = RotationController::new(Duration::from_millis(5_000));
        let rx = controller.subscribe();
        controller.load(images()).expect("load");
        assert_eq!(rx.borrow().as_deref(), Some("a"));

        sleep_ms(4_999).await;
        assert_eq!(controller.current_index(), 0);
        sleep_ms(2).await;
        assert_eq!(controller.current_index(), 1);
        assert_eq!(rx.borrow().as_deref(), Some("b"));
        sleep_ms(10_000).await;
        assert_eq!(controller.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn select_stops_ticks_and_resume_resets_phase() {
        let controller = RotationController::new(Duration::from_millis(5_000));
        controller.load(images()).expect("load");
        sleep_ms(3_000).await;
        controller.select(2).expect("select");
        sleep_ms(20_000).await;
        assert_eq!(controller.current_index(), 2);
        assert_eq!(controller.phase(), RotationPhase::Paused);

        assert!(controller.resume());
        sleep_ms(4_999).await;
        assert_eq!(controller.current_index(), 2);
        sleep_ms(2).await;
        assert_eq!(controller.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_controller_never_moves_again() {
        let controller = RotationController::new(Duration::from_millis(5_000));
        let rx = controller.subscribe();
        controller.load(images()).expect("load");
        sleep_ms(5_001).await;
        assert_eq!(controller.current_index(), 1);

        controller.dispose();
        sleep_ms(60_000).await;
        assert_eq!(controller.current_index(), 1);
        assert_eq!(controller.phase(), RotationPhase::Disposed);
        assert_eq!(*rx.borrow(), None);
        assert!(!controller.resume());
    }

    #[tokio::test(start_paused = true)]
    async fn reload_discards_previous_images() {
        let controller = RotationController::new(Duration::from_millis(1_000));
        controller.load(images()).expect("load");
        sleep_ms(1_001).await;
        controller
            .load(vec!["x".to_string(), "y".to_string()])
            .expect("reload");
        assert_eq!(controller.current_index(), 0);
        assert_eq!(controller.snapshot().images(), ["x".to_string(), "y".to_string()]);
        sleep_ms(1_001).await;
        assert_eq!(controller.current_index(), 1);
    }
}
