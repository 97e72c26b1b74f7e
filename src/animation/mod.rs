use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;


/// A point in coordinate space (WGS84 degrees).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One rendered marker position, delivered per animation step.
#[derive(Clone, Debug)]
pub struct RenderFrame {
    pub entity_id: String,
    pub position: Position,
}

/// Linear interpolation from `from` to `to` in `steps` steps.
///
/// Returns `steps + 1` points: index t is `from + (to - from) * t/steps`,
/// so the first point is exactly `from` and the last exactly `to`.
pub fn interpolate(from: Position, to: Position, steps: u32) -> Vec<Position> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|t| {
            let progress = f64::from(t) / f64::from(steps);
            Position {
                latitude: from.latitude + (to.latitude - from.latitude) * progress,
                longitude: from.longitude + (to.longitude - from.longitude) * progress,
            }
        })
        .collect()
}

struct AnimatorInner {
    /// Last position actually handed to the renderer, per entity. A new
    /// animation starts from here, not from the update's origin, so a
    /// superseded animation never snaps back.
    displayed: DashMap<String, Position>,

    /// In-flight animation task per entity
    tasks: DashMap<String, JoinHandle<()>>,

    /// Animation generation per entity. abort() does not stop a task that
    /// is already mid-poll on another worker, so each frame carries the
    /// generation it was spawned under and stale frames are dropped.
    generations: DashMap<String, u64>,

    frame_tx: broadcast::Sender<RenderFrame>,
    duration: Duration,
    steps: u32,
}

impl AnimatorInner {
    fn bump_generation(&self, entity_id: &str) -> u64 {
        let mut entry = self.generations.entry(entity_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Render one frame, unless the animation that produced it has been
    /// superseded. Returns false when the frame was dropped so the task
    /// can stop early.
    fn emit(&self, entity_id: &str, position: Position, generation: u64) -> bool {
        let live = self
            .generations
            .get(entity_id)
            .map_or(false, |current| *current == generation);
        if !live {
            return false;
        }

        self.displayed.insert(entity_id.to_string(), position);
        let _ = self.frame_tx.send(RenderFrame {
            entity_id: entity_id.to_string(),
            position,
        });
        true
    }
}

/// Drives smooth marker movement: each location update becomes a paced
/// sequence of interpolated render frames on a broadcast channel.
///
/// One cancellable task per entity; a newer update for the same entity
/// supersedes the in-flight animation.
pub struct MarkerAnimator {
    inner: Arc<AnimatorInner>,
}

impl MarkerAnimator {
    pub fn new(duration: Duration, steps: u32) -> Self {
        let (frame_tx, _) = broadcast::channel(4096);
        Self {
            inner: Arc::new(AnimatorInner {
                displayed: DashMap::new(),
                tasks: DashMap::new(),
                generations: DashMap::new(),
                frame_tx,
                duration,
                steps: steps.max(1),
            }),
        }
    }

    /// Subscribe to the per-step render frames.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<RenderFrame> {
        self.inner.frame_tx.subscribe()
    }

    /// Move the entity's marker to `to`.
    ///
    /// First sighting renders a single frame at the target. Otherwise an
    /// animation task interpolates from the currently displayed position,
    /// aborting any in-flight animation for the same entity.
    pub fn animate(&self, entity_id: &str, to: Position) {
        let generation = self.inner.bump_generation(entity_id);

        let from = match self.inner.displayed.get(entity_id) {
            Some(displayed) => *displayed,
            None => {
                // New marker: place it directly, nothing to animate from
                self.inner.emit(entity_id, to, generation);
                return;
            }
        };

        if let Some((_, previous)) = self.inner.tasks.remove(entity_id) {
            previous.abort();
        }

        let inner = Arc::clone(&self.inner);
        let id = entity_id.to_string();
        let handle = tokio::spawn(async move {
            let path = interpolate(from, to, inner.steps);
            let step_delay = inner.duration / inner.steps;

            for (i, position) in path.into_iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(step_delay).await;
                }
                if !inner.emit(&id, position, generation) {
                    break;
                }
            }
        });

        self.inner.tasks.insert(entity_id.to_string(), handle);
    }

    /// Position last handed to the renderer for an entity.
    pub fn displayed(&self, entity_id: &str) -> Option<Position> {
        self.inner.displayed.get(entity_id).map(|p| *p)
    }

    /// Halt every pending animation step. Called on subsystem teardown.
    pub fn shutdown(&self) {
        for entry in self.inner.tasks.iter() {
            entry.value().abort();
        }
        self.inner.tasks.clear();
        // Invalidate any straggler frame a just-aborted task still gets in
        for mut entry in self.inner.generations.iter_mut() {
            *entry += 1;
        }
    }
}

impl Drop for MarkerAnimator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
