//! Asynchronous model loading.
//!
//! `ModelLoader::spawn` reads the file in chunks on the tokio runtime, parses
//! and normalizes it on a blocking worker, and reports back over an unbounded
//! channel. The receiving side (`LoadHandle`) is polled by the UI thread once
//! per frame, or awaited directly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::RecenterMode;
use crate::error::LoadError;
use crate::normalize::{normalize, Normalized};
use crate::scene::{Aabb, Transform};

use super::pose::{posed_bounds, Pose};
use super::vrm::VrmModel;

/// Default read size per progress step.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Bytes read so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    /// File size, when the filesystem reports one
    pub total: Option<u64>,
}

impl LoadProgress {
    /// Fraction in `0.0..=1.0`, if the total is known and non-zero.
    pub fn ratio(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.loaded as f64 / total as f64) as f32),
            _ => None,
        }
    }
}

/// A parsed model together with its rest-pose bounds and normalization.
pub struct LoadedModel {
    pub model: VrmModel,
    /// Rest-pose bounds under an identity root
    pub bounds: Aabb,
    pub normalized: Normalized,
}

pub enum LoadEvent {
    Progress(LoadProgress),
    Loaded(Box<LoadedModel>),
    Failed(LoadError),
}

impl LoadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadEvent::Progress(_))
    }
}

/// Receiving end of one in-flight load.
pub struct LoadHandle {
    path: PathBuf,
    rx: mpsc::UnboundedReceiver<LoadEvent>,
    alive: Arc<AtomicBool>,
    finished: bool,
}

impl LoadHandle {
    /// False once cancelled.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// True after the terminal event has been taken.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next event if one is ready. Never blocks.
    pub fn try_next(&mut self) -> Option<LoadEvent> {
        if self.finished || !self.is_alive() {
            return None;
        }
        let event = self.rx.try_recv().ok()?;
        self.finished = event.is_terminal();
        Some(event)
    }

    /// Wait for the next event. `None` after the terminal event or a cancel.
    pub async fn next_event(&mut self) -> Option<LoadEvent> {
        if self.finished || !self.is_alive() {
            return None;
        }
        let event = self.rx.recv().await?;
        if !self.is_alive() {
            return None;
        }
        self.finished = event.is_terminal();
        Some(event)
    }

    /// Stop the load. Pending and future events are discarded.
    pub fn cancel(&mut self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!("Cancelled load of {}", self.path.display());
        }
        self.rx.close();
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Spawns loads onto a tokio runtime.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    chunk_size: usize,
    recenter: RecenterMode,
}

impl ModelLoader {
    pub fn new(recenter: RecenterMode) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            recenter,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Start loading `path`. Exactly one terminal event is produced unless the
    /// returned handle is cancelled first.
    pub fn spawn(&self, runtime: &Handle, path: impl Into<PathBuf>) -> LoadHandle {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let task_path = path.clone();
        let task_alive = Arc::clone(&alive);
        let chunk_size = self.chunk_size;
        let recenter = self.recenter;

        runtime.spawn(async move {
            let result = load(&task_path, chunk_size, recenter, &tx, &task_alive).await;
            if !task_alive.load(Ordering::Acquire) {
                debug!("Dropping result of cancelled load {}", task_path.display());
                return;
            }
            let event = match result {
                Ok(loaded) => LoadEvent::Loaded(Box::new(loaded)),
                Err(e) => LoadEvent::Failed(e),
            };
            // Receiver gone means the viewer was torn down
            let _ = tx.send(event);
        });

        LoadHandle {
            path,
            rx,
            alive,
            finished: false,
        }
    }
}

async fn load(
    path: &Path,
    chunk_size: usize,
    recenter: RecenterMode,
    tx: &mpsc::UnboundedSender<LoadEvent>,
    alive: &AtomicBool,
) -> Result<LoadedModel, LoadError> {
    let data = read_chunked(path, chunk_size, tx, alive).await?;
    info!("Read {} bytes from {}", data.len(), path.display());

    let parsed = tokio::task::spawn_blocking(move || -> Result<LoadedModel, LoadError> {
        let model = VrmModel::from_slice(&data)?;
        let bounds = posed_bounds(&model, &Pose::rest(&model));
        let normalized = normalize(&bounds, &Transform::IDENTITY, recenter)?;
        Ok(LoadedModel {
            model,
            bounds,
            normalized,
        })
    })
    .await
    .map_err(|e| LoadError::Parse(format!("Parse task failed: {}", e)))?;

    if !alive.load(Ordering::Acquire) {
        return Err(LoadError::Cancelled);
    }
    parsed
}

async fn read_chunked(
    path: &Path,
    chunk_size: usize,
    tx: &mpsc::UnboundedSender<LoadEvent>,
    alive: &AtomicBool,
) -> Result<Vec<u8>, LoadError> {
    let io_err = |e: std::io::Error| LoadError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let total = file.metadata().await.ok().map(|m| m.len());

    let mut data = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; chunk_size];
    loop {
        if !alive.load(Ordering::Acquire) {
            return Err(LoadError::Cancelled);
        }
        let n = file.read(&mut chunk).await.map_err(io_err)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
        let _ = tx.send(LoadEvent::Progress(LoadProgress {
            loaded: data.len() as u64,
            total,
        }));
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_glb::GlbBuilder;
    use glam::Vec3;
    use std::sync::atomic::AtomicUsize;

    static FIXTURE_ID: AtomicUsize = AtomicUsize::new(0);

    fn write_fixture(bytes: &[u8]) -> PathBuf {
        let id = FIXTURE_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "vrm-viewer-loader-{}-{}.vrm",
            std::process::id(),
            id
        ));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    async fn drain(handle: &mut LoadHandle) -> (Vec<LoadProgress>, Option<LoadEvent>) {
        let mut progress = Vec::new();
        while let Some(event) = handle.next_event().await {
            match event {
                LoadEvent::Progress(p) => progress.push(p),
                terminal => return (progress, Some(terminal)),
            }
        }
        (progress, None)
    }

    #[tokio::test]
    async fn test_load_reports_progress_then_model() {
        let bytes = GlbBuilder::new()
            .cube(Vec3::new(-0.5, 0.0, -0.5), Vec3::new(0.5, 2.0, 0.5))
            .build();
        let path = write_fixture(&bytes);

        let loader = ModelLoader::new(RecenterMode::Origin).with_chunk_size(64);
        let mut handle = loader.spawn(&Handle::current(), &path);
        let (progress, terminal) = drain(&mut handle).await;

        assert!(progress.len() > 1);
        assert!(progress.windows(2).all(|w| w[0].loaded < w[1].loaded));
        let last = progress.last().unwrap();
        assert_eq!(last.loaded, bytes.len() as u64);
        assert_eq!(last.ratio(), Some(1.0));

        match terminal {
            Some(LoadEvent::Loaded(loaded)) => {
                assert_eq!(loaded.model.vertex_count(), 8);
                assert!((loaded.normalized.scale_factor - 0.5).abs() < 1e-6);
                assert_eq!(loaded.bounds.size(), Vec3::new(1.0, 2.0, 1.0));
            }
            _ => panic!("expected Loaded"),
        }
        assert!(handle.is_finished());
        assert!(handle.next_event().await.is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let loader = ModelLoader::new(RecenterMode::Origin);
        let mut handle = loader.spawn(&Handle::current(), "does/not/exist.vrm");
        let (progress, terminal) = drain(&mut handle).await;
        assert!(progress.is_empty());
        assert!(matches!(
            terminal,
            Some(LoadEvent::Failed(LoadError::Io { .. }))
        ));
    }

    #[tokio::test]
    async fn test_degenerate_model_fails() {
        let bytes = GlbBuilder::new()
            .collapsed_triangle(Vec3::new(1.0, 1.0, 1.0))
            .build();
        let path = write_fixture(&bytes);

        let mut handle = ModelLoader::new(RecenterMode::Origin).spawn(&Handle::current(), &path);
        let (_, terminal) = drain(&mut handle).await;
        assert!(matches!(
            terminal,
            Some(LoadEvent::Failed(LoadError::Degenerate(_)))
        ));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_not_a_glb_fails() {
        let path = write_fixture(b"solid cube\nendsolid cube\n");
        let mut handle = ModelLoader::new(RecenterMode::Origin).spawn(&Handle::current(), &path);
        let (_, terminal) = drain(&mut handle).await;
        assert!(matches!(
            terminal,
            Some(LoadEvent::Failed(LoadError::UnsupportedFormat(_)))
        ));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_cyclic_hierarchy_fails() {
        let bytes = GlbBuilder::new()
            .cube(Vec3::ZERO, Vec3::ONE)
            .with_child(0)
            .build();
        let path = write_fixture(&bytes);

        let mut handle = ModelLoader::new(RecenterMode::Origin).spawn(&Handle::current(), &path);
        let (_, terminal) = drain(&mut handle).await;
        assert!(matches!(
            terminal,
            Some(LoadEvent::Failed(LoadError::Parse(_)))
        ));
        assert!(handle.is_finished());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_cancelled_handle_yields_nothing() {
        let bytes = GlbBuilder::new().cube(Vec3::ZERO, Vec3::ONE).build();
        let path = write_fixture(&bytes);

        let mut handle = ModelLoader::new(RecenterMode::Origin).spawn(&Handle::current(), &path);
        handle.cancel();
        assert!(!handle.is_alive());
        assert!(handle.try_next().is_none());
        assert!(handle.next_event().await.is_none());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_progress_ratio_unknown_total() {
        let p = LoadProgress {
            loaded: 10,
            total: None,
        };
        assert_eq!(p.ratio(), None);
    }
}
