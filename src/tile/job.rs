//! Tile jobs.
//!
//! A [`TileJob`] is the viewer's handle on one tile request: the dispatch key,
//! the finish callback, and the in-flight work the fetcher attaches to it
//! (a cancellation token and the pending decode task).
//!
//! Completion and abort go through the same lock, so a completion that races
//! an abort is either delivered before the abort or suppressed entirely.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::DynamicImage;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Terminal result of a tile job.
#[derive(Debug)]
pub enum TileOutcome {
    /// Decoded, displayable tile
    Loaded(DynamicImage),
    /// No image; a descriptive message
    Failed(String),
}

impl TileOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TileOutcome::Loaded(_))
    }

    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            TileOutcome::Loaded(image) => Some(image),
            TileOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TileOutcome::Loaded(_) => None,
            TileOutcome::Failed(message) => Some(message),
        }
    }
}

/// Callback receiving a job's outcome; invoked at most once.
pub type FinishCallback = Box<dyn FnOnce(TileOutcome) + Send>;

#[derive(Default)]
struct JobState {
    finish: Option<FinishCallback>,
    cancel: Option<CancellationToken>,
    pending_decode: Option<AbortHandle>,
    aborted: bool,
}

/// One viewer tile request.
pub struct TileJob {
    src: String,
    state: Mutex<JobState>,
}

impl TileJob {
    /// Create a job for dispatch key `src`.
    pub fn new(src: impl Into<String>, finish: FinishCallback) -> Arc<Self> {
        Arc::new(Self {
            src: src.into(),
            state: Mutex::new(JobState {
                finish: Some(finish),
                ..JobState::default()
            }),
        })
    }

    /// Create a job whose outcome is delivered on a oneshot channel.
    ///
    /// The receiver resolves with an error if the job is dropped without
    /// completing, which is what an aborted job looks like.
    pub fn with_channel(src: impl Into<String>) -> (Arc<Self>, oneshot::Receiver<TileOutcome>) {
        let (tx, rx) = oneshot::channel();
        let job = Self::new(
            src,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        (job, rx)
    }

    /// Dispatch key of this job.
    pub fn src(&self) -> &str {
        &self.src
    }

    fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the finish callback has been consumed.
    pub fn is_finished(&self) -> bool {
        self.lock().finish.is_none()
    }

    /// Whether the job's fetch was aborted before it completed.
    pub fn is_cancelled(&self) -> bool {
        self.lock().aborted
    }

    /// Attach a fresh cancellation token for a new fetch and return it.
    pub(crate) fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut state = self.lock();
        state.cancel = Some(token.clone());
        state.pending_decode = None;
        state.aborted = false;
        token
    }

    /// Record the decode task so abort can stop it.
    pub(crate) fn set_pending_decode(&self, handle: AbortHandle) {
        let mut state = self.lock();
        if state.aborted {
            handle.abort();
        } else {
            state.pending_decode = Some(handle);
        }
    }

    /// Deliver `outcome` unless the job already finished or was cancelled.
    ///
    /// Returns whether the callback ran.
    pub fn finish(&self, outcome: TileOutcome) -> bool {
        let callback = {
            let mut state = self.lock();
            state.pending_decode = None;
            if state.aborted {
                return false;
            }
            state.cancel = None;
            state.finish.take()
        };

        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }

    /// Cancel in-flight work. Safe to call repeatedly and after completion.
    ///
    /// The cancellation token, the pending decode task and the finish
    /// callback are all released, so an aborted job can never complete.
    pub fn abort(&self) {
        let mut state = self.lock();
        let Some(token) = state.cancel.take() else {
            return;
        };
        token.cancel();
        if let Some(handle) = state.pending_decode.take() {
            handle.abort();
        }
        state.finish = None;
        state.aborted = true;
    }
}

impl fmt::Debug for TileJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileJob")
            .field("src", &self.src)
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
