// Single-user session state.
//
// Every slot is a `watch` channel: writers replace the whole value and readers take snapshots.
// Nothing is mutated field-by-field from outside the orchestrator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, watch, OwnedMutexGuard};
use tracing::info;

use crate::analysis::cooldown::CooldownTimer;
use crate::analysis::models::{AnalysisConfig, AnalysisResult, Phase};
use crate::document::models::NormalizedDocument;

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    /// Survives a session reset.
    pub remember: bool,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &"<redacted>")
            .field("remember", &self.remember)
            .finish()
    }
}

pub struct Session {
    document: watch::Sender<Option<Arc<NormalizedDocument>>>,
    normalization_ticket: AtomicU64,
    resets: AtomicU64,
    config: watch::Sender<Option<AnalysisConfig>>,
    credential: watch::Sender<Option<Credential>>,
    result: watch::Sender<Option<AnalysisResult>>,
    phase: watch::Sender<Phase>,
    /// Held for the whole life of a submission: at most one in flight.
    submission: Arc<tokio::sync::Mutex<()>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    cooldown: CooldownTimer,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            document: watch::channel(None).0,
            normalization_ticket: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            config: watch::channel(None).0,
            credential: watch::channel(None).0,
            result: watch::channel(None).0,
            phase: watch::channel(Phase::Idle).0,
            submission: Arc::new(tokio::sync::Mutex::new(())),
            cancel: Mutex::new(None),
            cooldown: CooldownTimer::new(),
        }
    }

    // ── document ───────────────────────────────────────────────────────────

    pub fn document(&self) -> Option<Arc<NormalizedDocument>> {
        self.document.borrow().clone()
    }

    /// Reserves a ticket for a normalization that is about to start.
    pub fn begin_normalization(&self) -> u64 {
        self.normalization_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Installs `doc` unless a newer normalization started after `ticket` was issued.
    /// Returns whether the document became active.
    pub fn replace_document_if_latest(&self, ticket: u64, doc: NormalizedDocument) -> bool {
        let doc = Arc::new(doc);
        self.document.send_if_modified(|slot| {
            if self.normalization_ticket.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *slot = Some(doc);
            true
        })
    }

    pub fn clear_document(&self) {
        // invalidates normalizations still running
        self.normalization_ticket.fetch_add(1, Ordering::SeqCst);
        self.document.send_replace(None);
    }

    // ── config ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> Option<AnalysisConfig> {
        self.config.borrow().clone()
    }

    pub fn set_config(&self, config: AnalysisConfig) {
        self.config.send_replace(Some(config));
    }

    // ── credential ─────────────────────────────────────────────────────────

    pub fn credential(&self) -> Option<Credential> {
        self.credential.borrow().clone()
    }

    pub fn set_credential(&self, credential: Credential) {
        self.credential.send_replace(Some(credential));
    }

    pub fn clear_credential(&self) {
        self.credential.send_replace(None);
    }

    // ── result ─────────────────────────────────────────────────────────────

    pub fn result(&self) -> Option<AnalysisResult> {
        self.result.borrow().clone()
    }

    pub(crate) fn set_result(&self, result: Option<AnalysisResult>) {
        self.result.send_replace(result);
    }

    // ── phase ──────────────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase.clone());
        if previous != phase {
            info!("Analysis phase: {previous:?} -> {phase:?}");
        }
    }

    /// Cooldown reached zero.
    pub(crate) fn finish_cooldown(&self) {
        let changed = self.phase.send_if_modified(|p| {
            if *p == Phase::CooldownActive {
                *p = Phase::Idle;
                return true;
            }
            false
        });
        if changed {
            info!("Analysis phase: CooldownActive -> Idle");
        }
    }

    // ── submission control ─────────────────────────────────────────────────

    /// Claims the submission slot, or `None` while another submission is in flight.
    pub(crate) fn try_begin_submission(&self) -> Option<OwnedMutexGuard<()>> {
        self.submission.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.submission.try_lock().is_err()
    }

    pub(crate) fn install_cancel(&self, tx: oneshot::Sender<()>) {
        *self.lock_cancel() = Some(tx);
    }

    pub(crate) fn clear_cancel(&self) {
        self.lock_cancel().take();
    }

    /// Signals the in-flight stream to stop. Returns false when nothing is streaming.
    pub fn cancel_stream(&self) -> bool {
        match self.lock_cancel().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bumped by every `reset`, so a stream can tell it was cancelled by one.
    pub(crate) fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn cooldown(&self) -> &CooldownTimer {
        &self.cooldown
    }

    /// Clears document, config, result and a non-remembered credential, and stops any stream.
    /// A running cooldown is kept.
    pub fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.cancel_stream();
        self.clear_document();
        self.config.send_replace(None);
        self.result.send_replace(None);
        self.credential.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|c| !c.remember) {
                *slot = None;
                return true;
            }
            false
        });
        if matches!(self.phase(), Phase::Failed { .. } | Phase::Completed) {
            self.set_phase(Phase::Idle);
        }
        info!("Session reset");
    }
}
