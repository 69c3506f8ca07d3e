//! Audit trail
//!
//! Every pipeline run leaves a sequence of [`AuditEvent`]s in a sink. Audit
//! recording is best-effort: a sink failure never fails the request it
//! describes. Events that could not be persisted are diverted to a
//! process-local fallback buffer and logged, so the trail degrades rather
//! than disappears.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::AsyncWriteExt;

use crate::error::{ComplianceError, Result};
use crate::types::{AuditDetailLevel, AuditEvent, PipelineStage};

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one event
    async fn record(&self, event: &AuditEvent) -> Result<()>;

    /// All persisted events for one audit trail, in recording order
    async fn events(&self, audit_id: &str) -> Result<Vec<AuditEvent>>;
}

/// In-memory audit sink with a bounded capacity
///
/// When full, the oldest events are dropped first; an audit trail is a
/// diagnostic aid, not an unbounded log.
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
    capacity: usize,
}

const DEFAULT_CAPACITY: usize = 10_000;

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Total number of stored events across all trails
    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Snapshot of all stored events across all trails
    pub fn all_events(&self) -> Vec<AuditEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let mut events = self
            .events
            .write()
            .map_err(|_| ComplianceError::Audit("audit store lock poisoned".into()))?;
        if events.len() >= self.capacity {
            let overflow = events.len() + 1 - self.capacity;
            events.drain(..overflow);
        }
        events.push(event.clone());
        Ok(())
    }

    async fn events(&self, audit_id: &str) -> Result<Vec<AuditEvent>> {
        let events = self
            .events
            .read()
            .map_err(|_| ComplianceError::Audit("audit store lock poisoned".into()))?;
        Ok(events
            .iter()
            .filter(|e| e.audit_id == audit_id)
            .cloned()
            .collect())
    }
}

/// File-backed audit sink writing one JSON object per line
///
/// Appends are serialized through a mutex so concurrent runs never
/// interleave partial lines.
pub struct FileAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                ComplianceError::Audit(format!(
                    "failed to open {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(&line).await.map_err(|e| {
            ComplianceError::Audit(format!("failed to append {}: {}", self.path.display(), e))
        })?;
        file.flush().await.map_err(|e| {
            ComplianceError::Audit(format!("failed to flush {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    async fn events(&self, audit_id: &str) -> Result<Vec<AuditEvent>> {
        let _guard = self.write_lock.lock().await;
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ComplianceError::Audit(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let mut events = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let event: AuditEvent = serde_json::from_str(line)?;
            if event.audit_id == audit_id {
                events.push(event);
            }
        }
        Ok(events)
    }
}

/// Detail-level-aware front for an audit sink
///
/// The pipeline records through this wrapper only. Recording never returns
/// an error: failures are logged and the event is kept in a process-local
/// fallback buffer instead.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    level: AuditDetailLevel,
    fallback: Arc<Mutex<Vec<AuditEvent>>>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>, level: AuditDetailLevel) -> Self {
        Self {
            sink,
            level,
            fallback: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn detail_level(&self) -> AuditDetailLevel {
        self.level
    }

    /// Record one event, subject to the detail level
    ///
    /// At `Minimal`, only terminal stages are kept.
    pub async fn record(&self, event: AuditEvent) {
        if self.level == AuditDetailLevel::Minimal && !event.stage.is_terminal() {
            return;
        }

        if let Err(e) = self.sink.record(&event).await {
            tracing::warn!(
                audit_id = %event.audit_id,
                stage = ?event.stage,
                error = %e,
                "Audit sink failed, diverting event to fallback buffer"
            );
            if let Ok(mut fallback) = self.fallback.lock() {
                fallback.push(event);
            }
        }
    }

    /// Events of one trail, from the sink plus any diverted to the fallback
    pub async fn events(&self, audit_id: &str) -> Result<Vec<AuditEvent>> {
        let mut events = self.sink.events(audit_id).await?;
        if let Ok(fallback) = self.fallback.lock() {
            events.extend(fallback.iter().filter(|e| e.audit_id == audit_id).cloned());
        }
        Ok(events)
    }

    /// Number of events sitting in the fallback buffer
    pub fn fallback_len(&self) -> usize {
        self.fallback.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Guard that records a `Cancelled` terminal event if the request is
    /// dropped before reaching its own terminal stage
    pub fn cancel_guard(
        &self,
        audit_id: impl Into<String>,
        request_hash: impl Into<String>,
    ) -> CancelGuard {
        CancelGuard {
            fallback: Arc::clone(&self.fallback),
            audit_id: audit_id.into(),
            request_hash: request_hash.into(),
            armed: true,
        }
    }
}

/// Drop guard covering one pipeline run
///
/// `Drop` cannot await, so the cancellation event goes straight to the
/// fallback buffer shared with the [`AuditLog`] that created the guard.
pub struct CancelGuard {
    fallback: Arc<Mutex<Vec<AuditEvent>>>,
    audit_id: String,
    request_hash: String,
    armed: bool,
}

impl CancelGuard {
    /// Defuse the guard once the run reached a terminal stage of its own
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(audit_id = %self.audit_id, "Pipeline run cancelled before completion");
        if let Ok(mut fallback) = self.fallback.lock() {
            fallback.push(AuditEvent::new(
                self.audit_id.clone(),
                self.request_hash.clone(),
                PipelineStage::Cancelled,
                "dropped before terminal stage",
                serde_json::Value::Null,
            ));
        }
    }
}
