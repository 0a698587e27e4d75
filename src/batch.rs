//! # Batch Orchestrator
//!
//! Drives every record through binding, rendering and delivery, strictly one
//! row after another and in input order.
//!
//! ```text
//! Idle ──generate_all (records > 0)──▶ Running
//!   Running, per row: Binding ─▶ Rendering ─▶ Delivering
//!   after the last row ─▶ Idle (progress = 100)
//! ```
//!
//! A row that fails to render or deliver is reported and skipped; the batch
//! keeps going. Progress counts every processed row, failed or not, against
//! the total. Font loading happens before the first row and a failure there
//! aborts the whole batch.
//!
//! The [`Session`] owns the template, constant fields, records and the cached
//! font set. Each row renders against the template snapshot current when the
//! row starts; since `generate_all` holds the orchestrator mutably for the
//! whole run, the schema cannot change mid-batch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::binder::{ConstantFields, FieldBinder, InputMap};
use crate::delivery::{suggested_file_name, Artifact, ArtifactSink};
use crate::error::{DiplomaError, RenderError, RowFailure, RowStage};
use crate::fonts::{FontRegistry, FontSet};
use crate::records::{Record, RecordSource};
use crate::render::DocumentRenderer;
use crate::template::{FieldDescriptor, FieldEdit, Template, TemplateStore};

// ============================================================================
// Session
// ============================================================================

/// Everything the operator sets up between batches
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub template: TemplateStore,
    pub constants: ConstantFields,
    pub binder: FieldBinder,
    records: RecordSource,
    registry: FontRegistry,
    fonts: Option<Arc<FontSet>>,
}

impl Session {
    pub fn new(template: Template, registry: FontRegistry) -> Self {
        Self {
            template: TemplateStore::new(template),
            constants: ConstantFields::new(),
            binder: FieldBinder::for_today(),
            records: RecordSource::default(),
            registry,
            fonts: None,
        }
    }

    pub fn with_binder(mut self, binder: FieldBinder) -> Self {
        self.binder = binder;
        self
    }

    /// Replaces the records with the first sheet of the given spreadsheet.
    /// On failure the session is left with no records.
    pub fn load_records(&mut self, path: &std::path::Path) -> Result<usize, DiplomaError> {
        match RecordSource::from_path(path) {
            Ok(source) => {
                let count = source.len();
                self.records = source;
                Ok(count)
            }
            Err(e) => {
                self.records = RecordSource::default();
                Err(e)
            }
        }
    }

    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = RecordSource {
            file_name: None,
            records,
        };
    }

    pub fn records(&self) -> &[Record] {
        &self.records.records
    }

    pub fn file_name(&self) -> Option<&str> {
        self.records.file_name.as_deref()
    }

    pub fn add_field(&mut self, descriptor: FieldDescriptor) -> Result<(), DiplomaError> {
        self.template.add_field(descriptor)
    }

    /// Adds the edited field and, when it has content, registers that content
    /// as a constant. Returns `false` when the edit has no name and was ignored.
    pub fn apply_field_edit(&mut self, edit: &FieldEdit) -> Result<bool, DiplomaError> {
        if edit.name.is_empty() {
            warn!("Ignoring field edit without a name");
            return Ok(false);
        }

        self.template.add_field(edit.descriptor())?;
        if let Some(content) = &edit.content {
            self.constants.set(edit.name.clone(), content.clone());
        }
        Ok(true)
    }

    /// Swaps the font configuration and drops any cached font set.
    pub fn set_font_registry(&mut self, registry: FontRegistry) {
        self.registry = registry;
        self.fonts = None;
    }

    /// Font set for rendering, loaded on first use and cached afterwards.
    pub fn fonts(&mut self) -> Result<Arc<FontSet>, DiplomaError> {
        if let Some(fonts) = &self.fonts {
            return Ok(Arc::clone(fonts));
        }

        let fonts = Arc::new(self.registry.load()?);
        self.fonts = Some(Arc::clone(&fonts));
        Ok(fonts)
    }
}

// ============================================================================
// Batch State
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Binding,
    Rendering,
    Delivering,
}

/// Progress of the current (or last) batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchState {
    pub phase: Phase,
    /// 0-based index of the row being processed
    pub index: usize,
    pub total: usize,
    pub generated: usize,
    pub failed: usize,
    /// 0..=100
    pub progress: u8,
}

impl BatchState {
    fn start(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn processed(&self) -> usize {
        self.generated + self.failed
    }
}

/// `round(completed / total * 100)`
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Delivered { row: usize, file_name: String },
    Failed(RowFailure),
}

/// Result of one `generate_all` run
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    /// Date bound as `todayDate` for every row of this batch
    pub date: NaiveDate,
    pub total: usize,
    pub generated: usize,
    /// One entry per record, in input order
    pub outcomes: Vec<RowOutcome>,
    pub progress: u8,
}

impl BatchSummary {
    pub fn failures(&self) -> impl Iterator<Item = &RowFailure> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            RowOutcome::Failed(failure) => Some(failure),
            RowOutcome::Delivered { .. } => None,
        })
    }

    pub fn failed(&self) -> usize {
        self.total - self.generated
    }

    pub fn is_success(&self) -> bool {
        self.generated == self.total
    }
}

/// Receives batch events as they happen
pub trait BatchObserver {
    fn on_progress(&mut self, _state: &BatchState) {}
    fn on_artifact(&mut self, _artifact: &Artifact) {}
    fn on_row_failed(&mut self, _failure: &RowFailure) {}
}

impl BatchObserver for () {}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    session: Session,
    renderer: Arc<dyn DocumentRenderer>,
    render_timeout: Option<Duration>,
    state: BatchState,
}

impl Orchestrator {
    pub fn new(session: Session, renderer: Arc<dyn DocumentRenderer>) -> Self {
        Self {
            session,
            renderer,
            render_timeout: None,
            state: BatchState::default(),
        }
    }

    /// Bounds each render call; `None` waits indefinitely.
    pub fn with_render_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Renders and delivers one document per record.
    pub fn generate_all(
        &mut self,
        sink: &mut dyn ArtifactSink,
        observer: &mut dyn BatchObserver,
    ) -> Result<BatchSummary, DiplomaError> {
        let total = self.session.records().len();
        if total == 0 {
            warn!("Generate all requested without records");
            return Err(DiplomaError::EmptyBatch);
        }

        let fonts = self.session.fonts()?;
        let batch_id = generate_short_id();
        let today = self.session.binder.today();
        info!("Batch {}: generating {} documents dated {}", batch_id, total, today);

        self.state = BatchState::start(total);
        observer.on_progress(&self.state);

        let mut outcomes = Vec::with_capacity(total);
        for index in 0..total {
            let row = index + 1;
            self.state.index = index;

            self.state.phase = Phase::Binding;
            let template = self.session.template.snapshot();
            let record = &self.session.records()[index];
            let inputs = self
                .session
                .binder
                .bind(&template, record, &self.session.constants, today);
            let file_name = suggested_file_name(&inputs);
            debug!("Batch {}: row {} bound {} fields", batch_id, row, inputs.len());

            self.state.phase = Phase::Rendering;
            let rendered = render_row(
                &self.renderer,
                template,
                inputs,
                Arc::clone(&fonts),
                self.render_timeout,
            )
            .map_err(|error| RowFailure {
                row,
                stage: RowStage::Rendering,
                error,
            });

            let outcome = rendered.and_then(|bytes| {
                self.state.phase = Phase::Delivering;
                let artifact = Artifact {
                    row,
                    file_name,
                    bytes,
                };
                sink.deliver(&artifact).map_err(|error| RowFailure {
                    row,
                    stage: RowStage::Delivering,
                    error,
                })?;
                Ok(artifact)
            });

            match outcome {
                Ok(artifact) => {
                    self.state.generated += 1;
                    observer.on_artifact(&artifact);
                    outcomes.push(RowOutcome::Delivered {
                        row,
                        file_name: artifact.file_name,
                    });
                }
                Err(failure) => {
                    error!("Batch {}: {}", batch_id, failure);
                    self.state.failed += 1;
                    observer.on_row_failed(&failure);
                    outcomes.push(RowOutcome::Failed(failure));
                }
            }

            self.state.progress = progress_percent(row, total);
            observer.on_progress(&self.state);
        }

        self.state.phase = Phase::Idle;
        info!(
            "Batch {}: {} generated, {} failed",
            batch_id, self.state.generated, self.state.failed
        );

        Ok(BatchSummary {
            batch_id,
            date: today,
            total,
            generated: self.state.generated,
            outcomes,
            progress: self.state.progress,
        })
    }
}

/// Runs the renderer, on a worker thread when a timeout is set. A timed-out
/// render is abandoned; its thread finishes on its own. A panicking renderer
/// fails only its own row.
fn render_row(
    renderer: &Arc<dyn DocumentRenderer>,
    template: Arc<Template>,
    inputs: InputMap,
    fonts: Arc<FontSet>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, RenderError> {
    let Some(timeout) = timeout else {
        return panic::catch_unwind(AssertUnwindSafe(|| renderer.render(&template, &inputs, &fonts)))
            .unwrap_or_else(|_| Err(RenderError::Render("renderer panicked".to_string())));
    };

    let (tx, rx) = mpsc::channel();
    let renderer = Arc::clone(renderer);
    thread::Builder::new()
        .name("diploma-render".to_string())
        .spawn(move || {
            // The receiver is gone if the row already timed out
            let _ = tx.send(renderer.render(&template, &inputs, &fonts));
        })
        .map_err(|e| RenderError::Render(format!("failed to start renderer: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(RenderError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(RenderError::Render("renderer panicked".to_string())),
    }
}

fn generate_short_id() -> String {
    let uuid = Uuid::new_v4();
    let hex = format!("{:x}", uuid);
    hex[..8].to_uppercase()
}
