//! # Diplomaker - Batch Diploma Generation
//!
//! Merges each row of a spreadsheet into a fixed-layout template and renders
//! one PDF per row.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use diplomaker::{
//!     batch::{Orchestrator, Session},
//!     delivery::DirectorySink,
//!     fonts::FontRegistry,
//!     render::PdfRenderer,
//!     template::Template,
//! };
//!
//! let mut session = Session::new(Template::diploma(), FontRegistry::builtin());
//! session.load_records(Path::new("students.xlsx"))?;
//! session.constants.set("diploma", "Bachelor of Arts");
//!
//! let mut orchestrator = Orchestrator::new(session, Arc::new(PdfRenderer::default()));
//! let mut sink = DirectorySink::new("diplomas");
//! let summary = orchestrator.generate_all(&mut sink, &mut ())?;
//! println!("{} of {} generated", summary.generated, summary.total);
//!
//! # Ok::<(), diplomaker::DiplomaError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`records`] | Spreadsheet rows as flat records |
//! | [`template`] | Field descriptors and the template store |
//! | [`binder`] | Per-record input maps |
//! | [`fonts`] | Font registry and font sets |
//! | [`render`] | Renderer seam and the PDF renderer |
//! | [`delivery`] | Artifact sinks |
//! | [`batch`] | Session and batch orchestration |
//! | [`error`] | Error types |

mod assets;
pub mod batch;
pub mod binder;
pub mod delivery;
pub mod error;
pub mod fonts;
pub mod records;
pub mod render;
pub mod template;

pub use batch::{BatchSummary, Orchestrator, Session};
pub use error::{DiplomaError, RenderError, RowFailure};
pub use template::{FieldDescriptor, Template};
