//! # xmlsink
//!
//! A cross-sink, cross-mode invariance harness for XML serialization.
//!
//! The serialization [`Engine`] turns a [`Fixture`] into markup under one of
//! two generation strategies — a compiled emit program or an interpreted
//! descriptor walk — writing through any of four sink adapters: a byte
//! stream, a character buffer with a forced UTF-8 label, a buffered
//! in-memory stream that is flushed and rewound, or an in-memory document
//! tree. The harness runs every mode × sink combination and verifies each
//! captured output decodes as UTF-8 and parses as a well-formed document,
//! with the adversarial payload exercising quote, ampersand, angle-bracket,
//! and multi-byte escaping along the way.
//!
//! ## Quick Start
//!
//! ```
//! use xmlsink::{run_matrix, Engine, Fixture};
//!
//! let engine = Engine::new();
//! let reports = run_matrix(&engine, &Fixture::adversarial()).unwrap();
//! assert_eq!(reports.len(), 8);
//! ```

pub mod engine;
pub mod error;
pub mod fixture;
pub mod harness;
pub mod sink;
pub mod tree;
pub mod verify;
pub mod writer;

// Re-export primary types at the crate root for convenience.
pub use engine::{Engine, EngineError, Mode, ModeGuard};
pub use error::{ParseError, SourceLocation};
pub use fixture::{Fixture, ADVERSARIAL_VALUE};
pub use harness::{run, run_matrix, RunError, RunReport};
pub use sink::{produce, SinkDescriptor, SinkKind};
pub use verify::{parse_document, verify, Verification};
pub use writer::{Conformance, WriteError, WriterOptions};
