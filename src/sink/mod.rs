//! Sink adapters.
//!
//! Four independent strategies for presenting a destination to the
//! serialization engine. All four, fed the same fixture in the same mode,
//! must produce output the verifier accepts as well-formed:
//!
//! - **byte-stream** — markup written straight to a byte vector through the
//!   streaming writer (UTF-8, no BOM, indented, document conformance);
//! - **character-stream** — markup written to a character buffer whose
//!   reported encoding is forced to UTF-8, then re-encoded to bytes;
//! - **buffered-stream** — a buffered writer over an in-memory cursor,
//!   flushed and rewound before the bytes are read back;
//! - **document-tree** — an in-memory tree built directly from engine
//!   output, captured through the tree's own text rendering.
//!
//! Engine-level validity errors propagate unchanged; the adapters never
//! suppress them.

use std::fmt;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom};

use crate::engine::Engine;
use crate::fixture::Fixture;
use crate::tree::TreeBuilder;
use crate::writer::{ByteSink, CharBuffer, Conformance, WriteError, WriterOptions, XmlWrite, XmlWriter};

/// The four sink strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Streaming writer over a byte vector.
    ByteStream,
    /// Streaming writer over a character buffer with a forced UTF-8 label.
    CharStream,
    /// Streaming writer over a buffered in-memory cursor, flush + rewind.
    BufferedStream,
    /// In-memory document builder, bypassing textual encoding.
    DocumentTree,
}

impl SinkKind {
    /// All sink kinds, in matrix order.
    pub const ALL: [SinkKind; 4] = [
        SinkKind::ByteStream,
        SinkKind::CharStream,
        SinkKind::BufferedStream,
        SinkKind::DocumentTree,
    ];
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByteStream => write!(f, "byte-stream"),
            Self::CharStream => write!(f, "character-stream"),
            Self::BufferedStream => write!(f, "buffered-stream"),
            Self::DocumentTree => write!(f, "document-tree"),
        }
    }
}

/// Identifies one sink kind plus its writer configuration.
///
/// Constructed fresh per run; never shared between runs.
#[derive(Debug, Clone)]
pub struct SinkDescriptor {
    /// Which adapter to use.
    pub kind: SinkKind,
    /// Writer configuration handed to the engine's target.
    pub options: WriterOptions,
}

impl SinkDescriptor {
    /// The standard configuration for each sink kind:
    ///
    /// - byte-stream: declaration on, UTF-8 no BOM, indented, character
    ///   checking on, document conformance;
    /// - character-stream: same minus the conformance level;
    /// - buffered-stream: unindented strict document writer;
    /// - document-tree: textual options unused, character checking on.
    #[must_use]
    pub fn standard(kind: SinkKind) -> Self {
        let options = match kind {
            SinkKind::ByteStream => WriterOptions::default().indent(true),
            SinkKind::CharStream => WriterOptions::default()
                .indent(true)
                .conformance(Conformance::None),
            SinkKind::BufferedStream | SinkKind::DocumentTree => WriterOptions::default(),
        };
        Self { kind, options }
    }

    /// Replaces the writer configuration.
    #[must_use]
    pub fn with_options(mut self, options: WriterOptions) -> Self {
        self.options = options;
        self
    }
}

/// Runs the engine against the described sink and captures the raw output
/// bytes.
///
/// # Errors
///
/// Propagates engine/writer errors unchanged — character validity errors,
/// conformance violations, and I/O failures from the buffered path.
pub fn produce(
    engine: &Engine,
    fixture: &Fixture,
    descriptor: &SinkDescriptor,
) -> Result<Vec<u8>, WriteError> {
    match descriptor.kind {
        SinkKind::ByteStream => byte_stream(engine, fixture, &descriptor.options),
        SinkKind::CharStream => char_stream(engine, fixture, &descriptor.options),
        SinkKind::BufferedStream => buffered_stream(engine, fixture, &descriptor.options),
        SinkKind::DocumentTree => document_tree(engine, fixture, &descriptor.options),
    }
}

fn byte_stream(
    engine: &Engine,
    fixture: &Fixture,
    options: &WriterOptions,
) -> Result<Vec<u8>, WriteError> {
    let mut buf = Vec::new();
    let mut writer = XmlWriter::new(ByteSink::new(&mut buf), options.clone());
    engine.serialize(&mut writer, fixture)?;
    writer.finish()?;
    drop(writer);
    Ok(buf)
}

fn char_stream(
    engine: &Engine,
    fixture: &Fixture,
    options: &WriterOptions,
) -> Result<Vec<u8>, WriteError> {
    let mut writer = XmlWriter::new(CharBuffer::new(), options.clone());
    engine.serialize(&mut writer, fixture)?;
    writer.finish()?;
    let text = writer.into_sink().into_string();
    // Re-encode the captured characters with the encoding the buffer
    // reported in the declaration.
    let (bytes, _, _) = encoding_rs::UTF_8.encode(&text);
    Ok(bytes.into_owned())
}

fn buffered_stream(
    engine: &Engine,
    fixture: &Fixture,
    options: &WriterOptions,
) -> Result<Vec<u8>, WriteError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = XmlWriter::new(
            ByteSink::new(BufWriter::new(&mut cursor)),
            options.clone(),
        );
        engine.serialize(&mut writer, fixture)?;
        // finish() flushes the BufWriter before it is dropped.
        writer.finish()?;
    }
    cursor.seek(SeekFrom::Start(0))?;
    let mut out = Vec::new();
    cursor.read_to_end(&mut out)?;
    Ok(out)
}

fn document_tree(
    engine: &Engine,
    fixture: &Fixture,
    options: &WriterOptions,
) -> Result<Vec<u8>, WriteError> {
    let mut builder = TreeBuilder::new(options.clone());
    engine.serialize(&mut builder, fixture)?;
    builder.finish()?;
    Ok(builder.into_document().render().into_bytes())
}
