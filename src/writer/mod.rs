//! Streaming XML writer.
//!
//! The configuration surface the serialization engine recognizes on a sink:
//! declaration emission, encoding/BOM policy, indentation, character validity
//! checking, and conformance level. The writer streams through a [`TextSink`]
//! (bytes or characters) and escapes content per the XML 1.0 rules.

use std::io;

use thiserror::Error;

/// An error raised while writing markup.
#[derive(Debug, Error)]
pub enum WriteError {
    /// A character in the payload is not representable in XML 1.0 at all,
    /// even as a character reference. Raised only when character checking is
    /// enabled; propagated unchanged through every sink adapter.
    #[error("character U+{codepoint:04X} is not a valid XML character")]
    InvalidChar {
        /// The offending Unicode code point.
        codepoint: u32,
    },
    /// An element or attribute name violates the XML name production.
    #[error("invalid XML name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },
    /// The document shape violates the configured conformance level.
    #[error("conformance violation: {0}")]
    Conformance(String),
    /// An attribute was written after the start tag was closed.
    #[error("attribute written outside an open start tag")]
    AttributeOutsideTag,
    /// `end_element` was called with no element open.
    #[error("end_element with no open element")]
    NoOpenElement,
    /// The underlying sink failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Document conformance level enforced by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conformance {
    /// No shape constraints; fragments are permitted.
    None,
    /// Exactly one root element and no content after it.
    Document,
}

/// Options controlling writer output.
///
/// Builder-style; defaults match a strict document writer: declaration on,
/// UTF-8 without a byte-order mark, no indentation, character checking on,
/// document conformance.
///
/// # Examples
///
/// ```
/// use xmlsink::writer::{Conformance, WriterOptions};
///
/// let opts = WriterOptions::default()
///     .indent(true)
///     .conformance(Conformance::None);
/// assert!(opts.indent);
/// ```
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// If true, no XML declaration is emitted.
    pub omit_declaration: bool,
    /// If true, a UTF-8 byte-order mark is written before any content.
    pub bom: bool,
    /// Whether to produce indented (pretty-printed) output.
    pub indent: bool,
    /// The indentation string used per level when `indent` is true.
    pub indent_str: String,
    /// If true, characters outside the XML 1.0 `Char` production are
    /// rejected with [`WriteError::InvalidChar`]. If false, they are written
    /// as hex character references (and the resulting document will not
    /// verify as well-formed).
    pub check_characters: bool,
    /// The conformance level enforced on document shape.
    pub conformance: Conformance,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            omit_declaration: false,
            bom: false,
            indent: false,
            indent_str: "  ".to_string(),
            check_characters: true,
            conformance: Conformance::Document,
        }
    }
}

impl WriterOptions {
    /// Enables or disables the XML declaration.
    #[must_use]
    pub fn omit_declaration(mut self, yes: bool) -> Self {
        self.omit_declaration = yes;
        self
    }

    /// Enables or disables the UTF-8 byte-order mark.
    #[must_use]
    pub fn bom(mut self, yes: bool) -> Self {
        self.bom = yes;
        self
    }

    /// Enables or disables indented output.
    #[must_use]
    pub fn indent(mut self, yes: bool) -> Self {
        self.indent = yes;
        self
    }

    /// Sets the indentation string used per nesting level.
    #[must_use]
    pub fn indent_str(mut self, s: &str) -> Self {
        self.indent_str = s.to_string();
        self
    }

    /// Enables or disables character validity checking.
    #[must_use]
    pub fn check_characters(mut self, yes: bool) -> Self {
        self.check_characters = yes;
        self
    }

    /// Sets the conformance level.
    #[must_use]
    pub fn conformance(mut self, level: Conformance) -> Self {
        self.conformance = level;
        self
    }
}

/// A destination for writer text.
///
/// Abstracts byte streams from character buffers so the writer can report
/// the destination's encoding in the XML declaration.
pub trait TextSink {
    /// Writes a chunk of already-escaped markup text.
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    /// The IANA encoding label the destination reports, used verbatim in the
    /// XML declaration's `encoding=` attribute.
    fn encoding_label(&self) -> &'static str;

    /// Writes a byte-order mark appropriate for the destination.
    fn write_bom(&mut self) -> io::Result<()> {
        self.write_str("\u{FEFF}")
    }

    /// Flushes any buffered output to the destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A byte-stream destination: text is encoded to UTF-8 bytes.
#[derive(Debug)]
pub struct ByteSink<W: io::Write> {
    inner: W,
}

impl<W: io::Write> ByteSink<W> {
    /// Wraps a byte writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> TextSink for ByteSink<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_all(s.as_bytes())
    }

    fn encoding_label(&self) -> &'static str {
        "UTF-8"
    }

    fn write_bom(&mut self) -> io::Result<()> {
        self.inner.write_all(&[0xEF, 0xBB, 0xBF])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A character-buffer destination whose reported encoding is forced to
/// UTF-8, overriding the platform-default report a plain string buffer
/// would give. The captured text is re-encoded to bytes by the caller.
#[derive(Debug, Default)]
pub struct CharBuffer {
    buf: String,
}

impl CharBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the buffer, returning the captured text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.buf
    }
}

impl TextSink for CharBuffer {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.buf.push_str(s);
        Ok(())
    }

    fn encoding_label(&self) -> &'static str {
        // Forced override: the buffer holds characters, not bytes, but the
        // declaration must still report the encoding the captured text will
        // be re-encoded with.
        "UTF-8"
    }
}

/// The serialization target seam.
///
/// Both the streaming [`XmlWriter`] and the in-memory tree builder implement
/// this, so the engine serializes into either without knowing whether the
/// destination is textual.
pub trait XmlWrite {
    /// Opens an element. Attributes may be written until the first child
    /// content arrives.
    fn start_element(&mut self, name: &str) -> Result<(), WriteError>;

    /// Writes an attribute on the currently open start tag.
    fn attribute(&mut self, name: &str, value: &str) -> Result<(), WriteError>;

    /// Writes character data inside the current element.
    fn text(&mut self, content: &str) -> Result<(), WriteError>;

    /// Closes the most recently opened element.
    fn end_element(&mut self) -> Result<(), WriteError>;

    /// Completes the document: verifies shape and flushes buffered output.
    fn finish(&mut self) -> Result<(), WriteError>;
}

/// Per-element state tracked for indentation decisions.
#[derive(Debug, Default)]
struct ElementFrame {
    name: String,
    has_element: bool,
    has_text: bool,
}

/// A streaming XML writer over a [`TextSink`].
#[derive(Debug)]
pub struct XmlWriter<S: TextSink> {
    sink: S,
    options: WriterOptions,
    stack: Vec<ElementFrame>,
    /// True while a start tag is open for attributes (no `>` written yet).
    tag_open: bool,
    /// True once the BOM/declaration preamble has been emitted.
    started: bool,
    roots_written: u32,
}

impl<S: TextSink> XmlWriter<S> {
    /// Creates a writer over the given sink.
    pub fn new(sink: S, options: WriterOptions) -> Self {
        Self {
            sink,
            options,
            stack: Vec::new(),
            tag_open: false,
            started: false,
            roots_written: 0,
        }
    }

    /// Consumes the writer, returning its sink.
    ///
    /// Call [`finish`](XmlWrite::finish) first; dropping an unfinished
    /// writer loses nothing but leaves the document incomplete.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Emits the BOM and XML declaration once, before the first content.
    fn ensure_started(&mut self) -> Result<(), WriteError> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        if self.options.bom {
            self.sink.write_bom()?;
        }
        if !self.options.omit_declaration {
            let label = self.sink.encoding_label();
            self.sink.write_str("<?xml version=\"1.0\" encoding=\"")?;
            self.sink.write_str(label)?;
            self.sink.write_str("\"?>\n")?;
        }
        Ok(())
    }

    /// Closes a pending start tag with `>`, if one is open.
    fn close_pending_tag(&mut self) -> Result<(), WriteError> {
        if self.tag_open {
            self.sink.write_str(">")?;
            self.tag_open = false;
        }
        Ok(())
    }

    fn write_indent(&mut self, depth: usize) -> Result<(), WriteError> {
        self.sink.write_str("\n")?;
        for _ in 0..depth {
            self.sink.write_str(&self.options.indent_str)?;
        }
        Ok(())
    }
}

impl<S: TextSink> XmlWrite for XmlWriter<S> {
    fn start_element(&mut self, name: &str) -> Result<(), WriteError> {
        validate_name(name)?;
        self.ensure_started()?;
        self.close_pending_tag()?;

        if self.stack.is_empty() {
            if self.options.conformance == Conformance::Document && self.roots_written > 0 {
                return Err(WriteError::Conformance(
                    "document conformance permits a single root element".to_string(),
                ));
            }
            self.roots_written += 1;
        } else if self.options.indent {
            let parent = &self.stack[self.stack.len() - 1];
            if !parent.has_text {
                let depth = self.stack.len();
                self.write_indent(depth)?;
            }
        }

        if let Some(parent) = self.stack.last_mut() {
            parent.has_element = true;
        }

        self.sink.write_str("<")?;
        self.sink.write_str(name)?;
        self.stack.push(ElementFrame {
            name: name.to_string(),
            ..ElementFrame::default()
        });
        self.tag_open = true;
        Ok(())
    }

    fn attribute(&mut self, name: &str, value: &str) -> Result<(), WriteError> {
        if !self.tag_open {
            return Err(WriteError::AttributeOutsideTag);
        }
        validate_name(name)?;
        let escaped = escape_attr(value, self.options.check_characters)?;
        self.sink.write_str(" ")?;
        self.sink.write_str(name)?;
        self.sink.write_str("=\"")?;
        self.sink.write_str(&escaped)?;
        self.sink.write_str("\"")?;
        Ok(())
    }

    fn text(&mut self, content: &str) -> Result<(), WriteError> {
        let escaped = escape_text(content, self.options.check_characters)?;
        self.ensure_started()?;
        if self.stack.is_empty() && self.options.conformance == Conformance::Document {
            return Err(WriteError::Conformance(
                "text is not permitted outside the root element".to_string(),
            ));
        }
        self.close_pending_tag()?;
        if let Some(frame) = self.stack.last_mut() {
            frame.has_text = true;
        }
        self.sink.write_str(&escaped)?;
        Ok(())
    }

    fn end_element(&mut self) -> Result<(), WriteError> {
        let frame = self.stack.pop().ok_or(WriteError::NoOpenElement)?;
        if self.tag_open {
            self.sink.write_str("/>")?;
            self.tag_open = false;
            return Ok(());
        }
        if self.options.indent && frame.has_element && !frame.has_text {
            self.write_indent(self.stack.len())?;
        }
        self.sink.write_str("</")?;
        self.sink.write_str(&frame.name)?;
        self.sink.write_str(">")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteError> {
        if self.tag_open || !self.stack.is_empty() {
            return Err(WriteError::Conformance(format!(
                "{} element(s) left open",
                self.stack.len()
            )));
        }
        if self.options.conformance == Conformance::Document && self.roots_written == 0 {
            return Err(WriteError::Conformance(
                "document conformance requires a root element".to_string(),
            ));
        }
        self.sink.flush()?;
        Ok(())
    }
}

/// Returns `true` if the character is permitted by the XML 1.0 `Char`
/// production (§2.2): #x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD]
/// | [#x10000-#x10FFFF].
#[must_use]
pub fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

pub(crate) fn is_name_start_char(c: char) -> bool {
    c.is_ascii_alphabetic()
        || c == '_'
        || c == ':'
        || matches!(c,
            '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
            | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}'
            | '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}'
            | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
            | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}'
            | '\u{10000}'..='\u{EFFFF}')
}

pub(crate) fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || c.is_ascii_digit()
        || c == '-'
        || c == '.'
        || c == '\u{B7}'
        || matches!(c, '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

pub(crate) fn validate_name(name: &str) -> Result<(), WriteError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(WriteError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Writes a hexadecimal character reference for a code point.
fn push_hex_char_ref(out: &mut String, ch: char) {
    use std::fmt::Write;
    let _ = write!(out, "&#x{:X};", ch as u32);
}

fn reject_or_hex(out: &mut String, ch: char, check: bool) -> Result<(), WriteError> {
    if check {
        Err(WriteError::InvalidChar {
            codepoint: ch as u32,
        })
    } else {
        push_hex_char_ref(out, ch);
        Ok(())
    }
}

/// Escapes character data for element content.
///
/// `<`, `>`, `&` become named entity references, `\r` becomes `&#13;`,
/// `\t` and `\n` pass through, and non-ASCII characters pass through as raw
/// UTF-8 (the destination encoding is always UTF-8 here). Characters outside
/// the XML `Char` production are rejected when `check` is true, otherwise
/// hex-encoded.
pub fn escape_text(text: &str, check: bool) -> Result<String, WriteError> {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' => out.push(ch),
            c if !is_xml_char(c) => reject_or_hex(&mut out, c, check)?,
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Escapes an attribute value.
///
/// Same as [`escape_text`] plus `"` → `&quot;` and whitespace-normalization
/// guards: `\t` → `&#9;`, `\n` → `&#10;`, `\r` → `&#13;`.
pub fn escape_attr(value: &str, check: bool) -> Result<String, WriteError> {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if !is_xml_char(c) => reject_or_hex(&mut out, c, check)?,
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_simple(options: WriterOptions) -> Result<String, WriteError> {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), options);
        w.start_element("root")?;
        w.attribute("id", "main")?;
        w.start_element("child")?;
        w.text("Hello")?;
        w.end_element()?;
        w.end_element()?;
        w.finish()?;
        drop(w);
        Ok(String::from_utf8(buf).unwrap())
    }

    #[test]
    fn test_basic_document() {
        let xml = write_simple(WriterOptions::default()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <root id=\"main\"><child>Hello</child></root>"
        );
    }

    #[test]
    fn test_indented_document() {
        let xml = write_simple(WriterOptions::default().indent(true)).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <root id=\"main\">\n  <child>Hello</child>\n</root>"
        );
    }

    #[test]
    fn test_omit_declaration() {
        let xml = write_simple(WriterOptions::default().omit_declaration(true)).unwrap();
        assert!(xml.starts_with("<root"));
    }

    #[test]
    fn test_bom_prefix() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default().bom(true));
        w.start_element("r").unwrap();
        w.end_element().unwrap();
        w.finish().unwrap();
        drop(w);
        assert_eq!(&buf[..3], &[0xEF, 0xBB, 0xBF]);
    }

    #[test]
    fn test_empty_element_self_closes() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        w.start_element("empty").unwrap();
        w.end_element().unwrap();
        w.finish().unwrap();
        drop(w);
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.ends_with("<empty/>"));
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(
            escape_text("a < b & c > d", true).unwrap(),
            "a &lt; b &amp; c &gt; d"
        );
        // Quotes are not escaped in element content.
        assert_eq!(escape_text("say \"hi\"", true).unwrap(), "say \"hi\"");
        // Non-ASCII passes through as raw UTF-8.
        assert_eq!(escape_text("caf\u{E9}", true).unwrap(), "caf\u{E9}");
    }

    #[test]
    fn test_attr_escaping() {
        assert_eq!(
            escape_attr("He said \"hello\" & <bye>", true).unwrap(),
            "He said &quot;hello&quot; &amp; &lt;bye&gt;"
        );
        assert_eq!(escape_attr("a\tb\nc\rd", true).unwrap(), "a&#9;b&#10;c&#13;d");
    }

    #[test]
    fn test_invalid_char_rejected_when_checking() {
        let err = escape_text("bad \u{8} char", true).unwrap_err();
        match err {
            WriteError::InvalidChar { codepoint } => assert_eq!(codepoint, 0x8),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_char_hex_encoded_when_not_checking() {
        assert_eq!(escape_text("a\u{8}b", false).unwrap(), "a&#x8;b");
    }

    #[test]
    fn test_document_conformance_single_root() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        w.start_element("a").unwrap();
        w.end_element().unwrap();
        let err = w.start_element("b").unwrap_err();
        assert!(matches!(err, WriteError::Conformance(_)));
    }

    #[test]
    fn test_fragment_conformance_allows_second_root() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(
            ByteSink::new(&mut buf),
            WriterOptions::default().conformance(Conformance::None),
        );
        w.start_element("a").unwrap();
        w.end_element().unwrap();
        w.start_element("b").unwrap();
        w.end_element().unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn test_finish_rejects_open_element() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        w.start_element("a").unwrap();
        assert!(matches!(w.finish(), Err(WriteError::Conformance(_))));
    }

    #[test]
    fn test_attribute_outside_tag() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        w.start_element("a").unwrap();
        w.text("x").unwrap();
        assert!(matches!(
            w.attribute("k", "v"),
            Err(WriteError::AttributeOutsideTag)
        ));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        assert!(matches!(
            w.start_element("1bad"),
            Err(WriteError::InvalidName { .. })
        ));
        assert!(matches!(
            w.start_element(""),
            Err(WriteError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_char_buffer_reports_utf8() {
        let buf = CharBuffer::new();
        assert_eq!(buf.encoding_label(), "UTF-8");
    }

    #[test]
    fn test_mixed_content_not_indented() {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(
            ByteSink::new(&mut buf),
            WriterOptions::default().indent(true),
        );
        w.start_element("p").unwrap();
        w.text("Hello ").unwrap();
        w.start_element("b").unwrap();
        w.text("world").unwrap();
        w.end_element().unwrap();
        w.end_element().unwrap();
        w.finish().unwrap();
        drop(w);
        let xml = String::from_utf8(buf).unwrap();
        assert!(xml.contains("<p>Hello <b>world</b></p>"));
    }

    #[test]
    fn test_is_xml_char_boundaries() {
        assert!(is_xml_char('\t'));
        assert!(is_xml_char('\u{20}'));
        assert!(is_xml_char('\u{D7FF}'));
        assert!(is_xml_char('\u{E000}'));
        assert!(is_xml_char('\u{10FFFF}'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{B}'));
        assert!(!is_xml_char('\u{1F}'));
        assert!(!is_xml_char('\u{FFFE}'));
    }
}
