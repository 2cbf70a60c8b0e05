//! Output verification.
//!
//! Decodes captured sink output as UTF-8 (tolerating a byte-order mark),
//! applies percent-decoding — upstream stages may have percent-encoded the
//! payload, and the well-formedness check must operate on the final, fully
//! decoded representation — and parses the result as an XML document.
//!
//! The parser is a hand-rolled recursive descent well-formedness checker:
//! declaration, DOCTYPE, comments, processing instructions, CDATA, nested
//! elements with attributes, entity and character references. It never
//! attempts recovery; the first error is terminal for the run. Comments and
//! processing instructions are validated syntactically and then discarded —
//! the returned tree holds only elements and text, which is all round-trip
//! extraction needs.

use crate::error::{ParseError, SourceLocation};
use crate::tree::{Attribute, NodeId, NodeKind, TreeDocument};
use crate::writer::{is_name_char, is_name_start_char, is_xml_char};

/// The outcome of verifying one captured output.
///
/// Produced once per run, consumed immediately by the caller's assertion.
#[derive(Debug, Clone)]
pub struct Verification {
    /// True if the output decoded and parsed as a well-formed document.
    pub well_formed: bool,
    /// The failure description when `well_formed` is false.
    pub error: Option<String>,
}

/// Verifies raw sink output: UTF-8 decode, percent-decode, parse.
///
/// Any decode or parse failure yields `well_formed == false` with the
/// originating detail; no partial recovery is attempted.
#[must_use]
pub fn verify(raw: &[u8]) -> Verification {
    let text = match decode_utf8(raw) {
        Ok(text) => text,
        Err(message) => {
            return Verification {
                well_formed: false,
                error: Some(message),
            }
        }
    };
    let decoded = percent_decode(&text);
    match parse_document(&decoded) {
        Ok(_) => Verification {
            well_formed: true,
            error: None,
        },
        Err(err) => Verification {
            well_formed: false,
            error: Some(err.to_string()),
        },
    }
}

/// Decodes raw bytes as strict UTF-8, skipping a leading UTF-8 byte-order
/// mark if present.
fn decode_utf8(raw: &[u8]) -> Result<String, String> {
    let content = raw.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(raw);
    match std::str::from_utf8(content) {
        Ok(s) => Ok(s.to_string()),
        Err(err) => Err(format!("output is not valid UTF-8: {err}")),
    }
}

/// Applies URL percent-decoding to the text.
///
/// `%XX` sequences are decoded bytewise and `+` becomes a space; malformed
/// sequences (a `%` not followed by two hex digits) pass through unchanged.
/// Decoding happens at the byte level, so multi-byte UTF-8 sequences split
/// across several `%XX` escapes reassemble correctly.
#[must_use]
pub fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hi = hex_value(bytes[i + 1]);
                let lo = hex_value(bytes[i + 2]);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    out.push(hi << 4 | lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    match String::from_utf8(out) {
        Ok(s) => s,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Parses text as an XML document, returning the tree on success.
///
/// # Errors
///
/// Returns `ParseError` with the location of the first violation if the
/// input is not a well-formed document.
pub fn parse_document(input: &str) -> Result<TreeDocument, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    doc: TreeDocument,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            doc: TreeDocument::new(),
        }
    }

    // --- low-level input ---

    fn bytes(&self) -> &[u8] {
        self.input.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn looking_at(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.input[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn location_of(&self, byte_offset: usize) -> SourceLocation {
        let upto = &self.input[..byte_offset.min(self.input.len())];
        let line = upto.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
        let line_start = upto.rfind('\n').map_or(0, |i| i + 1);
        let column = upto[line_start..].chars().count() as u32 + 1;
        SourceLocation {
            line,
            column,
            byte_offset,
        }
    }

    fn fatal(&self, message: impl Into<String>) -> ParseError {
        self.fatal_at(self.pos, message)
    }

    fn fatal_at(&self, byte_offset: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.location_of(byte_offset),
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), ParseError> {
        if self.looking_at(s) {
            self.advance(s.len());
            Ok(())
        } else {
            Err(self.fatal(format!("expected {s:?}")))
        }
    }

    // --- document structure ---

    fn parse(&mut self) -> Result<TreeDocument, ParseError> {
        // XML declaration must sit at the very start, with no leading
        // whitespace. "<?xml" followed by a name character is an ordinary
        // (reserved-prefix) PI target, caught later.
        if self.looking_at("<?xml")
            && matches!(
                self.bytes().get(5),
                Some(b' ' | b'\t' | b'\r' | b'\n' | b'?')
            )
        {
            self.parse_declaration()?;
        }

        self.parse_misc()?;
        if self.looking_at("<!DOCTYPE") {
            self.skip_doctype()?;
            self.parse_misc()?;
        }

        if self.peek() == Some(b'<')
            && self
                .bytes()
                .get(self.pos + 1)
                .is_some_and(|&b| b != b'!' && b != b'?')
        {
            let root = self.doc.root();
            self.parse_element(root)?;
        } else {
            return Err(self.fatal("missing root element"));
        }

        self.parse_misc()?;
        if !self.at_end() {
            return Err(self.fatal("content after document element"));
        }

        Ok(std::mem::take(&mut self.doc))
    }

    fn parse_declaration(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.expect("<?xml")?;
        let Some(end) = self.input[self.pos..].find("?>") else {
            return Err(self.fatal_at(start, "unterminated XML declaration"));
        };
        let body = &self.input[self.pos..self.pos + end];
        if !body.contains("version") {
            return Err(self.fatal_at(start, "XML declaration is missing a version"));
        }
        self.advance(end + 2);
        Ok(())
    }

    /// Prolog/epilog content: whitespace, comments, PIs.
    fn parse_misc(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.looking_at("<!--") {
                self.parse_comment()?;
            } else if self.looking_at("<?") {
                self.parse_pi()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.expect("<!DOCTYPE")?;
        // Scan to the matching '>', skipping the internal subset and any
        // quoted identifiers.
        let mut bracket_depth = 0u32;
        loop {
            match self.peek() {
                None => return Err(self.fatal_at(start, "unterminated DOCTYPE declaration")),
                Some(b'[') => {
                    bracket_depth += 1;
                    self.advance(1);
                }
                Some(b']') => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    self.advance(1);
                }
                Some(q @ (b'"' | b'\'')) => {
                    self.advance(1);
                    while self.peek().is_some_and(|b| b != q) {
                        self.advance(1);
                    }
                    if self.at_end() {
                        return Err(self.fatal_at(start, "unterminated DOCTYPE declaration"));
                    }
                    self.advance(1);
                }
                Some(b'>') if bracket_depth == 0 => {
                    self.advance(1);
                    return Ok(());
                }
                Some(_) => self.advance(1),
            }
        }
    }

    fn parse_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.expect("<!--")?;
        loop {
            if self.at_end() {
                return Err(self.fatal_at(start, "unterminated comment"));
            }
            if self.looking_at("-->") {
                self.advance(3);
                return Ok(());
            }
            if self.looking_at("--") {
                return Err(self.fatal("'--' is not permitted inside comments"));
            }
            self.next_char();
        }
    }

    fn parse_pi(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.expect("<?")?;
        let target = self.parse_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.fatal_at(start, "processing instruction target 'xml' is reserved"));
        }
        match self.input[self.pos..].find("?>") {
            Some(end) => {
                self.advance(end + 2);
                Ok(())
            }
            None => Err(self.fatal_at(start, "unterminated processing instruction")),
        }
    }

    // --- elements ---

    fn parse_element(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.expect("<")?;
        let name = self.parse_name()?;
        let attributes = self.parse_attributes(&name)?;

        let node = self.doc.create_node(NodeKind::Element {
            name: name.clone(),
            attributes,
        });
        self.doc.append_child(parent, node);

        if self.looking_at("/>") {
            self.advance(2);
            return Ok(());
        }
        self.expect(">")?;
        self.parse_content(node, &name)
    }

    fn parse_attributes(&mut self, element: &str) -> Result<Vec<Attribute>, ParseError> {
        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            let had_space = matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n'));
            self.skip_whitespace();
            match self.peek() {
                Some(b'>') => return Ok(attributes),
                Some(b'/') if self.looking_at("/>") => return Ok(attributes),
                None => return Err(self.fatal("unexpected end of input in start tag")),
                _ => {}
            }
            if !had_space {
                return Err(self.fatal("expected whitespace before attribute"));
            }
            let name_start = self.pos;
            let name = self.parse_name()?;
            if attributes.iter().any(|a| a.name == name) {
                return Err(self.fatal_at(
                    name_start,
                    format!("duplicate attribute {name:?} on element {element:?}"),
                ));
            }
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.parse_attribute_value()?;
            attributes.push(Attribute { name, value });
        }
    }

    fn parse_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.fatal("attribute value must be quoted")),
        };
        self.advance(1);
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.fatal("unterminated attribute value")),
                Some(q) if q == quote => {
                    self.advance(1);
                    return Ok(value);
                }
                Some(b'<') => {
                    return Err(self.fatal("'<' is not permitted in attribute values"));
                }
                Some(b'&') => value.push(self.parse_reference()?),
                _ => {
                    let at = self.pos;
                    let c = self
                        .next_char()
                        .ok_or_else(|| self.fatal("unterminated attribute value"))?;
                    if !is_xml_char(c) {
                        return Err(self.fatal_at(at, "invalid character in attribute value"));
                    }
                    value.push(c);
                }
            }
        }
    }

    fn parse_content(&mut self, node: NodeId, name: &str) -> Result<(), ParseError> {
        loop {
            if self.at_end() {
                return Err(self.fatal(format!("unexpected end of input inside element {name:?}")));
            }
            if self.looking_at("</") {
                self.advance(2);
                let end_start = self.pos;
                let end_name = self.parse_name()?;
                if end_name != name {
                    return Err(self.fatal_at(
                        end_start,
                        format!("end tag {end_name:?} does not match start tag {name:?}"),
                    ));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(());
            }
            if self.looking_at("<!--") {
                self.parse_comment()?;
            } else if self.looking_at("<![CDATA[") {
                self.parse_cdata(node)?;
            } else if self.looking_at("<?") {
                self.parse_pi()?;
            } else if self.looking_at("<!") {
                return Err(self.fatal("unexpected markup declaration in content"));
            } else if self.peek() == Some(b'<') {
                self.parse_element(node)?;
            } else {
                self.parse_text(node)?;
            }
        }
    }

    fn parse_cdata(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let start = self.pos;
        self.expect("<![CDATA[")?;
        let Some(end) = self.input[self.pos..].find("]]>") else {
            return Err(self.fatal_at(start, "unterminated CDATA section"));
        };
        let content = &self.input[self.pos..self.pos + end];
        if let Some(offset) = content.char_indices().find(|&(_, c)| !is_xml_char(c)) {
            return Err(self.fatal_at(self.pos + offset.0, "invalid character in CDATA section"));
        }
        let text = self.doc.create_node(NodeKind::Text {
            content: content.to_string(),
        });
        self.doc.append_child(parent, text);
        self.advance(end + 3);
        Ok(())
    }

    fn parse_text(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let mut content = String::new();
        loop {
            match self.peek() {
                None | Some(b'<') => break,
                Some(b'&') => content.push(self.parse_reference()?),
                _ => {
                    let rest = &self.input[self.pos..];
                    let end = rest.find(['&', '<']).unwrap_or(rest.len());
                    let chunk = &rest[..end];
                    if let Some(idx) = chunk.find("]]>") {
                        return Err(self
                            .fatal_at(self.pos + idx, "']]>' is not permitted in character data"));
                    }
                    if let Some((idx, _)) = chunk.char_indices().find(|&(_, c)| !is_xml_char(c)) {
                        return Err(
                            self.fatal_at(self.pos + idx, "invalid character in character data")
                        );
                    }
                    content.push_str(chunk);
                    self.advance(end);
                }
            }
        }
        let text = self.doc.create_node(NodeKind::Text { content });
        self.doc.append_child(parent, text);
        Ok(())
    }

    // --- names and references ---

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.input[self.pos..].chars().next() {
            Some(c) if is_name_start_char(c) => self.advance(c.len_utf8()),
            _ => return Err(self.fatal("expected a name")),
        }
        while let Some(c) = self.input[self.pos..].chars().next() {
            if is_name_char(c) {
                self.advance(c.len_utf8());
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    /// Decodes an entity or character reference to its character.
    fn parse_reference(&mut self) -> Result<char, ParseError> {
        let start = self.pos;
        self.expect("&")?;
        if self.peek() == Some(b'#') {
            self.advance(1);
            let radix = if self.peek() == Some(b'x') {
                self.advance(1);
                16
            } else {
                10
            };
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|b| (b as char).is_digit(radix))
            {
                self.advance(1);
            }
            if self.pos == digits_start || self.peek() != Some(b';') {
                return Err(self.fatal_at(start, "malformed character reference"));
            }
            let digits = &self.input[digits_start..self.pos];
            self.advance(1); // consume ';'
            let code_point = u32::from_str_radix(digits, radix)
                .map_err(|_| self.fatal_at(start, "character reference out of range"))?;
            match char::from_u32(code_point).filter(|&c| is_xml_char(c)) {
                Some(c) => Ok(c),
                None => Err(self.fatal_at(
                    start,
                    format!("character reference to invalid character U+{code_point:04X}"),
                )),
            }
        } else {
            let name = self.parse_name()?;
            if self.peek() != Some(b';') {
                return Err(self.fatal_at(start, "malformed entity reference"));
            }
            self.advance(1);
            match name.as_str() {
                "amp" => Ok('&'),
                "lt" => Ok('<'),
                "gt" => Ok('>'),
                "apos" => Ok('\''),
                "quot" => Ok('"'),
                _ => Err(self.fatal_at(start, format!("reference to undeclared entity {name:?}"))),
            }
        }
    }
}
