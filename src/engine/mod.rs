//! The serialization engine collaborator.
//!
//! The engine maps a fixture to markup through an [`XmlWrite`] target using
//! one of two generation strategies: a *compiled* emit program built once at
//! engine construction, or an *interpreted* reflective walk over the type
//! descriptor performed on every call. Both strategies must produce an
//! identical call sequence; the harness exists to verify that they do,
//! across every sink.
//!
//! The generation mode is instance state threaded explicitly — there is no
//! process-wide toggle and nothing reflective to poke. A build without the
//! interpreted facility is modeled by [`Engine::compiled_only`]; requesting
//! the missing mode fails loudly instead of silently skipping.

use std::cell::Cell;
use std::fmt;

use thiserror::Error;

use crate::fixture::{Fixture, TypeDescriptor};
use crate::writer::{WriteError, XmlWrite};

/// The engine's internal generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pre-built emit program, executed per call.
    Compiled,
    /// Reflective descriptor walk, performed per call.
    Interpreted,
}

impl Mode {
    /// All generation modes, in matrix order.
    pub const ALL: [Mode; 2] = [Mode::Compiled, Mode::Interpreted];
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compiled => write!(f, "compiled"),
            Self::Interpreted => write!(f, "interpreted"),
        }
    }
}

/// Errors raised by the engine's mode facility.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested generation mode is not available in this engine build.
    /// Fatal to runs requesting that mode only.
    #[error("generation mode `{mode}` is not supported by this engine build")]
    ModeUnsupported {
        /// The unavailable mode.
        mode: Mode,
    },
}

/// One step of the compiled emit program.
#[derive(Debug, Clone)]
enum EmitOp {
    Start(&'static str),
    Attr(&'static str, &'static str),
    FieldText(usize),
    End,
}

/// Builds the emit program for a type descriptor.
///
/// Runs once, at engine construction — the compiled strategy's analogue of
/// emitting specialized serialization code for the shape.
fn compile_program(desc: &'static TypeDescriptor) -> Vec<EmitOp> {
    let mut ops = Vec::with_capacity(2 + desc.namespaces.len() + desc.fields.len() * 3);
    ops.push(EmitOp::Start(desc.type_name));
    for &(name, uri) in desc.namespaces {
        ops.push(EmitOp::Attr(name, uri));
    }
    for (index, field) in desc.fields.iter().enumerate() {
        ops.push(EmitOp::Start(field.element_name));
        ops.push(EmitOp::FieldText(index));
        ops.push(EmitOp::End);
    }
    ops.push(EmitOp::End);
    ops
}

/// The serialization engine.
///
/// Owns its current generation mode as instance state; the harness switches
/// it through [`ModeGuard`] so it is restored on every exit path.
#[derive(Debug)]
pub struct Engine {
    descriptor: &'static TypeDescriptor,
    program: Vec<EmitOp>,
    mode: Cell<Mode>,
    interpreted_available: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates an engine with both strategies available, defaulting to
    /// [`Mode::Compiled`].
    #[must_use]
    pub fn new() -> Self {
        let descriptor = Fixture::descriptor();
        Self {
            descriptor,
            program: compile_program(descriptor),
            mode: Cell::new(Mode::Compiled),
            interpreted_available: true,
        }
    }

    /// Creates an engine build that lacks the interpreted facility.
    ///
    /// Requesting [`Mode::Interpreted`] on such an engine yields
    /// [`EngineError::ModeUnsupported`].
    #[must_use]
    pub fn compiled_only() -> Self {
        Self {
            interpreted_available: false,
            ..Self::new()
        }
    }

    /// The currently selected generation mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Selects the generation mode for subsequent `serialize` calls.
    ///
    /// # Errors
    ///
    /// [`EngineError::ModeUnsupported`] if the mode is unavailable in this
    /// build; the current mode is left unchanged.
    pub fn set_mode(&self, mode: Mode) -> Result<(), EngineError> {
        if mode == Mode::Interpreted && !self.interpreted_available {
            return Err(EngineError::ModeUnsupported { mode });
        }
        self.mode.set(mode);
        Ok(())
    }

    /// Serializes the fixture into the target using the current mode.
    ///
    /// # Errors
    ///
    /// Propagates writer errors unchanged — in particular character
    /// validity errors raised under `check_characters`.
    pub fn serialize(&self, out: &mut dyn XmlWrite, fixture: &Fixture) -> Result<(), WriteError> {
        match self.mode.get() {
            Mode::Compiled => self.run_program(out, fixture),
            Mode::Interpreted => self.walk_descriptor(out, fixture),
        }
    }

    fn run_program(&self, out: &mut dyn XmlWrite, fixture: &Fixture) -> Result<(), WriteError> {
        for op in &self.program {
            match *op {
                EmitOp::Start(name) => out.start_element(name)?,
                EmitOp::Attr(name, value) => out.attribute(name, value)?,
                EmitOp::FieldText(index) => {
                    out.text((self.descriptor.fields[index].get)(fixture))?;
                }
                EmitOp::End => out.end_element()?,
            }
        }
        Ok(())
    }

    fn walk_descriptor(&self, out: &mut dyn XmlWrite, fixture: &Fixture) -> Result<(), WriteError> {
        out.start_element(self.descriptor.type_name)?;
        for &(name, uri) in self.descriptor.namespaces {
            out.attribute(name, uri)?;
        }
        for field in self.descriptor.fields {
            out.start_element(field.element_name)?;
            out.text((field.get)(fixture))?;
            out.end_element()?;
        }
        out.end_element()?;
        Ok(())
    }
}

/// Scoped mode acquisition.
///
/// Records the mode observed at acquisition, applies the requested one, and
/// restores the original on every exit path: explicitly through
/// [`restore`](ModeGuard::restore) on the normal path, or via `Drop` when
/// the run body unwinds or returns early.
#[derive(Debug)]
pub struct ModeGuard<'e> {
    engine: &'e Engine,
    prev: Mode,
    restored: bool,
}

impl<'e> ModeGuard<'e> {
    /// Applies `mode` to the engine, remembering the previous mode.
    ///
    /// # Errors
    ///
    /// [`EngineError::ModeUnsupported`] if the mode is unavailable; the
    /// engine is left untouched.
    pub fn acquire(engine: &'e Engine, mode: Mode) -> Result<Self, EngineError> {
        let prev = engine.mode();
        engine.set_mode(mode)?;
        Ok(Self {
            engine,
            prev,
            restored: false,
        })
    }

    /// Restores the mode observed at acquisition.
    ///
    /// # Errors
    ///
    /// Propagates the engine's restore failure; the caller must treat this
    /// as fatal since a stale mode corrupts subsequent runs.
    pub fn restore(mut self) -> Result<(), EngineError> {
        self.restored = true;
        self.engine.set_mode(self.prev)
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        if !self.restored {
            // Best-effort restore on unwind/early-return paths. The prior
            // mode was supported when observed, so this cannot fail through
            // the safe API.
            let _ = self.engine.set_mode(self.prev);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::{ByteSink, WriterOptions, XmlWriter};

    fn serialize_to_string(engine: &Engine, fixture: &Fixture) -> String {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        engine.serialize(&mut w, fixture).unwrap();
        w.finish().unwrap();
        drop(w);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_modes_produce_identical_output() {
        let engine = Engine::new();
        let fixture = Fixture::adversarial();

        engine.set_mode(Mode::Compiled).unwrap();
        let compiled = serialize_to_string(&engine, &fixture);

        engine.set_mode(Mode::Interpreted).unwrap();
        let interpreted = serialize_to_string(&engine, &fixture);

        assert_eq!(compiled, interpreted);
    }

    #[test]
    fn test_output_shape() {
        let engine = Engine::new();
        let xml = serialize_to_string(&engine, &Fixture::with_value("hi"));
        assert!(xml.contains("<Fixture "));
        assert!(xml.contains("xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\""));
        assert!(xml.contains("<Value>hi</Value>"));
        assert!(xml.ends_with("</Fixture>"));
    }

    #[test]
    fn test_default_mode_is_compiled() {
        assert_eq!(Engine::new().mode(), Mode::Compiled);
    }

    #[test]
    fn test_compiled_only_rejects_interpreted() {
        let engine = Engine::compiled_only();
        let err = engine.set_mode(Mode::Interpreted).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ModeUnsupported {
                mode: Mode::Interpreted
            }
        ));
        // Current mode untouched by the failed switch.
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_mode_guard_restores_on_explicit_restore() {
        let engine = Engine::new();
        let guard = ModeGuard::acquire(&engine, Mode::Interpreted).unwrap();
        assert_eq!(engine.mode(), Mode::Interpreted);
        guard.restore().unwrap();
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_mode_guard_restores_on_drop() {
        let engine = Engine::new();
        {
            let _guard = ModeGuard::acquire(&engine, Mode::Interpreted).unwrap();
            assert_eq!(engine.mode(), Mode::Interpreted);
        }
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_mode_guard_restores_on_panic() {
        let engine = Engine::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ModeGuard::acquire(&engine, Mode::Interpreted).unwrap();
            panic!("run body failed");
        }));
        assert!(result.is_err());
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_failed_acquire_leaves_mode_untouched() {
        let engine = Engine::compiled_only();
        assert!(ModeGuard::acquire(&engine, Mode::Interpreted).is_err());
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_validity_error_propagates() {
        let engine = Engine::new();
        let fixture = Fixture::with_value("raw \u{8} control");
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(ByteSink::new(&mut buf), WriterOptions::default());
        let err = engine.serialize(&mut w, &fixture).unwrap_err();
        assert!(matches!(err, WriteError::InvalidChar { codepoint: 0x8 }));
    }
}
