//! Run orchestration.
//!
//! A run walks a fixed sequence of stages: set the requested engine mode
//! through a scoped guard, produce output through the chosen sink, verify
//! it, then restore the prior mode. Restoration happens on every exit path
//! — the guard's `Drop` covers early returns and unwinds, and the explicit
//! restore on the normal path surfaces restore failures instead of
//! swallowing them.
//!
//! [`run_matrix`] exercises every mode × sink combination strictly
//! sequentially; the engine's mode state makes concurrent runs against one
//! engine meaningless.

use thiserror::Error;
use tracing::{debug, trace};

use crate::engine::{Engine, EngineError, Mode, ModeGuard};
use crate::fixture::Fixture;
use crate::sink::{produce, SinkDescriptor, SinkKind};
use crate::verify::verify;
use crate::writer::WriteError;

/// Errors terminating a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The requested mode is unavailable; nothing was produced.
    #[error("cannot exercise {mode} mode: {source}")]
    ModeUnsupported {
        /// The mode the run requested.
        mode: Mode,
        /// The engine's refusal.
        source: EngineError,
    },
    /// The engine or sink failed while producing output.
    #[error("production failed on {sink} sink: {source}")]
    Produce {
        /// The sink in use when production failed.
        sink: SinkKind,
        /// The underlying writer error.
        source: WriteError,
    },
    /// Output was produced but the verifier rejected it.
    #[error("{mode} mode produced malformed output on {sink} sink: {detail}")]
    MalformedOutput {
        /// The mode that produced the output.
        mode: Mode,
        /// The sink that captured it.
        sink: SinkKind,
        /// The verifier's rejection detail.
        detail: String,
    },
    /// The prior engine mode could not be restored. Fatal: a stale mode
    /// would corrupt every subsequent run against this engine.
    #[error("failed to restore prior engine mode: {source}")]
    ModeRestore {
        /// The engine's restore failure.
        source: EngineError,
    },
}

/// The captured result of one successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The mode the output was produced under.
    pub mode: Mode,
    /// The sink that captured the output.
    pub sink: SinkKind,
    /// The raw verified output bytes.
    pub output: Vec<u8>,
}

/// Executes one run: mode set, produce, verify, restore.
///
/// A restore failure takes precedence over a production failure from the
/// same run, since it poisons the engine for everything that follows.
///
/// # Errors
///
/// Any [`RunError`] variant, per stage.
pub fn run(
    engine: &Engine,
    mode: Mode,
    descriptor: &SinkDescriptor,
    fixture: &Fixture,
) -> Result<RunReport, RunError> {
    debug!(%mode, sink = %descriptor.kind, "run starting");

    let guard = ModeGuard::acquire(engine, mode)
        .map_err(|source| RunError::ModeUnsupported { mode, source })?;

    let output = match produce(engine, fixture, descriptor) {
        Ok(output) => output,
        Err(source) => {
            // Restore before surfacing the produce failure; a failed
            // restore outranks it.
            if let Err(source) = guard.restore() {
                return Err(RunError::ModeRestore { source });
            }
            return Err(RunError::Produce {
                sink: descriptor.kind,
                source,
            });
        }
    };
    debug!(%mode, sink = %descriptor.kind, bytes = output.len(), "output produced");

    let verification = verify(&output);
    trace!(
        %mode,
        sink = %descriptor.kind,
        well_formed = verification.well_formed,
        "verification complete"
    );

    if let Err(source) = guard.restore() {
        return Err(RunError::ModeRestore { source });
    }

    if !verification.well_formed {
        return Err(RunError::MalformedOutput {
            mode,
            sink: descriptor.kind,
            detail: verification
                .error
                .unwrap_or_else(|| "unspecified verification failure".to_string()),
        });
    }

    debug!(%mode, sink = %descriptor.kind, "output verified, mode restored");
    Ok(RunReport {
        mode,
        sink: descriptor.kind,
        output,
    })
}

/// Runs the full mode × sink matrix against one fixture, strictly
/// sequentially, with a fresh standard sink descriptor per cell.
///
/// # Errors
///
/// The first failing cell's [`RunError`]; later cells are not attempted.
pub fn run_matrix(engine: &Engine, fixture: &Fixture) -> Result<Vec<RunReport>, RunError> {
    let mut reports = Vec::with_capacity(Mode::ALL.len() * SinkKind::ALL.len());
    for mode in Mode::ALL {
        for kind in SinkKind::ALL {
            let descriptor = SinkDescriptor::standard(kind);
            reports.push(run(engine, mode, &descriptor, fixture)?);
        }
    }
    Ok(reports)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::writer::WriterOptions;

    #[test]
    fn test_run_round_trips_a_single_cell() {
        let engine = Engine::new();
        let report = run(
            &engine,
            Mode::Interpreted,
            &SinkDescriptor::standard(SinkKind::ByteStream),
            &Fixture::adversarial(),
        )
        .unwrap();
        assert_eq!(report.mode, Mode::Interpreted);
        assert_eq!(report.sink, SinkKind::ByteStream);
        assert!(!report.output.is_empty());
        // Mode restored after the run.
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_run_matrix_covers_every_cell() {
        let engine = Engine::new();
        let reports = run_matrix(&engine, &Fixture::adversarial()).unwrap();
        assert_eq!(reports.len(), Mode::ALL.len() * SinkKind::ALL.len());
        for mode in Mode::ALL {
            for sink in SinkKind::ALL {
                assert!(
                    reports.iter().any(|r| r.mode == mode && r.sink == sink),
                    "missing cell {mode}/{sink}"
                );
            }
        }
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_unsupported_mode_fails_without_producing() {
        let engine = Engine::compiled_only();
        let err = run(
            &engine,
            Mode::Interpreted,
            &SinkDescriptor::standard(SinkKind::ByteStream),
            &Fixture::adversarial(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunError::ModeUnsupported {
                mode: Mode::Interpreted,
                ..
            }
        ));
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_produce_failure_still_restores_mode() {
        let engine = Engine::new();
        let err = run(
            &engine,
            Mode::Interpreted,
            &SinkDescriptor::standard(SinkKind::ByteStream),
            &Fixture::with_value("bad \u{0} char"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RunError::Produce {
                sink: SinkKind::ByteStream,
                ..
            }
        ));
        assert_eq!(engine.mode(), Mode::Compiled);
    }

    #[test]
    fn test_unchecked_writer_output_is_rejected_by_verifier() {
        // With character checking off the writer emits a character
        // reference to a control character, which the verifier refuses.
        let engine = Engine::new();
        let descriptor = SinkDescriptor::standard(SinkKind::ByteStream)
            .with_options(WriterOptions::default().check_characters(false));
        let err = run(
            &engine,
            Mode::Compiled,
            &descriptor,
            &Fixture::with_value("bad \u{8} char"),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::MalformedOutput { .. }));
        assert_eq!(engine.mode(), Mode::Compiled);
    }
}
