//! Log output setup.
//!
//! Formatted log lines pass through the [`PhiRedactor`] before they reach the
//! underlying writer, so identifiers that slip into a message or a field are
//! masked the same way as audit details.

use std::{io, sync::Arc};

use medai_guard_audit::PhiRedactor;
use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter, prelude::*};

use crate::error::{GatewayError, Result};

/// Filter used when `RUST_LOG` is unset and no directive is given.
pub const DEFAULT_FILTER: &str = "info";

/// [`MakeWriter`] that redacts each formatted line.
#[derive(Debug, Clone)]
pub struct RedactingMakeWriter<M> {
    inner: M,
    redactor: Arc<PhiRedactor>,
}

impl<M> RedactingMakeWriter<M> {
    /// Wraps `inner` with the default redactor.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner, redactor: Arc::new(PhiRedactor::new()) }
    }

    /// Wraps `inner` with a specific redactor.
    #[must_use]
    pub fn with_redactor(inner: M, redactor: PhiRedactor) -> Self {
        Self { inner, redactor: Arc::new(redactor) }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            redactor: Arc::clone(&self.redactor),
            buf: Vec::new(),
        }
    }
}

/// Buffers one event and writes it redacted on flush or drop.
#[derive(Debug)]
pub struct RedactingWriter<W: io::Write> {
    inner: W,
    redactor: Arc<PhiRedactor>,
    buf: Vec<u8>,
}

impl<W: io::Write> RedactingWriter<W> {
    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buf);
        let redacted = self.redactor.redact(&text);
        self.buf.clear();
        self.inner.write_all(redacted.as_bytes())
    }
}

impl<W: io::Write> io::Write for RedactingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit()?;
        self.inner.flush()
    }
}

impl<W: io::Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.emit() {
            eprintln!("failed to write log line: {e}");
        }
    }
}

/// Installs the global subscriber: an [`EnvFilter`] (`RUST_LOG` wins over
/// `filter`) and a fmt layer writing redacted lines to stderr.
///
/// # Errors
///
/// Returns [`GatewayError::ConfigurationError`] if `filter` does not parse or
/// a global subscriber is already installed.
pub fn init(filter: Option<&str>) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter.unwrap_or(DEFAULT_FILTER))
            .map_err(|e| GatewayError::config(format!("log filter: {e}")))?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(RedactingMakeWriter::new(io::stderr)))
        .try_init()
        .map_err(|e| GatewayError::config(format!("tracing subscriber: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        io::Write,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn formatted_lines_are_redacted() {
        let buf = SharedBuf::default();
        let sink = buf.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(RedactingMakeWriter::new(move || sink.clone())),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(client_ip = "10.20.30.40", "password reset requested by jane@clinic.org");
        });

        let out = buf.contents();
        assert!(out.contains("[REDACTED_EMAIL]"), "{out}");
        assert!(out.contains("[REDACTED_IPV4]"), "{out}");
        assert!(!out.contains("jane@clinic.org"));
        assert!(!out.contains("10.20.30.40"));
        assert!(out.contains("password reset requested"));
    }

    #[test]
    fn writer_flushes_once_per_event() {
        let buf = SharedBuf::default();
        let make = RedactingMakeWriter::new({
            let buf = buf.clone();
            move || buf.clone()
        });
        {
            let mut w = make.make_writer();
            w.write_all(b"ssn 123-").unwrap();
            w.write_all(b"45-6789\n").unwrap();
            assert!(buf.contents().is_empty());
        }
        assert_eq!(buf.contents(), "ssn [REDACTED_SSN]\n");
    }
}
