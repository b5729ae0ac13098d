use crate::de::Reader;
use crate::error::{Error, ErrorHandler, ErrorKind, Op, Result};
use crate::registry::Registry;
use crate::ser::Writer;
use crate::value::JsonValue;
use std::fs;
use std::io;
use std::path::Path;

bitflags::bitflags! {
    /// Syntax relaxations accepted when reading. Output is always strict.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Syntax: u8 {
        /// `// …` and `/* … */` comments behave as whitespace.
        const COMMENTS = 1;
        /// Names and values may be unquoted; bare tokens are right-trimmed.
        const NO_QUOTES = 2;
        /// A newline outside strings separates pairs like a comma.
        const NO_COMMAS = 4;
        /// Quoted strings may span lines; `"""…"""` preserves whitespace
        /// and embedded quotes.
        const NEWLINES = 8;
    }
}

impl Syntax {
    pub const STRICT: Syntax = Syntax::empty();
    pub const RELAXED: Syntax = Syntax::all();
}

impl Default for Syntax {
    fn default() -> Self {
        Syntax::COMMENTS
    }
}

/// Indentation of the emitted JSON: a fill character and how many times it
/// repeats per nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indent {
    pub ch: char,
    pub count: usize,
}

impl Default for Indent {
    fn default() -> Self {
        Indent { ch: ' ', count: 2 }
    }
}

/// Reads and writes object graphs against a populated [`Registry`].
///
/// An engine is long-lived and strictly single-threaded; each top-level
/// `read`/`write` runs on fresh transient state, so identity tables never
/// leak between operations.
///
/// With `sharing` enabled, multiply-referenced objects are written once and
/// referenced by `"@N"` afterwards, which also makes cyclic graphs writable.
/// Without it shared objects are duplicated and writing a cycle does not
/// terminate; avoiding that is the caller's responsibility.
pub struct Engine<'r> {
    registry: &'r Registry,
    sharing: bool,
    syntax: Syntax,
    indent: Indent,
    handler: Option<ErrorHandler>,
    last_error: Option<Error>,
}

impl<'r> Engine<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Engine {
            registry,
            sharing: false,
            syntax: Syntax::default(),
            indent: Indent::default(),
            handler: None,
            last_error: None,
        }
    }

    /// Like [`Engine::new`] but with an error handler that observes every
    /// reported error, fatal and non-fatal.
    pub fn with_handler(registry: &'r Registry, handler: ErrorHandler) -> Self {
        Engine {
            handler: Some(handler),
            ..Engine::new(registry)
        }
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn set_sharing(&mut self, mode: bool) {
        self.sharing = mode;
    }

    pub fn sharing(&self) -> bool {
        self.sharing
    }

    pub fn set_syntax(&mut self, syntax: Syntax) {
        self.syntax = syntax;
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn set_indent(&mut self, ch: char, count: usize) {
        self.indent = Indent { ch, count };
    }

    pub fn indent(&self) -> Indent {
        self.indent
    }

    /// The error of the last failed operation, kept until the next one.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    fn report(&self, error: &Error) {
        match &self.handler {
            Some(handler) => handler(error),
            None => {
                if error.fatal {
                    log::error!("{error}");
                } else {
                    log::warn!("{error}");
                }
            }
        }
    }

    fn registry_check(&mut self) -> Result<()> {
        if let Some(error) = self.registry.error() {
            let error = error.clone();
            self.last_error = Some(error.clone());
            return Err(error);
        }
        Ok(())
    }

    /// Reads one document from `input` into `target`. Returns the first
    /// error even when non-fatal errors allowed reading to continue; the
    /// graph may then be partially populated.
    pub fn read<T: JsonValue>(&mut self, target: &mut T, input: impl io::Read) -> Result<()> {
        self.read_named(target, input, "", 1)
    }

    /// Like [`Engine::read`] with a stream name and a first line number for
    /// error reporting.
    pub fn read_named<T: JsonValue>(
        &mut self,
        target: &mut T,
        input: impl io::Read,
        stream: &str,
        first_line: u64,
    ) -> Result<()> {
        self.registry_check()?;
        self.last_error = None;
        let mut input = io::BufReader::new(input);
        let handler = self.handler.as_deref();
        let mut reader = Reader::new(
            self.registry,
            &mut input,
            self.syntax,
            stream,
            first_line,
            handler,
        );
        let result = reader.read_top(target);
        let warning = reader.take_failure();
        drop(reader);
        match result {
            Err(error) => {
                self.report(&error);
                self.last_error = Some(error.clone());
                Err(error)
            }
            Ok(()) => match warning {
                // already reported when it was raised
                Some(warning) => {
                    self.last_error = Some(warning.clone());
                    Err(warning)
                }
                None => Ok(()),
            },
        }
    }

    pub fn read_str<T: JsonValue>(&mut self, target: &mut T, text: &str) -> Result<()> {
        self.read_named(target, text.as_bytes(), "", 1)
    }

    pub fn read_file<T: JsonValue>(&mut self, target: &mut T, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path.display().to_string();
        match fs::File::open(path) {
            Ok(file) => self.read_named(target, file, &name, 1),
            Err(error) => {
                let error = Error::new(
                    ErrorKind::CantReadFile,
                    error.to_string(),
                    Op::Read,
                    &name,
                    0,
                    true,
                );
                self.report(&error);
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Writes `value` as one document followed by a newline, flushing the
    /// stream on completion.
    pub fn write<T: JsonValue>(&mut self, value: &T, out: impl io::Write) -> Result<()> {
        self.write_named(value, out, "", 1)
    }

    /// Like [`Engine::write`] with a stream name and a first line number for
    /// error reporting.
    pub fn write_named<T: JsonValue>(
        &mut self,
        value: &T,
        out: impl io::Write,
        stream: &str,
        first_line: u64,
    ) -> Result<()> {
        self.registry_check()?;
        self.last_error = None;
        let mut out = io::BufWriter::new(out);
        let mut writer = Writer::new(
            self.registry,
            &mut out,
            self.sharing,
            self.indent,
            stream,
            first_line,
        );
        let result = writer.write_top(value);
        drop(writer);
        match result {
            Err(error) => {
                self.report(&error);
                self.last_error = Some(error.clone());
                Err(error)
            }
            Ok(()) => Ok(()),
        }
    }

    pub fn write_string<T: JsonValue>(&mut self, value: &T) -> Result<String> {
        let mut buf = Vec::new();
        self.write_named(value, &mut buf, "", 1)?;
        String::from_utf8(buf).map_err(|_| {
            Error::new(
                ErrorKind::InvalidCharacter,
                "output is not valid UTF-8",
                Op::Write,
                "",
                0,
                true,
            )
        })
    }

    pub fn write_file<T: JsonValue>(&mut self, value: &T, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let name = path.display().to_string();
        match fs::File::create(path) {
            Ok(file) => self.write_named(value, file, &name, 1),
            Err(error) => {
                let error = Error::new(
                    ErrorKind::CantWriteFile,
                    error.to_string(),
                    Op::Write,
                    &name,
                    0,
                    true,
                );
                self.report(&error);
                self.last_error = Some(error.clone());
                Err(error)
            }
        }
    }
}
