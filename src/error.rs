use std::fmt::{self, Display};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Callback invoked for every reported error. Installed on an [`Engine`] or a
/// [`Registry`]; when absent, errors go through the `log` crate instead.
///
/// [`Engine`]: crate::Engine
/// [`Registry`]: crate::Registry
pub type ErrorHandler = Box<dyn Fn(&Error)>;

/// Error codes, each carrying its one-line message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("can't read file (not found or not readable)")]
    CantReadFile,
    #[error("can't write file")]
    CantWriteFile,
    #[error("no data")]
    NoData,
    #[error("premature end of input")]
    PrematureEof,
    #[error("invalid character in input")]
    InvalidCharacter,
    #[error("expecting comma")]
    ExpectingComma,
    #[error("expecting , or }} or ]")]
    ExpectingDelimiter,
    #[error("expecting {{")]
    ExpectingBrace,
    #[error("expecting [")]
    ExpectingBracket,
    #[error("expecting }} or name:value pair")]
    ExpectingPairOrBrace,
    #[error("expecting ] or value")]
    ExpectingValueOrBracket,
    #[error("expecting a quoted name")]
    ExpectingString,
    #[error("unknown class")]
    UnknownClass,
    #[error("unknown superclass")]
    UnknownSuperclass,
    #[error("class is already declared")]
    RedefinedClass,
    #[error("already declared as a superclass")]
    RedefinedSuperclass,
    #[error("unknown member")]
    UnknownMember,
    #[error("class member is already defined")]
    RedefinedMember,
    #[error("can't create instance of abstract class")]
    AbstractClass,
    #[error("could not create object")]
    CantCreateObject,
    #[error("array is too small to add value")]
    CantAddToArray,
    #[error("invalid value")]
    InvalidValue,
    #[error("ID number expected after @")]
    InvalidId,
    #[error("expecting @id or @class")]
    WrongKeyword,
}

/// Which engine activity produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Register,
    Read,
    Write,
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Register => f.write_str("during registration"),
            Op::Read => f.write_str("while reading"),
            Op::Write => f.write_str("while writing"),
        }
    }
}

/// A structured serialization error: code, human context, site, stream name,
/// line number and fatality. Non-fatal errors (currently only
/// [`ErrorKind::UnknownMember`]) are reported through the handler and the
/// operation continues.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    /// Human context appended to the kind message, e.g. `'extra' in class 'P'`.
    pub detail: String,
    pub op: Op,
    /// Stream name or file path, empty when none was given.
    pub stream: String,
    /// Line at or before which the error occurred; 0 when not applicable.
    pub line: u64,
    pub fatal: bool,
}

impl Error {
    pub(crate) fn new(
        kind: ErrorKind,
        detail: impl Into<String>,
        op: Op,
        stream: &str,
        line: u64,
        fatal: bool,
    ) -> Self {
        Self {
            kind,
            detail: detail.into(),
            op,
            stream: stream.to_owned(),
            line,
            fatal,
        }
    }

    pub(crate) fn register(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::new(kind, detail, Op::Register, "", 0, true)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}", self.op)?;
        if !self.stream.is_empty() {
            write!(f, " '{}'", self.stream)?;
        }
        if self.line > 0 {
            write!(f, " at or before line {}", self.line)?;
        }
        write!(f, ": {}", self.kind)?;
        if !self.detail.is_empty() {
            write!(f, " {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
