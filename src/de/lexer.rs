use crate::engine::Syntax;
use crate::error::{Error, ErrorKind, Op, Result};
use std::io::Read;

/// One lexical token. Quoted-ness is preserved so the reader can tell the
/// back-reference string `"@1"` and the literal `null` apart from look-alike
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text { text: String, quoted: bool },
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
}

impl Token {
    /// The bare literal `null` (quoted `"null"` is ordinary text).
    pub fn is_null(&self) -> bool {
        matches!(self, Token::Text { text, quoted: false } if text == "null")
    }

    pub(crate) fn text(&self) -> Option<(&str, bool)> {
        match self {
            Token::Text { text, quoted } => Some((text, *quoted)),
            _ => None,
        }
    }
}

/// A `(name, value)` line-pair. In array mode only `first` is produced; a
/// closing delimiter arrives as a structural token in `first`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pair {
    pub first: Option<Token>,
    pub second: Option<Token>,
}

enum State {
    Begin,
    QuotedName,
    BareName,
    AfterName,
    AfterColon,
    QuotedValue,
    BareValue,
    AfterValue,
}

fn is_ctrl(c: u8) -> bool {
    c < 0x20 || c == 0x7f
}

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

fn is_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    let mut i = usize::from(bytes[0] == b'-');
    let (mut dot, mut exp) = (false, false);
    while i < bytes.len() {
        let c = bytes[i];
        if !c.is_ascii_digit() {
            if c == b'.' {
                if dot {
                    return false;
                }
                dot = true;
            } else if c == b'e' || c == b'E' {
                if exp {
                    return false;
                }
                exp = true;
                if i + 1 < bytes.len() && (bytes[i + 1] == b'+' || bytes[i + 1] == b'-') {
                    i += 1;
                }
            } else {
                return false;
            }
        }
        i += 1;
    }
    true
}

/// Single-pass scanner producing `(name, value)` pairs. One byte of pushback
/// covers the `}`/`]` terminators that also close the surrounding structure.
pub(crate) struct Lexer<'a> {
    input: &'a mut dyn Read,
    pending: Option<u8>,
    syntax: Syntax,
    stream: String,
    pub(crate) line: u64,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a mut dyn Read, syntax: Syntax, stream: &str, first_line: u64) -> Self {
        Self {
            input,
            pending: None,
            syntax,
            stream: stream.to_owned(),
            line: first_line,
        }
    }

    pub fn fail(&self, kind: ErrorKind, detail: impl Into<String>) -> Error {
        Error::new(kind, detail, Op::Read, &self.stream, self.line, true)
    }

    fn invalid_char(&self, c: u8) -> Error {
        let what = match c {
            b'\n' => "newline ",
            b'\r' => "CR ",
            b'\t' => "tab ",
            _ => "",
        };
        self.fail(ErrorKind::InvalidCharacter, format!("{}(code: {})", what, c))
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(ErrorKind::CantReadFile, e.to_string())),
            }
        }
    }

    fn get(&mut self) -> Result<Option<u8>> {
        match self.pending.take() {
            Some(c) => Ok(Some(c)),
            None => self.read_byte(),
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.pending.is_none() {
            self.pending = self.read_byte()?;
        }
        Ok(self.pending)
    }

    fn read_escape(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        match self.get()? {
            None => Err(self.fail(ErrorKind::PrematureEof, "unterminated escape")),
            Some(b'b') => {
                buf.push(0x08);
                Ok(())
            }
            Some(b'f') => {
                buf.push(0x0c);
                Ok(())
            }
            Some(b'n') => {
                buf.push(b'\n');
                Ok(())
            }
            Some(b'r') => {
                buf.push(b'\r');
                Ok(())
            }
            Some(b't') => {
                buf.push(b'\t');
                Ok(())
            }
            // `\" \\ \/` and unknown escapes pass the character through
            Some(other) => {
                buf.push(other);
                Ok(())
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            match self.get()? {
                None => return Ok(()),
                Some(b'\n') => self.line += 1,
                Some(b'*') => {
                    if self.peek()? == Some(b'/') {
                        self.get()?;
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn into_utf8(&self, buf: Vec<u8>) -> Result<String> {
        String::from_utf8(buf)
            .map_err(|_| self.fail(ErrorKind::InvalidCharacter, "invalid UTF-8 sequence"))
    }

    fn finish_quoted(&self, buf: Vec<u8>) -> Result<Token> {
        Ok(Token::Text {
            text: self.into_utf8(buf)?,
            quoted: true,
        })
    }

    /// Right-trims a bare token, classifies lone closers, and applies the
    /// strict-mode validation the dialect may relax.
    fn finish_bare(&self, mut buf: Vec<u8>, as_name: bool) -> Result<Token> {
        while buf.last().is_some_and(|c| is_space(*c)) {
            buf.pop();
        }
        let text = self.into_utf8(buf)?;
        match text.as_str() {
            "}" => return Ok(Token::EndObject),
            "]" => return Ok(Token::EndArray),
            _ => {}
        }
        if as_name {
            if !self.syntax.contains(Syntax::NO_QUOTES) {
                return Err(self.fail(ErrorKind::ExpectingString, text));
            }
        } else if !self.syntax.contains(Syntax::NO_QUOTES)
            && !text.is_empty()
            && text != "true"
            && text != "false"
            && text != "null"
            && !is_number(&text)
        {
            return Err(self.fail(
                ErrorKind::InvalidValue,
                format!("{} (should be quoted?)", text),
            ));
        }
        Ok(Token::Text {
            text,
            quoted: false,
        })
    }

    /// Scans the next `(name, value)` pair. In object mode a `name: value`
    /// line is expected; in array mode each bare value arrives in `first`.
    pub fn next_pair(&mut self, in_object: bool) -> Result<Pair> {
        let mut buf1: Vec<u8> = Vec::new();
        let mut buf2: Vec<u8> = Vec::new();
        let mut first: Option<Token> = None;
        let mut second: Option<Token> = None;
        let mut state = State::Begin;
        let mut multiquote = false;
        let no_commas = self.syntax.contains(Syntax::NO_COMMAS);
        let newlines = self.syntax.contains(Syntax::NEWLINES);

        loop {
            let Some(got) = self.get()? else {
                return match state {
                    State::Begin => Ok(Pair {
                        first: None,
                        second: None,
                    }),
                    State::BareName => Ok(Pair {
                        first: Some(self.finish_bare(buf1, in_object)?),
                        second: None,
                    }),
                    State::BareValue => Ok(Pair {
                        first,
                        second: Some(self.finish_bare(buf2, false)?),
                    }),
                    State::AfterName | State::AfterColon => Ok(Pair {
                        first,
                        second: None,
                    }),
                    State::AfterValue => Ok(Pair { first, second }),
                    State::QuotedName | State::QuotedValue => {
                        Err(self.fail(ErrorKind::PrematureEof, "unterminated string"))
                    }
                };
            };
            if got == b'\n' {
                self.line += 1;
            } else if is_ctrl(got) && !is_space(got) {
                return Err(self.invalid_char(got));
            }

            let mut c = got;
            if c == b'/'
                && self.syntax.contains(Syntax::COMMENTS)
                && !matches!(state, State::QuotedName | State::QuotedValue)
            {
                match self.peek()? {
                    Some(b'/') => {
                        // leave the newline in the stream so it can still
                        // separate pairs under NoCommas
                        while !matches!(self.peek()?, None | Some(b'\n')) {
                            self.get()?;
                        }
                        continue;
                    }
                    Some(b'*') => {
                        self.get()?;
                        self.skip_block_comment()?;
                        c = b' ';
                    }
                    _ => {}
                }
            }

            match state {
                State::Begin => {
                    if c == b'"' {
                        state = State::QuotedName;
                    } else if c == b'{' {
                        return Ok(Pair {
                            first: Some(Token::BeginObject),
                            second: None,
                        });
                    } else if c == b'[' {
                        return Ok(Pair {
                            first: Some(Token::BeginArray),
                            second: None,
                        });
                    } else if !is_space(c) {
                        buf1.push(c);
                        state = State::BareName;
                    }
                }
                State::QuotedName => {
                    if c == b'"' {
                        first = Some(self.finish_quoted(std::mem::take(&mut buf1))?);
                        state = State::AfterName;
                    } else if c == b'\\' {
                        self.read_escape(&mut buf1)?;
                    } else if is_ctrl(c) && (!newlines || !is_space(c)) {
                        return Err(self.invalid_char(c));
                    } else {
                        buf1.push(c);
                    }
                }
                State::BareName => {
                    if c == b',' || (no_commas && c == b'\n') {
                        return Ok(Pair {
                            first: Some(self.finish_bare(buf1, in_object)?),
                            second: None,
                        });
                    } else if c == b'}' || c == b']' {
                        self.pending = Some(c);
                        return Ok(Pair {
                            first: Some(self.finish_bare(buf1, in_object)?),
                            second: None,
                        });
                    } else if c == b':' && in_object {
                        first = Some(self.finish_bare(std::mem::take(&mut buf1), true)?);
                        state = State::AfterColon;
                    } else if c == b'\\' {
                        self.read_escape(&mut buf1)?;
                    } else {
                        buf1.push(c);
                    }
                }
                State::AfterName => {
                    if c == b',' || (no_commas && c == b'\n') {
                        return Ok(Pair {
                            first,
                            second: None,
                        });
                    } else if c == b'}' || c == b']' {
                        self.pending = Some(c);
                        return Ok(Pair {
                            first,
                            second: None,
                        });
                    } else if c == b':' && in_object {
                        state = State::AfterColon;
                    } else if !is_space(c) {
                        return Err(self.fail(ErrorKind::ExpectingComma, ""));
                    }
                }
                State::AfterColon => {
                    if c == b'"' {
                        if self.peek()? != Some(b'"') {
                            state = State::QuotedValue;
                        } else {
                            self.get()?;
                            if self.peek()? == Some(b'"') && newlines {
                                self.get()?;
                                multiquote = true;
                                state = State::QuotedValue;
                            } else {
                                second = Some(Token::Text {
                                    text: String::new(),
                                    quoted: true,
                                });
                                state = State::AfterValue;
                            }
                        }
                    } else if c == b'{' {
                        return Ok(Pair {
                            first,
                            second: Some(Token::BeginObject),
                        });
                    } else if c == b'[' {
                        return Ok(Pair {
                            first,
                            second: Some(Token::BeginArray),
                        });
                    } else if !is_space(c) {
                        buf2.push(c);
                        state = State::BareValue;
                    }
                }
                State::QuotedValue => {
                    if c == b'"' {
                        if !multiquote {
                            second = Some(self.finish_quoted(std::mem::take(&mut buf2))?);
                            state = State::AfterValue;
                        } else if self.peek()? != Some(b'"') {
                            // lone quote inside a """ string is literal
                            buf2.push(b'"');
                        } else {
                            self.get()?;
                            if self.peek()? != Some(b'"') {
                                buf2.extend_from_slice(b"\"\"");
                            } else {
                                self.get()?;
                                multiquote = false;
                                second = Some(self.finish_quoted(std::mem::take(&mut buf2))?);
                                state = State::AfterValue;
                            }
                        }
                    } else if multiquote && is_space(c) {
                        buf2.push(c);
                    } else if c == b'\\' {
                        self.read_escape(&mut buf2)?;
                    } else if is_ctrl(c) && (!newlines || !is_space(c)) {
                        return Err(self.invalid_char(c));
                    } else {
                        buf2.push(c);
                    }
                }
                State::BareValue => {
                    if c == b',' || (no_commas && c == b'\n') {
                        return Ok(Pair {
                            first,
                            second: Some(self.finish_bare(buf2, false)?),
                        });
                    } else if c == b'}' || c == b']' {
                        self.pending = Some(c);
                        return Ok(Pair {
                            first,
                            second: Some(self.finish_bare(buf2, false)?),
                        });
                    } else if c == b'\\' {
                        self.read_escape(&mut buf2)?;
                    } else {
                        buf2.push(c);
                    }
                }
                State::AfterValue => {
                    if c == b',' || (no_commas && c == b'\n') {
                        return Ok(Pair { first, second });
                    } else if c == b'}' || c == b']' {
                        self.pending = Some(c);
                        return Ok(Pair { first, second });
                    } else if !is_space(c) {
                        return Err(self.fail(ErrorKind::ExpectingDelimiter, ""));
                    }
                }
            }
        }
    }
}
