mod lexer;

pub use lexer::Token;
pub(crate) use lexer::{Lexer, Pair};

use crate::engine::Syntax;
use crate::error::{Error, ErrorKind, Result};
use crate::registry::Registry;
use crate::value::{ArraySink, CreateFn, DynObj, JsonValue};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::io::Read;

/// Recursive-descent consumer of token pairs. One `Reader` lives for one
/// top-level read; its identity table maps every `@id` seen so far to the
/// handle materialized for it.
pub struct Reader<'a> {
    registry: &'a Registry,
    lexer: Lexer<'a>,
    handler: Option<&'a dyn Fn(&Error)>,
    ids: HashMap<u64, DynObj>,
    current_member: String,
    first_error: Option<Error>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        input: &'a mut dyn Read,
        syntax: Syntax,
        stream: &str,
        first_line: u64,
        handler: Option<&'a dyn Fn(&Error)>,
    ) -> Self {
        Reader {
            registry,
            lexer: Lexer::new(input, syntax, stream, first_line),
            handler,
            ids: HashMap::new(),
            current_member: String::new(),
            first_error: None,
        }
    }

    /// Builds a fatal error stamped with the current stream position.
    pub fn fail(&self, kind: ErrorKind, detail: impl Into<String>) -> Error {
        self.lexer.fail(kind, detail)
    }

    /// Reports a non-fatal error and records the failure; reading continues.
    pub fn warn(&mut self, kind: ErrorKind, detail: impl Into<String>) {
        let mut error = self.lexer.fail(kind, detail);
        error.fatal = false;
        match self.handler {
            Some(handler) => handler(&error),
            None => log::warn!("{error}"),
        }
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<Error> {
        self.first_error.take()
    }

    pub(crate) fn invalid_value(&self, mut detail: String) -> Error {
        if !self.current_member.is_empty() {
            detail.push_str(" for member '");
            detail.push_str(&self.current_member);
            detail.push('\'');
        }
        self.fail(ErrorKind::InvalidValue, detail)
    }

    pub(crate) fn invalid_scalar(&self, text: &str, expected: &str) -> Error {
        self.invalid_value(format!("{:?} should be {}", text, expected))
    }

    /// Used by `defenum!` expansions.
    pub fn unknown_enum_value(&self, code: i64, ty: &str) -> Error {
        self.invalid_value(format!("{} is not a valid {}", code, ty))
    }

    pub(crate) fn descriptor_mismatch(&self) -> Error {
        self.fail(
            ErrorKind::CantCreateObject,
            "object does not match its class descriptor",
        )
    }

    pub(crate) fn scalar_text<'t>(&self, token: &'t Token) -> Result<(&'t str, bool)> {
        token
            .text()
            .ok_or_else(|| self.invalid_value("structured value where a scalar was expected".to_owned()))
    }

    pub(crate) fn class_cast_error(&self, obj: &DynObj, want: &str) -> Error {
        let got = self.registry.name_by_type(obj.key()).unwrap_or("?");
        self.invalid_value(format!(
            "object of class '{}' cannot be stored in a '{}' field",
            got, want
        ))
    }

    pub(crate) fn check_extends(&self, obj: &DynObj, base: TypeId, base_name: &str) -> Result<()> {
        if self.registry.is_subclass(obj.key(), base) {
            return Ok(());
        }
        let got = self.registry.name_by_type(obj.key()).unwrap_or("?");
        let want = self.registry.name_by_type(base).unwrap_or(base_name);
        Err(self.invalid_value(format!("class '{}' does not extend '{}'", got, want)))
    }

    fn next_pair(&mut self, in_object: bool) -> Result<Pair> {
        self.lexer.next_pair(in_object)
    }

    /// Reads one whole document into `target`.
    pub(crate) fn read_top<T: JsonValue>(&mut self, target: &mut T) -> Result<()> {
        // array mode, so a bare top-level scalar validates as a value
        let pair = self.next_pair(false)?;
        match pair.first {
            None => Err(self.fail(ErrorKind::NoData, "")),
            Some(token) => target.read(self, None, &token),
        }
    }

    /// Reads a value in place; entry point for custom member callables.
    pub fn read_value<V: JsonValue>(&mut self, target: &mut V, token: &Token) -> Result<()> {
        target.read(self, None, token)
    }

    /// Object entry for shared handles: resolves `"@N"` back-references or
    /// consumes a brace form, materializing through the pinned class.
    pub(crate) fn read_shared(
        &mut self,
        token: &Token,
        hint_key: TypeId,
        hint_name: &str,
        creator: Option<&mut CreateFn<'_>>,
    ) -> Result<DynObj> {
        if let Some((text, _)) = token.text() {
            if let Some(rest) = text.strip_prefix('@') {
                let id: u64 = rest
                    .parse()
                    .map_err(|_| self.fail(ErrorKind::InvalidId, text.to_owned()))?;
                return match self.ids.get(&id) {
                    Some(obj) => Ok(obj.clone()),
                    None => Err(self.fail(ErrorKind::InvalidId, format!("no object with id {}", id))),
                };
            }
        }
        if !matches!(token, Token::BeginObject) {
            return Err(self.fail(ErrorKind::ExpectingBrace, ""));
        }
        self.read_object_pairs(hint_key, hint_name, creator)
    }

    fn read_object_pairs(
        &mut self,
        hint_key: TypeId,
        hint_name: &str,
        mut creator: Option<&mut CreateFn<'_>>,
    ) -> Result<DynObj> {
        let registry = self.registry;
        let mut pinned: Option<usize> = None;
        let mut object: Option<DynObj> = None;
        loop {
            let pair = self.next_pair(true)?;
            let Some(name_token) = pair.first else {
                return Err(self.fail(ErrorKind::PrematureEof, ""));
            };
            let name = match &name_token {
                Token::EndObject => None,
                Token::Text { text, .. } => Some(text.as_str()),
                _ => return Err(self.fail(ErrorKind::ExpectingPairOrBrace, "")),
            };
            if let Some(name) = name {
                if name.starts_with('@') && name != "@class" && name != "@id" {
                    return Err(self.fail(ErrorKind::WrongKeyword, name.to_owned()));
                }
            }

            // pin the class on the first name: @class names it explicitly,
            // anything else (including an immediate close) falls back to the
            // hint, then the object is materialized
            if pinned.is_none() {
                let idx = match name {
                    Some("@class") => {
                        let Some((class_name, _)) = pair.second.as_ref().and_then(Token::text)
                        else {
                            return Err(
                                self.fail(ErrorKind::ExpectingPairOrBrace, "@class without a name")
                            );
                        };
                        match registry.index_by_name(class_name) {
                            Some(idx) => idx,
                            None => {
                                return Err(
                                    self.fail(ErrorKind::UnknownClass, class_name.to_owned())
                                )
                            }
                        }
                    }
                    _ => match registry.index_by_type(hint_key) {
                        Some(idx) => idx,
                        None => return Err(self.fail(ErrorKind::UnknownClass, hint_name)),
                    },
                };
                let class = registry.class_at(idx);
                let created = match creator.as_deref_mut() {
                    Some(make) => {
                        let created = make();
                        if created.key() != class.key {
                            return Err(self.fail(
                                ErrorKind::CantCreateObject,
                                format!(
                                    "creator produced an instance of another class than '{}'",
                                    class.name()
                                ),
                            ));
                        }
                        created
                    }
                    None => match class.instantiate() {
                        Some(created) => created,
                        None => {
                            return Err(
                                self.fail(ErrorKind::AbstractClass, class.name().to_owned())
                            )
                        }
                    },
                };
                pinned = Some(idx);
                object = Some(created);
                if name == Some("@class") {
                    continue;
                }
            }

            let Some(idx) = pinned else {
                return Err(self.descriptor_mismatch());
            };
            let Some(obj) = object.clone() else {
                return Err(self.descriptor_mismatch());
            };
            let class = registry.class_at(idx);

            let Some(name) = name else {
                // closing brace
                match (class.with_mut)(&obj, &mut |any| {
                    class.post_read(any);
                    Ok(())
                }) {
                    Some(result) => result?,
                    None => return Err(self.descriptor_mismatch()),
                }
                return Ok(obj);
            };

            let Some(value) = pair.second else {
                return Err(self.fail(ErrorKind::ExpectingPairOrBrace, name.to_owned()));
            };

            if name == "@id" {
                let Some((text, _)) = value.text() else {
                    return Err(self.fail(ErrorKind::InvalidId, ""));
                };
                let id: u64 = text
                    .parse()
                    .map_err(|_| self.fail(ErrorKind::InvalidId, text.to_owned()))?;
                self.ids.insert(id, obj.clone());
                continue;
            }
            if name == "@class" {
                let Some((class_name, _)) = value.text() else {
                    return Err(self.fail(ErrorKind::ExpectingPairOrBrace, "@class without a name"));
                };
                if class_name != class.name() {
                    return Err(self.invalid_value(format!(
                        "@class '{}' conflicts with '{}'",
                        class_name,
                        class.name()
                    )));
                }
                continue;
            }

            self.current_member = name.to_owned();
            let mut matched = false;
            let outcome = (class.with_mut)(&obj, &mut |any| {
                matched = registry.read_member_walk(idx, self, any, name, &value)?;
                Ok(())
            });
            match outcome {
                Some(result) => result?,
                None => return Err(self.descriptor_mismatch()),
            }
            if !matched {
                self.warn(
                    ErrorKind::UnknownMember,
                    format!("'{}' in class '{}'", name, class.name()),
                );
                self.skip_value(&value)?;
            }
        }
    }

    /// Reads an object form into an existing value: the entry point for
    /// by-value members and `defobject!` targets. Members merge into the
    /// target; `@id` is ignored (embedded values have no shareable identity).
    pub fn read_class_into<T: Any>(&mut self, target: &mut T, token: &Token) -> Result<()> {
        let Some(idx) = self.registry.index_by_type(TypeId::of::<T>()) else {
            return Err(self.fail(ErrorKind::UnknownClass, type_name::<T>()));
        };
        if !matches!(token, Token::BeginObject) {
            return Err(self.fail(ErrorKind::ExpectingBrace, ""));
        }
        self.read_members_into(idx, target as &mut dyn Any)
    }

    /// Builds a fresh value of a registered class from an object form, as
    /// containers and `Option`/`Box` pointees need.
    pub fn read_class_new<T: Any>(&mut self, token: &Token) -> Result<T> {
        let registry = self.registry;
        let Some(idx) = registry.index_by_type(TypeId::of::<T>()) else {
            return Err(self.fail(ErrorKind::UnknownClass, type_name::<T>()));
        };
        let class = registry.class_at(idx);
        let Some(boxed) = class.instantiate_value() else {
            return Err(self.fail(ErrorKind::AbstractClass, class.name().to_owned()));
        };
        let Ok(mut value) = boxed.downcast::<T>() else {
            return Err(self.descriptor_mismatch());
        };
        if !matches!(token, Token::BeginObject) {
            return Err(self.fail(ErrorKind::ExpectingBrace, ""));
        }
        self.read_members_into(idx, value.as_mut() as &mut dyn Any)?;
        Ok(*value)
    }

    fn read_members_into(&mut self, idx: usize, obj: &mut dyn Any) -> Result<()> {
        let registry = self.registry;
        let class = registry.class_at(idx);
        loop {
            let pair = self.next_pair(true)?;
            let Some(name_token) = pair.first else {
                return Err(self.fail(ErrorKind::PrematureEof, ""));
            };
            let name = match &name_token {
                Token::EndObject => {
                    class.post_read(obj);
                    return Ok(());
                }
                Token::Text { text, .. } => text.as_str(),
                _ => return Err(self.fail(ErrorKind::ExpectingPairOrBrace, "")),
            };
            if name.starts_with('@') && name != "@class" && name != "@id" {
                return Err(self.fail(ErrorKind::WrongKeyword, name.to_owned()));
            }
            let Some(value) = pair.second else {
                return Err(self.fail(ErrorKind::ExpectingPairOrBrace, name.to_owned()));
            };
            if name == "@id" {
                continue;
            }
            if name == "@class" {
                let Some((class_name, _)) = value.text() else {
                    return Err(self.fail(ErrorKind::ExpectingPairOrBrace, "@class without a name"));
                };
                if class_name != class.name() {
                    return Err(self.invalid_value(format!(
                        "@class '{}' conflicts with '{}'",
                        class_name,
                        class.name()
                    )));
                }
                continue;
            }
            self.current_member = name.to_owned();
            if !registry.read_member_walk(idx, self, obj, name, &value)? {
                self.warn(
                    ErrorKind::UnknownMember,
                    format!("'{}' in class '{}'", name, class.name()),
                );
                self.skip_value(&value)?;
            }
        }
    }

    /// Array entry: appends elements through the sink, then finalizes it.
    pub fn read_array(
        &mut self,
        sink: &mut dyn ArraySink,
        mut creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        if !matches!(token, Token::BeginArray) {
            return Err(self.fail(ErrorKind::ExpectingBracket, ""));
        }
        loop {
            let pair = self.next_pair(false)?;
            let Some(item) = pair.first else {
                return Err(self.fail(ErrorKind::ExpectingValueOrBracket, ""));
            };
            if matches!(item, Token::EndArray) {
                return sink.end(self);
            }
            sink.add(self, creator.as_deref_mut(), &item)?;
        }
    }

    /// Map entry: each key becomes an entry; `@`-prefixed keys are rejected
    /// because maps live outside the class protocol.
    pub(crate) fn read_map(
        &mut self,
        token: &Token,
        mut creator: Option<&mut CreateFn<'_>>,
        entry: &mut dyn FnMut(&mut Reader<'_>, &str, &Token, Option<&mut CreateFn<'_>>) -> Result<()>,
    ) -> Result<()> {
        if !matches!(token, Token::BeginObject) {
            return Err(self.fail(ErrorKind::ExpectingBrace, ""));
        }
        loop {
            let pair = self.next_pair(true)?;
            let Some(name_token) = pair.first else {
                return Err(self.fail(ErrorKind::PrematureEof, ""));
            };
            let key = match &name_token {
                Token::EndObject => return Ok(()),
                Token::Text { text, .. } => text.as_str(),
                _ => return Err(self.fail(ErrorKind::ExpectingPairOrBrace, "")),
            };
            if key.starts_with('@') {
                return Err(self.fail(ErrorKind::WrongKeyword, format!("'{}' in a map", key)));
            }
            let Some(value) = pair.second else {
                return Err(self.fail(ErrorKind::ExpectingPairOrBrace, key.to_owned()));
            };
            self.current_member = key.to_owned();
            entry(self, key, &value, creator.as_deref_mut())?;
        }
    }

    /// Consumes and discards a value, balancing nested braces and brackets.
    fn skip_value(&mut self, token: &Token) -> Result<()> {
        match token {
            Token::BeginObject => loop {
                let pair = self.next_pair(true)?;
                match pair.first {
                    None => return Err(self.fail(ErrorKind::PrematureEof, "")),
                    Some(Token::EndObject) => return Ok(()),
                    Some(_) => {
                        if let Some(value) = pair.second {
                            self.skip_value(&value)?;
                        }
                    }
                }
            },
            Token::BeginArray => loop {
                let pair = self.next_pair(false)?;
                match pair.first {
                    None => return Err(self.fail(ErrorKind::ExpectingValueOrBracket, "")),
                    Some(Token::EndArray) => return Ok(()),
                    Some(item) => self.skip_value(&item)?,
                }
            },
            _ => Ok(()),
        }
    }
}
