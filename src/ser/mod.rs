use crate::engine::Indent;
use crate::error::{Error, ErrorKind, Op, Result};
use crate::registry::Registry;
use crate::value::{DynObj, JsonValue};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;

/// Recursive emitter. One `Writer` lives for one top-level write; under
/// sharing its identity table remembers which objects were already emitted
/// and with which id.
pub struct Writer<'a> {
    registry: &'a Registry,
    out: &'a mut dyn Write,
    sharing: bool,
    indent_unit: String,
    stream: String,
    line: u64,
    level: usize,
    need_comma: bool,
    member_name: String,
    ids: HashMap<usize, u64>,
    next_id: u64,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(
        registry: &'a Registry,
        out: &'a mut dyn Write,
        sharing: bool,
        indent: Indent,
        stream: &str,
        first_line: u64,
    ) -> Self {
        Writer {
            registry,
            out,
            sharing,
            indent_unit: indent.ch.to_string().repeat(indent.count),
            stream: stream.to_owned(),
            line: first_line,
            level: 0,
            need_comma: false,
            member_name: String::new(),
            ids: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn fail(&self, kind: ErrorKind, detail: impl Into<String>) -> Error {
        Error::new(kind, detail, Op::Write, &self.stream, self.line, true)
    }

    pub(crate) fn descriptor_mismatch(&self) -> Error {
        self.fail(
            ErrorKind::CantCreateObject,
            "object does not match its class descriptor",
        )
    }

    fn out_err(&self, error: std::io::Error) -> Error {
        self.fail(ErrorKind::CantWriteFile, error.to_string())
    }

    pub(crate) fn write_raw(&mut self, text: &str) -> Result<()> {
        let result = self.out.write_all(text.as_bytes());
        result.map_err(|e| self.out_err(e))
    }

    fn write_fmt_raw(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let result = self.out.write_fmt(args);
        result.map_err(|e| self.out_err(e))
    }

    fn tabs(&mut self) -> Result<()> {
        for _ in 0..self.level {
            let result = self.out.write_all(self.indent_unit.as_bytes());
            if let Err(e) = result {
                return Err(self.out_err(e));
            }
        }
        Ok(())
    }

    pub(crate) fn write_display(&mut self, value: &dyn fmt::Display) -> Result<()> {
        self.write_fmt_raw(format_args!("{}", value))
    }

    pub(crate) fn write_null(&mut self) -> Result<()> {
        self.write_raw("null")
    }

    pub(crate) fn write_quoted(&mut self, text: &str) -> Result<()> {
        let mut buf = String::with_capacity(text.len() + 2);
        buf.push('"');
        for ch in text.chars() {
            match ch {
                '"' => buf.push_str("\\\""),
                '\\' => buf.push_str("\\\\"),
                '\u{8}' => buf.push_str("\\b"),
                '\u{c}' => buf.push_str("\\f"),
                '\n' => buf.push_str("\\n"),
                '\r' => buf.push_str("\\r"),
                '\t' => buf.push_str("\\t"),
                _ => buf.push(ch),
            }
        }
        buf.push('"');
        self.write_raw(&buf)
    }

    /// Emits a shared handle: a back-reference when the object was already
    /// written under sharing, the brace form otherwise.
    pub(crate) fn write_shared(
        &mut self,
        obj: &DynObj,
        static_key: TypeId,
        static_name: &str,
    ) -> Result<()> {
        let registry = self.registry;
        let Some(idx) = registry.index_by_type(obj.key()) else {
            return Err(self.fail(
                ErrorKind::UnknownClass,
                format!("runtime class of a '{}' value", static_name),
            ));
        };
        if self.sharing {
            if let Some(id) = self.ids.get(&obj.address()).copied() {
                return self.write_fmt_raw(format_args!("\"@{}\"", id));
            }
        }
        let id = if self.sharing {
            self.next_id += 1;
            self.ids.insert(obj.address(), self.next_id);
            Some(self.next_id)
        } else {
            None
        };
        let derived = obj.key() != static_key;
        let class = registry.class_at(idx);
        match (class.with_ref)(obj, &mut |any| self.write_object_body(idx, derived, id, any)) {
            Some(result) => result,
            None => Err(self.descriptor_mismatch()),
        }
    }

    /// Emits a registered object held by value: brace form, never an id (a
    /// by-value member has no identity separate from its owner).
    pub fn write_class_value<T: Any>(&mut self, value: &T) -> Result<()> {
        let Some(idx) = self.registry.index_by_type(TypeId::of::<T>()) else {
            return Err(self.fail(ErrorKind::UnknownClass, type_name::<T>()));
        };
        self.write_object_body(idx, false, None, value as &dyn Any)
    }

    fn write_object_body(
        &mut self,
        idx: usize,
        derived: bool,
        id: Option<u64>,
        obj: &dyn Any,
    ) -> Result<()> {
        let registry = self.registry;
        let class = registry.class_at(idx);
        self.write_raw("{\n")?;
        self.level += 1;
        self.need_comma = false;
        if derived {
            self.tabs()?;
            self.write_fmt_raw(format_args!("\"@class\": \"{}\"", class.name()))?;
            self.need_comma = true;
        }
        if let Some(id) = id {
            if self.need_comma {
                self.write_raw(",\n")?;
            }
            self.tabs()?;
            self.write_fmt_raw(format_args!("\"@id\": \"{}\"", id))?;
            self.need_comma = true;
        }
        registry.write_members(idx, self, obj)?;
        self.level -= 1;
        self.write_raw("\n")?;
        self.tabs()?;
        self.write_raw("}")?;
        self.need_comma = true;
        class.post_write(obj);
        Ok(())
    }

    pub(crate) fn begin_member(&mut self, name: &str, custom: bool) -> Result<()> {
        if custom {
            // nothing is emitted yet: the custom callable writes its own
            // separator and prefix through write_member, so a callable that
            // emits no member leaves the stream and comma state untouched
            self.member_name.clear();
            self.member_name.push_str(name);
            return Ok(());
        }
        if self.need_comma {
            self.write_raw(",\n")?;
        }
        self.need_comma = false;
        self.tabs()?;
        self.write_fmt_raw(format_args!("\"{}\": ", name))?;
        Ok(())
    }

    pub(crate) fn end_member(&mut self) {
        self.need_comma = true;
    }

    /// Emits `"name": value` for the member currently being written; the
    /// entry point for custom member callables.
    pub fn write_member<V: JsonValue>(&mut self, value: &V) -> Result<()> {
        let name = self.member_name.clone();
        self.write_member_named(&name, value)
    }

    /// Emits an explicitly named `"name": value` pair; custom callables that
    /// expand into several logical members use this.
    pub fn write_member_named<V: JsonValue>(&mut self, name: &str, value: &V) -> Result<()> {
        if self.need_comma {
            self.write_raw(",\n")?;
        }
        self.need_comma = false;
        self.tabs()?;
        self.write_fmt_raw(format_args!("\"{}\": ", name))?;
        value.write(self)?;
        self.need_comma = true;
        Ok(())
    }

    pub(crate) fn write_seq<'i, V, I>(&mut self, items: I) -> Result<()>
    where
        V: JsonValue + 'i,
        I: IntoIterator<Item = &'i V>,
    {
        let mut items = items.into_iter().peekable();
        if items.peek().is_none() {
            return self.write_raw("[]");
        }
        self.write_raw("[\n")?;
        self.level += 1;
        self.need_comma = false;
        for item in items {
            if self.need_comma {
                self.write_raw(",\n")?;
            }
            self.tabs()?;
            self.need_comma = false;
            item.write(self)?;
            self.need_comma = true;
        }
        self.level -= 1;
        self.write_raw("\n")?;
        self.tabs()?;
        self.write_raw("]")?;
        self.need_comma = true;
        Ok(())
    }

    pub(crate) fn write_map<'i, V, I>(&mut self, entries: I) -> Result<()>
    where
        V: JsonValue + 'i,
        I: IntoIterator<Item = (&'i String, &'i V)>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return self.write_raw("{}");
        }
        self.write_raw("{\n")?;
        self.level += 1;
        self.need_comma = false;
        for (key, value) in entries {
            if self.need_comma {
                self.write_raw(",\n")?;
            }
            self.tabs()?;
            self.need_comma = false;
            self.write_quoted(key)?;
            self.write_raw(": ")?;
            value.write(self)?;
            self.need_comma = true;
        }
        self.level -= 1;
        self.write_raw("\n")?;
        self.tabs()?;
        self.write_raw("}")?;
        self.need_comma = true;
        Ok(())
    }

    /// Writes one whole document and flushes the stream.
    pub(crate) fn write_top<V: JsonValue>(&mut self, value: &V) -> Result<()> {
        value.write(self)?;
        self.write_raw("\n")?;
        let result = self.out.flush();
        result.map_err(|e| self.out_err(e))
    }
}
