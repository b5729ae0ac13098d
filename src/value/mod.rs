mod array;
mod map;
mod object;

pub use array::ArraySink;
pub use object::{Dyn, DynObj, Obj};

use crate::de::{Reader, Token};
use crate::error::Result;
use crate::ser::Writer;

/// Creator thunk threaded from a `member_created` registration down to the
/// point where a pointee (or container element) is materialized.
pub type CreateFn<'a> = dyn FnMut() -> DynObj + 'a;

/// One serializable value: scalars, strings, enums, object handles, boxed
/// pointees, containers and string-keyed maps all implement this.
///
/// `read` fills an existing value in place (for registered objects this
/// merges members into the target); `read_new` produces a fresh value and is
/// what containers, maps and `Option` use for their elements.
pub trait JsonValue: 'static {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()>
    where
        Self: Sized,
    {
        *self = Self::read_new(reader, creator, token)?;
        Ok(())
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self>
    where
        Self: Sized;

    fn write(&self, writer: &mut Writer<'_>) -> Result<()>;
}

macro_rules! impl_number {
    ($($ty:ty),+ $(,)?) => {$(
        impl JsonValue for $ty {
            fn read_new(
                reader: &mut Reader<'_>,
                _creator: Option<&mut CreateFn<'_>>,
                token: &Token,
            ) -> Result<Self> {
                let (text, _) = reader.scalar_text(token)?;
                text.parse::<$ty>()
                    .map_err(|_| reader.invalid_scalar(text, "a number"))
            }

            fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
                writer.write_display(self)
            }
        }
    )+};
}

impl_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl JsonValue for bool {
    fn read_new(
        reader: &mut Reader<'_>,
        _creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let (text, _) = reader.scalar_text(token)?;
        match text {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(reader.invalid_scalar(text, "a boolean")),
        }
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_raw(if *self { "true" } else { "false" })
    }
}

impl JsonValue for char {
    fn read_new(
        reader: &mut Reader<'_>,
        _creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let (text, _) = reader.scalar_text(token)?;
        Ok(text.chars().next().unwrap_or('\0'))
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        let mut buf = [0u8; 4];
        writer.write_quoted(self.encode_utf8(&mut buf))
    }
}

impl JsonValue for String {
    fn read_new(
        reader: &mut Reader<'_>,
        _creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        let (text, _) = reader.scalar_text(token)?;
        Ok(text.to_owned())
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_quoted(self)
    }
}

/// Nullable values: the bare literal `null` reads as `None` and `None`
/// writes as `null`.
impl<V: JsonValue> JsonValue for Option<V> {
    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        if token.is_null() {
            return Ok(None);
        }
        Ok(Some(V::read_new(reader, creator, token)?))
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        match self {
            Some(value) => value.write(writer),
            None => writer.write_null(),
        }
    }
}

/// Unique-ownership pointer: serializes exactly like its pointee.
impl<V: JsonValue> JsonValue for Box<V> {
    fn read(
        &mut self,
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<()> {
        (**self).read(reader, creator, token)
    }

    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        Ok(Box::new(V::read_new(reader, creator, token)?))
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        (**self).write(writer)
    }
}
