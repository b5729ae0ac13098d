/// Hooks user structs into the object protocol: members merge into existing
/// targets on read, fresh values go through the registered constructor, and
/// writing walks the class descriptor.
///
/// ```rust
/// #[derive(Default)]
/// struct Phone {
///     kind: String,
///     number: String,
/// }
/// objson::defobject!(Phone);
/// ```
#[macro_export]
macro_rules! defobject {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::JsonValue for $ty {
            fn read(
                &mut self,
                reader: &mut $crate::Reader<'_>,
                _creator: ::core::option::Option<&mut $crate::CreateFn<'_>>,
                token: &$crate::Token,
            ) -> $crate::Result<()> {
                reader.read_class_into(self, token)
            }

            fn read_new(
                reader: &mut $crate::Reader<'_>,
                _creator: ::core::option::Option<&mut $crate::CreateFn<'_>>,
                token: &$crate::Token,
            ) -> $crate::Result<Self> {
                reader.read_class_new::<Self>(token)
            }

            fn write(&self, writer: &mut $crate::Writer<'_>) -> $crate::Result<()> {
                writer.write_class_value(self)
            }
        }
    )+};
}

/// Integer-codes a fieldless enum: writing emits the discriminant, reading
/// parses it back and fails with `InvalidValue` on an unknown code.
///
/// ```rust
/// #[derive(Clone, Copy, Default)]
/// enum Gender {
///     #[default]
///     Unknown,
///     Male,
///     Female,
/// }
/// objson::defenum!(Gender { Unknown, Male, Female });
/// ```
#[macro_export]
macro_rules! defenum {
    ($ty:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::JsonValue for $ty {
            fn read_new(
                reader: &mut $crate::Reader<'_>,
                _creator: ::core::option::Option<&mut $crate::CreateFn<'_>>,
                token: &$crate::Token,
            ) -> $crate::Result<Self> {
                let code = <i64 as $crate::JsonValue>::read_new(
                    reader,
                    ::core::option::Option::None,
                    token,
                )?;
                $(
                    if code == <$ty>::$variant as i64 {
                        return ::core::result::Result::Ok(<$ty>::$variant);
                    }
                )+
                ::core::result::Result::Err(
                    reader.unknown_enum_value(code, ::core::stringify!($ty)),
                )
            }

            fn write(&self, writer: &mut $crate::Writer<'_>) -> $crate::Result<()> {
                <i64 as $crate::JsonValue>::write(&(*self as i64), writer)
            }
        }
    };
}
