use crate::de::{Reader, Token};
use crate::error::Result;
use crate::ser::Writer;
use crate::value::{CreateFn, JsonValue};
use std::any::{type_name, Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Shared, mutable handle to an object of exactly `T`.
///
/// Handles are the unit of graph identity: two clones of the same `Obj` are
/// the same node, written once under sharing and referenced by id afterwards.
/// The pointee is heap-boxed, so its address is stable for the whole life of
/// the graph regardless of the containers the handle sits in.
pub struct Obj<T>(Rc<RefCell<T>>);

impl<T> Clone for Obj<T> {
    fn clone(&self) -> Self {
        Obj(self.0.clone())
    }
}

impl<T: Any> Obj<T> {
    pub fn new(value: T) -> Self {
        Obj(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Node identity: true when both handles designate the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Erases the static type, keeping the runtime class tag.
    pub fn erase(&self) -> DynObj {
        DynObj {
            cell: self.0.clone() as Rc<dyn Any>,
            key: TypeId::of::<T>(),
        }
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T: Default + Any> Default for Obj<T> {
    fn default() -> Self {
        Obj::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Obj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(value) => write!(f, "Obj({:?})", &*value),
            Err(_) => f.write_str("Obj(<borrowed>)"),
        }
    }
}

impl<T: Any> JsonValue for Obj<T> {
    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        if token.is_null() {
            return Err(reader.invalid_value("null for a non-nullable reference".to_owned()));
        }
        let erased = reader.read_shared(token, TypeId::of::<T>(), type_name::<T>(), creator)?;
        erased
            .downcast::<T>()
            .ok_or_else(|| reader.class_cast_error(&erased, type_name::<T>()))
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_shared(&self.erase(), TypeId::of::<T>(), type_name::<T>())
    }
}

/// Type-erased shared handle: the erased cell plus the runtime class key
/// pinned when the object was created.
#[derive(Clone)]
pub struct DynObj {
    pub(crate) cell: Rc<dyn Any>,
    pub(crate) key: TypeId,
}

impl DynObj {
    pub fn new<T: Any>(value: T) -> Self {
        Obj::new(value).erase()
    }

    /// Runtime class key, as registered with the registry.
    pub fn key(&self) -> TypeId {
        self.key
    }

    pub fn downcast<T: Any>(&self) -> Option<Obj<T>> {
        self.cell.clone().downcast::<RefCell<T>>().ok().map(Obj)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }
}

impl fmt::Debug for DynObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynObj").field("key", &self.key).finish()
    }
}

/// Polymorphic field handle: holds `B` or any registered class extending `B`.
///
/// `B` is the static field type; when the runtime class differs, the writer
/// emits an `@class` marker and the reader reconstitutes the runtime class.
pub struct Dyn<B: Any> {
    inner: DynObj,
    _base: PhantomData<fn() -> B>,
}

impl<B: Any> Dyn<B> {
    /// Wraps a handle. The relation of `D` to `B` is checked against the
    /// registry when the value is read or written.
    pub fn new<D: Any>(object: Obj<D>) -> Self {
        Dyn {
            inner: object.erase(),
            _base: PhantomData,
        }
    }

    pub fn key(&self) -> TypeId {
        self.inner.key
    }

    pub fn is<D: Any>(&self) -> bool {
        self.inner.key == TypeId::of::<D>()
    }

    pub fn downcast<D: Any>(&self) -> Option<Obj<D>> {
        self.inner.downcast()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.address() == other.inner.address()
    }
}

impl<B: Any> Clone for Dyn<B> {
    fn clone(&self) -> Self {
        Dyn {
            inner: self.inner.clone(),
            _base: PhantomData,
        }
    }
}

impl<B: Any> fmt::Debug for Dyn<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dyn<{}>", type_name::<B>())
    }
}

impl<B: Any> JsonValue for Dyn<B> {
    fn read_new(
        reader: &mut Reader<'_>,
        creator: Option<&mut CreateFn<'_>>,
        token: &Token,
    ) -> Result<Self> {
        if token.is_null() {
            return Err(reader.invalid_value("null for a non-nullable reference".to_owned()));
        }
        let erased = reader.read_shared(token, TypeId::of::<B>(), type_name::<B>(), creator)?;
        reader.check_extends(&erased, TypeId::of::<B>(), type_name::<B>())?;
        Ok(Dyn {
            inner: erased,
            _base: PhantomData,
        })
    }

    fn write(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_shared(&self.inner, TypeId::of::<B>(), type_name::<B>())
    }
}
