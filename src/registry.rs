use crate::de::{Reader, Token};
use crate::error::{Error, ErrorHandler, ErrorKind, Result};
use crate::ser::Writer;
use crate::value::{DynObj, JsonValue, Obj};
use indexmap::IndexMap;
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;

pub(crate) type ReadFn = dyn Fn(&mut Reader<'_>, &mut dyn Any, &Token) -> Result<()>;
pub(crate) type WriteFn = dyn Fn(&mut Writer<'_>, &dyn Any) -> Result<()>;
type UpcastRef = dyn Fn(&dyn Any) -> Option<&dyn Any>;
type UpcastMut = dyn Fn(&mut dyn Any) -> Option<&mut dyn Any>;
type WithRef = dyn Fn(&DynObj, &mut dyn FnMut(&dyn Any) -> Result<()>) -> Option<Result<()>>;
type WithMut = dyn Fn(&DynObj, &mut dyn FnMut(&mut dyn Any) -> Result<()>) -> Option<Result<()>>;

pub(crate) struct Member {
    pub name: String,
    /// Custom members emit their own `"name": ` prefix on write.
    pub custom: bool,
    pub read: Box<ReadFn>,
    pub write: Box<WriteFn>,
}

pub(crate) struct Super {
    pub class: usize,
    pub upcast: Box<UpcastRef>,
    pub upcast_mut: Box<UpcastMut>,
}

/// Runtime description of one registered class: name, type key, ordered
/// members, superclasses in declaration order, construction and hooks.
pub struct Class {
    name: String,
    pub(crate) key: TypeId,
    make_handle: Option<Box<dyn Fn() -> DynObj>>,
    make_value: Option<Box<dyn Fn() -> Box<dyn Any>>>,
    pub(crate) members: IndexMap<String, Member>,
    pub(crate) supers: Vec<Super>,
    post_read: Option<Box<dyn Fn(&mut dyn Any)>>,
    post_write: Option<Box<dyn Fn(&dyn Any)>>,
    pub(crate) with_ref: Box<WithRef>,
    pub(crate) with_mut: Box<WithMut>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abstract classes have no constructor thunk and cannot be materialized
    /// from JSON.
    pub fn is_abstract(&self) -> bool {
        self.make_handle.is_none()
    }

    pub(crate) fn instantiate(&self) -> Option<DynObj> {
        self.make_handle.as_ref().map(|make| make())
    }

    pub(crate) fn instantiate_value(&self) -> Option<Box<dyn Any>> {
        self.make_value.as_ref().map(|make| make())
    }

    pub(crate) fn post_read(&self, obj: &mut dyn Any) {
        if let Some(hook) = &self.post_read {
            hook(obj);
        }
    }

    pub(crate) fn post_write(&self, obj: &dyn Any) {
        if let Some(hook) = &self.post_write {
            hook(obj);
        }
    }
}

/// The set of classes known to an engine. Populated once through
/// [`defclass`](Registry::defclass) chains, then treated as read-only by any
/// number of engines.
///
/// Registration errors are sticky: the first one is kept, reported through
/// the handler (or `log::error!`), and engine operations against an errored
/// registry fail fast with it.
#[derive(Default)]
pub struct Registry {
    classes: Vec<Class>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
    error: Option<Error>,
    handler: Option<ErrorHandler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(handler: ErrorHandler) -> Self {
        Registry {
            handler: Some(handler),
            ..Self::default()
        }
    }

    /// The sticky registration error, if any builder call failed.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Class> {
        self.index_by_name(name).map(|idx| &self.classes[idx])
    }

    pub fn lookup_by_type(&self, key: TypeId) -> Option<&Class> {
        self.index_by_type(key).map(|idx| &self.classes[idx])
    }

    /// Registers a class constructible with `Default`.
    pub fn defclass<T: Any + Default>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        self.defclass_with(name, Some(T::default as fn() -> T))
    }

    /// Registers a class with an explicit constructor thunk, or an abstract
    /// class when `make` is `None`.
    pub fn defclass_with<T: Any>(
        &mut self,
        name: &str,
        make: Option<fn() -> T>,
    ) -> ClassBuilder<'_, T> {
        if self.by_name.contains_key(name) {
            self.record(Error::register(
                ErrorKind::RedefinedClass,
                format!("class '{}'", name),
            ));
            return ClassBuilder {
                registry: self,
                idx: None,
                _owner: PhantomData,
            };
        }
        let class = Class {
            name: name.to_owned(),
            key: TypeId::of::<T>(),
            make_handle: make
                .map(|make| Box::new(move || DynObj::new(make())) as Box<dyn Fn() -> DynObj>),
            make_value: make.map(|make| {
                Box::new(move || Box::new(make()) as Box<dyn Any>) as Box<dyn Fn() -> Box<dyn Any>>
            }),
            members: IndexMap::new(),
            supers: Vec::new(),
            post_read: None,
            post_write: None,
            with_ref: Box::new(|obj: &DynObj, body| {
                obj.cell
                    .downcast_ref::<RefCell<T>>()
                    .map(|cell| body(&*cell.borrow()))
            }),
            with_mut: Box::new(|obj: &DynObj, body| {
                obj.cell
                    .downcast_ref::<RefCell<T>>()
                    .map(|cell| body(&mut *cell.borrow_mut()))
            }),
        };
        let idx = self.classes.len();
        self.classes.push(class);
        self.by_name.insert(name.to_owned(), idx);
        self.by_type.insert(TypeId::of::<T>(), idx);
        ClassBuilder {
            registry: self,
            idx: Some(idx),
            _owner: PhantomData,
        }
    }

    pub(crate) fn index_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn index_by_type(&self, key: TypeId) -> Option<usize> {
        self.by_type.get(&key).copied()
    }

    pub(crate) fn class_at(&self, idx: usize) -> &Class {
        &self.classes[idx]
    }

    pub(crate) fn name_by_type(&self, key: TypeId) -> Option<&str> {
        self.lookup_by_type(key).map(Class::name)
    }

    /// Reflexive transitive subclass test over declared `extends` entries.
    pub(crate) fn is_subclass(&self, derived: TypeId, base: TypeId) -> bool {
        if derived == base {
            return true;
        }
        match (self.index_by_type(derived), self.index_by_type(base)) {
            (Some(d), Some(b)) => self.index_is_subclass(d, b),
            _ => false,
        }
    }

    fn index_is_subclass(&self, derived: usize, base: usize) -> bool {
        derived == base
            || self.classes[derived]
                .supers
                .iter()
                .any(|sup| self.index_is_subclass(sup.class, base))
    }

    /// Reads one member into `obj`: own members first, then superclasses in
    /// declared order through their upcasts. First match wins.
    pub(crate) fn read_member_walk(
        &self,
        idx: usize,
        reader: &mut Reader<'_>,
        obj: &mut dyn Any,
        name: &str,
        token: &Token,
    ) -> Result<bool> {
        let class = &self.classes[idx];
        if let Some(member) = class.members.get(name) {
            (member.read)(reader, obj, token)?;
            return Ok(true);
        }
        for sup in &class.supers {
            let Some(base) = (sup.upcast_mut)(obj) else {
                return Err(reader.descriptor_mismatch());
            };
            if self.read_member_walk(sup.class, reader, base, name, token)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Emits all members of `obj`: inherited members first (superclasses in
    /// declared order), then own members. The order is part of the format.
    pub(crate) fn write_members(
        &self,
        idx: usize,
        writer: &mut Writer<'_>,
        obj: &dyn Any,
    ) -> Result<()> {
        let class = &self.classes[idx];
        for sup in &class.supers {
            let Some(base) = (sup.upcast)(obj) else {
                return Err(writer.descriptor_mismatch());
            };
            self.write_members(sup.class, writer, base)?;
        }
        for member in class.members.values() {
            writer.begin_member(&member.name, member.custom)?;
            (member.write)(writer, obj)?;
            // custom members separate themselves in write_member; one that
            // emitted nothing must not leave a comma behind
            if !member.custom {
                writer.end_member();
            }
        }
        Ok(())
    }

    /// True when `name` exists in the effective (own + inherited) member set.
    fn member_exists(&self, idx: usize, name: &str) -> bool {
        let class = &self.classes[idx];
        class.members.contains_key(name)
            || class
                .supers
                .iter()
                .any(|sup| self.member_exists(sup.class, name))
    }

    /// First member name of `sup` (effective set) that collides with an own
    /// member of `idx`.
    fn member_clash(&self, idx: usize, sup: usize) -> Option<String> {
        let class = &self.classes[sup];
        for name in class.members.keys() {
            if self.classes[idx].members.contains_key(name) {
                return Some(name.clone());
            }
        }
        class
            .supers
            .iter()
            .find_map(|s| self.member_clash(idx, s.class))
    }

    fn record(&mut self, error: Error) {
        match &self.handler {
            Some(handler) => handler(&error),
            None => log::error!("{error}"),
        }
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Fluent declaration of one class's superclasses, members and hooks.
/// Returned by [`Registry::defclass`]; after a registration error the builder
/// goes inert and further calls are ignored.
pub struct ClassBuilder<'r, T: Any> {
    registry: &'r mut Registry,
    idx: Option<usize>,
    _owner: PhantomData<fn() -> T>,
}

impl<T: Any> ClassBuilder<'_, T> {
    fn class_name(&self, idx: usize) -> String {
        self.registry.classes[idx].name.clone()
    }

    fn add_member(self, name: &str, member: Member) -> Self {
        let Some(idx) = self.idx else {
            return self;
        };
        if self.registry.member_exists(idx, name) {
            let class = self.class_name(idx);
            self.registry.record(Error::register(
                ErrorKind::RedefinedMember,
                format!("member '{}' of class '{}'", name, class),
            ));
            return self;
        }
        self.registry.classes[idx]
            .members
            .insert(name.to_owned(), member);
        self
    }

    /// Declares a superclass through its upcast accessors. Superclasses must
    /// be registered first; multiple bases are declared in inheritance order.
    /// The upcast pair is also the static proof that `S` is a base portion
    /// of `T`.
    pub fn extends<S: Any>(
        self,
        upcast: fn(&T) -> &S,
        upcast_mut: fn(&mut T) -> &mut S,
    ) -> Self {
        let Some(idx) = self.idx else {
            return self;
        };
        let class = self.class_name(idx);
        if TypeId::of::<S>() == TypeId::of::<T>() {
            self.registry.record(Error::register(
                ErrorKind::RedefinedSuperclass,
                format!("class '{}' cannot extend itself", class),
            ));
            return self;
        }
        let Some(sup_idx) = self.registry.index_by_type(TypeId::of::<S>()) else {
            self.registry.record(Error::register(
                ErrorKind::UnknownSuperclass,
                format!("superclass '{}' of class '{}'", type_name::<S>(), class),
            ));
            return self;
        };
        if self.registry.classes[idx]
            .supers
            .iter()
            .any(|sup| sup.class == sup_idx)
        {
            let sup_name = self.class_name(sup_idx);
            self.registry.record(Error::register(
                ErrorKind::RedefinedSuperclass,
                format!("superclass '{}' of class '{}'", sup_name, class),
            ));
            return self;
        }
        if let Some(member) = self.registry.member_clash(idx, sup_idx) {
            self.registry.record(Error::register(
                ErrorKind::RedefinedMember,
                format!("member '{}' of class '{}'", member, class),
            ));
            return self;
        }
        self.registry.classes[idx].supers.push(Super {
            class: sup_idx,
            upcast: Box::new(move |obj: &dyn Any| {
                obj.downcast_ref::<T>().map(|t| upcast(t) as &dyn Any)
            }),
            upcast_mut: Box::new(move |obj: &mut dyn Any| {
                obj.downcast_mut::<T>().map(|t| upcast_mut(t) as &mut dyn Any)
            }),
        });
        self
    }

    /// Declares a direct field member through a borrow/borrow-mut accessor
    /// pair.
    pub fn member<V: JsonValue>(
        self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> Self {
        let member = Member {
            name: name.to_owned(),
            custom: false,
            read: Box::new(move |reader: &mut Reader<'_>, obj: &mut dyn Any, token: &Token| match obj
                .downcast_mut::<T>()
            {
                Some(owner) => get_mut(owner).read(reader, None, token),
                None => Err(reader.descriptor_mismatch()),
            }),
            write: Box::new(move |writer: &mut Writer<'_>, obj: &dyn Any| match obj.downcast_ref::<T>() {
                Some(owner) => get(owner).write(writer),
                None => Err(writer.descriptor_mismatch()),
            }),
        };
        self.add_member(name, member)
    }

    /// Declares a member through a setter/getter pair with a temporary, for
    /// fields that cannot be borrowed directly.
    pub fn member_with<V: JsonValue>(
        self,
        name: &str,
        set: fn(&mut T, V),
        get: fn(&T) -> V,
    ) -> Self {
        let member = Member {
            name: name.to_owned(),
            custom: false,
            read: Box::new(move |reader: &mut Reader<'_>, obj: &mut dyn Any, token: &Token| match obj
                .downcast_mut::<T>()
            {
                Some(owner) => {
                    let value = V::read_new(reader, None, token)?;
                    set(owner, value);
                    Ok(())
                }
                None => Err(reader.descriptor_mismatch()),
            }),
            write: Box::new(move |writer: &mut Writer<'_>, obj: &dyn Any| match obj.downcast_ref::<T>() {
                Some(owner) => get(owner).write(writer),
                None => Err(writer.descriptor_mismatch()),
            }),
        };
        self.add_member(name, member)
    }

    /// Declares a static or global value as a member. It does not consult the
    /// owning object and repeats in every instance by design.
    pub fn member_static<V: JsonValue>(
        self,
        name: &str,
        get: fn() -> V,
        set: fn(V),
    ) -> Self {
        let member = Member {
            name: name.to_owned(),
            custom: false,
            read: Box::new(move |reader: &mut Reader<'_>, _obj: &mut dyn Any, token: &Token| {
                set(V::read_new(reader, None, token)?);
                Ok(())
            }),
            write: Box::new(move |writer: &mut Writer<'_>, _obj: &dyn Any| get().write(writer)),
        };
        self.add_member(name, member)
    }

    /// Declares a handle-valued member whose pointees are produced by
    /// `creator` instead of the class constructor — for pointee classes
    /// without a usable default construction. The creator is also applied to
    /// container elements when `V` is a container of handles.
    pub fn member_created<V: JsonValue, P: Any>(
        self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
        creator: impl Fn(&mut T) -> Obj<P> + 'static,
    ) -> Self {
        let member = Member {
            name: name.to_owned(),
            custom: false,
            read: Box::new(move |reader: &mut Reader<'_>, obj: &mut dyn Any, token: &Token| {
                let Some(owner) = obj.downcast_mut::<T>() else {
                    return Err(reader.descriptor_mismatch());
                };
                let mut make = || creator(owner).erase();
                let value = V::read_new(reader, Some(&mut make), token)?;
                *get_mut(owner) = value;
                Ok(())
            }),
            write: Box::new(move |writer: &mut Writer<'_>, obj: &dyn Any| match obj.downcast_ref::<T>() {
                Some(owner) => get(owner).write(writer),
                None => Err(writer.descriptor_mismatch()),
            }),
        };
        self.add_member(name, member)
    }

    /// Declares a member serialized by user callables. The write callable
    /// must emit its own name through [`Writer::write_member`]; it may emit
    /// several logical members or none.
    pub fn member_custom(
        self,
        name: &str,
        read: impl Fn(&mut T, &mut Reader<'_>, &Token) -> Result<()> + 'static,
        write: impl Fn(&T, &mut Writer<'_>) -> Result<()> + 'static,
    ) -> Self {
        let member = Member {
            name: name.to_owned(),
            custom: true,
            read: Box::new(move |reader: &mut Reader<'_>, obj: &mut dyn Any, token: &Token| match obj
                .downcast_mut::<T>()
            {
                Some(owner) => read(owner, reader, token),
                None => Err(reader.descriptor_mismatch()),
            }),
            write: Box::new(move |writer: &mut Writer<'_>, obj: &dyn Any| match obj.downcast_ref::<T>() {
                Some(owner) => write(owner, writer),
                None => Err(writer.descriptor_mismatch()),
            }),
        };
        self.add_member(name, member)
    }

    /// Installs a hook called once an object has been fully read.
    pub fn postread(self, hook: impl Fn(&mut T) + 'static) -> Self {
        if let Some(idx) = self.idx {
            self.registry.classes[idx].post_read = Some(Box::new(move |obj| {
                if let Some(owner) = obj.downcast_mut::<T>() {
                    hook(owner);
                }
            }));
        }
        self
    }

    /// Installs a hook called once an object has been fully written.
    pub fn postwrite(self, hook: impl Fn(&T) + 'static) -> Self {
        if let Some(idx) = self.idx {
            self.registry.classes[idx].post_write = Some(Box::new(move |obj| {
                if let Some(owner) = obj.downcast_ref::<T>() {
                    hook(owner);
                }
            }));
        }
        self
    }
}
