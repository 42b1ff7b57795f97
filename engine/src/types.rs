// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The static type information unit of the reflection: [`RobinType`].
//!
//! A `RobinType` is the union of the two type systems meeting at the
//! bridge: it can stand for a C intrinsic, a wrapped class passed by
//! pointer, a host container refined down to its element type, or a
//! purely internal stepping-stone such as a bounded numeric range.
//! Exactly one `RobinType` exists per descriptive parameter tuple, so
//! type identity is id equality; the registry enforces the interning.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::buffer::{ArgumentsBuffer, MachineWord};
use crate::conversion::table::ConversionProposer;
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{Adapter, HostValue};
use crate::reflection::class::ClassId;
use crate::reflection::enumerated::EnumId;
use robin_parser::IntrinsicKind;

/// Stable unique identity of a type, assigned in allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u64);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Intrinsic,
    Extended,
    UserDefined,
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Float,
    Double,
    Bool,
    CString,
    PascalString,
    Element,
    List,
    Dict,
    Object,
    Enumerated,
    Pointer,
}

/// Whether values of a type are a one-directional view.
///
/// A const reference may actually be a converted copy of the caller's
/// object, so writing through it must never be expected to reach the
/// original. Non-const conversions carry the extra obligation of copying
/// changes back, which only the in-place container conversions honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constness {
    Regular,
    ConstReference,
}

/// The parameterisation that distinguishes types sharing a spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeDetail {
    Plain,
    /// A class instance passed by value.
    Class(ClassId),
    /// The internal constructor-return type of a class.
    CreatorOf(ClassId),
    Enumerated(EnumId),
    PointerTo(TypeId),
    /// The one-directional view of another type.
    ConstOf(TypeId),
    /// `element == None` is the hyper-generic empty list.
    List { element: Option<TypeId> },
    /// `entry == None` is the hyper-generic empty dict.
    Dict { entry: Option<(TypeId, TypeId)> },
    /// An integer literal's range: fits any integer type with at least
    /// `max_bits` value bits (and a sign bit, unless `positive`).
    Bounded { max_bits: u32, positive: bool },
}

/// One-shot notifier that fires when the const variant of a type is
/// first created. Observers registered after the fact fire immediately.
#[derive(Default)]
pub struct TypeExistenceObservable {
    created: OnceCell<TypeId>,
    observers: RefCell<Vec<Box<dyn Fn(TypeId)>>>,
}

impl TypeExistenceObservable {
    pub fn observe(&self, observer: impl Fn(TypeId) + 'static) {
        match self.created.get() {
            Some(id) => observer(*id),
            None => self.observers.borrow_mut().push(Box::new(observer)),
        }
    }

    pub fn get(&self) -> Option<TypeId> {
        self.created.get().copied()
    }

    pub(crate) fn announce(&self, id: TypeId) {
        if self.created.set(id).is_err() {
            return; // fires at most once
        }
        let observers = std::mem::take(&mut *self.observers.borrow_mut());
        for observer in observers {
            observer(id);
        }
    }
}

/// A shared handle to a type. Identity is id equality.
pub type TypeHandle = Rc<RobinType>;

pub struct RobinType {
    id: TypeId,
    category: TypeCategory,
    spec: TypeSpec,
    name: String,
    constness: Constness,
    borrowed: bool,
    hyper_generic: bool,
    detail: TypeDetail,
    adapter: RefCell<Option<Rc<dyn Adapter>>>,
    proposer: OnceCell<Rc<dyn ConversionProposer>>,
    pointer_cache: OnceCell<TypeId>,
    const_announcer: TypeExistenceObservable,
}

impl RobinType {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TypeId,
        category: TypeCategory,
        spec: TypeSpec,
        name: String,
        constness: Constness,
        detail: TypeDetail,
        hyper_generic: bool,
        borrowed: bool,
    ) -> Self {
        RobinType {
            id,
            category,
            spec,
            name,
            constness,
            borrowed,
            hyper_generic,
            detail,
            adapter: RefCell::new(None),
            proposer: OnceCell::new(),
            pointer_cache: OnceCell::new(),
            const_announcer: TypeExistenceObservable::default(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    pub fn spec(&self) -> TypeSpec {
        self.spec
    }

    pub fn type_name(&self) -> &str {
        &self.name
    }

    pub fn detail(&self) -> TypeDetail {
        self.detail
    }

    pub fn is_constant(&self) -> Constness {
        self.constness
    }

    /// Whether this is a one-directional (const reference) view.
    pub fn is_reference(&self) -> bool {
        self.constness == Constness::ConstReference
    }

    pub fn is_borrowed(&self) -> bool {
        self.borrowed
    }

    /// Hyper-generic types stand for objects belonging to several
    /// subtypes at once (the empty list, recursively a list of empty
    /// lists). No static conversion edge may enter one, except a type's
    /// own const wrapper; that rule is what keeps proposer expansion
    /// from looping.
    pub fn is_hyper_generic(&self) -> bool {
        self.hyper_generic
    }

    /// Install the proposer which injects this type's dynamic conversion
    /// edges during route search. Set at most once.
    pub fn set_conversion_proposer(&self, proposer: Rc<dyn ConversionProposer>) {
        let already_set = self.proposer.set(proposer).is_err();
        debug_assert!(!already_set, "conversion proposer installed twice");
    }

    pub(crate) fn proposer(&self) -> Option<&Rc<dyn ConversionProposer>> {
        self.proposer.get()
    }

    /// Announces if/when the const variant of this type is added.
    pub fn const_type_addition_announcer(&self) -> &TypeExistenceObservable {
        &self.const_announcer
    }

    pub(crate) fn pointer_cache(&self) -> &OnceCell<TypeId> {
        &self.pointer_cache
    }

    /// Install the frontend-provided adapter for this type.
    pub fn assign_adapter(&self, adapter: Rc<dyn Adapter>) {
        *self.adapter.borrow_mut() = Some(adapter);
    }

    fn adapter(&self, engine: &Engine) -> Result<Rc<dyn Adapter>> {
        if let Some(adapter) = self.adapter.borrow().clone() {
            return Ok(adapter);
        }
        // Lazy install on first reference.
        let frontend = engine.frontend()?;
        match frontend.supply_adapter(engine, self) {
            Some(adapter) => {
                self.assign_adapter(adapter.clone());
                Ok(adapter)
            }
            None => Err(RobinError::UnsupportedInterface(self.name.clone())),
        }
    }

    /// Active translation, host value to argument word(s).
    pub fn put(
        &self,
        engine: &Engine,
        buffer: &mut ArgumentsBuffer,
        value: &HostValue,
    ) -> Result<()> {
        self.adapter(engine)?.put(buffer, value)
    }

    /// Active translation, returned word to host value.
    pub fn get(&self, engine: &Engine, word: MachineWord) -> Result<HostValue> {
        self.adapter(engine)?.get(word)
    }
}

impl fmt::Display for RobinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for RobinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RobinType({} {})", self.id, self.name)
    }
}

/// Arena of every type the engine knows, plus the interning maps that
/// guarantee one `RobinType` per descriptive parameter tuple.
pub struct TypeRegistry {
    all: RefCell<Vec<TypeHandle>>,
    lists: RefCell<HashMap<Option<TypeId>, TypeId>>,
    dicts: RefCell<HashMap<Option<(TypeId, TypeId)>, TypeId>>,
    consts: RefCell<HashMap<TypeId, TypeId>>,
    pointers: RefCell<HashMap<TypeId, TypeId>>,
}

impl TypeRegistry {
    pub(crate) fn new() -> Self {
        TypeRegistry {
            all: RefCell::new(Vec::new()),
            lists: RefCell::new(HashMap::new()),
            dicts: RefCell::new(HashMap::new()),
            consts: RefCell::new(HashMap::new()),
            pointers: RefCell::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: TypeId) -> TypeHandle {
        self.all.borrow()[id.0 as usize].clone()
    }

    pub fn len(&self) -> usize {
        self.all.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.borrow().is_empty()
    }

    pub(crate) fn insert(&self, build: impl FnOnce(TypeId) -> RobinType) -> TypeHandle {
        let mut all = self.all.borrow_mut();
        let id = TypeId(all.len() as u64);
        let handle = Rc::new(build(id));
        debug_assert_eq!(handle.id(), id);
        all.push(handle.clone());
        handle
    }

    fn intern<K: Hash + Eq>(
        &self,
        map: &RefCell<HashMap<K, TypeId>>,
        key: K,
        build: impl FnOnce(TypeId) -> RobinType,
    ) -> (TypeHandle, bool) {
        if let Some(id) = map.borrow().get(&key) {
            return (self.get(*id), false);
        }
        let handle = self.insert(build);
        map.borrow_mut().insert(key, handle.id());
        (handle, true)
    }

    pub(crate) fn intern_const(
        &self,
        base: TypeId,
        build: impl FnOnce(TypeId) -> RobinType,
    ) -> (TypeHandle, bool) {
        self.intern(&self.consts, base, build)
    }

    pub(crate) fn intern_list(
        &self,
        element: Option<TypeId>,
        build: impl FnOnce(TypeId) -> RobinType,
    ) -> (TypeHandle, bool) {
        self.intern(&self.lists, element, build)
    }

    pub(crate) fn intern_dict(
        &self,
        entry: Option<(TypeId, TypeId)>,
        build: impl FnOnce(TypeId) -> RobinType,
    ) -> (TypeHandle, bool) {
        self.intern(&self.dicts, entry, build)
    }

    pub(crate) fn intern_pointer(
        &self,
        base: TypeId,
        build: impl FnOnce(TypeId) -> RobinType,
    ) -> (TypeHandle, bool) {
        self.intern(&self.pointers, base, build)
    }

    pub(crate) fn const_of(&self, base: TypeId) -> Option<TypeId> {
        self.consts.borrow().get(&base).copied()
    }

    /// All fully-parameterised list types currently known: the targets a
    /// list proposer may offer. Hyper-generic lists are excluded, since
    /// nothing may convert *into* them.
    pub(crate) fn concrete_list_types(&self) -> Vec<TypeHandle> {
        self.lists
            .borrow()
            .iter()
            .filter(|(element, _)| element.is_some())
            .map(|(_, id)| self.get(*id))
            .filter(|t| !t.is_hyper_generic())
            .collect()
    }

    pub(crate) fn concrete_dict_types(&self) -> Vec<TypeHandle> {
        self.dicts
            .borrow()
            .iter()
            .filter(|(entry, _)| entry.is_some())
            .map(|(_, id)| self.get(*id))
            .filter(|t| !t.is_hyper_generic())
            .collect()
    }
}

/// The preconstructed intrinsic and extended types.
pub struct Intrinsics {
    pub int_: TypeHandle,
    pub uint: TypeHandle,
    pub long_: TypeHandle,
    pub ulong: TypeHandle,
    pub longlong: TypeHandle,
    pub ulonglong: TypeHandle,
    pub short_: TypeHandle,
    pub ushort: TypeHandle,
    pub char_: TypeHandle,
    pub schar: TypeHandle,
    pub uchar: TypeHandle,
    pub float_: TypeHandle,
    pub double_: TypeHandle,
    pub bool_: TypeHandle,
    pub cstring: TypeHandle,
    pub pascal_string: TypeHandle,
    pub element: TypeHandle,
    pub element_borrowed: TypeHandle,
}

impl Intrinsics {
    pub(crate) fn create(registry: &TypeRegistry) -> Self {
        let scalar = |spec: TypeSpec, name: &str| {
            registry.insert(|id| {
                RobinType::new(
                    id,
                    TypeCategory::Intrinsic,
                    spec,
                    name.to_string(),
                    Constness::Regular,
                    TypeDetail::Plain,
                    false,
                    false,
                )
            })
        };
        let extended = |spec: TypeSpec, name: &str, borrowed: bool| {
            registry.insert(|id| {
                RobinType::new(
                    id,
                    TypeCategory::Extended,
                    spec,
                    name.to_string(),
                    Constness::Regular,
                    TypeDetail::Plain,
                    false,
                    borrowed,
                )
            })
        };
        Intrinsics {
            int_: scalar(TypeSpec::Int, "int"),
            uint: scalar(TypeSpec::UInt, "unsigned int"),
            long_: scalar(TypeSpec::Long, "long"),
            ulong: scalar(TypeSpec::ULong, "unsigned long"),
            longlong: scalar(TypeSpec::LongLong, "long long"),
            ulonglong: scalar(TypeSpec::ULongLong, "unsigned long long"),
            short_: scalar(TypeSpec::Short, "short"),
            ushort: scalar(TypeSpec::UShort, "unsigned short"),
            char_: scalar(TypeSpec::Char, "char"),
            schar: scalar(TypeSpec::SChar, "signed char"),
            uchar: scalar(TypeSpec::UChar, "unsigned char"),
            float_: scalar(TypeSpec::Float, "float"),
            double_: scalar(TypeSpec::Double, "double"),
            bool_: scalar(TypeSpec::Bool, "bool"),
            cstring: extended(TypeSpec::CString, "*char", false),
            pascal_string: extended(TypeSpec::PascalString, "string", false),
            element: extended(TypeSpec::Element, "scripting_element", false),
            element_borrowed: extended(TypeSpec::Element, "&scripting_element", true),
        }
    }

    pub fn for_kind(&self, kind: IntrinsicKind) -> TypeHandle {
        match kind {
            IntrinsicKind::Int => self.int_.clone(),
            IntrinsicKind::UInt => self.uint.clone(),
            IntrinsicKind::Long => self.long_.clone(),
            IntrinsicKind::ULong => self.ulong.clone(),
            IntrinsicKind::LongLong => self.longlong.clone(),
            IntrinsicKind::ULongLong => self.ulonglong.clone(),
            IntrinsicKind::Short => self.short_.clone(),
            IntrinsicKind::UShort => self.ushort.clone(),
            IntrinsicKind::Char => self.char_.clone(),
            IntrinsicKind::SChar => self.schar.clone(),
            IntrinsicKind::UChar => self.uchar.clone(),
            IntrinsicKind::Float => self.float_.clone(),
            IntrinsicKind::Double => self.double_.clone(),
            IntrinsicKind::Bool => self.bool_.clone(),
        }
    }

    /// The integer targets an integral literal may promote to, narrowest
    /// first, the signed variant of each width before the unsigned one.
    /// Digit counts assume the LP64 model.
    pub(crate) fn integer_order(&self) -> Vec<(TypeHandle, u32, bool)> {
        vec![
            (self.short_.clone(), 15, true),
            (self.ushort.clone(), 16, false),
            (self.int_.clone(), 31, true),
            (self.uint.clone(), 32, false),
            (self.long_.clone(), 63, true),
            (self.ulong.clone(), 64, false),
            (self.longlong.clone(), 63, true),
            (self.ulonglong.clone(), 64, false),
        ]
    }
}
