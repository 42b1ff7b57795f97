// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A wrapped native class: constructors, destructor, methods,
//! inheritance.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::raw::c_void;
use std::rc::Rc;

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;

use crate::buffer::{ArgumentsBuffer, MachineWord};
use crate::conversion::{Conversion, ConversionKind, Weight};
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{Adapter, HostValue};
use crate::reflection::cfunction::{CFunction, Signature};
use crate::reflection::instance::Instance;
use crate::reflection::method::CallableWithInstance;
use crate::reflection::namespace::Namespace;
use crate::reflection::overloaded_set::{KeywordArguments, OverloadedSet};
use crate::types::{Constness, RobinType, TypeCategory, TypeDetail, TypeHandle, TypeSpec};
use robin_parser::UpcastFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub usize);

/// What a constructor symbol hands back: the raw pointer of the object
/// it just created.
pub(crate) struct CreatedInstance {
    pub(crate) object: *mut c_void,
}

/// The adapter of the internal creator-return type. It only ever sits
/// in return position; constructors have no business receiving one.
struct CreatedInstanceAdapter;

impl Adapter for CreatedInstanceAdapter {
    fn put(&self, _buffer: &mut ArgumentsBuffer, _value: &HostValue) -> Result<()> {
        Err(RobinError::UnsupportedInterface(
            "creator return type used as argument".to_string(),
        ))
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(Rc::new(CreatedInstance {
            object: word as *mut c_void,
        }))
    }
}

/// A class of the wrapped library.
///
/// Owns the four canonical types instances travel through (`T*`, const
/// `T&`, `T` by value, and the internal creator-return type), the
/// constructor overload set (whose return type is pinned to
/// creator-return), the optional destructor, the instance method map and
/// the base-class list. Methods of bases are merged in at lookup time,
/// so inheritance declared after a method is still honored.
pub struct Class {
    id: ClassId,
    name: String,
    value_type: OnceCell<TypeHandle>,
    ptr_type: OnceCell<TypeHandle>,
    ref_type: OnceCell<TypeHandle>,
    creator_type: OnceCell<TypeHandle>,
    constructors: Rc<OverloadedSet>,
    has_constructors: Cell<bool>,
    destructor: RefCell<Option<Rc<CFunction>>>,
    methods: RefCell<IndexMap<String, Rc<OverloadedSet>>>,
    bases: RefCell<Vec<ClassId>>,
    /// Methods merged with base classes, built on first lookup.
    merged_methods: RefCell<HashMap<String, Rc<OverloadedSet>>>,
    /// Static members and inner classes.
    inner: Rc<Namespace>,
    /// Pure virtual prototypes, dispatched through an interceptor.
    interface_methods: RefCell<IndexMap<String, Rc<Signature>>>,
}

impl Class {
    pub(crate) fn new(name: String, id: ClassId) -> Self {
        let constructors = OverloadedSet::create_new(format!("{}::{}", name, name));
        Class {
            id,
            name,
            value_type: OnceCell::new(),
            ptr_type: OnceCell::new(),
            ref_type: OnceCell::new(),
            creator_type: OnceCell::new(),
            constructors,
            has_constructors: Cell::new(false),
            destructor: RefCell::new(None),
            methods: RefCell::new(IndexMap::new()),
            bases: RefCell::new(Vec::new()),
            merged_methods: RefCell::new(HashMap::new()),
            inner: Namespace::new("<class>"),
            interface_methods: RefCell::new(IndexMap::new()),
        }
    }

    /// Build the canonical types. Instances detect as `T*`; stepping to
    /// the reference or by-value forms is free of actual work.
    pub(crate) fn activate(&self, engine: &Engine) {
        let value = engine.types().insert(|id| {
            RobinType::new(
                id,
                TypeCategory::UserDefined,
                TypeSpec::Object,
                self.name.clone(),
                Constness::Regular,
                TypeDetail::Class(self.id),
                false,
                false,
            )
        });
        let ptr = engine.pointer_type_of(&value);
        let reference = engine.const_type_of(&value);
        let creator = engine.types().insert(|id| {
            RobinType::new(
                id,
                TypeCategory::UserDefined,
                TypeSpec::Object,
                format!("created {}", self.name),
                Constness::Regular,
                TypeDetail::CreatorOf(self.id),
                false,
                false,
            )
        });
        creator.assign_adapter(Rc::new(CreatedInstanceAdapter));

        log::debug!("// @REGISTER: {}* == {}", self.name, ptr.id());

        engine.conversions().register_conversion(
            engine,
            Conversion::new(
                ptr.id(),
                reference.id(),
                Weight::new(1, 0, 0, 0),
                ConversionKind::Trivial,
            ),
        );
        engine.conversions().register_conversion(
            engine,
            Conversion::new(
                ptr.id(),
                value.id(),
                Weight::new(1, 0, 0, 0),
                ConversionKind::Trivial,
            ),
        );

        self.value_type.set(value).ok();
        self.ptr_type.set(ptr).ok();
        self.ref_type.set(reference).ok();
        self.creator_type.set(creator).ok();
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    /// The class's unique name, qualified with any containing namespace.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `T` passed by value.
    pub fn value_type(&self) -> TypeHandle {
        self.value_type.get().expect("class not activated").clone()
    }

    /// `T*`.
    pub fn ptr_type(&self) -> TypeHandle {
        self.ptr_type.get().expect("class not activated").clone()
    }

    /// `const T&`.
    pub fn ref_type(&self) -> TypeHandle {
        self.ref_type.get().expect("class not activated").clone()
    }

    /// The internal constructor-return type.
    pub fn creator_type(&self) -> TypeHandle {
        self.creator_type.get().expect("class not activated").clone()
    }

    /// Static methods, static data and inner classes live here.
    pub fn inner_namespace(&self) -> &Rc<Namespace> {
        &self.inner
    }

    /// Whether nothing has been registered on this class yet; used to
    /// avoid double loading when two libraries carry the same class.
    pub fn is_empty(&self) -> bool {
        self.methods.borrow().is_empty()
            && !self.has_constructors.get()
            && self.bases.borrow().is_empty()
    }

    pub fn add_constructor(&self, engine: &Engine, constructor: Rc<CFunction>) {
        self.constructors.add_alternative(engine, constructor);
        self.has_constructors.set(true);
    }

    pub fn constructors(&self) -> &Rc<OverloadedSet> {
        &self.constructors
    }

    pub fn set_destructor(&self, destructor: Rc<CFunction>) {
        *self.destructor.borrow_mut() = Some(destructor);
    }

    pub fn destructor(&self) -> Option<Rc<CFunction>> {
        self.destructor.borrow().clone()
    }

    pub fn add_instance_method(&self, engine: &Engine, name: &str, method: Rc<CFunction>) {
        let mut methods = self.methods.borrow_mut();
        let set = methods
            .entry(name.to_string())
            .or_insert_with(|| OverloadedSet::create_new(format!("{}::{}", self.name, name)))
            .clone();
        drop(methods);
        set.add_alternative(engine, method);
        self.merged_methods.borrow_mut().clear();
    }

    /// Declare a base class. The frontend-supplied `upcast` callback
    /// adjusts the instance pointer (multiple inheritance may offset
    /// it); one conversion is registered for the pointer form and one
    /// for the const reference form, each costing a single up-cast.
    pub fn inherit(&self, engine: &Engine, base: &Rc<Class>, upcast: Option<UpcastFn>) {
        self.bases.borrow_mut().push(base.id());
        self.merged_methods.borrow_mut().clear();

        if let Some(adjust) = upcast {
            engine.conversions().register_conversion(
                engine,
                Conversion::new(
                    self.ptr_type().id(),
                    base.ptr_type().id(),
                    Weight::new(0, 0, 1, 0),
                    ConversionKind::UpCast { adjust },
                ),
            );
            engine.conversions().register_conversion(
                engine,
                Conversion::new(
                    self.ref_type().id(),
                    base.ref_type().id(),
                    Weight::new(0, 0, 1, 0),
                    ConversionKind::UpCast { adjust },
                ),
            );
        }
    }

    pub fn bases(&self) -> Vec<ClassId> {
        self.bases.borrow().clone()
    }

    /// Whether an instance method by this name exists here or in any
    /// base.
    pub fn has_instance_method(&self, engine: &Engine, name: &str) -> bool {
        self.lookup_instance_method(engine, name).is_some()
    }

    /// Search a method by name in this class and, recursively, its
    /// bases. Overload sets found along distinct base paths are merged
    /// into one; the merge is cached per name.
    pub fn lookup_instance_method(
        &self,
        engine: &Engine,
        name: &str,
    ) -> Option<Rc<OverloadedSet>> {
        if let Some(own) = self.methods.borrow().get(name) {
            return Some(own.clone());
        }
        if let Some(merged) = self.merged_methods.borrow().get(name) {
            return Some(merged.clone());
        }

        let mut found: Vec<Rc<OverloadedSet>> = Vec::new();
        for base in self.bases.borrow().iter() {
            if let Some(up) = engine.class(*base).lookup_instance_method(engine, name) {
                found.push(up);
            }
        }
        let merged = match found.len() {
            0 => return None,
            1 => found.pop().unwrap(),
            _ => {
                // Several bases contribute: combine all alternatives.
                let combined = OverloadedSet::create_new(format!("{}::{}", self.name, name));
                for set in &found {
                    combined.add_alternatives(engine, set);
                }
                combined
            }
        };
        self.merged_methods
            .borrow_mut()
            .insert(name.to_string(), merged.clone());
        Some(merged)
    }

    /// The named method as a callable expecting an instance.
    pub fn find_instance_method(
        &self,
        engine: &Engine,
        name: &str,
    ) -> Result<CallableWithInstance> {
        self.lookup_instance_method(engine, name)
            .map(CallableWithInstance::new)
            .ok_or_else(|| RobinError::NoSuchMethod {
                class: self.name.clone(),
                method: name.to_string(),
            })
    }

    /// Names of methods declared directly on this class.
    pub fn list_methods(&self) -> Vec<String> {
        self.methods.borrow().keys().cloned().collect()
    }

    /// Names of methods including inherited ones, deduplicated.
    pub fn list_methods_recursive(&self, engine: &Engine) -> Vec<String> {
        let mut names = self.list_methods();
        for base in self.bases.borrow().iter() {
            for name in engine.class(*base).list_methods_recursive(engine) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Construct an instance: dispatch the constructor overload set and
    /// wrap the created pointer as an owned [`Instance`].
    pub fn create_instance(
        &self,
        engine: &Engine,
        args: &[HostValue],
        kwargs: &KeywordArguments,
    ) -> Result<HostValue> {
        if !self.has_constructors.get() {
            return Err(RobinError::NoConstructorsAtAll(self.name.clone()));
        }
        match self.constructors.call(engine, args, kwargs, None) {
            Ok(created) => self.instance_from_created(&created),
            Err(RobinError::OverloadingNoMatch { .. }) => {
                Err(RobinError::NoSuchConstructor(self.name.clone()))
            }
            Err(err) => Err(err),
        }
    }

    /// Wrap a creator-return value into an owned instance.
    pub(crate) fn instance_from_created(&self, created: &HostValue) -> Result<HostValue> {
        let created = created
            .clone()
            .downcast::<CreatedInstance>()
            .map_err(|_| {
                RobinError::UnsupportedInterface("constructor return value".to_string())
            })?;
        Ok(Instance::new(created.object, self.id, true) as HostValue)
    }

    /// Record a pure virtual method's prototype for interceptor
    /// dispatch.
    pub fn add_interface_method(&self, name: &str, signature: Rc<Signature>) {
        self.interface_methods
            .borrow_mut()
            .insert(name.to_string(), signature);
    }

    pub fn interface_method(&self, name: &str) -> Option<Rc<Signature>> {
        self.interface_methods.borrow().get(name).cloned()
    }
}
