// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The engine value holding all otherwise-global dispatch state.
//!
//! Historically the type registry, conversion table and dispatch cache
//! were process globals; here they live in one [`Engine`] passed by
//! reference to every entry point, with a thread-local singleton wrapper
//! for frontends that want the legacy convenience. The engine is
//! deliberately not `Sync`: serialization of cache access is by
//! confinement to a single thread.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::containers::{DictProposer, ListProposer};
use crate::conversion::table::{ConstWrapperProposer, ConversionTable};
use crate::conversion::{Conversion, ConversionKind, Weight};
use crate::error::{Result, RobinError};
use crate::frontend::Frontend;
use crate::numeric::{self, NumericSubtypes};
use crate::reflection::class::{Class, ClassId};
use crate::reflection::enumerated::{EnumId, EnumeratedType};
use crate::reflection::namespace::Namespace;
use crate::reflection::overloaded_set::DispatchCache;
use crate::types::{
    Constness, Intrinsics, RobinType, TypeCategory, TypeDetail, TypeHandle, TypeRegistry, TypeSpec,
};

pub struct Engine {
    types: TypeRegistry,
    intrinsics: Intrinsics,
    conversions: ConversionTable,
    dispatch_cache: DispatchCache,
    /// Monotonic registration counter; bumping it invalidates every
    /// dispatch decision cached so far.
    generation: Cell<u64>,
    frontend: RefCell<Option<Rc<dyn Frontend>>>,
    classes: RefCell<Vec<Rc<Class>>>,
    enums: RefCell<Vec<Rc<EnumeratedType>>>,
    /// Classes of every imported library, for cross-library lookup.
    common: Rc<Namespace>,
    numeric: OnceCell<NumericSubtypes>,
    empty_list: OnceCell<TypeHandle>,
    empty_dict: OnceCell<TypeHandle>,
}

impl Engine {
    pub fn new() -> Engine {
        let types = TypeRegistry::new();
        let intrinsics = Intrinsics::create(&types);
        let engine = Engine {
            types,
            intrinsics,
            conversions: ConversionTable::new(),
            dispatch_cache: DispatchCache::new(),
            generation: Cell::new(0),
            frontend: RefCell::new(None),
            classes: RefCell::new(Vec::new()),
            enums: RefCell::new(Vec::new()),
            common: Namespace::new("<common>"),
            numeric: OnceCell::new(),
            empty_list: OnceCell::new(),
            empty_dict: OnceCell::new(),
        };

        engine.numeric.set(numeric::install(&engine)).ok();
        engine.register_fundamental_conversions();

        let empty_list = engine.types.intern_list(None, |id| {
            RobinType::new(
                id,
                TypeCategory::Extended,
                TypeSpec::List,
                "[]".to_string(),
                Constness::Regular,
                TypeDetail::List { element: None },
                true,
                false,
            )
        });
        empty_list.0.set_conversion_proposer(Rc::new(ListProposer));
        engine.empty_list.set(empty_list.0).ok();

        let empty_dict = engine.types.intern_dict(None, |id| {
            RobinType::new(
                id,
                TypeCategory::Extended,
                TypeSpec::Dict,
                "{}".to_string(),
                Constness::Regular,
                TypeDetail::Dict { entry: None },
                true,
                false,
            )
        });
        empty_dict.0.set_conversion_proposer(Rc::new(DictProposer));
        engine.empty_dict.set(empty_dict.0).ok();

        engine
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn conversions(&self) -> &ConversionTable {
        &self.conversions
    }

    pub(crate) fn dispatch_cache(&self) -> &DispatchCache {
        &self.dispatch_cache
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Invalidate all cached dispatch decisions. Called by every
    /// registration that could change a resolution result.
    pub fn bump_generation(&self) {
        self.generation.set(self.generation.get() + 1);
    }

    /// Install the active frontend. Registration of a new frontend
    /// happens-before any call that observes it.
    pub fn set_frontend(&self, frontend: Rc<dyn Frontend>) {
        *self.frontend.borrow_mut() = Some(frontend);
    }

    pub fn frontend(&self) -> Result<Rc<dyn Frontend>> {
        self.frontend
            .borrow()
            .clone()
            .ok_or(RobinError::EnvironmentVacuum)
    }

    /// The namespace where classes of all libraries are declared, so a
    /// library may extend a class another library introduced.
    pub fn common_namespace(&self) -> &Rc<Namespace> {
        &self.common
    }

    pub fn create_class(&self, name: impl Into<String>) -> Rc<Class> {
        let id = ClassId(self.classes.borrow().len());
        let class = Rc::new(Class::new(name.into(), id));
        self.classes.borrow_mut().push(class.clone());
        class.activate(self);
        class
    }

    pub fn class(&self, id: ClassId) -> Rc<Class> {
        self.classes.borrow()[id.0].clone()
    }

    pub fn create_enum(&self, name: impl Into<String>) -> Rc<EnumeratedType> {
        let id = EnumId(self.enums.borrow().len());
        let enumerated = Rc::new(EnumeratedType::new(name.into(), id));
        let ty = self.types.insert(|type_id| {
            RobinType::new(
                type_id,
                TypeCategory::UserDefined,
                TypeSpec::Enumerated,
                enumerated.name().to_string(),
                Constness::Regular,
                TypeDetail::Enumerated(id),
                false,
                false,
            )
        });
        enumerated.activate(ty);
        self.enums.borrow_mut().push(enumerated.clone());
        enumerated
    }

    pub fn enumerated(&self, id: EnumId) -> Rc<EnumeratedType> {
        self.enums.borrow()[id.0].clone()
    }

    /// The one-directional view of `base`, created and interned on
    /// first demand. Creation fires the base type's announcer.
    pub fn const_type_of(&self, base: &TypeHandle) -> TypeHandle {
        if base.is_reference() {
            return base.clone();
        }
        let (ty, created) = self.types.intern_const(base.id(), |id| {
            RobinType::new(
                id,
                base.category(),
                base.spec(),
                format!("const {}", base.type_name()),
                Constness::ConstReference,
                TypeDetail::ConstOf(base.id()),
                base.is_hyper_generic(),
                base.is_borrowed(),
            )
        });
        if created {
            ty.set_conversion_proposer(Rc::new(ConstWrapperProposer { base: base.id() }));
            base.const_type_addition_announcer().announce(ty.id());
        }
        ty
    }

    /// The pointer-to form of `base`; repeated application yields
    /// transitively pointered types.
    pub fn pointer_type_of(&self, base: &TypeHandle) -> TypeHandle {
        if let Some(id) = base.pointer_cache().get() {
            return self.types.get(*id);
        }
        let (ty, _) = self.types.intern_pointer(base.id(), |id| {
            RobinType::new(
                id,
                TypeCategory::Pointer,
                TypeSpec::Pointer,
                format!("*{}", base.type_name()),
                Constness::Regular,
                TypeDetail::PointerTo(base.id()),
                base.is_hyper_generic(),
                false,
            )
        });
        base.pointer_cache().set(ty.id()).ok();
        ty
    }

    /// `list<element>`, created lazily and keyed by its parameter.
    pub fn list_type_of(&self, element: &TypeHandle) -> TypeHandle {
        let (ty, created) = self.types.intern_list(Some(element.id()), |id| {
            RobinType::new(
                id,
                TypeCategory::Extended,
                TypeSpec::List,
                format!("list<{}>", element.type_name()),
                Constness::Regular,
                TypeDetail::List {
                    element: Some(element.id()),
                },
                element.is_hyper_generic(),
                false,
            )
        });
        if created {
            ty.set_conversion_proposer(Rc::new(ListProposer));
        }
        ty
    }

    /// `dict<key, value>`, created lazily and keyed by its parameters.
    pub fn dict_type_of(&self, key: &TypeHandle, value: &TypeHandle) -> TypeHandle {
        let (ty, created) = self
            .types
            .intern_dict(Some((key.id(), value.id())), |id| {
                RobinType::new(
                    id,
                    TypeCategory::Extended,
                    TypeSpec::Dict,
                    format!("dict<{}, {}>", key.type_name(), value.type_name()),
                    Constness::Regular,
                    TypeDetail::Dict {
                        entry: Some((key.id(), value.id())),
                    },
                    key.is_hyper_generic() || value.is_hyper_generic(),
                    false,
                )
            });
        if created {
            ty.set_conversion_proposer(Rc::new(DictProposer));
        }
        ty
    }

    /// The hyper-generic type of `[]`.
    pub fn empty_list_type(&self) -> TypeHandle {
        self.empty_list.get().expect("engine initialized").clone()
    }

    /// The hyper-generic type of `{}`.
    pub fn empty_dict_type(&self) -> TypeHandle {
        self.empty_dict.get().expect("engine initialized").clone()
    }

    /// The bounded numeric type covering an integer literal.
    pub fn type_for_integer(&self, value: i128) -> TypeHandle {
        self.numeric
            .get()
            .expect("engine initialized")
            .type_for_integer(value)
    }

    /// The class a type refers to, through any pointer or const
    /// wrapping.
    pub fn class_of_type(&self, ty: &TypeHandle) -> Option<Rc<Class>> {
        match ty.detail() {
            TypeDetail::Class(id) | TypeDetail::CreatorOf(id) => Some(self.class(id)),
            TypeDetail::PointerTo(inner) | TypeDetail::ConstOf(inner) => {
                self.class_of_type(&self.types.get(inner))
            }
            _ => None,
        }
    }

    /// The standard conversions every frontend relies on: integer
    /// widening, integral-to-floating promotion, string conversion and
    /// bool-to-int. Bounded numeric edges are registered separately by
    /// [`numeric::install`].
    fn register_fundamental_conversions(&self) {
        let trivial = |from: &TypeHandle, to: &TypeHandle, weight: Weight| {
            self.conversions.register_conversion(
                self,
                Conversion::new(from.id(), to.id(), weight, ConversionKind::Trivial),
            );
        };
        let promotion = Weight::new(0, 1, 0, 0);

        // Widening chains; the value representation is untouched, the
        // target adapter narrows or extends at the boundary.
        trivial(&self.intrinsics.schar, &self.intrinsics.short_, promotion);
        trivial(&self.intrinsics.short_, &self.intrinsics.int_, promotion);
        trivial(&self.intrinsics.int_, &self.intrinsics.long_, promotion);
        trivial(&self.intrinsics.long_, &self.intrinsics.longlong, promotion);
        trivial(&self.intrinsics.uchar, &self.intrinsics.ushort, promotion);
        trivial(&self.intrinsics.ushort, &self.intrinsics.uint, promotion);
        trivial(&self.intrinsics.uint, &self.intrinsics.ulong, promotion);
        trivial(&self.intrinsics.ulong, &self.intrinsics.ulonglong, promotion);

        // Narrowing a double to a float is also representation-free:
        // hosts carry doubles, the float adapter rounds on push.
        trivial(&self.intrinsics.double_, &self.intrinsics.float_, promotion);

        // Integral types reach floating point behind every integer rank.
        let to_double = Weight::new(0, 9, 0, 0);
        for source in [
            &self.intrinsics.short_,
            &self.intrinsics.ushort,
            &self.intrinsics.int_,
            &self.intrinsics.uint,
            &self.intrinsics.long_,
            &self.intrinsics.ulong,
            &self.intrinsics.longlong,
            &self.intrinsics.ulonglong,
        ] {
            self.conversions.register_conversion(
                self,
                Conversion::new(
                    source.id(),
                    self.intrinsics.double_.id(),
                    to_double,
                    ConversionKind::IntToFloat,
                ),
            );
        }

        self.conversions.register_conversion(
            self,
            Conversion::new(
                self.intrinsics.pascal_string.id(),
                self.intrinsics.cstring.id(),
                promotion,
                ConversionKind::PascalToCString,
            ),
        );

        self.conversions.register_conversion(
            self,
            Conversion::new(
                self.intrinsics.bool_.id(),
                self.intrinsics.int_.id(),
                promotion,
                ConversionKind::Supplied {
                    label: "bool-to-int",
                    apply: Rc::new(|engine, value| {
                        let frontend = engine.frontend()?;
                        let b = frontend.bool_value(value).ok_or_else(|| {
                            RobinError::UnsupportedInterface("bool value".to_string())
                        })?;
                        frontend.make_int(i128::from(b)).ok_or_else(|| {
                            RobinError::UnsupportedInterface("int value".to_string())
                        })
                    }),
                },
            ),
        );
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

thread_local! {
    static GLOBAL_ENGINE: Engine = Engine::new();
}

/// Run `body` against this thread's engine instance.
///
/// For frontends that want the legacy process-global: each thread gets
/// its own engine, which is also how cache access stays serialized.
pub fn with_global_engine<R>(body: impl FnOnce(&Engine) -> R) -> R {
    GLOBAL_ENGINE.with(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_types_are_interned_by_parameters() {
        let engine = Engine::new();
        let double_ = engine.intrinsics().double_.clone();
        let a = engine.list_type_of(&double_);
        let b = engine.list_type_of(&double_);
        assert_eq!(a.id(), b.id());
        let other = engine.list_type_of(&engine.intrinsics().int_);
        assert_ne!(a.id(), other.id());
    }

    #[test]
    fn const_types_are_interned_and_announced() {
        let engine = Engine::new();
        let int_ = engine.intrinsics().int_.clone();
        assert_eq!(int_.const_type_addition_announcer().get(), None);
        let c1 = engine.const_type_of(&int_);
        let c2 = engine.const_type_of(&int_);
        assert_eq!(c1.id(), c2.id());
        assert!(c1.is_reference());
        // const of const is itself
        assert_eq!(engine.const_type_of(&c1).id(), c1.id());
        assert_eq!(int_.const_type_addition_announcer().get(), Some(c1.id()));
    }

    #[test]
    fn pointer_types_chain_transitively() {
        let engine = Engine::new();
        let int_ = engine.intrinsics().int_.clone();
        let p = engine.pointer_type_of(&int_);
        let pp = engine.pointer_type_of(&p);
        assert_ne!(p.id(), pp.id());
        assert_eq!(engine.pointer_type_of(&int_).id(), p.id());
        assert_eq!(p.type_name(), "*int");
        assert_eq!(pp.type_name(), "**int");
    }

    #[test]
    fn empty_containers_are_hyper_generic() {
        let engine = Engine::new();
        assert!(engine.empty_list_type().is_hyper_generic());
        assert!(engine.empty_dict_type().is_hyper_generic());
        let nested = engine.list_type_of(&engine.empty_list_type());
        assert!(nested.is_hyper_generic());
        let concrete = engine.list_type_of(&engine.intrinsics().int_);
        assert!(!concrete.is_hyper_generic());
    }

    #[test]
    fn frontendless_engine_reports_vacuum() {
        let engine = Engine::new();
        assert!(matches!(
            engine.frontend(),
            Err(RobinError::EnvironmentVacuum)
        ));
    }
}
