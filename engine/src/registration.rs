// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Admitting a library's registration records into the reflection.
//!
//! The loader (outside this crate) acquires the `entry` table from a
//! shared object and hands it over; everything from there on happens
//! here: classes and enums are created or found in the cross-library
//! common namespace, functions become `CFunction`s grouped into
//! overload sets, single-argument constructors register implicit
//! conversions, and `extends` records wire up-casts.

use std::rc::Rc;

use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::reflection::cfunction::{CFunction, FunctionKind, Signature};
use crate::reflection::class::Class;
use crate::reflection::enumerated::EnumeratedType;
use crate::reflection::library::Library;
use crate::reflection::namespace::{Namespace, NamespaceItem};
use crate::reflection::overloaded_set::OverloadedSet;
use crate::conversion::{Conversion, ConversionKind, Weight};
use crate::types::TypeHandle;
use robin_parser::{
    decode_table, ConversionPolicy, ElementMode, Param, RawRegData, Record, TypeExpr,
};

/// Build a [`Library`] from decoded registration records.
pub fn import(engine: &Engine, records: &[Record], name: &str) -> Result<Rc<Library>> {
    let library = Library::new(name);
    admit(engine, records, None, library.global_namespace())?;
    Ok(library)
}

/// As [`import`], straight from a raw `entry` table.
///
/// # Safety
///
/// `entry` must satisfy the layout contract of
/// [`robin_parser::decode_table`].
pub unsafe fn import_raw(
    engine: &Engine,
    entry: *const RawRegData,
    name: &str,
) -> Result<Rc<Library>> {
    let records = decode_table(entry)?;
    import(engine, &records, name)
}

/// Unpack registration records into reflection entities, inside `klass`
/// when recursing through a class prototype.
pub fn admit(
    engine: &Engine,
    records: &[Record],
    klass: Option<&Rc<Class>>,
    container: &Rc<Namespace>,
) -> Result<()> {
    log::debug!("admitting {} records into {}", records.len(), container);
    if let Some(klass) = klass {
        if !klass.is_empty() {
            return Ok(()); // avoid double loading
        }
    }

    for record in records {
        match record {
            Record::Enum { name, constants } => {
                let enumerated = touch_enum(engine, name, container);
                for (literal, value) in constants {
                    enumerated.add_constant(literal.clone(), *value);
                }
            }
            Record::Class { name, members } => {
                let subclass = touch_class(engine, name);
                container.declare(name.clone(), NamespaceItem::Class(subclass.clone()));
                log::debug!("registering class {}", name);
                admit(engine, members, Some(&subclass), container)?;
            }
            Record::Extends { base, upcast } => {
                let base_class = touch_class(engine, base);
                if let Some(klass) = klass {
                    klass.inherit(engine, &base_class, *upcast);
                }
            }
            Record::Constructor {
                policy,
                sym,
                params,
            } => {
                let klass = klass.ok_or_else(|| {
                    RobinError::InvalidArguments(
                        "constructor record outside a class".to_string(),
                    )
                })?;
                log::debug!("registering constructor for {}", klass.name());
                let mut ctor = CFunction::new(*sym, klass.name(), FunctionKind::Constructor);
                ctor.set_class_name(klass.name());
                ctor.specify_return_type(klass.creator_type());
                admit_arguments(engine, params, &mut ctor, container)?;
                let ctor = Rc::new(ctor);
                // A one-argument constructor doubles as an implicit
                // conversion, unless declared explicit.
                if ctor.arity() == 1 && *policy != ConversionPolicy::Explicit {
                    let weight = match policy {
                        ConversionPolicy::Promotion => Weight::new(0, 1, 0, 0),
                        _ => Weight::new(0, 0, 0, 1),
                    };
                    engine.conversions().register_conversion(
                        engine,
                        Conversion::new(
                            ctor.formal_types()[0].id(),
                            klass.value_type().id(),
                            weight,
                            ConversionKind::ViaConstruction {
                                class: klass.id(),
                                ctor: ctor.clone(),
                            },
                        ),
                    );
                }
                klass.add_constructor(engine, ctor);
            }
            Record::Destructor { sym } => {
                let klass = klass.ok_or_else(|| {
                    RobinError::InvalidArguments("destructor record outside a class".to_string())
                })?;
                let mut dtor =
                    CFunction::new(*sym, format!("~{}", klass.name()), FunctionKind::Destructor);
                dtor.set_class_name(klass.name());
                dtor.add_anonymous_argument(klass.ptr_type());
                klass.set_destructor(Rc::new(dtor));
            }
            Record::Alias { name, actual } => {
                if name == actual {
                    // "typedef struct A A;"
                    let self_struct = touch_class(engine, actual);
                    container.declare(actual.clone(), NamespaceItem::Class(self_struct));
                } else {
                    log::debug!("registering alias {} = {}", name, actual);
                    container.alias(actual, name);
                    engine.common_namespace().alias(actual, name);
                }
            }
            Record::Function {
                name,
                allow_edge,
                returns,
                sym,
                params,
            } => match sym {
                None => {
                    // Pure virtual: store the declared prototype so the
                    // frontend can dispatch through an interceptor.
                    let klass = klass.ok_or_else(|| {
                        RobinError::InvalidArguments(format!(
                            "pure virtual '{}' outside a class",
                            name
                        ))
                    })?;
                    let mut arguments = vec![klass.value_type()];
                    for param in params {
                        arguments.push(required_type(engine, &param.ty, container)?);
                    }
                    klass.add_interface_method(
                        name,
                        Rc::new(Signature {
                            name: name.clone(),
                            return_type: interpret_type(engine, returns, container)?,
                            arguments,
                        }),
                    );
                }
                Some(sym) => {
                    log::debug!("registering function {}", name);
                    let kind = if klass.is_some() {
                        FunctionKind::Method
                    } else {
                        FunctionKind::GlobalFunction
                    };
                    let mut cfun = CFunction::new(*sym, name.as_str(), kind);
                    if let Some(klass) = klass {
                        cfun.set_class_name(klass.name());
                    }
                    if let Some(return_type) = interpret_type(engine, returns, container)? {
                        // Reference returns never transfer memory
                        // ownership to the caller.
                        if return_type.is_reference() {
                            cfun.supply_memory_management_hint(false);
                        }
                        cfun.specify_return_type(return_type);
                    }
                    cfun.set_allow_edge_conversions(*allow_edge);
                    if let Some(klass) = klass {
                        cfun.add_anonymous_argument(klass.value_type());
                    }
                    admit_arguments(engine, params, &mut cfun, container)?;
                    let cfun = Rc::new(cfun);

                    match klass {
                        Some(klass) => klass.add_instance_method(engine, name, cfun),
                        None => {
                            let set = match container.lookup_function(name) {
                                Ok(set) => set,
                                Err(_) => {
                                    let set = OverloadedSet::create_new(name.as_str());
                                    container
                                        .declare(name.clone(), NamespaceItem::Callable(set.clone()));
                                    set
                                }
                            };
                            log::debug!("// @FUNC: {} with {} arguments", name, cfun.arity());
                            set.add_alternative(engine, cfun);
                        }
                    }
                }
            },
        }
    }
    Ok(())
}

fn admit_arguments(
    engine: &Engine,
    params: &[Param],
    cfun: &mut CFunction,
    container: &Rc<Namespace>,
) -> Result<()> {
    for param in params {
        let ty = required_type(engine, &param.ty, container)?;
        log::debug!("adding parameter {} {}", ty, param.name);
        cfun.add_formal_argument(&param.name, ty);
    }
    Ok(())
}

/// The type a declaration string denotes, or `None` for `void`.
pub fn interpret_type(
    engine: &Engine,
    expr: &TypeExpr,
    container: &Rc<Namespace>,
) -> Result<Option<TypeHandle>> {
    let intrinsics = engine.intrinsics();
    let ty = match expr {
        TypeExpr::Void => return Ok(None),
        TypeExpr::Intrinsic(kind) => intrinsics.for_kind(*kind),
        TypeExpr::CString => intrinsics.cstring.clone(),
        TypeExpr::PascalString => intrinsics.pascal_string.clone(),
        TypeExpr::Element(ElementMode::Owned) => intrinsics.element.clone(),
        TypeExpr::Element(_) => intrinsics.element_borrowed.clone(),
        TypeExpr::Passthrough => intrinsics.element_borrowed.clone(),
        TypeExpr::Enum(name) => lookup_enum(engine, name, container)?.robin_type(),
        TypeExpr::Pointer(name) => lookup_class(engine, name, container)?.ptr_type(),
        TypeExpr::ConstRef(name) => lookup_class(engine, name, container)?.ref_type(),
        TypeExpr::Named(name) => lookup_class(engine, name, container)?.value_type(),
    };
    Ok(Some(ty))
}

fn required_type(
    engine: &Engine,
    expr: &TypeExpr,
    container: &Rc<Namespace>,
) -> Result<TypeHandle> {
    interpret_type(engine, expr, container)?.ok_or_else(|| {
        RobinError::InvalidArguments("'void' is not a parameter type".to_string())
    })
}

fn lookup_class(engine: &Engine, name: &str, container: &Rc<Namespace>) -> Result<Rc<Class>> {
    container
        .lookup_class(name)
        .or_else(|_| engine.common_namespace().lookup_class(name))
}

fn lookup_enum(
    engine: &Engine,
    name: &str,
    container: &Rc<Namespace>,
) -> Result<Rc<EnumeratedType>> {
    container
        .lookup_enum(name)
        .or_else(|_| engine.common_namespace().lookup_enum(name))
}

/// Find a class across all imported libraries, creating it if this is
/// the first mention.
fn touch_class(engine: &Engine, name: &str) -> Rc<Class> {
    let common = engine.common_namespace();
    let actual = common.unalias(name);
    match common.lookup_class(&actual) {
        Ok(class) => class,
        Err(_) => {
            let class = engine.create_class(actual.clone());
            common.declare(actual, NamespaceItem::Class(class.clone()));
            class
        }
    }
}

fn touch_enum(engine: &Engine, name: &str, container: &Rc<Namespace>) -> Rc<EnumeratedType> {
    match container.lookup_enum(name) {
        Ok(enumerated) => enumerated,
        Err(_) => {
            let enumerated = engine.create_enum(name);
            container.declare(name.to_string(), NamespaceItem::Enum(enumerated.clone()));
            engine
                .common_namespace()
                .declare(name.to_string(), NamespaceItem::Enum(enumerated.clone()));
            enumerated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robin_parser::{FunctionSymbol, IntrinsicKind};

    fn int_param(name: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: TypeExpr::Intrinsic(IntrinsicKind::Int),
        }
    }

    #[test]
    fn imports_functions_into_overload_sets() {
        let engine = Engine::new();
        let records = vec![
            Record::Function {
                name: "dist".to_string(),
                allow_edge: true,
                returns: TypeExpr::Intrinsic(IntrinsicKind::Double),
                sym: Some(FunctionSymbol(0x10 as *const _)),
                params: vec![int_param("x")],
            },
            Record::Function {
                name: "dist".to_string(),
                allow_edge: true,
                returns: TypeExpr::Intrinsic(IntrinsicKind::Double),
                sym: Some(FunctionSymbol(0x20 as *const _)),
                params: vec![int_param("x"), int_param("y")],
            },
        ];
        let library = import(&engine, &records, "geometry").unwrap();
        let set = library.global_namespace().lookup_function("dist").unwrap();
        assert!(set
            .seek_alternative(&[engine.intrinsics().int_.clone()])
            .is_some());
        assert!(set
            .seek_alternative(&[
                engine.intrinsics().int_.clone(),
                engine.intrinsics().int_.clone()
            ])
            .is_some());
    }

    #[test]
    fn imports_enums_with_constants() {
        let engine = Engine::new();
        let records = vec![Record::Enum {
            name: "Color".to_string(),
            constants: vec![("RED".to_string(), 0), ("BLUE".to_string(), 7)],
        }];
        let library = import(&engine, &records, "palette").unwrap();
        let color = library.global_namespace().lookup_enum("Color").unwrap();
        assert_eq!(color.value_of("BLUE").unwrap(), 7);
        assert_eq!(color.deduce_name(0).unwrap(), "RED");
        assert!(color.value_of("GREEN").is_err());
    }

    #[test]
    fn class_members_land_on_the_class() {
        let engine = Engine::new();
        let records = vec![Record::Class {
            name: "Rect".to_string(),
            members: vec![
                Record::Constructor {
                    policy: ConversionPolicy::Explicit,
                    sym: FunctionSymbol(0x30 as *const _),
                    params: vec![int_param("w"), int_param("h")],
                },
                Record::Destructor {
                    sym: FunctionSymbol(0x40 as *const _),
                },
                Record::Function {
                    name: "area".to_string(),
                    allow_edge: true,
                    returns: TypeExpr::Intrinsic(IntrinsicKind::Long),
                    sym: Some(FunctionSymbol(0x50 as *const _)),
                    params: vec![],
                },
            ],
        }];
        let library = import(&engine, &records, "shapes").unwrap();
        let rect = library.global_namespace().lookup_class("Rect").unwrap();
        assert!(!rect.is_empty());
        assert!(rect.destructor().is_some());
        assert!(rect.has_instance_method(&engine, "area"));
        // method signatures carry the implicit instance argument
        let area = rect.lookup_instance_method(&engine, "area").unwrap();
        assert!(area.seek_alternative(&[rect.value_type()]).is_some());
    }

    #[test]
    fn aliases_resolve_across_the_library() {
        let engine = Engine::new();
        let records = vec![
            Record::Class {
                name: "String".to_string(),
                members: vec![],
            },
            Record::Alias {
                name: "Str".to_string(),
                actual: "String".to_string(),
            },
            Record::Function {
                name: "length".to_string(),
                allow_edge: true,
                returns: TypeExpr::Intrinsic(IntrinsicKind::Int),
                sym: Some(FunctionSymbol(0x60 as *const _)),
                params: vec![Param {
                    name: "s".to_string(),
                    ty: TypeExpr::ConstRef("Str".to_string()),
                }],
            },
        ];
        let library = import(&engine, &records, "strings").unwrap();
        let class = library.global_namespace().lookup_class("Str").unwrap();
        assert_eq!(class.name(), "String");
        let length = library.global_namespace().lookup_function("length").unwrap();
        assert!(length.seek_alternative(&[class.ref_type()]).is_some());
    }

    #[test]
    fn pure_virtual_methods_store_signatures() {
        let engine = Engine::new();
        let records = vec![Record::Class {
            name: "Visitor".to_string(),
            members: vec![Record::Function {
                name: "visit".to_string(),
                allow_edge: true,
                returns: TypeExpr::Void,
                sym: None,
                params: vec![int_param("node")],
            }],
        }];
        let library = import(&engine, &records, "visitors").unwrap();
        let visitor = library.global_namespace().lookup_class("Visitor").unwrap();
        let signature = visitor.interface_method("visit").unwrap();
        assert_eq!(signature.arguments.len(), 2);
        assert!(signature.return_type.is_none());
    }
}
