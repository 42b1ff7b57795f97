// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The registration table wire format.
//!
//! The raw form is what a compiled wrapper library lays out in static
//! storage: arrays of [`RawRegData`], each terminated by a record whose
//! `name` is null, with nested arrays hanging off the `prototype` field.
//! [`decode_table`] lifts that into an owned tree of [`Record`]s,
//! classifying each record by its `type` string while it goes. Builders
//! of in-process tables (tests, the demo) construct [`Record`]s directly
//! and skip the raw layer.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use crate::type_grammar::{parse_type, TypeExpr};
use crate::ParseError;

/// The address of a C-ABI entry point inside the wrapped library.
///
/// The engine transmutes this to a concrete `extern "C"` function type at
/// call time; all the parser knows is that it is an opaque code address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSymbol(pub *const c_void);

/// A base-pointer adjustment callback registered with an `extends` record.
pub type UpcastFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// The implicit-conversion policy a constructor declares through the first
/// character of its record name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionPolicy {
    /// `%` - never used for implicit conversion.
    Explicit,
    /// `*` (or no prefix) - usable as a user-defined conversion.
    UserDefined,
    /// `^` - usable as a promotion.
    Promotion,
}

/// A named, typed formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

/// One classified registration record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Enum {
        name: String,
        constants: Vec<(String, i32)>,
    },
    Class {
        name: String,
        members: Vec<Record>,
    },
    /// Declares that the enclosing class inherits from `base`.
    Extends {
        base: String,
        upcast: Option<UpcastFn>,
    },
    Constructor {
        policy: ConversionPolicy,
        sym: FunctionSymbol,
        params: Vec<Param>,
    },
    Destructor {
        sym: FunctionSymbol,
    },
    Alias {
        name: String,
        actual: String,
    },
    Function {
        name: String,
        /// Cleared by a `!` prefix on the record name; suppresses edge
        /// conversions on this function's return value.
        allow_edge: bool,
        returns: TypeExpr,
        /// `None` marks a pure virtual method: there is nothing to call,
        /// only a signature for an interceptor to implement.
        sym: Option<FunctionSymbol>,
        params: Vec<Param>,
    },
}

/// The `#[repr(C)]` record layout the `entry` symbol points at.
#[repr(C)]
pub struct RawRegData {
    /// Null name terminates the enclosing array.
    pub name: *const c_char,
    pub type_: *const c_char,
    pub sym: *const c_void,
    pub prototype: *const RawRegData,
}

unsafe fn string_field(p: *const c_char) -> Result<String, ParseError> {
    CStr::from_ptr(p)
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| ParseError::BadEncoding)
}

unsafe fn decode_params(proto: *const RawRegData) -> Result<Vec<Param>, ParseError> {
    let mut params = Vec::new();
    if proto.is_null() {
        return Ok(params);
    }
    let mut p = proto;
    while !(*p).name.is_null() {
        let name = string_field((*p).name)?;
        let ty = parse_type(&string_field((*p).type_)?)?;
        params.push(Param { name, ty });
        p = p.add(1);
    }
    Ok(params)
}

unsafe fn decode_constants(proto: *const RawRegData) -> Result<Vec<(String, i32)>, ParseError> {
    let mut constants = Vec::new();
    if proto.is_null() {
        return Ok(constants);
    }
    let mut p = proto;
    while !(*p).name.is_null() {
        let name = string_field((*p).name)?;
        if (*p).sym.is_null() {
            return Err(ParseError::MissingEnumValue(name));
        }
        let value = *((*p).sym as *const i32);
        constants.push((name, value));
        p = p.add(1);
    }
    Ok(constants)
}

unsafe fn decode_record(p: *const RawRegData) -> Result<Record, ParseError> {
    let name = string_field((*p).name)?;
    if name.is_empty() {
        return Err(ParseError::EmptyName);
    }
    let type_ = string_field((*p).type_)?;

    let record = match type_.as_str() {
        "enum" => Record::Enum {
            name,
            constants: decode_constants((*p).prototype)?,
        },
        "class" => Record::Class {
            name,
            members: decode_table((*p).prototype)?,
        },
        "extends" => Record::Extends {
            base: name,
            upcast: if (*p).sym.is_null() {
                None
            } else {
                Some(std::mem::transmute::<*const c_void, UpcastFn>((*p).sym))
            },
        },
        "constructor" => {
            if (*p).sym.is_null() {
                return Err(ParseError::MissingSymbol(name));
            }
            Record::Constructor {
                policy: constructor_policy(&name),
                sym: FunctionSymbol((*p).sym),
                params: decode_params((*p).prototype)?,
            }
        }
        "destructor" => {
            if (*p).sym.is_null() {
                return Err(ParseError::MissingSymbol(name));
            }
            Record::Destructor {
                sym: FunctionSymbol((*p).sym),
            }
        }
        aliased if aliased.starts_with('=') => Record::Alias {
            name,
            actual: aliased[1..].to_string(),
        },
        returns => {
            let stripped = name.strip_prefix('!').map(|bare| bare.to_string());
            let (name, allow_edge) = match stripped {
                Some(bare) => (bare, false),
                None => (name, true),
            };
            Record::Function {
                name,
                allow_edge,
                returns: parse_type(returns)?,
                sym: if (*p).sym.is_null() {
                    None
                } else {
                    Some(FunctionSymbol((*p).sym))
                },
                params: decode_params((*p).prototype)?,
            }
        }
    };
    Ok(record)
}

/// Decode a terminator-delimited registration array into owned records.
///
/// # Safety
///
/// `entry` must point at a well-formed table: every `name`/`type` field a
/// valid C string, every non-null `prototype` another well-formed table,
/// and the array terminated by a record with a null `name`. This is the
/// contract a wrapper library's generated tables satisfy by construction.
pub unsafe fn decode_table(entry: *const RawRegData) -> Result<Vec<Record>, ParseError> {
    let mut records = Vec::new();
    if entry.is_null() {
        return Ok(records);
    }
    let mut p = entry;
    while !(*p).name.is_null() {
        records.push(decode_record(p)?);
        p = p.add(1);
    }
    log::debug!("decoded registration table with {} records", records.len());
    Ok(records)
}

fn constructor_policy(name: &str) -> ConversionPolicy {
    match name.chars().next() {
        Some('%') => ConversionPolicy::Explicit,
        Some('^') => ConversionPolicy::Promotion,
        _ => ConversionPolicy::UserDefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_grammar::IntrinsicKind;
    use std::ptr;

    const fn raw(
        name: *const c_char,
        type_: *const c_char,
        sym: *const c_void,
        prototype: *const RawRegData,
    ) -> RawRegData {
        RawRegData {
            name,
            type_,
            sym,
            prototype,
        }
    }

    const END: RawRegData = raw(ptr::null(), ptr::null(), ptr::null(), ptr::null());

    macro_rules! cstr {
        ($s:literal) => {
            concat!($s, "\0").as_ptr() as *const c_char
        };
    }

    #[test]
    fn decodes_function_with_params() {
        let params = [
            raw(cstr!("width"), cstr!("int"), ptr::null(), ptr::null()),
            raw(cstr!("height"), cstr!("int"), ptr::null(), ptr::null()),
            END,
        ];
        let table = [
            raw(
                cstr!("area"),
                cstr!("long"),
                0x1000 as *const c_void,
                params.as_ptr(),
            ),
            END,
        ];
        let records = unsafe { decode_table(table.as_ptr()) }.unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::Function {
                name,
                allow_edge,
                returns,
                sym,
                params,
            } => {
                assert_eq!(name, "area");
                assert!(*allow_edge);
                assert_eq!(*returns, TypeExpr::Intrinsic(IntrinsicKind::Long));
                assert_eq!(*sym, Some(FunctionSymbol(0x1000 as *const c_void)));
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].name, "width");
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn decodes_enum_constants() {
        let red: i32 = 0;
        let blue: i32 = 7;
        let constants = [
            raw(
                cstr!("RED"),
                cstr!(""),
                &red as *const i32 as *const c_void,
                ptr::null(),
            ),
            raw(
                cstr!("BLUE"),
                cstr!(""),
                &blue as *const i32 as *const c_void,
                ptr::null(),
            ),
            END,
        ];
        let table = [
            raw(
                cstr!("Color"),
                cstr!("enum"),
                ptr::null(),
                constants.as_ptr(),
            ),
            END,
        ];
        let records = unsafe { decode_table(table.as_ptr()) }.unwrap();
        assert_eq!(
            records,
            vec![Record::Enum {
                name: "Color".to_string(),
                constants: vec![("RED".to_string(), 0), ("BLUE".to_string(), 7)],
            }]
        );
    }

    #[test]
    fn bang_prefix_disables_edge_conversions() {
        let table = [
            raw(
                cstr!("!raw_handle"),
                cstr!("*Handle"),
                0x2000 as *const c_void,
                ptr::null(),
            ),
            END,
        ];
        let records = unsafe { decode_table(table.as_ptr()) }.unwrap();
        match &records[0] {
            Record::Function {
                name, allow_edge, ..
            } => {
                assert_eq!(name, "raw_handle");
                assert!(!*allow_edge);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn constructor_policies() {
        assert_eq!(constructor_policy("%Rect"), ConversionPolicy::Explicit);
        assert_eq!(constructor_policy("^Rect"), ConversionPolicy::Promotion);
        assert_eq!(constructor_policy("*Rect"), ConversionPolicy::UserDefined);
        assert_eq!(constructor_policy("Rect"), ConversionPolicy::UserDefined);
    }

    #[test]
    fn alias_records() {
        let table = [
            raw(cstr!("Str"), cstr!("=String"), ptr::null(), ptr::null()),
            END,
        ];
        let records = unsafe { decode_table(table.as_ptr()) }.unwrap();
        assert_eq!(
            records,
            vec![Record::Alias {
                name: "Str".to_string(),
                actual: "String".to_string(),
            }]
        );
    }
}
