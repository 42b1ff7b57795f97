// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A minimal in-process frontend over plain Rust values.
//!
//! Integers are `i64`, floats `f64`, strings `String` (length-prefixed)
//! or `CString` (null-terminated), lists and dicts small `RefCell`ed
//! containers, instances the engine's own [`Instance`]. This is what
//! the integration tests and the demo drive calls through; an embedded
//! interpreter would supply its own frontend with the same shape.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::rc::Rc;

use crate::buffer::{ArgumentsBuffer, MachineWord};
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{
    Adapter, CellErrorHandler, ErrorHandler, Frontend, HostValue,
};
use crate::low_level::{DefaultLowLevel, LowLevel};
use crate::reflection::class::ClassId;
use crate::reflection::enumerated::EnumId;
use crate::reflection::instance::Instance;
use crate::types::{RobinType, TypeDetail, TypeHandle, TypeSpec};

/// A host list value.
pub struct HostList(pub RefCell<Vec<HostValue>>);

/// A host dict value, association-list flavored.
pub struct HostDict(pub RefCell<Vec<(HostValue, HostValue)>>);

/// A host value of an enumerated type.
pub struct EnumValue {
    pub enum_id: EnumId,
    pub value: i64,
}

/// Build a host integer.
pub fn int(value: i64) -> HostValue {
    Rc::new(value)
}

/// Build a host float.
pub fn float(value: f64) -> HostValue {
    Rc::new(value)
}

pub fn boolean(value: bool) -> HostValue {
    Rc::new(value)
}

/// Build a host (length-prefixed) string.
pub fn string(value: impl Into<String>) -> HostValue {
    Rc::new(value.into())
}

pub fn list(items: Vec<HostValue>) -> HostValue {
    Rc::new(HostList(RefCell::new(items)))
}

pub fn dict(entries: Vec<(HostValue, HostValue)>) -> HostValue {
    Rc::new(HostDict(RefCell::new(entries)))
}

pub fn enum_value(enum_id: EnumId, value: i64) -> HostValue {
    Rc::new(EnumValue { enum_id, value })
}

pub fn as_int(value: &HostValue) -> Option<i64> {
    value.downcast_ref::<i64>().copied()
}

pub fn as_float(value: &HostValue) -> Option<f64> {
    value.downcast_ref::<f64>().copied()
}

pub fn as_bool(value: &HostValue) -> Option<bool> {
    value.downcast_ref::<bool>().copied()
}

pub fn as_string(value: &HostValue) -> Option<String> {
    value.downcast_ref::<String>().cloned()
}

pub fn as_list(value: &HostValue) -> Option<Vec<HostValue>> {
    value
        .downcast_ref::<HostList>()
        .map(|l| l.0.borrow().clone())
}

pub fn is_unit(value: &HostValue) -> bool {
    value.is::<()>()
}

pub struct SimpleFrontend {
    errors: Rc<CellErrorHandler>,
    low_level: RefCell<Option<Rc<dyn LowLevel>>>,
}

impl SimpleFrontend {
    /// Create the frontend and make it the engine's active one.
    pub fn install(engine: &Engine) -> Rc<SimpleFrontend> {
        let frontend = Rc::new(SimpleFrontend {
            errors: Rc::new(CellErrorHandler::default()),
            low_level: RefCell::new(None),
        });
        engine.set_frontend(frontend.clone());
        frontend
    }

    /// Substitute the call trampoline (e.g. by one that traps native
    /// failures).
    pub fn set_low_level(&self, low_level: Rc<dyn LowLevel>) {
        *self.low_level.borrow_mut() = Some(low_level);
    }

    fn common_element_type(
        &self,
        engine: &Engine,
        items: &[HostValue],
    ) -> Result<TypeHandle> {
        let detected = items
            .iter()
            .map(|item| self.detect_type(engine, item))
            .collect::<Result<Vec<_>>>()?;
        let first = detected[0].clone();
        if detected.iter().all(|ty| ty.id() == first.id()) {
            return Ok(first);
        }
        // Heterogeneous integers still share a C type.
        if items.iter().all(|item| item.is::<i64>()) {
            return Ok(engine.intrinsics().longlong.clone());
        }
        Ok(engine.intrinsics().element.clone())
    }
}

impl Frontend for SimpleFrontend {
    fn detect_type(&self, engine: &Engine, value: &HostValue) -> Result<TypeHandle> {
        if let Some(n) = value.downcast_ref::<i64>() {
            return Ok(engine.type_for_integer(i128::from(*n)));
        }
        if value.is::<f64>() {
            return Ok(engine.intrinsics().double_.clone());
        }
        if value.is::<bool>() {
            return Ok(engine.intrinsics().bool_.clone());
        }
        if value.is::<char>() {
            return Ok(engine.intrinsics().char_.clone());
        }
        if value.is::<String>() {
            return Ok(engine.intrinsics().pascal_string.clone());
        }
        if value.is::<CString>() {
            return Ok(engine.intrinsics().cstring.clone());
        }
        if let Some(instance) = value.downcast_ref::<Instance>() {
            return Ok(engine.class(instance.class_id()).ptr_type());
        }
        if let Some(enumerated) = value.downcast_ref::<EnumValue>() {
            return Ok(engine.enumerated(enumerated.enum_id).robin_type());
        }
        if let Some(host_list) = value.downcast_ref::<HostList>() {
            let items = host_list.0.borrow();
            if items.is_empty() {
                return Ok(engine.empty_list_type());
            }
            let element = self.common_element_type(engine, &items)?;
            return Ok(engine.list_type_of(&element));
        }
        if let Some(host_dict) = value.downcast_ref::<HostDict>() {
            let entries = host_dict.0.borrow();
            if entries.is_empty() {
                return Ok(engine.empty_dict_type());
            }
            let keys: Vec<HostValue> = entries.iter().map(|(k, _)| k.clone()).collect();
            let values: Vec<HostValue> = entries.iter().map(|(_, v)| v.clone()).collect();
            let key = self.common_element_type(engine, &keys)?;
            let value = self.common_element_type(engine, &values)?;
            return Ok(engine.dict_type_of(&key, &value));
        }
        Err(RobinError::UnsupportedInterface(
            "host value of unknown kind".to_string(),
        ))
    }

    fn supply_adapter(&self, engine: &Engine, ty: &RobinType) -> Option<Rc<dyn Adapter>> {
        match ty.detail() {
            // A const view marshals exactly like what it wraps.
            TypeDetail::ConstOf(base) => {
                return self.supply_adapter(engine, &engine.types().get(base))
            }
            TypeDetail::Bounded { .. } => {
                return Some(Rc::new(IntAdapter {
                    spec: TypeSpec::LongLong,
                }))
            }
            TypeDetail::Class(id) => return Some(Rc::new(InstanceAdapter { class: id })),
            TypeDetail::PointerTo(base) => {
                return match engine.types().get(base).detail() {
                    TypeDetail::Class(id) => Some(Rc::new(InstanceAdapter { class: id })),
                    _ => None,
                }
            }
            TypeDetail::Enumerated(id) => return Some(Rc::new(EnumAdapter { enum_id: id })),
            _ => {}
        }
        match ty.spec() {
            TypeSpec::Int
            | TypeSpec::UInt
            | TypeSpec::Long
            | TypeSpec::ULong
            | TypeSpec::LongLong
            | TypeSpec::ULongLong
            | TypeSpec::Short
            | TypeSpec::UShort => Some(Rc::new(IntAdapter { spec: ty.spec() })),
            TypeSpec::Char | TypeSpec::SChar | TypeSpec::UChar => Some(Rc::new(CharAdapter)),
            TypeSpec::Float => Some(Rc::new(FloatAdapter)),
            TypeSpec::Double => Some(Rc::new(DoubleAdapter)),
            TypeSpec::Bool => Some(Rc::new(BoolAdapter)),
            TypeSpec::CString => Some(Rc::new(CStringAdapter)),
            TypeSpec::PascalString => Some(Rc::new(PascalStringAdapter)),
            TypeSpec::List => Some(Rc::new(ListAdapter)),
            TypeSpec::Dict => Some(Rc::new(DictAdapter)),
            _ => None,
        }
    }

    fn error_handler(&self) -> Rc<dyn ErrorHandler> {
        self.errors.clone()
    }

    fn low_level(&self) -> Rc<dyn LowLevel> {
        self.low_level
            .borrow()
            .clone()
            .unwrap_or_else(|| Rc::new(DefaultLowLevel))
    }

    fn own(&self, value: &HostValue, owner: &HostValue) {
        if let Some(instance) = Instance::from_host(value) {
            instance.bond_to(owner.clone());
        }
    }

    fn int_value(&self, value: &HostValue) -> Option<i128> {
        value.downcast_ref::<i64>().map(|n| i128::from(*n))
    }

    fn bool_value(&self, value: &HostValue) -> Option<bool> {
        as_bool(value)
    }

    fn string_value(&self, value: &HostValue) -> Option<String> {
        if let Some(s) = value.downcast_ref::<String>() {
            return Some(s.clone());
        }
        value
            .downcast_ref::<CString>()
            .and_then(|s| s.to_str().ok().map(|s| s.to_string()))
    }

    fn make_int(&self, value: i128) -> Option<HostValue> {
        Some(int(value as i64))
    }

    fn make_float(&self, value: f64) -> Option<HostValue> {
        Some(float(value))
    }

    fn make_cstring(&self, value: String) -> Option<HostValue> {
        CString::new(value).ok().map(|s| Rc::new(s) as HostValue)
    }

    fn list_items(&self, value: &HostValue) -> Option<Vec<HostValue>> {
        as_list(value)
    }

    fn make_list(&self, items: Vec<HostValue>) -> Option<HostValue> {
        Some(list(items))
    }

    fn replace_list_items(&self, value: &HostValue, items: Vec<HostValue>) -> bool {
        match value.downcast_ref::<HostList>() {
            Some(host_list) => {
                *host_list.0.borrow_mut() = items;
                true
            }
            None => false,
        }
    }

    fn dict_items(&self, value: &HostValue) -> Option<Vec<(HostValue, HostValue)>> {
        value
            .downcast_ref::<HostDict>()
            .map(|d| d.0.borrow().clone())
    }

    fn make_dict(&self, items: Vec<(HostValue, HostValue)>) -> Option<HostValue> {
        Some(dict(items))
    }

    fn replace_dict_items(&self, value: &HostValue, items: Vec<(HostValue, HostValue)>) -> bool {
        match value.downcast_ref::<HostDict>() {
            Some(host_dict) => {
                *host_dict.0.borrow_mut() = items;
                true
            }
            None => false,
        }
    }
}

fn expect<'a, T: 'static>(value: &'a HostValue, what: &str) -> Result<&'a T> {
    value
        .downcast_ref::<T>()
        .ok_or_else(|| RobinError::InvalidArguments(format!("expected a {} value", what)))
}

struct IntAdapter {
    spec: TypeSpec,
}

impl Adapter for IntAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let n = *expect::<i64>(value, "integer")?;
        match self.spec {
            TypeSpec::Int => buffer.push_int(n as i32),
            TypeSpec::UInt => buffer.push_word(n as u32 as MachineWord),
            TypeSpec::Short => buffer.push_int(n as i16 as i32),
            TypeSpec::UShort => buffer.push_word(n as u16 as MachineWord),
            _ => buffer.push_long(n),
        }
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        let n = match self.spec {
            TypeSpec::Int => i64::from(word as u32 as i32),
            TypeSpec::UInt => i64::from(word as u32),
            TypeSpec::Short => i64::from(word as u16 as i16),
            TypeSpec::UShort => i64::from(word as u16),
            _ => word as i64,
        };
        Ok(int(n))
    }
}

struct CharAdapter;

impl Adapter for CharAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let c = *expect::<char>(value, "char")?;
        buffer.push_char(c as u8 as i8);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(Rc::new(word as u8 as char))
    }
}

struct BoolAdapter;

impl Adapter for BoolAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        buffer.push_bool(*expect::<bool>(value, "bool")?);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(boolean(word != 0))
    }
}

struct FloatAdapter;

impl Adapter for FloatAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        buffer.push_float(*expect::<f64>(value, "float")? as f32);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(float(f64::from(f32::from_bits(word as u32))))
    }
}

struct DoubleAdapter;

impl Adapter for DoubleAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        buffer.push_double(*expect::<f64>(value, "float")?);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(float(f64::from_bits(word as u64)))
    }
}

struct CStringAdapter;

impl Adapter for CStringAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let s = expect::<CString>(value, "C string")?;
        buffer.push_pointer(s.as_ptr() as *const c_void);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        if word == 0 {
            return Err(RobinError::UnsupportedInterface(
                "null C string return".to_string(),
            ));
        }
        let copied = unsafe { CStr::from_ptr(word as *const c_char) }.to_owned();
        Ok(Rc::new(copied))
    }
}

struct PascalStringAdapter;

impl Adapter for PascalStringAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let s = expect::<String>(value, "string")?;
        buffer.push_pointer(s.as_ptr() as *const c_void);
        Ok(())
    }

    fn get(&self, _word: MachineWord) -> Result<HostValue> {
        // Length-prefixed returns would need the length from somewhere.
        Err(RobinError::UnsupportedInterface(
            "string return type".to_string(),
        ))
    }
}

/// Containers cross the boundary as a pointer to the host object; an
/// in-process callee reads it back through the same representation.
struct ListAdapter;

impl Adapter for ListAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let host_list = expect::<HostList>(value, "list")?;
        buffer.push_pointer(host_list as *const HostList as *const c_void);
        Ok(())
    }

    fn get(&self, _word: MachineWord) -> Result<HostValue> {
        Err(RobinError::UnsupportedInterface(
            "list return type".to_string(),
        ))
    }
}

struct DictAdapter;

impl Adapter for DictAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let host_dict = expect::<HostDict>(value, "dict")?;
        buffer.push_pointer(host_dict as *const HostDict as *const c_void);
        Ok(())
    }

    fn get(&self, _word: MachineWord) -> Result<HostValue> {
        Err(RobinError::UnsupportedInterface(
            "dict return type".to_string(),
        ))
    }
}

struct InstanceAdapter {
    class: ClassId,
}

impl Adapter for InstanceAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let instance = Instance::from_host(value)
            .ok_or_else(|| RobinError::InvalidArguments("expected an instance".to_string()))?;
        buffer.push_pointer(instance.pointer());
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        // Wrapping an externally produced pointer: ownership unknown,
        // assume borrowed.
        Ok(Instance::new(word as *mut c_void, self.class, false) as HostValue)
    }
}

struct EnumAdapter {
    enum_id: EnumId,
}

impl Adapter for EnumAdapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()> {
        let n = if let Some(enumerated) = value.downcast_ref::<EnumValue>() {
            enumerated.value
        } else {
            *expect::<i64>(value, "enum")?
        };
        buffer.push_int(n as i32);
        Ok(())
    }

    fn get(&self, word: MachineWord) -> Result<HostValue> {
        Ok(enum_value(self.enum_id, i64::from(word as u32 as i32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDetail;

    #[test]
    fn detects_plain_values() {
        let engine = Engine::new();
        let frontend = SimpleFrontend::install(&engine);
        assert!(matches!(
            frontend.detect_type(&engine, &int(5)).unwrap().detail(),
            TypeDetail::Bounded { .. }
        ));
        assert_eq!(
            frontend.detect_type(&engine, &float(2.5)).unwrap().id(),
            engine.intrinsics().double_.id()
        );
        assert_eq!(
            frontend
                .detect_type(&engine, &string("hello"))
                .unwrap()
                .id(),
            engine.intrinsics().pascal_string.id()
        );
    }

    #[test]
    fn detects_lists_by_element() {
        let engine = Engine::new();
        let frontend = SimpleFrontend::install(&engine);
        let ints = list(vec![int(1), int(2), int(3)]);
        let ty = frontend.detect_type(&engine, &ints).unwrap();
        assert!(matches!(
            ty.detail(),
            TypeDetail::List { element: Some(_) }
        ));

        let empty = list(vec![]);
        assert_eq!(
            frontend.detect_type(&engine, &empty).unwrap().id(),
            engine.empty_list_type().id()
        );
    }

    #[test]
    fn mixed_width_integer_lists_widen() {
        let engine = Engine::new();
        let frontend = SimpleFrontend::install(&engine);
        let mixed = list(vec![int(1), int(5_000_000_000)]);
        let ty = frontend.detect_type(&engine, &mixed).unwrap();
        assert_eq!(
            ty.id(),
            engine.list_type_of(&engine.intrinsics().longlong).id()
        );
    }

    #[test]
    fn instances_detect_as_class_pointers() {
        let engine = Engine::new();
        let frontend = SimpleFrontend::install(&engine);
        let class = engine.create_class("Widget");
        let instance = Instance::new(std::ptr::null_mut(), class.id(), false) as HostValue;
        assert_eq!(
            frontend.detect_type(&engine, &instance).unwrap().id(),
            class.ptr_type().id()
        );
    }
}
