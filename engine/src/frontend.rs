// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The contracts between the engine and a language frontend.
//!
//! The engine treats host values as opaque [`HostValue`] handles. A
//! frontend teaches it what they are: which [`crate::types::RobinType`]
//! each value has, how each type crosses the word boundary
//! ([`Adapter`]), how errors round-trip ([`ErrorHandler`]) and how a
//! host-implemented interface is entered from native code
//! ([`Interceptor`]).

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::buffer::{ArgumentsBuffer, MachineWord};
use crate::engine::Engine;
use crate::error::Result;
use crate::low_level::{Backtrace, DefaultLowLevel, LowLevel};
use crate::reflection::cfunction::Signature;
use crate::types::{RobinType, TypeHandle};

/// An opaque, reference-counted host value.
///
/// Frontends decide the concrete representation; the core only clones and
/// stores these handles.
pub type HostValue = Rc<dyn Any>;

/// The value returned by calls with no declared return type.
pub fn unit_value() -> HostValue {
    Rc::new(())
}

/// Value-level side information attached to a type detection, distinct
/// from the type itself. It participates in dispatch cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Insight(pub u64);

impl Insight {
    pub const NONE: Insight = Insight(0);
}

/// The temporary heap of a single call.
///
/// Every intermediate value produced while applying a conversion route is
/// parked here, so the original host references are never released before
/// the call returns. Dropping the set at call exit releases them all.
#[derive(Default)]
pub struct GarbageCollection {
    kept: Vec<HostValue>,
}

impl GarbageCollection {
    pub fn keep(&mut self, value: HostValue) {
        self.kept.push(value);
    }

    pub fn len(&self) -> usize {
        self.kept.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// Marshals one host value to or from a single machine word.
///
/// Each [`RobinType`] has at most one adapter, installed lazily by the
/// active frontend the first time the type is used for translation.
pub trait Adapter {
    fn put(&self, buffer: &mut ArgumentsBuffer, value: &HostValue) -> Result<()>;
    fn get(&self, word: MachineWord) -> Result<HostValue>;
}

/// What the error handler captured when a call failed.
#[derive(Clone)]
pub enum CapturedError {
    /// An exception object thrown by host code re-entering through an
    /// interceptor; preserved so its identity survives the round trip.
    Host(HostValue),
    /// A native failure, caught first-chance at the call boundary.
    Native { what: String, backtrace: Backtrace },
}

/// First-chance storage for errors crossing the native boundary.
pub trait ErrorHandler {
    fn set_error(&self, error: HostValue);
    fn set_native_error(&self, what: String, backtrace: Backtrace);
    fn get_error(&self) -> Option<CapturedError>;
    fn clear(&self);
}

/// A straightforward single-slot error handler, sufficient for most
/// frontends.
#[derive(Default)]
pub struct CellErrorHandler {
    slot: RefCell<Option<CapturedError>>,
}

impl ErrorHandler for CellErrorHandler {
    fn set_error(&self, error: HostValue) {
        *self.slot.borrow_mut() = Some(CapturedError::Host(error));
    }

    fn set_native_error(&self, what: String, backtrace: Backtrace) {
        *self.slot.borrow_mut() = Some(CapturedError::Native { what, backtrace });
    }

    fn get_error(&self) -> Option<CapturedError> {
        self.slot.borrow().clone()
    }

    fn clear(&self) {
        *self.slot.borrow_mut() = None;
    }
}

/// Reverse-direction dispatch: native code entering a host-implemented
/// interface method. The implementation marshals the argument words
/// forward through the signature's types and the return value backward.
pub trait Interceptor {
    fn invoke(
        &self,
        engine: &Engine,
        signature: &Signature,
        args: &[MachineWord],
    ) -> Result<MachineWord>;
}

/// A language frontend, as seen from the engine.
///
/// The detection methods implement "passive translation": mapping a host
/// value to the most specific [`RobinType`] the engine knows. The
/// `*_value`/`make_*` bridge methods exist so the engine's built-in
/// conversions (numeric promotion, string conversion, container
/// composition) can transform host values without knowing their
/// representation; a frontend only implements the ones its value model
/// supports.
pub trait Frontend {
    /// The most specific type of this host value.
    fn detect_type(&self, engine: &Engine, value: &HostValue) -> Result<TypeHandle>;

    fn detect_insight(&self, _value: &HostValue) -> Insight {
        Insight::NONE
    }

    /// Provide the adapter for a type on first use. Returning `None`
    /// makes any translation through the type fail with
    /// `UnsupportedInterface`.
    fn supply_adapter(&self, engine: &Engine, ty: &RobinType) -> Option<Rc<dyn Adapter>>;

    fn error_handler(&self) -> Rc<dyn ErrorHandler>;

    fn low_level(&self) -> Rc<dyn LowLevel> {
        Rc::new(DefaultLowLevel)
    }

    /// Pin `owner`'s lifetime to `value`'s: called for returned references
    /// whose memory remains owned by the object they came from.
    fn own(&self, _value: &HostValue, _owner: &HostValue) {}

    // Value bridge. All default to "not supported".

    fn int_value(&self, _value: &HostValue) -> Option<i128> {
        None
    }

    fn bool_value(&self, _value: &HostValue) -> Option<bool> {
        None
    }

    fn string_value(&self, _value: &HostValue) -> Option<String> {
        None
    }

    fn make_int(&self, _value: i128) -> Option<HostValue> {
        None
    }

    fn make_float(&self, _value: f64) -> Option<HostValue> {
        None
    }

    fn make_cstring(&self, _value: String) -> Option<HostValue> {
        None
    }

    fn list_items(&self, _value: &HostValue) -> Option<Vec<HostValue>> {
        None
    }

    fn make_list(&self, _items: Vec<HostValue>) -> Option<HostValue> {
        None
    }

    /// Overwrite a host list in place, so callee writes propagate back to
    /// the caller's object. Returns false if unsupported.
    fn replace_list_items(&self, _value: &HostValue, _items: Vec<HostValue>) -> bool {
        false
    }

    fn dict_items(&self, _value: &HostValue) -> Option<Vec<(HostValue, HostValue)>> {
        None
    }

    fn make_dict(&self, _items: Vec<(HostValue, HostValue)>) -> Option<HostValue> {
        None
    }

    fn replace_dict_items(&self, _value: &HostValue, _items: Vec<(HostValue, HostValue)>) -> bool {
        false
    }
}
