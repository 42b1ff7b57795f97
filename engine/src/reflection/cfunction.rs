// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A single native function and its calling convention.

use std::collections::HashMap;
use std::fmt;
use std::os::raw::c_void;

use indexmap::IndexMap;

use crate::buffer::{ArgumentsBuffer, MachineWord};
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{unit_value, HostValue};
use crate::low_level::{DefaultLowLevel, FunctionSymbol, LowLevel, NativeError, ARGUMENT_ARRAY_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    GlobalFunction,
    Method,
    StaticMethod,
    Constructor,
    Destructor,
}

/// A declared prototype with nothing to call: what the engine stores for
/// a pure virtual method, so a frontend can dispatch it through a
/// host-implemented interceptor.
pub struct Signature {
    pub name: String,
    pub return_type: Option<crate::types::TypeHandle>,
    pub arguments: Vec<crate::types::TypeHandle>,
}

/// An immutable record of one native entry point: symbol address, kind,
/// formal parameter list and return type.
///
/// Built mutably during registration, then frozen behind an `Rc` for the
/// rest of the process lifetime.
pub struct CFunction {
    symbol: FunctionSymbol,
    name: String,
    kind: FunctionKind,
    class_name: Option<String>,
    return_type: Option<crate::types::TypeHandle>,
    /// False when the returned memory stays owned by somebody else (a
    /// reference return); the caller's wrapper is then pinned to the
    /// owner instead of freeing the value.
    return_is_owner: bool,
    /// Edge conversions on the return value can be suppressed per
    /// function at registration time.
    allow_edge: bool,
    formals: Vec<(String, crate::types::TypeHandle)>,
    positions: HashMap<String, usize>,
}

impl CFunction {
    pub fn new(symbol: FunctionSymbol, name: impl Into<String>, kind: FunctionKind) -> Self {
        CFunction {
            symbol,
            name: name.into(),
            kind,
            class_name: None,
            return_type: None,
            return_is_owner: true,
            allow_edge: true,
            formals: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn set_class_name(&mut self, class_name: impl Into<String>) {
        self.class_name = Some(class_name.into());
    }

    /// Set the expected type of the value returned from the function.
    pub fn specify_return_type(&mut self, ty: crate::types::TypeHandle) {
        self.return_type = Some(ty);
    }

    /// `is_return_owner` is false when the returned value does not own
    /// its memory (the call's owner object does).
    pub fn supply_memory_management_hint(&mut self, is_return_owner: bool) {
        self.return_is_owner = is_return_owner;
    }

    pub fn set_allow_edge_conversions(&mut self, allow: bool) {
        self.allow_edge = allow;
    }

    /// Append a formal argument; consecutive calls build the prototype
    /// in order.
    pub fn add_formal_argument(&mut self, name: impl Into<String>, ty: crate::types::TypeHandle) {
        let name = name.into();
        if !name.is_empty() {
            self.positions.insert(name.clone(), self.formals.len());
        }
        self.formals.push((name, ty));
    }

    /// An anonymous formal argument.
    pub fn add_anonymous_argument(&mut self, ty: crate::types::TypeHandle) {
        self.add_formal_argument("", ty);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn arity(&self) -> usize {
        self.formals.len()
    }

    pub fn signature(&self) -> &[(String, crate::types::TypeHandle)] {
        &self.formals
    }

    pub fn formal_types(&self) -> Vec<crate::types::TypeHandle> {
        self.formals.iter().map(|(_, ty)| ty.clone()).collect()
    }

    pub fn return_type(&self) -> Option<&crate::types::TypeHandle> {
        self.return_type.as_ref()
    }

    pub fn allow_edge_conversions(&self) -> bool {
        self.allow_edge
    }

    /// Whether two alternatives have the very same formal prototype.
    /// This happens legitimately, e.g. for the const and non-const
    /// versions of a method, and such pairs must not count as ambiguous.
    pub fn structurally_identical(&self, other: &CFunction) -> bool {
        self.formals.len() == other.formals.len()
            && self
                .formals
                .iter()
                .zip(other.formals.iter())
                .all(|((_, a), (_, b))| a.id() == b.id())
    }

    /// Fold keyword arguments into their positional slots, in this
    /// function's canonical order.
    pub fn merge_with_keyword_arguments<T: Clone>(
        &self,
        positional: &[T],
        named: &IndexMap<String, T>,
    ) -> Result<Vec<T>> {
        if positional.len() > self.formals.len() {
            return Err(RobinError::InvalidArguments(format!(
                "'{}' takes {} arguments, {} given positionally",
                self.name,
                self.formals.len(),
                positional.len()
            )));
        }
        let mut slots: Vec<Option<T>> = positional.iter().cloned().map(Some).collect();
        slots.resize(self.formals.len(), None);

        for (name, value) in named {
            let position = *self.positions.get(name).ok_or_else(|| {
                RobinError::InvalidArguments(format!(
                    "'{}' has no argument named '{}'",
                    self.name, name
                ))
            })?;
            if position < positional.len() {
                return Err(RobinError::InvalidArguments(format!(
                    "'{}' got multiple values for argument '{}'",
                    self.name, name
                )));
            }
            if slots[position].is_some() {
                return Err(RobinError::InvalidArguments(format!(
                    "'{}' got argument '{}' twice",
                    self.name, name
                )));
            }
            slots[position] = Some(value.clone());
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    RobinError::InvalidArguments(format!(
                        "'{}' is missing argument '{}'",
                        self.name, self.formals[index].0
                    ))
                })
            })
            .collect()
    }

    /// The medium-level call: translate each argument through its formal
    /// type's adapter into a word buffer, invoke the symbol, translate
    /// the returned word back.
    pub fn call(
        &self,
        engine: &Engine,
        args: &[HostValue],
        owner: Option<&HostValue>,
    ) -> Result<HostValue> {
        if args.len() != self.formals.len() {
            return Err(RobinError::InvalidArguments(format!(
                "'{}' takes {} arguments, {} given",
                self.name,
                self.formals.len(),
                args.len()
            )));
        }
        if args.len() > ARGUMENT_ARRAY_LIMIT {
            return Err(RobinError::ArgumentArrayLimitExceeded(args.len()));
        }

        let mut buffer = ArgumentsBuffer::new();
        for ((_, ty), value) in self.formals.iter().zip(args.iter()) {
            ty.put(engine, &mut buffer, value)?;
        }

        // A frontend may be absent for frontend-less native calls; the
        // default trampoline serves those.
        let frontend = engine.frontend().ok();
        let low_level = frontend
            .as_ref()
            .map(|f| f.low_level())
            .unwrap_or_else(|| std::rc::Rc::new(DefaultLowLevel));

        let outcome: std::result::Result<Option<MachineWord>, NativeError> = unsafe {
            if self.return_type.is_some() {
                low_level.call(self.symbol, buffer.as_words()).map(Some)
            } else {
                low_level.call_void(self.symbol, buffer.as_words()).map(|_| None)
            }
        };

        let word = match outcome {
            Ok(word) => word,
            Err(native) => {
                log::trace!("// @FIRST-CHANCE-EXCEPTION: {}", native.what);
                if let Some(frontend) = &frontend {
                    let handler = frontend.error_handler();
                    if handler.get_error().is_none() {
                        handler.set_native_error(native.what.clone(), native.backtrace);
                    }
                }
                return Err(RobinError::UserExceptionOccurred(native.what));
            }
        };

        match (&self.return_type, word) {
            (Some(return_type), Some(word)) => {
                let value = return_type.get(engine, word)?;
                Ok(self.owned(engine, value, owner))
            }
            _ => Ok(unit_value()),
        }
    }

    fn owned(&self, engine: &Engine, value: HostValue, owner: Option<&HostValue>) -> HostValue {
        if !self.return_is_owner {
            if let (Ok(frontend), Some(owner)) = (engine.frontend(), owner) {
                frontend.own(&value, owner);
            }
        }
        value
    }

    /// Directly call the underlying symbol with a single raw pointer,
    /// bypassing the marshalling pipeline. Destructors only.
    ///
    /// # Safety
    ///
    /// `this` must point at a live object of the class this destructor
    /// belongs to.
    pub unsafe fn call_destructor(&self, this: *mut c_void) {
        debug_assert_eq!(self.kind, FunctionKind::Destructor);
        let _ = DefaultLowLevel.call_void(self.symbol, &[this as MachineWord]);
    }
}

impl fmt::Display for CFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (skip_first_param, skip_return) = match self.kind {
            FunctionKind::Method => (true, false),
            FunctionKind::Constructor | FunctionKind::Destructor => (false, true),
            FunctionKind::GlobalFunction | FunctionKind::StaticMethod => (false, false),
        };

        if !skip_return {
            match &self.return_type {
                Some(ty) => write!(f, "{} ", ty)?,
                None => f.write_str("void ")?,
            }
        }
        if let Some(class_name) = &self.class_name {
            write!(f, "{}::", class_name)?;
        }
        write!(f, "{}(", self.name)?;

        let start = usize::from(skip_first_param);
        for (index, (name, ty)) in self.formals.iter().enumerate().skip(start) {
            if index > start {
                f.write_str(", ")?;
            }
            write!(f, "{}", ty)?;
            if !name.is_empty() {
                write!(f, " {}", name)?;
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use indexmap::indexmap;
    use std::ptr;

    fn named_pair(engine: &Engine) -> CFunction {
        let mut f = CFunction::new(
            FunctionSymbol(ptr::null()),
            "m",
            FunctionKind::GlobalFunction,
        );
        f.add_formal_argument("x", engine.intrinsics().int_.clone());
        f.add_formal_argument("y", engine.intrinsics().int_.clone());
        f
    }

    #[test]
    fn keyword_merge_reorders() {
        let engine = Engine::new();
        let f = named_pair(&engine);
        let merged = f
            .merge_with_keyword_arguments(&[], &indexmap! {"y".to_string() => 2, "x".to_string() => 1})
            .unwrap();
        assert_eq!(merged, vec![1, 2]);

        let merged = f
            .merge_with_keyword_arguments(&[1], &indexmap! {"y".to_string() => 2})
            .unwrap();
        assert_eq!(merged, vec![1, 2]);
    }

    #[test]
    fn keyword_merge_rejects_bad_shapes() {
        let engine = Engine::new();
        let f = named_pair(&engine);
        // unknown keyword
        assert!(f
            .merge_with_keyword_arguments(&[1], &indexmap! {"z".to_string() => 2})
            .is_err());
        // shadows a positional
        assert!(f
            .merge_with_keyword_arguments(&[1, 2], &indexmap! {"x".to_string() => 3})
            .is_err());
        // missing parameter
        assert!(f
            .merge_with_keyword_arguments(&[1], &IndexMap::new())
            .is_err());
        // extra positional
        assert!(f
            .merge_with_keyword_arguments(&[1, 2, 3], &IndexMap::new())
            .is_err());
    }

    #[test]
    fn keyword_call_on_anonymous_signature_fails() {
        let engine = Engine::new();
        let mut f = CFunction::new(
            FunctionSymbol(ptr::null()),
            "anon",
            FunctionKind::GlobalFunction,
        );
        f.add_anonymous_argument(engine.intrinsics().int_.clone());
        let err = f
            .merge_with_keyword_arguments(&[], &indexmap! {"x".to_string() => 1})
            .unwrap_err();
        assert!(matches!(err, RobinError::InvalidArguments(_)));
    }

    #[test]
    fn display_shows_the_prototype() {
        let engine = Engine::new();
        let mut f = CFunction::new(
            FunctionSymbol(ptr::null()),
            "area",
            FunctionKind::Method,
        );
        f.set_class_name("Rect");
        f.specify_return_type(engine.intrinsics().long_.clone());
        f.add_formal_argument("self", engine.intrinsics().int_.clone());
        f.add_formal_argument("scale", engine.intrinsics().double_.clone());
        assert_eq!(format!("{}", f), "long Rect::area(double scale)");
    }
}
