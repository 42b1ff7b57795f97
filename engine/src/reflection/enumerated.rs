// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Enumerated types: a name plus a literal-to-value map.

use std::cell::RefCell;

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;

use crate::error::{Result, RobinError};
use crate::types::TypeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub usize);

pub struct EnumeratedType {
    id: EnumId,
    name: String,
    constants: RefCell<IndexMap<String, i32>>,
    ty: OnceCell<TypeHandle>,
}

impl EnumeratedType {
    pub(crate) fn new(name: String, id: EnumId) -> Self {
        EnumeratedType {
            id,
            name,
            constants: RefCell::new(IndexMap::new()),
            ty: OnceCell::new(),
        }
    }

    pub(crate) fn activate(&self, ty: TypeHandle) {
        self.ty.set(ty).ok();
    }

    pub fn id(&self) -> EnumId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn robin_type(&self) -> TypeHandle {
        self.ty.get().expect("enumerated type not activated").clone()
    }

    pub fn add_constant(&self, literal: impl Into<String>, value: i32) {
        self.constants.borrow_mut().insert(literal.into(), value);
    }

    pub fn value_of(&self, literal: &str) -> Result<i32> {
        self.constants
            .borrow()
            .get(literal)
            .copied()
            .ok_or_else(|| RobinError::LookupFailure(format!("{}::{}", self.name, literal)))
    }

    /// The literal for a runtime value, when one matches.
    pub fn deduce_name(&self, value: i32) -> Option<String> {
        self.constants
            .borrow()
            .iter()
            .find(|(_, v)| **v == value)
            .map(|(literal, _)| literal.clone())
    }

    pub fn literals(&self) -> Vec<String> {
        self.constants.borrow().keys().cloned().collect()
    }
}
