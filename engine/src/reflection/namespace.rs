// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Name-to-entity maps with alias support.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Result, RobinError};
use crate::reflection::class::Class;
use crate::reflection::enumerated::EnumeratedType;
use crate::reflection::overloaded_set::OverloadedSet;

#[derive(Clone)]
pub enum NamespaceItem {
    Class(Rc<Class>),
    Enum(Rc<EnumeratedType>),
    Callable(Rc<OverloadedSet>),
    Namespace(Rc<Namespace>),
}

pub struct Namespace {
    name: String,
    items: RefCell<IndexMap<String, NamespaceItem>>,
    /// alias -> actual name
    aliases: RefCell<IndexMap<String, String>>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Rc<Namespace> {
        Rc::new(Namespace {
            name: name.into(),
            items: RefCell::new(IndexMap::new()),
            aliases: RefCell::new(IndexMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declare(&self, name: impl Into<String>, item: NamespaceItem) {
        self.items.borrow_mut().insert(name.into(), item);
    }

    /// Declare that `aliased` names the same entity as `actual`.
    pub fn alias(&self, actual: &str, aliased: &str) {
        self.aliases
            .borrow_mut()
            .insert(aliased.to_string(), actual.to_string());
    }

    /// Resolve an alias chain to the actual name. Unaliased names map
    /// to themselves.
    pub fn unalias(&self, name: &str) -> String {
        let aliases = self.aliases.borrow();
        let mut current = name;
        let mut hops = 0;
        while let Some(actual) = aliases.get(current) {
            current = actual;
            hops += 1;
            if hops > aliases.len() {
                break; // cyclic aliases; give back what we have
            }
        }
        current.to_string()
    }

    pub fn lookup(&self, name: &str) -> Result<NamespaceItem> {
        let actual = self.unalias(name);
        self.items
            .borrow()
            .get(&actual)
            .cloned()
            .ok_or(RobinError::LookupFailure(actual))
    }

    pub fn lookup_class(&self, name: &str) -> Result<Rc<Class>> {
        match self.lookup(name)? {
            NamespaceItem::Class(class) => Ok(class),
            _ => Err(RobinError::LookupFailure(name.to_string())),
        }
    }

    pub fn lookup_enum(&self, name: &str) -> Result<Rc<EnumeratedType>> {
        match self.lookup(name)? {
            NamespaceItem::Enum(e) => Ok(e),
            _ => Err(RobinError::LookupFailure(name.to_string())),
        }
    }

    pub fn lookup_function(&self, name: &str) -> Result<Rc<OverloadedSet>> {
        match self.lookup(name)? {
            NamespaceItem::Callable(set) => Ok(set),
            _ => Err(RobinError::LookupFailure(name.to_string())),
        }
    }

    pub fn lookup_namespace(&self, name: &str) -> Result<Rc<Namespace>> {
        match self.lookup(name)? {
            NamespaceItem::Namespace(ns) => Ok(ns),
            _ => Err(RobinError::LookupFailure(name.to_string())),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.items.borrow().keys().cloned().collect()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_transitively() {
        let ns = Namespace::new("test");
        ns.declare(
            "actual",
            NamespaceItem::Callable(OverloadedSet::create_new("actual")),
        );
        ns.alias("actual", "older");
        ns.alias("older", "oldest");
        assert_eq!(ns.unalias("oldest"), "actual");
        assert!(ns.lookup_function("oldest").is_ok());
    }

    #[test]
    fn missing_names_fail_lookup() {
        let ns = Namespace::new("test");
        assert!(matches!(
            ns.lookup("nothing"),
            Err(RobinError::LookupFailure(_))
        ));
    }

    #[test]
    fn wrong_kind_fails_lookup() {
        let ns = Namespace::new("test");
        ns.declare(
            "f",
            NamespaceItem::Callable(OverloadedSet::create_new("f")),
        );
        assert!(ns.lookup_class("f").is_err());
        assert!(ns.lookup_function("f").is_ok());
    }
}
