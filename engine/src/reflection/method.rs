// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Instance methods: an overload set callable with a bound `self`.

use std::rc::Rc;

use crate::engine::Engine;
use crate::error::Result;
use crate::frontend::HostValue;
use crate::reflection::overloaded_set::{KeywordArguments, OverloadedSet};

/// An overload set whose alternatives expect the instance as their
/// first argument. Calling it prepends `self` to the positional list
/// and delegates; the instance also becomes the owner of any returned
/// reference, pinning its lifetime correctly.
pub struct CallableWithInstance {
    overloads: Rc<OverloadedSet>,
}

impl CallableWithInstance {
    pub(crate) fn new(overloads: Rc<OverloadedSet>) -> Self {
        CallableWithInstance { overloads }
    }

    pub fn overloads(&self) -> &Rc<OverloadedSet> {
        &self.overloads
    }

    pub fn call_with_instance(
        &self,
        engine: &Engine,
        instance: &HostValue,
        args: &[HostValue],
        kwargs: &KeywordArguments,
    ) -> Result<HostValue> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(instance.clone());
        full.extend_from_slice(args);
        self.overloads.call(engine, &full, kwargs, Some(instance))
    }
}
