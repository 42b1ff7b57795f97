// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! An imported native library and its global namespace.

use std::rc::Rc;

use crate::reflection::namespace::Namespace;

pub struct Library {
    name: String,
    global: Rc<Namespace>,
}

impl Library {
    pub fn new(name: impl Into<String>) -> Rc<Library> {
        let name = name.into();
        let global = Namespace::new(name.clone());
        Rc::new(Library { name, global })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global_namespace(&self) -> &Rc<Namespace> {
        &self.global
    }
}
