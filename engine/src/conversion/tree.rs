// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The predecessor map a single shortest-path search produces.

use std::collections::HashMap;
use std::rc::Rc;

use crate::conversion::{Conversion, ConversionRoute, Weight};
use crate::error::{Result, RobinError};
use crate::types::{TypeHandle, TypeId};

/// For every type reached from `source`, the edge it was reached
/// through. Walking predecessors back from a target reconstructs the
/// cheapest route to it.
pub struct ConversionTree {
    source: TypeId,
    source_name: String,
    incoming: HashMap<TypeId, Rc<Conversion>>,
}

impl ConversionTree {
    pub(crate) fn new(source: &TypeHandle) -> Self {
        ConversionTree {
            source: source.id(),
            source_name: source.type_name().to_string(),
            incoming: HashMap::new(),
        }
    }

    pub fn source(&self) -> TypeId {
        self.source
    }

    pub(crate) fn set_incoming(&mut self, target: TypeId, edge: Rc<Conversion>) {
        self.incoming.insert(target, edge);
    }

    pub(crate) fn incoming(&self, target: TypeId) -> Option<&Rc<Conversion>> {
        self.incoming.get(&target)
    }

    pub fn reaches(&self, target: TypeId) -> bool {
        target == self.source || self.incoming.contains_key(&target)
    }

    /// Reconstruct the route from the search source to `dest`.
    ///
    /// Zero-work edges along the way are elided but their weight is
    /// carried over, so the returned route's total weight equals the
    /// distance the search computed.
    pub fn generate_route_to(&self, dest: &TypeHandle) -> Result<ConversionRoute> {
        let mut reversed: Vec<Rc<Conversion>> = Vec::new();
        let mut extra = Weight::ZERO;

        let mut tail = dest.id();
        while tail != self.source {
            let edge = self.incoming.get(&tail).ok_or_else(|| {
                log::trace!("// @TYPE-DISTANCE: infinite");
                RobinError::NoApplicableConversion {
                    from: self.source_name.clone(),
                    to: dest.type_name().to_string(),
                }
            })?;
            if edge.is_zero_work() {
                extra += edge.weight();
            } else {
                reversed.push(edge.clone());
            }
            tail = edge.source_type();
        }

        reversed.reverse();
        Ok(ConversionRoute::from_steps(reversed, extra))
    }
}
