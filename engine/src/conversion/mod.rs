// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Implicit conversions as a weighted directed graph.
//!
//! Types are nodes; each [`Conversion`] is an edge carrying a
//! lexicographic [`Weight`]. Converting between two types reduces to a
//! shortest-path problem, solved in [`table`]. The edge behaviors
//! themselves live here as one closed sum, [`ConversionKind`]; per-kind
//! data is held inline so applying an edge costs one match and no
//! virtual dispatch.

pub mod table;
pub mod tree;

use std::cmp::max;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::rc::Rc;

use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{GarbageCollection, HostValue};
use crate::reflection::cfunction::CFunction;
use crate::reflection::class::ClassId;
use crate::reflection::instance::Instance;
use crate::types::TypeId;
use robin_parser::UpcastFn;

/// The price of one conversion, or of a whole route.
///
/// Four counters, compared lexicographically left to right: trivial
/// (epsilon) conversions, promotions, up-casts, user-defined
/// conversions. Addition is component-wise and saturating, so
/// [`Weight::INFINITE`] is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Weight {
    epsilon: i32,
    promotion: i32,
    upcast: i32,
    user_defined: i32,
}

impl Weight {
    pub const ZERO: Weight = Weight::new(0, 0, 0, 0);
    pub const INFINITE: Weight = Weight::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX);

    pub const fn new(epsilon: i32, promotion: i32, upcast: i32, user_defined: i32) -> Self {
        Weight {
            epsilon,
            promotion,
            upcast,
            user_defined,
        }
    }

    /// A weight is possible iff every component is finite.
    pub fn is_possible(&self) -> bool {
        self.epsilon != i32::MAX
            && self.promotion != i32::MAX
            && self.upcast != i32::MAX
            && self.user_defined != i32::MAX
    }

    pub fn epsilon(&self) -> i32 {
        self.epsilon
    }

    pub fn promotion(&self) -> i32 {
        self.promotion
    }

    pub fn upcast(&self) -> i32 {
        self.upcast
    }

    pub fn user_defined(&self) -> i32 {
        self.user_defined
    }
}

impl Add for Weight {
    type Output = Weight;

    fn add(self, other: Weight) -> Weight {
        if !self.is_possible() || !other.is_possible() {
            return Weight::INFINITE;
        }
        Weight {
            epsilon: self.epsilon.saturating_add(other.epsilon),
            promotion: self.promotion.saturating_add(other.promotion),
            upcast: self.upcast.saturating_add(other.upcast),
            user_defined: self.user_defined.saturating_add(other.user_defined),
        }
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, other: Weight) {
        *self = *self + other;
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_possible() {
            write!(
                f,
                "(eps={} prom={} up={} user={})",
                self.epsilon, self.promotion, self.upcast, self.user_defined
            )
        } else {
            f.write_str("(infinite)")
        }
    }
}

/// A frontend- or user-supplied edge behavior.
pub type SuppliedFn = Rc<dyn Fn(&Engine, &HostValue) -> Result<HostValue>>;

/// The behavior of a conversion edge.
#[derive(Clone)]
pub enum ConversionKind {
    /// Connects types that differ only in semantic meaning; the value
    /// itself is untouched, so the edge can be elided when a route is
    /// applied (its weight still counts).
    Trivial,
    /// Integer to floating-point promotion.
    IntToFloat,
    /// Length-prefixed string to null-terminated C string.
    PascalToCString,
    /// Invoke a one-argument constructor of `class`.
    ViaConstruction {
        class: ClassId,
        ctor: Rc<CFunction>,
    },
    /// Apply a base-pointer adjustment callback to an instance.
    UpCast { adjust: UpcastFn },
    /// Element-wise conversion of a host list. The const variant builds
    /// a fresh container; the in-place variant overwrites the original so
    /// callee writes reach the caller's object.
    ListCompose {
        element: Rc<ConversionRoute>,
        in_place: bool,
    },
    /// As [`ConversionKind::ListCompose`], over key/value pairs.
    DictCompose {
        key: Rc<ConversionRoute>,
        value: Rc<ConversionRoute>,
        in_place: bool,
    },
    /// Arbitrary behavior provided from outside the engine.
    Supplied { label: &'static str, apply: SuppliedFn },
}

impl fmt::Debug for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConversionKind::Trivial => "trivial",
            ConversionKind::IntToFloat => "int-to-float",
            ConversionKind::PascalToCString => "pascal-to-cstring",
            ConversionKind::ViaConstruction { .. } => "via-construction",
            ConversionKind::UpCast { .. } => "up-cast",
            ConversionKind::ListCompose { .. } => "list-compose",
            ConversionKind::DictCompose { .. } => "dict-compose",
            ConversionKind::Supplied { label, .. } => *label,
        };
        f.write_str(label)
    }
}

/// A directed edge of the conversion graph.
pub struct Conversion {
    source: TypeId,
    target: TypeId,
    weight: Weight,
    kind: ConversionKind,
}

impl Conversion {
    pub fn new(source: TypeId, target: TypeId, weight: Weight, kind: ConversionKind) -> Self {
        Conversion {
            source,
            target,
            weight,
            kind,
        }
    }

    pub fn source_type(&self) -> TypeId {
        self.source
    }

    pub fn target_type(&self) -> TypeId {
        self.target
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    pub fn kind(&self) -> &ConversionKind {
        &self.kind
    }

    /// Zero-work conversions return the value unchanged; the route
    /// application pipeline skips them while still accumulating their
    /// weight.
    pub fn is_zero_work(&self) -> bool {
        matches!(self.kind, ConversionKind::Trivial)
    }

    /// Transform a host value of the source type into one of the target
    /// type. Intermediates created along the way are kept alive in `gc`
    /// until the originating call returns.
    pub fn apply(
        &self,
        engine: &Engine,
        value: &HostValue,
        gc: &mut GarbageCollection,
    ) -> Result<HostValue> {
        match &self.kind {
            ConversionKind::Trivial => Ok(value.clone()),
            ConversionKind::IntToFloat => {
                let frontend = engine.frontend()?;
                let n = frontend
                    .int_value(value)
                    .ok_or_else(|| RobinError::UnsupportedInterface("int value".to_string()))?;
                frontend
                    .make_float(n as f64)
                    .ok_or_else(|| RobinError::UnsupportedInterface("float value".to_string()))
            }
            ConversionKind::PascalToCString => {
                let frontend = engine.frontend()?;
                let s = frontend
                    .string_value(value)
                    .ok_or_else(|| RobinError::UnsupportedInterface("string value".to_string()))?;
                frontend
                    .make_cstring(s)
                    .ok_or_else(|| RobinError::UnsupportedInterface("C string value".to_string()))
            }
            ConversionKind::ViaConstruction { class, ctor } => {
                let created = ctor.call(engine, &[value.clone()], None)?;
                engine.class(*class).instance_from_created(&created)
            }
            ConversionKind::UpCast { adjust } => {
                let instance = Instance::from_host(value).ok_or_else(|| {
                    RobinError::UnsupportedInterface("instance value".to_string())
                })?;
                let base_class = engine
                    .class_of_type(&engine.types().get(self.target))
                    .ok_or_else(|| {
                        RobinError::UnsupportedInterface("up-cast target".to_string())
                    })?;
                let adjusted = unsafe { adjust(instance.pointer()) };
                let cast = Instance::new(adjusted, base_class.id(), false);
                // The adjusted pointer aliases the original allocation.
                cast.bond_to(value.clone());
                Ok(cast as HostValue)
            }
            ConversionKind::ListCompose { element, in_place } => {
                let frontend = engine.frontend()?;
                let items = frontend
                    .list_items(value)
                    .ok_or_else(|| RobinError::UnsupportedInterface("list value".to_string()))?;
                let converted = items
                    .iter()
                    .map(|item| element.apply(engine, item, gc))
                    .collect::<Result<Vec<_>>>()?;
                if *in_place {
                    if !frontend.replace_list_items(value, converted) {
                        return Err(RobinError::UnsupportedInterface(
                            "in-place list update".to_string(),
                        ));
                    }
                    Ok(value.clone())
                } else {
                    frontend
                        .make_list(converted)
                        .ok_or_else(|| RobinError::UnsupportedInterface("list value".to_string()))
                }
            }
            ConversionKind::DictCompose {
                key,
                value: value_route,
                in_place,
            } => {
                let frontend = engine.frontend()?;
                let entries = frontend
                    .dict_items(value)
                    .ok_or_else(|| RobinError::UnsupportedInterface("dict value".to_string()))?;
                let converted = entries
                    .iter()
                    .map(|(k, v)| {
                        Ok((
                            key.apply(engine, k, gc)?,
                            value_route.apply(engine, v, gc)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                if *in_place {
                    if !frontend.replace_dict_items(value, converted) {
                        return Err(RobinError::UnsupportedInterface(
                            "in-place dict update".to_string(),
                        ));
                    }
                    Ok(value.clone())
                } else {
                    frontend
                        .make_dict(converted)
                        .ok_or_else(|| RobinError::UnsupportedInterface("dict value".to_string()))
                }
            }
            ConversionKind::Supplied { apply, .. } => apply(engine, value),
        }
    }

    /// The weight two container sub-routes compose to.
    pub(crate) fn composed_weight(key: Weight, value: Weight) -> Weight {
        max(key, value)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {:?} {}",
            self.source, self.target, self.kind, self.weight
        )
    }
}

/// A minimal-weight chain of conversions between two types.
///
/// Zero-work edges are elided from the step list for efficiency; their
/// weight is preserved in `extra` so [`ConversionRoute::total_weight`]
/// still reports the full route price.
#[derive(Clone, Default)]
pub struct ConversionRoute {
    steps: Vec<Rc<Conversion>>,
    extra: Weight,
}

impl ConversionRoute {
    pub fn empty() -> Self {
        ConversionRoute {
            steps: Vec::new(),
            extra: Weight::ZERO,
        }
    }

    pub(crate) fn from_steps(steps: Vec<Rc<Conversion>>, extra: Weight) -> Self {
        ConversionRoute { steps, extra }
    }

    pub fn add_extra_weight(&mut self, amount: Weight) {
        self.extra += amount;
    }

    pub fn steps(&self) -> &[Rc<Conversion>] {
        &self.steps
    }

    pub fn total_weight(&self) -> Weight {
        self.steps
            .iter()
            .fold(self.extra, |acc, step| acc + step.weight())
    }

    /// True when applying the route would return the value unchanged.
    pub fn is_zero_work(&self) -> bool {
        self.steps.is_empty()
    }

    /// Thread `value` through every non-zero-work edge in order.
    pub fn apply(
        &self,
        engine: &Engine,
        value: &HostValue,
        gc: &mut GarbageCollection,
    ) -> Result<HostValue> {
        let mut current = value.clone();
        for step in &self.steps {
            current = step.apply(engine, &current, gc)?;
            gc.keep(current.clone());
        }
        Ok(current)
    }
}

impl fmt::Debug for ConversionRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route[{} steps, {}]", self.steps.len(), self.total_weight())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_compare_lexicographically() {
        let promotion = Weight::new(0, 1, 0, 0);
        let two_promotions = Weight::new(0, 2, 0, 0);
        let epsilon = Weight::new(1, 0, 0, 0);
        assert!(promotion < two_promotions);
        assert!(promotion < epsilon);
        assert!(Weight::ZERO < promotion);
        assert!(two_promotions < Weight::INFINITE);
    }

    #[test]
    fn addition_is_componentwise() {
        let a = Weight::new(1, 0, 2, 0);
        let b = Weight::new(0, 3, 1, 1);
        assert_eq!(a + b, Weight::new(1, 3, 3, 1));
    }

    #[test]
    fn infinite_is_absorbing() {
        let a = Weight::new(1, 1, 1, 1);
        assert_eq!(a + Weight::INFINITE, Weight::INFINITE);
        assert!(!(a + Weight::INFINITE).is_possible());
    }

    #[test]
    fn addition_is_monotonic() {
        // if a <= b then a + c <= b + c
        let samples = [
            Weight::ZERO,
            Weight::new(1, 0, 0, 0),
            Weight::new(0, 2, 0, 0),
            Weight::new(0, 0, 1, 3),
            Weight::new(2, 1, 1, 0),
        ];
        for a in samples {
            for b in samples {
                for c in samples {
                    if a <= b {
                        assert!(a + c <= b + c, "{} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn route_weight_includes_elided_edges() {
        let mut route = ConversionRoute::empty();
        assert_eq!(route.total_weight(), Weight::ZERO);
        route.add_extra_weight(Weight::new(2, 0, 0, 0));
        assert_eq!(route.total_weight(), Weight::new(2, 0, 0, 0));
        assert!(route.is_zero_work());
    }
}
