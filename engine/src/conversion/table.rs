// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The conversion table and the shortest-path engine over it.
//!
//! The table stores the statically registered edges per source type,
//! plus the per-type edge conversions applied to returned values.
//! Route searches are a Dijkstra variant over a lazily materialized
//! graph: besides the static adjacency lists, each extracted node may
//! inject dynamic edges through its [`ConversionProposer`] (containers
//! and const wrappers do), which is what keeps the graph from holding
//! every `list<T>`-to-`list<U>` edge up front.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

use itertools::Itertools;

use crate::conversion::tree::ConversionTree;
use crate::conversion::{Conversion, ConversionKind, ConversionRoute, Weight};
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::types::{RobinType, TypeDetail, TypeHandle, TypeId};

/// Injects dynamic conversion edges while a route search runs.
///
/// When the search has settled the cheapest route to a type, that type's
/// proposer (if any) is asked how the search could continue from there.
pub trait ConversionProposer {
    fn propose_continuations(
        &self,
        engine: &Engine,
        origin: &RobinType,
        reached: &Weight,
        state: &mut SearchState,
    );
}

/// The live state of one Dijkstra search.
pub struct SearchState {
    const_only: bool,
    heap: BinaryHeap<Reverse<(Weight, u64)>>,
    distance: HashMap<TypeId, Weight>,
    tree: ConversionTree,
}

impl SearchState {
    fn new(source: &TypeHandle, const_only: bool) -> Self {
        let mut state = SearchState {
            const_only,
            heap: BinaryHeap::new(),
            distance: HashMap::new(),
            tree: ConversionTree::new(source),
        };
        state.distance.insert(source.id(), Weight::ZERO);
        state.heap.push(Reverse((Weight::ZERO, source.id().0)));
        state
    }

    /// Whether only one-directional (const-targeted) edges are admitted.
    pub fn const_only(&self) -> bool {
        self.const_only
    }

    /// Offer the search an edge out of a settled node. The edge is kept
    /// only if it improves on the best known distance to its target.
    pub fn relax(&mut self, edge: Rc<Conversion>, reached: &Weight) {
        let total = *reached + edge.weight();
        if !total.is_possible() {
            return;
        }
        let target = edge.target_type();
        let improves = self
            .distance
            .get(&target)
            .map_or(true, |known| total < *known);
        if improves {
            self.distance.insert(target, total);
            self.tree.set_incoming(target, edge);
            self.heap.push(Reverse((total, target.0)));
        }
    }

    /// The edge the search arrived at `ty` through, if any. Container
    /// proposers consult this to refuse chaining two composed edges.
    pub fn incoming_kind(&self, ty: TypeId) -> Option<&ConversionKind> {
        self.tree.incoming(ty).map(|edge| edge.kind())
    }
}

impl RobinType {
    /// Propose how a search that has just settled this type may
    /// continue.
    ///
    /// The basic behavior walks the statically registered outgoing
    /// edges, admitting only const-targeted ones in a const search, and
    /// lets the search step into this type's const wrapper. A type with
    /// an installed [`ConversionProposer`] additionally injects its
    /// dynamic edges.
    pub fn propose_conversion_continuations(
        &self,
        engine: &Engine,
        reached: &Weight,
        state: &mut SearchState,
    ) {
        for edge in engine.conversions().adjacent(self.id()) {
            if state.const_only() && !engine.types().get(edge.target_type()).is_reference() {
                continue;
            }
            state.relax(edge, reached);
        }

        if state.const_only() && !self.is_reference() {
            // The one admissible entry into the const subgraph: wrapping
            // this value as a one-directional view of itself.
            let const_self = engine.const_type_of(&engine.types().get(self.id()));
            let wrap = Conversion::new(
                self.id(),
                const_self.id(),
                Weight::new(1, 0, 0, 0),
                ConversionKind::Trivial,
            );
            state.relax(Rc::new(wrap), reached);
        }

        if let Some(proposer) = self.proposer().cloned() {
            proposer.propose_continuations(engine, self, reached, state);
        }
    }
}

/// The proposer installed on every const wrapper type.
///
/// Rather than materializing a const duplicate of each static edge, the
/// wrapper re-offers its base type's outgoing edges with const-wrapped
/// targets at search time. The mirrored edge applies the same value
/// transformation; only the constness of the endpoint changes.
pub(crate) struct ConstWrapperProposer {
    pub(crate) base: TypeId,
}

impl ConversionProposer for ConstWrapperProposer {
    fn propose_continuations(
        &self,
        engine: &Engine,
        origin: &RobinType,
        reached: &Weight,
        state: &mut SearchState,
    ) {
        for edge in engine.conversions().adjacent(self.base) {
            let target = engine.types().get(edge.target_type());
            if target.is_reference() || target.is_hyper_generic() {
                continue;
            }
            let const_target = engine.const_type_of(&target);
            let mirrored = Conversion::new(
                origin.id(),
                const_target.id(),
                edge.weight(),
                edge.kind().clone(),
            );
            state.relax(Rc::new(mirrored), reached);
        }
    }
}

type RouteCacheKey = (TypeId, TypeId);

/// The process-wide registry of conversion edges.
pub struct ConversionTable {
    graph: RefCell<HashMap<TypeId, Vec<Rc<Conversion>>>>,
    edge_conversions: RefCell<HashMap<TypeId, Rc<Conversion>>>,
    /// `None` is the impossible-route sentinel: a search that already
    /// failed is not repeated.
    route_cache: RefCell<HashMap<RouteCacheKey, Option<Rc<ConversionRoute>>>>,
}

impl ConversionTable {
    pub(crate) fn new() -> Self {
        ConversionTable {
            graph: RefCell::new(HashMap::new()),
            edge_conversions: RefCell::new(HashMap::new()),
            route_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Add an edge between two types.
    ///
    /// Edges entering hyper-generic types are not allowed (there is
    /// always a path which reaches a specific type first); the single
    /// exception is a type's own const wrapper.
    pub fn register_conversion(&self, engine: &Engine, conversion: Conversion) {
        let source = engine.types().get(conversion.source_type());
        let target = engine.types().get(conversion.target_type());
        debug_assert!(
            !target.is_hyper_generic()
                || matches!(target.detail(), TypeDetail::ConstOf(base) if base == source.id()),
            "static conversion edge may not enter hyper-generic type {}",
            target
        );
        log::debug!("add conversion: '{}' to '{}'", source, target);

        self.graph
            .borrow_mut()
            .entry(conversion.source_type())
            .or_default()
            .push(Rc::new(conversion));

        // Outdated caches must not survive a graph change.
        self.force_recompute();
        engine.bump_generation();
    }

    /// Add an exit edge: a conversion applied to every value of its
    /// source type the instant it crosses back from native to host.
    pub fn register_edge_conversion(&self, engine: &Engine, conversion: Conversion) {
        self.edge_conversions
            .borrow_mut()
            .insert(conversion.source_type(), Rc::new(conversion));
        engine.bump_generation();
    }

    pub fn edge_conversion(&self, ty: TypeId) -> Option<Rc<Conversion>> {
        self.edge_conversions.borrow().get(&ty).cloned()
    }

    /// The statically registered edges out of `ty`. Types without edges
    /// are just lonely nodes of degree zero.
    pub(crate) fn adjacent(&self, ty: TypeId) -> Vec<Rc<Conversion>> {
        self.graph.borrow().get(&ty).cloned().unwrap_or_default()
    }

    /// Run the modified Dijkstra search from `source`, stopping early
    /// once `stop` is settled (if given).
    pub fn generate_conversion_tree(
        &self,
        engine: &Engine,
        source: &TypeHandle,
        stop: Option<TypeId>,
        const_only: bool,
    ) -> ConversionTree {
        let mut state = SearchState::new(source, const_only);

        while let Some(Reverse((weight, raw_id))) = state.heap.pop() {
            let id = TypeId(raw_id);
            if state.distance.get(&id) != Some(&weight) {
                continue; // superseded heap entry
            }
            if stop == Some(id) {
                break;
            }
            let ty = engine.types().get(id);
            ty.propose_conversion_continuations(engine, &weight, &mut state);
        }
        state.tree
    }

    /// The minimum-total-weight conversion route between two types.
    pub fn best_single_route(
        &self,
        engine: &Engine,
        from: &TypeHandle,
        to: &TypeHandle,
    ) -> Result<Rc<ConversionRoute>> {
        log::trace!("// trying to convert from <{}> to <{}>", from, to);

        if let Some(cached) = self.route_cache.borrow().get(&(from.id(), to.id())) {
            return match cached {
                Some(route) => Ok(route.clone()),
                None => Err(RobinError::NoApplicableConversion {
                    from: from.type_name().to_string(),
                    to: to.type_name().to_string(),
                }),
            };
        }

        let tree = self.generate_conversion_tree(engine, from, Some(to.id()), to.is_reference());
        match tree.generate_route_to(to) {
            Ok(route) => {
                log::trace!("// @TYPE-DISTANCE: {}", route.total_weight());
                let route = Rc::new(route);
                self.route_cache
                    .borrow_mut()
                    .insert((from.id(), to.id()), Some(route.clone()));
                Ok(route)
            }
            Err(err) => {
                log::trace!("// @TYPE-DISTANCE: IMPOSSIBLE");
                self.route_cache
                    .borrow_mut()
                    .insert((from.id(), to.id()), None);
                Err(err)
            }
        }
    }

    /// Routes for a whole argument vector, one per slot.
    pub fn best_sequence_route(
        &self,
        engine: &Engine,
        actual: &[TypeHandle],
        formal: &[TypeHandle],
    ) -> Result<Vec<Rc<ConversionRoute>>> {
        actual
            .iter()
            .zip_eq(formal.iter())
            .map(|(a, f)| self.best_single_route(engine, a, f))
            .collect()
    }

    /// Flush the route cache, so the next request recomputes.
    pub fn force_recompute(&self) {
        self.route_cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::frontend::GarbageCollection;

    fn supplied_edge(engine: &Engine, from: &TypeHandle, to: &TypeHandle, weight: Weight) {
        engine.conversions().register_conversion(
            engine,
            Conversion::new(
                from.id(),
                to.id(),
                weight,
                ConversionKind::Supplied {
                    label: "test",
                    apply: Rc::new(|_, v| Ok(v.clone())),
                },
            ),
        );
    }

    #[test]
    fn picks_the_cheaper_of_two_paths() {
        let engine = Engine::new();
        let a = &engine.intrinsics().cstring;
        let b = &engine.intrinsics().element;
        let c = &engine.intrinsics().element_borrowed;
        // direct expensive edge, and a two-hop cheap one
        supplied_edge(&engine, a, c, Weight::new(0, 0, 0, 3));
        supplied_edge(&engine, a, b, Weight::new(0, 0, 0, 1));
        supplied_edge(&engine, b, c, Weight::new(0, 0, 0, 1));

        let route = engine
            .conversions()
            .best_single_route(&engine, a, c)
            .unwrap();
        assert_eq!(route.total_weight(), Weight::new(0, 0, 0, 2));
        assert_eq!(route.steps().len(), 2);
    }

    #[test]
    fn impossible_routes_are_remembered() {
        let engine = Engine::new();
        let from = &engine.intrinsics().cstring;
        let to = &engine.intrinsics().element;
        for _ in 0..2 {
            let err = engine
                .conversions()
                .best_single_route(&engine, from, to)
                .unwrap_err();
            assert!(matches!(err, RobinError::NoApplicableConversion { .. }));
        }
    }

    #[test]
    fn registering_an_edge_flushes_the_cache() {
        let engine = Engine::new();
        let from = engine.intrinsics().cstring.clone();
        let to = engine.intrinsics().element.clone();
        assert!(engine
            .conversions()
            .best_single_route(&engine, &from, &to)
            .is_err());
        supplied_edge(&engine, &from, &to, Weight::new(0, 0, 0, 1));
        let route = engine
            .conversions()
            .best_single_route(&engine, &from, &to)
            .unwrap();
        assert_eq!(route.total_weight(), Weight::new(0, 0, 0, 1));
    }

    #[test]
    fn identity_route_is_zero_work() {
        let engine = Engine::new();
        let t = engine.intrinsics().int_.clone();
        let route = engine
            .conversions()
            .best_single_route(&engine, &t, &t)
            .unwrap();
        assert_eq!(route.total_weight(), Weight::ZERO);
        assert!(route.is_zero_work());
    }

    #[test]
    fn const_search_reaches_the_wrapped_target() {
        let engine = Engine::new();
        let double_ = engine.intrinsics().double_.clone();
        let const_double = engine.const_type_of(&double_);
        let route = engine
            .conversions()
            .best_single_route(&engine, &double_, &const_double)
            .unwrap();
        // one elided zero-work wrap
        assert_eq!(route.total_weight(), Weight::new(1, 0, 0, 0));
        assert!(route.is_zero_work());
    }

    #[test]
    fn routes_apply_left_to_right() {
        let engine = Engine::new();
        let a = &engine.intrinsics().cstring;
        let b = &engine.intrinsics().element;
        engine.conversions().register_conversion(
            &engine,
            Conversion::new(
                a.id(),
                b.id(),
                Weight::new(0, 0, 0, 1),
                ConversionKind::Supplied {
                    label: "stamp",
                    apply: Rc::new(|_, _| Ok(Rc::new(17i64) as crate::frontend::HostValue)),
                },
            ),
        );
        let route = engine.conversions().best_single_route(&engine, a, b).unwrap();
        let mut gc = GarbageCollection::default();
        let out = route
            .apply(&engine, &(Rc::new(0i64) as crate::frontend::HostValue), &mut gc)
            .unwrap();
        assert_eq!(*out.downcast::<i64>().unwrap(), 17);
        assert_eq!(gc.len(), 1);
    }
}
