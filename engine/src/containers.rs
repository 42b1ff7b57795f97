// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Dynamic conversion edges for container types.
//!
//! A `list<T>` never registers static edges to other lists; with every
//! element conversion yielding one list-to-list conversion, the graph
//! would hold O(types^2) edges nobody asked for. Instead each container
//! type carries a proposer which, once the search settles on it, runs an
//! inner search over the element type's const subgraph and offers one
//! composed edge per known target container.

use std::rc::Rc;

use crate::conversion::table::{ConversionProposer, SearchState};
use crate::conversion::{Conversion, ConversionKind, ConversionRoute, Weight};
use crate::engine::Engine;
use crate::types::{RobinType, TypeDetail, TypeHandle};

/// A composed edge never extends a route that already ends in a composed
/// edge; the restriction breaks the cycles that lists-of-lists could
/// otherwise spin up.
fn chains_composed(state: &SearchState, origin: &RobinType) -> bool {
    matches!(
        state.incoming_kind(origin.id()),
        Some(ConversionKind::ListCompose { .. }) | Some(ConversionKind::DictCompose { .. })
    )
}

pub(crate) struct ListProposer;

impl ConversionProposer for ListProposer {
    fn propose_continuations(
        &self,
        engine: &Engine,
        origin: &RobinType,
        reached: &Weight,
        state: &mut SearchState,
    ) {
        if chains_composed(state, origin) {
            return;
        }
        let element = match origin.detail() {
            TypeDetail::List { element } => element,
            _ => return,
        };
        let in_place = !state.const_only();

        match element {
            None => {
                // The empty list belongs to every list type at once;
                // materializing it as any concrete list costs one
                // promotion and no element work.
                for list_ty in engine.types().concrete_list_types() {
                    let target = search_target(engine, state, &list_ty);
                    let edge = Conversion::new(
                        origin.id(),
                        target.id(),
                        Weight::new(0, 1, 0, 0),
                        ConversionKind::ListCompose {
                            element: Rc::new(ConversionRoute::empty()),
                            in_place,
                        },
                    );
                    state.relax(Rc::new(edge), reached);
                }
            }
            Some(element) => {
                let element = engine.types().get(element);
                let element_tree =
                    engine
                        .conversions()
                        .generate_conversion_tree(engine, &element, None, true);
                for list_ty in engine.types().concrete_list_types() {
                    if list_ty.id() == origin.id() {
                        continue;
                    }
                    let target_element = match list_ty.detail() {
                        TypeDetail::List {
                            element: Some(target_element),
                        } => engine.types().get(target_element),
                        _ => continue,
                    };
                    let element_route = match element_tree
                        .generate_route_to(&engine.const_type_of(&target_element))
                    {
                        Ok(route) => route,
                        Err(_) => continue, // element not reachable
                    };
                    let weight = element_route.total_weight();
                    let target = search_target(engine, state, &list_ty);
                    let edge = Conversion::new(
                        origin.id(),
                        target.id(),
                        weight,
                        ConversionKind::ListCompose {
                            element: Rc::new(element_route),
                            in_place,
                        },
                    );
                    state.relax(Rc::new(edge), reached);
                }
            }
        }
    }
}

pub(crate) struct DictProposer;

impl ConversionProposer for DictProposer {
    fn propose_continuations(
        &self,
        engine: &Engine,
        origin: &RobinType,
        reached: &Weight,
        state: &mut SearchState,
    ) {
        if chains_composed(state, origin) {
            return;
        }
        let entry = match origin.detail() {
            TypeDetail::Dict { entry } => entry,
            _ => return,
        };
        let in_place = !state.const_only();

        match entry {
            None => {
                for dict_ty in engine.types().concrete_dict_types() {
                    let target = search_target(engine, state, &dict_ty);
                    let edge = Conversion::new(
                        origin.id(),
                        target.id(),
                        Weight::new(0, 1, 0, 0),
                        ConversionKind::DictCompose {
                            key: Rc::new(ConversionRoute::empty()),
                            value: Rc::new(ConversionRoute::empty()),
                            in_place,
                        },
                    );
                    state.relax(Rc::new(edge), reached);
                }
            }
            Some((key, value)) => {
                let key = engine.types().get(key);
                let value = engine.types().get(value);
                // Two independent inner searches, one per position.
                let key_tree = engine
                    .conversions()
                    .generate_conversion_tree(engine, &key, None, true);
                let value_tree = engine
                    .conversions()
                    .generate_conversion_tree(engine, &value, None, true);
                for dict_ty in engine.types().concrete_dict_types() {
                    if dict_ty.id() == origin.id() {
                        continue;
                    }
                    let (target_key, target_value) = match dict_ty.detail() {
                        TypeDetail::Dict { entry: Some((k, v)) } => {
                            (engine.types().get(k), engine.types().get(v))
                        }
                        _ => continue,
                    };
                    let key_route =
                        match key_tree.generate_route_to(&engine.const_type_of(&target_key)) {
                            Ok(route) => route,
                            Err(_) => continue,
                        };
                    let value_route = match value_tree
                        .generate_route_to(&engine.const_type_of(&target_value))
                    {
                        Ok(route) => route,
                        Err(_) => continue,
                    };
                    let weight = Conversion::composed_weight(
                        key_route.total_weight(),
                        value_route.total_weight(),
                    );
                    let target = search_target(engine, state, &dict_ty);
                    let edge = Conversion::new(
                        origin.id(),
                        target.id(),
                        weight,
                        ConversionKind::DictCompose {
                            key: Rc::new(key_route),
                            value: Rc::new(value_route),
                            in_place,
                        },
                    );
                    state.relax(Rc::new(edge), reached);
                }
            }
        }
    }
}

/// A const search only admits const-targeted edges, so the proposals
/// point at the container's const wrapper there.
fn search_target(engine: &Engine, state: &SearchState, container: &TypeHandle) -> TypeHandle {
    if state.const_only() {
        engine.const_type_of(container)
    } else {
        container.clone()
    }
}
