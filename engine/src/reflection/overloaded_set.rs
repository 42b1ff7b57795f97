// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Overload resolution: picking the cheapest alternative of a named bag
//! of native functions.
//!
//! Every actual argument's most specific type is detected, each
//! same-arity alternative is priced by the conversion routes its formal
//! types require, and the per-argument weight vectors are compared under
//! the partial order on tuples: an alternative wins only if no slot of
//! it is strictly heavier and some slot is strictly lighter. Ties
//! between structurally distinct prototypes are ambiguities. Decisions
//! are cached per actual-type sequence until any registration
//! invalidates the generation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::conversion::{ConversionRoute, Weight};
use crate::engine::Engine;
use crate::error::{Result, RobinError};
use crate::frontend::{GarbageCollection, HostValue, Insight};
use crate::reflection::cfunction::CFunction;
use crate::types::{TypeHandle, TypeId};

/// Keyword arguments of one call, in the order the host supplied them.
pub type KeywordArguments = IndexMap<String, HostValue>;

static NEXT_SET_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Better,
    Worse,
    Equivalent,
    Ambiguous,
}

/// Compare a candidate's per-argument weights against the best known,
/// looking for witnesses on either side.
fn compare_alternatives(known: &[Weight], suggested: &[Weight]) -> Relation {
    debug_assert_eq!(known.len(), suggested.len());
    if known.is_empty() {
        return Relation::Better;
    }

    let mut worse_witness = false;
    let mut better_witness = false;
    for (known, suggested) in known.iter().zip(suggested.iter()) {
        if known < suggested {
            worse_witness = true;
        } else if suggested < known {
            better_witness = true;
        }
    }
    match (better_witness, worse_witness) {
        (true, false) => Relation::Better,
        (false, true) => Relation::Worse,
        (true, true) => Relation::Ambiguous,
        (false, false) => Relation::Equivalent,
    }
}

#[derive(Hash, PartialEq, Eq)]
struct DispatchKey {
    set: u64,
    types: Vec<TypeId>,
    insights: Vec<Insight>,
}

#[derive(Clone)]
struct CachedDecision {
    alternative: usize,
    routes: Vec<Rc<ConversionRoute>>,
}

/// The process-wide cache of resolved dispatch decisions, keyed by
/// (set, actual-type sequence, insights) and stamped with the
/// registration generation: any conversion or overload registered since
/// the stamp invalidates everything at once.
pub(crate) struct DispatchCache {
    entries: RefCell<HashMap<DispatchKey, CachedDecision>>,
    stamp: Cell<u64>,
}

impl DispatchCache {
    pub(crate) fn new() -> Self {
        DispatchCache {
            entries: RefCell::new(HashMap::new()),
            stamp: Cell::new(0),
        }
    }

    fn sync(&self, generation: u64) {
        if self.stamp.get() != generation {
            self.entries.borrow_mut().clear();
            self.stamp.set(generation);
        }
    }

    fn recall(&self, generation: u64, key: &DispatchKey) -> Option<CachedDecision> {
        self.sync(generation);
        self.entries.borrow().get(key).cloned()
    }

    fn remember(&self, generation: u64, key: DispatchKey, decision: CachedDecision) {
        self.sync(generation);
        self.entries.borrow_mut().insert(key, decision);
    }
}

struct Resolution {
    index: usize,
    alternative: Rc<CFunction>,
    routes: Vec<Rc<ConversionRoute>>,
    weights: Vec<Weight>,
}

/// A named bag of `CFunction` alternatives resolved at call time by
/// cheapest conversion chain.
pub struct OverloadedSet {
    id: u64,
    name: String,
    alternatives: RefCell<Vec<Rc<CFunction>>>,
    allow_edge: Cell<bool>,
}

impl OverloadedSet {
    /// Builds a set with no alternatives; add them with
    /// [`OverloadedSet::add_alternative`].
    pub fn create_new(name: impl Into<String>) -> Rc<OverloadedSet> {
        Rc::new(OverloadedSet {
            id: NEXT_SET_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            alternatives: RefCell::new(Vec::new()),
            allow_edge: Cell::new(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.borrow().is_empty()
    }

    /// Declare an additional alternative. Once added, alternatives are
    /// never removed.
    pub fn add_alternative(&self, engine: &Engine, alternative: Rc<CFunction>) {
        self.alternatives.borrow_mut().push(alternative);
        engine.bump_generation();
    }

    /// Consume another set's alternatives into this one. The other set
    /// is untouched and still usable.
    pub fn add_alternatives(&self, engine: &Engine, more: &OverloadedSet) {
        let mut alternatives = self.alternatives.borrow_mut();
        alternatives.extend(more.alternatives.borrow().iter().cloned());
        drop(alternatives);
        engine.bump_generation();
    }

    /// Whether edge conversions are applied to return values of this
    /// set's calls.
    pub fn set_allow_edge_conversions(&self, allow: bool) {
        self.allow_edge.set(allow);
    }

    /// Find an alternative whose prototype matches exactly, without
    /// conversions.
    pub fn seek_alternative(&self, prototype: &[TypeHandle]) -> Option<Rc<CFunction>> {
        self.alternatives
            .borrow()
            .iter()
            .find(|alt| {
                alt.arity() == prototype.len()
                    && alt
                        .formal_types()
                        .iter()
                        .zip(prototype.iter())
                        .all(|(a, b)| a.id() == b.id())
            })
            .cloned()
    }

    /// The per-argument weight vector of the alternative a call with
    /// these arguments would pick.
    pub fn weight(
        &self,
        engine: &Engine,
        args: &[HostValue],
        kwargs: &KeywordArguments,
    ) -> Result<Vec<Weight>> {
        Ok(self.resolve(engine, args, kwargs)?.weights)
    }

    /// Call the overloaded function: resolve the lightest alternative,
    /// convert the actuals along the chosen routes, issue the call, and
    /// apply any edge conversion to the result.
    pub fn call(
        &self,
        engine: &Engine,
        args: &[HostValue],
        kwargs: &KeywordArguments,
        owner: Option<&HostValue>,
    ) -> Result<HostValue> {
        let resolution = self.resolve(engine, args, kwargs)?;

        // Conversion intermediates live until the call returns.
        let mut gc = GarbageCollection::default();

        let merged = resolution
            .alternative
            .merge_with_keyword_arguments(args, kwargs)?;
        let mut converted = Vec::with_capacity(merged.len());
        for (value, route) in merged.iter().zip_eq(resolution.routes.iter()) {
            converted.push(route.apply(engine, value, &mut gc)?);
        }

        let mut result = resolution.alternative.call(engine, &converted, owner)?;

        if self.allow_edge.get() && resolution.alternative.allow_edge_conversions() {
            if let Some(return_type) = resolution.alternative.return_type() {
                if let Some(exit) = engine.conversions().edge_conversion(return_type.id()) {
                    result = exit.apply(engine, &result, &mut gc)?;
                }
            }
        }
        Ok(result)
    }

    fn resolve(
        &self,
        engine: &Engine,
        args: &[HostValue],
        kwargs: &KeywordArguments,
    ) -> Result<Resolution> {
        let frontend = engine.frontend()?;
        let nargs = args.len() + kwargs.len();

        let detect = |value: &HostValue| -> Result<(TypeHandle, Insight)> {
            Ok((
                frontend.detect_type(engine, value)?,
                frontend.detect_insight(value),
            ))
        };
        let positional = args
            .iter()
            .map(|value| detect(value))
            .collect::<Result<Vec<_>>>()?;
        let named = kwargs
            .iter()
            .map(|(name, value)| Ok((name.clone(), detect(value)?)))
            .collect::<Result<IndexMap<_, _>>>()?;

        // Keyword calls are not cached: the canonical argument order is
        // per-alternative.
        let cache_key = kwargs.is_empty().then(|| DispatchKey {
            set: self.id,
            types: positional.iter().map(|(ty, _)| ty.id()).collect(),
            insights: positional.iter().map(|(_, insight)| *insight).collect(),
        });
        if let Some(key) = &cache_key {
            if let Some(hit) = engine.dispatch_cache().recall(engine.generation(), key) {
                log::trace!(
                    "// got dispatch from cache, running alternative #{}",
                    hit.alternative
                );
                let alternative = self.alternatives.borrow()[hit.alternative].clone();
                let weights = hit.routes.iter().map(|r| r.total_weight()).collect();
                return Ok(Resolution {
                    index: hit.alternative,
                    alternative,
                    routes: hit.routes,
                    weights,
                });
            }
        }

        let alternatives = self.alternatives.borrow().clone();
        let mut best: Option<Resolution> = None;
        let mut ambiguity_alert = false;
        let mut keyword_error = None;

        for (index, alternative) in alternatives.iter().enumerate() {
            if alternative.arity() != nargs {
                continue;
            }
            // Validate keyword names and reorder the actuals into this
            // alternative's canonical order.
            let merged = match alternative.merge_with_keyword_arguments(&positional, &named) {
                Ok(merged) => merged,
                Err(err) => {
                    keyword_error = Some(err);
                    continue;
                }
            };
            log::trace!("// @CHECKING: alternative #{}: {}", index, alternative);

            let actual_types: Vec<TypeHandle> = merged.iter().map(|(ty, _)| ty.clone()).collect();
            let routes = match engine.conversions().best_sequence_route(
                engine,
                &actual_types,
                &alternative.formal_types(),
            ) {
                Ok(routes) => routes,
                Err(RobinError::NoApplicableConversion { .. }) => {
                    log::trace!("// impossible!");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let weights: Vec<Weight> = routes.iter().map(|r| r.total_weight()).collect();

            match &best {
                None => {
                    best = Some(Resolution {
                        index,
                        alternative: alternative.clone(),
                        routes,
                        weights,
                    });
                }
                Some(current) => match compare_alternatives(&current.weights, &weights) {
                    Relation::Better => {
                        log::trace!("// better!");
                        best = Some(Resolution {
                            index,
                            alternative: alternative.clone(),
                            routes,
                            weights,
                        });
                        ambiguity_alert = false;
                    }
                    Relation::Worse => {}
                    Relation::Equivalent | Relation::Ambiguous => {
                        // Identical prototypes (const/non-const method
                        // pairs) are interchangeable, not ambiguous.
                        if !current.alternative.structurally_identical(alternative) {
                            ambiguity_alert = true;
                        }
                    }
                },
            }
        }

        let best = match best {
            Some(best) => best,
            None => {
                if !kwargs.is_empty() {
                    if let Some(err) = keyword_error {
                        return Err(err);
                    }
                }
                return Err(RobinError::OverloadingNoMatch {
                    callable: self.name.clone(),
                    candidates: self.candidate_listing(),
                });
            }
        };
        if ambiguity_alert {
            return Err(RobinError::OverloadingAmbiguity {
                callable: self.name.clone(),
            });
        }

        if let Some(key) = cache_key {
            engine.dispatch_cache().remember(
                engine.generation(),
                key,
                CachedDecision {
                    alternative: best.index,
                    routes: best.routes.clone(),
                },
            );
        }
        Ok(best)
    }

    fn candidate_listing(&self) -> String {
        self.alternatives
            .borrow()
            .iter()
            .map(|alt| format!("  {}", alt))
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: fn(i32, i32, i32, i32) -> Weight = Weight::new;

    #[test]
    fn single_lighter_slot_wins() {
        let known = [W(0, 1, 0, 0), W(0, 0, 0, 0)];
        let suggested = [W(0, 0, 0, 0), W(0, 0, 0, 0)];
        assert_eq!(compare_alternatives(&known, &suggested), Relation::Better);
        assert_eq!(compare_alternatives(&suggested, &known), Relation::Worse);
    }

    #[test]
    fn equal_vectors_are_equivalent() {
        let w = [W(0, 1, 0, 0)];
        assert_eq!(compare_alternatives(&w, &w), Relation::Equivalent);
    }

    #[test]
    fn crossed_witnesses_are_ambiguous() {
        let known = [W(0, 1, 0, 0), W(0, 0, 0, 0)];
        let suggested = [W(0, 0, 0, 0), W(0, 1, 0, 0)];
        assert_eq!(
            compare_alternatives(&known, &suggested),
            Relation::Ambiguous
        );
    }

    #[test]
    fn nullary_comparison_prefers_the_candidate() {
        assert_eq!(compare_alternatives(&[], &[]), Relation::Better);
    }
}
