// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bounded numeric subtyping.
//!
//! A dynamically typed host hands over integers without a C width. The
//! engine answers with a synthetic type describing the literal's range:
//! "fits in a short", "fits in an unsigned long long", and so on. Each
//! bounded type registers promotion edges only to the intrinsic integer
//! types that hold its entire range, which is what makes overload
//! resolution between `f(int)` and `f(long long)` correct without
//! inspecting values inside the resolver.
//!
//! Edge weights grow with the distance in the width ranking (signed
//! before unsigned at each width), so the tightest admitting intrinsic
//! wins and an exact-boundary value prefers the signed alternative.

use crate::conversion::{Conversion, ConversionKind, Weight};
use crate::engine::Engine;
use crate::types::{Constness, RobinType, TypeCategory, TypeDetail, TypeHandle, TypeSpec};

/// Value-bit counts of the preconstructed positive subtypes, one per C
/// integer boundary.
const POSITIVE_BITS: &[u32] = &[15, 16, 31, 32, 63, 64];
/// As above for negative ranges (only signed types accept them).
const NEGATIVE_BITS: &[u32] = &[15, 31, 63];
/// A range nothing intrinsic can hold; detection never fails, matching
/// simply becomes impossible.
const HUGE_BITS: u32 = 127;

/// The preconstructed bounded types, ordered for range lookup.
pub(crate) struct NumericSubtypes {
    /// (largest representable value, type), ascending.
    positive: Vec<(u128, TypeHandle)>,
    /// (smallest representable value, type), tightest range first.
    negative: Vec<(i128, TypeHandle)>,
}

impl NumericSubtypes {
    /// The bounded type whose range most tightly covers `value`.
    pub(crate) fn type_for_integer(&self, value: i128) -> TypeHandle {
        if value >= 0 {
            let value = value as u128;
            self.positive
                .iter()
                .find(|(max, _)| value <= *max)
                .map(|(_, ty)| ty.clone())
                .expect("huge positive range must cover every value")
        } else {
            self.negative
                .iter()
                .find(|(min, _)| value >= *min)
                .map(|(_, ty)| ty.clone())
                .expect("huge negative range must cover every value")
        }
    }
}

pub(crate) fn install(engine: &Engine) -> NumericSubtypes {
    let mut positive = Vec::new();
    for &bits in POSITIVE_BITS {
        let ty = create_bounded(engine, bits, true);
        register_promotions(engine, &ty, bits, true);
        positive.push((((1u128) << bits) - 1, ty));
    }
    positive.push((u128::MAX, create_bounded(engine, HUGE_BITS, true)));

    let mut negative = Vec::new();
    for &bits in NEGATIVE_BITS {
        let ty = create_bounded(engine, bits, false);
        register_promotions(engine, &ty, bits, false);
        negative.push((-((1i128) << bits), ty));
    }
    negative.push((i128::MIN, create_bounded(engine, HUGE_BITS, false)));

    NumericSubtypes { positive, negative }
}

fn create_bounded(engine: &Engine, bits: u32, positive: bool) -> TypeHandle {
    let name = if positive {
        format!("integer in [0, 2^{})", bits)
    } else {
        format!("integer in [-2^{}, 0)", bits)
    };
    engine.types().insert(|id| {
        RobinType::new(
            id,
            TypeCategory::Intrinsic,
            TypeSpec::LongLong,
            name,
            Constness::Regular,
            TypeDetail::Bounded {
                max_bits: bits,
                positive,
            },
            false,
            false,
        )
    })
}

fn register_promotions(engine: &Engine, bounded: &TypeHandle, bits: u32, positive: bool) {
    let mut rank = 0;
    for (target, digits, signed) in engine.intrinsics().integer_order() {
        rank += 1;
        if bits > digits || (!positive && !signed) {
            continue; // range does not fit
        }
        engine.conversions().register_conversion(
            engine,
            Conversion::new(
                bounded.id(),
                target.id(),
                Weight::new(0, rank, 0, 0),
                ConversionKind::Trivial,
            ),
        );
    }

    // Floating targets rank after every integer, so an integral argument
    // prefers any admitting integer parameter over a double one.
    let float_rank = rank + 1;
    engine.conversions().register_conversion(
        engine,
        Conversion::new(
            bounded.id(),
            engine.intrinsics().double_.id(),
            Weight::new(0, float_rank, 0, 0),
            ConversionKind::IntToFloat,
        ),
    );
    engine.conversions().register_conversion(
        engine,
        Conversion::new(
            bounded.id(),
            engine.intrinsics().float_.id(),
            Weight::new(0, float_rank + 1, 0, 0),
            ConversionKind::IntToFloat,
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn bounded_bits(ty: &TypeHandle) -> (u32, bool) {
        match ty.detail() {
            TypeDetail::Bounded { max_bits, positive } => (max_bits, positive),
            other => panic!("expected bounded type, got {:?}", other),
        }
    }

    #[test]
    fn small_values_get_tight_ranges() {
        let engine = Engine::new();
        assert_eq!(bounded_bits(&engine.type_for_integer(42)), (15, true));
        assert_eq!(bounded_bits(&engine.type_for_integer(-42)), (15, false));
        assert_eq!(bounded_bits(&engine.type_for_integer(40_000)), (16, true));
        assert_eq!(bounded_bits(&engine.type_for_integer(70_000)), (31, true));
        assert_eq!(
            bounded_bits(&engine.type_for_integer(10_000_000_000)),
            (63, true)
        );
    }

    #[test]
    fn boundaries_move_to_the_next_range() {
        let engine = Engine::new();
        assert_eq!(bounded_bits(&engine.type_for_integer(32767)), (15, true));
        assert_eq!(bounded_bits(&engine.type_for_integer(32768)), (16, true));
        assert_eq!(
            bounded_bits(&engine.type_for_integer(-(1 << 15))),
            (15, false)
        );
        assert_eq!(
            bounded_bits(&engine.type_for_integer(-(1 << 15) - 1)),
            (31, false)
        );
    }

    #[test]
    fn detection_is_stable() {
        let engine = Engine::new();
        assert_eq!(
            engine.type_for_integer(5).id(),
            engine.type_for_integer(7).id()
        );
        assert_ne!(
            engine.type_for_integer(5).id(),
            engine.type_for_integer(-5).id()
        );
    }

    #[test]
    fn huge_values_fit_no_intrinsic() {
        let engine = Engine::new();
        let huge = engine.type_for_integer(i128::from(u64::MAX) + 1);
        assert_eq!(bounded_bits(&huge), (HUGE_BITS, true));
        assert!(engine
            .conversions()
            .best_single_route(&engine, &huge, &engine.intrinsics().ulonglong)
            .is_err());
    }
}
