// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end dispatch scenarios: registration tables built in-process
//! around real `extern "C"` symbols, driven through the simple
//! frontend.

use std::os::raw::c_void;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use robin_engine::frontends::simple::{self, SimpleFrontend};
use robin_engine::registration::import;
use robin_engine::{
    Backtrace, CFunction, CapturedError, Conversion, ConversionKind, DefaultLowLevel, Engine,
    Frontend, FunctionKind, FunctionSymbol, Instance, Interceptor, KeywordArguments, LowLevel,
    MachineWord, NativeError, OverloadedSet, RobinError, Weight,
};
use robin_parser::{ConversionPolicy, IntrinsicKind, Param, Record, TypeExpr};

fn sym1(f: extern "C" fn(MachineWord) -> MachineWord) -> FunctionSymbol {
    FunctionSymbol(f as *const c_void)
}

fn sym1v(f: extern "C" fn(MachineWord)) -> FunctionSymbol {
    FunctionSymbol(f as *const c_void)
}

fn sym2(f: extern "C" fn(MachineWord, MachineWord) -> MachineWord) -> FunctionSymbol {
    FunctionSymbol(f as *const c_void)
}

fn int_param(name: &str) -> Param {
    Param {
        name: name.to_string(),
        ty: TypeExpr::Intrinsic(IntrinsicKind::Int),
    }
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

fn function(name: &str, returns: IntrinsicKind, sym: FunctionSymbol, params: Vec<Param>) -> Record {
    Record::Function {
        name: name.to_string(),
        allow_edge: true,
        returns: TypeExpr::Intrinsic(returns),
        sym: Some(sym),
        params,
    }
}

fn no_kwargs() -> KeywordArguments {
    KeywordArguments::new()
}

fn setup() -> (Engine, Rc<SimpleFrontend>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = Engine::new();
    let frontend = SimpleFrontend::install(&engine);
    (engine, frontend)
}

// ---- overload on integer width -------------------------------------

extern "C" fn take_int(_: MachineWord) -> MachineWord {
    1
}

extern "C" fn take_longlong(_: MachineWord) -> MachineWord {
    2
}

extern "C" fn take_short(_: MachineWord) -> MachineWord {
    3
}

#[test]
fn integer_width_picks_the_tightest_overload() {
    let (engine, _frontend) = setup();
    let records = vec![
        function("f", IntrinsicKind::Int, sym1(take_int), vec![int_param("x")]),
        function(
            "f",
            IntrinsicKind::Int,
            sym1(take_longlong),
            vec![param("x", TypeExpr::Intrinsic(IntrinsicKind::LongLong))],
        ),
    ];
    let library = import(&engine, &records, "widths").unwrap();
    let f = library.global_namespace().lookup_function("f").unwrap();

    let small = f.call(&engine, &[simple::int(42)], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&small), Some(1));

    let big = f
        .call(&engine, &[simple::int(10_000_000_000)], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&big), Some(2));
}

#[test]
fn adding_an_overload_invalidates_cached_decisions() {
    let (engine, _frontend) = setup();
    let records = vec![function(
        "f",
        IntrinsicKind::Int,
        sym1(take_int),
        vec![int_param("x")],
    )];
    let library = import(&engine, &records, "widths").unwrap();
    let f = library.global_namespace().lookup_function("f").unwrap();

    for _ in 0..2 {
        // second round comes from the dispatch cache
        let got = f.call(&engine, &[simple::int(7)], &no_kwargs(), None).unwrap();
        assert_eq!(simple::as_int(&got), Some(1));
    }

    // A newly registered, cheaper alternative must win immediately.
    let mut shorter = CFunction::new(sym1(take_short), "f", FunctionKind::GlobalFunction);
    shorter.specify_return_type(engine.intrinsics().int_.clone());
    shorter.add_formal_argument("x", engine.intrinsics().short_.clone());
    f.add_alternative(&engine, Rc::new(shorter));

    let got = f.call(&engine, &[simple::int(7)], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(3));
}

// ---- up-cast --------------------------------------------------------

unsafe extern "C" fn derived_to_base(p: *mut c_void) -> *mut c_void {
    (p as usize + 16) as *mut c_void
}

extern "C" fn pointer_identity(p: MachineWord) -> MachineWord {
    p
}

#[test]
fn derived_instances_upcast_through_the_registered_callback() {
    let (engine, _frontend) = setup();
    let records = vec![
        Record::Class {
            name: "Base".to_string(),
            members: vec![],
        },
        Record::Class {
            name: "Derived".to_string(),
            members: vec![Record::Extends {
                base: "Base".to_string(),
                upcast: Some(derived_to_base),
            }],
        },
        function(
            "g",
            IntrinsicKind::Long,
            sym1(pointer_identity),
            vec![param("obj", TypeExpr::Pointer("Base".to_string()))],
        ),
    ];
    let library = import(&engine, &records, "hierarchy").unwrap();
    let derived = library.global_namespace().lookup_class("Derived").unwrap();
    let g = library.global_namespace().lookup_function("g").unwrap();

    let instance = Instance::new(0x1000 as *mut c_void, derived.id(), false) as robin_engine::HostValue;
    let got = g.call(&engine, &[instance], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(0x1010));
}

// ---- composed list conversions -------------------------------------

extern "C" fn sum_float_list(p: MachineWord) -> MachineWord {
    let host_list = unsafe { &*(p as *const simple::HostList) };
    let total: f64 = host_list
        .0
        .borrow()
        .iter()
        .map(|item| simple::as_float(item).expect("elements should have been converted"))
        .sum();
    total as MachineWord
}

fn list_of_double_callable(engine: &Engine, constant: bool) -> Rc<OverloadedSet> {
    let list_double = engine.list_type_of(&engine.intrinsics().double_);
    let formal = if constant {
        engine.const_type_of(&list_double)
    } else {
        list_double
    };
    let mut h = CFunction::new(sym1(sum_float_list), "h", FunctionKind::GlobalFunction);
    h.specify_return_type(engine.intrinsics().long_.clone());
    h.add_formal_argument("values", formal);
    let set = OverloadedSet::create_new("h");
    set.add_alternative(engine, Rc::new(h));
    set
}

#[test]
fn const_list_conversion_builds_a_fresh_container() {
    let (engine, _frontend) = setup();
    let h = list_of_double_callable(&engine, true);

    let original = simple::list(vec![simple::int(1), simple::int(2), simple::int(3)]);
    let got = h.call(&engine, &[original.clone()], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(6));

    // one-directional: the caller's list still holds integers
    let items = simple::as_list(&original).unwrap();
    assert!(items.iter().all(|item| simple::as_int(item).is_some()));
}

#[test]
fn in_place_list_conversion_republishes_elements() {
    let (engine, _frontend) = setup();
    let h = list_of_double_callable(&engine, false);

    let original = simple::list(vec![simple::int(1), simple::int(2), simple::int(3)]);
    let got = h.call(&engine, &[original.clone()], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(6));

    // two-directional: the caller's list was overwritten
    let items = simple::as_list(&original).unwrap();
    assert!(items.iter().all(|item| simple::as_float(item).is_some()));
}

#[test]
fn list_to_itself_needs_no_conversion() {
    let (engine, _frontend) = setup();
    let list_double = engine.list_type_of(&engine.intrinsics().double_);
    let route = engine
        .conversions()
        .best_single_route(&engine, &list_double, &list_double)
        .unwrap();
    assert_eq!(route.total_weight(), Weight::ZERO);
}

extern "C" fn sum_dict_values(p: MachineWord) -> MachineWord {
    let host_dict = unsafe { &*(p as *const simple::HostDict) };
    let total: f64 = host_dict
        .0
        .borrow()
        .iter()
        .map(|(_, v)| simple::as_float(v).expect("values should have been converted"))
        .sum();
    total as MachineWord
}

#[test]
fn dict_conversion_composes_key_and_value_routes() {
    let (engine, _frontend) = setup();
    let dict_ty = engine.dict_type_of(
        &engine.intrinsics().pascal_string,
        &engine.intrinsics().double_,
    );
    let formal = engine.const_type_of(&dict_ty);
    let mut d = CFunction::new(sym1(sum_dict_values), "d", FunctionKind::GlobalFunction);
    d.specify_return_type(engine.intrinsics().long_.clone());
    d.add_formal_argument("table", formal);
    let set = OverloadedSet::create_new("d");
    set.add_alternative(&engine, Rc::new(d));

    let original = simple::dict(vec![
        (simple::string("a"), simple::int(1)),
        (simple::string("b"), simple::int(2)),
    ]);
    let got = set
        .call(&engine, &[original.clone()], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(3));
}

#[test]
fn empty_list_converts_to_any_concrete_list() {
    let (engine, _frontend) = setup();
    let h = list_of_double_callable(&engine, true);
    let got = h
        .call(&engine, &[simple::list(vec![])], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(0));
}

// ---- ambiguity ------------------------------------------------------

extern "C" fn k_a(_: MachineWord, _: MachineWord) -> MachineWord {
    1
}

extern "C" fn k_b(_: MachineWord, _: MachineWord) -> MachineWord {
    2
}

#[test]
fn crossed_overloads_are_ambiguous_in_either_registration_order() {
    for flipped in [false, true] {
        let (engine, _frontend) = setup();
        let mut records = vec![
            function(
                "k",
                IntrinsicKind::Int,
                sym2(k_a),
                vec![
                    param("a", TypeExpr::Intrinsic(IntrinsicKind::Int)),
                    param("b", TypeExpr::Intrinsic(IntrinsicKind::Double)),
                ],
            ),
            function(
                "k",
                IntrinsicKind::Int,
                sym2(k_b),
                vec![
                    param("a", TypeExpr::Intrinsic(IntrinsicKind::Double)),
                    param("b", TypeExpr::Intrinsic(IntrinsicKind::Int)),
                ],
            ),
        ];
        if flipped {
            records.reverse();
        }
        let library = import(&engine, &records, "amb").unwrap();
        let k = library.global_namespace().lookup_function("k").unwrap();
        let err = k
            .call(&engine, &[simple::int(1), simple::int(2)], &no_kwargs(), None)
            .unwrap_err();
        assert!(
            matches!(err, RobinError::OverloadingAmbiguity { .. }),
            "expected ambiguity, got {:?}",
            err
        );
    }
}

#[test]
fn unmatchable_arguments_report_candidates() {
    let (engine, _frontend) = setup();
    let records = vec![function(
        "f",
        IntrinsicKind::Int,
        sym1(take_int),
        vec![int_param("x")],
    )];
    let library = import(&engine, &records, "nomatch").unwrap();
    let f = library.global_namespace().lookup_function("f").unwrap();
    let err = f
        .call(&engine, &[simple::string("not a number")], &no_kwargs(), None)
        .unwrap_err();
    match err {
        RobinError::OverloadingNoMatch { candidates, .. } => {
            assert!(candidates.contains("f(int x)"), "got: {}", candidates);
        }
        other => panic!("expected no-match, got {:?}", other),
    }
}

// ---- keyword arguments ---------------------------------------------

extern "C" fn hundreds(x: MachineWord, y: MachineWord) -> MachineWord {
    x * 100 + y
}

#[test]
fn keyword_arguments_fold_into_positional_slots() {
    let (engine, _frontend) = setup();
    let records = vec![function(
        "m",
        IntrinsicKind::Int,
        sym2(hundreds),
        vec![int_param("x"), int_param("y")],
    )];
    let library = import(&engine, &records, "kw").unwrap();
    let m = library.global_namespace().lookup_function("m").unwrap();

    let mut kwargs = KeywordArguments::new();
    kwargs.insert("y".to_string(), simple::int(2));
    kwargs.insert("x".to_string(), simple::int(1));
    let got = m.call(&engine, &[], &kwargs, None).unwrap();
    assert_eq!(simple::as_int(&got), Some(102));

    let mut kwargs = KeywordArguments::new();
    kwargs.insert("y".to_string(), simple::int(2));
    let got = m.call(&engine, &[simple::int(1)], &kwargs, None).unwrap();
    assert_eq!(simple::as_int(&got), Some(102));
}

#[test]
fn keywords_against_anonymous_signature_are_invalid() {
    let (engine, _frontend) = setup();
    let mut anon = CFunction::new(sym1(take_int), "anon", FunctionKind::GlobalFunction);
    anon.specify_return_type(engine.intrinsics().int_.clone());
    anon.add_anonymous_argument(engine.intrinsics().int_.clone());
    let set = OverloadedSet::create_new("anon");
    set.add_alternative(&engine, Rc::new(anon));

    let mut kwargs = KeywordArguments::new();
    kwargs.insert("x".to_string(), simple::int(1));
    let err = set.call(&engine, &[], &kwargs, None).unwrap_err();
    assert!(matches!(err, RobinError::InvalidArguments(_)));
}

// ---- native exceptions ---------------------------------------------

extern "C" fn boom_symbol(_: MachineWord) -> MachineWord {
    unreachable!("the trapping trampoline intercepts this symbol")
}

struct TrappingLowLevel {
    fail: *const c_void,
}

impl LowLevel for TrappingLowLevel {
    unsafe fn call(
        &self,
        symbol: FunctionSymbol,
        args: &[MachineWord],
    ) -> Result<MachineWord, NativeError> {
        if symbol.0 == self.fail {
            return Err(NativeError {
                what: "nope".to_string(),
                backtrace: Backtrace::generate_from_here(),
            });
        }
        DefaultLowLevel.call(symbol, args)
    }

    unsafe fn call_void(
        &self,
        symbol: FunctionSymbol,
        args: &[MachineWord],
    ) -> Result<(), NativeError> {
        if symbol.0 == self.fail {
            return Err(NativeError {
                what: "nope".to_string(),
                backtrace: Backtrace::generate_from_here(),
            });
        }
        DefaultLowLevel.call_void(symbol, args)
    }
}

#[test]
fn native_exceptions_are_wrapped_and_stashed_first_chance() {
    let (engine, frontend) = setup();
    let boom = sym1(boom_symbol);
    frontend.set_low_level(Rc::new(TrappingLowLevel { fail: boom.0 }));

    let records = vec![function("boom", IntrinsicKind::Int, boom, vec![int_param("x")])];
    let library = import(&engine, &records, "explosive").unwrap();
    let set = library.global_namespace().lookup_function("boom").unwrap();

    let err = set
        .call(&engine, &[simple::int(0)], &no_kwargs(), None)
        .unwrap_err();
    assert!(matches!(err, RobinError::UserExceptionOccurred(what) if what == "nope"));

    match frontend.error_handler().get_error() {
        Some(CapturedError::Native { what, .. }) => assert_eq!(what, "nope"),
        _ => panic!("expected the first-chance payload on the error handler"),
    }
}

// ---- classes: construction, methods, destruction -------------------

struct RectObj {
    w: i64,
    h: i64,
}

static RECT_DROPS: AtomicUsize = AtomicUsize::new(0);

extern "C" fn rect_new(w: MachineWord, h: MachineWord) -> MachineWord {
    Box::into_raw(Box::new(RectObj {
        w: w as i64,
        h: h as i64,
    })) as MachineWord
}

extern "C" fn rect_area(this: MachineWord) -> MachineWord {
    let rect = unsafe { &*(this as *const RectObj) };
    (rect.w * rect.h) as MachineWord
}

extern "C" fn rect_free(this: MachineWord) {
    unsafe { drop(Box::from_raw(this as *mut RectObj)) };
    RECT_DROPS.fetch_add(1, Ordering::SeqCst);
}

fn rect_records() -> Vec<Record> {
    vec![Record::Class {
        name: "Rect".to_string(),
        members: vec![
            Record::Constructor {
                policy: ConversionPolicy::Explicit,
                sym: sym2(rect_new),
                params: vec![int_param("w"), int_param("h")],
            },
            Record::Destructor {
                sym: sym1v(rect_free),
            },
            function("area", IntrinsicKind::Long, sym1(rect_area), vec![]),
        ],
    }]
}

#[test]
fn constructed_instances_answer_methods_and_die_once() {
    let (engine, _frontend) = setup();
    let library = import(&engine, &rect_records(), "shapes").unwrap();
    let rect = library.global_namespace().lookup_class("Rect").unwrap();

    let instance = rect
        .create_instance(&engine, &[simple::int(3), simple::int(4)], &no_kwargs())
        .unwrap();
    let area = rect.find_instance_method(&engine, "area").unwrap();
    let got = area
        .call_with_instance(&engine, &instance, &[], &no_kwargs())
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(12));

    let drops_before = RECT_DROPS.load(Ordering::SeqCst);
    let held = Instance::from_host(&instance).unwrap();
    assert!(held.is_owned());
    held.destroy(&engine);
    held.destroy(&engine); // second destruction is a no-op
    assert_eq!(RECT_DROPS.load(Ordering::SeqCst), drops_before + 1);

    // A bonded instance's lifetime is vetoed by its partner: no
    // destruction happens.
    let bonded = rect
        .create_instance(&engine, &[simple::int(1), simple::int(1)], &no_kwargs())
        .unwrap();
    let held = Instance::from_host(&bonded).unwrap();
    held.bond_to(simple::int(0));
    held.destroy(&engine);
    assert_eq!(RECT_DROPS.load(Ordering::SeqCst), drops_before + 1);
}

#[test]
fn mismatched_constructor_arguments_are_reported() {
    let (engine, _frontend) = setup();
    let library = import(&engine, &rect_records(), "shapes").unwrap();
    let rect = library.global_namespace().lookup_class("Rect").unwrap();
    let err = rect
        .create_instance(&engine, &[simple::string("wide")], &no_kwargs())
        .unwrap_err();
    assert!(matches!(err, RobinError::NoSuchConstructor(_)));
}

// ---- conversion via construction -----------------------------------

extern "C" fn meters_new(bits: MachineWord) -> MachineWord {
    let value = f64::from_bits(bits as u64);
    Box::into_raw(Box::new(value)) as MachineWord
}

extern "C" fn meters_floor(this: MachineWord) -> MachineWord {
    let value = unsafe { *(this as *const f64) };
    value as MachineWord
}

#[test]
fn single_argument_constructors_act_as_implicit_conversions() {
    let (engine, _frontend) = setup();
    let records = vec![
        Record::Class {
            name: "Meters".to_string(),
            members: vec![Record::Constructor {
                policy: ConversionPolicy::UserDefined,
                sym: sym1(meters_new),
                params: vec![param("value", TypeExpr::Intrinsic(IntrinsicKind::Double))],
            }],
        },
        function(
            "floor_of",
            IntrinsicKind::Long,
            sym1(meters_floor),
            vec![param("m", TypeExpr::Named("Meters".to_string()))],
        ),
    ];
    let library = import(&engine, &records, "units").unwrap();
    let floor_of = library.global_namespace().lookup_function("floor_of").unwrap();

    // host double -> Meters via the converting constructor
    let got = floor_of
        .call(&engine, &[simple::float(2.75)], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(2));

    // host int promotes to double first, then converts
    let got = floor_of
        .call(&engine, &[simple::int(5)], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(5));
}

// ---- edge conversions ----------------------------------------------

extern "C" fn twenty_one(_: MachineWord) -> MachineWord {
    21
}

fn doubling_edge_conversion(engine: &Engine) {
    let int_ = engine.intrinsics().int_.clone();
    engine.conversions().register_edge_conversion(
        engine,
        Conversion::new(
            int_.id(),
            int_.id(),
            Weight::ZERO,
            ConversionKind::Supplied {
                label: "double-int",
                apply: Rc::new(|engine, value| {
                    let frontend = engine.frontend()?;
                    let n = frontend.int_value(value).unwrap_or(0);
                    Ok(frontend.make_int(n * 2).unwrap())
                }),
            },
        ),
    );
}

#[test]
fn edge_conversions_transform_return_values_unless_suppressed() {
    let (engine, _frontend) = setup();
    doubling_edge_conversion(&engine);

    let records = vec![
        function("e", IntrinsicKind::Int, sym1(twenty_one), vec![int_param("x")]),
        // what a '!'-prefixed record decodes to
        Record::Function {
            name: "raw_e".to_string(),
            allow_edge: false,
            returns: TypeExpr::Intrinsic(IntrinsicKind::Int),
            sym: Some(sym1(twenty_one)),
            params: vec![int_param("x")],
        },
    ];
    let library = import(&engine, &records, "edges").unwrap();
    let e = library.global_namespace().lookup_function("e").unwrap();
    let raw_e = library.global_namespace().lookup_function("raw_e").unwrap();

    let got = e.call(&engine, &[simple::int(0)], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(42));

    // suppressed per function
    let got = raw_e
        .call(&engine, &[simple::int(0)], &no_kwargs(), None)
        .unwrap();
    assert_eq!(simple::as_int(&got), Some(21));

    // suppressed per set
    e.set_allow_edge_conversions(false);
    let got = e.call(&engine, &[simple::int(0)], &no_kwargs(), None).unwrap();
    assert_eq!(simple::as_int(&got), Some(21));
}

// ---- identity routes and weights -----------------------------------

#[test]
fn identity_conversion_returns_the_same_host_value() {
    let (engine, frontend) = setup();
    let value = simple::float(1.25);
    let detected = frontend.detect_type(&engine, &value).unwrap();
    let route = engine
        .conversions()
        .best_single_route(&engine, &detected, &detected)
        .unwrap();
    let mut gc = robin_engine::GarbageCollection::default();
    let out = route.apply(&engine, &value, &mut gc).unwrap();
    assert!(Rc::ptr_eq(&value, &out));
    assert_eq!(route.total_weight(), Weight::ZERO);
}

#[test]
fn weight_reports_the_winning_alternative_cost() {
    let (engine, _frontend) = setup();
    let records = vec![function(
        "f",
        IntrinsicKind::Int,
        sym1(take_int),
        vec![int_param("x")],
    )];
    let library = import(&engine, &records, "w").unwrap();
    let f = library.global_namespace().lookup_function("f").unwrap();
    let weights = f.weight(&engine, &[simple::int(42)], &no_kwargs()).unwrap();
    assert_eq!(weights.len(), 1);
    assert!(weights[0].is_possible());
    assert!(weights[0] > Weight::ZERO);
}

// ---- interceptors ---------------------------------------------------

struct DoublingInterceptor;

impl Interceptor for DoublingInterceptor {
    fn invoke(
        &self,
        _engine: &Engine,
        signature: &robin_engine::Signature,
        args: &[MachineWord],
    ) -> robin_engine::Result<MachineWord> {
        assert_eq!(signature.name, "scale");
        Ok(args[1] * 2)
    }
}

#[test]
fn pure_virtual_signatures_dispatch_through_an_interceptor() {
    let (engine, _frontend) = setup();
    let records = vec![Record::Class {
        name: "Scaler".to_string(),
        members: vec![Record::Function {
            name: "scale".to_string(),
            allow_edge: true,
            returns: TypeExpr::Intrinsic(IntrinsicKind::Int),
            sym: None,
            params: vec![int_param("by")],
        }],
    }];
    let library = import(&engine, &records, "virtuals").unwrap();
    let scaler = library.global_namespace().lookup_class("Scaler").unwrap();
    let signature = scaler.interface_method("scale").unwrap();

    let interceptor = DoublingInterceptor;
    let got = interceptor.invoke(&engine, &signature, &[0, 21]).unwrap();
    assert_eq!(got, 42);
}

// ---- inherited methods ----------------------------------------------

#[test]
fn methods_resolve_through_base_classes_with_adjusted_pointers() {
    let (engine, _frontend) = setup();
    let records = vec![
        Record::Class {
            name: "Shape".to_string(),
            members: vec![function(
                "describe",
                IntrinsicKind::Long,
                sym1(pointer_identity),
                vec![],
            )],
        },
        Record::Class {
            name: "Circle".to_string(),
            members: vec![Record::Extends {
                base: "Shape".to_string(),
                upcast: Some(derived_to_base),
            }],
        },
    ];
    let library = import(&engine, &records, "shapes2").unwrap();
    let circle = library.global_namespace().lookup_class("Circle").unwrap();

    assert!(circle.has_instance_method(&engine, "describe"));
    let describe = circle.find_instance_method(&engine, "describe").unwrap();
    let instance = Instance::new(0x2000 as *mut c_void, circle.id(), false) as robin_engine::HostValue;
    let got = describe
        .call_with_instance(&engine, &instance, &[], &no_kwargs())
        .unwrap();
    // the self pointer was adjusted on the way up
    assert_eq!(simple::as_int(&got), Some(0x2010));
}
