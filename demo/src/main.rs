// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A toy "geometry" native library, registered and called in-process.
//!
//! A real deployment would dlopen a wrapper `.so` and read its `entry`
//! table; the registration records here are exactly what that table
//! decodes to, with the symbols pointing at local `extern "C"`
//! functions. Run with `RUST_LOG=debug` to watch the engine work.

use std::os::raw::c_void;

use robin::frontends::simple::{self, SimpleFrontend};
use robin::prelude::import;
use robin::{
    ConversionPolicy, Engine, FunctionSymbol, Instance, IntrinsicKind, KeywordArguments,
    MachineWord, Param, Record, TypeExpr,
};

struct Rect {
    w: f64,
    h: f64,
}

extern "C" fn rect_new(w: MachineWord, h: MachineWord) -> MachineWord {
    Box::into_raw(Box::new(Rect {
        w: w as i64 as f64,
        h: h as i64 as f64,
    })) as MachineWord
}

extern "C" fn rect_free(this: MachineWord) {
    unsafe { drop(Box::from_raw(this as *mut Rect)) };
}

extern "C" fn rect_area(this: MachineWord) -> MachineWord {
    let rect = unsafe { &*(this as *const Rect) };
    (rect.w * rect.h) as MachineWord
}

extern "C" fn rect_scale(this: MachineWord, factor: MachineWord) -> MachineWord {
    let rect = unsafe { &mut *(this as *mut Rect) };
    let factor = f64::from_bits(factor as u64);
    rect.w *= factor;
    rect.h *= factor;
    this
}

extern "C" fn dist_int(x: MachineWord) -> MachineWord {
    (x as i64).unsigned_abs() as MachineWord
}

extern "C" fn dist_double(x: MachineWord) -> MachineWord {
    f64::from_bits(x as u64).abs().to_bits() as MachineWord
}

fn sym1(f: extern "C" fn(MachineWord) -> MachineWord) -> FunctionSymbol {
    FunctionSymbol(f as *const c_void)
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        name: name.to_string(),
        ty,
    }
}

fn geometry_table() -> Vec<Record> {
    vec![
        Record::Enum {
            name: "Orientation".to_string(),
            constants: vec![
                ("LANDSCAPE".to_string(), 0),
                ("PORTRAIT".to_string(), 1),
            ],
        },
        Record::Class {
            name: "Rect".to_string(),
            members: vec![
                Record::Constructor {
                    policy: ConversionPolicy::Explicit,
                    sym: FunctionSymbol(
                        rect_new as extern "C" fn(MachineWord, MachineWord) -> MachineWord
                            as *const c_void,
                    ),
                    params: vec![
                        param("w", TypeExpr::Intrinsic(IntrinsicKind::Int)),
                        param("h", TypeExpr::Intrinsic(IntrinsicKind::Int)),
                    ],
                },
                Record::Destructor {
                    sym: FunctionSymbol(
                        rect_free as extern "C" fn(MachineWord) as *const c_void,
                    ),
                },
                Record::Function {
                    name: "area".to_string(),
                    allow_edge: true,
                    returns: TypeExpr::Intrinsic(IntrinsicKind::Long),
                    sym: Some(sym1(rect_area)),
                    params: vec![],
                },
                Record::Function {
                    name: "scale".to_string(),
                    allow_edge: true,
                    returns: TypeExpr::Intrinsic(IntrinsicKind::Long),
                    sym: Some(FunctionSymbol(
                        rect_scale as extern "C" fn(MachineWord, MachineWord) -> MachineWord
                            as *const c_void,
                    )),
                    params: vec![param("factor", TypeExpr::Intrinsic(IntrinsicKind::Double))],
                },
            ],
        },
        Record::Function {
            name: "dist".to_string(),
            allow_edge: true,
            returns: TypeExpr::Intrinsic(IntrinsicKind::Long),
            sym: Some(sym1(dist_int)),
            params: vec![param("x", TypeExpr::Intrinsic(IntrinsicKind::Int))],
        },
        Record::Function {
            name: "dist".to_string(),
            allow_edge: true,
            returns: TypeExpr::Intrinsic(IntrinsicKind::Double),
            sym: Some(sym1(dist_double)),
            params: vec![param("x", TypeExpr::Intrinsic(IntrinsicKind::Double))],
        },
    ]
}

fn main() -> robin::Result<()> {
    env_logger::init();

    let engine = Engine::new();
    SimpleFrontend::install(&engine);
    let library = import(&engine, &geometry_table(), "geometry")?;
    let no_kwargs = KeywordArguments::new();

    // Overload resolution: an integral argument picks dist(int), a
    // float picks dist(double).
    let dist = library.global_namespace().lookup_function("dist")?;
    let near = dist.call(&engine, &[simple::int(-5)], &no_kwargs, None)?;
    println!("dist(-5)    = {:?}", simple::as_int(&near));
    let far = dist.call(&engine, &[simple::float(-2.5)], &no_kwargs, None)?;
    println!("dist(-2.5)  = {:?}", simple::as_float(&far));

    // Instance construction and methods, including keyword arguments.
    let rect_class = library.global_namespace().lookup_class("Rect")?;
    let mut kwargs = KeywordArguments::new();
    kwargs.insert("h".to_string(), simple::int(4));
    kwargs.insert("w".to_string(), simple::int(3));
    let rect = rect_class.create_instance(&engine, &[], &kwargs)?;

    let area = rect_class.find_instance_method(&engine, "area")?;
    let got = area.call_with_instance(&engine, &rect, &[], &no_kwargs)?;
    println!("3x4 area    = {:?}", simple::as_int(&got));

    // An integer argument converts up to the double parameter.
    let scale = rect_class.find_instance_method(&engine, "scale")?;
    scale.call_with_instance(&engine, &rect, &[simple::int(2)], &no_kwargs)?;
    let got = area.call_with_instance(&engine, &rect, &[], &no_kwargs)?;
    println!("scaled area = {:?}", simple::as_int(&got));

    // Enum constants round-trip by name.
    let orientation = library.global_namespace().lookup_enum("Orientation")?;
    println!(
        "PORTRAIT    = {}",
        orientation.value_of("PORTRAIT")?
    );

    if let Some(instance) = Instance::from_host(&rect) {
        instance.destroy(&engine);
    }
    Ok(())
}
