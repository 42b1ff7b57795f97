// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Robin bridges compiled native libraries into dynamically typed
//! hosts.
//!
//! The heart of it is a type-aware dispatch and conversion engine: call
//! requests are matched against overload sets, each argument travelling
//! the cheapest chain of implicit conversions the engine can find. See
//! [`robin_engine`] for the machinery and [`robin_parser`] for the
//! registration table format native libraries export.

pub use robin_engine::*;

pub use robin_parser::{
    decode_table, parse_type, ConversionPolicy, ElementMode, IntrinsicKind, Param, ParseError,
    RawRegData, Record, TypeExpr, UpcastFn,
};

/// Everything a frontend implementation typically needs.
pub mod prelude {
    pub use robin_engine::registration::{admit, import, import_raw};
    pub use robin_engine::{
        Adapter, ArgumentsBuffer, Engine, ErrorHandler, Frontend, FunctionSymbol, HostValue,
        Interceptor, KeywordArguments, LowLevel, MachineWord, Result, RobinError, TypeHandle,
    };
}
