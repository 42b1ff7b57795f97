// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The robin dispatch core.
//!
//! Given a call request against one of many native functions, the
//! engine decides *which* overload to invoke and *how* to marshal each
//! argument through a chain of implicit type conversions whose cost is
//! minimized. It holds the reflection data model (types, functions,
//! classes, enums, namespaces), the conversion graph with its
//! shortest-path search, the overload resolver with its caches, and the
//! word-level calling convention. Language bindings plug in through the
//! contracts in [`frontend`].

pub mod buffer;
pub mod containers;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod frontend;
pub mod frontends;
pub mod low_level;
pub mod numeric;
pub mod reflection;
pub mod registration;
pub mod types;

pub use crate::engine::{with_global_engine, Engine};
pub use crate::error::{Result, RobinError};

pub use crate::buffer::{ArgumentsBuffer, MachineWord, ARGUMENTS_BUFFER_SIZE};
pub use crate::conversion::{Conversion, ConversionKind, ConversionRoute, Weight};
pub use crate::frontend::{
    Adapter, CapturedError, ErrorHandler, Frontend, GarbageCollection, HostValue, Insight,
    Interceptor,
};
pub use crate::low_level::{
    Backtrace, DefaultLowLevel, FunctionSymbol, LowLevel, NativeError, ARGUMENT_ARRAY_LIMIT,
};
pub use crate::reflection::cfunction::{CFunction, FunctionKind, Signature};
pub use crate::reflection::class::{Class, ClassId};
pub use crate::reflection::enumerated::{EnumId, EnumeratedType};
pub use crate::reflection::instance::Instance;
pub use crate::reflection::library::Library;
pub use crate::reflection::method::CallableWithInstance;
pub use crate::reflection::namespace::{Namespace, NamespaceItem};
pub use crate::reflection::overloaded_set::{KeywordArguments, OverloadedSet};
pub use crate::types::{
    Constness, Intrinsics, RobinType, TypeCategory, TypeDetail, TypeHandle, TypeId, TypeRegistry,
    TypeSpec,
};
