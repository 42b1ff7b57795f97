// Copyright 2021 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use thiserror::Error;

/// The result alias used throughout the engine.
pub type Result<T, E = RobinError> = std::result::Result<T, E>;

/// Everything the dispatch core can report to a frontend.
///
/// Conversion-graph and lookup failures propagate unchanged to the
/// dispatcher; native exceptions are wrapped at the `CFunction` call
/// boundary as [`RobinError::UserExceptionOccurred`] with the first-chance
/// payload stashed on the frontend's error handler. Nothing is silently
/// swallowed.
#[derive(Error, Debug, Clone)]
pub enum RobinError {
    /// Positional/keyword merge failed, or the argument count does not
    /// match the signature being called.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The shortest-path search exhausted the conversion graph without
    /// reaching the requested target type.
    #[error("no conversion route connects '{from}' to '{to}'")]
    NoApplicableConversion { from: String, to: String },

    /// No alternative in the overload set admits a possible conversion
    /// route for the given argument types.
    #[error("no overloaded alternative of '{callable}' matches the given arguments; candidates:\n{candidates}")]
    OverloadingNoMatch { callable: String, candidates: String },

    /// Two or more structurally distinct alternatives tie for the
    /// cheapest conversion route.
    #[error("call of '{callable}' is ambiguous with the given arguments")]
    OverloadingAmbiguity { callable: String },

    #[error("class '{class}' has no method named '{method}'")]
    NoSuchMethod { class: String, method: String },

    #[error("no constructor of '{0}' accepts the given arguments")]
    NoSuchConstructor(String),

    #[error("class '{0}' declares no constructors")]
    NoConstructorsAtAll(String),

    /// A namespace/class/enum/function name was not found during
    /// registration or resolution.
    #[error("name '{0}' was not found")]
    LookupFailure(String),

    /// A type was used for translation without an adapter installed.
    #[error("unsupported interface: type '{0}' has no adapter")]
    UnsupportedInterface(String),

    /// The native call raised; the payload was captured first-chance on
    /// the frontend's error handler.
    #[error("exception in native call: {0}")]
    UserExceptionOccurred(String),

    /// A frontend-dependent operation was attempted with no active
    /// frontend installed.
    #[error("no active frontend is installed")]
    EnvironmentVacuum,

    /// The registration table could not be acquired from a dynamic
    /// library (reported by the loader, outside this crate).
    #[error("cannot open dynamic library: {0}")]
    DynamicLibraryOpen(String),

    #[error("argument limit exceeded: {0} words")]
    ArgumentArrayLimitExceeded(usize),

    /// A registration record could not be decoded.
    #[error("malformed registration data: {0}")]
    MalformedRegistration(#[from] robin_parser::ParseError),
}
