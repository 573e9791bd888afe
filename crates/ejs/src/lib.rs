#![doc = include_str!("../../../README.md")]
#![allow(dead_code, reason = "engine surface grows ahead of every builtin using it yet")]

mod builtins;
mod cellpool;
mod containers;
mod engine;
mod error;
mod gc;
mod host;
mod iter;
mod jsarraybuffer;
mod jsvar;
mod json;
mod lexer;
mod nativecall;
mod parser;
mod regexp;
mod resource;
mod strings;
mod tracer;
mod types;

pub use crate::{
    cellpool::{PoolDiff, PoolStats},
    engine::{Engine, EngineConfig},
    error::{CodeLoc, Exception, Kind, StackFrame},
    host::{Host, NullHost, OutputHandle, StdoutHost},
    jsvar::JsVar,
    resource::{NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
};
