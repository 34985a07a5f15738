//! A DBI-host-attached binary fault-injection engine.
//!
//! This crate implements the counter/trigger/planner/injector pipeline
//! (modules [`counters`], [`trigger`], [`planner`], [`inject`]) that a host
//! backend ([`host::Host`]) drives from its own instrumentation callbacks via
//! [`engine::Engine`]. See [`session::Session`] for what persists across one
//! host attachment and [`report`] for the event log / summary format.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod host;
pub mod inject;
pub mod monitor;
pub mod planner;
pub mod report;
pub mod session;
pub mod state;
pub mod trigger;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{
    Command,
    Config,
    TriggerType,
};
pub use engine::Engine;
pub use error::BfiError;
pub use host::Host;
pub use report::Sink;
pub use session::Session;

pub mod prelude {
    //! Re-exports of the types most host backends need.
    pub use crate::config::{
        Command,
        Config,
        TriggerType,
    };
    pub use crate::engine::Engine;
    pub use crate::error::{
        BfiError,
        ConfigError,
        ResourceError,
    };
    pub use crate::host::{
        Access,
        Addr,
        FunctionSite,
        Host,
        InstructionView,
        Memory,
        MemoryOperand,
        RegId,
        RegisterContext,
        SourceLocation,
    };
    pub use crate::report::Sink;
    pub use crate::session::Session;
}
