//! Telar Core - patch execution engine
//!
//! This crate is the runtime that executes dataflow patches expressed in the
//! Pure Data (Pd) patch language. A host feeds it channel-major blocks of
//! input samples and receives blocks of output samples; between blocks,
//! timestamped control messages (parameter changes, MIDI notes, named
//! messages) can be injected.
//!
//! # Core Abstractions
//!
//! ## Values
//!
//! - [`Atom`] - A typed value: float, interned symbol, or bang
//! - [`Message`] - A timestamped atom sequence passed between objects
//! - [`Symbol`] - Cheaply cloneable interned string
//!
//! ## Objects
//!
//! - [`PatchObject`] - Object-safe trait every patch object implements
//! - [`Runtime`] - Message-time service handle (outlet sends, scheduling,
//!   named sends, console)
//! - [`DspContext`] - Block-time service handle (buffer pool, delay lines,
//!   tables, throw summation, deferred outbox)
//!
//! ## Engine
//!
//! - [`Engine`] - Owns graphs, objects, the buffer pool, the named registry,
//!   and the timestamp-ordered message queue; drives one block per
//!   [`process()`](Engine::process) call
//! - [`Graph`] - Recursive container of objects and connections with a cached
//!   DSP process order
//! - [`NamedRegistry`] - The long-range wire fabric: send~/receive~,
//!   throw~/catch~, delwrite~/delread~, arrays, named message routing
//!
//! # Ordering Contract
//!
//! All messages due in a block are delivered before any DSP runs for that
//! block, in timestamp order with FIFO tie-breaks. Signal objects that split
//! their block around intra-block message timestamps are the one sanctioned
//! exception. Messages emitted from inside DSP processing are deferred to the
//! next block.
//!
//! # Concurrency
//!
//! The engine is single-threaded by construction: every entry point takes
//! `&mut Engine`, so cross-thread exclusion is the caller's mutex and
//! re-entrancy from message handlers flows through the explicit [`Runtime`]
//! handle rather than a recursive lock.

pub mod atom;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod graph;
pub mod message;
pub mod object;
pub mod queue;
pub mod registry;

pub use atom::{Atom, Symbol};
pub use buffer::{BufferId, BufferPool};
pub use engine::{
    ConsoleHook, ConsoleMessage, DspContext, Engine, EngineConfig, ObjectEnv, Runtime,
};
pub use error::PatchError;
pub use graph::{Graph, GraphId};
pub use message::Message;
pub use object::{
    ConnectionType, ObjectId, PatchObject, PortSpec, Registration, SignalInbox,
};
pub use queue::PendingHandle;
pub use registry::{DelayLine, NamedRegistry, Table};
