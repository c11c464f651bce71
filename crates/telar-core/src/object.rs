//! The object protocol: every node in a patch implements [`PatchObject`].

use crate::engine::{DspContext, Runtime};
use crate::message::Message;

/// Identifier of an object in the engine-wide arena.
///
/// Ids are assigned in creation order and never reused within an engine
/// instance; creation order is also the tie-break for DSP ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    /// Returns the raw index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The kind of data an outlet emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    /// Discrete timestamped messages.
    Message,
    /// A per-block signal buffer.
    Signal,
}

/// Port counts an object declares at construction time.
///
/// Inlet indices form a single space shared by message and signal delivery:
/// a signal connection to inlet `i` binds a buffer there, a message
/// connection to the same index delivers through
/// [`PatchObject::receive_message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortSpec {
    /// Total number of inlets.
    pub inlets: usize,
    /// Total number of outlets.
    pub outlets: usize,
}

impl PortSpec {
    /// Shorthand constructor.
    pub const fn new(inlets: usize, outlets: usize) -> Self {
        Self { inlets, outlets }
    }
}

/// Declarative named-endpoint binding an object requests when it is added to
/// a graph.
///
/// The engine inspects this once at `add_object` time and installs the
/// long-range wiring in the [`NamedRegistry`](crate::NamedRegistry); the
/// object itself only keeps the name. Duplicate-name rejection and late
/// rebinding are the registry's business, not the object's.
#[derive(Clone, Debug, PartialEq)]
pub enum Registration {
    /// `send~ name`: publishes this object's inlet-0 buffer under `name`.
    DspSend(crate::Symbol),
    /// `receive~ name`: outlet 0 aliases the matching send~ buffer when bound.
    DspReceive(crate::Symbol),
    /// `throw~ name`: contributes this object's inlet-0 buffer to a catch~ sum.
    DspThrow(crate::Symbol),
    /// `catch~ name`: sums all same-named throw~ buffers each block.
    DspCatch(crate::Symbol),
    /// `delwrite~ name len_ms`: owns the named delay line.
    DelayWrite(crate::Symbol, f64),
    /// `table` / `#X array`: owns the named sample table of the given length.
    Table(crate::Symbol, usize),
    /// `receive name` (message domain): subscribes to the named message bus.
    MessageReceive(crate::Symbol),
    /// `adc~`: outlets bind to the engine's input channel buffers.
    AudioIn,
    /// `inlet` / `inlet~`: k-th boundary inlet of the containing graph.
    GraphInlet {
        /// Signal-rate boundary (`inlet~`) rather than message (`inlet`).
        signal: bool,
    },
    /// `outlet` / `outlet~`: k-th boundary outlet of the containing graph.
    GraphOutlet {
        /// Signal-rate boundary (`outlet~`) rather than message (`outlet`).
        signal: bool,
    },
}

/// A patch object: a polymorphic node with message inlets/outlets and
/// optional signal inlets/outlets.
///
/// Message-only objects implement [`process_message`](Self::process_message)
/// and leave the DSP hooks at their defaults. Signal objects additionally
/// implement [`process_dsp`](Self::process_dsp) and usually override
/// [`receive_message`](Self::receive_message) to stash messages for
/// sub-block-accurate handling inside the DSP pass (see [`SignalInbox`]).
pub trait PatchObject: Send {
    /// The textual label of this object's type, e.g. `"osc~"`.
    fn label(&self) -> &'static str;

    /// Declares inlet/outlet counts.
    fn ports(&self) -> PortSpec;

    /// Generic message entry point.
    ///
    /// The default dispatches straight to
    /// [`process_message`](Self::process_message).
    fn receive_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        self.process_message(inlet, message, rt);
    }

    /// The object's message logic.
    fn process_message(&mut self, _inlet: usize, _message: &Message, _rt: &mut Runtime<'_>) {}

    /// Recomputes this object's signal outlet buffers for the current block.
    fn process_dsp(&mut self, _ctx: &mut DspContext<'_>) {}

    /// True when this object has signal outlets that must be recomputed each
    /// block (i.e. it belongs in the DSP process order).
    fn processes_audio(&self) -> bool {
        false
    }

    /// Scheduling classification: generates signal or events with no
    /// dataflow parent. Roots terminate the upstream walk during process
    /// ordering.
    fn is_root(&self) -> bool {
        false
    }

    /// Scheduling classification: absorbs signal or events. Leaves seed the
    /// upstream walk during process ordering.
    fn is_leaf(&self) -> bool {
        false
    }

    /// The kind of connection the given outlet produces.
    fn connection_type(&self, _outlet: usize) -> ConnectionType {
        ConnectionType::Message
    }

    /// Named-endpoint binding to install when the object joins a graph.
    fn registration(&self) -> Option<Registration> {
        None
    }

    /// Delivery hook for messages popped off the central queue.
    ///
    /// The default forwards out the outlet; self-rescheduling objects
    /// (`metro`, `line`) override to re-arm first.
    fn deliver_scheduled(&mut self, outlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        rt.outlet(outlet, message);
    }

    /// Called once when the containing graph is attached to the engine;
    /// `loadbang` fires here.
    fn on_attach(&mut self, _rt: &mut Runtime<'_>) {}
}

/// Pending intra-block messages for signal objects.
///
/// Signal objects with sample-accurate message inlets stash incoming messages
/// here from [`PatchObject::receive_message`] and drain them inside
/// [`PatchObject::process_dsp`], splitting the block at each message's sample
/// index.
#[derive(Debug, Default)]
pub struct SignalInbox {
    pending: Vec<(f64, usize, Message)>,
}

impl SignalInbox {
    /// Creates an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stashes a message for the DSP pass.
    pub fn push(&mut self, inlet: usize, message: &Message) {
        self.pending
            .push((message.timestamp(), inlet, message.clone()));
    }

    /// True when no messages are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes all pending messages sorted by timestamp (stable, so FIFO for
    /// ties).
    pub fn drain_sorted(&mut self) -> Vec<(f64, usize, Message)> {
        let mut out = std::mem::take(&mut self.pending);
        out.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}
