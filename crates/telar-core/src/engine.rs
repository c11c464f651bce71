//! The engine: object arena, block scheduler, and host API.
//!
//! One [`Engine`] corresponds to one embedded patch runtime. It owns every
//! graph, every object, the block buffer pool, the named registry, and the
//! central message queue. [`Engine::process`] renders one block: it copies
//! host input into the ADC buffers, drains all messages due this block in
//! timestamp order, runs each attached graph's DSP process order, and copies
//! the DAC accumulation buffers back out.
//!
//! # Dispatch model
//!
//! Message delivery is synchronous and depth-first, in connection insertion
//! order. To let an object's handler re-enter the engine (send further
//! messages, schedule, mutate the graph) while the engine is borrowed, the
//! boxed object is taken out of its arena slot for the duration of the call
//! and returned afterwards; its adjacency stays in the slot. A message that
//! reaches an object currently on the dispatch stack (a message cycle) is
//! dropped with a debug log.
//!
//! # Threading
//!
//! Every entry point takes `&mut self`: the engine is single-threaded by
//! construction and cross-thread exclusion is the caller's mutex. Handlers
//! re-enter through the [`Runtime`] handle instead of a recursive lock.

use crate::atom::{Atom, Symbol};
use crate::buffer::{BufferId, BufferPool};
use crate::error::PatchError;
use crate::graph::{Graph, GraphEntry, GraphId};
use crate::message::Message;
use crate::object::{ConnectionType, ObjectId, PatchObject, Registration};
use crate::queue::{MessageQueue, PendingHandle, QueueTarget};
use crate::registry::{DelayLine, DuplicateName, NamedRegistry};

/// Fixed parameters of an engine instance.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of host input channels (`adc~` width).
    pub input_channels: usize,
    /// Number of host output channels (`dac~` width).
    pub output_channels: usize,
    /// Samples per block.
    pub block_size: usize,
    /// Sample rate in Hz.
    pub sample_rate: f32,
}

impl EngineConfig {
    /// Duration of one block in milliseconds.
    pub fn block_duration_ms(&self) -> f64 {
        f64::from(self.block_size as u32) / f64::from(self.sample_rate) * 1000.0
    }
}

/// Environment handed to object constructors by the factory.
#[derive(Clone, Copy, Debug)]
pub struct ObjectEnv {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per block.
    pub block_size: usize,
    /// Engine input channel count.
    pub input_channels: usize,
    /// Engine output channel count.
    pub output_channels: usize,
}

/// An event surfaced to the host console hook.
#[derive(Debug, PartialEq)]
pub enum ConsoleMessage<'a> {
    /// A `print` object or informational runtime output.
    Print(&'a str),
    /// A recoverable diagnostic (duplicate names, type mismatches, ...).
    Error(&'a str),
    /// A `dsp` system message toggled audio on or off.
    DspActive(bool),
}

/// Host-supplied console callback.
pub type ConsoleHook = Box<dyn FnMut(ConsoleMessage<'_>) + Send>;

/// A signal inlet binding: the buffer this inlet reads and the producing
/// outlet, if any. Unconnected inlets read the shared silence buffer.
struct Inlet {
    buffer: BufferId,
    source: Option<(ObjectId, usize)>,
}

/// An outlet: its connection type, its signal buffer (silence placeholder
/// for message outlets), and its fan-out edges in insertion order.
struct Outlet {
    kind: ConnectionType,
    buffer: BufferId,
    targets: Vec<(ObjectId, usize)>,
}

/// Arena slot: the boxed object plus everything dispatch needs while the
/// object itself is temporarily taken out.
pub(crate) struct ObjectSlot {
    object: Option<Box<dyn PatchObject>>,
    label: &'static str,
    #[allow(dead_code)]
    graph: GraphId,
    ordered: bool,
    /// `inlet~`/`outlet~` forward their inlet-0 buffer to their outlet.
    alias_passthrough: bool,
    registration: Option<Registration>,
    processes_audio: bool,
    is_root: bool,
    is_leaf: bool,
    inlets: Vec<Inlet>,
    outlets: Vec<Outlet>,
}

/// The patch runtime. See the module docs for the processing model.
pub struct Engine {
    config: EngineConfig,
    block_start: f64,
    block_duration: f64,
    pool: BufferPool,
    slots: Vec<Option<ObjectSlot>>,
    graphs: Vec<Option<Graph>>,
    attached: Vec<GraphId>,
    registry: NamedRegistry,
    queue: MessageQueue,
    console: Option<ConsoleHook>,
    dsp_outbox: Vec<(ObjectId, usize, Message)>,
    order_dirty: bool,
    next_file_id: u32,
}

impl Engine {
    /// Creates an engine with no console hook (diagnostics go to `tracing`).
    pub fn new(config: EngineConfig) -> Self {
        // Pool layout: [0] silence, [1..=in] ADC, next `out` ids DAC.
        let fixed = 1 + config.input_channels + config.output_channels;
        Self {
            block_start: 0.0,
            block_duration: config.block_duration_ms(),
            pool: BufferPool::new(fixed, config.block_size),
            slots: Vec::new(),
            graphs: Vec::new(),
            attached: Vec::new(),
            registry: NamedRegistry::new(),
            queue: MessageQueue::new(),
            console: None,
            dsp_outbox: Vec::new(),
            order_dirty: false,
            next_file_id: 0,
            config,
        }
    }

    /// Creates an engine with a host console hook.
    pub fn with_console(config: EngineConfig, hook: ConsoleHook) -> Self {
        let mut engine = Self::new(config);
        engine.console = Some(hook);
        engine
    }

    // --- Accessors ---

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Timestamp of the current block start, in ms since the engine epoch.
    pub fn block_start(&self) -> f64 {
        self.block_start
    }

    /// Duration of one block in ms.
    pub fn block_duration(&self) -> f64 {
        self.block_duration
    }

    /// Environment for object constructors.
    pub fn object_env(&self) -> ObjectEnv {
        ObjectEnv {
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
            input_channels: self.config.input_channels,
            output_channels: self.config.output_channels,
        }
    }

    /// The named registry (tables, delay lines, endpoints).
    pub fn registry(&self) -> &NamedRegistry {
        &self.registry
    }

    /// Mutable access to the named registry (array fills during parsing).
    pub fn registry_mut(&mut self) -> &mut NamedRegistry {
        &mut self.registry
    }

    fn adc_buffer(&self, channel: usize) -> Option<BufferId> {
        (channel < self.config.input_channels).then(|| BufferId(1 + channel as u32))
    }

    fn dac_buffer(&self, channel: usize) -> Option<BufferId> {
        (channel < self.config.output_channels)
            .then(|| BufferId(1 + (self.config.input_channels + channel) as u32))
    }

    // --- Graphs ---

    fn insert_graph(&mut self, parent: Option<GraphId>, file_id: u32, args: Vec<Atom>) -> GraphId {
        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(Some(Graph::new(id, parent, file_id, args)));
        id
    }

    /// Creates a new top-level graph with the given arguments.
    pub fn new_top_graph(&mut self, args: Vec<Atom>) -> GraphId {
        self.next_file_id += 1;
        self.insert_graph(None, self.next_file_id, args)
    }

    /// Creates a subpatch: shares the parent's file id and argument vector.
    pub fn new_subpatch(&mut self, parent: GraphId) -> Result<GraphId, PatchError> {
        let (file_id, args) = {
            let g = self.graph(parent)?;
            (g.file_id(), g.args().to_vec())
        };
        let id = self.insert_graph(Some(parent), file_id, args);
        self.graph_mut(parent)?.entries.push(GraphEntry::Subgraph(id));
        Ok(id)
    }

    /// Creates an abstraction instance: fresh file id, its own arguments.
    pub fn new_abstraction(&mut self, parent: GraphId, args: Vec<Atom>) -> Result<GraphId, PatchError> {
        self.graph(parent)?;
        self.next_file_id += 1;
        let id = self.insert_graph(Some(parent), self.next_file_id, args);
        self.graph_mut(parent)?.entries.push(GraphEntry::Subgraph(id));
        Ok(id)
    }

    /// Shared access to a graph.
    pub fn graph(&self, id: GraphId) -> Result<&Graph, PatchError> {
        self.graphs
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PatchError::GraphNotFound(id))
    }

    /// Mutable access to a graph.
    pub fn graph_mut(&mut self, id: GraphId) -> Result<&mut Graph, PatchError> {
        self.graphs
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PatchError::GraphNotFound(id))
    }

    /// Installs a graph as a top-level graph: computes its DSP process order
    /// and fires `loadbang`-style attach hooks in creation order.
    pub fn attach_graph(&mut self, id: GraphId) -> Result<(), PatchError> {
        self.graph(id)?;
        self.attached.push(id);
        self.recompute_process_order(id)?;
        for object in self.collect_tree(id)? {
            self.dispatch_attach(object);
        }
        Ok(())
    }

    /// The attached top-level graphs in attach order.
    pub fn attached_graphs(&self) -> &[GraphId] {
        &self.attached
    }

    // --- Objects and connections ---

    /// Adds an object to a graph: allocates outlet buffers, installs any
    /// named-endpoint registration, and records boundary inlets/outlets.
    pub fn add_object(
        &mut self,
        graph: GraphId,
        object: Box<dyn PatchObject>,
    ) -> Result<ObjectId, PatchError> {
        self.graph(graph)?;
        let id = ObjectId(self.slots.len() as u32);
        let ports = object.ports();
        let registration = object.registration();
        let label = object.label();

        let alias_passthrough = matches!(
            registration,
            Some(Registration::GraphInlet { signal: true } | Registration::GraphOutlet { signal: true })
        );

        let mut outlets = Vec::with_capacity(ports.outlets);
        for o in 0..ports.outlets {
            let kind = object.connection_type(o);
            let buffer = match (&registration, kind) {
                // adc~ outlets alias the engine input buffers directly.
                (Some(Registration::AudioIn), ConnectionType::Signal) => {
                    self.adc_buffer(o).unwrap_or(BufferId::SILENCE)
                }
                // Late-bound aliases start at silence until a producer binds.
                (Some(Registration::DspReceive(_) | Registration::GraphInlet { signal: true }), _) => {
                    BufferId::SILENCE
                }
                (_, ConnectionType::Signal) => self.pool.allocate(),
                (_, ConnectionType::Message) => BufferId::SILENCE,
            };
            outlets.push(Outlet {
                kind,
                buffer,
                targets: Vec::new(),
            });
        }

        let inlets = (0..ports.inlets)
            .map(|_| Inlet {
                buffer: BufferId::SILENCE,
                source: None,
            })
            .collect();

        let slot = ObjectSlot {
            label,
            graph,
            ordered: false,
            alias_passthrough,
            registration: registration.clone(),
            processes_audio: object.processes_audio(),
            is_root: object.is_root(),
            is_leaf: object.is_leaf(),
            inlets,
            outlets,
            object: Some(object),
        };
        self.slots.push(Some(slot));
        self.graph_mut(graph)?.entries.push(GraphEntry::Object(id));
        self.order_dirty = true;

        if let Some(registration) = registration {
            self.install_registration(graph, id, registration);
        }
        Ok(id)
    }

    fn install_registration(&mut self, graph: GraphId, id: ObjectId, registration: Registration) {
        match registration {
            Registration::DspSend(name) => {
                let buffer = self.inlet_buffer_of(id, 0);
                match self.registry.register_dsp_send(name.clone(), id, buffer) {
                    Ok(()) => self.rebind_dsp_receivers(&name, buffer),
                    Err(err) => self.print_duplicate(&err),
                }
            }
            Registration::DspReceive(name) => {
                self.registry.register_dsp_receive(name.clone(), id);
                if let Some(buffer) = self.registry.dsp_send_buffer(&name) {
                    self.rebind_outlet(id, 0, buffer);
                }
            }
            Registration::DspThrow(name) => {
                let buffer = self.inlet_buffer_of(id, 0);
                self.registry.register_throw(name, id, buffer);
            }
            Registration::DspCatch(name) => {
                if let Err(err) = self.registry.register_catch(name, id) {
                    self.print_duplicate(&err);
                }
            }
            Registration::DelayWrite(name, len_ms) => {
                let samples = (len_ms / 1000.0 * f64::from(self.config.sample_rate)).ceil() as usize
                    + self.config.block_size;
                if let Err(err) = self.registry.register_delay_line(name, DelayLine::new(samples)) {
                    self.print_duplicate(&err);
                }
            }
            Registration::Table(name, len) => {
                if let Err(err) = self
                    .registry
                    .register_table(name, crate::registry::Table::new(len))
                {
                    self.print_duplicate(&err);
                }
            }
            Registration::MessageReceive(name) => {
                self.registry.register_bus_receiver(&name, id);
            }
            Registration::GraphInlet { .. } => {
                if let Ok(g) = self.graph_mut(graph) {
                    g.inlet_objects.push(id);
                }
            }
            Registration::GraphOutlet { .. } => {
                if let Ok(g) = self.graph_mut(graph) {
                    g.outlet_objects.push(id);
                }
            }
            Registration::AudioIn => {}
        }
    }

    fn print_duplicate(&mut self, err: &DuplicateName) {
        self.print_err(&format!(
            "duplicate {} object found with name \"{}\"",
            err.kind, err.name
        ));
    }

    fn inlet_buffer_of(&self, id: ObjectId, inlet: usize) -> BufferId {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .and_then(|s| s.inlets.get(inlet))
            .map_or(BufferId::SILENCE, |i| i.buffer)
    }

    /// Connects `from:outlet` to `to:inlet`. The connection's type is the
    /// source outlet's type; signal connections eagerly rebind the consumer's
    /// inlet buffer to the producer's outlet buffer.
    pub fn connect(
        &mut self,
        from: ObjectId,
        outlet: usize,
        to: ObjectId,
        inlet: usize,
    ) -> Result<(), PatchError> {
        let (kind, buffer) = {
            let slot = self.slot(from)?;
            let out = slot.outlets.get(outlet).ok_or(PatchError::NoSuchPort {
                object: from,
                kind: "outlet",
                index: outlet,
            })?;
            (out.kind, out.buffer)
        };
        {
            let slot = self.slot(to)?;
            if inlet >= slot.inlets.len() {
                return Err(PatchError::NoSuchPort {
                    object: to,
                    kind: "inlet",
                    index: inlet,
                });
            }
        }

        self.slot_mut(from)?.outlets[outlet].targets.push((to, inlet));
        if kind == ConnectionType::Signal {
            self.slot_mut(to)?.inlets[inlet].source = Some((from, outlet));
            self.rebind_inlet(to, inlet, buffer);
        }
        self.order_dirty = true;
        Ok(())
    }

    /// Connects by graph-ordinal indices, as `#X connect` statements do.
    /// Subgraph endpoints resolve to their boundary inlet/outlet objects.
    pub fn connect_by_index(
        &mut self,
        graph: GraphId,
        from_index: usize,
        outlet: usize,
        to_index: usize,
        inlet: usize,
    ) -> Result<(), PatchError> {
        let (from, outlet) = self.resolve_source(graph, from_index, outlet)?;
        let (to, inlet) = self.resolve_sink(graph, to_index, inlet)?;
        self.connect(from, outlet, to, inlet)
    }

    fn entry_at(&self, graph: GraphId, index: usize) -> Result<GraphEntry, PatchError> {
        let g = self.graph(graph)?;
        g.entries
            .get(index)
            .copied()
            .ok_or(PatchError::BadObjectIndex {
                index,
                len: g.entries.len(),
            })
    }

    fn resolve_source(
        &self,
        graph: GraphId,
        index: usize,
        outlet: usize,
    ) -> Result<(ObjectId, usize), PatchError> {
        match self.entry_at(graph, index)? {
            GraphEntry::Object(id) => Ok((id, outlet)),
            GraphEntry::Subgraph(sub) => {
                let g = self.graph(sub)?;
                let id = g
                    .outlet_objects
                    .get(outlet)
                    .copied()
                    .ok_or(PatchError::BadObjectIndex {
                        index: outlet,
                        len: g.outlet_objects.len(),
                    })?;
                Ok((id, 0))
            }
        }
    }

    fn resolve_sink(
        &self,
        graph: GraphId,
        index: usize,
        inlet: usize,
    ) -> Result<(ObjectId, usize), PatchError> {
        match self.entry_at(graph, index)? {
            GraphEntry::Object(id) => Ok((id, inlet)),
            GraphEntry::Subgraph(sub) => {
                let g = self.graph(sub)?;
                let id = g
                    .inlet_objects
                    .get(inlet)
                    .copied()
                    .ok_or(PatchError::BadObjectIndex {
                        index: inlet,
                        len: g.inlet_objects.len(),
                    })?;
                Ok((id, 0))
            }
        }
    }

    fn slot(&self, id: ObjectId) -> Result<&ObjectSlot, PatchError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PatchError::ObjectNotFound(id))
    }

    fn slot_mut(&mut self, id: ObjectId) -> Result<&mut ObjectSlot, PatchError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PatchError::ObjectNotFound(id))
    }

    // --- Buffer rebinding ---

    /// Rebinds a signal inlet and propagates the change through aliases and
    /// named endpoints that publish this inlet's buffer.
    fn rebind_inlet(&mut self, id: ObjectId, inlet: usize, buffer: BufferId) {
        let Ok(slot) = self.slot_mut(id) else { return };
        if inlet >= slot.inlets.len() {
            return;
        }
        slot.inlets[inlet].buffer = buffer;
        let alias = slot.alias_passthrough;
        let registration = slot.registration.clone();

        if alias && inlet == 0 {
            self.rebind_outlet(id, 0, buffer);
        }
        match registration {
            Some(Registration::DspSend(_)) if inlet == 0 => {
                if let Some(name) = self.registry.update_dsp_send_buffer(id, buffer) {
                    self.rebind_dsp_receivers(&name, buffer);
                }
            }
            Some(Registration::DspThrow(_)) if inlet == 0 => {
                self.registry.update_throw_buffer(id, buffer);
            }
            _ => {}
        }
    }

    /// Rebinds a signal outlet and pushes the new buffer to every connected
    /// consumer inlet.
    fn rebind_outlet(&mut self, id: ObjectId, outlet: usize, buffer: BufferId) {
        let targets = {
            let Ok(slot) = self.slot_mut(id) else { return };
            let Some(out) = slot.outlets.get_mut(outlet) else {
                return;
            };
            out.buffer = buffer;
            out.targets.clone()
        };
        for (target, inlet) in targets {
            self.rebind_inlet(target, inlet, buffer);
        }
    }

    fn rebind_dsp_receivers(&mut self, name: &Symbol, buffer: BufferId) {
        let receivers: Vec<ObjectId> = self.registry.dsp_receivers(name).collect();
        for id in receivers {
            self.rebind_outlet(id, 0, buffer);
        }
    }

    // --- DSP process ordering ---

    /// Objects of a graph tree in creation order (patch-file appearance).
    fn collect_tree(&self, graph: GraphId) -> Result<Vec<ObjectId>, PatchError> {
        let mut out = Vec::new();
        self.collect_tree_into(graph, &mut out)?;
        Ok(out)
    }

    fn collect_tree_into(&self, graph: GraphId, out: &mut Vec<ObjectId>) -> Result<(), PatchError> {
        for entry in self.graph(graph)?.entries.clone() {
            match entry {
                GraphEntry::Object(id) => out.push(id),
                GraphEntry::Subgraph(sub) => self.collect_tree_into(sub, out)?,
            }
        }
        Ok(())
    }

    /// Recomputes the DSP process order of one top-level graph tree.
    ///
    /// Seeds are the scheduling leaves (marked leaf, or no outgoing
    /// connections at all); the walk recurses upstream through signal inlet
    /// producers, skipping past scheduling roots, and emits audio processors
    /// on post-order so producers precede consumers. Ties fall back to
    /// creation order because both the seed scan and the inlet scan run in
    /// creation order.
    ///
    /// Long-range producer chains (`send~`, `throw~`, `delwrite~`) are seeded
    /// before everything else: their buffers must be written in a block
    /// before the chains hanging off `receive~`/`catch~`/`delread~` read
    /// them, independent of where the objects appear in the patch.
    fn recompute_process_order(&mut self, top: GraphId) -> Result<(), PatchError> {
        let tree = self.collect_tree(top)?;
        for &id in &tree {
            if let Ok(slot) = self.slot_mut(id) {
                slot.ordered = false;
            }
        }

        let mut order = Vec::new();
        for &id in &tree {
            let slot = self.slot(id)?;
            if matches!(
                slot.registration,
                Some(
                    Registration::DspSend(_)
                        | Registration::DspThrow(_)
                        | Registration::DelayWrite(_, _)
                )
            ) {
                self.order_upstream(id, &mut order);
            }
        }
        for &id in &tree {
            let slot = self.slot(id)?;
            let no_outgoing = slot.outlets.iter().all(|o| o.targets.is_empty());
            if slot.is_leaf || no_outgoing {
                self.order_upstream(id, &mut order);
            }
        }
        self.graph_mut(top)?.process_order = order;
        Ok(())
    }

    fn order_upstream(&mut self, id: ObjectId, order: &mut Vec<ObjectId>) {
        let (already, is_root, sources, audio) = {
            let Ok(slot) = self.slot(id) else { return };
            let sources: Vec<ObjectId> = slot
                .inlets
                .iter()
                .filter_map(|i| i.source.map(|(src, _)| src))
                .collect();
            (slot.ordered, slot.is_root, sources, slot.processes_audio)
        };
        if already {
            return;
        }
        if let Ok(slot) = self.slot_mut(id) {
            slot.ordered = true;
        }
        if !is_root {
            for src in sources {
                self.order_upstream(src, order);
            }
        }
        if audio {
            order.push(id);
        }
    }

    /// Recomputes the DSP process order of a top-level graph tree. The
    /// parser calls this once a patch file is fully loaded; attaching a
    /// graph does it again, and connectivity changes mark it dirty for the
    /// next block.
    pub fn compute_dsp_order(&mut self, top: GraphId) -> Result<(), PatchError> {
        self.recompute_process_order(top)
    }

    /// Recomputes process orders for every attached graph. Called lazily when
    /// graph connectivity changed.
    pub fn recompute_all_orders(&mut self) {
        for top in self.attached.clone() {
            let _ = self.recompute_process_order(top);
        }
        self.order_dirty = false;
    }

    // --- Dispatch machinery ---

    fn take_object(&mut self, id: ObjectId) -> Option<Box<dyn PatchObject>> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .and_then(|slot| slot.object.take())
    }

    fn return_object(&mut self, id: ObjectId, object: Box<dyn PatchObject>) {
        if let Some(slot) = self.slots.get_mut(id.index()).and_then(Option::as_mut) {
            slot.object = Some(object);
        }
    }

    /// Delivers a message to an object's inlet (synchronous, re-entrant).
    pub(crate) fn dispatch(&mut self, target: ObjectId, inlet: usize, message: &Message) {
        let Some(mut object) = self.take_object(target) else {
            let label = self.slot(target).map(|s| s.label).unwrap_or("?");
            tracing::debug!(?target, label, inlet, "dropping message to busy or missing object");
            return;
        };
        {
            let mut rt = Runtime {
                engine: self,
                current: target,
            };
            object.receive_message(inlet, message, &mut rt);
        }
        self.return_object(target, object);
    }

    fn dispatch_scheduled(&mut self, target: ObjectId, outlet: usize, message: &Message) {
        let Some(mut object) = self.take_object(target) else {
            tracing::debug!(?target, outlet, "dropping scheduled message to missing object");
            return;
        };
        {
            let mut rt = Runtime {
                engine: self,
                current: target,
            };
            object.deliver_scheduled(outlet, message, &mut rt);
        }
        self.return_object(target, object);
    }

    fn dispatch_attach(&mut self, target: ObjectId) {
        let Some(mut object) = self.take_object(target) else {
            return;
        };
        {
            let mut rt = Runtime {
                engine: self,
                current: target,
            };
            object.on_attach(&mut rt);
        }
        self.return_object(target, object);
    }

    fn outlet_target(&self, id: ObjectId, outlet: usize, k: usize) -> Option<(ObjectId, usize)> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .and_then(|slot| slot.outlets.get(outlet))
            .and_then(|out| out.targets.get(k))
            .copied()
    }

    fn dispatch_named_index(&mut self, index: usize, message: &Message) {
        let is_system = self
            .registry
            .bus_name(index)
            .is_some_and(|name| *name == "pd");
        if is_system {
            self.handle_system_message(message);
            return;
        }
        let mut k = 0;
        while let Some(receiver) = self.registry.bus_receiver(index, k) {
            self.dispatch(receiver, 0, message);
            k += 1;
        }
    }

    fn handle_system_message(&mut self, message: &Message) {
        if message.is_symbol(0, "dsp") {
            if let Some(value) = message.get_float(1) {
                self.console(ConsoleMessage::DspActive(value != 0.0));
                return;
            }
        }
        self.print_err(&format!("unrecognised system command: {message}"));
    }

    /// Delivers a message straight to an object's inlet, synchronously.
    ///
    /// Host-facing counterpart of a direct connection: dynamic patching
    /// setups use it to poke objects without wiring a `receive`.
    pub fn deliver(&mut self, object: ObjectId, inlet: usize, message: &Message) {
        self.dispatch(object, inlet, message);
    }

    // --- External message injection ---

    /// Schedules a message for a named receiver. Timestamps at or before the
    /// current block start are clamped up to it. Unknown receiver names are
    /// silently ignored: a send with nobody listening is not an error.
    pub fn schedule_message(&mut self, receiver: &str, mut message: Message) {
        let name = Symbol::new(receiver);
        let index = if name == "pd" {
            self.registry.bus_index_or_create(&name)
        } else {
            match self.registry.bus_index(&name) {
                Some(index) => index,
                None => return,
            }
        };
        if message.timestamp() < self.block_start {
            message.set_timestamp(self.block_start);
        }
        let timestamp = message.timestamp();
        self.queue
            .insert(timestamp, QueueTarget::Named(index), index, message);
    }

    /// Injects a message for delivery at the start of the next processed
    /// block.
    pub fn send_message(&mut self, receiver: &str, atoms: Vec<Atom>) {
        self.schedule_message(receiver, Message::new(self.block_start, atoms));
    }

    /// Injects a message with sub-block accuracy: `block_index` samples into
    /// the next processed block.
    pub fn send_message_at_block_index(
        &mut self,
        receiver: &str,
        block_index: f64,
        atoms: Vec<Atom>,
    ) {
        let clamped = block_index.clamp(0.0, (self.config.block_size - 1) as f64);
        let timestamp = self.block_start + clamped / f64::from(self.config.sample_rate) * 1000.0;
        self.schedule_message(receiver, Message::new(timestamp, atoms));
    }

    /// Routes a MIDI note to `zg_notein_<channel>` (0..15) and
    /// `zg_notein_omni`.
    pub fn send_midi_note(&mut self, channel: u8, note: u8, velocity: u8, block_index: f64) {
        if channel > 15 {
            return;
        }
        let atoms = vec![
            Atom::Float(f32::from(note)),
            Atom::Float(f32::from(velocity)),
            Atom::Float(f32::from(channel)),
        ];
        let name = format!("zg_notein_{channel}");
        self.send_message_at_block_index(&name, block_index, atoms.clone());
        self.send_message_at_block_index("zg_notein_omni", block_index, atoms);
    }

    // --- Console ---

    fn console(&mut self, message: ConsoleMessage<'_>) {
        if let Some(hook) = &mut self.console {
            hook(message);
        } else {
            match message {
                ConsoleMessage::Print(text) => tracing::info!(target: "telar", "{text}"),
                ConsoleMessage::Error(text) => tracing::warn!(target: "telar", "{text}"),
                ConsoleMessage::DspActive(on) => tracing::info!(target: "telar", dsp = on),
            }
        }
    }

    /// Emits a print-domain line through the console hook.
    pub fn print_std(&mut self, text: &str) {
        self.console(ConsoleMessage::Print(text));
    }

    /// Emits an error-domain line through the console hook.
    pub fn print_err(&mut self, text: &str) {
        self.console(ConsoleMessage::Error(text));
    }

    // --- The block scheduler ---

    /// Renders one block. `input` is channel-major with `block_size` samples
    /// per input channel; `output` likewise for output channels.
    ///
    /// All messages with timestamps inside this block are delivered, in
    /// timestamp order with FIFO ties, before any DSP runs. Messages emitted
    /// from DSP processing are deferred to the next block.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let bs = self.config.block_size;
        debug_assert!(input.len() >= bs * self.config.input_channels);
        debug_assert!(output.len() >= bs * self.config.output_channels);

        // ADC in.
        for channel in 0..self.config.input_channels {
            if let Some(id) = self.adc_buffer(channel) {
                self.pool
                    .write(id)
                    .copy_from_slice(&input[channel * bs..(channel + 1) * bs]);
            }
        }
        // DAC buffers accumulate within the block; clear them first.
        for channel in 0..self.config.output_channels {
            if let Some(id) = self.dac_buffer(channel) {
                self.pool.clear(id);
            }
        }

        // Drain every message due this block. Dispatch may enqueue further
        // messages into this same block or mutate the graph, so the queue
        // head is re-read each iteration.
        let block_end = self.block_start + self.block_duration;
        while let Some(queued) = self.queue.pop_due(block_end) {
            let mut message = queued.message;
            if message.timestamp() < self.block_start {
                message.set_timestamp(self.block_start);
            }
            match queued.target {
                QueueTarget::Object(id) => self.dispatch_scheduled(id, queued.outlet, &message),
                QueueTarget::Named(index) => self.dispatch_named_index(index, &message),
            }
        }

        if self.order_dirty {
            self.recompute_all_orders();
        }

        // DSP traversal: each attached graph in attach order, each graph in
        // its precomputed process order.
        for gi in 0..self.attached.len() {
            let top = self.attached[gi];
            let len = self
                .graph(top)
                .map(|g| g.process_order.len())
                .unwrap_or(0);
            for k in 0..len {
                let id = match self.graph(top) {
                    Ok(g) => g.process_order[k],
                    Err(_) => break,
                };
                self.run_dsp(id);
            }
        }

        // Messages posted during DSP become due no earlier than next block.
        let outbox = std::mem::take(&mut self.dsp_outbox);
        for (id, outlet, message) in outbox {
            let timestamp = message.timestamp().max(block_end);
            self.queue
                .insert(timestamp, QueueTarget::Object(id), outlet, message.at(timestamp));
        }

        self.block_start = block_end;

        // DAC out.
        for channel in 0..self.config.output_channels {
            if let Some(id) = self.dac_buffer(channel) {
                output[channel * bs..(channel + 1) * bs].copy_from_slice(self.pool.read(id));
            }
        }
    }

    fn run_dsp(&mut self, id: ObjectId) {
        let Some(mut object) = self.take_object(id) else {
            return;
        };
        {
            let Engine {
                slots,
                pool,
                registry,
                dsp_outbox,
                config,
                block_start,
                ..
            } = self;
            let mut ctx = DspContext {
                slots: slots.as_slice(),
                pool,
                registry,
                outbox: dsp_outbox,
                current: id,
                block_start: *block_start,
                sample_rate: config.sample_rate,
                input_channels: config.input_channels,
                output_channels: config.output_channels,
            };
            object.process_dsp(&mut ctx);
        }
        self.return_object(id, object);
    }

    // --- Scheduling services used by Runtime ---

    fn schedule_for_object(
        &mut self,
        id: ObjectId,
        outlet: usize,
        timestamp: f64,
        message: Message,
    ) -> PendingHandle {
        self.queue
            .insert(timestamp, QueueTarget::Object(id), outlet, message)
    }
}

/// Message-time service handle passed to object handlers.
///
/// Borrows the engine exclusively for the duration of one delivery; the
/// object being delivered to is temporarily out of the arena, so its slot
/// adjacency is what `outlet` walks.
pub struct Runtime<'a> {
    engine: &'a mut Engine,
    current: ObjectId,
}

impl Runtime<'_> {
    /// Sends a message out of the current object's outlet, delivering
    /// synchronously to each connected inlet in connection order.
    pub fn outlet(&mut self, outlet: usize, message: &Message) {
        let mut k = 0;
        while let Some((target, inlet)) = self.engine.outlet_target(self.current, outlet, k) {
            self.engine.dispatch(target, inlet, message);
            k += 1;
        }
    }

    /// Schedules a message for future delivery out of the current object's
    /// outlet. Returns the handle used to cancel it.
    pub fn schedule(&mut self, outlet: usize, timestamp: f64, message: Message) -> PendingHandle {
        self.engine
            .schedule_for_object(self.current, outlet, timestamp, message)
    }

    /// Cancels a previously scheduled message.
    pub fn cancel(&mut self, handle: PendingHandle) {
        self.engine.queue.cancel(handle);
    }

    /// Sends a message to every `receive` bound to `name`, synchronously.
    /// Unknown names deliver to nobody.
    pub fn send_named(&mut self, name: &Symbol, message: &Message) {
        if *name == "pd" {
            self.engine.handle_system_message(message);
            return;
        }
        if let Some(index) = self.engine.registry.bus_index(name) {
            self.engine.dispatch_named_index(index, message);
        }
    }

    /// Print-domain console output.
    pub fn print(&mut self, text: &str) {
        self.engine.print_std(text);
    }

    /// Error-domain console output.
    pub fn print_err(&mut self, text: &str) {
        self.engine.print_err(text);
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.engine.config.sample_rate
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.engine.config.block_size
    }

    /// Current block start in ms.
    pub fn block_start(&self) -> f64 {
        self.engine.block_start
    }

    /// Shared access to a named table.
    pub fn table(&self, name: &Symbol) -> Option<&crate::registry::Table> {
        self.engine.registry.table(name)
    }

    /// Mutable access to a named table.
    pub fn table_mut(&mut self, name: &Symbol) -> Option<&mut crate::registry::Table> {
        self.engine.registry.table_mut(name)
    }
}

/// Block-time service handle passed to [`PatchObject::process_dsp`].
///
/// The `pool` and `registry` fields are public so an object can hold
/// disjoint borrows of both at once (e.g. `catch~` accumulates pool buffers
/// while iterating registry throw lists).
pub struct DspContext<'a> {
    slots: &'a [Option<ObjectSlot>],
    /// The block buffer pool.
    pub pool: &'a mut BufferPool,
    /// The named registry (delay lines, tables, throw lists).
    pub registry: &'a mut NamedRegistry,
    outbox: &'a mut Vec<(ObjectId, usize, Message)>,
    current: ObjectId,
    block_start: f64,
    sample_rate: f32,
    input_channels: usize,
    output_channels: usize,
}

impl DspContext<'_> {
    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Current block start in ms.
    pub fn block_start(&self) -> f64 {
        self.block_start
    }

    /// Converts a message timestamp into a sample index within the current
    /// block, clamped to `0..=block_size`.
    pub fn index_of(&self, timestamp: f64) -> usize {
        let offset = (timestamp - self.block_start) / 1000.0 * f64::from(self.sample_rate);
        (offset.round().max(0.0) as usize).min(self.block_size())
    }

    fn own(&self) -> Option<&ObjectSlot> {
        self.slots.get(self.current.index()).and_then(Option::as_ref)
    }

    /// The buffer bound to one of the current object's inlets.
    pub fn inlet_buffer(&self, inlet: usize) -> BufferId {
        self.own()
            .and_then(|s| s.inlets.get(inlet))
            .map_or(BufferId::SILENCE, |i| i.buffer)
    }

    /// The buffer owned by one of the current object's outlets.
    pub fn outlet_buffer(&self, outlet: usize) -> BufferId {
        self.own()
            .and_then(|s| s.outlets.get(outlet))
            .map_or(BufferId::SILENCE, |o| o.buffer)
    }

    /// True when a signal connection drives the given inlet.
    pub fn has_signal_source(&self, inlet: usize) -> bool {
        self.own()
            .and_then(|s| s.inlets.get(inlet))
            .is_some_and(|i| i.source.is_some())
    }

    /// The engine input buffer for a channel, if it exists.
    pub fn adc_buffer(&self, channel: usize) -> Option<BufferId> {
        (channel < self.input_channels).then(|| BufferId(1 + channel as u32))
    }

    /// The engine output accumulation buffer for a channel, if it exists.
    pub fn dac_buffer(&self, channel: usize) -> Option<BufferId> {
        (channel < self.output_channels)
            .then(|| BufferId(1 + (self.input_channels + channel) as u32))
    }

    /// Posts a message from inside the DSP pass. It is enqueued after the
    /// traversal and delivered no earlier than the next block.
    pub fn post_message(&mut self, outlet: usize, message: Message) {
        self.outbox.push((self.current, outlet, message));
    }
}
