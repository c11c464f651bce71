//! The named-endpoint fabric: long-range wires bound by symbol.
//!
//! Distributed object pairs (`send~`/`receive~`, `throw~`/`catch~`,
//! `delwrite~`/`delread~`/`vd~`, arrays and their readers, and the
//! message-domain `send`/`receive` bus) never connect through graph edges.
//! They subscribe here instead, which is what keeps the signal graph a DAG:
//! feedback loops route through a named endpoint, and the registry is where
//! that cycle is broken.
//!
//! Producers with unique names (`send~`, `delwrite~`, `catch~`, arrays)
//! reject duplicates; the rejection is reported by the engine through its
//! console hook and the later registrant simply stays silent. Consumers bind
//! late and rebind whenever their named producer appears or disappears.

use std::collections::HashMap;

use crate::atom::Symbol;
use crate::buffer::BufferId;
use crate::object::ObjectId;

/// Error returned when a unique-name registration collides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateName {
    /// The kind of endpoint, e.g. `"send~"`.
    pub kind: &'static str,
    /// The colliding name.
    pub name: Symbol,
}

/// A named circular delay line owned by a `delwrite~`.
///
/// The writer deposits one block per DSP pass; readers address samples
/// relative to the write head. When the process order runs the writer before
/// a reader, that reader sees the current block; otherwise it sees the
/// pre-write contents, which is the documented behavior for short feedback
/// loops.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Creates a delay line holding at least `len_samples` samples.
    pub fn new(len_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; len_samples.max(1)],
            write_pos: 0,
        }
    }

    /// Capacity in samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True when the capacity is zero (never: capacity is clamped to 1).
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Deposits one block, advancing the write head.
    pub fn write_block(&mut self, input: &[f32]) {
        for &sample in input {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.buffer.len();
        }
    }

    /// Reads a whole block delayed by an integral number of samples.
    ///
    /// `out[i]` is the sample written `delay_samples` before the i-th sample
    /// of the block that ended at the current write head.
    pub fn read_block(&self, delay_samples: usize, out: &mut [f32]) {
        let len = self.buffer.len();
        let n = out.len();
        if n > len {
            out.fill(0.0);
            return;
        }
        let delay = delay_samples.min(len - 1);
        // Base index of the current block's first sample, pushed up by two
        // lengths so the modular arithmetic never underflows.
        let base = self.write_pos + 2 * len - n - delay;
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = self.buffer[(base + i) % len];
        }
    }

    /// Reads one sample of the current block (`i` of `block_size`) delayed by
    /// a fractional number of samples, with linear interpolation.
    pub fn read_fractional(&self, block_size: usize, i: usize, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        if block_size > len {
            return 0.0;
        }
        let delay = delay_samples.clamp(0.0, (len - 1) as f32);
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let base = self.write_pos + 2 * len - block_size - whole + i;
        let a = self.buffer[base % len];
        let b = self.buffer[(base + len - 1) % len];
        a + (b - a) * frac
    }

    /// Clears the line to silence.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// A named mutable float table (a Pd array).
#[derive(Debug, Clone)]
pub struct Table {
    data: Vec<f32>,
}

impl Table {
    /// Creates a zeroed table of the given length.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    /// Length in samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length table.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sample data.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable sample data.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reads index `i`, yielding 0 outside `0..len` per the array contract.
    #[inline]
    pub fn read(&self, i: i64) -> f32 {
        if i < 0 {
            return 0.0;
        }
        self.data.get(i as usize).copied().unwrap_or(0.0)
    }

    /// Writes index `i` if it is in range; out-of-range writes are dropped.
    pub fn write(&mut self, i: i64, value: f32) {
        if i >= 0
            && let Some(slot) = self.data.get_mut(i as usize)
        {
            *slot = value;
        }
    }
}

/// Per-engine keyed relations for every named endpoint family.
#[derive(Default)]
pub struct NamedRegistry {
    dsp_sends: HashMap<Symbol, (ObjectId, BufferId)>,
    dsp_receives: Vec<(Symbol, ObjectId)>,
    throws: Vec<(Symbol, ObjectId, BufferId)>,
    catches: HashMap<Symbol, ObjectId>,
    delay_lines: HashMap<Symbol, DelayLine>,
    tables: HashMap<Symbol, Table>,
    bus_names: Vec<Symbol>,
    bus_index: HashMap<Symbol, usize>,
    bus_receivers: Vec<Vec<ObjectId>>,
}

impl NamedRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // --- send~ / receive~ ---

    /// Registers a `send~`. Returns the duplicate error without installing
    /// when the name is taken.
    pub fn register_dsp_send(
        &mut self,
        name: Symbol,
        object: ObjectId,
        buffer: BufferId,
    ) -> Result<(), DuplicateName> {
        if self.dsp_sends.contains_key(&name) {
            return Err(DuplicateName {
                kind: "send~",
                name,
            });
        }
        self.dsp_sends.insert(name, (object, buffer));
        Ok(())
    }

    /// Registers a `receive~` subscriber.
    pub fn register_dsp_receive(&mut self, name: Symbol, object: ObjectId) {
        self.dsp_receives.push((name, object));
    }

    /// The buffer currently published under a `send~` name.
    pub fn dsp_send_buffer(&self, name: &Symbol) -> Option<BufferId> {
        self.dsp_sends.get(name).map(|(_, buf)| *buf)
    }

    /// Updates the buffer a `send~` object publishes (its inlet was rebound).
    pub fn update_dsp_send_buffer(&mut self, object: ObjectId, buffer: BufferId) -> Option<Symbol> {
        for (name, entry) in &mut self.dsp_sends {
            if entry.0 == object {
                entry.1 = buffer;
                return Some(name.clone());
            }
        }
        None
    }

    /// All `receive~` objects subscribed to a name.
    pub fn dsp_receivers(&self, name: &Symbol) -> impl Iterator<Item = ObjectId> + '_ {
        let name = name.clone();
        self.dsp_receives
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, id)| *id)
    }

    // --- throw~ / catch~ ---

    /// Registers a `throw~` contributor.
    pub fn register_throw(&mut self, name: Symbol, object: ObjectId, buffer: BufferId) {
        self.throws.push((name, object, buffer));
    }

    /// Registers a `catch~`. Duplicate names are rejected.
    pub fn register_catch(&mut self, name: Symbol, object: ObjectId) -> Result<(), DuplicateName> {
        if self.catches.contains_key(&name) {
            return Err(DuplicateName {
                kind: "catch~",
                name,
            });
        }
        self.catches.insert(name, object);
        Ok(())
    }

    /// Updates the buffer a `throw~` contributes (its inlet was rebound).
    pub fn update_throw_buffer(&mut self, object: ObjectId, buffer: BufferId) {
        for entry in &mut self.throws {
            if entry.1 == object {
                entry.2 = buffer;
            }
        }
    }

    /// Buffers of every `throw~` contributing to a name. Zero matches means
    /// the catch~ outputs silence.
    pub fn throw_buffers(&self, name: &Symbol) -> impl Iterator<Item = BufferId> + '_ {
        let name = name.clone();
        self.throws
            .iter()
            .filter(move |(n, _, _)| *n == name)
            .map(|(_, _, buf)| *buf)
    }

    // --- delwrite~ / delread~ / vd~ ---

    /// Installs a named delay line. Duplicate names are rejected.
    pub fn register_delay_line(
        &mut self,
        name: Symbol,
        line: DelayLine,
    ) -> Result<(), DuplicateName> {
        if self.delay_lines.contains_key(&name) {
            return Err(DuplicateName {
                kind: "delwrite~",
                name,
            });
        }
        self.delay_lines.insert(name, line);
        Ok(())
    }

    /// The named delay line, for readers.
    pub fn delay_line(&self, name: &Symbol) -> Option<&DelayLine> {
        self.delay_lines.get(name)
    }

    /// The named delay line, for the writer.
    pub fn delay_line_mut(&mut self, name: &Symbol) -> Option<&mut DelayLine> {
        self.delay_lines.get_mut(name)
    }

    // --- arrays ---

    /// Installs a named table. Duplicate names are rejected.
    pub fn register_table(&mut self, name: Symbol, table: Table) -> Result<(), DuplicateName> {
        if self.tables.contains_key(&name) {
            return Err(DuplicateName {
                kind: "array",
                name,
            });
        }
        self.tables.insert(name, table);
        Ok(())
    }

    /// The named table. Readers look up per use, which is what makes their
    /// binding late: a table registered after its readers is found on the
    /// next access.
    pub fn table(&self, name: &Symbol) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Mutable access for table writers.
    pub fn table_mut(&mut self, name: &Symbol) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    // --- message send/receive bus ---

    /// Returns the stable index for a bus name, creating it if new.
    pub fn bus_index_or_create(&mut self, name: &Symbol) -> usize {
        if let Some(&index) = self.bus_index.get(name) {
            return index;
        }
        let index = self.bus_names.len();
        self.bus_names.push(name.clone());
        self.bus_index.insert(name.clone(), index);
        self.bus_receivers.push(Vec::new());
        index
    }

    /// Returns the index for a bus name only if some `receive` ever
    /// registered it.
    pub fn bus_index(&self, name: &Symbol) -> Option<usize> {
        self.bus_index.get(name).copied()
    }

    /// The name at a bus index.
    pub fn bus_name(&self, index: usize) -> Option<&Symbol> {
        self.bus_names.get(index)
    }

    /// Subscribes a `receive` object to a name.
    pub fn register_bus_receiver(&mut self, name: &Symbol, object: ObjectId) -> usize {
        let index = self.bus_index_or_create(name);
        self.bus_receivers[index].push(object);
        index
    }

    /// The k-th receiver at a bus index, re-fetched per delivery so handlers
    /// may mutate subscriptions mid-dispatch.
    pub fn bus_receiver(&self, index: usize, k: usize) -> Option<ObjectId> {
        self.bus_receivers.get(index).and_then(|v| v.get(k)).copied()
    }

    /// Number of receivers at a bus index.
    pub fn bus_receiver_count(&self, index: usize) -> usize {
        self.bus_receivers.get(index).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn test_duplicate_send_rejected() {
        let mut reg = NamedRegistry::new();
        reg.register_dsp_send(sym("x"), ObjectId(1), BufferId(5)).unwrap();
        let err = reg
            .register_dsp_send(sym("x"), ObjectId(2), BufferId(6))
            .unwrap_err();
        assert_eq!(err.kind, "send~");
        assert_eq!(err.name, sym("x"));
        // First registrant stays active.
        assert_eq!(reg.dsp_send_buffer(&sym("x")), Some(BufferId(5)));
    }

    #[test]
    fn test_throw_buffers_by_name() {
        let mut reg = NamedRegistry::new();
        reg.register_throw(sym("mix"), ObjectId(1), BufferId(3));
        reg.register_throw(sym("mix"), ObjectId(2), BufferId(4));
        reg.register_throw(sym("other"), ObjectId(3), BufferId(5));
        let bufs: Vec<BufferId> = reg.throw_buffers(&sym("mix")).collect();
        assert_eq!(bufs, vec![BufferId(3), BufferId(4)]);
    }

    #[test]
    fn test_bus_index_is_stable() {
        let mut reg = NamedRegistry::new();
        let a = reg.bus_index_or_create(&sym("foo"));
        let b = reg.bus_index_or_create(&sym("bar"));
        assert_ne!(a, b);
        assert_eq!(reg.bus_index_or_create(&sym("foo")), a);
        assert_eq!(reg.bus_name(a), Some(&sym("foo")));
    }

    #[test]
    fn test_delay_line_round_trip() {
        let mut line = DelayLine::new(16);
        line.write_block(&[1.0, 2.0, 3.0, 4.0]);
        let mut out = [0.0; 4];
        // Zero delay returns the block just written.
        line.read_block(0, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        // A 2-sample delay shifts in the pre-write zeros.
        line.read_block(2, &mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_delay_line_wraps() {
        let mut line = DelayLine::new(4);
        line.write_block(&[1.0, 2.0, 3.0, 4.0]);
        line.write_block(&[5.0, 6.0, 7.0, 8.0]);
        let mut out = [0.0; 4];
        line.read_block(0, &mut out);
        assert_eq!(out, [5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_table_edge_reads() {
        let mut t = Table::new(4);
        t.data_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.read(-1), 0.0);
        assert_eq!(t.read(0), 1.0);
        assert_eq!(t.read(3), 4.0);
        assert_eq!(t.read(4), 0.0);
        t.write(10, 9.0);
        assert_eq!(t.data(), &[1.0, 2.0, 3.0, 4.0]);
    }
}
