//! Array storage and message-rate table access.

use telar_core::{Message, PatchObject, PortSpec, Registration, Runtime, Symbol};

/// `table` / `#X array`: owns a named sample table in the engine registry.
///
/// The object itself is inert at runtime; readers and writers address the
/// table through the registry by name.
pub struct TableObject {
    name: Symbol,
    len: usize,
}

impl TableObject {
    /// Init: name and length (default 100 samples, matching the usual
    /// default array size).
    pub fn new(init: &Message) -> Self {
        Self {
            name: init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new("")),
            len: init.get_float(1).map_or(100, |f| f.max(1.0) as usize),
        }
    }

    /// The table name.
    pub fn name(&self) -> &Symbol {
        &self.name
    }
}

impl PatchObject for TableObject {
    fn label(&self) -> &'static str {
        "table"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(0, 0)
    }

    fn registration(&self) -> Option<Registration> {
        Some(Registration::Table(self.name.clone(), self.len))
    }
}

/// `tabread`: indexes the named table; out-of-range reads yield 0.
pub struct TabRead {
    name: Symbol,
}

impl TabRead {
    /// The init symbol names the table.
    pub fn new(init: &Message) -> Self {
        Self {
            name: init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new("")),
        }
    }
}

impl PatchObject for TabRead {
    fn label(&self) -> &'static str {
        "tabread"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(1, 1)
    }

    fn process_message(&mut self, _inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        if message.is_symbol(0, "set") {
            if let Some(name) = message.get_symbol(1) {
                self.name = name.clone();
            }
            return;
        }
        if let Some(index) = message.get_float(0) {
            let value = rt
                .table(&self.name)
                .map_or(0.0, |t| t.read(index as i64));
            rt.outlet(0, &Message::float(message.timestamp(), value));
        }
    }
}

/// `tabwrite`: writes a value at a stored index; out-of-range writes drop.
pub struct TabWrite {
    name: Symbol,
    index: i64,
}

impl TabWrite {
    /// The init symbol names the table.
    pub fn new(init: &Message) -> Self {
        Self {
            name: init.get_symbol(0).cloned().unwrap_or_else(|| Symbol::new("")),
            index: 0,
        }
    }
}

impl PatchObject for TabWrite {
    fn label(&self) -> &'static str {
        "tabwrite"
    }

    fn ports(&self) -> PortSpec {
        PortSpec::new(2, 0)
    }

    fn is_leaf(&self) -> bool {
        true
    }

    fn process_message(&mut self, inlet: usize, message: &Message, rt: &mut Runtime<'_>) {
        match inlet {
            0 => {
                if message.is_symbol(0, "set") {
                    if let Some(name) = message.get_symbol(1) {
                        self.name = name.clone();
                    }
                    return;
                }
                if let Some(value) = message.get_float(0) {
                    let index = self.index;
                    if let Some(table) = rt.table_mut(&self.name) {
                        table.write(index, value);
                    }
                }
            }
            1 => {
                if let Some(f) = message.get_float(0) {
                    self.index = f as i64;
                }
            }
            _ => {}
        }
    }
}
