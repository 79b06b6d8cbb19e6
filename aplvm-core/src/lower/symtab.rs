//! Symtab: allocates a fresh [`Slot`] to each distinct variable root name on
//! first encounter, in the order the compiler walks the plan.

use std::collections::BTreeMap;

use crate::model::Slot;

#[derive(Debug, Default)]
pub struct Symtab {
    slots: BTreeMap<String, Slot>,
    order: Vec<String>,
}

impl Symtab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `name`, allocating a new one if this is the
    /// first time `name` has been seen. A name that never appears on any
    /// step's output is still allocated on first read — the caller is
    /// responsible for later detecting an unsatisfiable reference at the VM
    /// (a slot read before it is ever written is a `MissingInput` error).
    pub fn slot_of(&mut self, name: &str) -> Slot {
        if let Some(slot) = self.slots.get(name) {
            return *slot;
        }
        let slot = Slot(self.slots.len());
        self.slots.insert(name.to_string(), slot);
        self.order.push(name.to_string());
        slot
    }

    /// The slot for `name` if it has already been allocated, without
    /// allocating a new one.
    pub fn get(&self, name: &str) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    /// A name → slot map in allocation order, for the bytecode envelope's
    /// `slots` field.
    pub fn name_to_slot(&self) -> BTreeMap<String, Slot> {
        self.slots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_first_use_order() {
        let mut st = Symtab::new();
        assert_eq!(st.slot_of("table"), Slot(0));
        assert_eq!(st.slot_of("schema"), Slot(1));
        assert_eq!(st.slot_of("table"), Slot(0), "repeat use returns the same slot");
    }
}
