//! Slave data tables
//!
//! Four fixed tables of [`MEMORY_MAP_SIZE`] entries each, addressed from 0.
//! Coils and holding registers are writable by the bus; discrete inputs and
//! input registers only by the application.

use crate::constants::MEMORY_MAP_SIZE;

/// Coils, discrete inputs, holding registers and input registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    coils: [bool; MEMORY_MAP_SIZE],
    discrete_inputs: [bool; MEMORY_MAP_SIZE],
    holding_registers: [u16; MEMORY_MAP_SIZE],
    input_registers: [u16; MEMORY_MAP_SIZE],
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap {
    /// All tables zeroed
    pub fn new() -> Self {
        Self {
            coils: [false; MEMORY_MAP_SIZE],
            discrete_inputs: [false; MEMORY_MAP_SIZE],
            holding_registers: [0; MEMORY_MAP_SIZE],
            input_registers: [0; MEMORY_MAP_SIZE],
        }
    }

    /// Zero every table
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    // Out-of-range writes are ignored, out-of-range reads yield false / 0.

    pub fn set_coil(&mut self, address: u16, value: bool) {
        if let Some(slot) = self.coils.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn get_coil(&self, address: u16) -> bool {
        self.coils.get(address as usize).copied().unwrap_or(false)
    }

    pub fn set_discrete_input(&mut self, address: u16, value: bool) {
        if let Some(slot) = self.discrete_inputs.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn get_discrete_input(&self, address: u16) -> bool {
        self.discrete_inputs
            .get(address as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn set_holding_register(&mut self, address: u16, value: u16) {
        if let Some(slot) = self.holding_registers.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn get_holding_register(&self, address: u16) -> u16 {
        self.holding_registers
            .get(address as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_input_register(&mut self, address: u16, value: u16) {
        if let Some(slot) = self.input_registers.get_mut(address as usize) {
            *slot = value;
        }
    }

    pub fn get_input_register(&self, address: u16) -> u16 {
        self.input_registers
            .get(address as usize)
            .copied()
            .unwrap_or(0)
    }

    #[inline]
    pub fn coils(&self) -> &[bool] {
        &self.coils
    }

    #[inline]
    pub fn coils_mut(&mut self) -> &mut [bool] {
        &mut self.coils
    }

    #[inline]
    pub fn discrete_inputs(&self) -> &[bool] {
        &self.discrete_inputs
    }

    #[inline]
    pub fn discrete_inputs_mut(&mut self) -> &mut [bool] {
        &mut self.discrete_inputs
    }

    #[inline]
    pub fn holding_registers(&self) -> &[u16] {
        &self.holding_registers
    }

    #[inline]
    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        &mut self.holding_registers
    }

    #[inline]
    pub fn input_registers(&self) -> &[u16] {
        &self.input_registers
    }

    #[inline]
    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        &mut self.input_registers
    }
}
