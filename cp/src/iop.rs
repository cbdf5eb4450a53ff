//! The channel between the central processor and the I/O processor.
//!
//! The I/O processor is an external collaborator; everything here is
//! immediate register state observed at click boundaries.  Each
//! direction has a single byte latch with a full/empty flag, and a
//! two-bit wake mode decides whether pending channel work may wake
//! the IOP task at the next click boundary.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

/// How channel state wakes the IOP task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IopWakeMode {
    /// Never wake for channel work.
    Disabled = 0,
    /// Wake while a byte from the I/O processor is waiting.
    Input = 1,
    /// Wake while the outbound latch has room.
    Output = 2,
    /// Wake every click.
    Always = 3,
}

impl IopWakeMode {
    pub fn from_bits(bits: u8) -> IopWakeMode {
        match bits & 3 {
            0 => IopWakeMode::Disabled,
            1 => IopWakeMode::Input,
            2 => IopWakeMode::Output,
            _ => IopWakeMode::Always,
        }
    }
}

impl Display for IopWakeMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            IopWakeMode::Disabled => "disabled",
            IopWakeMode::Input => "input",
            IopWakeMode::Output => "output",
            IopWakeMode::Always => "always",
        })
    }
}

/// Effects of a control-register write which belong to the execution
/// engine rather than the channel itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlEffects {
    /// Bit 6: wake the emulator task now.
    pub wake_emulator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IopChannel {
    wake_mode: IopWakeMode,
    in_data: u8,
    in_latched: bool,
    out_data: u8,
    out_latched: bool,
    cp_attention: bool,
    iop_attention: bool,
    dma_mode: bool,
    dma_in: bool,
    dma_complete: bool,
    iop_request: bool,
    /// When set, the next TPC-low port write loads the control-store
    /// address register instead of a task's program counter.
    swap_tpc_address: bool,
}

impl Default for IopChannel {
    fn default() -> IopChannel {
        IopChannel {
            wake_mode: IopWakeMode::Disabled,
            in_data: 0,
            in_latched: false,
            out_data: 0,
            out_latched: false,
            cp_attention: false,
            iop_attention: false,
            dma_mode: false,
            dma_in: false,
            dma_complete: false,
            iop_request: false,
            swap_tpc_address: false,
        }
    }
}

impl IopChannel {
    pub fn new() -> IopChannel {
        IopChannel::default()
    }

    pub fn wake_mode(&self) -> IopWakeMode {
        self.wake_mode
    }

    pub fn swap_tpc_address(&self) -> bool {
        self.swap_tpc_address
    }

    pub fn iop_request(&self) -> bool {
        self.iop_request
    }

    pub fn in_latched(&self) -> bool {
        self.in_latched
    }

    pub fn out_latched(&self) -> bool {
        self.out_latched
    }

    /// Whether channel state wakes the IOP task this click.
    pub fn wakes_iop_task(&self) -> bool {
        match self.wake_mode {
            IopWakeMode::Disabled => false,
            IopWakeMode::Input => self.in_latched,
            IopWakeMode::Output => !self.out_latched,
            IopWakeMode::Always => true,
        }
    }

    /// The I/O processor deposits a byte for the microcode.  Returns
    /// false if a previous byte is still latched; the new one wins,
    /// matching a physical write to the latch.
    pub fn write_from_iop(&mut self, byte: u8) -> bool {
        let clean = !self.in_latched;
        if !clean {
            event!(Level::DEBUG, "IOP overwrote an unread inbound byte");
        }
        self.in_data = byte;
        self.in_latched = true;
        clean
    }

    /// Microcode reads the inbound latch, emptying it.
    pub fn take_input(&mut self) -> u8 {
        self.in_latched = false;
        self.in_data
    }

    /// Microcode fills the outbound latch.
    pub fn put_output(&mut self, byte: u8) {
        self.out_data = byte;
        self.out_latched = true;
    }

    /// The I/O processor reads the outbound latch, emptying it.
    pub fn read_for_iop(&mut self) -> u8 {
        self.out_latched = false;
        self.out_data
    }

    /// Microcode raises attention towards the I/O processor.
    pub fn set_cp_attention(&mut self, on: bool) {
        self.cp_attention = on;
    }

    pub fn set_dma_complete(&mut self) {
        self.dma_complete = true;
    }

    pub fn clear_dma_complete(&mut self) {
        self.dma_complete = false;
    }

    pub fn clear_iop_request(&mut self) {
        self.iop_request = false;
    }

    /// The status register as the I/O processor reads it.
    pub fn status_byte(&self) -> u8 {
        u8::from(self.in_latched)
            | u8::from(self.out_latched) << 1
            | u8::from(self.cp_attention) << 2
            | u8::from(self.iop_attention) << 3
            | u8::from(self.dma_mode) << 4
            | u8::from(self.dma_in) << 5
            | u8::from(self.dma_complete) << 6
            | u8::from(self.iop_request) << 7
    }

    /// A write to the control register by the I/O processor.
    pub fn apply_control(&mut self, byte: u8) -> ControlEffects {
        self.wake_mode = IopWakeMode::from_bits(byte);
        self.iop_attention = byte & 0x04 != 0;
        self.swap_tpc_address = byte & 0x08 != 0;
        self.dma_mode = byte & 0x10 != 0;
        self.dma_in = byte & 0x20 != 0;
        if byte & 0x80 != 0 {
            self.iop_request = true;
        }
        event!(
            Level::TRACE,
            "IOP control write {byte:#04x}: wake mode {}",
            self.wake_mode
        );
        ControlEffects {
            wake_emulator: byte & 0x40 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_latches_track_full_and_empty() {
        let mut ch = IopChannel::new();
        assert!(!ch.in_latched());
        assert!(ch.write_from_iop(0x5a));
        assert!(ch.in_latched());
        // Overwrite before the microcode reads it.
        assert!(!ch.write_from_iop(0xa5));
        assert_eq!(ch.take_input(), 0xa5);
        assert!(!ch.in_latched());

        ch.put_output(0x42);
        assert!(ch.out_latched());
        assert_eq!(ch.read_for_iop(), 0x42);
        assert!(!ch.out_latched());
    }

    #[test]
    fn wake_modes_gate_on_latch_state() {
        let mut ch = IopChannel::new();
        assert!(!ch.wakes_iop_task());

        ch.apply_control(IopWakeMode::Input as u8);
        assert!(!ch.wakes_iop_task());
        ch.write_from_iop(1);
        assert!(ch.wakes_iop_task());
        ch.take_input();
        assert!(!ch.wakes_iop_task());

        ch.apply_control(IopWakeMode::Output as u8);
        assert!(ch.wakes_iop_task());
        ch.put_output(2);
        assert!(!ch.wakes_iop_task());

        ch.apply_control(IopWakeMode::Always as u8);
        assert!(ch.wakes_iop_task());
        ch.apply_control(IopWakeMode::Disabled as u8);
        assert!(!ch.wakes_iop_task());
    }

    #[test]
    fn status_byte_reflects_flags() {
        let mut ch = IopChannel::new();
        assert_eq!(ch.status_byte(), 0);
        ch.write_from_iop(0xff);
        ch.put_output(0xff);
        ch.set_cp_attention(true);
        ch.set_dma_complete();
        assert_eq!(ch.status_byte(), 0b0100_0111);
        ch.clear_dma_complete();
        assert_eq!(ch.status_byte(), 0b0000_0111);
    }

    #[test]
    fn control_write_updates_mode_flags_and_effects() {
        let mut ch = IopChannel::new();
        let fx = ch.apply_control(0b1101_1110);
        assert_eq!(ch.wake_mode(), IopWakeMode::Output);
        assert!(ch.swap_tpc_address());
        assert!(ch.iop_request());
        assert!(fx.wake_emulator);
        // iop_request is sticky across control writes with bit 7 clear.
        let fx = ch.apply_control(0);
        assert!(ch.iop_request());
        assert!(!fx.wake_emulator);
        ch.clear_iop_request();
        assert!(!ch.iop_request());
    }
}
