//! The central processor: eight cooperating tasks time-sliced over
//! one ALU and one control store, one microinstruction per click.
//!
//! Nothing here blocks or suspends.  `execute_click` advances the
//! machine exactly one click: select the highest-priority awake task,
//! fetch and decode the control word its program counter names, run
//! the ALU, apply the side effects and resolve the next address.
//! Abnormal conditions inside the emulated machine (a stack boundary,
//! an empty-buffer dispatch, bad control-store parity) are recorded
//! in the error register for the microcode to read; only a broken
//! control-store image is a host error.
//!
//! The I/O processor drives the machine through a small port map
//! ([`CentralProcessor::iop_read`], [`CentralProcessor::iop_write`]):
//! a byte latch in each direction, a status/control register pair,
//! and a window for reading and writing control-store words and task
//! program counters.
use std::array;

use serde::Serialize;
use tracing::{event, Level};

use base::instruction::{decode, BadControlWord, MicroInstruction};
use base::microword::{BranchFunction, IoOutFunction, XBusSource, YNormFunction, SIGNIFICANT_BITS};
use base::subword::{control_word_parity_even, high_byte, low_byte, rotate_left_bits};

use crate::alu::{AluOp, AluOutcome, BitAlu};
use crate::fault::CpFault;
use crate::ibuffer::{IbState, InstructionBuffer};
use crate::iop::IopChannel;
use crate::stack::Stack;
use crate::trap::{ErrorTrap, TrapRegister};
use crate::types::{CyclePhase, TaskKind};
use crate::MICROCODE_WORDS;

/// Ports of the I/O processor register map.
pub const PORT_DATA: u8 = 0xeb;
pub const PORT_STATUS_CONTROL: u8 = 0xec;
pub const PORT_CLEAR_DMA_COMPLETE: u8 = 0xee;
pub const PORT_CS_FIRST: u8 = 0xf8;
pub const PORT_TPC_HIGH: u8 = 0xfe;
pub const PORT_TPC_LOW: u8 = 0xff;

/// What one click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClickOutcome {
    /// The named task ran one microinstruction.
    Ran(TaskKind),
    /// No task was awake.
    Idle,
}

/// One task's private context: everything else is shared.
#[derive(Debug, Default, Clone, Copy)]
struct TaskContext {
    pc: u16,
    /// The 4-bit condition/modifier register loaded by a buffer
    /// dispatch.
    condition: u8,
    awake: bool,
}

/// A snapshot of the externally observable machine state.
#[derive(Debug, Clone, Serialize)]
pub struct CpStatus {
    pub click: u64,
    pub phase: CyclePhase,
    pub current_task: TaskKind,
    pub task_pc: [u16; 8],
    pub awake: [bool; 8],
    pub stack_pointer: u8,
    pub error: Option<ErrorTrap>,
    pub ib_state: IbState,
    pub kernel_mode: bool,
    pub mesa_interrupt: bool,
    pub page_cross: bool,
}

#[derive(Debug)]
pub struct CentralProcessor {
    microcode: Vec<u64>,
    decode_cache: Vec<Option<MicroInstruction>>,
    alu: BitAlu,
    tasks: [TaskContext; 8],
    current: TaskKind,
    links: [u8; 8],
    stack: Stack,
    traps: TrapRegister,
    ib: InstructionBuffer,
    iop: IopChannel,
    /// The U register file, addressed by (rA, fZ).
    su: [u16; 256],
    /// The high-address extension registers, addressed by rB.
    rh: [u8; 16],
    bank: u8,
    refresh_address: u16,
    mar: u32,
    mdr: u16,
    /// The external data bus: memory read data and unattached device
    /// inputs, supplied by the surrounding system per click.
    bus_in: u16,
    pc16: bool,
    page_cross: bool,
    mesa_interrupt: bool,
    kernel_mode: bool,
    phase: CyclePhase,
    click: u64,
    cs_address: u16,
    cs_bytes: [u8; 6],
    tpc_high: u8,
}

impl Default for CentralProcessor {
    fn default() -> CentralProcessor {
        CentralProcessor::new()
    }
}

impl CentralProcessor {
    pub fn new() -> CentralProcessor {
        CentralProcessor {
            microcode: vec![0; MICROCODE_WORDS],
            decode_cache: vec![None; MICROCODE_WORDS],
            alu: BitAlu::new(),
            tasks: [TaskContext::default(); 8],
            current: TaskKind::Emulator,
            links: [0; 8],
            stack: Stack::new(),
            traps: TrapRegister::new(),
            ib: InstructionBuffer::new(),
            iop: IopChannel::new(),
            su: [0; 256],
            rh: [0; 16],
            bank: 0,
            refresh_address: 0,
            mar: 0,
            mdr: 0,
            bus_in: 0,
            pc16: false,
            page_cross: false,
            mesa_interrupt: false,
            kernel_mode: false,
            phase: CyclePhase::AddressLatch,
            click: 0,
            cs_address: 0,
            cs_bytes: [0; 6],
            tpc_high: 0,
        }
    }

    /// Advance the machine one click.  Only a control-store word which
    /// cannot be decoded makes this fail; every emulated condition is
    /// recorded in the error register instead.
    pub fn execute_click(&mut self) -> Result<ClickOutcome, CpFault> {
        let Some(task) = self.select_task() else {
            self.click += 1;
            self.phase = self.phase.next();
            return Ok(ClickOutcome::Idle);
        };
        self.current = task;
        let address = self.tasks[task.index()].pc & 0xfff;
        let word = self.microcode[usize::from(address)];
        if !control_word_parity_even(word) {
            self.raise(ErrorTrap::ControlStoreParity);
        }
        let inst = self.decoded(address)?;
        event!(
            Level::TRACE,
            "click {}: task {task} at {address:#05x}",
            self.click
        );

        // A page-crossing address latch cancels the following
        // instruction's data phase and buffer operations, and that
        // instruction alone: latch the flag here and clear it, so the
        // cancellation window closes at the next instruction no
        // matter what it executes.
        let page_cross = self.page_cross;
        self.page_cross = false;

        // Resolve the buffer dispatch before anything it can
        // suppress.  A page-crossing memory transaction cancels the
        // consumption outright.
        let mut dispatch_modifier: u16 = 0;
        let mut suppress_data = false;
        if inst.ib_dispatch && !page_cross {
            match self.ib.consume() {
                Some(byte) => {
                    dispatch_modifier = u16::from(byte >> 4);
                    self.tasks[task.index()].condition = byte & 0xf;
                }
                None if inst.always_ib_dispatch => {
                    // Forced dispatch: modifier zero, no error.
                }
                None => {
                    self.raise(ErrorTrap::IbEmpty);
                    suppress_data = true;
                }
            }
        }

        let carry_in = if inst.load_cin_from_pc16 {
            self.pc16
        } else {
            inst.carry_in
        };
        let x_bus = self.x_bus_value(&inst, page_cross, suppress_data);

        let out = self.alu.execute(&AluOp {
            source: inst.source,
            function: inst.function,
            destination: inst.destination,
            a_address: inst.r_a,
            b_address: inst.r_b,
            data_in: x_bus,
            carry_in,
            cycle: inst.cycle,
        });
        let y = rotate_left_bits(out.y, inst.lrot);

        self.apply_side_effects(&inst, y, &out, page_cross, suppress_data);

        let next = self.resolve_next_address(&inst, y, x_bus, &out, dispatch_modifier);
        self.tasks[task.index()].pc = next;

        self.click += 1;
        self.phase = self.phase.next();
        Ok(ClickOutcome::Ran(task))
    }

    fn select_task(&self) -> Option<TaskKind> {
        TaskKind::ALL.into_iter().find(|t| self.task_awake(*t))
    }

    fn task_awake(&self, task: TaskKind) -> bool {
        self.tasks[task.index()].awake
            || (task == TaskKind::Iop && self.iop.wakes_iop_task())
    }

    fn decoded(&mut self, address: u16) -> Result<MicroInstruction, CpFault> {
        let slot = usize::from(address & 0xfff);
        if let Some(inst) = self.decode_cache[slot] {
            return Ok(inst);
        }
        let inst = decode(self.microcode[slot]).map_err(|e| CpFault::bad_word(address, e))?;
        self.decode_cache[slot] = Some(inst);
        Ok(inst)
    }

    fn raise(&mut self, trap: ErrorTrap) {
        self.traps.raise(trap);
        self.tasks[TaskKind::Kernel.index()].awake = true;
    }

    fn u_address(inst: &MicroInstruction) -> u8 {
        if inst.alt_u_addr {
            (inst.r_b << 4) | inst.r_a
        } else {
            inst.u_address
        }
    }

    /// The value presented on the ALU's external data input.  A
    /// memory read in the data-read phase takes precedence; otherwise
    /// the instruction's own fields name the source.
    fn x_bus_value(&mut self, inst: &MicroInstruction, page_cross: bool, suppress_data: bool) -> u16 {
        if inst.mem && self.phase == CyclePhase::DataRead && !page_cross && !suppress_data {
            return self.bus_in;
        }
        if inst.su_read {
            return self.su[usize::from(Self::u_address(inst))];
        }
        if let Some(byte) = inst.const_byte {
            return u16::from(byte);
        }
        if let Some(nib) = inst.const_nibble {
            return u16::from(nib);
        }
        if let Some(source) = inst.xbus_source {
            return self.x_bus_source(source, inst);
        }
        0
    }

    fn x_bus_source(&mut self, source: XBusSource, inst: &MicroInstruction) -> u16 {
        match source {
            XBusSource::ReadIopIData => u16::from(self.iop.take_input()),
            XBusSource::ReadIopStatus => u16::from(self.iop.status_byte()),
            XBusSource::ReadErrnIbnStkp => {
                u16::from(self.traps.code_bits()) << 8
                    | u16::from(self.ib.state().code()) << 6
                    | u16::from(self.stack.pointer())
            }
            XBusSource::ReadRh => u16::from(self.rh[usize::from(inst.r_b & 0xf)]),
            XBusSource::ReadIb => match self.ib.consume() {
                Some(byte) => u16::from(byte),
                None => {
                    // An empty-buffer read is the same refill
                    // condition as an empty-buffer dispatch.
                    self.raise(ErrorTrap::IbEmpty);
                    0
                }
            },
            XBusSource::ReadIbNA => u16::from(self.ib.peek().unwrap_or(0)),
            XBusSource::ReadIbLow => u16::from(self.ib.peek().unwrap_or(0) & 0xf),
            XBusSource::ReadIbHigh => u16::from(self.ib.peek().unwrap_or(0) >> 4),
            // Device controller data arrives on the external bus.
            _ => self.bus_in,
        }
    }

    fn apply_side_effects(
        &mut self,
        inst: &MicroInstruction,
        y: u16,
        out: &AluOutcome,
        page_cross: bool,
        suppress_data: bool,
    ) {
        if inst.su_write {
            self.su[usize::from(Self::u_address(inst))] = y;
        }
        if inst.load_rh {
            self.rh[usize::from(inst.r_b & 0xf)] = low_byte(y);
        }
        if inst.load_bank {
            self.bank = (y & 0xf) as u8;
        }
        if inst.load_stack_p {
            self.stack.set(y as u8);
        }
        if inst.stack_op && self.stack.apply(inst.stack_test) {
            self.raise(ErrorTrap::StackOverUnderflow);
        }
        if inst.mar_map_mdr {
            match self.phase {
                CyclePhase::AddressLatch => {
                    self.mar = u32::from(self.rh[usize::from(inst.r_a & 0xf)]) << 16 | u32::from(y);
                    self.pc16 = out.carry_out;
                    self.page_cross = out.pg_carry;
                    if self.page_cross {
                        event!(
                            Level::TRACE,
                            "page-crossing address {:#08x}: data phases cancelled",
                            self.mar
                        );
                    }
                }
                CyclePhase::DataWrite => {
                    if inst.mem && !page_cross && !suppress_data {
                        self.mdr = y;
                    }
                }
                CyclePhase::DataRead => {
                    // The read itself happened on the X bus.
                }
            }
        }
        if inst.load_ib && !page_cross && !suppress_data {
            self.ib.load(high_byte(y));
            self.ib.load(low_byte(y));
        }
        if inst.ib_ptr1 {
            self.ib.set_front_index(1);
        }
        if inst.ib_ptr0 {
            self.ib.set_front_index(0);
        }
        if inst.refresh {
            self.refresh_address = y;
        }
        if let Some(port) = inst.io_out {
            self.io_out(port, y);
        }
        if let Some(func) = inst.y_norm {
            self.y_norm(func);
        }
    }

    fn io_out(&mut self, port: IoOutFunction, y: u16) {
        match port {
            IoOutFunction::IopOData => self.iop.put_output(low_byte(y)),
            IoOutFunction::IopCtl => self.iop.set_cp_attention(y & 1 != 0),
            other => {
                event!(Level::TRACE, "output to unattached device port {other:?}");
            }
        }
    }

    fn y_norm(&mut self, func: YNormFunction) {
        match func {
            YNormFunction::ExitKernel => {
                self.kernel_mode = false;
                self.tasks[TaskKind::Kernel.index()].awake = false;
            }
            YNormFunction::EnterKernel => self.kernel_mode = true,
            YNormFunction::ClearIntError => {
                self.traps.clear();
                self.mesa_interrupt = false;
                self.iop.clear_iop_request();
                self.tasks[TaskKind::Kernel.index()].awake = false;
            }
            YNormFunction::MesaIntRq => self.mesa_interrupt = true,
            YNormFunction::ClearDisplayRq => self.tasks[TaskKind::Display.index()].awake = false,
            YNormFunction::ClearIopRq => {
                self.iop.clear_iop_request();
                self.tasks[TaskKind::Iop.index()].awake = false;
            }
            YNormFunction::ClearRefreshRq => self.tasks[TaskKind::Refresh.index()].awake = false,
            YNormFunction::ClearDiskFlags => self.tasks[TaskKind::Disk.index()].awake = false,
            // The rest are covered by the decoded metadata.
            _ => {}
        }
    }

    fn resolve_next_address(
        &mut self,
        inst: &MicroInstruction,
        y: u16,
        x_bus: u16,
        out: &AluOutcome,
        dispatch_modifier: u16,
    ) -> u16 {
        let mut next = inst.inia;
        if let Some(branch) = inst.branch {
            next |= self.branch_modifier(branch, y, x_bus, out);
        }
        next |= dispatch_modifier;
        if let Some(l) = inst.link_index {
            if next & 0x800 == 0 {
                // A call: record the return nibble.
                self.links[l] = (next & 0xf) as u8;
            } else {
                // A return: the link nibble joins the address, and
                // the merged nibble is written back to the link.
                let merged = self.links[l] | (next & 0xf) as u8;
                next = (next & 0xff0) | u16::from(merged);
                self.links[l] = merged;
            }
        }
        next & 0xfff
    }

    fn branch_modifier(
        &self,
        branch: BranchFunction,
        y: u16,
        x: u16,
        out: &AluOutcome,
    ) -> u16 {
        match branch {
            BranchFunction::NegBr => u16::from(out.negative),
            BranchFunction::ZeroBr => u16::from(out.zero),
            BranchFunction::NZeroBr => u16::from(!out.zero),
            BranchFunction::MesaIntBr => u16::from(self.mesa_interrupt),
            BranchFunction::PgCarryBr => u16::from(out.pg_carry),
            BranchFunction::CarryBr => u16::from(out.carry_out),
            BranchFunction::XRefBr => u16::from(self.iop.iop_request()),
            BranchFunction::NibCarryBr => u16::from(out.nib_carry),
            BranchFunction::XDisp => x & 0xf,
            BranchFunction::YDisp => y & 0xf,
            BranchFunction::XC2npcDisp => {
                (x & 0xc)
                    | u16::from(self.phase == CyclePhase::DataWrite) << 1
                    | u16::from(!self.pc16)
            }
            BranchFunction::YIoDisp => u16::from(self.iop.status_byte() & 0xf),
            BranchFunction::XwdDisp => x & 3,
            BranchFunction::XHDisp => (x >> 4) & 0xf,
            BranchFunction::XLDisp => x & 1,
            BranchFunction::PgCrOvDisp => u16::from(out.pg_carry) << 1 | u16::from(out.overflow),
        }
    }

    // Control-store access.

    /// Replace one control-store word, invalidating its decode-cache
    /// slot.  Words with spare bits set are rejected; words with bad
    /// parity are stored as-is and trap when fetched.
    pub fn write_microcode(&mut self, address: u16, word: u64) -> Result<(), CpFault> {
        let slot = usize::from(address);
        if slot >= MICROCODE_WORDS {
            return Err(CpFault::MicrocodeAddressOutOfRange { address });
        }
        if word >> SIGNIFICANT_BITS != 0 {
            return Err(CpFault::bad_word(address, BadControlWord(word)));
        }
        self.microcode[slot] = word;
        self.decode_cache[slot] = None;
        Ok(())
    }

    pub fn microcode_word(&self, address: u16) -> Result<u64, CpFault> {
        self.microcode
            .get(usize::from(address))
            .copied()
            .ok_or(CpFault::MicrocodeAddressOutOfRange { address })
    }

    /// Load a complete image into the control store.
    pub fn load_microcode_image(&mut self, words: &[u64]) -> Result<(), CpFault> {
        if words.len() != MICROCODE_WORDS {
            return Err(CpFault::ImageSizeMismatch { words: words.len() });
        }
        for (address, word) in words.iter().enumerate() {
            self.write_microcode(address as u16, *word)?;
        }
        event!(Level::DEBUG, "loaded a {MICROCODE_WORDS}-word microcode image");
        Ok(())
    }

    // The port map the I/O processor drives.

    pub fn iop_write(&mut self, port: u8, value: u8) -> Result<(), CpFault> {
        match port {
            PORT_DATA => {
                self.iop.write_from_iop(value);
                Ok(())
            }
            PORT_STATUS_CONTROL => {
                let effects = self.iop.apply_control(value);
                if effects.wake_emulator {
                    self.tasks[TaskKind::Emulator.index()].awake = true;
                }
                Ok(())
            }
            PORT_CLEAR_DMA_COMPLETE => {
                self.iop.clear_dma_complete();
                Ok(())
            }
            0xf8..=0xfd => {
                self.cs_bytes[usize::from(port - PORT_CS_FIRST)] = value;
                if port == 0xfd {
                    // The final byte commits the word.
                    let word = self
                        .cs_bytes
                        .iter()
                        .fold(0u64, |acc, b| acc << 8 | u64::from(*b));
                    self.write_microcode(self.cs_address, word)?;
                    self.cs_address = (self.cs_address + 1) & 0xfff;
                }
                Ok(())
            }
            PORT_TPC_HIGH => {
                self.tpc_high = value & 0xf;
                Ok(())
            }
            PORT_TPC_LOW => {
                let address = u16::from(self.tpc_high) << 8 | u16::from(value);
                if self.iop.swap_tpc_address() {
                    self.cs_address = address;
                } else {
                    let task = usize::from(self.cs_address) & 7;
                    self.tasks[task].pc = address & 0xfff;
                }
                Ok(())
            }
            _ => Err(CpFault::BadPort { port }),
        }
    }

    pub fn iop_read(&mut self, port: u8) -> Result<u8, CpFault> {
        match port {
            PORT_DATA => Ok(self.iop.read_for_iop()),
            PORT_STATUS_CONTROL => Ok(self.iop.status_byte()),
            0xf8..=0xfd => {
                let word = self.microcode[usize::from(self.cs_address) & 0xfff];
                let slot = u32::from(port - PORT_CS_FIRST);
                Ok(((word >> (40 - 8 * slot)) & 0xff) as u8)
            }
            PORT_TPC_HIGH => Ok((self.tasks[usize::from(self.cs_address) & 7].pc >> 8) as u8),
            PORT_TPC_LOW => Ok((self.tasks[usize::from(self.cs_address) & 7].pc & 0xff) as u8),
            _ => Err(CpFault::BadPort { port }),
        }
    }

    // Inputs from the surrounding system.

    /// Wake or sleep a task.  Device-driven wakeups (Display,
    /// Ethernet, Refresh, Disk) originate here.
    pub fn set_task_wakeup(&mut self, task: TaskKind, awake: bool) {
        self.tasks[task.index()].awake = awake;
    }

    pub fn set_task_pc(&mut self, task: TaskKind, pc: u16) {
        self.tasks[task.index()].pc = pc & 0xfff;
    }

    /// The external data bus value: memory read data and unattached
    /// device inputs.
    pub fn set_bus_in(&mut self, value: u16) {
        self.bus_in = value;
    }

    /// The memory system reports a failed reference.  Emulated state,
    /// like every other trap.
    pub fn signal_memory_error(&mut self) {
        self.raise(ErrorTrap::EmulatorMemoryError);
    }

    // Inspection.

    pub fn click(&self) -> u64 {
        self.click
    }

    pub fn current_task(&self) -> TaskKind {
        self.current
    }

    pub fn task_pc(&self, task: TaskKind) -> u16 {
        self.tasks[task.index()].pc
    }

    pub fn task_condition(&self, task: TaskKind) -> u8 {
        self.tasks[task.index()].condition
    }

    pub fn link(&self, index: usize) -> u8 {
        self.links[index & 7]
    }

    pub fn stack_pointer(&self) -> u8 {
        self.stack.pointer()
    }

    pub fn error(&self) -> Option<ErrorTrap> {
        self.traps.current()
    }

    pub fn ib_state(&self) -> IbState {
        self.ib.state()
    }

    pub fn mesa_interrupt(&self) -> bool {
        self.mesa_interrupt
    }

    pub fn memory_address(&self) -> u32 {
        self.mar
    }

    pub fn memory_data(&self) -> u16 {
        self.mdr
    }

    pub fn page_cross(&self) -> bool {
        self.page_cross
    }

    pub fn pc16(&self) -> bool {
        self.pc16
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn refresh_address(&self) -> u16 {
        self.refresh_address
    }

    pub fn iop_channel(&self) -> &IopChannel {
        &self.iop
    }

    pub fn alu(&self) -> &BitAlu {
        &self.alu
    }

    pub fn alu_mut(&mut self) -> &mut BitAlu {
        &mut self.alu
    }

    #[must_use]
    pub fn status(&self) -> CpStatus {
        CpStatus {
            click: self.click,
            phase: self.phase,
            current_task: self.current,
            task_pc: array::from_fn(|i| self.tasks[i].pc),
            awake: array::from_fn(|i| self.task_awake(TaskKind::from_index(i))),
            stack_pointer: self.stack.pointer(),
            error: self.traps.current(),
            ib_state: self.ib.state(),
            kernel_mode: self.kernel_mode,
            mesa_interrupt: self.mesa_interrupt,
            page_cross: self.page_cross,
        }
    }
}
