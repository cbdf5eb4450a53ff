//! Shared small types of the central processor.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// The eight cooperating tasks, in priority order: when more than one
/// task is awake at a click boundary, the one with the smaller
/// enumeration value runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TaskKind {
    Emulator = 0,
    Display = 1,
    Ethernet = 2,
    Refresh = 3,
    Disk = 4,
    Iop = 5,
    IopCs = 6,
    Kernel = 7,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::Emulator,
        TaskKind::Display,
        TaskKind::Ethernet,
        TaskKind::Refresh,
        TaskKind::Disk,
        TaskKind::Iop,
        TaskKind::IopCs,
        TaskKind::Kernel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> TaskKind {
        Self::ALL[index & 7]
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            TaskKind::Emulator => "Emulator",
            TaskKind::Display => "Display",
            TaskKind::Ethernet => "Ethernet",
            TaskKind::Refresh => "Refresh",
            TaskKind::Disk => "Disk",
            TaskKind::Iop => "IOP",
            TaskKind::IopCs => "IOPcs",
            TaskKind::Kernel => "Kernel",
        })
    }
}

/// The sub-phase of a click.  The meaning of the memory bit of a
/// control word depends on the phase in which the instruction runs:
/// MAR<- in c1, MDR<- in c2, <-MD in c3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    /// c1, the address-latch phase.
    AddressLatch,
    /// c2, the data-write phase.
    DataWrite,
    /// c3, the data-read phase.
    DataRead,
}

impl CyclePhase {
    pub fn next(self) -> CyclePhase {
        match self {
            CyclePhase::AddressLatch => CyclePhase::DataWrite,
            CyclePhase::DataWrite => CyclePhase::DataRead,
            CyclePhase::DataRead => CyclePhase::AddressLatch,
        }
    }
}

#[test]
fn test_task_priority_order_follows_enumeration() {
    for pair in TaskKind::ALL.windows(2) {
        assert!(pair[0] < pair[1]);
        assert_eq!(pair[0].index() + 1, pair[1].index());
    }
    assert_eq!(TaskKind::from_index(5), TaskKind::Iop);
}

#[test]
fn test_cycle_phase_rotation() {
    let mut phase = CyclePhase::AddressLatch;
    phase = phase.next();
    assert_eq!(phase, CyclePhase::DataWrite);
    phase = phase.next();
    assert_eq!(phase, CyclePhase::DataRead);
    phase = phase.next();
    assert_eq!(phase, CyclePhase::AddressLatch);
}
