//! The raw control-word layout and the enumerated field values.
//!
//! A control word is carried in a `u64`.  The significant bits are
//! the low 41; the seven bits above them are spare and must be zero.
//! Field layout, least-significant bit first:
//!
//! | bits  | field | meaning                                          |
//! |-------|-------|--------------------------------------------------|
//! | 0-3   | niaL  | low nibble of the next instruction address       |
//! | 4-7   | fZ    | Z function code, also next-address bits 4-7      |
//! | 8-11  | fY    | Y function code, also next-address bits 8-11     |
//! | 12-15 | fX    | X function code                                  |
//! | 16-17 | fSfZ  | function-field selector for Z                    |
//! | 18-19 | fSfY  | function-field selector for Y                    |
//! | 20    | mem   | MAR<- (c1), MDR<- (c2), <-MD (c3)                |
//! | 21    | enSU  | enable the SU register file                      |
//! | 22    | Cin   | carry in, shift end, SU write select             |
//! | 23    | ep    | even parity over the whole word                  |
//! | 24-26 | aD    | ALU destination/shift control                    |
//! | 27-29 | aF    | ALU function                                     |
//! | 30-32 | aS    | ALU source operand pair                          |
//! | 33-36 | rB    | B register address, RH address                   |
//! | 37-40 | rA    | A register address, U address high nibble        |
//!
//! The Y and Z function fields double as the middle and high bits of
//! the next-instruction address; microcode placement has to choose
//! addresses whose bits agree with the function codes the word needs.

use crate::subword::control_word_parity_even;

/// Bit positions of the control-word fields.
pub const NIA_LOW_SHIFT: u32 = 0;
pub const FZ_SHIFT: u32 = 4;
pub const FY_SHIFT: u32 = 8;
pub const FX_SHIFT: u32 = 12;
pub const FSFZ_SHIFT: u32 = 16;
pub const FSFY_SHIFT: u32 = 18;
pub const MEM_BIT: u32 = 20;
pub const ENSU_BIT: u32 = 21;
pub const CIN_BIT: u32 = 22;
pub const EP_BIT: u32 = 23;
pub const AD_SHIFT: u32 = 24;
pub const AF_SHIFT: u32 = 27;
pub const AS_SHIFT: u32 = 30;
pub const RB_SHIFT: u32 = 33;
pub const RA_SHIFT: u32 = 37;

/// Number of significant bits in a control word.
pub const SIGNIFICANT_BITS: u32 = 41;

/// The ALU source operand pair: which two of {register file entry A,
/// register file entry B, the Q register, the external data input D,
/// the zero constant} feed the R and S inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluSourcePair {
    AQ = 0,
    AB = 1,
    ZQ = 2,
    ZB = 3,
    ZA = 4,
    DA = 5,
    DQ = 6,
    DZ = 7,
}

impl AluSourcePair {
    pub fn from_bits(bits: u8) -> AluSourcePair {
        use AluSourcePair::*;
        match bits & 7 {
            0 => AQ,
            1 => AB,
            2 => ZQ,
            3 => ZB,
            4 => ZA,
            5 => DA,
            6 => DQ,
            _ => DZ,
        }
    }

    /// Whether the pair routes the external data input to the ALU.
    pub fn uses_d_input(self) -> bool {
        matches!(
            self,
            AluSourcePair::DA | AluSourcePair::DQ | AluSourcePair::DZ
        )
    }
}

/// The eight ALU functions of the bit-slice chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluFunction {
    RplusS = 0,
    SminusR = 1,
    RminusS = 2,
    RorS = 3,
    RandS = 4,
    NotRandS = 5,
    RxorS = 6,
    NotRxorS = 7,
}

impl AluFunction {
    pub fn from_bits(bits: u8) -> AluFunction {
        use AluFunction::*;
        match bits & 7 {
            0 => RplusS,
            1 => SminusR,
            2 => RminusS,
            3 => RorS,
            4 => RandS,
            5 => NotRandS,
            6 => RxorS,
            _ => NotRxorS,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            AluFunction::RplusS | AluFunction::SminusR | AluFunction::RminusS
        )
    }
}

/// The ALU destination/shift control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluDestination {
    /// F -> Q, Y = F.
    QReg = 0,
    /// No write-back, Y = F.
    Nop = 1,
    /// F -> B, Y = A.
    RamA = 2,
    /// F -> B, Y = F.
    RamF = 3,
    /// F and Q both shifted down into B and Q, Y = F.
    RamQDown = 4,
    /// F shifted down into B, Y = F.
    RamDown = 5,
    /// F and Q both shifted up into B and Q, Y = F.
    RamQUp = 6,
    /// F shifted up into B, Y = F.
    RamUp = 7,
}

impl AluDestination {
    pub fn from_bits(bits: u8) -> AluDestination {
        use AluDestination::*;
        match bits & 7 {
            0 => QReg,
            1 => Nop,
            2 => RamA,
            3 => RamF,
            4 => RamQDown,
            5 => RamDown,
            6 => RamQUp,
            _ => RamUp,
        }
    }
}

/// How the numeric fY field is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionSelectY {
    /// fY names a branch or dispatch condition.
    DispBr = 0,
    /// fY names a normal Y function.
    Norm = 1,
    /// fY names an I/O output port.
    IoOut = 2,
    /// fY and fZ together form a constant byte.
    Byte = 3,
}

impl FunctionSelectY {
    pub fn from_bits(bits: u8) -> FunctionSelectY {
        use FunctionSelectY::*;
        match bits & 3 {
            0 => DispBr,
            1 => Norm,
            2 => IoOut,
            _ => Byte,
        }
    }
}

/// How the numeric fZ field is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionSelectZ {
    /// fZ names a normal Z function.
    Norm = 0,
    /// fZ is a literal nibble operand.
    Nibble = 1,
    /// fZ is the low nibble of a U register address.
    Uaddr = 2,
    /// fZ selects an X bus input source.
    IoXIn = 3,
}

impl FunctionSelectZ {
    pub fn from_bits(bits: u8) -> FunctionSelectZ {
        use FunctionSelectZ::*;
        match bits & 3 {
            0 => Norm,
            1 => Nibble,
            2 => Uaddr,
            _ => IoXIn,
        }
    }
}

/// The X function field.  Codes 0-7 address a link register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XFunction {
    CallRet0 = 0x0,
    CallRet1 = 0x1,
    CallRet2 = 0x2,
    CallRet3 = 0x3,
    CallRet4 = 0x4,
    CallRet5 = 0x5,
    CallRet6 = 0x6,
    CallRet7 = 0x7,
    Noop = 0x8,
    LoadRh = 0x9,
    Shift = 0xa,
    Cycle = 0xb,
    LoadCinFromPc16 = 0xc,
    LoadMap = 0xd,
    Pop = 0xe,
    Push = 0xf,
}

impl XFunction {
    pub fn from_bits(bits: u8) -> XFunction {
        use XFunction::*;
        match bits & 0xf {
            0x0 => CallRet0,
            0x1 => CallRet1,
            0x2 => CallRet2,
            0x3 => CallRet3,
            0x4 => CallRet4,
            0x5 => CallRet5,
            0x6 => CallRet6,
            0x7 => CallRet7,
            0x8 => Noop,
            0x9 => LoadRh,
            0xa => Shift,
            0xb => Cycle,
            0xc => LoadCinFromPc16,
            0xd => LoadMap,
            0xe => Pop,
            _ => Push,
        }
    }
}

/// The Y function field when fSfY selects the normal interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YNormFunction {
    ExitKernel = 0x0,
    EnterKernel = 0x1,
    ClearIntError = 0x2,
    IbDispatch = 0x3,
    MesaIntRq = 0x4,
    LoadStackP = 0x5,
    LoadIb = 0x6,
    Cycle = 0x7,
    Noop = 0x8,
    LoadMap = 0x9,
    Refresh = 0xa,
    Push = 0xb,
    ClearDisplayRq = 0xc,
    ClearIopRq = 0xd,
    ClearRefreshRq = 0xe,
    ClearDiskFlags = 0xf,
}

impl YNormFunction {
    pub fn from_bits(bits: u8) -> YNormFunction {
        use YNormFunction::*;
        match bits & 0xf {
            0x0 => ExitKernel,
            0x1 => EnterKernel,
            0x2 => ClearIntError,
            0x3 => IbDispatch,
            0x4 => MesaIntRq,
            0x5 => LoadStackP,
            0x6 => LoadIb,
            0x7 => Cycle,
            0x8 => Noop,
            0x9 => LoadMap,
            0xa => Refresh,
            0xb => Push,
            0xc => ClearDisplayRq,
            0xd => ClearIopRq,
            0xe => ClearRefreshRq,
            _ => ClearDiskFlags,
        }
    }
}

/// The Y function field when fSfY selects branch/dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchFunction {
    NegBr = 0x0,
    ZeroBr = 0x1,
    NZeroBr = 0x2,
    MesaIntBr = 0x3,
    PgCarryBr = 0x4,
    CarryBr = 0x5,
    XRefBr = 0x6,
    NibCarryBr = 0x7,
    XDisp = 0x8,
    YDisp = 0x9,
    XC2npcDisp = 0xa,
    YIoDisp = 0xb,
    XwdDisp = 0xc,
    XHDisp = 0xd,
    XLDisp = 0xe,
    PgCrOvDisp = 0xf,
}

impl BranchFunction {
    pub fn from_bits(bits: u8) -> BranchFunction {
        use BranchFunction::*;
        match bits & 0xf {
            0x0 => NegBr,
            0x1 => ZeroBr,
            0x2 => NZeroBr,
            0x3 => MesaIntBr,
            0x4 => PgCarryBr,
            0x5 => CarryBr,
            0x6 => XRefBr,
            0x7 => NibCarryBr,
            0x8 => XDisp,
            0x9 => YDisp,
            0xa => XC2npcDisp,
            0xb => YIoDisp,
            0xc => XwdDisp,
            0xd => XHDisp,
            0xe => XLDisp,
            _ => PgCrOvDisp,
        }
    }

    /// Whether resolving this condition needs the nibble-accurate
    /// carry chain of the ALU.
    pub fn needs_accurate_carries(self) -> bool {
        matches!(
            self,
            BranchFunction::PgCarryBr | BranchFunction::NibCarryBr | BranchFunction::PgCrOvDisp
        )
    }
}

/// The Y function field when fSfY selects I/O output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutFunction {
    IopOData = 0x0,
    IopCtl = 0x1,
    KOData = 0x2,
    KCtl = 0x3,
    EOData = 0x4,
    EICtl = 0x5,
    DCtlFifo = 0x6,
    DCtl = 0x7,
    DBorder = 0x8,
    PCtl = 0x9,
    MCtl = 0xa,
    Invalid0 = 0xb,
    EOCtl = 0xc,
    KCmd = 0xd,
    Invalid1 = 0xe,
    POData = 0xf,
}

impl IoOutFunction {
    pub fn from_bits(bits: u8) -> IoOutFunction {
        use IoOutFunction::*;
        match bits & 0xf {
            0x0 => IopOData,
            0x1 => IopCtl,
            0x2 => KOData,
            0x3 => KCtl,
            0x4 => EOData,
            0x5 => EICtl,
            0x6 => DCtlFifo,
            0x7 => DCtl,
            0x8 => DBorder,
            0x9 => PCtl,
            0xa => MCtl,
            0xb => Invalid0,
            0xc => EOCtl,
            0xd => KCmd,
            0xe => Invalid1,
            _ => POData,
        }
    }
}

/// The Z function field when fSfZ selects the normal interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZNormFunction {
    Refresh = 0x0,
    LoadIbPtr1 = 0x1,
    LoadIbPtr0 = 0x2,
    LoadCinFromPc16 = 0x3,
    LoadBank = 0x4,
    Pop = 0x5,
    Push = 0x6,
    AltUaddr = 0x7,
    Noop0 = 0x8,
    Noop1 = 0x9,
    Noop2 = 0xa,
    Noop3 = 0xb,
    LRot0 = 0xc,
    LRot12 = 0xd,
    LRot8 = 0xe,
    LRot4 = 0xf,
}

impl ZNormFunction {
    pub fn from_bits(bits: u8) -> ZNormFunction {
        use ZNormFunction::*;
        match bits & 0xf {
            0x0 => Refresh,
            0x1 => LoadIbPtr1,
            0x2 => LoadIbPtr0,
            0x3 => LoadCinFromPc16,
            0x4 => LoadBank,
            0x5 => Pop,
            0x6 => Push,
            0x7 => AltUaddr,
            0x8 => Noop0,
            0x9 => Noop1,
            0xa => Noop2,
            0xb => Noop3,
            0xc => LRot0,
            0xd => LRot12,
            0xe => LRot8,
            _ => LRot4,
        }
    }
}

/// The Z function field when fSfZ selects an X bus input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XBusSource {
    ReadEIData = 0x0,
    ReadEStatus = 0x1,
    ReadKIData = 0x2,
    ReadKStatus = 0x3,
    KStrobe = 0x4,
    ReadMStatus = 0x5,
    ReadKTest = 0x6,
    EStrobe = 0x7,
    ReadIopIData = 0x8,
    ReadIopStatus = 0x9,
    ReadErrnIbnStkp = 0xa,
    ReadRh = 0xb,
    ReadIbNA = 0xc,
    ReadIb = 0xd,
    ReadIbLow = 0xe,
    ReadIbHigh = 0xf,
}

impl XBusSource {
    pub fn from_bits(bits: u8) -> XBusSource {
        use XBusSource::*;
        match bits & 0xf {
            0x0 => ReadEIData,
            0x1 => ReadEStatus,
            0x2 => ReadKIData,
            0x3 => ReadKStatus,
            0x4 => KStrobe,
            0x5 => ReadMStatus,
            0x6 => ReadKTest,
            0x7 => EStrobe,
            0x8 => ReadIopIData,
            0x9 => ReadIopStatus,
            0xa => ReadErrnIbnStkp,
            0xb => ReadRh,
            0xc => ReadIbNA,
            0xd => ReadIb,
            0xe => ReadIbLow,
            _ => ReadIbHigh,
        }
    }
}

/// The kind of stack-pointer boundary test an instruction specifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackTest {
    #[default]
    None,
    Underflow,
    Overflow,
    Underflow2,
}

/// Unpacked control-word fields, used to assemble well-formed words
/// (the parity bit is filled in by `assemble`).  This is the
/// representation a microassembler would emit from.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
    pub r_a: u8,
    pub r_b: u8,
    pub source: AluSourcePair,
    pub function: AluFunction,
    pub destination: AluDestination,
    pub carry_in: bool,
    pub en_su: bool,
    pub mem: bool,
    pub fs_y: FunctionSelectY,
    pub fs_z: FunctionSelectZ,
    pub f_x: XFunction,
    pub f_y: u8,
    pub f_z: u8,
    pub nia_low: u8,
}

impl Default for Fields {
    fn default() -> Fields {
        Fields {
            r_a: 0,
            r_b: 0,
            source: AluSourcePair::ZA,
            function: AluFunction::RorS,
            destination: AluDestination::Nop,
            carry_in: false,
            en_su: false,
            mem: false,
            fs_y: FunctionSelectY::Norm,
            fs_z: FunctionSelectZ::Norm,
            f_x: XFunction::Noop,
            f_y: YNormFunction::Noop as u8,
            f_z: ZNormFunction::Noop0 as u8,
            nia_low: 0,
        }
    }
}

impl Fields {
    /// Pack the fields into a control word with a correct parity bit.
    pub fn assemble(&self) -> u64 {
        let mut word: u64 = (u64::from(self.nia_low & 0xf) << NIA_LOW_SHIFT)
            | (u64::from(self.f_z & 0xf) << FZ_SHIFT)
            | (u64::from(self.f_y & 0xf) << FY_SHIFT)
            | ((self.f_x as u64) << FX_SHIFT)
            | ((self.fs_z as u64) << FSFZ_SHIFT)
            | ((self.fs_y as u64) << FSFY_SHIFT)
            | (u64::from(self.mem) << MEM_BIT)
            | (u64::from(self.en_su) << ENSU_BIT)
            | (u64::from(self.carry_in) << CIN_BIT)
            | ((self.destination as u64) << AD_SHIFT)
            | ((self.function as u64) << AF_SHIFT)
            | ((self.source as u64) << AS_SHIFT)
            | (u64::from(self.r_b & 0xf) << RB_SHIFT)
            | (u64::from(self.r_a & 0xf) << RA_SHIFT);
        if !control_word_parity_even(word) {
            word |= 1 << EP_BIT;
        }
        word
    }

    /// The full 12-bit next-instruction address formed from fY, fZ
    /// and the low nibble.
    pub fn next_address(&self) -> u16 {
        (u16::from(self.f_y & 0xf) << 8) | (u16::from(self.f_z & 0xf) << 4)
            | u16::from(self.nia_low & 0xf)
    }
}

#[test]
fn test_assemble_parity_is_even() {
    let w = Fields::default().assemble();
    assert!(control_word_parity_even(w));
    let w2 = Fields {
        r_a: 5,
        nia_low: 3,
        ..Fields::default()
    }
    .assemble();
    assert!(control_word_parity_even(w2));
}

#[test]
fn test_from_bits_round_trip() {
    for bits in 0..8u8 {
        assert_eq!(AluSourcePair::from_bits(bits) as u8, bits);
        assert_eq!(AluFunction::from_bits(bits) as u8, bits);
        assert_eq!(AluDestination::from_bits(bits) as u8, bits);
    }
    for bits in 0..16u8 {
        assert_eq!(XFunction::from_bits(bits) as u8, bits);
        assert_eq!(YNormFunction::from_bits(bits) as u8, bits);
        assert_eq!(BranchFunction::from_bits(bits) as u8, bits);
        assert_eq!(IoOutFunction::from_bits(bits) as u8, bits);
        assert_eq!(ZNormFunction::from_bits(bits) as u8, bits);
        assert_eq!(XBusSource::from_bits(bits) as u8, bits);
    }
    for bits in 0..4u8 {
        assert_eq!(FunctionSelectY::from_bits(bits) as u8, bits);
        assert_eq!(FunctionSelectZ::from_bits(bits) as u8, bits);
    }
}
