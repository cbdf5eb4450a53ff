//! Decoding of raw control words into structured microinstruction
//! records.
//!
//! `decode` is a pure function of the raw word: it extracts the fixed
//! bit-fields and derives the dispatch metadata used to speed
//! execution, and it never consults processor state.  Caching decoded
//! records by control-store address is the emulator's business, not
//! ours.
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::microword::*;

/// A word which cannot represent a valid control word: it has bits
/// set above the significant range.  This is a host-domain error (a
/// broken microcode image or a bug in the surrounding system), not an
/// emulated-hardware condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadControlWord(pub u64);

impl Display for BadControlWord {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "word {:#014x} has bits set above bit {} and is not a valid control word",
            self.0,
            SIGNIFICANT_BITS - 1
        )
    }
}

impl Error for BadControlWord {}

/// One decoded microinstruction: the raw fields of the control word
/// plus metadata derived once at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroInstruction {
    /// 2901 A register address, also the U address high nibble.
    pub r_a: u8,
    /// 2901 B register address, also the RH address.
    pub r_b: u8,
    /// ALU source operand pair.
    pub source: AluSourcePair,
    /// ALU function.
    pub function: AluFunction,
    /// ALU destination/shift control.
    pub destination: AluDestination,
    /// Stored even-parity bit.
    pub even_parity: bool,
    /// Carry in (also shift end and SU write select).
    pub carry_in: bool,
    /// Enable the SU register file.
    pub en_su: bool,
    /// MAR<- (c1), MDR<- (c2), <-MD (c3).
    pub mem: bool,
    pub fs_y: FunctionSelectY,
    pub fs_z: FunctionSelectZ,
    pub f_x: XFunction,
    pub f_y: u8,
    pub f_z: u8,
    /// The full 12-bit next instruction address (fY, fZ, low nibble).
    pub inia: u16,

    // Metadata derived from the fields above.
    /// The instruction cycles (rotates) the ALU output on write-back.
    pub cycle: bool,
    /// The instruction shifts the ALU output on write-back.
    pub shift: bool,
    /// The ALU needs an X bus value on its D input.
    pub needs_xbus: bool,
    /// The instruction reads an SU register onto the X bus.
    pub su_read: bool,
    /// The instruction writes the ALU output to an SU register.
    pub su_write: bool,
    /// U register address (A address high nibble, fZ low nibble).
    pub u_address: u8,
    /// The instruction specifies a Map<- operation.
    pub load_map: bool,
    /// The instruction specifies a stackP<- operation.
    pub load_stack_p: bool,
    pub push: bool,
    pub pop: bool,
    pub double_pop: bool,
    /// Whether any stack pointer movement occurs in this instruction.
    pub stack_op: bool,
    /// The boundary test implied by the push/pop fields.
    pub stack_test: StackTest,
    /// The branch/dispatch condition, when fSfY selects one.
    pub branch: Option<BranchFunction>,
    /// The normal Y function, when fSfY selects one.
    pub y_norm: Option<YNormFunction>,
    /// The I/O output port, when fSfY selects one.
    pub io_out: Option<IoOutFunction>,
    /// The normal Z function, when fSfZ selects one.
    pub z_norm: Option<ZNormFunction>,
    /// The X bus input source, when fSfZ selects one.
    pub xbus_source: Option<XBusSource>,
    /// The instruction dispatches on the instruction buffer.
    pub ib_dispatch: bool,
    /// IBDisp combined with IBPtr<-1: dispatch even if the buffer is
    /// not full.
    pub always_ib_dispatch: bool,
    /// The instruction specifies an IB<- operation.
    pub load_ib: bool,
    /// ibPtr<-1 / ibPtr<-0 operations.
    pub ib_ptr1: bool,
    pub ib_ptr0: bool,
    /// The instruction selects the alternate U addressing mode for
    /// subsequent SU accesses.
    pub alt_u_addr: bool,
    /// Constant byte operand (fY, fZ), when fSfY selects one.
    pub const_byte: Option<u8>,
    /// Literal nibble operand, when fSfZ selects one.
    pub const_nibble: Option<u8>,
    /// Link register index (fX), when fX is in the call/return range.
    pub link_index: Option<usize>,
    /// The instruction takes its carry in from the pc16 register.
    pub load_cin_from_pc16: bool,
    /// The instruction loads an RH register from the ALU output.
    pub load_rh: bool,
    /// The instruction loads the bank register from the ALU output.
    pub load_bank: bool,
    /// The instruction loads the refresh address register.
    pub refresh: bool,
    /// Whether an MAR<-, Map<- or MDR<- operation is specified.
    pub mar_map_mdr: bool,
    /// Left rotation (in bits) applied to Y after the ALU runs.
    pub lrot: u32,
}

fn field(word: u64, shift: u32, width: u32) -> u8 {
    ((word >> shift) & ((1 << width) - 1)) as u8
}

fn bit(word: u64, position: u32) -> bool {
    (word >> position) & 1 != 0
}

/// Decode a raw control word.  Pure: two calls with the same word
/// yield field-identical records.
pub fn decode(word: u64) -> Result<MicroInstruction, BadControlWord> {
    if word >> SIGNIFICANT_BITS != 0 {
        return Err(BadControlWord(word));
    }

    let r_a = field(word, RA_SHIFT, 4);
    let r_b = field(word, RB_SHIFT, 4);
    let source = AluSourcePair::from_bits(field(word, AS_SHIFT, 3));
    let function = AluFunction::from_bits(field(word, AF_SHIFT, 3));
    let destination = AluDestination::from_bits(field(word, AD_SHIFT, 3));
    let even_parity = bit(word, EP_BIT);
    let carry_in = bit(word, CIN_BIT);
    let en_su = bit(word, ENSU_BIT);
    let mem = bit(word, MEM_BIT);
    let fs_y = FunctionSelectY::from_bits(field(word, FSFY_SHIFT, 2));
    let fs_z = FunctionSelectZ::from_bits(field(word, FSFZ_SHIFT, 2));
    let f_x = XFunction::from_bits(field(word, FX_SHIFT, 4));
    let f_y = field(word, FY_SHIFT, 4);
    let f_z = field(word, FZ_SHIFT, 4);
    let nia_low = field(word, NIA_LOW_SHIFT, 4);
    let inia = (u16::from(f_y) << 8) | (u16::from(f_z) << 4) | u16::from(nia_low);

    let branch = match fs_y {
        FunctionSelectY::DispBr => Some(BranchFunction::from_bits(f_y)),
        _ => None,
    };
    let y_norm = match fs_y {
        FunctionSelectY::Norm => Some(YNormFunction::from_bits(f_y)),
        _ => None,
    };
    let io_out = match fs_y {
        FunctionSelectY::IoOut => Some(IoOutFunction::from_bits(f_y)),
        _ => None,
    };
    let z_norm = match fs_z {
        FunctionSelectZ::Norm => Some(ZNormFunction::from_bits(f_z)),
        _ => None,
    };
    let xbus_source = match fs_z {
        FunctionSelectZ::IoXIn => Some(XBusSource::from_bits(f_z)),
        _ => None,
    };
    let const_byte = match fs_y {
        FunctionSelectY::Byte => Some((f_y << 4) | f_z),
        _ => None,
    };
    let const_nibble = match fs_z {
        FunctionSelectZ::Nibble => Some(f_z),
        _ => None,
    };

    let cycle = f_x == XFunction::Cycle || y_norm == Some(YNormFunction::Cycle);
    let shift = f_x == XFunction::Shift;
    let push = f_x == XFunction::Push
        || y_norm == Some(YNormFunction::Push)
        || z_norm == Some(ZNormFunction::Push);
    let pop_x = f_x == XFunction::Pop;
    let pop_z = z_norm == Some(ZNormFunction::Pop);
    let double_pop = pop_x && pop_z;
    let pop = pop_x || pop_z;
    let stack_op = push || pop;
    let stack_test = if double_pop {
        StackTest::Underflow2
    } else if pop {
        StackTest::Underflow
    } else if push {
        StackTest::Overflow
    } else {
        StackTest::None
    };

    let ib_dispatch = y_norm == Some(YNormFunction::IbDispatch);
    let ib_ptr1 = z_norm == Some(ZNormFunction::LoadIbPtr1);
    let ib_ptr0 = z_norm == Some(ZNormFunction::LoadIbPtr0);
    let always_ib_dispatch = ib_dispatch && ib_ptr1;
    let load_ib = y_norm == Some(YNormFunction::LoadIb);

    let load_map = f_x == XFunction::LoadMap || y_norm == Some(YNormFunction::LoadMap);
    let load_cin_from_pc16 =
        f_x == XFunction::LoadCinFromPc16 || z_norm == Some(ZNormFunction::LoadCinFromPc16);
    let lrot = match z_norm {
        Some(ZNormFunction::LRot4) => 4,
        Some(ZNormFunction::LRot8) => 8,
        Some(ZNormFunction::LRot12) => 12,
        _ => 0,
    };

    let link_index = if (f_x as u8) < 8 {
        Some(f_x as usize)
    } else {
        None
    };

    Ok(MicroInstruction {
        r_a,
        r_b,
        source,
        function,
        destination,
        even_parity,
        carry_in,
        en_su,
        mem,
        fs_y,
        fs_z,
        f_x,
        f_y,
        f_z,
        inia,
        cycle,
        shift,
        needs_xbus: source.uses_d_input(),
        su_read: en_su && !carry_in,
        su_write: en_su && carry_in,
        u_address: (r_a << 4) | f_z,
        load_map,
        load_stack_p: y_norm == Some(YNormFunction::LoadStackP),
        push,
        pop,
        double_pop,
        stack_op,
        stack_test,
        branch,
        y_norm,
        io_out,
        z_norm,
        xbus_source,
        ib_dispatch,
        always_ib_dispatch,
        load_ib,
        ib_ptr1,
        ib_ptr0,
        alt_u_addr: z_norm == Some(ZNormFunction::AltUaddr),
        const_byte,
        const_nibble,
        link_index,
        load_cin_from_pc16,
        load_rh: f_x == XFunction::LoadRh,
        load_bank: z_norm == Some(ZNormFunction::LoadBank),
        refresh: y_norm == Some(YNormFunction::Refresh) || z_norm == Some(ZNormFunction::Refresh),
        mar_map_mdr: mem || load_map,
        lrot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_words_with_high_bits_set() {
        assert_eq!(decode(1 << SIGNIFICANT_BITS), Err(BadControlWord(1 << SIGNIFICANT_BITS)));
        assert_eq!(decode(u64::MAX).unwrap_err().0, u64::MAX);
        assert!(decode(0).is_ok());
    }

    #[test]
    fn next_address_is_formed_from_fy_fz_and_low_nibble() {
        let word = Fields {
            fs_y: FunctionSelectY::Byte,
            f_y: 0xa,
            f_z: 0x5,
            nia_low: 0x3,
            ..Fields::default()
        }
        .assemble();
        let inst = decode(word).expect("valid test word");
        assert_eq!(inst.inia, 0xa53);
        assert_eq!(inst.const_byte, Some(0xa5));
    }

    #[test]
    fn derives_stack_metadata() {
        let push = decode(
            Fields {
                f_x: XFunction::Push,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(push.push && !push.pop);
        assert_eq!(push.stack_test, StackTest::Overflow);

        let double = decode(
            Fields {
                f_x: XFunction::Pop,
                fs_z: FunctionSelectZ::Norm,
                f_z: ZNormFunction::Pop as u8,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(double.double_pop);
        assert_eq!(double.stack_test, StackTest::Underflow2);

        let none = decode(Fields::default().assemble()).expect("valid test word");
        assert!(!none.stack_op);
        assert_eq!(none.stack_test, StackTest::None);
    }

    #[test]
    fn derives_ib_dispatch_metadata() {
        let forced = decode(
            Fields {
                fs_y: FunctionSelectY::Norm,
                f_y: YNormFunction::IbDispatch as u8,
                fs_z: FunctionSelectZ::Norm,
                f_z: ZNormFunction::LoadIbPtr1 as u8,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(forced.ib_dispatch);
        assert!(forced.always_ib_dispatch);

        let plain = decode(
            Fields {
                fs_y: FunctionSelectY::Norm,
                f_y: YNormFunction::IbDispatch as u8,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(plain.ib_dispatch);
        assert!(!plain.always_ib_dispatch);
    }

    #[test]
    fn derives_su_access_from_ensu_and_cin() {
        let write = decode(
            Fields {
                en_su: true,
                carry_in: true,
                r_a: 0x3,
                fs_z: FunctionSelectZ::Uaddr,
                f_z: 0x7,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(write.su_write && !write.su_read);
        assert_eq!(write.u_address, 0x37);

        let read = decode(
            Fields {
                en_su: true,
                carry_in: false,
                ..Fields::default()
            }
            .assemble(),
        )
        .expect("valid test word");
        assert!(read.su_read && !read.su_write);
    }

    #[test]
    fn link_index_covers_only_call_return_codes() {
        for (f_x, expected) in [
            (XFunction::CallRet0, Some(0)),
            (XFunction::CallRet5, Some(5)),
            (XFunction::CallRet7, Some(7)),
            (XFunction::Noop, None),
            (XFunction::Push, None),
        ] {
            let inst = decode(
                Fields {
                    f_x,
                    ..Fields::default()
                }
                .assemble(),
            )
            .expect("valid test word");
            assert_eq!(inst.link_index, expected);
        }
    }

    #[test]
    fn accurate_carries_needed_for_nibble_and_page_conditions() {
        use BranchFunction::*;
        for (b, wanted) in [
            (PgCarryBr, true),
            (NibCarryBr, true),
            (PgCrOvDisp, true),
            (CarryBr, false),
            (ZeroBr, false),
            (XDisp, false),
        ] {
            assert_eq!(b.needs_accurate_carries(), wanted, "{b:?}");
        }
    }

    mod proptests {
        use super::super::*;
        use test_strategy::proptest;

        #[proptest]
        fn decode_is_pure(#[strategy(0u64..(1 << SIGNIFICANT_BITS))] word: u64) {
            assert_eq!(decode(word), decode(word));
        }

        #[proptest]
        fn decoded_fields_match_raw_extraction(
            #[strategy(0u64..(1 << SIGNIFICANT_BITS))] word: u64,
        ) {
            let inst = decode(word).expect("word is in the significant range");
            assert_eq!(u64::from(inst.r_a), (word >> RA_SHIFT) & 0xf);
            assert_eq!(u64::from(inst.r_b), (word >> RB_SHIFT) & 0xf);
            assert_eq!(inst.source as u64, (word >> AS_SHIFT) & 7);
            assert_eq!(inst.function as u64, (word >> AF_SHIFT) & 7);
            assert_eq!(inst.destination as u64, (word >> AD_SHIFT) & 7);
            assert_eq!(u64::from(inst.carry_in), (word >> CIN_BIT) & 1);
            assert_eq!(u64::from(inst.mem), (word >> MEM_BIT) & 1);
            assert_eq!(
                u64::from(inst.inia),
                ((word >> FY_SHIFT) & 0xf) << 8
                    | ((word >> FZ_SHIFT) & 0xf) << 4
                    | (word & 0xf)
            );
        }
    }
}
