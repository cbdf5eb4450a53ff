//! The 16-bit bit-slice ALU: four chained 4-bit slices, a 16-entry
//! register file and the Q register.
//!
//! Carry and overflow are not computed on the fly.  At first use we
//! build truth tables over every (r nibble, s nibble, carry-in)
//! triple, one table per carry convention, and execution chains the
//! four nibbles through table lookups.  The chain exposes the carries
//! at each nibble boundary: the microcode branches on the carry out
//! of the low nibble (NibCarry) and the carry out of the low byte
//! (PgCarry), not just on the final carry out.
//!
//! Subtraction reuses the addition tables with the subtrahend nibble
//! complemented, and XOR reuses the XNOR tables with the R nibble
//! complemented, since r ^ s = !(!r ^ s).
use std::sync::OnceLock;

use base::microword::{AluDestination, AluFunction, AluSourcePair};
use base::subword::nibble;

/// One truth table: indexed by r nibble, s nibble, carry-in.
type NibbleTable = [[[bool; 2]; 16]; 16];

#[derive(Debug, PartialEq, Eq)]
struct Tables {
    arith_carry: NibbleTable,
    arith_overflow: NibbleTable,
    or_carry: NibbleTable,
    and_carry: NibbleTable,
    notxor_carry: NibbleTable,
    notxor_overflow: NibbleTable,
}

/// Carry out of a nibble addition: bit 4 of r + s + c.
fn calc_arith_carry(r: u8, s: u8, c: u8) -> bool {
    (u16::from(r) + u16::from(s) + u16::from(c)) & 0x10 != 0
}

/// Overflow of a nibble addition: XOR of the carries into bits 3
/// and 4 of r + s + c.
fn calc_arith_overflow(r: u8, s: u8, c: u8) -> bool {
    let into_bit3 = ((r & 7) + (s & 7) + c) & 0x8 != 0;
    let into_bit4 = calc_arith_carry(r, s, c);
    into_bit3 ^ into_bit4
}

/// Carry convention for OR: set when the OR saturates or the carry-in
/// was set.
fn calc_or_carry(r: u8, s: u8, c: u8) -> bool {
    (r | s) == 0xf || c != 0
}

/// Carry convention for AND: set when the AND is non-zero or the
/// carry-in was set.
fn calc_and_carry(r: u8, s: u8, c: u8) -> bool {
    (r & s) != 0 || c != 0
}

/// Carry convention for XNOR, from the slice's propagate/generate
/// terms (P = r AND s, G = r OR s).
fn calc_notxor_carry(r: u8, s: u8, c: u8) -> bool {
    let p = |i: u8| (r >> i) & (s >> i) & 1 != 0;
    let g = |i: u8| ((r >> i) | (s >> i)) & 1 != 0;
    !(!g(3)
        || (p(3) && !g(2))
        || (p(3) && p(2) && !g(1))
        || (p(3) && p(2) && p(1) && !g(0))
        || (p(3) && p(2) && p(1) && p(0) && c == 0))
}

/// Overflow convention for XNOR: XOR of the carry into the top bit
/// and the carry out, each formed the same way as the carry chain.
fn calc_notxor_overflow(r: u8, s: u8, c: u8) -> bool {
    let p = |i: u8| (r >> i) & (s >> i) & 1 != 0;
    let g = |i: u8| ((r >> i) | (s >> i)) & 1 != 0;
    let into_bit3 = !(!g(2)
        || (p(2) && !g(1))
        || (p(2) && p(1) && !g(0))
        || (p(2) && p(1) && p(0) && c == 0));
    into_bit3 ^ calc_notxor_carry(r, s, c)
}

fn build_table(calc: fn(u8, u8, u8) -> bool) -> NibbleTable {
    let mut table = [[[false; 2]; 16]; 16];
    for r in 0..16u8 {
        for s in 0..16u8 {
            for c in 0..2u8 {
                table[r as usize][s as usize][c as usize] = calc(r, s, c);
            }
        }
    }
    table
}

fn build_tables() -> Tables {
    Tables {
        arith_carry: build_table(calc_arith_carry),
        arith_overflow: build_table(calc_arith_overflow),
        or_carry: build_table(calc_or_carry),
        and_carry: build_table(calc_and_carry),
        notxor_carry: build_table(calc_notxor_carry),
        notxor_overflow: build_table(calc_notxor_overflow),
    }
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(build_tables)
}

/// One ALU operation, as the decoded instruction specifies it.
#[derive(Debug, Clone, Copy)]
pub struct AluOp {
    pub source: AluSourcePair,
    pub function: AluFunction,
    pub destination: AluDestination,
    /// Register file address of the A operand.
    pub a_address: u8,
    /// Register file address of the B operand and write-back target.
    pub b_address: u8,
    /// The external data input D (the X bus value).
    pub data_in: u16,
    pub carry_in: bool,
    /// Wrap the shifted-out bit back into the shift end instead of
    /// shifting in the carry-in.
    pub cycle: bool,
}

/// What one ALU operation produced.  `f` is the raw function result;
/// `y` is the bus output (the A operand for the Y=A destination,
/// otherwise `f`).  The condition flags always come from `f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOutcome {
    pub y: u16,
    pub f: u16,
    pub zero: bool,
    pub negative: bool,
    /// Carry out of the whole 16-bit operation.
    pub carry_out: bool,
    pub overflow: bool,
    /// Carry out of the low nibble.
    pub nib_carry: bool,
    /// Carry out of the low byte.
    pub pg_carry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAlu {
    ram: [u16; 16],
    q: u16,
}

impl Default for BitAlu {
    fn default() -> BitAlu {
        BitAlu {
            ram: [0; 16],
            q: 0,
        }
    }
}

impl BitAlu {
    pub fn new() -> BitAlu {
        BitAlu::default()
    }

    pub fn register(&self, address: u8) -> u16 {
        self.ram[usize::from(address & 0xf)]
    }

    pub fn set_register(&mut self, address: u8, value: u16) {
        self.ram[usize::from(address & 0xf)] = value;
    }

    pub fn q(&self) -> u16 {
        self.q
    }

    pub fn set_q(&mut self, value: u16) {
        self.q = value;
    }

    fn operands(&self, op: &AluOp) -> (u16, u16) {
        let a = self.register(op.a_address);
        let b = self.register(op.b_address);
        match op.source {
            AluSourcePair::AQ => (a, self.q),
            AluSourcePair::AB => (a, b),
            AluSourcePair::ZQ => (0, self.q),
            AluSourcePair::ZB => (0, b),
            AluSourcePair::ZA => (0, a),
            AluSourcePair::DA => (op.data_in, a),
            AluSourcePair::DQ => (op.data_in, self.q),
            AluSourcePair::DZ => (op.data_in, 0),
        }
    }

    /// One nibble slice: result, carry out, overflow.
    fn slice(function: AluFunction, r: u8, s: u8, c: bool) -> (u8, bool, bool) {
        let t = tables();
        let ci = usize::from(c);
        let (r, s) = (usize::from(r), usize::from(s));
        let not_r = !r & 0xf;
        let not_s = !s & 0xf;
        match function {
            AluFunction::RplusS => {
                let f = (r + s + usize::from(c)) & 0xf;
                (f as u8, t.arith_carry[r][s][ci], t.arith_overflow[r][s][ci])
            }
            AluFunction::SminusR => {
                let f = (s + not_r + usize::from(c)) & 0xf;
                (
                    f as u8,
                    t.arith_carry[not_r][s][ci],
                    t.arith_overflow[not_r][s][ci],
                )
            }
            AluFunction::RminusS => {
                let f = (r + not_s + usize::from(c)) & 0xf;
                (
                    f as u8,
                    t.arith_carry[r][not_s][ci],
                    t.arith_overflow[r][not_s][ci],
                )
            }
            AluFunction::RorS => {
                let carry = t.or_carry[r][s][ci];
                ((r | s) as u8, carry, carry)
            }
            AluFunction::RandS => {
                let carry = t.and_carry[r][s][ci];
                ((r & s) as u8, carry, carry)
            }
            AluFunction::NotRandS => {
                let carry = t.and_carry[not_r][s][ci];
                ((not_r & s) as u8, carry, carry)
            }
            AluFunction::RxorS => (
                (r ^ s) as u8,
                t.notxor_carry[not_r][s][ci],
                t.notxor_overflow[not_r][s][ci],
            ),
            AluFunction::NotRxorS => (
                (!(r ^ s) & 0xf) as u8,
                t.notxor_carry[r][s][ci],
                t.notxor_overflow[r][s][ci],
            ),
        }
    }

    /// Run one operation, including destination write-back and shift.
    /// The returned flags and carries describe the unshifted result.
    pub fn execute(&mut self, op: &AluOp) -> AluOutcome {
        let (r, s) = self.operands(op);
        let a_value = self.register(op.a_address);

        let mut f: u16 = 0;
        let mut carry = op.carry_in;
        let mut overflow = false;
        let mut nib_carry = false;
        let mut pg_carry = false;
        for i in 0..4 {
            let (fn_, cn, vn) = Self::slice(op.function, nibble(r, i), nibble(s, i), carry);
            f |= u16::from(fn_) << (4 * i);
            carry = cn;
            overflow = vn;
            if i == 0 {
                nib_carry = cn;
            }
            if i == 1 {
                pg_carry = cn;
            }
        }
        let carry_out = carry;

        let y = self.write_back(op, f, a_value);

        AluOutcome {
            y,
            f,
            zero: f == 0,
            negative: f & 0x8000 != 0,
            carry_out,
            overflow,
            nib_carry,
            pg_carry,
        }
    }

    fn write_back(&mut self, op: &AluOp, f: u16, a_value: u16) -> u16 {
        let b = usize::from(op.b_address & 0xf);
        let end = |shifted_out: u16| -> u16 {
            if op.cycle {
                shifted_out & 1
            } else {
                u16::from(op.carry_in)
            }
        };
        match op.destination {
            AluDestination::QReg => {
                self.q = f;
                f
            }
            AluDestination::Nop => f,
            AluDestination::RamA => {
                self.ram[b] = f;
                a_value
            }
            AluDestination::RamF => {
                self.ram[b] = f;
                f
            }
            AluDestination::RamDown => {
                self.ram[b] = (f >> 1) | (end(f) << 15);
                f
            }
            AluDestination::RamUp => {
                self.ram[b] = (f << 1) | end(f >> 15);
                f
            }
            AluDestination::RamQDown => {
                // Double-length down shift: F's low bit falls into Q.
                self.ram[b] = (f >> 1) | (end(self.q) << 15);
                self.q = (self.q >> 1) | ((f & 1) << 15);
                f
            }
            AluDestination::RamQUp => {
                // Double-length up shift: Q's high bit rises into F.
                self.ram[b] = (f << 1) | (self.q >> 15);
                self.q = (self.q << 1) | end(f >> 15);
                f
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(function: AluFunction) -> AluOp {
        AluOp {
            source: AluSourcePair::AB,
            function,
            destination: AluDestination::Nop,
            a_address: 0,
            b_address: 1,
            data_in: 0,
            carry_in: false,
            cycle: false,
        }
    }

    #[test]
    fn arith_carry_table_matches_bit_four_of_the_sum() {
        for r in 0..16u8 {
            for s in 0..16u8 {
                for c in 0..2u8 {
                    let sum = u16::from(r) + u16::from(s) + u16::from(c);
                    assert_eq!(
                        tables().arith_carry[r as usize][s as usize][c as usize],
                        sum & 0x10 != 0,
                        "r={r} s={s} c={c}"
                    );
                }
            }
        }
    }

    #[test]
    fn arith_overflow_table_is_carry_into_bit3_xor_carry_into_bit4() {
        for r in 0..16u8 {
            for s in 0..16u8 {
                for c in 0..2u8 {
                    let into3 = ((r & 7) + (s & 7) + c) & 0x8 != 0;
                    let into4 = (u16::from(r) + u16::from(s) + u16::from(c)) & 0x10 != 0;
                    assert_eq!(
                        tables().arith_overflow[r as usize][s as usize][c as usize],
                        into3 ^ into4,
                        "r={r} s={s} c={c}"
                    );
                }
            }
        }
    }

    #[test]
    fn logic_tables_match_their_conventions() {
        for r in 0..16usize {
            for s in 0..16usize {
                for c in 0..2usize {
                    let t = tables();
                    assert_eq!(t.or_carry[r][s][c], (r | s) == 0xf || c != 0);
                    assert_eq!(t.and_carry[r][s][c], (r & s) != 0 || c != 0);
                    assert_eq!(
                        t.notxor_carry[r][s][c],
                        calc_notxor_carry(r as u8, s as u8, c as u8)
                    );
                }
            }
        }
    }

    #[test]
    fn table_build_is_idempotent() {
        assert_eq!(build_tables(), build_tables());
    }

    #[test]
    fn five_plus_three_is_eight() {
        let mut alu = BitAlu::new();
        alu.set_register(0, 5);
        alu.set_register(1, 3);
        let out = alu.execute(&op(AluFunction::RplusS));
        assert_eq!(out.y, 8);
        assert!(!out.zero);
        assert!(!out.negative);
        assert_eq!(out.carry_out, tables().arith_carry[5][3][0]);
        assert_eq!(out.overflow, tables().arith_overflow[5][3][0]);
    }

    #[test]
    fn subtraction_borrows_through_the_complemented_operand() {
        let mut alu = BitAlu::new();
        alu.set_register(0, 3); // R
        alu.set_register(1, 10); // S
        let mut sub = op(AluFunction::SminusR);
        sub.carry_in = true; // two's-complement subtract: S + !R + 1
        let out = alu.execute(&sub);
        assert_eq!(out.y, 7);
        assert!(out.carry_out); // no borrow

        let mut sub = op(AluFunction::RminusS);
        sub.carry_in = true;
        let out = alu.execute(&sub);
        assert_eq!(out.y, 3u16.wrapping_sub(10));
        assert!(out.negative);
        assert!(!out.carry_out); // borrow
    }

    #[test]
    fn xor_agrees_with_the_bitwise_operator() {
        let mut alu = BitAlu::new();
        for (a, b) in [(0x0f0f, 0x3355), (0xffff, 0x0001), (0x1234, 0x1234)] {
            alu.set_register(0, a);
            alu.set_register(1, b);
            let out = alu.execute(&op(AluFunction::RxorS));
            assert_eq!(out.y, a ^ b);
            let out = alu.execute(&op(AluFunction::NotRxorS));
            assert_eq!(out.y, !(a ^ b));
        }
    }

    #[test]
    fn nibble_and_page_carries_come_from_their_boundaries() {
        let mut alu = BitAlu::new();
        alu.set_register(0, 0x000f);
        alu.set_register(1, 0x0001);
        let out = alu.execute(&op(AluFunction::RplusS));
        assert_eq!(out.y, 0x0010);
        assert!(out.nib_carry);
        assert!(!out.pg_carry);
        assert!(!out.carry_out);

        alu.set_register(0, 0x00ff);
        let out = alu.execute(&op(AluFunction::RplusS));
        assert_eq!(out.y, 0x0100);
        assert!(out.nib_carry);
        assert!(out.pg_carry);
        assert!(!out.carry_out);

        alu.set_register(0, 0xffff);
        let out = alu.execute(&op(AluFunction::RplusS));
        assert_eq!(out.y, 0x0000);
        assert!(out.zero);
        assert!(out.carry_out);
    }

    #[test]
    fn destinations_write_back_and_shift() {
        let mut alu = BitAlu::new();
        alu.set_register(2, 0x8001);
        let mut o = op(AluFunction::RorS);
        o.source = AluSourcePair::ZB;
        o.a_address = 3;
        o.b_address = 2;

        o.destination = AluDestination::QReg;
        let out = alu.execute(&o);
        assert_eq!(alu.q(), 0x8001);
        assert_eq!(out.y, 0x8001);

        // Y=A reads the A operand while F goes to B.
        alu.set_register(3, 0x4444);
        o.destination = AluDestination::RamA;
        let out = alu.execute(&o);
        assert_eq!(out.y, 0x4444);
        assert_eq!(alu.register(2), 0x8001);

        o.destination = AluDestination::RamUp;
        o.carry_in = true;
        let out = alu.execute(&o);
        assert_eq!(alu.register(2), 0x0003);
        assert_eq!(out.f, 0x8001);

        // A cycle wraps the shifted-out bit instead of the carry-in.
        alu.set_register(2, 0x8001);
        o.carry_in = false;
        o.cycle = true;
        o.destination = AluDestination::RamDown;
        alu.execute(&o);
        assert_eq!(alu.register(2), 0xc000);
    }

    mod proptests {
        use super::*;
        use test_strategy::proptest;

        #[proptest]
        fn addition_matches_wrapping_add(a: u16, b: u16, c: bool) {
            let mut alu = BitAlu::new();
            alu.set_register(0, a);
            alu.set_register(1, b);
            let mut o = op(AluFunction::RplusS);
            o.carry_in = c;
            let out = alu.execute(&o);
            let wide = u32::from(a) + u32::from(b) + u32::from(c);
            assert_eq!(out.y, (wide & 0xffff) as u16);
            assert_eq!(out.carry_out, wide > 0xffff);
            assert_eq!(out.nib_carry, (a & 0xf) + (b & 0xf) + u16::from(c) > 0xf);
            assert_eq!(
                out.pg_carry,
                u32::from(a & 0xff) + u32::from(b & 0xff) + u32::from(c) > 0xff
            );
        }

        #[proptest]
        fn subtraction_is_addition_of_the_complement(a: u16, b: u16) {
            let mut alu = BitAlu::new();
            alu.set_register(0, b);
            alu.set_register(1, a);
            let mut o = op(AluFunction::SminusR);
            o.carry_in = true;
            let out = alu.execute(&o);
            assert_eq!(out.y, a.wrapping_sub(b));
            assert_eq!(out.carry_out, a >= b);
        }
    }

    #[test]
    fn double_length_shifts_couple_f_and_q() {
        let mut alu = BitAlu::new();
        alu.set_register(1, 0x0001);
        alu.set_q(0x8000);
        let mut o = op(AluFunction::RorS);
        o.source = AluSourcePair::ZB;
        o.destination = AluDestination::RamQDown;
        alu.execute(&o);
        // F's low bit fell into Q's high bit.
        assert_eq!(alu.register(1), 0x0000);
        assert_eq!(alu.q(), 0xc000);

        alu.set_register(1, 0x0000);
        alu.set_q(0x8000);
        o.destination = AluDestination::RamQUp;
        alu.execute(&o);
        // Q's high bit rose into F's low bit.
        assert_eq!(alu.register(1), 0x0001);
        assert_eq!(alu.q(), 0x0000);
    }
}
