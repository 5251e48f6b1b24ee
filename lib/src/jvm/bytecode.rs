//! Decoding of raw JVM bytecode
//!
//! Unlike an instruction AST, this works directly on the code array: the verifier needs to talk
//! about byte offsets (bcis) anyways, since that is what jumps, exception handlers, and stack map
//! frames all refer to. Every read is bounds-checked, so malformed code turns into an
//! [`Error::IncompleteBytecode`] rather than a panic.

use super::Error;

pub type Opcode = u8;

pub const NOP: Opcode = 0x00;
pub const ACONST_NULL: Opcode = 0x01;
pub const ICONST_M1: Opcode = 0x02;
pub const ICONST_0: Opcode = 0x03;
pub const ICONST_1: Opcode = 0x04;
pub const ICONST_2: Opcode = 0x05;
pub const ICONST_3: Opcode = 0x06;
pub const ICONST_4: Opcode = 0x07;
pub const ICONST_5: Opcode = 0x08;
pub const LCONST_0: Opcode = 0x09;
pub const LCONST_1: Opcode = 0x0a;
pub const FCONST_0: Opcode = 0x0b;
pub const FCONST_1: Opcode = 0x0c;
pub const FCONST_2: Opcode = 0x0d;
pub const DCONST_0: Opcode = 0x0e;
pub const DCONST_1: Opcode = 0x0f;
pub const BIPUSH: Opcode = 0x10;
pub const SIPUSH: Opcode = 0x11;
pub const LDC: Opcode = 0x12;
pub const LDC_W: Opcode = 0x13;
pub const LDC2_W: Opcode = 0x14;
pub const ILOAD: Opcode = 0x15;
pub const LLOAD: Opcode = 0x16;
pub const FLOAD: Opcode = 0x17;
pub const DLOAD: Opcode = 0x18;
pub const ALOAD: Opcode = 0x19;
pub const ILOAD_0: Opcode = 0x1a;
pub const ILOAD_1: Opcode = 0x1b;
pub const ILOAD_2: Opcode = 0x1c;
pub const ILOAD_3: Opcode = 0x1d;
pub const LLOAD_0: Opcode = 0x1e;
pub const LLOAD_1: Opcode = 0x1f;
pub const LLOAD_2: Opcode = 0x20;
pub const LLOAD_3: Opcode = 0x21;
pub const FLOAD_0: Opcode = 0x22;
pub const FLOAD_1: Opcode = 0x23;
pub const FLOAD_2: Opcode = 0x24;
pub const FLOAD_3: Opcode = 0x25;
pub const DLOAD_0: Opcode = 0x26;
pub const DLOAD_1: Opcode = 0x27;
pub const DLOAD_2: Opcode = 0x28;
pub const DLOAD_3: Opcode = 0x29;
pub const ALOAD_0: Opcode = 0x2a;
pub const ALOAD_1: Opcode = 0x2b;
pub const ALOAD_2: Opcode = 0x2c;
pub const ALOAD_3: Opcode = 0x2d;
pub const IALOAD: Opcode = 0x2e;
pub const LALOAD: Opcode = 0x2f;
pub const FALOAD: Opcode = 0x30;
pub const DALOAD: Opcode = 0x31;
pub const AALOAD: Opcode = 0x32;
pub const BALOAD: Opcode = 0x33;
pub const CALOAD: Opcode = 0x34;
pub const SALOAD: Opcode = 0x35;
pub const ISTORE: Opcode = 0x36;
pub const LSTORE: Opcode = 0x37;
pub const FSTORE: Opcode = 0x38;
pub const DSTORE: Opcode = 0x39;
pub const ASTORE: Opcode = 0x3a;
pub const ISTORE_0: Opcode = 0x3b;
pub const ISTORE_1: Opcode = 0x3c;
pub const ISTORE_2: Opcode = 0x3d;
pub const ISTORE_3: Opcode = 0x3e;
pub const LSTORE_0: Opcode = 0x3f;
pub const LSTORE_1: Opcode = 0x40;
pub const LSTORE_2: Opcode = 0x41;
pub const LSTORE_3: Opcode = 0x42;
pub const FSTORE_0: Opcode = 0x43;
pub const FSTORE_1: Opcode = 0x44;
pub const FSTORE_2: Opcode = 0x45;
pub const FSTORE_3: Opcode = 0x46;
pub const DSTORE_0: Opcode = 0x47;
pub const DSTORE_1: Opcode = 0x48;
pub const DSTORE_2: Opcode = 0x49;
pub const DSTORE_3: Opcode = 0x4a;
pub const ASTORE_0: Opcode = 0x4b;
pub const ASTORE_1: Opcode = 0x4c;
pub const ASTORE_2: Opcode = 0x4d;
pub const ASTORE_3: Opcode = 0x4e;
pub const IASTORE: Opcode = 0x4f;
pub const LASTORE: Opcode = 0x50;
pub const FASTORE: Opcode = 0x51;
pub const DASTORE: Opcode = 0x52;
pub const AASTORE: Opcode = 0x53;
pub const BASTORE: Opcode = 0x54;
pub const CASTORE: Opcode = 0x55;
pub const SASTORE: Opcode = 0x56;
pub const POP: Opcode = 0x57;
pub const POP2: Opcode = 0x58;
pub const DUP: Opcode = 0x59;
pub const DUP_X1: Opcode = 0x5a;
pub const DUP_X2: Opcode = 0x5b;
pub const DUP2: Opcode = 0x5c;
pub const DUP2_X1: Opcode = 0x5d;
pub const DUP2_X2: Opcode = 0x5e;
pub const SWAP: Opcode = 0x5f;
pub const IADD: Opcode = 0x60;
pub const LADD: Opcode = 0x61;
pub const FADD: Opcode = 0x62;
pub const DADD: Opcode = 0x63;
pub const ISUB: Opcode = 0x64;
pub const LSUB: Opcode = 0x65;
pub const FSUB: Opcode = 0x66;
pub const DSUB: Opcode = 0x67;
pub const IMUL: Opcode = 0x68;
pub const LMUL: Opcode = 0x69;
pub const FMUL: Opcode = 0x6a;
pub const DMUL: Opcode = 0x6b;
pub const IDIV: Opcode = 0x6c;
pub const LDIV: Opcode = 0x6d;
pub const FDIV: Opcode = 0x6e;
pub const DDIV: Opcode = 0x6f;
pub const IREM: Opcode = 0x70;
pub const LREM: Opcode = 0x71;
pub const FREM: Opcode = 0x72;
pub const DREM: Opcode = 0x73;
pub const INEG: Opcode = 0x74;
pub const LNEG: Opcode = 0x75;
pub const FNEG: Opcode = 0x76;
pub const DNEG: Opcode = 0x77;
pub const ISHL: Opcode = 0x78;
pub const LSHL: Opcode = 0x79;
pub const ISHR: Opcode = 0x7a;
pub const LSHR: Opcode = 0x7b;
pub const IUSHR: Opcode = 0x7c;
pub const LUSHR: Opcode = 0x7d;
pub const IAND: Opcode = 0x7e;
pub const LAND: Opcode = 0x7f;
pub const IOR: Opcode = 0x80;
pub const LOR: Opcode = 0x81;
pub const IXOR: Opcode = 0x82;
pub const LXOR: Opcode = 0x83;
pub const IINC: Opcode = 0x84;
pub const I2L: Opcode = 0x85;
pub const I2F: Opcode = 0x86;
pub const I2D: Opcode = 0x87;
pub const L2I: Opcode = 0x88;
pub const L2F: Opcode = 0x89;
pub const L2D: Opcode = 0x8a;
pub const F2I: Opcode = 0x8b;
pub const F2L: Opcode = 0x8c;
pub const F2D: Opcode = 0x8d;
pub const D2I: Opcode = 0x8e;
pub const D2L: Opcode = 0x8f;
pub const D2F: Opcode = 0x90;
pub const I2B: Opcode = 0x91;
pub const I2C: Opcode = 0x92;
pub const I2S: Opcode = 0x93;
pub const LCMP: Opcode = 0x94;
pub const FCMPL: Opcode = 0x95;
pub const FCMPG: Opcode = 0x96;
pub const DCMPL: Opcode = 0x97;
pub const DCMPG: Opcode = 0x98;
pub const IFEQ: Opcode = 0x99;
pub const IFNE: Opcode = 0x9a;
pub const IFLT: Opcode = 0x9b;
pub const IFGE: Opcode = 0x9c;
pub const IFGT: Opcode = 0x9d;
pub const IFLE: Opcode = 0x9e;
pub const IF_ICMPEQ: Opcode = 0x9f;
pub const IF_ICMPNE: Opcode = 0xa0;
pub const IF_ICMPLT: Opcode = 0xa1;
pub const IF_ICMPGE: Opcode = 0xa2;
pub const IF_ICMPGT: Opcode = 0xa3;
pub const IF_ICMPLE: Opcode = 0xa4;
pub const IF_ACMPEQ: Opcode = 0xa5;
pub const IF_ACMPNE: Opcode = 0xa6;
pub const GOTO: Opcode = 0xa7;
pub const JSR: Opcode = 0xa8;
pub const RET: Opcode = 0xa9;
pub const TABLESWITCH: Opcode = 0xaa;
pub const LOOKUPSWITCH: Opcode = 0xab;
pub const IRETURN: Opcode = 0xac;
pub const LRETURN: Opcode = 0xad;
pub const FRETURN: Opcode = 0xae;
pub const DRETURN: Opcode = 0xaf;
pub const ARETURN: Opcode = 0xb0;
pub const RETURN: Opcode = 0xb1;
pub const GETSTATIC: Opcode = 0xb2;
pub const PUTSTATIC: Opcode = 0xb3;
pub const GETFIELD: Opcode = 0xb4;
pub const PUTFIELD: Opcode = 0xb5;
pub const INVOKEVIRTUAL: Opcode = 0xb6;
pub const INVOKESPECIAL: Opcode = 0xb7;
pub const INVOKESTATIC: Opcode = 0xb8;
pub const INVOKEINTERFACE: Opcode = 0xb9;
pub const INVOKEDYNAMIC: Opcode = 0xba;
pub const NEW: Opcode = 0xbb;
pub const NEWARRAY: Opcode = 0xbc;
pub const ANEWARRAY: Opcode = 0xbd;
pub const ARRAYLENGTH: Opcode = 0xbe;
pub const ATHROW: Opcode = 0xbf;
pub const CHECKCAST: Opcode = 0xc0;
pub const INSTANCEOF: Opcode = 0xc1;
pub const MONITORENTER: Opcode = 0xc2;
pub const MONITOREXIT: Opcode = 0xc3;
pub const WIDE: Opcode = 0xc4;
pub const MULTIANEWARRAY: Opcode = 0xc5;
pub const IFNULL: Opcode = 0xc6;
pub const IFNONNULL: Opcode = 0xc7;
pub const GOTO_W: Opcode = 0xc8;
pub const JSR_W: Opcode = 0xc9;

/// Length of instructions whose length is determined entirely by their opcode
///
/// Returns `None` for opcodes that are undefined and for the variable-length instructions
/// (`tableswitch`, `lookupswitch`, `wide`).
pub fn fixed_length(opcode: Opcode) -> Option<usize> {
    let len = match opcode {
        NOP..=DCONST_1 => 1,
        BIPUSH => 2,
        SIPUSH => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        ILOAD..=ALOAD => 2,
        ILOAD_0..=SALOAD => 1,
        ISTORE..=ASTORE => 2,
        ISTORE_0..=LXOR => 1,
        IINC => 3,
        I2L..=DCMPG => 1,
        IFEQ..=JSR => 3,
        RET => 2,
        IRETURN..=RETURN => 1,
        GETSTATIC..=INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        NEWARRAY => 2,
        ANEWARRAY => 3,
        ARRAYLENGTH | ATHROW => 1,
        CHECKCAST | INSTANCEOF => 3,
        MONITORENTER | MONITOREXIT => 1,
        MULTIANEWARRAY => 4,
        IFNULL | IFNONNULL => 3,
        GOTO_W | JSR_W => 5,
        _ => return None,
    };
    Some(len)
}

/// Is this one of the defined opcodes?
pub fn is_defined(opcode: Opcode) -> bool {
    opcode <= JSR_W
}

/// Opcodes which can follow `wide`
pub fn is_widenable(opcode: Opcode) -> bool {
    matches!(opcode, ILOAD..=ALOAD | ISTORE..=ASTORE | RET | IINC)
}

/// Decoded `tableswitch` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSwitch {
    /// Were all of the alignment bytes zero?
    pub zero_padding: bool,
    pub default_offset: i32,
    pub low: i32,
    pub high: i32,

    /// Jump offset for each key in `low..=high`
    pub offsets: Vec<i32>,
}

/// Decoded `lookupswitch` instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSwitch {
    /// Were all of the alignment bytes zero?
    pub zero_padding: bool,
    pub default_offset: i32,

    /// Key and jump offset pairs, in the order they appear
    pub pairs: Vec<(i32, i32)>,
}

impl TableSwitch {
    pub fn low_key(&self) -> i32 {
        self.low
    }

    pub fn high_key(&self) -> i32 {
        self.high
    }

    pub fn number_of_cases(&self) -> usize {
        self.offsets.len()
    }

    pub fn key_at(&self, case: usize) -> i32 {
        self.low.wrapping_add(case as i32)
    }

    /// Absolute target of a case, relative to the `tableswitch` at `bci`
    pub fn target_at(&self, bci: usize, case: usize) -> i64 {
        bci as i64 + self.offsets[case] as i64
    }

    pub fn default_target(&self, bci: usize) -> i64 {
        bci as i64 + self.default_offset as i64
    }

    /// Every target, starting with the default
    pub fn targets(&self, bci: usize) -> impl Iterator<Item = i64> + '_ {
        std::iter::once(self.default_target(bci))
            .chain((0..self.number_of_cases()).map(move |case| self.target_at(bci, case)))
    }
}

impl LookupSwitch {
    /// Keys must be sorted in strictly increasing order
    pub fn keys_sorted(&self) -> bool {
        self.pairs.windows(2).all(|pair| pair[0].0 < pair[1].0)
    }

    pub fn number_of_cases(&self) -> usize {
        self.pairs.len()
    }

    pub fn key_at(&self, case: usize) -> i32 {
        self.pairs[case].0
    }

    pub fn target_at(&self, bci: usize, case: usize) -> i64 {
        bci as i64 + self.pairs[case].1 as i64
    }

    pub fn default_target(&self, bci: usize) -> i64 {
        bci as i64 + self.default_offset as i64
    }

    /// Every target, starting with the default
    pub fn targets(&self, bci: usize) -> impl Iterator<Item = i64> + '_ {
        std::iter::once(self.default_target(bci))
            .chain((0..self.number_of_cases()).map(move |case| self.target_at(bci, case)))
    }
}

/// Bounds-checked view of a method's code array
#[derive(Copy, Clone, Debug)]
pub struct BytecodeStream<'a> {
    code: &'a [u8],
}

impl<'a> BytecodeStream<'a> {
    pub fn new(code: &'a [u8]) -> BytecodeStream<'a> {
        BytecodeStream { code }
    }

    /// Offset just past the end of the code
    pub fn end_bci(&self) -> usize {
        self.code.len()
    }

    fn bytes<const N: usize>(&self, at: usize) -> Result<[u8; N], Error> {
        at.checked_add(N)
            .and_then(|end| self.code.get(at..end))
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(Error::IncompleteBytecode { bci: at })
    }

    pub fn read_u1(&self, at: usize) -> Result<u8, Error> {
        Ok(self.bytes::<1>(at)?[0])
    }

    pub fn read_s1(&self, at: usize) -> Result<i8, Error> {
        Ok(self.bytes::<1>(at)?[0] as i8)
    }

    pub fn read_u2(&self, at: usize) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.bytes(at)?))
    }

    pub fn read_s2(&self, at: usize) -> Result<i16, Error> {
        Ok(i16::from_be_bytes(self.bytes(at)?))
    }

    pub fn read_s4(&self, at: usize) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(self.bytes(at)?))
    }

    /// Raw opcode at the offset (this may be `wide`)
    pub fn opcode(&self, bci: usize) -> Result<Opcode, Error> {
        self.read_u1(bci)
    }

    /// Opcode at the offset, looking through `wide` to the instruction it modifies
    pub fn current_bc(&self, bci: usize) -> Result<Opcode, Error> {
        match self.opcode(bci)? {
            WIDE => self.read_u1(bci + 1),
            other => Ok(other),
        }
    }

    pub fn is_wide(&self, bci: usize) -> Result<bool, Error> {
        Ok(self.opcode(bci)? == WIDE)
    }

    /// Offset of the instruction following the one at `bci`
    pub fn next_bci(&self, bci: usize) -> Result<usize, Error> {
        let opcode = self.opcode(bci)?;
        let len = match opcode {
            WIDE => match self.read_u1(bci + 1)? {
                IINC => 6,
                _ => 4,
            },
            TABLESWITCH => {
                let aligned = Self::aligned_bci(bci);
                let low = self.read_s4(aligned + 4)? as i64;
                let high = self.read_s4(aligned + 8)? as i64;
                let cases = (high - low + 1).max(0) as usize;
                aligned + 12 + 4 * cases - bci
            }
            LOOKUPSWITCH => {
                let aligned = Self::aligned_bci(bci);
                let pairs = self.read_s4(aligned + 4)?.max(0) as usize;
                aligned + 8 + 8 * pairs - bci
            }
            _ => fixed_length(opcode).ok_or(Error::InvalidOpcode { bci, opcode })?,
        };
        Ok(bci + len)
    }

    /// First 4-byte aligned offset after the opcode at `bci`
    pub fn aligned_bci(bci: usize) -> usize {
        (bci + 4) & !3
    }

    /// Constant pool index following the opcode
    pub fn read_cpi(&self, bci: usize) -> Result<u16, Error> {
        match self.opcode(bci)? {
            LDC => self.read_u1(bci + 1).map(u16::from),
            _ => self.read_u2(bci + 1),
        }
    }

    /// Local variable index of a load, store, `ret`, or `iinc` (taking into account `wide`)
    pub fn read_local_index(&self, bci: usize) -> Result<usize, Error> {
        if self.is_wide(bci)? {
            self.read_u2(bci + 2).map(usize::from)
        } else {
            self.read_u1(bci + 1).map(usize::from)
        }
    }

    /// Increment of an `iinc` (taking into account `wide`)
    pub fn read_iinc_increment(&self, bci: usize) -> Result<i32, Error> {
        if self.is_wide(bci)? {
            self.read_s2(bci + 4).map(i32::from)
        } else {
            self.read_s1(bci + 2).map(i32::from)
        }
    }

    /// Absolute destination of a branch (may be out of range, so it is signed)
    pub fn read_branch_dest(&self, bci: usize) -> Result<i64, Error> {
        let offset = match self.opcode(bci)? {
            GOTO_W | JSR_W => self.read_s4(bci + 1)? as i64,
            _ => self.read_s2(bci + 1)? as i64,
        };
        Ok(bci as i64 + offset)
    }

    /// Decode a `tableswitch`, checking that the whole table is inside the code
    pub fn table_switch(&self, bci: usize) -> Result<TableSwitch, Error> {
        let aligned = Self::aligned_bci(bci);
        let zero_padding = self.code.get(bci + 1..aligned).map_or(false, |padding| {
            padding.iter().all(|b| *b == 0)
        });
        let default_offset = self.read_s4(aligned)?;
        let low = self.read_s4(aligned + 4)?;
        let high = self.read_s4(aligned + 8)?;
        let cases = (high as i64 - low as i64 + 1).max(0) as usize;

        // Check the end before allocating anything
        self.bytes::<0>(aligned + 12 + 4 * cases)?;
        let offsets = (0..cases)
            .map(|i| self.read_s4(aligned + 12 + 4 * i))
            .collect::<Result<_, _>>()?;

        Ok(TableSwitch {
            zero_padding,
            default_offset,
            low,
            high,
            offsets,
        })
    }

    /// Decode a `lookupswitch`, checking that the whole table is inside the code
    pub fn lookup_switch(&self, bci: usize) -> Result<LookupSwitch, Error> {
        let aligned = Self::aligned_bci(bci);
        let zero_padding = self.code.get(bci + 1..aligned).map_or(false, |padding| {
            padding.iter().all(|b| *b == 0)
        });
        let default_offset = self.read_s4(aligned)?;
        let npairs = self.read_s4(aligned + 4)?.max(0) as usize;

        self.bytes::<0>(aligned + 8 + 8 * npairs)?;
        let pairs = (0..npairs)
            .map(|i| {
                let at = aligned + 8 + 8 * i;
                Ok((self.read_s4(at)?, self.read_s4(at + 4)?))
            })
            .collect::<Result<_, Error>>()?;

        Ok(LookupSwitch {
            zero_padding,
            default_offset,
            pairs,
        })
    }
}
