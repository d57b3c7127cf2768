//! Opcodes, fixed operand layouts and gap moves.
//!
//! Every opcode has a fixed number of results, inputs and temps. The only
//! exception is `CallWithDescriptor`, whose input count depends on the call
//! descriptor and travels with the instruction.

use crate::block::BlockId;
use crate::operand::Operand;
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Opcode
// =============================================================================

/// Operand counts for one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub result: bool,
    /// `None` for variadic inputs.
    pub inputs: Option<usize>,
    pub temps: usize,
}

impl Layout {
    const fn new(result: bool, inputs: usize, temps: usize) -> Self {
        Layout {
            result,
            inputs: Some(inputs),
            temps,
        }
    }

    const fn variadic(result: bool, temps: usize) -> Self {
        Layout {
            result,
            inputs: None,
            temps,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $tag:literal, $mnemonic:literal, $layout:expr;)*) => {
        /// Instruction opcode tag.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $tag,)*
        }

        impl Opcode {
            /// Every opcode, in tag order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($tag => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Lower-case mnemonic used in listings.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Fixed operand layout.
            pub const fn layout(self) -> Layout {
                match self {
                    $(Opcode::$name => $layout,)*
                }
            }
        }
    };
}

opcodes! {
    Gap = 0, "gap", Layout::new(false, 0, 0);
    Label = 1, "label", Layout::new(false, 0, 0);
    Goto = 2, "goto", Layout::new(false, 0, 0);
    Parameter = 3, "parameter", Layout::new(true, 0, 0);
    Context = 4, "context", Layout::new(true, 0, 0);
    UnknownOsrValue = 5, "unknown-osr-value", Layout::new(true, 0, 0);
    OsrEntry = 6, "osr-entry", Layout::new(false, 0, 0);
    StackCheck = 7, "stack-check", Layout::new(false, 1, 0);
    LazyBailout = 8, "lazy-bailout", Layout::new(false, 0, 0);
    Deoptimize = 9, "deoptimize", Layout::new(false, 0, 0);
    ConstantI = 10, "constant-i", Layout::new(true, 0, 0);
    ConstantS = 11, "constant-s", Layout::new(true, 0, 0);
    ConstantD = 12, "constant-d", Layout::new(true, 0, 0);
    ConstantT = 13, "constant-t", Layout::new(true, 0, 0);
    ConstantE = 14, "constant-e", Layout::new(true, 0, 0);
    AddI = 15, "add-i", Layout::new(true, 2, 0);
    SubI = 16, "sub-i", Layout::new(true, 2, 0);
    MulI = 17, "mul-i", Layout::new(true, 2, 0);
    BitI = 18, "bit-i", Layout::new(true, 2, 0);
    ShiftI = 19, "shift-i", Layout::new(true, 2, 0);
    ModByPowerOf2I = 20, "mod-by-power-of-2-i", Layout::new(true, 1, 0);
    ModByConstI = 21, "mod-by-const-i", Layout::new(true, 1, 2);
    DivByPowerOf2I = 22, "div-by-power-of-2-i", Layout::new(true, 1, 0);
    DivByConstI = 23, "div-by-const-i", Layout::new(true, 1, 2);
    FlooringDivByPowerOf2I = 24, "flooring-div-by-power-of-2-i", Layout::new(true, 1, 0);
    FlooringDivByConstI = 25, "flooring-div-by-const-i", Layout::new(true, 1, 3);
    ArithmeticD = 26, "arithmetic-d", Layout::new(true, 2, 0);
    ArithmeticT = 27, "arithmetic-t", Layout::new(true, 3, 0);
    SmiTag = 28, "smi-tag", Layout::new(true, 1, 0);
    SmiUntag = 29, "smi-untag", Layout::new(true, 1, 0);
    NumberTagD = 30, "number-tag-d", Layout::new(true, 1, 1);
    TaggedToI = 31, "tagged-to-i", Layout::new(true, 1, 1);
    CheckSmi = 32, "check-smi", Layout::new(true, 1, 0);
    CheckNonSmi = 33, "check-non-smi", Layout::new(false, 1, 0);
    CheckMaps = 34, "check-maps", Layout::new(false, 1, 0);
    CheckValue = 35, "check-value", Layout::new(false, 1, 0);
    Branch = 36, "branch", Layout::new(false, 1, 0);
    CompareNumericAndBranch = 37, "compare-numeric-and-branch", Layout::new(false, 2, 0);
    TypeofIsAndBranch = 38, "typeof-is-and-branch", Layout::new(false, 1, 0);
    LoadContextSlot = 39, "load-context-slot", Layout::new(true, 1, 0);
    StoreContextSlot = 40, "store-context-slot", Layout::new(false, 2, 1);
    LoadNamedField = 41, "load-named-field", Layout::new(true, 1, 0);
    StoreNamedField = 42, "store-named-field", Layout::new(false, 2, 1);
    LoadNamedGeneric = 43, "load-named-generic", Layout::new(true, 2, 0);
    LoadGlobalGeneric = 44, "load-global-generic", Layout::new(true, 2, 0);
    FunctionLiteral = 45, "function-literal", Layout::new(true, 1, 0);
    CallJSFunction = 46, "call-js-function", Layout::new(true, 1, 0);
    CallWithDescriptor = 47, "call-with-descriptor", Layout::variadic(true, 0);
    CallRuntime = 48, "call-runtime", Layout::new(true, 1, 0);
    InstanceOfKnownGlobal = 49, "instance-of-known-global", Layout::new(true, 2, 1);
    PushArgument = 50, "push-argument", Layout::new(false, 1, 0);
    Drop = 51, "drop", Layout::new(false, 0, 0);
    Return = 52, "return", Layout::new(false, 3, 0);
}

impl Opcode {
    /// Gap-like opcodes carry parallel moves instead of operands.
    #[inline]
    pub const fn is_gap(self) -> bool {
        matches!(self, Opcode::Gap | Opcode::Label)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Token
// =============================================================================

/// Operator token for arithmetic, bitwise and comparison opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Token {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
    BitAnd = 5,
    BitOr = 6,
    BitXor = 7,
    Shl = 8,
    Sar = 9,
    Shr = 10,
    Ror = 11,
    Eq = 12,
    Ne = 13,
    EqStrict = 14,
    NeStrict = 15,
    Lt = 16,
    Gt = 17,
    Lte = 18,
    Gte = 19,
}

impl Token {
    pub const fn from_u8(value: u8) -> Option<Self> {
        use Token::*;
        Some(match value {
            0 => Add,
            1 => Sub,
            2 => Mul,
            3 => Div,
            4 => Mod,
            5 => BitAnd,
            6 => BitOr,
            7 => BitXor,
            8 => Shl,
            9 => Sar,
            10 => Shr,
            11 => Ror,
            12 => Eq,
            13 => Ne,
            14 => EqStrict,
            15 => NeStrict,
            16 => Lt,
            17 => Gt,
            18 => Lte,
            19 => Gte,
            _ => return None,
        })
    }

    pub const fn symbol(self) -> &'static str {
        use Token::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            Shl => "<<",
            Sar => ">>",
            Shr => ">>>",
            Ror => "ror",
            Eq => "==",
            Ne => "!=",
            EqStrict => "===",
            NeStrict => "!==",
            Lt => "<",
            Gt => ">",
            Lte => "<=",
            Gte => ">=",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// =============================================================================
// Gap Moves
// =============================================================================

/// Slot of a gap's parallel moves relative to the adjacent instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GapPosition {
    Before = 0,
    Start = 1,
    End = 2,
    After = 3,
}

impl GapPosition {
    pub const ALL: [GapPosition; 4] = [
        GapPosition::Before,
        GapPosition::Start,
        GapPosition::End,
        GapPosition::After,
    ];
}

/// One move of a parallel move. Either side may be eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOperands {
    pub source: Option<Operand>,
    pub destination: Option<Operand>,
}

/// Moves that happen simultaneously.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParallelMove {
    moves: SmallVec<[MoveOperands; 4]>,
}

impl ParallelMove {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_move(&mut self, source: Option<Operand>, destination: Option<Operand>) {
        self.moves.push(MoveOperands { source, destination });
    }

    #[inline]
    pub fn moves(&self) -> &[MoveOperands] {
        &self.moves
    }

    /// Every operand on either side of a move.
    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        self.moves
            .iter()
            .flat_map(|m| m.source.into_iter().chain(m.destination))
    }
}

/// Parallel moves inserted between instructions, owned by a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Gap {
    pub block: BlockId,
    moves: [Option<ParallelMove>; 4],
}

impl Gap {
    pub fn new(block: BlockId) -> Self {
        Gap {
            block,
            moves: Default::default(),
        }
    }

    #[inline]
    pub fn parallel_move(&self, position: GapPosition) -> Option<&ParallelMove> {
        self.moves[position as usize].as_ref()
    }

    pub fn get_or_create_parallel_move(&mut self, position: GapPosition) -> &mut ParallelMove {
        self.moves[position as usize].get_or_insert_with(ParallelMove::new)
    }

    pub fn set_parallel_move(&mut self, position: GapPosition, parallel_move: Option<ParallelMove>) {
        self.moves[position as usize] = parallel_move;
    }

    /// Operands of every move in every position.
    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        self.moves.iter().flatten().flat_map(ParallelMove::operands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_tags_are_dense() {
        for (index, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as usize, index);
            assert_eq!(Opcode::from_u8(index as u8), Some(*op));
        }
        assert!(Opcode::from_u8(Opcode::ALL.len() as u8).is_none());
    }

    #[test]
    fn test_layouts() {
        assert_eq!(Opcode::AddI.layout(), Layout::new(true, 2, 0));
        assert_eq!(Opcode::CallWithDescriptor.layout().inputs, None);
        assert!(!Opcode::Goto.layout().result);
        assert_eq!(Opcode::FlooringDivByConstI.layout().temps, 3);
    }

    #[test]
    fn test_token_from_u8() {
        assert_eq!(Token::from_u8(9), Some(Token::Sar));
        assert_eq!(Token::from_u8(20), None);
        assert_eq!(Token::Shr.to_string(), ">>>");
    }

    #[test]
    fn test_gap_operands() {
        let mut gap = Gap::new(BlockId(1));
        gap.get_or_create_parallel_move(GapPosition::Start)
            .add_move(Some(Operand::constant(4)), Some(Operand::register(0)));
        gap.get_or_create_parallel_move(GapPosition::After)
            .add_move(None, Some(Operand::stack_slot(1)));

        assert!(gap.parallel_move(GapPosition::Before).is_none());
        let ops: Vec<_> = gap.operands().collect();
        assert_eq!(
            ops,
            vec![Operand::constant(4), Operand::register(0), Operand::stack_slot(1)]
        );
    }
}
