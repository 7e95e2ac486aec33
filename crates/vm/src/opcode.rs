//! Instruction set.
//!
//! Single-byte opcodes with raw byte operands. Jump operands are 16-bit
//! unsigned big-endian offsets; everything else is one byte. Each opcode
//! carries a static stack effect the compiler sums to find a function's
//! high-water mark, and an operand width the loop closer uses to walk
//! emitted code when rewriting `End` sentinels.

/// Marker for `Closure`, whose operand size depends on the function's
/// upvalue count.
pub const OPERAND_VARIABLE: u8 = u8::MAX;

macro_rules! opcodes {
    ($( $name:ident => ($operands:expr, $effect:expr) ),* $(,)?) => {
        /// A bytecode instruction.
        #[derive(Clone, Copy, PartialEq, Eq, Debug)]
        #[repr(u8)]
        pub enum OpCode {
            $($name),*
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[$(OpCode::$name),*];

            /// Operand bytes following the opcode, [`OPERAND_VARIABLE`]
            /// for `Closure`.
            pub fn operand_width(self) -> u8 {
                match self {
                    $(OpCode::$name => $operands),*
                }
            }

            /// Static net effect on the value stack. Operand-dependent
            /// opcodes (calls, unpacks) report their fixed part; the
            /// compiler adds the dynamic part at emission.
            pub fn stack_effect(self) -> i32 {
                match self {
                    $(OpCode::$name => $effect),*
                }
            }
        }

        impl TryFrom<u8> for OpCode {
            type Error = u8;

            fn try_from(byte: u8) -> Result<OpCode, u8> {
                OpCode::ALL.get(byte as usize).copied().ok_or(byte)
            }
        }
    };
}

opcodes! {
    // Constants and literals
    Constant => (1, 1),
    Null => (0, 1),
    True => (0, 1),
    False => (0, 1),

    // Stack
    Pop => (0, -1),
    PopRepl => (0, -1),
    Dup => (0, 1),

    // Locals, upvalues, globals, module scope
    GetLocal => (1, 1),
    SetLocal => (1, 0),
    GetGlobal => (1, 1),
    SetGlobal => (1, 0),
    GetModule => (1, 1),
    SetModule => (1, 0),
    DefineGlobal => (1, -1),
    DefineModule => (1, -1),
    DefineOptional => (2, 0),
    GetUpvalue => (1, 1),
    SetUpvalue => (1, 0),

    // Properties
    GetProperty => (1, 0),
    GetPropertyNoPop => (1, 1),
    SetProperty => (1, -1),
    GetSuper => (1, -1),
    SetClassVar => (1, -1),

    // Aggregates
    Range => (0, -2),
    List => (0, 1),
    PushListItem => (0, -1),
    Map => (0, 1),
    PushMapField => (0, -2),
    UnpackList => (1, -1),
    UnpackRestList => (2, -1),
    Subscript => (0, -1),
    SubscriptStore => (0, -2),
    SubscriptPush => (0, 1),
    Slice => (0, -3),

    // Comparison, arithmetic, bitwise, logical
    Is => (0, -1),
    In => (0, -1),
    Equal => (0, -1),
    Greater => (0, -1),
    GreaterEqual => (0, -1),
    Less => (0, -1),
    LessEqual => (0, -1),
    Add => (0, -1),
    Subtract => (0, -1),
    Multiply => (0, -1),
    Divide => (0, -1),
    Mod => (0, -1),
    Pow => (0, -1),
    Band => (0, -1),
    Bor => (0, -1),
    Bnot => (0, 0),
    Bxor => (0, -1),
    Lshift => (0, -1),
    Rshift => (0, -1),
    And => (2, -1),
    Or => (2, -1),
    Not => (0, 0),
    Negate => (0, 0),

    // Control flow
    MultiCase => (1, -1),
    CompareJump => (2, -1),
    Jump => (2, 0),
    JumpIfFalse => (2, 0),
    JumpIfNull => (2, 0),
    Loop => (2, 0),

    // Calls, closures, returns
    Call => (1, 0),
    Invoke => (2, 0),
    Super => (2, -1),
    Closure => (OPERAND_VARIABLE, 1),
    CloseUpvalue => (0, -1),
    Return => (0, -1),

    // Classes
    Class => (1, 1),
    Inherit => (0, -1),
    Method => (1, -1),
    ExtensionMethod => (1, -2),

    // Imports
    ImportString => (1, 1),
    ImportName => (1, 1),
    ImportVariable => (1, 1),
    ImportAlias => (0, 1),
    ImportEnd => (0, 0),

    // Loop-exit sentinel, rewritten to Jump by the loop closer
    End => (2, 0),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for (i, &op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(op as u8, i as u8);
            assert_eq!(OpCode::try_from(i as u8), Ok(op));
        }
    }

    #[test]
    fn rejects_out_of_range() {
        let count = OpCode::ALL.len() as u8;
        assert!(OpCode::try_from(count).is_err());
        assert!(OpCode::try_from(u8::MAX).is_err());
    }

    #[test]
    fn operand_widths() {
        assert_eq!(OpCode::Constant.operand_width(), 1);
        assert_eq!(OpCode::Jump.operand_width(), 2);
        assert_eq!(OpCode::Pop.operand_width(), 0);
        assert_eq!(OpCode::Closure.operand_width(), OPERAND_VARIABLE);
    }
}
