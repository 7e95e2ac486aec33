//! Engine-wide limits.
//!
//! These bounds are shared between the compiler (which enforces most of
//! them at emission time) and the VM (which enforces the frame bound at
//! call time).

/// Maximum number of active call frames.
pub const MAX_FRAMES: usize = 1000;

/// Maximum local variables per function.
pub const MAX_LOCALS: usize = 256;

/// Maximum upvalues per function.
pub const MAX_UPVALUES: usize = 256;

/// Maximum constants per chunk (operands are one byte).
pub const MAX_CONSTANTS: usize = 256;

/// Maximum forward/backward jump distance (operands are two bytes).
pub const MAX_JUMP: usize = u16::MAX as usize;

/// Maximum arguments in a call expression.
pub const MAX_ARGS: usize = 255;

/// Maximum nesting depth of `{}` interpolation inside a string literal.
pub const MAX_INTERPOLATION_NESTING: usize = 4;

/// Heap growth factor applied to the collection threshold after a cycle.
pub const GC_GROW_FACTOR: usize = 2;

/// Allocation threshold for the first collection cycle.
pub const GC_FIRST_THRESHOLD: usize = 1024 * 1024;
