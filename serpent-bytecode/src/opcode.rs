use core::fmt;

/// The byte does not name an opcode or an operator tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOpcode;

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opcode")
    }
}

impl std::error::Error for InvalidOpcode {}

/// Opcode representation of the Serpent VM.
///
/// Discriminants are the wire identities of the instruction stream and are
/// compatible with the compiler's numbering for every opcode the compiler
/// can emit. The `170..` range holds the rewritten opcodes that only appear
/// in the 4-byte stream produced by function construction; the compiler
/// never emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// The byte does not map to any known opcode.
    Invalid = 0,
    /// Removes the top-of-stack item.
    PopTop = 1,
    /// Swaps the two top-most stack items.
    RotTwo = 2,
    /// Lifts second and third stack items one position up, moves top down
    /// to position three.
    RotThree = 3,
    /// Duplicates the top-of-stack item.
    DupTop = 4,
    /// Duplicates the two top-most stack items.
    DupTopTwo = 5,
    /// Lifts items two, three and four one position up, moves top down to
    /// position four.
    RotFour = 6,
    /// Does nothing.
    Nop = 9,
    /// Unary `+` on top-of-stack.
    UnaryPositive = 10,
    /// Unary `-` on top-of-stack.
    UnaryNegative = 11,
    /// Unary `not` on top-of-stack.
    UnaryNot = 12,
    /// Unary `~` on top-of-stack.
    UnaryInvert = 15,
    /// Binary `@`.
    BinaryMatrixMultiply = 16,
    /// In-place `@=`.
    InplaceMatrixMultiply = 17,
    /// Binary `**`.
    BinaryPower = 19,
    /// Binary `*`.
    BinaryMultiply = 20,
    /// Binary `%`.
    BinaryModulo = 22,
    /// Binary `+`.
    BinaryAdd = 23,
    /// Binary `-`.
    BinarySubtract = 24,
    /// Subscript `tos1[tos]`.
    BinarySubscr = 25,
    /// Binary `//`.
    BinaryFloorDivide = 26,
    /// Binary `/`.
    BinaryTrueDivide = 27,
    /// In-place `//=`.
    InplaceFloorDivide = 28,
    /// In-place `/=`.
    InplaceTrueDivide = 29,
    /// Pushes `tos.__aiter__()`.
    GetAiter = 50,
    /// Pushes the awaitable of `tos.__anext__()`.
    GetAnext = 51,
    /// Sets up an `async with` block.
    BeforeAsyncWith = 52,
    /// Pushes `None` for a finally block entered on the fall-through path.
    BeginFinally = 53,
    /// Terminates an `async for` loop on `StopAsyncIteration`.
    EndAsyncFor = 54,
    /// In-place `+=`.
    InplaceAdd = 55,
    /// In-place `-=`.
    InplaceSubtract = 56,
    /// In-place `*=`.
    InplaceMultiply = 57,
    /// In-place `%=`.
    InplaceModulo = 59,
    /// Subscript store `tos1[tos] = tos2`.
    StoreSubscr = 60,
    /// Subscript delete `del tos1[tos]`.
    DeleteSubscr = 61,
    /// Binary `<<`.
    BinaryLshift = 62,
    /// Binary `>>`.
    BinaryRshift = 63,
    /// Binary `&`.
    BinaryAnd = 64,
    /// Binary `^`.
    BinaryXor = 65,
    /// Binary `|`.
    BinaryOr = 66,
    /// In-place `**=`.
    InplacePower = 67,
    /// Pushes `iter(tos)`.
    GetIter = 68,
    /// Resolves the iterable for `yield from`.
    GetYieldFromIter = 69,
    /// Prints the expression at the interactive prompt.
    PrintExpr = 70,
    /// Pushes `builtins.__build_class__`.
    LoadBuildClass = 71,
    /// Delegates to a sub-generator.
    YieldFrom = 72,
    /// Resolves the awaitable of top-of-stack.
    GetAwaitable = 73,
    /// In-place `<<=`.
    InplaceLshift = 75,
    /// In-place `>>=`.
    InplaceRshift = 76,
    /// In-place `&=`.
    InplaceAnd = 77,
    /// In-place `^=`.
    InplaceXor = 78,
    /// In-place `|=`.
    InplaceOr = 79,
    /// Begins cleanup of a `with` block.
    WithCleanupStart = 81,
    /// Finishes cleanup of a `with` block.
    WithCleanupFinish = 82,
    /// Returns top-of-stack to the caller.
    ReturnValue = 83,
    /// `from module import *`.
    ImportStar = 84,
    /// Sets up `__annotations__` in the local namespace.
    SetupAnnotations = 85,
    /// Yields top-of-stack from a generator.
    YieldValue = 86,
    /// Pops a block from the block stack.
    PopBlock = 87,
    /// Terminates a finally block.
    EndFinally = 88,
    /// Pops the exception state of the current except block.
    PopExcept = 89,
    /// Stores top-of-stack under `names[arg]` in the local namespace.
    StoreName = 90,
    /// Deletes `names[arg]` from the local namespace.
    DeleteName = 91,
    /// Unpacks an iterable of `arg` items onto the stack.
    UnpackSequence = 92,
    /// Advances the iterator below; jumps forward by `arg` on exhaustion.
    ForIter = 93,
    /// Unpacks an iterable with a starred target.
    UnpackEx = 94,
    /// Stores top-of-stack as attribute `names[arg]` of the item below.
    StoreAttr = 95,
    /// Deletes attribute `names[arg]` of top-of-stack.
    DeleteAttr = 96,
    /// Stores top-of-stack under `names[arg]` in the module namespace.
    StoreGlobal = 97,
    /// Deletes `names[arg]` from the module namespace.
    DeleteGlobal = 98,
    /// Pushes `consts[arg]`.
    LoadConst = 100,
    /// Pushes the value bound to `names[arg]`, searching enclosing scopes.
    LoadName = 101,
    /// Builds a tuple of `arg` items.
    BuildTuple = 102,
    /// Builds a list of `arg` items.
    BuildList = 103,
    /// Builds a set of `arg` items.
    BuildSet = 104,
    /// Builds a dict of `arg` key/value pairs.
    BuildMap = 105,
    /// Pushes attribute `names[arg]` of top-of-stack.
    LoadAttr = 106,
    /// Applies the comparison selected by `arg`.
    CompareOp = 107,
    /// Imports module `names[arg]`.
    ImportName = 108,
    /// Imports attribute `names[arg]` from the module on the stack.
    ImportFrom = 109,
    /// Unconditional relative jump by `arg` bytes.
    JumpForward = 110,
    /// Jumps to `arg` if top-of-stack is falsey, leaving it; pops otherwise.
    JumpIfFalseOrPop = 111,
    /// Jumps to `arg` if top-of-stack is truthy, leaving it; pops otherwise.
    JumpIfTrueOrPop = 112,
    /// Unconditional absolute jump to byte offset `arg`.
    JumpAbsolute = 113,
    /// Pops; jumps to `arg` if the popped value is falsey.
    PopJumpIfFalse = 114,
    /// Pops; jumps to `arg` if the popped value is truthy.
    PopJumpIfTrue = 115,
    /// Pushes the value bound to `names[arg]` in the module namespace.
    LoadGlobal = 116,
    /// Pushes a finally block onto the block stack.
    SetupFinally = 122,
    /// Pushes local slot `arg`.
    LoadFast = 124,
    /// Pops into local slot `arg`.
    StoreFast = 125,
    /// Unbinds local slot `arg`.
    DeleteFast = 126,
    /// Raises an exception with `arg` arguments.
    RaiseVarargs = 130,
    /// Calls a callable with `arg` positional arguments.
    CallFunction = 131,
    /// Makes a function object from code and qualname on the stack.
    MakeFunction = 132,
    /// Builds a slice of `arg` items.
    BuildSlice = 133,
    /// Pushes the cell for slot `arg`.
    LoadClosure = 135,
    /// Pushes the value held by cell slot `arg`.
    LoadDeref = 136,
    /// Pops into cell slot `arg`.
    StoreDeref = 137,
    /// Unbinds cell slot `arg`.
    DeleteDeref = 138,
    /// Calls a callable with keyword arguments named by a tuple.
    CallFunctionKw = 141,
    /// Calls a callable with argument unpacking.
    CallFunctionEx = 142,
    /// Sets up a `with` block.
    SetupWith = 143,
    /// Prefix extending the argument of the next opcode by one byte.
    ExtendedArg = 144,
    /// Appends top-of-stack to the list `arg` entries below.
    ListAppend = 145,
    /// Adds top-of-stack to the set `arg` entries below.
    SetAdd = 146,
    /// Inserts a key/value pair into the dict `arg` entries below.
    MapAdd = 147,
    /// Pushes a class-body reference to cell slot `arg`.
    LoadClassderef = 148,
    /// Builds a list by unpacking `arg` iterables.
    BuildListUnpack = 149,
    /// Builds a dict by unpacking `arg` mappings.
    BuildMapUnpack = 150,
    /// Builds a call-site dict by unpacking `arg` mappings.
    BuildMapUnpackWithCall = 151,
    /// Builds a tuple by unpacking `arg` iterables.
    BuildTupleUnpack = 152,
    /// Builds a set by unpacking `arg` iterables.
    BuildSetUnpack = 153,
    /// Sets up an `async with` block's finally.
    SetupAsyncWith = 154,
    /// Formats a value for an f-string.
    FormatValue = 155,
    /// Builds a dict with constant keys.
    BuildConstKeyMap = 156,
    /// Concatenates `arg` strings.
    BuildString = 157,
    /// Builds a call-site tuple by unpacking `arg` iterables.
    BuildTupleUnpackWithCall = 158,
    /// Pushes a bound method (or unbound fallback) for `names[arg]`.
    LoadMethod = 160,
    /// Calls the method pushed by [`Opcode::LoadMethod`].
    CallMethod = 161,
    /// Calls a finally block, pushing the return point.
    CallFinally = 162,
    /// Pops the finally block's return point.
    PopFinally = 163,

    /// [`Opcode::LoadAttr`] primed to specialize through its cache entry.
    LoadAttrAnamorphic = 170,
    /// [`Opcode::StoreAttr`] primed to specialize through its cache entry.
    StoreAttrAnamorphic = 171,
    /// [`Opcode::LoadMethod`] primed to specialize through its cache entry.
    LoadMethodAnamorphic = 172,
    /// Generic binary operator; `arg` holds the [`crate::BinaryOp`] tag.
    BinaryOpAnamorphic = 173,
    /// Generic in-place operator; `arg` holds the [`crate::BinaryOp`] tag.
    InplaceOpAnamorphic = 174,
    /// Ordered comparison primed to specialize; `arg` holds the
    /// [`crate::CompareOp`] tag.
    CompareOpAnamorphic = 175,
    /// Membership test primed to specialize through its cache entry.
    CompareInAnamorphic = 176,
    /// Identity test `is`; needs no cache.
    CompareIs = 177,
    /// Identity test `is not`; needs no cache.
    CompareIsNot = 178,
    /// Pushes a boolean singleton; truth is bit 7 of the operand byte.
    LoadBool = 179,
    /// Pushes the immediate value encoded in the operand byte.
    LoadImmediate = 180,
    /// [`Opcode::LoadFast`] with the slot measured from the frame top.
    LoadFastReverse = 181,
    /// [`Opcode::StoreFast`] with the slot measured from the frame top.
    StoreFastReverse = 182,
}

impl Opcode {
    /// Maps a raw byte to its opcode.
    ///
    /// Total: bytes outside the assigned numbering yield
    /// [`Opcode::Invalid`].
    pub const fn from_u8(b: u8) -> Self {
        use Opcode::*;
        match b {
            1 => PopTop,
            2 => RotTwo,
            3 => RotThree,
            4 => DupTop,
            5 => DupTopTwo,
            6 => RotFour,
            9 => Nop,
            10 => UnaryPositive,
            11 => UnaryNegative,
            12 => UnaryNot,
            15 => UnaryInvert,
            16 => BinaryMatrixMultiply,
            17 => InplaceMatrixMultiply,
            19 => BinaryPower,
            20 => BinaryMultiply,
            22 => BinaryModulo,
            23 => BinaryAdd,
            24 => BinarySubtract,
            25 => BinarySubscr,
            26 => BinaryFloorDivide,
            27 => BinaryTrueDivide,
            28 => InplaceFloorDivide,
            29 => InplaceTrueDivide,
            50 => GetAiter,
            51 => GetAnext,
            52 => BeforeAsyncWith,
            53 => BeginFinally,
            54 => EndAsyncFor,
            55 => InplaceAdd,
            56 => InplaceSubtract,
            57 => InplaceMultiply,
            59 => InplaceModulo,
            60 => StoreSubscr,
            61 => DeleteSubscr,
            62 => BinaryLshift,
            63 => BinaryRshift,
            64 => BinaryAnd,
            65 => BinaryXor,
            66 => BinaryOr,
            67 => InplacePower,
            68 => GetIter,
            69 => GetYieldFromIter,
            70 => PrintExpr,
            71 => LoadBuildClass,
            72 => YieldFrom,
            73 => GetAwaitable,
            75 => InplaceLshift,
            76 => InplaceRshift,
            77 => InplaceAnd,
            78 => InplaceXor,
            79 => InplaceOr,
            81 => WithCleanupStart,
            82 => WithCleanupFinish,
            83 => ReturnValue,
            84 => ImportStar,
            85 => SetupAnnotations,
            86 => YieldValue,
            87 => PopBlock,
            88 => EndFinally,
            89 => PopExcept,
            90 => StoreName,
            91 => DeleteName,
            92 => UnpackSequence,
            93 => ForIter,
            94 => UnpackEx,
            95 => StoreAttr,
            96 => DeleteAttr,
            97 => StoreGlobal,
            98 => DeleteGlobal,
            100 => LoadConst,
            101 => LoadName,
            102 => BuildTuple,
            103 => BuildList,
            104 => BuildSet,
            105 => BuildMap,
            106 => LoadAttr,
            107 => CompareOp,
            108 => ImportName,
            109 => ImportFrom,
            110 => JumpForward,
            111 => JumpIfFalseOrPop,
            112 => JumpIfTrueOrPop,
            113 => JumpAbsolute,
            114 => PopJumpIfFalse,
            115 => PopJumpIfTrue,
            116 => LoadGlobal,
            122 => SetupFinally,
            124 => LoadFast,
            125 => StoreFast,
            126 => DeleteFast,
            130 => RaiseVarargs,
            131 => CallFunction,
            132 => MakeFunction,
            133 => BuildSlice,
            135 => LoadClosure,
            136 => LoadDeref,
            137 => StoreDeref,
            138 => DeleteDeref,
            141 => CallFunctionKw,
            142 => CallFunctionEx,
            143 => SetupWith,
            144 => ExtendedArg,
            145 => ListAppend,
            146 => SetAdd,
            147 => MapAdd,
            148 => LoadClassderef,
            149 => BuildListUnpack,
            150 => BuildMapUnpack,
            151 => BuildMapUnpackWithCall,
            152 => BuildTupleUnpack,
            153 => BuildSetUnpack,
            154 => SetupAsyncWith,
            155 => FormatValue,
            156 => BuildConstKeyMap,
            157 => BuildString,
            158 => BuildTupleUnpackWithCall,
            160 => LoadMethod,
            161 => CallMethod,
            162 => CallFinally,
            163 => PopFinally,
            170 => LoadAttrAnamorphic,
            171 => StoreAttrAnamorphic,
            172 => LoadMethodAnamorphic,
            173 => BinaryOpAnamorphic,
            174 => InplaceOpAnamorphic,
            175 => CompareOpAnamorphic,
            176 => CompareInAnamorphic,
            177 => CompareIs,
            178 => CompareIsNot,
            179 => LoadBool,
            180 => LoadImmediate,
            181 => LoadFastReverse,
            182 => StoreFastReverse,
            _ => Invalid,
        }
    }

    /// The mnemonic of this opcode.
    pub fn name(&self) -> &'static str {
        (*self).into()
    }

    /// Whether this opcode is the extended-argument prefix.
    pub const fn is_extended_arg(&self) -> bool {
        matches!(self, Self::ExtendedArg)
    }

    /// Whether this opcode transfers control, conditionally or not.
    ///
    /// Iterator advance counts: it either falls through or jumps on
    /// exhaustion.
    pub const fn is_branch(&self) -> bool {
        matches!(
            self,
            Self::ForIter
                | Self::JumpAbsolute
                | Self::JumpForward
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
                | Self::PopJumpIfFalse
                | Self::PopJumpIfTrue
        )
    }

    /// Whether the branch argument is relative to the next instruction.
    pub const fn is_relative_branch(&self) -> bool {
        matches!(self, Self::ForIter | Self::JumpForward)
    }

    /// Whether this opcode returns from the function.
    pub const fn is_return(&self) -> bool {
        matches!(self, Self::ReturnValue)
    }

    /// Whether this opcode ends a basic block.
    pub const fn is_terminator(&self) -> bool {
        self.is_branch() || self.is_return()
    }
}

impl From<u8> for Opcode {
    fn from(b: u8) -> Self {
        Self::from_u8(b)
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
