//! Control-flow graph construction for the bytecode optimizer.
//!
//! The builder partitions a rewritten instruction stream into basic blocks
//! at branches and fall-throughs, maps block start offsets to blocks, and
//! selects an entry block that is never a branch target, so initialization
//! code hoisted into it cannot run on every loop iteration. Translation of
//! bytecode blocks into IR operations is a later phase; see
//! [`optimize_function`].
//!
//! All blocks, registers, and the block map are owned by the [`Cfg`] and
//! dropped with it. Cross-references between them are ids, never owning
//! handles, so loops in the graph need no cycle breaking. The rewritten
//! bytecode itself is decoded into an owned [`BytecodeView`] and never
//! mutated.

use std::collections::{BTreeSet, HashMap};
use std::iter;

use itertools::Itertools;
use tracing::trace;

use serpent_bytecode::{next_op, Instr, Opcode, CODE_UNIT_SIZE};

use crate::error::OptimizeError;
use crate::function::Function;
use crate::object::Code;

/// Identifier of a basic block within its owning [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

impl BlockId {
    /// The numeric id.
    pub const fn id(&self) -> usize {
        self.0
    }
}

/// Identifier of a virtual register within its owning [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegisterId(usize);

impl RegisterId {
    /// The numeric id.
    pub const fn id(&self) -> usize {
        self.0
    }
}

/// An IR operation held by a basic block.
///
/// Control flow gets its own variant with a typed target; everything else
/// is the generic shape the translation phase will refine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrInstr {
    /// Unconditional transfer to another block.
    Branch {
        /// Block that receives control.
        target: BlockId,
    },
    /// A not-yet-specialized operation over virtual registers.
    Op {
        /// The bytecode operation this was lowered from.
        opcode: Opcode,
        /// Input registers in evaluation order.
        operands: Vec<RegisterId>,
    },
}

/// An ordered sequence of IR operations with a single entry point.
#[derive(Debug)]
pub struct BasicBlock {
    id: BlockId,
    instrs: Vec<IrInstr>,
}

impl BasicBlock {
    /// This block's id.
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Appends an operation.
    pub fn emit(&mut self, instr: IrInstr) {
        self.instrs.push(instr);
    }

    /// The operations emitted so far.
    pub fn instrs(&self) -> &[IrInstr] {
        &self.instrs
    }
}

/// A decoded instruction together with its location in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytecodeInstruction {
    instr: Instr,
    start: usize,
    end: usize,
}

impl BytecodeInstruction {
    /// The decoded operation.
    pub const fn instr(&self) -> Instr {
        self.instr
    }

    /// Opcode.
    pub const fn op(&self) -> Opcode {
        self.instr.op()
    }

    /// Fully assembled argument.
    pub const fn arg(&self) -> u32 {
        self.instr.arg()
    }

    /// Inline-cache index.
    pub const fn cache(&self) -> u16 {
        self.instr.cache()
    }

    /// Byte offset of this operation's first unit, prefixes included.
    pub const fn offset(&self) -> usize {
        self.start
    }

    /// Byte offset one past the terminal unit; relative branch targets are
    /// measured from here.
    pub const fn next_offset(&self) -> usize {
        self.end
    }

    /// Whether this operation transfers control.
    pub const fn is_branch(&self) -> bool {
        self.op().is_branch()
    }

    /// Whether this operation returns from the function.
    pub const fn is_return(&self) -> bool {
        self.op().is_return()
    }

    /// Whether this operation ends a basic block.
    pub const fn is_terminator(&self) -> bool {
        self.op().is_terminator()
    }

    /// The byte offset a branch transfers to, or `None` for non-branches.
    pub fn jump_target(&self) -> Option<usize> {
        if !self.is_branch() {
            return None;
        }
        if self.op().is_relative_branch() {
            Some(self.next_offset() + self.arg() as usize)
        } else {
            Some(self.arg() as usize)
        }
    }
}

/// The rewritten stream decoded into logical instructions.
#[derive(Debug, Clone)]
pub struct BytecodeView {
    instrs: Vec<BytecodeInstruction>,
}

impl BytecodeView {
    /// Decodes a rewritten (4-byte unit) stream.
    pub fn new(bytecode: &[u8]) -> Self {
        let num_units = bytecode.len() / CODE_UNIT_SIZE;
        let mut instrs = Vec::with_capacity(num_units);
        let mut index = 0;
        while index < num_units {
            let start = index * CODE_UNIT_SIZE;
            let instr = next_op(bytecode, &mut index);
            instrs.push(BytecodeInstruction {
                instr,
                start,
                end: index * CODE_UNIT_SIZE,
            });
        }
        Self { instrs }
    }

    /// The instruction at ordinal `index`.
    pub fn instr_at(&self, index: usize) -> BytecodeInstruction {
        self.instrs[index]
    }

    /// Number of logical instructions.
    pub fn num_instructions(&self) -> usize {
        self.instrs.len()
    }

    /// Iterates over the instructions in stream order.
    pub fn iter(&self) -> impl Iterator<Item = BytecodeInstruction> + '_ {
        self.instrs.iter().copied()
    }
}

/// Mapping between block start offsets, blocks, and instruction ranges.
#[derive(Debug, Default)]
pub struct BlockMap {
    by_offset: HashMap<usize, BlockId>,
    ranges: HashMap<BlockId, (usize, usize)>,
}

impl BlockMap {
    fn add_block(&mut self, start_idx: usize, end_idx: usize, block: BlockId, view: &BytecodeView) {
        let start_offset = view.instr_at(start_idx).offset();
        self.by_offset.insert(start_offset, block);
        self.ranges.insert(block, (start_idx, end_idx));
    }

    /// The block starting at the given byte offset.
    pub fn block_at_offset(&self, offset: usize) -> Option<BlockId> {
        self.by_offset.get(&offset).copied()
    }

    /// The half-open instruction-ordinal range covered by a block, or
    /// `None` for synthetic blocks with no bytecode slice.
    pub fn instr_range(&self, block: BlockId) -> Option<(usize, usize)> {
        self.ranges.get(&block).copied()
    }
}

/// A control-flow graph over one function's rewritten bytecode.
#[derive(Debug)]
pub struct Cfg {
    view: BytecodeView,
    blocks: Vec<BasicBlock>,
    num_registers: usize,
    block_map: BlockMap,
    entry: BlockId,
}

impl Cfg {
    /// Builds the block structure of a function.
    pub fn from_function(function: &Function) -> Self {
        Self::build(BytecodeView::new(function.rewritten_bytecode()))
    }

    /// Builds the block structure over an already-decoded view.
    pub fn build(view: BytecodeView) -> Self {
        let starts = block_starts(&view);
        let num_instrs = view.num_instructions();

        let mut blocks = Vec::new();
        let mut block_map = BlockMap::default();
        for (start_idx, end_idx) in starts
            .iter()
            .copied()
            .chain(iter::once(num_instrs))
            .tuple_windows()
        {
            let block = allocate_into(&mut blocks);
            block_map.add_block(start_idx, end_idx, block, &view);
        }

        // The entry must not be a loop header: if anything branches back to
        // offset 0, interpose a fresh block so hoisted initialization code
        // runs once.
        let first = block_map
            .block_at_offset(0)
            .expect("instruction 0 always starts a block");
        let entry = if view
            .iter()
            .any(|instr| instr.jump_target() == Some(0))
        {
            let entry = allocate_into(&mut blocks);
            blocks[entry.0].emit(IrInstr::Branch { target: first });
            entry
        } else {
            first
        };

        trace!(
            blocks = blocks.len(),
            instructions = num_instrs,
            "formed basic blocks"
        );

        Self {
            view,
            blocks,
            num_registers: 0,
            block_map,
            entry,
        }
    }

    /// The decoded instruction view the graph was built over.
    pub const fn view(&self) -> &BytecodeView {
        &self.view
    }

    /// Number of blocks, synthetic entry included.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The block with the given id.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    /// Mutable access to a block, for emitting instructions.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// The block map.
    pub const fn block_map(&self) -> &BlockMap {
        &self.block_map
    }

    /// The designated entry block. Never the target of any branch.
    pub const fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Allocates a fresh block with the next id.
    pub fn allocate_block(&mut self) -> BlockId {
        allocate_into(&mut self.blocks)
    }

    /// Allocates a fresh virtual register with the next id.
    pub fn allocate_register(&mut self) -> RegisterId {
        let register = RegisterId(self.num_registers);
        self.num_registers += 1;
        register
    }

    /// Number of registers allocated so far.
    pub const fn num_registers(&self) -> usize {
        self.num_registers
    }
}

fn allocate_into(blocks: &mut Vec<BasicBlock>) -> BlockId {
    let id = BlockId(blocks.len());
    blocks.push(BasicBlock {
        id,
        instrs: Vec::new(),
    });
    id
}

/// Instruction ordinals that begin basic blocks.
///
/// Ordinal 0 is always a start because execution enters from the top. A
/// branch both terminates the block before it and, by falling through,
/// starts one after it; a return only starts one after it.
fn block_starts(view: &BytecodeView) -> BTreeSet<usize> {
    let num_instrs = view.num_instructions();
    let mut starts = BTreeSet::from([0]);
    let add_next = |starts: &mut BTreeSet<usize>, idx: usize| {
        if idx + 1 < num_instrs {
            starts.insert(idx + 1);
        }
    };
    for (idx, instr) in view.iter().enumerate() {
        if instr.is_branch() {
            add_next(&mut starts, idx);
            starts.insert(idx);
        } else if instr.is_return() {
            add_next(&mut starts, idx);
        } else {
            debug_assert!(!instr.is_terminator(), "terminator must split a block");
        }
    }
    starts
}

/// Runs the optimizer front half over a function.
///
/// Builds the control-flow graph and stops there: lowering bytecode blocks
/// to IR operations, and IR back to bytecode, is not implemented, and this
/// reports that as an error instead of crashing.
pub fn optimize_function(function: &Function) -> Result<Code, OptimizeError> {
    let _cfg = Cfg::from_function(function);
    Err(OptimizeError::TranslationUnimplemented)
}
