//! Method bodies and structural editing
//!
//! [`BodyEditor`] is the only way the engine changes an instruction stream.
//! It keeps sequence points aligned with the instructions they describe and
//! recomputes the evaluation stack depth after every edit.

use crate::error::IrError;
use crate::opcode::Instruction;
use serde::{Deserialize, Serialize};

/// Source position attached to an instruction (debugging symbols)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequencePoint {
    /// Index of the instruction this point starts at
    pub offset: u32,
    /// Source document
    pub document: String,
    pub line: u32,
    pub column: u32,
}

/// Instruction stream of a method
///
/// Sequence points live in the symbol companion file, not in the module
/// artifact itself, so they are skipped by the module encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Ordered instructions
    pub instructions: Vec<Instruction>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Debugging information (loaded from the symbol companion)
    #[serde(skip)]
    pub sequence_points: Vec<SequencePoint>,
}

impl MethodBody {
    /// Body from an instruction list
    #[must_use]
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let mut body = Self {
            instructions,
            max_stack: 0,
            sequence_points: Vec::new(),
        };
        body.recompute_max_stack();
        body
    }

    /// Number of instructions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Recompute `max_stack` by walking the (branch-free) stream
    pub fn recompute_max_stack(&mut self) {
        let mut depth = 0usize;
        let mut max = 0usize;
        for instr in &self.instructions {
            let (pops, pushes) = instr.stack_effect();
            depth = depth.saturating_sub(pops) + pushes;
            max = max.max(depth);
        }
        self.max_stack = u16::try_from(max).unwrap_or(u16::MAX);
    }

    /// Open an editor on this body
    #[inline]
    pub fn editor(&mut self) -> BodyEditor<'_> {
        BodyEditor { body: self }
    }
}

/// Structural editor for a [`MethodBody`]
#[derive(Debug)]
pub struct BodyEditor<'a> {
    body: &'a mut MethodBody,
}

impl BodyEditor<'_> {
    /// Append instruction at the end
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.body.instructions.push(instruction);
        self.body.recompute_max_stack();
        self
    }

    /// Insert instructions so the first one lands at `index`
    ///
    /// Sequence points at or after `index` move with the instructions they
    /// describe.
    ///
    /// # Errors
    /// Returns [`IrError::InstructionOutOfRange`] if `index > len`
    pub fn insert_at(
        &mut self,
        index: usize,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Result<usize, IrError> {
        let len = self.body.instructions.len();
        if index > len {
            return Err(IrError::InstructionOutOfRange { index, len });
        }
        let tail = self.body.instructions.split_off(index);
        self.body.instructions.extend(instructions);
        let inserted = self.body.instructions.len() - index;
        self.body.instructions.extend(tail);

        let shift = u32::try_from(inserted).unwrap_or(u32::MAX);
        let start = u32::try_from(index).unwrap_or(u32::MAX);
        for point in &mut self.body.sequence_points {
            if point.offset >= start {
                point.offset = point.offset.saturating_add(shift);
            }
        }

        self.body.recompute_max_stack();
        Ok(inserted)
    }

    /// Insert instructions immediately after the instruction at `index`
    ///
    /// # Errors
    /// Returns [`IrError::InstructionOutOfRange`] if there is no instruction at `index`
    pub fn insert_after(
        &mut self,
        index: usize,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Result<usize, IrError> {
        let len = self.body.instructions.len();
        if index >= len {
            return Err(IrError::InstructionOutOfRange { index, len });
        }
        self.insert_at(index + 1, instructions)
    }

    /// Insert instructions immediately before the instruction at `index`
    ///
    /// # Errors
    /// Returns [`IrError::InstructionOutOfRange`] if there is no instruction at `index`
    pub fn insert_before(
        &mut self,
        index: usize,
        instructions: impl IntoIterator<Item = Instruction>,
    ) -> Result<usize, IrError> {
        let len = self.body.instructions.len();
        if index >= len {
            return Err(IrError::InstructionOutOfRange { index, len });
        }
        self.insert_at(index, instructions)
    }

    /// Insert instructions at the very start of the body
    pub fn prepend(&mut self, instructions: impl IntoIterator<Item = Instruction>) -> usize {
        // index 0 is always in range
        self.insert_at(0, instructions).unwrap_or(0)
    }

    /// Remove every instruction (and the sequence points describing them)
    pub fn clear(&mut self) -> &mut Self {
        self.body.instructions.clear();
        self.body.sequence_points.clear();
        self.body.max_stack = 0;
        self
    }

    /// Replace the whole body
    pub fn replace_all(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.clear();
        self.body.instructions.extend(instructions);
        self.body.recompute_max_stack();
    }

    /// Index of the first instruction matching `pred`
    #[must_use]
    pub fn position(&self, pred: impl Fn(&Instruction) -> bool) -> Option<usize> {
        self.body.instructions.iter().position(pred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{FieldRef, TypeSig};
    use pretty_assertions::assert_eq;

    fn backing() -> FieldRef {
        FieldRef {
            declaring_type: "Models.Item".parse().unwrap(),
            name: "<Name>k__BackingField".to_string(),
            field_type: TypeSig::String,
        }
    }

    fn point(offset: u32, line: u32) -> SequencePoint {
        SequencePoint {
            offset,
            document: "Item.cs".to_string(),
            line,
            column: 1,
        }
    }

    #[test]
    fn from_instructions_computes_stack() {
        let body = MethodBody::from_instructions(vec![
            Instruction::ldarg(0),
            Instruction::ldarg(1),
            Instruction::stfld(backing()),
            Instruction::ret(),
        ]);
        assert_eq!(body.max_stack, 2);
    }

    #[test]
    fn insert_after_places_block_and_shifts_points() {
        let mut body = MethodBody::from_instructions(vec![
            Instruction::ldarg(0),
            Instruction::ldstr("x"),
            Instruction::stfld(backing()),
            Instruction::ret(),
        ]);
        body.sequence_points = vec![point(0, 10), point(3, 11)];

        let inserted = body
            .editor()
            .insert_after(2, [Instruction::nop(), Instruction::nop()])
            .unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(body.instructions[3], Instruction::nop());
        assert_eq!(body.instructions[5], Instruction::ret());
        assert_eq!(body.sequence_points[0].offset, 0);
        assert_eq!(body.sequence_points[1].offset, 5);
    }

    #[test]
    fn insert_after_rejects_missing_anchor() {
        let mut body = MethodBody::from_instructions(vec![Instruction::ret()]);
        let err = body.editor().insert_after(1, [Instruction::nop()]).unwrap_err();
        assert!(matches!(err, IrError::InstructionOutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn insert_before_moves_anchor_point() {
        let mut body = MethodBody::from_instructions(vec![Instruction::ldarg(0), Instruction::ret()]);
        body.sequence_points = vec![point(1, 4)];
        body.editor().insert_before(1, [Instruction::pop()]).unwrap();
        assert_eq!(body.instructions[1], Instruction::pop());
        assert_eq!(body.sequence_points[0].offset, 2);
    }

    #[test]
    fn prepend_on_empty_body() {
        let mut body = MethodBody::default();
        body.editor().prepend([Instruction::ret()]);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn replace_all_drops_debug_points() {
        let mut body = MethodBody::from_instructions(vec![Instruction::ldarg(0), Instruction::ret()]);
        body.sequence_points = vec![point(0, 3)];
        body.editor().replace_all([Instruction::ldnull(), Instruction::ret()]);
        assert!(body.sequence_points.is_empty());
        assert_eq!(body.instructions[0], Instruction::ldnull());
        assert_eq!(body.max_stack, 1);
    }

    #[test]
    fn position_finds_first_match() {
        let mut body = MethodBody::from_instructions(vec![
            Instruction::ldarg(0),
            Instruction::stfld(backing()),
            Instruction::stfld(backing()),
        ]);
        let editor = body.editor();
        assert_eq!(editor.position(|i| i.stores(&backing())), Some(1));
    }
}
