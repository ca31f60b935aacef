//! Intérprete de la máquina de pila.
//!
//! El simulador mantiene una imagen de proceso con una celda booleana por
//! índice de cada categoría y ejecuta secuencias de [`Operation`] en orden
//! estricto sobre una pila de capacidad fija. Las fallas en este módulo
//! indican secuencias mal formadas; el compilador nunca las produce.

use log::trace;
use thiserror::Error;

use crate::{
    ast::Category,
    ir::{Access, Instruction, Operation},
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Stack overflow, capacity is {0}")]
    StackOverflow(usize),

    #[error("Pop from an empty stack")]
    StackEmpty,

    #[error("Index {index} of {category} is out of bounds ({len} cells)")]
    IndexOutOfBounds {
        category: Category,
        index: u32,
        len: usize,
    },

    #[error("Final stack depth is {depth}, expected {expected}")]
    InternalInconsistency { depth: usize, expected: usize },
}

/// Pila de capacidad fija.
#[derive(Debug, Clone)]
pub struct Stack<T, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> Stack<T, N> {
    pub fn new() -> Self {
        Stack {
            items: [T::default(); N],
            len: 0,
        }
    }

    pub fn push(&mut self, item: T) -> Result<(), Fault> {
        let slot = self.items.get_mut(self.len).ok_or(Fault::StackOverflow(N))?;
        *slot = item;
        self.len += 1;

        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, Fault> {
        self.len = self.len.checked_sub(1).ok_or(Fault::StackEmpty)?;
        Ok(self.items[self.len])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<T: Copy + Default, const N: usize> Default for Stack<T, N> {
    fn default() -> Self {
        Stack::new()
    }
}

/// Imagen de proceso e intérprete.
///
/// Las celdas se crean en el primer acceso y comienzan en `false`.
#[derive(Debug, Clone)]
pub struct Simulator {
    image: [Vec<Option<bool>>; 4],
}

impl Simulator {
    /// Crea una imagen con la cantidad de celdas indicada por categoría.
    pub fn new(inputs: usize, outputs: usize, flags: usize, monoflops: usize) -> Self {
        let mut image: [Vec<Option<bool>>; 4] = Default::default();
        image[slot(Category::Input)] = vec![None; inputs];
        image[slot(Category::Output)] = vec![None; outputs];
        image[slot(Category::Flag)] = vec![None; flags];
        image[slot(Category::Monoflop)] = vec![None; monoflops];

        Simulator { image }
    }

    /// Acceso de lectura y escritura a una celda.
    pub fn io(&mut self, category: Category, index: u32) -> Result<&mut bool, Fault> {
        let cells = &mut self.image[slot(category)];
        let len = cells.len();

        let cell = cells
            .get_mut(index as usize)
            .ok_or(Fault::IndexOutOfBounds {
                category,
                index,
                len,
            })?;

        Ok(cell.get_or_insert(false))
    }

    /// Valor actual de una celda.
    pub fn get(&mut self, category: Category, index: u32) -> Result<bool, Fault> {
        self.io(category, index).map(|cell| *cell)
    }

    pub fn set(&mut self, category: Category, index: u32, value: bool) -> Result<(), Fault> {
        *self.io(category, index)? = value;
        Ok(())
    }

    /// Cantidad de celdas configuradas para una categoría.
    pub fn len(&self, category: Category) -> usize {
        self.image[slot(category)].len()
    }

    /// Limpia toda celda que ya se haya creado.
    pub fn reset_all(&mut self) {
        for cell in self.image.iter_mut().flatten().flatten() {
            *cell = false;
        }
    }

    /// Evalúa una expresión compilada y retorna su resultado.
    ///
    /// La secuencia debe dejar exactamente un valor en la pila.
    pub fn execute<const N: usize>(&mut self, operations: &[Operation]) -> Result<bool, Fault> {
        let mut stack = self.interpret::<N>(operations)?;
        if stack.len() != 1 {
            return Err(Fault::InternalInconsistency {
                depth: stack.len(),
                expected: 1,
            });
        }

        stack.pop()
    }

    /// Ejecuta un programa completo cuyas ecuaciones almacenan su resultado.
    ///
    /// La secuencia debe dejar la pila vacía.
    pub fn run<const N: usize>(&mut self, operations: &[Operation]) -> Result<(), Fault> {
        let stack = self.interpret::<N>(operations)?;
        if !stack.is_empty() {
            return Err(Fault::InternalInconsistency {
                depth: stack.len(),
                expected: 0,
            });
        }

        Ok(())
    }

    fn interpret<const N: usize>(&mut self, operations: &[Operation]) -> Result<Stack<bool, N>, Fault> {
        let mut stack = Stack::new();
        for &operation in operations {
            trace!("step {} (depth {})", operation, stack.len());
            self.step(&mut stack, operation)?;
        }

        Ok(stack)
    }

    fn step<const N: usize>(&mut self, stack: &mut Stack<bool, N>, operation: Operation) -> Result<(), Fault> {
        use {Category::*, Instruction::*};

        let argument = operation.argument;
        match operation.instruction {
            ReadInput => self.read(stack, Input, argument),
            ReadOutput => self.read(stack, Output, argument),
            ReadFlag => self.read(stack, Flag, argument),
            ReadTimer => self.read(stack, Monoflop, argument),

            WriteOutput => self.store(stack, Access::Write, Output, argument),
            WriteFlag => self.store(stack, Access::Write, Flag, argument),

            SetOutput => self.store(stack, Access::Set, Output, argument),
            SetFlag => self.store(stack, Access::Set, Flag, argument),
            SetTimer => self.store(stack, Access::Set, Monoflop, argument),

            ResetOutput => self.store(stack, Access::Reset, Output, argument),
            ResetFlag => self.store(stack, Access::Reset, Flag, argument),
            ResetTimer => self.store(stack, Access::Reset, Monoflop, argument),

            OperationAnd => {
                let (right, left) = (stack.pop()?, stack.pop()?);
                stack.push(left & right)
            }

            OperationOr => {
                let (right, left) = (stack.pop()?, stack.pop()?);
                stack.push(left | right)
            }

            OperationNot => {
                let value = stack.pop()?;
                stack.push(!value)
            }
        }
    }

    fn read<const N: usize>(&mut self, stack: &mut Stack<bool, N>, category: Category, index: u32) -> Result<(), Fault> {
        let value = *self.io(category, index)?;
        stack.push(value)
    }

    fn store<const N: usize>(
        &mut self,
        stack: &mut Stack<bool, N>,
        access: Access,
        category: Category,
        index: u32,
    ) -> Result<(), Fault> {
        let value = stack.pop()?;
        let cell = self.io(category, index)?;

        match access {
            Access::Set if value => *cell = true,
            Access::Reset if value => *cell = false,
            Access::Set | Access::Reset => (),
            Access::Write | Access::Read => *cell = value,
        }

        Ok(())
    }
}

fn slot(category: Category) -> usize {
    match category {
        Category::Input => 0,
        Category::Output => 1,
        Category::Flag => 2,
        Category::Monoflop => 3,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use Instruction::*;

    fn op(instruction: Instruction, argument: u32) -> Operation {
        Operation::new(instruction, argument)
    }

    fn logic(instruction: Instruction) -> Operation {
        Operation::logic(instruction)
    }

    #[test]
    fn stack_when_capacity_exceeded_then_overflow() {
        let mut stack = Stack::<bool, 2>::new();

        stack.push(true).unwrap();
        stack.push(false).unwrap();
        assert_eq!(stack.push(true), Err(Fault::StackOverflow(2)));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn stack_when_popped_past_bottom_then_empty() {
        let mut stack = Stack::<u8, 4>::new();

        stack.push(7).unwrap();
        assert_eq!(stack.pop(), Ok(7));
        assert_eq!(stack.pop(), Err(Fault::StackEmpty));
        assert!(stack.is_empty());
    }

    #[test]
    fn io_when_index_past_configured_count_then_out_of_bounds() {
        let mut simulator = Simulator::new(2, 1, 0, 0);

        let error = simulator.io(Category::Input, 2).unwrap_err();
        assert_eq!(
            error,
            Fault::IndexOutOfBounds {
                category: Category::Input,
                index: 2,
                len: 2
            }
        );

        assert!(simulator.io(Category::Flag, 0).is_err());
    }

    #[test]
    fn io_when_first_access_then_cell_starts_false() {
        let mut simulator = Simulator::new(4, 0, 0, 0);

        assert_eq!(simulator.get(Category::Input, 3), Ok(false));
        *simulator.io(Category::Input, 3).unwrap() = true;
        assert_eq!(simulator.get(Category::Input, 3), Ok(true));
        assert_eq!(simulator.len(Category::Input), 4);
    }

    #[test]
    fn execute_when_well_formed_then_single_result() {
        let mut simulator = Simulator::new(2, 0, 0, 0);
        let operations = [
            op(ReadInput, 0),
            op(ReadInput, 1),
            logic(OperationNot),
            logic(OperationAnd),
        ];

        simulator.set(Category::Input, 0, true).unwrap();
        assert_eq!(simulator.execute::<8>(&operations), Ok(true));

        simulator.set(Category::Input, 1, true).unwrap();
        assert_eq!(simulator.execute::<8>(&operations), Ok(false));
    }

    #[test]
    fn execute_when_combinator_missing_then_internal_inconsistency() {
        let mut simulator = Simulator::new(2, 0, 0, 0);
        let operations = [op(ReadInput, 0), op(ReadInput, 1)];

        assert_eq!(
            simulator.execute::<8>(&operations),
            Err(Fault::InternalInconsistency {
                depth: 2,
                expected: 1
            })
        );
    }

    #[test]
    fn execute_when_sequence_empty_then_internal_inconsistency() {
        let mut simulator = Simulator::new(0, 0, 0, 0);

        assert!(matches!(
            simulator.execute::<8>(&[]),
            Err(Fault::InternalInconsistency { depth: 0, .. })
        ));
    }

    #[test]
    fn execute_when_too_many_reads_then_stack_overflow() {
        let mut simulator = Simulator::new(3, 0, 0, 0);
        let operations = [op(ReadInput, 0), op(ReadInput, 1), op(ReadInput, 2)];

        assert_eq!(simulator.execute::<2>(&operations), Err(Fault::StackOverflow(2)));
    }

    #[test]
    fn execute_when_combinator_without_operands_then_stack_empty() {
        let mut simulator = Simulator::new(1, 0, 0, 0);
        let operations = [op(ReadInput, 0), logic(OperationOr)];

        assert_eq!(simulator.execute::<8>(&operations), Err(Fault::StackEmpty));
    }

    #[test]
    fn run_when_stores_then_write_set_reset_semantics() {
        let mut simulator = Simulator::new(2, 3, 0, 0);
        simulator.set(Category::Input, 0, true).unwrap();
        simulator.set(Category::Output, 2, true).unwrap();

        let operations = [
            op(ReadInput, 1),
            op(WriteOutput, 0),
            op(ReadInput, 1),
            op(SetOutput, 1),
            op(ReadInput, 1),
            op(ResetOutput, 2),
        ];

        simulator.run::<4>(&operations).unwrap();
        assert_eq!(simulator.get(Category::Output, 0), Ok(false));
        assert_eq!(simulator.get(Category::Output, 1), Ok(false));
        assert_eq!(simulator.get(Category::Output, 2), Ok(true));

        let operations = [
            op(ReadInput, 0),
            op(SetOutput, 1),
            op(ReadInput, 0),
            op(ResetOutput, 2),
        ];

        simulator.run::<4>(&operations).unwrap();
        assert_eq!(simulator.get(Category::Output, 1), Ok(true));
        assert_eq!(simulator.get(Category::Output, 2), Ok(false));
    }

    #[test]
    fn run_when_value_left_on_stack_then_internal_inconsistency() {
        let mut simulator = Simulator::new(1, 0, 0, 0);

        assert!(matches!(
            simulator.run::<4>(&[op(ReadInput, 0)]),
            Err(Fault::InternalInconsistency { depth: 1, expected: 0 })
        ));
    }

    #[test]
    fn reset_all_when_cells_set_then_all_false() {
        let mut simulator = Simulator::new(1, 1, 1, 1);
        for category in Category::ALL {
            simulator.set(category, 0, true).unwrap();
        }

        simulator.reset_all();
        for category in Category::ALL {
            assert_eq!(simulator.get(category, 0), Ok(false));
        }
    }
}
