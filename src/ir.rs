//! Representación intermedia compartida.
//!
//! Ambos front ends se reducen a una secuencia postfija de [`Operation`]
//! para una máquina de pila de bits. La secuencia es completa y su orden
//! es significativo; una vez producida no se modifica.

use std::fmt::{self, Display};

use crate::ast::Category;

/// Instrucción de la máquina de pila.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    ReadOutput,
    ReadFlag,
    ReadTimer,
    ReadInput,
    WriteOutput,
    WriteFlag,
    SetOutput,
    SetFlag,
    SetTimer,
    ResetOutput,
    ResetFlag,
    ResetTimer,
    OperationAnd,
    OperationOr,
    OperationNot,
}

/// Forma de acceso a una celda de la imagen de proceso.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Set,
    Reset,
}

impl Instruction {
    /// Instrucción que accede a una categoría de la forma indicada.
    ///
    /// Retorna `None` para combinaciones sin codificación en el objetivo,
    /// como escribir una entrada o asignar directamente un monoflop.
    pub fn for_access(access: Access, category: Category) -> Option<Instruction> {
        use {Access::*, Category::*, Instruction::*};

        let instruction = match (access, category) {
            (Read, Input) => ReadInput,
            (Read, Output) => ReadOutput,
            (Read, Monoflop) => ReadTimer,
            (Read, Flag) => ReadFlag,

            (Write, Output) => WriteOutput,
            (Write, Flag) => WriteFlag,

            (Set, Output) => SetOutput,
            (Set, Monoflop) => SetTimer,
            (Set, Flag) => SetFlag,

            (Reset, Output) => ResetOutput,
            (Reset, Monoflop) => ResetTimer,
            (Reset, Flag) => ResetFlag,

            (Write, Input) | (Write, Monoflop) | (Set, Input) | (Reset, Input) => return None,
        };

        Some(instruction)
    }

    /// Categoría y forma de acceso de una instrucción de E/S.
    pub fn access(self) -> Option<(Access, Category)> {
        use {Access::*, Category::*, Instruction::*};

        let access = match self {
            ReadInput => (Read, Input),
            ReadOutput => (Read, Output),
            ReadTimer => (Read, Monoflop),
            ReadFlag => (Read, Flag),
            WriteOutput => (Write, Output),
            WriteFlag => (Write, Flag),
            SetOutput => (Set, Output),
            SetTimer => (Set, Monoflop),
            SetFlag => (Set, Flag),
            ResetOutput => (Reset, Output),
            ResetTimer => (Reset, Monoflop),
            ResetFlag => (Reset, Flag),
            OperationAnd | OperationOr | OperationNot => return None,
        };

        Some(access)
    }

    /// Cambio neto en la profundidad de la pila al ejecutar la instrucción.
    pub fn stack_effect(self) -> isize {
        match self.access() {
            Some((Access::Read, _)) => 1,
            Some(_) => -1,
            None if self == Instruction::OperationNot => 0,
            None => -1,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        fmt.pad(match self {
            ReadOutput => "ReadOutput",
            ReadFlag => "ReadFlag",
            ReadTimer => "ReadTimer",
            ReadInput => "ReadInput",
            WriteOutput => "WriteOutput",
            WriteFlag => "WriteFlag",
            SetOutput => "SetOutput",
            SetFlag => "SetFlag",
            SetTimer => "SetTimer",
            ResetOutput => "ResetOutput",
            ResetFlag => "ResetFlag",
            ResetTimer => "ResetTimer",
            OperationAnd => "OperationAnd",
            OperationOr => "OperationOr",
            OperationNot => "OperationNot",
        })
    }
}

/// Una instrucción con su operando.
///
/// El operando es el índice de la celda dentro de su categoría; las
/// operaciones lógicas lo ignoran y se construyen con cero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operation {
    pub instruction: Instruction,
    pub argument: u32,
}

impl Operation {
    pub fn new(instruction: Instruction, argument: u32) -> Self {
        Operation {
            instruction,
            argument,
        }
    }

    /// Operación lógica sin operando.
    pub fn logic(instruction: Instruction) -> Self {
        Operation::new(instruction, 0)
    }
}

impl Display for Operation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instruction.access() {
            Some(_) => write!(fmt, "{:<12} {}", self.instruction, self.argument),
            None => write!(fmt, "{}", self.instruction),
        }
    }
}
