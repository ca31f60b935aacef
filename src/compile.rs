//! Generación de la representación intermedia.
//!
//! Hay dos rutas hacia la misma secuencia de [`Operation`]: un recorrido
//! en postorden de árboles de [`Expression`] y una traducción directa,
//! línea por línea, de listados AWL. Ambas entregan cada operación a un
//! callback conforme se genera.

use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::{
        Assignment, Category, ExprId, Expression, Operand, Operator, Program, SemanticError,
        SymbolTable, Unary, VarId, MAX_DEPTH,
    },
    awl::{AwlInstruction, AwlProgram},
    ir::{Access, Instruction, Operation},
    lex::Identifier,
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Access `{access:?}` has no encoding for {category} `{name}`")]
    UnsupportedCombination {
        access: Access,
        category: Category,
        name: Identifier,
    },

    #[error("Expression {0} contains an empty term")]
    EmptyTerm(ExprId),

    #[error("Expression {0} is malformed")]
    MalformedExpression(ExprId),

    #[error("Instruction `{0}` requires an argument")]
    MissingArgument(&'static str),

    #[error("Expression is nested too deeply, maximum depth is 256")]
    NestingTooDeep,

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

pub type Compile<T> = Result<T, CompileError>;

/// Genera las operaciones que evalúan una expresión.
///
/// La secuencia deja exactamente un valor en la pila: el resultado.
pub fn compile_expression<F>(symbols: &SymbolTable, expression: &Expression, mut emit: F) -> Compile<()>
where
    F: FnMut(Operation),
{
    walk(symbols, expression, &mut emit, 0)
}

/// Genera la ecuación de una variable, incluyendo su almacenamiento.
pub fn compile_equation<F>(program: &Program, variable: VarId, mut emit: F) -> Compile<()>
where
    F: FnMut(Operation),
{
    let expression = program.equation(variable).ok_or_else(|| {
        let name = program.variable(variable).name().clone();
        SemanticError::MissingEquation(name)
    })?;

    equation(program.symbols(), variable, expression, &mut emit)
}

/// Genera todas las ecuaciones de un programa, en orden de declaración.
pub fn compile_program(program: &Program) -> Compile<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut emit = |operation: Operation| {
        trace!("emit {}", operation);
        operations.push(operation);
    };

    for (_, expression) in program.equations() {
        let variable = expression
            .variable()
            .ok_or(CompileError::MalformedExpression(expression.id()))?;

        equation(program.symbols(), variable, expression, &mut emit)?;
    }

    debug!("compiled program into {} operations", operations.len());
    Ok(operations)
}

/// Traduce un listado AWL completo.
pub fn compile_awl(program: &AwlProgram) -> Compile<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut emit = |operation: Operation| {
        trace!("emit {}", operation);
        operations.push(operation);
    };

    let symbols = program.symbols();
    for line in program.listing() {
        let (access, combinator) = match line.instruction {
            AwlInstruction::Read => (Access::Read, None),
            AwlInstruction::Write => (Access::Write, None),
            AwlInstruction::Set => (Access::Set, None),
            AwlInstruction::Reset => (Access::Reset, None),
            AwlInstruction::And => (Access::Read, Some(Instruction::OperationAnd)),
            AwlInstruction::Or => (Access::Read, Some(Instruction::OperationOr)),
            AwlInstruction::Not => (Access::Read, Some(Instruction::OperationNot)),
        };

        match line.argument {
            // Lectura simple, o lectura antes de combinar
            Some(variable) if access == Access::Read => {
                access_variable(symbols, access, variable, &mut emit)?;
                if line.inversion {
                    emit(Operation::logic(Instruction::OperationNot));
                }
            }

            // Almacena el valor en el tope de la pila
            Some(variable) => {
                if line.inversion {
                    emit(Operation::logic(Instruction::OperationNot));
                }

                access_variable(symbols, access, variable, &mut emit)?;
            }

            None if combinator.is_none() => {
                return Err(CompileError::MissingArgument(line.instruction.name()))
            }

            None => (),
        }

        if let Some(combinator) = combinator {
            emit(Operation::logic(combinator));
        }
    }

    debug!("compiled AWL listing into {} operations", operations.len());
    Ok(operations)
}

fn equation<F>(symbols: &SymbolTable, variable: VarId, expression: &Expression, emit: &mut F) -> Compile<()>
where
    F: FnMut(Operation),
{
    walk(symbols, expression, emit, 0)?;

    let access = match expression.assignment() {
        Assignment::Assign => Access::Write,
        Assignment::Set => Access::Set,
        Assignment::Reset => Access::Reset,
    };

    access_variable(symbols, access, variable, emit)
}

fn walk<F>(symbols: &SymbolTable, expression: &Expression, emit: &mut F, depth: usize) -> Compile<()>
where
    F: FnMut(Operation),
{
    if depth >= MAX_DEPTH {
        return Err(CompileError::NestingTooDeep);
    }

    let terms = expression.terms();
    let combinator = match expression.operator() {
        Operator::And => Some(Instruction::OperationAnd),
        Operator::Or => Some(Instruction::OperationOr),
        Operator::None | Operator::Timer => None,
    };

    // Sin combinador solo cabe un término
    if terms.is_empty() || (combinator.is_none() && terms.len() > 1) {
        return Err(CompileError::MalformedExpression(expression.id()));
    }

    for (position, term) in terms.iter().enumerate() {
        match term.operand() {
            Operand::Empty => return Err(CompileError::EmptyTerm(expression.id())),
            Operand::Identifier(variable) => access_variable(symbols, Access::Read, *variable, emit)?,
            Operand::Expression(inner) => walk(symbols, inner, emit, depth + 1)?,
        }

        if term.unary() == Unary::Not {
            emit(Operation::logic(Instruction::OperationNot));
        }

        if let (true, Some(combinator)) = (position > 0, combinator) {
            emit(Operation::logic(combinator));
        }
    }

    Ok(())
}

fn access_variable<F>(symbols: &SymbolTable, access: Access, variable: VarId, emit: &mut F) -> Compile<()>
where
    F: FnMut(Operation),
{
    let variable = symbols.get(variable);
    let category = variable.category();

    let instruction = Instruction::for_access(access, category).ok_or_else(|| {
        CompileError::UnsupportedCombination {
            access,
            category,
            name: variable.name().clone(),
        }
    })?;

    emit(Operation::new(instruction, variable.index()));
    Ok(())
}
