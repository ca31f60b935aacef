//! Árbol sintáctico y tabla de símbolos.
//!
//! Un [`Program`] es dueño de todas las variables declaradas y de, a lo
//! sumo, una ecuación por variable. Las ecuaciones son árboles n-arios de
//! [`Expression`] cuyos términos hacen referencia a variables por medio de
//! [`VarId`], un índice estable en la [`SymbolTable`], en vez de punteros.

use std::{
    cell::Cell,
    collections::{BTreeMap, HashMap},
    fmt::{self, Display},
};

use bitflags::bitflags;
use thiserror::Error;

use crate::lex::Identifier;

/// Profundidad máxima de árboles que se recorren recursivamente.
pub const MAX_DEPTH: usize = 256;

/// Error semántico, detectado al declarar o utilizar un símbolo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Variable `{0}` already declared")]
    DuplicateVariable(Identifier),

    #[error("Variable `{0}` does not exist")]
    UnknownVariable(Identifier),

    #[error("Two equations are assigned to variable `{0}`")]
    DuplicateEquation(Identifier),

    #[error("Variable `{0}` has no equation")]
    MissingEquation(Identifier),

    #[error("Time value overflow for `{0}`, max is 131070 s")]
    TimeOverflow(Identifier),

    #[error("Index of `{0}` is out of range")]
    IndexOverflow(Identifier),

    #[error("Invalid argument for instruction `{instruction}`: {reason}")]
    InvalidInstructionArgument {
        instruction: &'static str,
        reason: String,
    },

    #[error("Equation of `{0}` depends on itself")]
    CyclicDependency(Identifier),

    #[error("Dependencies of `{0}` are nested too deeply")]
    NestingTooDeep(Identifier),
}

/// Tipo de bit direccionable en el controlador.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Input,
    Output,
    Monoflop,
    Flag,
}

impl Category {
    /// Todas las categorías, en orden de declaración canónico.
    pub const ALL: [Category; 4] = [
        Category::Input,
        Category::Output,
        Category::Monoflop,
        Category::Flag,
    ];

    /// Conjunto unitario de esta categoría.
    pub fn set(self) -> CategorySet {
        match self {
            Category::Input => CategorySet::INPUT,
            Category::Output => CategorySet::OUTPUT,
            Category::Monoflop => CategorySet::MONOFLOP,
            Category::Flag => CategorySet::FLAG,
        }
    }
}

impl Display for Category {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Category::Input => "input",
            Category::Output => "output",
            Category::Monoflop => "monoflop",
            Category::Flag => "flag",
        })
    }
}

bitflags! {
    /// Conjunto de categorías, usado para restringir argumentos.
    pub struct CategorySet: u8 {
        const INPUT = 0x01;
        const OUTPUT = 0x02;
        const MONOFLOP = 0x04;
        const FLAG = 0x08;
    }
}

impl CategorySet {
    /// Determina si una categoría pertenece al conjunto.
    pub fn allows(self, category: Category) -> bool {
        self.contains(category.set())
    }
}

/// Identidad de una variable dentro de su tabla de símbolos.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

/// Una variable declarada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    name: Identifier,
    category: Category,
    index: u32,
    time: u32,
}

impl Variable {
    pub fn new(name: Identifier, category: Category, index: u32) -> Self {
        let time = match category {
            Category::Monoflop => DEFAULT_TIME,
            _ => 0,
        };

        Variable {
            name,
            category,
            index,
            time,
        }
    }

    /// Establece la duración de un monoflop, en la base de tiempo del hardware.
    pub fn with_time(self, time: u32) -> Self {
        Variable { time, ..self }
    }

    pub fn name(&self) -> &Identifier {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Posición dentro de su categoría; es también el operando en bytecode.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn time(&self) -> u32 {
        self.time
    }
}

/// Duración de un monoflop cuando no se especifica una (60 s).
pub const DEFAULT_TIME: u32 = 30;

/// Conjunto de variables declaradas, con búsqueda por nombre.
#[derive(Default, Debug, Clone)]
pub struct SymbolTable {
    variables: Vec<Variable>,
    names: HashMap<Identifier, VarId>,
}

impl SymbolTable {
    /// Agrega una variable, fallando si el nombre ya existe.
    pub fn declare(&mut self, variable: Variable) -> Result<VarId, SemanticError> {
        if self.names.contains_key(variable.name()) {
            return Err(SemanticError::DuplicateVariable(variable.name().clone()));
        }

        let id = VarId(self.variables.len());
        self.names.insert(variable.name().clone(), id);
        self.variables.push(variable);

        Ok(id)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<VarId> {
        self.names.get(name).copied()
    }

    /// Busca una variable por nombre.
    pub fn lookup(&self, name: &str) -> Result<VarId, SemanticError> {
        self.find(name)
            .ok_or_else(|| SemanticError::UnknownVariable(Identifier::from(name)))
    }

    /// Obtiene una variable.
    ///
    /// # Panics
    /// Si `id` no proviene de esta misma tabla.
    pub fn get(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    /// Todas las variables, en orden de declaración.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| (VarId(index), variable))
    }

    /// Variables de una misma categoría, en orden de declaración.
    pub fn of_category(&self, category: Category) -> impl Iterator<Item = (VarId, &Variable)> {
        self.iter()
            .filter(move |(_, variable)| variable.category() == category)
    }

    /// Índice máximo usado por una categoría, si hay alguna variable de ella.
    pub fn max_index(&self, category: Category) -> Option<u32> {
        self.of_category(category)
            .map(|(_, variable)| variable.index())
            .max()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Identificador único de una expresión dentro de un programa.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

impl Display for ExprId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "#{}", self.0)
    }
}

/// Operador unario aplicado a un término.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unary {
    None,
    Not,
}

impl Unary {
    fn toggle(self) -> Self {
        match self {
            Unary::None => Unary::Not,
            Unary::Not => Unary::None,
        }
    }
}

/// Contenido de un término.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Empty,
    Identifier(VarId),
    Expression(Box<Expression>),
}

/// Un término: operando más operador unario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    unary: Unary,
    operand: Operand,
}

impl Term {
    pub fn empty() -> Self {
        Term {
            unary: Unary::None,
            operand: Operand::Empty,
        }
    }

    pub fn identifier(variable: VarId) -> Self {
        Term {
            unary: Unary::None,
            operand: Operand::Identifier(variable),
        }
    }

    pub fn expression(expression: Expression) -> Self {
        Term {
            unary: Unary::None,
            operand: Operand::Expression(Box::new(expression)),
        }
    }

    pub fn unary(&self) -> Unary {
        self.unary
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub(crate) fn operand_mut(&mut self) -> &mut Operand {
        &mut self.operand
    }

    /// Invierte el operador unario (`!!a` equivale a `a`).
    pub fn reverse_unary(&mut self) {
        self.unary = self.unary.toggle();
    }

    /// Variable referida, si el término es un identificador.
    pub fn variable(&self) -> Option<VarId> {
        match self.operand {
            Operand::Identifier(variable) => Some(variable),
            _ => None,
        }
    }

    /// Subexpresión, si el término la tiene.
    pub fn sub_expression(&self) -> Option<&Expression> {
        match &self.operand {
            Operand::Expression(expression) => Some(expression),
            _ => None,
        }
    }
}

/// Operador n-ario de una expresión.
///
/// El orden de declaración es el de precedencia, menor primero.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operator {
    None,
    Or,
    And,
    Timer,
}

/// Tipo de asignación de una ecuación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// `=`
    Assign,

    /// `+=`
    Set,

    /// `-=`
    Reset,
}

impl Display for Assignment {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Assignment::Assign => "=",
            Assignment::Set => "+=",
            Assignment::Reset => "-=",
        })
    }
}

/// Secuencia ordenada de términos combinados por un mismo operador.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    id: ExprId,
    operator: Operator,
    terms: Vec<Term>,
    variable: Option<VarId>,
    assignment: Assignment,
}

impl Expression {
    pub fn new(id: ExprId) -> Self {
        Expression {
            id,
            operator: Operator::None,
            terms: Vec::new(),
            variable: None,
            assignment: Assignment::Assign,
        }
    }

    pub fn with_term(id: ExprId, term: Term, operator: Operator) -> Self {
        let mut expression = Expression::new(id);
        expression.operator = operator;
        expression.terms.push(term);
        expression
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn set_operator(&mut self, operator: Operator) {
        self.operator = operator;
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub(crate) fn terms_mut(&mut self) -> &mut [Term] {
        &mut self.terms
    }

    pub fn add_term(&mut self, term: Term) {
        self.terms.push(term);
    }

    /// Variable de la cual esta expresión es ecuación, si alguna.
    pub fn variable(&self) -> Option<VarId> {
        self.variable
    }

    pub fn set_variable(&mut self, variable: Option<VarId>) {
        self.variable = variable;
    }

    pub fn assignment(&self) -> Assignment {
        self.assignment
    }

    pub fn set_assignment(&mut self, assignment: Assignment) {
        self.assignment = assignment;
    }

    /// Una expresión está vacía a menos que tenga exactamente un término sin
    /// operador, o al menos un término con operador.
    pub fn is_empty(&self) -> bool {
        !match self.operator {
            Operator::None => self.terms.len() == 1,
            _ => !self.terms.is_empty(),
        }
    }

    /// Una expresión es simple si ninguno de sus términos es una subexpresión.
    pub fn is_simple(&self) -> bool {
        self.terms
            .iter()
            .all(|term| matches!(term.operand, Operand::Identifier(_)))
    }

    /// Cantidad de niveles de anidamiento, contando a esta expresión.
    pub fn count_levels(&self) -> usize {
        let inner = self
            .terms
            .iter()
            .filter_map(Term::sub_expression)
            .map(Expression::count_levels)
            .max()
            .unwrap_or(0);

        1 + inner
    }

    /// Cuenta las ocurrencias de cada variable en hojas del árbol.
    pub fn count_inputs(&self, inputs: &mut HashMap<VarId, u32>) {
        for term in &self.terms {
            match &term.operand {
                Operand::Identifier(variable) => *inputs.entry(*variable).or_insert(0) += 1,
                Operand::Expression(expression) => expression.count_inputs(inputs),
                Operand::Empty => (),
            }
        }
    }

    /// Reemplaza una raíz redundante por su única subexpresión.
    ///
    /// Aplica solo si esta expresión no tiene operador y su único término
    /// es una subexpresión no invertida. Se conservan identidad, variable
    /// y tipo de asignación de la raíz.
    pub fn pull_up_first_term(&mut self) {
        let redundant = self.operator == Operator::None
            && self.terms.len() == 1
            && self.terms[0].unary == Unary::None
            && matches!(self.terms[0].operand, Operand::Expression(_));

        if !redundant {
            return;
        }

        if let Some(Term {
            operand: Operand::Expression(inner),
            ..
        }) = self.terms.pop()
        {
            let Expression {
                operator, terms, ..
            } = *inner;

            self.operator = operator;
            self.terms = terms;
        }
    }
}

/// Raíz del árbol sintáctico: tabla de símbolos y ecuaciones.
#[derive(Debug)]
pub struct Program {
    symbols: SymbolTable,
    equations: BTreeMap<VarId, Expression>,
    last_id: Cell<u32>,
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            symbols: SymbolTable::default(),
            equations: BTreeMap::new(),
            last_id: Cell::new(0),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    /// Reserva el siguiente identificador de expresión de este programa.
    ///
    /// Los identificadores comienzan en 1 y nunca se reutilizan.
    pub fn next_id(&self) -> ExprId {
        let id = self.last_id.get() + 1;
        self.last_id.set(id);
        ExprId(id)
    }

    /// Último identificador reservado, o 0 si no se ha reservado alguno.
    pub fn last_id(&self) -> ExprId {
        ExprId(self.last_id.get())
    }

    /// Asocia una ecuación a una variable.
    pub fn add_equation(
        &mut self,
        variable: VarId,
        mut expression: Expression,
    ) -> Result<(), SemanticError> {
        if self.equations.contains_key(&variable) {
            let name = self.symbols.get(variable).name().clone();
            return Err(SemanticError::DuplicateEquation(name));
        }

        expression.set_variable(Some(variable));
        self.equations.insert(variable, expression);

        Ok(())
    }

    pub fn equation(&self, variable: VarId) -> Option<&Expression> {
        self.equations.get(&variable)
    }

    /// Ecuación de una variable por nombre.
    pub fn equation_of(&self, name: &str) -> Result<&Expression, SemanticError> {
        let variable = self.symbols.lookup(name)?;
        self.equation(variable)
            .ok_or_else(|| SemanticError::MissingEquation(Identifier::from(name)))
    }

    /// Todas las ecuaciones, en orden de declaración de sus variables.
    pub fn equations(&self) -> impl Iterator<Item = (&Variable, &Expression)> {
        self.equations
            .iter()
            .map(move |(variable, expression)| (self.symbols.get(*variable), expression))
    }

    pub fn variables_of(&self, category: Category) -> impl Iterator<Item = &Variable> {
        self.symbols
            .of_category(category)
            .map(|(_, variable)| variable)
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        self.symbols.get(id)
    }

    /// Adaptador para mostrar una expresión con nombres de variables.
    pub fn display<'a>(&'a self, expression: &'a Expression) -> impl Display + 'a {
        ExpressionDisplay {
            program: self,
            expression,
            root: true,
        }
    }
}

/// La raíz se muestra sin paréntesis: `a | (b & c)`.
struct ExpressionDisplay<'a> {
    program: &'a Program,
    expression: &'a Expression,
    root: bool,
}

impl Display for ExpressionDisplay<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = match self.expression.operator() {
            Operator::And => " & ",
            Operator::Or => " | ",
            Operator::None | Operator::Timer => ", ",
        };

        if self.expression.operator() == Operator::Timer {
            fmt.write_str("timer")?;
        }

        let nested = (!self.root && self.expression.terms().len() > 1)
            || self.expression.operator() == Operator::Timer;

        if nested {
            fmt.write_str("(")?;
        }

        for (position, term) in self.expression.terms().iter().enumerate() {
            if position > 0 {
                fmt.write_str(separator)?;
            }

            if term.unary() == Unary::Not {
                fmt.write_str("!")?;
            }

            match term.operand() {
                Operand::Empty => fmt.write_str("<empty>")?,
                Operand::Identifier(variable) => {
                    write!(fmt, "{}", self.program.variable(*variable).name())?
                }

                Operand::Expression(expression) => {
                    let inner = ExpressionDisplay {
                        program: self.program,
                        expression,
                        root: false,
                    };

                    let wrap = expression.terms().len() <= 1
                        && expression.operator() != Operator::Timer
                        && term.unary() == Unary::Not;

                    if wrap {
                        write!(fmt, "({})", inner)?;
                    } else {
                        write!(fmt, "{}", inner)?;
                    }
                }
            }
        }

        if nested {
            fmt.write_str(")")?;
        }

        Ok(())
    }
}
