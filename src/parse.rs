//! Análisis sintáctico.
//!
//! # Estructura de un programa
//! Un programa es una secuencia de secciones de declaración y de cuerpos.
//! Cada sección comienza con una palabra reservada (`inputs`, `outputs`,
//! `monoflops` o `timer`, `flags`; sin distinguir mayúsculas) seguida de
//! `:` y una lista de declaraciones `nombre [(duración)] = índice`
//! separadas por `,` y terminada en `;`. Cualquier otro identificador al
//! inicio de una sentencia inicia un cuerpo, cuya forma depende del front
//! end: ecuaciones en este módulo, mnemónicos en [`crate::awl`].
//!
//! # Precedencia
//! Las expresiones se construyen por escalado de precedencia con dos niveles,
//! `|` por debajo de `&`. Términos consecutivos unidos por el mismo operador
//! forman un único grupo n-ario, por lo cual `a | b & c | d` resulta en un
//! grupo `|` de tres términos cuyo término central es el grupo `b & c`.
//!
//! # Errores
//! No hay recuperación de errores: el primer error se reporta con su
//! ubicación y el análisis se detiene.

use log::debug;
use thiserror::Error;

use crate::{
    ast::{
        Assignment, Category, Expression, Operator, Program, SemanticError, SymbolTable, Term,
        Variable,
    },
    lex::{self, Identifier, Lexer, LexerError, Token},
    source::{self, InputStream, Located, Location},
};

/// Profundidad máxima de anidamiento de paréntesis y negaciones.
pub const MAX_NESTING: usize = 64;

/// Valor máximo de una duración en la base de tiempo del hardware.
pub const TIME_MAX: u64 = 65535;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error("Expected {expected}, found {found} instead")]
    UnexpectedToken {
        expected: &'static str,
        found: Token,
    },

    #[error("Expected {0}, none was found instead")]
    UnexpectedEof(&'static str),

    #[error("Syntax error, undefined operator `{0}`")]
    UndefinedOperator(char),

    #[error("Missing time unit (s, min, h), found {0} instead")]
    UnknownTimeUnit(Token),

    #[error("Only monoflops may declare a duration")]
    DurationNotAllowed,

    #[error("Undefined instruction `{0}`")]
    UndefinedInstruction(Identifier),

    #[error("Expression is nested too deeply, maximum depth is 64")]
    NestingTooDeep,
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Analiza un programa de ecuaciones a partir de un flujo de caracteres.
pub fn parse<S: InputStream>(start: Location, stream: S) -> Parse<Program> {
    let mut parser = Parser::new(start, stream);
    let mut program = Program::new();

    while let Some(name) = parser.top_level(program.symbols_mut())? {
        parser.equation(&mut program, name)?;
    }

    debug!(
        "parsed {} variables and {} equations",
        program.symbols().len(),
        program.equations().count()
    );

    Ok(program)
}

/// Analiza un programa de ecuaciones contenido en una cadena.
pub fn parse_str(text: &str) -> Parse<Program> {
    let (start, stream) = source::consume(text.as_bytes(), "<string>");
    parse(start, stream)
}

/// Parser descendente recursivo sobre un lexer con retroceso de un token.
pub(crate) struct Parser<S> {
    lexer: Lexer<S>,
}

impl<S: InputStream> Parser<S> {
    pub(crate) fn new(start: Location, stream: S) -> Self {
        Parser {
            lexer: Lexer::new(start, stream),
        }
    }

    /// Consume secciones de declaración hasta encontrar el inicio de un cuerpo.
    ///
    /// Retorna el identificador que inicia la siguiente sentencia del cuerpo,
    /// o `None` si la entrada terminó.
    pub(crate) fn top_level(
        &mut self,
        symbols: &mut SymbolTable,
    ) -> Parse<Option<Located<Identifier>>> {
        loop {
            let token = match self.next_or_eof()? {
                None => return Ok(None),
                Some(token) => token,
            };

            let (location, token) = token.split();
            let name = match token {
                Token::Id(name) => name,
                found => {
                    return Err(Located::at(
                        ParserError::UnexpectedToken {
                            expected: "section or statement",
                            found,
                        },
                        location,
                    ))
                }
            };

            match section(&name) {
                Some(category) => self.declarations(symbols, category)?,
                None => return Ok(Some(Located::at(name, location))),
            }
        }
    }

    /// `':' (name ['(' duration ')'] '=' index ',')* name [...] ';'`
    fn declarations(&mut self, symbols: &mut SymbolTable, category: Category) -> Parse<()> {
        self.expect_char(':', "`:` after section name")?;

        loop {
            let (location, name) = self.id()?.split();
            if symbols.exists(name.as_ref()) {
                return semantic(SemanticError::DuplicateVariable(name), location);
            }

            let mut token = self.next("`=`")?;
            let mut time = None;

            if token.val().is_char('(') {
                if category != Category::Monoflop {
                    return Err(token.map(|_| ParserError::DurationNotAllowed));
                }

                time = Some(self.duration(&name, &location)?);
                self.expect_char(')', "`)` after duration")?;
                token = self.next("`=`")?;
            }

            match token.val() {
                Token::Operator(lex::Operator::Assign) => (),
                _ => return self.unexpected(token, "`=` after variable name"),
            }

            let (index_location, index) = self.integer("variable index")?.split();
            let index = u32::try_from(index).or_else(|_| {
                semantic(SemanticError::IndexOverflow(name.clone()), index_location)
            })?;

            let variable = Variable::new(name, category, index);
            let variable = match time {
                Some(time) => variable.with_time(time),
                None => variable,
            };

            symbols
                .declare(variable)
                .or_else(|error| semantic(error, location))?;

            let token = self.next("`,` or `;`")?;
            match token.val() {
                Token::Char(',') => continue,
                Token::Char(';') => break Ok(()),
                _ => break self.unexpected(token, "`,` or `;` in variable list"),
            }
        }
    }

    /// `integer unit`, convertido a la base de tiempo del hardware.
    fn duration(&mut self, name: &Identifier, location: &Location) -> Parse<u32> {
        let (_, amount) = self.integer("duration")?.split();

        let unit = self.next("time unit")?;
        let time = match unit.val() {
            Token::Id(word) if word.as_ref() == "s" => amount / 2,
            Token::Id(word) if word.as_ref() == "min" => amount.saturating_mul(30),
            Token::Id(word) if word.as_ref() == "h" => amount.saturating_mul(1800),
            _ => return Err(unit.map(ParserError::UnknownTimeUnit)),
        };

        if time > TIME_MAX {
            return semantic(SemanticError::TimeOverflow(name.clone()), location.clone());
        }

        Ok(time as u32)
    }

    /// `name ('=' | '+=' | '-=') Expression ';'`
    fn equation(&mut self, program: &mut Program, name: Located<Identifier>) -> Parse<()> {
        let (location, name) = name.split();
        let variable = program
            .symbols()
            .lookup(name.as_ref())
            .or_else(|error| semantic(error, location.clone()))?;

        let token = self.next("`=`, `+=` or `-=`")?;
        let assignment = match token.val() {
            Token::Operator(lex::Operator::Assign) => Assignment::Assign,
            Token::Operator(lex::Operator::Set) => Assignment::Set,
            Token::Operator(lex::Operator::Reset) => Assignment::Reset,
            _ => return self.unexpected(token, "`=`, `+=` or `-=` after variable"),
        };

        let mut expression = self.expression(program, 0)?;
        self.expect_char(';', "`;` after expression")?;

        expression.set_assignment(assignment);
        program
            .add_equation(variable, expression)
            .or_else(|error| semantic(error, location))?;

        debug!("parsed equation of `{}`", name);
        Ok(())
    }

    /// `Term (('&'|'|') Term)*`
    fn expression(&mut self, program: &Program, depth: usize) -> Parse<Expression> {
        let mut expression = Expression::new(program.next_id());

        loop {
            let term = self.term(program, depth)?;
            let operator = match self.binary_operator()? {
                Some(operator) => operator,
                None => {
                    expression.add_term(term);
                    break Ok(expression);
                }
            };

            if expression.is_empty() || expression.operator() == operator {
                expression.set_operator(operator);
                expression.add_term(term);
            } else if expression.operator() < operator {
                // El término pertenece a un grupo más fuerte que el actual
                let (group, next) = self.group(program, term, operator, depth)?;
                expression.add_term(Term::expression(group));

                // Un grupo interrumpido por un operador más débil retorna
                // a este nivel, cuyo operador ya es ese mismo
                if next.is_none() {
                    break Ok(expression);
                }
            } else {
                // Todo lo anterior se vuelve el primer término del grupo débil
                expression.add_term(term);

                let group = std::mem::replace(&mut expression, Expression::new(program.next_id()));
                expression.add_term(Term::expression(group));
                expression.set_operator(operator);
            }
        }
    }

    /// Grupo de términos unidos por `operator`, iniciando en `first`.
    ///
    /// Termina al final de la expresión, en cuyo caso retorna `None`, o al
    /// encontrar un operador distinto, el cual se retorna.
    fn group(
        &mut self,
        program: &Program,
        first: Term,
        operator: Operator,
        depth: usize,
    ) -> Parse<(Expression, Option<Operator>)> {
        let mut group = Expression::with_term(program.next_id(), first, operator);

        loop {
            group.add_term(self.term(program, depth)?);

            match self.binary_operator()? {
                Some(next) if next == operator => continue,
                next => break Ok((group, next)),
            }
        }
    }

    /// `Identifier | '!' Term | '(' Expression ')'`
    fn term(&mut self, program: &Program, depth: usize) -> Parse<Term> {
        let (location, token) = self.next("identifier, `!` or `(`")?.split();
        let nested = matches!(token, Token::Char('!') | Token::Char('('));
        if nested && depth >= MAX_NESTING {
            return Err(Located::at(ParserError::NestingTooDeep, location));
        }

        match token {
            Token::Id(name) => {
                let variable = program
                    .symbols()
                    .lookup(name.as_ref())
                    .or_else(|error| semantic(error, location))?;

                Ok(Term::identifier(variable))
            }

            Token::Char('!') => {
                let mut term = self.term(program, depth + 1)?;
                term.reverse_unary();
                Ok(term)
            }

            Token::Char('(') => {
                let expression = self.expression(program, depth + 1)?;
                self.expect_char(')', "closing `)`")?;
                Ok(Term::expression(expression))
            }

            found => Err(Located::at(
                ParserError::UnexpectedToken {
                    expected: "identifier, `!` or `(`",
                    found,
                },
                location,
            )),
        }
    }

    /// Siguiente operador binario, o `None` si la expresión termina.
    ///
    /// Los terminadores `;` y `)` se devuelven al lexer.
    fn binary_operator(&mut self) -> Parse<Option<Operator>> {
        let token = self.next("operator, `;` or `)`")?;
        match token.val() {
            Token::Char(';') | Token::Char(')') => {
                self.lexer.push_back(token);
                Ok(None)
            }

            Token::Char('&') => Ok(Some(Operator::And)),
            Token::Char('|') => Ok(Some(Operator::Or)),
            Token::Char(c) => {
                let c = *c;
                Err(token.map(|_| ParserError::UndefinedOperator(c)))
            }

            _ => self.unexpected(token, "operator"),
        }
    }

    pub(crate) fn id(&mut self) -> Parse<Located<Identifier>> {
        let token = self.next("identifier")?;
        match token.val() {
            Token::Id(id) => {
                let id = id.clone();
                Ok(token.map(|_| id))
            }

            _ => self.unexpected(token, "identifier"),
        }
    }

    fn integer(&mut self, expected: &'static str) -> Parse<Located<u64>> {
        let token = self.next(expected)?;
        match token.val() {
            Token::Integer(value, _) => {
                let value = *value;
                Ok(token.map(|_| value))
            }

            _ => self.unexpected(token, expected),
        }
    }

    pub(crate) fn expect_char(&mut self, c: char, expected: &'static str) -> Parse<()> {
        let token = self.next(expected)?;
        if token.val().is_char(c) {
            Ok(())
        } else {
            self.unexpected(token, expected)
        }
    }

    pub(crate) fn next(&mut self, expected: &'static str) -> Parse<Located<Token>> {
        match self.lexer.next() {
            Some(Ok(token)) => Ok(token),
            Some(Err(error)) => Err(error.map(ParserError::from)),
            None => Err(Located::at(
                ParserError::UnexpectedEof(expected),
                self.lexer.location().clone(),
            )),
        }
    }

    /// Como [`Parser::next()`], pero el final de la entrada no es un error.
    pub(crate) fn next_or_eof(&mut self) -> Parse<Option<Located<Token>>> {
        self.lexer
            .next()
            .transpose()
            .map_err(|error| error.map(ParserError::from))
    }

    pub(crate) fn push_back(&mut self, token: Located<Token>) {
        self.lexer.push_back(token);
    }

    pub(crate) fn unexpected<T>(&self, token: Located<Token>, expected: &'static str) -> Parse<T> {
        Err(token.map(|found| ParserError::UnexpectedToken { expected, found }))
    }
}

/// Categoría declarada por una palabra reservada de sección.
fn section(name: &Identifier) -> Option<Category> {
    const SECTIONS: &[(&str, Category)] = &[
        ("inputs", Category::Input),
        ("outputs", Category::Output),
        ("monoflops", Category::Monoflop),
        ("timer", Category::Monoflop),
        ("flags", Category::Flag),
    ];

    SECTIONS
        .iter()
        .find(|(word, _)| name.is(word))
        .map(|&(_, category)| category)
}

pub(crate) fn semantic<T>(error: SemanticError, location: Location) -> Parse<T> {
    Err(Located::at(ParserError::Semantic(error), location))
}
