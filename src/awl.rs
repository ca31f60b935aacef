//! Front end de mnemónicos (AWL).
//!
//! Las secciones de declaración son las mismas del lenguaje de ecuaciones.
//! El cuerpo es una lista plana de líneas `[!]instrucción [argumento];`,
//! la cual describe directamente una traza de la máquina de pila.

use std::fmt::{self, Display};

use log::debug;

use crate::{
    ast::{Category, CategorySet, SemanticError, SymbolTable, VarId},
    lex::{Identifier, NoCase, Token},
    parse::{semantic, Parse, Parser, ParserError},
    source::{self, InputStream, Located, Location},
};

/// Mnemónico de una línea AWL.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AwlInstruction {
    Read,
    Write,
    Set,
    Reset,
    And,
    Or,
    Not,
}

impl AwlInstruction {
    const ALL: [AwlInstruction; 7] = [
        AwlInstruction::Read,
        AwlInstruction::Write,
        AwlInstruction::Set,
        AwlInstruction::Reset,
        AwlInstruction::And,
        AwlInstruction::Or,
        AwlInstruction::Not,
    ];

    /// Busca un mnemónico sin distinguir mayúsculas.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|instruction| NoCase::new(instruction.name()) == NoCase::new(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            AwlInstruction::Read => "read",
            AwlInstruction::Write => "write",
            AwlInstruction::Set => "set",
            AwlInstruction::Reset => "reset",
            AwlInstruction::And => "and",
            AwlInstruction::Or => "or",
            AwlInstruction::Not => "not",
        }
    }

    /// Las instrucciones de acceso requieren argumento; las lógicas no.
    pub fn requires_argument(self) -> bool {
        matches!(
            self,
            AwlInstruction::Read | AwlInstruction::Write | AwlInstruction::Set | AwlInstruction::Reset
        )
    }

    /// Categorías que se aceptan como argumento.
    pub fn allowed_categories(self) -> CategorySet {
        match self {
            AwlInstruction::Write => CategorySet::OUTPUT | CategorySet::FLAG,
            AwlInstruction::Set | AwlInstruction::Reset => {
                CategorySet::OUTPUT | CategorySet::MONOFLOP | CategorySet::FLAG
            }

            AwlInstruction::Read | AwlInstruction::And | AwlInstruction::Or | AwlInstruction::Not => {
                CategorySet::all()
            }
        }
    }
}

impl Display for AwlInstruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Una línea del listado.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AwlExpression {
    pub instruction: AwlInstruction,
    pub argument: Option<VarId>,
    pub inversion: bool,
}

/// Programa de mnemónicos: declaraciones más listado en orden.
#[derive(Debug, Default)]
pub struct AwlProgram {
    symbols: SymbolTable,
    listing: Vec<AwlExpression>,
}

impl AwlProgram {
    /// Arma un programa a partir de un listado ya construido.
    ///
    /// El listado no se valida aquí; [`compile_awl()`](crate::compile::compile_awl)
    /// rechaza argumentos faltantes y accesos sin codificación.
    pub fn from_listing(symbols: SymbolTable, listing: Vec<AwlExpression>) -> Self {
        AwlProgram { symbols, listing }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn listing(&self) -> &[AwlExpression] {
        &self.listing
    }
}

/// Analiza un programa de mnemónicos.
pub fn parse_awl<S: InputStream>(start: Location, stream: S) -> Parse<AwlProgram> {
    let mut parser = Parser::new(start, stream);
    let mut program = AwlProgram::default();

    loop {
        let token = match parser.next_or_eof()? {
            None => break,
            Some(token) => token,
        };

        // `!` antes del mnemónico excluye una sección de declaración
        let leading = token.val().is_char('!');
        let name = if leading {
            parser.id()?
        } else {
            parser.push_back(token);
            match parser.top_level(&mut program.symbols)? {
                None => break,
                Some(name) => name,
            }
        };

        let line = instruction(&mut parser, &program.symbols, name, leading)?;
        program.listing.push(line);
    }

    debug!(
        "parsed {} variables and {} instructions",
        program.symbols.len(),
        program.listing.len()
    );

    Ok(program)
}

/// Analiza un programa de mnemónicos contenido en una cadena.
pub fn parse_awl_str(text: &str) -> Parse<AwlProgram> {
    let (start, stream) = source::consume(text.as_bytes(), "<string>");
    parse_awl(start, stream)
}

/// `['!'] [argument] ';'` tras el mnemónico.
///
/// La inversión se acepta antes del mnemónico (`leading`) o antes del
/// argumento, pero no en ambos lugares.
fn instruction<S: InputStream>(
    parser: &mut Parser<S>,
    symbols: &SymbolTable,
    name: Located<Identifier>,
    leading: bool,
) -> Parse<AwlExpression> {
    let (location, name) = name.split();
    let instruction = match AwlInstruction::from_name(name.as_ref()) {
        Some(instruction) => instruction,
        None => return Err(Located::at(ParserError::UndefinedInstruction(name), location)),
    };

    let invalid = |reason: &str| {
        let error = SemanticError::InvalidInstructionArgument {
            instruction: instruction.name(),
            reason: String::from(reason),
        };

        semantic(error, location.clone())
    };

    let mut token = parser.next("argument or `;`")?;
    let trailing = token.val().is_char('!');
    if trailing {
        if leading {
            return invalid("inversion given twice");
        }

        token = parser.next("argument")?;
    }

    let inversion = leading || trailing;

    let argument = match token.val() {
        Token::Id(argument) => {
            let variable = symbols
                .lookup(argument.as_ref())
                .or_else(|error| semantic(error, token.location().clone()))?;

            let category = symbols.get(variable).category();
            if !instruction.allowed_categories().allows(category) {
                return invalid(&format!("{} `{}` not allowed", category, argument));
            }

            Some(variable)
        }

        _ => {
            parser.push_back(token);
            if instruction.requires_argument() {
                return invalid("missing argument");
            } else if inversion {
                return invalid("inversion without argument");
            }

            None
        }
    };

    parser.expect_char(';', "`;` after instruction")?;

    Ok(AwlExpression {
        instruction,
        argument,
        inversion,
    })
}

impl AwlExpression {
    /// Categoría del argumento, si lo hay.
    pub fn category(&self, symbols: &SymbolTable) -> Option<Category> {
        self.argument.map(|variable| symbols.get(variable).category())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HEADER: &str = "Inputs: a=0, b=1; Outputs: out=0; Flags: f=0; Timer: t=0;\n";

    fn listing(body: &str) -> Vec<AwlExpression> {
        parse_awl_str(&format!("{}{}", HEADER, body))
            .unwrap()
            .listing()
            .to_vec()
    }

    fn error(body: &str) -> Located<ParserError> {
        parse_awl_str(&format!("{}{}", HEADER, body)).unwrap_err()
    }

    #[test]
    fn parse_awl_when_listing_then_lines_in_order() {
        let lines = listing("read a; and !b; NOT; Write out;");

        let instructions: Vec<_> = lines.iter().map(|line| line.instruction).collect();
        assert_eq!(
            instructions,
            [
                AwlInstruction::Read,
                AwlInstruction::And,
                AwlInstruction::Not,
                AwlInstruction::Write
            ]
        );

        assert!(lines[1].inversion);
        assert!(lines[1].argument.is_some());
        assert_eq!(lines[2].argument, None);
        assert!(!lines[2].inversion);
    }

    #[test]
    fn parse_awl_when_declarations_then_shared_with_equations() {
        let program = parse_awl_str(&format!("{}read t;", HEADER)).unwrap();
        let t = program.symbols().lookup("t").unwrap();

        assert_eq!(program.symbols().get(t).category(), Category::Monoflop);
        assert_eq!(
            program.listing()[0].category(program.symbols()),
            Some(Category::Monoflop)
        );
    }

    #[test]
    fn parse_awl_when_unknown_mnemonic_then_undefined_instruction() {
        let error = error("load a;");

        assert!(matches!(error.val(), ParserError::UndefinedInstruction(_)));
        assert_eq!(error.line(), 2);
    }

    #[test]
    fn parse_awl_when_access_without_argument_then_invalid_argument() {
        let error = error("read;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::InvalidInstructionArgument {
                instruction: "read",
                ..
            })
        ));
    }

    #[test]
    fn parse_awl_when_inversion_without_argument_then_invalid_argument() {
        let error = error("read a; or !;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::InvalidInstructionArgument { instruction: "or", .. })
        ));
    }

    #[test]
    fn parse_awl_when_writing_input_then_category_rejected() {
        for line in ["read b; write a;", "read b; set a;", "read b; reset a;"] {
            let error = error(line);
            assert!(matches!(
                error.val(),
                ParserError::Semantic(SemanticError::InvalidInstructionArgument { .. })
            ));
        }
    }

    #[test]
    fn parse_awl_when_writing_monoflop_then_category_rejected() {
        let error = error("read a; write t;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::InvalidInstructionArgument { instruction: "write", .. })
        ));
    }

    #[test]
    fn parse_awl_when_setting_monoflop_then_accepted() {
        let lines = listing("read a; set t; reset t;");

        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn parse_awl_when_semicolon_missing_then_syntax_error() {
        let error = error("read a b;");

        assert!(matches!(error.val(), ParserError::UnexpectedToken { .. }));
    }

    #[test]
    fn parse_awl_when_argument_undeclared_then_unknown_variable() {
        let error = error("read ghost;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::UnknownVariable(_))
        ));
    }

    #[test]
    fn allowed_categories_when_read_then_everything() {
        for category in Category::ALL {
            assert!(AwlInstruction::Read.allowed_categories().allows(category));
        }

        assert!(!AwlInstruction::Write.allowed_categories().allows(Category::Monoflop));
        assert!(AwlInstruction::Set.allowed_categories().allows(Category::Monoflop));
    }

    #[test]
    fn parse_awl_when_inversion_leads_mnemonic_then_same_as_before_argument() {
        let leading = listing("read a; !set f; !AND b;");
        let trailing = listing("read a; set !f; and !b;");

        assert_eq!(leading, trailing);
        assert!(leading[1].inversion);
        assert!(!leading[0].inversion);
    }

    #[test]
    fn parse_awl_when_leading_inversion_without_argument_then_invalid_argument() {
        let error = error("read a; !not;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::InvalidInstructionArgument { instruction: "not", .. })
        ));
    }

    #[test]
    fn parse_awl_when_inverted_twice_then_invalid_argument() {
        let error = error("read a; !write !out;");

        assert!(matches!(
            error.val(),
            ParserError::Semantic(SemanticError::InvalidInstructionArgument { instruction: "write", .. })
        ));
    }

    #[test]
    fn parse_awl_when_inversion_before_section_then_undefined_instruction() {
        let error = parse_awl_str("!Inputs: a=0;").unwrap_err();

        assert!(matches!(error.val(), ParserError::UndefinedInstruction(_)));
    }
}
