//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios, tanto `// ...` como `/* ... */`, se descartan
//! durante esta operación. Cada token emitido está asociado a una ubicación en
//! el código fuente original, lo cual permite rastrear errores en tanto los
//! mismos como constructos más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Los identificadores incluyen su lexema original. Las constantes enteras
//! incluyen tanto su valor como su texto literal, ya que ceros a la izquierda
//! y similares pueden ser relevantes. Los operadores de asignación `=`, `+=`
//! y `-=` se reconocen como tales; cualquier otro carácter que no sea espacio
//! en blanco se emite como [`Token::Char`] y es responsabilidad del parser
//! decidir si es válido.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores comienzan con una letra o `_`, seguidos de letras,
//!   dígitos o `_`.
//! - Los identificadores distinguen mayúsculas y minúsculas. Las palabras
//!   reservadas de secciones y mnemónicos no, lo cual se resuelve con
//!   [`NoCase`] en el parser.
//! - No se verifica desbordamiento de enteros en esta fase.
//!
//! # Errores
//! El primer error léxico detiene el análisis; no hay recuperación.

use crate::source::{CharStream, InputStream, Located, Location};
use std::{
    fmt::{self, Display},
    rc::Rc,
};

use log::trace;
use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Un comentario `/* ...` alcanzó el final de la entrada.
    #[error("EOF in comment, missing `*/`")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(Rc<str>);

impl Identifier {
    /// Compara contra una palabra sin distinguir mayúsculas.
    pub fn is(&self, word: &str) -> bool {
        NoCase::new(self.as_ref()) == NoCase::new(word)
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Operadores compuestos de asignación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Assign,

    /// `+=`
    Set,

    /// `-=`
    Reset,
}

impl Display for Operator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Operator::Assign => "=",
            Operator::Set => "+=",
            Operator::Reset => "-=",
        })
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Literal de entero, con su texto original.
    Integer(u64, Rc<str>),

    /// Cualquier otro carácter que no sea espacio en blanco.
    Char(char),

    /// `=`, `+=` o `-=`.
    Operator(Operator),
}

impl Token {
    /// Determina si el token es un carácter específico.
    pub fn is_char(&self, c: char) -> bool {
        matches!(self, Token::Char(found) if *found == c)
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Integer(_, literal) => write!(fmt, "literal `{}`", literal),
            Char(c) => write!(fmt, "`{}`", c),
            Operator(operator) => write!(fmt, "`{}`", operator),
        }
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S> {
    chars: CharStream<S>,
    pushed: Vec<Located<Token>>,
    last: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Se encontró `/`.
    ///
    /// Puede iniciar un comentario o ser un carácter aislado.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Comentario de bloque; `star` indica si el último carácter fue `*`.
    BlockComment { star: bool },

    /// Se encontró `+` o `-`, posible inicio de `+=` o `-=`.
    Sign(char),

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(u64, String),

    /// Identificador.
    Word(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        Lexer {
            chars: CharStream::new(start.clone(), source),
            pushed: Vec::new(),
            last: start,
        }
    }

    /// Devuelve un token al flujo, el cual será el siguiente en emitirse.
    pub fn push_back(&mut self, token: Located<Token>) {
        self.pushed.push(token);
    }

    /// Ubicación del último token emitido, o del inicio si no hay alguno.
    pub fn location(&self) -> &Location {
        &self.last
    }

    /// Número de línea actual del flujo de caracteres.
    pub fn line(&self) -> u32 {
        self.chars.line()
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Located<Token>>, Located<LexerError>> {
        use State::*;

        let mut state = Start;
        let mut start = self.chars.location().clone();
        let mut last_accepted = start.clone();

        loop {
            let mut next = self
                .chars
                .next_char()
                .map_err(|error| Located::at(error.into(), self.chars.location().clone()))?;

            let c = next.as_ref().map(|(c, _)| *c);

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let (Start, Some((_, here))) = (&state, &next) {
                start = here.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            let token = match (&mut state, c) {
                (Start, None) => return Ok(None),
                (Start, Some(c)) if c.is_whitespace() => None,
                (Start, Some('/')) => {
                    state = Slash;
                    None
                }

                (Start, Some('=')) => Some(Token::Operator(Operator::Assign)),
                (Start, Some(c @ ('+' | '-'))) => {
                    state = Sign(c);
                    None
                }

                (Start, Some(c)) if c.is_ascii_digit() => {
                    state = Integer(digit(c), c.to_string());
                    None
                }

                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    state = Word(c.to_string());
                    None
                }

                (Start, Some(c)) => Some(Token::Char(c)),

                (Slash, Some('/')) => {
                    state = LineComment;
                    None
                }

                (Slash, Some('*')) => {
                    state = BlockComment { star: false };
                    None
                }

                (Slash, _) => {
                    self.unread(next.take());
                    Some(Token::Char('/'))
                }

                // Los comentarios descartan la línea donde ocurren
                (LineComment, Some('\n')) | (LineComment, None) => {
                    state = Start;
                    None
                }

                (LineComment, Some(_)) => None,

                (BlockComment { .. }, None) => {
                    return Err(Located::at(LexerError::UnterminatedComment, start))
                }

                (BlockComment { star: true }, Some('/')) => {
                    state = Start;
                    None
                }

                (BlockComment { star }, Some(c)) => {
                    *star = c == '*';
                    None
                }

                (Sign('+'), Some('=')) => Some(Token::Operator(Operator::Set)),
                (Sign(_), Some('=')) => Some(Token::Operator(Operator::Reset)),
                (Sign(sign), _) => {
                    let sign = *sign;
                    self.unread(next.take());
                    Some(Token::Char(sign))
                }

                // Acumulación dígito por dígito de constantes enteras
                (Integer(value, literal), Some(c)) if c.is_ascii_digit() => {
                    *value = value.wrapping_mul(10).wrapping_add(digit(c));
                    literal.push(c);
                    None
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(value, literal), _) => {
                    let token = Token::Integer(*value, Rc::from(literal.as_str()));
                    self.unread(next.take());
                    Some(token)
                }

                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                    None
                }

                (Word(word), _) => {
                    let token = Token::Id(Identifier::from(word.as_str()));
                    self.unread(next.take());
                    Some(token)
                }
            };

            // Si el carácter no se devolvió al flujo, ha sido aceptado
            if let Some((_, here)) = next {
                last_accepted = here;
            }

            if let Some(token) = token {
                let location = Location::span(start, &last_accepted);
                break Ok(Some(Located::at(token, location)));
            }
        }
    }

    fn unread(&mut self, next: Option<(char, Location)>) {
        if let Some((c, location)) = next {
            self.chars.push_back(c, location);
        }
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = match self.pushed.pop() {
            Some(token) => Ok(Some(token)),
            None => self.lex(),
        };

        match token {
            Ok(None) => None,
            Ok(Some(token)) => {
                trace!("token {} at {}", token.val(), token.location());
                self.last = token.location().clone();
                Some(Ok(token))
            }

            Err(error) => Some(Err(error)),
        }
    }
}

fn digit(c: char) -> u64 {
    c.to_digit(10).map_or(0, u64::from)
}

/// Determina si un carácter puede pertenecer a un identificador.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
