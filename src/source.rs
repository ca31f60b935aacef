//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el código fuente original, lo cual permite determinar un punto
//! exacto o aproximado en donde ocurre un error. Todo error de
//! las fases delanteras se reporta con al menos un número de línea.
//!
//! Este módulo también provee [`CharStream`], el lector carácter por
//! carácter con retroceso (pushback) sobre el cual opera el lexer.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    iter,
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un flujo de entrada, carácter por carácter.
///
/// Cada elemento incluye la ubicación del propio carácter.
pub trait InputStream: Iterator<Item = Result<(char, Location), io::Error>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), io::Error>> {}

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Número de línea donde inicia el objeto.
    pub fn line(&self) -> u32 {
        self.location.start().line()
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Origen de esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen e histórico interior de líneas.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    /// Nombre con el que se identifica al origen en diagnósticos.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoca a `callback` con el texto de una línea ya leída.
    ///
    /// Líneas que todavía no se han leído se observan como vacías.
    pub fn with_line<F, R>(&self, line_number: u32, callback: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let lines = self.lines.borrow();
        let line = (line_number as usize)
            .checked_sub(1)
            .and_then(|index| lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        callback(line)
    }
}

/// Transforma un flujo de entrada estándar en uno que itera por carácter.
///
/// La ubicación que se encuentra en la tupla de retorno es la posición
/// del primer carácter de la entrada; cada carácter emitido incluye
/// a su propia ubicación. Los finales de línea se emiten como `'\n'`
/// independientemente de la convención del archivo.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let start = Location {
        from: Rc::clone(&source),
        position: Position::default()..Position::default().advance(),
    };

    let chars = reader
        .lines()
        .enumerate()
        .flat_map(move |(line_index, line)| {
            let source = Rc::clone(&source);

            Fallible::new(line.map(move |line| {
                let line_chars: Vec<_> = line.chars().collect();
                source.lines.borrow_mut().push(line);

                let mut here = Position {
                    line: line_index as u32 + 1,
                    column: 1,
                };

                line_chars
                    .into_iter()
                    .chain(iter::once('\n'))
                    .map(move |c| {
                        let location = Location {
                            from: Rc::clone(&source),
                            position: here..here.advance(),
                        };

                        here = match c {
                            '\n' => here.newline(),
                            '\t' => here.tab(),
                            _ => here.advance(),
                        };

                        (c, location)
                    })
            }))
        })
        .fuse();

    (start, chars)
}

/// Lector carácter por carácter con retroceso.
///
/// Los caracteres devueltos con [`CharStream::push_back()`] se vuelven
/// a emitir en orden inverso antes de continuar con la entrada. El
/// número de línea corresponde siempre al siguiente carácter por leer.
pub struct CharStream<S> {
    source: S,
    pushed: Vec<(char, Location)>,
    next: Location,
}

impl<S: InputStream> CharStream<S> {
    /// Crea un lector a partir de un flujo y la ubicación de su inicio.
    pub fn new(start: Location, source: S) -> Self {
        CharStream {
            source,
            pushed: Vec::new(),
            next: start,
        }
    }

    /// Extrae el siguiente carácter, o `None` al final de la entrada.
    pub fn next_char(&mut self) -> io::Result<Option<(char, Location)>> {
        let next = match self.pushed.pop() {
            Some(pushed) => Some(pushed),
            None => self.source.next().transpose()?,
        };

        if let Some((c, location)) = &next {
            let position = match c {
                '\n' => location.start().newline(),
                _ => location.start().advance(),
            };

            self.next = Location {
                from: Rc::clone(&location.from),
                position: position..position.advance(),
            };
        }

        Ok(next)
    }

    /// Extrae caracteres mientras sean espacios en blanco.
    pub fn next_non_blank(&mut self) -> io::Result<Option<(char, Location)>> {
        loop {
            match self.next_char()? {
                Some((c, _)) if c.is_whitespace() => continue,
                other => break Ok(other),
            }
        }
    }

    /// Devuelve un carácter al flujo.
    pub fn push_back(&mut self, c: char, location: Location) {
        self.next = location.clone();
        self.pushed.push((c, location));
    }

    /// Ubicación del siguiente carácter por leer.
    pub fn location(&self) -> &Location {
        &self.next
    }

    /// Número de línea actual.
    pub fn line(&self) -> u32 {
        self.next.start().line()
    }
}

/// Un iterador que emite un solo error o encapsula las salidas de
/// otro iterador en `Ok`, pero nunca ambas.
struct Fallible<I, E>(Result<I, iter::Once<E>>);

impl<I, E> Fallible<I, E> {
    /// Crea un iterador a partir de un `Result`.
    pub fn new(result: Result<I, E>) -> Self {
        Fallible(result.map_err(iter::once))
    }
}

impl<I: Iterator, E> Iterator for Fallible<I, E> {
    type Item = Result<I::Item, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.0 {
            Ok(ok) => ok.next().map(Ok),
            Err(error) => error.next().map(Err),
        }
    }
}
