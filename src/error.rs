//! Reporte de errores con ubicación.
//!
//! Los errores de las fases delanteras se muestran junto a la línea de
//! código fuente donde ocurren. Un programa de PLC es una lista de
//! sentencias cortas, por lo que basta con la línea de inicio de cada
//! error y una marca bajo las columnas afectadas.

use crate::source::{Located, Location};
use std::fmt::{self, Display};

/// Conjunto de errores listos para mostrarse.
pub struct Diagnostics {
    kind: &'static str,
    reports: Vec<Report>,
}

struct Report {
    message: String,
    location: Location,
}

impl Diagnostics {
    /// Cambia la etiqueta con la que se muestra cada error.
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Agrega un error al final del reporte.
    pub fn push<E: Display>(&mut self, error: Located<E>) {
        let (location, error) = error.split();
        self.reports.push(Report {
            message: error.to_string(),
            location,
        });
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            reports: Vec::new(),
        }
    }
}

impl<E: Display> From<Located<E>> for Diagnostics {
    fn from(error: Located<E>) -> Self {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(error);
        diagnostics
    }
}

impl<E: Display> From<Vec<Located<E>>> for Diagnostics {
    fn from(errors: Vec<Located<E>>) -> Self {
        let mut diagnostics = Diagnostics::default();
        for error in errors {
            diagnostics.push(error);
        }

        diagnostics
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for report in &self.reports {
            writeln!(fmt, "{}: {}", self.kind, report.message)?;
            report.excerpt(fmt)?;
            writeln!(fmt)?;
        }

        let count = self.reports.len();
        let noun = if count == 1 { "error" } else { "errors" };
        writeln!(fmt, "Build failed with {} {}", count, noun)
    }
}

impl Report {
    fn excerpt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = &self.location;
        let (start, end) = (location.start(), location.end());

        let line_number = start.line();
        let gutter = line_number.to_string().len();

        writeln!(fmt, " --> {}", location)?;
        writeln!(fmt, "{:gutter$} |", "", gutter = gutter)?;

        location.source().with_line(line_number, |line| {
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            writeln!(fmt, "{} | {}", line_number, line)
        })?;

        // El fin es exclusivo; en ubicaciones de varias líneas solo se marca el inicio
        let first = start.column().max(1);
        let last = if end.line() == line_number {
            end.column().saturating_sub(1).max(first)
        } else {
            first
        };

        writeln!(
            fmt,
            "{:gutter$} | {:skip$}{:^<width$}",
            "",
            "",
            "",
            gutter = gutter,
            skip = (first - 1) as usize,
            width = (last - first + 1) as usize
        )
    }
}
