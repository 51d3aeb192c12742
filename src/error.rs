//! Reporte de errores con contexto de origen.
//!
//! Cada fase del compilador define su propio tipo de error. Los
//! errores de todas las fases se asocian a una [`Location`] por medio
//! de [`Located`], lo cual permite a [`Diagnostics`] mostrar la línea
//! ofensiva del diagrama junto a una marca bajo el contenido señalado.
//! Como la gramática es orientada a líneas, cada reporte cubre
//! exactamente una línea.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

/// Un error ya convertido a texto, junto a su ubicación.
#[derive(Debug)]
struct Report {
    message: String,
    location: Location,
}

impl<E: Error> From<Located<E>> for Report {
    fn from(error: Located<E>) -> Self {
        let (location, error) = error.split();
        Report {
            message: error.to_string(),
            location,
        }
    }
}

/// Colección de errores de una misma fase, lista para mostrarse.
#[derive(Debug)]
pub struct Diagnostics {
    kind: &'static str,
    reports: Vec<Report>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Cantidad de errores reportados.
    pub fn len(&self) -> usize {
        self.reports.len()
    }
}

impl<E: Error> From<Located<E>> for Diagnostics {
    fn from(error: Located<E>) -> Self {
        vec![error].into()
    }
}

impl<E: Error> From<Vec<Located<E>>> for Diagnostics {
    fn from(errors: Vec<Located<E>>) -> Self {
        Diagnostics {
            kind: "error",
            reports: errors.into_iter().map(Report::from).collect(),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for report in &self.reports {
            writeln!(fmt, "{}: {}", self.kind, report.message)?;
            writeln!(fmt, " --> {}", report.location)?;
            snippet(fmt, &report.location)?;
            writeln!(fmt)?;
        }

        let count = self.reports.len();
        let noun = if count == 1 { "error" } else { "errors" };
        writeln!(fmt, "Build failed with {} {}", count, noun)
    }
}

/// Muestra la línea de `location` con una marca bajo las columnas
/// señaladas, acotadas al contenido no blanco de esa línea.
fn snippet(fmt: &mut fmt::Formatter<'_>, location: &Location) -> fmt::Result {
    let number = location.start().line();
    let line = location.source().line(number);

    // Fuera del archivo (por ejemplo, al final) se marca la primera columna
    let (text, first, last) = match &line {
        Some(line) => {
            let span = line.location();
            (line.val().replace('\t', " "), span.start().column(), span.end().column() - 1)
        }

        None => (String::new(), 1, 1),
    };

    let from = location.start().column().clamp(first, last);
    let to = if location.end().line() == number {
        location.end().column().saturating_sub(1).clamp(from, last)
    } else {
        last
    };

    let gutter = number.to_string().len();
    let indent = (first - 1) as usize;

    writeln!(fmt, "{:gutter$} |", "", gutter = gutter)?;
    writeln!(fmt, "{} | {:indent$}{}", number, "", text, indent = indent)?;
    writeln!(
        fmt,
        "{:gutter$} | {:skip$}{:^<width$}",
        "",
        "",
        "",
        gutter = gutter,
        skip = (from - 1) as usize,
        width = (to - from + 1) as usize
    )
}
