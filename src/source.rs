//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el diagrama original, lo cual permite determinar la línea exacta
//! en donde ocurre un error. La gramática de diagramas es orientada
//! a líneas, por lo cual una ubicación normalmente cubre el contenido
//! no blanco de una única línea.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Range, RangeInclusive},
    rc::Rc,
};

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
    /// Ubicación inmediatamente posterior a la última línea.
    ///
    /// Errores que se refieren a la ausencia de algo (por ejemplo,
    /// de un diagrama de estados) se reportan aquí.
    pub fn eof(source: &Rc<Source>) -> Self {
        let start = Position {
            line: source.line_count() + 1,
            column: 1,
        };

        Location {
            from: Rc::clone(source),
            position: start..start.advance(),
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin (exclusiva).
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen al que pertenece esta ubicación.
    pub fn source(&self) -> &Rc<Source> {
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
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
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
            column: self.column - 1,
        }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y sus líneas.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Construye un origen a partir de texto ya leído.
    pub fn new<S: Into<String>>(name: S, text: &str) -> Rc<Self> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Nombre con el que se reporta este origen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cantidad de líneas.
    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Contenido no blanco de una línea (base 1), si existe.
    pub fn line(self: &Rc<Self>, number: u32) -> Option<Located<&str>> {
        let index = number.checked_sub(1)?;
        self.lines().nth(index as usize)
    }

    /// Reconstruye textualmente un rango de líneas.
    pub fn excerpt(&self, lines: RangeInclusive<u32>) -> String {
        let (first, last) = lines.into_inner();
        let first = first.max(1) as usize - 1;
        let last = (last as usize).min(self.lines.len());

        self.lines
            .get(first..last)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }

    /// Itera sobre las líneas, cada una asociada a la ubicación de su
    /// contenido no blanco.
    pub fn lines(self: &Rc<Self>) -> impl Iterator<Item = Located<&str>> + '_ {
        self.lines.iter().enumerate().map(move |(index, line)| {
            let leading = line.chars().take_while(|c| c.is_whitespace()).count() as u32;
            let content = line.trim();

            let start = Position {
                line: index as u32 + 1,
                column: leading + 1,
            };

            // Las líneas en blanco igual ocupan una columna
            let width = (content.chars().count() as u32).max(1);
            let end = Position {
                line: start.line,
                column: start.column + width,
            };

            let location = Location {
                from: Rc::clone(self),
                position: start..end,
            };

            Located::at(content, location)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_cover_trimmed_content() {
        let source = Source::new("test.puml", "@startuml\n    Idle: waiting\n@enduml");
        let lines: Vec<_> = source.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(*lines[1].val(), "Idle: waiting");

        let location = lines[1].location();
        assert_eq!(location.start().line(), 2);
        assert_eq!(location.start().column(), 5);
        assert_eq!(location.end().column(), 18);
        assert_eq!(location.to_string(), "test.puml:[2:5-2:17]");
    }

    #[test]
    fn excerpt_is_verbatim() {
        let source = Source::new("x", "a\n  b\nc\nd");
        assert_eq!(source.excerpt(2..=3), "  b\nc");
        assert_eq!(source.excerpt(4..=9), "d");
    }

    #[test]
    fn eof_points_past_last_line() {
        let source = Source::new("x", "a\nb");
        let eof = Location::eof(&source);

        assert_eq!(eof.start().line(), 3);
        assert_eq!(eof.to_string(), "x:3:1");
        assert!(source.line(3).is_none());
        assert_eq!(source.line(2).map(|line| *line.val()), Some("b"));
    }
}
