//! Análisis sintáctico.
//!
//! Agrupa el flujo de tokens en bloques `@startuml`/`@enduml` y
//! clasifica cada bloque una única vez como [`Diagram`]. Las fases
//! posteriores nunca vuelven a inspeccionar títulos ni contenido
//! para decidir qué tipo de diagrama tienen enfrente.

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    lex::{Identifier, Name, Statement, Token},
    source::{Located, Location},
};

/// Prefijo de título de un mapa de identificadores de estados.
pub const STATE_ID_PREFIX: &str = "__STATEID_GENERATED__";

/// Prefijo de título de un mapa de identificadores de eventos.
pub const EVENT_ID_PREFIX: &str = "__EVENTID_GENERATED__";

/// Un bloque delimitado del documento.
#[derive(Debug, Clone)]
pub struct Block {
    title: Option<String>,
    begin: Location,
    end: Location,
}

impl Block {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Ubicación de la línea `@startuml`.
    pub fn location(&self) -> &Location {
        &self.begin
    }

    /// Texto original del bloque, marcadores incluidos.
    pub fn text(&self) -> String {
        let lines = self.begin.start().line()..=self.end.start().line();
        self.begin.source().excerpt(lines)
    }
}

/// Diagrama de estados escrito por el usuario.
#[derive(Debug)]
pub struct SourceDiagram {
    pub block: Block,
    pub body: Vec<Located<Statement>>,
}

/// Instantánea de identificadores generada por una compilación anterior.
#[derive(Debug)]
pub struct IdMapDiagram {
    pub block: Block,
    pub entries: Vec<(Located<Identifier>, i64)>,

    /// Siguiente identificador libre, registrado como `[*]: N`.
    pub watermark: Option<i64>,
}

#[derive(Debug)]
pub enum Diagram {
    Source(SourceDiagram),
    StateIdMap(IdMapDiagram),
    EventIdMap(IdMapDiagram),

    /// Bloque sin contenido estructural. Se preserva tal cual.
    Unknown(Block),
}

impl Diagram {
    pub fn block(&self) -> &Block {
        match self {
            Diagram::Source(SourceDiagram { block, .. }) => block,
            Diagram::StateIdMap(IdMapDiagram { block, .. }) => block,
            Diagram::EventIdMap(IdMapDiagram { block, .. }) => block,
            Diagram::Unknown(block) => block,
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Diagram block is never closed with `@enduml`")]
    Unterminated,

    #[error("`@enduml` without a matching `@startuml`")]
    StrayEnd,

    #[error("Statement outside of any `@startuml` block")]
    OutsideBlock,

    #[error("Identifier map value `{0}` is not a valid integer")]
    BadId(String),

    #[error("Identifier map entries need a value, found `{0}` alone")]
    MissingId(Name),
}

/// Analiza un documento completo.
pub fn parse<I>(tokens: I) -> Result<Vec<Diagram>, Located<ParserError>>
where
    I: IntoIterator<Item = Located<Token>>,
{
    let mut parser = Parser {
        tokens: tokens.into_iter(),
    };

    parser.document()
}

struct Parser<I: Iterator<Item = Located<Token>>> {
    tokens: I,
}

type Parse<T> = Result<T, Located<ParserError>>;

impl<I: Iterator<Item = Located<Token>>> Parser<I> {
    fn document(&mut self) -> Parse<Vec<Diagram>> {
        let mut diagrams = Vec::new();

        while let Some(token) = self.tokens.next() {
            let (location, token) = token.split();
            match token {
                Token::Begin(title) => diagrams.push(self.block(title, location)?),
                Token::End => return Err(Located::at(ParserError::StrayEnd, location)),
                Token::Statement(_) => return Err(Located::at(ParserError::OutsideBlock, location)),
            }
        }

        Ok(diagrams)
    }

    fn block(&mut self, title: Option<String>, begin: Location) -> Parse<Diagram> {
        let mut body = Vec::new();

        let end = loop {
            let (location, token) = match self.tokens.next() {
                Some(token) => token.split(),
                None => return Err(Located::at(ParserError::Unterminated, begin)),
            };

            match token {
                Token::End => break location,
                Token::Statement(statement) => body.push(Located::at(statement, location)),

                // Los bloques no se anidan
                Token::Begin(_) => return Err(Located::at(ParserError::Unterminated, begin)),
            }
        };

        let block = Block { title, begin, end };
        let diagram = match block.title() {
            Some(title) if title.starts_with(STATE_ID_PREFIX) => {
                Diagram::StateIdMap(id_map(block, body)?)
            }

            Some(title) if title.starts_with(EVENT_ID_PREFIX) => {
                Diagram::EventIdMap(id_map(block, body)?)
            }

            _ if body.is_empty() => Diagram::Unknown(block),
            _ => Diagram::Source(SourceDiagram { block, body }),
        };

        debug!(
            title = diagram.block().title().unwrap_or(""),
            kind = diagram_kind(&diagram),
            "found diagram block"
        );

        Ok(diagram)
    }
}

/// Interpreta el cuerpo de un bloque como líneas `<nombre>: <id>`.
fn id_map(block: Block, body: Vec<Located<Statement>>) -> Parse<IdMapDiagram> {
    let mut entries = Vec::new();
    let mut watermark = None;

    for statement in body {
        let (location, statement) = statement.split();
        let (name, text) = match statement {
            Statement::Declare { name, text } => (name, text),
            other => {
                debug!(?other, "ignoring non-entry line in identifier map");
                continue;
            }
        };

        let text = match text {
            Some(text) => text,
            None => return Err(Located::at(ParserError::MissingId(name), location)),
        };

        let id = text
            .parse::<i64>()
            .map_err(|_| Located::at(ParserError::BadId(text.clone()), location.clone()))?;

        if id < 0 {
            warn!(%name, id, "negative identifier accepted verbatim");
        }

        match name {
            Name::Pseudo => watermark = Some(id),
            Name::Id(name) => entries.push((Located::at(name, location), id)),
        }
    }

    if entries.windows(2).any(|pair| pair[0].1 > pair[1].1) {
        warn!(
            title = block.title().unwrap_or(""),
            "identifier map is not sorted by ascending id"
        );
    }

    Ok(IdMapDiagram {
        block,
        entries,
        watermark,
    })
}

fn diagram_kind(diagram: &Diagram) -> &'static str {
    match diagram {
        Diagram::Source(_) => "source",
        Diagram::StateIdMap(_) => "state-id map",
        Diagram::EventIdMap(_) => "event-id map",
        Diagram::Unknown(_) => "unknown",
    }
}
