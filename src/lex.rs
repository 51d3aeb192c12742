//! Análisis léxico.
//!
//! # Tokenización
//! Esta es la primera fase del compilador. A diferencia de un lenguaje
//! de propósito general, la gramática de diagramas de estados es
//! orientada a líneas: cada línea no blanca describe a lo sumo un
//! constructo completo. Por tanto, el lexer clasifica líneas enteras
//! en lugar de caracteres individuales, y cada [`Token`] emitido
//! corresponde a exactamente una línea del diagrama.
//!
//! # Prioridad de clasificación
//! Para cada línea se prueba, en este orden:
//! 1. Marcadores de bloque (`@startuml`, `@enduml`).
//! 2. Apertura de estado compuesto: `state <Nombre> {`.
//! 3. Cierre de estado compuesto: `}`.
//! 4. Transiciones (`-->`), incluyendo el marcador inicial `[*] --> X`.
//! 5. Declaraciones: `<Nombre> : <texto>`.
//!
//! Cualquier otra línea (por ejemplo, `skinparam` o `hide empty description`)
//! se descarta. También se descarta todo texto fuera de un bloque.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores se componen de letras ASCII, dígitos y `'_'`.
//! - Una referencia puede calificarse con `'.'`, como en `Padre.Hijo`.
//! - Las palabras clave son case-insensitive, los identificadores no.
//!
//! # Errores
//! El lexer se recupera al inicio de cada línea, por lo cual es capaz
//! de reportar todos los errores léxicos de un archivo en una sola
//! ejecución, pero no de permitir el avance a las demás fases.

use crate::source::Located;
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;
use tracing::trace;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Notación del pseudoestado inicial.
pub const PSEUDO_STATE: &str = "[*]";

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Un nombre de estado o evento contiene caracteres inválidos.
    #[error("Malformed identifier `{0}`")]
    BadIdentifier(String),

    /// Se encontró `state` sin un nombre a continuación.
    #[error("Expected a state name after `state`")]
    MissingStateName,

    /// Una transición carece del separador `:` o del nombre del evento.
    #[error("Transition has no event, expected `source --> target : event`")]
    MissingEvent,

    /// Los eventos viven en un único espacio de nombres global.
    #[error("Events are global and cannot be qualified: `{0}`")]
    QualifiedEvent(String),
}

/// Un identificador.
///
/// A diferencia de las palabras clave, los identificadores distinguen
/// entre mayúsculas y minúsculas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl Identifier {
    /// Valida y construye un identificador, posiblemente calificado.
    pub fn parse(string: &str) -> Result<Self, LexerError> {
        let valid = !string.is_empty()
            && string
                .split('.')
                .all(|segment| !segment.is_empty() && segment.chars().all(is_word_char));

        if valid {
            Ok(Identifier(Rc::from(string)))
        } else {
            Err(LexerError::BadIdentifier(string.to_owned()))
        }
    }

    /// Determina si el identificador incluye una ruta explícita.
    pub fn is_qualified(&self) -> bool {
        self.0.contains('.')
    }

    /// Nombre con separadores normalizados a `'_'`.
    pub fn normalized(&self) -> String {
        self.0.replace('.', "_")
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Un extremo de transición o nombre declarado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Name {
    /// `[*]`
    Pseudo,

    /// Un estado con nombre.
    Id(Identifier),
}

impl Name {
    fn parse(string: &str) -> Result<Self, LexerError> {
        if string == PSEUDO_STATE {
            Ok(Name::Pseudo)
        } else {
            Identifier::parse(string).map(Name::Id)
        }
    }
}

impl Display for Name {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Pseudo => fmt.write_str(PSEUDO_STATE),
            Name::Id(id) => id.fmt(fmt),
        }
    }
}

/// Contenido de una línea dentro de un bloque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `state <Nombre> {`
    Open(Identifier),

    /// `}`
    Close,

    /// `<Nombre> : <texto>` o `state <Nombre>`.
    ///
    /// El texto es `None` únicamente en la forma `state <Nombre>`,
    /// la cual no altera descripciones previas.
    Declare { name: Name, text: Option<String> },

    /// `<origen> --> <destino> : <evento>[/<comentario>]`
    Transition {
        source: Name,
        target: Name,
        event: Identifier,
        comment: Option<String>,
    },

    /// `[*] --> <destino>`
    Initial(Identifier),
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `@startuml`, con su título opcional.
    Begin(Option<String>),

    /// `@enduml`
    End,

    /// Cualquier otra línea significativa.
    Statement(Statement),
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    StartUml,
    EndUml,
    State,
    Title,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            StartUml => "@startuml",
            EndUml   => "@enduml",
            State    => "state",
            Title    => "title",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
            (NoCase::new("@startuml"), StartUml),
            (NoCase::new("@enduml"),   EndUml),
            (NoCase::new("state"),     State),
            (NoCase::new("title"),     Title),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Clasificador de líneas.
///
/// El único estado que conserva el lexer es si se encuentra o no
/// dentro de un bloque `@startuml`/`@enduml`, ya que el texto fuera
/// de bloques no se analiza.
pub struct Lexer<I> {
    lines: I,
    inside: bool,
}

impl<'a, I> Lexer<I>
where
    I: Iterator<Item = Located<&'a str>>,
{
    /// Crea un lexer a partir de líneas ya ubicadas, como las que
    /// produce [`crate::source::Source::lines()`].
    pub fn new(lines: I) -> Self {
        Lexer {
            lines,
            inside: false,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores, con tal de reportarlos todos en una misma ejecución.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Clasifica una línea ya recortada.
    fn scan(&mut self, line: &str) -> Result<Option<Token>, LexerError> {
        if line.is_empty() || line.starts_with('\'') {
            return Ok(None);
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        // Un estado puede llamarse igual que una palabra clave,
        // lo cual se distingue por lo que sigue a la palabra
        let keyword = match Keyword::from_str(head) {
            Ok(_) if rest.starts_with("-->") || rest.starts_with(':') => None,
            keyword => keyword.ok(),
        };

        match keyword {
            Some(Keyword::StartUml) => {
                self.inside = true;
                let title = Some(rest).filter(|rest| !rest.is_empty()).map(String::from);

                return Ok(Some(Token::Begin(title)));
            }

            // Un `@enduml` huérfano se emite para que el parser lo rechace
            Some(Keyword::EndUml) => {
                self.inside = false;
                return Ok(Some(Token::End));
            }

            _ if !self.inside => {
                trace!(line, "skipping text outside of a diagram block");
                return Ok(None);
            }

            Some(Keyword::Title) => return Ok(None),
            Some(Keyword::State) => return state_line(rest).map(|s| Some(Token::Statement(s))),
            None => (),
        }

        let statement = if line == "}" {
            Statement::Close
        } else if let Some((left, right)) = line.split_once("-->") {
            arrow(left.trim(), right.trim())?
        } else if let Some((left, right)) = line.split_once(':') {
            // "S1, S2: texto" declara únicamente al primer nombre
            let name = left.split(',').next().unwrap_or(left).trim();

            Statement::Declare {
                name: Name::parse(name)?,
                text: Some(right.trim().to_owned()),
            }
        } else {
            trace!(line, "ignoring unrecognized line");
            return Ok(None);
        };

        Ok(Some(Token::Statement(statement)))
    }
}

impl<'a, I> Iterator for Lexer<I>
where
    I: Iterator<Item = Located<&'a str>>,
{
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (location, line) = self.lines.next()?.split();

            match self.scan(line) {
                Ok(None) => continue,
                Ok(Some(token)) => break Some(Ok(Located::at(token, location))),
                Err(error) => break Some(Err(Located::at(error, location))),
            }
        }
    }
}

/// Resto de una línea que inicia con `state`.
fn state_line(rest: &str) -> Result<Statement, LexerError> {
    if let Some(name) = rest.strip_suffix('{') {
        let name = name.trim();
        if name.is_empty() {
            return Err(LexerError::MissingStateName);
        }

        Identifier::parse(name).map(Statement::Open)
    } else if let Some((name, text)) = rest.split_once(':') {
        Ok(Statement::Declare {
            name: Name::Id(Identifier::parse(name.trim())?),
            text: Some(text.trim().to_owned()),
        })
    } else if rest.is_empty() {
        Err(LexerError::MissingStateName)
    } else {
        Ok(Statement::Declare {
            name: Name::Id(Identifier::parse(rest)?),
            text: None,
        })
    }
}

/// Una línea con `-->`, ya dividida en sus dos lados.
fn arrow(left: &str, right: &str) -> Result<Statement, LexerError> {
    let source = Name::parse(left)?;

    let (target, label) = match right.split_once(':') {
        Some((target, label)) => (target.trim(), label.trim()),

        // Sin evento solo se admite el marcador inicial
        None if source == Name::Pseudo => return Identifier::parse(right).map(Statement::Initial),
        None => return Err(LexerError::MissingEvent),
    };

    let (event, comment) = match label.split_once('/') {
        Some((event, comment)) => (event.trim(), Some(comment.trim())),
        None => (label, None),
    };

    if event.is_empty() {
        return Err(LexerError::MissingEvent);
    }

    let event = Identifier::parse(event)?;
    if event.is_qualified() {
        return Err(LexerError::QualifiedEvent(event.to_string()));
    }

    Ok(Statement::Transition {
        source,
        target: Name::parse(target)?,
        event,
        comment: comment.filter(|c| !c.is_empty()).map(String::from),
    })
}

/// Determina si un carácter puede pertenecer a un identificador.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    fn lex(text: &str) -> Vec<Token> {
        let source = Source::new("test.puml", text);
        Lexer::new(source.lines())
            .try_exhaustive()
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn id(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    fn statements(body: &str) -> Vec<Statement> {
        lex(&format!("@startuml\n{}\n@enduml", body))
            .into_iter()
            .filter_map(|token| match token {
                Token::Statement(statement) => Some(statement),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn block_markers_and_title() {
        let tokens = lex("@startuml door\n@ENDUML\n@startuml\n@enduml");
        assert_eq!(
            tokens,
            vec![
                Token::Begin(Some("door".into())),
                Token::End,
                Token::Begin(None),
                Token::End
            ]
        );
    }

    #[test]
    fn text_outside_blocks_is_skipped() {
        let tokens = lex("not a ! diagram\n@startuml\n@enduml\nA -> B ??");
        assert_eq!(tokens, vec![Token::Begin(None), Token::End]);
    }

    #[test]
    fn classifies_each_construct() {
        let found = statements(
            "title Door\n\
             state Open {\n\
             Idle: waiting: forever\n\
             [*] --> Idle\n\
             Idle --> Busy : Start/kick off\n\
             }\n\
             skinparam monochrome true\n\
             state Closed\n",
        );

        assert_eq!(
            found,
            vec![
                Statement::Open(id("Open")),
                Statement::Declare {
                    name: Name::Id(id("Idle")),
                    text: Some("waiting: forever".into()),
                },
                Statement::Initial(id("Idle")),
                Statement::Transition {
                    source: Name::Id(id("Idle")),
                    target: Name::Id(id("Busy")),
                    event: id("Start"),
                    comment: Some("kick off".into()),
                },
                Statement::Close,
                Statement::Declare {
                    name: Name::Id(id("Closed")),
                    text: None,
                },
            ]
        );
    }

    #[test]
    fn keywords_can_name_states() {
        let found = statements("state --> title : go\nstate: a state");
        assert_eq!(
            found,
            vec![
                Statement::Transition {
                    source: Name::Id(id("state")),
                    target: Name::Id(id("title")),
                    event: id("go"),
                    comment: None,
                },
                Statement::Declare {
                    name: Name::Id(id("state")),
                    text: Some("a state".into()),
                },
            ]
        );
    }

    #[test]
    fn comma_separated_declaration_keeps_first_name() {
        let found = statements("S1, S2: shared");
        assert_eq!(
            found,
            vec![Statement::Declare {
                name: Name::Id(id("S1")),
                text: Some("shared".into()),
            }]
        );
    }

    #[test]
    fn pseudo_state_watermark_line() {
        let found = statements("[*]: 7");
        assert_eq!(
            found,
            vec![Statement::Declare {
                name: Name::Pseudo,
                text: Some("7".into()),
            }]
        );
    }

    #[test]
    fn qualified_references() {
        let found = statements("A --> P.Child : go");
        match &found[0] {
            Statement::Transition { target: Name::Id(target), .. } => {
                assert!(target.is_qualified());
                assert_eq!(target.normalized(), "P_Child");
            }

            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reports_every_bad_line() {
        let source = Source::new(
            "bad.puml",
            "@startuml\nA --> B\nok: fine\nbad name: x\nA --> B : a.b\nA --> B :\n@enduml",
        );

        let errors = Lexer::new(source.lines()).try_exhaustive().unwrap_err();
        let lines: Vec<_> = errors.iter().map(|e| e.location().start().line()).collect();
        assert_eq!(lines, vec![2, 4, 5, 6]);

        assert!(matches!(errors[0].as_ref(), LexerError::MissingEvent));
        assert!(matches!(errors[1].as_ref(), LexerError::BadIdentifier(name) if name == "bad name"));
        assert!(matches!(errors[2].as_ref(), LexerError::QualifiedEvent(_)));
        assert!(matches!(errors[3].as_ref(), LexerError::MissingEvent));
    }
}
