//! Emisión de C para el runtime `bfx_fsm`.

use std::fmt::{self, Display, Write};

use super::{StateRecord, Tables};

/// Ancho de las líneas separadoras de sección.
pub const BANNER_WIDTH: usize = 113;

const CALLBACK_PARAMETERS: &str = "(BFX_FSM_ACTION_CTX *ctx, void *arg, uint16_t argSize)";

/// Archivo `<proyecto>.h`.
pub struct Header<'a>(pub &'a Tables);

/// Archivo `<proyecto>.c`.
pub struct Implementation<'a>(pub &'a Tables);

/// `door` → `door.h`
pub fn header_name(project: &str) -> String {
    format!("{}.h", project)
}

/// `door` → `door.c`
pub fn source_name(project: &str) -> String {
    format!("{}.c", project)
}

impl Display for Header<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Header(tables) = self;
        let project = &tables.project;
        let guard = format!("__BFX_{}_H__", project.to_uppercase());

        file_comment(fmt, &header_name(project), project)?;
        writeln!(fmt, "#ifndef {}", guard)?;
        writeln!(fmt, "#define {}", guard)?;
        writeln!(fmt)?;

        banner!(fmt, "headers import")?;
        writeln!(fmt, "#include \"bfx_fsm.h\"")?;
        writeln!(fmt)?;

        banner!(fmt, "state macros")?;
        for state in &tables.states {
            write!(fmt, "#define {} {}", state.macro_name, state.id)?;
            if !state.description.is_empty() {
                write!(fmt, " // {}", state.description)?;
            }

            writeln!(fmt)?;
        }

        writeln!(fmt)?;
        writeln!(fmt, "#define {} {}", tables.initial.macro_name, tables.initial.id)?;
        writeln!(fmt)?;

        banner!(fmt, "event macros")?;
        for event in &tables.events {
            writeln!(fmt, "#define {} {}", event.macro_name, event.id)?;
        }

        writeln!(fmt)?;
        banner!(fmt, "FSM generated")?;
        writeln!(fmt, "extern BFX_FSM_HANDLE g_{}_fsmHandle;", project)?;
        writeln!(fmt)?;

        banner!(fmt, "state callback")?;
        for state in &tables.states {
            writeln!(fmt, "__attribute__((weak)) void {}{};", state.callback, CALLBACK_PARAMETERS)?;
        }

        writeln!(fmt)?;
        writeln!(fmt, "#endif")
    }
}

impl Display for Implementation<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Implementation(tables) = self;
        let project = &tables.project;

        file_comment(fmt, &source_name(project), project)?;
        writeln!(fmt, "#ifdef __cplusplus")?;
        writeln!(fmt, "extern \"C\" {{")?;
        writeln!(fmt, "#endif")?;

        banner!(fmt, "headers import")?;
        writeln!(fmt, "#include <stddef.h>")?;
        writeln!(fmt, "#include \"{}\"", header_name(project))?;
        writeln!(fmt)?;

        banner!(fmt, "state callback")?;
        for state in &tables.states {
            writeln!(fmt, "__attribute__((weak)) void {}{}", state.callback, CALLBACK_PARAMETERS)?;
            writeln!(fmt, "{{")?;
            writeln!(fmt, "}}")?;
            writeln!(fmt)?;
        }

        banner!(fmt, "state table")?;
        for table in &tables.transitions {
            writeln!(fmt, "const BFX_FSM_TRAN_RECORD {}[] = {{", table.name)?;
            for row in &table.rows {
                let mut line = format!("{{ {}, {} }},", row.event, row.target);
                if let Some(comment) = &row.comment {
                    write!(line, " ///< {}", comment)?;
                }

                emit!(fmt, "{}", line)?;
            }

            writeln!(fmt, "}};")?;
            writeln!(fmt)?;
        }

        writeln!(fmt, "const BFX_FSM_STATE g_{}_allstatus[] = {{", project)?;
        for (index, state) in tables.states.iter().enumerate() {
            let separator = if index + 1 < tables.states.len() { "," } else { "" };

            emit!(fmt, "{{")?;
            state_row(fmt, state)?;
            emit!(fmt, "}}{}", separator)?;
        }

        writeln!(fmt, "}};")?;
        writeln!(fmt)?;

        banner!(fmt, "FSM handle")?;
        writeln!(fmt, "BFX_FSM_HANDLE g_{}_fsmHandle = {{", project)?;
        emit!(fmt, ".stateTbl = g_{}_allstatus,", project)?;
        emit!(fmt, ".stateCnt = sizeof(g_{}_allstatus) / sizeof(BFX_FSM_STATE),", project)?;
        emit!(fmt, ".currentStateId = {},", tables.initial.macro_name)?;
        writeln!(fmt, "}};")?;

        writeln!(fmt, "#ifdef __cplusplus")?;
        writeln!(fmt, "}}")?;
        writeln!(fmt, "#endif")
    }
}

/// Cuerpo de una entrada de `g_<proyecto>_allstatus`.
fn state_row(fmt: &mut fmt::Formatter<'_>, state: &StateRecord) -> fmt::Result {
    let indent = "        ";
    writeln!(
        fmt,
        "{}{}, {}, {},",
        indent, state.macro_name, state.default_id, state.parent_id
    )?;

    match &state.table {
        Some(table) => writeln!(
            fmt,
            "{}sizeof({}) / sizeof(BFX_FSM_TRAN_RECORD), {},",
            indent, table, table
        )?,

        // Un estado sin transiciones no reserva tabla alguna
        None => writeln!(fmt, "{}0, (BFX_FSM_TRAN_RECORD const *)NULL,", indent)?,
    }

    writeln!(fmt, "{}{}", indent, state.callback)
}

fn file_comment(fmt: &mut fmt::Formatter<'_>, file: &str, project: &str) -> fmt::Result {
    writeln!(fmt, "/**")?;
    writeln!(fmt, " * @file {}", file)?;
    writeln!(fmt, " * @brief FSM of {}", project)?;
    writeln!(fmt, " * @generator {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))?;
    writeln!(fmt, "**/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{EventRecord, InitialState, Row, TransitionTable};

    fn tables() -> Tables {
        let idle = StateRecord {
            full_name: "Idle".into(),
            id: 1,
            macro_name: "DOOR_IDLE".into(),
            description: "initial state".into(),
            default_id: "DOOR_IDLE".into(),
            parent_id: "BFX_STATUS_FATHER_NONE".into(),
            table: Some("g_door_idle_TransTbl".into()),
            callback: "BFX_door_Idle_ActionCb".into(),
        };

        let open = StateRecord {
            full_name: "Open".into(),
            id: 0,
            macro_name: "DOOR_OPEN".into(),
            description: String::new(),
            default_id: "DOOR_OPEN".into(),
            parent_id: "BFX_STATUS_FATHER_NONE".into(),
            table: None,
            callback: "BFX_door_Open_ActionCb".into(),
        };

        Tables {
            project: "door".into(),
            states: vec![idle, open],
            events: vec![EventRecord {
                macro_name: "DOOR_PUSH".into(),
                id: 0,
            }],
            transitions: vec![TransitionTable {
                name: "g_door_idle_TransTbl".into(),
                state: "Idle".into(),
                rows: vec![Row {
                    event: "DOOR_PUSH".into(),
                    target: "DOOR_OPEN".into(),
                    comment: Some("open up".into()),
                }],
            }],
            initial: InitialState {
                macro_name: "DOOR_INITIAL_STATE".into(),
                id: 1,
            },
        }
    }

    #[test]
    fn header_macros() {
        let header = Header(&tables()).to_string();

        assert!(header.contains("#ifndef __BFX_DOOR_H__\n#define __BFX_DOOR_H__\n"));
        assert!(header.contains("#define DOOR_IDLE 1 // initial state\n#define DOOR_OPEN 0\n"));
        assert!(header.contains("#define DOOR_INITIAL_STATE 1\n"));
        assert!(header.contains("#define DOOR_PUSH 0\n"));
        assert!(header.contains("extern BFX_FSM_HANDLE g_door_fsmHandle;\n"));
        assert!(header.contains(
            "__attribute__((weak)) void BFX_door_Open_ActionCb(BFX_FSM_ACTION_CTX *ctx, void *arg, uint16_t argSize);\n"
        ));
        assert!(header.ends_with("#endif\n"));
    }

    #[test]
    fn banners_have_fixed_width() {
        let header = Header(&tables()).to_string();
        let banners: Vec<_> = header.lines().filter(|line| line.starts_with("/* ")).collect();

        assert_eq!(banners.len(), 5);
        assert!(banners.iter().all(|line| line.chars().count() == BANNER_WIDTH));
        assert!(banners[0].starts_with("/* headers import ---"));
    }

    #[test]
    fn transition_and_state_tables() {
        let source = Implementation(&tables()).to_string();

        assert!(source.contains("#include \"door.h\"\n"));
        assert!(source.contains(
            "const BFX_FSM_TRAN_RECORD g_door_idle_TransTbl[] = {\n    { DOOR_PUSH, DOOR_OPEN }, ///< open up\n};\n"
        ));

        assert!(source.contains(
            "    {\n        DOOR_IDLE, DOOR_IDLE, BFX_STATUS_FATHER_NONE,\n        \
             sizeof(g_door_idle_TransTbl) / sizeof(BFX_FSM_TRAN_RECORD), g_door_idle_TransTbl,\n        \
             BFX_door_Idle_ActionCb\n    },\n"
        ));

        assert!(source.contains(
            "        0, (BFX_FSM_TRAN_RECORD const *)NULL,\n        BFX_door_Open_ActionCb\n    }\n};\n"
        ));

        assert!(!source.contains("g_door_open_TransTbl"));
        assert!(source.contains(".currentStateId = DOOR_INITIAL_STATE,\n"));
    }
}
