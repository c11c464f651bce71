//! Pd patch-text parser.
//!
//! Reads the line-based Pd file format, one logical statement per
//! semicolon, and builds the object graph through the engine:
//!
//! - `#N canvas` pushes a (sub)graph; the first one is the root.
//! - `#X obj` constructs objects through the factory, falling back to
//!   abstraction loading (`<label>.pd` on the declared search paths).
//! - `#X msg`, `#X floatatom`, `#X symbolatom`, `#X text` construct the
//!   statement-specific objects.
//! - `#X connect` adds typed connections by graph ordinal.
//! - `#X declare -path` extends the abstraction search path.
//! - `#X array` plus `#A` lines allocate and fill a table; the trailing
//!   `#X coords` line is skipped.
//! - `#X restore` pops back to the parent graph.
//!
//! `$1..$n` in object init strings resolve against the enclosing graph's
//! argument vector before the factory sees them; `$0` resolves to the
//! patch-file id. Message boxes keep their dollar slots, which bind to the
//! triggering message at runtime.
//!
//! Two-phase where it matters: statement splitting is pure string work,
//! graph building goes through the engine's host API.

use std::path::{Path, PathBuf};

use telar_core::{Atom, Engine, GraphId, Message, PatchError, Symbol};
use telar_objects::{BangObject, FloatObject, MessageBox, SymbolObject, TableObject, Text, Toggle};
use telar_registry::{FactoryError, ObjectRegistry};
use thiserror::Error;
use tracing::debug;

/// Errors that abort a patch load.
///
/// Per the runtime's error taxonomy these are the *patch errors*: malformed
/// files, unknown objects, missing abstractions. They are also surfaced on
/// the engine console before being returned.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The patch file could not be read.
    #[error("could not open patch '{path}': {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file does not begin with a `#N canvas` statement.
    #[error("file does not define a canvas: \"{first_line}\"")]
    NotAPatch {
        /// What the first statement actually was.
        first_line: String,
    },

    /// A statement was too short or numerically malformed.
    #[error("malformed statement {index}: \"{statement}\"")]
    Malformed {
        /// Zero-based statement index.
        index: usize,
        /// The statement text.
        statement: String,
    },

    /// An object label that is neither built-in nor a findable abstraction.
    #[error("unknown object or abstraction \"{0}\"")]
    UnknownObject(String),

    /// A recognized label without a backend in this build.
    #[error("object \"{0}\" is not supported in this build")]
    UnsupportedObject(String),

    /// Graph construction failed (bad connection indices and the like).
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Loads and parses `filename` inside `directory`, returning the new
/// top-level graph. The graph is not attached; call
/// [`Engine::attach_graph`] when ready.
pub fn load_patch(
    engine: &mut Engine,
    registry: &ObjectRegistry,
    directory: &Path,
    filename: &str,
) -> Result<GraphId, ParseError> {
    let path = directory.join(filename);
    let text = std::fs::read_to_string(&path).map_err(|source| {
        engine.print_err(&format!("the file {} could not be opened", path.display()));
        ParseError::Io { path, source }
    })?;
    parse_patch(engine, registry, &text, directory)
}

/// Parses patch text as a new top-level graph rooted at `directory` (used
/// for abstraction lookup).
pub fn parse_patch(
    engine: &mut Engine,
    registry: &ObjectRegistry,
    text: &str,
    directory: &Path,
) -> Result<GraphId, ParseError> {
    let graph = parse_internal(engine, registry, text, directory, None)?;
    engine.compute_dsp_order(graph)?;
    Ok(graph)
}

fn parse_internal(
    engine: &mut Engine,
    registry: &ObjectRegistry,
    text: &str,
    directory: &Path,
    abstraction: Option<(GraphId, Vec<Atom>)>,
) -> Result<GraphId, ParseError> {
    let statements = split_statements(text);
    let mut iter = statements.iter().enumerate();

    // The first statement must open the root canvas.
    let Some((_, first)) = iter.next() else {
        return Err(ParseError::NotAPatch {
            first_line: String::new(),
        });
    };
    if !first.starts_with("#N canvas") {
        engine.print_err(&format!("first statement does not define a canvas: {first}"));
        return Err(ParseError::NotAPatch {
            first_line: first.clone(),
        });
    }

    let root = match abstraction {
        None => engine.new_top_graph(vec![]),
        Some((parent, args)) => engine.new_abstraction(parent, args)?,
    };
    engine.graph_mut(root)?.add_declared_path(directory);

    let mut stack = vec![root];
    let mut current_array: Option<Symbol> = None;

    for (index, statement) in iter {
        let current = *stack.last().unwrap_or(&root);
        let mut tokens = statement.split_whitespace();
        let hash = tokens.next().unwrap_or("");
        match hash {
            "#N" => {
                if tokens.next() == Some("canvas") {
                    let sub = engine.new_subpatch(current)?;
                    stack.push(sub);
                } else {
                    engine.print_err(&format!("unrecognised #N statement: {statement}"));
                }
            }
            "#X" => {
                let kind = tokens.next().unwrap_or("");
                match kind {
                    "obj" => {
                        parse_obj(engine, registry, directory, current, statement, index)?;
                    }
                    "msg" => {
                        let raw = rest_after(statement, 4).replace("\\;", ";").replace("\\$", "$");
                        engine.add_object(current, Box::new(MessageBox::new(&raw)))?;
                    }
                    "connect" => {
                        let indices: Vec<usize> = tokens
                            .filter_map(|t| t.parse::<usize>().ok())
                            .collect();
                        let &[from, outlet, to, inlet] = indices.as_slice() else {
                            return Err(ParseError::Malformed {
                                index,
                                statement: statement.clone(),
                            });
                        };
                        engine.connect_by_index(current, from, outlet, to, inlet)?;
                    }
                    "floatatom" | "nbx" | "hsl" | "vsl" => {
                        engine.add_object(
                            current,
                            Box::new(FloatObject::new(&Message::new(0.0, vec![]))),
                        )?;
                    }
                    "tgl" => {
                        engine
                            .add_object(current, Box::new(Toggle::new(&Message::new(0.0, vec![]))))?;
                    }
                    "bng" => {
                        engine.add_object(current, Box::new(BangObject))?;
                    }
                    "symbolatom" => {
                        engine.add_object(
                            current,
                            Box::new(SymbolObject::new(&Message::new(0.0, vec![]))),
                        )?;
                    }
                    "text" => {
                        engine.add_object(current, Box::new(Text))?;
                    }
                    "declare" => {
                        let flags: Vec<&str> = tokens.collect();
                        if flags.first() == Some(&"-path") {
                            if let Some(p) = flags.get(1) {
                                let path = directory.join(p);
                                engine.graph_mut(current)?.add_declared_path(path);
                            }
                        } else {
                            engine.print_err(&format!(
                                "declare flag \"{}\" is not supported",
                                flags.first().unwrap_or(&"")
                            ));
                        }
                    }
                    "array" => {
                        let (file_id, args) = graph_env(engine, current)?;
                        let name = tokens
                            .next()
                            .map(|t| resolve_dollars(t, &args, file_id))
                            .unwrap_or_default();
                        let len = tokens
                            .next()
                            .and_then(|t| t.parse::<f32>().ok())
                            .unwrap_or(100.0);
                        let init = Message::new(
                            0.0,
                            vec![Atom::symbol(&name), Atom::Float(len)],
                        );
                        engine.add_object(current, Box::new(TableObject::new(&init)))?;
                        current_array = Some(Symbol::new(name));
                    }
                    // The coords line following an array is display-only.
                    "coords" => {}
                    "restore" => {
                        if stack.len() > 1 {
                            stack.pop();
                        }
                    }
                    other => {
                        engine.print_err(&format!(
                            "unrecognised #X object type \"{other}\" in: {statement}"
                        ));
                    }
                }
            }
            "#A" => {
                let Some(name) = current_array.clone() else {
                    engine.print_err("#A data outside of an array definition");
                    continue;
                };
                let mut start = 0usize;
                let mut values = Vec::new();
                for (i, token) in tokens.enumerate() {
                    if i == 0 {
                        start = token.parse().unwrap_or(0);
                    } else if let Ok(v) = token.parse::<f32>() {
                        values.push(v);
                    }
                }
                if let Some(table) = engine.registry_mut().table_mut(&name) {
                    for (offset, value) in values.into_iter().enumerate() {
                        table.write((start + offset) as i64, value);
                    }
                }
            }
            other => {
                engine.print_err(&format!("unrecognised statement type \"{other}\""));
            }
        }
    }

    Ok(root)
}

/// Handles one `#X obj` statement: factory first, then abstraction lookup.
fn parse_obj(
    engine: &mut Engine,
    registry: &ObjectRegistry,
    directory: &Path,
    current: GraphId,
    statement: &str,
    index: usize,
) -> Result<(), ParseError> {
    let mut tokens = statement.split_whitespace().skip(2);
    let (Some(_x), Some(_y)) = (tokens.next(), tokens.next()) else {
        return Err(ParseError::Malformed {
            index,
            statement: statement.to_string(),
        });
    };
    let Some(label) = tokens.next() else {
        // An empty object box: keep the ordinal with an inert placeholder.
        engine.add_object(current, Box::new(Text))?;
        return Ok(());
    };

    let (file_id, args) = graph_env(engine, current)?;
    let label = resolve_dollars(label, &args, file_id);
    let init_atoms: Vec<Atom> = tokens
        .map(|t| Atom::parse_token(&resolve_dollars(t, &args, file_id)))
        .collect();
    let init = Message::new(0.0, init_atoms);
    let env = engine.object_env();

    match registry.create(&label, &init, &env) {
        Ok(object) => {
            engine.add_object(current, object)?;
            Ok(())
        }
        Err(FactoryError::Unsupported(label)) => {
            engine.print_err(&format!("object \"{label}\" is not supported in this build"));
            Err(ParseError::UnsupportedObject(label))
        }
        Err(FactoryError::Unknown(label)) => {
            // Not built in: try to load `<label>.pd` as an abstraction.
            let filename = format!("{label}.pd");
            match find_abstraction(engine, current, &filename) {
                Some(path) => {
                    debug!(label, path = %path.display(), "loading abstraction");
                    let text = std::fs::read_to_string(&path).map_err(|source| {
                        ParseError::Io {
                            path: path.clone(),
                            source,
                        }
                    })?;
                    let dir = path.parent().unwrap_or(directory).to_path_buf();
                    parse_internal(
                        engine,
                        registry,
                        &text,
                        &dir,
                        Some((current, init.atoms().to_vec())),
                    )?;
                    Ok(())
                }
                None => {
                    engine.print_err(&format!("unknown object or abstraction \"{label}\""));
                    Err(ParseError::UnknownObject(label))
                }
            }
        }
    }
}

/// The enclosing graph's file id and argument vector.
fn graph_env(engine: &Engine, graph: GraphId) -> Result<(u32, Vec<Atom>), ParseError> {
    let g = engine.graph(graph)?;
    Ok((g.file_id(), g.args().to_vec()))
}

/// Searches the declared paths of `graph` and its ancestors for `filename`.
fn find_abstraction(engine: &Engine, graph: GraphId, filename: &str) -> Option<PathBuf> {
    let mut cursor = Some(graph);
    while let Some(id) = cursor {
        let g = engine.graph(id).ok()?;
        for base in g.declared_paths() {
            let candidate = base.join(filename);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        cursor = g.parent();
    }
    None
}

/// Splits patch text into logical statements: semicolon-terminated, with
/// `\;` escapes preserved and newlines folded to spaces.
fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut buffer = String::new();
    let mut escaped = false;
    for ch in text.chars() {
        match ch {
            ';' if !escaped => {
                let statement = buffer.split_whitespace().collect::<Vec<_>>().join(" ");
                if !statement.is_empty() {
                    statements.push(statement);
                }
                buffer.clear();
            }
            '\\' => {
                escaped = true;
                buffer.push(ch);
                continue;
            }
            '\n' | '\r' => buffer.push(' '),
            _ => buffer.push(ch),
        }
        escaped = false;
    }
    let trailing = buffer.split_whitespace().collect::<Vec<_>>().join(" ");
    if !trailing.is_empty() {
        statements.push(trailing);
    }
    statements
}

/// The raw remainder of a statement after its first `n` tokens.
fn rest_after(statement: &str, n: usize) -> String {
    let mut rest = statement;
    for _ in 0..n {
        rest = rest.trim_start();
        match rest.find(char::is_whitespace) {
            Some(pos) => rest = &rest[pos..],
            None => return String::new(),
        }
    }
    rest.trim().to_string()
}

/// Replaces `$<digits>` slots in a token: `$0` with the patch-file id,
/// `$n` with the enclosing graph's n-th argument. Missing arguments become
/// `0`.
fn resolve_dollars(token: &str, args: &[Atom], file_id: u32) -> String {
    if !token.contains('$') {
        return token.to_string();
    }
    let bytes = token.as_bytes();
    let mut out = String::with_capacity(token.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 {
                let n: usize = token[i + 1..j].parse().unwrap_or(0);
                if n == 0 {
                    out.push_str(&file_id.to_string());
                } else {
                    match args.get(n - 1) {
                        Some(atom) => out.push_str(&atom.to_string()),
                        None => out.push('0'),
                    }
                }
                i = j;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_folds_lines_and_escapes() {
        let text = "#N canvas 0 0 100 100 10;\n#X msg 5 5 set \\; reset;\n#X obj 1 2 f;";
        let statements = split_statements(text);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[1], "#X msg 5 5 set \\; reset");
    }

    #[test]
    fn test_rest_after_keeps_raw_text() {
        assert_eq!(rest_after("#X msg 10 20 pitch $1 42", 4), "pitch $1 42");
        assert_eq!(rest_after("#X msg 10 20", 4), "");
    }

    #[test]
    fn test_resolve_dollars() {
        let args = vec![Atom::Float(440.0), Atom::symbol("saw")];
        assert_eq!(resolve_dollars("$1", &args, 7), "440");
        assert_eq!(resolve_dollars("$2", &args, 7), "saw");
        assert_eq!(resolve_dollars("$3", &args, 7), "0");
        assert_eq!(resolve_dollars("$0-voice", &args, 7), "7-voice");
        assert_eq!(resolve_dollars("plain", &args, 7), "plain");
    }
}
