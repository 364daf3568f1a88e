use crate::definition::{Destination, ShapeMode};
use crate::value::{Row, Value};

use super::context::ContextUpdate;

/// Why a result set could not be shaped as configured.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeProblem {
    /// A `row` query returned more than one row. `dump` is the rows as JSON.
    TooManyRows { rows: usize, dump: String },
    UnknownMode(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shaped {
    pub updates: Vec<ContextUpdate>,
    pub problem: Option<ShapeProblem>,
}

impl Shaped {
    fn updates(updates: Vec<ContextUpdate>) -> Self {
        Self {
            updates,
            problem: None,
        }
    }
}

/// Turns one query's rows into context updates according to its shape mode.
pub fn shape(mode: &ShapeMode, destination: &Destination, rows: Vec<Row>) -> Shaped {
    match mode {
        ShapeMode::Row => shape_row(destination, rows),
        ShapeMode::Table => shape_table(destination, rows),
        ShapeMode::Other(mode) => Shaped {
            updates: Vec::new(),
            problem: Some(ShapeProblem::UnknownMode(mode.clone())),
        },
    }
}

fn shape_row(destination: &Destination, mut rows: Vec<Row>) -> Shaped {
    match rows.len() {
        0 => Shaped::default(),
        1 => {
            let row = rows.remove(0);
            let update = match destination {
                Destination::Root => ContextUpdate::MergeRoot(row),
                Destination::Key(key) => ContextUpdate::Set(key.clone(), Value::Map(row)),
            };
            Shaped::updates(vec![update])
        }
        n => {
            let dump = serde_json::to_string(&rows).unwrap_or_default();
            let updates = match destination {
                Destination::Root => Vec::new(),
                Destination::Key(key) => {
                    vec![ContextUpdate::Set(key.clone(), Value::Map(Row::new()))]
                }
            };
            Shaped {
                updates,
                problem: Some(ShapeProblem::TooManyRows { rows: n, dump }),
            }
        }
    }
}

fn shape_table(destination: &Destination, rows: Vec<Row>) -> Shaped {
    // "." has no meaning for a collection; the rows land under the literal key.
    let key = destination.to_string();
    let length = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    let list = Value::List(rows.into_iter().map(Value::Map).collect());

    Shaped::updates(vec![
        ContextUpdate::Set(format!("{key}_length"), Value::Int(length)),
        ContextUpdate::Set(format!("{key}_max_index"), Value::Int(length - 1)),
        ContextUpdate::Set(key, list),
    ])
}
