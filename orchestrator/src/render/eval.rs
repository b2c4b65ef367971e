//! Single-pass evaluation of a parsed template

use std::collections::BTreeMap;

use serde_json::Value;

use crate::params::schema::is_truthy;
use crate::render::functions::{self, canonical, Arg};
use crate::render::parser::{Command, Node, Operand, Pipeline};
use crate::render::RenderError;

/// One level of the scope chain: the current element plus declared variables
struct Frame {
    dot: Value,
    vars: BTreeMap<String, Value>,
}

struct Evaluator {
    frames: Vec<Frame>,
    out: String,
}

pub(crate) fn execute(
    nodes: &[Node],
    root: Value,
    vars: BTreeMap<String, Value>,
) -> Result<String, RenderError> {
    let mut evaluator = Evaluator {
        frames: vec![Frame { dot: root, vars }],
        out: String::new(),
    };
    evaluator.walk(nodes)?;
    Ok(evaluator.out)
}

impl Evaluator {
    fn walk(&mut self, nodes: &[Node]) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Output(pipeline) => {
                    let value = strict(self.pipeline(pipeline, false)?)?;
                    self.out.push_str(&canonical(&value));
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mut taken = None;
                    for (cond, body) in branches {
                        if self.condition(cond)? {
                            taken = Some(body);
                            break;
                        }
                    }
                    self.walk(taken.unwrap_or(otherwise))?;
                }
                Node::Range {
                    label,
                    key,
                    value,
                    source,
                    body,
                    otherwise,
                } => {
                    let items: Vec<(Value, Value)> = match strict(self.pipeline(source, false)?)? {
                        Value::Array(items) => items
                            .into_iter()
                            .enumerate()
                            .map(|(i, item)| (Value::from(i), item))
                            .collect(),
                        Value::Object(map) => map
                            .into_iter()
                            .map(|(k, item)| (Value::String(k), item))
                            .collect(),
                        Value::Null => Vec::new(),
                        _ => {
                            return Err(RenderError::NotIterable {
                                name: label.clone(),
                            })
                        }
                    };

                    if items.is_empty() {
                        self.walk(otherwise)?;
                        continue;
                    }
                    for (item_key, item) in items {
                        let mut vars = BTreeMap::new();
                        if let Some(key) = key {
                            vars.insert(key.clone(), item_key);
                        }
                        if let Some(value) = value {
                            vars.insert(value.clone(), item.clone());
                        }
                        self.frames.push(Frame { dot: item, vars });
                        let result = self.walk(body);
                        self.frames.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Conditions treat unresolved references as null
    fn condition(&self, pipeline: &Pipeline) -> Result<bool, RenderError> {
        Ok(match self.pipeline(pipeline, true)? {
            Arg::Value(value) => is_truthy(&value),
            Arg::Missing(_) => false,
        })
    }

    fn pipeline(&self, pipeline: &Pipeline, lenient: bool) -> Result<Arg, RenderError> {
        let mut piped: Option<Arg> = None;
        for command in &pipeline.commands {
            let result = match command {
                Command::Operand(operand) => self.operand(operand, lenient)?,
                Command::Call { name, args } => {
                    let mut values = args
                        .iter()
                        .map(|arg| self.operand(arg, lenient))
                        .collect::<Result<Vec<_>, _>>()?;
                    if let Some(previous) = piped.take() {
                        values.push(previous);
                    }
                    Arg::Value(functions::call(name, values, lenient)?)
                }
            };
            piped = Some(result);
        }
        Ok(piped.unwrap_or(Arg::Value(Value::Null)))
    }

    fn operand(&self, operand: &Operand, lenient: bool) -> Result<Arg, RenderError> {
        let found = match operand {
            Operand::Literal(value) => return Ok(Arg::Value(value.clone())),
            Operand::Group(pipeline) => return self.pipeline(pipeline, lenient),
            Operand::Dot(path) if path.is_empty() => self.frames.last().map(|f| f.dot.clone()),
            Operand::Dot(path) => self.lookup(path),
            Operand::Name { name, path } => {
                let mut full = vec![name.clone()];
                full.extend(path.iter().cloned());
                self.lookup(&full)
            }
            Operand::Root(path) => self
                .frames
                .first()
                .and_then(|f| follow(&f.dot, path))
                .cloned(),
            Operand::Variable { name, path } => self
                .frames
                .iter()
                .rev()
                .find_map(|f| f.vars.get(name))
                .and_then(|v| follow(v, path))
                .cloned(),
        };
        Ok(match found {
            Some(value) => Arg::Value(value),
            None => Arg::Missing(describe(operand)),
        })
    }

    /// Resolve a path against each enclosing element, innermost first
    fn lookup(&self, path: &[String]) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| follow(&frame.dot, path))
            .cloned()
    }
}

fn follow<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter()
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn strict(arg: Arg) -> Result<Value, RenderError> {
    match arg {
        Arg::Value(value) => Ok(value),
        Arg::Missing(name) => Err(RenderError::UndefinedReference { name }),
    }
}

fn describe(operand: &Operand) -> String {
    let dotted = |path: &[String]| {
        path.iter()
            .map(|segment| format!(".{segment}"))
            .collect::<String>()
    };
    match operand {
        Operand::Dot(path) if path.is_empty() => ".".to_string(),
        Operand::Dot(path) => dotted(path),
        Operand::Root(path) => format!("${}", dotted(path)),
        Operand::Variable { name, path } => format!("${name}{}", dotted(path)),
        Operand::Name { name, path } => format!("{name}{}", dotted(path)),
        Operand::Literal(value) => value.to_string(),
        Operand::Group(_) => "(...)".to_string(),
    }
}
