//! Builds the node tree from lexed segments

use serde_json::Value;

use crate::render::functions::is_function;
use crate::render::lexer::{Action, Segment, Token};
use crate::render::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Range {
        label: String,
        key: Option<String>,
        value: Option<String>,
        source: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// Commands joined by `|`; each result is appended as the last argument
/// of the next command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Operand(Operand),
    Call { name: String, args: Vec<Operand> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    /// `.a.b`, resolved against the current element and then outward
    Dot(Vec<String>),
    /// `$.a.b`
    Root(Vec<String>),
    /// `$name.a.b`
    Variable { name: String, path: Vec<String> },
    /// Bare `name.a.b`, resolved like `.name.a.b`
    Name { name: String, path: Vec<String> },
    Literal(Value),
    Group(Pipeline),
}

/// How a nested block ended
enum Terminator {
    End,
    Else(Option<Pipeline>),
    Eof,
}

pub(crate) fn parse(segments: Vec<Segment>) -> Result<Vec<Node>, RenderError> {
    let mut parser = Parser {
        segments: segments.into_iter(),
        line: 1,
    };
    let (nodes, terminator) = parser.nodes()?;
    match terminator {
        Terminator::Eof => Ok(nodes),
        Terminator::End => Err(parser.syntax("unexpected {{end}}")),
        Terminator::Else(_) => Err(parser.syntax("unexpected {{else}}")),
    }
}

struct Parser {
    segments: std::vec::IntoIter<Segment>,
    line: usize,
}

impl Parser {
    fn syntax(&self, message: &str) -> RenderError {
        RenderError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn nodes(&mut self) -> Result<(Vec<Node>, Terminator), RenderError> {
        let mut nodes = Vec::new();
        while let Some(segment) = self.segments.next() {
            let action = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Segment::Action(action) => action,
            };
            self.line = action.line;

            let keyword = match action.tokens.first() {
                Some(Token::Ident(name, path)) if path.is_empty() => Some(name.as_str()),
                _ => None,
            };
            match keyword {
                Some("end") => {
                    if action.tokens.len() > 1 {
                        return Err(self.syntax("unexpected tokens after end"));
                    }
                    return Ok((nodes, Terminator::End));
                }
                Some("else") => {
                    let rest = &action.tokens[1..];
                    let cond = match rest.first() {
                        None => None,
                        Some(Token::Ident(name, path)) if name == "if" && path.is_empty() => {
                            Some(self.pipeline_of(&rest[1..])?)
                        }
                        Some(_) => return Err(self.syntax("unexpected tokens after else")),
                    };
                    return Ok((nodes, Terminator::Else(cond)));
                }
                Some("if") => nodes.push(self.if_block(&action)?),
                Some("range") => nodes.push(self.range_block(&action)?),
                _ => nodes.push(Node::Output(self.pipeline_of(&action.tokens)?)),
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    fn if_block(&mut self, action: &Action) -> Result<Node, RenderError> {
        let mut branches = Vec::new();
        let mut cond = self.pipeline_of(&action.tokens[1..])?;
        loop {
            let (body, terminator) = self.nodes()?;
            branches.push((cond, body));
            match terminator {
                Terminator::End => {
                    return Ok(Node::If {
                        branches,
                        otherwise: Vec::new(),
                    })
                }
                Terminator::Else(Some(next)) => cond = next,
                Terminator::Else(None) => {
                    let otherwise = self.closing_else()?;
                    return Ok(Node::If {
                        branches,
                        otherwise,
                    });
                }
                Terminator::Eof => return Err(self.syntax("unclosed if block")),
            }
        }
    }

    fn range_block(&mut self, action: &Action) -> Result<Node, RenderError> {
        let tokens = &action.tokens[1..];
        let (key, value, source) = match tokens {
            [Token::Var(k, kp), Token::Comma, Token::Var(v, vp), Token::Declare, rest @ ..]
                if kp.is_empty() && vp.is_empty() =>
            {
                (Some(k.clone()), Some(v.clone()), rest)
            }
            [Token::Var(v, vp), Token::Declare, rest @ ..] if vp.is_empty() => {
                (None, Some(v.clone()), rest)
            }
            rest => (None, None, rest),
        };
        let source = self.pipeline_of(source)?;

        let (body, terminator) = self.nodes()?;
        let otherwise = match terminator {
            Terminator::End => Vec::new(),
            Terminator::Else(None) => self.closing_else()?,
            Terminator::Else(Some(_)) => return Err(self.syntax("else if inside range")),
            Terminator::Eof => return Err(self.syntax("unclosed range block")),
        };

        let text = action.source.strip_prefix("range").unwrap_or(&action.source);
        let label = text.rsplit(":=").next().unwrap_or(text).trim().to_string();

        Ok(Node::Range {
            label,
            key,
            value,
            source,
            body,
            otherwise,
        })
    }

    /// Body of a final `else`, which must be closed by `end`
    fn closing_else(&mut self) -> Result<Vec<Node>, RenderError> {
        match self.nodes()? {
            (nodes, Terminator::End) => Ok(nodes),
            (_, Terminator::Else(_)) => Err(self.syntax("else after final else")),
            (_, Terminator::Eof) => Err(self.syntax("unclosed else block")),
        }
    }

    fn pipeline_of(&self, tokens: &[Token]) -> Result<Pipeline, RenderError> {
        if tokens.is_empty() {
            return Err(self.syntax("missing value"));
        }
        let mut cursor = Cursor {
            tokens,
            pos: 0,
            line: self.line,
        };
        let pipeline = cursor.pipeline()?;
        if cursor.pos < tokens.len() {
            return Err(self.syntax("unexpected tokens in action"));
        }
        Ok(pipeline)
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn syntax(&self, message: impl Into<String>) -> RenderError {
        RenderError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn at_boundary(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::Pipe) | Some(Token::RParen) | Some(Token::Comma)
        )
    }

    fn pipeline(&mut self) -> Result<Pipeline, RenderError> {
        let mut commands = vec![self.command(true)?];
        while let Some(Token::Pipe) = self.peek() {
            self.pos += 1;
            commands.push(self.command(false)?);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self, first: bool) -> Result<Command, RenderError> {
        match self.peek() {
            Some(Token::Call(name)) => {
                self.pos += 1;
                if !is_function(name) {
                    return Err(RenderError::UnknownFunction { name: name.clone() });
                }
                let mut args = Vec::new();
                if let Some(Token::RParen) = self.peek() {
                    self.pos += 1;
                } else {
                    loop {
                        args.push(Operand::Group(self.pipeline()?));
                        match self.next() {
                            Some(Token::Comma) => continue,
                            Some(Token::RParen) => break,
                            _ => return Err(self.syntax(format!("unclosed call to {name}"))),
                        }
                    }
                }
                Ok(Command::Call {
                    name: name.clone(),
                    args,
                })
            }
            Some(Token::Ident(name, path)) if path.is_empty() && is_function(name) => {
                self.pos += 1;
                let mut args = Vec::new();
                while !self.at_boundary() {
                    args.push(self.operand()?);
                }
                Ok(Command::Call {
                    name: name.clone(),
                    args,
                })
            }
            Some(Token::Ident(name, path)) if !first || (path.is_empty() && !self.lone_operand()) => {
                Err(RenderError::UnknownFunction { name: name.clone() })
            }
            Some(_) if !first => Err(self.syntax("expected a function after |")),
            Some(_) => {
                let operand = self.operand()?;
                if !self.at_boundary() {
                    return Err(self.syntax("unexpected operand"));
                }
                Ok(Command::Operand(operand))
            }
            None => Err(self.syntax("missing value")),
        }
    }

    /// Whether the token at the cursor is followed by a command boundary
    fn lone_operand(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1),
            None | Some(Token::Pipe) | Some(Token::RParen) | Some(Token::Comma)
        )
    }

    fn operand(&mut self) -> Result<Operand, RenderError> {
        let operand = match self.next() {
            Some(Token::Field(path)) => Operand::Dot(path.clone()),
            Some(Token::Var(name, path)) if name.is_empty() => Operand::Root(path.clone()),
            Some(Token::Var(name, path)) => Operand::Variable {
                name: name.clone(),
                path: path.clone(),
            },
            Some(Token::Ident(name, path)) => Operand::Name {
                name: name.clone(),
                path: path.clone(),
            },
            Some(Token::Literal(value)) => Operand::Literal(value.clone()),
            Some(Token::LParen) => {
                let inner = self.pipeline()?;
                match self.next() {
                    Some(Token::RParen) => Operand::Group(inner),
                    _ => return Err(self.syntax("unclosed parenthesis")),
                }
            }
            Some(Token::Call(_)) => {
                self.pos -= 1;
                Operand::Group(Pipeline {
                    commands: vec![self.command(false)?],
                })
            }
            Some(other) => return Err(self.syntax(format!("unexpected {other:?}"))),
            None => return Err(self.syntax("missing value")),
        };
        Ok(operand)
    }
}
