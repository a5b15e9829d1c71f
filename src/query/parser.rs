//! Text front-end: `g.V().Has("Type", "host").Out()` and friends.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use super::ast::{ContextSpec, Direction, Step, TimeAnchor, Traversal};
use super::errors::QueryError;
use crate::metadata::{ElementFilter, Predicate, Value};
use crate::series::MAX_BUCKET_SECS;
use crate::types::{Identifier, Timestamp};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Dot,
    Comma,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(at, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push((at, Token::Dot));
            }
            ',' => {
                chars.next();
                tokens.push((at, Token::Comma));
            }
            '(' => {
                chars.next();
                tokens.push((at, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((at, Token::RParen));
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => text.push(ch),
                    }
                }
                if !closed {
                    return Err(QueryError::syntax(at, "unterminated string literal"));
                }
                tokens.push((at, Token::Str(text)));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let mut text = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    let sign = (ch == '-' || ch == '+') && (text.is_empty() || text.ends_with(['e', 'E']));
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || sign {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = if text.contains(['.', 'e', 'E']) {
                    text.parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| QueryError::syntax(at, format!("invalid number '{text}'")))?
                } else {
                    text.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| QueryError::syntax(at, format!("invalid number '{text}'")))?
                };
                tokens.push((at, token));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((at, Token::Ident(text)));
            }
            other => {
                return Err(QueryError::syntax(at, format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

/// Argument of a step call.
#[derive(Clone, Debug, PartialEq)]
enum Arg {
    Lit(Value),
    Pred(Predicate),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.len, |(at, _)| *at)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, want: Token, what: &str) -> Result<(), QueryError> {
        let at = self.offset();
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(QueryError::syntax(at, format!("expected {what}, found {t:?}"))),
            None => Err(QueryError::syntax(at, format!("expected {what}, found end of query"))),
        }
    }

    fn traversal(&mut self) -> Result<Traversal, QueryError> {
        let at = self.offset();
        match self.next() {
            Some(Token::Ident(g)) if g == "g" || g == "G" => {}
            _ => return Err(QueryError::syntax(at, "query must start with 'g'")),
        }
        let mut steps = Vec::new();
        while self.peek().is_some() {
            self.expect(Token::Dot, "'.'")?;
            steps.push(self.step()?);
        }
        Ok(Traversal::new(steps))
    }

    fn step(&mut self) -> Result<Step, QueryError> {
        let at = self.offset();
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(QueryError::syntax(at, "expected a step name")),
        };
        let args = self.args()?;
        build_step(&name, args)
    }

    fn args(&mut self) -> Result<Vec<Arg>, QueryError> {
        self.expect(Token::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.arg()?);
            let at = self.offset();
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(QueryError::syntax(at, "expected ',' or ')'")),
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, QueryError> {
        let at = self.offset();
        match self.next() {
            Some(Token::Str(s)) => Ok(Arg::Lit(Value::String(s))),
            Some(Token::Int(i)) => Ok(Arg::Lit(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Arg::Lit(Value::Float(f))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Arg::Lit(Value::Bool(true))),
                "false" => Ok(Arg::Lit(Value::Bool(false))),
                "null" => Ok(Arg::Lit(Value::Null)),
                "Ne" | "NE" => {
                    let mut lits = self.literals(at, "Ne")?;
                    if lits.len() != 1 {
                        return Err(QueryError::syntax(at, "Ne() takes exactly one literal"));
                    }
                    Ok(Arg::Pred(Predicate::Ne(lits.remove(0))))
                }
                "Within" => Ok(Arg::Pred(Predicate::Within(self.literals(at, "Within")?))),
                "Without" => Ok(Arg::Pred(Predicate::Without(self.literals(at, "Without")?))),
                other => Err(QueryError::syntax(at, format!("unknown predicate '{other}'"))),
            },
            Some(t) => Err(QueryError::syntax(at, format!("unexpected {t:?}"))),
            None => Err(QueryError::syntax(at, "unexpected end of query")),
        }
    }

    fn literals(&mut self, at: usize, name: &str) -> Result<Vec<Value>, QueryError> {
        self.args()?
            .into_iter()
            .map(|arg| match arg {
                Arg::Lit(v) => Ok(v),
                Arg::Pred(_) => Err(QueryError::syntax(
                    at,
                    format!("{name}() accepts literals only"),
                )),
            })
            .collect()
    }
}

fn arity(step: &'static str, expected: &'static str, args: &[Arg], ok: bool) -> Result<(), QueryError> {
    if ok {
        Ok(())
    } else {
        Err(QueryError::Arity {
            step,
            expected,
            found: args.len(),
        })
    }
}

fn literal(step: &'static str, arg: Arg) -> Result<Value, QueryError> {
    match arg {
        Arg::Lit(v) => Ok(v),
        Arg::Pred(_) => Err(QueryError::bad_argument(step, "predicate not allowed here")),
    }
}

fn integer(step: &'static str, arg: Arg) -> Result<i64, QueryError> {
    match literal(step, arg)? {
        Value::Int(i) => Ok(i),
        other => Err(QueryError::bad_argument(step, format!("expected an integer, got {other}"))),
    }
}

/// Parses a `Context` anchor: Unix milliseconds, `"NOW"`, or RFC 3339.
fn anchor(arg: Arg) -> Result<TimeAnchor, QueryError> {
    match literal("Context", arg)? {
        Value::Int(ms) => Ok(TimeAnchor::At(ms)),
        Value::Float(ms) if ms.is_finite() => Ok(TimeAnchor::At(ms as Timestamp)),
        Value::String(s) if s.eq_ignore_ascii_case("now") => Ok(TimeAnchor::Now),
        Value::String(s) => OffsetDateTime::parse(&s, &Rfc3339)
            .map(|dt| TimeAnchor::At((dt.unix_timestamp_nanos() / 1_000_000) as Timestamp))
            .map_err(|err| QueryError::bad_argument("Context", format!("invalid time '{s}': {err}"))),
        other => Err(QueryError::bad_argument(
            "Context",
            format!("expected milliseconds, \"NOW\" or an RFC 3339 time, got {other}"),
        )),
    }
}

/// Turns `key, value, key, value, …` into a filter. A trailing lone key
/// means "key present".
fn filter(step: &'static str, args: Vec<Arg>) -> Result<ElementFilter, QueryError> {
    let mut out = ElementFilter::new();
    let mut iter = args.into_iter();
    while let Some(key) = iter.next() {
        let key = match key {
            Arg::Lit(Value::String(k)) => k,
            _ => return Err(QueryError::bad_argument(step, "metadata keys must be strings")),
        };
        out = match iter.next() {
            Some(Arg::Lit(v)) => out.with(key, Predicate::Eq(v)),
            Some(Arg::Pred(p)) => out.with(key, p),
            None => out.with(key, Predicate::Exists),
        };
    }
    Ok(out)
}

fn build_step(name: &str, args: Vec<Arg>) -> Result<Step, QueryError> {
    let n = args.len();
    let step = match name {
        "Context" => {
            arity("Context", "1 or 2", &args, n == 1 || n == 2)?;
            let mut iter = args.into_iter();
            let anchor = match iter.next() {
                Some(arg) => anchor(arg)?,
                None => TimeAnchor::Now,
            };
            let span_secs = match iter.next() {
                Some(arg) => integer("Context", arg)?,
                None => 0,
            };
            if span_secs < 0 {
                return Err(QueryError::bad_argument("Context", "span must not be negative"));
            }
            Step::Context(ContextSpec { anchor, span_secs })
        }
        "V" => {
            arity("V", "0 or 1", &args, n <= 1)?;
            match args.into_iter().next() {
                None => Step::V(None),
                Some(arg) => match literal("V", arg)? {
                    Value::String(id) => Step::V(Some(Identifier::new(id))),
                    other => {
                        return Err(QueryError::bad_argument(
                            "V",
                            format!("identifier must be a string, got {other}"),
                        ))
                    }
                },
            }
        }
        "Has" => {
            arity("Has", "at least 1", &args, n >= 1)?;
            Step::Has(filter("Has", args)?)
        }
        "HasKey" => {
            arity("HasKey", "1", &args, n == 1)?;
            match args.into_iter().next() {
                Some(Arg::Lit(Value::String(key))) => {
                    Step::Has(ElementFilter::new().with(key, Predicate::Exists))
                }
                _ => return Err(QueryError::bad_argument("HasKey", "key must be a string")),
            }
        }
        "Out" => Step::Neighbours(Direction::Out, filter("Out", args)?),
        "In" => Step::Neighbours(Direction::In, filter("In", args)?),
        "Both" => Step::Neighbours(Direction::Both, filter("Both", args)?),
        "OutE" => Step::Edges(Direction::Out, filter("OutE", args)?),
        "InE" => Step::Edges(Direction::In, filter("InE", args)?),
        "BothE" => Step::Edges(Direction::Both, filter("BothE", args)?),
        "OutV" => Step::Endpoints(Direction::Out, filter("OutV", args)?),
        "InV" => Step::Endpoints(Direction::In, filter("InV", args)?),
        "BothV" => Step::Endpoints(Direction::Both, filter("BothV", args)?),
        "Dedup" => {
            arity("Dedup", "0", &args, n == 0)?;
            Step::Dedup
        }
        "Metrics" => {
            arity("Metrics", "0", &args, n == 0)?;
            Step::Metrics
        }
        "Aggregates" => {
            arity("Aggregates", "0 or 1", &args, n <= 1)?;
            match args.into_iter().next() {
                None => Step::Aggregates(None),
                Some(arg) => {
                    let bucket = integer("Aggregates", arg)?;
                    if bucket <= 0 {
                        return Err(QueryError::bad_argument(
                            "Aggregates",
                            "bucket width must be positive",
                        ));
                    }
                    if bucket > MAX_BUCKET_SECS {
                        return Err(QueryError::bad_argument(
                            "Aggregates",
                            format!("bucket width must not exceed {MAX_BUCKET_SECS} seconds"),
                        ));
                    }
                    Step::Aggregates(Some(bucket))
                }
            }
        }
        "Sum" => {
            arity("Sum", "0", &args, n == 0)?;
            Step::Sum
        }
        "Count" => {
            arity("Count", "0", &args, n == 0)?;
            Step::Count
        }
        "Limit" => {
            arity("Limit", "1", &args, n == 1)?;
            let limit = args
                .into_iter()
                .next()
                .map(|arg| integer("Limit", arg))
                .transpose()?
                .unwrap_or_default();
            let limit = usize::try_from(limit)
                .map_err(|_| QueryError::bad_argument("Limit", "limit must not be negative"))?;
            Step::Limit(limit)
        }
        other => {
            return Err(QueryError::UnknownStep {
                step: other.to_owned(),
            })
        }
    };
    Ok(step)
}

/// Parses and checks a traversal.
pub fn parse(query: &str) -> Result<Traversal, QueryError> {
    let result = tokenize(query).and_then(|tokens| {
        let mut parser = Parser {
            tokens,
            pos: 0,
            len: query.len(),
        };
        let traversal = parser.traversal()?;
        traversal.check()?;
        Ok(traversal)
    });
    if let Err(err) = &result {
        debug!(query, code = err.code(), error = %err, "query.parse_failed");
    }
    result
}
