use super::{
    AttrFilter, AttrOp, Combinator, ComplexSelector, Compound, Filter, Nth, Part, Pseudo,
};
use crate::{Error, Result};

/// Recursive-descent parser over a char buffer.
pub(super) struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(super) fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", want, c))),
            None => Err(self.error(format!("expected '{}', found end of input", want))),
        }
    }

    /// Returns whether any whitespace was consumed.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        self.pos > start
    }

    pub(super) fn parse_list(&mut self) -> Result<Vec<ComplexSelector>> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            match self.bump() {
                None => break,
                Some(',') => continue,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }
        Ok(list)
    }

    fn parse_complex(&mut self) -> Result<ComplexSelector> {
        let mut parts = vec![Part {
            combinator: Combinator::Descendant,
            compound: self.parse_compound()?,
        }];
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') | Some(')') => break,
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            };
            if combinator != Combinator::Descendant {
                self.bump();
                self.skip_ws();
            }
            parts.push(Part {
                combinator,
                compound: self.parse_compound()?,
            });
        }
        Ok(ComplexSelector { parts })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut empty = true;

        if self.peek() == Some('*') {
            self.bump();
            empty = false;
        } else if self.at_ident_start() {
            compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
            empty = false;
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    let name = self.parse_name()?;
                    if name.is_empty() {
                        return Err(self.error("empty id selector"));
                    }
                    compound.filters.push(Filter::Id(name));
                }
                Some('.') => {
                    self.bump();
                    if !self.at_ident_start() {
                        return Err(self.error("expected class name after '.'"));
                    }
                    compound.filters.push(Filter::Class(self.parse_ident()?));
                }
                Some('[') => {
                    self.bump();
                    compound.filters.push(Filter::Attr(self.parse_attr()?));
                }
                Some(':') => {
                    self.bump();
                    compound.filters.push(Filter::Pseudo(self.parse_pseudo()?));
                }
                _ => break,
            }
            empty = false;
        }

        if empty {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected selector, found '{}'", c)),
                None => self.error("expected selector, found end of input"),
            });
        }
        Ok(compound)
    }

    fn parse_attr(&mut self) -> Result<AttrFilter> {
        self.skip_ws();
        if !self.at_ident_start() {
            return Err(self.error("expected attribute name"));
        }
        let name = self.parse_ident()?.to_ascii_lowercase();
        self.skip_ws();

        let op = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttrFilter {
                    name,
                    op: None,
                    case_insensitive: false,
                });
            }
            Some('=') => {
                self.bump();
                AttrOp::Equals
            }
            Some(c @ ('~' | '|' | '^' | '$' | '*')) if self.peek_at(1) == Some('=') => {
                self.pos += 2;
                match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    _ => AttrOp::Substring,
                }
            }
            _ => return Err(self.error("expected attribute operator")),
        };

        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.parse_string(q)?
            }
            _ if self.at_ident_start() => self.parse_ident()?,
            _ => return Err(self.error("expected attribute value")),
        };
        self.skip_ws();

        let mut case_insensitive = false;
        if let Some(flag @ ('i' | 'I' | 's' | 'S')) = self.peek() {
            self.bump();
            case_insensitive = flag.eq_ignore_ascii_case(&'i');
            self.skip_ws();
        }
        self.expect(']')?;

        Ok(AttrFilter {
            name,
            op: Some((op, value)),
            case_insensitive,
        })
    }

    fn parse_pseudo(&mut self) -> Result<Pseudo> {
        if self.peek() == Some(':') {
            return Err(self.error("pseudo-elements are not supported"));
        }
        let name = self.parse_ident()?.to_ascii_lowercase();
        match name.as_str() {
            "first-child" => Ok(Pseudo::NthChild(Nth::exact(1))),
            "last-child" => Ok(Pseudo::NthLastChild(Nth::exact(1))),
            "only-child" => Ok(Pseudo::OnlyChild),
            "first-of-type" => Ok(Pseudo::NthOfType(Nth::exact(1))),
            "last-of-type" => Ok(Pseudo::NthLastOfType(Nth::exact(1))),
            "only-of-type" => Ok(Pseudo::OnlyOfType),
            "empty" => Ok(Pseudo::Empty),
            "root" => Ok(Pseudo::Root),
            "nth-child" | "nth-last-child" | "nth-of-type" | "nth-last-of-type" => {
                self.expect('(')?;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ')') {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                self.expect(')')?;
                let nth = Nth::parse(&raw).ok_or_else(|| self.error(format!("bad an+b '{}'", raw)))?;
                Ok(match name.as_str() {
                    "nth-child" => Pseudo::NthChild(nth),
                    "nth-last-child" => Pseudo::NthLastChild(nth),
                    "nth-of-type" => Pseudo::NthOfType(nth),
                    _ => Pseudo::NthLastOfType(nth),
                })
            }
            "not" => {
                self.expect('(')?;
                let mut inner = Vec::new();
                loop {
                    self.skip_ws();
                    inner.push(self.parse_compound()?);
                    self.skip_ws();
                    match self.bump() {
                        Some(',') => continue,
                        Some(')') => break,
                        _ => return Err(self.error("expected ')' to close :not(")),
                    }
                }
                Ok(Pseudo::Not(inner))
            }
            other => Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        }
    }

    fn at_ident_start(&self) -> bool {
        match self.peek() {
            Some(c) if is_name_start(c) => true,
            Some('\\') => true,
            Some('-') => match self.peek_at(1) {
                Some(c) => is_name_start(c) || c == '-' || c == '\\',
                None => false,
            },
            _ => false,
        }
    }

    fn parse_ident(&mut self) -> Result<String> {
        if !self.at_ident_start() {
            return Err(self.error("expected identifier"));
        }
        self.parse_name()
    }

    /// Name characters and escapes, no start-character restriction (as in
    /// hash tokens).
    fn parse_name(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                out.push(c);
                self.bump();
            } else if c == '\\' {
                self.bump();
                out.push(self.parse_escape()?);
            } else {
                break;
            }
        }
        Ok(out)
    }

    fn parse_escape(&mut self) -> Result<char> {
        let Some(c) = self.peek() else {
            return Ok('\u{FFFD}');
        };
        if c.is_ascii_hexdigit() {
            let mut hex = String::new();
            while hex.len() < 6 && self.peek().is_some_and(|h| h.is_ascii_hexdigit()) {
                hex.push(self.bump().unwrap_or('0'));
            }
            if self.peek().is_some_and(|w| w.is_whitespace()) {
                self.bump();
            }
            let code = u32::from_str_radix(&hex, 16).unwrap_or(0);
            return Ok(match char::from_u32(code) {
                Some('\0') | None => '\u{FFFD}',
                Some(ch) => ch,
            });
        }
        if c == '\n' {
            return Err(self.error("newline cannot be escaped here"));
        }
        self.bump();
        Ok(c)
    }

    fn parse_string(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\n') => return Err(self.error("newline in string")),
                Some('\\') => match self.peek() {
                    Some('\n') => {
                        self.bump();
                    }
                    _ => out.push(self.parse_escape()?),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-'
}

impl Nth {
    fn exact(b: i64) -> Self {
        Self { a: 0, b }
    }

    /// `An+B`, `odd`, `even`, or a bare integer.
    fn parse(raw: &str) -> Option<Self> {
        let s: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match s.as_str() {
            "odd" => return Some(Self { a: 2, b: 1 }),
            "even" => return Some(Self { a: 2, b: 0 }),
            "" => return None,
            _ => {}
        }
        let Some((a, b)) = s.split_once('n') else {
            return Some(Self::exact(s.parse().ok()?));
        };
        let a = match a {
            "" | "+" => 1,
            "-" => -1,
            other => other.parse().ok()?,
        };
        let b = match b {
            "" => 0,
            other => other.strip_prefix('+').unwrap_or(other).parse().ok()?,
        };
        Some(Self { a, b })
    }
}
