/*  tiny-roles: Tiny Role Resolver
 *  Copyright (C) 2024 The tiny-roles developers
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Parsing of distinguished names as found in group membership attributes.

use thiserror::Error;

const COMMON_NAME: &str = "cn";
const COMMON_NAME_OID: &str = "2.5.4.3";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("attribute starting at {0} has no '='")]
    MissingEquals(usize),
    #[error("empty attribute type at {0}")]
    EmptyAttributeType(usize),
    #[error("invalid escape sequence at {0}")]
    InvalidEscape(usize),
    #[error("unterminated quoted value starting at {0}")]
    UnterminatedQuote(usize),
    #[error("unexpected character at {0}")]
    UnexpectedCharacter(usize),
    #[error("value is not valid UTF-8")]
    InvalidUtf8,
}

/// One `type=value` pair of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    pub attribute_type: String,
    pub value: String,
}

/// Multi-valued RDNs (joined by `+`) hold several pairs.
pub type RelativeName = Vec<AttributeValue>;

/// Splits `dn` into its RDNs, most specific first, with all escapes resolved.
pub fn parse(dn: &str) -> Result<Vec<RelativeName>, DnError> {
    let mut names = Vec::new();
    if dn.trim().is_empty() {
        return Ok(names);
    }
    let mut parser = Parser {
        input: dn.as_bytes(),
        position: 0,
    };
    let mut name = RelativeName::new();
    loop {
        let attribute_type = parser.attribute_type()?;
        let value = parser.attribute_value()?;
        name.push(AttributeValue {
            attribute_type,
            value,
        });
        match parser.separator()? {
            Some(b'+') => {}
            Some(_) => names.push(std::mem::take(&mut name)),
            None => {
                names.push(name);
                return Ok(names);
            }
        }
    }
}

/// Value of the first `cn` attribute of `dn`, if any.
pub fn first_common_name(dn: &str) -> Result<Option<String>, DnError> {
    Ok(parse(dn)?
        .into_iter()
        .flatten()
        .find(|v| {
            v.attribute_type.eq_ignore_ascii_case(COMMON_NAME)
                || v.attribute_type == COMMON_NAME_OID
        })
        .map(|v| v.value))
}

struct Parser<'a> {
    input: &'a [u8],
    position: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.position += 1;
        }
    }

    fn attribute_type(&mut self) -> Result<String, DnError> {
        self.skip_spaces();
        let start = self.position;
        while let Some(c) = self.peek() {
            match c {
                b'=' => {
                    let attribute_type = String::from_utf8_lossy(&self.input[start..self.position])
                        .trim()
                        .to_owned();
                    self.position += 1;
                    if attribute_type.is_empty() {
                        return Err(DnError::EmptyAttributeType(start));
                    }
                    return Ok(attribute_type);
                }
                b',' | b'+' | b';' => break,
                _ => self.position += 1,
            }
        }
        Err(DnError::MissingEquals(start))
    }

    fn attribute_value(&mut self) -> Result<String, DnError> {
        self.skip_spaces();
        match self.peek() {
            Some(b'"') => self.quoted_value(),
            _ => self.plain_value(),
        }
    }

    fn plain_value(&mut self) -> Result<String, DnError> {
        let mut value = Vec::new();
        // unescaped trailing spaces are insignificant
        let mut significant = 0;
        while let Some(c) = self.peek() {
            match c {
                b',' | b'+' | b';' => break,
                b'\\' => {
                    value.push(self.escaped()?);
                    significant = value.len();
                }
                b' ' => {
                    value.push(c);
                    self.position += 1;
                }
                _ => {
                    value.push(c);
                    self.position += 1;
                    significant = value.len();
                }
            }
        }
        value.truncate(significant);
        String::from_utf8(value).map_err(|_| DnError::InvalidUtf8)
    }

    fn quoted_value(&mut self) -> Result<String, DnError> {
        let start = self.position;
        self.position += 1;
        let mut value = Vec::new();
        loop {
            match self.peek() {
                None => return Err(DnError::UnterminatedQuote(start)),
                Some(b'"') => {
                    self.position += 1;
                    break;
                }
                Some(b'\\') => value.push(self.escaped()?),
                Some(c) => {
                    value.push(c);
                    self.position += 1;
                }
            }
        }
        self.skip_spaces();
        String::from_utf8(value).map_err(|_| DnError::InvalidUtf8)
    }

    /// Resolves `\XX` hex pairs and `\c` for a special character `c`.
    fn escaped(&mut self) -> Result<u8, DnError> {
        let start = self.position;
        self.position += 1;
        let first = self.peek().ok_or(DnError::InvalidEscape(start))?;
        if first.is_ascii_hexdigit() {
            let second = self
                .input
                .get(self.position + 1)
                .copied()
                .filter(u8::is_ascii_hexdigit)
                .ok_or(DnError::InvalidEscape(start))?;
            self.position += 2;
            Ok(hex_value(first) << 4 | hex_value(second))
        } else {
            self.position += 1;
            Ok(first)
        }
    }

    fn separator(&mut self) -> Result<Option<u8>, DnError> {
        match self.peek() {
            None => Ok(None),
            Some(c @ (b',' | b'+' | b';')) => {
                self.position += 1;
                Ok(Some(c))
            }
            Some(_) => Err(DnError::UnexpectedCharacter(self.position)),
        }
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
