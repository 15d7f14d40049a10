// RFC 4515 textual filters. The text grammar is not decoded directly into a
// tree: it is transformed to the equivalent BER and fed through the wire
// decoder, so both input paths build byte-identical filter trees.

use crate::ber::{
    BerWriter, LDAP_FILTER_AND, LDAP_FILTER_APPROX, LDAP_FILTER_COMPUTED, LDAP_FILTER_EQUALITY,
    LDAP_FILTER_EXTENSIBLE, LDAP_FILTER_GE, LDAP_FILTER_LE, LDAP_FILTER_NOT, LDAP_FILTER_OR,
    LDAP_FILTER_PRESENT, LDAP_FILTER_SUBSTRINGS, LDAP_MRA_DNATTRS, LDAP_MRA_RULE, LDAP_MRA_TYPE,
    LDAP_MRA_VALUE, LDAP_SUBSTRING_ANY, LDAP_SUBSTRING_FINAL, LDAP_SUBSTRING_INITIAL,
    LDAP_TAG_SEQUENCE,
};
use crate::error::{ComputedOutcome, DecodeError};
use crate::filter::Filter;
use crate::schema::Schema;

/// Parse an RFC 4515 filter string against a schema.
pub fn filter_from_text(text: &str, schema: &dyn Schema) -> Result<Filter, DecodeError> {
    let ber = filter_text_to_ber(text)?;
    Filter::from_ber(&ber, schema)
}

/// Transform filter text to wire form without resolving anything.
pub(crate) fn filter_text_to_ber(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut p = TextParser::new(text);
    let mut w = BerWriter::new();
    p.parse_filter(&mut w)?;
    p.expect_end()?;
    Ok(w.into_vec())
}

/// Transform a matched-values filter list, `( item... )`, to the
/// SEQUENCE OF wire form consumed by the vrFilter decoder.
pub(crate) fn vrfilter_text_to_ber(text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut p = TextParser::new(text);
    let mut w = BerWriter::new();
    p.expect(b'(')?;
    let pos = w.begin(LDAP_TAG_SEQUENCE);
    p.parse_filter_list(&mut w)?;
    w.end(pos);
    p.expect(b')')?;
    p.expect_end()?;
    Ok(w.into_vec())
}

struct TextParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> TextParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            input: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn expect(&mut self, want: u8) -> Result<(), DecodeError> {
        match self.bump() {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(DecodeError::Protocol(format!(
                "expected {:?} at offset {}, found {:?}",
                want as char,
                self.pos - 1,
                b as char
            ))),
            None => Err(DecodeError::Protocol(format!(
                "expected {:?}, found end of input",
                want as char
            ))),
        }
    }

    fn expect_end(&self) -> Result<(), DecodeError> {
        if self.pos != self.input.len() {
            return Err(DecodeError::Protocol(format!(
                "trailing characters at offset {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn parse_filter(&mut self, w: &mut BerWriter) -> Result<(), DecodeError> {
        self.expect(b'(')?;
        match self.peek() {
            Some(b'&') => {
                self.bump();
                let pos = w.begin(LDAP_FILTER_AND);
                self.parse_filter_list(w)?;
                w.end(pos);
            }
            Some(b'|') => {
                self.bump();
                let pos = w.begin(LDAP_FILTER_OR);
                self.parse_filter_list(w)?;
                w.end(pos);
            }
            Some(b'!') => {
                self.bump();
                let pos = w.begin(LDAP_FILTER_NOT);
                self.parse_filter(w)?;
                w.end(pos);
            }
            Some(_) => self.parse_item(w)?,
            None => {
                return Err(DecodeError::Protocol("unterminated filter".into()));
            }
        }
        self.expect(b')')
    }

    fn parse_filter_list(&mut self, w: &mut BerWriter) -> Result<(), DecodeError> {
        while self.peek() == Some(b'(') {
            self.parse_filter(w)?;
        }
        Ok(())
    }

    fn parse_item(&mut self, w: &mut BerWriter) -> Result<(), DecodeError> {
        let attr = self.take_attr()?;
        match self.peek() {
            Some(b':') => self.parse_extensible(w, attr),
            Some(b'~') => {
                self.bump();
                self.expect(b'=')?;
                let value = unescape(&self.take_value()?)?;
                self.require_attr(&attr)?;
                write_ava(w, LDAP_FILTER_APPROX, &attr, &value);
                Ok(())
            }
            Some(b'>') => {
                self.bump();
                self.expect(b'=')?;
                let value = unescape(&self.take_value()?)?;
                self.require_attr(&attr)?;
                write_ava(w, LDAP_FILTER_GE, &attr, &value);
                Ok(())
            }
            Some(b'<') => {
                self.bump();
                self.expect(b'=')?;
                let value = unescape(&self.take_value()?)?;
                self.require_attr(&attr)?;
                write_ava(w, LDAP_FILTER_LE, &attr, &value);
                Ok(())
            }
            Some(b'=') => {
                self.bump();
                let raw = self.take_value()?;
                self.finish_equality(w, attr, raw)
            }
            _ => Err(DecodeError::Protocol(
                "expected a filter operator".into(),
            )),
        }
    }

    fn require_attr(&self, attr: &[u8]) -> Result<(), DecodeError> {
        if attr.is_empty() {
            return Err(DecodeError::Protocol(
                "empty attribute description".into(),
            ));
        }
        Ok(())
    }

    /// Equality text covers four shapes: the computed literals `(?=...)`,
    /// presence `(attr=*)`, substrings when an unescaped `*` remains, and
    /// plain equality otherwise.
    fn finish_equality(
        &mut self,
        w: &mut BerWriter,
        attr: Vec<u8>,
        raw: Vec<u8>,
    ) -> Result<(), DecodeError> {
        if attr == b"?" {
            let outcome = match raw.as_slice() {
                b"true" => ComputedOutcome::True,
                b"false" => ComputedOutcome::False,
                b"undefined" => ComputedOutcome::Undefined,
                b"error" => ComputedOutcome::Error,
                other => {
                    return Err(DecodeError::Protocol(format!(
                        "unknown computed filter literal {:?}",
                        String::from_utf8_lossy(other)
                    )));
                }
            };
            w.write_primitive(LDAP_FILTER_COMPUTED, &[outcome.wire_byte()]);
            return Ok(());
        }
        self.require_attr(&attr)?;
        if raw == b"*" {
            w.write_primitive(LDAP_FILTER_PRESENT, &attr);
            return Ok(());
        }
        let parts = split_unescaped_star(&raw);
        if parts.len() == 1 {
            write_ava(w, LDAP_FILTER_EQUALITY, &attr, &unescape(&parts[0])?);
            return Ok(());
        }
        let pos = w.begin(LDAP_FILTER_SUBSTRINGS);
        w.write_octet_string(&attr);
        let seq = w.begin(LDAP_TAG_SEQUENCE);
        let last = parts.len() - 1;
        for (i, part) in parts.iter().enumerate() {
            // A leading or trailing '*' means no initial/final component.
            // Empty middle parts are written out and rejected downstream.
            if part.is_empty() && (i == 0 || i == last) {
                continue;
            }
            let tag = if i == 0 {
                LDAP_SUBSTRING_INITIAL
            } else if i == last {
                LDAP_SUBSTRING_FINAL
            } else {
                LDAP_SUBSTRING_ANY
            };
            w.write_primitive(tag, &unescape(part)?);
        }
        w.end(seq);
        w.end(pos);
        Ok(())
    }

    /// `attr [":dn"] [":" rule] ":=" value` with attr possibly absent.
    fn parse_extensible(
        &mut self,
        w: &mut BerWriter,
        attr: Vec<u8>,
    ) -> Result<(), DecodeError> {
        let mut dn = false;
        let mut rule: Option<Vec<u8>> = None;
        loop {
            self.expect(b':')?;
            let start = self.pos;
            while let Some(b) = self.peek() {
                match b {
                    b':' | b'=' => break,
                    b'(' | b')' => {
                        return Err(DecodeError::Protocol(
                            "unterminated extensible match".into(),
                        ));
                    }
                    _ => self.pos += 1,
                }
            }
            let seg = self.input[start..self.pos].to_vec();
            match self.peek() {
                Some(b'=') => {
                    if !seg.is_empty() {
                        return Err(DecodeError::Protocol(
                            "extensible match must end with ':='".into(),
                        ));
                    }
                    self.bump();
                    break;
                }
                Some(b':') => {
                    if seg.eq_ignore_ascii_case(b"dn") {
                        if dn {
                            return Err(DecodeError::Protocol("duplicate dn flag".into()));
                        }
                        dn = true;
                    } else if seg.is_empty() {
                        return Err(DecodeError::Protocol("empty matching rule id".into()));
                    } else if rule.is_some() {
                        return Err(DecodeError::Protocol(
                            "more than one matching rule id".into(),
                        ));
                    } else {
                        rule = Some(seg);
                    }
                }
                _ => {
                    return Err(DecodeError::Protocol(
                        "unterminated extensible match".into(),
                    ));
                }
            }
        }
        let value = unescape(&self.take_value()?)?;
        if attr.is_empty() && rule.is_none() {
            return Err(DecodeError::Protocol(
                "extensible filter names neither rule nor attribute".into(),
            ));
        }
        let pos = w.begin(LDAP_FILTER_EXTENSIBLE);
        if let Some(r) = &rule {
            w.write_primitive(LDAP_MRA_RULE, r);
        }
        if !attr.is_empty() {
            w.write_primitive(LDAP_MRA_TYPE, &attr);
        }
        w.write_primitive(LDAP_MRA_VALUE, &value);
        if dn {
            w.write_boolean(LDAP_MRA_DNATTRS, true);
        }
        w.end(pos);
        Ok(())
    }

    fn take_attr(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'=' | b'~' | b'<' | b'>' | b':' => break,
                b'(' | b')' => {
                    return Err(DecodeError::Protocol(format!(
                        "unexpected {:?} in attribute description",
                        b as char
                    )));
                }
                _ => self.pos += 1,
            }
        }
        Ok(self.input[start..self.pos].to_vec())
    }

    /// Raw value region up to the closing parenthesis, escapes untouched.
    fn take_value(&mut self) -> Result<Vec<u8>, DecodeError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b')' => break,
                b'(' => {
                    return Err(DecodeError::Protocol(
                        "unescaped '(' in assertion value".into(),
                    ));
                }
                b'\\' => {
                    self.pos += 1;
                    if self.peek().is_none() {
                        return Err(DecodeError::Protocol(
                            "value ends in a bare backslash".into(),
                        ));
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        Ok(self.input[start..self.pos].to_vec())
    }
}

fn write_ava(w: &mut BerWriter, tag: u8, attr: &[u8], value: &[u8]) {
    let pos = w.begin(tag);
    w.write_octet_string(attr);
    w.write_octet_string(value);
    w.end(pos);
}

/// Split on '*' outside escape sequences. Adjacent stars produce empty
/// parts which the caller interprets (absent initial/final) or rejects.
fn split_unescaped_star(v: &[u8]) -> Vec<Vec<u8>> {
    let mut parts = Vec::new();
    let mut cur = Vec::new();
    let mut i = 0;
    while i < v.len() {
        match v[i] {
            b'\\' if i + 1 < v.len() => {
                cur.push(v[i]);
                cur.push(v[i + 1]);
                i += 2;
            }
            b'*' => {
                parts.push(std::mem::take(&mut cur));
                i += 1;
            }
            b => {
                cur.push(b);
                i += 1;
            }
        }
    }
    parts.push(cur);
    parts
}

/// Resolve `\XY` hex escapes to raw bytes.
fn unescape(v: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(v.len());
    let mut i = 0;
    while i < v.len() {
        if v[i] == b'\\' {
            let hi = v.get(i + 1).and_then(|b| hex_digit(*b));
            let lo = v.get(i + 2).and_then(|b| hex_digit(*b));
            match (hi, lo) {
                (Some(h), Some(l)) => {
                    out.push(h << 4 | l);
                    i += 3;
                }
                _ => {
                    return Err(DecodeError::Protocol(
                        "invalid escape sequence in filter value".into(),
                    ));
                }
            }
        } else {
            out.push(v[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
