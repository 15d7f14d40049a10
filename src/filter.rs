// Filter tree and the wire decoder that builds it.
//
// A filter arrives as the BER CHOICE of RFC 4511:
//
//	Filter ::= CHOICE {
//		and             [0] SET OF Filter,
//		or              [1] SET OF Filter,
//		not             [2] Filter,
//		equalityMatch   [3] AttributeValueAssertion,
//		substrings      [4] SubstringFilter,
//		greaterOrEqual  [5] AttributeValueAssertion,
//		lessOrEqual     [6] AttributeValueAssertion,
//		present         [7] AttributeDescription,
//		approxMatch     [8] AttributeValueAssertion,
//		extensibleMatch [9] MatchingRuleAssertion
//	}
//
// Unknown attributes and unrecognized choices never fail the decode: they
// become Computed(Undefined) leaves and the filter stays evaluable. Only
// broken framing (Disconnect), grammar violations (Protocol/InvalidSyntax)
// and unresolvable extensible rules (InappropriateMatching) are errors.

use crate::ber::{
    BerReader, LDAP_FILTER_AND, LDAP_FILTER_APPROX, LDAP_FILTER_COMPUTED, LDAP_FILTER_EQUALITY,
    LDAP_FILTER_EXTENSIBLE, LDAP_FILTER_GE, LDAP_FILTER_LE, LDAP_FILTER_NOT, LDAP_FILTER_OR,
    LDAP_FILTER_PRESENT, LDAP_FILTER_SUBSTRINGS, LDAP_MRA_DNATTRS, LDAP_MRA_RULE, LDAP_MRA_TYPE,
    LDAP_MRA_VALUE, LDAP_SUBSTRING_ANY, LDAP_SUBSTRING_FINAL, LDAP_SUBSTRING_INITIAL,
    LDAP_TAG_SEQUENCE,
};
use crate::error::{ComputedOutcome, DecodeError};
use crate::schema::{AttributeType, MatchingRule, Schema};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality(AttributeAssertion),
    Substrings(SubstringsAssertion),
    Ge(AttributeAssertion),
    Le(AttributeAssertion),
    Present(Arc<AttributeType>),
    Approx(AttributeAssertion),
    Extensible(MatchingRuleAssertion),
    /// Pre-decided leaf standing in for content the decoder degraded
    /// gracefully instead of rejecting.
    Computed(ComputedOutcome),
}

impl Filter {
    /// Decode one filter from raw BER bytes.
    pub fn from_ber(data: &[u8], schema: &dyn Schema) -> Result<Filter, DecodeError> {
        let mut r = BerReader::new(data);
        let f = decode_filter(&mut r, schema)?;
        if r.remaining() > 0 {
            return Err(DecodeError::Protocol(
                "trailing bytes after filter".into(),
            ));
        }
        debug!(filter = %f.to_filter_string(), "decoded filter");
        Ok(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAssertion {
    pub desc: Arc<AttributeType>,
    /// Asserted bytes as received on the wire.
    pub value: Vec<u8>,
    /// Canonical form per the operator's matching rule, when one is
    /// declared; None means evaluation normalizes on the fly.
    pub normalized: Option<Vec<u8>>,
}

/// At least one of initial/any/final is present; components are stored in
/// canonical form when the attribute declares a SUBSTR rule. Ordering and
/// duplication are enforced at decode time and not re-checked later.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstringsAssertion {
    pub desc: Arc<AttributeType>,
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub final_: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingRuleAssertion {
    /// Rule explicitly named in the assertion, if any.
    pub rule: Option<Arc<MatchingRule>>,
    pub desc: Option<Arc<AttributeType>>,
    pub value: Vec<u8>,
    pub normalized: Option<Vec<u8>>,
    pub dn_attrs: bool,
}

impl MatchingRuleAssertion {
    /// The rule comparisons run under: the explicit rule, or the named
    /// attribute's EQUALITY rule. Construction guarantees one exists.
    pub fn effective_rule(&self) -> Option<Arc<MatchingRule>> {
        self.rule
            .clone()
            .or_else(|| self.desc.as_ref().and_then(|d| d.equality.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AvaChoice {
    Equality,
    Ge,
    Le,
    Approx,
}

/// Decode the next filter element from the cursor.
pub fn decode_filter(r: &mut BerReader, schema: &dyn Schema) -> Result<Filter, DecodeError> {
    let tag = r.read_tag()?;
    let len = r.read_length()?;

    let f = match tag {
        LDAP_FILTER_AND => {
            debug!("AND");
            let mut sub = r.take(len)?;
            Filter::And(decode_filter_list(&mut sub, schema)?)
        }
        LDAP_FILTER_OR => {
            debug!("OR");
            let mut sub = r.take(len)?;
            Filter::Or(decode_filter_list(&mut sub, schema)?)
        }
        LDAP_FILTER_NOT => {
            debug!("NOT");
            let mut sub = r.take(len)?;
            let inner = decode_filter(&mut sub, schema)?;
            if sub.remaining() > 0 {
                return Err(DecodeError::Protocol(
                    "more than one filter inside NOT".into(),
                ));
            }
            Filter::Not(Box::new(inner))
        }
        LDAP_FILTER_EQUALITY => {
            debug!("EQUALITY");
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Equality)? {
                Some(ava) => Filter::Equality(ava),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_GE => {
            debug!("GE");
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Ge)? {
                Some(ava) => Filter::Ge(ava),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_LE => {
            debug!("LE");
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Le)? {
                Some(ava) => Filter::Le(ava),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_APPROX => {
            debug!("APPROX");
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Approx)? {
                Some(ava) => Filter::Approx(ava),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_SUBSTRINGS => {
            debug!("SUBSTRINGS");
            let mut sub = r.take(len)?;
            match decode_substrings_body(&mut sub, schema)? {
                Some(ssa) => Filter::Substrings(ssa),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_PRESENT => {
            debug!("PRESENT");
            let name = r.read_raw_bytes(len)?;
            match decode_present_body(name, schema) {
                Some(desc) => Filter::Present(desc),
                None => Filter::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_EXTENSIBLE => {
            debug!("EXTENSIBLE");
            let mut sub = r.take(len)?;
            Filter::Extensible(decode_extensible_body(&mut sub, schema)?)
        }
        LDAP_FILTER_COMPUTED => {
            let bytes = r.read_raw_bytes(len)?;
            let outcome = match bytes.as_slice() {
                [b] => ComputedOutcome::from_wire_byte(*b),
                _ => ComputedOutcome::Undefined,
            };
            debug!(?outcome, "COMPUTED");
            Filter::Computed(outcome)
        }
        other => {
            debug!("unknown filter choice 0x{:02X}", other);
            r.skip(len)?;
            Filter::Computed(ComputedOutcome::Undefined)
        }
    };
    Ok(f)
}

/// SET OF Filter in wire order; any child error aborts immediately.
fn decode_filter_list(
    sub: &mut BerReader,
    schema: &dyn Schema,
) -> Result<Vec<Filter>, DecodeError> {
    let mut filters = Vec::new();
    while sub.remaining() > 0 {
        filters.push(decode_filter(sub, schema)?);
    }
    Ok(filters)
}

/// AttributeValueAssertion body. Returns None when the attribute cannot be
/// resolved or the value fails its rule, leaving a Computed(Undefined) leaf
/// to the caller.
pub(crate) fn decode_ava_body(
    sub: &mut BerReader,
    schema: &dyn Schema,
    choice: AvaChoice,
) -> Result<Option<AttributeAssertion>, DecodeError> {
    let name_bytes = sub.read_octet_string()?;
    let value = sub.read_octet_string()?;

    let Ok(name) = String::from_utf8(name_bytes) else {
        debug!("assertion attribute description is not UTF-8");
        return Ok(None);
    };
    let Some(desc) = schema.attribute_type(&name) else {
        debug!(attr = %name, "unknown attribute in assertion");
        return Ok(None);
    };

    let rule = match choice {
        AvaChoice::Equality => desc.equality.clone(),
        AvaChoice::Ge | AvaChoice::Le => desc.ordering.clone(),
        AvaChoice::Approx => desc.approx.clone().or_else(|| desc.equality.clone()),
    };
    let normalized = match rule {
        Some(rule) => {
            if !rule.validate(&value) {
                debug!(attr = %name, "assertion value failed validation");
                return Ok(None);
            }
            match rule.normalize(&value) {
                Ok(n) => Some(n),
                Err(e) => {
                    debug!(attr = %name, error = %e, "assertion value failed normalization");
                    return Ok(None);
                }
            }
        }
        None => None,
    };

    Ok(Some(AttributeAssertion {
        desc,
        value,
        normalized,
    }))
}

/// SubstringFilter body: attribute description plus SEQUENCE OF
/// initial/any/final components in wire order.
pub(crate) fn decode_substrings_body(
    sub: &mut BerReader,
    schema: &dyn Schema,
) -> Result<Option<SubstringsAssertion>, DecodeError> {
    let name_bytes = sub.read_octet_string()?;
    let seq_tag = sub.read_tag()?;
    if seq_tag != LDAP_TAG_SEQUENCE {
        return Err(DecodeError::Protocol(format!(
            "substring components must be a SEQUENCE, got tag 0x{:02X}",
            seq_tag
        )));
    }
    let seq_len = sub.read_length()?;
    let mut comps = sub.take(seq_len)?;

    let resolved = String::from_utf8(name_bytes)
        .ok()
        .and_then(|n| schema.attribute_type(&n));
    let Some(desc) = resolved else {
        debug!("unknown attribute in substring filter");
        return Ok(None);
    };
    let rule = desc.substr.clone();

    let mut initial: Option<Vec<u8>> = None;
    let mut any: Vec<Vec<u8>> = Vec::new();
    let mut final_: Option<Vec<u8>> = None;

    while comps.remaining() > 0 {
        let tag = comps.read_tag()?;
        let raw = comps.read_octet_string_value()?;
        if raw.is_empty() {
            return Err(DecodeError::InvalidSyntax(
                "empty substring component".into(),
            ));
        }
        let val = match &rule {
            Some(rule) => {
                if !rule.validate(&raw) {
                    return Err(DecodeError::InvalidSyntax(format!(
                        "substring component failed validation for {}",
                        desc.name()
                    )));
                }
                rule.normalize(&raw)
                    .map_err(|e| DecodeError::InvalidSyntax(e.0))?
            }
            None => raw,
        };
        match tag {
            LDAP_SUBSTRING_INITIAL => {
                debug!("  INITIAL");
                if initial.is_some() || !any.is_empty() || final_.is_some() {
                    return Err(DecodeError::Protocol(
                        "initial substring out of order".into(),
                    ));
                }
                initial = Some(val);
            }
            LDAP_SUBSTRING_ANY => {
                debug!("  ANY");
                if final_.is_some() {
                    return Err(DecodeError::Protocol(
                        "any substring after final".into(),
                    ));
                }
                any.push(val);
            }
            LDAP_SUBSTRING_FINAL => {
                debug!("  FINAL");
                if final_.is_some() {
                    return Err(DecodeError::Protocol(
                        "duplicate final substring".into(),
                    ));
                }
                final_ = Some(val);
            }
            other => {
                return Err(DecodeError::Protocol(format!(
                    "unknown substring component tag 0x{:02X}",
                    other
                )));
            }
        }
    }

    if initial.is_none() && any.is_empty() && final_.is_none() {
        return Err(DecodeError::Protocol(
            "substring filter with no components".into(),
        ));
    }

    Ok(Some(SubstringsAssertion {
        desc,
        initial,
        any,
        final_,
    }))
}

pub(crate) fn decode_present_body(
    name_bytes: Vec<u8>,
    schema: &dyn Schema,
) -> Option<Arc<AttributeType>> {
    let name = String::from_utf8(name_bytes).ok()?;
    let desc = schema.attribute_type(&name);
    if desc.is_none() {
        debug!(attr = %name, "unknown attribute in presence filter");
    }
    desc
}

/// MatchingRuleAssertion body:
///
///	matchingRule  [1] MatchingRuleId OPTIONAL,
///	type          [2] AttributeDescription OPTIONAL,
///	matchValue    [3] AssertionValue,
///	dnAttributes  [4] BOOLEAN DEFAULT FALSE
///
/// Failure to resolve a usable rule is a hard error here, not a Computed
/// degradation like everywhere else.
pub(crate) fn decode_extensible_body(
    sub: &mut BerReader,
    schema: &dyn Schema,
) -> Result<MatchingRuleAssertion, DecodeError> {
    let mut rule_id: Option<String> = None;
    let mut type_name: Option<String> = None;
    let mut value: Option<Vec<u8>> = None;
    let mut dn_attrs = false;

    while sub.remaining() > 0 {
        let tag = sub.read_tag()?;
        let bytes = sub.read_octet_string_value()?;
        match tag {
            LDAP_MRA_RULE if rule_id.is_none() && type_name.is_none() && value.is_none() => {
                rule_id = Some(String::from_utf8(bytes).map_err(|_| {
                    DecodeError::Protocol("matching rule id is not UTF-8".into())
                })?);
            }
            LDAP_MRA_TYPE if type_name.is_none() && value.is_none() => {
                type_name = Some(String::from_utf8(bytes).map_err(|_| {
                    DecodeError::Protocol("extensible attribute description is not UTF-8".into())
                })?);
            }
            LDAP_MRA_VALUE if value.is_none() => {
                value = Some(bytes);
            }
            LDAP_MRA_DNATTRS if value.is_some() => {
                dn_attrs = !bytes.is_empty() && bytes[0] != 0;
            }
            other => {
                return Err(DecodeError::Protocol(format!(
                    "misplaced extensible component tag 0x{:02X}",
                    other
                )));
            }
        }
    }

    let value = value.ok_or_else(|| {
        DecodeError::Protocol("extensible filter without a match value".into())
    })?;

    let rule = match &rule_id {
        Some(id) => Some(schema.matching_rule(id).ok_or_else(|| {
            DecodeError::InappropriateMatching(format!("unknown matching rule {:?}", id))
        })?),
        None => None,
    };
    let desc = match &type_name {
        Some(n) => Some(schema.attribute_type(n).ok_or_else(|| {
            DecodeError::InappropriateMatching(format!(
                "unknown attribute {:?} in extensible match",
                n
            ))
        })?),
        None => None,
    };

    let effective = if let Some(rule) = &rule {
        if let Some(desc) = &desc {
            if rule.syntax != desc.syntax {
                return Err(DecodeError::InappropriateMatching(format!(
                    "rule {} does not apply to attribute {}",
                    rule.name,
                    desc.name()
                )));
            }
        }
        rule.clone()
    } else if let Some(desc) = &desc {
        let eq = desc.equality.clone().ok_or_else(|| {
            DecodeError::InappropriateMatching(format!(
                "attribute {} declares no equality rule",
                desc.name()
            ))
        })?;
        if !eq.extensible {
            return Err(DecodeError::InappropriateMatching(format!(
                "rule {} does not support extensible matching",
                eq.name
            )));
        }
        eq
    } else {
        return Err(DecodeError::Protocol(
            "extensible filter names neither rule nor attribute".into(),
        ));
    };

    if !effective.validate(&value) {
        return Err(DecodeError::InvalidSyntax(
            "extensible assertion value failed validation".into(),
        ));
    }
    let normalized = effective
        .normalize(&value)
        .map_err(|e| DecodeError::InvalidSyntax(e.0))?;

    Ok(MatchingRuleAssertion {
        rule,
        desc,
        value,
        normalized: Some(normalized),
        dn_attrs,
    })
}
