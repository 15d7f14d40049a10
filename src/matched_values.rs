// Matched-values control support: a flat list of simple filter items
// evaluated over an entry's full attribute list into a per-attribute,
// per-value flag matrix. There is no boolean composition and no short
// circuit; items only ever set bits, so the matrix grows monotonically
// across items.

use crate::ber::{
    BerReader, LDAP_FILTER_AND, LDAP_FILTER_APPROX, LDAP_FILTER_COMPUTED, LDAP_FILTER_EQUALITY,
    LDAP_FILTER_EXTENSIBLE, LDAP_FILTER_GE, LDAP_FILTER_LE, LDAP_FILTER_NOT, LDAP_FILTER_OR,
    LDAP_FILTER_PRESENT, LDAP_FILTER_SUBSTRINGS, LDAP_TAG_SEQUENCE,
};
use crate::entry::Attribute;
use crate::error::{ComputedOutcome, DecodeError, EvalError};
use crate::evaluate::{op_hit, rule_for_op, substrings_match, CompareOp};
use crate::filter::{
    decode_ava_body, decode_extensible_body, decode_present_body, decode_substrings_body,
    AttributeAssertion, AvaChoice, MatchingRuleAssertion, SubstringsAssertion,
};
use crate::schema::{AttributeType, Schema};
use crate::text::vrfilter_text_to_ber;
use std::sync::Arc;
use tracing::debug;

/// One SimpleFilterItem: the leaf choices of a Filter with no And/Or/Not.
#[derive(Debug, Clone, PartialEq)]
pub enum VrFilterItem {
    Equality(AttributeAssertion),
    Ge(AttributeAssertion),
    Le(AttributeAssertion),
    Approx(AttributeAssertion),
    Substrings(SubstringsAssertion),
    Present(Arc<AttributeType>),
    Extensible(MatchingRuleAssertion),
    /// Degraded item (unknown attribute or choice); never affects the
    /// matrix.
    Computed(ComputedOutcome),
}

/// One row per Attribute in entry order, one flag per value, all initially
/// false. The evaluator only ever sets flags.
pub type MatchMatrix = Vec<Vec<bool>>;

pub fn new_match_matrix(attrs: &[Attribute]) -> MatchMatrix {
    attrs.iter().map(|a| vec![false; a.values.len()]).collect()
}

/// Decode a `SEQUENCE OF SimpleFilterItem` from raw BER bytes.
pub fn vrfilter_from_ber(
    data: &[u8],
    schema: &dyn Schema,
) -> Result<Vec<VrFilterItem>, DecodeError> {
    let mut r = BerReader::new(data);
    let items = decode_vrfilter(&mut r, schema)?;
    if r.remaining() > 0 {
        return Err(DecodeError::Protocol(
            "trailing bytes after matched-values filter".into(),
        ));
    }
    Ok(items)
}

/// Parse the textual form, a parenthesized item list like
/// `((cn=a)(mail=*@x))`, through the same BER path as the wire.
pub fn vrfilter_from_text(
    text: &str,
    schema: &dyn Schema,
) -> Result<Vec<VrFilterItem>, DecodeError> {
    let ber = vrfilter_text_to_ber(text)?;
    vrfilter_from_ber(&ber, schema)
}

pub fn decode_vrfilter(
    r: &mut BerReader,
    schema: &dyn Schema,
) -> Result<Vec<VrFilterItem>, DecodeError> {
    let tag = r.read_tag()?;
    if tag != LDAP_TAG_SEQUENCE {
        return Err(DecodeError::Protocol(format!(
            "matched-values filter must be a SEQUENCE, got tag 0x{:02X}",
            tag
        )));
    }
    let len = r.read_length()?;
    let mut sub = r.take(len)?;
    let mut items = Vec::new();
    while sub.remaining() > 0 {
        items.push(decode_vrfilter_item(&mut sub, schema)?);
    }
    Ok(items)
}

fn decode_vrfilter_item(
    r: &mut BerReader,
    schema: &dyn Schema,
) -> Result<VrFilterItem, DecodeError> {
    let tag = r.read_tag()?;
    let len = r.read_length()?;
    let item = match tag {
        LDAP_FILTER_EQUALITY => {
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Equality)? {
                Some(ava) => VrFilterItem::Equality(ava),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_GE => {
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Ge)? {
                Some(ava) => VrFilterItem::Ge(ava),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_LE => {
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Le)? {
                Some(ava) => VrFilterItem::Le(ava),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_APPROX => {
            let mut sub = r.take(len)?;
            match decode_ava_body(&mut sub, schema, AvaChoice::Approx)? {
                Some(ava) => VrFilterItem::Approx(ava),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_SUBSTRINGS => {
            let mut sub = r.take(len)?;
            match decode_substrings_body(&mut sub, schema)? {
                Some(ssa) => VrFilterItem::Substrings(ssa),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_PRESENT => {
            let name = r.read_raw_bytes(len)?;
            match decode_present_body(name, schema) {
                Some(desc) => VrFilterItem::Present(desc),
                None => VrFilterItem::Computed(ComputedOutcome::Undefined),
            }
        }
        LDAP_FILTER_EXTENSIBLE => {
            let mut sub = r.take(len)?;
            VrFilterItem::Extensible(decode_extensible_body(&mut sub, schema)?)
        }
        LDAP_FILTER_COMPUTED => {
            let bytes = r.read_raw_bytes(len)?;
            let outcome = match bytes.as_slice() {
                [b] => ComputedOutcome::from_wire_byte(*b),
                _ => ComputedOutcome::Undefined,
            };
            VrFilterItem::Computed(outcome)
        }
        LDAP_FILTER_AND | LDAP_FILTER_OR | LDAP_FILTER_NOT => {
            return Err(DecodeError::Protocol(
                "nested filter in matched-values list".into(),
            ));
        }
        other => {
            debug!("unknown matched-values item 0x{:02X}", other);
            r.skip(len)?;
            VrFilterItem::Computed(ComputedOutcome::Undefined)
        }
    };
    Ok(item)
}

/// Evaluate every item over the attribute list, flagging each qualifying
/// value. A genuine comparison error aborts the whole evaluation so a
/// partial matrix is never mistaken for a result.
pub fn filter_matched_values(
    attrs: &[Attribute],
    items: &[VrFilterItem],
    flags: &mut MatchMatrix,
) -> Result<(), EvalError> {
    for item in items {
        match item {
            VrFilterItem::Computed(_) => {
                // This item type does not affect the result
            }
            VrFilterItem::Equality(ava) => flag_ava(attrs, ava, CompareOp::Equality, flags)?,
            VrFilterItem::Ge(ava) => flag_ava(attrs, ava, CompareOp::Ge, flags)?,
            VrFilterItem::Le(ava) => flag_ava(attrs, ava, CompareOp::Le, flags)?,
            VrFilterItem::Approx(ava) => flag_ava(attrs, ava, CompareOp::Approx, flags)?,
            VrFilterItem::Substrings(ssa) => flag_substrings(attrs, ssa, flags)?,
            VrFilterItem::Present(desc) => flag_present(attrs, desc, flags),
            VrFilterItem::Extensible(mra) => flag_extensible(attrs, mra, flags)?,
        }
    }
    Ok(())
}

fn flag_ava(
    attrs: &[Attribute],
    ava: &AttributeAssertion,
    op: CompareOp,
    flags: &mut MatchMatrix,
) -> Result<(), EvalError> {
    let decode_rule = rule_for_op(&ava.desc, op);
    for (i, a) in attrs.iter().enumerate() {
        if !a.desc.is_subtype_of(&ava.desc) {
            continue;
        }
        let Some(rule) = rule_for_op(&a.desc, op) else {
            continue;
        };
        let asserted: Vec<u8> = match (&ava.normalized, &decode_rule) {
            (Some(n), Some(dr)) if dr.as_ref() == rule.as_ref() => n.clone(),
            _ => rule.normalize(&ava.value)?,
        };
        for (j, value) in a.values.iter().enumerate() {
            let vn = rule.normalize(value)?;
            let rc = rule.compare(&vn, &asserted)?;
            if op_hit(op, rc) {
                flags[i][j] = true;
            }
        }
    }
    Ok(())
}

fn flag_present(attrs: &[Attribute], desc: &Arc<AttributeType>, flags: &mut MatchMatrix) {
    for (i, a) in attrs.iter().enumerate() {
        if !a.desc.is_subtype_of(desc) {
            continue;
        }
        for flag in &mut flags[i] {
            *flag = true;
        }
    }
}

fn flag_substrings(
    attrs: &[Attribute],
    ssa: &SubstringsAssertion,
    flags: &mut MatchMatrix,
) -> Result<(), EvalError> {
    let decode_rule = ssa.desc.substr.clone();
    for (i, a) in attrs.iter().enumerate() {
        if !a.desc.is_subtype_of(&ssa.desc) {
            continue;
        }
        let Some(rule) = a.desc.substr.clone() else {
            continue;
        };
        let mut initial = ssa.initial.clone();
        let mut any = ssa.any.clone();
        let mut final_ = ssa.final_.clone();
        if decode_rule.as_deref() != Some(rule.as_ref()) {
            if let Some(i2) = &mut initial {
                *i2 = rule.normalize(i2)?;
            }
            for part in &mut any {
                *part = rule.normalize(part)?;
            }
            if let Some(f) = &mut final_ {
                *f = rule.normalize(f)?;
            }
        }
        for (j, value) in a.values.iter().enumerate() {
            let vn = rule.normalize(value)?;
            if substrings_match(&vn, initial.as_deref(), &any, final_.as_deref()) {
                flags[i][j] = true;
            }
        }
    }
    Ok(())
}

fn flag_extensible(
    attrs: &[Attribute],
    mra: &MatchingRuleAssertion,
    flags: &mut MatchMatrix,
) -> Result<(), EvalError> {
    let Some(rule) = mra.effective_rule() else {
        return Err(EvalError::Matching(
            "extensible match without a usable rule".into(),
        ));
    };
    for (i, a) in attrs.iter().enumerate() {
        let asserted: Vec<u8> = if let Some(desc) = &mra.desc {
            if !a.desc.is_subtype_of(desc) {
                continue;
            }
            match &mra.normalized {
                Some(n) => n.clone(),
                None => rule.normalize(&mra.value)?,
            }
        } else {
            // Any attribute whose declared syntax equals the rule's; a
            // looser test than boolean evaluation applies.
            if rule.syntax != a.desc.syntax {
                continue;
            }
            match rule.normalize(&mra.value) {
                Ok(n) => n,
                Err(_) => continue,
            }
        };
        for (j, value) in a.values.iter().enumerate() {
            let vn = rule.normalize(value)?;
            if rule.compare(&vn, &asserted)? == 0 {
                flags[i][j] = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::schema::SchemaRegistry;
    use crate::serialize::vrfilter_to_string;

    fn person(reg: &SchemaRegistry) -> Entry {
        Entry::new("cn=test,dc=example,dc=com")
            .with_attr(reg.attribute_type("cn").unwrap(), &["test"])
            .with_attr(reg.attribute_type("mail").unwrap(), &["a@x", "b@x"])
            .with_attr(reg.attribute_type("uidNumber").unwrap(), &["10", "50"])
    }

    fn run(reg: &SchemaRegistry, entry: &Entry, text: &str) -> MatchMatrix {
        let items = vrfilter_from_text(text, reg).unwrap();
        let mut flags = new_match_matrix(&entry.attributes);
        filter_matched_values(&entry.attributes, &items, &mut flags).unwrap();
        flags
    }

    #[test]
    fn test_decode_text_items() {
        let reg = SchemaRegistry::core();
        let items = vrfilter_from_text("((cn=a)(mail=b*))", &reg).unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], VrFilterItem::Equality(_)));
        assert!(matches!(items[1], VrFilterItem::Substrings(_)));
    }

    #[test]
    fn test_nested_filters_are_rejected() {
        let reg = SchemaRegistry::core();
        for bad in ["((&(cn=a)))", "((|(cn=a)))", "((!(cn=a)))"] {
            assert!(matches!(
                vrfilter_from_text(bad, &reg),
                Err(DecodeError::Protocol(_))
            ));
        }
    }

    #[test]
    fn test_equality_flags_individual_values() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        let flags = run(&reg, &e, "((mail=a@x))");
        assert_eq!(flags[0], vec![false]); // cn row untouched
        assert_eq!(flags[1], vec![true, false]);
        assert_eq!(flags[2], vec![false, false]);
    }

    #[test]
    fn test_no_short_circuit_every_qualifying_value_is_flagged() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        // Both mail values end in @x
        let flags = run(&reg, &e, "((mail=*@x))");
        assert_eq!(flags[1], vec![true, true]);
    }

    #[test]
    fn test_present_flags_whole_row() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        let flags = run(&reg, &e, "((mail=*))");
        assert_eq!(flags[1], vec![true, true]);
        assert_eq!(flags[0], vec![false]);
    }

    #[test]
    fn test_ordering_flags() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        let flags = run(&reg, &e, "((uidNumber>=20))");
        assert_eq!(flags[2], vec![false, true]);
        let flags = run(&reg, &e, "((uidNumber<=20))");
        assert_eq!(flags[2], vec![true, false]);
        // >= is inclusive
        let flags = run(&reg, &e, "((uidNumber>=50))");
        assert_eq!(flags[2], vec![false, true]);
    }

    /// Disjoint items accumulate; nothing ever clears a set bit.
    #[test]
    fn test_matrix_is_monotonic_across_items() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        let items_a = vrfilter_from_text("((mail=a@x))", &reg).unwrap();
        let items_b = vrfilter_from_text("((mail=b@x)(uidNumber>=40))", &reg).unwrap();

        let mut flags = new_match_matrix(&e.attributes);
        filter_matched_values(&e.attributes, &items_a, &mut flags).unwrap();
        assert_eq!(flags[1], vec![true, false]);
        filter_matched_values(&e.attributes, &items_b, &mut flags).unwrap();
        assert_eq!(flags[1], vec![true, true]);
        assert_eq!(flags[2], vec![false, true]);
    }

    #[test]
    fn test_computed_items_do_not_affect_the_matrix() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        // Unknown attribute degrades to a computed no-op item
        let items = vrfilter_from_text("((bogus=x))", &reg).unwrap();
        assert_eq!(items, vec![VrFilterItem::Computed(ComputedOutcome::Undefined)]);
        let mut flags = new_match_matrix(&e.attributes);
        filter_matched_values(&e.attributes, &items, &mut flags).unwrap();
        assert!(flags.iter().all(|row| row.iter().all(|f| !f)));
    }

    #[test]
    fn test_extensible_matches_by_declared_syntax() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        // No attribute description: every attribute with INTEGER syntax
        let flags = run(&reg, &e, "((:integerMatch:=50))");
        assert_eq!(flags[2], vec![false, true]);
        assert_eq!(flags[0], vec![false]);
    }

    #[test]
    fn test_extensible_with_attribute_flags_values() {
        let reg = SchemaRegistry::core();
        let e = person(&reg);
        let flags = run(&reg, &e, "((cn:2.5.13.2:=TEST))");
        assert_eq!(flags[0], vec![true]);
    }

    #[test]
    fn test_comparison_error_aborts() {
        let reg = SchemaRegistry::core();
        let e = Entry::new("cn=x").with_attr(
            reg.attribute_type("uidNumber").unwrap(),
            &["not-a-number"],
        );
        let items = vrfilter_from_text("((uidNumber>=1))", &reg).unwrap();
        let mut flags = new_match_matrix(&e.attributes);
        assert!(matches!(
            filter_matched_values(&e.attributes, &items, &mut flags),
            Err(EvalError::Matching(_))
        ));
    }

    #[test]
    fn test_substrings_skip_rows_without_rule() {
        let mut reg = SchemaRegistry::new();
        reg.add_attribute_type(
            crate::schema::AttributeType::new(
                "9.9.2",
                &["plain"],
                crate::schema::SYNTAX_DIRECTORY_STRING,
            )
            .with_equality(crate::schema::case_ignore_match()),
        );
        let e = Entry::new("cn=x").with_attr(reg.attribute_type("plain").unwrap(), &["abc"]);
        let flags = run(&reg, &e, "((plain=ab*))");
        assert_eq!(flags[0], vec![false]);
    }

    #[test]
    fn test_render_round_trip() {
        let reg = SchemaRegistry::core();
        let items = vrfilter_from_text("((cn=a)(mail=*@x)(uidNumber>=20))", &reg).unwrap();
        let text = vrfilter_to_string(&items);
        assert_eq!(text, "((cn=a)(mail=*@x)(uidNumber>=20))");
        let reparsed = vrfilter_from_text(&text, &reg).unwrap();
        assert_eq!(items, reparsed);
    }
}
