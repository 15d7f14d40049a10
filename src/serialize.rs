// Rendering filter trees back to RFC 4515 text, for logging, rewriting and
// round-tripping. Output from here always re-parses through the text path.

use crate::error::ComputedOutcome;
use crate::filter::{
    AttributeAssertion, Filter, MatchingRuleAssertion, SubstringsAssertion,
};
use crate::matched_values::VrFilterItem;
use std::fmt::Write;

/// Hex-escape the filter metacharacters (`*` `(` `)` `\` NUL). Bytes outside
/// printable ASCII are escaped as well so the output is NUL-free ASCII text
/// no matter what the value holds.
pub fn escape_filter_value(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value {
        match b {
            b'*' | b'(' | b')' | b'\\' => {
                let _ = write!(out, "\\{:02X}", b);
            }
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:02X}", b);
            }
        }
    }
    out
}

impl Filter {
    pub fn to_filter_string(&self) -> String {
        let mut out = String::new();
        write_filter(self, &mut out);
        out
    }
}

/// Matched-values item lists render as a parenthesized sequence of items.
pub fn vrfilter_to_string(items: &[VrFilterItem]) -> String {
    let mut out = String::from("(");
    for item in items {
        match item {
            VrFilterItem::Equality(ava) => write_ava(ava, "=", &mut out),
            VrFilterItem::Ge(ava) => write_ava(ava, ">=", &mut out),
            VrFilterItem::Le(ava) => write_ava(ava, "<=", &mut out),
            VrFilterItem::Approx(ava) => write_ava(ava, "~=", &mut out),
            VrFilterItem::Substrings(ssa) => write_substrings(ssa, &mut out),
            VrFilterItem::Present(desc) => {
                let _ = write!(out, "({}=*)", desc.name());
            }
            VrFilterItem::Extensible(mra) => write_extensible(mra, &mut out),
            VrFilterItem::Computed(o) => out.push_str(computed_literal(*o)),
        }
    }
    out.push(')');
    out
}

fn write_filter(f: &Filter, out: &mut String) {
    match f {
        Filter::And(kids) => write_list('&', kids, out),
        Filter::Or(kids) => write_list('|', kids, out),
        Filter::Not(inner) => {
            out.push_str("(!");
            write_filter(inner, out);
            out.push(')');
        }
        Filter::Equality(ava) => write_ava(ava, "=", out),
        Filter::Ge(ava) => write_ava(ava, ">=", out),
        Filter::Le(ava) => write_ava(ava, "<=", out),
        Filter::Approx(ava) => write_ava(ava, "~=", out),
        Filter::Substrings(ssa) => write_substrings(ssa, out),
        Filter::Present(desc) => {
            let _ = write!(out, "({}=*)", desc.name());
        }
        Filter::Extensible(mra) => write_extensible(mra, out),
        Filter::Computed(o) => out.push_str(computed_literal(*o)),
    }
}

fn write_list(op: char, kids: &[Filter], out: &mut String) {
    out.push('(');
    out.push(op);
    for kid in kids {
        write_filter(kid, out);
    }
    out.push(')');
}

fn write_ava(ava: &AttributeAssertion, op: &str, out: &mut String) {
    let _ = write!(
        out,
        "({}{}{})",
        ava.desc.name(),
        op,
        escape_filter_value(&ava.value)
    );
}

fn write_substrings(ssa: &SubstringsAssertion, out: &mut String) {
    let _ = write!(out, "({}=", ssa.desc.name());
    if let Some(initial) = &ssa.initial {
        out.push_str(&escape_filter_value(initial));
    }
    for any in &ssa.any {
        out.push('*');
        out.push_str(&escape_filter_value(any));
    }
    match &ssa.final_ {
        Some(final_) => {
            out.push('*');
            out.push_str(&escape_filter_value(final_));
        }
        None => out.push('*'),
    }
    out.push(')');
}

fn write_extensible(mra: &MatchingRuleAssertion, out: &mut String) {
    out.push('(');
    if let Some(desc) = &mra.desc {
        out.push_str(desc.name());
    }
    if mra.dn_attrs {
        out.push_str(":dn");
    }
    if let Some(rule) = &mra.rule {
        out.push(':');
        out.push_str(&rule.oid);
    }
    out.push_str(":=");
    out.push_str(&escape_filter_value(&mra.value));
    out.push(')');
}

fn computed_literal(o: ComputedOutcome) -> &'static str {
    match o {
        ComputedOutcome::True => "(?=true)",
        ComputedOutcome::False => "(?=false)",
        ComputedOutcome::Undefined => "(?=undefined)",
        ComputedOutcome::Error => "(?=error)",
    }
}
