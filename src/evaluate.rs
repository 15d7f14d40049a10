// Three-valued filter evaluation against a single entry.
//
// Leaves are gated by the injected access-control capability: a SEARCH
// denial is a terminal InsufficientAccess, never a silent False. Real
// comparison errors likewise propagate straight through And/Or. Undefined
// is not an error; it flows through the boolean composition rules.

use crate::access::{AccessControl, AllowAll, SubordinatesProbe};
use crate::dn::{DnParser, SimpleDnParser};
use crate::entry::Entry;
use crate::error::{ComputedOutcome, EvalError, Verdict};
use crate::filter::{AttributeAssertion, Filter, MatchingRuleAssertion, SubstringsAssertion};
use crate::schema::{AttributeType, MatchingRule, Schema};
use std::sync::Arc;
use tracing::trace;

/// Capabilities consumed by evaluation. The schema and registries behind it
/// are an immutable snapshot; nothing here is mutated.
pub struct EvalContext<'a> {
    pub schema: &'a dyn Schema,
    pub access: &'a dyn AccessControl,
    /// Backend hasSubordinates capability; None means not provided.
    pub subordinates: Option<&'a dyn SubordinatesProbe>,
    pub dn_parser: &'a dyn DnParser,
}

impl<'a> EvalContext<'a> {
    pub fn new(schema: &'a dyn Schema) -> Self {
        Self {
            schema,
            access: &AllowAll,
            subordinates: None,
            dn_parser: &SimpleDnParser,
        }
    }

    pub fn with_access(mut self, access: &'a dyn AccessControl) -> Self {
        self.access = access;
        self
    }

    pub fn with_subordinates(mut self, probe: &'a dyn SubordinatesProbe) -> Self {
        self.subordinates = Some(probe);
        self
    }

    pub fn with_dn_parser(mut self, parser: &'a dyn DnParser) -> Self {
        self.dn_parser = parser;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Equality,
    Ge,
    Le,
    Approx,
}

/// Rule an AVA comparison runs under: EQUALITY for equality, ORDERING for
/// ge/le, APPROX falling back to EQUALITY for approximate matches.
pub(crate) fn rule_for_op(desc: &AttributeType, op: CompareOp) -> Option<Arc<MatchingRule>> {
    match op {
        CompareOp::Equality => desc.equality.clone(),
        CompareOp::Ge | CompareOp::Le => desc.ordering.clone(),
        CompareOp::Approx => desc.approx.clone().or_else(|| desc.equality.clone()),
    }
}

/// Interpret a signed comparison result for the operator.
pub(crate) fn op_hit(op: CompareOp, rc: i32) -> bool {
    match op {
        CompareOp::Equality | CompareOp::Approx => rc == 0,
        CompareOp::Ge => rc >= 0,
        CompareOp::Le => rc <= 0,
    }
}

pub fn evaluate_filter(
    ctx: &EvalContext,
    entry: &Entry,
    filter: &Filter,
) -> Result<Verdict, EvalError> {
    trace!("=> evaluate_filter");
    let verdict = match filter {
        Filter::Computed(outcome) => match outcome {
            ComputedOutcome::True => Verdict::True,
            ComputedOutcome::False => Verdict::False,
            ComputedOutcome::Undefined => Verdict::Undefined,
            ComputedOutcome::Error => {
                return Err(EvalError::Matching("computed error filter".into()));
            }
        },
        Filter::Equality(ava) => eval_ava(ctx, entry, ava, CompareOp::Equality)?,
        Filter::Ge(ava) => eval_ava(ctx, entry, ava, CompareOp::Ge)?,
        Filter::Le(ava) => eval_ava(ctx, entry, ava, CompareOp::Le)?,
        Filter::Approx(ava) => eval_ava(ctx, entry, ava, CompareOp::Approx)?,
        Filter::Substrings(ssa) => eval_substrings(ctx, entry, ssa)?,
        Filter::Present(desc) => eval_present(ctx, entry, desc)?,
        Filter::Extensible(mra) => eval_extensible(ctx, entry, mra)?,
        Filter::And(kids) => {
            let mut undefined = false;
            let mut verdict = Verdict::True;
            for kid in kids {
                match evaluate_filter(ctx, entry, kid)? {
                    Verdict::True => {}
                    Verdict::False => {
                        verdict = Verdict::False;
                        break;
                    }
                    Verdict::Undefined => undefined = true,
                }
            }
            if verdict == Verdict::True && undefined {
                Verdict::Undefined
            } else {
                verdict
            }
        }
        Filter::Or(kids) => {
            let mut undefined = false;
            let mut verdict = Verdict::False;
            for kid in kids {
                match evaluate_filter(ctx, entry, kid)? {
                    Verdict::False => {}
                    Verdict::True => {
                        verdict = Verdict::True;
                        break;
                    }
                    Verdict::Undefined => undefined = true,
                }
            }
            if verdict == Verdict::False && undefined {
                Verdict::Undefined
            } else {
                verdict
            }
        }
        Filter::Not(inner) => evaluate_filter(ctx, entry, inner)?.negate(),
    };
    trace!(?verdict, "<= evaluate_filter");
    Ok(verdict)
}

fn eval_ava(
    ctx: &EvalContext,
    entry: &Entry,
    ava: &AttributeAssertion,
    op: CompareOp,
) -> Result<Verdict, EvalError> {
    if ava.desc.is_has_subordinates() {
        return eval_has_subordinates_ava(ctx, entry, ava, op);
    }

    let acl_value = match op {
        CompareOp::Approx => None,
        _ => Some(ava.value.as_slice()),
    };
    let decode_rule = rule_for_op(&ava.desc, op);

    for a in entry.attributes_matching(&ava.desc) {
        if !ctx.access.search_allowed(entry, &a.desc, acl_value) {
            return Err(EvalError::InsufficientAccess);
        }
        let Some(rule) = rule_for_op(&a.desc, op) else {
            continue;
        };
        // The stored normalization is only valid when this instance runs
        // under the same rule the decoder used.
        let asserted: Vec<u8> = match (&ava.normalized, &decode_rule) {
            (Some(n), Some(dr)) if dr.as_ref() == rule.as_ref() => n.clone(),
            _ => rule.normalize(&ava.value)?,
        };
        for value in &a.values {
            let vn = rule.normalize(value)?;
            let rc = rule.compare(&vn, &asserted)?;
            if op_hit(op, rc) {
                return Ok(Verdict::True);
            }
        }
    }
    Ok(Verdict::False)
}

/// The virtual hasSubordinates attribute is answered by the backend probe
/// instead of stored values.
fn eval_has_subordinates_ava(
    ctx: &EvalContext,
    entry: &Entry,
    ava: &AttributeAssertion,
    op: CompareOp,
) -> Result<Verdict, EvalError> {
    if !ctx.access.search_allowed(entry, &ava.desc, Some(&ava.value)) {
        return Err(EvalError::InsufficientAccess);
    }
    let Some(probe) = ctx.subordinates else {
        return Ok(Verdict::Undefined);
    };
    let Some(rule) = rule_for_op(&ava.desc, op) else {
        return Ok(Verdict::Undefined);
    };
    let actual: &[u8] = if probe.has_subordinates(entry) {
        b"TRUE"
    } else {
        b"FALSE"
    };
    let asserted = match &ava.normalized {
        Some(n) => n.clone(),
        None => rule.normalize(&ava.value)?,
    };
    let vn = rule.normalize(actual)?;
    let rc = rule.compare(&vn, &asserted)?;
    Ok(if op_hit(op, rc) {
        Verdict::True
    } else {
        Verdict::False
    })
}

fn eval_present(
    ctx: &EvalContext,
    entry: &Entry,
    desc: &Arc<AttributeType>,
) -> Result<Verdict, EvalError> {
    if !ctx.access.search_allowed(entry, desc, None) {
        return Err(EvalError::InsufficientAccess);
    }
    // hasSubordinates is present whenever the probe capability is wired in;
    // its per-entry answer is deliberately not consulted.
    if desc.is_has_subordinates() && ctx.subordinates.is_some() {
        return Ok(Verdict::True);
    }
    Ok(if entry.attributes_matching(desc).next().is_some() {
        Verdict::True
    } else {
        Verdict::False
    })
}

fn eval_substrings(
    ctx: &EvalContext,
    entry: &Entry,
    ssa: &SubstringsAssertion,
) -> Result<Verdict, EvalError> {
    let decode_rule = ssa.desc.substr.clone();
    for a in entry.attributes_matching(&ssa.desc) {
        if !ctx.access.search_allowed(entry, &a.desc, None) {
            return Err(EvalError::InsufficientAccess);
        }
        // An instance without a SUBSTR rule is skipped, not an error.
        let Some(rule) = a.desc.substr.clone() else {
            continue;
        };
        let mut initial = ssa.initial.clone();
        let mut any = ssa.any.clone();
        let mut final_ = ssa.final_.clone();
        if decode_rule.as_deref() != Some(rule.as_ref()) {
            if let Some(i) = &mut initial {
                *i = rule.normalize(i)?;
            }
            for part in &mut any {
                *part = rule.normalize(part)?;
            }
            if let Some(f) = &mut final_ {
                *f = rule.normalize(f)?;
            }
        }
        for value in &a.values {
            let vn = rule.normalize(value)?;
            if substrings_match(&vn, initial.as_deref(), &any, final_.as_deref()) {
                return Ok(Verdict::True);
            }
        }
    }
    Ok(Verdict::False)
}

/// Anchored byte search: initial at the start, any components in order in
/// between, final at the end.
pub(crate) fn substrings_match(
    value: &[u8],
    initial: Option<&[u8]>,
    any: &[Vec<u8>],
    final_: Option<&[u8]>,
) -> bool {
    let mut lo = 0usize;
    let mut hi = value.len();
    if let Some(i) = initial {
        if hi < i.len() || &value[..i.len()] != i {
            return false;
        }
        lo = i.len();
    }
    if let Some(f) = final_ {
        if hi < lo + f.len() || &value[hi - f.len()..hi] != f {
            return false;
        }
        hi -= f.len();
    }
    for part in any {
        match find_sub(&value[lo..hi], part) {
            Some(pos) => lo += pos + part.len(),
            None => return false,
        }
    }
    true
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn eval_extensible(
    ctx: &EvalContext,
    entry: &Entry,
    mra: &MatchingRuleAssertion,
) -> Result<Verdict, EvalError> {
    let Some(rule) = mra.effective_rule() else {
        return Err(EvalError::Matching(
            "extensible match without a usable rule".into(),
        ));
    };

    if let Some(desc) = &mra.desc {
        for a in entry.attributes_matching(desc) {
            if !ctx.access.search_allowed(entry, &a.desc, Some(&mra.value)) {
                return Err(EvalError::InsufficientAccess);
            }
            let asserted = asserted_against(mra, &rule, &a.desc)?;
            for value in &a.values {
                let vn = rule.normalize(value)?;
                if rule.compare(&vn, &asserted)? == 0 {
                    return Ok(Verdict::True);
                }
            }
        }
    } else {
        for a in &entry.attributes {
            // Rule must be declared usable with this attribute's type.
            if !rule.extensible || rule.syntax != a.desc.syntax {
                continue;
            }
            if !ctx.access.search_allowed(entry, &a.desc, Some(&mra.value)) {
                return Err(EvalError::InsufficientAccess);
            }
            // Fresh normalization against each candidate; a value that does
            // not fit this candidate's domain skips it.
            let asserted = match rule.normalize(&mra.value) {
                Ok(n) => n,
                Err(_) => continue,
            };
            for value in &a.values {
                let vn = rule.normalize(value)?;
                if rule.compare(&vn, &asserted)? == 0 {
                    return Ok(Verdict::True);
                }
            }
        }
    }

    if mra.dn_attrs && eval_dn_attrs(ctx, entry, mra, &rule)? {
        return Ok(Verdict::True);
    }
    Ok(Verdict::False)
}

/// Asserted value in the rule's canonical form: the stored normalization
/// when the assertion's rule is the attribute's own EQUALITY rule, a fresh
/// one from the raw bytes otherwise.
fn asserted_against(
    mra: &MatchingRuleAssertion,
    rule: &Arc<MatchingRule>,
    desc: &AttributeType,
) -> Result<Vec<u8>, EvalError> {
    if desc.equality.as_deref() == Some(rule.as_ref()) {
        if let Some(n) = &mra.normalized {
            return Ok(n.clone());
        }
    }
    Ok(rule.normalize(&mra.value)?)
}

/// dnAttrs: decompose the entry's own DN and run the comparison against
/// each AVA whose attribute type qualifies, stopping at the first hit.
fn eval_dn_attrs(
    ctx: &EvalContext,
    entry: &Entry,
    mra: &MatchingRuleAssertion,
    rule: &Arc<MatchingRule>,
) -> Result<bool, EvalError> {
    let avas = ctx
        .dn_parser
        .decompose(&entry.dn)
        .map_err(|e| EvalError::Matching(format!("entry DN: {}", e.0)))?;
    for ava in &avas {
        let Some(at) = ctx.schema.attribute_type(&ava.attr) else {
            continue;
        };
        let applicable = match &mra.desc {
            Some(desc) => at.is_subtype_of(desc),
            None => rule.extensible && rule.syntax == at.syntax,
        };
        if !applicable {
            continue;
        }
        let asserted = asserted_against(mra, rule, &at)?;
        let vn = rule.normalize(&ava.value)?;
        if rule.compare(&vn, &asserted)? == 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::DenyAttrs;
    use crate::error::MatchError;
    use crate::schema::{SchemaRegistry, ValueMatcher, SYNTAX_DIRECTORY_STRING};
    use crate::text::filter_from_text;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn core() -> SchemaRegistry {
        SchemaRegistry::core()
    }

    fn person(reg: &SchemaRegistry) -> Entry {
        Entry::new("cn=test,dc=example,dc=com")
            .with_attr(reg.attribute_type("cn").unwrap(), &["test"])
            .with_attr(reg.attribute_type("mail").unwrap(), &["a@x", "b@x"])
            .with_attr(reg.attribute_type("uid").unwrap(), &["tester"])
            .with_attr(reg.attribute_type("uidNumber").unwrap(), &["50"])
    }

    fn eval(reg: &SchemaRegistry, entry: &Entry, text: &str) -> Result<Verdict, EvalError> {
        let f = filter_from_text(text, reg).unwrap();
        evaluate_filter(&EvalContext::new(reg), entry, &f)
    }

    #[test]
    fn test_equality_and_composites() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(mail=a@x)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(mail=c@x)").unwrap(), Verdict::False);
        assert_eq!(
            eval(&reg, &e, "(&(mail=a@x)(mail=b@x))").unwrap(),
            Verdict::True
        );
        assert_eq!(
            eval(&reg, &e, "(|(mail=c@x)(mail=a@x))").unwrap(),
            Verdict::True
        );
    }

    #[test]
    fn test_identity_laws() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(&)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(|)").unwrap(), Verdict::False);
    }

    #[test]
    fn test_not_involution() {
        let reg = core();
        let e = person(&reg);
        for leaf in ["(?=true)", "(?=false)", "(?=undefined)", "(mail=a@x)"] {
            let direct = eval(&reg, &e, leaf).unwrap();
            let doubled = eval(&reg, &e, &format!("(!(!{}))", leaf)).unwrap();
            assert_eq!(direct, doubled, "involution broke for {}", leaf);
        }
        assert_eq!(eval(&reg, &e, "(!(mail=a@x))").unwrap(), Verdict::False);
        assert_eq!(eval(&reg, &e, "(!(?=undefined))").unwrap(), Verdict::Undefined);
    }

    #[test]
    fn test_undefined_composition() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(
            eval(&reg, &e, "(&(?=true)(?=undefined))").unwrap(),
            Verdict::Undefined
        );
        assert_eq!(
            eval(&reg, &e, "(&(?=false)(?=undefined))").unwrap(),
            Verdict::False
        );
        assert_eq!(
            eval(&reg, &e, "(|(?=undefined)(?=true))").unwrap(),
            Verdict::True
        );
        assert_eq!(
            eval(&reg, &e, "(|(?=undefined)(?=false))").unwrap(),
            Verdict::Undefined
        );
        // Unknown attributes decode to undefined leaves
        assert_eq!(
            eval(&reg, &e, "(&(mail=a@x)(noSuchAttr=x))").unwrap(),
            Verdict::Undefined
        );
    }

    #[test]
    fn test_computed_error_propagates_unless_short_circuited() {
        let reg = core();
        let e = person(&reg);
        assert!(matches!(
            eval(&reg, &e, "(&(?=true)(?=error))"),
            Err(EvalError::Matching(_))
        ));
        // A False earlier in the And short-circuits before the error leaf
        assert_eq!(
            eval(&reg, &e, "(&(?=false)(?=error))").unwrap(),
            Verdict::False
        );
        assert_eq!(
            eval(&reg, &e, "(|(?=true)(?=error))").unwrap(),
            Verdict::True
        );
    }

    #[derive(Default)]
    struct CountingMatcher {
        compares: AtomicUsize,
    }

    impl ValueMatcher for CountingMatcher {
        fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
            Ok(value.to_vec())
        }

        fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
            self.compares.fetch_add(1, Ordering::SeqCst);
            Ok(if value == asserted { 0 } else { 1 })
        }
    }

    fn counting_registry() -> (SchemaRegistry, Arc<CountingMatcher>) {
        let matcher = Arc::new(CountingMatcher::default());
        let rule = Arc::new(MatchingRule::new(
            "9.9.9.1",
            "countingMatch",
            SYNTAX_DIRECTORY_STRING,
            true,
            matcher.clone(),
        ));
        let mut reg = SchemaRegistry::new();
        reg.add_attribute_type(
            AttributeType::new("9.9.1", &["probe"], SYNTAX_DIRECTORY_STRING).with_equality(rule),
        );
        (reg, matcher)
    }

    #[test]
    fn test_and_short_circuit_skips_comparisons() {
        let (reg, matcher) = counting_registry();
        let e = Entry::new("cn=x").with_attr(reg.attribute_type("probe").unwrap(), &["v"]);
        assert_eq!(
            eval(&reg, &e, "(&(?=false)(probe=v))").unwrap(),
            Verdict::False
        );
        assert_eq!(matcher.compares.load(Ordering::SeqCst), 0);

        assert_eq!(
            eval(&reg, &e, "(|(?=true)(probe=v))").unwrap(),
            Verdict::True
        );
        assert_eq!(matcher.compares.load(Ordering::SeqCst), 0);

        // Sanity: without the short circuit the comparison does run
        assert_eq!(eval(&reg, &e, "(probe=v)").unwrap(), Verdict::True);
        assert_eq!(matcher.compares.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_access_denial_is_terminal() {
        let reg = core();
        let e = person(&reg);
        let acl = DenyAttrs::new(["uid"]);
        let ctx = EvalContext::new(&reg).with_access(&acl);

        // Present on a denied attribute: InsufficientAccess even though the
        // attribute exists
        let f = filter_from_text("(uid=*)", &reg).unwrap();
        assert_eq!(
            evaluate_filter(&ctx, &e, &f),
            Err(EvalError::InsufficientAccess)
        );

        // Equality on a denied attribute with a matching value
        let f = filter_from_text("(uid=tester)", &reg).unwrap();
        assert_eq!(
            evaluate_filter(&ctx, &e, &f),
            Err(EvalError::InsufficientAccess)
        );

        // Denial propagates through And; it is not collapsed into False
        let f = filter_from_text("(&(?=true)(uid=tester))", &reg).unwrap();
        assert_eq!(
            evaluate_filter(&ctx, &e, &f),
            Err(EvalError::InsufficientAccess)
        );

        // But a True earlier in an Or never reaches the denied leaf
        let f = filter_from_text("(|(mail=a@x)(uid=tester))", &reg).unwrap();
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::True));
    }

    #[test]
    fn test_substrings() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(mail=a*)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(mail=*@x)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(mail=a*x)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(mail=*@y)").unwrap(), Verdict::False);
        // Case folding comes from the SUBSTR rule
        assert_eq!(eval(&reg, &e, "(cn=TE*)").unwrap(), Verdict::True);
    }

    #[test]
    fn test_substrings_anchoring() {
        let reg = core();
        let e = Entry::new("cn=x").with_attr(reg.attribute_type("cn").unwrap(), &["abcabc"]);
        assert_eq!(eval(&reg, &e, "(cn=abc*abc)").unwrap(), Verdict::True);
        // initial and final may not overlap the same bytes
        let short = Entry::new("cn=x").with_attr(reg.attribute_type("cn").unwrap(), &["abc"]);
        assert_eq!(eval(&reg, &short, "(cn=abc*abc)").unwrap(), Verdict::False);
        // any components must appear in order
        assert_eq!(eval(&reg, &e, "(cn=*ca*ab*)").unwrap(), Verdict::False);
    }

    /// An attribute with no declared SUBSTR rule makes a substring filter
    /// False for that entry, not Undefined and not an error.
    #[test]
    fn test_substrings_without_rule_is_false() {
        let mut reg = SchemaRegistry::new();
        reg.add_attribute_type(
            AttributeType::new("9.9.2", &["plain"], SYNTAX_DIRECTORY_STRING)
                .with_equality(crate::schema::case_ignore_match()),
        );
        let e = Entry::new("cn=x").with_attr(reg.attribute_type("plain").unwrap(), &["abc"]);
        assert_eq!(eval(&reg, &e, "(plain=ab*)").unwrap(), Verdict::False);
    }

    #[test]
    fn test_ordering_comparisons() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(uidNumber>=42)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(uidNumber>=50)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(uidNumber>=51)").unwrap(), Verdict::False);
        assert_eq!(eval(&reg, &e, "(uidNumber<=50)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(uidNumber<=42)").unwrap(), Verdict::False);
    }

    #[test]
    fn test_bad_stored_value_is_a_real_error() {
        let reg = core();
        let e = Entry::new("cn=x").with_attr(
            reg.attribute_type("uidNumber").unwrap(),
            &["not-a-number"],
        );
        assert!(matches!(
            eval(&reg, &e, "(uidNumber>=1)"),
            Err(EvalError::Matching(_))
        ));
    }

    #[test]
    fn test_approx_word_matching() {
        let reg = core();
        let e = Entry::new("cn=x").with_attr(
            reg.attribute_type("cn").unwrap(),
            &["John Fitzgerald Kennedy"],
        );
        assert_eq!(eval(&reg, &e, "(cn~=john kennedy)").unwrap(), Verdict::True);
        assert_eq!(
            eval(&reg, &e, "(cn~=kennedy john)").unwrap(),
            Verdict::False
        );
    }

    #[test]
    fn test_presence() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(mail=*)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(description=*)").unwrap(), Verdict::False);
        // Subtype presence: cn is present, so its supertype name is too
        assert_eq!(eval(&reg, &e, "(name=*)").unwrap(), Verdict::True);
    }

    struct StaticSubordinates(bool);

    impl SubordinatesProbe for StaticSubordinates {
        fn has_subordinates(&self, _: &Entry) -> bool {
            self.0
        }
    }

    #[test]
    fn test_has_subordinates_presence_only_needs_the_capability() {
        let reg = core();
        let e = person(&reg);
        let f = filter_from_text("(hasSubordinates=*)", &reg).unwrap();

        // Probe wired in: present, regardless of the per-entry answer
        let probe = StaticSubordinates(false);
        let ctx = EvalContext::new(&reg).with_subordinates(&probe);
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::True));

        // No probe and no stored attribute: absent
        let ctx = EvalContext::new(&reg);
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::False));
    }

    #[test]
    fn test_has_subordinates_equality_uses_probe() {
        let reg = core();
        let e = person(&reg);
        let f = filter_from_text("(hasSubordinates=TRUE)", &reg).unwrap();

        let yes = StaticSubordinates(true);
        let ctx = EvalContext::new(&reg).with_subordinates(&yes);
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::True));

        let no = StaticSubordinates(false);
        let ctx = EvalContext::new(&reg).with_subordinates(&no);
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::False));

        let ctx = EvalContext::new(&reg);
        assert_eq!(evaluate_filter(&ctx, &e, &f), Ok(Verdict::Undefined));
    }

    #[test]
    fn test_extensible_with_attribute() {
        let reg = core();
        let e = person(&reg);
        assert_eq!(eval(&reg, &e, "(cn:=TEST)").unwrap(), Verdict::True);
        assert_eq!(eval(&reg, &e, "(cn:=other)").unwrap(), Verdict::False);
        assert_eq!(
            eval(&reg, &e, "(cn:2.5.13.5:=TEST)").unwrap(),
            Verdict::False,
            "caseExactMatch must not fold case"
        );
    }

    #[test]
    fn test_extensible_without_attribute_walks_all_attributes() {
        let reg = core();
        let e = person(&reg);
        // uid holds "tester"; the rule applies to every directory-string
        // attribute and skips the integer one by syntax
        assert_eq!(
            eval(&reg, &e, "(:caseIgnoreMatch:=tester)").unwrap(),
            Verdict::True
        );
        assert_eq!(
            eval(&reg, &e, "(:caseIgnoreMatch:=absent)").unwrap(),
            Verdict::False
        );
        assert_eq!(
            eval(&reg, &e, "(:integerMatch:=50)").unwrap(),
            Verdict::True,
            "integerMatch applies to uidNumber"
        );
    }

    /// dnAttrs matches through the entry's own DN components, independent
    /// of any stored attribute value.
    #[test]
    fn test_extensible_dn_attrs() {
        let reg = core();
        let e = Entry::new("cn=x,o=Example,o=Other")
            .with_attr(reg.attribute_type("cn").unwrap(), &["x"]);
        assert_eq!(
            eval(&reg, &e, "(o:dn:2.5.13.2:=Example)").unwrap(),
            Verdict::True
        );
        assert_eq!(
            eval(&reg, &e, "(o:dn:2.5.13.2:=Absent)").unwrap(),
            Verdict::False
        );
        // Without dnAttrs the same assertion has nothing to match
        assert_eq!(
            eval(&reg, &e, "(o:2.5.13.2:=Example)").unwrap(),
            Verdict::False
        );
    }

    #[test]
    fn test_substrings_match_helper() {
        assert!(substrings_match(b"abcdef", Some(b"ab"), &[b"cd".to_vec()], Some(b"ef")));
        assert!(substrings_match(b"abcdef", None, &[], Some(b"def")));
        assert!(substrings_match(b"abcdef", Some(b"abc"), &[], None));
        assert!(!substrings_match(b"abcdef", Some(b"b"), &[], None));
        assert!(!substrings_match(b"ab", Some(b"ab"), &[], Some(b"b")));
        assert!(substrings_match(b"abab", Some(b"ab"), &[], Some(b"ab")));
    }
}
