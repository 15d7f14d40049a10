// Schema snapshot: attribute types, matching rules, and the value-matching
// capability behind them. Registries are built once, before request traffic,
// and shared read-only (Arc) into decode and evaluation.

use crate::error::MatchError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const SYNTAX_BOOLEAN: &str = "1.3.6.1.4.1.1466.115.121.1.7";
pub const SYNTAX_DN: &str = "1.3.6.1.4.1.1466.115.121.1.12";
pub const SYNTAX_DIRECTORY_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.15";
pub const SYNTAX_IA5_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.26";
pub const SYNTAX_INTEGER: &str = "1.3.6.1.4.1.1466.115.121.1.27";
pub const SYNTAX_OCTET_STRING: &str = "1.3.6.1.4.1.1466.115.121.1.40";

/// The virtual attribute answered by a backend probe, not stored values.
pub const HAS_SUBORDINATES_OID: &str = "2.5.18.9";

/// Value validate/normalize/compare capability behind a matching rule.
/// Injected as a trait so tests can instrument comparisons.
pub trait ValueMatcher: Send + Sync {
    /// Check raw assertion bytes against the rule's syntax.
    fn validate(&self, value: &[u8]) -> bool {
        let _ = value;
        true
    }

    /// Produce the canonical form used for comparison.
    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError>;

    /// Compare two normalized values. Equality rules return 0 on match;
    /// ordering rules return the sign of `value - asserted`.
    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError>;
}

pub struct MatchingRule {
    pub oid: String,
    pub name: String,
    /// Syntax OID of the assertion values this rule understands.
    pub syntax: String,
    /// Whether the rule may drive an extensibleMatch.
    pub extensible: bool,
    matcher: Arc<dyn ValueMatcher>,
}

impl MatchingRule {
    pub fn new(
        oid: &str,
        name: &str,
        syntax: &str,
        extensible: bool,
        matcher: Arc<dyn ValueMatcher>,
    ) -> Self {
        Self {
            oid: oid.to_string(),
            name: name.to_string(),
            syntax: syntax.to_string(),
            extensible,
            matcher,
        }
    }

    pub fn validate(&self, value: &[u8]) -> bool {
        self.matcher.validate(value)
    }

    pub fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        self.matcher
            .normalize(value)
            .map_err(|e| MatchError(format!("{}: {}", self.name, e.0)))
    }

    pub fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        self.matcher
            .compare(value, asserted)
            .map_err(|e| MatchError(format!("{}: {}", self.name, e.0)))
    }
}

/// Rules are identified by OID; separately constructed instances of the
/// same rule compare equal.
impl PartialEq for MatchingRule {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
impl Eq for MatchingRule {}

impl fmt::Debug for MatchingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchingRule")
            .field("oid", &self.oid)
            .field("name", &self.name)
            .finish()
    }
}

pub struct AttributeType {
    pub oid: String,
    pub names: Vec<String>,
    pub sup: Option<Arc<AttributeType>>,
    pub syntax: String,
    pub equality: Option<Arc<MatchingRule>>,
    pub ordering: Option<Arc<MatchingRule>>,
    pub substr: Option<Arc<MatchingRule>>,
    pub approx: Option<Arc<MatchingRule>>,
}

impl AttributeType {
    pub fn new(oid: &str, names: &[&str], syntax: &str) -> Self {
        Self {
            oid: oid.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            sup: None,
            syntax: syntax.to_string(),
            equality: None,
            ordering: None,
            substr: None,
            approx: None,
        }
    }

    pub fn with_sup(mut self, sup: Arc<AttributeType>) -> Self {
        // Rules and syntax are inherited unless overridden.
        if self.equality.is_none() {
            self.equality = sup.equality.clone();
        }
        if self.ordering.is_none() {
            self.ordering = sup.ordering.clone();
        }
        if self.substr.is_none() {
            self.substr = sup.substr.clone();
        }
        if self.approx.is_none() {
            self.approx = sup.approx.clone();
        }
        self.sup = Some(sup);
        self
    }

    pub fn with_equality(mut self, rule: Arc<MatchingRule>) -> Self {
        self.equality = Some(rule);
        self
    }

    pub fn with_ordering(mut self, rule: Arc<MatchingRule>) -> Self {
        self.ordering = Some(rule);
        self
    }

    pub fn with_substr(mut self, rule: Arc<MatchingRule>) -> Self {
        self.substr = Some(rule);
        self
    }

    pub fn with_approx(mut self, rule: Arc<MatchingRule>) -> Self {
        self.approx = Some(rule);
        self
    }

    /// Preferred short name, falling back to the OID.
    pub fn name(&self) -> &str {
        self.names.first().map(|s| s.as_str()).unwrap_or(&self.oid)
    }

    /// True when `self` names the same type as `other` or descends from it
    /// through the sup chain.
    pub fn is_subtype_of(&self, other: &AttributeType) -> bool {
        if self.oid == other.oid {
            return true;
        }
        let mut cur = self.sup.as_deref();
        while let Some(at) = cur {
            if at.oid == other.oid {
                return true;
            }
            cur = at.sup.as_deref();
        }
        false
    }

    pub fn is_has_subordinates(&self) -> bool {
        self.oid == HAS_SUBORDINATES_OID
    }
}

impl PartialEq for AttributeType {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}
impl Eq for AttributeType {}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeType")
            .field("oid", &self.oid)
            .field("names", &self.names)
            .finish()
    }
}

/// Read-only schema lookup used by decode and evaluation.
pub trait Schema: Send + Sync {
    /// Resolve an attribute description (name or OID, case-insensitive).
    fn attribute_type(&self, desc: &str) -> Option<Arc<AttributeType>>;
    /// Resolve a matching rule by name or OID.
    fn matching_rule(&self, id: &str) -> Option<Arc<MatchingRule>>;
}

#[derive(Debug)]
pub struct SchemaRegistry {
    attribute_types: HashMap<String, Arc<AttributeType>>,
    matching_rules: HashMap<String, Arc<MatchingRule>>,
}

impl SchemaRegistry {
    /// Empty registry pre-loaded with the built-in matching rules.
    pub fn new() -> Self {
        let mut reg = Self {
            attribute_types: HashMap::new(),
            matching_rules: HashMap::new(),
        };
        for rule in builtin_rules() {
            reg.add_rule(rule);
        }
        reg
    }

    pub fn add_rule(&mut self, rule: Arc<MatchingRule>) {
        self.matching_rules
            .insert(rule.oid.to_ascii_lowercase(), rule.clone());
        self.matching_rules
            .insert(rule.name.to_ascii_lowercase(), rule);
    }

    /// Register an attribute type under its OID and every name; returns the
    /// shared handle for wiring sup chains.
    pub fn add_attribute_type(&mut self, at: AttributeType) -> Arc<AttributeType> {
        let at = Arc::new(at);
        self.attribute_types
            .insert(at.oid.to_ascii_lowercase(), at.clone());
        for name in &at.names {
            self.attribute_types
                .insert(name.to_ascii_lowercase(), at.clone());
        }
        at
    }

    /// A small, realistic directory schema used by demos and tests.
    pub fn core() -> Self {
        let mut reg = Self::new();

        let case_ignore = case_ignore_match();
        let case_ignore_ord = case_ignore_ordering_match();
        let case_ignore_sub = case_ignore_substrings_match();
        let ia5 = case_ignore_ia5_match();
        let ia5_sub = case_ignore_ia5_substrings_match();
        let integer = integer_match();
        let integer_ord = integer_ordering_match();
        let boolean = boolean_match();
        let octet = octet_string_match();
        let dn = distinguished_name_match();
        let approx = directory_string_approx_match();

        reg.add_attribute_type(
            AttributeType::new("2.5.4.0", &["objectClass"], SYNTAX_DIRECTORY_STRING)
                .with_equality(case_ignore.clone()),
        );
        let name = reg.add_attribute_type(
            AttributeType::new("2.5.4.41", &["name"], SYNTAX_DIRECTORY_STRING)
                .with_equality(case_ignore.clone())
                .with_ordering(case_ignore_ord.clone())
                .with_substr(case_ignore_sub.clone())
                .with_approx(approx.clone()),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.3", &["cn", "commonName"], SYNTAX_DIRECTORY_STRING)
                .with_sup(name.clone()),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.4", &["sn", "surname"], SYNTAX_DIRECTORY_STRING)
                .with_sup(name.clone()),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.10", &["o", "organizationName"], SYNTAX_DIRECTORY_STRING)
                .with_sup(name.clone()),
        );
        reg.add_attribute_type(
            AttributeType::new(
                "2.5.4.11",
                &["ou", "organizationalUnitName"],
                SYNTAX_DIRECTORY_STRING,
            )
            .with_sup(name),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.13", &["description"], SYNTAX_DIRECTORY_STRING)
                .with_equality(case_ignore.clone())
                .with_substr(case_ignore_sub),
        );
        reg.add_attribute_type(
            AttributeType::new("0.9.2342.19200300.100.1.1", &["uid"], SYNTAX_DIRECTORY_STRING)
                .with_equality(case_ignore)
                .with_ordering(case_ignore_ord)
                .with_approx(approx),
        );
        reg.add_attribute_type(
            AttributeType::new("0.9.2342.19200300.100.1.3", &["mail"], SYNTAX_IA5_STRING)
                .with_equality(ia5)
                .with_substr(ia5_sub),
        );
        reg.add_attribute_type(
            AttributeType::new("1.3.6.1.1.1.1.0", &["uidNumber"], SYNTAX_INTEGER)
                .with_equality(integer)
                .with_ordering(integer_ord),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.35", &["userPassword"], SYNTAX_OCTET_STRING)
                .with_equality(octet),
        );
        reg.add_attribute_type(
            AttributeType::new("2.5.4.49", &["distinguishedName"], SYNTAX_DN).with_equality(dn),
        );
        reg.add_attribute_type(
            AttributeType::new(HAS_SUBORDINATES_OID, &["hasSubordinates"], SYNTAX_BOOLEAN)
                .with_equality(boolean),
        );
        reg
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema for SchemaRegistry {
    fn attribute_type(&self, desc: &str) -> Option<Arc<AttributeType>> {
        self.attribute_types
            .get(&desc.to_ascii_lowercase())
            .cloned()
    }

    fn matching_rule(&self, id: &str) -> Option<Arc<MatchingRule>> {
        self.matching_rules.get(&id.to_ascii_lowercase()).cloned()
    }
}

fn sign(ord: std::cmp::Ordering) -> i32 {
    match ord {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/// Directory-string matcher: trims, collapses internal whitespace runs,
/// optionally folds case. Values must be UTF-8.
struct StringMatcher {
    fold_case: bool,
}

impl ValueMatcher for StringMatcher {
    fn validate(&self, value: &[u8]) -> bool {
        std::str::from_utf8(value).is_ok()
    }

    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        let s = std::str::from_utf8(value)
            .map_err(|_| MatchError("value is not valid UTF-8".into()))?;
        let mut out = String::with_capacity(s.len());
        for word in s.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            if self.fold_case {
                out.extend(word.chars().flat_map(|c| c.to_lowercase()));
            } else {
                out.push_str(word);
            }
        }
        Ok(out.into_bytes())
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        Ok(sign(value.cmp(asserted)))
    }
}

/// Raw octet matcher: identity normalization, lexicographic order.
struct OctetMatcher;

impl ValueMatcher for OctetMatcher {
    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        Ok(value.to_vec())
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        Ok(sign(value.cmp(asserted)))
    }
}

/// INTEGER matcher: canonical decimal form, numeric order.
struct IntegerMatcher;

impl IntegerMatcher {
    fn parse(value: &[u8]) -> Result<i128, MatchError> {
        let s = std::str::from_utf8(value)
            .map_err(|_| MatchError("integer value is not valid UTF-8".into()))?;
        s.trim()
            .parse::<i128>()
            .map_err(|_| MatchError(format!("not a valid integer: {:?}", s)))
    }
}

impl ValueMatcher for IntegerMatcher {
    fn validate(&self, value: &[u8]) -> bool {
        Self::parse(value).is_ok()
    }

    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        Ok(Self::parse(value)?.to_string().into_bytes())
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        let a = Self::parse(value)?;
        let b = Self::parse(asserted)?;
        Ok(sign(a.cmp(&b)))
    }
}

/// BOOLEAN matcher: TRUE/FALSE, case-insensitive on input.
struct BooleanMatcher;

impl ValueMatcher for BooleanMatcher {
    fn validate(&self, value: &[u8]) -> bool {
        matches!(
            value.to_ascii_uppercase().as_slice(),
            b"TRUE" | b"FALSE"
        )
    }

    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        match value.to_ascii_uppercase().as_slice() {
            b"TRUE" => Ok(b"TRUE".to_vec()),
            b"FALSE" => Ok(b"FALSE".to_vec()),
            _ => Err(MatchError("boolean value must be TRUE or FALSE".into())),
        }
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        Ok(if value == asserted { 0 } else { 1 })
    }
}

/// DN matcher: case-folds and strips whitespace around RDN separators.
struct DnMatcher;

impl ValueMatcher for DnMatcher {
    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        let s = std::str::from_utf8(value)
            .map_err(|_| MatchError("DN is not valid UTF-8".into()))?;
        let mut out = String::with_capacity(s.len());
        for part in s.split(',') {
            if !out.is_empty() {
                out.push(',');
            }
            let mut first = true;
            for ava in part.split('+') {
                if !first {
                    out.push('+');
                }
                first = false;
                out.push_str(&ava.trim().to_lowercase());
            }
        }
        Ok(out.into_bytes())
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        Ok(if value == asserted { 0 } else { 1 })
    }
}

/// Approximate matcher: every word of the asserted value must appear, in
/// order, among the words of the attribute value. Token equality stands in
/// for the phonetic codes real servers use.
struct WordApproxMatcher;

impl ValueMatcher for WordApproxMatcher {
    fn normalize(&self, value: &[u8]) -> Result<Vec<u8>, MatchError> {
        StringMatcher { fold_case: true }.normalize(value)
    }

    fn compare(&self, value: &[u8], asserted: &[u8]) -> Result<i32, MatchError> {
        let value = std::str::from_utf8(value)
            .map_err(|_| MatchError("value is not valid UTF-8".into()))?;
        let asserted = std::str::from_utf8(asserted)
            .map_err(|_| MatchError("asserted value is not valid UTF-8".into()))?;
        let mut value_words = value.split_whitespace();
        'outer: for want in asserted.split_whitespace() {
            for have in value_words.by_ref() {
                if have == want {
                    continue 'outer;
                }
            }
            return Ok(1);
        }
        Ok(0)
    }
}

pub fn case_ignore_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.2",
        "caseIgnoreMatch",
        SYNTAX_DIRECTORY_STRING,
        true,
        Arc::new(StringMatcher { fold_case: true }),
    ))
}

pub fn case_ignore_ordering_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.3",
        "caseIgnoreOrderingMatch",
        SYNTAX_DIRECTORY_STRING,
        true,
        Arc::new(StringMatcher { fold_case: true }),
    ))
}

pub fn case_ignore_substrings_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.4",
        "caseIgnoreSubstringsMatch",
        SYNTAX_DIRECTORY_STRING,
        false,
        Arc::new(StringMatcher { fold_case: true }),
    ))
}

pub fn case_exact_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.5",
        "caseExactMatch",
        SYNTAX_DIRECTORY_STRING,
        true,
        Arc::new(StringMatcher { fold_case: false }),
    ))
}

pub fn case_exact_ordering_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.6",
        "caseExactOrderingMatch",
        SYNTAX_DIRECTORY_STRING,
        true,
        Arc::new(StringMatcher { fold_case: false }),
    ))
}

pub fn boolean_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.13",
        "booleanMatch",
        SYNTAX_BOOLEAN,
        true,
        Arc::new(BooleanMatcher),
    ))
}

pub fn integer_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.14",
        "integerMatch",
        SYNTAX_INTEGER,
        true,
        Arc::new(IntegerMatcher),
    ))
}

pub fn integer_ordering_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.15",
        "integerOrderingMatch",
        SYNTAX_INTEGER,
        true,
        Arc::new(IntegerMatcher),
    ))
}

pub fn octet_string_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.17",
        "octetStringMatch",
        SYNTAX_OCTET_STRING,
        true,
        Arc::new(OctetMatcher),
    ))
}

pub fn distinguished_name_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "2.5.13.1",
        "distinguishedNameMatch",
        SYNTAX_DN,
        true,
        Arc::new(DnMatcher),
    ))
}

pub fn case_ignore_ia5_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "1.3.6.1.4.1.1466.109.114.2",
        "caseIgnoreIA5Match",
        SYNTAX_IA5_STRING,
        true,
        Arc::new(StringMatcher { fold_case: true }),
    ))
}

pub fn case_ignore_ia5_substrings_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "1.3.6.1.4.1.1466.109.114.3",
        "caseIgnoreIA5SubstringsMatch",
        SYNTAX_IA5_STRING,
        false,
        Arc::new(StringMatcher { fold_case: true }),
    ))
}

pub fn directory_string_approx_match() -> Arc<MatchingRule> {
    Arc::new(MatchingRule::new(
        "1.3.6.1.4.1.4203.666.4.4",
        "directoryStringApproxMatch",
        SYNTAX_DIRECTORY_STRING,
        false,
        Arc::new(WordApproxMatcher),
    ))
}

fn builtin_rules() -> Vec<Arc<MatchingRule>> {
    vec![
        case_ignore_match(),
        case_ignore_ordering_match(),
        case_ignore_substrings_match(),
        case_exact_match(),
        case_exact_ordering_match(),
        boolean_match(),
        integer_match(),
        integer_ordering_match(),
        octet_string_match(),
        distinguished_name_match(),
        case_ignore_ia5_match(),
        case_ignore_ia5_substrings_match(),
        directory_string_approx_match(),
    ]
}
