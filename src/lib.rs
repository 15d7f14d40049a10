pub mod access;
pub mod ber;
pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod matched_values;
pub mod schema;
pub mod serialize;
pub mod text;

pub use access::{AccessControl, AllowAll, DenyAttrs, SubordinatesProbe};
pub use config::SchemaConfig;
pub use entry::{Attribute, Entry};
pub use error::{ComputedOutcome, DecodeError, EvalError, Verdict};
pub use evaluate::{evaluate_filter, EvalContext};
pub use filter::{
    decode_filter, AttributeAssertion, Filter, MatchingRuleAssertion, SubstringsAssertion,
};
pub use matched_values::{
    decode_vrfilter, filter_matched_values, new_match_matrix, vrfilter_from_ber,
    vrfilter_from_text, MatchMatrix, VrFilterItem,
};
pub use schema::{AttributeType, MatchingRule, Schema, SchemaRegistry, ValueMatcher};
pub use serialize::{escape_filter_value, vrfilter_to_string};
pub use text::filter_from_text;
