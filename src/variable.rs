//! Output variable declarations.
//!
//! A declaration is written as `name[unit]`, optionally followed by
//! `=src1+src2+...` to declare a composite variable computed as the sum of
//! several raw columns of a LandscapeDNDC output file. For example:
//!
//! ```text
//! dN_n2o_emis[kgNha-1]
//! dN_n_emis[kgNha-1]=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]
//! ```
//!
//! Only columns of the same quantity class (see [`PREFIX_CLASSES`]) may be
//! summed together.
use std::{fmt::Display, str::FromStr};

use itertools::Itertools;

use crate::error::VariableSpecError;

/// Name prefixes that identify the physical quantity class of a column:
/// daily/annual carbon and nitrogen quantities.
pub const PREFIX_CLASSES: [&str; 4] = ["dC_", "dN_", "aC_", "aN_"];

/// Check that `s` has at most one pair of square brackets, and that the pair
/// is balanced and not nested.
pub fn valid_brackets(s: &str) -> bool {
    let mut depth = 0i32;
    let mut n_closed = 0;
    for c in s.chars() {
        if c == '[' {
            depth += 1;
            if depth > 1 {
                return false;
            }
        } else if c == ']' {
            depth -= 1;
            if depth < 0 {
                return false;
            }
            n_closed += 1;
        }
    }
    depth == 0 && n_closed <= 1
}

fn prefix_class(s: &str) -> Option<&'static str> {
    PREFIX_CLASSES.iter().copied().find(|p| s.starts_with(p))
}

/// Check that the target and all sources that carry a recognized prefix share
/// the same prefix class. Names without a recognized prefix do not constrain
/// the result.
pub fn variables_compatible<S: AsRef<str>>(target: &str, sources: &[S]) -> bool {
    sources
        .iter()
        .filter_map(|s| prefix_class(s.as_ref()))
        .chain(prefix_class(target))
        .all_equal()
}

/// One declared output variable.
///
/// For a plain variable, `sources` holds the declaration itself (the column
/// name as it appears in the input file header). For a composite variable it
/// holds the columns to sum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariableSpec {
    name: String,
    unit: Option<String>,
    sources: Vec<String>,
}

impl VariableSpec {
    /// Parse a declaration, optionally with the composite sources given
    /// separately as `src1+src2`. Sources after an `=` in `decl` take
    /// precedence over `sources`.
    pub fn new(decl: &str, sources: Option<&str>) -> Result<Self, VariableSpecError> {
        let (lhs, rhs) = match decl.split('=').collect_vec().as_slice() {
            [lhs] => (lhs.trim(), sources.map(str::trim)),
            [lhs, rhs] => (lhs.trim(), Some(rhs.trim())),
            _ => return Err(VariableSpecError::MultipleAssignments(decl.to_string())),
        };

        let (name, unit) = Self::decode(lhs)?;

        let sources = if let Some(rhs) = rhs {
            let sources = rhs.split('+').map(|s| s.trim().to_string()).collect_vec();
            if sources.iter().any(|s| s.is_empty()) {
                return Err(VariableSpecError::EmptyPart {
                    decl: decl.to_string(),
                    part: "source column",
                });
            }
            if let Some(bad) = sources.iter().find(|s| !valid_brackets(s)) {
                return Err(VariableSpecError::InvalidBrackets(bad.to_string()));
            }
            if !variables_compatible(lhs, sources.as_slice()) {
                return Err(VariableSpecError::IncompatibleSources {
                    target: lhs.to_string(),
                    sources,
                });
            }
            sources
        } else {
            vec![lhs.to_string()]
        };

        Ok(Self { name, unit, sources })
    }

    /// Split `name[unit]` into its name and (optional) unit.
    pub fn decode(s: &str) -> Result<(String, Option<String>), VariableSpecError> {
        if !valid_brackets(s) {
            return Err(VariableSpecError::InvalidBrackets(s.to_string()));
        }

        let (name, unit) = match s.split_once('[') {
            Some((name, rest)) => {
                // valid_brackets guarantees exactly one ']' after the '['
                let (unit, trailing) = rest
                    .split_once(']')
                    .ok_or_else(|| VariableSpecError::InvalidBrackets(s.to_string()))?;
                if !trailing.is_empty() {
                    return Err(VariableSpecError::InvalidBrackets(s.to_string()));
                }
                (name, Some(unit.to_string()))
            }
            None => (s, None),
        };

        if name.is_empty() {
            return Err(VariableSpecError::EmptyPart {
                decl: s.to_string(),
                part: "name",
            });
        }
        Ok((name.to_string(), unit))
    }

    /// Inverse of [`VariableSpec::decode`].
    pub fn encode(name: &str, unit: Option<&str>) -> String {
        match unit {
            Some(unit) => format!("{name}[{unit}]"),
            None => name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_composite(&self) -> bool {
        self.sources.len() > 1
    }

    /// The `name[unit]` form. This is also the column name this variable has
    /// in the merged table.
    pub fn text(&self) -> String {
        Self::encode(&self.name, self.unit())
    }

    /// Whether the values come from columns other than the one named by
    /// [`VariableSpec::text`]: a composite sum, or a single renamed column.
    pub fn has_explicit_sources(&self) -> bool {
        match self.sources.as_slice() {
            [single] => *single != self.text(),
            _ => true,
        }
    }

    /// The full declaration, including the sources of a composite or renamed
    /// variable.
    pub fn text_full(&self) -> String {
        if self.has_explicit_sources() {
            format!("{}={}", self.text(), self.sources.join("+"))
        } else {
            self.text()
        }
    }
}

impl FromStr for VariableSpec {
    type Err = VariableSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s, None)
    }
}

impl TryFrom<String> for VariableSpec {
    type Error = VariableSpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value, None)
    }
}

impl From<VariableSpec> for String {
    fn from(value: VariableSpec) -> Self {
        value.text_full()
    }
}

impl Display for VariableSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", true)]
    #[case("a[b]", true)]
    #[case("a[]", true)]
    #[case("a[b[c]]", false)]
    #[case("a[[b]]", false)]
    #[case("a[b][c]", false)]
    #[case("a]b", false)]
    #[case("a]b[", false)]
    #[case("a[[b]", false)]
    #[case("a[b", false)]
    fn test_valid_brackets(#[case] s: &str, #[case] expected: bool) {
        assert_eq!(valid_brackets(s), expected, "valid_brackets({s:?})");
    }

    #[rstest]
    #[case("n_emis", &["dN_n2o_emis[kgNha-1]", "dN_no_emis[kgNha-1]"], true)]
    #[case("dN_emis", &["dN_n2o_emis[kgNha-1]", "dN_no_emis[kgNha-1]"], true)]
    #[case("dC_emis", &["dN_n2o_emis[kgNha-1]", "dN_no_emis[kgNha-1]"], false)]
    #[case("emission", &["dC_co2_emis[kgCha-1]", "dN_n2o_emis[kgNha-1]"], false)]
    #[case("dN_n2o_emis[kgNha-1]", &["dN_n2o_emis[kgNha-1]"], true)]
    #[case("aN_n2o_emis[kgNha-1]", &["dN_n2o_emis[kgNha-1]"], false)]
    #[case("aN_emis", &["aN_n2o_emis[kgNha-1]", "aN_no_emis[kgNha-1]"], true)]
    #[case("aC_emis", &["dC_co2_emis[kgCha-1]"], false)]
    #[case("n_emis", &["n2o_emis[kgNha-1]", "no_emis[kgNha-1]"], true)]
    fn test_variables_compatible(#[case] target: &str, #[case] sources: &[&str], #[case] expected: bool) {
        assert_eq!(variables_compatible(target, sources), expected);
    }

    #[rstest]
    #[case("dN_n2o_emis[kgNha-1]", "dN_n2o_emis", Some("kgNha-1"))]
    #[case("dN_n2o_emis", "dN_n2o_emis", None)]
    fn test_decode_encode(#[case] s: &str, #[case] name: &str, #[case] unit: Option<&str>) {
        let (n, u) = VariableSpec::decode(s).unwrap();
        assert_eq!(n, name);
        assert_eq!(u.as_deref(), unit);
        assert_eq!(VariableSpec::encode(name, unit), s);
    }

    #[rstest]
    #[case("dN_n2o_emis[[kgNha-1]")]
    #[case("dN_n2o_emis[kgNha-1]x")]
    #[case("[kgNha-1]")]
    fn test_bad_decode(#[case] s: &str) {
        assert!(VariableSpec::decode(s).is_err());
    }

    #[test]
    fn test_sources() {
        let v = VariableSpec::new("dN_n2o_emis[kgNha-1]", None).unwrap();
        assert_eq!(v.sources(), &["dN_n2o_emis[kgNha-1]".to_string()]);
        assert!(!v.is_composite());

        let v = VariableSpec::new("n_emis", Some("n2o_emis+no_emis")).unwrap();
        assert_eq!(v.sources(), &["n2o_emis".to_string(), "no_emis".to_string()]);
        assert!(v.is_composite());

        // A single source is a rename, not a composite
        let v = VariableSpec::new("n2o", Some("dN_n2o_emis[kgNha-1]")).unwrap();
        assert!(!v.is_composite());
        assert!(v.has_explicit_sources());
        assert_eq!(v.text_full(), "n2o=dN_n2o_emis[kgNha-1]");

        let v = VariableSpec::new("dN_n2o_emis[kgNha-1]", Some("dN_n2o_emis[kgNha-1]")).unwrap();
        assert!(!v.has_explicit_sources());
    }

    #[test]
    fn test_text() {
        let v: VariableSpec = "dN_n_emis[kgNha-1]=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]"
            .parse()
            .unwrap();
        assert_eq!(v.name(), "dN_n_emis");
        assert_eq!(v.unit(), Some("kgNha-1"));
        assert_eq!(v.text(), "dN_n_emis[kgNha-1]");
    }

    #[rstest]
    #[case("dN_n_emis[kgNha-1]=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]")]
    #[case("n_emis[kgNha-1]=n2o_emis[kgNha-1]+no_emis[kgNha-1]")]
    #[case("dC_co2_emis[kgCha-1]")]
    #[case("water_table")]
    #[case("a[]")]
    #[case("n2o[kgNha-1]=dN_n2o_emis[kgNha-1]")]
    fn test_text_full_round_trip(#[case] decl: &str) {
        let v: VariableSpec = decl.parse().unwrap();
        assert_eq!(v.text_full(), decl);
        assert_eq!(v.to_string(), decl);

        let reparsed: VariableSpec = v.text_full().parse().unwrap();
        assert_eq!(reparsed.sources(), v.sources());
    }

    #[test]
    fn test_incompatible_composite() {
        let res: Result<VariableSpec, _> = "dC_emis=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]".parse();
        assert!(matches!(res, Err(VariableSpecError::IncompatibleSources { .. })));

        let res: Result<VariableSpec, _> = "dN_emis=dN_n2o_emis[kgNha-1]+dN_no_emis[kgNha-1]".parse();
        assert!(res.is_ok());
    }

    #[rstest]
    #[case("a=b=c")]
    #[case("n_emis=n2o_emis+")]
    #[case("n_emis[kg]=n2o_emis[kg+no_emis[kg]")]
    fn test_bad_declarations(#[case] decl: &str) {
        assert!(decl.parse::<VariableSpec>().is_err(), "{decl} should not parse");
    }
}
