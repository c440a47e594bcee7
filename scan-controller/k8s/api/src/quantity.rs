//! Validation of resource quantities such as `1Gi` or `500M`.

use regex::Regex;
use std::sync::LazyLock;

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([KMGTPE]i|[numkMGTPE]|[eE][+-]?[0-9]+)?$")
        .expect("quantity pattern must compile")
});

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("quantities must match the regular expression '{pattern}': {0:?}", pattern = QUANTITY.as_str())]
pub struct InvalidQuantity(pub String);

pub fn validate(quantity: &str) -> Result<(), InvalidQuantity> {
    if QUANTITY.is_match(quantity) {
        return Ok(());
    }
    Err(InvalidQuantity(quantity.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1Gi")]
    #[case("500M")]
    #[case("1.5Ti")]
    #[case("100")]
    #[case("1e3")]
    #[case("250m")]
    fn accepts(#[case] q: &str) {
        assert_eq!(validate(q), Ok(()));
    }

    #[rstest]
    #[case("")]
    #[case("1GB")]
    #[case("Gi")]
    #[case("one")]
    #[case("1 Gi")]
    fn rejects(#[case] q: &str) {
        assert_eq!(validate(q), Err(InvalidQuantity(q.to_string())));
    }
}
