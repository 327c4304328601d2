/// Trailing operator token on a clause key (`age>`, `name!`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Operator {
    NotEqual,
    AtMost,
    AtLeast,
}

impl Operator {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            '!' => Some(Operator::NotEqual),
            '<' => Some(Operator::AtMost),
            '>' => Some(Operator::AtLeast),
            _ => None,
        }
    }

    pub(super) fn as_sql(self) -> &'static str {
        match self {
            Operator::NotEqual => "!=",
            Operator::AtMost => "<=",
            Operator::AtLeast => ">=",
        }
    }
}

/// A WHERE-mode key classified by the key grammar, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ClauseKey<'a> {
    Password { negated: bool },
    /// Key used verbatim as `column [NOT ]LIKE`.
    Like(&'a str),
    AnyOf,
    AllOf,
    Compare { column: &'a str, op: Operator },
    Column(&'a str),
}

impl<'a> ClauseKey<'a> {
    pub(super) fn parse(key: &'a str) -> Self {
        match key {
            "password" => return ClauseKey::Password { negated: false },
            "password!" => return ClauseKey::Password { negated: true },
            "||" => return ClauseKey::AnyOf,
            "&&" => return ClauseKey::AllOf,
            _ => {}
        }
        if key.ends_with(" LIKE") {
            return ClauseKey::Like(key);
        }
        if let Some(last) = key.chars().last()
            && let Some(op) = Operator::from_suffix(last)
        {
            return ClauseKey::Compare {
                column: &key[..key.len() - last.len_utf8()],
                op,
            };
        }
        ClauseKey::Column(key)
    }
}
