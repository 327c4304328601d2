#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    BacktickQuoted,
    LineComment,
    BlockComment,
}

/// SQL clause a placeholder sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Clause {
    Other,
    Where,
    OrderBy,
    Set,
}

/// Tracks the current clause from keywords, with one level per open parenthesis so a subquery's
/// clauses do not leak into the enclosing statement.
pub(super) struct ClauseTracker {
    current: Clause,
    outer: Vec<Clause>,
    after_order: bool,
}

impl ClauseTracker {
    pub(super) fn new() -> Self {
        Self {
            current: Clause::Other,
            outer: Vec::new(),
            after_order: false,
        }
    }

    pub(super) fn current(&self) -> Clause {
        self.current
    }

    pub(super) fn word(&mut self, word: &str) {
        let after_order = std::mem::take(&mut self.after_order);
        if word.eq_ignore_ascii_case("WHERE") {
            self.current = Clause::Where;
        } else if word.eq_ignore_ascii_case("SET") {
            self.current = Clause::Set;
        } else if word.eq_ignore_ascii_case("ORDER") {
            self.current = Clause::Other;
            self.after_order = true;
        } else if after_order && word.eq_ignore_ascii_case("BY") {
            self.current = Clause::OrderBy;
        } else if CLAUSE_KEYWORDS
            .iter()
            .any(|kw| word.eq_ignore_ascii_case(kw))
        {
            self.current = Clause::Other;
        }
    }

    pub(super) fn open_paren(&mut self) {
        self.after_order = false;
        self.outer.push(self.current);
    }

    pub(super) fn close_paren(&mut self) {
        self.after_order = false;
        if let Some(clause) = self.outer.pop() {
            self.current = clause;
        }
    }
}

const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT",
    "FROM",
    "JOIN",
    "ON",
    "USING",
    "GROUP",
    "HAVING",
    "LIMIT",
    "OFFSET",
    "UNION",
    "INSERT",
    "INTO",
    "VALUES",
    "VALUE",
    "UPDATE",
    "DELETE",
    "RETURNING",
    "WINDOW",
];
