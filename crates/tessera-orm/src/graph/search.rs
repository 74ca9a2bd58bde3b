use super::QueryGraph;
use crate::entity::Entity;
use crate::expr::{self, Predicate, QueryUnit};

const NEGATE: &str = "<>";

impl<T> QueryGraph<T> {
    /// Filters by a free-text search over the given fields.
    ///
    /// The text is split on whitespace. A row matches when, for some field,
    /// every term is contained in it; `*` in a term is a wildcard anchoring
    /// the pattern instead. Other LIKE metacharacters match literally. A term
    /// prefixed with `<>` must not be contained. A leading `<>` on the whole
    /// text inverts the search: no field may contain any term. Grouped graphs
    /// filter through HAVING.
    #[must_use]
    pub fn search<F>(mut self, f: F, text: &str) -> Self
    where
        F: FnOnce(&Entity) -> Vec<QueryUnit>,
    {
        let fields = f(&self.entity);
        let Some(predicate) = search_predicate(&fields, text) else {
            return self;
        };
        if self.clauses.group_by.is_empty() {
            self.push_where(vec![predicate]);
        } else {
            self.push_having(vec![predicate]);
        }
        self
    }

    /// [`QueryGraph::search`] over every string column of the entity,
    /// joined ones included.
    #[must_use]
    pub fn search_every_string_field(self, text: &str) -> Self {
        self.search(Entity::string_units, text)
    }
}

fn search_predicate(fields: &[QueryUnit], text: &str) -> Option<Predicate> {
    let text = text.trim();
    if fields.is_empty() || text.is_empty() {
        return None;
    }

    if let Some(rest) = text.strip_prefix(NEGATE) {
        let terms: Vec<&str> = rest.split_whitespace().collect();
        if terms.is_empty() {
            return None;
        }
        let per_field = fields
            .iter()
            .map(|field| expr::and(terms.iter().map(|term| term_predicate(field, term, true)).collect()))
            .collect();
        return Some(expr::and(per_field));
    }

    let terms: Vec<(bool, &str)> = text
        .split_whitespace()
        .map(|term| match term.strip_prefix(NEGATE) {
            Some(term) => (true, term),
            None => (false, term),
        })
        .filter(|(_, term)| !term.is_empty())
        .collect();
    if terms.is_empty() {
        return None;
    }
    let per_field = fields
        .iter()
        .map(|field| {
            expr::and(
                terms
                    .iter()
                    .map(|(negated, term)| term_predicate(field, term, *negated))
                    .collect(),
            )
        })
        .collect();
    Some(expr::or(per_field))
}

fn term_predicate(field: &QueryUnit, term: &str, negated: bool) -> Predicate {
    let term = expr::escape_like(term);
    match (term.contains('*'), negated) {
        (true, false) => expr::like(field, term.replace('*', "%")),
        (true, true) => expr::not_like(field, term.replace('*', "%")),
        (false, false) => expr::includes(field, term),
        (false, true) => expr::not_includes(field, term),
    }
}
