//! # Statement Cache
//!
//! Memoized SQL text for the two query families whose shape depends on a
//! runtime-variable structural parameter: membership queries (a variable
//! number of ids to match) and admin field updates (a variable set of
//! columns). Keying is order-insensitive for field sets, but the generated
//! text always binds columns in lexicographic order, so statement and
//! arguments can never disagree on field order.
//!
//! Entries are `Arc<str>`, inserted once per key and never evicted; the
//! domain is bounded (page-sized id counts, a handful of field subsets).
//! An equal key always yields the same cached instance, which lets sqlx's
//! per-connection prepared-statement cache reuse the compiled statement.

use std::sync::Arc;

use dashmap::DashMap;

/// The fixed membership query shapes. Each expands `{in}` to a placeholder
/// list of the requested width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// Replies under a set of thread roots, visibility applied.
    RepliesPublic,
    /// Replies under a set of thread roots, unrestricted.
    RepliesAdmin,
    /// Visible-comment totals per url, replies included.
    CountByUrl,
    /// Visible top-level totals per url.
    CountByUrlTopLevel,
    /// Latest visible comments under a set of urls, replies included.
    RecentByUrl,
    /// Latest visible top-level comments under a set of urls.
    RecentByUrlTopLevel,
}

impl Membership {
    fn template(self) -> &'static str {
        match self {
            Membership::RepliesPublic => {
                "SELECT * FROM comments WHERE rid IN ({in}) \
                 AND (is_spam = 0 OR uid = ?) ORDER BY created ASC"
            }
            Membership::RepliesAdmin => {
                "SELECT * FROM comments WHERE rid IN ({in}) ORDER BY created ASC"
            }
            Membership::CountByUrl => {
                "SELECT url, COUNT(*) AS n FROM comments WHERE url IN ({in}) \
                 AND is_spam = 0 GROUP BY url"
            }
            Membership::CountByUrlTopLevel => {
                "SELECT url, COUNT(*) AS n FROM comments WHERE url IN ({in}) \
                 AND is_spam = 0 AND rid = '' GROUP BY url"
            }
            Membership::RecentByUrl => {
                "SELECT * FROM comments WHERE url IN ({in}) AND is_spam = 0 \
                 ORDER BY created DESC LIMIT ?"
            }
            Membership::RecentByUrlTopLevel => {
                "SELECT * FROM comments WHERE url IN ({in}) AND is_spam = 0 \
                 AND rid = '' ORDER BY created DESC LIMIT ?"
            }
        }
    }
}

pub struct StatementCache {
    membership: DashMap<(Membership, usize), Arc<str>>,
    updates: DashMap<String, Arc<str>>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self {
            membership: DashMap::new(),
            updates: DashMap::new(),
        }
    }

    /// The cached membership statement for `n` ids. Callers short-circuit
    /// the zero-id case before reaching the cache.
    pub fn membership(&self, family: Membership, n: usize) -> Arc<str> {
        debug_assert!(n > 0, "membership query with zero ids");
        self.membership
            .entry((family, n))
            .or_insert_with(|| {
                let placeholders = vec!["?"; n].join(", ");
                Arc::from(family.template().replace("{in}", &placeholders))
            })
            .clone()
    }

    /// The cached update statement for a field subset. `fields` must
    /// already be sorted lexicographically; values are bound in that same
    /// order, followed by the `updated` stamp and the id.
    pub fn update(&self, fields: &[String]) -> Arc<str> {
        debug_assert!(!fields.is_empty(), "update with no fields");
        debug_assert!(
            fields.windows(2).all(|w| w[0] < w[1]),
            "update fields must be sorted and unique"
        );
        let key = fields.join(",");
        self.updates
            .entry(key)
            .or_insert_with(|| {
                let assignments = fields
                    .iter()
                    .map(|f| format!("{f} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Arc::from(format!(
                    "UPDATE comments SET {assignments}, updated = ? WHERE id = ?"
                ))
            })
            .clone()
    }
}

impl Default for StatementCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_width_yields_the_same_instance() {
        let cache = StatementCache::new();
        let a = cache.membership(Membership::RepliesPublic, 3);
        let b = cache.membership(Membership::RepliesPublic, 3);
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.membership(Membership::RepliesPublic, 4);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn membership_expands_placeholders() {
        let cache = StatementCache::new();
        let sql = cache.membership(Membership::RepliesAdmin, 2);
        assert!(sql.contains("rid IN (?, ?)"));
    }

    #[test]
    fn families_with_equal_width_are_distinct_entries() {
        let cache = StatementCache::new();
        let replies = cache.membership(Membership::RepliesPublic, 2);
        let counts = cache.membership(Membership::CountByUrl, 2);
        assert_ne!(&*replies, &*counts);
    }

    #[test]
    fn update_binds_fields_in_sorted_order() {
        let cache = StatementCache::new();
        let fields = vec!["is_spam".to_string(), "nick".to_string(), "top".to_string()];
        let sql = cache.update(&fields);
        assert_eq!(
            &*sql,
            "UPDATE comments SET is_spam = ?, nick = ?, top = ?, updated = ? WHERE id = ?"
        );

        let again = cache.update(&fields);
        assert!(Arc::ptr_eq(&sql, &again));
    }
}
