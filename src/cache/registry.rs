//! Table dependency registry.
//!
//! Tracks which cached queries read which tables so that evicting a table
//! bucket can find every affected entry.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::lock::rw_write;

const SOURCE: &str = "cache::registry";

/// Tracks table → query keys and query key → tables mappings.
pub struct CacheRegistry {
    table_to_queries: RwLock<HashMap<String, HashSet<String>>>,
    query_to_tables: RwLock<HashMap<String, HashSet<String>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            table_to_queries: RwLock::new(HashMap::new()),
            query_to_tables: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `query` reads from `tables`, replacing any earlier record.
    pub fn register<I, S>(&self, query: &str, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unregister(query);

        let tables: HashSet<String> = tables.into_iter().map(Into::into).collect();
        let mut t2q = rw_write(&self.table_to_queries, SOURCE, "register.table_to_queries");
        let mut q2t = rw_write(&self.query_to_tables, SOURCE, "register.query_to_tables");

        for table in &tables {
            t2q.entry(table.clone())
                .or_default()
                .insert(query.to_string());
        }
        q2t.insert(query.to_string(), tables);
    }

    /// Forget a query and drop it from every table it was tracked under.
    pub fn unregister(&self, query: &str) {
        let mut t2q = rw_write(&self.table_to_queries, SOURCE, "unregister.table_to_queries");
        let mut q2t = rw_write(&self.query_to_tables, SOURCE, "unregister.query_to_tables");

        if let Some(tables) = q2t.remove(query) {
            for table in tables {
                if let Some(queries) = t2q.get_mut(&table) {
                    queries.remove(query);
                    if queries.is_empty() {
                        t2q.remove(&table);
                    }
                }
            }
        }
    }

    /// Remove a table and every query tracked under it.
    ///
    /// Returns the queries that were tracked under the table.
    pub fn unregister_table(&self, table: &str) -> HashSet<String> {
        let mut t2q = rw_write(&self.table_to_queries, SOURCE, "unregister_table.table_to_queries");
        let mut q2t = rw_write(&self.query_to_tables, SOURCE, "unregister_table.query_to_tables");

        let affected = t2q.remove(table).unwrap_or_default();
        for query in &affected {
            if let Some(tables) = q2t.remove(query) {
                for other in tables.iter().filter(|other| other.as_str() != table) {
                    if let Some(queries) = t2q.get_mut(other) {
                        queries.remove(query);
                        if queries.is_empty() {
                            t2q.remove(other);
                        }
                    }
                }
            }
        }

        affected
    }

    pub fn clear(&self) {
        rw_write(&self.table_to_queries, SOURCE, "clear.table_to_queries").clear();
        rw_write(&self.query_to_tables, SOURCE, "clear.query_to_tables").clear();
    }

    #[cfg(test)]
    pub(crate) fn table_count(&self) -> usize {
        super::lock::rw_read(&self.table_to_queries, SOURCE, "table_count").len()
    }

    #[cfg(test)]
    pub(crate) fn query_count(&self) -> usize {
        super::lock::rw_read(&self.query_to_tables, SOURCE, "query_count").len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
