//! Schema introspection and natural-language → schema mapping.
//!
//! [`analyze`] reads a [`DataSource`] once and produces an immutable
//! [`SchemaSnapshot`]: tables with declared column types and a few preview
//! rows, directed foreign-key relationships, and a per-table synonym set
//! built from the static [`VOCABULARY`].
//!
//! # Synonym construction
//!
//! Every table name and column name is lowercased. When the identifier
//! contains a canonical concept or any of its synonyms, the concept's whole
//! synonym set joins the table's set. The identifier itself always joins.
//! A table `staff_members` with a column `pay_rate` therefore answers to
//! `employee`, `personnel`, `salary`, `compensation` and so on.
//!
//! # Mapping
//!
//! [`map_query`] tokenizes on non-word characters and resolves each token to
//! a concept: literally, when the token already sits in some table's synonym
//! set, else to the canonical name whose synonym list contains it. Tables
//! are ranked by how many resolved concepts they answer to.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::datasource::DataSource;
use crate::error::Result;
use crate::models::Row;

/// Preview rows captured per table.
pub const SAMPLE_ROWS: usize = 5;

/// Canonical HR concepts and their lexical variants.
pub const VOCABULARY: &[(&str, &[&str])] = &[
    (
        "employee",
        &["employee", "employees", "emp", "staff", "person", "personnel"],
    ),
    ("department", &["department", "dept", "division", "team"]),
    (
        "salary",
        &["salary", "compensation", "pay", "pay_rate", "annual_salary"],
    ),
    ("manager", &["manager", "lead", "supervisor", "head"]),
    (
        "hire_date",
        &["hire_date", "hired_on", "start_date", "join_date"],
    ),
    ("location", &["location", "office", "city"]),
    ("skills", &["skill", "skills", "competency"]),
    ("title", &["title", "role", "position"]),
];

/// Synonym list of one canonical concept, if known.
pub fn concept_synonyms(concept: &str) -> Option<&'static [&'static str]> {
    VOCABULARY
        .iter()
        .find(|(canonical, _)| *canonical == concept)
        .map(|(_, synonyms)| *synonyms)
}

/// One introspected table with a few sample rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    /// `(column, declared type)` in declaration order.
    pub columns: Vec<(String, String)>,
    /// Up to [`SAMPLE_ROWS`] rows, read at analysis time.
    pub sample_rows: Vec<Row>,
}

impl Table {
    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

/// A foreign key from `from_table` to `to_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from_table: String,
    pub to_table: String,
    /// Local column → referenced column.
    pub via_columns: BTreeMap<String, String>,
}

/// Everything the SQL path knows about a source, rebuilt on refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<Table>,
    pub relationships: Vec<Relationship>,
    /// Table name → its lowercased identifiers plus the vocabulary synonyms they match.
    pub synonyms: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaSnapshot {
    /// An empty snapshot; every lookup misses and no plan can be built.
    pub fn empty() -> Self {
        Self {
            tables: Vec::new(),
            relationships: Vec::new(),
            synonyms: BTreeMap::new(),
        }
    }

    /// Assemble a snapshot from introspected parts, deriving synonyms.
    pub fn from_parts(tables: Vec<Table>, relationships: Vec<Relationship>) -> Self {
        let synonyms = build_synonym_map(&tables);
        Self {
            tables,
            relationships,
            synonyms,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn synonyms_for(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.synonyms.get(table)
    }

    /// First column of `table` whose lowercased name contains any keyword.
    pub fn find_column(&self, table: &str, keywords: &[&str]) -> Option<&str> {
        self.table(table)?.column_names().find(|column| {
            let lower = column.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
    }

    /// Relationship from `from` to `to`, inverting a `to → from` key if that
    /// is the one declared.
    pub fn find_relationship(&self, from: &str, to: &str) -> Option<Relationship> {
        if let Some(rel) = self
            .relationships
            .iter()
            .find(|r| r.from_table == from && r.to_table == to)
        {
            return Some(rel.clone());
        }
        self.relationships
            .iter()
            .find(|r| r.from_table == to && r.to_table == from)
            .map(|r| Relationship {
                from_table: from.to_string(),
                to_table: to.to_string(),
                via_columns: r
                    .via_columns
                    .iter()
                    .map(|(local, remote)| (remote.clone(), local.clone()))
                    .collect(),
            })
    }
}

/// Introspect `source` into a snapshot.
pub async fn analyze(source: &dyn DataSource) -> Result<SchemaSnapshot> {
    let infos = source.introspect().await?;
    let mut tables = Vec::with_capacity(infos.len());
    let mut relationships = Vec::new();

    for info in infos {
        let sample_rows = source.sample(&info.name, SAMPLE_ROWS).await?;
        for fk in &info.foreign_keys {
            relationships.push(Relationship {
                from_table: info.name.clone(),
                to_table: fk.referred_table.clone(),
                via_columns: fk.columns.iter().cloned().collect(),
            });
        }
        tables.push(Table {
            name: info.name,
            columns: info.columns,
            sample_rows,
        });
    }

    tracing::info!(
        "analyzed schema: {} tables, {} relationships",
        tables.len(),
        relationships.len()
    );
    Ok(SchemaSnapshot::from_parts(tables, relationships))
}

fn build_synonym_map(tables: &[Table]) -> BTreeMap<String, BTreeSet<String>> {
    let mut map = BTreeMap::new();
    for table in tables {
        let mut set = BTreeSet::new();
        let identifiers = std::iter::once(table.name.as_str()).chain(table.column_names());
        for ident in identifiers {
            let lower = ident.to_lowercase();
            for (canonical, synonyms) in VOCABULARY {
                if lower.contains(canonical) || synonyms.iter().any(|s| lower.contains(s)) {
                    set.extend(synonyms.iter().map(|s| s.to_string()));
                }
            }
            set.insert(lower);
        }
        map.insert(table.name.clone(), set);
    }
    map
}

// ============ Query mapping ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMapping {
    pub tokens: Vec<String>,
    /// Table → resolved concepts, one entry per matching token.
    pub matches: BTreeMap<String, Vec<String>>,
    /// Tables ranked by match count, ties in snapshot order.
    pub likely_tables: Vec<String>,
}

/// Split on non-word characters, lowercase, drop empties.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_concept(token: &str, snapshot: &SchemaSnapshot) -> Option<String> {
    if snapshot.synonyms.values().any(|set| set.contains(token)) {
        return Some(token.to_string());
    }
    VOCABULARY
        .iter()
        .find(|(canonical, synonyms)| *canonical == token || synonyms.contains(&token))
        .map(|(canonical, _)| canonical.to_string())
}

pub fn map_query(query: &str, snapshot: &SchemaSnapshot) -> QueryMapping {
    let tokens = tokenize(query);
    let mut matches: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for token in &tokens {
        let Some(concept) = resolve_concept(token, snapshot) else {
            continue;
        };
        for table in &snapshot.tables {
            let hit = snapshot
                .synonyms
                .get(&table.name)
                .is_some_and(|set| set.contains(&concept));
            if hit {
                matches
                    .entry(table.name.clone())
                    .or_default()
                    .push(concept.clone());
            }
        }
    }

    let mut likely_tables: Vec<String> = snapshot
        .tables
        .iter()
        .filter(|t| matches.contains_key(&t.name))
        .map(|t| t.name.clone())
        .collect();
    // Stable sort keeps snapshot order among equal counts.
    likely_tables.sort_by_key(|name| std::cmp::Reverse(matches[name].len()));

    QueryMapping {
        tokens,
        matches,
        likely_tables,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, columns: &[&str]) -> Table {
        Table {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|c| (c.to_string(), "TEXT".to_string()))
                .collect(),
            sample_rows: Vec::new(),
        }
    }

    fn hr_snapshot() -> SchemaSnapshot {
        let departments = table("departments", &["id", "name"]);
        let employees = table(
            "employees",
            &["id", "name", "department_id", "compensation", "skills", "hire_date"],
        );
        let rel = Relationship {
            from_table: "employees".into(),
            to_table: "departments".into(),
            via_columns: [("department_id".to_string(), "id".to_string())]
                .into_iter()
                .collect(),
        };
        SchemaSnapshot::from_parts(vec![departments, employees], vec![rel])
    }

    #[test]
    fn test_synonyms_expand_from_identifiers() {
        let snap = hr_snapshot();
        let emp = snap.synonyms_for("employees").unwrap();
        assert!(emp.contains("staff"));
        assert!(emp.contains("pay_rate"));
        assert!(emp.contains("competency"));
        assert!(emp.contains("department_id"));
        let dept = snap.synonyms_for("departments").unwrap();
        assert!(dept.contains("division"));
        assert!(!dept.contains("salary"));
    }

    #[test]
    fn test_tokenize_splits_on_non_word() {
        assert_eq!(
            tokenize("How many  staff, in R&D?"),
            vec!["how", "many", "staff", "in", "r", "d"]
        );
    }

    #[test]
    fn test_map_query_ranks_tables() {
        let snap = hr_snapshot();
        let mapping = map_query("average salary per department for staff", &snap);
        assert_eq!(mapping.likely_tables[0], "employees");
        assert!(mapping.matches["employees"].contains(&"salary".to_string()));
        assert!(mapping.matches["departments"].contains(&"department".to_string()));
    }

    #[test]
    fn test_map_query_ties_keep_snapshot_order() {
        let snap = SchemaSnapshot::from_parts(
            vec![table("zeta_staff", &["id"]), table("alpha_staff", &["id"])],
            vec![],
        );
        let mapping = map_query("staff", &snap);
        assert_eq!(mapping.likely_tables, vec!["zeta_staff", "alpha_staff"]);
    }

    #[test]
    fn test_find_column_and_relationship_inverse() {
        let snap = hr_snapshot();
        assert_eq!(
            snap.find_column("employees", &["salary", "compensation"]),
            Some("compensation")
        );
        assert_eq!(snap.find_column("employees", &["manager"]), None);

        let inverse = snap.find_relationship("departments", "employees").unwrap();
        assert_eq!(inverse.from_table, "departments");
        assert_eq!(inverse.via_columns["id"], "department_id");
        assert!(snap.find_relationship("employees", "projects").is_none());
    }

    #[test]
    fn test_snapshot_serializes_sorted_synonyms() {
        let snap = hr_snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        let dept = json["synonyms"]["departments"].as_array().unwrap();
        let words: Vec<_> = dept.iter().map(|v| v.as_str().unwrap()).collect();
        let mut sorted = words.clone();
        sorted.sort();
        assert_eq!(words, sorted);
    }
}
