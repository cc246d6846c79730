//! Pattern-driven SQL synthesis.
//!
//! An ordered cascade of [`SqlRule`]s is tried against the lowercased
//! query; the first rule that produces a plan wins. Rules only reference
//! tables and columns found in the [`SchemaSnapshot`], and user-supplied
//! values always travel as named parameters.
//!
//! | # | Rule | Trigger | Needs |
//! |---|------|---------|-------|
//! | 1 | [`ScopedCount`] | `how many X in <name> department` | group table or department column |
//! | 2 | [`GenericCount`] | `how many` / `count` | – |
//! | 3 | [`AverageByGroup`] | `average` + `department` | salary + department columns |
//! | 4 | [`HiredWithin`] | `hired` / `joined` + period | date column |
//! | 5 | [`ReportsTo`] | `reports to <name>` | manager + name columns |
//! | 6 | [`TopEarners`] | `top` + earnings word | salary column |
//! | 7 | [`SkillFilter`] | `skill(s)` | skills column |

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

use super::SqlGenerator;
use crate::datasource::quote_ident;
use crate::models::SqlPlan;
use crate::schema::{concept_synonyms, SchemaSnapshot};

const SALARY_COLUMNS: &[&str] = &["salary", "compensation", "pay", "pay_rate"];
const DEPARTMENT_COLUMNS: &[&str] = &["department", "dept", "division"];
const DEPARTMENT_COLUMNS_WITH_TEAM: &[&str] = &["department", "division", "dept", "team"];
const DATE_COLUMNS: &[&str] = &["join_date", "start_date", "hired_on", "hire_date"];
const MANAGER_COLUMNS: &[&str] = &["reports_to", "manager_id", "manager"];
const NAME_COLUMNS: &[&str] = &["name", "full_name", "employee_name"];
const SKILL_COLUMNS: &[&str] = &["skills", "skillset", "competencies"];
const EARNINGS_WORDS: &[&str] = &[
    "earner",
    "salary",
    "salaries",
    "paid",
    "compensation",
    "highest",
];
const DEFAULT_TOP_N: i64 = 5;

static SCOPED_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"how many (\w+)(?: (?:are|work))? in (?:the )?([\w&\- ]+?) (?:department|dept|division|team)\b",
    )
    .expect("valid scoped count pattern")
});
static LAST_N_YEARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"last (\d+) year").expect("valid year pattern"));
static REPORTS_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reports to ([a-z\s]+)").expect("valid reports-to pattern"));
static TOP_N: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"top\s+(\d+)").expect("valid top-n pattern"));
static PER_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(each|per|by)\b").expect("valid grouping pattern"));
static KNOWN_SKILL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(python|java|aws|azure|sql|excel)\b").expect("valid skill pattern")
});
static OVER_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"over (\d{2,6})").expect("valid threshold pattern"));
static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,6})k").expect("valid thousands pattern"));

/// One synthesis pattern.
pub trait SqlRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `normalized` is the lowercased query; `table` exists in `schema`.
    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str)
        -> Option<SqlPlan>;
}

pub struct HeuristicSynthesizer {
    rules: Vec<Box<dyn SqlRule>>,
}

impl Default for HeuristicSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicSynthesizer {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ScopedCount),
                Box::new(GenericCount),
                Box::new(AverageByGroup),
                Box::new(HiredWithin),
                Box::new(ReportsTo),
                Box::new(TopEarners),
                Box::new(SkillFilter),
            ],
        }
    }

    pub fn synthesize(
        &self,
        query: &str,
        schema: &SchemaSnapshot,
        table: Option<&str>,
    ) -> Option<SqlPlan> {
        let target = resolve_target_table(schema, table)?;
        let normalized = query.to_lowercase();
        self.rules.iter().find_map(|rule| {
            let plan = rule.try_match(&normalized, schema, target)?;
            tracing::debug!(rule = rule.name(), table = target, "sql rule matched");
            Some(plan)
        })
    }
}

#[async_trait]
impl SqlGenerator for HeuristicSynthesizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn generate(
        &self,
        query: &str,
        schema: &SchemaSnapshot,
        table: Option<&str>,
    ) -> Option<SqlPlan> {
        self.synthesize(query, schema, table)
    }
}

/// Explicit hint if the snapshot knows it, else a people-like table, else
/// the first table.
pub fn resolve_target_table<'a>(schema: &'a SchemaSnapshot, hint: Option<&str>) -> Option<&'a str> {
    if let Some(table) = hint.and_then(|h| schema.table(h)) {
        return Some(table.name.as_str());
    }
    schema
        .tables
        .iter()
        .find(|t| {
            let lower = t.name.to_lowercase();
            ["employee", "staff", "person"]
                .iter()
                .any(|k| lower.contains(k))
        })
        .or_else(|| schema.tables.first())
        .map(|t| t.name.as_str())
}

fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(table), quote_ident(column))
}

// ============ Rules ============

pub struct ScopedCount;

impl ScopedCount {
    fn group_table<'a>(schema: &'a SchemaSnapshot, target: &str) -> Option<&'a str> {
        let words = concept_synonyms("department").unwrap_or(&[]);
        schema
            .tables
            .iter()
            .filter(|t| t.name != target)
            .find(|t| {
                let lower = t.name.to_lowercase();
                words.iter().any(|w| lower.contains(w))
            })
            .map(|t| t.name.as_str())
    }
}

impl SqlRule for ScopedCount {
    fn name(&self) -> &'static str {
        "scoped_count"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        let caps = SCOPED_COUNT.captures(normalized)?;
        let group_name = caps.get(2)?.as_str().trim().to_string();
        if group_name.is_empty() {
            return None;
        }

        let joined = Self::group_table(schema, table).and_then(|group| {
            let rel = schema.find_relationship(table, group)?;
            let name_col = schema.find_column(group, NAME_COLUMNS)?;
            let on = rel
                .via_columns
                .iter()
                .map(|(local, remote)| {
                    format!("{} = {}", qualified(table, local), qualified(group, remote))
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            Some(format!(
                "SELECT COUNT(*) AS total FROM {} JOIN {} ON {} WHERE lower({}) = :department",
                quote_ident(table),
                quote_ident(group),
                on,
                qualified(group, name_col)
            ))
        });

        let sql = match joined {
            Some(sql) => sql,
            None => {
                let column = schema
                    .table(table)?
                    .column_names()
                    .find(|c| {
                        let lower = c.to_lowercase();
                        !lower.ends_with("_id")
                            && DEPARTMENT_COLUMNS_WITH_TEAM.iter().any(|k| lower.contains(k))
                    })?;
                format!(
                    "SELECT COUNT(*) AS total FROM {} WHERE lower({}) = :department",
                    quote_ident(table),
                    quote_ident(column)
                )
            }
        };

        Some(SqlPlan::new(sql, "Count rows within one department").with_param("department", group_name))
    }
}

pub struct GenericCount;

impl SqlRule for GenericCount {
    fn name(&self) -> &'static str {
        "count"
    }

    fn try_match(&self, normalized: &str, _schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !(normalized.contains("how many") || normalized.contains("count")) {
            return None;
        }
        Some(SqlPlan::new(
            format!("SELECT COUNT(*) AS total FROM {}", quote_ident(table)),
            "Count rows",
        ))
    }
}

pub struct AverageByGroup;

impl SqlRule for AverageByGroup {
    fn name(&self) -> &'static str {
        "average_by_department"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !(normalized.contains("average") && normalized.contains("department")) {
            return None;
        }
        let salary = quote_ident(schema.find_column(table, SALARY_COLUMNS)?);
        let dept = quote_ident(schema.find_column(table, DEPARTMENT_COLUMNS)?);
        Some(SqlPlan::new(
            format!(
                "SELECT {dept} AS department, AVG({salary}) AS average_salary FROM {} \
                 GROUP BY {dept} ORDER BY average_salary DESC",
                quote_ident(table)
            ),
            "Average salary grouped by department",
        ))
    }
}

pub struct HiredWithin;

impl SqlRule for HiredWithin {
    fn name(&self) -> &'static str {
        "hired_within"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !(normalized.contains("hired") || normalized.contains("joined")) {
            return None;
        }
        let date = quote_ident(schema.find_column(table, DATE_COLUMNS)?);
        let table = quote_ident(table);

        if normalized.contains("this year") {
            return Some(SqlPlan::new(
                format!("SELECT * FROM {table} WHERE strftime('%Y', {date}) = strftime('%Y', 'now')"),
                "Hired this year",
            ));
        }

        let years = match LAST_N_YEARS.captures(normalized) {
            Some(caps) => caps[1].parse::<u32>().ok()?,
            None if normalized.contains("last year") => 1,
            None => return None,
        };
        Some(
            SqlPlan::new(
                format!("SELECT * FROM {table} WHERE {date} >= DATE('now', :offset)"),
                "Hired in recent years",
            )
            .with_param("offset", format!("-{} years", years)),
        )
    }
}

pub struct ReportsTo;

impl SqlRule for ReportsTo {
    fn name(&self) -> &'static str {
        "reports_to"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !normalized.contains("reports to") {
            return None;
        }
        let manager = schema.find_column(table, MANAGER_COLUMNS)?;
        schema.find_column(table, NAME_COLUMNS)?;
        let name = REPORTS_TO.captures(normalized)?[1].trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(
            SqlPlan::new(
                format!(
                    "SELECT * FROM {} WHERE lower({}) = :manager",
                    quote_ident(table),
                    quote_ident(manager)
                ),
                "Rows reporting to a manager",
            )
            .with_param("manager", name),
        )
    }
}

pub struct TopEarners;

impl SqlRule for TopEarners {
    fn name(&self) -> &'static str {
        "top_earners"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !(normalized.contains("top") && EARNINGS_WORDS.iter().any(|w| normalized.contains(w))) {
            return None;
        }
        let salary = quote_ident(schema.find_column(table, SALARY_COLUMNS)?);
        let limit = TOP_N
            .captures(normalized)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(DEFAULT_TOP_N);

        let per_group = PER_GROUP.is_match(normalized) && normalized.contains("department");
        let dept = schema.find_column(table, DEPARTMENT_COLUMNS_WITH_TEAM);

        let plan = match dept {
            Some(dept) if per_group => {
                let dept = quote_ident(dept);
                SqlPlan::new(
                    format!(
                        "SELECT * FROM (SELECT *, ROW_NUMBER() OVER (PARTITION BY {dept} ORDER BY {salary} DESC) AS rn \
                         FROM {}) t WHERE rn <= :limit ORDER BY {dept}, {salary} DESC",
                        quote_ident(table)
                    ),
                    "Top earners per department",
                )
            }
            _ => SqlPlan::new(
                format!(
                    "SELECT * FROM {} ORDER BY {salary} DESC LIMIT :limit",
                    quote_ident(table)
                ),
                "Top earners",
            ),
        };
        Some(plan.with_param("limit", limit))
    }
}

pub struct SkillFilter;

impl SkillFilter {
    fn threshold(normalized: &str) -> Option<i64> {
        if let Some(caps) = OVER_AMOUNT.captures(normalized) {
            return caps[1].parse().ok();
        }
        THOUSANDS
            .captures(normalized)
            .and_then(|caps| caps[1].parse::<i64>().ok())
            .map(|n| n * 1000)
    }
}

impl SqlRule for SkillFilter {
    fn name(&self) -> &'static str {
        "skill_filter"
    }

    fn try_match(&self, normalized: &str, schema: &SchemaSnapshot, table: &str) -> Option<SqlPlan> {
        if !normalized.contains("skill") {
            return None;
        }
        let skills = schema.find_column(table, SKILL_COLUMNS)?;
        let salary = schema.find_column(table, &["salary", "compensation", "pay"]);

        let mut conditions = Vec::new();
        let mut plan = SqlPlan::new("", "Rows filtered by skill and salary");

        if let Some(caps) = KNOWN_SKILL.captures(normalized) {
            conditions.push(format!("lower({}) LIKE :skill", quote_ident(skills)));
            plan = plan.with_param("skill", format!("%{}%", &caps[1]));
        }
        if let (Some(salary), Some(amount)) = (salary, Self::threshold(normalized)) {
            conditions.push(format!("{} >= :salary", quote_ident(salary)));
            plan = plan.with_param("salary", amount);
        }

        plan.sql = if conditions.is_empty() {
            format!("SELECT * FROM {}", quote_ident(table))
        } else {
            format!(
                "SELECT * FROM {} WHERE {}",
                quote_ident(table),
                conditions.join(" AND ")
            )
        };
        Some(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Relationship, Table};
    use serde_json::Value;

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

    fn hr() -> SchemaSnapshot {
        let rel = Relationship {
            from_table: "employees".into(),
            to_table: "departments".into(),
            via_columns: [("department_id".to_string(), "id".to_string())]
                .into_iter()
                .collect(),
        };
        SchemaSnapshot::from_parts(
            vec![
                table("departments", &["id", "name"]),
                table(
                    "employees",
                    &[
                        "id",
                        "name",
                        "department_id",
                        "compensation",
                        "skills",
                        "hire_date",
                        "manager",
                    ],
                ),
            ],
            vec![rel],
        )
    }

    fn flat() -> SchemaSnapshot {
        SchemaSnapshot::from_parts(
            vec![table(
                "staff",
                &["id", "full_name", "department", "salary", "start_date"],
            )],
            vec![],
        )
    }

    fn plan(query: &str, schema: &SchemaSnapshot) -> SqlPlan {
        HeuristicSynthesizer::new()
            .synthesize(query, schema, None)
            .expect("plan")
    }

    #[test]
    fn test_default_table_prefers_people() {
        let schema = hr();
        assert_eq!(resolve_target_table(&schema, None), Some("employees"));
        assert_eq!(
            resolve_target_table(&schema, Some("departments")),
            Some("departments")
        );
        assert_eq!(resolve_target_table(&schema, Some("ghost")), Some("employees"));
        assert_eq!(resolve_target_table(&SchemaSnapshot::empty(), None), None);
    }

    #[test]
    fn test_generic_count() {
        let p = plan("How many employees do we have?", &hr());
        assert_eq!(p.sql, "SELECT COUNT(*) AS total FROM employees");
        assert!(p.params.is_empty());
    }

    #[test]
    fn test_scoped_count_joins_group_table() {
        let p = plan("How many employees work in the Engineering department?", &hr());
        assert_eq!(
            p.sql,
            "SELECT COUNT(*) AS total FROM employees JOIN departments \
             ON employees.department_id = departments.id \
             WHERE lower(departments.name) = :department"
        );
        assert_eq!(p.params["department"], Value::from("engineering"));
    }

    #[test]
    fn test_scoped_count_falls_back_to_column() {
        let p = plan("how many staff are in sales team", &flat());
        assert_eq!(
            p.sql,
            "SELECT COUNT(*) AS total FROM staff WHERE lower(department) = :department"
        );
        assert_eq!(p.params["department"], Value::from("sales"));
    }

    #[test]
    fn test_average_by_department() {
        let p = plan("average salary by department", &flat());
        assert!(p.sql.contains("AVG(salary) AS average_salary"));
        assert!(p.sql.contains("GROUP BY department"));
    }

    #[test]
    fn test_hired_last_n_years_uses_offset_param() {
        let p = plan("who was hired in the last 3 years", &hr());
        assert_eq!(
            p.sql,
            "SELECT * FROM employees WHERE hire_date >= DATE('now', :offset)"
        );
        assert_eq!(p.params["offset"], Value::from("-3 years"));

        let this_year = plan("people who joined this year", &flat());
        assert!(this_year.sql.contains("strftime('%Y', start_date)"));
    }

    #[test]
    fn test_reports_to_extracts_name() {
        let p = plan("Who reports to Grace Hopper", &hr());
        assert_eq!(p.sql, "SELECT * FROM employees WHERE lower(manager) = :manager");
        assert_eq!(p.params["manager"], Value::from("grace hopper"));
    }

    #[test]
    fn test_top_earners_global_and_per_department() {
        let global = plan("top 3 earners", &hr());
        assert_eq!(
            global.sql,
            "SELECT * FROM employees ORDER BY compensation DESC LIMIT :limit"
        );
        assert_eq!(global.params["limit"], Value::from(3));

        let grouped = plan("top paid in each department", &flat());
        assert!(grouped.sql.contains("PARTITION BY department ORDER BY salary DESC"));
        assert!(grouped.sql.contains("rn <= :limit"));
        assert_eq!(grouped.params["limit"], Value::from(5));
    }

    #[test]
    fn test_skill_with_threshold() {
        let p = plan("python skills earning over 90000", &hr());
        assert_eq!(
            p.sql,
            "SELECT * FROM employees WHERE lower(skills) LIKE :skill AND compensation >= :salary"
        );
        assert_eq!(p.params["skill"], Value::from("%python%"));
        assert_eq!(p.params["salary"], Value::from(90000));

        let k = plan("skills with 120k", &hr());
        assert_eq!(k.params["salary"], Value::from(120000));
        assert!(!k.params.contains_key("skill"));
    }

    #[test]
    fn test_rule_order_count_beats_skill() {
        let p = plan("count python skills", &hr());
        assert_eq!(p.sql, "SELECT COUNT(*) AS total FROM employees");
    }

    #[test]
    fn test_no_rule_matches() {
        assert!(HeuristicSynthesizer::new()
            .synthesize("tell me a story", &hr(), None)
            .is_none());
    }

    #[test]
    fn test_unusual_identifiers_are_quoted() {
        let schema = SchemaSnapshot::from_parts(vec![table("Staff List", &["id"])], vec![]);
        let p = plan("how many", &schema);
        assert_eq!(p.sql, "SELECT COUNT(*) AS total FROM \"Staff List\"");
    }
}
